//! Per-run state machine
//!
//! `Pending → Running → {Succeeded | Failed | TimedOut}`. While Running,
//! the last completed step subdivides progress; a resumed run continues
//! from the step after it.

use crate::error::{ErrorKind, StepError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Terminal and non-terminal states of a workflow run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Pending,
    Running,
    Succeeded,
    Failed,
    TimedOut,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Succeeded | RunState::Failed | RunState::TimedOut
        )
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Pending => write!(f, "pending"),
            RunState::Running => write!(f, "running"),
            RunState::Succeeded => write!(f, "succeeded"),
            RunState::Failed => write!(f, "failed"),
            RunState::TimedOut => write!(f, "timed-out"),
        }
    }
}

/// Progress record for one workflow run
///
/// The failing step and classified reason are the operator-visible
/// surface for diagnosing partially-provisioned infrastructure; raw
/// provider errors never appear here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub state: RunState,
    pub last_completed_step: Option<String>,
    pub failure: Option<StepError>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunRecord {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            state: RunState::Pending,
            last_completed_step: None,
            failure: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn start(&mut self) {
        self.state = RunState::Running;
        self.started_at = Utc::now();
    }

    pub fn step_completed(&mut self, step: impl Into<String>) {
        self.last_completed_step = Some(step.into());
    }

    pub fn succeed(&mut self) {
        self.state = RunState::Succeeded;
        self.finished_at = Some(Utc::now());
    }

    pub fn fail(&mut self, error: StepError) {
        self.state = match error.kind {
            ErrorKind::TimedOut => RunState::TimedOut,
            _ => RunState::Failed,
        };
        self.failure = Some(error);
        self.finished_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timed_out_failure_maps_to_timed_out_state() {
        let mut record = RunRecord::new("run-1");
        record.start();
        record.step_completed("CreateControlPlane");
        record.fail(StepError::timed_out("CreateNodeGroup", "1 of 3 healthy"));

        assert_eq!(record.state, RunState::TimedOut);
        assert!(record.state.is_terminal());
        assert_eq!(
            record.last_completed_step.as_deref(),
            Some("CreateControlPlane")
        );
    }

    #[test]
    fn test_successful_run() {
        let mut record = RunRecord::new("run-2");
        record.start();
        assert!(!record.state.is_terminal());
        record.succeed();
        assert_eq!(record.state, RunState::Succeeded);
        assert!(record.finished_at.is_some());
    }
}
