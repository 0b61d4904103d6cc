//! Activity invocation context
//!
//! The durable-execution runtime supplies heartbeating and cancellation
//! through [`RuntimeHooks`]; the context carries them into the activity
//! together with the run identity. No in-memory state survives across
//! separate invocations.

use clusterflow_core::{Result, StepError};
use std::sync::Arc;

/// Hooks supplied by the durable-execution runtime
pub trait RuntimeHooks: Send + Sync {
    /// Record a liveness heartbeat with a progress detail
    fn record_heartbeat(&self, details: &str);

    /// Whether the enclosing run has been cancelled
    fn is_cancelled(&self) -> bool;
}

/// Hooks for contexts outside a durable runtime (tests, one-shot runs)
pub struct NoopHooks;

impl RuntimeHooks for NoopHooks {
    fn record_heartbeat(&self, _details: &str) {}

    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Context for one activity invocation
#[derive(Clone)]
pub struct ActivityContext {
    pub run_id: String,
    /// 1-based attempt number under the runtime's retry policy
    pub attempt: u32,
    hooks: Arc<dyn RuntimeHooks>,
}

impl ActivityContext {
    pub fn new(run_id: impl Into<String>, attempt: u32, hooks: Arc<dyn RuntimeHooks>) -> Self {
        Self {
            run_id: run_id.into(),
            attempt,
            hooks,
        }
    }

    /// Context with no runtime attached
    pub fn detached(run_id: impl Into<String>) -> Self {
        Self::new(run_id, 1, Arc::new(NoopHooks))
    }

    pub fn heartbeat(&self, details: &str) {
        self.hooks.record_heartbeat(details);
    }

    pub fn cancelled(&self) -> bool {
        self.hooks.is_cancelled()
    }

    /// Error out with a Cancelled classification if the run was aborted
    pub fn check_cancelled(&self, step: &str) -> Result<()> {
        if self.cancelled() {
            Err(StepError::cancelled(step))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FlagHooks(AtomicBool);

    impl RuntimeHooks for FlagHooks {
        fn record_heartbeat(&self, _details: &str) {}
        fn is_cancelled(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn test_check_cancelled_classifies_cancelled() {
        let hooks = Arc::new(FlagHooks(AtomicBool::new(true)));
        let ctx = ActivityContext::new("run-1", 1, hooks);
        let err = ctx.check_cancelled("CreateNodeGroup").unwrap_err();
        assert_eq!(err.kind, clusterflow_core::ErrorKind::Cancelled);
        assert_eq!(err.step, "CreateNodeGroup");
    }

    #[test]
    fn test_detached_context_never_cancelled() {
        let ctx = ActivityContext::detached("run-2");
        assert!(ctx.check_cancelled("CreateNetwork").is_ok());
    }
}
