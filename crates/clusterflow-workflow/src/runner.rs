//! Local run loop
//!
//! Drives a workflow program against the activity registry in-process.
//! The runner owns the per-activity retry policy (Transient failures
//! only, bounded attempts with exponential backoff) and the run record
//! that survives the run as its operator-visible summary.

use crate::cluster::{ClusterOutput, create_cluster};
use crate::context::WorkflowContext;
use crate::infrastructure::{InfrastructureOutput, create_infrastructure};
use crate::registry::Registry;
use async_trait::async_trait;
use clusterflow_activity::{ActivityContext, NoopHooks, RuntimeHooks, Sleeper, TokioSleeper};
use clusterflow_core::{ErrorKind, ProvisioningRequest, Result, RunRecord, StepError};
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{info, warn};

/// Bounded retry for Transient activity failures
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt following `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16) as i32;
        let delay = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()))
    }
}

/// In-process workflow runner
pub struct LocalRunner {
    run_id: String,
    registry: Arc<Registry>,
    retry: RetryPolicy,
    hooks: Arc<dyn RuntimeHooks>,
    sleeper: Arc<dyn Sleeper>,
    record: Mutex<RunRecord>,
}

impl LocalRunner {
    pub fn new(run_id: impl Into<String>, registry: Arc<Registry>) -> Self {
        let run_id = run_id.into();
        let record = Mutex::new(RunRecord::new(&run_id));
        Self {
            run_id,
            registry,
            retry: RetryPolicy::default(),
            hooks: Arc::new(NoopHooks),
            sleeper: Arc::new(TokioSleeper),
            record,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn RuntimeHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Snapshot of the run record
    pub fn record(&self) -> RunRecord {
        self.lock_record().clone()
    }

    /// Run the cluster workflow to completion
    pub async fn run_cluster(&self, request: &ProvisioningRequest) -> Result<ClusterOutput> {
        self.lock_record().start();
        match create_cluster(self, request).await {
            Ok(output) => {
                self.lock_record().succeed();
                info!(run = %self.run_id, "Run succeeded");
                Ok(output)
            }
            Err(err) => {
                warn!(run = %self.run_id, error = %err, "Run failed");
                self.lock_record().fail(err.clone());
                Err(err)
            }
        }
    }

    /// Run a registered workflow by name, with a JSON result
    pub async fn run_workflow(
        &self,
        workflow: &str,
        request: &ProvisioningRequest,
    ) -> Result<Value> {
        if !self.registry.has_workflow(workflow) {
            return Err(StepError::fatal(workflow, "workflow is not registered"));
        }
        match workflow {
            crate::cluster::CLUSTER_WORKFLOW => {
                let output = self.run_cluster(request).await?;
                serde_json::to_value(output)
                    .map_err(|e| StepError::fatal(workflow, e.to_string()))
            }
            crate::infrastructure::INFRASTRUCTURE_WORKFLOW => {
                let output = self.run_infrastructure(request).await?;
                serde_json::to_value(output)
                    .map_err(|e| StepError::fatal(workflow, e.to_string()))
            }
            other => Err(StepError::fatal(other, "workflow has no program")),
        }
    }

    /// Run the infrastructure workflow on its own
    pub async fn run_infrastructure(
        &self,
        request: &ProvisioningRequest,
    ) -> Result<InfrastructureOutput> {
        self.lock_record().start();
        match create_infrastructure(self, request).await {
            Ok(output) => {
                self.lock_record().succeed();
                Ok(output)
            }
            Err(err) => {
                self.lock_record().fail(err.clone());
                Err(err)
            }
        }
    }

    fn lock_record(&self) -> MutexGuard<'_, RunRecord> {
        match self.record.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl WorkflowContext for LocalRunner {
    fn run_id(&self) -> &str {
        &self.run_id
    }

    fn cancelled(&self) -> bool {
        self.hooks.is_cancelled()
    }

    async fn invoke(&self, activity: &str, input: Value) -> Result<Value> {
        let handler = self
            .registry
            .get(activity)
            .ok_or_else(|| StepError::fatal(activity, "activity is not registered"))?;

        let mut attempt = 1;
        loop {
            if self.cancelled() {
                return Err(StepError::cancelled(activity));
            }

            let ctx = ActivityContext::new(&self.run_id, attempt, self.hooks.clone());
            match handler.invoke(&ctx, input.clone()).await {
                Ok(output) => {
                    self.lock_record().step_completed(activity);
                    return Ok(output);
                }
                Err(err) if err.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        step = activity,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient failure, retrying"
                    );
                    self.sleeper.sleep(delay).await;
                    attempt += 1;
                }
                // Retry budget exhausted: what was Transient per
                // invocation is terminal for the run.
                Err(err) if err.is_retryable() => {
                    return Err(StepError {
                        kind: ErrorKind::Fatal,
                        step: err.step,
                        resource: err.resource,
                        message: format!(
                            "still failing after {} attempts: {}",
                            attempt, err.message
                        ),
                    });
                }
                Err(err) => return Err(err),
            }
        }
    }
}
