//! Workflow-side activity invocation
//!
//! Workflows never touch the cloud seams directly; every side effect
//! goes through [`WorkflowContext::invoke`], which the runtime backs
//! with its registry, retry policy, and run bookkeeping. The context
//! speaks JSON so the runtime stays ignorant of activity input and
//! output types; [`call_activity`] restores the typed surface for the
//! workflow code itself.

use async_trait::async_trait;
use clusterflow_activity::Activity;
use clusterflow_core::{Result, StepError};
use serde_json::Value;

/// Runtime surface a workflow runs against
#[async_trait]
pub trait WorkflowContext: Send + Sync {
    /// Identity of the enclosing run
    fn run_id(&self) -> &str;

    /// Whether the run has been cancelled by the caller
    fn cancelled(&self) -> bool;

    /// Invoke a registered activity by name with a JSON payload
    ///
    /// The runtime owns retries: a Transient failure is re-attempted
    /// under its policy before any error surfaces here.
    async fn invoke(&self, activity: &str, input: Value) -> Result<Value>;
}

/// Invoke an activity with its typed input and output
pub async fn call_activity<A: Activity>(
    ctx: &dyn WorkflowContext,
    input: A::Input,
) -> Result<A::Output> {
    let payload = serde_json::to_value(input)
        .map_err(|e| StepError::fatal(A::NAME, format!("unserializable activity input: {}", e)))?;

    let output = ctx.invoke(A::NAME, payload).await?;

    serde_json::from_value(output)
        .map_err(|e| StepError::fatal(A::NAME, format!("invalid activity output: {}", e)))
}
