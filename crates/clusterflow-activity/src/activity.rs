//! Activity trait and type-erased invocation
//!
//! Activities are typed; the durable-execution runtime speaks JSON. The
//! [`ErasedActivity`] wrapper bridges the two: the registry stores
//! erased handlers under their activity names, and each invocation
//! deserializes the input, runs the typed activity, and serializes the
//! output back.

use crate::context::ActivityContext;
use async_trait::async_trait;
use clusterflow_core::{Result, StepError};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// One idempotent, retryable unit of externally-visible work
#[async_trait]
pub trait Activity: Send + Sync + 'static {
    /// Registered name, the key the durable runtime invokes by
    const NAME: &'static str;

    type Input: Serialize + DeserializeOwned + Send + 'static;
    type Output: Serialize + DeserializeOwned + Send + 'static;

    async fn execute(&self, ctx: &ActivityContext, input: Self::Input) -> Result<Self::Output>;
}

/// JSON-in, JSON-out surface the registry exposes to the runtime
#[async_trait]
pub trait ErasedActivity: Send + Sync {
    fn name(&self) -> &'static str;

    async fn invoke(
        &self,
        ctx: &ActivityContext,
        input: serde_json::Value,
    ) -> Result<serde_json::Value>;
}

/// Wraps a typed [`Activity`] as an [`ErasedActivity`]
pub struct ActivityHandler<A>(pub A);

#[async_trait]
impl<A: Activity> ErasedActivity for ActivityHandler<A> {
    fn name(&self) -> &'static str {
        A::NAME
    }

    async fn invoke(
        &self,
        ctx: &ActivityContext,
        input: serde_json::Value,
    ) -> Result<serde_json::Value> {
        // A malformed input can never succeed on retry
        let input: A::Input = serde_json::from_value(input)
            .map_err(|e| StepError::fatal(A::NAME, format!("invalid activity input: {}", e)))?;

        let output = self.0.execute(ctx, input).await?;

        serde_json::to_value(output)
            .map_err(|e| StepError::fatal(A::NAME, format!("unserializable activity output: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clusterflow_core::ErrorKind;
    use serde::Deserialize;

    struct Doubler;

    #[derive(Serialize, Deserialize)]
    struct In {
        n: u32,
    }

    #[derive(Serialize, Deserialize)]
    struct Out {
        doubled: u32,
    }

    #[async_trait]
    impl Activity for Doubler {
        const NAME: &'static str = "Doubler";
        type Input = In;
        type Output = Out;

        async fn execute(&self, _ctx: &ActivityContext, input: In) -> Result<Out> {
            Ok(Out {
                doubled: input.n * 2,
            })
        }
    }

    #[tokio::test]
    async fn test_erased_round_trip() {
        let handler = ActivityHandler(Doubler);
        let ctx = ActivityContext::detached("run-1");
        let out = handler
            .invoke(&ctx, serde_json::json!({"n": 21}))
            .await
            .unwrap();
        assert_eq!(out["doubled"], 42);
    }

    #[tokio::test]
    async fn test_malformed_input_is_fatal() {
        let handler = ActivityHandler(Doubler);
        let ctx = ActivityContext::detached("run-1");
        let err = handler
            .invoke(&ctx, serde_json::json!({"n": "not a number"}))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Fatal);
    }
}
