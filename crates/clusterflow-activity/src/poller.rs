//! Capacity fulfillment poller
//!
//! After a capacity group of desired size N is requested, the provider
//! fulfills it asynchronously. The poller queries the healthy node count
//! on a fixed cadence until N is reached or the bounded attempt budget
//! (ceiling / cadence) is exhausted. Attempts are consumed whether a
//! query reports too few nodes or fails in transport, so a flaky
//! provider cannot extend the wait.

use crate::context::ActivityContext;
use async_trait::async_trait;
use clusterflow_cloud::{CloudApi, Session};
use clusterflow_core::{Result, StepError, WaitPolicy};
use std::time::Duration;
use tracing::{debug, warn};

/// Suspension between polls, injectable so tests run without real delay
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Production sleeper backed by the tokio timer
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Bounded poller for capacity-group fulfillment
pub struct FulfillmentPoller {
    policy: WaitPolicy,
}

impl FulfillmentPoller {
    pub fn new(policy: WaitPolicy) -> Self {
        Self { policy }
    }

    /// Wait until at least `desired` nodes of `group_name` are healthy.
    ///
    /// Returns the observed healthy count on success. On exhaustion the
    /// TimedOut error carries both counts so the caller can decide to
    /// accept partial capacity, retry, or abort. Cancellation is
    /// observed within one poll interval.
    pub async fn wait_for_capacity(
        &self,
        ctx: &ActivityContext,
        api: &dyn CloudApi,
        session: &Session,
        group_name: &str,
        desired: u32,
        sleeper: &dyn Sleeper,
    ) -> Result<u32> {
        let max_attempts = self.policy.max_attempts();
        let mut observed = 0u32;

        for attempt in 1..=max_attempts {
            ctx.check_cancelled("CreateNodeGroup")?;

            // The runtime's liveness watchdog must see progress before
            // each suspension.
            ctx.heartbeat(&format!(
                "waiting for capacity group {}: attempt {}/{}",
                group_name, attempt, max_attempts
            ));

            match api.healthy_node_count(session, group_name).await {
                Ok(count) => {
                    observed = count;
                    debug!(
                        group = %group_name,
                        healthy = count,
                        desired = desired,
                        attempt = attempt,
                        "Polled capacity group"
                    );
                    if count >= desired {
                        return Ok(count);
                    }
                }
                Err(err) => {
                    // A failed query consumes the attempt; it must not
                    // extend the wait.
                    warn!(
                        group = %group_name,
                        attempt = attempt,
                        error = %err,
                        "Capacity query failed"
                    );
                }
            }

            if attempt < max_attempts {
                sleeper.sleep(self.policy.poll_interval).await;
            }
        }

        Err(StepError::timed_out(
            "CreateNodeGroup",
            format!(
                "capacity group {} reached {} of {} healthy nodes within {:?}",
                group_name, observed, desired, self.policy.max_wait
            ),
        )
        .with_resource(group_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RuntimeHooks;
    use clusterflow_cloud::{
        AccessKey, ControlPlaneSpec, ControlPlaneStatus, KeyPairInfo, StackOutputs, SubnetDetails,
        VpcConfig,
    };
    use clusterflow_core::ErrorKind;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    fn session() -> Session {
        Session {
            access_key_id: "AKIA123".to_string(),
            secret_access_key: "shh".to_string(),
            session_token: None,
            region: "eu-west-1".to_string(),
        }
    }

    fn policy() -> WaitPolicy {
        WaitPolicy::new(Duration::from_secs(5), Duration::from_secs(120))
    }

    /// Sleeper that returns immediately and counts sleeps
    struct InstantSleeper(AtomicU32);

    #[async_trait]
    impl Sleeper for InstantSleeper {
        async fn sleep(&self, _duration: Duration) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// CloudApi whose healthy count follows a scripted sequence
    struct ScriptedApi {
        counts: Vec<Result<u32>>,
        calls: AtomicU32,
    }

    impl ScriptedApi {
        fn new(counts: Vec<Result<u32>>) -> Self {
            Self {
                counts,
                calls: AtomicU32::new(0),
            }
        }

        fn query_count(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CloudApi for ScriptedApi {
        async fn healthy_node_count(&self, _session: &Session, _group: &str) -> Result<u32> {
            let index = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            self.counts
                .get(index.min(self.counts.len().saturating_sub(1)))
                .cloned()
                .unwrap_or(Ok(0))
        }

        // The poller only queries capacity; nothing else is reachable.
        async fn create_stack(
            &self,
            _: &Session,
            _: &str,
            _: &str,
            _: &[(String, String)],
        ) -> Result<StackOutputs> {
            unreachable!()
        }
        async fn describe_stack(&self, _: &Session, _: &str) -> Result<Option<StackOutputs>> {
            unreachable!()
        }
        async fn describe_subnets(&self, _: &Session, _: &[String]) -> Result<Vec<SubnetDetails>> {
            unreachable!()
        }
        async fn import_key_pair(&self, _: &Session, _: &str, _: &str) -> Result<KeyPairInfo> {
            unreachable!()
        }
        async fn describe_key_pair(&self, _: &Session, _: &str) -> Result<Option<KeyPairInfo>> {
            unreachable!()
        }
        async fn delete_key_pair(&self, _: &Session, _: &str) -> Result<()> {
            unreachable!()
        }
        async fn describe_vpc_config(&self, _: &Session, _: &str) -> Result<VpcConfig> {
            unreachable!()
        }
        async fn create_control_plane(&self, _: &Session, _: &ControlPlaneSpec) -> Result<()> {
            unreachable!()
        }
        async fn describe_control_plane(
            &self,
            _: &Session,
            _: &str,
        ) -> Result<Option<ControlPlaneStatus>> {
            unreachable!()
        }
        async fn ensure_user(&self, _: &Session, _: &str) -> Result<String> {
            unreachable!()
        }
        async fn list_access_keys(&self, _: &Session, _: &str) -> Result<Vec<String>> {
            unreachable!()
        }
        async fn create_access_key(&self, _: &Session, _: &str) -> Result<AccessKey> {
            unreachable!()
        }
        async fn apply_manifest(&self, _: &Session, _: &str, _: &str) -> Result<()> {
            unreachable!()
        }
    }

    #[tokio::test]
    async fn test_success_on_first_satisfying_tick() {
        // desired=3, healthy reaches 3 on the 4th query
        let api = ScriptedApi::new(vec![Ok(0), Ok(1), Ok(2), Ok(3)]);
        let poller = FulfillmentPoller::new(policy());
        let sleeper = InstantSleeper(AtomicU32::new(0));
        let ctx = ActivityContext::detached("run-1");

        let count = poller
            .wait_for_capacity(&ctx, &api, &session(), "clusterflow-demo-pool-workers", 3, &sleeper)
            .await
            .unwrap();

        assert_eq!(count, 3);
        assert_eq!(api.query_count(), 4, "no polling after fulfillment");
    }

    #[tokio::test]
    async fn test_at_most_24_queries_before_timeout() {
        let api = ScriptedApi::new(vec![Ok(1)]);
        let poller = FulfillmentPoller::new(policy());
        let sleeper = InstantSleeper(AtomicU32::new(0));
        let ctx = ActivityContext::detached("run-1");

        let err = poller
            .wait_for_capacity(&ctx, &api, &session(), "clusterflow-demo-pool-workers", 3, &sleeper)
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::TimedOut);
        assert_eq!(api.query_count(), 24);
        // Last observed and desired both surface for the caller
        assert!(err.message.contains("1 of 3"));
    }

    #[tokio::test]
    async fn test_query_failures_consume_attempts() {
        let api = ScriptedApi::new(vec![Err(StepError::transient(
            "healthy_node_count",
            "connection reset",
        ))]);
        let poller = FulfillmentPoller::new(policy());
        let sleeper = InstantSleeper(AtomicU32::new(0));
        let ctx = ActivityContext::detached("run-1");

        let err = poller
            .wait_for_capacity(&ctx, &api, &session(), "clusterflow-demo-pool-workers", 2, &sleeper)
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::TimedOut);
        assert_eq!(api.query_count(), 24, "flaky queries must not extend the wait");
    }

    #[tokio::test]
    async fn test_cancellation_stops_polling() {
        struct CancelAfter {
            checks: AtomicU32,
            cancelled: AtomicBool,
        }

        impl RuntimeHooks for CancelAfter {
            fn record_heartbeat(&self, _details: &str) {}
            fn is_cancelled(&self) -> bool {
                // Cancel on the third check
                if self.checks.fetch_add(1, Ordering::SeqCst) >= 2 {
                    self.cancelled.store(true, Ordering::SeqCst);
                }
                self.cancelled.load(Ordering::SeqCst)
            }
        }

        let api = ScriptedApi::new(vec![Ok(0)]);
        let poller = FulfillmentPoller::new(policy());
        let sleeper = InstantSleeper(AtomicU32::new(0));
        let hooks = Arc::new(CancelAfter {
            checks: AtomicU32::new(0),
            cancelled: AtomicBool::new(false),
        });
        let ctx = ActivityContext::new("run-1", 1, hooks);

        let err = poller
            .wait_for_capacity(&ctx, &api, &session(), "clusterflow-demo-pool-workers", 3, &sleeper)
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Cancelled);
        assert!(
            api.query_count() < 24,
            "cancellation must not run out the attempt budget"
        );
    }
}
