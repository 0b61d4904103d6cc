//! Control-plane creation
//!
//! The provider builds the control plane asynchronously; this activity
//! requests it, then polls its status with heartbeats until it reports
//! Active or the bounded attempt budget runs out.

use crate::activity::Activity;
use crate::context::ActivityContext;
use crate::poller::Sleeper;
use async_trait::async_trait;
use clusterflow_cloud::{CloudApi, ControlPlaneSpec, ControlPlaneStatus, Session, SessionFactory};
use clusterflow_core::{EndpointAccess, ErrorKind, Result, SecretRef, StepError, WaitPolicy};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateControlPlaneInput {
    pub cluster_name: String,
    pub region: String,
    pub secret_ref: SecretRef,
    pub version: String,
    pub cluster_role_arn: String,
    pub subnet_ids: Vec<String>,
    pub security_group_id: String,
    pub endpoint_access: EndpointAccess,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateControlPlaneOutput {
    pub endpoint: String,
    pub certificate_authority: Option<String>,
    pub created: bool,
}

/// Requests control-plane creation and waits until it is Active
pub struct CreateControlPlane {
    sessions: Arc<SessionFactory>,
    api: Arc<dyn CloudApi>,
    wait: WaitPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl CreateControlPlane {
    pub fn new(
        sessions: Arc<SessionFactory>,
        api: Arc<dyn CloudApi>,
        wait: WaitPolicy,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            sessions,
            api,
            wait,
            sleeper,
        }
    }

    /// Poll until Active, with one attempt consumed per observation
    async fn wait_until_active(
        &self,
        ctx: &ActivityContext,
        session: &Session,
        cluster_name: &str,
    ) -> Result<ControlPlaneStatus> {
        let max_attempts = self.wait.max_attempts();
        let mut last_status = "UNKNOWN".to_string();

        for attempt in 1..=max_attempts {
            ctx.check_cancelled(Self::NAME)?;
            ctx.heartbeat(&format!(
                "waiting for control plane {}: attempt {}/{}",
                cluster_name, attempt, max_attempts
            ));

            match self
                .api
                .describe_control_plane(session, cluster_name)
                .await
            {
                Ok(Some(status)) if status.is_active() => return Ok(status),
                Ok(Some(status)) if status.is_failed() => {
                    return Err(StepError::fatal(
                        Self::NAME,
                        format!("control plane entered {} state", status.status),
                    )
                    .with_resource(cluster_name));
                }
                Ok(Some(status)) => {
                    debug!(cluster = %cluster_name, status = %status.status, attempt, "Control plane not ready");
                    last_status = status.status;
                }
                // Creation may not be visible yet; the attempt is still
                // consumed.
                Ok(None) => {
                    debug!(cluster = %cluster_name, attempt, "Control plane not visible yet");
                }
                Err(err) if err.kind == ErrorKind::Transient => {
                    debug!(cluster = %cluster_name, error = %err, attempt, "Status query failed");
                }
                Err(err) => return Err(err.for_step(Self::NAME)),
            }

            if attempt < max_attempts {
                self.sleeper.sleep(self.wait.poll_interval).await;
            }
        }

        Err(StepError::timed_out(
            Self::NAME,
            format!(
                "control plane {} still {} after {:?}",
                cluster_name, last_status, self.wait.max_wait
            ),
        )
        .with_resource(cluster_name))
    }
}

#[async_trait]
impl Activity for CreateControlPlane {
    const NAME: &'static str = "CreateControlPlane";
    type Input = CreateControlPlaneInput;
    type Output = CreateControlPlaneOutput;

    async fn execute(&self, ctx: &ActivityContext, input: Self::Input) -> Result<Self::Output> {
        ctx.check_cancelled(Self::NAME)?;
        let session = self
            .sessions
            .resolve(&input.secret_ref, &input.region)
            .await
            .map_err(|e| e.for_step(Self::NAME))?;

        let mut created = true;
        match self
            .api
            .describe_control_plane(&session, &input.cluster_name)
            .await
            .map_err(|e| e.for_step(Self::NAME))?
        {
            Some(status) if status.is_active() => {
                info!(cluster = %input.cluster_name, "Control plane already active");
                return Ok(CreateControlPlaneOutput {
                    endpoint: status.endpoint.unwrap_or_default(),
                    certificate_authority: status.certificate_authority,
                    created: false,
                });
            }
            Some(status) if status.is_failed() => {
                return Err(StepError::fatal(
                    Self::NAME,
                    format!("existing control plane is {}", status.status),
                )
                .with_resource(&input.cluster_name));
            }
            Some(_) => {
                // A previous attempt started creation; just wait for it.
                info!(cluster = %input.cluster_name, "Control plane creation already in progress");
                created = false;
            }
            None => {
                let spec = ControlPlaneSpec {
                    cluster_name: input.cluster_name.clone(),
                    version: input.version.clone(),
                    role_arn: input.cluster_role_arn.clone(),
                    subnet_ids: input.subnet_ids.clone(),
                    security_group_id: input.security_group_id.clone(),
                    endpoint_private_access: input.endpoint_access.private,
                    endpoint_public_access: input.endpoint_access.public,
                };
                match self.api.create_control_plane(&session, &spec).await {
                    Ok(()) => info!(cluster = %input.cluster_name, "Control plane creation requested"),
                    Err(err) if err.kind == ErrorKind::AlreadySatisfied => created = false,
                    Err(err) => {
                        return Err(err.for_step(Self::NAME).with_resource(&input.cluster_name));
                    }
                }
            }
        }

        let status = self
            .wait_until_active(ctx, &session, &input.cluster_name)
            .await?;

        let endpoint = status.endpoint.ok_or_else(|| {
            StepError::fatal(Self::NAME, "active control plane reports no endpoint")
                .with_resource(&input.cluster_name)
        })?;

        info!(cluster = %input.cluster_name, endpoint = %endpoint, "Control plane active");
        Ok(CreateControlPlaneOutput {
            endpoint,
            certificate_authority: status.certificate_authority,
            created,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activities::testutil::{FakeCloud, session_factory};
    use crate::poller::Sleeper;
    use std::time::Duration;

    struct InstantSleeper;

    #[async_trait]
    impl Sleeper for InstantSleeper {
        async fn sleep(&self, _duration: Duration) {}
    }

    fn activity(cloud: Arc<FakeCloud>) -> CreateControlPlane {
        CreateControlPlane::new(
            session_factory(),
            cloud,
            WaitPolicy::new(Duration::from_secs(5), Duration::from_secs(60)),
            Arc::new(InstantSleeper),
        )
    }

    fn input() -> CreateControlPlaneInput {
        CreateControlPlaneInput {
            cluster_name: "demo".to_string(),
            region: "eu-west-1".to_string(),
            secret_ref: SecretRef::new("secret-1"),
            version: "1.31".to_string(),
            cluster_role_arn: "arn:aws:iam::1:role/cluster".to_string(),
            subnet_ids: vec!["subnet-a".to_string(), "subnet-b".to_string()],
            security_group_id: "sg-default".to_string(),
            endpoint_access: EndpointAccess::default(),
        }
    }

    #[tokio::test]
    async fn test_creates_and_waits_for_active() {
        let cloud = FakeCloud::new();
        let out = activity(cloud.clone())
            .execute(&ActivityContext::detached("run-1"), input())
            .await
            .unwrap();

        assert!(out.created);
        assert!(out.endpoint.contains("demo"));
        assert!(cloud.lock().control_planes.contains_key("demo"));
    }

    #[tokio::test]
    async fn test_active_plane_short_circuits() {
        let cloud = FakeCloud::new();
        // First run creates and activates
        activity(cloud.clone())
            .execute(&ActivityContext::detached("run-1"), input())
            .await
            .unwrap();

        let replay = activity(cloud)
            .execute(&ActivityContext::detached("run-1"), input())
            .await
            .unwrap();

        assert!(!replay.created, "replay found the active control plane");
    }
}
