//! Identity activities: cluster/node roles and the in-cluster user

use crate::activities::required_output;
use crate::activity::Activity;
use crate::context::ActivityContext;
use async_trait::async_trait;
use clusterflow_cloud::{CloudApi, SessionFactory};
use clusterflow_core::{ErrorKind, ResourceRole, Result, SecretRef, StepError, resource_name};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateIamRolesInput {
    pub cluster_name: String,
    pub region: String,
    pub secret_ref: SecretRef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateIamRolesOutput {
    pub stack_id: String,
    pub cluster_role_arn: String,
    pub node_instance_role_arn: String,
    pub created: bool,
}

/// Creates the identity role stack; idempotent by deterministic stack
/// name
pub struct CreateIamRoles {
    sessions: Arc<SessionFactory>,
    api: Arc<dyn CloudApi>,
    template: String,
}

impl CreateIamRoles {
    pub fn new(sessions: Arc<SessionFactory>, api: Arc<dyn CloudApi>, template: String) -> Self {
        Self {
            sessions,
            api,
            template,
        }
    }

    fn from_stack(stack: clusterflow_cloud::StackOutputs, created: bool) -> Result<CreateIamRolesOutput> {
        Ok(CreateIamRolesOutput {
            cluster_role_arn: required_output(Self::NAME, &stack, "ClusterRoleArn")?,
            node_instance_role_arn: required_output(Self::NAME, &stack, "NodeInstanceRoleArn")?,
            stack_id: stack.stack_id,
            created,
        })
    }
}

#[async_trait]
impl Activity for CreateIamRoles {
    const NAME: &'static str = "CreateIamRoles";
    type Input = CreateIamRolesInput;
    type Output = CreateIamRolesOutput;

    async fn execute(&self, ctx: &ActivityContext, input: Self::Input) -> Result<Self::Output> {
        ctx.check_cancelled(Self::NAME)?;
        let session = self
            .sessions
            .resolve(&input.secret_ref, &input.region)
            .await
            .map_err(|e| e.for_step(Self::NAME))?;

        let stack_name = resource_name(&input.cluster_name, ResourceRole::IamRoles, None);

        if let Some(existing) = self
            .api
            .describe_stack(&session, &stack_name)
            .await
            .map_err(|e| e.for_step(Self::NAME))?
        {
            info!(stack = %stack_name, "IAM role stack already exists, reusing");
            return Self::from_stack(existing, false);
        }

        let parameters = vec![("ClusterName".to_string(), input.cluster_name.clone())];
        let stack = match self
            .api
            .create_stack(&session, &stack_name, &self.template, &parameters)
            .await
        {
            Ok(stack) => stack,
            Err(err) if err.kind == ErrorKind::AlreadySatisfied => self
                .api
                .describe_stack(&session, &stack_name)
                .await
                .map_err(|e| e.for_step(Self::NAME))?
                .ok_or_else(|| {
                    StepError::fatal(Self::NAME, "stack reported as existing but not found")
                        .with_resource(&stack_name)
                })?,
            Err(err) => return Err(err.for_step(Self::NAME).with_resource(&stack_name)),
        };

        info!(stack = %stack_name, "IAM role stack created");
        Self::from_stack(stack, true)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateClusterUserAccessKeyInput {
    pub cluster_name: String,
    pub region: String,
    pub secret_ref: SecretRef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateClusterUserAccessKeyOutput {
    pub user_name: String,
    pub user_arn: String,
    pub access_key_id: String,
    /// Only available when the key was minted by this invocation; the
    /// provider never returns secret material for existing keys
    pub secret_access_key: Option<String>,
    pub created: bool,
}

/// Creates the in-cluster IAM user and its access key
///
/// Idempotent by deterministic user name; an existing access key is
/// reused rather than rotated.
pub struct CreateClusterUserAccessKey {
    sessions: Arc<SessionFactory>,
    api: Arc<dyn CloudApi>,
}

impl CreateClusterUserAccessKey {
    pub fn new(sessions: Arc<SessionFactory>, api: Arc<dyn CloudApi>) -> Self {
        Self { sessions, api }
    }
}

#[async_trait]
impl Activity for CreateClusterUserAccessKey {
    const NAME: &'static str = "CreateClusterUserAccessKey";
    type Input = CreateClusterUserAccessKeyInput;
    type Output = CreateClusterUserAccessKeyOutput;

    async fn execute(&self, ctx: &ActivityContext, input: Self::Input) -> Result<Self::Output> {
        ctx.check_cancelled(Self::NAME)?;
        let session = self
            .sessions
            .resolve(&input.secret_ref, &input.region)
            .await
            .map_err(|e| e.for_step(Self::NAME))?;

        let user_name = resource_name(&input.cluster_name, ResourceRole::ClusterUser, None);
        let user_arn = self
            .api
            .ensure_user(&session, &user_name)
            .await
            .map_err(|e| e.for_step(Self::NAME).with_resource(&user_name))?;

        let existing = self
            .api
            .list_access_keys(&session, &user_name)
            .await
            .map_err(|e| e.for_step(Self::NAME))?;

        if let Some(key_id) = existing.into_iter().next() {
            warn!(
                user = %user_name,
                key = %key_id,
                "Access key already exists; reusing without secret material"
            );
            return Ok(CreateClusterUserAccessKeyOutput {
                user_name,
                user_arn,
                access_key_id: key_id,
                secret_access_key: None,
                created: false,
            });
        }

        let key = self
            .api
            .create_access_key(&session, &user_name)
            .await
            .map_err(|e| e.for_step(Self::NAME).with_resource(&user_name))?;

        info!(user = %user_name, "Cluster user access key created");
        Ok(CreateClusterUserAccessKeyOutput {
            user_name,
            user_arn,
            access_key_id: key.access_key_id,
            secret_access_key: Some(key.secret_access_key),
            created: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activities::testutil::{FakeCloud, FakeState, session_factory};

    #[tokio::test]
    async fn test_iam_roles_replay_is_idempotent() {
        let mut state = FakeState::default();
        state.next_stack_outputs.insert(
            "ClusterRoleArn".to_string(),
            "arn:aws:iam::1:role/cluster".to_string(),
        );
        state.next_stack_outputs.insert(
            "NodeInstanceRoleArn".to_string(),
            "arn:aws:iam::1:role/node".to_string(),
        );
        let cloud = FakeCloud::with_state(state);

        let activity = CreateIamRoles::new(session_factory(), cloud.clone(), "{}".to_string());
        let ctx = ActivityContext::detached("run-1");
        let input = CreateIamRolesInput {
            cluster_name: "demo".to_string(),
            region: "eu-west-1".to_string(),
            secret_ref: SecretRef::new("secret-1"),
        };

        let first = activity.execute(&ctx, input.clone()).await.unwrap();
        let second = activity.execute(&ctx, input).await.unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.cluster_role_arn, second.cluster_role_arn);
        assert_eq!(cloud.lock().create_stack_calls, 1);
    }

    #[tokio::test]
    async fn test_access_key_reused_on_replay() {
        let cloud = FakeCloud::new();
        let activity = CreateClusterUserAccessKey::new(session_factory(), cloud.clone());
        let ctx = ActivityContext::detached("run-1");
        let input = CreateClusterUserAccessKeyInput {
            cluster_name: "demo".to_string(),
            region: "eu-west-1".to_string(),
            secret_ref: SecretRef::new("secret-1"),
        };

        let first = activity.execute(&ctx, input.clone()).await.unwrap();
        let second = activity.execute(&ctx, input).await.unwrap();

        assert!(first.created);
        assert!(first.secret_access_key.is_some());
        assert!(!second.created);
        assert_eq!(first.access_key_id, second.access_key_id);
        assert!(second.secret_access_key.is_none());
        assert_eq!(first.user_name, "clusterflow-demo-user");
    }
}
