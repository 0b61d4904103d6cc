//! Cluster bootstrap
//!
//! Applies the node-authorization config map so worker nodes and the
//! cluster user can join. The manifest is applied declaratively, so a
//! replay after a crash re-applies the same objects harmlessly.

use crate::activity::Activity;
use crate::context::ActivityContext;
use async_trait::async_trait;
use clusterflow_cloud::{CloudApi, SessionFactory};
use clusterflow_core::{Result, SecretRef, StepError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tera::{Context, Tera};
use tracing::info;

/// aws-auth style mapping of the node role and cluster user.
/// `{{EC2PrivateDNSName}}` is substituted node-side and must survive
/// rendering verbatim.
const AUTH_MANIFEST: &str = r#"apiVersion: v1
kind: ConfigMap
metadata:
  name: aws-auth
  namespace: kube-system
data:
  mapRoles: |
    - rolearn: {{ node_role_arn }}
      username: system:node:{% raw %}{{EC2PrivateDNSName}}{% endraw %}
      groups:
        - system:bootstrappers
        - system:nodes
  mapUsers: |
    - userarn: {{ user_arn }}
      username: {{ user_name }}
      groups:
        - system:masters
"#;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapClusterInput {
    pub cluster_name: String,
    pub region: String,
    pub secret_ref: SecretRef,
    pub node_instance_role_arn: String,
    pub user_arn: String,
    pub user_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapClusterOutput {
    pub applied: bool,
}

/// Applies the bootstrap manifest to the new cluster
pub struct BootstrapCluster {
    sessions: Arc<SessionFactory>,
    api: Arc<dyn CloudApi>,
}

impl BootstrapCluster {
    pub fn new(sessions: Arc<SessionFactory>, api: Arc<dyn CloudApi>) -> Self {
        Self { sessions, api }
    }

    fn render_manifest(input: &BootstrapClusterInput) -> Result<String> {
        let mut context = Context::new();
        context.insert("node_role_arn", &input.node_instance_role_arn);
        context.insert("user_arn", &input.user_arn);
        context.insert("user_name", &input.user_name);

        Tera::one_off(AUTH_MANIFEST, &context, false).map_err(|e| {
            StepError::fatal(Self::NAME, format!("failed to render bootstrap manifest: {}", e))
        })
    }
}

#[async_trait]
impl Activity for BootstrapCluster {
    const NAME: &'static str = "BootstrapCluster";
    type Input = BootstrapClusterInput;
    type Output = BootstrapClusterOutput;

    async fn execute(&self, ctx: &ActivityContext, input: Self::Input) -> Result<Self::Output> {
        ctx.check_cancelled(Self::NAME)?;
        let session = self
            .sessions
            .resolve(&input.secret_ref, &input.region)
            .await
            .map_err(|e| e.for_step(Self::NAME))?;

        let manifest = Self::render_manifest(&input)?;

        self.api
            .apply_manifest(&session, &input.cluster_name, &manifest)
            .await
            .map_err(|e| e.for_step(Self::NAME).with_resource(&input.cluster_name))?;

        info!(cluster = %input.cluster_name, "Bootstrap manifest applied");
        Ok(BootstrapClusterOutput { applied: true })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activities::testutil::{FakeCloud, session_factory};

    fn input() -> BootstrapClusterInput {
        BootstrapClusterInput {
            cluster_name: "demo".to_string(),
            region: "eu-west-1".to_string(),
            secret_ref: SecretRef::new("secret-1"),
            node_instance_role_arn: "arn:aws:iam::1:role/node".to_string(),
            user_arn: "arn:aws:iam::1:user/clusterflow-demo-user".to_string(),
            user_name: "clusterflow-demo-user".to_string(),
        }
    }

    #[tokio::test]
    async fn test_manifest_renders_mappings() {
        let manifest = BootstrapCluster::render_manifest(&input()).unwrap();
        assert!(manifest.contains("rolearn: arn:aws:iam::1:role/node"));
        assert!(manifest.contains("userarn: arn:aws:iam::1:user/clusterflow-demo-user"));
        // Node-side placeholder must not be consumed by rendering
        assert!(manifest.contains("{{EC2PrivateDNSName}}"));
    }

    #[tokio::test]
    async fn test_reapply_is_safe() {
        let cloud = FakeCloud::new();
        let activity = BootstrapCluster::new(session_factory(), cloud.clone());
        let ctx = ActivityContext::detached("run-1");

        activity.execute(&ctx, input()).await.unwrap();
        activity.execute(&ctx, input()).await.unwrap();

        let state = cloud.lock();
        assert_eq!(state.applied_manifests.len(), 2);
        assert_eq!(state.applied_manifests[0], state.applied_manifests[1]);
    }
}
