//! SSH key upload

use crate::activity::Activity;
use crate::context::ActivityContext;
use async_trait::async_trait;
use clusterflow_cloud::{CloudApi, SessionFactory};
use clusterflow_core::{ResourceRole, Result, SecretRef, resource_name};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSshKeyInput {
    pub cluster_name: String,
    pub region: String,
    pub secret_ref: SecretRef,
    pub public_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSshKeyOutput {
    pub key_name: String,
    pub fingerprint: String,
    /// True when this invocation imported (or re-imported) the key
    pub created: bool,
}

/// Imports the node access key under a deterministic name
///
/// No-ops when the stored material matches, replaces it when it
/// differs.
pub struct UploadSshKey {
    sessions: Arc<SessionFactory>,
    api: Arc<dyn CloudApi>,
}

impl UploadSshKey {
    pub fn new(sessions: Arc<SessionFactory>, api: Arc<dyn CloudApi>) -> Self {
        Self { sessions, api }
    }
}

#[async_trait]
impl Activity for UploadSshKey {
    const NAME: &'static str = "UploadSshKey";
    type Input = UploadSshKeyInput;
    type Output = UploadSshKeyOutput;

    async fn execute(&self, ctx: &ActivityContext, input: Self::Input) -> Result<Self::Output> {
        ctx.check_cancelled(Self::NAME)?;
        let session = self
            .sessions
            .resolve(&input.secret_ref, &input.region)
            .await
            .map_err(|e| e.for_step(Self::NAME))?;

        let key_name = resource_name(&input.cluster_name, ResourceRole::SshKey, None);

        if let Some(existing) = self
            .api
            .describe_key_pair(&session, &key_name)
            .await
            .map_err(|e| e.for_step(Self::NAME))?
        {
            let identical = existing
                .public_key
                .as_deref()
                .is_some_and(|stored| stored.trim() == input.public_key.trim());

            if identical {
                info!(key = %key_name, "SSH key unchanged, skipping upload");
                return Ok(UploadSshKeyOutput {
                    key_name: existing.name,
                    fingerprint: existing.fingerprint,
                    created: false,
                });
            }

            // Material differs (or cannot be compared): replace it so the
            // provider-side key always matches the request.
            info!(key = %key_name, "SSH key differs, replacing");
            self.api
                .delete_key_pair(&session, &key_name)
                .await
                .map_err(|e| e.for_step(Self::NAME).with_resource(&key_name))?;
        }

        let imported = self
            .api
            .import_key_pair(&session, &key_name, &input.public_key)
            .await
            .map_err(|e| e.for_step(Self::NAME).with_resource(&key_name))?;

        info!(key = %key_name, fingerprint = %imported.fingerprint, "SSH key uploaded");
        Ok(UploadSshKeyOutput {
            key_name: imported.name,
            fingerprint: imported.fingerprint,
            created: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activities::testutil::{FakeCloud, session_factory};

    fn input(key: &str) -> UploadSshKeyInput {
        UploadSshKeyInput {
            cluster_name: "demo".to_string(),
            region: "eu-west-1".to_string(),
            secret_ref: SecretRef::new("secret-1"),
            public_key: key.to_string(),
        }
    }

    #[tokio::test]
    async fn test_identical_key_is_noop() {
        let cloud = FakeCloud::new();
        let activity = UploadSshKey::new(session_factory(), cloud.clone());
        let ctx = ActivityContext::detached("run-1");

        let first = activity.execute(&ctx, input("ssh-rsa AAAA")).await.unwrap();
        let second = activity.execute(&ctx, input("ssh-rsa AAAA")).await.unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.fingerprint, second.fingerprint);
    }

    #[tokio::test]
    async fn test_differing_key_is_replaced() {
        let cloud = FakeCloud::new();
        let activity = UploadSshKey::new(session_factory(), cloud.clone());
        let ctx = ActivityContext::detached("run-1");

        activity.execute(&ctx, input("ssh-rsa AAAA")).await.unwrap();
        let replaced = activity
            .execute(&ctx, input("ssh-rsa BBBBBB"))
            .await
            .unwrap();

        assert!(replaced.created);
        let state = cloud.lock();
        let stored = state.key_pairs.get("clusterflow-demo-ssh").unwrap();
        assert_eq!(stored.public_key.as_deref(), Some("ssh-rsa BBBBBB"));
    }
}
