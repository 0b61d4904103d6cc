//! In-memory fake provider for activity tests
//!
//! Backed by a mutex-held resource table so a test can invoke an
//! activity twice (simulating a replay after a crash) and observe that
//! the second invocation finds what the first created.

use async_trait::async_trait;
use clusterflow_cloud::{
    AccessKey, CloudApi, ControlPlaneSpec, ControlPlaneStatus, KeyPairInfo, SecretMaterial,
    SecretStore, Session, SessionFactory, StackOutputs, SubnetDetails, VpcConfig,
};
use clusterflow_core::{Result, SecretRef, StepError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub(crate) struct StaticSecrets;

#[async_trait]
impl SecretStore for StaticSecrets {
    async fn get_secret(&self, _secret_ref: &SecretRef) -> Result<SecretMaterial> {
        Ok(SecretMaterial {
            access_key_id: "AKIATEST".to_string(),
            secret_access_key: "test-secret".to_string(),
            session_token: None,
        })
    }
}

pub(crate) fn session_factory() -> Arc<SessionFactory> {
    Arc::new(SessionFactory::new(Arc::new(StaticSecrets)))
}

#[derive(Default)]
pub(crate) struct FakeState {
    pub stacks: HashMap<String, StackOutputs>,
    pub subnets: HashMap<String, SubnetDetails>,
    pub key_pairs: HashMap<String, KeyPairInfo>,
    pub control_planes: HashMap<String, ControlPlaneStatus>,
    pub users: HashMap<String, String>,
    pub access_keys: HashMap<String, Vec<String>>,
    pub healthy_counts: HashMap<String, u32>,
    pub applied_manifests: Vec<String>,
    pub create_stack_calls: u32,
    /// Outputs the next created stack should declare
    pub next_stack_outputs: HashMap<String, String>,
}

/// Fake provider: creates land in [`FakeState`], describes read it back
pub(crate) struct FakeCloud {
    pub state: Mutex<FakeState>,
}

impl FakeCloud {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(FakeState::default()),
        })
    }

    pub fn with_state(state: FakeState) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(state),
        })
    }

    pub fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }
}

#[async_trait]
impl CloudApi for FakeCloud {
    async fn create_stack(
        &self,
        _session: &Session,
        stack_name: &str,
        _template_body: &str,
        _parameters: &[(String, String)],
    ) -> Result<StackOutputs> {
        let mut state = self.lock();
        state.create_stack_calls += 1;
        if state.stacks.contains_key(stack_name) {
            return Err(StepError::already_satisfied(
                "create_stack",
                format!("Stack {} AlreadyExistsException", stack_name),
            ));
        }
        let outputs = StackOutputs {
            stack_id: format!("arn:stack/{}", stack_name),
            outputs: state.next_stack_outputs.clone(),
        };
        state.stacks.insert(stack_name.to_string(), outputs.clone());
        Ok(outputs)
    }

    async fn describe_stack(
        &self,
        _session: &Session,
        stack_name: &str,
    ) -> Result<Option<StackOutputs>> {
        Ok(self.lock().stacks.get(stack_name).cloned())
    }

    async fn describe_subnets(
        &self,
        _session: &Session,
        subnet_ids: &[String],
    ) -> Result<Vec<SubnetDetails>> {
        let state = self.lock();
        subnet_ids
            .iter()
            .map(|id| {
                state.subnets.get(id).cloned().ok_or_else(|| {
                    StepError::fatal("describe_subnets", format!("subnet {} not found", id))
                })
            })
            .collect()
    }

    async fn import_key_pair(
        &self,
        _session: &Session,
        name: &str,
        public_key: &str,
    ) -> Result<KeyPairInfo> {
        let info = KeyPairInfo {
            name: name.to_string(),
            fingerprint: format!("fp:{}", public_key.len()),
            public_key: Some(public_key.to_string()),
        };
        self.lock().key_pairs.insert(name.to_string(), info.clone());
        Ok(info)
    }

    async fn describe_key_pair(
        &self,
        _session: &Session,
        name: &str,
    ) -> Result<Option<KeyPairInfo>> {
        Ok(self.lock().key_pairs.get(name).cloned())
    }

    async fn delete_key_pair(&self, _session: &Session, name: &str) -> Result<()> {
        self.lock().key_pairs.remove(name);
        Ok(())
    }

    async fn describe_vpc_config(&self, _session: &Session, vpc_id: &str) -> Result<VpcConfig> {
        Ok(VpcConfig {
            vpc_id: vpc_id.to_string(),
            security_group_id: "sg-default".to_string(),
            cidr: "10.0.0.0/16".to_string(),
        })
    }

    async fn create_control_plane(
        &self,
        _session: &Session,
        spec: &ControlPlaneSpec,
    ) -> Result<()> {
        let mut state = self.lock();
        if state.control_planes.contains_key(&spec.cluster_name) {
            return Err(StepError::already_satisfied(
                "create_control_plane",
                "ResourceInUseException",
            ));
        }
        state.control_planes.insert(
            spec.cluster_name.clone(),
            ControlPlaneStatus {
                status: "CREATING".to_string(),
                endpoint: None,
                certificate_authority: None,
            },
        );
        Ok(())
    }

    async fn describe_control_plane(
        &self,
        _session: &Session,
        cluster_name: &str,
    ) -> Result<Option<ControlPlaneStatus>> {
        // A CREATING plane flips to ACTIVE on the next observation
        let mut state = self.lock();
        let Some(status) = state.control_planes.get_mut(cluster_name) else {
            return Ok(None);
        };
        let snapshot = status.clone();
        if status.status == "CREATING" {
            status.status = "ACTIVE".to_string();
            status.endpoint = Some(format!("https://{}.example", cluster_name));
            status.certificate_authority = Some("Q0FEQVRB".to_string());
        }
        Ok(Some(snapshot))
    }

    async fn healthy_node_count(&self, _session: &Session, group_name: &str) -> Result<u32> {
        Ok(self
            .lock()
            .healthy_counts
            .get(group_name)
            .copied()
            .unwrap_or(0))
    }

    async fn ensure_user(&self, _session: &Session, user_name: &str) -> Result<String> {
        let arn = format!("arn:aws:iam::123456789012:user/{}", user_name);
        self.lock()
            .users
            .entry(user_name.to_string())
            .or_insert_with(|| arn.clone());
        Ok(arn)
    }

    async fn list_access_keys(&self, _session: &Session, user_name: &str) -> Result<Vec<String>> {
        Ok(self
            .lock()
            .access_keys
            .get(user_name)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_access_key(&self, _session: &Session, user_name: &str) -> Result<AccessKey> {
        let mut state = self.lock();
        let keys = state.access_keys.entry(user_name.to_string()).or_default();
        let key_id = format!("AKIA{}{}", user_name.len(), keys.len());
        keys.push(key_id.clone());
        Ok(AccessKey {
            access_key_id: key_id,
            secret_access_key: "generated-secret".to_string(),
        })
    }

    async fn apply_manifest(
        &self,
        _session: &Session,
        _cluster_name: &str,
        manifest: &str,
    ) -> Result<()> {
        self.lock().applied_manifests.push(manifest.to_string());
        Ok(())
    }
}
