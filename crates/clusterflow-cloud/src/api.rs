//! Provider API boundary
//!
//! Every resource call an activity makes goes through [`CloudApi`].
//! Calls are keyed by deterministic names derived from the cluster
//! identity, so a retried or replayed activity can describe what an
//! earlier attempt created instead of creating it again.

use crate::session::Session;
use async_trait::async_trait;
use clusterflow_core::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Identifiers and outputs of a created resource stack
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackOutputs {
    pub stack_id: String,
    /// Named outputs declared by the template (e.g. `VpcId`, `SubnetIds`)
    pub outputs: HashMap<String, String>,
}

impl StackOutputs {
    pub fn output(&self, key: &str) -> Option<&str> {
        self.outputs.get(key).map(String::as_str)
    }
}

/// Details of one existing subnet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubnetDetails {
    pub subnet_id: String,
    pub availability_zone: String,
    pub route_table_id: Option<String>,
    pub cidr: String,
}

/// Imported key pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyPairInfo {
    pub name: String,
    pub fingerprint: String,
    /// Stored public key material, when the provider returns it
    pub public_key: Option<String>,
}

/// VPC-level configuration needed by control-plane creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VpcConfig {
    pub vpc_id: String,
    pub security_group_id: String,
    pub cidr: String,
}

/// Request to create a managed control plane
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlPlaneSpec {
    pub cluster_name: String,
    pub version: String,
    pub role_arn: String,
    pub subnet_ids: Vec<String>,
    pub security_group_id: String,
    pub endpoint_private_access: bool,
    pub endpoint_public_access: bool,
}

/// Observed control-plane state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlPlaneStatus {
    /// Provider lifecycle status (`CREATING`, `ACTIVE`, `FAILED`, ...)
    pub status: String,
    pub endpoint: Option<String>,
    pub certificate_authority: Option<String>,
}

impl ControlPlaneStatus {
    pub fn is_active(&self) -> bool {
        self.status == "ACTIVE"
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status.as_str(), "FAILED" | "DELETING")
    }
}

/// Provider access key for in-cluster use
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessKey {
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// Cloud provider resource operations
///
/// Implementations classify every failure into the core taxonomy before
/// returning; callers never see provider-specific error vocabulary.
#[async_trait]
pub trait CloudApi: Send + Sync {
    /// Create a resource stack from a declarative template and wait for
    /// it to complete. `AlreadyExists` responses classify as
    /// AlreadySatisfied so callers can fall back to [`Self::describe_stack`].
    async fn create_stack(
        &self,
        session: &Session,
        stack_name: &str,
        template_body: &str,
        parameters: &[(String, String)],
    ) -> Result<StackOutputs>;

    /// Describe an existing stack; `None` when absent
    async fn describe_stack(
        &self,
        session: &Session,
        stack_name: &str,
    ) -> Result<Option<StackOutputs>>;

    /// Pure read of subnet details; safe to retry unconditionally
    async fn describe_subnets(
        &self,
        session: &Session,
        subnet_ids: &[String],
    ) -> Result<Vec<SubnetDetails>>;

    /// Import a public key under a deterministic name
    async fn import_key_pair(
        &self,
        session: &Session,
        name: &str,
        public_key: &str,
    ) -> Result<KeyPairInfo>;

    /// Describe an imported key pair; `None` when absent
    async fn describe_key_pair(&self, session: &Session, name: &str)
        -> Result<Option<KeyPairInfo>>;

    /// Remove a key pair (used when re-importing differing material)
    async fn delete_key_pair(&self, session: &Session, name: &str) -> Result<()>;

    /// Read VPC-level configuration for control-plane creation
    async fn describe_vpc_config(&self, session: &Session, vpc_id: &str) -> Result<VpcConfig>;

    /// Request control-plane creation; completion is asynchronous and
    /// observed via [`Self::describe_control_plane`]
    async fn create_control_plane(&self, session: &Session, spec: &ControlPlaneSpec)
        -> Result<()>;

    /// Observe control-plane state; `None` when the cluster is unknown
    async fn describe_control_plane(
        &self,
        session: &Session,
        cluster_name: &str,
    ) -> Result<Option<ControlPlaneStatus>>;

    /// Count healthy, in-service nodes of a capacity group
    async fn healthy_node_count(&self, session: &Session, group_name: &str) -> Result<u32>;

    /// Ensure an IAM user exists under a deterministic name; returns the
    /// user's ARN whether it was created or already present
    async fn ensure_user(&self, session: &Session, user_name: &str) -> Result<String>;

    /// List existing access key ids for a user
    async fn list_access_keys(&self, session: &Session, user_name: &str) -> Result<Vec<String>>;

    /// Mint a new access key for a user
    async fn create_access_key(&self, session: &Session, user_name: &str) -> Result<AccessKey>;

    /// Declaratively apply a bootstrap manifest to the cluster; safe to
    /// re-apply
    async fn apply_manifest(
        &self,
        session: &Session,
        cluster_name: &str,
        manifest: &str,
    ) -> Result<()>;
}
