//! Provisioning request model
//!
//! The immutable input describing the desired cluster. Created once by
//! the caller and read-only through the life of a workflow run.

use serde::{Deserialize, Serialize};

/// Reference to a stored secret holding provider credentials
///
/// Only the reference travels through workflow inputs; the secret
/// material itself is resolved per activity invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretRef(pub String);

impl SecretRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

/// Desired worker capacity for one node pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodePoolSpec {
    pub name: String,
    pub instance_type: String,
    pub min_count: u32,
    pub max_count: u32,
    pub desired_count: u32,
    /// Machine image for pool nodes; provider default when empty
    #[serde(default)]
    pub image: Option<String>,
}

/// Control-plane endpoint reachability
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EndpointAccess {
    pub private: bool,
    pub public: bool,
}

impl Default for EndpointAccess {
    fn default() -> Self {
        Self {
            private: false,
            public: true,
        }
    }
}

/// Immutable description of the desired cluster
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningRequest {
    /// Owning organization identifier
    pub organization_id: u64,
    /// Cluster name; feeds every deterministic resource name
    pub cluster_name: String,
    pub region: String,
    /// CIDR block for the cluster network
    pub network_cidr: String,
    pub node_pools: Vec<NodePoolSpec>,
    /// Public key material uploaded for node access
    pub ssh_public_key: String,
    /// Reference to the provider credential secret
    pub secret_ref: SecretRef,
    #[serde(default)]
    pub endpoint_access: EndpointAccess,
    /// Kubernetes version for the control plane
    pub version: String,
}

impl ProvisioningRequest {
    /// Total desired node count across all pools
    pub fn desired_nodes(&self) -> u32 {
        self.node_pools.iter().map(|p| p.desired_count).sum()
    }

    /// Basic structural validation before a run is admitted
    pub fn validate(&self) -> Result<(), String> {
        if self.cluster_name.is_empty() {
            return Err("cluster name must not be empty".to_string());
        }
        if self.node_pools.is_empty() {
            return Err("at least one node pool is required".to_string());
        }
        for pool in &self.node_pools {
            if pool.min_count > pool.max_count {
                return Err(format!(
                    "node pool {}: min count {} exceeds max count {}",
                    pool.name, pool.min_count, pool.max_count
                ));
            }
            if pool.desired_count < pool.min_count || pool.desired_count > pool.max_count {
                return Err(format!(
                    "node pool {}: desired count {} outside [{}, {}]",
                    pool.name, pool.desired_count, pool.min_count, pool.max_count
                ));
            }
        }
        Ok(())
    }
}
