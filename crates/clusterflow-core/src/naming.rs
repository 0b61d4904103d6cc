//! Deterministic resource naming
//!
//! Every cloud resource an activity creates is named from the cluster
//! name plus the resource's role. The name is the idempotency key: it is
//! stable across retries and replays, so a re-invoked activity can find
//! the resource it (or a prior attempt) already created instead of
//! creating a duplicate.

use serde::{Deserialize, Serialize};

/// Role a resource plays within one provisioned cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceRole {
    Network,
    Subnet,
    IamRoles,
    NodePool,
    SshKey,
    ClusterUser,
}

impl ResourceRole {
    /// Short slug used inside resource names
    pub fn slug(&self) -> &'static str {
        match self {
            ResourceRole::Network => "network",
            ResourceRole::Subnet => "subnet",
            ResourceRole::IamRoles => "iam",
            ResourceRole::NodePool => "pool",
            ResourceRole::SshKey => "ssh",
            ResourceRole::ClusterUser => "user",
        }
    }
}

impl std::fmt::Display for ResourceRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.slug())
    }
}

/// Deterministic name for a cluster resource
///
/// `clusterflow-<cluster>-<role>[-<suffix>]`. The suffix distinguishes
/// resources of the same role (one stack per subnet, one capacity group
/// per node pool).
pub fn resource_name(cluster: &str, role: ResourceRole, suffix: Option<&str>) -> String {
    match suffix {
        Some(suffix) => format!("clusterflow-{}-{}-{}", cluster, role.slug(), suffix),
        None => format!("clusterflow-{}-{}", cluster, role.slug()),
    }
}
