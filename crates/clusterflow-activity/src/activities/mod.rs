//! The ten provisioning activities
//!
//! Grouped by the resource class each one creates or reads. Every
//! activity resolves its own session, derives its resource names from
//! the cluster identity, and checks for an existing resource before
//! creating one.

pub mod bootstrap;
pub mod control_plane;
pub mod iam;
pub mod network;
pub mod node_group;
pub mod ssh_key;
pub mod subnet;

pub use bootstrap::BootstrapCluster;
pub use control_plane::CreateControlPlane;
pub use iam::{CreateClusterUserAccessKey, CreateIamRoles};
pub use network::{CreateNetwork, DescribeVpcConfig};
pub use node_group::CreateNodeGroup;
pub use ssh_key::UploadSshKey;
pub use subnet::{CreateSubnet, DescribeSubnets};

use clusterflow_cloud::StackOutputs;
use clusterflow_core::{Result, StepError};

/// Read a named stack output, failing Fatal when the template omitted it
pub(crate) fn required_output(step: &str, stack: &StackOutputs, key: &str) -> Result<String> {
    stack
        .output(key)
        .map(str::to_string)
        .ok_or_else(|| {
            StepError::fatal(
                step,
                format!("stack {} declares no {} output", stack.stack_id, key),
            )
        })
}

#[cfg(test)]
pub(crate) mod testutil;
