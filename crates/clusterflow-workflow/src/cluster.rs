//! Cluster workflow
//!
//! The end-to-end provisioning program: validate the request, build the
//! substrate via the infrastructure workflow, then the cluster-specific
//! pieces. The SSH key upload and the capacity groups are independent
//! (the key name is deterministic, so the group stacks reference it
//! without waiting for the upload), so they run concurrently; cluster
//! bootstrap is held back until both have completed.

use crate::context::{WorkflowContext, call_activity};
use crate::infrastructure::create_infrastructure;
use clusterflow_activity::activities::bootstrap::{BootstrapCluster, BootstrapClusterInput};
use clusterflow_activity::activities::iam::{
    CreateClusterUserAccessKey, CreateClusterUserAccessKeyInput,
};
use clusterflow_activity::activities::node_group::{CreateNodeGroup, CreateNodeGroupInput};
use clusterflow_activity::activities::ssh_key::{UploadSshKey, UploadSshKeyInput};
use clusterflow_core::{
    ProvisioningRequest, ResourceRole, Result, StepError, resource_name,
};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Registered name of the cluster workflow
pub const CLUSTER_WORKFLOW: &str = "CreateClusterWorkflow";

/// Terminal output of a successful cluster run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterOutput {
    pub endpoint: String,
    pub certificate_authority: Option<String>,
    /// Capacity group names, one per requested node pool
    pub node_groups: Vec<String>,
    pub ssh_key_name: String,
    pub user_name: String,
}

/// Provision a complete cluster
pub async fn create_cluster(
    ctx: &dyn WorkflowContext,
    request: &ProvisioningRequest,
) -> Result<ClusterOutput> {
    request
        .validate()
        .map_err(|detail| StepError::fatal(CLUSTER_WORKFLOW, detail))?;

    info!(
        run = %ctx.run_id(),
        cluster = %request.cluster_name,
        pools = request.node_pools.len(),
        "Cluster workflow started"
    );

    let infra = create_infrastructure(ctx, request).await?;

    // The group stacks reference the key by its deterministic name, not
    // by an upload output, which is what makes the branches independent.
    let ssh_key_name = resource_name(&request.cluster_name, ResourceRole::SshKey, None);

    let upload = call_activity::<UploadSshKey>(
        ctx,
        UploadSshKeyInput {
            cluster_name: request.cluster_name.clone(),
            region: request.region.clone(),
            secret_ref: request.secret_ref.clone(),
            public_key: request.ssh_public_key.clone(),
        },
    );

    let groups = async {
        let mut names = Vec::with_capacity(request.node_pools.len());
        for pool in &request.node_pools {
            let group = call_activity::<CreateNodeGroup>(
                ctx,
                CreateNodeGroupInput {
                    cluster_name: request.cluster_name.clone(),
                    region: request.region.clone(),
                    secret_ref: request.secret_ref.clone(),
                    pool: pool.clone(),
                    subnet_ids: infra.subnet_ids.clone(),
                    node_instance_role_arn: infra.node_instance_role_arn.clone(),
                    ssh_key_name: ssh_key_name.clone(),
                },
            )
            .await?;
            names.push(group.group_name);
        }
        Ok::<_, StepError>(names)
    };

    let (upload, node_groups) = futures_util::future::join(upload, groups).await;
    let upload = upload?;
    let node_groups = node_groups?;

    let credentials = call_activity::<CreateClusterUserAccessKey>(
        ctx,
        CreateClusterUserAccessKeyInput {
            cluster_name: request.cluster_name.clone(),
            region: request.region.clone(),
            secret_ref: request.secret_ref.clone(),
        },
    )
    .await?;

    call_activity::<BootstrapCluster>(
        ctx,
        BootstrapClusterInput {
            cluster_name: request.cluster_name.clone(),
            region: request.region.clone(),
            secret_ref: request.secret_ref.clone(),
            node_instance_role_arn: infra.node_instance_role_arn.clone(),
            user_arn: credentials.user_arn.clone(),
            user_name: credentials.user_name.clone(),
        },
    )
    .await?;

    info!(
        cluster = %request.cluster_name,
        endpoint = %infra.endpoint,
        groups = node_groups.len(),
        "Cluster workflow completed"
    );

    Ok(ClusterOutput {
        endpoint: infra.endpoint,
        certificate_authority: infra.certificate_authority,
        node_groups,
        ssh_key_name: upload.key_name,
        user_name: credentials.user_name,
    })
}
