//! Infrastructure workflow
//!
//! Builds the shared substrate of a cluster in strict sequence: network,
//! subnets, identity roles, then the control plane. Each step consumes
//! outputs of earlier steps, so there is no concurrency to exploit here;
//! the first non-retryable failure aborts the remainder.

use crate::context::{WorkflowContext, call_activity};
use clusterflow_activity::activities::control_plane::{
    CreateControlPlane, CreateControlPlaneInput,
};
use clusterflow_activity::activities::iam::{CreateIamRoles, CreateIamRolesInput};
use clusterflow_activity::activities::network::{
    CreateNetwork, CreateNetworkInput, DescribeVpcConfig, DescribeVpcConfigInput,
};
use clusterflow_activity::activities::subnet::{
    CreateSubnet, CreateSubnetInput, DescribeSubnets, DescribeSubnetsInput, SubnetRequest,
};
use clusterflow_cloud::SubnetDetails;
use clusterflow_core::{ProvisioningRequest, Result, StepError};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Registered name of the infrastructure workflow
pub const INFRASTRUCTURE_WORKFLOW: &str = "CreateInfrastructureWorkflow";

/// Subnets carved out of the network CIDR, spread by the provider
/// across availability zones
const SUBNET_COUNT: u8 = 2;

/// Everything the cluster workflow needs from the substrate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfrastructureOutput {
    pub vpc_id: String,
    pub subnet_ids: Vec<String>,
    pub subnets: Vec<SubnetDetails>,
    pub cluster_role_arn: String,
    pub node_instance_role_arn: String,
    pub security_group_id: String,
    pub endpoint: String,
    pub certificate_authority: Option<String>,
}

/// Provision the cluster substrate
pub async fn create_infrastructure(
    ctx: &dyn WorkflowContext,
    request: &ProvisioningRequest,
) -> Result<InfrastructureOutput> {
    info!(
        run = %ctx.run_id(),
        cluster = %request.cluster_name,
        "Infrastructure workflow started"
    );

    let network = call_activity::<CreateNetwork>(
        ctx,
        CreateNetworkInput {
            cluster_name: request.cluster_name.clone(),
            region: request.region.clone(),
            secret_ref: request.secret_ref.clone(),
            network_cidr: request.network_cidr.clone(),
        },
    )
    .await?;

    let cidrs = derive_subnet_cidrs(&request.network_cidr, SUBNET_COUNT)?;
    let created = call_activity::<CreateSubnet>(
        ctx,
        CreateSubnetInput {
            cluster_name: request.cluster_name.clone(),
            region: request.region.clone(),
            secret_ref: request.secret_ref.clone(),
            vpc_id: network.vpc_id.clone(),
            subnets: cidrs
                .into_iter()
                .map(|cidr| SubnetRequest {
                    cidr,
                    availability_zone: None,
                })
                .collect(),
        },
    )
    .await?;
    let subnet_ids: Vec<String> = created
        .subnets
        .iter()
        .map(|s| s.subnet_id.clone())
        .collect();

    let described = call_activity::<DescribeSubnets>(
        ctx,
        DescribeSubnetsInput {
            region: request.region.clone(),
            secret_ref: request.secret_ref.clone(),
            subnet_ids: subnet_ids.clone(),
        },
    )
    .await?;

    let roles = call_activity::<CreateIamRoles>(
        ctx,
        CreateIamRolesInput {
            cluster_name: request.cluster_name.clone(),
            region: request.region.clone(),
            secret_ref: request.secret_ref.clone(),
        },
    )
    .await?;

    let vpc = call_activity::<DescribeVpcConfig>(
        ctx,
        DescribeVpcConfigInput {
            region: request.region.clone(),
            secret_ref: request.secret_ref.clone(),
            vpc_id: network.vpc_id.clone(),
        },
    )
    .await?;

    let control_plane = call_activity::<CreateControlPlane>(
        ctx,
        CreateControlPlaneInput {
            cluster_name: request.cluster_name.clone(),
            region: request.region.clone(),
            secret_ref: request.secret_ref.clone(),
            version: request.version.clone(),
            cluster_role_arn: roles.cluster_role_arn.clone(),
            subnet_ids: subnet_ids.clone(),
            security_group_id: vpc.security_group_id.clone(),
            endpoint_access: request.endpoint_access,
        },
    )
    .await?;

    info!(
        cluster = %request.cluster_name,
        endpoint = %control_plane.endpoint,
        "Infrastructure workflow completed"
    );

    Ok(InfrastructureOutput {
        vpc_id: network.vpc_id,
        subnet_ids,
        subnets: described.subnets,
        cluster_role_arn: roles.cluster_role_arn,
        node_instance_role_arn: roles.node_instance_role_arn,
        security_group_id: vpc.security_group_id,
        endpoint: control_plane.endpoint,
        certificate_authority: control_plane.certificate_authority,
    })
}

/// Carve `count` /24 subnet blocks out of the network CIDR
///
/// Slices start at the network's own third octet, so a block like
/// `192.168.64.0/20` yields `192.168.64.0/24`, `192.168.65.0/24`.
fn derive_subnet_cidrs(network_cidr: &str, count: u8) -> Result<Vec<String>> {
    let bad = |detail: String| StepError::fatal(INFRASTRUCTURE_WORKFLOW, detail);

    let (base, prefix) = network_cidr
        .split_once('/')
        .ok_or_else(|| bad(format!("network CIDR {} has no prefix length", network_cidr)))?;
    let prefix: u8 = prefix
        .parse()
        .map_err(|_| bad(format!("network CIDR {} has a malformed prefix", network_cidr)))?;
    if prefix > 23 {
        return Err(bad(format!(
            "network CIDR {} leaves no room for /24 subnets",
            network_cidr
        )));
    }

    let octets: Vec<u8> = base
        .split('.')
        .map(str::parse)
        .collect::<std::result::Result<_, _>>()
        .map_err(|_| bad(format!("network CIDR {} has a malformed address", network_cidr)))?;
    if octets.len() != 4 {
        return Err(bad(format!(
            "network CIDR {} is not a dotted-quad address",
            network_cidr
        )));
    }

    (0..count)
        .map(|index| {
            let third = octets[2].checked_add(index).ok_or_else(|| {
                bad(format!(
                    "network CIDR {} cannot hold {} /24 subnets",
                    network_cidr, count
                ))
            })?;
            Ok(format!("{}.{}.{}.0/24", octets[0], octets[1], third))
        })
        .collect()
}
