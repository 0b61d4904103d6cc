//! Subnet activities: create subnets inside the cluster network, read
//! their placement details

use crate::activities::required_output;
use crate::activity::Activity;
use crate::context::ActivityContext;
use async_trait::async_trait;
use clusterflow_cloud::{CloudApi, SessionFactory, SubnetDetails};
use clusterflow_core::{ErrorKind, ResourceRole, Result, SecretRef, StepError, resource_name};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// One subnet to carve out of the network CIDR
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubnetRequest {
    pub cidr: String,
    /// Provider chooses when unset
    #[serde(default)]
    pub availability_zone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSubnetInput {
    pub cluster_name: String,
    pub region: String,
    pub secret_ref: SecretRef,
    pub vpc_id: String,
    pub subnets: Vec<SubnetRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedSubnet {
    pub subnet_id: String,
    pub cidr: String,
    pub stack_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSubnetOutput {
    pub subnets: Vec<CreatedSubnet>,
}

/// Creates one subnet stack per requested CIDR
///
/// Subnet stacks are suffixed by position, so a replay that finds some
/// stacks already created continues with the remainder.
pub struct CreateSubnet {
    sessions: Arc<SessionFactory>,
    api: Arc<dyn CloudApi>,
    template: String,
}

impl CreateSubnet {
    pub fn new(sessions: Arc<SessionFactory>, api: Arc<dyn CloudApi>, template: String) -> Self {
        Self {
            sessions,
            api,
            template,
        }
    }
}

#[async_trait]
impl Activity for CreateSubnet {
    const NAME: &'static str = "CreateSubnet";
    type Input = CreateSubnetInput;
    type Output = CreateSubnetOutput;

    async fn execute(&self, ctx: &ActivityContext, input: Self::Input) -> Result<Self::Output> {
        let session = self
            .sessions
            .resolve(&input.secret_ref, &input.region)
            .await
            .map_err(|e| e.for_step(Self::NAME))?;

        let mut subnets = Vec::with_capacity(input.subnets.len());

        for (index, request) in input.subnets.iter().enumerate() {
            ctx.check_cancelled(Self::NAME)?;
            let suffix = format!("{:02}", index);
            let stack_name =
                resource_name(&input.cluster_name, ResourceRole::Subnet, Some(&suffix));

            if let Some(existing) = self
                .api
                .describe_stack(&session, &stack_name)
                .await
                .map_err(|e| e.for_step(Self::NAME))?
            {
                info!(stack = %stack_name, "Subnet stack already exists, reusing");
                subnets.push(CreatedSubnet {
                    subnet_id: required_output(Self::NAME, &existing, "SubnetId")?,
                    cidr: request.cidr.clone(),
                    stack_id: existing.stack_id,
                });
                continue;
            }

            let mut parameters = vec![
                ("VpcId".to_string(), input.vpc_id.clone()),
                ("SubnetCidr".to_string(), request.cidr.clone()),
            ];
            if let Some(az) = &request.availability_zone {
                parameters.push(("AvailabilityZone".to_string(), az.clone()));
            }

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

            subnets.push(CreatedSubnet {
                subnet_id: required_output(Self::NAME, &stack, "SubnetId")?,
                cidr: request.cidr.clone(),
                stack_id: stack.stack_id,
            });
        }

        info!(count = subnets.len(), cluster = %input.cluster_name, "Subnets ready");
        Ok(CreateSubnetOutput { subnets })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescribeSubnetsInput {
    pub region: String,
    pub secret_ref: SecretRef,
    pub subnet_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescribeSubnetsOutput {
    pub subnets: Vec<SubnetDetails>,
}

/// Pure read of subnet placement details; safe to retry unconditionally
pub struct DescribeSubnets {
    sessions: Arc<SessionFactory>,
    api: Arc<dyn CloudApi>,
}

impl DescribeSubnets {
    pub fn new(sessions: Arc<SessionFactory>, api: Arc<dyn CloudApi>) -> Self {
        Self { sessions, api }
    }
}

#[async_trait]
impl Activity for DescribeSubnets {
    const NAME: &'static str = "DescribeSubnets";
    type Input = DescribeSubnetsInput;
    type Output = DescribeSubnetsOutput;

    async fn execute(&self, ctx: &ActivityContext, input: Self::Input) -> Result<Self::Output> {
        ctx.check_cancelled(Self::NAME)?;
        let session = self
            .sessions
            .resolve(&input.secret_ref, &input.region)
            .await
            .map_err(|e| e.for_step(Self::NAME))?;

        let subnets = self
            .api
            .describe_subnets(&session, &input.subnet_ids)
            .await
            .map_err(|e| e.for_step(Self::NAME))?;

        Ok(DescribeSubnetsOutput { subnets })
    }
}
