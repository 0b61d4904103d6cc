//! Network activities: create the cluster VPC, read its configuration

use crate::activities::required_output;
use crate::activity::Activity;
use crate::context::ActivityContext;
use async_trait::async_trait;
use clusterflow_cloud::{CloudApi, SessionFactory, VpcConfig};
use clusterflow_core::{ErrorKind, ResourceRole, Result, SecretRef, StepError, resource_name};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNetworkInput {
    pub cluster_name: String,
    pub region: String,
    pub secret_ref: SecretRef,
    pub network_cidr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNetworkOutput {
    pub stack_id: String,
    pub vpc_id: String,
    /// False when an existing, matching network was found
    pub created: bool,
}

/// Creates the cluster network stack from the network template
pub struct CreateNetwork {
    sessions: Arc<SessionFactory>,
    api: Arc<dyn CloudApi>,
    template: String,
}

impl CreateNetwork {
    pub fn new(sessions: Arc<SessionFactory>, api: Arc<dyn CloudApi>, template: String) -> Self {
        Self {
            sessions,
            api,
            template,
        }
    }
}

#[async_trait]
impl Activity for CreateNetwork {
    const NAME: &'static str = "CreateNetwork";
    type Input = CreateNetworkInput;
    type Output = CreateNetworkOutput;

    async fn execute(&self, ctx: &ActivityContext, input: Self::Input) -> Result<Self::Output> {
        ctx.check_cancelled(Self::NAME)?;
        let session = self
            .sessions
            .resolve(&input.secret_ref, &input.region)
            .await
            .map_err(|e| e.for_step(Self::NAME))?;

        let stack_name = resource_name(&input.cluster_name, ResourceRole::Network, None);

        // The runtime may re-invoke after a crash between "created" and
        // "recorded"; an existing stack under our name is ours.
        if let Some(existing) = self
            .api
            .describe_stack(&session, &stack_name)
            .await
            .map_err(|e| e.for_step(Self::NAME))?
        {
            info!(stack = %stack_name, "Network stack already exists, reusing");
            return Ok(CreateNetworkOutput {
                vpc_id: required_output(Self::NAME, &existing, "VpcId")?,
                stack_id: existing.stack_id,
                created: false,
            });
        }

        let parameters = vec![
            ("ClusterName".to_string(), input.cluster_name.clone()),
            ("VpcCidr".to_string(), input.network_cidr.clone()),
        ];

        let stack = match self
            .api
            .create_stack(&session, &stack_name, &self.template, &parameters)
            .await
        {
            Ok(stack) => stack,
            // Lost the race against our own previous attempt
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

        info!(stack = %stack_name, vpc = ?stack.output("VpcId"), "Network stack created");
        Ok(CreateNetworkOutput {
            vpc_id: required_output(Self::NAME, &stack, "VpcId")?,
            stack_id: stack.stack_id,
            created: true,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescribeVpcConfigInput {
    pub region: String,
    pub secret_ref: SecretRef,
    pub vpc_id: String,
}

/// Reads VPC-level configuration needed by control-plane creation
pub struct DescribeVpcConfig {
    sessions: Arc<SessionFactory>,
    api: Arc<dyn CloudApi>,
}

impl DescribeVpcConfig {
    pub fn new(sessions: Arc<SessionFactory>, api: Arc<dyn CloudApi>) -> Self {
        Self { sessions, api }
    }
}

#[async_trait]
impl Activity for DescribeVpcConfig {
    const NAME: &'static str = "DescribeVpcConfig";
    type Input = DescribeVpcConfigInput;
    type Output = VpcConfig;

    async fn execute(&self, ctx: &ActivityContext, input: Self::Input) -> Result<Self::Output> {
        ctx.check_cancelled(Self::NAME)?;
        let session = self
            .sessions
            .resolve(&input.secret_ref, &input.region)
            .await
            .map_err(|e| e.for_step(Self::NAME))?;

        self.api
            .describe_vpc_config(&session, &input.vpc_id)
            .await
            .map_err(|e| e.for_step(Self::NAME))
    }
}
