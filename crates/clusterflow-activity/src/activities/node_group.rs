//! Node-group creation with capacity fulfillment wait

use crate::activities::required_output;
use crate::activity::Activity;
use crate::context::ActivityContext;
use crate::poller::{FulfillmentPoller, Sleeper};
use async_trait::async_trait;
use clusterflow_cloud::{CloudApi, SessionFactory};
use clusterflow_core::{
    ErrorKind, NodePoolSpec, ResourceRole, Result, SecretRef, StepError, WaitPolicy, resource_name,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNodeGroupInput {
    pub cluster_name: String,
    pub region: String,
    pub secret_ref: SecretRef,
    pub pool: NodePoolSpec,
    pub subnet_ids: Vec<String>,
    pub node_instance_role_arn: String,
    pub ssh_key_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNodeGroupOutput {
    pub group_name: String,
    pub stack_id: String,
    /// Healthy count observed when fulfillment was reached
    pub healthy_count: u32,
    pub created: bool,
}

/// Creates one capacity group from the node-pool template and waits for
/// its requested node count to be fulfilled
pub struct CreateNodeGroup {
    sessions: Arc<SessionFactory>,
    api: Arc<dyn CloudApi>,
    template: String,
    wait: WaitPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl CreateNodeGroup {
    pub fn new(
        sessions: Arc<SessionFactory>,
        api: Arc<dyn CloudApi>,
        template: String,
        wait: WaitPolicy,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            sessions,
            api,
            template,
            wait,
            sleeper,
        }
    }
}

#[async_trait]
impl Activity for CreateNodeGroup {
    const NAME: &'static str = "CreateNodeGroup";
    type Input = CreateNodeGroupInput;
    type Output = CreateNodeGroupOutput;

    async fn execute(&self, ctx: &ActivityContext, input: Self::Input) -> Result<Self::Output> {
        ctx.check_cancelled(Self::NAME)?;
        let session = self
            .sessions
            .resolve(&input.secret_ref, &input.region)
            .await
            .map_err(|e| e.for_step(Self::NAME))?;

        let stack_name = resource_name(
            &input.cluster_name,
            ResourceRole::NodePool,
            Some(&input.pool.name),
        );

        let (stack, created) = match self
            .api
            .describe_stack(&session, &stack_name)
            .await
            .map_err(|e| e.for_step(Self::NAME))?
        {
            Some(existing) => {
                info!(stack = %stack_name, "Node pool stack already exists, reusing");
                (existing, false)
            }
            None => {
                let mut parameters = vec![
                    ("ClusterName".to_string(), input.cluster_name.clone()),
                    ("PoolName".to_string(), input.pool.name.clone()),
                    ("InstanceType".to_string(), input.pool.instance_type.clone()),
                    ("MinSize".to_string(), input.pool.min_count.to_string()),
                    ("MaxSize".to_string(), input.pool.max_count.to_string()),
                    (
                        "DesiredCapacity".to_string(),
                        input.pool.desired_count.to_string(),
                    ),
                    ("SubnetIds".to_string(), input.subnet_ids.join(",")),
                    (
                        "NodeInstanceRoleArn".to_string(),
                        input.node_instance_role_arn.clone(),
                    ),
                    ("KeyName".to_string(), input.ssh_key_name.clone()),
                ];
                if let Some(image) = &input.pool.image {
                    parameters.push(("ImageId".to_string(), image.clone()));
                }

                match self
                    .api
                    .create_stack(&session, &stack_name, &self.template, &parameters)
                    .await
                {
                    Ok(stack) => (stack, true),
                    Err(err) if err.kind == ErrorKind::AlreadySatisfied => {
                        let stack = self
                            .api
                            .describe_stack(&session, &stack_name)
                            .await
                            .map_err(|e| e.for_step(Self::NAME))?
                            .ok_or_else(|| {
                                StepError::fatal(
                                    Self::NAME,
                                    "stack reported as existing but not found",
                                )
                                .with_resource(&stack_name)
                            })?;
                        (stack, false)
                    }
                    Err(err) => return Err(err.for_step(Self::NAME).with_resource(&stack_name)),
                }
            }
        };

        let group_name = required_output(Self::NAME, &stack, "AsgName")?;

        let poller = FulfillmentPoller::new(self.wait);
        let healthy_count = poller
            .wait_for_capacity(
                ctx,
                self.api.as_ref(),
                &session,
                &group_name,
                input.pool.desired_count,
                self.sleeper.as_ref(),
            )
            .await?;

        info!(
            group = %group_name,
            healthy = healthy_count,
            desired = input.pool.desired_count,
            "Node group fulfilled"
        );
        Ok(CreateNodeGroupOutput {
            group_name,
            stack_id: stack.stack_id,
            healthy_count,
            created,
        })
    }
}
