//! `aws` CLI wrapper
//!
//! Provider binding implemented over the `aws` command line with JSON
//! output. Credentials come from the per-invocation [`Session`] and are
//! injected as process environment, never written to disk.

use crate::api::{
    AccessKey, CloudApi, ControlPlaneSpec, ControlPlaneStatus, KeyPairInfo, StackOutputs,
    SubnetDetails, VpcConfig,
};
use crate::classify::classify_provider_error;
use crate::session::Session;
use async_trait::async_trait;
use clusterflow_core::{Result, StepError};
use serde::Deserialize;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Substrings in stderr that mean "the resource does not exist" rather
/// than a real failure, for describe calls returning `Option`.
const NOT_FOUND_MARKERS: &[&str] = &[
    "does not exist",
    "NotFound",
    "ResourceNotFoundException",
    "NoSuchEntity",
];

/// CloudApi implementation shelling out to the `aws` CLI
pub struct AwsCli;

impl AwsCli {
    pub fn new() -> Self {
        Self
    }

    fn base_command(&self, session: &Session) -> Command {
        let mut cmd = Command::new("aws");
        cmd.env("AWS_ACCESS_KEY_ID", &session.access_key_id);
        cmd.env("AWS_SECRET_ACCESS_KEY", &session.secret_access_key);
        if let Some(token) = &session.session_token {
            cmd.env("AWS_SESSION_TOKEN", token);
        }
        cmd.arg("--region").arg(&session.region);
        cmd.arg("--output").arg("json");
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd
    }

    /// Run an aws subcommand and return stdout
    async fn run(&self, session: &Session, operation: &str, args: &[&str]) -> Result<String> {
        let mut cmd = self.base_command(session);
        cmd.args(args);

        tracing::debug!(operation = %operation, "Running: aws {}", args.join(" "));

        let output = cmd.output().await.map_err(|e| {
            StepError::transient(operation, format!("failed to spawn aws cli: {}", e))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::debug!(operation = %operation, stderr = %stderr, "aws cli failed");
            return Err(classify_provider_error(operation, &stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Variant of [`Self::run`] that maps "not found" to `Ok(None)`
    async fn run_optional(
        &self,
        session: &Session,
        operation: &str,
        args: &[&str],
    ) -> Result<Option<String>> {
        match self.run(session, operation, args).await {
            Ok(stdout) => Ok(Some(stdout)),
            Err(err) if NOT_FOUND_MARKERS.iter().any(|m| err.message.contains(m)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn parse<T: serde::de::DeserializeOwned>(operation: &str, stdout: &str) -> Result<T> {
        serde_json::from_str(stdout).map_err(|e| {
            StepError::fatal(
                operation,
                format!("unexpected response from aws cli: {}", e),
            )
        })
    }

    async fn route_table_for_subnet(
        &self,
        session: &Session,
        subnet_id: &str,
    ) -> Result<Option<String>> {
        let filter = format!("Name=association.subnet-id,Values={}", subnet_id);
        let stdout = self
            .run(
                session,
                "describe_subnets",
                &["ec2", "describe-route-tables", "--filters", &filter],
            )
            .await?;
        let tables: RouteTablesResponse = Self::parse("describe_subnets", &stdout)?;
        Ok(tables
            .route_tables
            .into_iter()
            .next()
            .map(|t| t.route_table_id))
    }
}

impl Default for AwsCli {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CloudApi for AwsCli {
    async fn create_stack(
        &self,
        session: &Session,
        stack_name: &str,
        template_body: &str,
        parameters: &[(String, String)],
    ) -> Result<StackOutputs> {
        let params: Vec<String> = parameters
            .iter()
            .map(|(k, v)| format!("ParameterKey={},ParameterValue={}", k, v))
            .collect();

        let mut args = vec![
            "cloudformation",
            "create-stack",
            "--stack-name",
            stack_name,
            "--template-body",
            template_body,
            "--capabilities",
            "CAPABILITY_NAMED_IAM",
        ];
        if !params.is_empty() {
            args.push("--parameters");
            for p in &params {
                args.push(p.as_str());
            }
        }

        self.run(session, "create_stack", &args).await?;

        // Stack creation is asynchronous; block until the provider
        // reports completion.
        self.run(
            session,
            "create_stack",
            &[
                "cloudformation",
                "wait",
                "stack-create-complete",
                "--stack-name",
                stack_name,
            ],
        )
        .await?;

        self.describe_stack(session, stack_name)
            .await?
            .ok_or_else(|| {
                StepError::fatal(
                    "create_stack",
                    format!("stack {} vanished after creation", stack_name),
                )
                .with_resource(stack_name)
            })
    }

    async fn describe_stack(
        &self,
        session: &Session,
        stack_name: &str,
    ) -> Result<Option<StackOutputs>> {
        let stdout = match self
            .run_optional(
                session,
                "describe_stack",
                &[
                    "cloudformation",
                    "describe-stacks",
                    "--stack-name",
                    stack_name,
                ],
            )
            .await?
        {
            Some(stdout) => stdout,
            None => return Ok(None),
        };

        let response: DescribeStacksResponse = Self::parse("describe_stack", &stdout)?;
        let Some(stack) = response.stacks.into_iter().next() else {
            return Ok(None);
        };

        Ok(Some(StackOutputs {
            stack_id: stack.stack_id,
            outputs: stack
                .outputs
                .unwrap_or_default()
                .into_iter()
                .map(|o| (o.output_key, o.output_value))
                .collect(),
        }))
    }

    async fn describe_subnets(
        &self,
        session: &Session,
        subnet_ids: &[String],
    ) -> Result<Vec<SubnetDetails>> {
        let mut args: Vec<&str> = vec!["ec2", "describe-subnets", "--subnet-ids"];
        args.extend(subnet_ids.iter().map(String::as_str));

        let stdout = self.run(session, "describe_subnets", &args).await?;
        let response: DescribeSubnetsResponse = Self::parse("describe_subnets", &stdout)?;

        let mut details = Vec::with_capacity(response.subnets.len());
        for subnet in response.subnets {
            let route_table_id = self
                .route_table_for_subnet(session, &subnet.subnet_id)
                .await?;
            details.push(SubnetDetails {
                subnet_id: subnet.subnet_id,
                availability_zone: subnet.availability_zone,
                route_table_id,
                cidr: subnet.cidr_block,
            });
        }
        Ok(details)
    }

    async fn import_key_pair(
        &self,
        session: &Session,
        name: &str,
        public_key: &str,
    ) -> Result<KeyPairInfo> {
        let stdout = self
            .run(
                session,
                "import_key_pair",
                &[
                    "ec2",
                    "import-key-pair",
                    "--key-name",
                    name,
                    "--public-key-material",
                    public_key,
                ],
            )
            .await?;

        let imported: ImportKeyPairResponse = Self::parse("import_key_pair", &stdout)?;
        Ok(KeyPairInfo {
            name: imported.key_name,
            fingerprint: imported.key_fingerprint,
            public_key: Some(public_key.to_string()),
        })
    }

    async fn describe_key_pair(
        &self,
        session: &Session,
        name: &str,
    ) -> Result<Option<KeyPairInfo>> {
        let stdout = match self
            .run_optional(
                session,
                "describe_key_pair",
                &[
                    "ec2",
                    "describe-key-pairs",
                    "--key-names",
                    name,
                    "--include-public-key",
                ],
            )
            .await?
        {
            Some(stdout) => stdout,
            None => return Ok(None),
        };

        let response: DescribeKeyPairsResponse = Self::parse("describe_key_pair", &stdout)?;
        Ok(response.key_pairs.into_iter().next().map(|k| KeyPairInfo {
            name: k.key_name,
            fingerprint: k.key_fingerprint,
            public_key: k.public_key,
        }))
    }

    async fn delete_key_pair(&self, session: &Session, name: &str) -> Result<()> {
        self.run(
            session,
            "delete_key_pair",
            &["ec2", "delete-key-pair", "--key-name", name],
        )
        .await?;
        Ok(())
    }

    async fn describe_vpc_config(&self, session: &Session, vpc_id: &str) -> Result<VpcConfig> {
        let stdout = self
            .run(
                session,
                "describe_vpc_config",
                &["ec2", "describe-vpcs", "--vpc-ids", vpc_id],
            )
            .await?;
        let vpcs: DescribeVpcsResponse = Self::parse("describe_vpc_config", &stdout)?;
        let vpc = vpcs.vpcs.into_iter().next().ok_or_else(|| {
            StepError::fatal("describe_vpc_config", format!("vpc {} not found", vpc_id))
                .with_resource(vpc_id)
        })?;

        let vpc_filter = format!("Name=vpc-id,Values={}", vpc_id);
        let stdout = self
            .run(
                session,
                "describe_vpc_config",
                &[
                    "ec2",
                    "describe-security-groups",
                    "--filters",
                    &vpc_filter,
                    "Name=group-name,Values=default",
                ],
            )
            .await?;
        let groups: DescribeSecurityGroupsResponse = Self::parse("describe_vpc_config", &stdout)?;
        let group = groups.security_groups.into_iter().next().ok_or_else(|| {
            StepError::fatal(
                "describe_vpc_config",
                format!("no default security group in vpc {}", vpc_id),
            )
            .with_resource(vpc_id)
        })?;

        Ok(VpcConfig {
            vpc_id: vpc.vpc_id,
            security_group_id: group.group_id,
            cidr: vpc.cidr_block,
        })
    }

    async fn create_control_plane(
        &self,
        session: &Session,
        spec: &ControlPlaneSpec,
    ) -> Result<()> {
        let vpc_config = format!(
            "subnetIds={},securityGroupIds={},endpointPrivateAccess={},endpointPublicAccess={}",
            spec.subnet_ids.join(","),
            spec.security_group_id,
            spec.endpoint_private_access,
            spec.endpoint_public_access,
        );

        self.run(
            session,
            "create_control_plane",
            &[
                "eks",
                "create-cluster",
                "--name",
                &spec.cluster_name,
                "--kubernetes-version",
                &spec.version,
                "--role-arn",
                &spec.role_arn,
                "--resources-vpc-config",
                &vpc_config,
            ],
        )
        .await?;
        Ok(())
    }

    async fn describe_control_plane(
        &self,
        session: &Session,
        cluster_name: &str,
    ) -> Result<Option<ControlPlaneStatus>> {
        let stdout = match self
            .run_optional(
                session,
                "describe_control_plane",
                &["eks", "describe-cluster", "--name", cluster_name],
            )
            .await?
        {
            Some(stdout) => stdout,
            None => return Ok(None),
        };

        let response: DescribeClusterResponse = Self::parse("describe_control_plane", &stdout)?;
        Ok(Some(ControlPlaneStatus {
            status: response.cluster.status,
            endpoint: response.cluster.endpoint,
            certificate_authority: response
                .cluster
                .certificate_authority
                .and_then(|ca| ca.data),
        }))
    }

    async fn healthy_node_count(&self, session: &Session, group_name: &str) -> Result<u32> {
        let stdout = self
            .run(
                session,
                "healthy_node_count",
                &[
                    "autoscaling",
                    "describe-auto-scaling-groups",
                    "--auto-scaling-group-names",
                    group_name,
                ],
            )
            .await?;

        let response: DescribeAsgResponse = Self::parse("healthy_node_count", &stdout)?;
        let count = response
            .auto_scaling_groups
            .into_iter()
            .next()
            .map(|g| {
                g.instances
                    .iter()
                    .filter(|i| i.health_status == "Healthy" && i.lifecycle_state == "InService")
                    .count() as u32
            })
            .unwrap_or(0);
        Ok(count)
    }

    async fn ensure_user(&self, session: &Session, user_name: &str) -> Result<String> {
        match self
            .run(
                session,
                "ensure_user",
                &["iam", "create-user", "--user-name", user_name],
            )
            .await
        {
            Ok(stdout) => {
                let response: UserResponse = Self::parse("ensure_user", &stdout)?;
                Ok(response.user.arn)
            }
            Err(err) if err.kind == clusterflow_core::ErrorKind::AlreadySatisfied => {
                let stdout = self
                    .run(
                        session,
                        "ensure_user",
                        &["iam", "get-user", "--user-name", user_name],
                    )
                    .await?;
                let response: UserResponse = Self::parse("ensure_user", &stdout)?;
                Ok(response.user.arn)
            }
            Err(err) => Err(err),
        }
    }

    async fn list_access_keys(&self, session: &Session, user_name: &str) -> Result<Vec<String>> {
        let stdout = self
            .run(
                session,
                "list_access_keys",
                &["iam", "list-access-keys", "--user-name", user_name],
            )
            .await?;
        let response: ListAccessKeysResponse = Self::parse("list_access_keys", &stdout)?;
        Ok(response
            .access_key_metadata
            .into_iter()
            .map(|k| k.access_key_id)
            .collect())
    }

    async fn create_access_key(&self, session: &Session, user_name: &str) -> Result<AccessKey> {
        let stdout = self
            .run(
                session,
                "create_access_key",
                &["iam", "create-access-key", "--user-name", user_name],
            )
            .await?;
        let response: CreateAccessKeyResponse = Self::parse("create_access_key", &stdout)?;
        Ok(AccessKey {
            access_key_id: response.access_key.access_key_id,
            secret_access_key: response.access_key.secret_access_key,
        })
    }

    async fn apply_manifest(
        &self,
        session: &Session,
        cluster_name: &str,
        manifest: &str,
    ) -> Result<()> {
        // Refresh kubeconfig for the target cluster, then pipe the
        // manifest through kubectl. Declarative apply keeps the call
        // safe to repeat.
        self.run(
            session,
            "apply_manifest",
            &["eks", "update-kubeconfig", "--name", cluster_name],
        )
        .await?;

        let mut cmd = Command::new("kubectl");
        cmd.args(["apply", "-f", "-"]);
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| {
            StepError::transient("apply_manifest", format!("failed to spawn kubectl: {}", e))
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(manifest.as_bytes()).await.map_err(|e| {
                StepError::transient("apply_manifest", format!("failed to write manifest: {}", e))
            })?;
        }

        let output = child.wait_with_output().await.map_err(|e| {
            StepError::transient("apply_manifest", format!("kubectl did not exit: {}", e))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_provider_error("apply_manifest", &stderr));
        }
        Ok(())
    }
}

// Response shapes for the aws cli JSON output

#[derive(Deserialize)]
struct DescribeStacksResponse {
    #[serde(rename = "Stacks")]
    stacks: Vec<StackDescription>,
}

#[derive(Deserialize)]
struct StackDescription {
    #[serde(rename = "StackId")]
    stack_id: String,
    #[serde(rename = "Outputs")]
    outputs: Option<Vec<StackOutputEntry>>,
}

#[derive(Deserialize)]
struct StackOutputEntry {
    #[serde(rename = "OutputKey")]
    output_key: String,
    #[serde(rename = "OutputValue")]
    output_value: String,
}

#[derive(Deserialize)]
struct DescribeSubnetsResponse {
    #[serde(rename = "Subnets")]
    subnets: Vec<SubnetEntry>,
}

#[derive(Deserialize)]
struct SubnetEntry {
    #[serde(rename = "SubnetId")]
    subnet_id: String,
    #[serde(rename = "AvailabilityZone")]
    availability_zone: String,
    #[serde(rename = "CidrBlock")]
    cidr_block: String,
}

#[derive(Deserialize)]
struct RouteTablesResponse {
    #[serde(rename = "RouteTables")]
    route_tables: Vec<RouteTableEntry>,
}

#[derive(Deserialize)]
struct RouteTableEntry {
    #[serde(rename = "RouteTableId")]
    route_table_id: String,
}

#[derive(Deserialize)]
struct ImportKeyPairResponse {
    #[serde(rename = "KeyName")]
    key_name: String,
    #[serde(rename = "KeyFingerprint")]
    key_fingerprint: String,
}

#[derive(Deserialize)]
struct DescribeKeyPairsResponse {
    #[serde(rename = "KeyPairs")]
    key_pairs: Vec<KeyPairEntry>,
}

#[derive(Deserialize)]
struct KeyPairEntry {
    #[serde(rename = "KeyName")]
    key_name: String,
    #[serde(rename = "KeyFingerprint")]
    key_fingerprint: String,
    #[serde(rename = "PublicKey")]
    public_key: Option<String>,
}

#[derive(Deserialize)]
struct DescribeVpcsResponse {
    #[serde(rename = "Vpcs")]
    vpcs: Vec<VpcEntry>,
}

#[derive(Deserialize)]
struct VpcEntry {
    #[serde(rename = "VpcId")]
    vpc_id: String,
    #[serde(rename = "CidrBlock")]
    cidr_block: String,
}

#[derive(Deserialize)]
struct DescribeSecurityGroupsResponse {
    #[serde(rename = "SecurityGroups")]
    security_groups: Vec<SecurityGroupEntry>,
}

#[derive(Deserialize)]
struct SecurityGroupEntry {
    #[serde(rename = "GroupId")]
    group_id: String,
}

#[derive(Deserialize)]
struct DescribeClusterResponse {
    cluster: ClusterEntry,
}

#[derive(Deserialize)]
struct ClusterEntry {
    status: String,
    endpoint: Option<String>,
    #[serde(rename = "certificateAuthority")]
    certificate_authority: Option<CertificateAuthority>,
}

#[derive(Deserialize)]
struct CertificateAuthority {
    data: Option<String>,
}

#[derive(Deserialize)]
struct DescribeAsgResponse {
    #[serde(rename = "AutoScalingGroups")]
    auto_scaling_groups: Vec<AsgEntry>,
}

#[derive(Deserialize)]
struct AsgEntry {
    #[serde(rename = "Instances")]
    instances: Vec<AsgInstance>,
}

#[derive(Deserialize)]
struct AsgInstance {
    #[serde(rename = "HealthStatus")]
    health_status: String,
    #[serde(rename = "LifecycleState")]
    lifecycle_state: String,
}

#[derive(Deserialize)]
struct UserResponse {
    #[serde(rename = "User")]
    user: UserEntry,
}

#[derive(Deserialize)]
struct UserEntry {
    #[serde(rename = "Arn")]
    arn: String,
}

#[derive(Deserialize)]
struct ListAccessKeysResponse {
    #[serde(rename = "AccessKeyMetadata")]
    access_key_metadata: Vec<AccessKeyMetadata>,
}

#[derive(Deserialize)]
struct AccessKeyMetadata {
    #[serde(rename = "AccessKeyId")]
    access_key_id: String,
}

#[derive(Deserialize)]
struct CreateAccessKeyResponse {
    #[serde(rename = "AccessKey")]
    access_key: AccessKeyEntry,
}

#[derive(Deserialize)]
struct AccessKeyEntry {
    #[serde(rename = "AccessKeyId")]
    access_key_id: String,
    #[serde(rename = "SecretAccessKey")]
    secret_access_key: String,
}
