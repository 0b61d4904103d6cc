//! ClusterFlow provisioning worker
//!
//! Loads the four resource templates, registers the activities, and
//! drives a provisioning workflow for the request it is given. Provider
//! credentials are resolved through the environment-backed secret
//! store; the request file only carries a secret reference.

use anyhow::Context as _;
use chrono::Utc;
use clap::{Parser, Subcommand};
use clusterflow_activity::TokioSleeper;
use clusterflow_cloud::{AwsCli, EnvSecretStore, TemplateProvider};
use clusterflow_core::{ProvisioningRequest, WaitPolicy};
use clusterflow_workflow::{LocalRunner, Registry, provisioning_registry};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "clusterflowd")]
#[command(about = "Cluster provisioning worker", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register the workflows and activities, then wait for work
    Serve {
        /// Directory holding the four resource templates
        #[arg(long, env = "CLUSTERFLOW_TEMPLATES", default_value = "templates")]
        templates: PathBuf,
        /// Seconds between fulfillment polls
        #[arg(long, env = "CLUSTERFLOW_POLL_INTERVAL", default_value = "5")]
        poll_interval: u64,
        /// Ceiling in seconds for node capacity fulfillment
        #[arg(long, env = "CLUSTERFLOW_NODE_MAX_WAIT", default_value = "120")]
        node_max_wait: u64,
        /// Ceiling in seconds for control-plane activation
        #[arg(long, env = "CLUSTERFLOW_CONTROL_PLANE_MAX_WAIT", default_value = "1800")]
        control_plane_max_wait: u64,
    },
    /// Provision a cluster from a request file
    Provision {
        /// Path to the provisioning request (YAML)
        request: PathBuf,
        /// Directory holding the four resource templates
        #[arg(long, env = "CLUSTERFLOW_TEMPLATES", default_value = "templates")]
        templates: PathBuf,
        /// Run identifier; derived from the cluster name when omitted
        #[arg(long, env = "CLUSTERFLOW_RUN_ID")]
        run_id: Option<String>,
        /// Seconds between fulfillment polls
        #[arg(long, env = "CLUSTERFLOW_POLL_INTERVAL", default_value = "5")]
        poll_interval: u64,
        /// Ceiling in seconds for node capacity fulfillment
        #[arg(long, env = "CLUSTERFLOW_NODE_MAX_WAIT", default_value = "120")]
        node_max_wait: u64,
        /// Ceiling in seconds for control-plane activation
        #[arg(long, env = "CLUSTERFLOW_CONTROL_PLANE_MAX_WAIT", default_value = "1800")]
        control_plane_max_wait: u64,
        /// Build the shared substrate only; skip node capacity,
        /// credentials, and bootstrap
        #[arg(long)]
        infrastructure_only: bool,
    },
    /// Validate a request file without touching the provider
    Validate {
        /// Path to the provisioning request (YAML)
        request: PathBuf,
    },
    /// Print version information
    Version,
}

fn build_registry(
    templates: &Path,
    poll_interval: u64,
    control_plane_max_wait: u64,
    node_max_wait: u64,
) -> anyhow::Result<Registry> {
    let templates = TemplateProvider::load(templates)?;
    let poll = Duration::from_secs(poll_interval);
    Ok(provisioning_registry(
        Arc::new(EnvSecretStore),
        Arc::new(AwsCli::new()),
        &templates,
        WaitPolicy::new(poll, Duration::from_secs(control_plane_max_wait)),
        WaitPolicy::new(poll, Duration::from_secs(node_max_wait)),
        Arc::new(TokioSleeper),
    ))
}

fn load_request(path: &Path) -> anyhow::Result<ProvisioningRequest> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read request file {}", path.display()))?;
    let request: ProvisioningRequest = serde_yaml::from_str(&raw)
        .with_context(|| format!("request file {} is malformed", path.display()))?;
    request.validate().map_err(anyhow::Error::msg)?;
    Ok(request)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Version => {
            println!("clusterflowd {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Validate { request } => {
            let request = load_request(&request)?;
            println!(
                "request is valid: cluster {} in {}, {} pool(s), {} desired node(s)",
                request.cluster_name,
                request.region,
                request.node_pools.len(),
                request.desired_nodes()
            );
            Ok(())
        }
        Commands::Serve {
            templates,
            poll_interval,
            node_max_wait,
            control_plane_max_wait,
        } => {
            let registry = build_registry(
                &templates,
                poll_interval,
                control_plane_max_wait,
                node_max_wait,
            )?;
            info!(
                workflows = ?registry.workflow_names(),
                activities = ?registry.activity_names(),
                "Worker ready"
            );

            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for shutdown signal")?;
            info!("Shutting down");
            Ok(())
        }
        Commands::Provision {
            request,
            templates,
            run_id,
            poll_interval,
            node_max_wait,
            control_plane_max_wait,
            infrastructure_only,
        } => {
            let request = load_request(&request)?;
            let registry = build_registry(
                &templates,
                poll_interval,
                control_plane_max_wait,
                node_max_wait,
            )?;

            let run_id = run_id.unwrap_or_else(|| {
                format!(
                    "{}-{}",
                    request.cluster_name,
                    Utc::now().format("%Y%m%d%H%M%S")
                )
            });
            info!(run = %run_id, cluster = %request.cluster_name, "Starting provisioning run");

            let runner = LocalRunner::new(&run_id, Arc::new(registry));

            let outcome = if infrastructure_only {
                runner
                    .run_infrastructure(&request)
                    .await
                    .map(|infra| infra.endpoint)
            } else {
                runner.run_cluster(&request).await.map(|cluster| {
                    println!("capacity groups: {}", cluster.node_groups.join(", "));
                    println!("cluster user:    {}", cluster.user_name);
                    cluster.endpoint
                })
            };

            let record = runner.record();
            match outcome {
                Ok(endpoint) => {
                    println!("cluster {} provisioned", request.cluster_name);
                    println!("endpoint:        {}", endpoint);
                    Ok(())
                }
                Err(err) => {
                    eprintln!("run {} ended {}: {}", record.run_id, record.state, err);
                    if let Some(step) = record.last_completed_step {
                        eprintln!("last completed step: {}", step);
                    }
                    anyhow::bail!("provisioning failed")
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUEST: &str = r#"
organization_id: 1
cluster_name: demo
region: eu-west-1
network_cidr: 10.0.0.0/16
node_pools:
  - name: workers
    instance_type: m5.large
    min_count: 1
    max_count: 5
    desired_count: 3
ssh_public_key: ssh-rsa AAAA
secret_ref: secret-1
version: "1.31"
"#;

    #[test]
    fn test_request_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("request.yaml");
        std::fs::write(&path, REQUEST).unwrap();

        let request = load_request(&path).unwrap();
        assert_eq!(request.cluster_name, "demo");
        assert_eq!(request.desired_nodes(), 3);
        assert!(request.endpoint_access.public);
    }

    #[test]
    fn test_invalid_request_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("request.yaml");
        std::fs::write(&path, REQUEST.replace("desired_count: 3", "desired_count: 9")).unwrap();

        assert!(load_request(&path).is_err());
    }
}
