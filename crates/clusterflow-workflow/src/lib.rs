//! ClusterFlow workflows
//!
//! The two provisioning programs and the machinery that runs them: the
//! infrastructure workflow builds the shared substrate, the cluster
//! workflow composes it with node capacity and cluster bootstrap. The
//! [`Registry`] holds the ten activities under their invocation names;
//! the [`LocalRunner`] drives a workflow against it with per-activity
//! retries and a per-run progress record.

pub mod cluster;
pub mod context;
pub mod infrastructure;
pub mod registry;
pub mod runner;

// Re-exports
pub use cluster::{CLUSTER_WORKFLOW, ClusterOutput, create_cluster};
pub use context::{WorkflowContext, call_activity};
pub use infrastructure::{INFRASTRUCTURE_WORKFLOW, InfrastructureOutput, create_infrastructure};
pub use registry::{Registry, provisioning_registry};
pub use runner::{LocalRunner, RetryPolicy};
