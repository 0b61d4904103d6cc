//! ClusterFlow core domain model
//!
//! Shared types for the provisioning workflows: the immutable
//! [`ProvisioningRequest`], deterministic resource naming (the
//! idempotency key used by every activity), the five-way error
//! classification, wait policies for bounded polling, and the
//! per-run state machine.

pub mod error;
pub mod naming;
pub mod request;
pub mod state;
pub mod wait;

// Re-exports
pub use error::{ErrorKind, Result, StepError};
pub use naming::{ResourceRole, resource_name};
pub use request::{EndpointAccess, NodePoolSpec, ProvisioningRequest, SecretRef};
pub use state::{RunRecord, RunState};
pub use wait::WaitPolicy;
