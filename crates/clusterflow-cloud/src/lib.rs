//! ClusterFlow cloud seams
//!
//! The three external boundaries of the orchestration core, each a
//! trait the activities depend on:
//!
//! - [`CloudApi`] — provider resource calls, keyed by deterministic
//!   names so retries and replays find what an earlier attempt created
//! - [`SecretStore`] / [`SessionFactory`] — credential resolution; one
//!   scoped [`Session`] per activity invocation, never shared
//! - [`TemplateProvider`] — the four declarative documents, validated
//!   once at startup and handed to the provider unmodified
//!
//! `AwsCli` is the shipped provider binding: a thin wrapper over the
//! `aws` CLI with JSON output, classifying every failure into the core
//! error taxonomy at this boundary so the orchestration layer never
//! handles provider-specific error vocabulary.

pub mod api;
pub mod awscli;
pub mod classify;
pub mod session;
pub mod template;

// Re-exports
pub use api::{
    AccessKey, CloudApi, ControlPlaneSpec, ControlPlaneStatus, KeyPairInfo, StackOutputs,
    SubnetDetails, VpcConfig,
};
pub use awscli::AwsCli;
pub use classify::classify_provider_error;
pub use session::{EnvSecretStore, SecretMaterial, SecretStore, Session, SessionFactory};
pub use template::{TemplateKind, TemplateProvider};
