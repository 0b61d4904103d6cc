//! ClusterFlow activities
//!
//! The ten idempotent units of work the provisioning workflows sequence.
//! Each activity takes a typed input, resolves its own provider session,
//! checks for the resource it would create under its deterministic name,
//! and returns a typed output or a classified failure. A re-invoked
//! activity (after a crash or retry) finds what an earlier attempt
//! created instead of duplicating it.

pub mod activity;
pub mod context;
pub mod poller;

pub mod activities;

// Re-exports
pub use activity::{Activity, ActivityHandler, ErasedActivity};
pub use context::{ActivityContext, NoopHooks, RuntimeHooks};
pub use poller::{FulfillmentPoller, Sleeper, TokioSleeper};
