//! Provider error classification
//!
//! Maps raw provider failure text onto the core taxonomy. This is the
//! only place that knows provider error vocabulary; everything above the
//! [`crate::CloudApi`] boundary sees classified errors only.

use clusterflow_core::{ErrorKind, StepError};

/// Substrings marking a failure as retryable
const TRANSIENT_MARKERS: &[&str] = &[
    "Throttling",
    "RequestLimitExceeded",
    "TooManyRequests",
    "ServiceUnavailable",
    "InternalError",
    "InternalFailure",
    "RequestTimeout",
    "timed out",
    "connection reset",
    "Could not connect",
    "temporarily unavailable",
];

/// Substrings marking the idempotency short-circuit
const ALREADY_EXISTS_MARKERS: &[&str] = &[
    "AlreadyExistsException",
    "AlreadyExists",
    "EntityAlreadyExists",
    "ResourceInUseException",
    "Duplicate",
];

/// Classify raw provider error text
///
/// Unrecognized errors classify Fatal: retrying an unknown rejection is
/// worse than surfacing it.
pub fn classify_provider_error(operation: &str, raw: &str) -> StepError {
    let kind = if ALREADY_EXISTS_MARKERS.iter().any(|m| raw.contains(m)) {
        ErrorKind::AlreadySatisfied
    } else if TRANSIENT_MARKERS.iter().any(|m| raw.contains(m)) {
        ErrorKind::Transient
    } else {
        ErrorKind::Fatal
    };

    StepError::new(kind, operation, first_line(raw))
}

// Provider CLIs print multi-line diagnostics; the first line carries the
// error code and message.
fn first_line(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("unknown provider error")
        .to_string()
}
