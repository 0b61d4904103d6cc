//! Credential resolution
//!
//! A [`SecretRef`] names a stored credential; the [`SessionFactory`]
//! exchanges it for a region-scoped [`Session`]. Sessions are owned by
//! the single activity invocation that requested them — scope, expiry
//! and even account can differ per call, so they are never cached.

use async_trait::async_trait;
use clusterflow_core::{Result, SecretRef, StepError};
use std::sync::Arc;
use tracing::debug;

/// Raw credential material resolved from a secret store
#[derive(Clone)]
pub struct SecretMaterial {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl std::fmt::Debug for SecretMaterial {
    // Key material stays out of logs
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretMaterial")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

/// Store holding provider credential secrets
///
/// A missing secret is Fatal (retrying cannot make it appear); an
/// unreachable store is Transient.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get_secret(&self, secret_ref: &SecretRef) -> Result<SecretMaterial>;
}

/// Secret store backed by process environment variables
///
/// Looks up `CLUSTERFLOW_SECRET_<ID>_ACCESS_KEY` and
/// `CLUSTERFLOW_SECRET_<ID>_SECRET_KEY`, with the id uppercased and
/// dashes mapped to underscores.
pub struct EnvSecretStore;

impl EnvSecretStore {
    fn var_name(secret_ref: &SecretRef, field: &str) -> String {
        let id = secret_ref.id().to_uppercase().replace('-', "_");
        format!("CLUSTERFLOW_SECRET_{}_{}", id, field)
    }
}

#[async_trait]
impl SecretStore for EnvSecretStore {
    async fn get_secret(&self, secret_ref: &SecretRef) -> Result<SecretMaterial> {
        let access_var = Self::var_name(secret_ref, "ACCESS_KEY");
        let secret_var = Self::var_name(secret_ref, "SECRET_KEY");

        let access_key_id = std::env::var(&access_var).map_err(|_| {
            StepError::fatal(
                "ResolveSession",
                format!("secret {} not found ({} unset)", secret_ref.id(), access_var),
            )
        })?;
        let secret_access_key = std::env::var(&secret_var).map_err(|_| {
            StepError::fatal(
                "ResolveSession",
                format!("secret {} incomplete ({} unset)", secret_ref.id(), secret_var),
            )
        })?;

        Ok(SecretMaterial {
            access_key_id,
            secret_access_key,
            session_token: None,
        })
    }
}

/// Authenticated provider session scoped to one region
#[derive(Clone)]
pub struct Session {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
    pub region: String,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("access_key_id", &self.access_key_id)
            .field("region", &self.region)
            .finish()
    }
}

/// Exchanges secret references for provider sessions
pub struct SessionFactory {
    store: Arc<dyn SecretStore>,
}

impl SessionFactory {
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self { store }
    }

    /// Resolve a fresh session for one activity invocation
    pub async fn resolve(&self, secret_ref: &SecretRef, region: &str) -> Result<Session> {
        debug!(secret = %secret_ref.id(), region = %region, "Resolving provider session");
        let material = self.store.get_secret(secret_ref).await?;

        Ok(Session {
            access_key_id: material.access_key_id,
            secret_access_key: material.secret_access_key,
            session_token: material.session_token,
            region: region.to_string(),
        })
    }
}
