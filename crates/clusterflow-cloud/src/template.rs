//! Declarative template provider
//!
//! The four resource templates (network, subnet, identity roles, node
//! pool) are opaque declarative documents handed to the provider's
//! template engine unmodified; per-cluster values travel as stack
//! parameters. Documents are loaded and validated once, then cached.

use clusterflow_core::{Result, StepError};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

/// The four template kinds used by provisioning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateKind {
    Network,
    Subnet,
    IamRoles,
    NodePool,
}

impl TemplateKind {
    pub const ALL: [TemplateKind; 4] = [
        TemplateKind::Network,
        TemplateKind::Subnet,
        TemplateKind::IamRoles,
        TemplateKind::NodePool,
    ];

    /// File name of the template inside the template directory
    pub fn file_name(&self) -> &'static str {
        match self {
            TemplateKind::Network => "network.yaml",
            TemplateKind::Subnet => "subnet.yaml",
            TemplateKind::IamRoles => "iam-roles.yaml",
            TemplateKind::NodePool => "node-pool.yaml",
        }
    }
}

impl std::fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.file_name())
    }
}

/// Loads and caches the declarative templates
///
/// Read-only after [`TemplateProvider::load`]; safe to share across
/// concurrent activities.
#[derive(Debug)]
pub struct TemplateProvider {
    documents: HashMap<TemplateKind, String>,
}

impl TemplateProvider {
    /// Load all four templates from a directory
    ///
    /// Each document must be valid YAML; a malformed or missing template
    /// is a Fatal startup error, before any workflow runs.
    pub fn load(dir: &Path) -> Result<Self> {
        let mut documents = HashMap::new();

        for kind in TemplateKind::ALL {
            let path = dir.join(kind.file_name());
            let raw = std::fs::read_to_string(&path).map_err(|e| {
                StepError::fatal(
                    "LoadTemplates",
                    format!("failed to read template {}: {}", path.display(), e),
                )
            })?;

            // Validate the document structure up front
            serde_yaml::from_str::<serde_yaml::Value>(&raw).map_err(|e| {
                StepError::fatal(
                    "LoadTemplates",
                    format!("template {} is not valid YAML: {}", kind, e),
                )
            })?;

            debug!(template = %kind, bytes = raw.len(), "Loaded template");
            documents.insert(kind, raw);
        }

        info!(count = documents.len(), "Templates loaded");
        Ok(Self { documents })
    }

    /// Get the raw cached document
    pub fn get(&self, kind: TemplateKind) -> &str {
        // All four kinds are inserted by load()
        self.documents
            .get(&kind)
            .map(String::as_str)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_templates(dir: &Path) {
        fs::write(
            dir.join("network.yaml"),
            "Description: cluster network\nParameters:\n  VpcCidr:\n    Type: String\n",
        )
        .unwrap();
        fs::write(dir.join("subnet.yaml"), "Description: subnet\n").unwrap();
        fs::write(dir.join("iam-roles.yaml"), "Description: roles\n").unwrap();
        fs::write(dir.join("node-pool.yaml"), "Description: pool\n").unwrap();
    }

    #[test]
    fn test_load_caches_all_four() {
        let dir = tempfile::tempdir().unwrap();
        write_templates(dir.path());

        let provider = TemplateProvider::load(dir.path()).unwrap();
        for kind in TemplateKind::ALL {
            assert!(!provider.get(kind).is_empty(), "missing {}", kind);
        }
        assert!(provider.get(TemplateKind::Network).contains("VpcCidr"));
    }

    #[test]
    fn test_missing_template_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write_templates(dir.path());
        fs::remove_file(dir.path().join("node-pool.yaml")).unwrap();

        let err = TemplateProvider::load(dir.path()).unwrap_err();
        assert_eq!(err.kind, clusterflow_core::ErrorKind::Fatal);
    }

    #[test]
    fn test_malformed_template_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write_templates(dir.path());
        fs::write(dir.path().join("subnet.yaml"), "a: [unclosed\n").unwrap();

        let err = TemplateProvider::load(dir.path()).unwrap_err();
        assert_eq!(err.kind, clusterflow_core::ErrorKind::Fatal);
        assert!(err.message.contains("subnet.yaml"));
    }
}
