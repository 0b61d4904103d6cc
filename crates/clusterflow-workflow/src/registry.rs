//! Activity registry
//!
//! Maps activity names to their type-erased handlers. Built once at
//! worker startup, immutable afterwards; the run loop resolves every
//! invocation through it.

use clusterflow_activity::activities::{
    BootstrapCluster, CreateClusterUserAccessKey, CreateControlPlane, CreateIamRoles,
    CreateNetwork, CreateNodeGroup, CreateSubnet, DescribeSubnets, DescribeVpcConfig,
    UploadSshKey,
};
use clusterflow_activity::{Activity, ActivityHandler, ErasedActivity, Sleeper};
use clusterflow_cloud::{CloudApi, SecretStore, SessionFactory, TemplateKind, TemplateProvider};
use clusterflow_core::WaitPolicy;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Immutable name-to-handler map
#[derive(Default)]
pub struct Registry {
    activities: HashMap<&'static str, Arc<dyn ErasedActivity>>,
    workflows: Vec<&'static str>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<A: Activity>(&mut self, activity: A) {
        self.register_erased(Arc::new(ActivityHandler(activity)));
    }

    /// Register a pre-erased handler under its own name
    pub fn register_erased(&mut self, handler: Arc<dyn ErasedActivity>) {
        self.activities.insert(handler.name(), handler);
    }

    /// Record a workflow program as runnable under `name`
    pub fn register_workflow(&mut self, name: &'static str) {
        if !self.workflows.contains(&name) {
            self.workflows.push(name);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ErasedActivity>> {
        self.activities.get(name).cloned()
    }

    pub fn has_workflow(&self, name: &str) -> bool {
        self.workflows.iter().any(|w| *w == name)
    }

    /// Registered activity names, sorted for stable output
    pub fn activity_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.activities.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn workflow_names(&self) -> &[&'static str] {
        &self.workflows
    }
}

/// Build the registry with all ten provisioning activities
///
/// One session factory is shared by every activity; each invocation
/// still resolves its own scoped session through it. The control plane
/// and the capacity groups wait under separate policies because their
/// fulfillment times differ by an order of magnitude.
pub fn provisioning_registry(
    store: Arc<dyn SecretStore>,
    api: Arc<dyn CloudApi>,
    templates: &TemplateProvider,
    control_plane_wait: WaitPolicy,
    node_wait: WaitPolicy,
    sleeper: Arc<dyn Sleeper>,
) -> Registry {
    let sessions = Arc::new(SessionFactory::new(store));
    let mut registry = Registry::new();

    registry.register_workflow(crate::cluster::CLUSTER_WORKFLOW);
    registry.register_workflow(crate::infrastructure::INFRASTRUCTURE_WORKFLOW);

    registry.register(CreateNetwork::new(
        sessions.clone(),
        api.clone(),
        templates.get(TemplateKind::Network).to_string(),
    ));
    registry.register(CreateSubnet::new(
        sessions.clone(),
        api.clone(),
        templates.get(TemplateKind::Subnet).to_string(),
    ));
    registry.register(DescribeSubnets::new(sessions.clone(), api.clone()));
    registry.register(CreateIamRoles::new(
        sessions.clone(),
        api.clone(),
        templates.get(TemplateKind::IamRoles).to_string(),
    ));
    registry.register(DescribeVpcConfig::new(sessions.clone(), api.clone()));
    registry.register(CreateControlPlane::new(
        sessions.clone(),
        api.clone(),
        control_plane_wait,
        sleeper.clone(),
    ));
    registry.register(UploadSshKey::new(sessions.clone(), api.clone()));
    registry.register(CreateNodeGroup::new(
        sessions.clone(),
        api.clone(),
        templates.get(TemplateKind::NodePool).to_string(),
        node_wait,
        sleeper,
    ));
    registry.register(CreateClusterUserAccessKey::new(
        sessions.clone(),
        api.clone(),
    ));
    registry.register(BootstrapCluster::new(sessions, api));

    info!(
        activities = registry.activities.len(),
        "Provisioning activities registered"
    );
    registry
}
