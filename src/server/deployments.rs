//! Registry of live deployments.
//!
//! Tracks every mounted application of a running server and guarantees
//! unique mount paths. On close the lifecycle drains the registry in
//! reverse deployment order so later deployments never outlive what they
//! were layered on.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use crate::server::DeployError;

// Sync as well as Send: units sit behind the registry's RwLock, which is
// shared across threads and the shutdown-hook task.
type Teardown = Box<dyn FnOnce() + Send + Sync>;

/// One mounted application and how to take it down.
pub struct DeploymentUnit {
    mount_path: String,
    source: Option<PathBuf>,
    teardown: Option<Teardown>,
}

impl DeploymentUnit {
    pub fn new(mount_path: impl Into<String>) -> Self {
        Self {
            mount_path: mount_path.into(),
            source: None,
            teardown: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<PathBuf>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Attach the action run exactly once when the unit is undeployed.
    pub fn with_teardown(mut self, teardown: impl FnOnce() + Send + Sync + 'static) -> Self {
        self.teardown = Some(Box::new(teardown));
        self
    }

    pub fn mount_path(&self) -> &str {
        &self.mount_path
    }

    pub fn source(&self) -> Option<&PathBuf> {
        self.source.as_ref()
    }

    fn run_teardown(&mut self) {
        if let Some(teardown) = self.teardown.take() {
            teardown();
        }
    }
}

impl std::fmt::Debug for DeploymentUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeploymentUnit")
            .field("mount_path", &self.mount_path)
            .field("source", &self.source)
            .field("has_teardown", &self.teardown.is_some())
            .finish()
    }
}

/// All live deployments of one server instance.
#[derive(Debug, Default)]
pub struct DeploymentRegistry {
    // insertion order kept separately so drain can run LIFO
    units: RwLock<(Vec<String>, HashMap<String, DeploymentUnit>)>,
}

impl DeploymentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a unit. On a duplicate mount path the registry is unchanged
    /// and the unit's teardown does not run.
    pub fn deploy(&self, unit: DeploymentUnit) -> Result<(), DeployError> {
        let mut guard = self.units.write().expect("deployment registry poisoned");
        let (order, units) = &mut *guard;
        let path = unit.mount_path().to_string();
        if units.contains_key(&path) {
            return Err(DeployError::DuplicateMountPath(path));
        }
        tracing::info!(mount_path = %path, "deployment registered");
        order.push(path.clone());
        units.insert(path, unit);
        Ok(())
    }

    /// Run the unit's teardown and forget it. Unknown paths are a no-op.
    pub fn undeploy(&self, mount_path: &str) {
        let removed = {
            let mut guard = self.units.write().expect("deployment registry poisoned");
            let (order, units) = &mut *guard;
            order.retain(|p| p != mount_path);
            units.remove(mount_path)
        };
        if let Some(mut unit) = removed {
            tracing::info!(mount_path, "deployment removed");
            unit.run_teardown();
        }
    }

    /// Tear everything down, newest first. The registry ends up empty.
    pub fn drain_all(&self) {
        let drained = {
            let mut guard = self.units.write().expect("deployment registry poisoned");
            let (order, units) = &mut *guard;
            let mut drained = Vec::new();
            while let Some(path) = order.pop() {
                if let Some(unit) = units.remove(&path) {
                    drained.push(unit);
                }
            }
            drained
        };
        for mut unit in drained {
            tracing::debug!(mount_path = %unit.mount_path(), "deployment drained");
            unit.run_teardown();
        }
    }

    pub fn contains(&self, mount_path: &str) -> bool {
        self.units
            .read()
            .expect("deployment registry poisoned")
            .1
            .contains_key(mount_path)
    }

    pub fn mount_paths(&self) -> Vec<String> {
        self.units
            .read()
            .expect("deployment registry poisoned")
            .0
            .clone()
    }

    pub fn len(&self) -> usize {
        self.units.read().expect("deployment registry poisoned").1.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
