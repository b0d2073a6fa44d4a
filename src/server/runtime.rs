//! The container seam between the lifecycle and an actual runtime.
//!
//! The lifecycle never talks to sockets directly; it assembles a
//! [`ContainerContext`] and drives a [`Container`] through init, start,
//! mount/unmount and stop. [`TcpContainer`] is the default implementation:
//! it opens one listener per connector so bound ports are observable, which
//! is all an embedding host needs before wiring its own protocol handling.

use std::collections::BTreeMap;
use std::net::{SocketAddr, TcpListener};
use std::path::PathBuf;

use crate::server::connector::ConnectorSpec;
use crate::server::LifecycleError;

/// What to deploy and where to mount it.
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentMeta {
    /// Mount path, unique per running server (`/` for the root).
    pub mount_path: String,
    /// Optional document base backing the deployment.
    pub doc_base: Option<PathBuf>,
}

impl DeploymentMeta {
    pub fn new(mount_path: impl Into<String>) -> Self {
        Self {
            mount_path: mount_path.into(),
            doc_base: None,
        }
    }

    pub fn with_doc_base(mut self, doc_base: impl Into<PathBuf>) -> Self {
        self.doc_base = Some(doc_base.into());
        self
    }
}

/// A request-processing interceptor attached to the host, built from
/// `interceptors.<name>.*` properties.
#[derive(Debug, Clone, PartialEq)]
pub struct InterceptorSpec {
    pub name: String,
    /// Implementation identifier the container maps to actual behavior.
    pub kind: String,
    /// Lower orders run earlier.
    pub order: i32,
    pub params: BTreeMap<String, String>,
}

/// Everything the lifecycle hands to a container at init time.
#[derive(Debug, Clone, Default)]
pub struct ContainerContext {
    /// Base working directory.
    pub base: PathBuf,
    pub conf_dir: PathBuf,
    pub apps_dir: PathBuf,
    /// Default host name.
    pub host: String,
    /// Materialized server descriptor, when one was configured.
    pub descriptor: Option<PathBuf>,
    /// Connectors to open, in order.
    pub connectors: Vec<ConnectorSpec>,
    /// `user -> password` pairs from configuration.
    pub users: BTreeMap<String, String>,
    /// `user -> comma-separated roles` pairs from configuration.
    pub roles: BTreeMap<String, String>,
    /// Interceptors in execution order.
    pub interceptors: Vec<InterceptorSpec>,
}

/// The runtime driven by the lifecycle.
pub trait Container: Send {
    /// Absorb the assembled context. Called exactly once, before `start`.
    fn init(&mut self, ctx: &ContainerContext) -> Result<(), LifecycleError>;

    /// Open the connectors and begin serving.
    fn start(&mut self) -> Result<(), LifecycleError>;

    /// Stop serving. Must tolerate a container that never fully started.
    fn stop(&mut self) -> Result<(), LifecycleError>;

    /// Release remaining resources after `stop`.
    fn destroy(&mut self) -> Result<(), LifecycleError>;

    /// Make a deployment available under its mount path.
    fn mount(&mut self, meta: &DeploymentMeta) -> Result<(), LifecycleError>;

    /// Remove a deployment. Unknown paths are a no-op.
    fn unmount(&mut self, mount_path: &str);
}

/// Default container: one TCP listener per connector.
#[derive(Debug, Default)]
pub struct TcpContainer {
    connectors: Vec<ConnectorSpec>,
    listeners: Vec<TcpListener>,
    mounts: Vec<DeploymentMeta>,
}

impl TcpContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Addresses actually bound, in connector order. Empty unless started.
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.listeners
            .iter()
            .filter_map(|l| l.local_addr().ok())
            .collect()
    }

    pub fn mounts(&self) -> &[DeploymentMeta] {
        &self.mounts
    }
}

impl Container for TcpContainer {
    fn init(&mut self, ctx: &ContainerContext) -> Result<(), LifecycleError> {
        self.connectors = ctx.connectors.clone();
        Ok(())
    }

    fn start(&mut self) -> Result<(), LifecycleError> {
        for spec in &self.connectors {
            let port = u16::try_from(spec.port).map_err(|_| {
                LifecycleError::StartFailure(format!(
                    "{} connector port {} is out of range",
                    spec.scheme, spec.port
                ))
            })?;
            let listener = TcpListener::bind(("0.0.0.0", port))
                .map_err(|e| LifecycleError::StartFailure(format!(
                    "cannot bind {} port {}: {e}",
                    spec.scheme, spec.port
                )))?;
            tracing::info!(scheme = %spec.scheme, port = spec.port, "connector bound");
            self.listeners.push(listener);
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), LifecycleError> {
        self.listeners.clear();
        Ok(())
    }

    fn destroy(&mut self) -> Result<(), LifecycleError> {
        self.connectors.clear();
        self.mounts.clear();
        Ok(())
    }

    fn mount(&mut self, meta: &DeploymentMeta) -> Result<(), LifecycleError> {
        self.mounts.push(meta.clone());
        Ok(())
    }

    fn unmount(&mut self, mount_path: &str) {
        self.mounts.retain(|m| m.mount_path != mount_path);
    }
}
