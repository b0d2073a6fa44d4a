//! Server lifecycle subsystem.
//!
//! # Responsibilities
//! - Drive a container through `Created -> Started -> Closed`
//! - Materialize the working directory layout and the server descriptor
//! - Build connectors from configuration and hand them to the container
//! - Track deployments and tear everything down in LIFO order on close
//!
//! # Design Decisions
//! - State transitions happen under one mutex; `close` is idempotent and
//!   `Closed` is terminal
//! - The container behind the lifecycle is a trait object so tests can swap
//!   in a recording double
//! - Environment changes are scoped overlays restored on close, never
//!   process-global mutations left behind

pub mod connector;
pub mod deployments;
pub mod descriptor;
pub mod env;
pub mod lifecycle;
pub mod runtime;

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;

pub use connector::{ConnectorSpec, SslHostConfig};
pub use deployments::{DeploymentRegistry, DeploymentUnit};
pub use descriptor::DescriptorPorts;
pub use env::{EnvGuard, EnvOverlay};
pub use lifecycle::Server;
pub use runtime::{Container, ContainerContext, DeploymentMeta, InterceptorSpec, TcpContainer};

/// Errors produced while starting or stopping a server.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The operation is not legal in the current state.
    #[error("operation not allowed in state '{state}'")]
    InvalidState { state: &'static str },

    /// A directory of the working layout could not be created.
    #[error("cannot create directory {path}: {source}")]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The container failed to come up.
    #[error("container start failed: {0}")]
    StartFailure(String),

    /// The container failed to shut down cleanly.
    #[error("container stop failed: {0}")]
    StopFailure(String),

    /// A file of the working layout could not be read or written.
    #[error("io failure on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors produced while mounting or unmounting applications.
#[derive(Debug, Error)]
pub enum DeployError {
    /// Another deployment already owns the mount path.
    #[error("mount path '{0}' is already deployed")]
    DuplicateMountPath(String),

    /// The server is not in the `Started` state.
    #[error("server is not running")]
    NotRunning,

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}
