//! Embeddable server bootstrapper.
//!
//! `hearth` resolves layered `key=value` property sources into a typed
//! [`ServerConfig`], then drives a container through a strict
//! `Created -> Started -> Closed` lifecycle: working directory layout,
//! descriptor staging, connector construction, deployments and ordered
//! teardown.
//!
//! Minimal embedding:
//!
//! ```no_run
//! use hearth::{Server, ServerConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ServerConfig::builder().http_port(8080).build();
//! let server = Server::new(config);
//! server.start()?;
//! // ...
//! server.close()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod server;

pub use config::{
    ConfigError, LoginConfig, MergedConfiguration, OptionSet, PropertySources, ServerConfig,
    ServerConfigBuilder, ValueTransformer, ValueTransformers,
};
pub use server::{
    ConnectorSpec, Container, ContainerContext, DeployError, DeploymentMeta, DeploymentRegistry,
    EnvOverlay, LifecycleError, Server, SslHostConfig, TcpContainer,
};
