//! Configuration resolution subsystem.
//!
//! # Data Flow
//! ```text
//! property sources (key=value files on the resource path)
//!     → sources.rs (discover, parse, merge with complete-source semantics)
//!     → MergedConfiguration (one authoritative bag)
//!     → binder.rs (placeholders, value transformers, type coercion)
//!     → ServerConfig (typed, ready for the lifecycle)
//!
//! Auxiliary option sets:
//!     extensions.rs binds additional typed objects against the same bag,
//!     cached by type for the lifetime of the owning configuration.
//! ```
//!
//! # Design Decisions
//! - No runtime reflection: every option set carries a static descriptor
//!   table (key, aliases, type, setter) built at compile time
//! - Binding is all-or-nothing; a single coercion failure aborts the pass
//! - The `ordinal` of a source is advisory metadata; merge order is the
//!   discovery order of the sources

pub mod binder;
pub mod extensions;
pub mod options;
pub mod schema;
pub mod sources;
pub mod transform;

use std::path::PathBuf;

use thiserror::Error;

pub use binder::bind;
pub use extensions::ExtensionRegistry;
pub use options::{OptionDescriptor, OptionKind, OptionSet, OptionValue};
pub use schema::{LoginConfig, ServerConfig, ServerConfigBuilder};
pub use sources::{MergedConfiguration, PropertyBag, PropertySources};
pub use transform::{ValueTransformer, ValueTransformers};

/// Errors produced while resolving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// More than one discovered source claimed to be authoritative.
    #[error("ambiguous '{resource}': multiple sources with configuration.complete=true")]
    ConflictingCompleteSource { resource: String },

    /// A discovered source could not be read.
    #[error("unreadable property source {path}: {source}")]
    ResourceUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A numeric option held a value that does not parse.
    #[error("invalid numeric value '{value}' for option '{key}'")]
    InvalidNumericValue { key: String, value: String },

    /// A `decode:<algorithm>:` prefix named an unregistered transformer.
    #[error("no value transformer registered for algorithm '{0}'")]
    UnknownTransformAlgorithm(String),

    /// The OS refused to hand out an ephemeral port.
    #[error("ephemeral port allocation failed: {0}")]
    PortAllocation(#[source] std::io::Error),
}
