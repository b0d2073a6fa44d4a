//! The typed server configuration and its option table.
//!
//! # Responsibilities
//! - Hold every bootstrap option as a typed field with its default
//! - Expose the static descriptor table driving CLI flags and property keys
//! - Route namespaced keys (`users.*`, `roles.*`, `properties.*`,
//!   `connector.*`, `login.*`) into their collections
//! - Retain the merged bag so extensions can bind against it later
//!
//! # Design Decisions
//! - `ServerConfig` is a plain value type; programmatic construction goes
//!   through [`ServerConfigBuilder`], not subclassing
//! - Cloning a configuration copies the data fields and shares the extension
//!   registry and transformer chain behind their `Arc`s
//! - Equality covers the data fields only; registries and customizers are
//!   runtime wiring, not configuration

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

use crate::config::binder::bind;
use crate::config::extensions::ExtensionRegistry;
use crate::config::options::{OptionDescriptor, OptionKind, OptionSet, OptionValue};
use crate::config::sources::{MergedConfiguration, PropertySources};
use crate::config::transform::ValueTransformers;
use crate::config::ConfigError;
use crate::server::connector::ConnectorSpec;
use crate::server::runtime::ContainerContext;

/// Hook run against the container context before startup.
pub type InstanceCustomizer = Arc<dyn Fn(&mut ContainerContext) + Send + Sync>;

/// Form-login style authentication settings, built lazily from `login.*`
/// keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoginConfig {
    pub auth_method: Option<String>,
    pub realm_name: Option<String>,
    pub login_page: Option<String>,
    pub error_page: Option<String>,
}

impl OptionSet for LoginConfig {
    fn descriptors() -> &'static [OptionDescriptor<Self>] {
        static TABLE: &[OptionDescriptor<LoginConfig>] = &[
            OptionDescriptor {
                key: "auth-method",
                aliases: &[],
                description: "Authentication method (BASIC, FORM, ...)",
                kind: OptionKind::Str,
                set: |c, v| {
                    if let OptionValue::Str(value) = v {
                        c.auth_method = Some(value);
                    }
                },
            },
            OptionDescriptor {
                key: "realm-name",
                aliases: &[],
                description: "Realm name presented to clients",
                kind: OptionKind::Str,
                set: |c, v| {
                    if let OptionValue::Str(value) = v {
                        c.realm_name = Some(value);
                    }
                },
            },
            OptionDescriptor {
                key: "login-page",
                aliases: &[],
                description: "Form login page",
                kind: OptionKind::Str,
                set: |c, v| {
                    if let OptionValue::Str(value) = v {
                        c.login_page = Some(value);
                    }
                },
            },
            OptionDescriptor {
                key: "error-page",
                aliases: &[],
                description: "Form login error page",
                kind: OptionKind::Str,
                set: |c, v| {
                    if let OptionValue::Str(value) = v {
                        c.error_page = Some(value);
                    }
                },
            },
        ];
        TABLE
    }
}

/// Every bootstrap option of an embedded server instance.
#[derive(Clone, Serialize)]
pub struct ServerConfig {
    pub pid_file: Option<PathBuf>,
    pub http_port: i32,
    pub https_port: i32,
    pub stop_port: i32,
    pub host: String,
    /// Explicit base directory; a throwaway one is created when unset.
    pub dir: Option<String>,
    pub descriptor: Option<PathBuf>,
    pub keep_descriptor_ports: bool,
    pub skip_http: bool,
    pub ssl: bool,
    pub keystore_file: Option<String>,
    pub keystore_pass: Option<String>,
    pub keystore_type: String,
    pub client_auth: Option<String>,
    pub key_alias: Option<String>,
    pub ssl_protocol: Option<String>,
    pub http2: bool,
    pub temp_dir: PathBuf,
    pub conf: Option<String>,
    pub delete_base_on_startup: bool,
    pub use_shutdown_hook: bool,
    pub access_log_pattern: Option<String>,
    pub default_ssl_host_config_name: Option<String>,
    /// Logical name of the property resource loaded by [`ServerConfig::load`].
    pub properties_resource: String,
    pub properties: BTreeMap<String, String>,
    pub users: BTreeMap<String, String>,
    pub roles: BTreeMap<String, String>,
    pub login_config: Option<LoginConfig>,
    /// Fully specified connectors added programmatically.
    pub connectors: Vec<ConnectorSpec>,
    #[serde(skip)]
    bag: MergedConfiguration,
    #[serde(skip)]
    customizers: Vec<(i32, InstanceCustomizer)>,
    #[serde(skip)]
    extensions: Arc<ExtensionRegistry>,
    #[serde(skip)]
    transformers: Arc<ValueTransformers>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            pid_file: None,
            http_port: 8080,
            https_port: 8443,
            stop_port: -1,
            host: "localhost".to_string(),
            dir: None,
            descriptor: None,
            keep_descriptor_ports: false,
            skip_http: false,
            ssl: false,
            keystore_file: None,
            keystore_pass: None,
            keystore_type: "PKCS12".to_string(),
            client_auth: None,
            key_alias: None,
            ssl_protocol: None,
            http2: false,
            temp_dir: std::env::temp_dir(),
            conf: None,
            delete_base_on_startup: true,
            use_shutdown_hook: true,
            access_log_pattern: None,
            default_ssl_host_config_name: None,
            properties_resource: "hearth.properties".to_string(),
            properties: BTreeMap::new(),
            users: BTreeMap::new(),
            roles: BTreeMap::new(),
            login_config: None,
            connectors: Vec::new(),
            bag: MergedConfiguration::default(),
            customizers: Vec::new(),
            extensions: Arc::new(ExtensionRegistry::new()),
            transformers: Arc::new(ValueTransformers::new()),
        }
    }
}

impl PartialEq for ServerConfig {
    fn eq(&self, other: &Self) -> bool {
        self.pid_file == other.pid_file
            && self.http_port == other.http_port
            && self.https_port == other.https_port
            && self.stop_port == other.stop_port
            && self.host == other.host
            && self.dir == other.dir
            && self.descriptor == other.descriptor
            && self.keep_descriptor_ports == other.keep_descriptor_ports
            && self.skip_http == other.skip_http
            && self.ssl == other.ssl
            && self.keystore_file == other.keystore_file
            && self.keystore_pass == other.keystore_pass
            && self.keystore_type == other.keystore_type
            && self.client_auth == other.client_auth
            && self.key_alias == other.key_alias
            && self.ssl_protocol == other.ssl_protocol
            && self.http2 == other.http2
            && self.temp_dir == other.temp_dir
            && self.conf == other.conf
            && self.delete_base_on_startup == other.delete_base_on_startup
            && self.use_shutdown_hook == other.use_shutdown_hook
            && self.access_log_pattern == other.access_log_pattern
            && self.default_ssl_host_config_name == other.default_ssl_host_config_name
            && self.properties_resource == other.properties_resource
            && self.properties == other.properties
            && self.users == other.users
            && self.roles == other.roles
            && self.login_config == other.login_config
            && self.connectors == other.connectors
    }
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("http_port", &self.http_port)
            .field("https_port", &self.https_port)
            .field("stop_port", &self.stop_port)
            .field("host", &self.host)
            .field("dir", &self.dir)
            .field("ssl", &self.ssl)
            .field("skip_http", &self.skip_http)
            .field("properties_resource", &self.properties_resource)
            .field("properties", &self.properties)
            .field("customizers", &self.customizers.len())
            .finish_non_exhaustive()
    }
}

impl ServerConfig {
    /// Load and bind the default property resource from `sources`.
    pub fn load(sources: &PropertySources) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let resource = config.properties_resource.clone();
        config.load_from(&resource, sources)?;
        Ok(config)
    }

    /// Merge `resource` across `sources` and bind the result on top of the
    /// current state.
    pub fn load_from(
        &mut self,
        resource: &str,
        sources: &PropertySources,
    ) -> Result<(), ConfigError> {
        let merged = sources.merge(resource)?;
        self.bind_bag(merged)
    }

    /// Fold an already-merged bag into this configuration and rebind.
    ///
    /// The bag is retained so extensions bound later see the same entries.
    pub fn bind_bag(&mut self, bag: MergedConfiguration) -> Result<(), ConfigError> {
        self.bag.extend(&bag);
        let snapshot = self.bag.clone();
        let transformers = Arc::clone(&self.transformers);
        bind(self, &snapshot, &transformers)?;
        tracing::debug!(
            resource = snapshot.resource(),
            keys = snapshot.len(),
            http = self.http_port,
            https = self.https_port,
            "configuration bound"
        );
        Ok(())
    }

    /// The merged bag this configuration was bound from.
    pub fn bag(&self) -> &MergedConfiguration {
        &self.bag
    }

    /// The transformer chain used by this configuration.
    pub fn transformers(&self) -> &Arc<ValueTransformers> {
        &self.transformers
    }

    /// Lazily bind and cache an auxiliary option set against the retained
    /// bag. Repeated calls for the same type return the same instance.
    pub fn extension<T>(&self) -> Result<Arc<T>, ConfigError>
    where
        T: OptionSet + Default + Send + Sync + 'static,
    {
        self.extensions
            .get_or_create::<T>(&self.bag, &self.transformers)
    }

    /// Free-form property captured from `properties.*` keys.
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// `https` when TLS is enabled, `http` otherwise.
    pub fn active_protocol(&self) -> &'static str {
        if self.ssl {
            "https"
        } else {
            "http"
        }
    }

    /// The port matching [`ServerConfig::active_protocol`].
    pub fn active_port(&self) -> i32 {
        if self.ssl {
            self.https_port
        } else {
            self.http_port
        }
    }

    /// Register a hook run against the container context before startup.
    /// Lower priorities run first.
    pub fn add_instance_customizer<F>(&mut self, priority: i32, customizer: F)
    where
        F: Fn(&mut ContainerContext) + Send + Sync + 'static,
    {
        self.customizers.push((priority, Arc::new(customizer)));
    }

    /// Customizers in priority order.
    pub fn customizers(&self) -> Vec<InstanceCustomizer> {
        let mut ordered = self.customizers.clone();
        ordered.sort_by_key(|(priority, _)| *priority);
        ordered.into_iter().map(|(_, c)| c).collect()
    }

    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }
}

impl OptionSet for ServerConfig {
    fn descriptors() -> &'static [OptionDescriptor<Self>] {
        static TABLE: &[OptionDescriptor<ServerConfig>] = &[
            OptionDescriptor {
                key: "pid-file",
                aliases: &[],
                description: "File the server PID is written to on start",
                kind: OptionKind::File,
                set: |c, v| {
                    if let OptionValue::File(value) = v {
                        c.pid_file = Some(value);
                    }
                },
            },
            OptionDescriptor {
                key: "http",
                aliases: &[],
                description: "HTTP port, -1 for an OS-assigned one",
                kind: OptionKind::Port,
                set: |c, v| {
                    if let OptionValue::Int(value) = v {
                        c.http_port = value;
                    }
                },
            },
            OptionDescriptor {
                key: "https",
                aliases: &[],
                description: "HTTPS port, -1 for an OS-assigned one",
                kind: OptionKind::Port,
                set: |c, v| {
                    if let OptionValue::Int(value) = v {
                        c.https_port = value;
                    }
                },
            },
            OptionDescriptor {
                key: "stop",
                aliases: &[],
                description: "Shutdown port, -1 to disable",
                kind: OptionKind::Int,
                set: |c, v| {
                    if let OptionValue::Int(value) = v {
                        c.stop_port = value;
                    }
                },
            },
            OptionDescriptor {
                key: "host",
                aliases: &[],
                description: "Default host name",
                kind: OptionKind::Str,
                set: |c, v| {
                    if let OptionValue::Str(value) = v {
                        c.host = value;
                    }
                },
            },
            OptionDescriptor {
                key: "dir",
                aliases: &[],
                description: "Base working directory; a throwaway one is created when unset",
                kind: OptionKind::Str,
                set: |c, v| {
                    if let OptionValue::Str(value) = v {
                        c.dir = Some(value);
                    }
                },
            },
            OptionDescriptor {
                key: "descriptor",
                aliases: &["server-xml"],
                description: "Server descriptor adopted or rewritten at start",
                kind: OptionKind::File,
                set: |c, v| {
                    if let OptionValue::File(value) = v {
                        c.descriptor = Some(value);
                    }
                },
            },
            OptionDescriptor {
                key: "keep-descriptor-ports",
                aliases: &[],
                description: "Adopt the descriptor ports instead of rewriting them",
                kind: OptionKind::Bool,
                set: |c, v| {
                    if let OptionValue::Bool(value) = v {
                        c.keep_descriptor_ports = value;
                    }
                },
            },
            OptionDescriptor {
                key: "skip-http",
                aliases: &[],
                description: "Do not open the plain HTTP connector",
                kind: OptionKind::Bool,
                set: |c, v| {
                    if let OptionValue::Bool(value) = v {
                        c.skip_http = value;
                    }
                },
            },
            OptionDescriptor {
                key: "ssl",
                aliases: &[],
                description: "Open an HTTPS connector",
                kind: OptionKind::Bool,
                set: |c, v| {
                    if let OptionValue::Bool(value) = v {
                        c.ssl = value;
                    }
                },
            },
            OptionDescriptor {
                key: "keystore-file",
                aliases: &[],
                description: "Keystore resource or path for the HTTPS connector",
                kind: OptionKind::Str,
                set: |c, v| {
                    if let OptionValue::Str(value) = v {
                        c.keystore_file = Some(value);
                    }
                },
            },
            OptionDescriptor {
                key: "keystore-password",
                aliases: &["keystore-pass"],
                description: "Keystore password",
                kind: OptionKind::Str,
                set: |c, v| {
                    if let OptionValue::Str(value) = v {
                        c.keystore_pass = Some(value);
                    }
                },
            },
            OptionDescriptor {
                key: "keystore-type",
                aliases: &[],
                description: "Keystore type",
                kind: OptionKind::Str,
                set: |c, v| {
                    if let OptionValue::Str(value) = v {
                        c.keystore_type = value;
                    }
                },
            },
            OptionDescriptor {
                key: "client-auth",
                aliases: &[],
                description: "Client certificate requirement for HTTPS",
                kind: OptionKind::Str,
                set: |c, v| {
                    if let OptionValue::Str(value) = v {
                        c.client_auth = Some(value);
                    }
                },
            },
            OptionDescriptor {
                key: "keystore-alias",
                aliases: &["key-alias"],
                description: "Alias of the key used by the HTTPS connector",
                kind: OptionKind::Str,
                set: |c, v| {
                    if let OptionValue::Str(value) = v {
                        c.key_alias = Some(value);
                    }
                },
            },
            OptionDescriptor {
                key: "ssl-protocol",
                aliases: &[],
                description: "Enabled TLS protocols",
                kind: OptionKind::Str,
                set: |c, v| {
                    if let OptionValue::Str(value) = v {
                        c.ssl_protocol = Some(value);
                    }
                },
            },
            OptionDescriptor {
                key: "http2",
                aliases: &[],
                description: "Advertise HTTP/2 on the HTTPS connector",
                kind: OptionKind::Bool,
                set: |c, v| {
                    if let OptionValue::Bool(value) = v {
                        c.http2 = value;
                    }
                },
            },
            OptionDescriptor {
                key: "tmp-dir",
                aliases: &[],
                description: "Directory throwaway bases are created under",
                kind: OptionKind::File,
                set: |c, v| {
                    if let OptionValue::File(value) = v {
                        c.temp_dir = value;
                    }
                },
            },
            OptionDescriptor {
                key: "conf",
                aliases: &[],
                description: "Resource directory synchronized into the conf dir",
                kind: OptionKind::Str,
                set: |c, v| {
                    if let OptionValue::Str(value) = v {
                        c.conf = Some(value);
                    }
                },
            },
            OptionDescriptor {
                key: "delete-on-startup",
                aliases: &[],
                description: "Wipe an existing explicit base directory at start",
                kind: OptionKind::Bool,
                set: |c, v| {
                    if let OptionValue::Bool(value) = v {
                        c.delete_base_on_startup = value;
                    }
                },
            },
            OptionDescriptor {
                key: "use-shutdown-hook",
                aliases: &[],
                description: "Close the server on Ctrl-C",
                kind: OptionKind::Bool,
                set: |c, v| {
                    if let OptionValue::Bool(value) = v {
                        c.use_shutdown_hook = value;
                    }
                },
            },
            OptionDescriptor {
                key: "access-log-pattern",
                aliases: &[],
                description: "Pattern for the access log interceptor",
                kind: OptionKind::Str,
                set: |c, v| {
                    if let OptionValue::Str(value) = v {
                        c.access_log_pattern = Some(value);
                    }
                },
            },
            OptionDescriptor {
                key: "default-ssl-host-config-name",
                aliases: &[],
                description: "Name of the default TLS host configuration",
                kind: OptionKind::Str,
                set: |c, v| {
                    if let OptionValue::Str(value) = v {
                        c.default_ssl_host_config_name = Some(value);
                    }
                },
            },
            OptionDescriptor {
                key: "hearth-properties",
                aliases: &[],
                description: "Logical name of the property resource to load",
                kind: OptionKind::Str,
                set: |c, v| {
                    if let OptionValue::Str(value) = v {
                        c.properties_resource = value;
                    }
                },
            },
        ];
        TABLE
    }

    fn apply_namespaced(
        &mut self,
        key: &str,
        value: &str,
        _bag: &MergedConfiguration,
    ) -> Result<(), ConfigError> {
        if let Some(rest) = key.strip_prefix("properties.") {
            self.properties.insert(rest.to_string(), value.to_string());
        } else if let Some(rest) = key.strip_prefix("users.") {
            self.users.insert(rest.to_string(), value.to_string());
        } else if let Some(rest) = key.strip_prefix("roles.") {
            self.roles.insert(rest.to_string(), value.to_string());
        } else if key.starts_with("connector.") || key.starts_with("interceptors.") {
            // consumed later, when connectors and interceptors are built
            self.properties.insert(key.to_string(), value.to_string());
        } else if let Some(rest) = key.strip_prefix("login.") {
            let login = self.login_config.get_or_insert_with(LoginConfig::default);
            for descriptor in LoginConfig::descriptors() {
                if descriptor.matches(rest) {
                    (descriptor.set)(login, OptionValue::Str(value.to_string()));
                    break;
                }
            }
        }
        Ok(())
    }
}

/// Fluent construction of a [`ServerConfig`] for embedding.
#[derive(Debug, Default)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    pub fn http_port(mut self, port: i32) -> Self {
        self.config.http_port = port;
        self
    }

    pub fn https_port(mut self, port: i32) -> Self {
        self.config.https_port = port;
        self
    }

    pub fn stop_port(mut self, port: i32) -> Self {
        self.config.stop_port = port;
        self
    }

    /// Ask the OS for a free HTTP port right away.
    pub fn random_http_port(mut self) -> Result<Self, ConfigError> {
        self.config.http_port = crate::config::binder::allocate_ephemeral_port()?;
        Ok(self)
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn dir(mut self, dir: impl Into<String>) -> Self {
        self.config.dir = Some(dir.into());
        self
    }

    pub fn descriptor(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.descriptor = Some(path.into());
        self
    }

    pub fn keep_descriptor_ports(mut self, keep: bool) -> Self {
        self.config.keep_descriptor_ports = keep;
        self
    }

    pub fn skip_http(mut self, skip: bool) -> Self {
        self.config.skip_http = skip;
        self
    }

    pub fn ssl(mut self, ssl: bool) -> Self {
        self.config.ssl = ssl;
        self
    }

    pub fn keystore(
        mut self,
        file: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.config.keystore_file = Some(file.into());
        self.config.keystore_pass = Some(password.into());
        self
    }

    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.temp_dir = dir.into();
        self
    }

    pub fn conf(mut self, resource: impl Into<String>) -> Self {
        self.config.conf = Some(resource.into());
        self
    }

    pub fn delete_base_on_startup(mut self, delete: bool) -> Self {
        self.config.delete_base_on_startup = delete;
        self
    }

    pub fn use_shutdown_hook(mut self, hook: bool) -> Self {
        self.config.use_shutdown_hook = hook;
        self
    }

    pub fn access_log_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.config.access_log_pattern = Some(pattern.into());
        self
    }

    pub fn pid_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pid_file = Some(path.into());
        self
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.properties.insert(key.into(), value.into());
        self
    }

    pub fn user(mut self, name: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.users.insert(name.into(), password.into());
        self
    }

    pub fn role(mut self, user: impl Into<String>, roles: impl Into<String>) -> Self {
        self.config.roles.insert(user.into(), roles.into());
        self
    }

    pub fn connector(mut self, spec: ConnectorSpec) -> Self {
        self.config.connectors.push(spec);
        self
    }

    pub fn instance_customizer<F>(mut self, priority: i32, customizer: F) -> Self
    where
        F: Fn(&mut ContainerContext) + Send + Sync + 'static,
    {
        self.config.add_instance_customizer(priority, customizer);
        self
    }

    pub fn build(self) -> ServerConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bag(entries: &[(&str, &str)]) -> MergedConfiguration {
        MergedConfiguration::from_entries("test", entries.iter().copied())
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.http_port, 8080);
        assert_eq!(config.https_port, 8443);
        assert_eq!(config.stop_port, -1);
        assert_eq!(config.host, "localhost");
        assert_eq!(config.keystore_type, "PKCS12");
        assert!(config.delete_base_on_startup);
        assert!(config.use_shutdown_hook);
        assert_eq!(config.properties_resource, "hearth.properties");
        assert_eq!(config.active_protocol(), "http");
        assert_eq!(config.active_port(), 8080);
    }

    #[test]
    fn test_bind_scalars_and_aliases() {
        let mut config = ServerConfig::default();
        config
            .bind_bag(bag(&[
                ("http", "9090"),
                ("server-xml", "/tmp/server.xml"),
                ("ssl", "true"),
                ("keystore-pass", "secret"),
            ]))
            .unwrap();
        assert_eq!(config.http_port, 9090);
        assert_eq!(config.descriptor, Some(PathBuf::from("/tmp/server.xml")));
        assert!(config.ssl);
        assert_eq!(config.keystore_pass.as_deref(), Some("secret"));
        assert_eq!(config.active_protocol(), "https");
        assert_eq!(config.active_port(), 8443);
    }

    #[test]
    fn test_namespaced_collections() {
        let mut config = ServerConfig::default();
        config
            .bind_bag(bag(&[
                ("users.admin", "pw"),
                ("roles.admin", "ops,dev"),
                ("properties.banner", "off"),
                ("connector.maxPostSize", "1024"),
            ]))
            .unwrap();
        assert_eq!(config.users.get("admin").map(String::as_str), Some("pw"));
        assert_eq!(config.roles.get("admin").map(String::as_str), Some("ops,dev"));
        assert_eq!(config.property("banner"), Some("off"));
        assert_eq!(config.property("connector.maxPostSize"), Some("1024"));
    }

    #[test]
    fn test_login_config_built_from_namespaced_keys() {
        let mut config = ServerConfig::default();
        assert!(config.login_config.is_none());
        config
            .bind_bag(bag(&[
                ("login.auth-method", "FORM"),
                ("login.realm-name", "ops"),
                ("login.login-page", "/login"),
            ]))
            .unwrap();
        let login = config.login_config.as_ref().unwrap();
        assert_eq!(login.auth_method.as_deref(), Some("FORM"));
        assert_eq!(login.realm_name.as_deref(), Some("ops"));
        assert_eq!(login.login_page.as_deref(), Some("/login"));
        assert!(login.error_page.is_none());
    }

    #[test]
    fn test_clone_is_equal_but_independent() {
        let mut original = ServerConfig::default();
        original
            .bind_bag(bag(&[("http", "9191"), ("users.a", "b")]))
            .unwrap();
        let mut copy = original.clone();
        assert_eq!(original, copy);

        copy.http_port = 1;
        copy.users.insert("c".into(), "d".into());
        assert_ne!(original, copy);
        assert_eq!(original.http_port, 9191);
        assert_eq!(original.users.len(), 1);
    }

    #[test]
    fn test_extension_instance_is_stable() {
        #[derive(Debug, Default)]
        struct Extra {
            flavor: String,
        }

        impl OptionSet for Extra {
            fn descriptors() -> &'static [OptionDescriptor<Self>] {
                static TABLE: &[OptionDescriptor<Extra>] = &[OptionDescriptor {
                    key: "extra.flavor",
                    aliases: &[],
                    description: "",
                    kind: OptionKind::Str,
                    set: |e, v| {
                        if let OptionValue::Str(value) = v {
                            e.flavor = value;
                        }
                    },
                }];
                TABLE
            }
        }

        let mut config = ServerConfig::default();
        config.bind_bag(bag(&[("extra.flavor", "oak")])).unwrap();
        let first = config.extension::<Extra>().unwrap();
        let second = config.extension::<Extra>().unwrap();
        assert_eq!(first.flavor, "oak");
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_builder_round() {
        let config = ServerConfig::builder()
            .http_port(8888)
            .host("0.0.0.0")
            .skip_http(true)
            .user("admin", "pw")
            .property("banner", "off")
            .build();
        assert_eq!(config.http_port, 8888);
        assert_eq!(config.host, "0.0.0.0");
        assert!(config.skip_http);
        assert_eq!(config.property("banner"), Some("off"));
    }

    #[test]
    fn test_customizers_run_in_priority_order() {
        use std::sync::Mutex;
        let order: Arc<Mutex<Vec<i32>>> = Arc::new(Mutex::new(Vec::new()));
        let mut config = ServerConfig::default();
        for priority in [20, 10, 30] {
            let order = Arc::clone(&order);
            config.add_instance_customizer(priority, move |_| {
                order.lock().unwrap().push(priority);
            });
        }
        let mut ctx = ContainerContext::default();
        for customizer in config.customizers() {
            customizer(&mut ctx);
        }
        assert_eq!(*order.lock().unwrap(), vec![10, 20, 30]);
    }
}
