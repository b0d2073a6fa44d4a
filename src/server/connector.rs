//! Connector construction from configuration.
//!
//! # Responsibilities
//! - Build the plain and TLS connector specs the lifecycle hands to the
//!   container
//! - Fold `connector.*` properties into connector attributes and
//!   `connector.sslhostconfig[.<idx>].*` properties into TLS host configs
//! - Materialize keystore and truststore resources from the resource path
//!   into the instance conf directory
//!
//! # Design Decisions
//! - Scalar TLS options (`keystore-file`, `ssl-protocol`, ...) and the
//!   property namespace feed the same default host config; properties win
//!   because they are applied last

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::schema::ServerConfig;
use crate::config::sources::PropertySources;
use crate::server::LifecycleError;

const SSL_HOST_PREFIX: &str = "connector.sslhostconfig.";
const CONNECTOR_PREFIX: &str = "connector.";

/// TLS settings for one host name on an HTTPS connector.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SslHostConfig {
    pub host_name: Option<String>,
    pub keystore_file: Option<String>,
    pub keystore_password: Option<String>,
    pub keystore_type: Option<String>,
    pub key_alias: Option<String>,
    pub client_auth: Option<String>,
    pub truststore_file: Option<String>,
    pub chain_file: Option<String>,
    /// Attributes with no dedicated field, kept verbatim.
    pub extra: BTreeMap<String, String>,
}

impl SslHostConfig {
    /// Apply one attribute by its external (camelCase) name.
    pub fn set(&mut self, attribute: &str, value: &str) {
        let value_owned = value.to_string();
        match attribute {
            "hostName" => self.host_name = Some(value_owned),
            "keystoreFile" => self.keystore_file = Some(value_owned),
            "keystorePassword" => self.keystore_password = Some(value_owned),
            "keystoreType" => self.keystore_type = Some(value_owned),
            "keyAlias" => self.key_alias = Some(value_owned),
            "clientAuth" => self.client_auth = Some(value_owned),
            "truststoreFile" => self.truststore_file = Some(value_owned),
            "chainFile" => self.chain_file = Some(value_owned),
            _ => {
                self.extra.insert(attribute.to_string(), value_owned);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// One endpoint the container opens.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectorSpec {
    pub protocol: String,
    pub port: i32,
    pub secure: bool,
    pub scheme: String,
    pub attributes: BTreeMap<String, String>,
    pub ssl_host_configs: Vec<SslHostConfig>,
}

impl ConnectorSpec {
    pub fn http(port: i32) -> Self {
        Self {
            protocol: "HTTP/1.1".to_string(),
            port,
            secure: false,
            scheme: "http".to_string(),
            attributes: BTreeMap::new(),
            ssl_host_configs: Vec::new(),
        }
    }

    pub fn https(port: i32) -> Self {
        Self {
            protocol: "HTTP/1.1".to_string(),
            port,
            secure: true,
            scheme: "https".to_string(),
            attributes: BTreeMap::new(),
            ssl_host_configs: Vec::new(),
        }
    }

    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}

/// Build the configured connectors, plain first, TLS second.
///
/// Programmatic connectors from [`ServerConfig::connectors`] are appended by
/// the lifecycle afterwards and are not handled here.
pub fn build_connectors(
    config: &ServerConfig,
    sources: &PropertySources,
    conf_dir: &Path,
) -> Result<Vec<ConnectorSpec>, LifecycleError> {
    let mut built = Vec::new();

    if !config.skip_http {
        let mut plain = ConnectorSpec::http(config.http_port);
        apply_connector_attributes(config, &mut plain);
        plain
            .attributes
            .entry("connectionTimeout".to_string())
            .or_insert_with(|| "3000".to_string());
        built.push(plain);
    }

    if config.ssl {
        let mut tls = ConnectorSpec::https(config.https_port);
        apply_connector_attributes(config, &mut tls);
        if config.http2 {
            tls.attributes
                .insert("upgradeProtocol".to_string(), "h2".to_string());
        }
        if let Some(client_auth) = &config.client_auth {
            tls.attributes
                .insert("clientAuth".to_string(), client_auth.clone());
        }
        if let Some(name) = &config.default_ssl_host_config_name {
            tls.attributes
                .insert("defaultSSLHostConfigName".to_string(), name.clone());
        }

        tls.ssl_host_configs = build_ssl_host_configs(config, sources, conf_dir)?;
        built.push(tls);
    }

    Ok(built)
}

fn apply_connector_attributes(config: &ServerConfig, connector: &mut ConnectorSpec) {
    for (key, value) in &config.properties {
        let Some(rest) = key.strip_prefix(CONNECTOR_PREFIX) else {
            continue;
        };
        // single-segment keys only; sslhostconfig has its own namespace
        if rest.contains('.') {
            continue;
        }
        connector.attributes.insert(rest.to_string(), value.clone());
    }
}

fn build_ssl_host_configs(
    config: &ServerConfig,
    sources: &PropertySources,
    conf_dir: &Path,
) -> Result<Vec<SslHostConfig>, LifecycleError> {
    let mut default = SslHostConfig::default();
    if let Some(file) = &config.keystore_file {
        default.keystore_file = Some(file.clone());
    }
    if let Some(pass) = &config.keystore_pass {
        default.keystore_password = Some(pass.clone());
    }
    default.keystore_type = Some(config.keystore_type.clone());
    if let Some(alias) = &config.key_alias {
        default.key_alias = Some(alias.clone());
    }
    if let Some(protocol) = &config.ssl_protocol {
        default
            .extra
            .insert("sslProtocol".to_string(), protocol.clone());
    }

    let mut indexed: BTreeMap<usize, SslHostConfig> = BTreeMap::new();
    for (key, value) in &config.properties {
        let Some(rest) = key.strip_prefix(SSL_HOST_PREFIX) else {
            continue;
        };
        match rest.split_once('.') {
            Some((index, attribute)) => {
                if let Ok(index) = index.parse::<usize>() {
                    indexed.entry(index).or_default().set(attribute, value);
                }
            }
            None => default.set(rest, value),
        }
    }

    let mut configs = Vec::new();
    if !default.is_empty() {
        materialize_certificates(&mut default, sources, conf_dir)?;
        configs.push(default);
    }
    for (_, mut host_config) in indexed {
        materialize_certificates(&mut host_config, sources, conf_dir)?;
        configs.push(host_config);
    }
    Ok(configs)
}

/// Copy store resources that are not local files into the conf directory and
/// rewrite the attribute to the materialized path.
fn materialize_certificates(
    host_config: &mut SslHostConfig,
    sources: &PropertySources,
    conf_dir: &Path,
) -> Result<(), LifecycleError> {
    for slot in [
        &mut host_config.keystore_file,
        &mut host_config.truststore_file,
        &mut host_config.chain_file,
    ] {
        if let Some(name) = slot.as_deref() {
            if let Some(materialized) = materialize(name, sources, conf_dir)? {
                *slot = Some(materialized.display().to_string());
            }
        }
    }
    Ok(())
}

fn materialize(
    name: &str,
    sources: &PropertySources,
    conf_dir: &Path,
) -> Result<Option<PathBuf>, LifecycleError> {
    if Path::new(name).is_file() {
        return Ok(None);
    }
    let Some(resolved) = sources.resolve(name) else {
        return Ok(None);
    };
    let file_name = resolved
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| name.replace('/', "_").into());
    let target = conf_dir.join(file_name);
    fs::copy(&resolved, &target).map_err(|source| LifecycleError::Io {
        path: target.clone(),
        source,
    })?;
    tracing::debug!(resource = name, target = %target.display(), "certificate materialized");
    Ok(Some(target))
}
