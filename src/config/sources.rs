//! Property source discovery and merging.
//!
//! # Responsibilities
//! - Discover every resource with a logical name across the ordered
//!   resource roots (the embedded equivalent of a classpath search)
//! - Parse each hit as a property bag (`key=value`, `#`/`!` comments)
//! - Merge the bags into one configuration under the complete-source rules
//!
//! # Design Decisions
//! - Exactly one `configuration.complete=true` bag suppresses all siblings;
//!   two or more is an error, never a silent pick
//! - Without a complete source, bags merge in discovery order and the last
//!   writer wins per key; `configuration.ordinal` is advisory metadata only
//! - A logical name that matches nothing falls back to a literal file path

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::ConfigError;

/// Reserved key marking a bag as the sole authoritative source.
pub const COMPLETE_KEY: &str = "configuration.complete";
/// Reserved key carrying the advisory ordering hint of a bag.
pub const ORDINAL_KEY: &str = "configuration.ordinal";

const DEFAULT_ORDINAL: i32 = 100;

/// One discovered set of raw key/value entries.
#[derive(Debug, Clone)]
pub struct PropertyBag {
    /// Where the bag was read from.
    pub origin: PathBuf,
    /// Entries in file order.
    pub entries: Vec<(String, String)>,
    /// Advisory ordering hint (`configuration.ordinal`).
    pub ordinal: i32,
    /// Whether the bag claims to be authoritative.
    pub complete: bool,
}

impl PropertyBag {
    /// Parse `key=value` text. Lines starting with `#` or `!` are comments;
    /// blank lines are skipped; keys and values are trimmed.
    pub fn parse(origin: impl Into<PathBuf>, content: &str) -> Self {
        let mut entries = Vec::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                entries.push((key.trim().to_string(), value.trim().to_string()));
            }
        }
        let lookup = |wanted: &str| {
            entries
                .iter()
                .rev()
                .find(|(k, _)| k == wanted)
                .map(|(_, v)| v.as_str())
        };
        let complete = lookup(COMPLETE_KEY).is_some_and(|v| v.eq_ignore_ascii_case("true"));
        let ordinal = lookup(ORDINAL_KEY)
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_ORDINAL);
        Self {
            origin: origin.into(),
            entries,
            ordinal,
            complete,
        }
    }
}

/// The single bag produced by merging all discovered sources.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedConfiguration {
    resource: String,
    entries: BTreeMap<String, String>,
}

impl MergedConfiguration {
    /// Build a bag programmatically (CLI overrides, tests).
    pub fn from_entries<I, K, V>(resource: impl Into<String>, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            resource: resource.into(),
            entries: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Logical name this bag was resolved for.
    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fold another bag into this one (later passes win).
    pub fn extend(&mut self, other: &MergedConfiguration) {
        for (k, v) in other.iter() {
            self.entries.insert(k.to_string(), v.to_string());
        }
    }
}

/// Ordered search path for property resources, configuration directories
/// and packaged certificates.
#[derive(Debug, Clone)]
pub struct PropertySources {
    roots: Vec<PathBuf>,
}

impl Default for PropertySources {
    fn default() -> Self {
        Self {
            roots: vec![PathBuf::from(".")],
        }
    }
}

impl PropertySources {
    pub fn new(roots: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        Self {
            roots: roots.into_iter().map(Into::into).collect(),
        }
    }

    /// Resolve a relative resource name to the first root containing it.
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        self.roots
            .iter()
            .map(|root| root.join(name))
            .find(|candidate| candidate.is_file())
    }

    /// Resolve a relative resource name to the first root holding it as a
    /// directory.
    pub fn resolve_dir(&self, name: &str) -> Option<PathBuf> {
        self.roots
            .iter()
            .map(|root| root.join(name))
            .find(|candidate| candidate.is_dir())
    }

    /// Discover and merge every source named `resource`.
    pub fn merge(&self, resource: &str) -> Result<MergedConfiguration, ConfigError> {
        let mut bags = Vec::new();
        for root in &self.roots {
            let candidate = root.join(resource);
            if candidate.is_file() {
                bags.push(read_bag(&candidate)?);
            }
        }
        if bags.is_empty() {
            // fall back to the logical name as a literal path
            let literal = Path::new(resource);
            if literal.is_file() {
                bags.push(read_bag(literal)?);
            }
        }

        let complete: Vec<&PropertyBag> = bags.iter().filter(|b| b.complete).collect();
        if complete.len() > 1 {
            return Err(ConfigError::ConflictingCompleteSource {
                resource: resource.to_string(),
            });
        }

        let mut merged = MergedConfiguration {
            resource: resource.to_string(),
            entries: BTreeMap::new(),
        };
        if let Some(master) = complete.first() {
            tracing::debug!(
                resource,
                origin = %master.origin.display(),
                "complete source found, siblings discarded"
            );
            for (k, v) in &master.entries {
                merged.entries.insert(k.clone(), v.clone());
            }
            return Ok(merged);
        }

        for bag in &bags {
            for (k, v) in &bag.entries {
                merged.entries.insert(k.clone(), v.clone());
            }
        }
        tracing::debug!(resource, sources = bags.len(), keys = merged.len(), "sources merged");
        Ok(merged)
    }
}

fn read_bag(path: &Path) -> Result<PropertyBag, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::ResourceUnreadable {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(PropertyBag::parse(path, &content))
}
