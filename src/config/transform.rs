//! Pluggable transformation of raw option values.
//!
//! Values carrying the reserved `decode:<algorithm>:<payload>` prefix are
//! handed to the transformer registered for `<algorithm>` before coercion;
//! everything else passes through untouched. Transformers registered
//! process-wide are folded into a chain lazily, the first time a prefixed
//! value is seen by that chain.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use crate::config::ConfigError;

const PREFIX: &str = "decode:";

/// A named transformer for prefixed option values.
pub trait ValueTransformer: Send + Sync {
    /// Algorithm name matched against `decode:<algorithm>:`.
    fn name(&self) -> &str;

    /// Transform the payload (the text after the second colon).
    fn transform(&self, payload: &str) -> String;
}

fn global_registry() -> &'static RwLock<Vec<Arc<dyn ValueTransformer>>> {
    static GLOBAL: OnceLock<RwLock<Vec<Arc<dyn ValueTransformer>>>> = OnceLock::new();
    GLOBAL.get_or_init(|| RwLock::new(Vec::new()))
}

/// The transformer chain applied to every raw value before coercion.
///
/// Referentially safe: a non-prefixed value (including any transformer
/// output) is returned unchanged, so repeated application cannot
/// double-transform.
#[derive(Default)]
pub struct ValueTransformers {
    chain: RwLock<HashMap<String, Arc<dyn ValueTransformer>>>,
}

impl ValueTransformers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a transformer process-wide. Chains pick it up lazily.
    pub fn register_global(transformer: Arc<dyn ValueTransformer>) {
        global_registry()
            .write()
            .expect("transformer registry poisoned")
            .push(transformer);
    }

    /// Register a transformer on this chain only.
    pub fn register(&self, transformer: Arc<dyn ValueTransformer>) {
        self.chain
            .write()
            .expect("transformer chain poisoned")
            .insert(transformer.name().to_string(), transformer);
    }

    /// Apply the chain to one raw value.
    pub fn apply(&self, raw: &str) -> Result<String, ConfigError> {
        let Some(rest) = raw.strip_prefix(PREFIX) else {
            return Ok(raw.to_string());
        };
        let Some((algorithm, payload)) = rest.split_once(':') else {
            return Err(ConfigError::UnknownTransformAlgorithm(rest.to_string()));
        };
        let transformer = self
            .lookup(algorithm)
            .ok_or_else(|| ConfigError::UnknownTransformAlgorithm(algorithm.to_string()))?;
        Ok(transformer.transform(payload))
    }

    fn lookup(&self, algorithm: &str) -> Option<Arc<dyn ValueTransformer>> {
        if let Some(found) = self
            .chain
            .read()
            .expect("transformer chain poisoned")
            .get(algorithm)
        {
            return Some(found.clone());
        }
        // miss: fold in process-wide registrations, then retry
        let mut chain = self.chain.write().expect("transformer chain poisoned");
        for t in global_registry()
            .read()
            .expect("transformer registry poisoned")
            .iter()
        {
            chain.entry(t.name().to_string()).or_insert_with(|| t.clone());
        }
        chain.get(algorithm).cloned()
    }
}

impl std::fmt::Debug for ValueTransformers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let chain = self.chain.read().expect("transformer chain poisoned");
        f.debug_struct("ValueTransformers")
            .field("algorithms", &chain.keys().collect::<Vec<_>>())
            .finish()
    }
}
