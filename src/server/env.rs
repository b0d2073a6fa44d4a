//! Scoped environment variable overlays.
//!
//! A running instance may need environment variables set for its lifetime
//! (integration hand-off, tooling spawned from deployments). Instead of
//! mutating the process environment permanently, an overlay records the
//! previous state and the guard restores it when the instance closes.

use std::collections::BTreeMap;

/// Variables to set for the lifetime of an instance.
#[derive(Debug, Clone, Default)]
pub struct EnvOverlay {
    vars: BTreeMap<String, String>,
}

impl EnvOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Apply the overlay, recording the previous value of every variable.
    pub fn apply(&self) -> EnvGuard {
        let mut saved = Vec::with_capacity(self.vars.len());
        for (name, value) in &self.vars {
            saved.push((name.clone(), std::env::var(name).ok()));
            std::env::set_var(name, value);
        }
        EnvGuard { saved }
    }
}

/// Restores the environment captured by [`EnvOverlay::apply`].
#[derive(Debug)]
pub struct EnvGuard {
    saved: Vec<(String, Option<String>)>,
}

impl EnvGuard {
    /// Put every overlaid variable back to its previous state.
    pub fn restore(self) {
        for (name, previous) in self.saved {
            match previous {
                Some(value) => std::env::set_var(&name, value),
                None => std::env::remove_var(&name),
            }
        }
    }
}
