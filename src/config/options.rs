//! Option descriptors: the static registry mapping external keys to fields.
//!
//! # Responsibilities
//! - Describe every externally-settable option of a configuration type
//!   (primary key, aliases, semantic type, human description)
//! - Provide the typed setter used by the binder
//!
//! # Design Decisions
//! - Tables are `static` and built at compile time; no reflection anywhere
//! - Declaration order of the table is the binding order (stable)
//! - Namespaced keys (`users.*`, `connector.*`, ...) bypass the scalar table
//!   and are routed through `OptionSet::apply_namespaced`

use std::path::PathBuf;

use crate::config::sources::MergedConfiguration;
use crate::config::ConfigError;

/// Semantic type of an option value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    Str,
    Int,
    Long,
    Bool,
    File,
    /// An `Int` that supports ephemeral allocation when bound from `-1`.
    Port,
}

/// A coerced option value, ready for assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    Str(String),
    Int(i32),
    Long(i64),
    Bool(bool),
    File(PathBuf),
}

/// One externally-settable option of a configuration type.
pub struct OptionDescriptor<T> {
    /// Primary key as it appears in property sources.
    pub key: &'static str,
    /// Accepted alternative keys.
    pub aliases: &'static [&'static str],
    /// Human description, surfaced by the CLI help.
    pub description: &'static str,
    /// Semantic type driving coercion.
    pub kind: OptionKind,
    /// Typed setter invoked by the binder.
    pub set: fn(&mut T, OptionValue),
}

impl<T> OptionDescriptor<T> {
    /// Returns true if `key` is the primary key or one of the aliases.
    pub fn matches(&self, key: &str) -> bool {
        self.key == key || self.aliases.contains(&key)
    }
}

/// A configuration type whose fields can be bound from a merged bag.
///
/// `'static` because the descriptor table borrows the implementing type in
/// a `static` item.
pub trait OptionSet: Sized + 'static {
    /// The immutable descriptor table for this type, in declaration order.
    fn descriptors() -> &'static [OptionDescriptor<Self>];

    /// Hook for keys that do not match any scalar descriptor (namespaced
    /// prefixes, nested builders). The default ignores them.
    fn apply_namespaced(
        &mut self,
        _key: &str,
        _value: &str,
        _bag: &MergedConfiguration,
    ) -> Result<(), ConfigError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Sample {
        name: String,
    }

    impl OptionSet for Sample {
        fn descriptors() -> &'static [OptionDescriptor<Self>] {
            static TABLE: &[OptionDescriptor<Sample>] = &[OptionDescriptor {
                key: "name",
                aliases: &["label"],
                description: "A name",
                kind: OptionKind::Str,
                set: |s, v| {
                    if let OptionValue::Str(value) = v {
                        s.name = value;
                    }
                },
            }];
            TABLE
        }
    }

    #[test]
    fn test_descriptor_matches_aliases() {
        let d = &Sample::descriptors()[0];
        assert!(d.matches("name"));
        assert!(d.matches("label"));
        assert!(!d.matches("other"));
    }

    #[test]
    fn test_setter_assigns() {
        let mut s = Sample::default();
        (Sample::descriptors()[0].set)(&mut s, OptionValue::Str("hearth".into()));
        assert_eq!(s.name, "hearth");
    }
}
