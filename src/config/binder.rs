//! Applies a merged bag to a typed configuration object.
//!
//! # Responsibilities
//! - Resolve `${...}` placeholders (environment first, the bag as fallback)
//! - Run the value transformer chain
//! - Coerce to the descriptor's semantic type and assign
//! - Route namespaced keys to the option set's collection hook
//!
//! # Design Decisions
//! - Any single coercion failure aborts the whole pass; a partially bound
//!   object is never considered valid
//! - Unresolvable placeholders are left literal (see DESIGN.md)
//! - A port option bound from the literal `-1` receives an OS-assigned
//!   ephemeral port; the caller must bind it promptly to keep the window small

use std::net::TcpListener;

use crate::config::options::{OptionKind, OptionSet, OptionValue};
use crate::config::sources::MergedConfiguration;
use crate::config::transform::ValueTransformers;
use crate::config::ConfigError;

const MAX_SUBSTITUTION_DEPTH: usize = 10;

/// Bind every matching entry of `bag` onto `target`.
///
/// Scalar descriptors are bound first (primary key, then aliases); keys that
/// match no scalar descriptor are offered to `apply_namespaced`.
pub fn bind<T: OptionSet>(
    target: &mut T,
    bag: &MergedConfiguration,
    transformers: &ValueTransformers,
) -> Result<(), ConfigError> {
    for descriptor in T::descriptors() {
        let raw = bag.get(descriptor.key).or_else(|| {
            descriptor
                .aliases
                .iter()
                .find_map(|alias| bag.get(alias))
        });
        let Some(raw) = raw else { continue };
        if raw.trim().is_empty() {
            continue;
        }
        let effective = transformers.apply(&substitute(raw, bag))?;
        let value = coerce(descriptor.kind, descriptor.key, &effective)?;
        (descriptor.set)(target, value);
    }

    for (key, raw) in bag.iter() {
        if raw.trim().is_empty() {
            continue;
        }
        if T::descriptors().iter().any(|d| d.matches(key)) {
            continue;
        }
        let effective = transformers.apply(&substitute(raw, bag))?;
        target.apply_namespaced(key, &effective, bag)?;
    }
    Ok(())
}

/// Resolve `${name}` placeholders against the process environment first and
/// the bag itself as fallback. Unresolvable placeholders stay literal.
pub fn substitute(input: &str, bag: &MergedConfiguration) -> String {
    substitute_with(input, &|name| {
        std::env::var(name)
            .ok()
            .or_else(|| bag.get(name).map(str::to_string))
    })
}

/// Placeholder resolution against an arbitrary resolver, recursing into
/// replacement text up to a fixed depth.
pub fn substitute_with(input: &str, resolver: &dyn Fn(&str) -> Option<String>) -> String {
    let mut current = input.to_string();
    for _ in 0..MAX_SUBSTITUTION_DEPTH {
        let (next, changed) = substitute_once(&current, resolver);
        current = next;
        if !changed {
            break;
        }
    }
    current
}

fn substitute_once(input: &str, resolver: &dyn Fn(&str) -> Option<String>) -> (String, bool) {
    let mut out = String::with_capacity(input.len());
    let mut changed = false;
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        let Some(end) = rest[start + 2..].find('}') else {
            break;
        };
        let end = start + 2 + end;
        let name = &rest[start + 2..end];
        out.push_str(&rest[..start]);
        match resolver(name) {
            Some(value) => {
                out.push_str(&value);
                changed = true;
            }
            None => out.push_str(&rest[start..=end]),
        }
        rest = &rest[end + 1..];
    }
    out.push_str(rest);
    (out, changed)
}

fn coerce(kind: OptionKind, key: &str, value: &str) -> Result<OptionValue, ConfigError> {
    match kind {
        OptionKind::Str => Ok(OptionValue::Str(value.to_string())),
        OptionKind::Int => parse_i32(key, value).map(OptionValue::Int),
        OptionKind::Long => value
            .parse::<i64>()
            .map(OptionValue::Long)
            .map_err(|_| invalid(key, value)),
        // absence of an exact `true` means false, never an error
        OptionKind::Bool => Ok(OptionValue::Bool(value.eq_ignore_ascii_case("true"))),
        OptionKind::File => Ok(OptionValue::File(value.into())),
        OptionKind::Port => {
            if value == "-1" {
                allocate_ephemeral_port().map(OptionValue::Int)
            } else {
                parse_i32(key, value).map(OptionValue::Int)
            }
        }
    }
}

fn parse_i32(key: &str, value: &str) -> Result<i32, ConfigError> {
    value.parse::<i32>().map_err(|_| invalid(key, value))
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidNumericValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

/// Bind a socket to port 0, read back the OS-assigned port, release it.
///
/// The returned port is free at allocation time only; callers that want the
/// guarantee must bind it immediately.
pub fn allocate_ephemeral_port() -> Result<i32, ConfigError> {
    let listener =
        TcpListener::bind(("127.0.0.1", 0)).map_err(ConfigError::PortAllocation)?;
    let port = listener
        .local_addr()
        .map_err(ConfigError::PortAllocation)?
        .port();
    Ok(i32::from(port))
}
