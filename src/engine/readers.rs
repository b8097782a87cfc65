//! Named custom readers for composite parameters.
//!
//! A parameter declares one with `Param::read_with(&readers::STRING_MAP)`. Requiredness
//! is enforced by the binder before the reader runs, so readers only see present paths.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::binder::Arg;
use super::registry::Registry;
use crate::config::Conf;
use crate::error::{EngineError, Result};

/// A static reader that pulls one composite value out of a config subtree.
pub struct CustomReader {
    /// Where the reader is declared (usage/diagnostics).
    pub owner: &'static str,
    /// The reader's own name.
    pub field: &'static str,
    pub read: fn(&Conf, &str, &Registry) -> Result<Arg>,
}

impl fmt::Debug for CustomReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.owner, self.field)
    }
}

/// Object of string values, e.g. `{ "HTTP_PROXY": "...", "LANG": "en" }`.
pub static STRING_MAP: CustomReader = CustomReader {
    owner: "readers",
    field: "STRING_MAP",
    read: read_string_map,
};

/// List of strings, de-duplicated.
pub static STRING_SET: CustomReader = CustomReader {
    owner: "readers",
    field: "STRING_SET",
    read: read_string_set,
};

/// List of integers, de-duplicated.
pub static LONG_SET: CustomReader = CustomReader {
    owner: "readers",
    field: "LONG_SET",
    read: read_long_set,
};

/// A nested action definition, resolved and bound through the registry.
pub static ACTION: CustomReader = CustomReader {
    owner: "readers",
    field: "ACTION",
    read: read_action,
};

fn read_string_map(conf: &Conf, path: &str, _: &Registry) -> Result<Arg> {
    let sub = conf.get_subtree(path)?;
    let mut map = BTreeMap::new();
    if let Some(object) = sub.as_json().as_object() {
        for (key, value) in object {
            let value = Conf::new(value.clone())
                .get_string("")
                .map_err(|_| EngineError::mismatch(format!("{path}.{key}"), "String"))?;
            map.insert(key.clone(), value);
        }
    }
    Ok(Arg::StringMap(map))
}

fn read_string_set(conf: &Conf, path: &str, _: &Registry) -> Result<Arg> {
    conf.get_string_list(path)
        .map(|items| Arg::StringSet(items.into_iter().collect()))
}

fn read_long_set(conf: &Conf, path: &str, _: &Registry) -> Result<Arg> {
    conf.get_long_list(path)
        .map(|items| Arg::LongSet(items.into_iter().collect::<BTreeSet<_>>()))
}

fn read_action(conf: &Conf, path: &str, registry: &Registry) -> Result<Arg> {
    let sub = conf.get_subtree(path)?;
    registry
        .bind(&sub)
        .map(Arg::Action)
        .map_err(|err| nest(path, err))
}

/// Prefix field paths of a nested binding error with the parent path.
fn nest(path: &str, err: EngineError) -> EngineError {
    match err {
        EngineError::MissingField { field } => EngineError::missing(format!("{path}.{field}")),
        EngineError::TypeMismatch { field, expected } => {
            EngineError::mismatch(format!("{path}.{field}"), expected)
        }
        other => other,
    }
}
