//! Path-addressed, typed view over a JSON configuration tree.
//!
//! Paths are dotted (`"browser.viewport.width"`); the empty path addresses the root.
//! A JSON `null` is treated as absent, so `has_path` is false for it.
//!
//! Scalar reads are lenient the way HOCON-style configs usually are: numeric strings
//! read as numbers, scalars read as strings, `"yes"`/`"off"` read as booleans and
//! durations accept either plain milliseconds or `<amount><unit>` strings.

use std::collections::BTreeSet;
use std::time::Duration;

use serde_json::Value;

use crate::error::{EngineError, Result};

/// A configuration subtree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conf {
    root: Value,
}

impl Conf {
    pub fn new(root: Value) -> Self {
        Self { root }
    }

    /// The raw JSON behind this subtree.
    pub fn as_json(&self) -> &Value {
        &self.root
    }

    pub fn has_path(&self, path: &str) -> bool {
        self.lookup(path).is_some()
    }

    pub fn get_string(&self, path: &str) -> Result<String> {
        match self.required(path)? {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            _ => Err(EngineError::mismatch(path, "String")),
        }
    }

    pub fn get_int(&self, path: &str) -> Result<i32> {
        let v = self.get_long(path)?;
        i32::try_from(v).map_err(|_| EngineError::mismatch(path, "Integer"))
    }

    pub fn get_long(&self, path: &str) -> Result<i64> {
        match self.required(path)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
        .ok_or_else(|| EngineError::mismatch(path, "Long"))
    }

    pub fn get_double(&self, path: &str) -> Result<f64> {
        match self.required(path)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
        .ok_or_else(|| EngineError::mismatch(path, "Double"))
    }

    pub fn get_bool(&self, path: &str) -> Result<bool> {
        match self.required(path)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" => Some(true),
                "false" | "no" | "off" => Some(false),
                _ => None,
            },
            _ => None,
        }
        .ok_or_else(|| EngineError::mismatch(path, "Boolean"))
    }

    /// Read a duration. Plain numbers are milliseconds.
    pub fn get_duration(&self, path: &str) -> Result<Duration> {
        match self.required(path)? {
            Value::Number(n) => n
                .as_u64()
                .map(Duration::from_millis)
                .or_else(|| n.as_f64().and_then(|ms| duration_from(ms, 1_000_000.0))),
            Value::String(s) => parse_duration(s),
            _ => None,
        }
        .ok_or_else(|| EngineError::mismatch(path, "Duration"))
    }

    pub fn get_subtree(&self, path: &str) -> Result<Conf> {
        match self.required(path)? {
            v @ Value::Object(_) => Ok(Conf::new(v.clone())),
            _ => Err(EngineError::mismatch(path, "object")),
        }
    }

    pub fn get_subtree_list(&self, path: &str) -> Result<Vec<Conf>> {
        match self.required(path)? {
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, v)| match v {
                    Value::Object(_) => Ok(Conf::new(v.clone())),
                    _ => Err(EngineError::mismatch(format!("{path}.{i}"), "object")),
                })
                .collect(),
            _ => Err(EngineError::mismatch(path, "list of objects")),
        }
    }

    pub fn get_string_list(&self, path: &str) -> Result<Vec<String>> {
        self.list_of(path, "list of String", |v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        })
    }

    pub fn get_long_list(&self, path: &str) -> Result<Vec<i64>> {
        self.list_of(path, "list of Long", |v| match v {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
    }

    /// Keys of the object at `path` (or of the root when `path` is `None`/empty).
    /// Anything that is not an object has no keys.
    pub fn keys(&self, path: Option<&str>) -> BTreeSet<String> {
        match self.lookup(path.unwrap_or_default()) {
            Some(Value::Object(map)) => map.keys().cloned().collect(),
            _ => BTreeSet::new(),
        }
    }

    /// Optional read: `Ok(None)` when the path is absent, otherwise the typed getter's result.
    pub fn maybe<T>(&self, path: &str, get: impl FnOnce(&Self, &str) -> Result<T>) -> Result<Option<T>> {
        if self.has_path(path) {
            get(self, path).map(Some)
        } else {
            Ok(None)
        }
    }

    fn list_of<T>(
        &self,
        path: &str,
        expected: &str,
        item: impl Fn(&Value) -> Option<T>,
    ) -> Result<Vec<T>> {
        match self.required(path)? {
            Value::Array(items) => items
                .iter()
                .map(|v| item(v).ok_or_else(|| EngineError::mismatch(path, expected)))
                .collect(),
            _ => Err(EngineError::mismatch(path, expected)),
        }
    }

    fn required(&self, path: &str) -> Result<&Value> {
        self.lookup(path).ok_or_else(|| EngineError::missing(path))
    }

    fn lookup(&self, path: &str) -> Option<&Value> {
        let mut current = &self.root;
        if !path.is_empty() {
            for seg in path.split('.') {
                current = current.as_object()?.get(seg)?;
            }
        }
        (!current.is_null()).then_some(current)
    }
}

impl From<Value> for Conf {
    fn from(root: Value) -> Self {
        Self::new(root)
    }
}

/// Parse `"250ms"`, `"1.5 s"`, `"2 minutes"`, `"30"` (milliseconds) and friends.
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let s = raw.trim();
    let split = s
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(s.len());
    let (amount, unit) = s.split_at(split);
    let amount: f64 = amount.trim().parse().ok()?;
    let nanos_per_unit = match unit.trim().to_ascii_lowercase().as_str() {
        "ns" | "nano" | "nanos" | "nanosecond" | "nanoseconds" => 1.0,
        "us" | "micro" | "micros" | "microsecond" | "microseconds" => 1_000.0,
        "" | "ms" | "milli" | "millis" | "millisecond" | "milliseconds" => 1_000_000.0,
        "s" | "second" | "seconds" => 1_000_000_000.0,
        "m" | "minute" | "minutes" => 60_000_000_000.0,
        "h" | "hour" | "hours" => 3_600_000_000_000.0,
        "d" | "day" | "days" => 86_400_000_000_000.0,
        _ => return None,
    };
    duration_from(amount, nanos_per_unit)
}

fn duration_from(amount: f64, nanos_per_unit: f64) -> Option<Duration> {
    let nanos = amount * nanos_per_unit;
    (nanos.is_finite() && nanos >= 0.0).then(|| Duration::from_nanos(nanos.round() as u64))
}
