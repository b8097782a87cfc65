#![forbid(unsafe_code)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! Casebot: a declarative action runner. Scripts list named, parameterized actions; the
//! engine binds each one from its config subtree, runs them in order against a shared
//! context, and tears down the resources they acquire.
//!
//! Modules:
//! - `config`: document models, the path-addressed `Conf` surface, loading and schema helpers.
//! - `context`: the shared named-value store and its resource teardown queue.
//! - `engine`: action contract, parameter manifests, binder and registry.
//! - `actions`: the built-in action catalog.
//! - `executor`: cases and the run driver.
//! - `utils`: `{{var}}` interpolation.
//!
//! Use `casebot::prelude::*` to bring commonly used items into scope quickly.

pub mod actions;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod executor;
pub mod utils;

pub use error::EngineError;

/// Crate-level constants for consumers that want to inspect package metadata at runtime.
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns the crate version (e.g., "0.1.0").
#[inline]
pub const fn version() -> &'static str {
    PKG_VERSION
}

/// Parse a simple level name (trace|debug|info|warn|error).
pub fn parse_level(raw: &str) -> Option<tracing::Level> {
    use tracing::Level;
    match raw.trim().to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" | "warning" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

/// Initialize tracing (logging).
/// - `level` wins when given, otherwise `RUST_LOG` is read as a simple level name.
/// - Falls back to `info`.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init_tracing(level: Option<&str>) {
    let level = level
        .map(str::to_string)
        .or_else(|| std::env::var("RUST_LOG").ok())
        .and_then(|s| parse_level(&s))
        .unwrap_or(tracing::Level::INFO);

    // Ignore the error if the global subscriber was already set.
    let _ = tracing_subscriber::fmt().with_max_level(level).try_init();
}

/// A convenient set of exports for most consumers.
///
/// Bring this into scope with:
/// `use casebot::prelude::*;`
pub mod prelude {
    pub use anyhow::{Context as _, Error, Result, anyhow, bail, ensure};

    pub use tracing::{debug, error, info, trace, warn};

    pub use crate::config::{Conf, GlobalDocument};
    pub use crate::context::{Context, FromValue, Resource, Value};
    pub use crate::engine::{
        Action, Args, BoxedAction, DynAction, Param, ParamType, Registry, readers, register,
    };
    pub use crate::error::EngineError;
    pub use crate::executor::{Case, Driver};
}
