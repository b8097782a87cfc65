use std::any::type_name;
use std::fmt;
use std::sync::Arc;

use super::binder::{self, Args};
use super::manifest::{self, Param};
use super::registry::Registry;
use crate::config::Conf;
use crate::context::Context;
use crate::error::Result;

/// An action type, as authored.
///
/// Each type supplies a static parameter table (`params`) and a canonical constructor
/// (`construct`) that consumes exactly those parameters; `Default` is the
/// no-argument prototype kept in the registry. Everything else (identity, category,
/// usage text, config binding) is derived through [`DynAction`].
pub trait Action: Default + fmt::Debug + Send + Sync + 'static {
    /// One-line description shown in usage text.
    const DESCRIPTION: &'static str;

    /// Ordered parameter descriptors of the canonical constructor.
    fn params() -> Vec<Param>;

    /// Canonical constructor. Must read every declared parameter and nothing else.
    fn construct(args: &mut Args) -> Result<Self>;

    fn execute(&self, ctx: &Context) -> anyhow::Result<()>;
}

/// Object-safe action capability used by the registry, binder and case runner.
pub trait DynAction: fmt::Debug + Send + Sync {
    fn identity(&self) -> &'static str;

    fn category(&self) -> &'static str;

    /// Human-readable signature, rendered once per identity.
    fn usage(&self) -> Arc<str>;

    /// Build a new instance of this action type from a config subtree.
    fn bind(&self, conf: &Conf, registry: &Registry) -> Result<BoxedAction>;

    fn execute(&self, ctx: &Context) -> anyhow::Result<()>;
}

pub type BoxedAction = Box<dyn DynAction>;

impl<T: Action> DynAction for T {
    fn identity(&self) -> &'static str {
        identity_of::<T>()
    }

    fn category(&self) -> &'static str {
        category_of::<T>()
    }

    fn usage(&self) -> Arc<str> {
        manifest::usage::<T>()
    }

    fn bind(&self, conf: &Conf, registry: &Registry) -> Result<BoxedAction> {
        binder::bind::<T>(conf, registry)
    }

    fn execute(&self, ctx: &Context) -> anyhow::Result<()> {
        Action::execute(self, ctx)
    }
}

/// Identity of an action type: its simple type name (`ShowVar`).
pub fn identity_of<T: ?Sized>() -> &'static str {
    type_name::<T>().rsplit("::").next().unwrap_or_default()
}

/// Category of an action type: the name of the module declaring it (`common`).
pub fn category_of<T: ?Sized>() -> &'static str {
    type_name::<T>().rsplit("::").nth(1).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    mod sample {
        pub struct Probe;
    }

    #[test]
    fn identity_and_category_come_from_the_type_path() {
        assert_eq!(identity_of::<sample::Probe>(), "Probe");
        assert_eq!(category_of::<sample::Probe>(), "sample");
    }
}
