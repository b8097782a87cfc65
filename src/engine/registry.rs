use std::collections::BTreeMap;
use std::sync::OnceLock;

use tracing::{debug, trace};

use super::action::{Action, BoxedAction, DynAction, identity_of};
use super::binder;
use crate::config::Conf;
use crate::error::{EngineError, Result};

/// Config field naming the action a subtree instantiates.
pub const ACTION_FIELD: &str = "action";

/// Identity-keyed table of action prototypes. Immutable once built.
#[derive(Debug, Default)]
pub struct Registry {
    entries: BTreeMap<&'static str, BoxedAction>,
}

/// One row of the action listing used for help text.
#[derive(Debug, Clone)]
pub struct ActionInfo {
    pub identity: &'static str,
    pub category: &'static str,
    pub usage: std::sync::Arc<str>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Prototype registered under `identity`.
    pub fn resolve(&self, identity: &str) -> Result<&dyn DynAction> {
        self.entries
            .get(identity)
            .map(|proto| proto.as_ref())
            .ok_or_else(|| EngineError::UnknownAction(identity.to_string()))
    }

    /// Resolve the subtree's `action` field and bind the rest of the subtree to it.
    pub fn bind(&self, conf: &Conf) -> Result<BoxedAction> {
        let identity = conf.get_string(ACTION_FIELD)?;
        trace!(target: "casebot::registry", action = %identity, "Binding action subtree");
        self.resolve(&identity)?.bind(conf, self)
    }

    /// Every registered action, ordered by identity. Callers regroup as they need.
    pub fn list(&self) -> Vec<ActionInfo> {
        self.entries
            .values()
            .map(|proto| ActionInfo {
                identity: proto.identity(),
                category: proto.category(),
                usage: proto.usage(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Collects action types, building each factory eagerly so manifest defects
/// (unsupported parameter types, duplicate identities) surface at startup.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    entries: BTreeMap<&'static str, BoxedAction>,
    error: Option<EngineError>,
}

impl RegistryBuilder {
    pub fn with<T: Action>(mut self) -> Self {
        if self.error.is_some() {
            return self;
        }
        let identity = identity_of::<T>();
        if self.entries.contains_key(identity) {
            self.error = Some(EngineError::DuplicateAction(identity.to_string()));
            return self;
        }
        match binder::factory::<T>() {
            Ok(_) => {
                self.entries.insert(identity, Box::new(T::default()));
            }
            Err(err) => self.error = Some(err),
        }
        self
    }

    pub fn build(self) -> Result<Registry> {
        if let Some(err) = self.error {
            return Err(err);
        }
        debug!(target: "casebot::registry", actions = self.entries.len(), "Registry built");
        Ok(Registry {
            entries: self.entries,
        })
    }
}

static GLOBAL: OnceLock<Registry> = OnceLock::new();

/// Build the process-wide registry from the built-in catalog. Idempotent: later calls
/// return the registry built first.
pub fn register() -> Result<&'static Registry> {
    if let Some(registry) = GLOBAL.get() {
        return Ok(registry);
    }
    let registry = crate::actions::catalog().build()?;
    Ok(GLOBAL.get_or_init(|| registry))
}

/// The process-wide registry, if `register` already ran.
pub fn global() -> Option<&'static Registry> {
    GLOBAL.get()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::engine::binder::Args;
    use crate::engine::manifest::{Param, ParamType};
    use serde_json::json;

    mod probes {
        use super::*;

        #[derive(Debug, Default)]
        pub struct Ping;

        impl Action for Ping {
            const DESCRIPTION: &'static str = "ping.";

            fn params() -> Vec<Param> {
                vec![Param::new("label", ParamType::String).optional()]
            }

            fn construct(args: &mut Args) -> Result<Self> {
                let _: Option<String> = args.take_opt("label")?;
                Ok(Self)
            }

            fn execute(&self, _: &Context) -> anyhow::Result<()> {
                Ok(())
            }
        }
    }

    #[test]
    fn resolve_returns_prototype_with_same_identity() {
        let registry = Registry::builder().with::<probes::Ping>().build().unwrap();
        let proto = registry.resolve("Ping").unwrap();
        assert_eq!(proto.identity(), "Ping");
        assert_eq!(proto.category(), "probes");
        assert!(matches!(
            registry.resolve("Pong"),
            Err(EngineError::UnknownAction(name)) if name == "Pong"
        ));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let err = Registry::builder()
            .with::<probes::Ping>()
            .with::<probes::Ping>()
            .build()
            .unwrap_err();
        assert!(matches!(err, EngineError::DuplicateAction(name) if name == "Ping"));
    }

    #[test]
    fn bind_dispatches_on_the_action_field() {
        let registry = Registry::builder().with::<probes::Ping>().build().unwrap();
        let bound = registry
            .bind(&Conf::new(json!({ "action": "Ping", "label": "x" })))
            .unwrap();
        assert_eq!(bound.identity(), "Ping");
        match registry.bind(&Conf::new(json!({ "label": "x" }))) {
            Err(EngineError::MissingField { field }) => assert_eq!(field, ACTION_FIELD),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn global_registry_resolves_every_listed_identity() {
        let registry = register().unwrap();
        assert!(std::ptr::eq(registry, register().unwrap()));
        let listed = registry.list();
        assert_eq!(listed.len(), registry.len());
        for info in listed {
            assert_eq!(registry.resolve(info.identity).unwrap().identity(), info.identity);
            assert!(info.usage.contains(info.identity));
        }
    }
}
