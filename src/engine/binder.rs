//! Config-to-action binding.
//!
//! For each action type a factory is built once: one field reader per declared
//! parameter (custom reader first, otherwise the built-in reader for the scalar type)
//! plus the type's canonical constructor. Field readers are memoized process-wide by
//! `(parameter name, parameter type, owning action)`, with the owner keyed by `TypeId`
//! so types sharing a simple name stay apart; both caches are first-writer-wins and a
//! duplicate concurrent build is harmless.

use std::any::TypeId;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use dashmap::DashMap;
use serde_json::{Value as Json, json};
use tracing::trace;

use super::action::{Action, BoxedAction, identity_of};
use super::manifest::{self, Param, ParamType};
use super::registry::Registry;
use crate::config::Conf;
use crate::error::{EngineError, Result};

/// One extracted constructor argument.
#[derive(Debug)]
pub enum Arg {
    /// Optional parameter not present in the config.
    Absent,
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Bool(bool),
    Str(String),
    Duration(Duration),
    StringMap(BTreeMap<String, String>),
    StringSet(BTreeSet<String>),
    LongSet(BTreeSet<i64>),
    Action(BoxedAction),
}

/// Extraction function for one parameter. Holds no mutable state.
pub type FieldReader = Arc<dyn Fn(&Conf, &Registry) -> Result<Arg> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ReaderKey {
    name: &'static str,
    ty: ParamType,
    owner: TypeId,
}

static READERS: LazyLock<DashMap<ReaderKey, FieldReader>> = LazyLock::new(DashMap::new);
static FACTORIES: LazyLock<DashMap<TypeId, Arc<Factory>>> = LazyLock::new(DashMap::new);

/// Field reader for one parameter of action type `T`, memoized.
///
/// Fails with `UnsupportedParameterType` when the parameter is composite and declares
/// no custom reader.
pub fn build_reader<T: Action>(param: &Param) -> Result<FieldReader> {
    let key = ReaderKey {
        name: param.name,
        ty: param.ty,
        owner: TypeId::of::<T>(),
    };
    if let Some(found) = READERS.get(&key) {
        return Ok(Arc::clone(found.value()));
    }
    let reader = make_reader(identity_of::<T>(), param)?;
    Ok(Arc::clone(READERS.entry(key).or_insert(reader).value()))
}

fn make_reader(owner: &'static str, param: &Param) -> Result<FieldReader> {
    let name = param.name;
    let required = param.required;

    if let Some(custom) = param.reader {
        let read = custom.read;
        return Ok(Arc::new(move |conf: &Conf, registry: &Registry| {
            if conf.has_path(name) {
                read(conf, name, registry)
            } else if required {
                Err(EngineError::missing(name))
            } else {
                Ok(Arg::Absent)
            }
        }));
    }

    let scalar: fn(&Conf, &str) -> Result<Arg> = match param.ty {
        ParamType::Int => |c: &Conf, p: &str| c.get_int(p).map(Arg::Int),
        ParamType::Long => |c: &Conf, p: &str| c.get_long(p).map(Arg::Long),
        ParamType::Float => |c: &Conf, p: &str| c.get_double(p).map(|v| Arg::Float(v as f32)),
        ParamType::Double => |c: &Conf, p: &str| c.get_double(p).map(Arg::Double),
        ParamType::Bool => |c: &Conf, p: &str| c.get_bool(p).map(Arg::Bool),
        ParamType::String => |c: &Conf, p: &str| c.get_string(p).map(Arg::Str),
        ParamType::Duration => |c: &Conf, p: &str| c.get_duration(p).map(Arg::Duration),
        other => {
            return Err(EngineError::UnsupportedParameterType {
                action: owner.to_string(),
                param: name.to_string(),
                ty: other.label().to_string(),
            });
        }
    };
    Ok(Arc::new(move |conf: &Conf, _: &Registry| {
        if conf.has_path(name) {
            scalar(conf, name)
        } else if required {
            Err(EngineError::missing(name))
        } else {
            Ok(Arg::Absent)
        }
    }))
}

/// Cached binder of one action type.
pub struct Factory {
    identity: &'static str,
    fields: Vec<(&'static str, FieldReader)>,
    construct: fn(&mut Args) -> Result<BoxedAction>,
}

impl Factory {
    pub fn identity(&self) -> &'static str {
        self.identity
    }

    /// Apply every field reader in declaration order, then the constructor.
    /// Stops at the first missing or mistyped field.
    pub fn bind(&self, conf: &Conf, registry: &Registry) -> Result<BoxedAction> {
        let mut args = Args::new(self.identity);
        for (name, reader) in &self.fields {
            args.values.insert(*name, reader(conf, registry)?);
        }
        let action = (self.construct)(&mut args)?;
        args.finish()?;
        trace!(target: "casebot::binder", action = self.identity, "Bound action");
        Ok(action)
    }
}

impl std::fmt::Debug for Factory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Factory")
            .field("identity", &self.identity)
            .field("fields", &self.fields.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .finish()
    }
}

fn construct_boxed<T: Action>(args: &mut Args) -> Result<BoxedAction> {
    T::construct(args).map(|action| Box::new(action) as BoxedAction)
}

/// Factory of an action type, built on first use and cached per type.
pub fn factory<T: Action>() -> Result<Arc<Factory>> {
    let key = TypeId::of::<T>();
    if let Some(found) = FACTORIES.get(&key) {
        return Ok(Arc::clone(found.value()));
    }
    let identity = identity_of::<T>();
    let manifest = manifest::describe::<T>();
    let mut seen = BTreeSet::new();
    let mut fields = Vec::with_capacity(manifest.params.len());
    for param in &manifest.params {
        if !seen.insert(param.name) {
            return Err(EngineError::ManifestMismatch {
                action: identity.to_string(),
                detail: format!("parameter '{}' declared twice", param.name),
            });
        }
        fields.push((param.name, build_reader::<T>(param)?));
    }
    let built = Arc::new(Factory {
        identity,
        fields,
        construct: construct_boxed::<T>,
    });
    trace!(target: "casebot::binder", action = identity, params = built.fields.len(), "Built factory");
    Ok(Arc::clone(FACTORIES.entry(key).or_insert(built).value()))
}

/// Bind one config subtree into an instance of `T`. Pure: touches no context.
pub fn bind<T: Action>(conf: &Conf, registry: &Registry) -> Result<BoxedAction> {
    factory::<T>()?.bind(conf, registry)
}

/// Check that `T`'s constructor consumes exactly its declared parameters, by binding a
/// synthetic config that provides every parameter. Nested action parameters use
/// `nested`, which must be registered in `registry`.
pub fn verify<T: Action>(registry: &Registry, nested: &str) -> Result<()> {
    let manifest = manifest::describe::<T>();
    let mut sample = serde_json::Map::new();
    for param in &manifest.params {
        if let Some(value) = sample_value(param, nested) {
            sample.insert(param.name.to_string(), value);
        }
    }
    bind::<T>(&Conf::new(Json::Object(sample)), registry).map(|_| ())
}

fn sample_value(param: &Param, nested: &str) -> Option<Json> {
    let hint = param
        .values
        .first()
        .map(|v| v.split(':').next().unwrap_or(*v).to_string());
    Some(match param.ty {
        ParamType::Int | ParamType::Long => hint.map(Json::String).unwrap_or(json!(1)),
        ParamType::Float | ParamType::Double => json!(1.0),
        ParamType::Bool => json!(true),
        ParamType::String => Json::String(hint.unwrap_or_else(|| "x".into())),
        ParamType::Duration => json!("1ms"),
        ParamType::StringMap => json!({ "k": "v" }),
        ParamType::StringSet => json!(["a"]),
        ParamType::LongSet => json!([1]),
        ParamType::Action => json!({ "action": nested }),
        ParamType::Other(_) => return None,
    })
}

/// Arguments handed to a canonical constructor.
///
/// Each declared parameter must be taken exactly once; reading an undeclared name or
/// leaving one unread is a `ManifestMismatch`.
#[derive(Debug)]
pub struct Args {
    action: &'static str,
    values: BTreeMap<&'static str, Arg>,
}

impl Args {
    fn new(action: &'static str) -> Self {
        Self {
            action,
            values: BTreeMap::new(),
        }
    }

    /// A required argument.
    pub fn take<T: FromArg>(&mut self, name: &str) -> Result<T> {
        self.take_opt(name)?
            .ok_or_else(|| EngineError::missing(name))
    }

    /// An optional argument; `None` when absent from the config.
    pub fn take_opt<T: FromArg>(&mut self, name: &str) -> Result<Option<T>> {
        let arg = self.values.remove(name).ok_or_else(|| EngineError::ManifestMismatch {
            action: self.action.to_string(),
            detail: format!("constructor reads undeclared parameter '{name}'"),
        })?;
        if matches!(arg, Arg::Absent) {
            return Ok(None);
        }
        T::from_arg(arg).map(Some).map_err(|arg| EngineError::ManifestMismatch {
            action: self.action.to_string(),
            detail: format!("parameter '{name}' is {arg:?}, constructor expects {}", T::LABEL),
        })
    }

    fn finish(self) -> Result<()> {
        if self.values.is_empty() {
            return Ok(());
        }
        let unread = self.values.keys().copied().collect::<Vec<_>>().join(", ");
        Err(EngineError::ManifestMismatch {
            action: self.action.to_string(),
            detail: format!("constructor never reads parameter(s) {unread}"),
        })
    }
}

/// Conversion from an extracted [`Arg`] into a constructor field type.
pub trait FromArg: Sized {
    const LABEL: &'static str;

    /// Returns the argument back when it holds another type.
    fn from_arg(arg: Arg) -> std::result::Result<Self, Arg>;
}

macro_rules! from_arg {
    ($ty:ty, $label:literal, $variant:ident) => {
        impl FromArg for $ty {
            const LABEL: &'static str = $label;

            fn from_arg(arg: Arg) -> std::result::Result<Self, Arg> {
                match arg {
                    Arg::$variant(v) => Ok(v),
                    other => Err(other),
                }
            }
        }
    };
}

from_arg!(i32, "Integer", Int);
from_arg!(i64, "Long", Long);
from_arg!(f32, "Float", Float);
from_arg!(f64, "Double", Double);
from_arg!(bool, "Boolean", Bool);
from_arg!(String, "String", Str);
from_arg!(Duration, "Duration", Duration);
from_arg!(BTreeMap<String, String>, "Map<String,String>", StringMap);
from_arg!(BTreeSet<String>, "Set<String>", StringSet);
from_arg!(BTreeSet<i64>, "Set<Long>", LongSet);
from_arg!(BoxedAction, "Action", Action);
