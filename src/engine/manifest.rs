//! Parameter descriptors and usage rendering.
//!
//! A manifest is built once per action type from its static parameter table and cached
//! by `TypeId`, so two types sharing a simple name never share metadata; the rendered
//! usage text is cached separately. Neither affects binding.

use std::any::TypeId;
use std::fmt::Write as _;
use std::sync::{Arc, LazyLock};

use dashmap::DashMap;

use super::action::{Action, category_of, identity_of};
use super::readers::CustomReader;

/// Declared type of a constructor parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamType {
    Int,
    Long,
    Float,
    Double,
    Bool,
    String,
    Duration,
    StringMap,
    StringSet,
    LongSet,
    Action,
    /// Any other composite; only bindable through a custom reader.
    Other(&'static str),
}

impl ParamType {
    pub fn label(&self) -> &'static str {
        match self {
            ParamType::Int => "Integer",
            ParamType::Long => "Long",
            ParamType::Float => "Float",
            ParamType::Double => "Double",
            ParamType::Bool => "Boolean",
            ParamType::String => "String",
            ParamType::Duration => "Duration",
            ParamType::StringMap => "Map<String,String>",
            ParamType::StringSet => "Set<String>",
            ParamType::LongSet => "Set<Long>",
            ParamType::Action => "Action",
            ParamType::Other(name) => *name,
        }
    }

    /// Types with a built-in reader.
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            ParamType::Int
                | ParamType::Long
                | ParamType::Float
                | ParamType::Double
                | ParamType::Bool
                | ParamType::String
                | ParamType::Duration
        )
    }
}

/// One constructor parameter.
#[derive(Debug, Clone)]
pub struct Param {
    pub name: &'static str,
    pub ty: ParamType,
    pub required: bool,
    pub description: &'static str,
    pub values: &'static [&'static str],
    pub reader: Option<&'static CustomReader>,
}

impl Param {
    /// A required parameter.
    pub fn new(name: &'static str, ty: ParamType) -> Self {
        Self {
            name,
            ty,
            required: true,
            description: "",
            values: &[],
            reader: None,
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn describe(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    /// Enumerated value hints (usage only).
    pub fn values(mut self, values: &'static [&'static str]) -> Self {
        self.values = values;
        self
    }

    pub fn read_with(mut self, reader: &'static CustomReader) -> Self {
        self.reader = Some(reader);
        self
    }
}

/// Metadata of one action type.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub identity: &'static str,
    pub category: &'static str,
    pub description: &'static str,
    pub params: Vec<Param>,
}

static MANIFESTS: LazyLock<DashMap<TypeId, Arc<Manifest>>> = LazyLock::new(DashMap::new);
static USAGE: LazyLock<DashMap<TypeId, Arc<str>>> = LazyLock::new(DashMap::new);

/// Descriptor list of an action type, cached per type.
pub fn describe<T: Action>() -> Arc<Manifest> {
    let key = TypeId::of::<T>();
    if let Some(found) = MANIFESTS.get(&key) {
        return Arc::clone(found.value());
    }
    let manifest = Arc::new(Manifest {
        identity: identity_of::<T>(),
        category: category_of::<T>(),
        description: T::DESCRIPTION,
        params: T::params(),
    });
    Arc::clone(MANIFESTS.entry(key).or_insert(manifest).value())
}

/// Usage text of an action type, cached per type.
pub fn usage<T: Action>() -> Arc<str> {
    let key = TypeId::of::<T>();
    if let Some(found) = USAGE.get(&key) {
        return Arc::clone(found.value());
    }
    let text: Arc<str> = render_usage(&describe::<T>()).into();
    Arc::clone(USAGE.entry(key).or_insert(text).value())
}

/// Render a stable signature:
///
/// ```text
/// // show context variable.
/// ShowVar {
///     // variable name
///     name: String
///     // lookup mode
///     mode: String?    // value|type
/// }
/// ```
pub fn render_usage(manifest: &Manifest) -> String {
    let mut out = String::new();
    if !manifest.description.is_empty() {
        let _ = writeln!(out, "// {}", manifest.description);
    }
    let _ = writeln!(out, "{} {{", manifest.identity);
    for p in &manifest.params {
        if !p.description.is_empty() {
            let _ = writeln!(out, "\t// {}", p.description);
        }
        let _ = write!(out, "\t{}: {}", p.name, p.ty.label());
        if !p.required {
            out.push('?');
        }
        if !p.values.is_empty() {
            let _ = write!(out, "\t// {}", p.values.join("|"));
        }
        out.push('\n');
    }
    out.push_str("}\n");
    out
}
