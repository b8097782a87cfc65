//! Action engine: the capability contract, parameter manifests, config binding and
//! the identity-keyed registry.

pub mod action;
pub mod binder;
pub mod manifest;
pub mod readers;
pub mod registry;

pub use action::{Action, BoxedAction, DynAction, category_of, identity_of};
pub use binder::{Arg, Args, FromArg};
pub use manifest::{Manifest, Param, ParamType};
pub use readers::CustomReader;
pub use registry::{ActionInfo, Registry, RegistryBuilder, register};
