//! Execution context: the named-value store shared by every action of a run,
//! plus teardown tracking for resource values.

pub mod store;
pub mod value;

pub use store::Context;
pub use value::{FromValue, Resource, Value};
