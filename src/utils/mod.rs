//! Utilities for casebot.
//!
//! Submodules:
//! - `interpolation`: `{{var}}` templating over the shared context.

pub mod interpolation;

pub use interpolation::{interpolate, interpolate_with};
