//! Configuration module for casebot.
//!
//! This module wires together the document models, the path-addressed `Conf` surface
//! used to bind action fields, and the loading/validation helpers.
//!
//! Example:
//! use casebot::config::{load_global_from_path, load_case_from_path};
//!
//! let global = load_global_from_path("global.json")?;
//! let case = load_case_from_path("cases/login.json")?;

pub mod conf;
pub mod loader;
pub mod models;

pub use conf::{Conf, parse_duration};

// Re-export core data models
pub use models::{ActionDocument, CaseDocument, GlobalDocument, VarsMap};

// Re-export loader utilities
pub use loader::{
    file_stem, generate_case_schema, generate_global_schema, load_case_from_path,
    load_case_from_str, load_global_from_path, load_global_from_path_async,
    load_global_from_reader, load_global_from_str, validate_case, write_schema_to_writer,
};
