use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the action engine itself (registry, binder, context, case parsing).
///
/// Action bodies report failures through `anyhow`; the case runner attaches
/// [`EngineError::ActionExecutionFailed`] as context so the typed root cause stays
/// reachable through `anyhow::Error::chain()`.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown action '{0}'")]
    UnknownAction(String),

    #[error("action '{action}': parameter '{param}' has unsupported type {ty}, declare a custom reader")]
    UnsupportedParameterType {
        action: String,
        param: String,
        ty: String,
    },

    #[error("action '{0}' is registered twice")]
    DuplicateAction(String),

    #[error("action '{action}': manifest does not match constructor: {detail}")]
    ManifestMismatch { action: String, detail: String },

    #[error("missing value at '{field}'")]
    MissingField { field: String },

    #[error("value at '{field}' is not a valid {expected}")]
    TypeMismatch { field: String, expected: String },

    #[error("missing required context value '{name}' of {expected}")]
    MissingContextValue { name: String, expected: String },

    #[error("precondition violated for '{name}': {reason}")]
    PreconditionViolated { name: String, reason: String },

    #[error("execute '{case}.{action}' failed")]
    ActionExecutionFailed { case: String, action: String },

    #[error("case '{case}' is missing a non-empty actions list")]
    MissingActionsList { case: String },

    #[error("invalid document {path}: {reason}")]
    InvalidDocument { path: PathBuf, reason: String },

    #[error("run cancelled before action '{action}'")]
    Cancelled { action: String },
}

impl EngineError {
    pub(crate) fn missing(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    pub(crate) fn mismatch(field: impl Into<String>, expected: impl Into<String>) -> Self {
        Self::TypeMismatch {
            field: field.into(),
            expected: expected.into(),
        }
    }

    /// The outermost engine error of an `anyhow` error, looking through context layers.
    /// For a failed case run this is `ActionExecutionFailed`.
    pub fn find(err: &anyhow::Error) -> Option<&EngineError> {
        err.downcast_ref::<EngineError>()
    }

    /// The innermost engine error of an `anyhow` error (the typed root cause), falling
    /// back to the outermost one when the root is untyped.
    pub fn root(err: &anyhow::Error) -> Option<&EngineError> {
        err.chain()
            .filter_map(|e| e.downcast_ref::<EngineError>())
            .last()
            .or_else(|| Self::find(err))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
