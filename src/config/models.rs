use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_valid::Validate;
use std::collections::BTreeMap;

/// Root (global) document for a run.
///
/// Deserialized from a JSON file passed with `--conf`. It captures:
/// - `init` actions executed once against the shared context before any case
/// - global `vars` registered into the context first
/// - where to find cases (`cases` directory + file `extension`) when no scripts are given
/// - `retain`: resource kinds the context must never close (owned elsewhere)
/// - `debug`: leave the context open after the run
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
pub struct GlobalDocument {
    /// Leave the context (and its resources) open after the run for inspection.
    #[serde(default)]
    pub debug: bool,

    /// Directory scanned recursively for case documents when no scripts are given.
    #[serde(default)]
    pub cases: Option<String>,

    /// File extension of case documents inside `cases` (default: "json").
    #[serde(default)]
    pub extension: Option<String>,

    /// Actions executed once before any case.
    #[serde(default)]
    pub init: Vec<ActionDocument>,

    /// Variables registered into the shared context before `init` runs.
    #[serde(default)]
    pub vars: VarsMap,

    /// Resource kinds owned outside the context; never released by teardown.
    #[serde(default)]
    pub retain: Vec<String>,
}

impl GlobalDocument {
    pub fn extension(&self) -> &str {
        self.extension
            .as_deref()
            .map(|e| e.trim_start_matches('.'))
            .unwrap_or("json")
    }
}

/// One script document (a case).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Validate)]
pub struct CaseDocument {
    /// Case identity; defaults to the file stem.
    #[serde(default)]
    pub name: Option<String>,

    /// Actions executed before `actions`, as part of the same case.
    #[serde(default)]
    pub init: Vec<ActionDocument>,

    /// Case-local variables merged (without overwriting) into the context.
    #[serde(default)]
    pub vars: VarsMap,

    /// Remove every context binding introduced by this case once it finishes.
    #[serde(default)]
    pub cleanup: bool,

    /// The ordered action list. Mandatory and non-empty.
    #[serde(default)]
    #[validate(min_items = 1)]
    pub actions: Vec<ActionDocument>,
}

/// An action subtree: `{ "action": "<identity>", ...fields }`.
/// Fields are bound later through the action's parameter manifest.
pub type ActionDocument = serde_json::Map<String, serde_json::Value>;

/// Flat variable map of a document.
pub type VarsMap = BTreeMap<String, serde_json::Value>;
