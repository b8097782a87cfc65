use anyhow::{Context, Result};
use schemars::{Schema, schema_for};
use serde_json;
use serde_valid::Validate;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tracing::{debug, trace};

use super::models::{CaseDocument, GlobalDocument};
use crate::error::EngineError;

/// Load the global document from a string slice.
pub fn load_global_from_str(s: &str) -> Result<GlobalDocument> {
    serde_json::from_str(s).context("Failed to parse JSON string into GlobalDocument")
}

/// Load the global document from any reader (e.g., a file).
pub fn load_global_from_reader<R: Read>(reader: R) -> Result<GlobalDocument> {
    serde_json::from_reader(reader).context("Failed to parse JSON from reader into GlobalDocument")
}

/// Load the global document from a file path synchronously.
pub fn load_global_from_path<P: AsRef<Path>>(path: P) -> Result<GlobalDocument> {
    let path_ref = path.as_ref();
    let file = File::open(path_ref)
        .with_context(|| format!("Failed to open global document {}", path_ref.display()))?;
    let doc = load_global_from_reader(file)
        .with_context(|| format!("Invalid global document {}", path_ref.display()))?;
    debug!(target: "casebot::config", path = %path_ref.display(), "Loaded global document");
    Ok(doc)
}

/// Load the global document from a file path asynchronously (Tokio).
pub async fn load_global_from_path_async<P: AsRef<Path>>(path: P) -> Result<GlobalDocument> {
    use tokio::fs;
    let path_ref = path.as_ref();
    let bytes = fs::read(path_ref)
        .await
        .with_context(|| format!("Failed to read global document {}", path_ref.display()))?;
    let doc: GlobalDocument = serde_json::from_slice(&bytes)
        .with_context(|| format!("Failed to parse JSON global document {}", path_ref.display()))?;
    debug!(target: "casebot::config", path = %path_ref.display(), "Loaded global document");
    Ok(doc)
}

/// Parse and validate one case document.
///
/// `fallback_name` names the case in errors when the document has no `name`.
pub fn load_case_from_str(s: &str, fallback_name: &str) -> Result<CaseDocument> {
    let doc: CaseDocument =
        serde_json::from_str(s).context("Failed to parse JSON into CaseDocument")?;
    validate_case(&doc, fallback_name)?;
    Ok(doc)
}

/// Read, parse and validate one case document from disk.
pub fn load_case_from_path<P: AsRef<Path>>(path: P) -> Result<CaseDocument> {
    let path_ref = path.as_ref();
    trace!(target: "casebot::config", path = %path_ref.display(), "Parsing case file");
    let text = std::fs::read_to_string(path_ref)
        .with_context(|| format!("Failed to read case file {}", path_ref.display()))?;
    let doc: CaseDocument = serde_json::from_str(&text).map_err(|e| EngineError::InvalidDocument {
        path: path_ref.to_path_buf(),
        reason: e.to_string(),
    })?;
    validate_case(&doc, &file_stem(path_ref))?;
    Ok(doc)
}

/// Structural checks on a case document. An absent or empty `actions` list is fatal.
pub fn validate_case(doc: &CaseDocument, fallback_name: &str) -> Result<()> {
    if let Err(errors) = doc.validate() {
        trace!(target: "casebot::config", ?errors, "Case document failed validation");
        return Err(EngineError::MissingActionsList {
            case: doc.name.clone().unwrap_or_else(|| fallback_name.to_string()),
        }
        .into());
    }
    Ok(())
}

/// The file name without its extension; used as the default case identity.
pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// JSON Schema of the global document.
pub fn generate_global_schema() -> Schema {
    schema_for!(GlobalDocument)
}

/// JSON Schema of a case document.
pub fn generate_case_schema() -> Schema {
    schema_for!(CaseDocument)
}

/// Write both document schemas to any writer (pretty-printed, keyed by document kind).
pub fn write_schema_to_writer<W: Write>(mut writer: W) -> Result<()> {
    let schemas = serde_json::json!({
        "global": generate_global_schema(),
        "case": generate_case_schema(),
    });
    let json = serde_json::to_string_pretty(&schemas).context("Failed to serialize schema")?;
    writer
        .write_all(json.as_bytes())
        .context("Failed to write schema to writer")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_defaults() {
        let doc = load_global_from_str("{}").unwrap();
        assert!(!doc.debug);
        assert!(doc.init.is_empty());
        assert_eq!(doc.extension(), "json");

        let doc = load_global_from_str(r#"{"extension": ".case", "vars": {"greeting": "hi"}}"#)
            .unwrap();
        assert_eq!(doc.extension(), "case");
        assert_eq!(doc.vars["greeting"], serde_json::json!("hi"));
    }

    #[test]
    fn case_requires_actions() {
        for text in [r#"{"name": "x"}"#, r#"{"name": "x", "actions": []}"#] {
            let err = load_case_from_str(text, "fallback").unwrap_err();
            match err.downcast_ref::<EngineError>() {
                Some(EngineError::MissingActionsList { case }) => assert_eq!(case, "x"),
                other => panic!("unexpected error: {other:?}"),
            }
        }
    }

    #[test]
    fn case_with_actions_parses() {
        let doc = load_case_from_str(
            r#"{"cleanup": true, "actions": [{"action": "ShowVar", "name": "a"}]}"#,
            "fallback",
        )
        .unwrap();
        assert!(doc.cleanup);
        assert_eq!(doc.actions.len(), 1);
        assert_eq!(doc.name, None);
    }

    #[test]
    fn schema_mentions_both_documents() {
        let mut out = Vec::new();
        write_schema_to_writer(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("\"global\""));
        assert!(text.contains("cleanup"));
    }
}
