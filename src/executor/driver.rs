use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result, bail};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use walkdir::WalkDir;

use super::case::Case;
use crate::config::GlobalDocument;
use crate::context::{Context, Value};
use crate::engine::Registry;

/// Case identity used for the global `init` block.
pub const GLOBAL_CASE: &str = "global";

/// Top-level sequencer: one shared context, the global document, and the cases to run.
///
/// Order of a run: global `vars` are registered, global `init` runs, then either the
/// explicit scripts or every case document found under `cases` (lexicographic path
/// order). The first failure aborts the run. Unless `debug` is set the context is
/// closed afterwards, whatever the outcome.
#[derive(Debug)]
pub struct Driver<'r> {
    registry: &'r Registry,
    global: GlobalDocument,
    context: Context,
}

impl<'r> Driver<'r> {
    pub fn new(registry: &'r Registry, global: GlobalDocument) -> Self {
        let context = Context::with_retained_kinds(global.retain.iter().cloned());
        Self {
            registry,
            global,
            context,
        }
    }

    pub fn global(&self) -> &GlobalDocument {
        &self.global
    }

    /// The shared context (still readable after `run`, even when closed).
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Force debug mode on top of the document's own flag.
    pub fn set_debug(&mut self, debug: bool) {
        self.global.debug |= debug;
    }

    pub fn run(&self, scripts: &[PathBuf], cancel: &CancellationToken) -> Result<()> {
        let outcome = self.run_all(scripts, cancel);
        if self.global.debug {
            warn!(
                target: "casebot::driver",
                pending = self.context.pending_teardown(),
                "Debug mode: context left open"
            );
        } else {
            self.context.close();
        }
        match &outcome {
            Ok(()) => info!(target: "casebot::driver", "Run succeeded"),
            Err(err) => warn!(target: "casebot::driver", error = %err, "Run failed"),
        }
        outcome
    }

    fn run_all(&self, scripts: &[PathBuf], cancel: &CancellationToken) -> Result<()> {
        for (name, json) in &self.global.vars {
            if !self.context.put(name.as_str(), Value::from(json)) {
                trace!(target: "casebot::driver", %name, "Global variable already bound");
            }
        }
        debug!(target: "casebot::driver", vars = self.global.vars.len(), "Global variables registered");

        if !self.global.init.is_empty() {
            Case::inline(GLOBAL_CASE, &self.global.init, self.registry)?
                .run(&self.context, cancel)?;
        }

        let paths = if scripts.is_empty() {
            self.discover()?
        } else {
            scripts.to_vec()
        };
        info!(target: "casebot::driver", cases = paths.len(), "Case files to run");

        for path in &paths {
            let case = Case::load(path, self.registry)
                .with_context(|| format!("Failed to load case {}", path.display()))?;
            case.run(&self.context, cancel)?;
        }
        Ok(())
    }

    /// Every case document under the `cases` directory, in lexicographic path order.
    pub fn discover(&self) -> Result<Vec<PathBuf>> {
        let Some(dir) = self.global.cases.as_deref() else {
            bail!("global document declares no 'cases' directory and no scripts were given");
        };
        discover_cases(Path::new(dir), self.global.extension())
    }
}

/// Recursively collect files with `extension` under `dir`, sorted by path.
pub fn discover_cases(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in WalkDir::new(dir).follow_links(true).sort_by_file_name() {
        let entry =
            entry.with_context(|| format!("Failed to scan cases directory {}", dir.display()))?;
        let path = entry.path();
        if entry.file_type().is_file() && path.extension().is_some_and(|e| e == extension) {
            found.push(path.to_path_buf());
        }
    }
    found.sort();
    trace!(target: "casebot::driver", dir = %dir.display(), found = found.len(), "Scanned cases directory");
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_global_from_str;
    use crate::engine::register;
    use crate::error::EngineError;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, doc: serde_json::Value) -> PathBuf {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, doc.to_string()).unwrap();
        path
    }

    fn driver(global: serde_json::Value) -> Driver<'static> {
        let global = load_global_from_str(&global.to_string()).unwrap();
        Driver::new(register().unwrap(), global)
    }

    #[test]
    fn global_vars_reach_scripts() {
        let dir = TempDir::new().unwrap();
        let script = write(
            dir.path(),
            "show.json",
            json!({ "actions": [{ "action": "ShowVar", "name": "greeting" }] }),
        );
        let d = driver(json!({ "vars": { "greeting": "hi" } }));
        d.run(&[script], &CancellationToken::new()).unwrap();
        assert_eq!(d.context().get_as::<String>("greeting").as_deref(), Some("hi"));
    }

    #[test]
    fn double_initialization_fails_with_precondition() {
        let dir = TempDir::new().unwrap();
        let script = write(
            dir.path(),
            "token.json",
            json!({ "actions": [
                { "action": "SetVar", "name": "token", "value": "abc" },
                { "action": "RequireAbsent", "name": "token" },
                { "action": "SetVar", "name": "after", "value": "x" }
            ] }),
        );
        let d = driver(json!({}));
        let err = d.run(&[script], &CancellationToken::new()).unwrap_err();
        assert!(matches!(
            EngineError::root(&err),
            Some(EngineError::PreconditionViolated { name, .. }) if name == "token"
        ));
        assert!(matches!(
            EngineError::find(&err),
            Some(EngineError::ActionExecutionFailed { case, action })
                if case == "token" && action == "RequireAbsent"
        ));
        assert!(!d.context().contains("after"));
    }

    #[test]
    fn init_runs_after_global_vars_and_before_cases() {
        let dir = TempDir::new().unwrap();
        let script = write(
            dir.path(),
            "check.json",
            json!({ "actions": [{ "action": "TextMatch", "name": "banner", "value": "hello ann" }] }),
        );
        let d = driver(json!({
            "vars": { "user": "ann" },
            "init": [{ "action": "SetVar", "name": "banner", "value": "hello {{user}}" }]
        }));
        d.run(&[script], &CancellationToken::new()).unwrap();
    }

    #[test]
    fn directory_cases_run_in_path_order_and_stop_at_first_failure() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "b/2.json", json!({ "actions": [{ "action": "SetVar", "name": "b2", "value": "x" }] }));
        write(dir.path(), "a.json", json!({ "actions": [{ "action": "SetVar", "name": "a", "value": "x" }] }));
        write(dir.path(), "b/1.json", json!({ "actions": [{ "action": "RequireExists", "name": "a" }] }));
        write(dir.path(), "notes.txt", json!({}));

        let found = discover_cases(dir.path(), "json").unwrap();
        let rel: Vec<_> = found
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(rel, vec!["a.json", "b/1.json", "b/2.json"]);

        write(dir.path(), "b/0.json", json!({ "actions": [{ "action": "RequireTrue", "name": "nope" }] }));
        let d = driver(json!({ "cases": dir.path().to_string_lossy() }));
        let err = d.run(&[], &CancellationToken::new()).unwrap_err();
        assert!(matches!(
            EngineError::find(&err),
            Some(EngineError::ActionExecutionFailed { case, .. }) if case == "0"
        ));
        assert!(d.context().contains("a"));
        assert!(!d.context().contains("b2"));
    }

    #[test]
    fn close_releases_resources_unless_debug() {
        let dir = TempDir::new().unwrap();
        let script = write(dir.path(), "d.json", json!({ "actions": [{ "action": "Desktop", "dryRun": true }] }));

        let d = driver(json!({}));
        d.run(&[script.clone()], &CancellationToken::new()).unwrap();
        assert_eq!(d.context().pending_teardown(), 0);

        let mut debug = driver(json!({}));
        debug.set_debug(true);
        debug.run(&[script.clone()], &CancellationToken::new()).unwrap();
        assert_eq!(debug.context().pending_teardown(), 1);

        let retained = driver(json!({ "retain": ["desktop"] }));
        retained.run(&[script], &CancellationToken::new()).unwrap();
        assert_eq!(retained.context().pending_teardown(), 0);
        assert!(retained.context().contains("Desktop"));
    }

    #[test]
    fn no_scripts_and_no_cases_dir_is_an_error() {
        let d = driver(json!({}));
        assert!(d.run(&[], &CancellationToken::new()).is_err());
    }
}
