use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use tokio_util::sync::CancellationToken;
use tracing::{Level, debug, enabled, info, trace, warn};

use crate::config::{ActionDocument, CaseDocument, Conf, VarsMap, file_stem, load_case_from_path, validate_case};
use crate::context::{Context, Value};
use crate::engine::registry::ACTION_FIELD;
use crate::engine::{BoxedAction, Registry};
use crate::error::EngineError;

/// One parsed script: bound actions in document order (case `init` first), local
/// variables and the scoped-cleanup flag. Executed once, then dropped.
#[derive(Debug)]
pub struct Case {
    identity: String,
    source: PathBuf,
    actions: Vec<BoxedAction>,
    initial_vars: BTreeMap<String, Value>,
    cleanup: bool,
}

impl Case {
    /// Read, validate and bind one case file. The identity defaults to the file stem.
    pub fn load(path: &Path, registry: &Registry) -> Result<Self> {
        let doc = load_case_from_path(path)?;
        Self::from_document(&doc, path, registry)
    }

    /// Bind a parsed case document. Fails with `MissingActionsList` on an empty
    /// `actions` list, or with the first binding error of any action.
    pub fn from_document(doc: &CaseDocument, source: &Path, registry: &Registry) -> Result<Self> {
        let identity = doc.name.clone().unwrap_or_else(|| file_stem(source));
        validate_case(doc, &identity)?;

        let actions = bind_all(&identity, doc.init.iter().chain(&doc.actions), registry)?;
        Ok(Self {
            identity,
            source: source.to_path_buf(),
            actions,
            initial_vars: to_values(&doc.vars),
            cleanup: doc.cleanup,
        })
    }

    /// A case built from a bare action list (the global `init` block).
    pub fn inline(identity: &str, actions: &[ActionDocument], registry: &Registry) -> Result<Self> {
        Ok(Self {
            identity: identity.to_string(),
            source: PathBuf::new(),
            actions: bind_all(identity, actions.iter(), registry)?,
            initial_vars: BTreeMap::new(),
            cleanup: false,
        })
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn cleanup(&self) -> bool {
        self.cleanup
    }

    /// Execute against the shared context.
    ///
    /// Local variables are merged without overwriting, then actions run in order until
    /// the first failure, which is surfaced wrapped in `ActionExecutionFailed`. With
    /// `cleanup`, every binding introduced by this run is invalidated afterwards, on
    /// success and on failure alike. `cancel` is checked before each action.
    pub fn run(&self, ctx: &Context, cancel: &CancellationToken) -> Result<()> {
        info!(
            target: "casebot::case",
            case = %self.identity,
            source = %self.source.display(),
            actions = self.actions.len(),
            "Running case"
        );
        let before = self.cleanup.then(|| ctx.names());

        let outcome = self.run_actions(ctx, cancel);

        if let Some(before) = before {
            let removed = ctx
                .names()
                .difference(&before)
                .filter(|name| ctx.invalidate(name))
                .count();
            debug!(target: "casebot::case", case = %self.identity, removed, "Case scope cleaned up");
        }

        match &outcome {
            Ok(()) => info!(target: "casebot::case", case = %self.identity, "Case succeeded"),
            Err(err) => warn!(target: "casebot::case", case = %self.identity, error = %err, "Case failed"),
        }
        outcome
    }

    fn run_actions(&self, ctx: &Context, cancel: &CancellationToken) -> Result<()> {
        for (name, value) in &self.initial_vars {
            if !ctx.put(name.as_str(), value.clone()) {
                trace!(target: "casebot::case", %name, "Case variable already bound; kept existing value");
            }
        }

        for action in &self.actions {
            let identity = action.identity();
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled {
                    action: identity.to_string(),
                }
                .into());
            }

            let before = enabled!(target: "casebot::case", Level::TRACE).then(|| ctx.names());
            trace!(target: "casebot::case", case = %self.identity, action = identity, "will execute");

            action.execute(ctx).with_context(|| EngineError::ActionExecutionFailed {
                case: self.identity.clone(),
                action: identity.to_string(),
            })?;

            if let Some(before) = before {
                let written: BTreeSet<String> = ctx.names().difference(&before).cloned().collect();
                trace!(target: "casebot::case", case = %self.identity, action = identity, ?written, "done");
            }
        }
        Ok(())
    }
}

fn bind_all<'a>(
    case: &str,
    docs: impl Iterator<Item = &'a ActionDocument>,
    registry: &Registry,
) -> Result<Vec<BoxedAction>> {
    docs.enumerate()
        .map(|(index, doc)| {
            let identity = doc
                .get(ACTION_FIELD)
                .and_then(|v| v.as_str())
                .unwrap_or("<unnamed>");
            registry
                .bind(&Conf::new(serde_json::Value::Object(doc.clone())))
                .with_context(|| {
                    format!("case '{case}': cannot bind action #{} ({identity})", index + 1)
                })
        })
        .collect()
}

fn to_values(vars: &VarsMap) -> BTreeMap<String, Value> {
    vars.iter()
        .map(|(name, json)| (name.clone(), Value::from(json)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_case_from_str;
    use crate::engine::register;
    use serde_json::json;

    fn case(doc: serde_json::Value) -> Case {
        let doc = load_case_from_str(&doc.to_string(), "test").unwrap();
        Case::from_document(&doc, Path::new("cases/test.json"), register().unwrap()).unwrap()
    }

    fn step(name: &str) -> serde_json::Value {
        json!({ "action": "SetVar", "name": name, "value": "done" })
    }

    #[test]
    fn identity_falls_back_to_file_stem() {
        let c = case(json!({ "actions": [step("a")] }));
        assert_eq!(c.identity(), "test");
        let named = case(json!({ "name": "login", "actions": [step("a")] }));
        assert_eq!(named.identity(), "login");
    }

    #[test]
    fn init_actions_run_before_actions() {
        let c = case(json!({
            "init": [{ "action": "SetVar", "name": "first", "value": "init" }],
            "actions": [{ "action": "RequireExists", "name": "first" }]
        }));
        assert_eq!(c.len(), 2);
        c.run(&Context::new(), &CancellationToken::new()).unwrap();
    }

    #[test]
    fn missing_or_empty_actions_is_fatal() {
        for doc in [json!({ "name": "empty", "actions": [] }), json!({ "name": "empty" })] {
            let err = load_case_from_str(&doc.to_string(), "x").unwrap_err();
            assert!(matches!(
                EngineError::find(&err),
                Some(EngineError::MissingActionsList { case }) if case == "empty"
            ));
        }
    }

    #[test]
    fn bind_errors_surface_while_parsing() {
        let doc = load_case_from_str(&json!({ "actions": [{ "action": "Nope" }] }).to_string(), "t")
            .unwrap();
        let err = Case::from_document(&doc, Path::new("t.json"), register().unwrap()).unwrap_err();
        assert!(matches!(
            EngineError::root(&err),
            Some(EngineError::UnknownAction(name)) if name == "Nope"
        ));
        assert_eq!(err.to_string(), "case 't': cannot bind action #1 (Nope)");

        let doc = load_case_from_str(
            &json!({ "actions": [step("a"), { "action": "SetVar", "name": "x" }] }).to_string(),
            "t",
        )
        .unwrap();
        let err = Case::from_document(&doc, Path::new("t.json"), register().unwrap()).unwrap_err();
        assert_eq!(err.to_string(), "case 't': cannot bind action #2 (SetVar)");
        assert!(matches!(
            EngineError::root(&err),
            Some(EngineError::MissingField { field }) if field == "value"
        ));
    }

    #[test]
    fn local_vars_do_not_overwrite() {
        let ctx = Context::new();
        ctx.put("user", "global");
        case(json!({ "vars": { "user": "local", "count": 2 }, "actions": [step("a")] }))
            .run(&ctx, &CancellationToken::new())
            .unwrap();
        assert_eq!(ctx.get_as::<String>("user").as_deref(), Some("global"));
        assert_eq!(ctx.get_as::<i64>("count"), Some(2));
    }

    #[test]
    fn failure_stops_at_the_failing_action() {
        let ctx = Context::new();
        let c = case(json!({
            "actions": [
                step("s1"),
                step("s2"),
                { "action": "RequireTrue", "name": "never", "message": "third fails" },
                step("s4"),
                step("s5")
            ]
        }));
        let err = c.run(&ctx, &CancellationToken::new()).unwrap_err();
        assert!(matches!(
            EngineError::find(&err),
            Some(EngineError::ActionExecutionFailed { case, action })
                if case == "test" && action == "RequireTrue"
        ));
        assert!(matches!(
            EngineError::root(&err),
            Some(EngineError::PreconditionViolated { name, .. }) if name == "never"
        ));
        assert_eq!(err.to_string(), "execute 'test.RequireTrue' failed");
        assert!(ctx.contains("s1") && ctx.contains("s2"));
        assert!(!ctx.contains("s4") && !ctx.contains("s5"));
    }

    #[test]
    fn cleanup_removes_new_bindings_on_success_and_failure() {
        let ctx = Context::new();
        ctx.put("kept", "x");

        let ok = case(json!({
            "cleanup": true,
            "vars": { "local": 1 },
            "actions": [step("made"), { "action": "Desktop", "dryRun": true }]
        }));
        ok.run(&ctx, &CancellationToken::new()).unwrap();
        assert_eq!(ctx.names().into_iter().collect::<Vec<_>>(), vec!["kept"]);
        assert_eq!(ctx.pending_teardown(), 0);

        let failing = case(json!({
            "cleanup": true,
            "actions": [step("made"), { "action": "RequireExists", "name": "missing" }]
        }));
        assert!(failing.run(&ctx, &CancellationToken::new()).is_err());
        assert_eq!(ctx.names().into_iter().collect::<Vec<_>>(), vec!["kept"]);
    }

    #[test]
    fn cancelled_token_stops_before_the_next_action() {
        let ctx = Context::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = case(json!({ "actions": [step("a")] }))
            .run(&ctx, &cancel)
            .unwrap_err();
        assert!(matches!(
            EngineError::find(&err),
            Some(EngineError::Cancelled { action }) if action == "SetVar"
        ));
        assert!(!ctx.contains("a"));
    }
}
