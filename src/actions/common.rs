//! Context bookkeeping actions: inspect, bind, remove and assert variables.

use std::collections::{BTreeMap, BTreeSet};

use regex::Regex;
use tracing::{debug, error, info, trace, warn};

use crate::context::{Context, Value};
use crate::engine::{Action, Args, Param, ParamType, readers};
use crate::error::{EngineError, Result};
use crate::utils::interpolate;

fn violated(name: &str, message: Option<&str>, fallback: &str) -> anyhow::Error {
    EngineError::PreconditionViolated {
        name: name.to_string(),
        reason: message.unwrap_or(fallback).to_string(),
    }
    .into()
}

#[derive(Debug, Default)]
pub struct ShowVar {
    name: String,
}

impl Action for ShowVar {
    const DESCRIPTION: &'static str = "show context variable, or the whole context when name is blank.";

    fn params() -> Vec<Param> {
        vec![Param::new("name", ParamType::String).describe("variable name")]
    }

    fn construct(args: &mut Args) -> Result<Self> {
        Ok(Self {
            name: args.take("name")?,
        })
    }

    fn execute(&self, ctx: &Context) -> anyhow::Result<()> {
        if self.name.trim().is_empty() {
            info!(target: "casebot::actions", "{ctx:?}");
            return Ok(());
        }
        match ctx.get(&self.name) {
            Some(value) => info!(target: "casebot::actions", "variable {}: {}", self.name, value),
            None => info!(target: "casebot::actions", "variable {}: <absent>", self.name),
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct SetVar {
    name: String,
    value: String,
    kind: Option<String>,
}

impl Action for SetVar {
    const DESCRIPTION: &'static str = "bind a variable if it is not bound yet; value supports {{var}} interpolation.";

    fn params() -> Vec<Param> {
        vec![
            Param::new("name", ParamType::String).describe("variable name"),
            Param::new("value", ParamType::String).describe("value to bind"),
            Param::new("type", ParamType::String)
                .optional()
                .describe("how to read value, default text")
                .values(&["text", "int", "float", "bool"]),
        ]
    }

    fn construct(args: &mut Args) -> Result<Self> {
        let kind: Option<String> = args.take_opt("type")?;
        if let Some(kind) = &kind {
            if !matches!(kind.as_str(), "text" | "int" | "float" | "bool") {
                return Err(EngineError::mismatch("type", "text|int|float|bool"));
            }
        }
        Ok(Self {
            name: args.take("name")?,
            value: args.take("value")?,
            kind,
        })
    }

    fn execute(&self, ctx: &Context) -> anyhow::Result<()> {
        let raw = interpolate(&self.value, ctx);
        let value = match self.kind.as_deref().unwrap_or("text") {
            "int" => raw
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| EngineError::mismatch("value", "Int"))?,
            "float" => raw
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| EngineError::mismatch("value", "Float"))?,
            "bool" => raw
                .trim()
                .parse::<bool>()
                .map(Value::Bool)
                .map_err(|_| EngineError::mismatch("value", "Bool"))?,
            _ => Value::Text(raw),
        };
        if !ctx.put(self.name.as_str(), value) {
            warn!(target: "casebot::actions", name = %self.name, "SetVar skipped: variable already bound");
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct PutAll {
    vars: BTreeMap<String, String>,
}

impl Action for PutAll {
    const DESCRIPTION: &'static str = "bind every text variable of the map that is not bound yet.";

    fn params() -> Vec<Param> {
        vec![
            Param::new("vars", ParamType::StringMap)
                .describe("variables to bind, values support {{var}} interpolation")
                .read_with(&readers::STRING_MAP),
        ]
    }

    fn construct(args: &mut Args) -> Result<Self> {
        Ok(Self {
            vars: args.take("vars")?,
        })
    }

    fn execute(&self, ctx: &Context) -> anyhow::Result<()> {
        for (name, value) in &self.vars {
            if !ctx.put(name.as_str(), interpolate(value, ctx)) {
                debug!(target: "casebot::actions", %name, "PutAll skipped bound variable");
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct Remove {
    name: String,
}

impl Action for Remove {
    const DESCRIPTION: &'static str = "remove value in context, releasing it if it is a resource.";

    fn params() -> Vec<Param> {
        vec![Param::new("name", ParamType::String).describe("variable name")]
    }

    fn construct(args: &mut Args) -> Result<Self> {
        Ok(Self {
            name: args.take("name")?,
        })
    }

    fn execute(&self, ctx: &Context) -> anyhow::Result<()> {
        if !ctx.invalidate(&self.name) {
            trace!(target: "casebot::actions", name = %self.name, "Remove: not bound");
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct Forget {
    names: BTreeSet<String>,
}

impl Action for Forget {
    const DESCRIPTION: &'static str = "remove several values in context.";

    fn params() -> Vec<Param> {
        vec![
            Param::new("names", ParamType::StringSet)
                .describe("variable names")
                .read_with(&readers::STRING_SET),
        ]
    }

    fn construct(args: &mut Args) -> Result<Self> {
        Ok(Self {
            names: args.take("names")?,
        })
    }

    fn execute(&self, ctx: &Context) -> anyhow::Result<()> {
        let removed = self.names.iter().filter(|n| ctx.invalidate(n)).count();
        debug!(target: "casebot::actions", removed, "Forget done");
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct ExistCheck {
    var: String,
    name: String,
}

impl Action for ExistCheck {
    const DESCRIPTION: &'static str = "check value present and not null in context, store result as name.";

    fn params() -> Vec<Param> {
        vec![
            Param::new("var", ParamType::String).describe("variable name to check"),
            Param::new("name", ParamType::String).describe("boolean result to store"),
        ]
    }

    fn construct(args: &mut Args) -> Result<Self> {
        Ok(Self {
            var: args.take("var")?,
            name: args.take("name")?,
        })
    }

    fn execute(&self, ctx: &Context) -> anyhow::Result<()> {
        ctx.put(self.name.as_str(), ctx.require_exists(&self.var).is_ok());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RequireExists {
    name: String,
    message: Option<String>,
}

impl Action for RequireExists {
    const DESCRIPTION: &'static str = "require value present and not null in context.";

    fn params() -> Vec<Param> {
        vec![
            Param::new("name", ParamType::String).describe("variable name"),
            Param::new("message", ParamType::String).optional().describe("error message"),
        ]
    }

    fn construct(args: &mut Args) -> Result<Self> {
        Ok(Self {
            name: args.take("name")?,
            message: args.take_opt("message")?,
        })
    }

    fn execute(&self, ctx: &Context) -> anyhow::Result<()> {
        ctx.require_exists(&self.name).map_err(|err| match self.message.as_deref() {
            Some(message) => violated(&self.name, Some(message), ""),
            None => err.into(),
        })
    }
}

#[derive(Debug, Default)]
pub struct RequireAbsent {
    name: String,
}

impl Action for RequireAbsent {
    const DESCRIPTION: &'static str = "require name not bound in context.";

    fn params() -> Vec<Param> {
        vec![Param::new("name", ParamType::String).describe("variable name")]
    }

    fn construct(args: &mut Args) -> Result<Self> {
        Ok(Self {
            name: args.take("name")?,
        })
    }

    fn execute(&self, ctx: &Context) -> anyhow::Result<()> {
        ctx.require_absent(&self.name)?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RequireTrue {
    name: String,
    message: Option<String>,
}

impl Action for RequireTrue {
    const DESCRIPTION: &'static str = "require a boolean value is true in context.";

    fn params() -> Vec<Param> {
        vec![
            Param::new("name", ParamType::String).describe("variable name"),
            Param::new("message", ParamType::String).optional().describe("error message"),
        ]
    }

    fn construct(args: &mut Args) -> Result<Self> {
        Ok(Self {
            name: args.take("name")?,
            message: args.take_opt("message")?,
        })
    }

    fn execute(&self, ctx: &Context) -> anyhow::Result<()> {
        match ctx.get_as::<bool>(&self.name) {
            Some(true) => Ok(()),
            _ => Err(violated(&self.name, self.message.as_deref(), "expected true")),
        }
    }
}

#[derive(Debug, Default)]
pub struct RequireFalse {
    name: String,
    message: Option<String>,
}

impl Action for RequireFalse {
    const DESCRIPTION: &'static str = "require a boolean value is false in context.";

    fn params() -> Vec<Param> {
        vec![
            Param::new("name", ParamType::String).describe("variable name"),
            Param::new("message", ParamType::String).optional().describe("error message"),
        ]
    }

    fn construct(args: &mut Args) -> Result<Self> {
        Ok(Self {
            name: args.take("name")?,
            message: args.take_opt("message")?,
        })
    }

    fn execute(&self, ctx: &Context) -> anyhow::Result<()> {
        match ctx.get_as::<bool>(&self.name) {
            Some(false) => Ok(()),
            _ => Err(violated(&self.name, self.message.as_deref(), "expected false")),
        }
    }
}

/// Text comparison shared by `TextMatch` and `TextCheck`. Patterns match the whole text.
#[derive(Debug)]
enum Matcher {
    Exact(String),
    Pattern(Regex),
}

impl Default for Matcher {
    fn default() -> Self {
        Matcher::Exact(String::new())
    }
}

impl Matcher {
    fn new(value: String, regex: bool) -> Result<Self> {
        if !regex {
            return Ok(Matcher::Exact(value));
        }
        Regex::new(&format!("^(?:{value})$"))
            .map(Matcher::Pattern)
            .map_err(|_| EngineError::mismatch("value", "regex"))
    }

    fn matches(&self, text: &str) -> bool {
        match self {
            Matcher::Exact(expected) => text == expected,
            Matcher::Pattern(re) => re.is_match(text),
        }
    }
}

#[derive(Debug, Default)]
pub struct TextMatch {
    name: String,
    matcher: Matcher,
    message: Option<String>,
}

impl Action for TextMatch {
    const DESCRIPTION: &'static str = "require a text value matches target in context.";

    fn params() -> Vec<Param> {
        vec![
            Param::new("name", ParamType::String).describe("variable name"),
            Param::new("value", ParamType::String).describe("match value"),
            Param::new("message", ParamType::String).optional().describe("error message"),
            Param::new("regex", ParamType::Bool)
                .optional()
                .describe("value is regex pattern"),
        ]
    }

    fn construct(args: &mut Args) -> Result<Self> {
        let name = args.take("name")?;
        let value = args.take("value")?;
        let message = args.take_opt("message")?;
        let regex = args.take_opt("regex")?.unwrap_or(false);
        Ok(Self {
            name,
            matcher: Matcher::new(value, regex)?,
            message,
        })
    }

    fn execute(&self, ctx: &Context) -> anyhow::Result<()> {
        let text = ctx.get_as::<String>(&self.name);
        if text.as_deref().is_some_and(|t| self.matcher.matches(t)) {
            Ok(())
        } else {
            Err(violated(&self.name, self.message.as_deref(), "text does not match"))
        }
    }
}

#[derive(Debug, Default)]
pub struct TextCheck {
    var: String,
    name: String,
    matcher: Matcher,
}

impl Action for TextCheck {
    const DESCRIPTION: &'static str = "check a text value matches target in context, store result as name.";

    fn params() -> Vec<Param> {
        vec![
            Param::new("var", ParamType::String).describe("variable name"),
            Param::new("name", ParamType::String).describe("result variable name"),
            Param::new("value", ParamType::String).describe("match value"),
            Param::new("regex", ParamType::Bool)
                .optional()
                .describe("value is regex pattern"),
        ]
    }

    fn construct(args: &mut Args) -> Result<Self> {
        let var = args.take("var")?;
        let name = args.take("name")?;
        let value = args.take("value")?;
        let regex = args.take_opt("regex")?.unwrap_or(false);
        Ok(Self {
            var,
            name,
            matcher: Matcher::new(value, regex)?,
        })
    }

    fn execute(&self, ctx: &Context) -> anyhow::Result<()> {
        let matched = ctx
            .get_as::<String>(&self.var)
            .is_some_and(|t| self.matcher.matches(&t));
        ctx.put(self.name.as_str(), matched);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct Log {
    message: String,
    level: Option<String>,
}

impl Action for Log {
    const DESCRIPTION: &'static str = "log a message; supports {{var}} interpolation.";

    fn params() -> Vec<Param> {
        vec![
            Param::new("message", ParamType::String).describe("message template"),
            Param::new("level", ParamType::String)
                .optional()
                .describe("log level, default info")
                .values(&["trace", "debug", "info", "warn", "error"]),
        ]
    }

    fn construct(args: &mut Args) -> Result<Self> {
        Ok(Self {
            message: args.take("message")?,
            level: args.take_opt("level")?,
        })
    }

    fn execute(&self, ctx: &Context) -> anyhow::Result<()> {
        let message = interpolate(&self.message, ctx);
        match self.level.as_deref().map(str::to_lowercase).as_deref() {
            Some("trace") => trace!(target: "casebot::actions", "{message}"),
            Some("debug") => debug!(target: "casebot::actions", "{message}"),
            Some("warn") | Some("warning") => warn!(target: "casebot::actions", "{message}"),
            Some("error") => error!(target: "casebot::actions", "{message}"),
            _ => info!(target: "casebot::actions", "{message}"),
        }
        Ok(())
    }
}
