//! Flow actions: branching and pauses.

use std::thread;
use std::time::Duration;

use rand::random_range;
use tracing::trace;

use crate::context::Context;
use crate::engine::{Action, Args, BoxedAction, Param, ParamType, readers};
use crate::error::Result;

#[derive(Debug, Default)]
pub struct IfElse {
    var: String,
    when_true: Option<BoxedAction>,
    when_false: Option<BoxedAction>,
}

impl Action for IfElse {
    const DESCRIPTION: &'static str = "condition action for a boolean variable.";

    fn params() -> Vec<Param> {
        vec![
            Param::new("var", ParamType::String).describe("a boolean variable name"),
            Param::new("whenTrue", ParamType::Action)
                .optional()
                .describe("when true execute, nothing when absent")
                .read_with(&readers::ACTION),
            Param::new("whenFalse", ParamType::Action)
                .optional()
                .describe("when false execute, nothing when absent")
                .read_with(&readers::ACTION),
        ]
    }

    fn construct(args: &mut Args) -> Result<Self> {
        Ok(Self {
            var: args.take("var")?,
            when_true: args.take_opt("whenTrue")?,
            when_false: args.take_opt("whenFalse")?,
        })
    }

    fn execute(&self, ctx: &Context) -> anyhow::Result<()> {
        let branch = if ctx.require::<bool>(&self.var)? {
            &self.when_true
        } else {
            &self.when_false
        };
        match branch {
            Some(action) => {
                trace!(target: "casebot::actions", var = %self.var, branch = action.identity(), "IfElse branch");
                action.execute(ctx)
            }
            None => {
                trace!(target: "casebot::actions", var = %self.var, "IfElse: no branch for this outcome");
                Ok(())
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct Sleep {
    duration: Duration,
}

impl Action for Sleep {
    const DESCRIPTION: &'static str = "pause the run.";

    fn params() -> Vec<Param> {
        vec![Param::new("duration", ParamType::Duration).describe("how long, e.g. 500ms or 2s")]
    }

    fn construct(args: &mut Args) -> Result<Self> {
        Ok(Self {
            duration: args.take("duration")?,
        })
    }

    fn execute(&self, _: &Context) -> anyhow::Result<()> {
        trace!(target: "casebot::actions", duration = ?self.duration, "sleep");
        thread::sleep(self.duration);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct SleepRand {
    min: Duration,
    max: Duration,
}

impl Action for SleepRand {
    const DESCRIPTION: &'static str = "pause the run for a random time within [min, max].";

    fn params() -> Vec<Param> {
        vec![
            Param::new("min", ParamType::Duration).describe("lower bound"),
            Param::new("max", ParamType::Duration).describe("upper bound"),
        ]
    }

    fn construct(args: &mut Args) -> Result<Self> {
        let min: Duration = args.take("min")?;
        let max: Duration = args.take("max")?;
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        Ok(Self { min, max })
    }

    fn execute(&self, _: &Context) -> anyhow::Result<()> {
        let (lo, hi) = (self.min.as_millis() as u64, self.max.as_millis() as u64);
        let delay = if lo == hi { lo } else { random_range(lo..=hi) };
        trace!(target: "casebot::actions", min = lo, max = hi, delay, "sleep_rand");
        thread::sleep(Duration::from_millis(delay));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Conf;
    use crate::engine::register;
    use crate::error::EngineError;
    use serde_json::json;

    fn if_else() -> BoxedAction {
        register()
            .unwrap()
            .bind(&Conf::new(json!({
                "action": "IfElse",
                "var": "ready",
                "whenTrue": { "action": "SetVar", "name": "took", "value": "yes" },
                "whenFalse": { "action": "SetVar", "name": "took", "value": "no" }
            })))
            .unwrap()
    }

    #[test]
    fn if_else_runs_one_branch() {
        let ctx = Context::new();
        ctx.put("ready", false);
        if_else().execute(&ctx).unwrap();
        assert_eq!(ctx.get_as::<String>("took").as_deref(), Some("no"));
    }

    #[test]
    fn if_else_requires_a_boolean() {
        let ctx = Context::new();
        ctx.put("ready", "yes");
        let err = if_else().execute(&ctx).unwrap_err();
        assert!(matches!(
            EngineError::find(&err),
            Some(EngineError::MissingContextValue { name, .. }) if name == "ready"
        ));
    }

    #[test]
    fn nested_branch_errors_name_the_branch() {
        let err = register()
            .unwrap()
            .bind(&Conf::new(json!({
                "action": "IfElse",
                "var": "ready",
                "whenTrue": { "action": "SetVar", "name": "took" },
                "whenFalse": { "action": "Remove", "name": "took" }
            })))
            .unwrap_err();
        assert!(matches!(err, EngineError::MissingField { field } if field == "whenTrue.value"));
    }

    #[test]
    fn if_else_without_a_branch_does_nothing() {
        let action = register()
            .unwrap()
            .bind(&Conf::new(json!({
                "action": "IfElse",
                "var": "ready",
                "whenTrue": { "action": "SetVar", "name": "took", "value": "yes" }
            })))
            .unwrap();
        let ctx = Context::new();
        ctx.put("ready", false);
        action.execute(&ctx).unwrap();
        assert!(!ctx.contains("took"));
    }

    #[test]
    fn sleep_rand_orders_bounds() {
        let ctx = Context::new();
        let action = register()
            .unwrap()
            .bind(&Conf::new(json!({ "action": "SleepRand", "min": "3ms", "max": 1 })))
            .unwrap();
        action.execute(&ctx).unwrap();
    }
}
