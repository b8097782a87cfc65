//! Desktop input simulation through Enigo.
//!
//! `Desktop` opens one input session under [`SESSION`]; the other actions require it.
//! The session is a context resource, so teardown (or `Remove`) closes it.

use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context as _, bail};
use enigo::{Axis, Button, Coordinate, Direction, Enigo, Keyboard as _, Mouse as _, Settings};
use tracing::{debug, info, trace};

use crate::context::{Context, Resource};
use crate::engine::{Action, Args, Param, ParamType};
use crate::error::{EngineError, Result};
use crate::utils::interpolate;

/// Context name of the desktop session.
pub const SESSION: &str = "Desktop";

/// An open input session. In dry-run mode input is logged instead of simulated.
#[derive(Debug)]
pub struct Session {
    dry_run: bool,
    closed: AtomicBool,
}

impl Session {
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            closed: AtomicBool::new(false),
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Run one input operation. Enigo is created per call since its handle is not
    /// shareable across threads on every platform.
    fn input<F>(&self, op: &'static str, f: F) -> anyhow::Result<()>
    where
        F: FnOnce(&mut Enigo) -> anyhow::Result<()>,
    {
        if self.is_closed() {
            bail!("desktop session is closed");
        }
        if self.dry_run {
            return Ok(());
        }
        trace!(target: "casebot::actions", op, "Initializing Enigo");
        let mut enigo = Enigo::new(&Settings::default()).context("Failed to initialize Enigo")?;
        f(&mut enigo).with_context(|| format!("{op} failed"))
    }
}

impl Resource for Session {
    fn kind(&self) -> &'static str {
        "desktop"
    }

    fn release(&self) -> anyhow::Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            bail!("desktop session released twice");
        }
        debug!(target: "casebot::actions", dry_run = self.dry_run, "Desktop session closed");
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct Desktop {
    dry_run: bool,
}

impl Action for Desktop {
    const DESCRIPTION: &'static str = "open the desktop input session.";

    fn params() -> Vec<Param> {
        vec![
            Param::new("dryRun", ParamType::Bool)
                .optional()
                .describe("log input instead of simulating it"),
        ]
    }

    fn construct(args: &mut Args) -> Result<Self> {
        Ok(Self {
            dry_run: args.take_opt("dryRun")?.unwrap_or(false),
        })
    }

    fn execute(&self, ctx: &Context) -> anyhow::Result<()> {
        ctx.require_absent(SESSION)?;
        ctx.put_resource(SESSION, Session::new(self.dry_run));
        info!(target: "casebot::actions", dry_run = self.dry_run, "Desktop session opened");
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MouseMove {
    x: i32,
    y: i32,
}

impl Action for MouseMove {
    const DESCRIPTION: &'static str = "move mouse cursor to absolute screen coordinates.";

    fn params() -> Vec<Param> {
        vec![Param::new("x", ParamType::Int), Param::new("y", ParamType::Int)]
    }

    fn construct(args: &mut Args) -> Result<Self> {
        Ok(Self {
            x: args.take("x")?,
            y: args.take("y")?,
        })
    }

    fn execute(&self, ctx: &Context) -> anyhow::Result<()> {
        let session = ctx.require_resource::<Session>(SESSION)?;
        let (x, y) = (self.x, self.y);
        if session.is_dry_run() {
            info!(target: "casebot::actions", x, y, "DRY-RUN mouse_move_to");
        }
        session.input("mouse_move_to", |enigo| {
            enigo.move_mouse(x, y, Coordinate::Abs)?;
            Ok(())
        })
    }
}

#[derive(Debug, Default, Clone, Copy)]
enum MouseButton {
    #[default]
    Left,
    Middle,
    Right,
}

impl MouseButton {
    fn parse(raw: &str) -> Result<Self> {
        match raw.to_lowercase().as_str() {
            "left" => Ok(MouseButton::Left),
            "middle" => Ok(MouseButton::Middle),
            "right" => Ok(MouseButton::Right),
            _ => Err(EngineError::mismatch("button", "left|middle|right")),
        }
    }

    fn to_enigo(self) -> Button {
        match self {
            MouseButton::Left => Button::Left,
            MouseButton::Middle => Button::Middle,
            MouseButton::Right => Button::Right,
        }
    }
}

#[derive(Debug, Default)]
pub struct MouseClick {
    button: MouseButton,
    count: u32,
}

impl Action for MouseClick {
    const DESCRIPTION: &'static str = "click a mouse button one or more times.";

    fn params() -> Vec<Param> {
        vec![
            Param::new("button", ParamType::String)
                .optional()
                .describe("button, default left")
                .values(&["left", "middle", "right"]),
            Param::new("count", ParamType::Int).optional().describe("clicks, default 1"),
        ]
    }

    fn construct(args: &mut Args) -> Result<Self> {
        let button = match args.take_opt::<String>("button")? {
            Some(raw) => MouseButton::parse(&raw)?,
            None => MouseButton::default(),
        };
        let count: Option<i32> = args.take_opt("count")?;
        Ok(Self {
            button,
            count: count.unwrap_or(1).max(1) as u32,
        })
    }

    fn execute(&self, ctx: &Context) -> anyhow::Result<()> {
        let session = ctx.require_resource::<Session>(SESSION)?;
        let (button, count) = (self.button, self.count);
        if session.is_dry_run() {
            info!(target: "casebot::actions", ?button, count, "DRY-RUN mouse_click");
        }
        session.input("mouse_click", |enigo| {
            for _ in 0..count {
                enigo.button(button.to_enigo(), Direction::Click)?;
            }
            Ok(())
        })
    }
}

#[derive(Debug, Default)]
pub struct MouseScroll {
    dx: i32,
    dy: i32,
}

impl Action for MouseScroll {
    const DESCRIPTION: &'static str = "scroll the mouse wheel.";

    fn params() -> Vec<Param> {
        vec![
            Param::new("dx", ParamType::Int).optional().describe("horizontal steps"),
            Param::new("dy", ParamType::Int).optional().describe("vertical steps"),
        ]
    }

    fn construct(args: &mut Args) -> Result<Self> {
        Ok(Self {
            dx: args.take_opt("dx")?.unwrap_or(0),
            dy: args.take_opt("dy")?.unwrap_or(0),
        })
    }

    fn execute(&self, ctx: &Context) -> anyhow::Result<()> {
        let session = ctx.require_resource::<Session>(SESSION)?;
        let (dx, dy) = (self.dx, self.dy);
        if session.is_dry_run() {
            info!(target: "casebot::actions", dx, dy, "DRY-RUN mouse_scroll");
        }
        session.input("mouse_scroll", |enigo| {
            if dx != 0 {
                enigo.scroll(dx, Axis::Horizontal)?;
            }
            if dy != 0 {
                enigo.scroll(dy, Axis::Vertical)?;
            }
            Ok(())
        })
    }
}

#[derive(Debug, Default)]
pub struct TypeText {
    text: String,
}

impl Action for TypeText {
    const DESCRIPTION: &'static str = "type literal text; supports {{var}} interpolation.";

    fn params() -> Vec<Param> {
        vec![Param::new("text", ParamType::String).describe("text to type")]
    }

    fn construct(args: &mut Args) -> Result<Self> {
        Ok(Self {
            text: args.take("text")?,
        })
    }

    fn execute(&self, ctx: &Context) -> anyhow::Result<()> {
        let session = ctx.require_resource::<Session>(SESSION)?;
        let text = interpolate(&self.text, ctx);
        if session.is_dry_run() {
            info!(target: "casebot::actions", %text, "DRY-RUN type_text");
        }
        session.input("type_text", |enigo| {
            enigo.text(&text)?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Conf;
    use crate::engine::register;
    use serde_json::json;

    fn run(doc: serde_json::Value, ctx: &Context) -> anyhow::Result<()> {
        register()?.bind(&Conf::new(doc))?.execute(ctx)
    }

    #[test]
    fn session_is_a_singleton() {
        let ctx = Context::new();
        run(json!({ "action": "Desktop", "dryRun": true }), &ctx).unwrap();
        let err = run(json!({ "action": "Desktop", "dryRun": true }), &ctx).unwrap_err();
        assert!(matches!(
            EngineError::find(&err),
            Some(EngineError::PreconditionViolated { name, .. }) if name == SESSION
        ));
        assert_eq!(ctx.pending_teardown(), 1);
    }

    #[test]
    fn input_requires_an_open_session() {
        let ctx = Context::new();
        let err = run(json!({ "action": "TypeText", "text": "hello" }), &ctx).unwrap_err();
        assert!(matches!(
            EngineError::find(&err),
            Some(EngineError::MissingContextValue { name, .. }) if name == SESSION
        ));
    }

    #[test]
    fn dry_run_input_is_logged_only() {
        let ctx = Context::new();
        ctx.put("who", "world");
        run(json!({ "action": "Desktop", "dryRun": true }), &ctx).unwrap();
        run(json!({ "action": "MouseMove", "x": 10, "y": "20" }), &ctx).unwrap();
        run(json!({ "action": "MouseClick", "button": "right", "count": 2 }), &ctx).unwrap();
        run(json!({ "action": "MouseScroll", "dy": -3 }), &ctx).unwrap();
        run(json!({ "action": "TypeText", "text": "hello {{who}}" }), &ctx).unwrap();
    }

    #[test]
    fn closing_the_context_closes_the_session() {
        let ctx = Context::new();
        run(json!({ "action": "Desktop", "dryRun": true }), &ctx).unwrap();
        let session = ctx.require_resource::<Session>(SESSION).unwrap();
        assert_eq!(ctx.close(), 1);
        assert!(session.is_closed());
        assert!(run(json!({ "action": "TypeText", "text": "late" }), &ctx).is_err());
    }

    #[test]
    fn unknown_button_is_rejected_at_bind_time() {
        let conf = Conf::new(json!({ "action": "MouseClick", "button": "thumb" }));
        assert!(matches!(
            register().unwrap().bind(&conf),
            Err(EngineError::TypeMismatch { field, .. }) if field == "button"
        ));
    }
}
