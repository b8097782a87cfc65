#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

/*!
Executor module for casebot.

This module wires together:
- `case`: one parsed script (bound actions, local vars, scoped cleanup) and its run loop
- `driver`: the top-level sequencer (global vars, global init, then scripts or a cases directory)

Typical usage:
```no_run
use casebot::config::load_global_from_path;
use casebot::engine::register;
use casebot::executor::Driver;
use tokio_util::sync::CancellationToken;

let registry = register()?;
let global = load_global_from_path("global.json")?;
let driver = Driver::new(registry, global);
driver.run(&[], &CancellationToken::new())?;
# Ok::<(), anyhow::Error>(())
```
*/

pub mod case;
pub mod driver;

pub use case::Case;
pub use driver::{Driver, GLOBAL_CASE, discover_cases};
