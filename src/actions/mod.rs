//! Built-in action catalog.
//!
//! Each submodule is one category; an action's category is the name of the module
//! declaring it. New actions are linked in by adding them to the `builtins!` list.

pub mod common;
pub mod control;
pub mod desktop;

use crate::engine::{Registry, RegistryBuilder};

macro_rules! builtins {
    ($($module:ident :: $action:ident),* $(,)?) => {
        /// Registry builder preloaded with every built-in action.
        pub fn catalog() -> RegistryBuilder {
            Registry::builder()$(.with::<$module::$action>())*
        }

        /// Bind every built-in against a synthetic config that provides all of its
        /// parameters, so a constructor that skips or invents a parameter fails.
        #[cfg(test)]
        fn verify_all(registry: &Registry) -> crate::error::Result<()> {
            $(crate::engine::binder::verify::<$module::$action>(registry, "Desktop")?;)*
            Ok(())
        }
    };
}

builtins![
    common::ShowVar,
    common::SetVar,
    common::PutAll,
    common::Remove,
    common::Forget,
    common::ExistCheck,
    common::RequireExists,
    common::RequireAbsent,
    common::RequireTrue,
    common::RequireFalse,
    common::TextMatch,
    common::TextCheck,
    common::Log,
    control::IfElse,
    control::Sleep,
    control::SleepRand,
    desktop::Desktop,
    desktop::MouseMove,
    desktop::MouseClick,
    desktop::MouseScroll,
    desktop::TypeText,
];
