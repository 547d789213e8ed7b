pub mod api;
pub mod env;
pub mod host;

pub use env::{EngineClock, ScriptEnv};
pub use host::{ScriptBinding, ScriptHost, ScriptSource, ScriptTarget};
