//! Engine abstraction layer for rendering DOT graphs.
//!
//! This crate unifies fundamentally different execution models behind one
//! synchronous render contract:
//! - in-process script evaluation on an embedded Lua interpreter, with
//!   direct return values or callback-style completion,
//! - subprocess invocation of an external layout executable,
//! - pooled dispatch across several non-reentrant engine instances,
//! - process-wide engine selection with ordered failover.
//!
//! Graph-model builders and output converters sit outside this crate;
//! they produce a [`RenderRequest`] and consume an [`EngineResult`].

pub mod bridge;
pub mod engine;
pub mod error;
pub mod exec;
pub mod format;
pub mod options;
pub mod request;

pub use bridge::{CycleToken, ResultBridge};
pub use engine::{
    AcquirePolicy, CallbackScriptEngine, CmdLineEngine, Engine, LayoutLibrary, PoolEngine,
    ScriptEngine, Selector,
};
pub use error::{Error, Result};
pub use exec::{CommandExecutor, CommandSpec, ExecOutput, Platform, SystemExecutor,
    executable_names, find_executable};
pub use format::{BuiltInRasterizer, Format};
pub use options::{CmdOptions, EngineOptions, Layout, LayoutOption};
pub use request::{EngineResult, RenderRequest};
