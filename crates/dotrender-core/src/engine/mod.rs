//! Engine variants behind one synchronous render contract.

pub mod cmdline;
pub mod pool;
pub mod script;
pub mod selector;

pub use cmdline::CmdLineEngine;
pub use pool::{AcquirePolicy, PoolEngine};
pub use script::{CallbackScriptEngine, LayoutLibrary, ScriptEngine};
pub use selector::{Selector, release_engine, render, use_engine, use_engines};

use crate::error::Result;
use crate::request::{EngineResult, RenderRequest};

/// A backend capable of turning graph source text into rendered output.
///
/// Implementations reconcile their own execution model (blocking call,
/// callback completion, subprocess) behind this one synchronous
/// operation. `render` takes `&self`; implementations guard any
/// non-reentrant internals themselves.
pub trait Engine: Send + Sync {
    /// Render one request to completion or a typed failure.
    fn render(&self, request: &RenderRequest) -> Result<EngineResult>;

    /// Short name for logs and failover diagnostics.
    fn name(&self) -> &str {
        "engine"
    }

    /// Release resources held by this engine. Idempotent; default no-op.
    fn shutdown(&self) {}
}

/// Write the rendered bytes to the request's output destination, if any,
/// then hand the result back to the caller.
pub(crate) fn deliver(request: &RenderRequest, result: EngineResult) -> Result<EngineResult> {
    if let Some(ref path) = request.output {
        std::fs::write(path, &result.data)?;
    }
    Ok(result)
}
