//! In-process script engines backed by an embedded Lua interpreter.
//!
//! The layout algorithms live in a Lua library that defines a global
//! `render(source, format, layout)` function. Two adapters wrap it:
//!
//! - [`ScriptEngine`] expects `render` to return the output string.
//! - [`CallbackScriptEngine`] expects the library to complete through
//!   native `result`/`error`/`log` callables installed into the global
//!   namespace before every evaluation, and blocks on a [`ResultBridge`].
//!
//! The interpreter's global namespace is shared mutable state, so each
//! adapter serializes all evaluations behind a per-instance mutex.
//! Concurrent callers queue; their evaluations never interleave.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use mlua::Lua;

use crate::bridge::ResultBridge;
use crate::error::{Error, Result};
use crate::request::{EngineResult, RenderRequest};

use super::{Engine, deliver};

/// Default deadline for callback-style completion.
const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(30);

/// Lua source of the graph-layout library.
#[derive(Debug, Clone)]
pub struct LayoutLibrary {
    source: String,
    /// Where the library came from, for error context.
    origin: String,
}

impl LayoutLibrary {
    /// Library from an in-memory string.
    pub fn from_source(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            origin: "<inline>".to_string(),
        }
    }

    /// Library loaded from a file.
    ///
    /// A missing file is a [`Error::MissingDependency`] naming the path,
    /// distinguishable from a script that fails to evaluate.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| Error::MissingDependency {
            artifact: path.display().to_string(),
            message: format!("layout library not readable: {e}"),
        })?;
        Ok(Self {
            source,
            origin: path.display().to_string(),
        })
    }
}

/// Build an interpreter, evaluate the library and check its entry point.
///
/// Fails fast at construction so a broken installation surfaces before
/// the first render.
fn boot_interpreter(library: &LayoutLibrary) -> Result<Lua> {
    let lua = Lua::new();
    lua.load(&library.source)
        .set_name(library.origin.as_str())
        .exec()
        .map_err(|e| Error::Execution {
            message: lua_message(&e),
            context: Some(format!("evaluating layout library {}", library.origin)),
        })?;

    let has_render = lua
        .globals()
        .get::<mlua::Function>("render")
        .is_ok();
    if !has_render {
        return Err(Error::MissingDependency {
            artifact: "render".to_string(),
            message: format!("layout library {} defines no render function", library.origin),
        });
    }
    Ok(lua)
}

/// Unwrap an mlua error into its original diagnostic text.
fn lua_message(err: &mlua::Error) -> String {
    match err {
        mlua::Error::RuntimeError(msg) => msg.clone(),
        mlua::Error::SyntaxError { message, .. } => message.clone(),
        mlua::Error::CallbackError { cause, .. } => lua_message(cause),
        other => other.to_string(),
    }
}

/// Stage the request into interpreter globals for the driver chunk.
///
/// Passing values through globals instead of splicing them into script
/// text sidesteps source escaping entirely.
fn stage_request(lua: &Lua, request: &RenderRequest) -> Result<()> {
    let globals = lua.globals();
    let layout = request
        .options
        .as_cmd()
        .and_then(|opts| opts.layout_algorithm())
        .map(|l| l.flag_value().to_string());
    globals
        .set("graph_source", request.source.as_str())
        .and_then(|_| globals.set("graph_format", request.format.flag_value()))
        .and_then(|_| globals.set("graph_layout", layout))
        .map_err(|e| Error::execution(lua_message(&e)))
}

fn lock_lua(lua: &Mutex<Lua>) -> MutexGuard<'_, Lua> {
    lua.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Direct-return script engine: `render` yields the output value
/// synchronously.
pub struct ScriptEngine {
    lua: Mutex<Lua>,
    origin: String,
}

impl std::fmt::Debug for ScriptEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptEngine")
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

impl ScriptEngine {
    pub fn new(library: LayoutLibrary) -> Result<Self> {
        let lua = boot_interpreter(&library)?;
        Ok(Self {
            lua: Mutex::new(lua),
            origin: library.origin,
        })
    }
}

impl Engine for ScriptEngine {
    fn render(&self, request: &RenderRequest) -> Result<EngineResult> {
        let lua = lock_lua(&self.lua);
        stage_request(&lua, request)?;

        let rendered: String = lua
            .load("return render(graph_source, graph_format, graph_layout)")
            .set_name("=driver")
            .eval()
            .map_err(|e| Error::Execution {
                message: lua_message(&e),
                context: Some(format!("layout library {}", self.origin)),
            })?;

        let text = request.format.post_process(rendered);
        deliver(request, EngineResult::from_text(request.format, text))
    }

    fn name(&self) -> &str {
        "script"
    }
}

/// Callback-style script engine: the library completes by invoking one of
/// the injected `result`/`error` callables; `log` adds diagnostics.
pub struct CallbackScriptEngine {
    lua: Mutex<Lua>,
    bridge: Arc<ResultBridge>,
    timeout: Duration,
    origin: String,
}

impl CallbackScriptEngine {
    pub fn new(library: LayoutLibrary) -> Result<Self> {
        let lua = boot_interpreter(&library)?;
        Ok(Self {
            lua: Mutex::new(lua),
            bridge: Arc::new(ResultBridge::new()),
            timeout: DEFAULT_CALLBACK_TIMEOUT,
            origin: library.origin,
        })
    }

    /// Override the completion deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Install the three native callables for the current bridge cycle.
    fn install_callbacks(&self, lua: &Lua, token: crate::bridge::CycleToken) -> mlua::Result<()> {
        let globals = lua.globals();

        let bridge = Arc::clone(&self.bridge);
        globals.set(
            "result",
            lua.create_function(move |_, value: String| {
                bridge.set_result(token, value);
                Ok(())
            })?,
        )?;

        let bridge = Arc::clone(&self.bridge);
        globals.set(
            "error",
            lua.create_function(move |_, message: String| {
                bridge.set_error(token, message);
                Ok(())
            })?,
        )?;

        let bridge = Arc::clone(&self.bridge);
        globals.set(
            "log",
            lua.create_function(move |_, line: String| {
                bridge.log(token, line);
                Ok(())
            })?,
        )?;

        Ok(())
    }
}

impl Engine for CallbackScriptEngine {
    fn render(&self, request: &RenderRequest) -> Result<EngineResult> {
        // The lock also guarantees the bridge serves one cycle at a time.
        let lua = lock_lua(&self.lua);

        let token = self.bridge.submit();
        self.install_callbacks(&lua, token)
            .map_err(|e| Error::execution(lua_message(&e)))?;
        stage_request(&lua, request)?;

        lua.load("render(graph_source, graph_format, graph_layout)")
            .set_name("=driver")
            .exec()
            .map_err(|e| Error::Execution {
                message: lua_message(&e),
                context: Some(format!("layout library {}", self.origin)),
            })?;

        let (rendered, log) = self.bridge.wait_for(token, self.timeout)?;
        for line in log {
            tracing::debug!(library = %self.origin, "{line}");
        }

        let text = request.format.post_process(rendered);
        deliver(request, EngineResult::from_text(request.format, text))
    }

    fn name(&self) -> &str {
        "script-callback"
    }
}
