//! Engine selection and failover.
//!
//! A [`Selector`] is an explicit handle holding the bound engine (or an
//! ordered fallback list). Library code should create and pass its own
//! selector; the module-level free functions expose one process-wide
//! ambient selector for the outermost convenience boundary, matching the
//! classic "bind once, render anywhere" usage.
//!
//! The binding is a single shared slot. Rebinding while renders are in
//! flight is safe memory-wise but callers relying on a consistent backend
//! must not rebind mid-stream; that contract is documented, not enforced.

use std::sync::{Arc, OnceLock, RwLock};

use crate::error::{Error, Result};
use crate::request::{EngineResult, RenderRequest};

use super::Engine;

/// Holds the currently bound engine or ordered fallback list.
#[derive(Default)]
pub struct Selector {
    binding: RwLock<Option<Vec<Arc<dyn Engine>>>>,
}

impl Selector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a single engine, replacing any previous binding.
    ///
    /// Last bind wins; engines from the previous binding are not shut
    /// down, since other callers may still hold results from them.
    pub fn use_engine(&self, engine: impl Engine + 'static) {
        self.use_engines(vec![Arc::new(engine) as Arc<dyn Engine>]);
    }

    /// Bind an ordered fallback list, replacing any previous binding.
    ///
    /// An empty list clears the binding without shutting anything down,
    /// so the stored binding is never an empty list.
    pub fn use_engines(&self, engines: Vec<Arc<dyn Engine>>) {
        let mut slot = self.write();
        *slot = if engines.is_empty() {
            None
        } else {
            Some(engines)
        };
    }

    /// Clear the binding and shut the bound engines down.
    ///
    /// A pooled engine drains and reclaims its entries here. Calling with
    /// no binding set is a no-op.
    pub fn release_engine(&self) {
        let engines = self.write().take();
        if let Some(engines) = engines {
            for engine in engines {
                tracing::debug!(engine = engine.name(), "shutting down released engine");
                engine.shutdown();
            }
        }
    }

    /// Whether an engine is currently bound.
    pub fn is_bound(&self) -> bool {
        self.read().is_some()
    }

    /// Render through the bound engine, falling back along the list.
    ///
    /// Recoverable failures (execution, timeout, missing dependency) move
    /// on to the next engine; the last failure surfaces if every engine
    /// fails. Configuration errors abort immediately.
    pub fn render(&self, request: &RenderRequest) -> Result<EngineResult> {
        let engines = self
            .read()
            .clone()
            .ok_or_else(|| Error::Configuration("no engine bound; call use_engine first".into()))?;

        let mut last_failure = None;
        for engine in &engines {
            match engine.render(request) {
                Ok(result) => return Ok(result),
                Err(err) if err.is_recoverable() => {
                    tracing::warn!(
                        engine = engine.name(),
                        error = %err,
                        "engine failed, trying next fallback"
                    );
                    last_failure = Some(err);
                }
                Err(err) => return Err(err),
            }
        }
        // use_engines never stores an empty list, so a failure is recorded.
        Err(last_failure
            .unwrap_or_else(|| Error::Configuration("engine binding is empty".into())))
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Option<Vec<Arc<dyn Engine>>>> {
        self.binding
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Option<Vec<Arc<dyn Engine>>>> {
        self.binding
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// The process-wide ambient selector.
fn ambient() -> &'static Selector {
    static AMBIENT: OnceLock<Selector> = OnceLock::new();
    AMBIENT.get_or_init(Selector::new)
}

/// Bind an engine on the ambient selector.
pub fn use_engine(engine: impl Engine + 'static) {
    ambient().use_engine(engine);
}

/// Bind an ordered fallback list on the ambient selector.
pub fn use_engines(engines: Vec<Arc<dyn Engine>>) {
    ambient().use_engines(engines);
}

/// Clear the ambient binding, shutting bound engines down.
pub fn release_engine() {
    ambient().release_engine();
}

/// Render through the ambient selector.
pub fn render(request: &RenderRequest) -> Result<EngineResult> {
    ambient().render(request)
}
