//! Render requests and results.
//!
//! `RenderRequest` is the boundary between the graph-model producers
//! (builders, parsers, CLIs) and the engine layer: source text in, typed
//! options, rendered bytes out.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::format::{BuiltInRasterizer, Format};
use crate::options::EngineOptions;

/// One render job: graph source plus target configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderRequest {
    /// Graph description in the DOT language.
    pub source: String,
    /// Target output format.
    pub format: Format,
    /// Optional built-in rasterizer overriding the plain format flag.
    pub rasterizer: Option<BuiltInRasterizer>,
    /// Optional destination the rendered bytes are also written to.
    pub output: Option<PathBuf>,
    /// Engine-specific options.
    pub options: EngineOptions,
}

impl RenderRequest {
    pub fn new(source: impl Into<String>, format: Format) -> Self {
        Self {
            source: source.into(),
            format,
            rasterizer: None,
            output: None,
            options: EngineOptions::None,
        }
    }

    pub fn with_rasterizer(mut self, rasterizer: BuiltInRasterizer) -> Self {
        self.rasterizer = Some(rasterizer);
        self
    }

    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }
}

/// Rendered output plus the format it resolved to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineResult {
    /// Format of `data`.
    pub format: Format,
    /// Rendered bytes. Text for most formats, binary for raster images.
    pub data: Vec<u8>,
}

impl EngineResult {
    pub fn new(format: Format, data: Vec<u8>) -> Self {
        Self { format, data }
    }

    /// Construct from rendered text.
    pub fn from_text(format: Format, text: impl Into<String>) -> Self {
        Self {
            format,
            data: text.into().into_bytes(),
        }
    }

    /// The rendered output as text. Lossy for binary formats.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}
