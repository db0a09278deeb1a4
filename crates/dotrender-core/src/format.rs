//! Output formats and built-in rasterizer selection.
//!
//! `Format` is a pure mapping from a target format to its command-line
//! flag value, file extension and post-processing step. The layout
//! backends treat it as opaque configuration.

use serde::{Deserialize, Serialize};

/// Target output format for a render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Format {
    Png,
    /// SVG with the XML prolog and doctype stripped, suitable for inlining.
    Svg,
    /// SVG with the full standalone XML header.
    SvgStandalone,
    Dot,
    Xdot,
    Plain,
    PlainExt,
    Ps,
    Json,
}

impl Format {
    /// Value passed to the layout tool's `-T` flag.
    ///
    /// Both SVG variants render as `svg`; the standalone distinction is a
    /// post-processing concern.
    pub fn flag_value(&self) -> &'static str {
        match self {
            Format::Png => "png",
            Format::Svg | Format::SvgStandalone => "svg",
            Format::Dot => "dot",
            Format::Xdot => "xdot",
            Format::Plain => "plain",
            Format::PlainExt => "plain-ext",
            Format::Ps => "ps",
            Format::Json => "json",
        }
    }

    /// File extension of the tool's output file.
    pub fn file_extension(&self) -> &'static str {
        match self {
            Format::Png => "png",
            Format::Svg | Format::SvgStandalone => "svg",
            Format::Dot | Format::Xdot => "dot",
            Format::Plain | Format::PlainExt => "txt",
            Format::Ps => "ps",
            Format::Json => "json",
        }
    }

    /// Whether the rendered output is text (as opposed to binary image data).
    pub fn is_text(&self) -> bool {
        !matches!(self, Format::Png)
    }

    /// Adjust raw tool output for this format.
    ///
    /// Plain `Svg` drops the XML prolog and doctype header so the result
    /// can be embedded directly; `SvgStandalone` keeps the header intact.
    pub fn post_process(&self, output: String) -> String {
        match self {
            Format::Svg => strip_svg_header(output),
            _ => output,
        }
    }
}

/// Remove the leading `<?xml …?>` and `<!DOCTYPE …>` lines, if present.
fn strip_svg_header(output: String) -> String {
    let start = output.find("<svg").unwrap_or(0);
    output[start..].to_string()
}

/// Refinement of the `-T` flag selecting one of the tool's built-in
/// renderer/formatter plugins: `-T<format>[:<renderer>[:<formatter>]]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuiltInRasterizer {
    format: String,
    renderer: Option<String>,
    formatter: Option<String>,
}

impl BuiltInRasterizer {
    pub fn new(
        format: impl Into<String>,
        renderer: Option<&str>,
        formatter: Option<&str>,
    ) -> Self {
        Self {
            format: format.into(),
            renderer: renderer.map(str::to_owned),
            formatter: formatter.map(str::to_owned),
        }
    }

    /// Serialized value for the `-T` flag.
    pub fn flag_value(&self) -> String {
        let mut value = self.format.clone();
        if let Some(ref renderer) = self.renderer {
            value.push(':');
            value.push_str(renderer);
            if let Some(ref formatter) = self.formatter {
                value.push(':');
                value.push_str(formatter);
            }
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn svg_variants_share_flag_value() {
        assert_eq!(Format::Svg.flag_value(), "svg");
        assert_eq!(Format::SvgStandalone.flag_value(), "svg");
        assert_eq!(Format::PlainExt.flag_value(), "plain-ext");
    }

    #[test]
    fn svg_strips_header() {
        let raw = "<?xml version=\"1.0\"?>\n<!DOCTYPE svg PUBLIC \"x\">\n<svg width=\"1\"></svg>".to_string();
        let processed = Format::Svg.post_process(raw.clone());
        assert!(processed.starts_with("<svg"));

        let standalone = Format::SvgStandalone.post_process(raw.clone());
        assert_eq!(standalone, raw);
    }

    #[test]
    fn rasterizer_flag_value() {
        let full = BuiltInRasterizer::new("svg", Some("render"), Some("format"));
        assert_eq!(full.flag_value(), "svg:render:format");

        let renderer_only = BuiltInRasterizer::new("png", Some("cairo"), None);
        assert_eq!(renderer_only.flag_value(), "png:cairo");

        // Formatter without renderer cannot serialize, so it is ignored.
        let formatter_only = BuiltInRasterizer::new("png", None, Some("gd"));
        assert_eq!(formatter_only.flag_value(), "png");
    }
}
