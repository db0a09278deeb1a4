//! Per-engine option sets.
//!
//! Command-line options are tagged variants with a pure mapping to flag
//! tokens. Invalid combinations are rejected when the set is built, not
//! when a render is attempted.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Engine-specific options attached to a [`crate::RenderRequest`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum EngineOptions {
    /// No engine-specific options.
    #[default]
    None,
    /// Options for the external layout executable.
    CommandLine(CmdOptions),
}

impl EngineOptions {
    /// The command-line option set, if this is the command-line variant.
    pub fn as_cmd(&self) -> Option<&CmdOptions> {
        match self {
            EngineOptions::CommandLine(opts) => Some(opts),
            EngineOptions::None => None,
        }
    }
}

/// Layout algorithm selected with the `-K` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Layout {
    Dot,
    Neato,
    Fdp,
    Sfdp,
    Twopi,
    Circo,
    Osage,
    Patchwork,
}

impl Layout {
    /// Value passed to the `-K` flag.
    pub fn flag_value(&self) -> &'static str {
        match self {
            Layout::Dot => "dot",
            Layout::Neato => "neato",
            Layout::Fdp => "fdp",
            Layout::Sfdp => "sfdp",
            Layout::Twopi => "twopi",
            Layout::Circo => "circo",
            Layout::Osage => "osage",
            Layout::Patchwork => "patchwork",
        }
    }
}

/// A discrete layout option, one per command-line flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LayoutOption {
    /// neato: use node positions from the input, lay out edges only (`-n`).
    NoLayout,
    /// neato: use node positions as-is, allowing overlap (`-n2`).
    NoLayoutAllowOverlap,
    /// neato: reduce the graph before layout (`-x`).
    ReduceGraph,
    /// fdp: don't use a grid heuristic (`-Lg`).
    NoGrid,
    /// fdp: use the old force function (`-LO`).
    OldForce,
    /// fdp: overlap expansion factor (`-LC<v>`).
    OverlapExpansion(f64),
    /// fdp: number of layout iterations (`-Ln<v>`).
    Iterations(u32),
    /// fdp: unscaled factor (`-LU<v>`).
    UnscaledFactor(f64),
    /// fdp: simulated-annealing start temperature (`-LT<v>`).
    Temperature(f64),
}

/// Option families that must not be mixed in one set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Neato,
    Fdp,
}

impl LayoutOption {
    fn family(&self) -> Family {
        match self {
            LayoutOption::NoLayout
            | LayoutOption::NoLayoutAllowOverlap
            | LayoutOption::ReduceGraph => Family::Neato,
            LayoutOption::NoGrid
            | LayoutOption::OldForce
            | LayoutOption::OverlapExpansion(_)
            | LayoutOption::Iterations(_)
            | LayoutOption::UnscaledFactor(_)
            | LayoutOption::Temperature(_) => Family::Fdp,
        }
    }

    /// Discriminant used to detect duplicate options within one set.
    fn kind(&self) -> &'static str {
        match self {
            LayoutOption::NoLayout => "no-layout",
            LayoutOption::NoLayoutAllowOverlap => "no-layout-allow-overlap",
            LayoutOption::ReduceGraph => "reduce-graph",
            LayoutOption::NoGrid => "no-grid",
            LayoutOption::OldForce => "old-force",
            LayoutOption::OverlapExpansion(_) => "overlap-expansion",
            LayoutOption::Iterations(_) => "iterations",
            LayoutOption::UnscaledFactor(_) => "unscaled-factor",
            LayoutOption::Temperature(_) => "temperature",
        }
    }

    fn validate(&self) -> Result<()> {
        let numeric = match self {
            LayoutOption::OverlapExpansion(v)
            | LayoutOption::UnscaledFactor(v)
            | LayoutOption::Temperature(v) => Some(*v),
            LayoutOption::Iterations(0) => {
                return Err(Error::Configuration(
                    "iterations must be at least 1".into(),
                ));
            }
            _ => None,
        };
        if let Some(v) = numeric
            && (!v.is_finite() || v <= 0.0)
        {
            return Err(Error::Configuration(format!(
                "{} must be a positive finite number, got {v}",
                self.kind()
            )));
        }
        Ok(())
    }

    /// Serialize this option to its flag token.
    ///
    /// Float-valued options always render with exactly one decimal digit,
    /// so `3` becomes `3.0`.
    pub fn flag_token(&self) -> String {
        match self {
            LayoutOption::NoLayout => "-n".to_string(),
            LayoutOption::NoLayoutAllowOverlap => "-n2".to_string(),
            LayoutOption::ReduceGraph => "-x".to_string(),
            LayoutOption::NoGrid => "-Lg".to_string(),
            LayoutOption::OldForce => "-LO".to_string(),
            LayoutOption::OverlapExpansion(v) => format!("-LC{v:.1}"),
            LayoutOption::Iterations(v) => format!("-Ln{v}"),
            LayoutOption::UnscaledFactor(v) => format!("-LU{v:.1}"),
            LayoutOption::Temperature(v) => format!("-LT{v:.1}"),
        }
    }
}

/// Validated option set for the command-line engine.
///
/// Built once, mapped deterministically to flag tokens at render time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CmdOptions {
    layout: Option<Layout>,
    options: Vec<LayoutOption>,
}

impl CmdOptions {
    /// Build an option set, rejecting invalid combinations.
    ///
    /// Mixing neato-family and fdp-family options, duplicate options, and
    /// out-of-range numeric values all fail with a configuration error.
    pub fn new(layout: Option<Layout>, options: Vec<LayoutOption>) -> Result<Self> {
        let mut family = None;
        let mut seen: Vec<&'static str> = Vec::new();
        for option in &options {
            option.validate()?;
            if seen.contains(&option.kind()) {
                return Err(Error::Configuration(format!(
                    "duplicate option {}",
                    option.kind()
                )));
            }
            seen.push(option.kind());
            match family {
                None => family = Some(option.family()),
                Some(f) if f != option.family() => {
                    return Err(Error::Configuration(
                        "cannot mix neato and fdp options in one set".into(),
                    ));
                }
                Some(_) => {}
            }
        }
        Ok(Self { layout, options })
    }

    /// Option set with only a layout algorithm.
    pub fn layout(layout: Layout) -> Self {
        Self {
            layout: Some(layout),
            options: Vec::new(),
        }
    }

    /// The selected layout algorithm, if any.
    pub fn layout_algorithm(&self) -> Option<Layout> {
        self.layout
    }

    /// Serialize to flag tokens in declaration order.
    pub fn flag_tokens(&self) -> Vec<String> {
        self.options.iter().map(LayoutOption::flag_token).collect()
    }
}
