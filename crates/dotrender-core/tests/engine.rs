//! End-to-end engine scenarios across the selector, script, command-line
//! and pool variants.

use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use dotrender_core::engine::Engine;
use dotrender_core::{
    CmdLineEngine, CommandExecutor, CommandSpec, EngineOptions, EngineResult, Error, ExecOutput,
    Format, LayoutLibrary, Platform, PoolEngine, RenderRequest, Result, ScriptEngine, Selector,
    executable_names,
};

/// Header every standalone SVG produced by graphviz 1.7+ starts with.
const SVG_STANDALONE_HEADER: &str =
    "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"no\"?>\n<!DOCTYPE svg PUBLIC";

const FIXTURE_SVG: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"no\"?>\n\
<!DOCTYPE svg PUBLIC \"-//W3C//DTD SVG 1.1//EN\" \"http://www.w3.org/Graphics/SVG/1.1/DTD/svg11.dtd\">\n\
<svg width=\"62pt\" height=\"116pt\"><g><title>g</title></g></svg>\n";

/// Executor standing in for the real layout tool: copies a fixture SVG to
/// the expected output path.
struct FixtureCopyExecutor;

impl CommandExecutor for FixtureCopyExecutor {
    fn execute(&self, spec: &CommandSpec, work_dir: &Path, _: Duration) -> Result<ExecOutput> {
        let output_file = spec
            .args
            .iter()
            .find_map(|a| a.strip_prefix("-o"))
            .expect("no -o flag in command line");
        std::fs::write(work_dir.join(output_file), FIXTURE_SVG)?;
        Ok(ExecOutput::default())
    }
}

fn fake_tool_dir() -> tempfile::TempDir {
    let dir = tempfile::TempDir::new().unwrap();
    let name = &executable_names("dot", Platform::current())[0];
    std::fs::write(dir.path().join(name), b"").unwrap();
    dir
}

fn stub_cmdline_engine(tools: &tempfile::TempDir) -> CmdLineEngine {
    CmdLineEngine::new("dot")
        .with_search_path(tools.path())
        .with_executor(FixtureCopyExecutor)
}

#[test]
fn cmdline_standalone_svg_keeps_header() {
    let tools = fake_tool_dir();
    let selector = Selector::new();
    selector.use_engine(stub_cmdline_engine(&tools));

    let result = selector
        .render(&RenderRequest::new("graph g {a--b}", Format::SvgStandalone))
        .unwrap();
    assert!(
        result.text().starts_with(SVG_STANDALONE_HEADER),
        "{}",
        result.text()
    );
}

#[test]
fn cmdline_plain_svg_strips_header() {
    let tools = fake_tool_dir();
    let engine = stub_cmdline_engine(&tools);

    let result = engine
        .render(&RenderRequest::new("graph g {a--b}", Format::Svg))
        .unwrap();
    assert!(result.text().starts_with("<svg"), "{}", result.text());
}

#[test]
fn selector_falls_back_to_working_engine() {
    // A: command-line engine with no executable available; B: script stub.
    let empty = tempfile::TempDir::new().unwrap();
    let broken = CmdLineEngine::new("dot").with_search_path(empty.path());
    let working = ScriptEngine::new(LayoutLibrary::from_source(
        "function render(s, f, l) return '<svg>fallback</svg>' end",
    ))
    .unwrap();

    let selector = Selector::new();
    selector.use_engines(vec![Arc::new(broken), Arc::new(working)]);

    let result = selector
        .render(&RenderRequest::new("graph g {a--b}", Format::SvgStandalone))
        .unwrap();
    assert_eq!(result.text(), "<svg>fallback</svg>");
}

#[test]
fn released_selector_requires_rebinding() {
    let tools = fake_tool_dir();
    let selector = Selector::new();
    selector.use_engine(stub_cmdline_engine(&tools));
    selector
        .render(&RenderRequest::new("graph g {a--b}", Format::Svg))
        .unwrap();

    selector.release_engine();
    let err = selector
        .render(&RenderRequest::new("graph g {a--b}", Format::Svg))
        .unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
}

#[test]
fn pooled_script_engines_serve_concurrent_callers() {
    let library = "function render(s, f, l) return '<svg>' .. s .. '</svg>' end";
    let pool = PoolEngine::start(2, || {
        Ok(Box::new(ScriptEngine::new(LayoutLibrary::from_source(library))?) as Box<dyn Engine>)
    })
    .unwrap();
    let selector = Arc::new(Selector::new());
    selector.use_engine(pool);

    let mut handles = Vec::new();
    for i in 0..2 {
        let selector = Arc::clone(&selector);
        handles.push(thread::spawn(move || {
            let request =
                RenderRequest::new(format!("graph g {{number{i}--b}}"), Format::SvgStandalone);
            (i, selector.render(&request).unwrap().text())
        }));
    }

    let outputs: Vec<(usize, String)> = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .collect();
    for (i, text) in &outputs {
        assert!(text.contains(&format!("number{i}")), "{text}");
        let other = 1 - i;
        assert!(!text.contains(&format!("number{other}")), "{text}");
    }

    selector.release_engine();
}

#[test]
fn render_result_reaches_output_file() {
    let tools = fake_tool_dir();
    let out = tempfile::TempDir::new().unwrap();
    let out_path = out.path().join("g.svg");

    let engine = stub_cmdline_engine(&tools);
    let result: EngineResult = engine
        .render(
            &RenderRequest::new("graph g {a--b}", Format::SvgStandalone).with_output(&out_path),
        )
        .unwrap();

    let written = std::fs::read(&out_path).unwrap();
    assert_eq!(written, result.data);
    assert!(String::from_utf8(written).unwrap().starts_with(SVG_STANDALONE_HEADER));
}

#[test]
fn options_roundtrip_through_serde() {
    // The server transport serializes whole requests; make sure the data
    // model survives a JSON round trip.
    use dotrender_core::{CmdOptions, Layout, LayoutOption};

    let request = RenderRequest::new("graph g {a--b}", Format::SvgStandalone).with_options(
        EngineOptions::CommandLine(
            CmdOptions::new(
                Some(Layout::Fdp),
                vec![LayoutOption::Iterations(3), LayoutOption::Temperature(42.0)],
            )
            .unwrap(),
        ),
    );

    let encoded = serde_json::to_string(&request).unwrap();
    let decoded: RenderRequest = serde_json::from_str(&encoded).unwrap();
    assert_eq!(decoded, request);
}
