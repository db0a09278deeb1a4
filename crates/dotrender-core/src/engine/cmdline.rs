//! External-process engine invoking a layout executable.
//!
//! Each render writes the DOT source into a fresh temp working directory,
//! builds a deterministic argument list, runs the tool through a
//! [`CommandExecutor`] with a bounded timeout, and reads the expected
//! output file back. Stub executors make the whole path testable without
//! a real layout tool installed.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::exec::{CommandExecutor, CommandSpec, SystemExecutor, find_executable};
use crate::request::{EngineResult, RenderRequest};

use super::{Engine, deliver};

/// Default deadline for one layout process.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Input filename inside the working directory.
const INPUT_FILE: &str = "graph.dot";
/// Output file basename; the extension comes from the target format.
const OUTPUT_STEM: &str = "outfile";

/// Engine rendering via subprocess invocation of a layout executable.
pub struct CmdLineEngine {
    /// Base executable name, e.g. `dot`.
    base_name: String,
    /// Directory probed instead of the system PATH, when set.
    search_path: Option<PathBuf>,
    executor: Arc<dyn CommandExecutor>,
    timeout: Duration,
    /// Persist the generated DOT source as `<dir>/<name>.dot`.
    persist_source: Option<(PathBuf, String)>,
}

impl Default for CmdLineEngine {
    fn default() -> Self {
        Self::new("dot")
    }
}

impl CmdLineEngine {
    pub fn new(base_name: impl Into<String>) -> Self {
        Self {
            base_name: base_name.into(),
            search_path: None,
            executor: Arc::new(SystemExecutor),
            timeout: DEFAULT_TIMEOUT,
            persist_source: None,
        }
    }

    /// Probe this directory for the executable instead of the PATH.
    #[must_use]
    pub fn with_search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.search_path = Some(path.into());
        self
    }

    /// Replace the command executor (used by tests to stub the tool).
    #[must_use]
    pub fn with_executor(mut self, executor: impl CommandExecutor + 'static) -> Self {
        self.executor = Arc::new(executor);
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Keep a copy of each generated DOT source at `<dir>/<name>.dot`.
    #[must_use]
    pub fn with_persisted_source(mut self, dir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        self.persist_source = Some((dir.into(), name.into()));
        self
    }

    /// Build the argument list for a request.
    ///
    /// Deterministic order: `-K<layout>`, `-T<format>`, option flags in
    /// declaration order, `-o<outfile>`, input file. Identical requests
    /// always produce identical argument vectors.
    fn build_args(&self, request: &RenderRequest, output_file: &str) -> Vec<String> {
        let mut args = Vec::new();
        let cmd_options = request.options.as_cmd();

        if let Some(layout) = cmd_options.and_then(|opts| opts.layout_algorithm()) {
            args.push(format!("-K{}", layout.flag_value()));
        }

        let format_value = match request.rasterizer {
            Some(ref rasterizer) => rasterizer.flag_value(),
            None => request.format.flag_value().to_string(),
        };
        args.push(format!("-T{format_value}"));

        if let Some(opts) = cmd_options {
            args.extend(opts.flag_tokens());
        }

        args.push(format!("-o{output_file}"));
        args.push(INPUT_FILE.to_string());
        args
    }

    fn persist_copy(&self, source: &str) -> Result<()> {
        if let Some((ref dir, ref name)) = self.persist_source {
            std::fs::create_dir_all(dir)?;
            std::fs::write(dir.join(format!("{name}.dot")), source)?;
        }
        Ok(())
    }

    fn read_output(&self, path: &Path, spec: &CommandSpec, stderr: &str) -> Result<Vec<u8>> {
        std::fs::read(path).map_err(|_| Error::Execution {
            message: format!(
                "layout process produced no output file{}",
                if stderr.is_empty() {
                    String::new()
                } else {
                    format!(": {stderr}")
                }
            ),
            context: Some(spec.display()),
        })
    }
}

impl Engine for CmdLineEngine {
    fn render(&self, request: &RenderRequest) -> Result<EngineResult> {
        let executable = find_executable(&self.base_name, self.search_path.as_deref())?;

        let work_dir = tempfile::TempDir::new()?;
        std::fs::write(work_dir.path().join(INPUT_FILE), &request.source)?;
        self.persist_copy(&request.source)?;

        let output_file = format!("{OUTPUT_STEM}.{}", request.format.file_extension());
        let spec = CommandSpec::new(executable, self.build_args(request, &output_file));

        let output = self
            .executor
            .execute(&spec, work_dir.path(), self.timeout)?;
        if !output.success() {
            return Err(Error::Execution {
                message: format!(
                    "layout process exited with status {}: {}",
                    output.status,
                    if output.stderr.is_empty() {
                        &output.stdout
                    } else {
                        &output.stderr
                    }
                ),
                context: Some(spec.display()),
            });
        }

        let raw = self.read_output(&work_dir.path().join(&output_file), &spec, &output.stderr)?;

        let result = if request.format.is_text() {
            let text = request
                .format
                .post_process(String::from_utf8_lossy(&raw).into_owned());
            EngineResult::from_text(request.format, text)
        } else {
            EngineResult::new(request.format, raw)
        };
        deliver(request, result)
    }

    fn name(&self) -> &str {
        "cmdline"
    }
}
