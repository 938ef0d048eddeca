//! Stage requests and their execution.
//!
//! A `StageRequest` is the plain description of one external invocation:
//! program, arguments and the artifacts it is expected to produce.  The
//! `StageRunner` consults the stage gate before handing a request to an
//! `Executor`.

use std::{
    fs::File,
    path::{Path, PathBuf},
    process::Stdio,
    sync::atomic::{AtomicUsize, Ordering},
};

use itertools::Itertools;
use rayon::prelude::*;

use crate::{
    err::StageError,
    pipeline::gate::{is_present, StageGate},
};

/// Number of stderr lines kept in error messages.
const STDERR_TAIL_LINES: usize = 20;

/// Command line arguments controlling stage execution.
#[derive(clap::Args, Debug, Clone, Default, serde::Serialize)]
pub struct RunArgs {
    /// Only print the commands that would run.
    #[arg(long)]
    pub dry_run: bool,
    /// Also require a matching completion marker before skipping a stage.
    #[arg(long)]
    pub verify_markers: bool,
}

/// One external invocation with its declared inputs and outputs.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct StageRequest {
    /// Unique, human-readable stage name.
    pub name: String,
    /// Program to run.
    pub program: String,
    /// Arguments to the program.
    pub args: Vec<String>,
    /// Working directory, if not the current one.
    pub working_dir: Option<PathBuf>,
    /// Files that must exist before the stage starts.
    pub inputs: Vec<PathBuf>,
    /// Files the stage is expected to produce.
    pub outputs: Vec<PathBuf>,
    /// Redirect standard output to this file.
    pub stdout: Option<PathBuf>,
}

impl StageRequest {
    pub fn new(name: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
            stdout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Append `path` as an argument.
    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy())
    }

    /// Append `--flag value` style option.
    pub fn opt(self, flag: &str, value: impl Into<String>) -> Self {
        self.arg(flag).arg(value)
    }

    /// Append `--flag path` style option.
    pub fn path_opt(self, flag: &str, path: &Path) -> Self {
        self.arg(flag).path_arg(path)
    }

    pub fn current_dir(mut self, dir: &Path) -> Self {
        self.working_dir = Some(dir.to_path_buf());
        self
    }

    pub fn input(mut self, path: impl Into<PathBuf>) -> Self {
        self.inputs.push(path.into());
        self
    }

    pub fn inputs<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.inputs.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn output(mut self, path: impl Into<PathBuf>) -> Self {
        self.outputs.push(path.into());
        self
    }

    pub fn outputs<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.outputs.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Redirect stdout to `path`, which also becomes an expected output.
    pub fn stdout_to(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        self.outputs.push(path.clone());
        self.stdout = Some(path);
        self
    }

    /// The command line for display purposes.
    pub fn command_line(&self) -> String {
        let quote = |s: &str| {
            if s.is_empty() || s.contains(|c: char| c.is_whitespace() || c == '\'' || c == '"') {
                format!("'{}'", s.replace('\'', "'\\''"))
            } else {
                s.to_owned()
            }
        };
        let mut line = std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(|s| s.as_str()))
            .map(quote)
            .join(" ");
        if let Some(stdout) = &self.stdout {
            line.push_str(&format!(" > {}", quote(&stdout.to_string_lossy())));
        }
        if let Some(dir) = &self.working_dir {
            line = format!("(cd {} && {})", quote(&dir.to_string_lossy()), line);
        }
        line
    }
}

/// Whether a stage was executed or skipped by the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Ran,
    Skipped,
}

/// Capability to execute a `StageRequest`.
pub trait Executor: Sync {
    /// Run the request to completion.
    fn execute(&self, request: &StageRequest) -> Result<(), StageError>;

    /// Whether executing actually produces the declared outputs.
    fn produces_outputs(&self) -> bool {
        true
    }
}

/// Executor spawning the external programs.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessExecutor;

impl Executor for ProcessExecutor {
    fn execute(&self, request: &StageRequest) -> Result<(), StageError> {
        let io_err = |source| StageError::Io {
            stage: request.name.clone(),
            source,
        };
        tracing::debug!("running {}", request.command_line());

        let mut cmd = std::process::Command::new(&request.program);
        cmd.args(&request.args).stderr(Stdio::piped());
        if let Some(dir) = &request.working_dir {
            cmd.current_dir(dir);
        }
        // Redirected stdout goes to a temporary file that only replaces the
        // real output after a successful exit.
        let partial = request.stdout.as_ref().map(|path| {
            let mut name = path.as_os_str().to_owned();
            name.push(".partial");
            PathBuf::from(name)
        });
        match &partial {
            Some(partial) => {
                cmd.stdout(File::create(partial).map_err(io_err)?);
            }
            None => {
                cmd.stdout(Stdio::piped());
            }
        }

        let before = std::time::Instant::now();
        let output = cmd.output().map_err(|source| StageError::Spawn {
            stage: request.name.clone(),
            program: request.program.clone(),
            source,
        })?;
        if !output.stdout.is_empty() {
            tracing::trace!("{} stdout:\n{}", request.name, String::from_utf8_lossy(&output.stdout));
        }

        if !output.status.success() {
            if let Some(partial) = &partial {
                let _ = std::fs::remove_file(partial);
            }
            let stderr = String::from_utf8_lossy(&output.stderr);
            let lines = stderr.lines().collect::<Vec<_>>();
            let tail = lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n");
            return Err(StageError::NonZeroExit {
                stage: request.name.clone(),
                program: request.program.clone(),
                code: output.status.code(),
                stderr: tail,
            });
        }
        if let (Some(partial), Some(stdout)) = (&partial, &request.stdout) {
            std::fs::rename(partial, stdout).map_err(io_err)?;
        }

        tracing::debug!("{} finished in {:?}", request.name, before.elapsed());
        Ok(())
    }
}

/// Executor that only prints the command lines.
#[derive(Debug)]
pub struct DryRunExecutor {
    term: console::Term,
}

impl Default for DryRunExecutor {
    fn default() -> Self {
        Self {
            term: console::Term::stdout(),
        }
    }
}

impl Executor for DryRunExecutor {
    fn execute(&self, request: &StageRequest) -> Result<(), StageError> {
        self.term
            .write_line(&format!("# {}\n{}", request.name, request.command_line()))
            .map_err(|source| StageError::Io {
                stage: request.name.clone(),
                source,
            })
    }

    fn produces_outputs(&self) -> bool {
        false
    }
}

/// Runs stage requests through the gate and an executor.
pub struct StageRunner<'a> {
    executor: &'a dyn Executor,
    gate: StageGate,
    invocations: AtomicUsize,
    skipped: AtomicUsize,
}

impl<'a> StageRunner<'a> {
    pub fn new(executor: &'a dyn Executor, gate: StageGate) -> Self {
        Self {
            executor,
            gate,
            invocations: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
        }
    }

    /// Whether the executor does not produce any files.
    pub fn is_dry_run(&self) -> bool {
        !self.executor.produces_outputs()
    }

    /// Number of requests handed to the executor so far.
    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    /// Number of requests skipped by the gate so far.
    pub fn skipped(&self) -> usize {
        self.skipped.load(Ordering::SeqCst)
    }

    /// Run `request` unless its outputs are already present.
    pub fn run(&self, request: &StageRequest) -> Result<StageStatus, StageError> {
        if !self.gate.must_run(&request.name, &request.outputs) {
            tracing::info!("skipping {}, outputs present", request.name);
            self.skipped.fetch_add(1, Ordering::SeqCst);
            return Ok(StageStatus::Skipped);
        }

        if !self.is_dry_run() {
            if let Some(missing) = request.inputs.iter().find(|p| !p.exists()) {
                return Err(StageError::MissingInput {
                    stage: request.name.clone(),
                    path: missing.clone(),
                });
            }
            for parent in request.outputs.iter().filter_map(|p| p.parent()) {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|source| StageError::Io {
                        stage: request.name.clone(),
                        source,
                    })?;
                }
            }
        }

        tracing::info!("running {}", request.name);
        self.invocations.fetch_add(1, Ordering::SeqCst);
        self.executor.execute(request)?;

        if self.is_dry_run() {
            return Ok(StageStatus::Ran);
        }
        for output in &request.outputs {
            if !output.exists() {
                return Err(StageError::MissingOutput {
                    stage: request.name.clone(),
                    path: output.clone(),
                });
            }
            if !is_present(output) {
                return Err(StageError::EmptyOutput {
                    stage: request.name.clone(),
                    path: output.clone(),
                });
            }
        }
        self.gate
            .complete(&request.name, &request.outputs)
            .map_err(|e| StageError::Io {
                stage: request.name.clone(),
                source: std::io::Error::other(e.to_string()),
            })?;
        Ok(StageStatus::Ran)
    }

    /// Run all `requests` in order, stopping at the first failure.
    pub fn run_all(&self, requests: &[StageRequest]) -> Result<(), StageError> {
        for request in requests {
            self.run(request)?;
        }
        Ok(())
    }

    /// Run independent `requests` on a pool of `workers` threads.
    ///
    /// Returns once all requests have finished; the first error is reported.
    pub fn run_parallel(
        &self,
        requests: &[StageRequest],
        workers: usize,
    ) -> Result<(), anyhow::Error> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .build()
            .map_err(|e| anyhow::anyhow!("building worker pool failed: {}", e))?;
        tracing::info!(
            "running {} stages on {} worker(s)",
            requests.len(),
            workers.max(1)
        );
        pool.install(|| {
            requests
                .par_iter()
                .map(|request| self.run(request))
                .collect::<Result<Vec<_>, _>>()
        })?;
        Ok(())
    }
}


#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::{testing::RecordingExecutor, *};

    fn runner<'a>(executor: &'a dyn Executor, dir: &Path) -> StageRunner<'a> {
        StageRunner::new(executor, StageGate::new(dir, false))
    }

    #[test]
    fn command_line_quotes() {
        let request = StageRequest::new("trim", "skewer")
            .opt("-q", "20")
            .path_arg(Path::new("/data/my reads.fastq"))
            .stdout_to("/data/out.txt");
        assert_eq!(
            request.command_line(),
            "skewer -q 20 '/data/my reads.fastq' > /data/out.txt"
        );
        assert_eq!(request.outputs, vec![PathBuf::from("/data/out.txt")]);
    }

    #[test]
    fn run_skips_present_outputs() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let executor = RecordingExecutor::default();
        let runner = runner(&executor, &tmp_dir);
        let request = StageRequest::new("touch", "touch").output(tmp_dir.join("a/out.txt"));

        assert_eq!(runner.run(&request)?, StageStatus::Ran);
        assert_eq!(runner.run(&request)?, StageStatus::Skipped);
        assert_eq!(runner.invocations(), 1);
        assert_eq!(runner.skipped(), 1);

        Ok(())
    }

    #[test]
    fn run_rejects_missing_input() {
        let tmp_dir = temp_testdir::TempDir::default();
        let executor = RecordingExecutor::default();
        let runner = runner(&executor, &tmp_dir);
        let request = StageRequest::new("align", "STAR")
            .input(tmp_dir.join("missing.fastq"))
            .output(tmp_dir.join("out.bam"));

        let err = runner.run(&request).unwrap_err();
        assert!(matches!(err, StageError::MissingInput { .. }));
        assert_eq!(runner.invocations(), 0);
    }

    #[test]
    fn run_rejects_empty_output() {
        let tmp_dir = temp_testdir::TempDir::default();
        let executor = RecordingExecutor::default().with_contents(".vcf", "");
        let runner = runner(&executor, &tmp_dir);
        let request = StageRequest::new("call", "gatk").output(tmp_dir.join("calls.vcf"));

        let err = runner.run(&request).unwrap_err();
        assert!(matches!(err, StageError::EmptyOutput { .. }));
        assert!(!tmp_dir.join(".markers").exists());

        // The empty leftover does not count as done.
        let err = runner.run(&request).unwrap_err();
        assert!(matches!(err, StageError::EmptyOutput { .. }));
        assert_eq!(runner.invocations(), 2);
        assert_eq!(runner.skipped(), 0);
    }

    #[test]
    fn run_all_stops_at_failure() {
        let tmp_dir = temp_testdir::TempDir::default();
        let executor = RecordingExecutor::default().failing_on("second");
        let runner = runner(&executor, &tmp_dir);
        let requests = ["first", "second", "third"]
            .iter()
            .map(|name| StageRequest::new(*name, "true").output(tmp_dir.join(name)))
            .collect::<Vec<_>>();

        let err = runner.run_all(&requests).unwrap_err();
        assert!(matches!(err, StageError::NonZeroExit { code: Some(1), .. }));
        assert_eq!(executor.names(), vec!["first", "second"]);
    }

    #[test]
    fn run_parallel_runs_everything() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let executor = RecordingExecutor::default();
        let runner = runner(&executor, &tmp_dir);
        let requests = (0..8)
            .map(|i| StageRequest::new(format!("shard-{i}"), "true").output(tmp_dir.join(format!("{i}.vcf"))))
            .collect::<Vec<_>>();

        runner.run_parallel(&requests, 3)?;

        let mut names = executor.names();
        names.sort();
        assert_eq!(names.len(), 8);
        assert_eq!(runner.invocations(), 8);
        Ok(())
    }

    #[test]
    fn process_executor_redirects_stdout() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let out = tmp_dir.join("echo.txt");
        let request = StageRequest::new("echo", "echo").arg("hello").stdout_to(&out);

        ProcessExecutor.execute(&request)?;

        assert_eq!(std::fs::read_to_string(&out)?, "hello\n");
        Ok(())
    }

    #[test]
    fn process_executor_reports_exit_code() {
        let request = StageRequest::new("fail", "sh").args(["-c", "echo oops >&2; exit 3"]);

        let err = ProcessExecutor.execute(&request).unwrap_err();
        match err {
            StageError::NonZeroExit { code, stderr, .. } => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "oops");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn dry_run_does_not_check_inputs() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let executor = DryRunExecutor::default();
        let runner = runner(&executor, &tmp_dir);
        let request = StageRequest::new("align", "STAR")
            .input(tmp_dir.join("missing.fastq"))
            .output(tmp_dir.join("out.bam"));

        assert_eq!(runner.run(&request)?, StageStatus::Ran);
        assert!(runner.is_dry_run());
        assert!(!tmp_dir.join("out.bam").exists());
        Ok(())
    }
}
