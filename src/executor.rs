//! Process orchestration: turns a command line into running child processes.
//!
//! - [`dispatch`]: expand, parse and execute one line.
//! - [`execute`]: run an already parsed [`Pipeline`].
//!   - a single stage with `&` is spawned and handed to the [`JobTable`] without waiting
//!   - everything else runs in the foreground; adjacent stages are connected by an
//!     anonymous pipe and every spawned child is waited for before returning

use crate::command::ExitCode;
use crate::env::Environment;
use crate::expand::{self, ExpandError};
use crate::external;
use crate::job::JobTable;
use crate::parser::{self, ParsingError, Pipeline, RedirectKind, Stage};
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Stdio};
use thiserror::Error;

/// Permission bits of files created by `>`.
pub const OUTPUT_MODE: u32 = 0o644;

/// Failure to start one stage of a pipeline.
#[derive(Debug, Error)]
pub enum StageError {
    /// The file named by a redirection could not be opened.
    #[error("cannot open {}", path.display())]
    Redirect {
        kind: RedirectKind,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The program could not be located or executed.
    #[error("{program}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
}

/// Errors that abort the dispatch of one line.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The expanded line would exceed the expansion limit.
    #[error("variable expansion failed")]
    Expand(#[from] ExpandError),
    /// The line is not a well-formed pipeline; nothing was spawned.
    #[error("malformed command")]
    Parse(#[from] ParsingError),
    /// A stage could not be started. The other stages still ran.
    #[error(transparent)]
    Stage(#[from] StageError),
    /// The pipe between two stages could not be created; later stages were not spawned.
    #[error("cannot create pipe")]
    Pipe(#[source] io::Error),
    /// Waiting for a spawned child failed.
    #[error("cannot wait for child process")]
    Wait(#[source] io::Error),
}

impl DispatchError {
    /// Exit code a shell reports for this error.
    ///
    /// Programs that cannot be found give 127 and non-executable programs 126;
    /// malformed lines give 2 and everything else 1.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Stage(StageError::Spawn { source, .. }) => external::spawn_failure_code(source),
            Self::Parse(_) => 2,
            _ => 1,
        }
    }
}

/// What became of a dispatched line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The line ran in the foreground (or was blank) and finished with this code.
    Completed(ExitCode),
    /// The line was started as background job `id`.
    Background { id: usize, pid: u32 },
}

impl Outcome {
    /// Exit code of the line; 0 for a job that is still running.
    pub fn exit_code(self) -> ExitCode {
        match self {
            Outcome::Completed(code) => code,
            Outcome::Background { .. } => 0,
        }
    }
}

/// Expands, parses and executes one command line.
///
/// Errors are local to this line: nothing is retried and no state other than `jobs`
/// is changed. A blank line completes with 0 without spawning anything.
pub fn dispatch(
    line: &str,
    env: &Environment,
    jobs: &mut JobTable,
) -> Result<Outcome, DispatchError> {
    let expanded = expand::expand(line, env)?;
    match parser::parse_pipeline(&expanded)? {
        Some(pipeline) => execute(&pipeline, env, jobs),
        None => Ok(Outcome::Completed(0)),
    }
}

/// Executes a parsed pipeline.
///
/// Only a single-stage pipeline honors the background flag; multi-stage pipelines
/// always block until every stage has terminated.
pub fn execute(
    pipeline: &Pipeline,
    env: &Environment,
    jobs: &mut JobTable,
) -> Result<Outcome, DispatchError> {
    match pipeline.stages.as_slice() {
        [stage] if pipeline.background => {
            let child = spawn_stage(stage, env, None, None)?;
            let pid = child.id();
            let id = jobs.insert(child, stage.argv.join(" "));
            Ok(Outcome::Background { id, pid })
        }
        stages => {
            if pipeline.background {
                tracing::debug!("ignoring background flag of a multi-stage pipeline");
            }
            run_foreground(stages, env).map(Outcome::Completed)
        }
    }
}

/// Spawns every stage, connecting each one's output to the next one's input, then
/// waits for all of them.
///
/// A stage that cannot be started (its redirection cannot be opened or its program
/// cannot be executed) drops its pipe ends, so its neighbour still runs and sees
/// end-of-stream or a broken pipe. After every started child has been waited for,
/// the first such stage error is returned. Only a failure to create a pipe stops
/// later stages from being spawned.
fn run_foreground(stages: &[Stage], env: &Environment) -> Result<ExitCode, DispatchError> {
    let mut children: Vec<Child> = Vec::with_capacity(stages.len());
    let mut failure: Option<DispatchError> = None;
    let mut upstream: Option<io::PipeReader> = None;

    for (i, stage) in stages.iter().enumerate() {
        let (reader, writer) = if i + 1 < stages.len() {
            match io::pipe() {
                Ok((reader, writer)) => (Some(reader), Some(writer)),
                Err(err) => {
                    failure = Some(DispatchError::Pipe(err));
                    break;
                }
            }
        } else {
            (None, None)
        };

        let stdin = upstream.take().map(Stdio::from);
        let stdout = writer.map(Stdio::from);
        match spawn_stage(stage, env, stdin, stdout) {
            Ok(child) => children.push(child),
            Err(err) => {
                tracing::debug!(program = stage.program(), %err, "stage not started");
                if failure.is_none() {
                    failure = Some(err.into());
                }
            }
        }
        upstream = reader;
    }
    drop(upstream);

    let mut status = 0;
    for child in &mut children {
        match child.wait() {
            Ok(exit_status) => {
                status = external::exit_code(exit_status);
                tracing::debug!(pid = child.id(), status, "child terminated");
            }
            Err(err) => {
                tracing::warn!(pid = child.id(), %err, "wait failed");
                if failure.is_none() {
                    failure = Some(DispatchError::Wait(err));
                }
            }
        }
    }

    match failure {
        Some(err) => Err(err),
        None => Ok(status),
    }
}

/// Starts one stage.
///
/// Redirections take precedence over the `stdin`/`stdout` handed in by the caller
/// (pipe ends); streams that are neither redirected nor handed in are inherited.
/// The input file is opened before the output file, so a missing input never
/// creates the output.
fn spawn_stage(
    stage: &Stage,
    env: &Environment,
    stdin: Option<Stdio>,
    stdout: Option<Stdio>,
) -> Result<Child, StageError> {
    let input = match &stage.redirects.input {
        Some(path) => Some(open_redirect(RedirectKind::Input, path, env)?),
        None => None,
    };
    let output = match &stage.redirects.output {
        Some(path) => Some(open_redirect(RedirectKind::Output, path, env)?),
        None => None,
    };

    let spawn_error = |source| StageError::Spawn {
        program: stage.program().to_owned(),
        source,
    };
    let mut cmd = external::prepare_command(&stage.argv, env).map_err(spawn_error)?;
    if let Some(stdin) = input.map(Stdio::from).or(stdin) {
        cmd.stdin(stdin);
    }
    if let Some(stdout) = output.map(Stdio::from).or(stdout) {
        cmd.stdout(stdout);
    }

    // `cmd` holds the parent's copies of the descriptors and closes them when dropped
    // on return; in the child they are close-on-exec.
    let child = cmd.spawn().map_err(spawn_error)?;
    tracing::debug!(pid = child.id(), argv = ?stage.argv, "spawned");
    Ok(child)
}

fn open_redirect(kind: RedirectKind, path: &Path, env: &Environment) -> Result<File, StageError> {
    let full = env.current_dir.join(path);
    let result = match kind {
        RedirectKind::Input => File::open(&full),
        RedirectKind::Output => OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(OUTPUT_MODE)
            .open(&full),
    };
    result.map_err(|source| StageError::Redirect {
        kind,
        path: path.to_path_buf(),
        source,
    })
}
