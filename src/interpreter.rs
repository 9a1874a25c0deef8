use crate::command::{CommandFactory, ExitCode};
use crate::env::Environment;
use crate::executor::{self, Outcome};
use crate::job::JobTable;
use crate::lexer;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::io::Write;
use std::path::PathBuf;

/// Prompt shown by [`Interpreter::repl`] unless configured otherwise.
pub const DEFAULT_PROMPT: &str = "xsh# ";

/// Factory allows creating instances of ExecutableCommand.
///
/// Only supports the built-in commands defined in this crate.
pub(crate) struct Factory<T> {
    _phantom: std::marker::PhantomData<T>,
}

impl<T> Default for Factory<T> {
    fn default() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

/// Settings of the interactive loop.
#[derive(Debug, Clone)]
pub struct Config {
    /// Text printed before each line is read.
    pub prompt: String,
    /// File the line history is loaded from and saved to.
    pub history: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prompt: DEFAULT_PROMPT.to_owned(),
            history: None,
        }
    }
}

/// A minimal shell that runs built-in commands in-process and everything else as
/// child processes.
///
/// A plain line whose first word names a built-in is handed to it verbatim. Lines with
/// `|`, `<`, `>` or a trailing `&`, and lines naming no built-in, go through
/// [`executor::dispatch`] (expansion, pipeline, redirection, spawn).
///
/// Example
/// ```no_run
/// use xsh::Interpreter;
/// let mut sh = Interpreter::default();
/// let code = sh.run_line("echo hello world").unwrap();
/// assert_eq!(code, 0);
/// ```
pub struct Interpreter {
    env: Environment,
    jobs: JobTable,
    commands: Vec<Box<dyn CommandFactory>>,
    config: Config,
}

impl Interpreter {
    /// Create a new interpreter with a custom set of built-in command factories.
    pub fn new(commands: Vec<Box<dyn CommandFactory>>) -> Self {
        Self {
            env: Environment::new(),
            jobs: JobTable::new(),
            commands,
            config: Config::default(),
        }
    }

    /// Replace the loop settings.
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Replace the environment.
    pub fn with_env(mut self, env: Environment) -> Self {
        self.env = env;
        self
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn jobs(&self) -> &JobTable {
        &self.jobs
    }

    /// Whether `exit` or `quit` has been run.
    pub fn should_exit(&self) -> bool {
        self.env.should_exit
    }

    /// Run one command line, writing shell messages to standard output.
    ///
    /// Returns the line's exit code, or an error describing why it could not run.
    pub fn run_line(&mut self, line: &str) -> anyhow::Result<ExitCode> {
        self.run_line_with_output(line, &mut std::io::stdout().lock())
    }

    /// Run one command line, writing built-in output and job notices to `out`.
    ///
    /// Programs started by the line still write to the inherited streams.
    pub fn run_line_with_output(&mut self, line: &str, out: &mut dyn Write) -> anyhow::Result<ExitCode> {
        if is_plain(line) {
            let words: Vec<&str> = line.split_whitespace().collect();
            if let Some((name, args)) = words.split_first() {
                for factory in &self.commands {
                    if let Some(cmd) = factory.try_create(name, args) {
                        return cmd.execute(out, &mut self.env);
                    }
                }
            }
        }

        match executor::dispatch(line, &self.env, &mut self.jobs)? {
            Outcome::Completed(code) => Ok(code),
            Outcome::Background { id, pid } => {
                writeln!(out, "[{id}] {pid}")?;
                Ok(0)
            }
        }
    }

    /// Report background jobs that have finished since the last call.
    pub fn notify_finished_jobs(&mut self, out: &mut dyn Write) -> std::io::Result<()> {
        for job in self.jobs.reap() {
            writeln!(out, "[{}] Done ({}) {}", job.id, job.status, job.command)?;
        }
        Ok(())
    }

    /// Interactive Read-Eval-Print Loop.
    ///
    /// Errors of a single line are printed and the loop continues; it ends on
    /// end-of-input or after `exit`/`quit`.
    pub fn repl(&mut self) -> rustyline::Result<()> {
        let mut rl = DefaultEditor::new()?;
        if let Some(path) = &self.config.history {
            if let Err(err) = rl.load_history(path) {
                tracing::debug!(path = %path.display(), %err, "no history loaded");
            }
        }

        while !self.env.should_exit {
            self.notify_finished_jobs(&mut std::io::stdout().lock())?;

            match rl.readline(&self.config.prompt) {
                Ok(line) => {
                    if !line.trim().is_empty() {
                        rl.add_history_entry(line.as_str())?;
                    }
                    if let Err(err) = self.run_line(&line) {
                        eprintln!("xsh: {err:#}");
                    }
                }
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => break,
                Err(err) => return Err(err),
            }
        }

        if let Some(path) = &self.config.history {
            if let Err(err) = rl.save_history(path) {
                tracing::warn!(path = %path.display(), %err, "failed to save history");
            }
        }
        Ok(())
    }
}

/// Whether a line has no pipe, redirection or background marker.
fn is_plain(line: &str) -> bool {
    !line.contains([lexer::PIPE, '<', '>']) && !lexer::strip_background(line).1
}

impl Default for Interpreter {
    /// Create an interpreter with the default set of built-ins:
    /// `cd`, `pwd`, `set`, `unset`, `exit`/`quit`.
    fn default() -> Self {
        use crate::builtin::*;
        Self::new(vec![
            Box::new(Factory::<Cd>::default()),
            Box::new(Factory::<Pwd>::default()),
            Box::new(Factory::<Set>::default()),
            Box::new(Factory::<Unset>::default()),
            Box::new(Factory::<Exit>::default()),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{DispatchError, StageError};
    use assert_matches::assert_matches;
    use std::fs;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    fn shell() -> (TempDir, Interpreter) {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut env = Environment::new();
        env.current_dir = dir.path().to_path_buf();
        (dir, Interpreter::default().with_env(env))
    }

    fn run(sh: &mut Interpreter, line: &str) -> (anyhow::Result<ExitCode>, String) {
        let mut out = Vec::new();
        let res = sh.run_line_with_output(line, &mut out);
        (res, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_builtins_are_routed_before_dispatch() {
        let (dir, mut sh) = shell();
        let (res, out) = run(&mut sh, "pwd");
        assert_eq!(res.unwrap(), 0);
        assert_eq!(out, format!("{}\n", dir.path().display()));
    }

    #[test]
    fn test_builtin_names_with_redirection_run_as_programs() {
        let (dir, mut sh) = shell();
        let (res, out) = run(&mut sh, "pwd > where.txt");
        assert_eq!(res.unwrap(), 0);
        assert!(out.is_empty());
        let written = fs::read_to_string(dir.path().join("where.txt")).unwrap();
        let canonical = fs::canonicalize(dir.path()).unwrap();
        assert_eq!(written.trim_end(), canonical.display().to_string());

        let (res, _) = run(&mut sh, "pwd | wc -l > count.txt");
        assert_eq!(res.unwrap(), 0);
        assert_eq!(fs::read_to_string(dir.path().join("count.txt")).unwrap().trim(), "1");
    }

    #[test]
    fn test_set_variable_is_expanded_and_exported() {
        let (dir, mut sh) = shell();
        run(&mut sh, "set GREETING hi").0.unwrap();
        let (res, _) = run(&mut sh, "echo $GREETING > out.txt");
        assert_eq!(res.unwrap(), 0);
        assert_eq!(fs::read_to_string(dir.path().join("out.txt")).unwrap(), "hi\n");

        run(&mut sh, "printenv GREETING > env.txt").0.unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("env.txt")).unwrap(), "hi\n");

        run(&mut sh, "unset GREETING").0.unwrap();
        let (res, _) = run(&mut sh, "echo x$GREETING > out.txt");
        assert_eq!(res.unwrap(), 0);
        assert_eq!(fs::read_to_string(dir.path().join("out.txt")).unwrap(), "x\n");
    }

    #[test]
    fn test_builtin_arguments_are_not_expanded() {
        let (_dir, mut sh) = shell();
        run(&mut sh, "set A 1").0.unwrap();
        run(&mut sh, "set B $A").0.unwrap();
        assert_eq!(sh.env().get_var("B"), Some("$A"));
    }

    #[test]
    fn test_exit_and_quit() {
        for line in ["exit", "  quit  "] {
            let (_dir, mut sh) = shell();
            assert!(!sh.should_exit());
            run(&mut sh, line).0.unwrap();
            assert!(sh.should_exit());
        }
    }

    #[test]
    fn test_errors_do_not_poison_the_interpreter() {
        let (dir, mut sh) = shell();
        let (res, _) = run(&mut sh, "cat < missing.txt");
        let err = res.unwrap_err();
        assert_matches!(
            err.downcast_ref::<DispatchError>(),
            Some(DispatchError::Stage(StageError::Redirect { .. }))
        );
        assert!(format!("{err:#}").starts_with("cannot open missing.txt: "));

        let (res, _) = run(&mut sh, "cat >");
        assert_eq!(
            format!("{:#}", res.unwrap_err()),
            "malformed command: missing file name after `>`"
        );

        let (res, _) = run(&mut sh, "echo ok > ok.txt");
        assert_eq!(res.unwrap(), 0);
        assert!(dir.path().join("ok.txt").exists());
    }

    #[test]
    fn test_background_job_is_announced_and_reaped() {
        let (_dir, mut sh) = shell();
        let (res, out) = run(&mut sh, "true &");
        assert_eq!(res.unwrap(), 0);
        assert!(out.starts_with("[1] "), "unexpected notice {out:?}");

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut notice = Vec::new();
        while notice.is_empty() && Instant::now() < deadline {
            sh.notify_finished_jobs(&mut notice).unwrap();
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(String::from_utf8(notice).unwrap(), "[1] Done (0) true\n");
        assert!(sh.jobs().is_empty());
    }
}
