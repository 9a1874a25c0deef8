use std::collections::HashMap;
use std::env as stdenv;
use std::path::PathBuf;

/// Mutable, user-level view of the process environment used by the interpreter.
///
/// The environment contains:
/// - `vars`: the variables visible to `$NAME` expansion and handed to every spawned program.
/// - `current_dir`: the working directory spawned programs start in.
/// - `should_exit`: a flag that the read loop checks to know when to terminate.
///
/// The host environment is captured once by [`Environment::new`]; afterwards only
/// `vars` is consulted, so tests can build an environment without touching the
/// real process state.
#[derive(Debug, Clone)]
pub struct Environment {
    /// Key-value store of environment variables (e.g., PATH, HOME).
    pub vars: HashMap<String, String>,
    /// The current working directory for command execution.
    pub current_dir: PathBuf,
    /// When set to true, indicates that an interactive loop should exit.
    pub should_exit: bool,
}

impl Environment {
    /// Capture the current process state into a new `Environment` instance.
    ///
    /// This copies variables from `std::env::vars_os()` (lossily, for non-UTF-8 entries)
    /// and initializes `current_dir` from `std::env::current_dir()`.
    pub fn new() -> Self {
        let vars = stdenv::vars_os()
            .map(|(k, v)| (k.to_string_lossy().into_owned(), v.to_string_lossy().into_owned()))
            .collect();
        let current_dir = stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            vars,
            current_dir,
            should_exit: false,
        }
    }

    /// Build an environment from an explicit set of variables.
    pub fn with_vars<I, K, V>(vars: I, current_dir: impl Into<PathBuf>) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            current_dir: current_dir.into(),
            should_exit: false,
        }
    }

    /// Get the value of a variable.
    pub fn get_var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Set or override a variable.
    pub fn set_var(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.vars.insert(key.into(), val.into());
    }

    /// Remove a variable. Does nothing if it is not set.
    pub fn unset_var(&mut self, key: &str) {
        self.vars.remove(key);
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether `name` can be used as a variable name: non-empty, ASCII alphanumerics and `_` only.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}
