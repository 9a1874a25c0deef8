//! A small line-oriented command interpreter.
//!
//! A command line goes through these steps:
//!
//! 1. [`expand`]: `$NAME` references are replaced from an explicit [`env::Environment`].
//! 2. [`lexer`]: a trailing `&` is stripped and the line is split on `|` and whitespace.
//! 3. [`parser`]: `<` and `>` are resolved into per-stage redirections.
//! 4. [`executor`]: one or two child processes are spawned, wired to files or a pipe,
//!    and waited for (unless backgrounded, in which case [`job`] reaps them later).
//!
//! The main entry point is [`Interpreter`], which also runs the built-ins `cd`, `pwd`,
//! `set`, `unset` and `exit`/`quit` and hosts the interactive loop. The core can be
//! driven without it through [`executor::dispatch`].

mod builtin;
pub mod command;
pub mod env;
pub mod executor;
pub mod expand;
pub mod external;
mod interpreter;
pub mod job;
pub mod lexer;
pub mod parser;

/// Just a convenient re-export of the interactive command runner.
///
/// See [`Interpreter`] for the high-level API.
pub use interpreter::{Config, DEFAULT_PROMPT, Interpreter};
