//! Variable expansion of `$NAME` references in a command line.

use crate::env::Environment;
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

/// Default upper bound, in bytes, for the result of expanding one line.
pub const EXPANSION_LIMIT: usize = 1024;

/// Number of leading name characters used for the variable lookup.
pub const MAX_NAME_LEN: usize = 63;

/// A `$` followed by a (possibly empty) run of name characters.
static REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$([A-Za-z0-9_]*)").expect("valid reference pattern"));

/// Errors raised while expanding a line.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExpandError {
    /// The expanded line would not fit in the output bound.
    #[error("expanded line exceeds {limit} bytes")]
    LimitExceeded { limit: usize },
}

/// Expands `$NAME` references in `line` using [`EXPANSION_LIMIT`] as the output bound.
///
/// See [`expand_with_limit`].
pub fn expand(line: &str, env: &Environment) -> Result<String, ExpandError> {
    expand_with_limit(line, env, EXPANSION_LIMIT)
}

/// Expands `$NAME` references in the trimmed `line`.
///
/// Every `$` followed by a maximal run of ASCII alphanumerics and `_` is replaced by the
/// value of that variable, or by nothing if it is unset. A `$` with no name after it
/// expands to nothing as well. All other text is copied verbatim.
///
/// Names longer than [`MAX_NAME_LEN`] are consumed entirely and looked up by their
/// leading [`MAX_NAME_LEN`] characters.
///
/// Returns [`ExpandError::LimitExceeded`] if the result would be longer than `limit` bytes.
pub fn expand_with_limit(
    line: &str,
    env: &Environment,
    limit: usize,
) -> Result<String, ExpandError> {
    let line = line.trim();
    let mut out = Output {
        buf: String::with_capacity(line.len().min(limit)),
        limit,
    };

    let mut last = 0;
    for caps in REFERENCE.captures_iter(line) {
        let Some(whole) = caps.get(0) else { continue };
        let name = caps.get(1).map_or("", |m| m.as_str());
        out.push(&line[last..whole.start()])?;
        // names are ASCII, so byte truncation stays on a char boundary
        let name = &name[..name.len().min(MAX_NAME_LEN)];
        if let Some(value) = env.get_var(name) {
            out.push(value)?;
        }
        last = whole.end();
    }
    out.push(&line[last..])?;

    Ok(out.buf)
}

struct Output {
    buf: String,
    limit: usize,
}

impl Output {
    fn push(&mut self, s: &str) -> Result<(), ExpandError> {
        if self.buf.len() + s.len() > self.limit {
            return Err(ExpandError::LimitExceeded { limit: self.limit });
        }
        self.buf.push_str(s);
        Ok(())
    }
}
