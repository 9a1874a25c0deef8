//! A module implementing lexical analysis (tokenization) for command lines.
//!
//! Tokenization is purely delimiter based: there is no quoting or escaping, so a
//! delimiter character can never appear inside a token.

/// The character separating pipeline stages.
pub const PIPE: char = '|';

/// The trailing character that requests background execution.
pub const BACKGROUND: char = '&';

/// Trims `line` and removes one trailing background marker from it.
///
/// The marker may be preceded by whitespace, which is removed as well.
///
/// # Returns
/// The remaining command text and whether the marker was present. An empty (or
/// all-whitespace) line yields `("", false)`.
pub fn strip_background(line: &str) -> (&str, bool) {
    let line = line.trim();
    match line.strip_suffix(BACKGROUND) {
        Some(rest) => (rest.trim_end(), true),
        None => (line, false),
    }
}

/// Splits a line into pipeline stage segments on [`PIPE`].
///
/// Segments are returned as-is, without trimming. Empty segments are kept so that the
/// parser can reject them (e.g. `ls |` produces `["ls ", ""]`).
pub fn split_pipeline(line: &str) -> Vec<&str> {
    line.split(PIPE).collect()
}

/// Splits a stage into whitespace separated argument tokens.
///
/// Runs of whitespace count as a single separator and empty tokens are never produced.
///
/// # Arguments
/// * `stage` - One pipeline stage, as returned by [`split_pipeline`].
pub fn split_arguments(stage: &str) -> Vec<String> {
    stage.split_whitespace().map(str::to_owned).collect()
}
