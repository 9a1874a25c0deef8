use crate::lexer;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Maximum number of stages in one pipeline.
pub const MAX_STAGES: usize = 2;

/// Kind of redirection
///
/// Defines the specific operation mode for an I/O redirection (`<`, `>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectKind {
    /// Input redirection (`<`): Reads standard input from a specified file.
    Input,
    /// Output redirection (`>`): Writes standard output to a file, **overwriting** the file if it exists.
    Output,
}

impl RedirectKind {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "<" => Some(Self::Input),
            ">" => Some(Self::Output),
            _ => None,
        }
    }

    /// The operator token for this kind.
    pub fn operator(self) -> &'static str {
        match self {
            Self::Input => "<",
            Self::Output => ">",
        }
    }
}

impl fmt::Display for RedirectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.operator())
    }
}

/// Redirection targets resolved for one stage. At most one of each kind; a later
/// operator overrides an earlier one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Redirects {
    /// File to read standard input from.
    pub input: Option<PathBuf>,
    /// File to write standard output to (created or truncated).
    pub output: Option<PathBuf>,
}

/// One command invocation of a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    /// Program name followed by its arguments. Never empty and never contains
    /// redirection tokens.
    pub argv: Vec<String>,
    /// Files the stage's standard streams are connected to.
    pub redirects: Redirects,
}

impl Stage {
    /// Name of the program to run.
    pub fn program(&self) -> &str {
        self.argv.first().map_or("", String::as_str)
    }
}

/// A parsed command line: one or two stages plus the background flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    /// The stages in execution order.
    pub stages: Vec<Stage>,
    /// Whether the line ended with `&`.
    pub background: bool,
}

/// Errors that can occur while turning a line into a [`Pipeline`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParsingError {
    /// A redirection operator was the last token of its stage, or was followed by another operator.
    #[error("missing file name after `{0}`")]
    MissingRedirectTarget(RedirectKind),
    /// A stage had no program name (e.g. `| cmd`, `cmd |` or `> file`).
    #[error("empty command in pipeline")]
    EmptyStage,
    /// More stages than [`MAX_STAGES`].
    #[error("pipelines of {0} stages are not supported (at most {max})", max = MAX_STAGES)]
    TooManyStages(usize),
}

struct StageBuilder {
    tokens: Vec<String>,
    pos: usize,
}

impl StageBuilder {
    fn from(tokens: Vec<String>) -> Self {
        StageBuilder { tokens, pos: 0 }
    }

    fn build_stage(mut self) -> Result<Stage, ParsingError> {
        let mut argv = Vec::new();
        let mut redirects = Redirects::default();

        while let Some(token) = self.consume() {
            match RedirectKind::from_token(&token) {
                Some(kind) => {
                    let target = self.parse_redirect_target(kind)?;
                    match kind {
                        RedirectKind::Input => redirects.input = Some(target),
                        RedirectKind::Output => redirects.output = Some(target),
                    }
                }
                None => argv.push(token),
            }
        }

        if argv.is_empty() {
            return Err(ParsingError::EmptyStage);
        }
        Ok(Stage { argv, redirects })
    }

    fn peek(&self) -> Option<&str> {
        self.tokens.get(self.pos).map(String::as_str)
    }

    fn consume(&mut self) -> Option<String> {
        let token = self.tokens.get_mut(self.pos).map(std::mem::take);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    /// Parse the file name following a redirection operator.
    fn parse_redirect_target(&mut self, kind: RedirectKind) -> Result<PathBuf, ParsingError> {
        match self.peek() {
            Some(next) if RedirectKind::from_token(next).is_none() => {
                Ok(PathBuf::from(self.consume().unwrap_or_default()))
            }
            _ => Err(ParsingError::MissingRedirectTarget(kind)),
        }
    }
}

/// Resolves redirections in one stage's argument tokens.
///
/// `<` and `>` and the file name after each are removed from the argument list and
/// recorded in [`Stage::redirects`].
pub fn parse_stage(tokens: Vec<String>) -> Result<Stage, ParsingError> {
    StageBuilder::from(tokens).build_stage()
}

/// Parses an expanded command line into a [`Pipeline`].
///
/// The background marker is stripped first, then the line is split into stages and
/// each stage into arguments and redirections.
///
/// # Returns
///
/// * `Ok(None)` if the line contains no command at all.
/// * `Err(ParsingError)` for malformed lines: a redirection without a file name, an
///   empty stage, or too many stages.
pub fn parse_pipeline(line: &str) -> Result<Option<Pipeline>, ParsingError> {
    let (text, background) = lexer::strip_background(line);
    if text.is_empty() {
        return Ok(None);
    }

    let segments = lexer::split_pipeline(text);
    if segments.len() > MAX_STAGES {
        return Err(ParsingError::TooManyStages(segments.len()));
    }

    let stages = segments
        .into_iter()
        .map(|segment| parse_stage(lexer::split_arguments(segment)))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(Pipeline { stages, background }))
}
