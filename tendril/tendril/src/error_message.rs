use std::error::Error as StdError;
use std::fmt::{self, Debug, Display, Formatter};
use std::ops::Range;

use ariadne::{Cache, Config, Label, Report, ReportKind, Source};
use serde::Serialize;

use tendril_parser::error::Error;
use tendril_parser::span::Span;

#[derive(Clone, Serialize)]
pub struct ErrorMessage {
    /// Plain text of the error
    pub reason: String,
    /// A list of suggestions of how to fix the error
    pub hints: Vec<String>,
    /// Character offset of error origin within the pattern source
    pub span: Option<Span>,
    /// Annotated source, containing cause and hints.
    pub display: Option<String>,
    /// Line and column number of error origin within the pattern source
    pub location: Option<SourceLocation>,
}

/// Location within the source file.
/// Tuples contain:
/// - line number (0-based),
/// - column number within that line (0-based),
#[derive(Debug, Clone, Serialize)]
pub struct SourceLocation {
    pub start: (usize, usize),

    pub end: (usize, usize),
}

impl Display for ErrorMessage {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        // https://github.com/zesterer/ariadne/issues/52
        if let Some(display) = &self.display {
            let message_without_trailing_spaces = display
                .split('\n')
                .map(str::trim_end)
                .collect::<Vec<_>>()
                .join("\n");
            f.write_str(&message_without_trailing_spaces)?;
        } else {
            writeln!(f, "Error: {}", &self.reason)?;
            for hint in &self.hints {
                writeln!(f, "↳ Hint: {}", hint)?;
            }
        }
        Ok(())
    }
}

impl Debug for ErrorMessage {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self, f)
    }
}

impl From<Error> for ErrorMessage {
    fn from(e: Error) -> Self {
        log::debug!("{:#?}", e);
        ErrorMessage {
            reason: e.reason.to_string(),
            hints: e.hints,
            span: e.span,
            display: None,
            location: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorMessages {
    pub inner: Vec<ErrorMessage>,
}
impl StdError for ErrorMessages {}

impl From<ErrorMessage> for ErrorMessages {
    fn from(e: ErrorMessage) -> Self {
        ErrorMessages { inner: vec![e] }
    }
}

impl From<Error> for ErrorMessages {
    fn from(e: Error) -> Self {
        ErrorMessages {
            inner: vec![ErrorMessage::from(e)],
        }
    }
}

impl From<Vec<Error>> for ErrorMessages {
    fn from(errs: Vec<Error>) -> Self {
        ErrorMessages {
            inner: errs.into_iter().map(ErrorMessage::from).collect(),
        }
    }
}

impl Display for ErrorMessages {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for e in &self.inner {
            Display::fmt(&e, f)?;
        }
        Ok(())
    }
}

impl ErrorMessages {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap()
    }

    /// Computes message locations and builds the caret-annotated displays.
    pub fn composed(mut self, source: &str, color: bool) -> Self {
        for e in &mut self.inner {
            let cache = ("pattern", Source::from(source));

            e.location = e.compose_location(&cache.1);
            e.display = e.compose_display(cache, color);
        }
        self
    }
}

impl ErrorMessage {
    fn compose_display<'a, C>(&self, cache: C, color: bool) -> Option<String>
    where
        C: Cache<&'a str>,
    {
        let config = Config::default().with_color(color);

        let span = Range::from(self.span?);

        let mut report = Report::build(ReportKind::Error, "pattern", span.start)
            .with_config(config)
            .with_message("")
            .with_label(Label::new(("pattern", span)).with_message(&self.reason));

        if !self.hints.is_empty() {
            report.set_help(&self.hints[0]);
        }
        if self.hints.len() > 1 {
            report.set_note(&self.hints[1]);
        }

        let mut out = Vec::new();
        report.finish().write(cache, &mut out).ok()?;
        String::from_utf8(out).ok()
    }

    fn compose_location(&self, source: &Source) -> Option<SourceLocation> {
        let span = self.span?;

        let start = source.get_offset_line(span.start)?;
        let end = source.get_offset_line(span.end)?;
        Some(SourceLocation {
            start: (start.1, start.2),
            end: (end.1, end.2),
        })
    }
}

/// A failure while evaluating a pattern against a value, as opposed to the
/// parse-time [ErrorMessages].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    /// An unsupported or context-invalid construct was reached.
    Evaluate { msg: String },
    /// The step budget was exhausted before enumeration finished.
    Ambiguous { msg: String },
}

impl EvalError {
    pub(crate) fn evaluate<S: ToString>(msg: S) -> Self {
        EvalError::Evaluate {
            msg: msg.to_string(),
        }
    }

    pub(crate) fn ambiguous<S: ToString>(msg: S) -> Self {
        EvalError::Ambiguous {
            msg: msg.to_string(),
        }
    }
}

impl Display for EvalError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            EvalError::Evaluate { msg } => write!(f, "cannot evaluate pattern: {msg}"),
            EvalError::Ambiguous { msg } => write!(f, "pattern is too ambiguous: {msg}"),
        }
    }
}

impl StdError for EvalError {}
