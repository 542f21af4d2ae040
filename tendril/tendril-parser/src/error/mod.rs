use std::fmt::{self, Display, Formatter};

use crate::span::Span;

/// A compile-time pattern error: what went wrong, where in the source, and
/// any hints worth surfacing. Exposed as tendril::ErrorMessage once the
/// caret display is composed.
#[derive(Debug, Clone)]
pub struct Error {
    pub span: Option<Span>,
    pub reason: Reason,
    pub hints: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum Reason {
    Simple(String),
    /// The farthest point the parser reached, with everything that would
    /// have been acceptable there. The set stays structured so hosts can
    /// inspect it; [Display] turns it into prose.
    Expected {
        who: Option<String>,
        expected: Vec<String>,
        found: String,
    },
    /// An input region the lexer could make nothing of.
    Unexpected { found: String },
}

impl Error {
    pub fn new(reason: Reason) -> Self {
        Error {
            span: None,
            reason,
            hints: Vec::new(),
        }
    }

    pub fn new_simple<S: ToString>(reason: S) -> Self {
        Error::new(Reason::Simple(reason.to_string()))
    }

    pub fn with_span(mut self, span: Option<Span>) -> Self {
        self.span = span;
        self
    }

    pub fn push_hint<S: Into<String>>(mut self, hint: S) -> Self {
        self.hints.push(hint.into());
        self
    }
}

impl Display for Reason {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Reason::Simple(text) => f.write_str(text),
            Reason::Expected {
                who,
                expected,
                found,
            } => {
                if let Some(who) = who {
                    write!(f, "{who} ")?;
                }
                let expected = match expected.as_slice() {
                    [] => "something else".to_string(),
                    [one] => one.clone(),
                    [a, b] => format!("{a} or {b}"),
                    [rest @ .., last] => format!("one of {} or {last}", rest.join(", ")),
                };
                write!(f, "expected {expected}, but found {found}")
            }
            Reason::Unexpected { found } => write!(f, "unexpected {found}"),
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.reason.fmt(f)
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn expected_set_reads_naturally() {
        let reason = |expected: &[&str]| Reason::Expected {
            who: None,
            expected: expected.iter().map(|s| s.to_string()).collect(),
            found: "}".to_string(),
        };
        insta::assert_snapshot!(
            reason(&["("]).to_string(),
            @"expected (, but found }"
        );
        insta::assert_snapshot!(
            reason(&["(", "["]).to_string(),
            @"expected ( or [, but found }"
        );
        insta::assert_snapshot!(
            reason(&["(", "[", "a literal"]).to_string(),
            @"expected one of (, [ or a literal, but found }"
        );
    }

    #[test]
    fn display_is_the_reason() {
        let error = Error::new_simple("impossible count")
            .with_span(Some(Span { start: 2, end: 7 }))
            .push_hint("counts read `{min,max}`");
        assert_eq!(error.to_string(), "impossible count");
        assert_eq!(error.span, Some(Span { start: 2, end: 7 }));
        assert_eq!(error.hints.len(), 1);
    }
}
