use chumsky::error::SimpleReason;
use chumsky::prelude::*;

use crate::error::{Error, Reason};
use crate::lexer::lr::TokenKind;
use crate::span::Span;

pub type PError = Simple<TokenKind, Span>;

pub(crate) fn convert_parser_error(e: PError) -> Error {
    let mut span = e.span();

    if e.found().is_none() && span.start > 0 && span.end > 0 {
        // found end of file; pull the span back inside the source
        span.start -= 1;
        span.end -= 1;
    }

    if let SimpleReason::Custom(message) = e.reason() {
        return Error::new_simple(message).with_span(Some(span));
    }

    let found = e
        .found()
        .map(TokenKind::to_string)
        .unwrap_or_else(|| "end of input".to_string());

    let mut expected: Vec<String> = e
        .expected()
        .filter_map(|t| t.as_ref())
        .map(TokenKind::to_string)
        .collect();
    expected.sort();
    expected.dedup();

    // an empty or overlong set would read as noise
    if expected.is_empty() || expected.len() > 10 {
        let while_parsing = e
            .label()
            .map(|l| format!(" while parsing {l}"))
            .unwrap_or_default();
        return Error::new_simple(format!("unexpected {found}{while_parsing}"))
            .with_span(Some(span));
    }

    Error::new(Reason::Expected {
        who: e.label().map(|l| l.to_string()),
        expected,
        found,
    })
    .with_span(Some(span))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_messages_pass_through() {
        let e = PError::custom(Span { start: 3, end: 4 }, "a count must not be negative");
        let error = convert_parser_error(e);
        assert_eq!(error.to_string(), "a count must not be negative");
        assert_eq!(error.span, Some(Span { start: 3, end: 4 }));
    }

    #[test]
    fn expected_found_keeps_the_set() {
        let e = PError::expected_input_found(
            Span { start: 1, end: 2 },
            [
                Some(TokenKind::Control(']')),
                Some(TokenKind::Control(',')),
            ],
            Some(TokenKind::Control('}')),
        );
        let error = convert_parser_error(e);
        match &error.reason {
            Reason::Expected { expected, found, .. } => {
                assert_eq!(expected, &vec![",".to_string(), "]".to_string()]);
                assert_eq!(found, "}");
            }
            other => panic!("expected an expected-set: {other:?}"),
        }
        insta::assert_snapshot!(error.to_string(), @"expected , or ], but found }");
    }
}
