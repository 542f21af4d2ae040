mod guard;
pub(crate) mod perror;
mod pattern;
pub mod pr;
#[cfg(test)]
mod test;
mod validator;

use chumsky::{prelude::*, Stream};

use crate::error::Error;
use crate::lexer::lr::{Token, TokenKind};
use crate::span::Span;
use perror::PError;

/// Build a pattern AST from a pattern source string.
pub fn parse_source(source: &str) -> Result<pr::Pattern, Vec<Error>> {
    let tokens = crate::lexer::lex_source(source)?;
    log::trace!("lexed: {tokens:?}");

    let stream = prepare_stream(tokens.0, source);
    let (pattern, parse_errors) =
        ::chumsky::Parser::parse_recovery(&pattern_root(), stream);

    let errors: Vec<Error> = parse_errors
        .into_iter()
        .map(perror::convert_parser_error)
        .collect();
    if !errors.is_empty() {
        log::debug!("parse errors: {errors:?}");
        return Err(errors);
    }

    let pattern = pattern.expect("no parse errors, but no pattern either");
    validator::validate(pattern)
}

fn pattern_root() -> impl Parser<TokenKind, pr::Pattern, Error = PError> {
    pattern::pattern().then_ignore(end())
}

fn prepare_stream(
    tokens: Vec<Token>,
    source: &str,
) -> Stream<TokenKind, Span, impl Iterator<Item = (TokenKind, Span)> + Sized> {
    let tokens = tokens.into_iter().map(|t| {
        (
            t.kind,
            Span {
                start: t.span.start,
                end: t.span.end,
            },
        )
    });
    let len = source.chars().count();
    let eoi = Span {
        start: len,
        end: len + 1,
    };
    Stream::from_iter(eoi, tokens)
}

pub(crate) fn ident_part() -> impl Parser<TokenKind, String, Error = PError> + Clone {
    select! { TokenKind::Ident(ident) => ident }.map_err(|e: PError| {
        PError::expected_input_found(
            e.span(),
            [Some(TokenKind::Ident("".to_string()))],
            e.found().cloned(),
        )
    })
}

pub(crate) fn keyword(kw: &'static str) -> impl Parser<TokenKind, (), Error = PError> + Clone {
    just(TokenKind::Keyword(kw.to_string())).ignored()
}

pub(crate) fn ctrl(char: char) -> impl Parser<TokenKind, (), Error = PError> + Clone {
    just(TokenKind::Control(char)).ignored()
}

/// Parse a sequence of container items. Adjacency separates items; commas
/// are accepted too, including a trailing one. Doesn't include the
/// surrounding delimiters.
pub(crate) fn items<P, O>(parser: P) -> impl Parser<TokenKind, Vec<O>, Error = PError> + Clone
where
    P: Parser<TokenKind, O, Error = PError> + Clone,
{
    parser
        .separated_by(ctrl(',').or_not().ignored())
        .allow_trailing()
}
