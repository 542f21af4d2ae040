pub mod lr;

use chumsky::{error::Cheap, prelude::*, text, text::newline};

use crate::error::{Error, Reason};
use lr::{Literal, Token, TokenKind, Tokens};

/// Lex a pattern source into tokens, or produce one error per unlexable
/// region.
pub fn lex_source(source: &str) -> Result<Tokens, Vec<Error>> {
    lexer().parse(source).map(Tokens).map_err(|e| {
        e.into_iter()
            .map(|e| convert_lexer_error(source, e))
            .collect()
    })
}

/// Lex chars to tokens until the end of the input
pub fn lexer() -> impl Parser<char, Vec<Token>, Error = Cheap<char>> {
    lex_token()
        .repeated()
        .then_ignore(ignored())
        .then_ignore(end())
}

/// Lex chars to a single token
fn lex_token() -> impl Parser<char, Token, Error = Cheap<char>> {
    let control_multi = choice((
        just("(?").to(TokenKind::LookPos),
        just("(!").to(TokenKind::LookNeg),
        just("...").to(TokenKind::Spread),
        just('…').to(TokenKind::Spread),
        just("->").to(TokenKind::ArrowThin),
        just("==").to(TokenKind::Eq),
        just("!=").to(TokenKind::Ne),
        just(">=").to(TokenKind::Gte),
        just("<=").to(TokenKind::Lte),
        just("&&").to(TokenKind::And),
        just("||").to(TokenKind::Or),
        just("*?").to(TokenKind::StarLazy),
        just("+?").to(TokenKind::PlusLazy),
        just("??").to(TokenKind::QuestionLazy),
        just("*+").to(TokenKind::StarPossessive),
        just("++").to(TokenKind::PlusPossessive),
        just("?+").to(TokenKind::QuestionPossessive),
        just("..").to(TokenKind::DotDot),
    ));

    let control = one_of("()[]{}:,.=@!&|*+?<>-#%").map(TokenKind::Control);

    let keyword = choice((just("each"), just("where")))
        .then_ignore(end_expr())
        .map(|x| x.to_string())
        .map(TokenKind::Keyword);

    let literal = literal().map(TokenKind::Literal);

    let var = just('$')
        .ignore_then(ident_part())
        .map(TokenKind::VarIdent);
    let group = just('@')
        .ignore_then(ident_part())
        .map(TokenKind::GroupIdent);
    let bucket = just('%')
        .ignore_then(ident_part())
        .map(TokenKind::BucketIdent);

    // A bareword with the case-insensitive sigil: `active/i`. The sigil must
    // not be followed by another identifier character (`max/int` is not a
    // sigil).
    let ci_bareword = ident_part()
        .then_ignore(just("/i"))
        .then_ignore(ident_char().not().rewind())
        .map(|s| TokenKind::Literal(Literal::CaseInsensitive(s.to_lowercase())));

    let ident = ident_part().map(TokenKind::Ident);

    let token = choice((
        control_multi,
        literal,
        var,
        group,
        bucket,
        keyword,
        ci_bareword,
        ident,
        control,
    ));

    ignored().ignore_then(
        token.map_with_span(|kind, span| Token { kind, span }),
    )
}

fn ignored() -> impl Parser<char, (), Error = Cheap<char>> {
    filter(|x: &char| x.is_whitespace()).repeated().ignored()
}

fn ident_char() -> impl Parser<char, char, Error = Cheap<char>> + Clone {
    filter(|c: &char| c.is_alphanumeric() || *c == '_')
}

pub fn ident_part() -> impl Parser<char, String, Error = Cheap<char>> + Clone {
    filter(|c: &char| c.is_alphabetic() || *c == '_')
        .chain(ident_char().repeated())
        .collect()
}

fn literal() -> impl Parser<char, Literal, Error = Cheap<char>> {
    let exp = one_of("eE").chain(one_of("+-").or_not().chain::<char, _, _>(text::digits(10)));

    let integer = filter(|c: &char| c.is_ascii_digit() && *c != '0')
        .chain::<_, Vec<char>, _>(filter(|c: &char| c.is_ascii_digit()).repeated())
        .or(just('0').map(|c| vec![c]));

    let frac = just('.')
        .chain::<char, _, _>(filter(|c: &char| c.is_ascii_digit()))
        .chain::<char, _, _>(filter(|c: &char| c.is_ascii_digit()).repeated());

    let number = integer
        .chain::<char, _, _>(frac.or_not().flatten())
        .chain::<char, _, _>(exp.or_not().flatten())
        .try_map(|chars, span| {
            let str = chars.into_iter().collect::<String>();

            if let Ok(i) = str.parse::<i64>() {
                Ok(Literal::Integer(i))
            } else if let Ok(f) = str.parse::<f64>() {
                if f.is_finite() {
                    Ok(Literal::Float(f))
                } else {
                    Err(Cheap::expected_input_found(span, None, None))
                }
            } else {
                Err(Cheap::expected_input_found(span, None, None))
            }
        })
        .labelled("number");

    // A quoted string, optionally carrying the case-insensitive sigil.
    let string = quoted_string()
        .then(just("/i").or_not())
        .map(|(s, ci)| match ci {
            Some(_) => Literal::CaseInsensitive(s.to_lowercase()),
            None => Literal::String(s),
        });

    let bool = (just("true").to(true))
        .or(just("false").to(false))
        .then_ignore(end_expr())
        .map(Literal::Boolean);

    let null = just("null").to(Literal::Null).then_ignore(end_expr());

    choice((number, string, regex(), bool, null))
}

/// A regex literal: `/body/flags`. Flag validity is checked by the
/// validator, which has a span and can produce a real message.
fn regex() -> impl Parser<char, Literal, Error = Cheap<char>> {
    let body_char = choice((
        // An escaped delimiter keeps only the delimiter; everything else
        // passes through for the regex engine to interpret.
        just('\\').ignore_then(just('/')).map(|c| vec![c]),
        just('\\')
            .chain(filter(|c: &char| *c != '\n'))
            .map(|cs: Vec<char>| cs),
        none_of("/\\\n").map(|c| vec![c]),
    ));

    just('/')
        .ignore_then(body_char.repeated().at_least(1).flatten())
        .then_ignore(just('/'))
        .then(filter(|c: &char| c.is_ascii_alphabetic()).repeated())
        .map(|(body, flags)| Literal::Regex {
            body: body.into_iter().collect(),
            flags: flags.into_iter().collect(),
        })
}

fn quoted_string() -> impl Parser<char, String, Error = Cheap<char>> {
    choice((
        quoted_string_of_quote(&'"'),
        quoted_string_of_quote(&'\''),
    ))
    .collect::<String>()
    .labelled("string")
}

fn quoted_string_of_quote(
    quote: &char,
) -> impl Parser<char, Vec<char>, Error = Cheap<char>> + '_ {
    let inner = choice((
        escaped_character(),
        // Or escape the quote char of the current string
        just('\\').ignore_then(just(*quote)),
        none_of([*quote, '\\']),
    ));

    inner
        .repeated()
        .delimited_by(just(*quote), just(*quote))
}

fn escaped_character() -> impl Parser<char, char, Error = Cheap<char>> {
    just('\\').ignore_then(choice((
        just('\\'),
        just('/'),
        just('b').to('\x08'),
        just('f').to('\x0C'),
        just('n').to('\n'),
        just('r').to('\r'),
        just('t').to('\t'),
        (just("u{").ignore_then(
            filter(|c: &char| c.is_ascii_hexdigit())
                .repeated()
                .at_least(1)
                .at_most(6)
                .collect::<String>()
                .validate(|digits, span, emit| {
                    char::from_u32(u32::from_str_radix(&digits, 16).unwrap()).unwrap_or_else(|| {
                        emit(Cheap::expected_input_found(span, None, None));
                        '\u{FFFD}' // Unicode replacement character
                    })
                })
                .then_ignore(just('}')),
        )),
        (just('u').ignore_then(
            filter(|c: &char| c.is_ascii_hexdigit())
                .repeated()
                .exactly(4)
                .collect::<String>()
                .validate(|digits, span, emit| {
                    char::from_u32(u32::from_str_radix(&digits, 16).unwrap()).unwrap_or_else(|| {
                        emit(Cheap::expected_input_found(span, None, None));
                        '\u{FFFD}'
                    })
                }),
        )),
    )))
}

fn end_expr() -> impl Parser<char, (), Error = Cheap<char>> {
    choice((
        end(),
        one_of(",)]}([{:>< \t=!&|#%@$?*+-./").ignored(),
        newline(),
    ))
    .rewind()
}

fn convert_lexer_error(source: &str, e: chumsky::error::Cheap<char>) -> Error {
    // We want to take the span based on the chars, not the bytes, so we
    // can't just index into the str.
    let found = source
        .chars()
        .skip(e.span().start)
        .take(e.span().end() - e.span().start)
        .collect();
    let span = Some(crate::span::Span {
        start: e.span().start,
        end: e.span().end,
    });

    Error::new(Reason::Unexpected { found }).with_span(span)
}
