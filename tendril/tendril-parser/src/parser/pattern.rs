use chumsky::prelude::*;
use itertools::Itertools;

use crate::lexer::lr::{Literal, TokenKind};
use crate::parser::guard::guard_expr;
use crate::parser::perror::PError;
use crate::parser::pr::*;
use crate::parser::{ctrl, ident_part, items, keyword};
use crate::span::Span;

/// The full pattern grammar. Precedence, tightest first: primaries and
/// delimited forms, postfix quantifiers, `->` flow, `&` conjunction, `|` /
/// `||` alternation. Adjacency only separates items inside containers and
/// parentheses.
pub(crate) fn pattern() -> impl Parser<TokenKind, Pattern, Error = PError> + Clone {
    recursive(|pattern| {
        let primary = recursive(|primary| {
            let literal = select! {
                TokenKind::Literal(Literal::Regex { body, flags }) =>
                    PatternKind::StringPat(StringPat::Regex { body, flags }),
                TokenKind::Literal(Literal::CaseInsensitive(s)) =>
                    PatternKind::StringPat(StringPat::CaseInsensitive(s)),
                TokenKind::Literal(lit) => PatternKind::Lit(lit),
            };

            let negative_number = ctrl('-').ignore_then(select! {
                TokenKind::Literal(Literal::Integer(i)) => PatternKind::Lit(Literal::Integer(-i)),
                TokenKind::Literal(Literal::Float(f)) => PatternKind::Lit(Literal::Float(-f)),
            });

            let bareword = ident_part().map(|name| match name.as_str() {
                "_" => PatternKind::Any,
                "_string" => PatternKind::TypedAny(ValueType::String),
                "_number" => PatternKind::TypedAny(ValueType::Number),
                "_boolean" => PatternKind::TypedAny(ValueType::Boolean),
                _ => PatternKind::Lit(Literal::String(name)),
            });

            let fail = ctrl('!').to(PatternKind::Fail);

            let spread = just(TokenKind::Spread)
                .ignore_then(count_quant().or_not())
                .map(PatternKind::Spread);

            let kinds = choice((literal, negative_number, spread, bareword, fail))
                .map_with_span(PatternKind::into_pattern);

            // `$x`, `$x=P`, `$x...`, each with an optional `where` guard
            let sbind = select! { TokenKind::VarIdent(name) => name }
                .then(choice((
                    just(TokenKind::Spread)
                        .ignore_then(count_quant().or_not())
                        .map(BindTail::Spread),
                    ctrl('=').ignore_then(primary.clone()).map(BindTail::Inner),
                    empty().to(BindTail::Bare),
                )))
                .then(keyword("where").ignore_then(guard_expr()).or_not())
                .try_map(|((name, tail), guard), span: Span| {
                    Ok(match tail {
                        BindTail::Spread(quant) => {
                            if guard.is_some() {
                                return Err(PError::custom(
                                    span,
                                    "a spread binding cannot carry a guard",
                                ));
                            }
                            PatternKind::GroupBind(GroupBindPattern {
                                name,
                                sub: Box::new(PatternKind::Spread(quant).into_pattern(span)),
                            })
                            .into_pattern(span)
                        }
                        BindTail::Inner(sub) => PatternKind::SBind(BindPattern {
                            name,
                            sub: Box::new(sub),
                            guard,
                        })
                        .into_pattern(span),
                        BindTail::Bare => PatternKind::SBind(BindPattern {
                            name,
                            sub: Box::new(PatternKind::Any.into_pattern(span)),
                            guard,
                        })
                        .into_pattern(span),
                    })
                });

            // `@xs=P`, `@xs...` — a contiguous-slice binding; the bound
            // pattern may be quantified (`@run=a*`)
            let quantified_primary = primary
                .clone()
                .then(quantifier().or_not())
                .map_with_span(|(sub, quant), span: Span| match quant {
                    Some(quant) => PatternKind::Quant(QuantPattern {
                        sub: Box::new(sub),
                        quant,
                    })
                    .into_pattern(span),
                    None => sub,
                });
            let group_bind = select! { TokenKind::GroupIdent(name) => name }
                .then(choice((
                    just(TokenKind::Spread)
                        .ignore_then(count_quant().or_not())
                        .map_with_span(|quant, span: Span| {
                            PatternKind::Spread(quant).into_pattern(span)
                        }),
                    ctrl('=').ignore_then(quantified_primary),
                )))
                .map_with_span(|(name, sub), span: Span| {
                    PatternKind::GroupBind(GroupBindPattern {
                        name,
                        sub: Box::new(sub),
                    })
                    .into_pattern(span)
                });

            let seq = seq(pattern.clone());

            // `(P)`, `(P1 P2)`, `(P where expr)`
            let paren = seq
                .clone()
                .then(keyword("where").ignore_then(guard_expr()).or_not())
                .delimited_by(ctrl('('), ctrl(')'))
                .map_with_span(|(sub, guard), span: Span| {
                    let paren = PatternKind::Paren(Box::new(sub)).into_pattern(span);
                    match guard {
                        Some(guard) => PatternKind::Guarded(GuardedPattern {
                            sub: Box::new(paren),
                            guard,
                        })
                        .into_pattern(span),
                        None => paren,
                    }
                });

            let look = choice((
                just(TokenKind::LookPos).to(false),
                just(TokenKind::LookNeg).to(true),
            ))
            .then(seq)
            .then_ignore(ctrl(')'))
            .map_with_span(|(negative, sub), span: Span| {
                PatternKind::Look(LookPattern {
                    sub: Box::new(sub),
                    negative,
                })
                .into_pattern(span)
            });

            let array = scope_label()
                .then(items(pattern.clone()).delimited_by(ctrl('['), ctrl(']')))
                .map_with_span(|(label, items), span: Span| {
                    PatternKind::Arr(ArrPattern { items, label }).into_pattern(span)
                })
                .labelled("array pattern");

            let object = obj_pattern(pattern.clone());

            choice((look, paren, array, object, sbind, group_bind, kinds)).boxed()
        });

        let quantified = primary
            .then(quantifier().or_not())
            .map_with_span(|(sub, quant), span: Span| match quant {
                Some(quant) => PatternKind::Quant(QuantPattern {
                    sub: Box::new(sub),
                    quant,
                })
                .into_pattern(span),
                None => sub,
            });

        let flowed = quantified
            .then(
                just(TokenKind::ArrowThin)
                    .ignore_then(flow_target())
                    .or_not(),
            )
            .map_with_span(|(sub, flow), span: Span| match flow {
                Some((target, collect)) => PatternKind::Flow(FlowPattern {
                    sub: Box::new(sub),
                    target,
                    collect,
                })
                .into_pattern(span),
                None => sub,
            })
            .boxed();

        let conj = flowed
            .clone()
            .then(ctrl('&').ignore_then(flowed).repeated())
            .map_with_span(|(first, rest), span: Span| {
                if rest.is_empty() {
                    first
                } else {
                    let mut alts = vec![first];
                    alts.extend(rest);
                    PatternKind::Conj(alts).into_pattern(span)
                }
            });

        let alt_op = choice((
            ctrl('|').to(false),
            just(TokenKind::Or).to(true),
        ));

        conj.clone()
            .then(alt_op.then(conj).repeated())
            .map_with_span(|(first, rest), span: Span| {
                let mut result = first;
                for (prioritized, right) in rest {
                    let left_span = result.span;
                    result = match result.kind {
                        PatternKind::Alt(mut alt) if alt.prioritized == prioritized => {
                            alt.alts.push(right);
                            PatternKind::Alt(alt)
                        }
                        other => PatternKind::Alt(AltPattern {
                            alts: vec![
                                Pattern {
                                    kind: other,
                                    span: left_span,
                                    has_bindings: false,
                                },
                                right,
                            ],
                            prioritized,
                        }),
                    }
                    .into_pattern(span);
                }
                result
            })
            .boxed()
    })
}

#[derive(Clone)]
enum BindTail {
    Spread(Option<Quantifier>),
    Inner(Pattern),
    Bare,
}

/// One or more adjacent patterns; a lone one stays bare, more become a
/// sequence that flattens into the surrounding item stream.
fn seq<'a>(
    pattern: impl Parser<TokenKind, Pattern, Error = PError> + Clone + 'a,
) -> impl Parser<TokenKind, Pattern, Error = PError> + Clone + 'a {
    items(pattern)
        .try_map(|ps: Vec<Pattern>, span: Span| {
            if ps.is_empty() {
                return Err(PError::custom(span, "expected a pattern"));
            }
            Ok(ps.into_iter().exactly_one().unwrap_or_else(|it| {
                PatternKind::Seq(it.collect()).into_pattern(span)
            }))
        })
        .boxed()
}

/// `name@` before `[` or `{` opens a labeled scope.
fn scope_label() -> impl Parser<TokenKind, Option<String>, Error = PError> + Clone {
    ident_part().then_ignore(ctrl('@')).or_not()
}

fn obj_pattern<'a>(
    pattern: impl Parser<TokenKind, Pattern, Error = PError> + Clone + 'a,
) -> impl Parser<TokenKind, Pattern, Error = PError> + Clone + 'a {
    scope_label()
        .then(obj_terms(pattern).delimited_by(ctrl('{'), ctrl('}')))
        .map_with_span(|(label, mut terms), span: Span| {
            // The final spread-ish term is the remainder slot; anything
            // spread-ish elsewhere is caught by the validator.
            let is_spread_slot = matches!(
                terms.last(),
                Some(Term::Spread(_))
                    | Some(Term::GroupBind(ObjGroupBind {
                        source: ObjGroupSource::Remainder,
                        ..
                    }))
            );
            let spread = if is_spread_slot {
                Some(Box::new(terms.pop().unwrap()))
            } else {
                None
            };
            PatternKind::Obj(ObjPattern {
                terms,
                spread,
                label,
            })
            .into_pattern(span)
        })
        .labelled("object pattern")
}

fn obj_terms<'a>(
    pattern: impl Parser<TokenKind, Pattern, Error = PError> + Clone + 'a,
) -> impl Parser<TokenKind, Vec<Term>, Error = PError> + Clone + 'a {
    recursive(|terms| {
        let spread_term = just(TokenKind::Spread)
            .ignore_then(count_quant().or_not())
            .map(Term::Spread);

        let group_bind = select! { TokenKind::GroupIdent(name) => name }
            .then(choice((
                just(TokenKind::Spread).to(ObjGroupSource::Remainder),
                ctrl('=')
                    .ignore_then(terms.clone().delimited_by(ctrl('('), ctrl(')')))
                    .map(ObjGroupSource::Terms),
            )))
            .map(|(name, source)| Term::GroupBind(ObjGroupBind { name, source }));

        let look = choice((
            just(TokenKind::LookPos).to(false),
            just(TokenKind::LookNeg).to(true),
        ))
        .then(terms.clone())
        .then_ignore(ctrl(')'))
        .map(|(negative, terms)| Term::Look(ObjLook { terms, negative }));

        let group = terms
            .delimited_by(ctrl('('), ctrl(')'))
            .map(|terms| Term::Group(ObjGroup { terms }));

        let kv = kv_term(pattern);

        items(choice((spread_term, group_bind, look, kv, group)))
    })
}

fn kv_term<'a>(
    pattern: impl Parser<TokenKind, Pattern, Error = PError> + Clone + 'a,
) -> impl Parser<TokenKind, Term, Error = PError> + Clone + 'a {
    let key = key_primary();

    let crumb = choice((
        ctrl('.')
            .ignore_then(key.clone())
            .map(|key| Breadcrumb::Dot { key }),
        just(TokenKind::DotDot)
            .ignore_then(key.clone())
            .map(|key| Breadcrumb::Skip { key }),
        pattern
            .clone()
            .delimited_by(ctrl('['), ctrl(']'))
            .map(|index| Breadcrumb::Bracket { index }),
    ));

    let lead = choice((
        just(TokenKind::DotDot)
            .ignore_then(key.clone())
            .map(|k| (true, k)),
        key.map(|k| (false, k)),
    ));

    keyword("each")
        .or_not()
        .map(|o| o.is_some())
        .then(lead)
        .then(crumb.repeated())
        .then_ignore(ctrl(':'))
        .then(pattern)
        .then(ctrl('#').ignore_then(count_quant()).or_not())
        .map_with_span(|((((strong, (descend, key)), breadcrumbs), value), quant), span: Span| {
            // A trailing greedy `?` on the value marks the term optional.
            let (value, optional) = match value.kind {
                PatternKind::Quant(QuantPattern { sub, quant: q })
                    if q.min == 0 && q.max == Some(1) && q.mode == QuantMode::Greedy =>
                {
                    (*sub, true)
                }
                _ => (value, false),
            };
            Term::KeyValue(ObjTerm {
                key,
                descend,
                breadcrumbs,
                value,
                quant,
                optional,
                strong,
                span: Some(span),
            })
        })
}

/// A key-position pattern: bareword, string, regex, `/i` literal, `_`, a
/// `$name` key binding, or a parenthesized `|`-alternation of those.
fn key_primary() -> impl Parser<TokenKind, Pattern, Error = PError> + Clone {
    let literal = select! {
        TokenKind::Literal(Literal::Regex { body, flags }) =>
            PatternKind::StringPat(StringPat::Regex { body, flags }),
        TokenKind::Literal(Literal::CaseInsensitive(s)) =>
            PatternKind::StringPat(StringPat::CaseInsensitive(s)),
        TokenKind::Literal(Literal::String(s)) => PatternKind::Lit(Literal::String(s)),
    };

    let bareword = ident_part().map(|name| match name.as_str() {
        "_" => PatternKind::Any,
        _ => PatternKind::Lit(Literal::String(name)),
    });

    let var = select! { TokenKind::VarIdent(name) => name }.map_with_span(|name, span: Span| {
        PatternKind::SBind(BindPattern {
            name,
            sub: Box::new(PatternKind::Any.into_pattern(span)),
            guard: None,
        })
    });

    let atom = choice((literal, var, bareword)).map_with_span(PatternKind::into_pattern);

    let alt = atom
        .clone()
        .separated_by(ctrl('|'))
        .at_least(2)
        .delimited_by(ctrl('('), ctrl(')'))
        .map_with_span(|alts, span: Span| {
            PatternKind::Alt(AltPattern {
                alts,
                prioritized: false,
            })
            .into_pattern(span)
        });

    atom.or(alt).boxed()
}

fn flow_target(
) -> impl Parser<TokenKind, (FlowTarget, Option<CollectSpec>), Error = PError> + Clone {
    let bucket = select! {
        TokenKind::GroupIdent(b) => (BucketKind::Array, b),
        TokenKind::BucketIdent(b) => (BucketKind::Object, b),
    };

    let collect = select! { TokenKind::VarIdent(v) => v }
        .then(
            ctrl(':')
                .ignore_then(select! { TokenKind::VarIdent(v) => v })
                .or_not(),
        )
        .delimited_by(ctrl('('), ctrl(')'))
        .map(|(first, second)| match second {
            Some(value) => CollectSpec {
                key: Some(first),
                value,
            },
            None => CollectSpec {
                key: None,
                value: first,
            },
        });

    ident_part()
        .then_ignore(ctrl(':'))
        .or_not()
        .then(bucket)
        .then(collect.or_not())
        .map(|((label, (kind, bucket)), collect)| {
            (
                FlowTarget {
                    bucket,
                    kind,
                    label,
                },
                collect,
            )
        })
        .labelled("flow target")
}

/// `{m}`, `{m,}` or `{m,n}` as a bare count; the mode stays greedy until a
/// postfix `?` or `+` adjusts it.
fn count_quant() -> impl Parser<TokenKind, Quantifier, Error = PError> + Clone {
    let int = select! { TokenKind::Literal(Literal::Integer(i)) => i }.try_map(
        |i, span: Span| {
            usize::try_from(i)
                .map_err(|_| PError::custom(span, "a count must not be negative"))
        },
    );

    int.then(ctrl(',').ignore_then(int.or_not()).or_not())
        .delimited_by(ctrl('{'), ctrl('}'))
        .map(|(min, rest)| match rest {
            None => Quantifier::new(min, Some(min), QuantMode::Greedy),
            Some(None) => Quantifier::new(min, None, QuantMode::Greedy),
            Some(Some(max)) => Quantifier::new(min, Some(max), QuantMode::Greedy),
        })
}

fn quantifier() -> impl Parser<TokenKind, Quantifier, Error = PError> + Clone {
    use QuantMode::*;

    choice((
        just(TokenKind::StarLazy).to(Quantifier::new(0, None, Lazy)),
        just(TokenKind::PlusLazy).to(Quantifier::new(1, None, Lazy)),
        just(TokenKind::QuestionLazy).to(Quantifier::new(0, Some(1), Lazy)),
        just(TokenKind::StarPossessive).to(Quantifier::new(0, None, Possessive)),
        just(TokenKind::PlusPossessive).to(Quantifier::new(1, None, Possessive)),
        just(TokenKind::QuestionPossessive).to(Quantifier::new(0, Some(1), Possessive)),
        ctrl('*').to(Quantifier::new(0, None, Greedy)),
        ctrl('+').to(Quantifier::new(1, None, Greedy)),
        ctrl('?').to(Quantifier::new(0, Some(1), Greedy)),
        count_quant()
            .then(
                choice((ctrl('?').to(Lazy), ctrl('+').to(Possessive))).or_not(),
            )
            .map(|(quant, mode)| match mode {
                Some(mode) => Quantifier { mode, ..quant },
                None => quant,
            }),
    ))
}
