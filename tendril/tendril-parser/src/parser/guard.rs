use chumsky::prelude::*;

use crate::lexer::lr::{Literal, TokenKind};
use crate::parser::perror::PError;
use crate::parser::pr::*;
use crate::parser::{ctrl, ident_part};
use crate::span::Span;

/// The boolean expression sub-language attached with `where`.
///
/// Precedence, loosest first: `||`, `&&`, comparisons, `+ -`, `* %`, unary,
/// postfix member/index access.
pub(crate) fn guard_expr() -> impl Parser<TokenKind, GuardExpr, Error = PError> + Clone {
    recursive(|expr| {
        let literal = select! { TokenKind::Literal(lit) => GuardExprKind::Literal(lit) };

        let var = select! { TokenKind::VarIdent(name) => GuardExprKind::Var(name) };

        // `_` is the matched node; any other bareword reads as a string
        // literal, same as in pattern position.
        let ident = ident_part().map(|name| match name.as_str() {
            "_" => GuardExprKind::Current,
            _ => GuardExprKind::Literal(Literal::String(name)),
        });

        let term = choice((literal, var, ident))
            .map_with_span(GuardExprKind::into_expr)
            .or(expr.clone().delimited_by(ctrl('('), ctrl(')')))
            .boxed();

        let term = term
            .then(
                choice((
                    ctrl('.').ignore_then(ident_part()).map(Postfix::Member),
                    expr.delimited_by(ctrl('['), ctrl(']')).map(Postfix::Index),
                ))
                .map_with_span(|postfix, span: Span| (postfix, span))
                .repeated(),
            )
            .foldl(|base, (postfix, span)| {
                let span = Span::merge_opt(base.span, Some(span));
                let kind = match postfix {
                    Postfix::Member(name) => GuardExprKind::Member(MemberGuard {
                        base: Box::new(base),
                        name,
                    }),
                    Postfix::Index(index) => GuardExprKind::Index(IndexGuard {
                        base: Box::new(base),
                        index: Box::new(index),
                    }),
                };
                GuardExpr { kind, span }
            })
            .boxed();

        let unary = operator_unary()
            .map_with_span(|op, span: Span| (op, span))
            .or_not()
            .then(term)
            .map(|(op, expr)| match op {
                None => expr,
                Some((op, op_span)) => {
                    let span = Span::merge_opt(Some(op_span), expr.span);
                    GuardExpr {
                        kind: GuardExprKind::Unary(UnaryGuard {
                            op,
                            expr: Box::new(expr),
                        }),
                        span,
                    }
                }
            })
            .boxed();

        let expr = binary_op_parser(unary, operator_mul());
        let expr = binary_op_parser(expr, operator_add());
        let expr = binary_op_parser(expr, operator_compare());
        let expr = binary_op_parser(expr, operator_and());
        binary_op_parser(expr, operator_or())
    })
}

#[derive(Clone)]
enum Postfix {
    Member(String),
    Index(GuardExpr),
}

fn binary_op_parser<'a, Term, Op>(
    term: Term,
    op: Op,
) -> impl Parser<TokenKind, GuardExpr, Error = PError> + Clone + 'a
where
    Term: Parser<TokenKind, GuardExpr, Error = PError> + Clone + 'a,
    Op: Parser<TokenKind, GuardBinOp, Error = PError> + Clone + 'a,
{
    term.clone()
        .then(op.then(term).repeated())
        .foldl(|left, (op, right)| {
            let span = Span::merge_opt(left.span, right.span);
            GuardExpr {
                kind: GuardExprKind::Binary(BinaryGuard {
                    left: Box::new(left),
                    op,
                    right: Box::new(right),
                }),
                span,
            }
        })
        .boxed()
}

fn operator_unary() -> impl Parser<TokenKind, GuardUnOp, Error = PError> + Clone {
    (ctrl('-').to(GuardUnOp::Neg)).or(ctrl('!').to(GuardUnOp::Not))
}
fn operator_mul() -> impl Parser<TokenKind, GuardBinOp, Error = PError> + Clone {
    (ctrl('*').to(GuardBinOp::Mul)).or(ctrl('%').to(GuardBinOp::Mod))
}
fn operator_add() -> impl Parser<TokenKind, GuardBinOp, Error = PError> + Clone {
    (ctrl('+').to(GuardBinOp::Add)).or(ctrl('-').to(GuardBinOp::Sub))
}
fn operator_compare() -> impl Parser<TokenKind, GuardBinOp, Error = PError> + Clone {
    choice((
        just(TokenKind::Eq).to(GuardBinOp::Eq),
        just(TokenKind::Ne).to(GuardBinOp::Ne),
        just(TokenKind::Lte).to(GuardBinOp::Lte),
        just(TokenKind::Gte).to(GuardBinOp::Gte),
        ctrl('<').to(GuardBinOp::Lt),
        ctrl('>').to(GuardBinOp::Gt),
    ))
}
fn operator_and() -> impl Parser<TokenKind, GuardBinOp, Error = PError> + Clone {
    just(TokenKind::And).to(GuardBinOp::And)
}
fn operator_or() -> impl Parser<TokenKind, GuardBinOp, Error = PError> + Clone {
    just(TokenKind::Or).to(GuardBinOp::Or)
}
