use enum_as_inner::EnumAsInner;
use serde::{Deserialize, Serialize};

use crate::lexer::lr::Literal;
use crate::span::Span;

/// A guard expression. Guards are pure and total: evaluation never raises,
/// and any runtime failure makes the guard false.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardExpr {
    #[serde(flatten)]
    pub kind: GuardExprKind,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
}

#[derive(Debug, EnumAsInner, PartialEq, Clone, Serialize, Deserialize)]
pub enum GuardExprKind {
    Literal(Literal),
    /// `$name` — a bound variable
    Var(String),
    /// `_` — the node the guarded pattern matched
    Current,
    Unary(UnaryGuard),
    Binary(BinaryGuard),
    /// `expr.name`; `.length` resolves to the element/key/char count
    Member(MemberGuard),
    /// `expr[expr]`
    Index(IndexGuard),
}

impl GuardExprKind {
    pub fn into_expr(self, span: Span) -> GuardExpr {
        GuardExpr {
            kind: self,
            span: Some(span),
        }
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct UnaryGuard {
    pub op: GuardUnOp,
    pub expr: Box<GuardExpr>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct BinaryGuard {
    pub left: Box<GuardExpr>,
    pub op: GuardBinOp,
    pub right: Box<GuardExpr>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct MemberGuard {
    pub base: Box<GuardExpr>,
    pub name: String,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct IndexGuard {
    pub base: Box<GuardExpr>,
    pub index: Box<GuardExpr>,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum GuardUnOp {
    Neg,
    Not,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum GuardBinOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    And,
    Or,
    Add,
    Sub,
    Mul,
    Mod,
}

impl GuardExpr {
    /// The set of bound-variable names the guard reads, in first-use order.
    /// A pending guard fires once every one of these is bound.
    pub fn free_vars(&self) -> Vec<String> {
        let mut vars = Vec::new();
        self.collect_free_vars(&mut vars);
        vars
    }

    fn collect_free_vars(&self, vars: &mut Vec<String>) {
        match &self.kind {
            GuardExprKind::Literal(_) | GuardExprKind::Current => {}
            GuardExprKind::Var(name) => {
                if !vars.contains(name) {
                    vars.push(name.clone());
                }
            }
            GuardExprKind::Unary(u) => u.expr.collect_free_vars(vars),
            GuardExprKind::Binary(b) => {
                b.left.collect_free_vars(vars);
                b.right.collect_free_vars(vars);
            }
            GuardExprKind::Member(m) => m.base.collect_free_vars(vars),
            GuardExprKind::Index(i) => {
                i.base.collect_free_vars(vars);
                i.index.collect_free_vars(vars);
            }
        }
    }
}
