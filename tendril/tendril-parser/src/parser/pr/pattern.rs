use enum_as_inner::EnumAsInner;
use serde::{Deserialize, Serialize};

use crate::lexer::lr::Literal;
use crate::parser::pr::GuardExpr;
use crate::span::Span;

/// Pattern is a single node of the compiled pattern tree. Most variants can
/// contain other [Pattern]s themselves; plain values are [PatternKind::Lit].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    #[serde(flatten)]
    pub kind: PatternKind,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,

    /// Whether any binding (scalar, group, or bucket) lives in this subtree.
    /// Filled in by the validator; assertions over binding-free patterns can
    /// stop at their first solution.
    #[serde(skip)]
    pub has_bindings: bool,
}

impl Pattern {
    pub fn new<K: Into<PatternKind>>(kind: K) -> Self {
        Pattern {
            kind: kind.into(),
            span: None,
            has_bindings: false,
        }
    }
}

#[derive(
    Debug, EnumAsInner, PartialEq, Clone, Serialize, Deserialize, strum::AsRefStr,
)]
pub enum PatternKind {
    /// `_` — matches any node
    Any,
    /// `_string`, `_number`, `_boolean`
    TypedAny(ValueType),
    /// A plain value; compared with SameValueZero
    Lit(Literal),
    /// A regex or case-insensitive string matcher
    StringPat(StringPat),
    /// `!` — matches nothing
    Fail,

    Alt(AltPattern),
    /// `&`-joined patterns; every operand must match the same node
    Conj(Vec<Pattern>),
    /// Adjacent items; flattens into the surrounding array item stream
    Seq(Vec<Pattern>),
    Paren(Box<Pattern>),

    Quant(QuantPattern),
    /// `...` — non-consuming run of elements (or residual keys)
    Spread(Option<Quantifier>),

    Arr(ArrPattern),
    Obj(ObjPattern),

    /// `$name`, `$name=P` — scalar binding of the current node
    SBind(BindPattern),
    /// `@name=P`, `$name...` — binding of an array slice or key subset
    GroupBind(GroupBindPattern),

    /// `(? P)`, `(! P)` — zero-width assertion
    Look(LookPattern),
    /// `(P where expr)` — `_` in the guard is the matched node
    Guarded(GuardedPattern),
    /// `P -> %bucket` — emit the match into a bucket of a labeled scope
    Flow(FlowPattern),
}

impl PatternKind {
    pub fn into_pattern(self, span: Span) -> Pattern {
        Pattern {
            span: Some(span),
            kind: self,
            has_bindings: false,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum ValueType {
    String,
    Number,
    Boolean,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub enum StringPat {
    Regex { body: String, flags: String },
    /// Lowered literal; candidates are lowered with `str::to_lowercase`
    CaseInsensitive(String),
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct AltPattern {
    pub alts: Vec<Pattern>,
    /// Ordered choice: stop after the first alternative that yields.
    /// Unordered alternation enumerates every branch.
    pub prioritized: bool,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum QuantMode {
    Greedy,
    Lazy,
    Possessive,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub struct Quantifier {
    pub min: usize,
    /// `None` is unbounded
    pub max: Option<usize>,
    pub mode: QuantMode,
}

impl Quantifier {
    pub fn new(min: usize, max: Option<usize>, mode: QuantMode) -> Self {
        Quantifier { min, max, mode }
    }

    pub fn max_or(&self, unbounded: usize) -> usize {
        self.max.unwrap_or(unbounded)
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct QuantPattern {
    pub sub: Box<Pattern>,
    pub quant: Quantifier,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct ArrPattern {
    pub items: Vec<Pattern>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct ObjPattern {
    pub terms: Vec<Term>,
    /// The remainder slot: a bare spread, a remainder group binding, or
    /// nothing (the object is closed).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spread: Option<Box<Term>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct BindPattern {
    pub name: String,
    pub sub: Box<Pattern>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guard: Option<GuardExpr>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct GroupBindPattern {
    pub name: String,
    pub sub: Box<Pattern>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct LookPattern {
    pub sub: Box<Pattern>,
    pub negative: bool,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct GuardedPattern {
    pub sub: Box<Pattern>,
    pub guard: GuardExpr,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct FlowPattern {
    pub sub: Box<Pattern>,
    pub target: FlowTarget,
    /// The collecting form: nominated bound variables feed the bucket entry
    /// and are released after each contribution.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collect: Option<CollectSpec>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct FlowTarget {
    pub bucket: String,
    pub kind: BucketKind,
    /// Ancestor scope to aggregate into; the innermost labeled scope when
    /// absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum BucketKind {
    /// `@bucket` — ordered values, no collision
    Array,
    /// `%bucket` — keyed entries; same-key unequal values fail the branch
    Object,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct CollectSpec {
    /// Bucket key source for object buckets; the current iteration key when
    /// absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub value: String,
}

/// One constraint of an object pattern.
#[derive(Debug, EnumAsInner, PartialEq, Clone, Serialize, Deserialize)]
pub enum Term {
    KeyValue(ObjTerm),
    Group(ObjGroup),
    Look(ObjLook),
    GroupBind(ObjGroupBind),
    Spread(Option<Quantifier>),
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct ObjTerm {
    pub key: Pattern,
    /// `true` for `..k: v` — the key may sit at any depth below this object
    pub descend: bool,
    pub breadcrumbs: Vec<Breadcrumb>,
    pub value: Pattern,
    /// Explicit slice cardinality (`#{m,n}`); defaults to `{1,}`, or `{0,}`
    /// when optional.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quant: Option<Quantifier>,
    pub optional: bool,
    /// `each k: v` — no key matching `key` may carry a non-matching value
    pub strong: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct ObjGroup {
    pub terms: Vec<Term>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct ObjLook {
    pub terms: Vec<Term>,
    pub negative: bool,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct ObjGroupBind {
    pub name: String,
    pub source: ObjGroupSource,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub enum ObjGroupSource {
    /// `@rest...` — the keys covered by no other term
    Remainder,
    /// `@cfg=(k: v, …)` — the keys covered by the inner terms
    Terms(Vec<Term>),
}

/// One step of a vertical key path, walking from a matched key's value into
/// deeper structure before the value pattern applies.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub enum Breadcrumb {
    /// `.key` — object member
    Dot { key: Pattern },
    /// `[idx]` — array element
    Bracket { index: Pattern },
    /// `..key` — the key here or in any descendant container
    Skip { key: Pattern },
}

impl From<Literal> for PatternKind {
    fn from(value: Literal) -> Self {
        PatternKind::Lit(value)
    }
}
