use serde::{Deserialize, Serialize};

#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    pub span: std::ops::Range<usize>,
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub enum TokenKind {
    Ident(String),
    Keyword(String),
    Literal(Literal),

    /// `$name` — scalar binding or variable reference
    VarIdent(String),
    /// `@name` — group binding or array bucket
    GroupIdent(String),
    /// `%name` — object bucket
    BucketIdent(String),

    /// single-char control tokens
    Control(char),

    LookPos,  // (?
    LookNeg,  // (!
    Spread,   // ... or …
    ArrowThin, // ->
    Eq,       // ==
    Ne,       // !=
    Gte,      // >=
    Lte,      // <=
    And,      // &&
    Or,       // ||
    DotDot,   // ..

    StarLazy,           // *?
    PlusLazy,           // +?
    QuestionLazy,       // ??
    StarPossessive,     // *+
    PlusPossessive,     // ++
    QuestionPossessive, // ?+
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, strum::AsRefStr)]
pub enum Literal {
    Null,
    Integer(i64),
    Float(f64),
    Boolean(bool),
    String(String),
    /// Stored lowered (`str::to_lowercase`); matching lowers the candidate
    /// the same way, so the comparison is a simple-lowercase fold.
    CaseInsensitive(String),
    Regex {
        body: String,
        flags: String,
    },
}

// This is here because Literal::Float(f64) does not implement Hash, so we cannot simply derive it.
// There are reasons for that, but chumsky::Error needs Hash for the TokenKind, so it can deduplicate
// tokens in error.
// So this hack could lead to duplicated tokens in error messages. Oh no.
#[allow(clippy::derived_hash_with_manual_eq)]
impl std::hash::Hash for TokenKind {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        core::mem::discriminant(self).hash(state);
    }
}

impl std::cmp::Eq for TokenKind {}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenKind::Ident(s) => {
                if s.is_empty() {
                    // FYI this shows up in errors
                    write!(f, "an identifier")
                } else {
                    write!(f, "`{s}`")
                }
            }
            TokenKind::Keyword(s) => write!(f, "keyword {s}"),
            TokenKind::Literal(lit) => write!(f, "{lit}"),
            TokenKind::VarIdent(id) => write!(f, "${id}"),
            TokenKind::GroupIdent(id) => write!(f, "@{id}"),
            TokenKind::BucketIdent(id) => write!(f, "%{id}"),
            TokenKind::Control(c) => write!(f, "{c}"),

            TokenKind::LookPos => f.write_str("(?"),
            TokenKind::LookNeg => f.write_str("(!"),
            TokenKind::Spread => f.write_str("..."),
            TokenKind::ArrowThin => f.write_str("->"),
            TokenKind::Eq => f.write_str("=="),
            TokenKind::Ne => f.write_str("!="),
            TokenKind::Gte => f.write_str(">="),
            TokenKind::Lte => f.write_str("<="),
            TokenKind::And => f.write_str("&&"),
            TokenKind::Or => f.write_str("||"),
            TokenKind::DotDot => f.write_str(".."),

            TokenKind::StarLazy => f.write_str("*?"),
            TokenKind::PlusLazy => f.write_str("+?"),
            TokenKind::QuestionLazy => f.write_str("??"),
            TokenKind::StarPossessive => f.write_str("*+"),
            TokenKind::PlusPossessive => f.write_str("++"),
            TokenKind::QuestionPossessive => f.write_str("?+"),
        }
    }
}

impl std::fmt::Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Literal::Null => write!(f, "null"),
            Literal::Integer(i) => write!(f, "{i}"),
            Literal::Float(n) => write!(f, "{n}"),
            Literal::Boolean(b) => write!(f, "{b}"),
            Literal::String(s) => write!(f, "\"{s}\""),
            Literal::CaseInsensitive(s) => write!(f, "\"{s}\"/i"),
            Literal::Regex { body, flags } => write!(f, "/{body}/{flags}"),
        }
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}..{}: {:?}", self.span.start, self.span.end, self.kind)
    }
}
