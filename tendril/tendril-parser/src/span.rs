use std::fmt::{self, Debug, Formatter};
use std::ops::Range;

use serde::{Deserialize, Serialize};

/// A half-open character range into the pattern source. Patterns compile
/// from standalone strings, so there is no notion of a source file here;
/// a span is just where in the one-line source a node came from.
#[derive(Clone, PartialEq, Eq, Copy)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    /// The tightest span covering both sides, for nodes assembled from two
    /// parses (binary guard operators, alternation folds).
    pub fn merge_opt(a: Option<Span>, b: Option<Span>) -> Option<Span> {
        match (a, b) {
            (Some(a), Some(b)) => Some(Span {
                start: usize::min(a.start, b.start),
                end: usize::max(a.end, b.end),
            }),
            (a, b) => a.or(b),
        }
    }
}

impl From<Span> for Range<usize> {
    fn from(a: Span) -> Self {
        a.start..a.end
    }
}

impl Debug for Span {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

impl Serialize for Span {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&format!("{self:?}"))
    }
}

impl<'de> Deserialize<'de> for Span {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error;

        let str = String::deserialize(deserializer)?;
        let Some((start, end)) = str.split_once('-') else {
            return Err(D::Error::custom("expected a span of form `x-y`"));
        };
        Ok(Span {
            start: start.parse().map_err(D::Error::custom)?,
            end: end.parse().map_err(D::Error::custom)?,
        })
    }
}

impl chumsky::Span for Span {
    type Context = ();

    type Offset = usize;

    fn new(_context: (), range: std::ops::Range<usize>) -> Self {
        Self {
            start: range.start,
            end: range.end,
        }
    }

    fn context(&self) -> Self::Context {}

    fn start(&self) -> usize {
        self.start
    }

    fn end(&self) -> usize {
        self.end
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_span_serde() {
        let span = Span { start: 12, end: 15 };
        let span_serialized = serde_json::to_string(&span).unwrap();
        insta::assert_snapshot!(span_serialized, @r###""12-15""###);
        let span_deserialized: Span = serde_json::from_str(&span_serialized).unwrap();
        assert_eq!(span_deserialized, span);

        assert!(serde_json::from_str::<Span>("\"12:15\"").is_err());
    }

    #[test]
    fn test_merge_opt() {
        let a = Span { start: 2, end: 5 };
        let b = Span { start: 4, end: 9 };
        assert_eq!(Span::merge_opt(Some(a), Some(b)), Some(Span { start: 2, end: 9 }));
        assert_eq!(Span::merge_opt(None, Some(b)), Some(b));
        assert_eq!(Span::merge_opt(Some(a), None), Some(a));
        assert_eq!(Span::merge_opt(None, None), None);
    }
}
