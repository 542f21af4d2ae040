//! Lexer, parser and AST for the Tendril pattern language.
//!
//! The interesting entry point is [parser::parse_source], which takes a
//! pattern source string and returns a validated [parser::pr::Pattern].
//! Matching the compiled pattern against values lives in the `tendril`
//! crate.

#![forbid(unsafe_code)]

pub mod error;
pub mod lexer;
pub mod parser;
pub mod span;

pub use error::{Error, Reason};
pub use parser::parse_source;
pub use span::Span;
