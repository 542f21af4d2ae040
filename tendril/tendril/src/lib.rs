//! # tendril
//!
//! Tendril is a pattern-matching and structural-transformation language
//! for JSON-like values. A pattern compiles to an AST; matched against a
//! value it yields **solutions** — variable bindings plus the sites they
//! were found at — and recorded sites drive compare-and-swap edits.
//!
//! You probably want to start with the [Tendril] wrapper:
//!
//! ```
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use serde_json::json;
//! use tendril::Tendril;
//!
//! let pattern = Tendril::new("{name: $n, age: $a where $a >= 18}")?;
//! let input = json!({"name": "Ada", "age": 21});
//!
//! let solutions = pattern.match_all(&input)?;
//! assert_eq!(solutions.len(), 1);
//! assert_eq!(solutions[0].value_of("n"), Some(json!("Ada")));
//! # Ok(())
//! # }
//! ```
//!
//! For more granular access, refer to this diagram:
//! ```ascii
//!            pattern source
//!
//!    (parse) │
//!    compile │   memoized in a bounded LRU
//!            ▼
//!        CompiledPattern
//!            │
//!            │ match_all / scan_all (+ _first / _exists)
//!            ▼
//!        [Solution]          bindings + sites
//!            │
//!            │ collect_edits / apply_edits
//!            ▼
//!        new value           CAS-checked rewrites
//! ```

#![forbid(unsafe_code)]

use std::rc::Rc;
use std::str::FromStr;
use std::sync::Arc;

use serde_json::Value;

pub use tendril_parser::error::{Error, Reason};
pub use tendril_parser::lexer::lr;
pub use tendril_parser::parser::pr;
pub use tendril_parser::span::Span;

mod cache;
mod edit;
pub mod engine;
mod error_message;
mod regex_cache;
pub mod value;

pub use edit::{
    apply_edits, apply_edits_in_place, collect_edits, ApplyOutcome, CasDecision, CollectOutcome,
    Conflict, Edit, EditFailure, EditOptions, EditPlan, Per,
};
pub use engine::solution::{Binding, Site, Solution};
pub use error_message::{ErrorMessage, ErrorMessages, EvalError, SourceLocation};
pub use value::{PathSeg, Path};

/// A parsed and validated pattern, reusable across any number of inputs.
/// Immutable, and freely shareable across threads.
#[derive(Debug)]
pub struct CompiledPattern {
    source: String,
    root: pr::Pattern,
}

impl CompiledPattern {
    pub(crate) fn parse_uncached(source: &str) -> Result<Self, ErrorMessages> {
        let root = tendril_parser::parse_source(source)
            .map_err(|errors| ErrorMessages::from(errors).composed(source, false))?;
        Ok(CompiledPattern {
            source: source.to_string(),
            root,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub(crate) fn root(&self) -> &pr::Pattern {
        &self.root
    }
}

/// Compile a pattern source, memoized in a bounded LRU keyed by the
/// source text.
pub fn compile(source: &str) -> Result<Arc<CompiledPattern>, ErrorMessages> {
    if let Some(Some(hit)) = cache::with_cache(|c| c.get(source)) {
        return Ok(hit);
    }
    let pattern = Arc::new(CompiledPattern::parse_uncached(source)?);
    cache::with_cache(|c| c.insert(source.to_string(), pattern.clone()));
    Ok(pattern)
}

/// Receives evaluator progress when [EvalOptions::debug] is set.
pub trait TraceHook {
    fn on_enter(&self, kind: &str, path: &[PathSeg]) {
        let _ = (kind, path);
    }
    fn on_exit(&self, kind: &str) {
        let _ = kind;
    }
    fn on_bind(&self, name: &str, value: &Value) {
        let _ = (name, value);
    }
}

#[derive(Clone)]
pub struct EvalOptions {
    /// The work budget; exceeding it aborts with [EvalError::Ambiguous].
    pub max_steps: u64,
    pub debug: Option<Rc<dyn TraceHook>>,
}

impl Default for EvalOptions {
    fn default() -> Self {
        EvalOptions {
            max_steps: 2_000_000,
            debug: None,
        }
    }
}

impl std::fmt::Debug for EvalOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvalOptions")
            .field("max_steps", &self.max_steps)
            .field("debug", &self.debug.is_some())
            .finish()
    }
}

/// All solutions of the pattern anchored at the input root.
pub fn match_all(
    pattern: &CompiledPattern,
    input: &Value,
    opts: &EvalOptions,
) -> Result<Vec<Solution>, EvalError> {
    let mut solutions = Vec::new();
    engine::run_match(pattern.root(), input, opts, &mut |sol| {
        solutions.push(sol);
        Ok(engine::Step::Continue)
    })?;
    Ok(solutions)
}

/// The first solution, stopping enumeration as soon as it survives.
pub fn match_first(
    pattern: &CompiledPattern,
    input: &Value,
    opts: &EvalOptions,
) -> Result<Option<Solution>, EvalError> {
    let mut first = None;
    engine::run_match(pattern.root(), input, opts, &mut |sol| {
        first = Some(sol);
        Ok(engine::Step::Stop)
    })?;
    Ok(first)
}

pub fn match_exists(
    pattern: &CompiledPattern,
    input: &Value,
    opts: &EvalOptions,
) -> Result<bool, EvalError> {
    Ok(match_first(pattern, input, opts)?.is_some())
}

/// All solutions of the pattern at the root and at every descendant
/// position, in pre-order.
pub fn scan_all(
    pattern: &CompiledPattern,
    input: &Value,
    opts: &EvalOptions,
) -> Result<Vec<Solution>, EvalError> {
    let mut solutions = Vec::new();
    engine::run_scan(pattern.root(), input, opts, &mut |sol| {
        solutions.push(sol);
        Ok(engine::Step::Continue)
    })?;
    Ok(solutions)
}

pub fn scan_first(
    pattern: &CompiledPattern,
    input: &Value,
    opts: &EvalOptions,
) -> Result<Option<Solution>, EvalError> {
    let mut first = None;
    engine::run_scan(pattern.root(), input, opts, &mut |sol| {
        first = Some(sol);
        Ok(engine::Step::Stop)
    })?;
    Ok(first)
}

pub fn scan_exists(
    pattern: &CompiledPattern,
    input: &Value,
    opts: &EvalOptions,
) -> Result<bool, EvalError> {
    Ok(scan_first(pattern, input, opts)?.is_some())
}

/// The fluent pattern handle.
///
/// ```
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use serde_json::json;
/// use tendril::Tendril;
///
/// let t = Tendril::new("[_, _, $tail...]")?;
/// assert_eq!(
///     t.extract(&json!([1, 2, 3, 4]), "tail")?,
///     Some(json!([3, 4])),
/// );
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Tendril {
    pattern: Arc<CompiledPattern>,
}

impl Tendril {
    pub fn new(source: &str) -> Result<Self, ErrorMessages> {
        Ok(Tendril {
            pattern: compile(source)?,
        })
    }

    pub fn pattern(&self) -> &CompiledPattern {
        &self.pattern
    }

    /// Anchored match with default options.
    pub fn matches(&self, input: &Value) -> Result<bool, EvalError> {
        match_exists(&self.pattern, input, &EvalOptions::default())
    }

    pub fn match_all(&self, input: &Value) -> Result<Vec<Solution>, EvalError> {
        match_all(&self.pattern, input, &EvalOptions::default())
    }

    pub fn match_all_with(
        &self,
        input: &Value,
        opts: &EvalOptions,
    ) -> Result<Vec<Solution>, EvalError> {
        match_all(&self.pattern, input, opts)
    }

    pub fn match_first(&self, input: &Value) -> Result<Option<Solution>, EvalError> {
        match_first(&self.pattern, input, &EvalOptions::default())
    }

    /// Recursive scan with default options.
    pub fn find_all(&self, input: &Value) -> Result<Vec<Solution>, EvalError> {
        scan_all(&self.pattern, input, &EvalOptions::default())
    }

    pub fn find_first(&self, input: &Value) -> Result<Option<Solution>, EvalError> {
        scan_first(&self.pattern, input, &EvalOptions::default())
    }

    pub fn found_in(&self, input: &Value) -> Result<bool, EvalError> {
        scan_exists(&self.pattern, input, &EvalOptions::default())
    }

    /// The named binding of the first anchored match, if any.
    pub fn extract(&self, input: &Value, name: &str) -> Result<Option<Value>, EvalError> {
        let name = name.trim_start_matches(['$', '@', '%']);
        Ok(self
            .match_first(input)?
            .and_then(|sol| sol.value_of(name)))
    }
}

impl FromStr for Tendril {
    type Err = ErrorMessages;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tendril::new(s)
    }
}
