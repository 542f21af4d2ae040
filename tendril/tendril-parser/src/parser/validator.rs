use crate::error::Error;
use crate::parser::pr::*;
use crate::span::Span;

/// A single post-parse pass: checks the structural rules the grammar cannot
/// enforce locally and precomputes `has_bindings` on every node.
pub(crate) fn validate(mut pattern: Pattern) -> Result<Pattern, Vec<Error>> {
    let mut v = Validator {
        errors: Vec::new(),
        labels: Vec::new(),
    };
    v.walk(&mut pattern, Ctx::Root);

    if v.errors.is_empty() {
        Ok(pattern)
    } else {
        Err(v.errors)
    }
}

/// Where a sub-pattern sits; some constructs only make sense against a
/// slice of a container.
#[derive(Clone, Copy, PartialEq)]
enum Ctx {
    Root,
    /// An element position of an array (including nested fragments)
    Item,
    /// The value side of an object term
    Value,
}

struct Validator {
    errors: Vec<Error>,
    /// The labeled scopes enclosing the node under inspection, innermost
    /// last. Flow targets must resolve against this at compile time.
    labels: Vec<String>,
}

impl Validator {
    fn err<S: ToString>(&mut self, msg: S, span: Option<Span>) {
        self.errors.push(Error::new_simple(msg).with_span(span));
    }

    /// Returns whether the subtree can bind anything.
    fn walk(&mut self, pattern: &mut Pattern, ctx: Ctx) -> bool {
        let span = pattern.span;
        let mut binds = false;
        match &mut pattern.kind {
            PatternKind::Any
            | PatternKind::TypedAny(_)
            | PatternKind::Lit(_)
            | PatternKind::Fail => {}

            PatternKind::StringPat(sp) => {
                if let StringPat::Regex { body: _, flags } = sp {
                    for flag in flags.chars() {
                        match flag {
                            'i' | 'm' | 's' | 'x' | 'u' => {}
                            'g' | 'y' => self.err(
                                format!("regex flag `{flag}` is stateful and not supported"),
                                span,
                            ),
                            _ => self.err(format!("unknown regex flag `{flag}`"), span),
                        }
                    }
                }
            }

            PatternKind::Alt(alt) => {
                for p in &mut alt.alts {
                    binds |= self.walk(p, ctx);
                }
            }
            PatternKind::Conj(ps) | PatternKind::Seq(ps) => {
                for p in ps {
                    binds |= self.walk(p, ctx);
                }
            }
            PatternKind::Paren(sub) => binds = self.walk(sub, ctx),

            PatternKind::Quant(q) => {
                self.check_quant(&q.quant, span);
                if ctx != Ctx::Item {
                    self.err("a quantifier requires an array context", span);
                }
                if matches!(q.sub.kind, PatternKind::Spread(_)) {
                    self.err("cannot repeat a spread", span);
                }
                binds = self.walk(&mut q.sub, Ctx::Item);
            }
            PatternKind::Spread(quant) => {
                if let Some(quant) = quant {
                    self.check_quant(quant, span);
                }
                if ctx != Ctx::Item {
                    self.err("a spread requires an array or object context", span);
                }
            }

            PatternKind::Arr(arr) => {
                binds |= arr.label.is_some();
                let labeled = arr.label.is_some();
                if let Some(label) = &arr.label {
                    self.labels.push(label.clone());
                }
                for p in &mut arr.items {
                    binds |= self.walk(p, Ctx::Item);
                }
                if labeled {
                    self.labels.pop();
                }
            }
            PatternKind::Obj(obj) => {
                binds |= obj.label.is_some();
                let labeled = obj.label.is_some();
                if let Some(label) = &obj.label {
                    self.labels.push(label.clone());
                }
                for term in &mut obj.terms {
                    binds |= self.walk_term(term, span, false);
                }
                if let Some(spread) = &mut obj.spread {
                    binds |= self.walk_term(spread, span, true);
                }
                if labeled {
                    self.labels.pop();
                }
            }

            PatternKind::SBind(b) => {
                binds = true;
                if matches!(b.sub.kind, PatternKind::Spread(_)) {
                    self.err("a scalar binding cannot hold a spread", span);
                }
                self.walk(&mut b.sub, ctx);
            }
            PatternKind::GroupBind(gb) => {
                binds = true;
                if ctx != Ctx::Item {
                    self.err("a group binding requires an array or object context", span);
                }
                self.walk(&mut gb.sub, Ctx::Item);
            }

            PatternKind::Look(look) => {
                binds = self.walk(&mut look.sub, Ctx::Item);
            }
            PatternKind::Guarded(g) => {
                binds = self.walk(&mut g.sub, ctx);
            }
            PatternKind::Flow(flow) => {
                binds = true;
                // a dangling flow would otherwise surface on first use
                match &flow.target.label {
                    Some(name) if !self.labels.iter().any(|l| l == name) => {
                        self.err(format!("flow targets unknown label `{name}`"), span);
                    }
                    None if self.labels.is_empty() => {
                        self.err("flow requires an enclosing labeled scope", span);
                    }
                    _ => {}
                }
                self.walk(&mut flow.sub, ctx);
            }
        }

        pattern.has_bindings = binds;
        binds
    }

    fn walk_term(&mut self, term: &mut Term, span: Option<Span>, is_spread_slot: bool) -> bool {
        let mut binds = false;
        match term {
            Term::KeyValue(kv) => {
                if let Some(quant) = &kv.quant {
                    self.check_quant(quant, kv.span);
                }
                binds |= self.walk(&mut kv.key, Ctx::Value);
                for crumb in &mut kv.breadcrumbs {
                    let p = match crumb {
                        Breadcrumb::Dot { key } => key,
                        Breadcrumb::Bracket { index } => index,
                        Breadcrumb::Skip { key } => key,
                    };
                    binds |= self.walk(p, Ctx::Value);
                }
                binds |= self.walk(&mut kv.value, Ctx::Value);
            }
            Term::Group(group) => {
                for t in &mut group.terms {
                    binds |= self.walk_term(t, span, false);
                }
            }
            Term::Look(look) => {
                // a bare spread inside an assertion is the residual check
                for t in &mut look.terms {
                    if !matches!(t, Term::Spread(_)) {
                        binds |= self.walk_term(t, span, false);
                    }
                }
            }
            Term::GroupBind(gb) => {
                binds = true;
                if let ObjGroupSource::Terms(terms) = &mut gb.source {
                    for t in terms {
                        binds |= self.walk_term(t, span, false);
                    }
                }
            }
            Term::Spread(quant) => {
                if let Some(quant) = quant {
                    self.check_quant(quant, span);
                }
                if !is_spread_slot {
                    self.err("a spread must be the final term of an object pattern", span);
                }
            }
        }
        binds
    }

    fn check_quant(&mut self, quant: &Quantifier, span: Option<Span>) {
        if let Some(max) = quant.max {
            if quant.min > max {
                self.err(
                    format!(
                        "impossible count: minimum {} exceeds maximum {max}",
                        quant.min
                    ),
                    span,
                );
            }
        }
    }
}
