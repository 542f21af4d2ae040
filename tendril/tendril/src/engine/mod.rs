//! The backtracking evaluator. For each way a pattern matches a node, an
//! `emit` callback receives an extended [Solution]; branch points clone the
//! solution and never mutate the caller's copy. Everything runs
//! cooperatively on the caller's stack, metered by a step counter.

mod array;
pub mod guard;
mod object;
pub mod solution;

use std::cell::{Cell, RefCell};

use serde_json::Value;

use tendril_parser::parser::pr::{
    BucketKind, FlowPattern, LookPattern, Pattern, PatternKind, StringPat,
};

use crate::error_message::EvalError;
use crate::regex_cache;
use crate::value::{deep_eq, is_of_type, lit_to_value, Path, PathSeg};
use crate::EvalOptions;
use solution::{Binding, Bucket, BucketLevel, Solution, WHOLE_MATCH};

/// Whether the consumer wants more solutions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    Continue,
    Stop,
}

pub(crate) type EmitResult = Result<Step, EvalError>;

/// The per-run state: options, the step counter, and the path from the
/// input root to the node currently under inspection.
pub(crate) struct EvalCtx<'a> {
    opts: &'a EvalOptions,
    steps: Cell<u64>,
    path: RefCell<Path>,
}

impl<'a> EvalCtx<'a> {
    fn new(opts: &'a EvalOptions) -> Self {
        EvalCtx {
            opts,
            steps: Cell::new(0),
            path: RefCell::new(Vec::new()),
        }
    }

    /// Count one unit of work; exhausting the budget aborts the run.
    pub(crate) fn step(&self) -> Result<(), EvalError> {
        let steps = self.steps.get() + 1;
        self.steps.set(steps);
        if steps > self.opts.max_steps {
            Err(EvalError::ambiguous(format!(
                "step budget of {} exceeded",
                self.opts.max_steps
            )))
        } else {
            Ok(())
        }
    }

    pub(crate) fn path(&self) -> Path {
        self.path.borrow().clone()
    }

    pub(crate) fn push(&self, seg: PathSeg) {
        self.path.borrow_mut().push(seg);
    }

    pub(crate) fn pop(&self) -> PathSeg {
        self.path.borrow_mut().pop().expect("path underflow")
    }

    fn trace_enter(&self, pat: &Pattern) {
        if let Some(hook) = &self.opts.debug {
            hook.on_enter(pat.kind.as_ref(), &self.path.borrow());
        }
    }

    fn trace_exit(&self, pat: &Pattern) {
        if let Some(hook) = &self.opts.debug {
            hook.on_exit(pat.kind.as_ref());
        }
    }

    pub(crate) fn trace_bind(&self, name: &str, value: &Value) {
        if let Some(hook) = &self.opts.debug {
            hook.on_bind(name, value);
        }
    }
}

/// Match the pattern anchored at the input root.
pub(crate) fn run_match(
    pat: &Pattern,
    input: &Value,
    opts: &EvalOptions,
    emit: &mut dyn FnMut(Solution) -> EmitResult,
) -> Result<(), EvalError> {
    let ctx = EvalCtx::new(opts);
    match_at(&ctx, pat, input, emit)?;
    Ok(())
}

/// Match the pattern at the root and at every descendant position, in
/// pre-order (arrays by index, objects by insertion order).
pub(crate) fn run_scan(
    pat: &Pattern,
    input: &Value,
    opts: &EvalOptions,
    emit: &mut dyn FnMut(Solution) -> EmitResult,
) -> Result<(), EvalError> {
    let ctx = EvalCtx::new(opts);
    scan_walk(&ctx, pat, input, emit)?;
    Ok(())
}

fn scan_walk(
    ctx: &EvalCtx,
    pat: &Pattern,
    node: &Value,
    emit: &mut dyn FnMut(Solution) -> EmitResult,
) -> EmitResult {
    ctx.step()?;
    if match_at(ctx, pat, node, emit)? == Step::Stop {
        return Ok(Step::Stop);
    }
    match node {
        Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                ctx.push(PathSeg::Index(i));
                let step = scan_walk(ctx, pat, child, emit);
                ctx.pop();
                if step? == Step::Stop {
                    return Ok(Step::Stop);
                }
            }
        }
        Value::Object(map) => {
            for (k, child) in map {
                ctx.push(PathSeg::Key(k.clone()));
                let step = scan_walk(ctx, pat, child, emit);
                ctx.pop();
                if step? == Step::Stop {
                    return Ok(Step::Stop);
                }
            }
        }
        _ => {}
    }
    Ok(Step::Continue)
}

/// One match attempt at a fixed position. Records the whole-match binding
/// and filters out solutions with guards still waiting on unbound
/// variables.
fn match_at(
    ctx: &EvalCtx,
    pat: &Pattern,
    node: &Value,
    emit: &mut dyn FnMut(Solution) -> EmitResult,
) -> EmitResult {
    let sol = Solution::default();
    match_item(ctx, pat, node, &sol, &mut |mut sol2| {
        if !sol2.is_complete() {
            return Ok(Step::Continue);
        }
        let site = solution::Site::Scalar {
            path: ctx.path(),
            recorded: node.clone(),
        };
        if !sol2.bind(WHOLE_MATCH, Binding::Scalar(node.clone()), Some(site)) {
            return Ok(Step::Continue);
        }
        emit(sol2)
    })
}

/// The dispatcher: for each way `pat` matches `node` under `sol`, call
/// `emit` with an extended clone.
pub(crate) fn match_item(
    ctx: &EvalCtx,
    pat: &Pattern,
    node: &Value,
    sol: &Solution,
    emit: &mut dyn FnMut(Solution) -> EmitResult,
) -> EmitResult {
    ctx.step()?;
    ctx.trace_enter(pat);
    let result = match_item_inner(ctx, pat, node, sol, emit);
    ctx.trace_exit(pat);
    result
}

fn match_item_inner(
    ctx: &EvalCtx,
    pat: &Pattern,
    node: &Value,
    sol: &Solution,
    emit: &mut dyn FnMut(Solution) -> EmitResult,
) -> EmitResult {
    match &pat.kind {
        PatternKind::Any => emit(sol.clone()),
        PatternKind::TypedAny(ty) => {
            if is_of_type(node, *ty) {
                emit(sol.clone())
            } else {
                Ok(Step::Continue)
            }
        }
        PatternKind::Lit(lit) => match lit_to_value(lit) {
            Some(wanted) if deep_eq(&wanted, node) => emit(sol.clone()),
            _ => Ok(Step::Continue),
        },
        PatternKind::StringPat(sp) => {
            if match_string(sp, node)? {
                emit(sol.clone())
            } else {
                Ok(Step::Continue)
            }
        }
        PatternKind::Fail => Ok(Step::Continue),

        PatternKind::Alt(alt) => {
            for a in &alt.alts {
                let mut emitted = false;
                let step = match_item(ctx, a, node, sol, &mut |s2| {
                    emitted = true;
                    emit(s2)
                })?;
                if step == Step::Stop {
                    return Ok(Step::Stop);
                }
                if alt.prioritized && emitted {
                    break;
                }
            }
            Ok(Step::Continue)
        }

        PatternKind::Conj(ps) => conj_rest(ctx, ps, node, sol, emit),

        // a sequence covers a run of array elements, never a single node
        PatternKind::Seq(_) => Ok(Step::Continue),
        PatternKind::Paren(sub) => match_item(ctx, sub, node, sol, emit),

        PatternKind::Quant(_) => Err(EvalError::evaluate(
            "a quantifier requires an array context",
        )),
        PatternKind::Spread(_) => Err(EvalError::evaluate(
            "a spread requires an array or object context",
        )),
        PatternKind::GroupBind(_) => Err(EvalError::evaluate(
            "a group binding requires an array or object context",
        )),

        PatternKind::SBind(b) => {
            if unwrap_parens(&b.sub).kind.is_seq() {
                // a scalar cannot hold a sequence; group bindings do that
                return Ok(Step::Continue);
            }
            match_item(ctx, &b.sub, node, sol, &mut |sol2| {
                match bind_scalar(ctx, b, node, sol2) {
                    Some(sol3) => emit(sol3),
                    None => Ok(Step::Continue),
                }
            })
        }

        PatternKind::Guarded(g) => match_item(ctx, &g.sub, node, sol, &mut |sol2| {
            if guard::eval_guard(&g.guard, &sol2.env, Some(node)) {
                emit(sol2)
            } else {
                Ok(Step::Continue)
            }
        }),

        PatternKind::Look(look) => scalar_look(ctx, look, node, sol, emit),

        PatternKind::Arr(arr) => {
            let Value::Array(items) = node else {
                return Ok(Step::Continue);
            };
            match &arr.label {
                Some(label) => {
                    let mut sol2 = sol.clone();
                    push_level(&mut sol2, label);
                    array::match_array(ctx, &arr.items, items, &sol2, &mut |mut sol3| {
                        if finalize_level(&mut sol3) {
                            emit(sol3)
                        } else {
                            Ok(Step::Continue)
                        }
                    })
                }
                None => array::match_array(ctx, &arr.items, items, sol, emit),
            }
        }

        PatternKind::Obj(obj) => {
            let Value::Object(map) = node else {
                return Ok(Step::Continue);
            };
            match &obj.label {
                Some(label) => {
                    let mut sol2 = sol.clone();
                    push_level(&mut sol2, label);
                    object::match_object(ctx, obj, map, &sol2, &mut |mut sol3| {
                        if finalize_level(&mut sol3) {
                            emit(sol3)
                        } else {
                            Ok(Step::Continue)
                        }
                    })
                }
                None => object::match_object(ctx, obj, map, sol, emit),
            }
        }

        PatternKind::Flow(fp) => match_item(ctx, &fp.sub, node, sol, &mut |sol2| {
            match flow_into_bucket(ctx, fp, node, sol2)? {
                Some(sol3) => emit(sol3),
                // a bucket collision or missing source fails the branch
                None => Ok(Step::Continue),
            }
        }),
    }
}

/// Scalar binding with site recording and guard attachment; None abandons
/// the branch.
pub(crate) fn bind_scalar(
    ctx: &EvalCtx,
    b: &tendril_parser::parser::pr::BindPattern,
    node: &Value,
    mut sol: Solution,
) -> Option<Solution> {
    let site = solution::Site::Scalar {
        path: ctx.path(),
        recorded: node.clone(),
    };
    if !sol.bind(&b.name, Binding::Scalar(node.clone()), Some(site)) {
        return None;
    }
    if let Some(guard) = &b.guard {
        if !sol.attach_guard(guard, Some(node)) {
            return None;
        }
    }
    ctx.trace_bind(&b.name, node);
    Some(sol)
}

fn conj_rest(
    ctx: &EvalCtx,
    ps: &[Pattern],
    node: &Value,
    sol: &Solution,
    emit: &mut dyn FnMut(Solution) -> EmitResult,
) -> EmitResult {
    let Some((first, rest)) = ps.split_first() else {
        return emit(sol.clone());
    };
    match_item(ctx, first, node, sol, &mut |sol2| {
        conj_rest(ctx, rest, node, &sol2, emit)
    })
}

fn scalar_look(
    ctx: &EvalCtx,
    look: &LookPattern,
    node: &Value,
    sol: &Solution,
    emit: &mut dyn FnMut(Solution) -> EmitResult,
) -> EmitResult {
    if look.negative {
        // never commits bindings
        if exists(ctx, &look.sub, node, sol)? {
            Ok(Step::Continue)
        } else {
            emit(sol.clone())
        }
    } else if look.sub.has_bindings {
        // positive bindings escape; enumerate every sub-solution
        match_item(ctx, &look.sub, node, sol, emit)
    } else if exists(ctx, &look.sub, node, sol)? {
        emit(sol.clone())
    } else {
        Ok(Step::Continue)
    }
}

pub(crate) fn exists(
    ctx: &EvalCtx,
    pat: &Pattern,
    node: &Value,
    sol: &Solution,
) -> Result<bool, EvalError> {
    let mut found = false;
    match_item(ctx, pat, node, sol, &mut |_| {
        found = true;
        Ok(Step::Stop)
    })?;
    Ok(found)
}

fn match_string(sp: &StringPat, node: &Value) -> Result<bool, EvalError> {
    let Value::String(s) = node else {
        return Ok(false);
    };
    match sp {
        StringPat::CaseInsensitive(lowered) => Ok(&s.to_lowercase() == lowered),
        StringPat::Regex { body, flags } => {
            let re = regex_cache::get_or_compile(body, flags)
                .ok_or_else(|| EvalError::evaluate(format!("invalid regex /{body}/{flags}")))?;
            Ok(re.is_match(s))
        }
    }
}

pub(crate) fn unwrap_parens(pat: &Pattern) -> &Pattern {
    match &pat.kind {
        PatternKind::Paren(sub) => unwrap_parens(sub),
        _ => pat,
    }
}

fn push_level(sol: &mut Solution, label: &str) {
    sol.buckets.push(BucketLevel {
        label: label.to_string(),
        current_key: None,
        buckets: Default::default(),
    });
}

/// Pop a labeled scope and bind each of its buckets as a group variable.
/// False when a bucket conflicts with an existing binding.
fn finalize_level(sol: &mut Solution) -> bool {
    let level = sol.buckets.pop().expect("labeled scope pushed a level");
    for (name, bucket) in level.buckets {
        let Bucket {
            kind,
            entries,
            sites,
        } = bucket;
        let binding = match kind {
            BucketKind::Array => Binding::Slice(entries.into_iter().map(|(_, v)| v).collect()),
            BucketKind::Object => Binding::Submap(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.expect("object buckets are keyed"), v))
                    .collect(),
            ),
        };
        if !sol.bind(&name, binding, None) {
            return false;
        }
        sol.sites.entry(name).or_default().extend(sites);
    }
    true
}

/// Append the current match to the targeted bucket. `Ok(None)` fails the
/// branch silently (a keyed collision or an unbound collect source).
fn flow_into_bucket(
    ctx: &EvalCtx,
    fp: &FlowPattern,
    node: &Value,
    mut sol: Solution,
) -> Result<Option<Solution>, EvalError> {
    let level_idx = match &fp.target.label {
        Some(name) => sol
            .buckets
            .iter()
            .rposition(|l| &l.label == name)
            .ok_or_else(|| {
                EvalError::evaluate(format!("flow targets unknown label `{name}`"))
            })?,
        None => sol.buckets.len().checked_sub(1).ok_or_else(|| {
            EvalError::evaluate("flow requires an enclosing labeled scope")
        })?,
    };

    let (mut key, value, sites) = match &fp.collect {
        Some(spec) => {
            let Some(value) = sol.binding(&spec.value).map(Binding::to_value) else {
                return Ok(None);
            };
            let key = match &spec.key {
                Some(key_name) => match sol.binding(key_name).map(Binding::to_value) {
                    Some(Value::String(s)) => Some(s),
                    _ => return Ok(None),
                },
                None => None,
            };

            // contributed variables are released so the next iteration can
            // rebind them; their sites travel with the bucket
            let mut sites = Vec::new();
            let mut names = vec![spec.value.clone()];
            names.extend(spec.key.clone());
            for name in names {
                sol.env.remove(&name);
                if let Some(s) = sol.sites.remove(&name) {
                    sites.extend(s);
                }
            }
            (key, value, sites)
        }
        None => {
            let site = solution::Site::Scalar {
                path: ctx.path(),
                recorded: node.clone(),
            };
            (None, node.clone(), vec![site])
        }
    };

    let level = &mut sol.buckets[level_idx];
    if fp.target.kind == BucketKind::Object && key.is_none() {
        key = match &level.current_key {
            Some(k) => Some(k.clone()),
            None => {
                return Err(EvalError::evaluate(format!(
                    "bucket `%{}` needs a key, but no object key is being iterated",
                    fp.target.bucket
                )))
            }
        };
    }

    let bucket = level
        .buckets
        .entry(fp.target.bucket.clone())
        .or_insert_with(|| Bucket {
            kind: fp.target.kind,
            entries: Vec::new(),
            sites: Vec::new(),
        });
    if bucket.kind != fp.target.kind {
        return Err(EvalError::evaluate(format!(
            "bucket `{}` is used both as an array and an object bucket",
            fp.target.bucket
        )));
    }

    if bucket.kind == BucketKind::Object {
        let key_str = key.as_deref().expect("keyed entry");
        if let Some((_, existing)) = bucket
            .entries
            .iter()
            .find(|(k, _)| k.as_deref() == Some(key_str))
        {
            // an equal re-contribution is a no-op; unequal ones collide
            return Ok(if deep_eq(existing, &value) {
                Some(sol)
            } else {
                None
            });
        }
    }

    bucket.entries.push((key, value));
    bucket.sites.extend(sites);
    Ok(Some(sol))
}
