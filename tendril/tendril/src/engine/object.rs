//! Object matching. Terms run in order over a list of states, each
//! carrying its solution plus the key sets already covered and tested;
//! the remainder slot then constrains or captures the residual keys.

use std::collections::BTreeSet;

use itertools::Itertools;
use serde_json::{Map, Value};

use tendril_parser::parser::pr::{
    Breadcrumb, ObjGroupSource, ObjPattern, ObjTerm, Pattern, PatternKind, Quantifier, Term,
};

use crate::engine::solution::{Binding, Site, Solution};
use crate::engine::{exists, match_item, EmitResult, EvalCtx, Step};
use crate::error_message::EvalError;
use crate::value::PathSeg;

#[derive(Clone)]
struct ObjState {
    sol: Solution,
    /// Keys matching any term's key pattern; the rest is the remainder.
    covered: BTreeSet<String>,
    /// Keys whose values were actually matched for capture.
    tested: BTreeSet<String>,
}

type EmitState<'e> = dyn FnMut(ObjState) -> EmitResult + 'e;

pub(super) fn match_object(
    ctx: &EvalCtx,
    obj: &ObjPattern,
    map: &Map<String, Value>,
    sol: &Solution,
    emit: &mut dyn FnMut(Solution) -> EmitResult,
) -> EmitResult {
    let initial = ObjState {
        sol: sol.clone(),
        covered: BTreeSet::new(),
        tested: BTreeSet::new(),
    };

    let states = apply_terms(ctx, &obj.terms, obj.label.as_deref(), map, vec![initial])?;

    for state in states {
        let step = close_remainder(ctx, obj, map, state, emit)?;
        if step == Step::Stop {
            return Ok(Step::Stop);
        }
    }
    Ok(Step::Continue)
}

/// Enforce or capture the residual keys, then emit the state's solution.
fn close_remainder(
    ctx: &EvalCtx,
    obj: &ObjPattern,
    map: &Map<String, Value>,
    state: ObjState,
    emit: &mut dyn FnMut(Solution) -> EmitResult,
) -> EmitResult {
    let residual = map
        .keys()
        .filter(|k| !state.covered.contains(*k))
        .collect_vec();

    match obj.spread.as_deref() {
        // no spread: the object is closed
        None => {
            if residual.is_empty() {
                emit(state.sol)
            } else {
                Ok(Step::Continue)
            }
        }
        Some(Term::Spread(quant)) => {
            if count_ok(quant, residual.len(), 0) {
                emit(state.sol)
            } else {
                Ok(Step::Continue)
            }
        }
        Some(Term::GroupBind(gb)) => {
            debug_assert!(gb.source == ObjGroupSource::Remainder);
            let keys: Vec<String> = residual.iter().map(|k| (*k).clone()).collect();
            let entries: Vec<(String, Value)> = keys
                .iter()
                .map(|k| (k.clone(), map[k].clone()))
                .collect();
            let site = Site::Keys {
                path: ctx.path(),
                keys,
                recorded: entries.clone(),
            };
            let mut sol = state.sol;
            if sol.bind(&gb.name, Binding::Submap(entries), Some(site)) {
                emit(sol)
            } else {
                Ok(Step::Continue)
            }
        }
        Some(other) => Err(EvalError::evaluate(format!(
            "unsupported remainder term {other:?}"
        ))),
    }
}

fn count_ok(quant: &Option<Quantifier>, n: usize, default_min: usize) -> bool {
    let min = quant.map_or(default_min, |q| q.min);
    let max = quant.and_then(|q| q.max).unwrap_or(usize::MAX);
    n >= min && n <= max
}

fn apply_terms(
    ctx: &EvalCtx,
    terms: &[Term],
    label: Option<&str>,
    map: &Map<String, Value>,
    mut states: Vec<ObjState>,
) -> Result<Vec<ObjState>, EvalError> {
    for term in terms {
        let mut out = Vec::new();
        for state in &states {
            apply_term(ctx, term, label, map, state, &mut |st| {
                out.push(st);
                Ok(Step::Continue)
            })?;
        }
        states = out;
        if states.is_empty() {
            break;
        }
    }
    Ok(states)
}

fn apply_term(
    ctx: &EvalCtx,
    term: &Term,
    label: Option<&str>,
    map: &Map<String, Value>,
    state: &ObjState,
    out: &mut EmitState,
) -> EmitResult {
    match term {
        Term::KeyValue(kv) => apply_kv(ctx, kv, label, map, state, out),

        Term::Group(group) => {
            let states = apply_terms(ctx, &group.terms, label, map, vec![state.clone()])?;
            for st in states {
                let step = out(st)?;
                if step == Step::Stop {
                    return Ok(Step::Stop);
                }
            }
            Ok(Step::Continue)
        }

        Term::Look(look) => {
            // the residual-count assertion: `(? ...)` / `(! ...)`
            if let [Term::Spread(quant)] = look.terms.as_slice() {
                let residual = map
                    .keys()
                    .filter(|k| !state.covered.contains(*k))
                    .count();
                let ok = count_ok(quant, residual, 1) != look.negative;
                return if ok { out(state.clone()) } else { Ok(Step::Continue) };
            }

            let inner = apply_terms(ctx, &look.terms, label, map, vec![state.clone()])?;
            if look.negative {
                if inner.is_empty() {
                    out(state.clone())
                } else {
                    Ok(Step::Continue)
                }
            } else if terms_have_bindings(&look.terms) {
                // bindings escape, coverage does not
                for st in inner {
                    let escaped = ObjState {
                        sol: st.sol,
                        covered: state.covered.clone(),
                        tested: state.tested.clone(),
                    };
                    let step = out(escaped)?;
                    if step == Step::Stop {
                        return Ok(Step::Stop);
                    }
                }
                Ok(Step::Continue)
            } else if inner.is_empty() {
                Ok(Step::Continue)
            } else {
                out(state.clone())
            }
        }

        Term::GroupBind(gb) => match &gb.source {
            ObjGroupSource::Terms(terms) => {
                let inner = apply_terms(ctx, terms, label, map, vec![state.clone()])?;
                for st in inner {
                    // the group's catch is the newly covered keys
                    let caught: Vec<String> = map
                        .keys()
                        .filter(|k| st.covered.contains(*k) && !state.covered.contains(*k))
                        .cloned()
                        .collect();
                    let entries: Vec<(String, Value)> = caught
                        .iter()
                        .map(|k| (k.clone(), map[k].clone()))
                        .collect();
                    let site = Site::Keys {
                        path: ctx.path(),
                        keys: caught,
                        recorded: entries.clone(),
                    };
                    let mut st = st;
                    if !st.sol.bind(&gb.name, Binding::Submap(entries), Some(site)) {
                        continue;
                    }
                    let step = out(st)?;
                    if step == Step::Stop {
                        return Ok(Step::Stop);
                    }
                }
                Ok(Step::Continue)
            }
            ObjGroupSource::Remainder => Err(EvalError::evaluate(
                "a remainder capture must be the final term",
            )),
        },

        Term::Spread(_) => Err(EvalError::evaluate(
            "a spread must be the final term of an object pattern",
        )),
    }
}

fn apply_kv(
    ctx: &EvalCtx,
    kv: &ObjTerm,
    label: Option<&str>,
    map: &Map<String, Value>,
    state: &ObjState,
    out: &mut EmitState,
) -> EmitResult {
    // candidate keys: the fast path when the key variable is already bound,
    // otherwise every key matching the key pattern
    let candidates: Vec<String> = match bound_key(kv, &state.sol) {
        Some(k) if !kv.descend => {
            if map.contains_key(&k) {
                vec![k]
            } else {
                vec![]
            }
        }
        _ => {
            let mut candidates = Vec::new();
            for k in map.keys() {
                let hit = if kv.descend {
                    key_hit_anywhere(ctx, kv, map, k, &state.sol)?
                } else {
                    key_matches(ctx, &kv.key, k, &state.sol)?
                };
                if hit {
                    candidates.push(k.clone());
                }
            }
            candidates
        }
    };

    // partition into the slice (value matches) and the bad entries
    let mut slice = Vec::new();
    let mut bad = Vec::new();
    for k in &candidates {
        let hit = if kv.descend {
            // anywhere-hits were already full hits
            true
        } else {
            let mut found = false;
            capture_key(ctx, kv, label, map, k, &state.sol, &mut |_| {
                found = true;
                Ok(Step::Stop)
            })?;
            found
        };
        if hit {
            slice.push(k.clone());
        } else {
            bad.push(k.clone());
        }
    }

    // slice cardinality: `{1,}` by default, `{0,}` when optional, explicit
    // counts override
    let default_min = if kv.optional { 0 } else { 1 };
    if !count_ok(&kv.quant, slice.len(), default_min) {
        return Ok(Step::Continue);
    }
    if kv.strong && !bad.is_empty() {
        return Ok(Step::Continue);
    }

    let mut covered = state.covered.clone();
    covered.extend(candidates.iter().cloned());

    if slice.is_empty() {
        return out(ObjState {
            sol: state.sol.clone(),
            covered,
            tested: state.tested.clone(),
        });
    }

    let needs_capture = kv.key.has_bindings
        || kv.value.has_bindings
        || crumbs_have_bindings(&kv.breadcrumbs)
        || label.is_some();
    if !needs_capture {
        let mut tested = state.tested.clone();
        tested.extend(slice.iter().cloned());
        return out(ObjState {
            sol: state.sol.clone(),
            covered,
            tested,
        });
    }

    let mut tested = state.tested.clone();
    tested.extend(slice.iter().cloned());

    if kv.strong {
        // every key of the slice contributes to the same solution
        let mut sols = vec![state.sol.clone()];
        for k in &slice {
            let mut next = Vec::new();
            for s in &sols {
                capture_key(ctx, kv, label, map, k, s, &mut |s2| {
                    next.push(s2);
                    Ok(Step::Continue)
                })?;
            }
            sols = next;
            if sols.is_empty() {
                return Ok(Step::Continue);
            }
        }
        for sol in sols {
            let step = out(ObjState {
                sol,
                covered: covered.clone(),
                tested: tested.clone(),
            })?;
            if step == Step::Stop {
                return Ok(Step::Stop);
            }
        }
        Ok(Step::Continue)
    } else {
        // one independent branch per slice key
        for k in &slice {
            let mut branch_tested = state.tested.clone();
            branch_tested.insert(k.clone());
            let covered = covered.clone();
            let step = capture_key(ctx, kv, label, map, k, &state.sol, &mut |s2| {
                out(ObjState {
                    sol: s2,
                    covered: covered.clone(),
                    tested: branch_tested.clone(),
                })
            })?;
            if step == Step::Stop {
                return Ok(Step::Stop);
            }
        }
        Ok(Step::Continue)
    }
}

/// The already-bound key variable, when the key pattern is a plain binding.
fn bound_key(kv: &ObjTerm, sol: &Solution) -> Option<String> {
    let PatternKind::SBind(b) = &kv.key.kind else {
        return None;
    };
    match sol.binding(&b.name) {
        Some(Binding::Scalar(Value::String(s))) => Some(s.clone()),
        _ => None,
    }
}

/// All ways one chosen key satisfies the term: key capture, breadcrumb
/// navigation, value capture, and the label's current-key bookkeeping.
fn capture_key(
    ctx: &EvalCtx,
    kv: &ObjTerm,
    label: Option<&str>,
    map: &Map<String, Value>,
    k: &str,
    sol: &Solution,
    emit: &mut dyn FnMut(Solution) -> EmitResult,
) -> EmitResult {
    ctx.step()?;
    let mut sol = sol.clone();
    if let Some(label) = label {
        if let Some(level) = sol.buckets.iter_mut().rev().find(|l| l.label == label) {
            level.current_key = Some(k.to_string());
        }
    }

    let child = &map[k];

    // the direct interpretation: this key is the matched key
    let direct = &mut |sol2: Solution| {
        ctx.push(PathSeg::Key(k.to_string()));
        let step = navigate(ctx, &kv.breadcrumbs, child, &sol2, &mut |node, sol3| {
            match_item(ctx, &kv.value, node, &sol3, emit)
        });
        ctx.pop();
        step
    };

    let step = match_key(ctx, &kv.key, k, &sol, direct)?;
    if step == Step::Stop {
        return Ok(Step::Stop);
    }

    if kv.descend {
        // the key may also live anywhere below this child
        let skip = skip_crumbs(kv);
        ctx.push(PathSeg::Key(k.to_string()));
        let step = navigate(ctx, &skip, child, &sol, &mut |node, sol3| {
            match_item(ctx, &kv.value, node, &sol3, emit)
        });
        ctx.pop();
        return step;
    }

    Ok(Step::Continue)
}

fn skip_crumbs(kv: &ObjTerm) -> Vec<Breadcrumb> {
    let mut crumbs = vec![Breadcrumb::Skip {
        key: kv.key.clone(),
    }];
    crumbs.extend(kv.breadcrumbs.iter().cloned());
    crumbs
}

fn key_hit_anywhere(
    ctx: &EvalCtx,
    kv: &ObjTerm,
    map: &Map<String, Value>,
    k: &str,
    sol: &Solution,
) -> Result<bool, EvalError> {
    let mut found = false;
    capture_key(ctx, kv, None, map, k, sol, &mut |_| {
        found = true;
        Ok(Step::Stop)
    })?;
    Ok(found)
}

fn key_matches(
    ctx: &EvalCtx,
    key: &Pattern,
    k: &str,
    sol: &Solution,
) -> Result<bool, EvalError> {
    let mut found = false;
    match_key(ctx, key, k, sol, &mut |_| {
        found = true;
        Ok(Step::Stop)
    })?;
    Ok(found)
}

/// Match a key pattern against a concrete key, binding key variables with
/// a key site.
fn match_key(
    ctx: &EvalCtx,
    key: &Pattern,
    k: &str,
    sol: &Solution,
    emit: &mut dyn FnMut(Solution) -> EmitResult,
) -> EmitResult {
    match &key.kind {
        PatternKind::SBind(b) => {
            let mut sol2 = sol.clone();
            let site = Site::Key {
                path: ctx.path(),
                key: k.to_string(),
            };
            let key_value = Value::String(k.to_string());
            if !sol2.bind(&b.name, Binding::Scalar(key_value.clone()), Some(site)) {
                return Ok(Step::Continue);
            }
            if let Some(guard) = &b.guard {
                if !sol2.attach_guard(guard, Some(&key_value)) {
                    return Ok(Step::Continue);
                }
            }
            ctx.trace_bind(&b.name, &key_value);
            emit(sol2)
        }
        _ => {
            let key_value = Value::String(k.to_string());
            if exists(ctx, key, &key_value, sol)? {
                emit(sol.clone())
            } else {
                Ok(Step::Continue)
            }
        }
    }
}

/// Walk breadcrumbs from a matched key's value into deeper structure.
fn navigate(
    ctx: &EvalCtx,
    crumbs: &[Breadcrumb],
    node: &Value,
    sol: &Solution,
    emit: &mut dyn FnMut(&Value, Solution) -> EmitResult,
) -> EmitResult {
    ctx.step()?;
    let Some((first, rest)) = crumbs.split_first() else {
        return emit(node, sol.clone());
    };

    match first {
        Breadcrumb::Dot { key } => {
            let Value::Object(map) = node else {
                return Ok(Step::Continue);
            };
            // fast path when the key variable is already bound
            if let PatternKind::SBind(b) = &key.kind {
                if let Some(Binding::Scalar(Value::String(bound))) = sol.binding(&b.name) {
                    let bound = bound.clone();
                    let Some(child) = map.get(&bound) else {
                        return Ok(Step::Continue);
                    };
                    return match_key(ctx, key, &bound, sol, &mut |sol2| {
                        ctx.push(PathSeg::Key(bound.clone()));
                        let step = navigate(ctx, rest, child, &sol2, emit);
                        ctx.pop();
                        step
                    });
                }
            }
            for (k, child) in map {
                let step = match_key(ctx, key, k, sol, &mut |sol2| {
                    ctx.push(PathSeg::Key(k.clone()));
                    let step = navigate(ctx, rest, child, &sol2, emit);
                    ctx.pop();
                    step
                })?;
                if step == Step::Stop {
                    return Ok(Step::Stop);
                }
            }
            Ok(Step::Continue)
        }

        Breadcrumb::Bracket { index } => {
            let Value::Array(items) = node else {
                return Ok(Step::Continue);
            };
            // literal indices address directly
            if let PatternKind::Lit(tendril_parser::lexer::lr::Literal::Integer(i)) = &index.kind
            {
                let Ok(i) = usize::try_from(*i) else {
                    return Ok(Step::Continue);
                };
                let Some(child) = items.get(i) else {
                    return Ok(Step::Continue);
                };
                ctx.push(PathSeg::Index(i));
                let step = navigate(ctx, rest, child, sol, emit);
                ctx.pop();
                return step;
            }
            for (i, child) in items.iter().enumerate() {
                let index_value = Value::Number(i.into());
                let step = match_item(ctx, index, &index_value, sol, &mut |sol2| {
                    ctx.push(PathSeg::Index(i));
                    let step = navigate(ctx, rest, child, &sol2, emit);
                    ctx.pop();
                    step
                })?;
                if step == Step::Stop {
                    return Ok(Step::Stop);
                }
            }
            Ok(Step::Continue)
        }

        Breadcrumb::Skip { key } => {
            // the key here ...
            if let Value::Object(map) = node {
                for (k, child) in map {
                    let step = match_key(ctx, key, k, sol, &mut |sol2| {
                        ctx.push(PathSeg::Key(k.clone()));
                        let step = navigate(ctx, rest, child, &sol2, emit);
                        ctx.pop();
                        step
                    })?;
                    if step == Step::Stop {
                        return Ok(Step::Stop);
                    }
                }
            }
            // ... or in any container below
            let children: Vec<(PathSeg, &Value)> = match node {
                Value::Object(map) => map
                    .iter()
                    .filter(|(_, v)| v.is_object() || v.is_array())
                    .map(|(k, v)| (PathSeg::Key(k.clone()), v))
                    .collect(),
                Value::Array(items) => items
                    .iter()
                    .enumerate()
                    .filter(|(_, v)| v.is_object() || v.is_array())
                    .map(|(i, v)| (PathSeg::Index(i), v))
                    .collect(),
                _ => Vec::new(),
            };
            for (seg, child) in children {
                ctx.push(seg);
                let step = navigate(ctx, crumbs, child, sol, emit);
                ctx.pop();
                if step? == Step::Stop {
                    return Ok(Step::Stop);
                }
            }
            Ok(Step::Continue)
        }
    }
}

fn crumbs_have_bindings(crumbs: &[Breadcrumb]) -> bool {
    crumbs.iter().any(|c| match c {
        Breadcrumb::Dot { key } => key.has_bindings,
        Breadcrumb::Bracket { index } => index.has_bindings,
        Breadcrumb::Skip { key } => key.has_bindings,
    })
}

fn terms_have_bindings(terms: &[Term]) -> bool {
    terms.iter().any(|t| match t {
        Term::KeyValue(kv) => {
            kv.key.has_bindings || kv.value.has_bindings || crumbs_have_bindings(&kv.breadcrumbs)
        }
        Term::Group(g) => terms_have_bindings(&g.terms),
        Term::Look(l) => terms_have_bindings(&l.terms),
        Term::GroupBind(_) => true,
        Term::Spread(_) => false,
    })
}
