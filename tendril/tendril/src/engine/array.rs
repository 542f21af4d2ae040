//! Array matching: items consume elements left to right, spreads and
//! quantifiers branch over consumption counts, and the tail is anchored
//! unless a bare trailing spread opens it.

use serde_json::Value;

use tendril_parser::parser::pr::{Pattern, PatternKind, QuantMode, QuantPattern};

use crate::engine::solution::{Binding, Site, Solution};
use crate::engine::{bind_scalar, match_item, unwrap_parens, EmitResult, EvalCtx, Step};
use crate::value::PathSeg;

type EmitEnd<'e> = dyn FnMut(usize, Solution) -> EmitResult + 'e;

pub(super) fn match_array(
    ctx: &EvalCtx,
    items: &[Pattern],
    arr: &[Value],
    sol: &Solution,
    emit: &mut dyn FnMut(Solution) -> EmitResult,
) -> EmitResult {
    // A bare trailing spread wildcards the tail; everything else anchors it.
    let (items, anchored) = match items.last().map(|p| &p.kind) {
        Some(PatternKind::Spread(None)) => (&items[..items.len() - 1], false),
        _ => (items, true),
    };

    match_fragment(ctx, items, arr, 0, sol, &mut |end, sol2| {
        if !anchored || end == arr.len() {
            emit(sol2)
        } else {
            Ok(Step::Continue)
        }
    })
}

/// Match `items` against `arr` starting at `idx`, reporting every reachable
/// end index with its solution.
pub(super) fn match_fragment(
    ctx: &EvalCtx,
    items: &[Pattern],
    arr: &[Value],
    idx: usize,
    sol: &Solution,
    emit_end: &mut EmitEnd,
) -> EmitResult {
    ctx.step()?;
    let Some((first, rest)) = items.split_first() else {
        return emit_end(idx, sol.clone());
    };

    match &first.kind {
        // transparent in the item stream
        PatternKind::Paren(sub) => {
            let sub = std::slice::from_ref(sub.as_ref());
            match_fragment(ctx, sub, arr, idx, sol, &mut |end, sol2| {
                match_fragment(ctx, rest, arr, end, &sol2, emit_end)
            })
        }
        PatternKind::Seq(sub_items) => {
            match_fragment(ctx, sub_items, arr, idx, sol, &mut |end, sol2| {
                match_fragment(ctx, rest, arr, end, &sol2, emit_end)
            })
        }

        PatternKind::Spread(quant) => {
            let rem = arr.len() - idx;
            let min = quant.map_or(0, |q| q.min);
            let max = quant.and_then(|q| q.max).unwrap_or(rem).min(rem);
            // non-consuming, shortest first
            for k in min..=max {
                let step = match_fragment(ctx, rest, arr, idx + k, sol, emit_end)?;
                if step == Step::Stop {
                    return Ok(Step::Stop);
                }
            }
            Ok(Step::Continue)
        }

        PatternKind::Quant(qp) => quant_fragment(ctx, qp, rest, arr, idx, sol, emit_end),

        PatternKind::GroupBind(gb) => {
            match_one_fragment(ctx, &gb.sub, arr, idx, sol, &mut |end, sol2| {
                let values: Vec<Value> = arr[idx..end].to_vec();
                let site = Site::Slice {
                    path: ctx.path(),
                    start: idx,
                    end,
                    recorded: values.clone(),
                };
                let mut sol3 = sol2;
                if !sol3.bind(&gb.name, Binding::Slice(values), Some(site)) {
                    return Ok(Step::Continue);
                }
                match_fragment(ctx, rest, arr, end, &sol3, emit_end)
            })
        }

        // a scalar binding over a sequence only matches a one-element run
        PatternKind::SBind(b) if unwrap_parens(&b.sub).kind.is_seq() => {
            match_one_fragment(ctx, &b.sub, arr, idx, sol, &mut |end, sol2| {
                if end != idx + 1 {
                    return Ok(Step::Continue);
                }
                ctx.push(PathSeg::Index(idx));
                let bound = bind_scalar(ctx, b, &arr[idx], sol2);
                ctx.pop();
                match bound {
                    Some(sol3) => match_fragment(ctx, rest, arr, end, &sol3, emit_end),
                    None => Ok(Step::Continue),
                }
            })
        }

        PatternKind::Alt(alt) => {
            for a in &alt.alts {
                let mut emitted = false;
                let step = match_one_fragment(ctx, a, arr, idx, sol, &mut |end, sol2| {
                    emitted = true;
                    match_fragment(ctx, rest, arr, end, &sol2, emit_end)
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

        PatternKind::Look(look) => {
            // zero-width against the remaining slice, unanchored at the tail
            if look.negative {
                if fragment_exists(ctx, &look.sub, arr, idx, sol)? {
                    Ok(Step::Continue)
                } else {
                    match_fragment(ctx, rest, arr, idx, sol, emit_end)
                }
            } else if look.sub.has_bindings {
                match_one_fragment(ctx, &look.sub, arr, idx, sol, &mut |_end, sol2| {
                    match_fragment(ctx, rest, arr, idx, &sol2, emit_end)
                })
            } else if fragment_exists(ctx, &look.sub, arr, idx, sol)? {
                match_fragment(ctx, rest, arr, idx, sol, emit_end)
            } else {
                Ok(Step::Continue)
            }
        }

        // anything else consumes exactly one element
        _ => {
            if idx >= arr.len() {
                return Ok(Step::Continue);
            }
            ctx.push(PathSeg::Index(idx));
            let result = match_item(ctx, first, &arr[idx], sol, &mut |sol2| {
                // the rest of the items run against sibling positions
                let seg = ctx.pop();
                let step = match_fragment(ctx, rest, arr, idx + 1, &sol2, emit_end);
                ctx.push(seg);
                step
            });
            ctx.pop();
            result
        }
    }
}

fn match_one_fragment(
    ctx: &EvalCtx,
    pat: &Pattern,
    arr: &[Value],
    idx: usize,
    sol: &Solution,
    emit_end: &mut EmitEnd,
) -> EmitResult {
    match_fragment(ctx, std::slice::from_ref(pat), arr, idx, sol, emit_end)
}

fn fragment_exists(
    ctx: &EvalCtx,
    pat: &Pattern,
    arr: &[Value],
    idx: usize,
    sol: &Solution,
) -> Result<bool, crate::error_message::EvalError> {
    let mut found = false;
    match_one_fragment(ctx, pat, arr, idx, sol, &mut |_, _| {
        found = true;
        Ok(Step::Stop)
    })?;
    Ok(found)
}

/// Consume consecutive repetitions of the quantified pattern. The frontier
/// expands one repetition at a time, so deeply repeated matches never
/// deepen the stack.
fn quant_fragment(
    ctx: &EvalCtx,
    qp: &QuantPattern,
    rest: &[Pattern],
    arr: &[Value],
    idx: usize,
    sol: &Solution,
    emit_end: &mut EmitEnd,
) -> EmitResult {
    let max = qp.quant.max.unwrap_or(usize::MAX);

    let mut by_count: Vec<Vec<(usize, Solution)>> = vec![vec![(idx, sol.clone())]];
    loop {
        let count = by_count.len() - 1;
        if count >= max {
            break;
        }
        let frontier = by_count.last().expect("seeded with count zero");
        let mut next = Vec::new();
        for (i, s) in frontier {
            ctx.step()?;
            match_one_fragment(ctx, &qp.sub, arr, *i, s, &mut |end, sol2| {
                // a repetition must consume something, or counts diverge
                if end > *i {
                    next.push((end, sol2));
                }
                Ok(Step::Continue)
            })?;
        }
        if next.is_empty() {
            break;
        }
        by_count.push(next);
    }

    let reached = by_count.len() - 1;
    let min = qp.quant.min;
    let counts: Vec<usize> = match qp.quant.mode {
        // longest first
        QuantMode::Greedy => (min..=reached).rev().collect(),
        // shortest first
        QuantMode::Lazy => (min..=reached).collect(),
        // the maximum reachable count, or nothing
        QuantMode::Possessive => {
            if reached >= min {
                vec![reached]
            } else {
                vec![]
            }
        }
    };

    for count in counts {
        for (end, s) in &by_count[count] {
            let step = match_fragment(ctx, rest, arr, *end, s, emit_end)?;
            if step == Step::Stop {
                return Ok(Step::Stop);
            }
        }
    }
    Ok(Step::Continue)
}
