//! Turning solutions into new values. Sites recorded during matching are
//! re-checked against the current value (a deep-equal compare-and-swap)
//! before each edit lands; misses are reported, never thrown.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::Rc;

use serde_json::Value;

use crate::engine::solution::{path_key, Site, Solution};
use crate::value::{deep_eq, slices_eq, value_at_mut};

/// One planned replacement at one site.
#[derive(Debug, Clone)]
pub struct Edit {
    pub site: Site,
    pub replacement: Value,
}

/// What to write into each variable's sites. The closure form re-plans per
/// solution.
pub enum EditPlan<'a> {
    Values(BTreeMap<String, Value>),
    PerSolution(&'a dyn Fn(&Solution) -> BTreeMap<String, Value>),
}

impl EditPlan<'_> {
    pub fn value<S: Into<String>>(name: S, replacement: Value) -> Self {
        let mut values = BTreeMap::new();
        values.insert(name.into(), replacement);
        EditPlan::Values(values)
    }

    fn resolve(&self, sol: &Solution) -> BTreeMap<String, Value> {
        match self {
            EditPlan::Values(values) => values.clone(),
            EditPlan::PerSolution(f) => f(sol),
        }
    }
}

/// Whether edits deduplicate across solutions by site identity, or land
/// once per occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum Per {
    Site,
    Occurrence,
}

/// Two solutions planned unequal values for the same site; neither lands.
#[derive(Debug, Clone)]
pub struct Conflict {
    pub site: Site,
    pub existing: Value,
    pub incoming: Value,
}

#[derive(Debug)]
pub struct CollectOutcome {
    pub edits: Vec<Edit>,
    pub conflicts: Vec<Conflict>,
}

/// Plan edits for every bound site across the given solutions. Variable
/// names in the plan may carry their source sigil (`$x`, `@xs`); it is
/// stripped.
pub fn collect_edits(solutions: &[Solution], plan: &EditPlan, per: Per) -> CollectOutcome {
    let mut edits: Vec<Edit> = Vec::new();
    let mut by_identity: HashMap<String, usize> = HashMap::new();
    let mut conflicted: HashSet<String> = HashSet::new();
    let mut conflicts = Vec::new();

    for sol in solutions {
        for (name, replacement) in plan.resolve(sol) {
            let name = name.trim_start_matches(['$', '@', '%']);
            for site in sol.sites_of(name) {
                match per {
                    Per::Occurrence => edits.push(Edit {
                        site: site.clone(),
                        replacement: replacement.clone(),
                    }),
                    Per::Site => {
                        let id = site.identity();
                        if let Some(&i) = by_identity.get(&id) {
                            if !deep_eq(&edits[i].replacement, &replacement) {
                                conflicts.push(Conflict {
                                    site: site.clone(),
                                    existing: edits[i].replacement.clone(),
                                    incoming: replacement.clone(),
                                });
                                conflicted.insert(id);
                            }
                        } else {
                            by_identity.insert(id, edits.len());
                            edits.push(Edit {
                                site: site.clone(),
                                replacement: replacement.clone(),
                            });
                        }
                    }
                }
            }
        }
    }

    if !conflicted.is_empty() {
        edits.retain(|e| !conflicted.contains(&e.site.identity()));
    }

    CollectOutcome { edits, conflicts }
}

/// A compare-and-swap miss or a structurally impossible edit.
#[derive(Debug, Clone)]
pub struct EditFailure {
    pub site: Site,
    pub reason: String,
}

/// What to do when a site's current value no longer matches the recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum CasDecision {
    Skip,
    Force,
}

#[derive(Clone, Default)]
pub struct EditOptions {
    /// Consulted on every compare-and-swap miss; the default skips the
    /// edit and records a failure.
    pub on_cas_failure: Option<Rc<dyn Fn(&Site) -> CasDecision>>,
}

impl std::fmt::Debug for EditOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditOptions")
            .field("on_cas_failure", &self.on_cas_failure.is_some())
            .finish()
    }
}

#[derive(Debug)]
pub struct ApplyOutcome {
    pub result: Value,
    pub failures: Vec<EditFailure>,
}

/// Apply edits to a clone of the input, leaving the input untouched.
pub fn apply_edits(root: &Value, edits: &[Edit], opts: &EditOptions) -> ApplyOutcome {
    let mut result = root.clone();
    let failures = apply_edits_in_place(&mut result, edits, opts);
    ApplyOutcome { result, failures }
}

/// Apply edits to the value itself. Callers own the consequences of
/// observing the mutation mid-way.
pub fn apply_edits_in_place(
    root: &mut Value,
    edits: &[Edit],
    opts: &EditOptions,
) -> Vec<EditFailure> {
    let mut failures = Vec::new();

    // group by containing path, so array splices can share one offset walk
    let mut groups: BTreeMap<String, Vec<&Edit>> = BTreeMap::new();
    for edit in edits {
        groups
            .entry(path_key(edit.site.container()))
            .or_default()
            .push(edit);
    }

    for group in groups.values() {
        let mut scalars = Vec::new();
        let mut splices = Vec::new();
        let mut key_sets = Vec::new();
        let mut renames = Vec::new();
        for edit in group {
            match &edit.site {
                Site::Scalar { .. } => scalars.push(*edit),
                Site::Slice { .. } => splices.push(*edit),
                Site::Keys { .. } => key_sets.push(*edit),
                Site::Key { .. } => renames.push(*edit),
            }
        }

        for edit in scalars {
            apply_scalar(root, edit, opts, &mut failures);
        }
        apply_splices(root, splices, opts, &mut failures);
        for edit in key_sets {
            apply_key_set(root, edit, opts, &mut failures);
        }
        for edit in renames {
            apply_rename(root, edit, opts, &mut failures);
        }
    }

    failures
}

fn decide(opts: &EditOptions, site: &Site) -> CasDecision {
    match &opts.on_cas_failure {
        Some(f) => f(site),
        None => CasDecision::Skip,
    }
}

fn fail(failures: &mut Vec<EditFailure>, site: &Site, reason: &str) {
    failures.push(EditFailure {
        site: site.clone(),
        reason: reason.to_string(),
    });
}

fn apply_scalar(
    root: &mut Value,
    edit: &Edit,
    opts: &EditOptions,
    failures: &mut Vec<EditFailure>,
) {
    let Site::Scalar { path, recorded } = &edit.site else {
        unreachable!("scalar edits carry scalar sites");
    };
    let Some(target) = value_at_mut(root, path) else {
        fail(failures, &edit.site, "site no longer exists");
        return;
    };
    if !deep_eq(target, recorded) && decide(opts, &edit.site) == CasDecision::Skip {
        fail(failures, &edit.site, "current value differs from the recording");
        return;
    }
    // a replacement value is used literally, arrays included
    *target = edit.replacement.clone();
}

fn apply_splices(
    root: &mut Value,
    mut splices: Vec<&Edit>,
    opts: &EditOptions,
    failures: &mut Vec<EditFailure>,
) {
    if splices.is_empty() {
        return;
    }
    splices.sort_by_key(|e| match &e.site {
        Site::Slice { start, .. } => *start,
        _ => 0,
    });

    let mut offset: isize = 0;
    for edit in splices {
        let Site::Slice {
            path,
            start,
            end,
            recorded,
        } = &edit.site
        else {
            unreachable!("splice edits carry slice sites");
        };
        let Some(Value::Array(items)) = value_at_mut(root, path) else {
            fail(failures, &edit.site, "containing array no longer exists");
            continue;
        };

        let start = start.saturating_add_signed(offset);
        let end = end.saturating_add_signed(offset);
        let in_bounds = start <= end && end <= items.len();
        let cas_ok = in_bounds && slices_eq(&items[start..end], recorded);
        if !cas_ok {
            if decide(opts, &edit.site) == CasDecision::Skip {
                fail(failures, &edit.site, "current slice differs from the recording");
                continue;
            }
            if !in_bounds {
                fail(failures, &edit.site, "slice is out of bounds");
                continue;
            }
        }

        // a plain array spreads into the slice; anything else is a
        // one-element splice
        let replacement: Vec<Value> = match &edit.replacement {
            Value::Array(values) => values.clone(),
            other => vec![other.clone()],
        };
        let new_len = replacement.len();
        items.splice(start..end, replacement);
        offset += new_len as isize - (end - start) as isize;
    }
}

fn apply_key_set(
    root: &mut Value,
    edit: &Edit,
    opts: &EditOptions,
    failures: &mut Vec<EditFailure>,
) {
    let Site::Keys {
        path,
        keys,
        recorded,
    } = &edit.site
    else {
        unreachable!("key-set edits carry keys sites");
    };
    let Some(Value::Object(map)) = value_at_mut(root, path) else {
        fail(failures, &edit.site, "containing object no longer exists");
        return;
    };

    let cas_ok = recorded
        .iter()
        .all(|(k, v)| map.get(k).is_some_and(|cur| deep_eq(cur, v)));
    if !cas_ok && decide(opts, &edit.site) == CasDecision::Skip {
        fail(failures, &edit.site, "current entries differ from the recording");
        return;
    }

    let Value::Object(replacement) = &edit.replacement else {
        fail(failures, &edit.site, "replacement for a key group must be an object");
        return;
    };

    for k in keys {
        map.remove(k);
    }
    for (k, v) in replacement {
        map.insert(k.clone(), v.clone());
    }
}

fn apply_rename(
    root: &mut Value,
    edit: &Edit,
    opts: &EditOptions,
    failures: &mut Vec<EditFailure>,
) {
    let Site::Key { path, key } = &edit.site else {
        unreachable!("renames carry key sites");
    };
    let Some(Value::Object(map)) = value_at_mut(root, path) else {
        fail(failures, &edit.site, "containing object no longer exists");
        return;
    };
    if !map.contains_key(key) && decide(opts, &edit.site) == CasDecision::Skip {
        fail(failures, &edit.site, "key no longer exists");
        return;
    }
    let Value::String(new_key) = &edit.replacement else {
        fail(failures, &edit.site, "replacement for a key must be a string");
        return;
    };
    if new_key != key && map.contains_key(new_key) {
        fail(failures, &edit.site, "renamed key already exists");
        return;
    }

    // rebuild to keep the entry in place
    let entries: Vec<(String, Value)> = map
        .iter()
        .map(|(k, v)| {
            let k = if k == key { new_key.clone() } else { k.clone() };
            (k, v.clone())
        })
        .collect();
    map.clear();
    for (k, v) in entries {
        map.insert(k, v);
    }
}
