use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use tendril_parser::parser::pr::{BucketKind, GuardExpr};

use crate::engine::guard::eval_guard;
use crate::value::{deep_eq, Path};

/// The value a variable is bound to. A name keeps its kind for the lifetime
/// of a solution; rebinding must unify.
#[derive(Debug, Clone, PartialEq, enum_as_inner::EnumAsInner)]
pub enum Binding {
    Scalar(Value),
    /// A contiguous array slice
    Slice(Vec<Value>),
    /// An ordered subset of an object's entries
    Submap(Vec<(String, Value)>),
}

impl Binding {
    /// The binding as a plain value: group bindings become plain arrays and
    /// objects.
    pub fn to_value(&self) -> Value {
        match self {
            Binding::Scalar(v) => v.clone(),
            Binding::Slice(vs) => Value::Array(vs.clone()),
            Binding::Submap(entries) => {
                Value::Object(entries.iter().cloned().collect())
            }
        }
    }

    fn unifies(&self, other: &Binding) -> bool {
        match (self, other) {
            (Binding::Scalar(a), Binding::Scalar(b)) => deep_eq(a, b),
            (Binding::Slice(a), Binding::Slice(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| deep_eq(x, y))
            }
            (Binding::Submap(a), Binding::Submap(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b)
                        .all(|((ka, va), (kb, vb))| ka == kb && deep_eq(va, vb))
            }
            _ => false,
        }
    }
}

/// Where a binding's value was found in the input. The recorded snapshot
/// backs the compare-and-swap check at edit time.
#[derive(Debug, Clone, PartialEq)]
pub enum Site {
    /// A single node
    Scalar { path: Path, recorded: Value },
    /// A contiguous array slice; `path` addresses the containing array
    Slice {
        path: Path,
        start: usize,
        end: usize,
        recorded: Vec<Value>,
    },
    /// A subset of an object's keys; `path` addresses the containing object
    Keys {
        path: Path,
        keys: Vec<String>,
        recorded: Vec<(String, Value)>,
    },
    /// An object key itself (a key binding); edits rename the key
    Key { path: Path, key: String },
}

impl Site {
    /// The containing path: the parent for scalar sites, the container
    /// itself for group and key sites.
    pub fn container(&self) -> &[crate::value::PathSeg] {
        match self {
            Site::Scalar { path, .. } => {
                if path.is_empty() {
                    path
                } else {
                    &path[..path.len() - 1]
                }
            }
            Site::Slice { path, .. } | Site::Keys { path, .. } | Site::Key { path, .. } => path,
        }
    }

    /// A stable identity for site deduplication, independent of the
    /// recorded snapshot.
    pub fn identity(&self) -> String {
        match self {
            Site::Scalar { path, .. } => format!("s:{}", path_key(path)),
            Site::Slice {
                path, start, end, ..
            } => format!("a:{}:{start}-{end}", path_key(path)),
            Site::Keys { path, keys, .. } => format!("o:{}:{}", path_key(path), keys.join("\u{0}")),
            Site::Key { path, key } => format!("k:{}:{key}", path_key(path)),
        }
    }
}

pub(crate) fn path_key(path: &[crate::value::PathSeg]) -> String {
    serde_json::to_string(path).expect("paths are serializable")
}

/// A guard waiting for the rest of its variables.
#[derive(Debug, Clone)]
pub struct PendingGuard {
    pub expr: Arc<GuardExpr>,
    pub free: Vec<String>,
    /// The node that was current when the guard was attached, for `_`.
    pub current: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct Bucket {
    pub kind: BucketKind,
    /// (key, value) for object buckets; key is None for array buckets.
    pub entries: Vec<(Option<String>, Value)>,
    pub sites: Vec<Site>,
}

/// One labeled scope's aggregation state.
#[derive(Debug, Clone)]
pub struct BucketLevel {
    pub label: String,
    /// The object key currently being iterated, for keyed flow entries.
    pub current_key: Option<String>,
    pub buckets: BTreeMap<String, Bucket>,
}

/// One way the pattern matches: bindings, where they were found, and the
/// aggregation state still in flight. Solutions are cloned at every branch
/// point and never shared.
#[derive(Debug, Clone, Default)]
pub struct Solution {
    pub(crate) env: BTreeMap<String, Binding>,
    pub(crate) sites: BTreeMap<String, Vec<Site>>,
    pub(crate) guards: Vec<PendingGuard>,
    pub(crate) buckets: Vec<BucketLevel>,
}

/// The hidden whole-match binding.
pub const WHOLE_MATCH: &str = "0";

impl Solution {
    /// Bind `name` to a value, unifying with any existing binding. Returns
    /// false when the branch must be abandoned: the binding conflicts or a
    /// guard closed false.
    pub(crate) fn bind(&mut self, name: &str, binding: Binding, site: Option<Site>) -> bool {
        match self.env.get(name) {
            Some(existing) if !existing.unifies(&binding) => return false,
            Some(_) => {}
            None => {
                self.env.insert(name.to_string(), binding);
            }
        }
        if let Some(site) = site {
            self.sites.entry(name.to_string()).or_default().push(site);
        }
        self.close_guards()
    }

    pub(crate) fn attach_guard(
        &mut self,
        guard: &GuardExpr,
        current: Option<&Value>,
    ) -> bool {
        self.guards.push(PendingGuard {
            expr: Arc::new(guard.clone()),
            free: guard.free_vars(),
            current: current.cloned(),
        });
        self.close_guards()
    }

    /// Evaluate every guard whose variables are all bound; false means some
    /// guard failed and the branch dies.
    fn close_guards(&mut self) -> bool {
        let mut i = 0;
        while i < self.guards.len() {
            let closed = self.guards[i]
                .free
                .iter()
                .all(|name| self.env.contains_key(name));
            if closed {
                let guard = self.guards.swap_remove(i);
                if !eval_guard(&guard.expr, &self.env, guard.current.as_ref()) {
                    return false;
                }
            } else {
                i += 1;
            }
        }
        true
    }

    /// Whether the solution can be yielded: no guard may still be waiting.
    pub(crate) fn is_complete(&self) -> bool {
        self.guards.is_empty()
    }

    pub(crate) fn binding(&self, name: &str) -> Option<&Binding> {
        self.env.get(name)
    }

    /// The bindings as plain values, without the whole-match entry.
    pub fn bindings(&self) -> BTreeMap<String, Value> {
        self.env
            .iter()
            .filter(|(name, _)| name.as_str() != WHOLE_MATCH)
            .map(|(name, b)| (name.clone(), b.to_value()))
            .collect()
    }

    /// The bindings as plain values, including the whole-match entry.
    pub fn bindings_with_match(&self) -> BTreeMap<String, Value> {
        self.env
            .iter()
            .map(|(name, b)| (name.clone(), b.to_value()))
            .collect()
    }

    pub fn value_of(&self, name: &str) -> Option<Value> {
        self.env.get(name).map(Binding::to_value)
    }

    pub fn sites(&self) -> &BTreeMap<String, Vec<Site>> {
        &self.sites
    }

    pub fn sites_of(&self, name: &str) -> &[Site] {
        self.sites.get(name).map(Vec::as_slice).unwrap_or(&[])
    }
}
