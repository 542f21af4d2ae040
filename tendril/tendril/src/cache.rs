//! A fixed-capacity LRU of compiled patterns, keyed by source text. Hits
//! move to the front; inserts evict the oldest entry.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, OnceLock};

use crate::CompiledPattern;

const CAPACITY: usize = 256;

pub(crate) struct Lru {
    map: HashMap<String, Arc<CompiledPattern>>,
    order: VecDeque<String>,
}

impl Lru {
    fn new() -> Self {
        Lru {
            map: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub(crate) fn get(&mut self, source: &str) -> Option<Arc<CompiledPattern>> {
        let hit = self.map.get(source).cloned()?;
        if let Some(pos) = self.order.iter().position(|s| s == source) {
            self.order.remove(pos);
        }
        self.order.push_front(source.to_string());
        Some(hit)
    }

    pub(crate) fn insert(&mut self, source: String, pattern: Arc<CompiledPattern>) {
        if self.map.insert(source.clone(), pattern).is_none() {
            self.order.push_front(source);
            while self.order.len() > CAPACITY {
                if let Some(evicted) = self.order.pop_back() {
                    self.map.remove(&evicted);
                }
            }
        }
    }
}

pub(crate) fn with_cache<T>(f: impl FnOnce(&mut Lru) -> T) -> Option<T> {
    static CACHE: OnceLock<Mutex<Lru>> = OnceLock::new();
    let cache = CACHE.get_or_init(|| Mutex::new(Lru::new()));
    // a poisoned cache only loses memoization
    let mut guard = cache.lock().ok()?;
    Some(f(&mut guard))
}
