//! Per-key mutual exclusion for cascades and application creation
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

#[derive(Default)]
pub struct KeyedLocks {
    slots: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` holding every lock in `keys`. Keys are taken in sorted order so
    /// overlapping callers cannot deadlock. Not re-entrant.
    pub fn run<R>(&self, keys: &[String], f: impl FnOnce() -> R) -> R {
        let mut sorted = keys.to_vec();
        sorted.sort();
        sorted.dedup();

        let slots: Vec<Arc<Mutex<()>>> = {
            let mut map = self.slots.lock();
            sorted
                .iter()
                .map(|key| map.entry(key.clone()).or_default().clone())
                .collect()
        };
        let _guards: Vec<_> = slots.iter().map(|slot| slot.lock()).collect();
        f()
    }
}
