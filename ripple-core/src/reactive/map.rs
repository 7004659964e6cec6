//! Reactive Map
//!
//! A keyed store with one dependency cell per key, so an effect that reads
//! `map.get(&"a")` re-runs when `"a"` changes and not when `"b"` does.
//!
//! A separate structure cell covers whole-map reads (`len`, `keys`,
//! `entries`, ...). It is notified on every change, since any change alters
//! what an iteration sees.
//!
//! Cells for keys are created on the first tracked read, even for keys not
//! yet present, so that a later insert reaches the computations that looked
//! for them. Untracked reads never create a cell, and cells left without
//! subscribers are dropped when their key is removed or the map is cleared.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use indexmap::IndexMap;
use parking_lot::RwLock;

use super::context::ReactiveContext;
use super::dep::Dep;

/// A map whose reads are tracked per key.
///
/// Writes notify only when they change something. Cloning a `ReactiveMap`
/// yields another handle to the same map.
pub struct ReactiveMap<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + PartialEq + Send + Sync + 'static,
{
    entries: Arc<RwLock<IndexMap<K, V>>>,
    key_deps: Arc<DashMap<K, Dep>>,
    structure: Dep,
}

impl<K, V> ReactiveMap<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create an empty map.
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(IndexMap::new())),
            key_deps: Arc::new(DashMap::new()),
            structure: Dep::new(),
        }
    }

    fn key_dep(&self, key: &K) -> Dep {
        self.key_deps.entry(key.clone()).or_default().value().clone()
    }

    fn existing_key_dep(&self, key: &K) -> Option<Dep> {
        self.key_deps.get(key).map(|dep| dep.value().clone())
    }

    fn track_key(&self, key: &K) {
        if ReactiveContext::should_track() {
            self.key_dep(key).depend();
        }
    }

    fn prune_unwatched(&self) {
        self.key_deps.retain(|_, dep| dep.subscriber_count() > 0);
    }

    fn notify_key(&self, key: &K) {
        if let Some(dep) = self.existing_key_dep(key) {
            dep.notify();
        }
    }

    /// Get the value for `key`, tracking that key.
    pub fn get(&self, key: &K) -> Option<V> {
        self.track_key(key);
        self.entries.read().get(key).cloned()
    }

    /// Get the value for `key` without tracking.
    pub fn get_untracked(&self, key: &K) -> Option<V> {
        self.entries.read().get(key).cloned()
    }

    /// Check whether `key` is present, tracking that key.
    pub fn contains_key(&self, key: &K) -> bool {
        self.track_key(key);
        self.entries.read().contains_key(key)
    }

    /// Insert a value, returning the previous one.
    ///
    /// Notifies the key's readers and whole-map readers unless the stored
    /// value is unchanged.
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        let previous = {
            let mut entries = self.entries.write();
            if entries.get(&key) == Some(&value) {
                return Some(value);
            }
            entries.insert(key.clone(), value)
        };

        self.notify_key(&key);
        self.structure.notify();
        previous
    }

    /// Remove `key`, returning its value if it was present.
    pub fn remove(&self, key: &K) -> Option<V> {
        let removed = self.entries.write().shift_remove(key)?;

        self.notify_key(key);
        self.structure.notify();

        // Nobody is waiting for this key to come back.
        self.key_deps
            .remove_if(key, |_, dep| dep.subscriber_count() == 0);
        Some(removed)
    }

    /// Remove every entry.
    pub fn clear(&self) {
        let keys: Vec<K> = {
            let mut entries = self.entries.write();
            if entries.is_empty() {
                return;
            }
            entries.drain(..).map(|(key, _)| key).collect()
        };

        for key in &keys {
            self.notify_key(key);
        }
        self.structure.notify();
        self.prune_unwatched();
    }

    /// Get the number of entries, tracking the map's structure.
    pub fn len(&self) -> usize {
        self.structure.depend();
        self.entries.read().len()
    }

    /// Check whether the map is empty, tracking the map's structure.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the keys in insertion order, tracking the map's structure.
    pub fn keys(&self) -> Vec<K> {
        self.structure.depend();
        self.entries.read().keys().cloned().collect()
    }

    /// Get the values in insertion order, tracking the map's structure.
    pub fn values(&self) -> Vec<V> {
        self.structure.depend();
        self.entries.read().values().cloned().collect()
    }

    /// Get the entries in insertion order, tracking the map's structure.
    pub fn entries(&self) -> Vec<(K, V)> {
        self.structure.depend();
        self.entries
            .read()
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

impl<K, V> Default for ReactiveMap<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + PartialEq + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Clone for ReactiveMap<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + PartialEq + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            key_deps: Arc::clone(&self.key_deps),
            structure: self.structure.clone(),
        }
    }
}

impl<K, V> fmt::Debug for ReactiveMap<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + fmt::Debug + 'static,
    V: Clone + PartialEq + Send + Sync + fmt::Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries.read().iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Effect;

    #[test]
    fn reads_are_tracked_per_key() {
        let map = ReactiveMap::new();
        map.insert("a", 1);
        map.insert("b", 2);

        let reader = map.clone();
        let effect = Effect::new(move || {
            reader.get(&"a");
        });

        map.insert("b", 20);
        assert_eq!(effect.run_count(), 1);

        map.insert("a", 10);
        assert_eq!(effect.run_count(), 2);
    }

    #[test]
    fn unchanged_insert_does_not_notify() {
        let map = ReactiveMap::new();
        map.insert("a", 1);

        let reader = map.clone();
        let effect = Effect::new(move || {
            reader.get(&"a");
            reader.len();
        });

        assert_eq!(map.insert("a", 1), Some(1));
        assert_eq!(effect.run_count(), 1);
    }

    #[test]
    fn missing_key_reader_sees_insert() {
        let map: ReactiveMap<&str, i32> = ReactiveMap::new();

        let reader = map.clone();
        let effect = Effect::new(move || {
            reader.contains_key(&"later");
        });

        map.insert("later", 1);
        assert_eq!(effect.run_count(), 2);
    }

    #[test]
    fn structure_readers_see_add_and_remove() {
        let map = ReactiveMap::new();

        let reader = map.clone();
        let effect = Effect::new(move || {
            reader.keys();
        });

        map.insert(1, "one");
        assert_eq!(effect.run_count(), 2);

        map.remove(&1);
        assert_eq!(effect.run_count(), 3);

        // Removing an absent key changes nothing
        map.remove(&1);
        assert_eq!(effect.run_count(), 3);
    }

    #[test]
    fn clear_notifies_each_key() {
        let map = ReactiveMap::new();
        map.insert("a", 1);
        map.insert("b", 2);

        let reader = map.clone();
        let effect = Effect::new(move || {
            reader.get(&"b");
        });

        map.clear();
        assert_eq!(effect.run_count(), 2);
        assert!(map.is_empty());
        assert_eq!(map.get_untracked(&"b"), None);
    }

    #[test]
    fn untracked_reads_create_no_cells() {
        let map: ReactiveMap<u32, u32> = ReactiveMap::new();
        for key in 0..1_000 {
            assert_eq!(map.get(&key), None);
            assert!(!map.contains_key(&key));
        }
        assert_eq!(map.key_deps.len(), 0);

        map.insert(7, 70);
        map.clear();
        assert_eq!(map.key_deps.len(), 0);
    }

    #[test]
    fn clear_keeps_cells_that_are_still_watched() {
        let map = ReactiveMap::new();
        map.insert("watched", 1);
        map.insert("other", 2);

        let reader = map.clone();
        let effect = Effect::new(move || {
            reader.get(&"watched");
        });

        let reader = map.clone();
        let transient = Effect::new(move || {
            reader.get(&"other");
        });
        transient.stop();
        assert_eq!(map.key_deps.len(), 2);

        map.clear();
        assert_eq!(map.key_deps.len(), 1);

        map.insert("watched", 3);
        assert_eq!(effect.run_count(), 3);
    }

    #[test]
    fn entries_keep_insertion_order() {
        let map = ReactiveMap::new();
        map.insert("z", 1);
        map.insert("a", 2);
        map.insert("m", 3);

        assert_eq!(map.entries(), vec![("z", 1), ("a", 2), ("m", 3)]);
        assert_eq!(map.values(), vec![1, 2, 3]);
    }
}
