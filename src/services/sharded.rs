//! String-keyed map split across independently locked shards.
//!
//! Each key lives in exactly one shard, so an update closure runs with
//! exclusive access to that key while unrelated keys proceed in parallel.

use std::collections::HashMap;
use std::hash::{BuildHasher, RandomState};

use parking_lot::Mutex;

const DEFAULT_SHARDS: usize = 16;

pub struct ShardedMap<V> {
    shards: Box<[Mutex<HashMap<String, V>>]>,
    hasher: RandomState,
}

impl<V> Default for ShardedMap<V> {
    fn default() -> Self {
        Self::new(DEFAULT_SHARDS)
    }
}

impl<V> ShardedMap<V> {
    #[must_use]
    pub fn new(shards: usize) -> Self {
        let shards = (0..shards.max(1))
            .map(|_| Mutex::new(HashMap::new()))
            .collect();
        Self {
            shards,
            hasher: RandomState::new(),
        }
    }

    fn shard(&self, key: &str) -> &Mutex<HashMap<String, V>> {
        let idx = self.hasher.hash_one(key) as usize % self.shards.len();
        &self.shards[idx]
    }

    /// Runs `f` on the slot for `key` under the shard lock. Leaving the slot
    /// `None` removes the key.
    pub fn update<R>(&self, key: &str, f: impl FnOnce(&mut Option<V>) -> R) -> R {
        let mut shard = self.shard(key).lock();
        let mut slot = shard.remove(key);
        let out = f(&mut slot);
        if let Some(value) = slot {
            shard.insert(key.to_string(), value);
        }
        out
    }

    pub fn remove(&self, key: &str) -> Option<V> {
        self.shard(key).lock().remove(key)
    }

    /// Keeps entries for which `keep` returns true and returns how many
    /// were dropped. Shards are locked one at a time.
    pub fn retain(&self, mut keep: impl FnMut(&V) -> bool) -> usize {
        let mut removed = 0;
        for shard in &self.shards {
            let mut shard = shard.lock();
            let before = shard.len();
            shard.retain(|_, v| keep(v));
            removed += before - shard.len();
        }
        removed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V: Clone> ShardedMap<V> {
    #[must_use]
    pub fn get(&self, key: &str) -> Option<V> {
        self.shard(key).lock().get(key).cloned()
    }
}
