use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;

/// Memoizes a boolean verdict per key.
///
/// Verdicts derive from immutable configuration, so entries are never
/// invalidated. The key universe of a deployment is finite.
#[derive(Debug)]
pub struct MatcherCache<K> {
    verdicts: Mutex<HashMap<K, bool>>,
}

impl<K> Default for MatcherCache<K> {
    fn default() -> Self {
        MatcherCache {
            verdicts: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Clone> MatcherCache<K> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, key: &K) -> Option<bool> {
        self.lock().get(key).copied()
    }

    /// Returns the cached verdict, computing and storing it on a miss.
    ///
    /// `compute` runs outside the lock; when two callers race on the same key
    /// the first stored verdict wins and both observe it.
    pub fn get_or_insert_with(&self, key: &K, compute: impl FnOnce() -> bool) -> bool {
        if let Some(verdict) = self.get(key) {
            return verdict;
        }
        let verdict = compute();
        *self.lock().entry(key.clone()).or_insert(verdict)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<K, bool>> {
        // Entries are plain bools, a panic mid-insert cannot leave one half written
        self.verdicts
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
