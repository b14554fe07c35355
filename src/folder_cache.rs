//! Folder resolution cache
//!
//! Maps a canonical folder path string to the host handle it resolved to.
//! Entries are only inserted after a complete, successful resolution and live
//! for the lifetime of the host session that produced them. Nothing here
//! talks to the host; liveness probing is done by the resolver.

use std::collections::HashMap;

use crate::host::FolderHandle;

/// Snapshot of cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Path-keyed cache of resolved folder handles
///
/// Keys are compared exactly; callers are expected to pass the canonical
/// form produced by [`crate::resolver::StorePath::key`].
#[derive(Debug, Default)]
pub struct FolderCache {
    entries: HashMap<String, FolderHandle>,
    hits: u64,
    misses: u64,
}

impl FolderCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a path, counting the hit or miss
    pub fn get(&mut self, key: &str) -> Option<FolderHandle> {
        let found = self.entries.get(key).copied();
        if found.is_some() {
            self.hits += 1;
        } else {
            self.misses += 1;
        }
        found
    }

    /// Store a resolved handle; a second insert for the same key wins
    pub fn insert(&mut self, key: impl Into<String>, handle: FolderHandle) {
        self.entries.insert(key.into(), handle);
    }

    /// Evict a single entry, returning whether one was present
    pub fn remove(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drop every entry and return how many were evicted
    pub fn clear(&mut self) -> usize {
        let evicted = self.entries.len();
        self.entries.clear();
        evicted
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits,
            misses: self.misses,
        }
    }

    /// Cached paths in lexical order
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.keys().cloned().collect();
        keys.sort();
        keys
    }
}
