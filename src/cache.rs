// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Key/value cache with per-entry TTL.
//!
//! Entries are valid while `now - inserted_at < ttl`. Expired entries are
//! removed when read; there is no background sweep. Writing a key resets its
//! timestamp.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;

/// Default TTL (60 seconds).
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

struct CacheEntry<V> {
    inserted_at: Instant,
    value: V,
}

impl<V> CacheEntry<V> {
    fn new(value: V) -> Self {
        Self {
            inserted_at: Instant::now(),
            value,
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.inserted_at.elapsed() >= ttl
    }
}

/// Thread-safe TTL cache, locked per key shard.
pub struct TtlCache<V> {
    entries: DashMap<String, CacheEntry<V>>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V: Clone> TtlCache<V> {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Get a live value, evicting it if it has expired.
    pub fn get(&self, key: &str) -> Option<V> {
        let value = match self.entries.entry(key.to_string()) {
            Entry::Occupied(entry) if entry.get().is_expired(self.ttl) => {
                entry.remove();
                None
            }
            Entry::Occupied(entry) => Some(entry.get().value.clone()),
            Entry::Vacant(_) => None,
        };
        self.count_lookup(value.is_some());
        value
    }

    /// Insert or overwrite a value, resetting its timestamp.
    pub fn set(&self, key: impl Into<String>, value: V) {
        self.entries.insert(key.into(), CacheEntry::new(value));
    }

    /// Read-modify-write a live entry in place.
    ///
    /// The closure runs while the key's shard is locked, so concurrent
    /// updates to the same key serialize and fields the closure does not
    /// touch are preserved. The timestamp is reset on success. Returns
    /// `None` when the key is absent or expired.
    pub fn update<R>(&self, key: &str, f: impl FnOnce(&mut V) -> R) -> Option<R> {
        let result = match self.entries.entry(key.to_string()) {
            Entry::Occupied(entry) if entry.get().is_expired(self.ttl) => {
                entry.remove();
                None
            }
            Entry::Occupied(mut entry) => {
                let cached = entry.get_mut();
                let result = f(&mut cached.value);
                cached.inserted_at = Instant::now();
                Some(result)
            }
            Entry::Vacant(_) => None,
        };
        self.count_lookup(result.is_some());
        result
    }

    pub fn remove(&self, key: &str) -> Option<V> {
        self.entries.remove(key).map(|(_, entry)| entry.value)
    }

    /// Entry counts and hit rate for dashboards.
    pub fn summary(&self) -> CacheSummary {
        let total_items = self.entries.len();
        let expired_items = self
            .entries
            .iter()
            .filter(|e| e.value().is_expired(self.ttl))
            .count();
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;

        CacheSummary {
            total_items,
            valid_items: total_items - expired_items,
            expired_items,
            ttl_seconds: self.ttl.as_secs_f64(),
            hits,
            misses,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
        }
    }

    fn count_lookup(&self, hit: bool) {
        let counter = if hit { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

impl<V: Clone> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheSummary {
    pub total_items: usize,
    pub valid_items: usize,
    pub expired_items: usize,
    pub ttl_seconds: f64,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}
