// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded in-memory cache of metadata tag values with per-entry expiration.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use fnv::FnvBuildHasher;
use hashbrown::HashMap;
use tokio::time::Instant;

use crate::constants::MAX_ENTRY_SIZE;
use crate::errors::CacheError;
use crate::tag::TagName;

struct CacheEntry {
    value: String,
    /// `None` never expires
    expires_at: Option<Instant>,
    last_access: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Point-in-time view of the cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Thread-safe tag cache shared by every dispatch worker.
///
/// Expired entries read as misses and are dropped on lookup. When the cache is full, expired
/// entries are reclaimed first and then the least recently used entry is evicted. Concurrent
/// writers to the same key race and the last one wins.
pub struct ExpiringCache {
    entries: Mutex<HashMap<TagName, CacheEntry, FnvBuildHasher>>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl ExpiringCache {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::with_capacity_and_hasher(
                capacity.min(TagName::ALL.len()),
                FnvBuildHasher::default(),
            )),
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Returns the cached value for `key` if it is present and has not expired.
    pub fn get(&self, key: TagName) -> Option<String> {
        let now = Instant::now();
        #[allow(clippy::expect_used)]
        let mut entries = self.entries.lock().expect("lock poisoned");

        let expired = match entries.get_mut(&key) {
            Some(entry) if !entry.is_expired(now) => {
                entry.last_access = now;
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.remove(&key);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Inserts or overwrites `key`. A zero `ttl` stores the value without expiration.
    pub fn set(&self, key: TagName, value: &str, ttl: Duration) -> Result<(), CacheError> {
        if value.len() > MAX_ENTRY_SIZE {
            return Err(CacheError::EntryTooLarge {
                key,
                len: value.len(),
                max: MAX_ENTRY_SIZE,
            });
        }

        let now = Instant::now();
        let expires_at = (!ttl.is_zero()).then(|| now + ttl);

        #[allow(clippy::expect_used)]
        let mut entries = self.entries.lock().expect("lock poisoned");

        if !entries.contains_key(&key) && entries.len() >= self.capacity {
            self.make_room(&mut entries, now);
            if entries.len() >= self.capacity {
                return Err(CacheError::Full {
                    capacity: self.capacity,
                });
            }
        }

        entries.insert(
            key,
            CacheEntry {
                value: value.to_string(),
                expires_at,
                last_access: now,
            },
        );
        Ok(())
    }

    fn make_room(&self, entries: &mut HashMap<TagName, CacheEntry, FnvBuildHasher>, now: Instant) {
        entries.retain(|_, entry| !entry.is_expired(now));

        while entries.len() >= self.capacity {
            let Some(victim) = entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_access)
                .map(|(key, _)| *key)
            else {
                break;
            };
            entries.remove(&victim);
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    /// Zeroes the counters. Stored entries are untouched.
    pub fn reset_stats(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
    }

    /// Reads and zeroes the counters in one step so no increment falls between the two.
    pub fn take_stats(&self) -> CacheStats {
        CacheStats {
            size: self.len(),
            hits: self.hits.swap(0, Ordering::Relaxed),
            misses: self.misses.swap(0, Ordering::Relaxed),
            evictions: self.evictions.swap(0, Ordering::Relaxed),
        }
    }

    /// Number of stored entries, including expired ones not yet reclaimed.
    pub fn len(&self) -> usize {
        #[allow(clippy::expect_used)]
        let entries = self.entries.lock().expect("lock poisoned");
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
