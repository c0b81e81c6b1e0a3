//! Resolution cache
//!
//! Maps a [`ResolutionKey`] to the plain handler a previous resolution
//! picked. The cache is bounded but never evicts: once full, further puts
//! are dropped until the next wholesale invalidation. Invalidation is
//! driven by registry and content changes (see `events`).

use crate::collector::ResolutionKey;
use crate::handler::HandlerRef;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Cache statistics for monitoring
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub flushes: u64,
    pub rejected_puts: u64,
}

impl CacheStats {
    /// Hit rate as a percentage (0.0 to 100.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

/// What happened to a put
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Stored,
    /// No free slot left until the next invalidation
    Full,
    /// The cache was invalidated after the resolution started
    Stale,
    Disabled,
}

/// Bounded key to handler cache
pub struct ResolutionCache {
    entries: DashMap<ResolutionKey, HandlerRef>,
    capacity: usize,
    /// Slots claimed by inserts; never below the entry count
    reserved: AtomicUsize,
    full_logged: AtomicBool,
    hits: AtomicU64,
    misses: AtomicU64,
    flushes: AtomicU64,
    rejected_puts: AtomicU64,
}

impl ResolutionCache {
    /// Create a cache holding at most `capacity` entries.
    ///
    /// A capacity of zero disables caching entirely.
    pub fn new(capacity: usize) -> Self {
        ResolutionCache {
            entries: DashMap::with_capacity(capacity),
            capacity,
            reserved: AtomicUsize::new(0),
            full_logged: AtomicBool::new(false),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
            rejected_puts: AtomicU64::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.capacity > 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Look up a previous resolution
    pub fn get(&self, key: &ResolutionKey) -> Option<HandlerRef> {
        if !self.is_enabled() {
            return None;
        }
        match self.entries.get(key) {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(Arc::clone(entry.value()))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Current invalidation generation; pass it to [`put_at`] to drop
    /// results computed before a flush.
    ///
    /// [`put_at`]: ResolutionCache::put_at
    pub fn generation(&self) -> u64 {
        self.flushes.load(Ordering::Acquire)
    }

    /// Remember a resolution computed against the current generation
    pub fn put(&self, key: ResolutionKey, handler: HandlerRef) -> PutOutcome {
        self.put_at(key, handler, self.generation())
    }

    /// Remember a resolution computed against `generation`.
    ///
    /// Replacing an existing key always succeeds; concurrent puts for one
    /// key leave the last writer's handler.
    pub fn put_at(&self, key: ResolutionKey, handler: HandlerRef, generation: u64) -> PutOutcome {
        if !self.is_enabled() {
            return PutOutcome::Disabled;
        }
        // checked under the shard lock, which a concurrent clear must wait for
        let entry = self.entries.entry(key);
        if self.generation() != generation {
            return PutOutcome::Stale;
        }
        match entry {
            Entry::Occupied(mut entry) => {
                entry.insert(handler);
                PutOutcome::Stored
            }
            Entry::Vacant(entry) => {
                let claimed = self
                    .reserved
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                        (n < self.capacity).then_some(n + 1)
                    })
                    .is_ok();
                if !claimed {
                    self.rejected_puts.fetch_add(1, Ordering::Relaxed);
                    if !self.full_logged.swap(true, Ordering::Relaxed) {
                        warn!(
                            "Resolution cache is full ({} entries); increase cache_size to cache more resolutions",
                            self.capacity
                        );
                    }
                    return PutOutcome::Full;
                }
                entry.insert(handler);
                PutOutcome::Stored
            }
        }
    }

    /// Drop every entry and re-arm the cache-full warning
    pub fn invalidate_all(&self) {
        self.flushes.fetch_add(1, Ordering::AcqRel);
        // every entry holds one reservation; release exactly the ones removed
        let mut dropped = 0;
        self.entries.retain(|_, _| {
            dropped += 1;
            false
        });
        self.reserved.fetch_sub(dropped, Ordering::AcqRel);
        self.full_logged.store(false, Ordering::Relaxed);
        debug!("Resolution cache flushed ({} entries dropped)", dropped);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            capacity: self.capacity,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            rejected_puts: self.rejected_puts.load(Ordering::Relaxed),
        }
    }
}
