//! Adaptive Replacement Cache.
//!
//! ARC keeps two resident lists and two ghost lists:
//!
//! ```text
//!   T1  seen once recently          (payloads)
//!   T2  seen at least twice         (payloads)
//!   B1  evicted from T1             (ids only)
//!   B2  evicted from T2             (ids only)
//! ```
//!
//! `p` is the target size of T1. A re-request of an id in B1 means the
//! recency side was too small, so `p` grows; a re-request of an id in B2
//! shrinks it. Each list is an `LruCache` used purely as an ordered sequence
//! (unbounded, so it never evicts on its own), which gives O(1) move-to-MRU,
//! remove-by-key and pop-LRU.
//!
//! Invariants maintained after every call:
//!
//! - `|T1| + |T2| <= C`
//! - `|T1| + |B1| <= C`
//! - `|B1| <= C`, `|B2| <= C`
//! - an id is in at most one of the four lists
//! - `0 <= p <= C`

use super::CacheStats;
use crate::types::{ContentId, Payload};
use lru::LruCache;
use tracing::trace;

/// Which ARC list an id currently lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArcList {
    /// Recency list.
    T1,
    /// Frequency list.
    T2,
    /// Ghosts evicted from T1.
    B1,
    /// Ghosts evicted from T2.
    B2,
}

impl ArcList {
    /// Whether the list holds payloads.
    pub fn is_resident(self) -> bool {
        matches!(self, ArcList::T1 | ArcList::T2)
    }
}

/// Result of a cache lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Hit(Payload),
    Miss,
}

impl Lookup {
    pub fn is_hit(&self) -> bool {
        matches!(self, Lookup::Hit(_))
    }
}

/// Adaptive Replacement Cache keyed by content id.
pub struct ArcCache {
    capacity: usize,
    /// Target size of T1.
    p: usize,
    t1: LruCache<ContentId, Payload>,
    t2: LruCache<ContentId, Payload>,
    b1: LruCache<ContentId, ()>,
    b2: LruCache<ContentId, ()>,
    stats: CacheStats,
}

impl ArcCache {
    /// Create a cache holding at most `capacity` payloads.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            p: 0,
            t1: LruCache::unbounded(),
            t2: LruCache::unbounded(),
            b1: LruCache::unbounded(),
            b2: LruCache::unbounded(),
            stats: CacheStats {
                capacity,
                ..Default::default()
            },
        }
    }

    /// Look up a payload.
    ///
    /// A hit in T1 promotes the id to the MRU end of T2; a hit in T2 refreshes
    /// its position. Ghost lists are never touched here.
    pub fn lookup(&mut self, id: ContentId) -> Lookup {
        if let Some(payload) = self.t1.pop(&id) {
            self.t2.push(id, payload.clone());
            self.stats.hits += 1;
            trace!(content_id = id, "ARC hit in T1, promoted to T2");
            return Lookup::Hit(payload);
        }

        if let Some(payload) = self.t2.get(&id) {
            self.stats.hits += 1;
            trace!(content_id = id, "ARC hit in T2");
            return Lookup::Hit(payload.clone());
        }

        self.stats.misses += 1;
        Lookup::Miss
    }

    /// Admit a payload fetched after a miss.
    ///
    /// If the id became resident in the meantime (another request admitted it
    /// first) the payload is replaced in place without moving the entry.
    pub fn admit(&mut self, id: ContentId, payload: Payload) {
        if self.capacity == 0 {
            return;
        }

        if let Some(slot) = self.t1.peek_mut(&id) {
            *slot = payload;
            return;
        }
        if let Some(slot) = self.t2.peek_mut(&id) {
            *slot = payload;
            return;
        }

        self.stats.admissions += 1;

        if self.b1.contains(&id) {
            let delta = (self.b2.len() / self.b1.len()).max(1);
            self.p = (self.p + delta).min(self.capacity);
            self.stats.recency_ghost_hits += 1;
            trace!(content_id = id, p = self.p, "ARC ghost hit in B1");

            self.replace_if_full(false);
            self.b1.pop(&id);
            self.t2.push(id, payload);
            return;
        }

        if self.b2.contains(&id) {
            let delta = (self.b1.len() / self.b2.len()).max(1);
            self.p = self.p.saturating_sub(delta);
            self.stats.frequency_ghost_hits += 1;
            trace!(content_id = id, p = self.p, "ARC ghost hit in B2");

            self.replace_if_full(true);
            self.b2.pop(&id);
            self.t2.push(id, payload);
            return;
        }

        if self.t1.len() + self.b1.len() >= self.capacity {
            if self.t1.len() < self.capacity {
                self.b1.pop_lru();
                self.replace_if_full(false);
            } else if let Some((evicted, _)) = self.t1.pop_lru() {
                // T1 fills the whole directory: drop without a ghost.
                self.stats.evictions += 1;
                trace!(content_id = evicted, "ARC dropped LRU of T1");
            }
        } else {
            let total = self.t1.len() + self.t2.len() + self.b1.len() + self.b2.len();
            if total >= self.capacity && total == 2 * self.capacity {
                self.b2.pop_lru();
            }
            self.replace_if_full(false);
        }

        self.t1.push(id, payload);
    }

    fn replace_if_full(&mut self, in_b2: bool) {
        if self.len() >= self.capacity {
            self.replace(in_b2);
        }
    }

    /// Evict one resident entry into its ghost list.
    fn replace(&mut self, in_b2: bool) {
        let t1_len = self.t1.len();
        let prefer_t1 = t1_len >= 1 && (t1_len > self.p || (in_b2 && t1_len == self.p));

        if prefer_t1 || self.t2.is_empty() {
            if let Some((evicted, _)) = self.t1.pop_lru() {
                Self::push_ghost(&mut self.b1, evicted, self.capacity);
                self.stats.evictions += 1;
                trace!(content_id = evicted, "ARC evicted T1 -> B1");
            }
        } else if let Some((evicted, _)) = self.t2.pop_lru() {
            Self::push_ghost(&mut self.b2, evicted, self.capacity);
            self.stats.evictions += 1;
            trace!(content_id = evicted, "ARC evicted T2 -> B2");
        }
    }

    fn push_ghost(ghosts: &mut LruCache<ContentId, ()>, id: ContentId, bound: usize) {
        ghosts.push(id, ());
        while ghosts.len() > bound {
            ghosts.pop_lru();
        }
    }

    /// Which list currently holds `id`, if any.
    pub fn locate(&self, id: ContentId) -> Option<ArcList> {
        if self.t1.contains(&id) {
            Some(ArcList::T1)
        } else if self.t2.contains(&id) {
            Some(ArcList::T2)
        } else if self.b1.contains(&id) {
            Some(ArcList::B1)
        } else if self.b2.contains(&id) {
            Some(ArcList::B2)
        } else {
            None
        }
    }

    /// Whether a payload for `id` is resident. Does not affect recency.
    pub fn contains(&self, id: ContentId) -> bool {
        self.t1.contains(&id) || self.t2.contains(&id)
    }

    /// Ids in `list`, least recently used first.
    pub fn ids(&self, list: ArcList) -> Vec<ContentId> {
        match list {
            ArcList::T1 => self.t1.iter().rev().map(|(k, _)| *k).collect(),
            ArcList::T2 => self.t2.iter().rev().map(|(k, _)| *k).collect(),
            ArcList::B1 => self.b1.iter().rev().map(|(k, _)| *k).collect(),
            ArcList::B2 => self.b2.iter().rev().map(|(k, _)| *k).collect(),
        }
    }

    /// Number of ids in `list`.
    pub fn list_len(&self, list: ArcList) -> usize {
        match list {
            ArcList::T1 => self.t1.len(),
            ArcList::T2 => self.t2.len(),
            ArcList::B1 => self.b1.len(),
            ArcList::B2 => self.b2.len(),
        }
    }

    /// Resident payload count.
    pub fn len(&self) -> usize {
        self.t1.len() + self.t2.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current target size of T1 (`p`).
    pub fn target_t1(&self) -> usize {
        self.p
    }

    /// Drop all resident and ghost entries and reset `p`.
    pub fn clear(&mut self) {
        self.t1.clear();
        self.t2.clear();
        self.b1.clear();
        self.b2.clear();
        self.p = 0;
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            target_t1: self.p,
            ..self.stats.clone()
        }
    }
}

impl std::fmt::Debug for ArcCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArcCache")
            .field("capacity", &self.capacity)
            .field("p", &self.p)
            .field("t1", &self.t1.len())
            .field("t2", &self.t2.len())
            .field("b1", &self.b1.len())
            .field("b2", &self.b2.len())
            .finish()
    }
}
