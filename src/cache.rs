// src/cache.rs
//
// Analysis cache: TTL expiry plus oldest-first eviction once a size cap
// is hit (spec §4.8). Same DashMap-backed concurrent-map discipline the
// teacher's StateStore uses for AccountWindow, with insertion order
// tracked separately since DashMap iteration order isn't stable.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{Duration, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use crate::data::{AnalysisReport, CacheEntry};

#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub size: usize,
    pub max_size: usize,
    pub hit_rate: f64,
}

pub trait Cache: Send + Sync {
    fn get(&self, source_type: &str, identifier: &str) -> Option<AnalysisReport>;
    fn set(&self, source_type: &str, identifier: &str, report: AnalysisReport);
    fn delete(&self, source_type: &str, identifier: &str) -> bool;
    fn clear(&self);
    fn size(&self) -> usize;
    fn stats(&self) -> CacheStats;
    fn prune(&self) -> u64;
}

/// `"{sourceType}:{first 8 bytes of SHA-256(sourceType + ':' + identifier), hex}"`
fn cache_key(source_type: &str, identifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_type.as_bytes());
    hasher.update(b":");
    hasher.update(identifier.as_bytes());
    let digest = hasher.finalize();
    format!("{source_type}:{}", hex::encode(&digest[..8]))
}

pub struct AnalysisCache {
    entries: DashMap<String, CacheEntry>,
    insertion_order: Mutex<VecDeque<String>>,
    ttl: Duration,
    max_size: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl AnalysisCache {
    pub fn new(ttl: Duration, max_size: usize) -> Self {
        Self {
            entries: DashMap::new(),
            insertion_order: Mutex::new(VecDeque::new()),
            ttl,
            max_size,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    fn evict_oldest_until_under_cap(&self) {
        if self.max_size == 0 {
            return; // 0 means unbounded
        }
        let mut order = self.insertion_order.lock();
        while self.entries.len() > self.max_size {
            let Some(oldest) = order.pop_front() else { break };
            if self.entries.remove(&oldest).is_some() {
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

impl Cache for AnalysisCache {
    fn get(&self, source_type: &str, identifier: &str) -> Option<AnalysisReport> {
        let key = cache_key(source_type, identifier);
        let found = self.entries.get(&key).map(|e| (e.is_expired(Utc::now()), e.report.clone()));
        match found {
            Some((false, report)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(report)
            }
            Some((true, _)) => {
                self.entries.remove(&key);
                self.insertion_order.lock().retain(|k| k != &key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                self.evictions.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    fn set(&self, source_type: &str, identifier: &str, report: AnalysisReport) {
        let key = cache_key(source_type, identifier);
        let entry = CacheEntry::new(report, self.ttl);
        if self.entries.insert(key.clone(), entry).is_none() {
            self.insertion_order.lock().push_back(key);
        }
        self.evict_oldest_until_under_cap();
    }

    fn delete(&self, source_type: &str, identifier: &str) -> bool {
        let key = cache_key(source_type, identifier);
        self.insertion_order.lock().retain(|k| k != &key);
        self.entries.remove(&key).is_some()
    }

    fn clear(&self) {
        self.entries.clear();
        self.insertion_order.lock().clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
    }

    fn size(&self) -> usize {
        self.entries.len()
    }

    fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let hit_rate = if hits + misses == 0 { 0.0 } else { hits as f64 / (hits + misses) as f64 };
        CacheStats {
            hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            size: self.entries.len(),
            max_size: self.max_size,
            hit_rate,
        }
    }

    /// Drops expired entries eagerly; returns the number removed.
    fn prune(&self) -> u64 {
        let now = Utc::now();
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.value().is_expired(now))
            .map(|e| e.key().clone())
            .collect();
        let mut order = self.insertion_order.lock();
        for key in &expired {
            self.entries.remove(key);
            order.retain(|k| k != key);
        }
        expired.len() as u64
    }
}

/// Disables caching entirely — used when `CADENCE_CACHE_ENABLED=false`.
pub struct NoopCache;

impl Cache for NoopCache {
    fn get(&self, _source_type: &str, _identifier: &str) -> Option<AnalysisReport> {
        None
    }
    fn set(&self, _source_type: &str, _identifier: &str, _report: AnalysisReport) {}
    fn delete(&self, _source_type: &str, _identifier: &str) -> bool {
        false
    }
    fn clear(&self) {}
    fn size(&self) -> usize {
        0
    }
    fn stats(&self) -> CacheStats {
        CacheStats::default()
    }
    fn prune(&self) -> u64 {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc as ChronoUtc;

    fn report() -> AnalysisReport {
        AnalysisReport::new("git", "repo", ChronoUtc::now())
    }

    #[test]
    fn set_then_get_round_trips() {
        let cache = AnalysisCache::new(Duration::seconds(60), 10);
        cache.set("git", "repo-a", report());
        assert!(cache.get("git", "repo-a").is_some());
        assert!(cache.get("git", "repo-b").is_none());
    }

    #[test]
    fn expired_entries_are_not_returned() {
        let cache = AnalysisCache::new(Duration::milliseconds(-1), 10);
        cache.set("git", "repo-a", report());
        assert!(cache.get("git", "repo-a").is_none());
    }

    #[test]
    fn oldest_first_eviction_respects_max_size() {
        let cache = AnalysisCache::new(Duration::seconds(60), 2);
        cache.set("git", "a", report());
        cache.set("git", "b", report());
        cache.set("git", "c", report());
        assert_eq!(cache.size(), 2);
        assert!(cache.get("git", "a").is_none());
        assert!(cache.get("git", "c").is_some());
    }
}
