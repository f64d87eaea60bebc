// src/strategy/registry.rs
//
// Process-wide read-mostly catalog of StrategyInfo, keyed by unique name
// (spec §4.3). Modeled on the teacher's StateStore: a DashMap-backed
// concurrent map, safe to query from any runner without locking.

use dashmap::DashMap;

use crate::data::{Category, StrategyInfo};

pub struct StrategyRegistry {
    entries: DashMap<String, StrategyInfo>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Overwrites any existing entry with the same name.
    pub fn register(&self, info: StrategyInfo) {
        self.entries.insert(info.name.clone(), info);
    }

    pub fn get(&self, name: &str) -> Option<StrategyInfo> {
        self.entries.get(name).map(|e| e.clone())
    }

    pub fn all(&self) -> Vec<StrategyInfo> {
        self.entries.iter().map(|e| e.value().clone()).collect()
    }

    pub fn by_category(&self, category: Category) -> Vec<StrategyInfo> {
        self.entries
            .iter()
            .filter(|e| e.value().category == category)
            .map(|e| e.value().clone())
            .collect()
    }

    pub fn by_source_type(&self, source_type: &str) -> Vec<StrategyInfo> {
        self.entries
            .iter()
            .filter(|e| e.value().source_types.iter().any(|t| t == source_type))
            .map(|e| e.value().clone())
            .collect()
    }

    pub fn above_confidence(&self, threshold: f64) -> Vec<StrategyInfo> {
        self.entries
            .iter()
            .filter(|e| e.value().confidence >= threshold)
            .map(|e| e.value().clone())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// Clears every entry — exposed for test isolation between runs.
    pub fn reset(&self) {
        self.entries.clear();
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Seeds a registry with the built-in git-family strategy catalog.
pub fn seed_git_registry(registry: &StrategyRegistry, strategies: &[Box<dyn crate::strategy::Strategy>]) {
    for s in strategies {
        registry.register(s.info());
    }
}

/// Seeds a registry with the built-in web-family strategy catalog.
pub fn seed_web_registry(registry: &StrategyRegistry, strategies: &[Box<dyn crate::strategy::Strategy>]) {
    for s in strategies {
        registry.register(s.info());
    }
}
