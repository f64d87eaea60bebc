// src/plugin.rs
//
// Plugin manager: a mutable, hot-reloadable registry of externally
// supplied strategies layered on top of the static StrategyRegistry
// (spec §4.4). Modeled on the teacher's StateStore for the concurrent
// map, with panic isolation borrowed from the same discipline used in
// the detector fan-out.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;

use crate::data::{Detection, RawContent, SourceData};
use crate::error::CadenceError;
use crate::strategy::detector::Detector;
use crate::strategy::registry::StrategyRegistry;
use crate::strategy::{Strategy, StrategyHit, Subject};

/// nil = all enabled; Some(map) = only names with value `true` are enabled.
pub type EnableMap = Option<std::collections::HashMap<String, bool>>;

pub struct PluginManager {
    plugins: DashMap<String, Arc<dyn Strategy>>,
    enabled: RwLock<EnableMap>,
}

impl PluginManager {
    pub fn new() -> Self {
        Self {
            plugins: DashMap::new(),
            enabled: RwLock::new(None),
        }
    }

    pub fn add(&self, plugin: Arc<dyn Strategy>) {
        self.plugins.insert(plugin.name().to_string(), plugin);
    }

    pub fn remove(&self, name: &str) -> bool {
        self.plugins.remove(name).is_some()
    }

    pub fn set_enabled_map(&self, map: EnableMap) {
        *self.enabled.write() = map;
    }

    fn is_enabled(&self, name: &str) -> bool {
        match &*self.enabled.read() {
            None => true,
            Some(map) => map.get(name).copied().unwrap_or(false),
        }
    }

    fn enabled_plugins(&self) -> Vec<Arc<dyn Strategy>> {
        self.plugins
            .iter()
            .filter(|e| self.is_enabled(e.key()))
            .map(|e| e.value().clone())
            .collect()
    }

    /// Runs every enabled plugin over `data`, aggregating detections.
    /// Fails only when every plugin errored and none produced output.
    /// On cancellation, the detections accumulated so far are returned
    /// alongside the `Cancelled` error rather than discarded, so a caller
    /// that stops early still sees partial progress (spec §4.4, S5).
    pub fn run_all(
        &self,
        cancelled: &dyn Fn() -> bool,
        data: &SourceData,
    ) -> Result<Vec<Detection>, (Vec<Detection>, CadenceError)> {
        let plugins = self.enabled_plugins();
        let mut detections = Vec::new();
        let mut errors: Vec<String> = Vec::new();

        let subjects: Vec<Subject> = match &data.raw_content {
            RawContent::CommitPairs(pairs) => pairs
                .iter()
                .filter(|p| !p.is_merge && p.has_changes())
                .map(Subject::Commit)
                .collect(),
            RawContent::Page(page) => vec![Subject::Page(&page.all_text)],
        };

        for plugin in &plugins {
            if cancelled() {
                return Err((detections, CadenceError::Cancelled("plugin run cancelled".to_string())));
            }

            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                subjects.iter().map(|s| plugin.detect(s)).collect::<Vec<StrategyHit>>()
            }));

            match outcome {
                Ok(hits) => {
                    for hit in hits.into_iter().filter(|h| h.triggered) {
                        detections.push(Detection {
                            strategy: plugin.name().to_string(),
                            detected: true,
                            severity: crate::data::Severity::from_score(plugin.confidence()),
                            score: plugin.confidence(),
                            confidence: plugin.confidence(),
                            category: plugin.category(),
                            description: plugin.description().to_string(),
                            examples: if hit.reason.is_empty() { vec![] } else { vec![hit.reason] },
                        });
                    }
                }
                Err(_) => errors.push(format!("plugin {} panicked", plugin.name())),
            }
        }

        if !errors.is_empty() && errors.len() == plugins.len() && detections.is_empty() {
            return Err((
                detections,
                CadenceError::analysis(format!("all plugins failed: {}", errors.join("; "))),
            ));
        }

        Ok(detections)
    }

    /// Copies each plugin's info into a registry so plugins are
    /// discoverable by the same metadata queries as built-ins.
    pub fn merge_into_registry(&self, registry: &StrategyRegistry) {
        for entry in self.plugins.iter() {
            registry.register(entry.value().info());
        }
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Exposes this manager as a Detector for use inside the Runner pipeline.
    pub fn detector(self: &Arc<Self>) -> PluginDetector {
        PluginDetector {
            manager: self.clone(),
        }
    }
}

impl Default for PluginManager {
    fn default() -> Self {
        Self::new()
    }
}

pub struct PluginDetector {
    manager: Arc<PluginManager>,
}

impl Detector for PluginDetector {
    fn detect(&self, data: &SourceData, _disabled: &HashSet<String>) -> Result<Vec<Detection>, CadenceError> {
        self.manager.run_all(&|| false, data).map_err(|(_partial, e)| e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Category;
    use std::collections::HashMap;

    struct AlwaysHit;
    impl Strategy for AlwaysHit {
        fn name(&self) -> &str {
            "always_hit"
        }
        fn category(&self) -> Category {
            Category::Pattern
        }
        fn confidence(&self) -> f64 {
            0.6
        }
        fn description(&self) -> &str {
            "always triggers"
        }
        fn source_types(&self) -> Vec<String> {
            vec!["web".to_string()]
        }
        fn detect(&self, _subject: &Subject) -> StrategyHit {
            StrategyHit {
                triggered: true,
                reason: "always".to_string(),
            }
        }
    }

    struct AlwaysHit2;
    impl Strategy for AlwaysHit2 {
        fn name(&self) -> &str {
            "always_hit_2"
        }
        fn category(&self) -> Category {
            Category::Pattern
        }
        fn confidence(&self) -> f64 {
            0.6
        }
        fn description(&self) -> &str {
            "also always triggers"
        }
        fn source_types(&self) -> Vec<String> {
            vec!["web".to_string()]
        }
        fn detect(&self, _subject: &Subject) -> StrategyHit {
            StrategyHit {
                triggered: true,
                reason: "always".to_string(),
            }
        }
    }

    struct AlwaysPanics;
    impl Strategy for AlwaysPanics {
        fn name(&self) -> &str {
            "always_panics"
        }
        fn category(&self) -> Category {
            Category::Pattern
        }
        fn confidence(&self) -> f64 {
            0.6
        }
        fn description(&self) -> &str {
            "always panics"
        }
        fn source_types(&self) -> Vec<String> {
            vec!["web".to_string()]
        }
        fn detect(&self, _subject: &Subject) -> StrategyHit {
            panic!("boom")
        }
    }

    fn page_data() -> SourceData {
        SourceData {
            id: "p".to_string(),
            source_type: "web".to_string(),
            raw_content: RawContent::Page(crate::data::PageContent {
                all_text: "hello world".to_string(),
                ..Default::default()
            }),
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn run_all_survives_a_panicking_plugin_if_another_produces_output() {
        let mgr = PluginManager::new();
        mgr.add(Arc::new(AlwaysHit));
        mgr.add(Arc::new(AlwaysPanics));
        let detections = mgr.run_all(&|| false, &page_data()).unwrap();
        assert_eq!(detections.len(), 1);
    }

    #[test]
    fn run_all_fails_when_every_plugin_errors() {
        let mgr = PluginManager::new();
        mgr.add(Arc::new(AlwaysPanics));
        let result = mgr.run_all(&|| false, &page_data());
        assert!(result.is_err());
    }

    #[test]
    fn run_all_returns_partial_detections_on_cancellation() {
        let mgr = PluginManager::new();
        mgr.add(Arc::new(AlwaysHit));
        mgr.add(Arc::new(AlwaysHit2));

        let seen = std::cell::Cell::new(0);
        let result = mgr.run_all(
            &|| {
                seen.set(seen.get() + 1);
                seen.get() > 1
            },
            &page_data(),
        );
        match result {
            Err((partial, CadenceError::Cancelled(_))) => assert_eq!(partial.len(), 1),
            other => panic!("expected partial cancellation, got {other:?}"),
        }
    }

    #[test]
    fn enable_map_restricts_to_named_true_entries() {
        let mgr = PluginManager::new();
        mgr.add(Arc::new(AlwaysHit));
        let mut map = HashMap::new();
        map.insert("always_hit".to_string(), false);
        mgr.set_enabled_map(Some(map));
        let detections = mgr.run_all(&|| false, &page_data()).unwrap();
        assert!(detections.is_empty());
    }
}
