// src/strategy/detector.rs
//
// Detector: runs a set of Strategies over a SourceData and folds their
// StrategyHits into Detections (spec §4.2). Repository and web sources
// fold very differently — one Detection per commit-pair vs. one per
// strategy — so they get separate Detector impls behind a common trait
// rather than one detector branching on source type internally.

use std::collections::{HashMap, HashSet};

use crate::data::{Category, Detection, RawContent, Severity, SourceData};
use crate::error::CadenceError;
use crate::strategy::{Strategy, StrategyHit, Subject};

pub trait Detector: Send + Sync {
    fn detect(&self, data: &SourceData, disabled: &HashSet<String>) -> Result<Vec<Detection>, CadenceError>;
}

fn enabled_strategies<'a>(
    strategies: &'a [Box<dyn Strategy>],
    disabled: &HashSet<String>,
) -> Vec<&'a dyn Strategy> {
    strategies
        .iter()
        .filter(|s| !disabled.contains(s.name()))
        .map(|s| s.as_ref())
        .collect()
}

/// Runs every enabled strategy against a single commit-pair, catching
/// panics so one misbehaving strategy can't take down the whole run.
fn run_one(strategy: &dyn Strategy, subject: &Subject) -> Option<StrategyHit> {
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| strategy.detect(subject)));
    result.ok()
}

pub struct RepositoryDetector {
    pub strategies: Vec<Box<dyn Strategy>>,
}

impl RepositoryDetector {
    pub fn new(strategies: Vec<Box<dyn Strategy>>) -> Self {
        Self { strategies }
    }
}

impl Detector for RepositoryDetector {
    fn detect(&self, data: &SourceData, disabled: &HashSet<String>) -> Result<Vec<Detection>, CadenceError> {
        let RawContent::CommitPairs(pairs) = &data.raw_content else {
            return Err(CadenceError::analysis("repository detector received non-commit data"));
        };
        let active = enabled_strategies(&self.strategies, disabled);
        if active.is_empty() {
            return Ok(Vec::new());
        }

        let mut detections = Vec::with_capacity(pairs.len());
        for pair in pairs {
            if pair.is_merge || !pair.has_changes() {
                continue;
            }
            let subject = Subject::Commit(pair);
            let mut hit_categories: Vec<Category> = Vec::new();
            let mut hit_confidences: Vec<f64> = Vec::new();
            let mut examples = vec![pair.current.clone()];

            for strategy in &active {
                let Some(hit) = run_one(*strategy, &subject) else {
                    continue;
                };
                if hit.triggered {
                    hit_categories.push(strategy.category());
                    hit_confidences.push(strategy.confidence());
                    examples.push(format!("{}: {}", strategy.name(), hit.reason));
                }
            }

            if hit_categories.is_empty() {
                continue;
            }

            let score = hit_categories.len() as f64 / active.len() as f64;
            let confidence = hit_confidences.iter().sum::<f64>() / hit_confidences.len() as f64;
            let category = modal_category(&hit_categories);

            detections.push(Detection {
                strategy: "repository".to_string(),
                detected: true,
                severity: Severity::from_score(score),
                score,
                confidence,
                category,
                description: pair.commit_message.clone(),
                examples,
            });
        }

        Ok(detections)
    }
}

/// Most frequent category among hits; ties broken by first-seen order.
fn modal_category(categories: &[Category]) -> Category {
    let mut counts: HashMap<Category, usize> = HashMap::new();
    let mut order: Vec<Category> = Vec::new();
    for c in categories {
        if !counts.contains_key(c) {
            order.push(*c);
        }
        *counts.entry(*c).or_insert(0) += 1;
    }
    order
        .into_iter()
        .max_by_key(|c| counts[c])
        .unwrap_or(Category::Pattern)
}

pub struct WebDetector {
    pub strategies: Vec<Box<dyn Strategy>>,
}

impl WebDetector {
    pub fn new(strategies: Vec<Box<dyn Strategy>>) -> Self {
        Self { strategies }
    }
}

impl Detector for WebDetector {
    fn detect(&self, data: &SourceData, disabled: &HashSet<String>) -> Result<Vec<Detection>, CadenceError> {
        let RawContent::Page(page) = &data.raw_content else {
            return Err(CadenceError::analysis("web detector received non-page data"));
        };
        let active = enabled_strategies(&self.strategies, disabled);
        let subject = Subject::Page(&page.all_text);

        let mut detections = Vec::with_capacity(active.len());
        for strategy in active {
            let Some(hit) = run_one(strategy, &subject) else {
                continue;
            };
            let severity = if hit.triggered {
                Severity::from_score(strategy.confidence())
            } else {
                Severity::None
            };
            detections.push(Detection {
                strategy: strategy.name().to_string(),
                detected: hit.triggered,
                severity,
                score: if hit.triggered { strategy.confidence() } else { 0.0 },
                confidence: strategy.confidence(),
                category: strategy.category(),
                description: strategy.description().to_string(),
                examples: if hit.reason.is_empty() { vec![] } else { vec![hit.reason] },
            });
        }

        Ok(detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::CommitPair;
    use std::collections::HashMap as Map;

    fn pair(additions: u64, deletions: u64, files: u64, minutes: f64, message: &str) -> CommitPair {
        CommitPair {
            previous: "aaa".to_string(),
            current: "bbb".to_string(),
            commit_message: message.to_string(),
            time_delta_minutes: minutes,
            additions,
            deletions,
            files_changed: files,
            unfiltered_additions: additions,
            unfiltered_deletions: deletions,
            diff_content: String::new(),
            is_merge: false,
        }
    }

    #[test]
    fn repository_detector_emits_at_most_one_detection_per_pair() {
        let strategies = crate::strategy::repository_strategies::default_strategies();
        let detector = RepositoryDetector::new(strategies);
        let pairs = vec![pair(1000, 5, 2, 1.0, "update files")];
        let data = SourceData {
            id: "repo".to_string(),
            source_type: "git".to_string(),
            raw_content: RawContent::CommitPairs(pairs),
            metadata: Map::new(),
        };
        let detections = detector.detect(&data, &HashSet::new()).unwrap();
        assert_eq!(detections.len(), 1);
        assert!(detections[0].score > 0.0);
        assert_eq!(detections[0].examples[0], "bbb");
    }

    #[test]
    fn repository_detector_skips_pairs_with_no_hits() {
        let strategies = crate::strategy::repository_strategies::default_strategies();
        let detector = RepositoryDetector::new(strategies);
        let pairs = vec![pair(3, 1, 1, 120.0, "wire up the new config loader")];
        let data = SourceData {
            id: "repo".to_string(),
            source_type: "git".to_string(),
            raw_content: RawContent::CommitPairs(pairs),
            metadata: Map::new(),
        };
        let detections = detector.detect(&data, &HashSet::new()).unwrap();
        assert!(detections.is_empty());
    }

    #[test]
    fn web_detector_emits_one_detection_per_strategy() {
        let strategies = crate::strategy::web_strategies::default_strategies();
        let count = strategies.len();
        let detector = WebDetector::new(strategies);
        let data = SourceData {
            id: "page".to_string(),
            source_type: "web".to_string(),
            raw_content: RawContent::Page(crate::data::PageContent {
                all_text: "In conclusion, this is a simple test page about nothing in particular.".to_string(),
                ..Default::default()
            }),
            metadata: Map::new(),
        };
        let detections = detector.detect(&data, &HashSet::new()).unwrap();
        assert_eq!(detections.len(), count);
        let boilerplate = detections.iter().find(|d| d.strategy == "boilerplate_transitions").unwrap();
        assert!(boilerplate.detected);
    }

    #[test]
    fn disabled_strategies_are_skipped() {
        let strategies = crate::strategy::web_strategies::default_strategies();
        let detector = WebDetector::new(strategies);
        let mut disabled = HashSet::new();
        disabled.insert("boilerplate_transitions".to_string());
        let data = SourceData {
            id: "page".to_string(),
            source_type: "web".to_string(),
            raw_content: RawContent::Page(crate::data::PageContent {
                all_text: "In conclusion, nothing unusual here.".to_string(),
                ..Default::default()
            }),
            metadata: Map::new(),
        };
        let detections = detector.detect(&data, &disabled).unwrap();
        assert!(detections.iter().all(|d| d.strategy != "boilerplate_transitions"));
    }
}
