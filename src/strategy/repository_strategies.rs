// src/strategy/repository_strategies.rs
//
// Representative git-family heuristics. The pipeline accepts any number
// of these (spec §1); the lexical/numeric detail inside each is
// deliberately simple — the interesting engineering is the registry,
// detector, and scoring fabric around them, not these rules themselves.

use crate::data::Category;
use crate::strategy::{Strategy, StrategyHit, Subject};

fn as_commit<'a>(subject: &Subject<'a>) -> Option<&'a crate::data::CommitPair> {
    match subject {
        Subject::Commit(c) => Some(c),
        _ => None,
    }
}

/// Flags commits whose addition volume and rate both exceed configured
/// thresholds — the signature of a large change dropped in all at once
/// rather than iterated on.
pub struct SuspiciousAdditions {
    pub suspicious_additions: u64,
    pub max_additions_per_min: f64,
}

impl Default for SuspiciousAdditions {
    fn default() -> Self {
        Self {
            suspicious_additions: 500,
            max_additions_per_min: 100.0,
        }
    }
}

impl Strategy for SuspiciousAdditions {
    fn name(&self) -> &str {
        "suspicious_additions"
    }
    fn category(&self) -> Category {
        Category::Velocity
    }
    fn confidence(&self) -> f64 {
        0.75
    }
    fn description(&self) -> &str {
        "Large addition volume landed faster than sustainable manual typing speed"
    }
    fn source_types(&self) -> Vec<String> {
        vec!["git".to_string()]
    }

    fn detect(&self, subject: &Subject) -> StrategyHit {
        let Some(commit) = as_commit(subject) else {
            return StrategyHit {
                triggered: false,
                reason: String::new(),
            };
        };
        let rate = commit.additions as f64 / commit.time_delta_minutes.max(0.001);
        let triggered = commit.additions >= self.suspicious_additions && rate > self.max_additions_per_min;
        StrategyHit {
            triggered,
            reason: format!("additions={} rate={:.1}/min", commit.additions, rate),
        }
    }
}

/// Deletions disproportionate to additions in one shot (rewrite rather
/// than incremental edit).
pub struct BulkRewrite {
    pub min_deletions: u64,
}

impl Default for BulkRewrite {
    fn default() -> Self {
        Self { min_deletions: 300 }
    }
}

impl Strategy for BulkRewrite {
    fn name(&self) -> &str {
        "bulk_rewrite"
    }
    fn category(&self) -> Category {
        Category::Structural
    }
    fn confidence(&self) -> f64 {
        0.6
    }
    fn description(&self) -> &str {
        "Deletion volume suggests a wholesale file rewrite rather than an incremental edit"
    }
    fn source_types(&self) -> Vec<String> {
        vec!["git".to_string()]
    }

    fn detect(&self, subject: &Subject) -> StrategyHit {
        let Some(commit) = as_commit(subject) else {
            return StrategyHit {
                triggered: false,
                reason: String::new(),
            };
        };
        let triggered = commit.deletions >= self.min_deletions && commit.additions >= commit.deletions;
        StrategyHit {
            triggered,
            reason: format!("deletions={} additions={}", commit.deletions, commit.additions),
        }
    }
}

/// A single commit touching an unusually wide file fan-out.
pub struct WideFanOut {
    pub min_files: u64,
}

impl Default for WideFanOut {
    fn default() -> Self {
        Self { min_files: 20 }
    }
}

impl Strategy for WideFanOut {
    fn name(&self) -> &str {
        "wide_fan_out"
    }
    fn category(&self) -> Category {
        Category::Structural
    }
    fn confidence(&self) -> f64 {
        0.5
    }
    fn description(&self) -> &str {
        "Commit touches an unusually large number of files at once"
    }
    fn source_types(&self) -> Vec<String> {
        vec!["git".to_string()]
    }

    fn detect(&self, subject: &Subject) -> StrategyHit {
        let Some(commit) = as_commit(subject) else {
            return StrategyHit {
                triggered: false,
                reason: String::new(),
            };
        };
        let triggered = commit.files_changed >= self.min_files;
        StrategyHit {
            triggered,
            reason: format!("files_changed={}", commit.files_changed),
        }
    }
}

/// Generic, templated commit messages ("Update files", "Refactor code")
/// that carry no project-specific information.
pub struct GenericCommitMessage;

const GENERIC_PHRASES: &[&str] = &[
    "update files",
    "refactor code",
    "improve code quality",
    "fix issues",
    "minor changes",
    "code cleanup",
    "update readme",
    "misc changes",
];

impl Strategy for GenericCommitMessage {
    fn name(&self) -> &str {
        "generic_commit_message"
    }
    fn category(&self) -> Category {
        Category::Linguistic
    }
    fn confidence(&self) -> f64 {
        0.4
    }
    fn description(&self) -> &str {
        "Commit message is a generic template carrying no project-specific information"
    }
    fn source_types(&self) -> Vec<String> {
        vec!["git".to_string()]
    }

    fn detect(&self, subject: &Subject) -> StrategyHit {
        let Some(commit) = as_commit(subject) else {
            return StrategyHit {
                triggered: false,
                reason: String::new(),
            };
        };
        let lower = commit.commit_message.to_lowercase();
        let hit = GENERIC_PHRASES.iter().find(|p| lower.contains(**p));
        StrategyHit {
            triggered: hit.is_some(),
            reason: hit.map(|p| format!("matched:{p}")).unwrap_or_default(),
        }
    }
}

/// A commit landing in an implausibly short window relative to its size —
/// combines rate and absolute time into one behavioral signal.
pub struct ImplausibleVelocity {
    pub max_minutes: f64,
    pub min_lines: u64,
}

impl Default for ImplausibleVelocity {
    fn default() -> Self {
        Self {
            max_minutes: 2.0,
            min_lines: 200,
        }
    }
}

impl Strategy for ImplausibleVelocity {
    fn name(&self) -> &str {
        "implausible_velocity"
    }
    fn category(&self) -> Category {
        Category::Behavioral
    }
    fn confidence(&self) -> f64 {
        0.7
    }
    fn description(&self) -> &str {
        "Total line churn arrived within a window too short for manual authorship"
    }
    fn source_types(&self) -> Vec<String> {
        vec!["git".to_string()]
    }

    fn detect(&self, subject: &Subject) -> StrategyHit {
        let Some(commit) = as_commit(subject) else {
            return StrategyHit {
                triggered: false,
                reason: String::new(),
            };
        };
        let lines = commit.additions + commit.deletions;
        let triggered = commit.time_delta_minutes <= self.max_minutes && lines >= self.min_lines;
        StrategyHit {
            triggered,
            reason: format!("lines={} minutes={:.2}", lines, commit.time_delta_minutes),
        }
    }
}

/// Builds the default repository strategy set.
pub fn default_strategies() -> Vec<Box<dyn Strategy>> {
    vec![
        Box::new(SuspiciousAdditions::default()),
        Box::new(BulkRewrite::default()),
        Box::new(WideFanOut::default()),
        Box::new(GenericCommitMessage),
        Box::new(ImplausibleVelocity::default()),
    ]
}
