// src/data.rs
//
// Shared data types flowing through the analysis pipeline (spec §3).
// Mirrors the role of the teacher's events.rs: one place where every
// component-crossing record lives.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Source data ────────────────────────────────────────────────────────────────

/// Payload produced by a Source and consumed by exactly one Detector chain.
#[derive(Debug, Clone)]
pub struct SourceData {
    pub id: String,
    pub source_type: String,
    pub raw_content: RawContent,
    pub metadata: HashMap<String, Value>,
}

/// Opaque payload whose concrete shape is known only to the matching Detector.
#[derive(Debug, Clone)]
pub enum RawContent {
    CommitPairs(Vec<CommitPair>),
    Page(PageContent),
}

#[derive(Debug, Clone)]
pub struct CommitPair {
    pub previous: String,
    pub current: String,
    pub commit_message: String,
    pub time_delta_minutes: f64,
    pub additions: u64,
    pub deletions: u64,
    pub files_changed: u64,
    /// Additions/deletions before exclude-file filtering was applied.
    pub unfiltered_additions: u64,
    pub unfiltered_deletions: u64,
    pub diff_content: String,
    pub is_merge: bool,
}

impl CommitPair {
    pub fn has_changes(&self) -> bool {
        self.additions > 0 || self.deletions > 0
    }
}

#[derive(Debug, Clone, Default)]
pub struct PageContent {
    pub title: String,
    pub description: String,
    pub body: String,
    pub all_text: String,
    pub main_content: String,
    pub headings: Vec<String>,
    pub meta_tags: HashMap<String, String>,
    pub word_count: usize,
    pub status_code: u16,
    pub fetched_at: DateTime<Utc>,
}

// ── Detection & strategy metadata ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    None,
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn weight(self) -> f64 {
        match self {
            Severity::High => 0.4,
            Severity::Medium => 0.2,
            Severity::Low => 0.1,
            Severity::None => 0.0,
        }
    }

    pub fn from_score(score: f64) -> Self {
        if score >= 0.7 {
            Severity::High
        } else if score >= 0.4 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::None => write!(f, "none"),
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Velocity,
    Structural,
    Behavioral,
    Statistical,
    Pattern,
    Linguistic,
    Accessibility,
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Category::Velocity => "velocity",
            Category::Structural => "structural",
            Category::Behavioral => "behavioral",
            Category::Statistical => "statistical",
            Category::Pattern => "pattern",
            Category::Linguistic => "linguistic",
            Category::Accessibility => "accessibility",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub strategy: String,
    pub detected: bool,
    pub severity: Severity,
    pub score: f64,
    pub confidence: f64,
    pub category: Category,
    pub description: String,
    pub examples: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyInfo {
    pub name: String,
    pub category: Category,
    pub confidence: f64,
    pub description: String,
    pub source_types: Vec<String>,
}

// ── Timing ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseTiming {
    pub name: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingInfo {
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub phases: Vec<PhaseTiming>,
}

impl TimingInfo {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            completed_at: started_at,
            duration_ms: 0,
            phases: Vec::new(),
        }
    }

    pub fn finish(&mut self, completed_at: DateTime<Utc>) {
        self.completed_at = completed_at;
        self.duration_ms = (completed_at - self.started_at).num_milliseconds().max(0);
    }
}

// ── Source metrics ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceMetrics {
    pub items_analyzed: u64,
    pub items_flagged: u64,
    pub unique_authors: Option<u64>,
    pub average_score: f64,
    pub coverage_rate: f64,
    pub strategies_used: u64,
    pub strategies_hit: u64,
    pub extra: HashMap<String, Value>,
}

// ── Report ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub id: String,
    pub source_type: String,
    pub source_id: String,
    pub analyzed_at: DateTime<Utc>,
    pub timing: TimingInfo,
    pub source_metrics: SourceMetrics,
    pub detections: Vec<Detection>,
    pub overall_score: f64,
    pub assessment: String,
    pub suspicion_rate: f64,
    pub high_count: u64,
    pub medium_count: u64,
    pub low_count: u64,
    pub total_detections: u64,
    pub detection_count: u64,
    pub passed_detections: u64,
    pub metrics: HashMap<String, Value>,
    pub error: Option<String>,
}

impl AnalysisReport {
    pub fn new(source_type: impl Into<String>, source_id: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            source_type: source_type.into(),
            source_id: source_id.into(),
            analyzed_at: started_at,
            timing: TimingInfo::new(started_at),
            source_metrics: SourceMetrics::default(),
            detections: Vec::new(),
            overall_score: 0.0,
            assessment: "Low Suspicion".to_string(),
            suspicion_rate: 0.0,
            high_count: 0,
            medium_count: 0,
            low_count: 0,
            total_detections: 0,
            detection_count: 0,
            passed_detections: 0,
            metrics: HashMap::new(),
            error: None,
        }
    }
}

// ── Cache ────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub report: AnalysisReport,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(report: AnalysisReport, ttl: Duration) -> Self {
        let created_at = Utc::now();
        Self {
            report,
            created_at,
            expires_at: created_at + ttl,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

// ── Webhook jobs ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookJob {
    pub id: String,
    pub event_type: String,
    pub repo_url: String,
    pub repo_name: String,
    pub branch: String,
    pub author: String,
    pub commits: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub status: JobStatus,
    pub progress: String,
    pub error: Option<String>,
    pub result: Option<AnalysisReport>,
}

impl WebhookJob {
    /// Move the job forward one lifecycle step. Backwards transitions are refused.
    pub fn transition(&mut self, next: JobStatus) -> bool {
        let allowed = matches!(
            (self.status, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        );
        if allowed {
            self.status = next;
        }
        allowed
    }
}
