// src/report.rs
//
// Report scoring & cross-source aggregation (spec §4.7). Pure functions
// over an already-populated AnalysisReport — the runner fills in
// detections, this module folds them into the summary fields.

use serde_json::Value;

use crate::data::{AnalysisReport, Severity};

/// Populates every derived field on `report` from its `detections` and
/// `metrics` (the source's metadata, shared by reference per spec §4.5 step 3).
pub fn score(report: &mut AnalysisReport) {
    let total = report.detections.len() as u64;
    let detected: u64 = report.detections.iter().filter(|d| d.detected).count() as u64;

    let mut high = 0u64;
    let mut medium = 0u64;
    let mut low = 0u64;
    let mut overall = 0.0f64;

    for d in report.detections.iter().filter(|d| d.detected) {
        match d.severity {
            Severity::High => high += 1,
            Severity::Medium => medium += 1,
            Severity::Low => low += 1,
            Severity::None => {}
        }
        let weight = if d.confidence == 0.0 { 0.5 } else { d.confidence };
        overall += d.severity.weight() * weight;
    }

    report.total_detections = total;
    report.detection_count = detected;
    report.passed_detections = total - detected;
    report.high_count = high;
    report.medium_count = medium;
    report.low_count = low;
    report.overall_score = (overall * 100.0).min(100.0);
    report.suspicion_rate = if total == 0 { 0.0 } else { detected as f64 / total as f64 };
    report.assessment = assessment_for(report.overall_score);

    populate_source_metrics(report);
}

fn assessment_for(overall_score: f64) -> String {
    if overall_score >= 70.0 {
        "Suspicious Activity Detected".to_string()
    } else if overall_score >= 40.0 {
        "Moderate Suspicion".to_string()
    } else {
        "Low Suspicion".to_string()
    }
}

fn metric_u64(report: &AnalysisReport, key: &str) -> Option<u64> {
    report.metrics.get(key).and_then(Value::as_u64)
}

fn populate_source_metrics(report: &mut AnalysisReport) {
    let items_analyzed = metric_u64(report, "commit_count")
        .or_else(|| metric_u64(report, "word_count"))
        .unwrap_or(0);

    let items_flagged = report.detection_count;

    let mut strategies_used = std::collections::HashSet::new();
    let mut strategies_hit = std::collections::HashSet::new();
    let mut score_sum = 0.0f64;
    for d in &report.detections {
        strategies_used.insert(d.strategy.clone());
        if d.detected {
            strategies_hit.insert(d.strategy.clone());
            score_sum += d.score;
        }
    }
    let average_score = if items_flagged == 0 {
        0.0
    } else {
        score_sum / items_flagged as f64
    };
    let coverage_rate = if items_analyzed == 0 {
        0.0
    } else {
        (items_flagged as f64 / items_analyzed as f64).min(1.0)
    };

    let unique_authors = report
        .metrics
        .get("unique_authors")
        .and_then(Value::as_u64);

    let mut extra = std::collections::HashMap::new();
    for key in ["time_span", "velocity", "word_count", "character_count", "heading_count"] {
        if let Some(v) = report.metrics.get(key) {
            extra.insert(key.to_string(), v.clone());
        }
    }

    report.source_metrics = crate::data::SourceMetrics {
        items_analyzed,
        items_flagged,
        unique_authors,
        average_score,
        coverage_rate,
        strategies_used: strategies_used.len() as u64,
        strategies_hit: strategies_hit.len() as u64,
        extra,
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Category, Detection};
    use chrono::Utc;
    use serde_json::json;

    fn detection(detected: bool, severity: Severity, confidence: f64, score: f64) -> Detection {
        Detection {
            strategy: "s".to_string(),
            detected,
            severity,
            score,
            confidence,
            category: Category::Pattern,
            description: String::new(),
            examples: vec![],
        }
    }

    #[test]
    fn overall_score_sums_weighted_confidence_and_clips_to_100() {
        let mut report = AnalysisReport::new("git", "repo", Utc::now());
        report.detections = vec![
            detection(true, Severity::High, 1.0, 1.0),
            detection(true, Severity::Medium, 0.0, 0.2),
            detection(false, Severity::None, 0.0, 0.0),
        ];
        score(&mut report);
        assert!((report.overall_score - (0.4 * 1.0 + 0.2 * 0.5) * 100.0).abs() < 1e-9);
        assert_eq!(report.detection_count, 2);
        assert_eq!(report.passed_detections, 1);
        assert_eq!(report.total_detections, 3);
    }

    #[test]
    fn assessment_follows_thresholds() {
        assert_eq!(assessment_for(75.0), "Suspicious Activity Detected");
        assert_eq!(assessment_for(40.0), "Moderate Suspicion");
        assert_eq!(assessment_for(10.0), "Low Suspicion");
    }

    #[test]
    fn source_metrics_pulls_commit_count_from_metrics() {
        let mut report = AnalysisReport::new("git", "repo", Utc::now());
        report.metrics.insert("commit_count".to_string(), json!(10));
        report.detections = vec![detection(true, Severity::High, 0.9, 0.8)];
        score(&mut report);
        assert_eq!(report.source_metrics.items_analyzed, 10);
        assert_eq!(report.source_metrics.items_flagged, 1);
        assert!((report.source_metrics.coverage_rate - 0.1).abs() < 1e-9);
    }
}
