// src/metrics.rs
//
// Metrics collector (spec §4.9): wait-free atomic counters exposed in
// Prometheus text format. Directly modeled on the teacher's
// `GlasswallMetrics` in otel.rs — same AtomicU64-per-counter approach,
// same `# HELP`/`# TYPE` formatting, generalized from per-worker counts
// to per-source-type/per-strategy/per-phase counts.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use dashmap::DashMap;
use serde::Serialize;

pub trait Metrics: Send + Sync {
    fn record_analysis(&self, source_type: &str, duration_ms: u64);
    fn record_detection(&self, strategy: &str, detected: bool, duration_ms: u64);
    fn record_flagged(&self, source_type: &str);
    fn record_error(&self, source_type: &str, phase: &str);
    fn record_cache_hit(&self, source_type: &str);
    fn record_cache_miss(&self, source_type: &str);
    fn snapshot(&self) -> MetricsSnapshot;
    fn prometheus_text(&self) -> String;
    fn reset(&self);
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SourceTypeStats {
    pub analyses: u64,
    pub errors: u64,
    pub detections: u64,
    pub flagged: u64,
    pub total_duration_ms: u64,
    pub avg_duration_ms: f64,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StrategyStats {
    pub executions: u64,
    pub detections: u64,
    pub total_duration_ms: u64,
    pub avg_duration_ms: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSnapshot {
    pub total_analyses: u64,
    pub total_errors: u64,
    pub total_detections: u64,
    pub total_flagged: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub uptime_seconds: u64,
    pub avg_analysis_duration_ms: f64,
    pub by_source_type: BTreeMap<String, SourceTypeStats>,
    pub by_strategy: BTreeMap<String, StrategyStats>,
    pub errors_by_phase: BTreeMap<String, u64>,
}

#[derive(Default)]
struct SourceTypeCounters {
    analyses: AtomicU64,
    errors: AtomicU64,
    detections: AtomicU64,
    flagged: AtomicU64,
    total_duration_ms: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
}

#[derive(Default)]
struct StrategyCounters {
    executions: AtomicU64,
    detections: AtomicU64,
    total_duration_ms: AtomicU64,
}

pub struct MetricsCollector {
    total_analyses: AtomicU64,
    total_errors: AtomicU64,
    total_detections: AtomicU64,
    total_flagged: AtomicU64,
    total_duration_ms: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    start_time: parking_lot::RwLock<Instant>,
    by_source_type: DashMap<String, SourceTypeCounters>,
    by_strategy: DashMap<String, StrategyCounters>,
    errors_by_phase: DashMap<String, AtomicU64>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            total_analyses: AtomicU64::new(0),
            total_errors: AtomicU64::new(0),
            total_detections: AtomicU64::new(0),
            total_flagged: AtomicU64::new(0),
            total_duration_ms: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            start_time: parking_lot::RwLock::new(Instant::now()),
            by_source_type: DashMap::new(),
            by_strategy: DashMap::new(),
            errors_by_phase: DashMap::new(),
        }
    }

    fn avg(total: u64, count: u64) -> f64 {
        if count == 0 {
            0.0
        } else {
            total as f64 / count as f64
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics for MetricsCollector {
    fn record_analysis(&self, source_type: &str, duration_ms: u64) {
        self.total_analyses.fetch_add(1, Ordering::Relaxed);
        self.total_duration_ms.fetch_add(duration_ms, Ordering::Relaxed);
        let entry = self.by_source_type.entry(source_type.to_string()).or_default();
        entry.analyses.fetch_add(1, Ordering::Relaxed);
        entry.total_duration_ms.fetch_add(duration_ms, Ordering::Relaxed);
    }

    fn record_detection(&self, strategy: &str, detected: bool, duration_ms: u64) {
        self.total_detections.fetch_add(1, Ordering::Relaxed);
        let entry = self.by_strategy.entry(strategy.to_string()).or_default();
        entry.executions.fetch_add(1, Ordering::Relaxed);
        entry.total_duration_ms.fetch_add(duration_ms, Ordering::Relaxed);
        if detected {
            entry.detections.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn record_flagged(&self, source_type: &str) {
        self.total_flagged.fetch_add(1, Ordering::Relaxed);
        self.by_source_type
            .entry(source_type.to_string())
            .or_default()
            .flagged
            .fetch_add(1, Ordering::Relaxed);
    }

    fn record_error(&self, source_type: &str, phase: &str) {
        self.total_errors.fetch_add(1, Ordering::Relaxed);
        self.errors_by_phase
            .entry(phase.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
        self.by_source_type
            .entry(source_type.to_string())
            .or_default()
            .errors
            .fetch_add(1, Ordering::Relaxed);
    }

    fn record_cache_hit(&self, source_type: &str) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
        self.by_source_type
            .entry(source_type.to_string())
            .or_default()
            .cache_hits
            .fetch_add(1, Ordering::Relaxed);
    }

    fn record_cache_miss(&self, source_type: &str) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
        self.by_source_type
            .entry(source_type.to_string())
            .or_default()
            .cache_misses
            .fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> MetricsSnapshot {
        let by_source_type = self
            .by_source_type
            .iter()
            .map(|e| {
                let analyses = e.analyses.load(Ordering::Relaxed);
                let total_duration_ms = e.total_duration_ms.load(Ordering::Relaxed);
                (
                    e.key().clone(),
                    SourceTypeStats {
                        analyses,
                        errors: e.errors.load(Ordering::Relaxed),
                        detections: e.detections.load(Ordering::Relaxed),
                        flagged: e.flagged.load(Ordering::Relaxed),
                        total_duration_ms,
                        avg_duration_ms: Self::avg(total_duration_ms, analyses),
                        cache_hits: e.cache_hits.load(Ordering::Relaxed),
                        cache_misses: e.cache_misses.load(Ordering::Relaxed),
                    },
                )
            })
            .collect();

        let by_strategy = self
            .by_strategy
            .iter()
            .map(|e| {
                let executions = e.executions.load(Ordering::Relaxed);
                let total_duration_ms = e.total_duration_ms.load(Ordering::Relaxed);
                (
                    e.key().clone(),
                    StrategyStats {
                        executions,
                        detections: e.detections.load(Ordering::Relaxed),
                        total_duration_ms,
                        avg_duration_ms: Self::avg(total_duration_ms, executions),
                    },
                )
            })
            .collect();

        let errors_by_phase = self
            .errors_by_phase
            .iter()
            .map(|e| (e.key().clone(), e.value().load(Ordering::Relaxed)))
            .collect();

        let total_analyses = self.total_analyses.load(Ordering::Relaxed);
        let total_duration_ms = self.total_duration_ms.load(Ordering::Relaxed);

        MetricsSnapshot {
            total_analyses,
            total_errors: self.total_errors.load(Ordering::Relaxed),
            total_detections: self.total_detections.load(Ordering::Relaxed),
            total_flagged: self.total_flagged.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.read().elapsed().as_secs(),
            avg_analysis_duration_ms: Self::avg(total_duration_ms, total_analyses),
            by_source_type,
            by_strategy,
            errors_by_phase,
        }
    }

    fn prometheus_text(&self) -> String {
        let s = self.snapshot();
        let mut out = String::new();

        let globals: &[(&str, &str, String)] = &[
            ("cadence_analyses_total", "Total analyses run.", s.total_analyses.to_string()),
            ("cadence_errors_total", "Total errors encountered.", s.total_errors.to_string()),
            ("cadence_detections_total", "Total detections emitted.", s.total_detections.to_string()),
            ("cadence_flagged_total", "Total items flagged.", s.total_flagged.to_string()),
            ("cadence_uptime_seconds", "Process uptime in seconds.", s.uptime_seconds.to_string()),
            (
                "cadence_analysis_avg_duration_ms",
                "Average analysis duration in milliseconds.",
                format!("{:.3}", s.avg_analysis_duration_ms),
            ),
            ("cadence_cache_hits_total", "Total cache hits.", s.cache_hits.to_string()),
            ("cadence_cache_misses_total", "Total cache misses.", s.cache_misses.to_string()),
        ];
        for (name, help, value) in globals {
            out.push_str(&format!("# HELP {name} {help}\n"));
            out.push_str(&format!("# TYPE {name} gauge\n"));
            out.push_str(&format!("{name} {value}\n"));
        }

        out.push_str("# HELP cadence_source_analyses Analyses run, by source type.\n");
        out.push_str("# TYPE cadence_source_analyses counter\n");
        for (source, stats) in &s.by_source_type {
            out.push_str(&format!("cadence_source_analyses{{source=\"{source}\"}} {}\n", stats.analyses));
        }
        out.push_str("# HELP cadence_source_errors Errors, by source type.\n");
        out.push_str("# TYPE cadence_source_errors counter\n");
        for (source, stats) in &s.by_source_type {
            out.push_str(&format!("cadence_source_errors{{source=\"{source}\"}} {}\n", stats.errors));
        }
        out.push_str("# HELP cadence_source_detections Detections, by source type.\n");
        out.push_str("# TYPE cadence_source_detections counter\n");
        for (source, stats) in &s.by_source_type {
            out.push_str(&format!("cadence_source_detections{{source=\"{source}\"}} {}\n", stats.detections));
        }
        out.push_str("# HELP cadence_source_avg_duration_ms Average duration, by source type.\n");
        out.push_str("# TYPE cadence_source_avg_duration_ms gauge\n");
        for (source, stats) in &s.by_source_type {
            out.push_str(&format!(
                "cadence_source_avg_duration_ms{{source=\"{source}\"}} {:.3}\n",
                stats.avg_duration_ms
            ));
        }
        out.push_str("# HELP cadence_source_cache_hits Cache hits, by source type.\n");
        out.push_str("# TYPE cadence_source_cache_hits counter\n");
        for (source, stats) in &s.by_source_type {
            out.push_str(&format!("cadence_source_cache_hits{{source=\"{source}\"}} {}\n", stats.cache_hits));
        }
        out.push_str("# HELP cadence_source_cache_misses Cache misses, by source type.\n");
        out.push_str("# TYPE cadence_source_cache_misses counter\n");
        for (source, stats) in &s.by_source_type {
            out.push_str(&format!("cadence_source_cache_misses{{source=\"{source}\"}} {}\n", stats.cache_misses));
        }

        out.push_str("# HELP cadence_strategy_executions Strategy executions.\n");
        out.push_str("# TYPE cadence_strategy_executions counter\n");
        for (strategy, stats) in &s.by_strategy {
            out.push_str(&format!(
                "cadence_strategy_executions{{strategy=\"{strategy}\"}} {}\n",
                stats.executions
            ));
        }
        out.push_str("# HELP cadence_strategy_detections Strategy detections (detected=true).\n");
        out.push_str("# TYPE cadence_strategy_detections counter\n");
        for (strategy, stats) in &s.by_strategy {
            out.push_str(&format!(
                "cadence_strategy_detections{{strategy=\"{strategy}\"}} {}\n",
                stats.detections
            ));
        }
        out.push_str("# HELP cadence_strategy_avg_duration_ms Average duration, by strategy.\n");
        out.push_str("# TYPE cadence_strategy_avg_duration_ms gauge\n");
        for (strategy, stats) in &s.by_strategy {
            out.push_str(&format!(
                "cadence_strategy_avg_duration_ms{{strategy=\"{strategy}\"}} {:.3}\n",
                stats.avg_duration_ms
            ));
        }

        out.push_str("# HELP cadence_errors_by_phase Errors, by pipeline phase.\n");
        out.push_str("# TYPE cadence_errors_by_phase counter\n");
        for (phase, count) in &s.errors_by_phase {
            out.push_str(&format!("cadence_errors_by_phase{{phase=\"{phase}\"}} {count}\n"));
        }

        out
    }

    fn reset(&self) {
        self.total_analyses.store(0, Ordering::Relaxed);
        self.total_errors.store(0, Ordering::Relaxed);
        self.total_detections.store(0, Ordering::Relaxed);
        self.total_flagged.store(0, Ordering::Relaxed);
        self.total_duration_ms.store(0, Ordering::Relaxed);
        self.cache_hits.store(0, Ordering::Relaxed);
        self.cache_misses.store(0, Ordering::Relaxed);
        *self.start_time.write() = Instant::now();
        self.by_source_type.clear();
        self.by_strategy.clear();
        self.errors_by_phase.clear();
    }
}

/// No-op metrics collector — used when metrics are disabled.
pub struct NoopMetrics;

impl Metrics for NoopMetrics {
    fn record_analysis(&self, _source_type: &str, _duration_ms: u64) {}
    fn record_detection(&self, _strategy: &str, _detected: bool, _duration_ms: u64) {}
    fn record_flagged(&self, _source_type: &str) {}
    fn record_error(&self, _source_type: &str, _phase: &str) {}
    fn record_cache_hit(&self, _source_type: &str) {}
    fn record_cache_miss(&self, _source_type: &str) {}
    fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot::default()
    }
    fn prometheus_text(&self) -> String {
        String::new()
    }
    fn reset(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment_and_reset() {
        let metrics = MetricsCollector::new();
        metrics.record_analysis("git", 100);
        metrics.record_analysis("git", 200);
        metrics.record_detection("suspicious_additions", true, 5);
        metrics.record_error("git", "fetch");
        metrics.record_cache_hit("git");
        metrics.record_cache_miss("git");

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_analyses, 2);
        assert_eq!(snapshot.by_source_type["git"].analyses, 2);
        assert!((snapshot.by_source_type["git"].avg_duration_ms - 150.0).abs() < 1e-9);
        assert_eq!(snapshot.by_strategy["suspicious_additions"].detections, 1);
        assert_eq!(snapshot.errors_by_phase["fetch"], 1);
        assert_eq!(snapshot.by_source_type["git"].errors, 1);
        assert_eq!(snapshot.by_source_type["git"].cache_hits, 1);
        assert_eq!(snapshot.by_source_type["git"].cache_misses, 1);
        assert_eq!(snapshot.cache_hits, 1);
        assert_eq!(snapshot.cache_misses, 1);

        metrics.reset();
        assert_eq!(metrics.snapshot().total_analyses, 0);
    }

    #[test]
    fn prometheus_text_includes_help_and_type_lines() {
        let metrics = MetricsCollector::new();
        metrics.record_analysis("web", 10);
        let text = metrics.prometheus_text();
        assert!(text.contains("# HELP cadence_analyses_total"));
        assert!(text.contains("cadence_source_analyses{source=\"web\"} 1"));
    }
}
