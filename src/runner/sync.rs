// src/runner/sync.rs
//
// Synchronous runner (spec §4.5): validate, fetch, then run every
// detector in order, folding their detections into one report.

use std::collections::HashSet;
use std::sync::Arc;

use crate::cache::{Cache, NoopCache};
use crate::data::AnalysisReport;
use crate::error::CadenceError;
use crate::metrics::{Metrics, NoopMetrics};
use crate::report;
use crate::runner::PhaseClock;
use crate::source::{fresh_cancel_flag, Source};
use crate::strategy::detector::Detector;

pub struct SyncRunner {
    pub disabled: HashSet<String>,
    pub cache: Arc<dyn Cache>,
    pub metrics: Arc<dyn Metrics>,
}

impl SyncRunner {
    pub fn new() -> Self {
        Self {
            disabled: HashSet::new(),
            cache: Arc::new(NoopCache),
            metrics: Arc::new(NoopMetrics),
        }
    }

    pub fn with_disabled(disabled: HashSet<String>) -> Self {
        Self {
            disabled,
            ..Self::new()
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub async fn run(
        &self,
        source: &dyn Source,
        detectors: &[Box<dyn Detector>],
    ) -> Result<AnalysisReport, CadenceError> {
        let mut clock = PhaseClock::start();
        // The synchronous runner has no external cancellation source of its
        // own; it still has to pass a flag to satisfy Source's contract.
        let cancel = fresh_cancel_flag();
        let source_type = source.source_type();

        clock
            .record_async("validate", source.validate(&cancel))
            .await
            .map_err(|e| {
                self.metrics.record_error(source_type, "validate");
                CadenceError::validation(format!("source validation failed: {e}"))
            })?;

        let source_data = clock
            .record_async("fetch", source.fetch(&cancel))
            .await
            .map_err(|e| {
                self.metrics.record_error(source_type, "fetch");
                CadenceError::io(format!("source fetch failed: {e}"))
            })?;

        if let Some(cached) = self.cache.get(source_type, &source_data.id) {
            self.metrics.record_cache_hit(source_type);
            return Ok(cached);
        }
        self.metrics.record_cache_miss(source_type);

        let mut report = AnalysisReport::new(source_type.to_string(), source_data.id.clone(), clock.started_at());
        report.metrics = source_data.metadata.clone();

        let disabled = &self.disabled;
        let detections = clock
            .record("detect", || -> Result<Vec<_>, CadenceError> {
                let mut all = Vec::new();
                for detector in detectors {
                    let batch = detector.detect(&source_data, disabled)?;
                    all.extend(batch);
                }
                Ok(all)
            })
            .inspect_err(|_| {
                self.metrics.record_error(source_type, "detect");
            })?;
        for d in &detections {
            self.metrics.record_detection(&d.strategy, d.detected, 0);
        }
        report.detections = detections;

        report.timing.finish(chrono::Utc::now());
        report.timing.phases = clock.into_phases();

        report::score(&mut report);

        self.metrics.record_analysis(source_type, report.timing.duration_ms.max(0) as u64);
        if report.detection_count > 0 {
            self.metrics.record_flagged(source_type);
        }
        self.cache.set(source_type, &source_data.id, report.clone());

        Ok(report)
    }
}

impl Default for SyncRunner {
    fn default() -> Self {
        Self::new()
    }
}
