// src/runner/streaming.rs
//
// Streaming runner (spec §4.6): same flow as the synchronous runner but
// emits a lazy, finite, non-restartable sequence of StreamEvents over a
// bounded channel instead of returning one finished report. The SSE
// adapter (src/http/sse.rs) sits on top of this.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::cache::{Cache, NoopCache};
use crate::data::{AnalysisReport, Detection};
use crate::error::CadenceError;
use crate::metrics::{Metrics, NoopMetrics};
use crate::report;
use crate::runner::PhaseClock;
use crate::source::repository::clone_remote;
use crate::source::{CancelFlag, Source};
use crate::strategy::detector::Detector;

/// How the streaming runner should obtain its `Source` once the run starts.
/// Cloning a remote repository happens inside the same background task that
/// drives the rest of the analysis, so the SSE handler can return its first
/// bytes (the `queued` event) immediately instead of blocking on the clone.
pub enum SourceSetup {
    Ready(Arc<dyn Source>),
    CloneRepository {
        url: String,
        branch: Option<String>,
        exclude: Vec<String>,
    },
}

impl From<Arc<dyn Source>> for SourceSetup {
    fn from(source: Arc<dyn Source>) -> Self {
        SourceSetup::Ready(source)
    }
}

/// How often a heartbeat progress event is sent while a clone is in flight.
const CLONE_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum Progress {
    Queued,
    Validating,
    Fetching,
    Cloning,
    Detecting { current: u64, total: u64 },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    Progress {
        phase: Progress,
        message: String,
        elapsed_ms: i64,
    },
    Detection {
        detection: Detection,
    },
    Complete {
        report: Box<AnalysisReport>,
    },
    Error {
        message: String,
    },
}

/// Channel buffer size for the event stream — bounded so a slow
/// consumer can never let the producer run unbounded memory.
const CHANNEL_CAPACITY: usize = 64;

pub struct StreamingRunner {
    pub disabled: HashSet<String>,
    pub cache: Arc<dyn Cache>,
    pub metrics: Arc<dyn Metrics>,
}

impl StreamingRunner {
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

    /// Starts the run on a background task and returns the receiving end
    /// of the event channel plus a cancellation handle. A synthetic
    /// `queued` progress event is emitted before anything else — including
    /// before a `CloneRepository` setup starts shelling out to `git` — so
    /// the caller sees liveness immediately (spec §4.11).
    pub fn run(
        self: Arc<Self>,
        setup: impl Into<SourceSetup>,
        detectors: Vec<Box<dyn Detector>>,
    ) -> (mpsc::Receiver<StreamEvent>, Arc<AtomicBool>) {
        let setup = setup.into();
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let cancelled = Arc::new(AtomicBool::new(false));
        let cancelled_task = cancelled.clone();

        tokio::spawn(async move {
            send_progress(&tx, Progress::Queued, "queued", 0).await;

            let source: Arc<dyn Source> = match setup {
                SourceSetup::Ready(source) => source,
                SourceSetup::CloneRepository { url, branch, exclude } => {
                    match clone_with_heartbeat(&tx, &cancelled_task, url, branch, exclude).await {
                        Ok(source) => Arc::new(source),
                        Err(e) => {
                            let _ = tx.send(StreamEvent::Error { message: e.to_string() }).await;
                            return;
                        }
                    }
                }
            };

            let tx_for_panic = tx.clone();
            let drive_handle = tokio::spawn(async move { self.drive(&*source, &detectors, &tx, &cancelled_task).await });

            match drive_handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    let _ = tx_for_panic.send(StreamEvent::Error { message: e.to_string() }).await;
                }
                Err(join_err) if join_err.is_panic() => {
                    let _ = tx_for_panic
                        .send(StreamEvent::Error {
                            message: "internal analysis error: panic during analysis".to_string(),
                        })
                        .await;
                }
                Err(_) => {} // task cancelled, nothing left to report
            }
        });

        (rx, cancelled)
    }

    async fn drive(
        &self,
        source: &dyn Source,
        detectors: &[Box<dyn Detector>],
        tx: &mpsc::Sender<StreamEvent>,
        cancelled: &Arc<AtomicBool>,
    ) -> Result<(), CadenceError> {
        let mut clock = PhaseClock::start();
        let cancel_flag: CancelFlag = cancelled.clone();
        let source_type = source.source_type();

        if cancelled.load(Ordering::SeqCst) {
            return Err(CadenceError::Cancelled("stream cancelled before validation".to_string()));
        }
        send_progress(tx, Progress::Validating, "validating source", clock.elapsed_ms()).await;
        if let Err(e) = clock.record_async("validate", source.validate(&cancel_flag)).await {
            self.metrics.record_error(source_type, "validate");
            return Err(CadenceError::validation(format!("source validation failed: {e}")));
        }

        if cancelled.load(Ordering::SeqCst) {
            return Err(CadenceError::Cancelled("stream cancelled before fetch".to_string()));
        }
        send_progress(tx, Progress::Fetching, "fetching source data", clock.elapsed_ms()).await;
        let source_data = match clock.record_async("fetch", source.fetch(&cancel_flag)).await {
            Ok(d) => d,
            Err(e) => {
                self.metrics.record_error(source_type, "fetch");
                return Err(CadenceError::io(format!("source fetch failed: {e}")));
            }
        };

        if let Some(cached) = self.cache.get(source_type, &source_data.id) {
            self.metrics.record_cache_hit(source_type);
            for d in &cached.detections {
                if tx.send(StreamEvent::Detection { detection: d.clone() }).await.is_err() {
                    return Ok(());
                }
            }
            let _ = tx
                .send(StreamEvent::Complete {
                    report: Box::new(cached),
                })
                .await;
            return Ok(());
        }
        self.metrics.record_cache_miss(source_type);

        let mut report = AnalysisReport::new(source_type.to_string(), source_data.id.clone(), clock.started_at());
        report.metrics = source_data.metadata.clone();

        let total = detectors.len() as u64;
        let mut all_detections = Vec::new();

        for (i, detector) in detectors.iter().enumerate() {
            if cancelled.load(Ordering::SeqCst) {
                return Err(CadenceError::Cancelled("stream cancelled".to_string()));
            }

            let batch = clock
                .record("detect", || detector.detect(&source_data, &self.disabled))
                .inspect_err(|_| {
                    self.metrics.record_error(source_type, "detect");
                })?;
            for d in &batch {
                self.metrics.record_detection(&d.strategy, d.detected, 0);
                if tx.send(StreamEvent::Detection { detection: d.clone() }).await.is_err() {
                    return Ok(()); // receiver gone; stop producing quietly
                }
            }
            all_detections.extend(batch);

            send_progress(
                tx,
                Progress::Detecting {
                    current: (i + 1) as u64,
                    total,
                },
                "detector completed",
                clock.elapsed_ms(),
            )
            .await;
        }

        report.detections = all_detections;
        report.timing.finish(Utc::now());
        report.timing.phases = clock.into_phases();
        report::score(&mut report);

        self.metrics.record_analysis(source_type, report.timing.duration_ms.max(0) as u64);
        if report.detection_count > 0 {
            self.metrics.record_flagged(source_type);
        }
        self.cache.set(source_type, &source_data.id, report.clone());

        let _ = tx
            .send(StreamEvent::Complete {
                report: Box::new(report),
            })
            .await;
        Ok(())
    }
}

impl Default for StreamingRunner {
    fn default() -> Self {
        Self::new()
    }
}

/// Races a repository clone against a heartbeat ticker so the caller keeps
/// seeing progress events while `git clone` is still running in the
/// background, instead of a long silent gap before the first real phase.
async fn clone_with_heartbeat(
    tx: &mpsc::Sender<StreamEvent>,
    cancelled: &Arc<AtomicBool>,
    url: String,
    branch: Option<String>,
    exclude: Vec<String>,
) -> Result<crate::source::RepositorySource, CadenceError> {
    let started = std::time::Instant::now();
    let mut ticker = tokio::time::interval(CLONE_HEARTBEAT_INTERVAL);
    ticker.tick().await; // first tick fires immediately; consume it before the loop

    let clone_future = clone_remote(&url, branch.as_deref(), exclude);
    tokio::pin!(clone_future);

    loop {
        tokio::select! {
            result = &mut clone_future => {
                return result;
            }
            _ = ticker.tick() => {
                if cancelled.load(Ordering::SeqCst) {
                    return Err(CadenceError::Cancelled("clone cancelled".to_string()));
                }
                send_progress(tx, Progress::Cloning, "cloning repository", started.elapsed().as_millis() as i64).await;
            }
        }
    }
}

async fn send_progress(tx: &mpsc::Sender<StreamEvent>, phase: Progress, message: &str, elapsed_ms: i64) {
    let _ = tx
        .send(StreamEvent::Progress {
            phase,
            message: message.to_string(),
            elapsed_ms,
        })
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::WebSource;
    use crate::strategy::detector::WebDetector;
    use async_trait::async_trait;

    struct StaticPageSource;

    #[async_trait]
    impl Source for StaticPageSource {
        fn source_type(&self) -> &'static str {
            "web"
        }
        async fn validate(&self, _cancel: &CancelFlag) -> Result<(), CadenceError> {
            Ok(())
        }
        async fn fetch(&self, _cancel: &CancelFlag) -> Result<crate::data::SourceData, CadenceError> {
            Ok(crate::data::SourceData {
                id: "page".to_string(),
                source_type: "web".to_string(),
                raw_content: crate::data::RawContent::Page(crate::data::PageContent {
                    all_text: "a short plain page".to_string(),
                    ..Default::default()
                }),
                metadata: Default::default(),
            })
        }
    }

    #[tokio::test]
    async fn emits_complete_exactly_once() {
        let _ = WebSource::new("example.com"); // keep import live for clarity
        let runner = Arc::new(StreamingRunner::new());
        let detectors: Vec<Box<dyn Detector>> = vec![Box::new(WebDetector::new(
            crate::strategy::web_strategies::default_strategies(),
        ))];
        let source: Arc<dyn Source> = Arc::new(StaticPageSource);
        let (mut rx, _cancel) = runner.run(source, detectors);

        let mut completes = 0;
        let mut errors = 0;
        while let Some(event) = rx.recv().await {
            match event {
                StreamEvent::Complete { .. } => completes += 1,
                StreamEvent::Error { .. } => errors += 1,
                _ => {}
            }
        }
        assert_eq!(completes, 1);
        assert_eq!(errors, 0);
    }
}
