// src/runner/mod.rs
//
// The two runner flavors share everything except how they deliver
// progress to the caller (spec §4.5, §4.6): one returns a finished
// report, the other yields a live event sequence. `PhaseClock` captures
// the bookkeeping common to both so neither duplicates timing logic.

pub mod streaming;
pub mod sync;

use std::time::Instant;

use chrono::Utc;

use crate::data::PhaseTiming;

pub use streaming::{StreamEvent, StreamingRunner};
pub use sync::SyncRunner;

/// Tracks wall-clock duration of named phases within a single run.
pub(crate) struct PhaseClock {
    t0: Instant,
    started_at: chrono::DateTime<chrono::Utc>,
    phases: Vec<PhaseTiming>,
}

impl PhaseClock {
    pub(crate) fn start() -> Self {
        Self {
            t0: Instant::now(),
            started_at: Utc::now(),
            phases: Vec::new(),
        }
    }

    pub(crate) fn started_at(&self) -> chrono::DateTime<chrono::Utc> {
        self.started_at
    }

    /// Runs `f`, recording its wall-clock duration under `name`.
    pub(crate) fn record<T>(&mut self, name: &str, f: impl FnOnce() -> T) -> T {
        let phase_start = Utc::now();
        let before = Instant::now();
        let result = f();
        let duration_ms = before.elapsed().as_millis() as i64;
        self.phases.push(PhaseTiming {
            name: name.to_string(),
            started_at: phase_start,
            duration_ms,
        });
        result
    }

    /// Async counterpart of `record`, for awaiting a Source's validate/fetch.
    pub(crate) async fn record_async<T, F>(&mut self, name: &str, fut: F) -> T
    where
        F: std::future::Future<Output = T>,
    {
        let phase_start = Utc::now();
        let before = Instant::now();
        let result = fut.await;
        let duration_ms = before.elapsed().as_millis() as i64;
        self.phases.push(PhaseTiming {
            name: name.to_string(),
            started_at: phase_start,
            duration_ms,
        });
        result
    }

    pub(crate) fn elapsed_ms(&self) -> i64 {
        self.t0.elapsed().as_millis() as i64
    }

    pub(crate) fn into_phases(self) -> Vec<PhaseTiming> {
        self.phases
    }
}
