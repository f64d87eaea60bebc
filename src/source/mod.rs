// src/source/mod.rs
//
// Source: an adapter that validates an input locator and produces a
// SourceData payload plus metadata (spec §4.1). Two built-in families
// ship here — repository and web — and the trait is open to more.

pub mod repository;
pub mod web;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::data::SourceData;
use crate::error::CadenceError;

/// Shared cancellation flag threaded through every I/O-touching Source
/// call, so a caller (the streaming runner) can abort a clone/GET in
/// flight instead of only refusing to start the next phase.
pub type CancelFlag = Arc<AtomicBool>;

pub fn fresh_cancel_flag() -> CancelFlag {
    Arc::new(AtomicBool::new(false))
}

pub fn is_cancelled(flag: &CancelFlag) -> bool {
    flag.load(Ordering::SeqCst)
}

#[async_trait]
pub trait Source: Send + Sync {
    /// A stable tag identifying the source family ("git", "web", ...).
    fn source_type(&self) -> &'static str;

    /// Cheap checks (path exists, URL parses). Must not perform I/O.
    /// Checks `cancel` before doing any work so an already-cancelled run
    /// never issues so much as a stat() call.
    async fn validate(&self, cancel: &CancelFlag) -> Result<(), CadenceError>;

    /// Potentially blocking I/O (clone, HTTP GET). Checks `cancel` before
    /// starting, and implementations that run as a long-lived external
    /// process should poll it periodically so an in-flight clone/fetch can
    /// be aborted rather than always running to completion.
    async fn fetch(&self, cancel: &CancelFlag) -> Result<SourceData, CadenceError>;
}

pub use repository::RepositorySource;
pub use web::WebSource;
