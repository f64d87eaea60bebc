// src/error.rs
//
// Error kinds propagated by the core pipeline (spec §7). Library-facing
// APIs return `Result<T, CadenceError>` so callers can match on kind;
// components that only need to propagate (dispatch, cache I/O, CLI glue)
// use `anyhow::Result` the way the teacher's `Dispatcher` does.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CadenceError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("io failed: {0}")]
    Io(String),

    #[error("analysis failed: {0}")]
    Analysis(String),

    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("internal analysis error: {0}")]
    Internal(String),
}

impl CadenceError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    pub fn analysis(msg: impl Into<String>) -> Self {
        Self::Analysis(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// True for errors the caller should never retry.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::Internal(_))
    }
}

/// Run a closure, converting any panic into `CadenceError::Internal`.
/// Mirrors the plugin manager's panic-isolation requirement (§4.4) so a
/// misbehaving Source, Strategy, or plugin can never take down the process.
pub fn catch_panic<F, T>(f: F) -> Result<T, CadenceError>
where
    F: FnOnce() -> Result<T, CadenceError> + std::panic::UnwindSafe,
{
    match std::panic::catch_unwind(f) {
        Ok(result) => result,
        Err(payload) => {
            let msg = if let Some(s) = payload.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic payload".to_string()
            };
            Err(CadenceError::internal(msg))
        }
    }
}
