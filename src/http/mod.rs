// src/http/mod.rs
//
// Streaming HTTP surface (spec §4.11): SSE endpoints wrapping the
// Streaming Runner, HMAC-verified webhook intake, and observability
// endpoints. Router assembly follows the teacher's axum-free style in
// spirit (grpc_api.rs hand-rolls its own framing) but the transport
// itself is grounded in the axum usage found elsewhere in the retrieval
// pack, since SSE needs a real HTTP server underneath it.

pub mod server;
pub mod sse;
pub mod webhook;

use std::sync::Arc;

use crate::cache::Cache;
use crate::config::Config;
use crate::metrics::Metrics;
use crate::plugin::PluginManager;
use crate::queue::JobQueue;
use crate::strategy::registry::StrategyRegistry;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub cache: Arc<dyn Cache>,
    pub metrics: Arc<dyn Metrics>,
    pub registry: Arc<StrategyRegistry>,
    pub plugins: Arc<PluginManager>,
    pub queue: Arc<JobQueue>,
}

pub use server::build_router;
