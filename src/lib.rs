// src/lib.rs
//
// Detects likely AI-generated content in git repository histories and
// web pages by composing a family of independent heuristic detection
// strategies into one analysis pipeline: pluggable Sources feed
// pluggable Detectors, a Runner folds their output into a scored
// Report, and a thin HTTP surface exposes the whole thing as SSE plus
// webhook intake.

pub mod cache;
pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod http;
pub mod metrics;
pub mod plugin;
pub mod queue;
pub mod report;
pub mod runner;
pub mod source;
pub mod strategy;

pub use data::{AnalysisReport, CommitPair, Detection, PageContent, SourceData};
pub use error::CadenceError;
