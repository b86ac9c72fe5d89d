//! verdant-ingestion: Bulk paper ingestion and metadata enrichment.
//! - Source sweep (CrossRef) with per-run deduplication
//! - Chunked on-disk working set and checkpointed processing
//! - Keyword pre-filter ahead of paid classification
//! - Structured enrichment through the text-classification service
//! - Transactional paper/metadata writes

pub mod sources;
pub mod models;
pub mod dedup;
pub mod cache;
pub mod checkpoint;
pub mod collector;
pub mod prefilter;
pub mod enrichment;
pub mod repository;
pub mod stats;
pub mod pipeline;

pub use pipeline::{Pipeline, PipelineConfig, PipelineStatus, ProcessWindow, QueryCategory, QueryMode, RunState, RunSummary};
