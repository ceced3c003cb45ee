pub mod app_state;
pub mod cache;
pub mod config;
pub mod crawler;
pub mod dedup;
pub mod enrichment;
pub mod entities;
pub mod error;
pub mod extractor;
pub mod fetcher;
pub mod jobs;
pub mod logging;
pub mod pipeline;
pub mod relevance;
pub mod repositories;

pub use error::PipelineError;
pub use pipeline::Pipeline;
