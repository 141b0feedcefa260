//! Receipt agent — message ingestion, dedup, and reply pipeline.

pub mod channels;
pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod processor;
pub mod server;
pub mod store;
