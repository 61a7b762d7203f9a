// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod config;
pub mod dedup;
pub mod fetch;
pub mod freshness;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod resolve;
pub mod sources;

// ---- Re-exports for stable public API ----
pub use crate::config::Config;
pub use crate::model::{Listing, RawListing, RunHealth, SourceStats, StageCounts};
pub use crate::pipeline::{run, run_with_sources, write_artifacts, RunOutput};
