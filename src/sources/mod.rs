// src/sources/mod.rs
//! Raw-listing producers. Each source runs independently; a failing source
//! yields zero records and a warning, never an aborted run.

pub mod feed;
pub mod site;

use anyhow::Result;
use async_trait::async_trait;

use crate::model::{RawListing, SourceStats};

/// What one source contributed to the run: its records in source-document
/// (or discovery) order plus structural stats for the health report.
#[derive(Debug, Default)]
pub struct SourceYield {
    pub listings: Vec<RawListing>,
    pub stats: SourceStats,
}

#[async_trait]
pub trait ListingSource: Send + Sync {
    /// Fetch and extract this source's raw listings. Errors reported here
    /// cover the whole source; per-page problems are handled inside.
    async fn collect(&self, client: &reqwest::Client) -> Result<SourceYield>;

    /// Label used for health-report keys and as the default source tag.
    fn label(&self) -> &str;
}
