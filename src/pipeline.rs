// src/pipeline.rs
//! Run driver: collect raw records from every configured source, then
//! normalize, upgrade aggregator links, canonicalize, dedup, filter, and
//! sort. Only configuration problems abort a run; every later failure is
//! stage-local and degrades.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;

use crate::config::Config;
use crate::dedup;
use crate::fetch;
use crate::freshness::{self, FreshnessPolicy};
use crate::model::{Listing, RunHealth, SourceStats, StageCounts};
use crate::normalize;
use crate::resolve::{self, aggregator, canonical};
use crate::sources::{feed::FeedSource, site::SiteSource, ListingSource, SourceYield};

pub struct RunOutput {
    pub catalog: Vec<Listing>,
    pub health: RunHealth,
}

/// Build the source list from config and execute a full run.
pub async fn run(cfg: &Config) -> Result<RunOutput> {
    let client = fetch::client(cfg.request_timeout())?;
    let mut sources: Vec<Box<dyn ListingSource>> = Vec::new();
    for f in &cfg.feeds {
        sources.push(Box::new(FeedSource::new(&f.url, f.label.as_deref())));
    }
    for s in &cfg.sites {
        sources.push(Box::new(SiteSource::new(s.clone())));
    }
    Ok(run_with_sources(cfg, &client, &sources).await)
}

/// Execute the pipeline over explicit sources. Past this point nothing is
/// fatal: a fully failed run still yields an empty catalog and a health
/// report with zero counts.
pub async fn run_with_sources(
    cfg: &Config,
    client: &reqwest::Client,
    sources: &[Box<dyn ListingSource>],
) -> RunOutput {
    let started_at = Utc::now();
    let mut stages = StageCounts::default();
    let mut per_source: BTreeMap<String, SourceStats> = BTreeMap::new();

    let mut raw = Vec::new();
    for source in sources {
        let label = source.label().to_string();
        let slot = per_source.entry(label.clone()).or_default();
        match source.collect(client).await {
            Ok(SourceYield { listings, stats }) => {
                slot.items += stats.items;
                slot.pages_crawled += stats.pages_crawled;
                slot.links_indexed += stats.links_indexed;
                tracing::info!(source = %label, items = listings.len(), "source collected");
                raw.extend(listings);
            }
            Err(e) => {
                tracing::warn!(error = ?e, source = %label, "source failed, contributing zero records");
            }
        }
    }
    stages.raw = raw.len();

    let now = Utc::now();
    let normalized: Vec<Listing> = raw
        .iter()
        .filter_map(|r| normalize::normalize(r, now, cfg.pipeline.skew_tolerance_secs))
        .collect();
    stages.normalized = normalized.len();

    let upgraded = if cfg.pipeline.resolve_aggregators {
        let sets = Arc::new(aggregator::HostSets {
            aggregators: cfg.aggregator_hosts(),
            ignored: cfg.ignored_hosts(),
        });
        let client = client.clone();
        let out = resolve::map_indexed(
            normalized.clone(),
            cfg.pipeline.aggregator_workers,
            move |l| {
                let client = client.clone();
                let sets = Arc::clone(&sets);
                async move { aggregator::resolve(&client, &sets, l).await }
            },
        )
        .await;
        stages.upgraded = count_changed(&normalized, &out);
        out
    } else {
        normalized.clone()
    };

    let canonicalized = if cfg.pipeline.resolve_canonical {
        let client = client.clone();
        let out = resolve::map_indexed(
            upgraded.clone(),
            cfg.pipeline.canonical_workers,
            move |l| {
                let client = client.clone();
                async move { canonical::resolve(&client, l).await }
            },
        )
        .await;
        stages.canonicalized = count_changed(&upgraded, &out);
        out
    } else {
        upgraded
    };

    let (deduped, merged) = dedup::dedup(canonicalized);
    stages.deduped = deduped.len();
    tracing::info!(merged, surviving = deduped.len(), "deduplication finished");

    let policy = FreshnessPolicy {
        drop_past_deadlines: cfg.pipeline.drop_past_deadlines,
        max_age_days: cfg.pipeline.max_age_days,
    };
    let mut catalog = freshness::filter(deduped, Utc::now(), &policy);
    stages.kept = catalog.len();

    // createdAt descending with missing dates last; title breaks ties so
    // the output order is reproducible.
    catalog.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.title.cmp(&b.title))
    });

    let health = RunHealth {
        started_at,
        finished_at: Utc::now(),
        stages,
        sources: per_source,
    };
    RunOutput { catalog, health }
}

fn count_changed(before: &[Listing], after: &[Listing]) -> usize {
    before
        .iter()
        .zip(after)
        .filter(|(a, b)| a.link != b.link)
        .count()
}

/// Write both artifacts as full replacements of any previous run's output.
pub fn write_artifacts(out_dir: &Path, output: &RunOutput) -> Result<()> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("creating output dir {}", out_dir.display()))?;
    let catalog_path = out_dir.join("catalog.json");
    let health_path = out_dir.join("health.json");
    std::fs::write(
        &catalog_path,
        serde_json::to_string_pretty(&output.catalog).context("serializing catalog")?,
    )
    .with_context(|| format!("writing {}", catalog_path.display()))?;
    std::fs::write(
        &health_path,
        serde_json::to_string_pretty(&output.health).context("serializing health report")?,
    )
    .with_context(|| format!("writing {}", health_path.display()))?;
    tracing::info!(
        catalog = %catalog_path.display(),
        health = %health_path.display(),
        kept = output.catalog.len(),
        "artifacts written"
    );
    Ok(())
}
