// src/config.rs
//! Source-configuration document: feed URLs, site definitions, and the
//! pipeline policy knobs. Loadable from TOML or JSON; resolution order is
//! $PRIZEFEED_CONFIG, then config/sources.toml, then config/sources.json.
//! An unreadable document is the one fatal error in the system.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

pub const ENV_CONFIG_PATH: &str = "PRIZEFEED_CONFIG";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub feeds: Vec<FeedConfig>,
    #[serde(default)]
    pub sites: Vec<SiteConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub drop_past_deadlines: bool,
    pub max_age_days: i64,
    pub skew_tolerance_secs: i64,
    pub resolve_aggregators: bool,
    pub resolve_canonical: bool,
    pub aggregator_workers: usize,
    pub canonical_workers: usize,
    pub request_timeout_secs: u64,
    /// Extend the built-in aggregator/ignored host seed sets without
    /// touching resolution code.
    pub extra_aggregator_hosts: Vec<String>,
    pub extra_ignored_hosts: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            drop_past_deadlines: true,
            max_age_days: 90,
            skew_tolerance_secs: 300,
            resolve_aggregators: true,
            resolve_canonical: true,
            aggregator_workers: 4,
            canonical_workers: 8,
            request_timeout_secs: 15,
            extra_aggregator_hosts: Vec::new(),
            extra_ignored_hosts: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    pub url: String,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    pub index_url: String,
    #[serde(default = "default_pages")]
    pub pages: usize,
    #[serde(default = "default_page_param")]
    pub page_param: String,
    #[serde(default)]
    pub link_selector: Option<String>,
    #[serde(default)]
    pub allow_paths: Vec<String>,
    #[serde(default)]
    pub block_paths: Vec<String>,
    #[serde(default)]
    pub throttle_ms: u64,
    #[serde(default = "default_max_items")]
    pub max_items: usize,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub deadline_pattern: Option<String>,
}

fn default_pages() -> usize {
    1
}
fn default_page_param() -> String {
    "page".to_string()
}
fn default_max_items() -> usize {
    50
}

impl Config {
    /// Load from an explicit path; format by extension, with a content
    /// sniff fallback.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading source config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let cfg: Config = if ext == "json" || content.trim_start().starts_with('{') {
            serde_json::from_str(&content)
                .with_context(|| format!("parsing {} as JSON", path.display()))?
        } else {
            toml::from_str(&content)
                .with_context(|| format!("parsing {} as TOML", path.display()))?
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load using the env var, then the fixed fallback locations.
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            return Self::load_from(&pb);
        }
        for candidate in ["config/sources.toml", "config/sources.json"] {
            let pb = PathBuf::from(candidate);
            if pb.exists() {
                return Self::load_from(&pb);
            }
        }
        Err(anyhow!(
            "no source configuration found (set {ENV_CONFIG_PATH} or create config/sources.toml)"
        ))
    }

    fn validate(&self) -> Result<()> {
        if self.feeds.is_empty() && self.sites.is_empty() {
            return Err(anyhow!("source configuration lists no feeds and no sites"));
        }
        for site in &self.sites {
            url::Url::parse(&site.index_url)
                .with_context(|| format!("invalid site index_url {}", site.index_url))?;
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.pipeline.request_timeout_secs.max(1))
    }

    /// Known aggregator hosts: built-in seed plus config extensions.
    pub fn aggregator_hosts(&self) -> HashSet<String> {
        let mut set: HashSet<String> = [
            "theprizefinder.com",
            "www.theprizefinder.com",
            "loquax.co.uk",
            "www.loquax.co.uk",
            "competitiondatabase.co.uk",
            "www.competitiondatabase.co.uk",
            "ukcompetitions.com",
            "www.ukcompetitions.com",
            "myoffers.co.uk",
            "www.myoffers.co.uk",
        ]
        .into_iter()
        .map(str::to_string)
        .collect();
        set.extend(
            self.pipeline
                .extra_aggregator_hosts
                .iter()
                .map(|h| h.trim().to_ascii_lowercase()),
        );
        set
    }

    /// Hosts never accepted as an "original" destination: social widgets,
    /// app stores, share links.
    pub fn ignored_hosts(&self) -> HashSet<String> {
        let mut set: HashSet<String> = [
            "facebook.com",
            "www.facebook.com",
            "twitter.com",
            "x.com",
            "instagram.com",
            "www.instagram.com",
            "youtube.com",
            "www.youtube.com",
            "pinterest.com",
            "www.pinterest.com",
            "linkedin.com",
            "www.linkedin.com",
            "tiktok.com",
            "www.tiktok.com",
            "play.google.com",
            "apps.apple.com",
            "google.com",
            "www.google.com",
        ]
        .into_iter()
        .map(str::to_string)
        .collect();
        set.extend(
            self.pipeline
                .extra_ignored_hosts
                .iter()
                .map(|h| h.trim().to_ascii_lowercase()),
        );
        set
    }
}

/// URL-shortener hosts; anchors pointing through these score lower in
/// aggregator resolution.
pub fn shortener_hosts() -> HashSet<&'static str> {
    ["bit.ly", "t.co", "goo.gl", "tinyurl.com", "ow.ly", "buff.ly", "rebrand.ly"]
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn toml_document_parses_with_defaults() {
        let doc = r#"
            [pipeline]
            drop_past_deadlines = false

            [[feeds]]
            url = "https://example.com/comps.rss"

            [[sites]]
            index_url = "https://compsite.example/win"
            pages = 3
            allow_paths = ["/win/"]
        "#;
        let cfg: Config = toml::from_str(doc).unwrap();
        cfg.validate().unwrap();
        assert!(!cfg.pipeline.drop_past_deadlines);
        assert_eq!(cfg.pipeline.max_age_days, 90);
        assert_eq!(cfg.sites[0].pages, 3);
        assert_eq!(cfg.sites[0].page_param, "page");
        assert_eq!(cfg.sites[0].max_items, 50);
    }

    #[test]
    fn empty_document_is_rejected() {
        let cfg: Config = toml::from_str("").unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn extra_hosts_extend_seed_sets() {
        let doc = r#"
            [pipeline]
            extra_aggregator_hosts = ["Comps.Example"]

            [[feeds]]
            url = "https://example.com/comps.rss"
        "#;
        let cfg: Config = toml::from_str(doc).unwrap();
        assert!(cfg.aggregator_hosts().contains("comps.example"));
        assert!(cfg.aggregator_hosts().contains("loquax.co.uk"));
        assert!(cfg.ignored_hosts().contains("facebook.com"));
    }

    #[serial_test::serial]
    #[test]
    fn env_path_wins_over_fallbacks() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("sources.json");
        std::fs::write(&p, r#"{"feeds":[{"url":"https://example.com/a.rss"}]}"#).unwrap();
        env::set_var(ENV_CONFIG_PATH, p.display().to_string());
        let cfg = Config::load_default().unwrap();
        assert_eq!(cfg.feeds.len(), 1);
        env::remove_var(ENV_CONFIG_PATH);
    }
}
