// src/sources/feed.rs
//! Syndication feed reader. Handles three dialects, sniffed structurally:
//! RSS 2.0 (`<item>`), Atom (`<entry>`), and a JSON item list. Extraction
//! falls through ordered alternatives per field rather than assuming one
//! well-formed shape.

use anyhow::{Context, Result};
use async_trait::async_trait;
use quick_xml::de::from_str;
use serde::Deserialize;

use crate::fetch;
use crate::model::{RawListing, SourceStats};
use crate::normalize::host_of;
use crate::sources::{ListingSource, SourceYield};

pub struct FeedSource {
    url: String,
    label: String,
}

impl FeedSource {
    pub fn new(url: &str, label: Option<&str>) -> Self {
        let label = label
            .map(str::to_string)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| {
                let h = host_of(&crate::normalize::clean_url(url));
                if h.is_empty() { url.to_string() } else { h }
            });
        Self {
            url: url.to_string(),
            label,
        }
    }
}

#[async_trait]
impl ListingSource for FeedSource {
    async fn collect(&self, client: &reqwest::Client) -> Result<SourceYield> {
        let body = fetch::fetch_text(client, &self.url, fetch::ACCEPT_FEED).await?;
        let listings = parse_feed(&body, &self.label)
            .with_context(|| format!("parsing feed {}", self.url))?;
        let stats = SourceStats {
            items: listings.len(),
            pages_crawled: 1,
            links_indexed: listings.len(),
        };
        Ok(SourceYield { listings, stats })
    }

    fn label(&self) -> &str {
        &self.label
    }
}

// ---------- RSS 2.0 ----------

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    items: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct RssItem {
    title: Option<String>,
    link: Option<String>,
    guid: Option<Guid>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    #[serde(rename = "dc:date")]
    dc_date: Option<String>,
    #[serde(rename = "category", default)]
    categories: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Guid {
    #[serde(rename = "@isPermaLink")]
    is_perma_link: Option<String>,
    #[serde(rename = "$text")]
    value: Option<String>,
}

// ---------- Atom ----------

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    title: Option<String>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
    id: Option<String>,
    published: Option<String>,
    updated: Option<String>,
    #[serde(rename = "category", default)]
    categories: Vec<AtomCategory>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@rel")]
    rel: Option<String>,
    #[serde(rename = "@href")]
    href: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomCategory {
    #[serde(rename = "@term")]
    term: Option<String>,
}

/// Parse a feed document into raw listings, in document order. No dedup
/// happens here.
pub fn parse_feed(body: &str, label: &str) -> Result<Vec<RawListing>> {
    let trimmed = body.trim_start();
    if trimmed.starts_with('[') || trimmed.starts_with('{') {
        return parse_json_items(trimmed, label);
    }
    if body.contains("<entry") {
        return parse_atom(body, label);
    }
    parse_rss(body, label)
}

fn parse_rss(body: &str, label: &str) -> Result<Vec<RawListing>> {
    let xml = scrub_entities_for_xml(body);
    let rss: Rss = from_str(&xml).context("parsing rss xml")?;
    let mut out = Vec::with_capacity(rss.channel.items.len());
    for it in rss.channel.items {
        let link = it
            .link
            .filter(|l| !l.trim().is_empty())
            .or_else(|| permalink_from_guid(it.guid.as_ref()))
            .unwrap_or_default();
        out.push(RawListing {
            title: it.title.unwrap_or_default(),
            link,
            source: Some(label.to_string()),
            created_at: it.pub_date.or(it.dc_date),
            deadline: None,
            prize: None,
            tags: it
                .categories
                .into_iter()
                .filter(|c| !c.trim().is_empty())
                .collect(),
        });
    }
    Ok(out)
}

fn permalink_from_guid(guid: Option<&Guid>) -> Option<String> {
    let g = guid?;
    let value = g.value.as_deref()?.trim();
    let declared_plain = g
        .is_perma_link
        .as_deref()
        .is_some_and(|v| v.eq_ignore_ascii_case("false"));
    if !declared_plain && value.starts_with("http") {
        Some(value.to_string())
    } else {
        None
    }
}

fn parse_atom(body: &str, label: &str) -> Result<Vec<RawListing>> {
    let xml = scrub_entities_for_xml(body);
    let feed: AtomFeed = from_str(&xml).context("parsing atom xml")?;
    let mut out = Vec::with_capacity(feed.entries.len());
    for e in feed.entries {
        let link = e
            .links
            .iter()
            .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
            .or_else(|| e.links.first())
            .and_then(|l| l.href.clone())
            .or_else(|| e.id.clone().filter(|id| id.starts_with("http")))
            .unwrap_or_default();
        out.push(RawListing {
            title: e.title.unwrap_or_default(),
            link,
            source: Some(label.to_string()),
            created_at: e.published.or(e.updated),
            deadline: None,
            prize: None,
            tags: e.categories.into_iter().filter_map(|c| c.term).collect(),
        });
    }
    Ok(out)
}

fn parse_json_items(body: &str, label: &str) -> Result<Vec<RawListing>> {
    let value: serde_json::Value = serde_json::from_str(body).context("parsing json feed")?;
    let items = match &value {
        serde_json::Value::Array(a) => a.as_slice(),
        serde_json::Value::Object(o) => o
            .get("items")
            .and_then(|v| v.as_array())
            .map(|a| a.as_slice())
            .unwrap_or_default(),
        _ => &[],
    };
    let str_of = |item: &serde_json::Value, keys: &[&str]| -> Option<String> {
        keys.iter()
            .find_map(|k| item.get(*k).and_then(|v| v.as_str()))
            .map(str::to_string)
    };
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        out.push(RawListing {
            title: str_of(item, &["title", "name"]).unwrap_or_default(),
            link: str_of(item, &["link", "url"]).unwrap_or_default(),
            source: str_of(item, &["source"]).or_else(|| Some(label.to_string())),
            created_at: str_of(item, &["date", "published_at", "createdAt"]),
            deadline: str_of(item, &["deadline", "closes"]),
            prize: str_of(item, &["prize"]),
            tags: item
                .get("tags")
                .and_then(|v| v.as_array())
                .map(|a| {
                    a.iter()
                        .filter_map(|t| t.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default(),
        });
    }
    Ok(out)
}

/// Feeds in the wild mix named HTML entities into XML payloads; scrub the
/// usual offenders before handing the document to the XML parser.
fn scrub_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}
