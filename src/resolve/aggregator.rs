// src/resolve/aggregator.rs
//! Aggregator-to-original link recovery. For records hosted on a known
//! aggregator, fetch the aggregator page and look for the competition's
//! real destination: first by scoring outbound anchors, then by scanning
//! the page text for URLs or bare domain tokens. Failure of any step
//! passes the record through unchanged.

use std::collections::HashSet;

use once_cell::sync::OnceCell;
use scraper::{Html, Selector};
use url::Url;

use crate::config;
use crate::fetch;
use crate::model::Listing;
use crate::normalize::{clean_url, host_of};

/// Anchor-text phrases that mark the jump-off link to the original site.
const BOOST_PHRASES: &[&str] = &["enter", "official", "website", "apply", "details", "visit"];

#[derive(Debug, Clone)]
pub struct HostSets {
    pub aggregators: HashSet<String>,
    pub ignored: HashSet<String>,
}

/// Resolve one record. Non-aggregator records and every failure mode
/// return the input unchanged.
pub async fn resolve(client: &reqwest::Client, sets: &HostSets, listing: Listing) -> Listing {
    let host = host_of(&listing.link);
    if host.is_empty() || !sets.aggregators.contains(&host) {
        return listing;
    }

    let body = match fetch::fetch_text(client, &listing.link, fetch::ACCEPT_HTML).await {
        Ok(b) => b,
        Err(e) => {
            tracing::warn!(error = ?e, link = %listing.link, "aggregator page fetch failed");
            return listing;
        }
    };

    match original_link(&body, &listing.link, sets) {
        Some(original) => upgrade(listing, &original),
        None => listing,
    }
}

fn upgrade(mut listing: Listing, original: &str) -> Listing {
    let cleaned = clean_url(original);
    if cleaned.is_empty() {
        return listing;
    }
    tracing::debug!(from = %listing.link, to = %cleaned, "upgraded aggregator link");
    listing.link = cleaned;
    listing.source = host_of(&listing.link);
    listing.id = Listing::derive_id(&listing.link, &listing.title, &listing.source);
    listing
}

/// Best candidate for the original competition link on an aggregator page.
pub fn original_link(body: &str, page_link: &str, sets: &HostSets) -> Option<String> {
    let page_url = Url::parse(page_link).ok()?;
    let doc = Html::parse_document(body);

    if let Some(winner) = best_anchor(&doc, &page_url, sets) {
        return Some(unwrap_redirect_params(&winner));
    }
    text_fallback(&doc, &page_url, sets).map(|u| unwrap_redirect_params(&u))
}

fn best_anchor(doc: &Html, page_url: &Url, sets: &HostSets) -> Option<String> {
    static ANCHORS: OnceCell<Selector> = OnceCell::new();
    let anchors = ANCHORS.get_or_init(|| Selector::parse("a[href]").unwrap());
    let shorteners = config::shortener_hosts();

    let mut best: Option<(i32, String)> = None;
    for a in doc.select(anchors) {
        let Some(url) = a.value().attr("href").and_then(|h| page_url.join(h).ok()) else {
            continue;
        };
        let Some(host) = url.host_str().map(str::to_ascii_lowercase) else {
            continue;
        };
        if host == page_url.host_str().unwrap_or_default() || sets.ignored.contains(&host) {
            continue;
        }
        if !matches!(url.scheme(), "http" | "https") {
            continue;
        }

        let text = a.text().collect::<String>().to_lowercase();
        let mut score = 1;
        if BOOST_PHRASES.iter().any(|p| text.contains(p)) {
            score += 3;
        }
        if shorteners.contains(host.as_str()) {
            score -= 2;
        }
        // Strictly-greater keeps the first anchor in document order on
        // ties, so resolution is deterministic for a fixed page.
        if best.as_ref().map(|(s, _)| score > *s).unwrap_or(true) {
            best = Some((score, url.to_string()));
        }
    }
    best.map(|(_, u)| u)
}

/// Plain-text fallback: full URLs first, then bare domain-like tokens
/// coerced to https.
fn text_fallback(doc: &Html, page_url: &Url, sets: &HostSets) -> Option<String> {
    let text: String = doc.root_element().text().collect::<Vec<_>>().join(" ");
    let page_host = page_url.host_str().unwrap_or_default();

    static RE_URL: OnceCell<regex::Regex> = OnceCell::new();
    let re_url = RE_URL.get_or_init(|| regex::Regex::new(r#"https?://[^\s"'<>)]+"#).unwrap());
    for m in re_url.find_iter(&text) {
        let host = host_of(m.as_str());
        if !host.is_empty() && host != page_host && !sets.ignored.contains(&host) {
            return Some(m.as_str().trim_end_matches(['.', ',']).to_string());
        }
    }

    static RE_DOMAIN: OnceCell<regex::Regex> = OnceCell::new();
    let re_domain = RE_DOMAIN.get_or_init(|| {
        regex::Regex::new(r#"\b(?:www\.)?[a-z0-9][a-z0-9-]*(?:\.[a-z0-9-]+)+(?:/[^\s"]*)?"#)
            .unwrap()
    });
    for m in re_domain.find_iter(&text.to_lowercase()) {
        let candidate = format!("https://{}", m.as_str().trim_end_matches(['.', ',']));
        let host = host_of(&candidate);
        if host.is_empty() || host == page_host || sets.ignored.contains(&host) {
            continue;
        }
        if sets.aggregators.contains(&host) {
            continue;
        }
        return Some(candidate);
    }
    None
}

/// Unwrap common tracking-redirect query parameters: `?to=`, `?url=`, and
/// friends carrying an absolute URL.
pub fn unwrap_redirect_params(link: &str) -> String {
    const REDIRECT_PARAMS: &[&str] = &["to", "url", "u", "dest", "destination", "redirect", "target"];
    let Ok(url) = Url::parse(link) else {
        return link.to_string();
    };
    for (k, v) in url.query_pairs() {
        if REDIRECT_PARAMS.contains(&k.to_ascii_lowercase().as_str())
            && (v.starts_with("http://") || v.starts_with("https://"))
        {
            // One unwrap level is enough in practice; recurse once for
            // wrapped wrappers.
            let inner = v.into_owned();
            return if Url::parse(&inner)
                .ok()
                .and_then(|u| u.query_pairs().next().map(|_| ()))
                .is_some()
            {
                unwrap_redirect_params(&inner)
            } else {
                inner
            };
        }
    }
    link.to_string()
}
