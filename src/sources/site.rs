// src/sources/site.rs
//! Listing-page crawler: walks a configured index (optionally paginated),
//! discovers candidate detail links, fetches each surviving page, and
//! extracts one raw record per page that actually looks like a
//! competition. Field extraction is an ordered strategy chain per field:
//! the first strategy yielding a non-empty value wins.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use once_cell::sync::OnceCell;
use scraper::{Html, Selector};
use url::Url;

use crate::config::SiteConfig;
use crate::fetch;
use crate::model::{RawListing, SourceStats};
use crate::sources::{ListingSource, SourceYield};

const COMPETITION_KEYWORDS: &[&str] = &[
    "win",
    "prize",
    "giveaway",
    "contest",
    "competition",
    "sweepstake",
];

pub struct SiteSource {
    cfg: SiteConfig,
    label: String,
}

impl SiteSource {
    pub fn new(cfg: SiteConfig) -> Self {
        let label = cfg
            .label
            .clone()
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| {
                crate::normalize::host_of(&cfg.index_url)
                    .trim_start_matches("www.")
                    .to_string()
            });
        Self { cfg, label }
    }

    fn index_pages(&self) -> Result<Vec<Url>> {
        let base = Url::parse(&self.cfg.index_url)
            .with_context(|| format!("invalid index url {}", self.cfg.index_url))?;
        let mut pages = vec![base.clone()];
        for n in 2..=self.cfg.pages.max(1) {
            let mut u = base.clone();
            let mut pairs: Vec<(String, String)> = u
                .query_pairs()
                .filter(|(k, _)| k != self.cfg.page_param.as_str())
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            pairs.push((self.cfg.page_param.clone(), n.to_string()));
            u.query_pairs_mut()
                .clear()
                .extend_pairs(pairs.iter().map(|(k, v)| (&**k, &**v)));
            pages.push(u);
        }
        Ok(pages)
    }
}

#[async_trait]
impl ListingSource for SiteSource {
    async fn collect(&self, client: &reqwest::Client) -> Result<SourceYield> {
        let index = Url::parse(&self.cfg.index_url)
            .with_context(|| format!("invalid index url {}", self.cfg.index_url))?;
        let mut stats = SourceStats::default();
        let mut seen: HashSet<String> = HashSet::new();
        let mut queue: Vec<Url> = Vec::new();

        for page_url in self.index_pages()? {
            let body = match fetch::fetch_text(client, page_url.as_str(), fetch::ACCEPT_HTML).await
            {
                Ok(b) => b,
                Err(e) => {
                    tracing::warn!(error = ?e, site = %self.label, page = %page_url, "index page fetch failed");
                    continue;
                }
            };
            stats.pages_crawled += 1;

            let candidates = discover_links(&body, &page_url, self.cfg.link_selector.as_deref());
            stats.links_indexed += candidates.len();
            for href in candidates {
                if href.host_str() != index.host_str() {
                    continue;
                }
                if !path_allowed(href.path(), &index, &self.cfg.allow_paths, &self.cfg.block_paths)
                {
                    continue;
                }
                let cleaned = crate::normalize::clean_url(href.as_str());
                if cleaned.is_empty() || !seen.insert(cleaned) {
                    continue;
                }
                queue.push(href);
                if queue.len() >= self.cfg.max_items {
                    break;
                }
            }
            if queue.len() >= self.cfg.max_items {
                break;
            }
        }

        let mut listings = Vec::new();
        for detail_url in queue {
            if self.cfg.throttle_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.cfg.throttle_ms)).await;
            }
            let body = match fetch::fetch_text(client, detail_url.as_str(), fetch::ACCEPT_HTML)
                .await
            {
                Ok(b) => b,
                Err(e) => {
                    tracing::warn!(error = ?e, site = %self.label, page = %detail_url, "detail page fetch failed");
                    continue;
                }
            };
            match extract_detail(
                &body,
                &detail_url,
                &self.label,
                self.cfg.deadline_pattern.as_deref(),
            ) {
                Some(listing) => listings.push(listing),
                None => {
                    tracing::debug!(site = %self.label, page = %detail_url, "page rejected by competition guard");
                }
            }
        }

        stats.items = listings.len();
        Ok(SourceYield { listings, stats })
    }

    fn label(&self) -> &str {
        &self.label
    }
}

/// Candidate hrefs on an index page, resolved to absolute URLs in document
/// order. Uses the configured selector when it matches anything, otherwise
/// falls back to same-site anchors whose path carries a competition
/// keyword.
pub fn discover_links(body: &str, page_url: &Url, selector: Option<&str>) -> Vec<Url> {
    let doc = Html::parse_document(body);
    let mut out: Vec<Url> = Vec::new();

    if let Some(sel_str) = selector {
        match Selector::parse(sel_str) {
            Ok(sel) => {
                for el in doc.select(&sel) {
                    let href = el
                        .value()
                        .attr("href")
                        .or_else(|| el.value().attr("data-href"));
                    if let Some(u) = href.and_then(|h| page_url.join(h).ok()) {
                        out.push(u);
                    }
                }
            }
            Err(_) => {
                tracing::warn!(selector = sel_str, "unparseable link selector, using heuristic");
            }
        }
        if !out.is_empty() {
            return out;
        }
    }

    static ANCHORS: OnceCell<Selector> = OnceCell::new();
    let anchors = ANCHORS.get_or_init(|| Selector::parse("a[href]").unwrap());
    for a in doc.select(anchors) {
        let Some(u) = a.value().attr("href").and_then(|h| page_url.join(h).ok()) else {
            continue;
        };
        if u.host_str() != page_url.host_str() {
            continue;
        }
        let path = u.path().to_ascii_lowercase();
        if COMPETITION_KEYWORDS.iter().any(|k| path.contains(k)) {
            out.push(u);
        }
    }
    out
}

/// Allow/block path policy. Block rules run first; with no allow rules the
/// default scope is paths under the index URL's leading section.
pub fn path_allowed(path: &str, index: &Url, allow: &[String], block: &[String]) -> bool {
    if block.iter().any(|b| !b.is_empty() && path.contains(b.as_str())) {
        return false;
    }
    if !allow.is_empty() {
        return allow.iter().any(|a| !a.is_empty() && path.contains(a.as_str()));
    }
    let section = index
        .path_segments()
        .and_then(|mut segs| segs.next())
        .unwrap_or_default();
    if section.is_empty() {
        return true;
    }
    path.trim_start_matches('/').split('/').next() == Some(section)
}

fn select_first_text(doc: &Html, selectors: &[&str]) -> Option<String> {
    for sel_str in selectors {
        let Ok(sel) = Selector::parse(sel_str) else { continue };
        if let Some(el) = doc.select(&sel).next() {
            let text = crate::normalize::normalize_text(&el.text().collect::<String>());
            if !text.is_empty() {
                return Some(text);
            }
        }
    }
    None
}

fn select_first_attr(doc: &Html, pairs: &[(&str, &str)]) -> Option<String> {
    for (sel_str, attr) in pairs {
        let Ok(sel) = Selector::parse(sel_str) else { continue };
        if let Some(v) = doc
            .select(&sel)
            .next()
            .and_then(|el| el.value().attr(attr))
            .map(str::trim)
            .filter(|v| !v.is_empty())
        {
            return Some(v.to_string());
        }
    }
    None
}

fn visible_text(doc: &Html) -> String {
    static BODY: OnceCell<Selector> = OnceCell::new();
    let body = BODY.get_or_init(|| Selector::parse("body").unwrap());
    let node = doc.select(body).next();
    let raw: String = match node {
        Some(n) => n.text().collect::<Vec<_>>().join(" "),
        None => doc.root_element().text().collect::<Vec<_>>().join(" "),
    };
    crate::normalize::normalize_text(&raw)
}

/// Extract one raw record from a detail page, or `None` when the page
/// fails the "looks like a competition" guard.
pub fn extract_detail(
    body: &str,
    page_url: &Url,
    label: &str,
    deadline_pattern: Option<&str>,
) -> Option<RawListing> {
    let doc = Html::parse_document(body);

    let title = select_first_text(&doc, &["h1", "h2", "title"]).unwrap_or_default();

    let text = visible_text(&doc);
    let deadline = extract_deadline(&text, deadline_pattern);

    if !looks_like_competition(&title, &nav_context(&doc), deadline.is_some()) {
        return None;
    }

    let published = select_first_attr(
        &doc,
        &[
            ("meta[property=\"article:published_time\"]", "content"),
            ("time[datetime]", "datetime"),
            ("meta[name=\"date\"]", "content"),
            ("meta[property=\"og:updated_time\"]", "content"),
        ],
    )
    .or_else(|| first_text_date(&text))
    .unwrap_or_else(|| Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true));

    let prize = extract_prize(&title, &text);

    Some(RawListing {
        title,
        link: page_url.to_string(),
        source: Some(label.to_string()),
        created_at: Some(published),
        deadline,
        prize,
        tags: vec![label.to_string()],
    })
}

/// Breadcrumb/nav/section text used by the guard when the title alone is
/// inconclusive.
fn nav_context(doc: &Html) -> String {
    select_first_text(
        doc,
        &[".breadcrumb", "nav", "header .category", "main section h2"],
    )
    .unwrap_or_default()
}

fn extract_deadline(text: &str, custom: Option<&str>) -> Option<String> {
    if let Some(pat) = custom {
        match regex::Regex::new(pat) {
            Ok(re) => {
                if let Some(cap) = re.captures(text) {
                    let hit = cap.get(1).or_else(|| cap.get(0)).map(|m| m.as_str().trim());
                    if let Some(h) = hit.filter(|h| !h.is_empty()) {
                        return Some(h.to_string());
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "invalid custom deadline pattern"),
        }
    }
    static RE_DEADLINE: OnceCell<regex::Regex> = OnceCell::new();
    let re = RE_DEADLINE.get_or_init(|| {
        regex::Regex::new(
            r"(?i)(?:clos(?:es|ing)(?:\s+date)?|ends?|entries\s+close)[:\s]+(?:on\s+)?([0-9]{1,2}(?:st|nd|rd|th)?\s+[A-Za-z]+\s+[0-9]{4}|[A-Za-z]+\s+[0-9]{1,2},?\s+[0-9]{4}|[0-9]{1,2}[./][0-9]{1,2}[./][0-9]{2,4}|[0-9]{4}-[0-9]{2}-[0-9]{2})",
        )
        .unwrap()
    });
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| strip_ordinal_suffix(m.as_str()))
}

/// "31st August 2031" to "31 August 2031". The suffix is dropped only when
/// attached to the day digits, never from surrounding words.
fn strip_ordinal_suffix(s: &str) -> String {
    static RE_ORDINAL: OnceCell<regex::Regex> = OnceCell::new();
    let re = RE_ORDINAL
        .get_or_init(|| regex::Regex::new(r"\b(\d{1,2})(?:st|nd|rd|th)\b").unwrap());
    re.replace_all(s, "$1").trim().to_string()
}

fn first_text_date(text: &str) -> Option<String> {
    static RE_DATE: OnceCell<regex::Regex> = OnceCell::new();
    let re = RE_DATE.get_or_init(|| {
        regex::Regex::new(r"\b(\d{4}-\d{2}-\d{2}|\d{1,2} [A-Z][a-z]+ \d{4}|[A-Z][a-z]+ \d{1,2}, \d{4})\b")
            .unwrap()
    });
    re.find(text).map(|m| m.as_str().to_string())
}

fn extract_prize(title: &str, text: &str) -> Option<String> {
    static RE_PRIZE: OnceCell<regex::Regex> = OnceCell::new();
    let re = RE_PRIZE.get_or_init(|| {
        regex::Regex::new(r"(?i)\bwin\s+((?:a|an|the)\s+[^.!?<\n]{3,60})").unwrap()
    });
    re.captures(title)
        .or_else(|| re.captures(text))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
}

/// Gate between detail pages and listing/section pages that merely link to
/// competitions. A short title that is nothing but generic competition
/// vocabulary, with no deadline found, signals a listing page.
pub fn looks_like_competition(title: &str, context: &str, has_deadline: bool) -> bool {
    let title_lc = title.to_lowercase();
    let context_lc = context.to_lowercase();
    let keyword_hit = COMPETITION_KEYWORDS
        .iter()
        .any(|k| title_lc.contains(k) || context_lc.contains(k));
    if !keyword_hit {
        return false;
    }
    if !has_deadline && title.chars().count() <= 40 && is_generic_title(&title_lc) {
        return false;
    }
    true
}

/// Nothing left after removing competition vocabulary and filler words.
fn is_generic_title(title_lc: &str) -> bool {
    const FILLER: &[&str] = &["a", "an", "the", "to", "and", "our", "all", "new", "latest", "s"];
    !title_lc
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .any(|t| {
            !FILLER.contains(&t)
                && !COMPETITION_KEYWORDS
                    .iter()
                    .any(|k| t == *k || t.trim_end_matches('s') == *k)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generic_listing_page_title_is_rejected() {
        assert!(!looks_like_competition("Competitions", "", false));
        assert!(!looks_like_competition("Latest Competitions", "win stuff", false));
        assert!(looks_like_competition("Win a Trip to Paris", "", false));
        assert!(looks_like_competition("Competitions", "", true));
    }

    #[test]
    fn keywordless_page_is_rejected_even_with_long_title() {
        assert!(!looks_like_competition(
            "Our favourite recipes for a summer barbecue",
            "food",
            false
        ));
        // Keyword in the surrounding section text is enough.
        assert!(looks_like_competition(
            "Trip to Paris for two",
            "Competitions > Travel",
            true
        ));
    }

    #[test]
    fn path_policy_block_beats_allow() {
        let index = Url::parse("https://compsite.example/win").unwrap();
        let allow = vec!["/win/".to_string()];
        let block = vec!["/win/closed".to_string()];
        assert!(path_allowed("/win/trip", &index, &allow, &block));
        assert!(!path_allowed("/win/closed/trip", &index, &allow, &block));
        assert!(!path_allowed("/news/trip", &index, &allow, &block));
    }

    #[test]
    fn default_scope_is_the_index_section() {
        let index = Url::parse("https://compsite.example/win?page=1").unwrap();
        assert!(path_allowed("/win/trip", &index, &[], &[]));
        assert!(!path_allowed("/news/trip", &index, &[], &[]));
        let root_index = Url::parse("https://compsite.example/").unwrap();
        assert!(path_allowed("/anything", &root_index, &[], &[]));
    }

    #[test]
    fn discovery_uses_selector_then_heuristic() {
        let base = Url::parse("https://compsite.example/win").unwrap();
        let html = r#"<html><body>
            <a class="comp-card" href="/win/trip">Trip</a>
            <a href="/win/bike-giveaway">Bike</a>
            <a href="/about">About</a>
            <a href="https://elsewhere.example/win/x">Offsite</a>
        </body></html>"#;

        let selected = discover_links(html, &base, Some("a.comp-card"));
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].as_str(), "https://compsite.example/win/trip");

        // Selector matching nothing falls back to keyword paths, same host only.
        let fallback = discover_links(html, &base, Some("a.missing"));
        let paths: Vec<&str> = fallback.iter().map(|u| u.path()).collect();
        assert_eq!(paths, vec!["/win/trip", "/win/bike-giveaway"]);
    }

    #[test]
    fn detail_extraction_finds_deadline_and_prize() {
        let url = Url::parse("https://compsite.example/win/trip").unwrap();
        let html = r#"<html><head>
            <title>Win a Trip to Paris | CompSite</title>
            <meta property="article:published_time" content="2024-03-01T09:00:00Z">
            </head><body>
            <h1>Win a Trip to Paris</h1>
            <p>Entries close 31 December 2030. Good luck!</p>
        </body></html>"#;
        let raw = extract_detail(html, &url, "compsite", None).unwrap();
        assert_eq!(raw.title, "Win a Trip to Paris");
        assert_eq!(raw.created_at.as_deref(), Some("2024-03-01T09:00:00Z"));
        assert_eq!(raw.deadline.as_deref(), Some("31 December 2030"));
        assert_eq!(raw.prize.as_deref(), Some("a Trip to Paris"));
    }

    #[test]
    fn listing_shaped_page_yields_nothing() {
        let url = Url::parse("https://compsite.example/win").unwrap();
        let html = r#"<html><head><title>Competitions</title></head><body>
            <h1>Competitions</h1>
            <a href="/win/one">One</a><a href="/win/two">Two</a>
        </body></html>"#;
        assert!(extract_detail(html, &url, "compsite", None).is_none());
    }

    #[test]
    fn august_deadline_survives_ordinal_cleanup() {
        // The "st" suffix must only come off day digits, not month names.
        let url = Url::parse("https://compsite.example/win/trip").unwrap();
        let html = r#"<html><body><h1>Win a Trip</h1>
            <p>Entries close 31 August 2031.</p></body></html>"#;
        let raw = extract_detail(html, &url, "compsite", None).unwrap();
        assert_eq!(raw.deadline.as_deref(), Some("31 August 2031"));
        assert!(crate::normalize::parse_when("31 August 2031").is_some());

        assert_eq!(strip_ordinal_suffix("1st August 2031"), "1 August 2031");
        assert_eq!(strip_ordinal_suffix("22nd March 2031"), "22 March 2031");
        assert_eq!(strip_ordinal_suffix("3rd May 2031"), "3 May 2031");
        assert_eq!(strip_ordinal_suffix("4th June 2031"), "4 June 2031");
    }

    #[test]
    fn custom_deadline_pattern_wins() {
        let url = Url::parse("https://compsite.example/win/trip").unwrap();
        let html = r#"<html><body><h1>Win a Trip</h1>
            <p>Closing date: 15/08/2031</p></body></html>"#;
        let raw =
            extract_detail(html, &url, "compsite", Some(r"(?i)closing date[:\s]+([0-9/]+)"))
                .unwrap();
        assert_eq!(raw.deadline.as_deref(), Some("15/08/2031"));
    }
}
