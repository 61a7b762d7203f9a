// src/normalize.rs
//! Pure, deterministic raw-record normalization: text cleanup, URL
//! cleaning, timestamp parsing/clamping, and id assignment.
//! `normalize` is idempotent over its own output.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use once_cell::sync::OnceCell;
use url::Url;

use crate::model::{Listing, RawListing};

/// Query parameters stripped from every link. Tracking junk only; anything
/// that changes page content must survive.
const TRACKING_PARAMS: &[&str] = &[
    "gclid", "fbclid", "gbraid", "wbraid", "mc_cid", "mc_eid", "igshid", "spm", "ref",
];

fn is_tracking_param(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.starts_with("utm_") || TRACKING_PARAMS.contains(&lower.as_str())
}

/// Collapse whitespace and decode HTML entities/tags out of free text.
pub fn normalize_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();
    out
}

/// Title cleanup: collapsed text capped at a fixed length. Truncation at
/// a fixed point keeps the transform idempotent.
pub fn normalize_title(s: &str) -> String {
    let mut out = normalize_text(s);
    if out.chars().count() > 300 {
        out = out.chars().take(300).collect::<String>().trim_end().to_string();
    }
    out
}

/// Coerce protocol-relative and bare links to https before parsing.
fn coerce_absolute(link: &str) -> String {
    let t = link.trim();
    if let Some(rest) = t.strip_prefix("//") {
        return format!("https://{rest}");
    }
    if !t.contains("://") {
        let head = t.split('/').next().unwrap_or_default();
        if head.contains('.') && !head.contains(' ') {
            return format!("https://{t}");
        }
    }
    t.to_string()
}

/// Clean a link: absolute form, tracking params and fragment stripped,
/// lowercase host, no trailing slash on non-root paths. Returns the empty
/// string for unparseable input. Cleaning an already-clean URL is a no-op.
pub fn clean_url(link: &str) -> String {
    let coerced = coerce_absolute(link);
    let mut url = match Url::parse(&coerced) {
        Ok(u) => u,
        Err(_) => return String::new(),
    };
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return String::new();
    }

    url.set_fragment(None);

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut()
            .clear()
            .extend_pairs(kept.iter().map(|(k, v)| (&**k, &**v)));
    }

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }

    url.to_string()
}

/// Host of a cleaned link, lowercased; empty when absent.
pub fn host_of(link: &str) -> String {
    Url::parse(link)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
        .unwrap_or_default()
}

/// Parse a source timestamp: RFC 3339, then RFC 2822 (the usual RSS
/// `pubDate` shape), then a few common bare-date formats.
pub fn parse_when(s: &str) -> Option<DateTime<Utc>> {
    let t = s.trim();
    if t.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(t) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(odt) = time::OffsetDateTime::parse(t, &time::format_description::well_known::Rfc2822)
    {
        return Utc.timestamp_opt(odt.unix_timestamp(), 0).single();
    }
    // Legacy zone names ("GMT", "EST") that strict RFC 2822 parsing rejects.
    if let Ok(dt) = DateTime::parse_from_rfc2822(t) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d", "%d %B %Y", "%B %d, %Y", "%d/%m/%Y", "%d.%m.%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(t, fmt) {
            return d.and_hms_opt(0, 0, 0).map(|ndt| Utc.from_utc_datetime(&ndt));
        }
    }
    // Dates embedded in longer phrases ("by 31 March 2026").
    static RE_DATE: OnceCell<regex::Regex> = OnceCell::new();
    let re = RE_DATE.get_or_init(|| {
        regex::Regex::new(r"(\d{1,2} [A-Z][a-z]+ \d{4}|[A-Z][a-z]+ \d{1,2},? \d{4}|\d{4}-\d{2}-\d{2})")
            .unwrap()
    });
    if let Some(m) = re.find(t) {
        if m.as_str() != t {
            return parse_when(m.as_str());
        }
        // "March 3 2026" without comma.
        if let Ok(d) = NaiveDate::parse_from_str(m.as_str(), "%B %d %Y") {
            return d.and_hms_opt(0, 0, 0).map(|ndt| Utc.from_utc_datetime(&ndt));
        }
    }
    None
}

/// Normalize one raw record against a fixed `now`. Returns `None` when no
/// usable title survives cleanup.
pub fn normalize(raw: &RawListing, now: DateTime<Utc>, skew_tolerance_secs: i64) -> Option<Listing> {
    let title = normalize_title(&raw.title);
    if title.is_empty() {
        return None;
    }

    let link = clean_url(&raw.link);
    let source = raw
        .source
        .as_deref()
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| {
            let h = host_of(&link);
            if h.is_empty() { "unknown".to_string() } else { h }
        });

    let created_at = raw.created_at.as_deref().and_then(parse_when).map(|dt| {
        let horizon = now + Duration::seconds(skew_tolerance_secs);
        if dt > horizon { now } else { dt }
    });
    let deadline = raw.deadline.as_deref().and_then(parse_when);

    let prize = raw
        .prize
        .as_deref()
        .map(normalize_text)
        .filter(|p| !p.is_empty());
    let tags: Vec<String> = raw
        .tags
        .iter()
        .map(|t| normalize_text(t))
        .filter(|t| !t.is_empty())
        .collect();

    let id = Listing::derive_id(&link, &title, &source);
    Some(Listing {
        id,
        title,
        link,
        source,
        created_at,
        deadline,
        prize,
        tags,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_url_strips_tracking_and_fragment() {
        assert_eq!(
            clean_url("https://X.com/a?utm_source=nl&utm_medium=email#frag"),
            "https://x.com/a"
        );
        assert_eq!(
            clean_url("https://x.com/a?page=2&utm_source=nl"),
            "https://x.com/a?page=2"
        );
    }

    #[test]
    fn clean_url_is_noop_on_clean_input() {
        let clean = "https://x.com/a?page=2";
        assert_eq!(clean_url(clean), clean);
        assert_eq!(clean_url(&clean_url(clean)), clean_url(clean));
    }

    #[test]
    fn clean_url_trailing_slash_only_on_non_root() {
        assert_eq!(clean_url("https://x.com/a/"), "https://x.com/a");
        assert_eq!(clean_url("https://x.com/"), "https://x.com/");
    }

    #[test]
    fn clean_url_coerces_relative_forms() {
        assert_eq!(clean_url("//x.com/a"), "https://x.com/a");
        assert_eq!(clean_url("x.com/a"), "https://x.com/a");
        assert_eq!(clean_url("not a url"), "");
    }

    #[test]
    fn parse_when_accepts_common_shapes() {
        assert!(parse_when("Mon, 01 Jan 2024 00:00:00 GMT").is_some());
        assert!(parse_when("2024-01-01T00:00:00Z").is_some());
        assert!(parse_when("31 March 2026").is_some());
        assert!(parse_when("closing soon").is_none());
    }

    #[test]
    fn future_created_at_is_clamped_to_now() {
        let now = Utc::now();
        let raw = RawListing {
            title: "Win a Trip".into(),
            link: "https://x.com/a".into(),
            created_at: Some((now + Duration::days(365)).to_rfc3339()),
            ..Default::default()
        };
        let l = normalize(&raw, now, 300).unwrap();
        assert_eq!(l.created_at, Some(now));
    }

    #[test]
    fn normalize_is_idempotent() {
        let now = Utc::now();
        let raw = RawListing {
            title: "  Win&nbsp;a <b>Trip</b>  ".into(),
            link: "https://X.com/a/?utm_source=nl".into(),
            source: None,
            created_at: Some("Mon, 01 Jan 2024 00:00:00 GMT".into()),
            deadline: Some("31 March 2026".into()),
            prize: None,
            tags: vec!["travel".into()],
        };
        let once = normalize(&raw, now, 300).unwrap();
        let again_raw = RawListing {
            title: once.title.clone(),
            link: once.link.clone(),
            source: Some(once.source.clone()),
            created_at: once.created_at.map(|d| d.to_rfc3339()),
            deadline: once.deadline.map(|d| d.to_rfc3339()),
            prize: once.prize.clone(),
            tags: once.tags.clone(),
        };
        let twice = normalize(&again_raw, now, 300).unwrap();
        assert_eq!(once, twice);
        assert_eq!(once.title, "Win a Trip");
        assert_eq!(once.link, "https://x.com/a");
        assert_eq!(once.source, "x.com");
    }
}
