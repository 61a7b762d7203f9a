// src/resolve/canonical.rs
//! Canonical-URL resolution: follow redirects to the final URL, then
//! prefer the page's declared canonical unless it looks degenerate.
//! Every failure mode degrades to the link the record already had.

use once_cell::sync::OnceCell;
use scraper::{Html, Selector};
use url::Url;

use crate::fetch;
use crate::model::Listing;
use crate::normalize::{clean_url, host_of};

/// Resolve one record's link. The record is never dropped here.
pub async fn resolve(client: &reqwest::Client, listing: Listing) -> Listing {
    if listing.link.is_empty() {
        return listing;
    }
    let (body, final_url, is_html) = match fetch::fetch_html_final(client, &listing.link).await {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(error = ?e, link = %listing.link, "canonical fetch failed");
            return listing;
        }
    };

    let resolved = if is_html {
        match declared_canonical(&body, &final_url) {
            Some(canonical) => canonical,
            None => final_url,
        }
    } else {
        final_url
    };

    apply(listing, resolved.as_str())
}

fn apply(mut listing: Listing, resolved: &str) -> Listing {
    let cleaned = clean_url(resolved);
    if cleaned.is_empty() || cleaned == listing.link {
        return listing;
    }
    listing.link = cleaned;
    listing.source = host_of(&listing.link);
    listing.id = Listing::derive_id(&listing.link, &listing.title, &listing.source);
    listing
}

/// The canonical URL a page declares for itself, if it is trustworthy.
/// Tried in order: `link[rel=canonical]`, `og:url`, `twitter:url`.
pub fn declared_canonical(body: &str, final_url: &Url) -> Option<Url> {
    let doc = Html::parse_document(body);
    static CHAIN: OnceCell<Vec<(Selector, &'static str)>> = OnceCell::new();
    let chain = CHAIN.get_or_init(|| {
        vec![
            (Selector::parse("link[rel=\"canonical\"]").unwrap(), "href"),
            (Selector::parse("meta[property=\"og:url\"]").unwrap(), "content"),
            (Selector::parse("meta[name=\"twitter:url\"]").unwrap(), "content"),
        ]
    });

    for &(ref sel, attr) in chain.iter() {
        let Some(raw) = doc
            .select(sel)
            .next()
            .and_then(|el| el.value().attr(attr))
            .map(str::trim)
            .filter(|v| !v.is_empty())
        else {
            continue;
        };
        let Ok(candidate) = final_url.join(raw) else { continue };
        if !matches!(candidate.scheme(), "http" | "https") {
            continue;
        }
        if is_degenerate(&candidate, final_url) {
            tracing::debug!(canonical = %candidate, page = %final_url, "ignoring degenerate canonical");
            continue;
        }
        return Some(candidate);
    }
    None
}

/// A canonical pointing at (near) the root of a different host is almost
/// always a template mistake, not the listing's real address.
fn is_degenerate(candidate: &Url, final_url: &Url) -> bool {
    let segments = candidate
        .path_segments()
        .map(|s| s.filter(|p| !p.is_empty()).count())
        .unwrap_or(0);
    segments <= 1 && candidate.host_str() != final_url.host_str()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_tag_is_preferred() {
        let page = Url::parse("https://x.com/a?ref=feed").unwrap();
        let body = r#"<html><head>
            <link rel="canonical" href="https://x.com/a">
            <meta property="og:url" content="https://x.com/a-og">
        </head></html>"#;
        let out = declared_canonical(body, &page).unwrap();
        assert_eq!(out.as_str(), "https://x.com/a");
    }

    #[test]
    fn og_url_fills_in_when_no_canonical_tag() {
        let page = Url::parse("https://x.com/a").unwrap();
        let body = r#"<html><head><meta property="og:url" content="/a-og"></head></html>"#;
        let out = declared_canonical(body, &page).unwrap();
        assert_eq!(out.as_str(), "https://x.com/a-og");
    }

    #[test]
    fn cross_host_root_canonical_is_rejected() {
        let page = Url::parse("https://brand.example/win/trip").unwrap();
        let degenerate = r#"<html><head>
            <link rel="canonical" href="https://other.example/">
        </head></html>"#;
        assert!(declared_canonical(degenerate, &page).is_none());

        // Same-host root canonical is accepted; deep cross-host too.
        let same_host = r#"<html><head>
            <link rel="canonical" href="https://brand.example/">
        </head></html>"#;
        assert_eq!(
            declared_canonical(same_host, &page).unwrap().as_str(),
            "https://brand.example/"
        );
        let deep = r#"<html><head>
            <link rel="canonical" href="https://other.example/win/trip">
        </head></html>"#;
        assert_eq!(
            declared_canonical(deep, &page).unwrap().as_str(),
            "https://other.example/win/trip"
        );
    }
}
