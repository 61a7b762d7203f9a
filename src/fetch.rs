// src/fetch.rs
//! Shared HTTP plumbing: one client per run with a descriptive
//! user-agent and a per-request timeout; redirects follow the client's
//! default policy. Non-2xx counts as a failure for that single request.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::ACCEPT;
use url::Url;

pub const USER_AGENT: &str = concat!("prizefeed/", env!("CARGO_PKG_VERSION"), " listing-ingest");

pub const ACCEPT_FEED: &str =
    "application/rss+xml, application/atom+xml, application/xml, application/json;q=0.9, text/xml;q=0.8";
pub const ACCEPT_HTML: &str = "text/html, application/xhtml+xml;q=0.9, */*;q=0.5";

pub fn client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .context("building http client")
}

/// Fetch a URL as text with the given accept header.
pub async fn fetch_text(client: &reqwest::Client, url: &str, accept: &str) -> Result<String> {
    let resp = client
        .get(url)
        .header(ACCEPT, accept)
        .send()
        .await
        .with_context(|| format!("fetching {url}"))?
        .error_for_status()
        .with_context(|| format!("non-success status for {url}"))?;
    resp.text().await.with_context(|| format!("reading body of {url}"))
}

/// Fetch an HTML page and report the final post-redirect URL alongside the
/// body and content type. The final URL must be captured before the body
/// read consumes the response.
pub async fn fetch_html_final(
    client: &reqwest::Client,
    url: &str,
) -> Result<(String, Url, bool)> {
    let resp = client
        .get(url)
        .header(ACCEPT, ACCEPT_HTML)
        .send()
        .await
        .with_context(|| format!("fetching {url}"))?
        .error_for_status()
        .with_context(|| format!("non-success status for {url}"))?;
    let final_url = resp.url().clone();
    let is_html = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.to_ascii_lowercase().contains("html"))
        .unwrap_or(true);
    let body = resp
        .text()
        .await
        .with_context(|| format!("reading body of {url}"))?;
    Ok((body, final_url, is_html))
}
