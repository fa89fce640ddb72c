//! Sitemap autodiscovery and loading.
//!
//! Finds a site's published sitemap (robots.txt hints first, then the
//! usual well-known paths) and collects every URL out of it, following
//! sitemap indexes recursively.

use std::collections::HashSet;
use std::time::Duration;

use quick_xml::events::Event;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, COOKIE, RANGE};
use tracing::{debug, info};
use url::Url;

use sitemapper_core::{cookie_header, urlnorm, Cookie};

pub const SITEMAP_NS: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";

/// Probed in this order when robots.txt has no usable hint.
const COMMON_SITEMAP_PATHS: &[&str] = &[
    "/sitemap.xml",
    "/sitemap_index.xml",
    "/sitemap/sitemap.xml",
    "/sitemapindex.xml",
    "/sitemap/index.xml",
];

/// Nested sitemap indexes beyond this are ignored.
const MAX_INDEX_DEPTH: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SitemapEntry {
    /// `<url><loc>` inside a urlset.
    Url(String),
    /// `<sitemap><loc>` inside a sitemap index.
    Sitemap(String),
}

/// Find the published sitemap for a site. Returns the first candidate
/// that actually serves XML, or None.
pub async fn discover_sitemap(
    base_url: &str,
    robots_hints: &[String],
    cookies: &[Cookie],
) -> Option<String> {
    let parsed = Url::parse(base_url).ok()?;
    let origin = format!("{}://{}", parsed.scheme(), urlnorm::url_netloc(&parsed));
    let client = build_client(cookies, Duration::from_secs(15)).ok()?;

    for hint in robots_hints {
        debug!(url = %hint, "checking robots.txt sitemap hint");
        if is_valid_sitemap(&client, hint).await {
            info!(url = %hint, "sitemap found");
            return Some(hint.clone());
        }
    }

    for path in COMMON_SITEMAP_PATHS {
        let candidate = format!("{origin}{path}");
        debug!(url = %candidate, "probing sitemap path");
        if is_valid_sitemap(&client, &candidate).await {
            info!(url = %candidate, "sitemap found");
            return Some(candidate);
        }
    }

    debug!("no published sitemap found");
    None
}

/// Load a sitemap (or sitemap index, recursively) and return every URL.
/// Failing branches contribute nothing; whatever was collected so far is
/// returned.
pub async fn load_sitemap_urls(sitemap_url: &str, cookies: &[Cookie]) -> HashSet<String> {
    let mut urls = HashSet::new();
    let Ok(client) = build_client(cookies, Duration::from_secs(30)) else {
        return urls;
    };
    load_recursive(&client, sitemap_url, &mut urls, 0).await;
    urls
}

async fn load_recursive(
    client: &reqwest::Client,
    sitemap_url: &str,
    urls: &mut HashSet<String>,
    depth: usize,
) {
    if depth > MAX_INDEX_DEPTH {
        debug!(url = %sitemap_url, "sitemap nesting too deep, stopping");
        return;
    }

    let text = match client.get(sitemap_url).send().await {
        Ok(response) if response.status().is_success() => match response.text().await {
            Ok(text) => text,
            Err(e) => {
                debug!(url = %sitemap_url, "sitemap read failed: {}", e);
                return;
            }
        },
        Ok(response) => {
            debug!(url = %sitemap_url, status = response.status().as_u16(), "sitemap not available");
            return;
        }
        Err(e) => {
            debug!(url = %sitemap_url, "sitemap fetch failed: {}", e);
            return;
        }
    };

    let mut sub_sitemaps = Vec::new();
    let mut added = 0usize;
    for entry in parse_sitemap(&text) {
        match entry {
            SitemapEntry::Sitemap(loc) => sub_sitemaps.push(loc),
            SitemapEntry::Url(loc) => {
                urls.insert(loc);
                added += 1;
            }
        }
    }

    if !sub_sitemaps.is_empty() {
        debug!(url = %sitemap_url, count = sub_sitemaps.len(), "sitemap index");
        for sub in sub_sitemaps {
            Box::pin(load_recursive(client, &sub, urls, depth + 1)).await;
        }
        return;
    }

    debug!(url = %sitemap_url, added, "sitemap loaded");
}

/// Event-based parse of one sitemap document. Handles `<urlset>` and
/// `<sitemapindex>`, with or without the sitemaps.org namespace; parse
/// errors end the scan and whatever was read so far is returned.
pub fn parse_sitemap(text: &str) -> Vec<SitemapEntry> {
    let mut reader = quick_xml::Reader::from_str(text);
    let mut entries = Vec::new();

    let mut in_sitemap = false;
    let mut in_url = false;
    let mut in_loc = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match local_name(e.name().as_ref()) {
                b"sitemap" => in_sitemap = true,
                b"url" => in_url = true,
                b"loc" => in_loc = true,
                _ => {}
            },
            Ok(Event::End(ref e)) => match local_name(e.name().as_ref()) {
                b"sitemap" => in_sitemap = false,
                b"url" => in_url = false,
                b"loc" => in_loc = false,
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if !in_loc {
                    continue;
                }
                let Ok(text) = e.unescape() else { continue };
                let loc = text.trim();
                if loc.is_empty() {
                    continue;
                }
                if in_sitemap {
                    entries.push(SitemapEntry::Sitemap(loc.to_string()));
                } else if in_url {
                    entries.push(SitemapEntry::Url(loc.to_string()));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                debug!("sitemap xml parse failed: {}", e);
                break;
            }
            _ => {}
        }
    }

    entries
}

// <ns:loc> and <loc> both resolve to the local tag name.
fn local_name(name: &[u8]) -> &[u8] {
    match name.iter().rposition(|&b| b == b':') {
        Some(idx) => &name[idx + 1..],
        None => name,
    }
}

async fn is_valid_sitemap(client: &reqwest::Client, url: &str) -> bool {
    let Ok(response) = client.head(url).send().await else {
        return false;
    };
    if !response.status().is_success() {
        return false;
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if content_type.contains("xml") || content_type.contains("text") {
        return true;
    }

    // Some servers misreport content types on HEAD; sniff the first bytes.
    let Ok(response) = client.get(url).header(RANGE, "bytes=0-512").send().await else {
        return false;
    };
    if !matches!(response.status().as_u16(), 200 | 206) {
        return false;
    }
    match response.text().await {
        Ok(text) => {
            let head: String = text.chars().take(512).collect();
            head.contains("<?xml") || head.contains("<urlset") || head.contains("<sitemapindex")
        }
        Err(_) => false,
    }
}

fn build_client(cookies: &[Cookie], timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    let mut headers = HeaderMap::new();
    if let Some(cookie) = cookie_header(cookies) {
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            headers.insert(COOKIE, value);
        }
    }
    reqwest::Client::builder()
        .timeout(timeout)
        .danger_accept_invalid_certs(true)
        .default_headers(headers)
        .build()
}
