//! Set algebra between the crawled pages and the published sitemap.

use std::collections::HashSet;

use sitemapper_core::CrawlResult;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SitemapDiff {
    pub crawled_count: usize,
    pub sitemap_count: usize,
    /// Crawled with HTTP 200 but absent from the published sitemap.
    pub not_in_sitemap: Vec<String>,
    /// Published but never reached by the crawl.
    pub not_crawled: Vec<String>,
}

/// Compare the crawled 200-OK set against the published sitemap set.
/// Both difference lists come back sorted.
pub fn diff_against_sitemap(
    results: &[CrawlResult],
    sitemap_urls: &HashSet<String>,
) -> SitemapDiff {
    let crawled: HashSet<&str> = results
        .iter()
        .filter(|r| r.http_status == 200)
        .map(|r| r.url.as_str())
        .collect();

    let mut not_in_sitemap: Vec<String> = crawled
        .iter()
        .filter(|url| !sitemap_urls.contains(**url))
        .map(|url| url.to_string())
        .collect();
    not_in_sitemap.sort();

    let mut not_crawled: Vec<String> = sitemap_urls
        .iter()
        .filter(|url| !crawled.contains(url.as_str()))
        .cloned()
        .collect();
    not_crawled.sort();

    SitemapDiff {
        crawled_count: crawled.len(),
        sitemap_count: sitemap_urls.len(),
        not_in_sitemap,
        not_crawled,
    }
}

/// Plain-text report for the UI / a diff file.
pub fn render_diff(diff: &SitemapDiff) -> String {
    let mut lines = Vec::new();
    lines.push("=== SITEMAP-DIFF ===".to_string());
    lines.push(format!("Offizielle Sitemap: {} URLs", diff.sitemap_count));
    lines.push(format!("Gecrawlt (200er): {} URLs", diff.crawled_count));
    lines.push(String::new());

    lines.push(format!(
        "--- Gecrawlt aber NICHT in Sitemap ({}) ---",
        diff.not_in_sitemap.len()
    ));
    lines.extend(diff.not_in_sitemap.iter().cloned());

    lines.push(String::new());
    lines.push(format!(
        "--- In Sitemap aber NICHT gecrawlt ({}) ---",
        diff.not_crawled.len()
    ));
    lines.extend(diff.not_crawled.iter().cloned());

    lines.join("\n")
}
