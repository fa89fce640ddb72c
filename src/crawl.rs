use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use chrono::Local;
use tracing::{info, warn};
use url::Url;

use sitemapper_core::CrawlConfig;
use sitemapper_crawler::{Crawler, LogCallback};
use sitemapper_report::Reporter;
use sitemapper_robots::RobotsPolicy;
use sitemapper_sitemap::{
    diff_against_sitemap, discover_sitemap, load_sitemap_urls, render_diff, SitemapWriter,
};

pub async fn run(config: CrawlConfig, output: &str) -> Result<()> {
    // The published sitemap comes first: robots.txt hints feed the
    // discovery, and every URL found there becomes a depth-1 seed so
    // pages unreachable by plain link-walking still get crawled.
    let mut robots = RobotsPolicy::new();
    if config.respect_robots {
        robots.load(&config.start_url, &config.cookies).await;
    }
    let robots_hints: Vec<String> = if robots.is_loaded() {
        robots.sitemaps().to_vec()
    } else {
        Vec::new()
    };

    let official_sitemap =
        discover_sitemap(&config.start_url, &robots_hints, &config.cookies).await;
    let official_urls: HashSet<String> = match &official_sitemap {
        Some(sitemap_url) => {
            let urls = load_sitemap_urls(sitemap_url, &config.cookies).await;
            info!(count = urls.len(), sitemap = %sitemap_url, "offizielle Sitemap geladen");
            urls
        }
        None => HashSet::new(),
    };

    let mut crawler = Crawler::new(config.clone())?;
    if !official_urls.is_empty() {
        let added = crawler.add_seed_urls(&official_urls);
        info!(added, "Seed-URLs aus offizieller Sitemap");
    }

    let on_log: LogCallback = Arc::new(|line: &str| info!("{}", line.trim_start()));
    let results = crawler.crawl(None, Some(on_log)).await?;
    let stats = crawler.stats();

    info!(
        crawled = stats.total_crawled,
        discovered = stats.total_discovered,
        errors = stats.total_errors,
        skipped = stats.total_skipped,
        duration = %stats.duration_display(),
        urls_per_second = stats.urls_per_second,
        "Crawl abgeschlossen"
    );

    let written = SitemapWriter::new(&results).write(Path::new(output))?;
    if written.is_empty() {
        warn!("keine erfolgreichen HTML-Seiten, Sitemap nicht geschrieben");
    }

    let host = Url::parse(crawler.start_url())
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string());
    let date = Local::now().format("%Y-%m-%d");

    let dead_links = results.iter().filter(|r| r.is_error()).count();
    if dead_links > 0 {
        let report_path = format!("fehlerbericht_{host}_{date}.json");
        Reporter::save_error_report(&results, &stats, crawler.start_url(), Path::new(&report_path))?;
        info!(file = %report_path, count = dead_links, "Fehlerbericht geschrieben");

        let table = Reporter::generate_wiki_table(&results);
        if !table.is_empty() {
            let table_path = format!("dead_links_{host}_{date}.txt");
            std::fs::write(&table_path, table)?;
            info!(file = %table_path, "Dead-Link-Tabelle geschrieben");
        }
    }

    let form_pages = results.iter().filter(|r| r.has_form && r.http_status == 200).count();
    if form_pages > 0 {
        let forms_path = format!("formulare_{host}_{date}.json");
        Reporter::save_forms_report(&results, crawler.start_url(), Path::new(&forms_path))?;
        info!(file = %forms_path, count = form_pages, "Formular-Report geschrieben");
    }

    if !official_urls.is_empty() {
        let diff = diff_against_sitemap(&results, &official_urls);
        let diff_path = format!("sitemap_diff_{host}_{date}.txt");
        std::fs::write(&diff_path, render_diff(&diff))?;
        info!(
            file = %diff_path,
            missing_in_sitemap = diff.not_in_sitemap.len(),
            not_crawled = diff.not_crawled.len(),
            "Sitemap-Diff geschrieben"
        );
    }

    Ok(())
}
