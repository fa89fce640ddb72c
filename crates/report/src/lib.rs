//! Reports over finished crawls: JSON error report, wiki-markup
//! dead-link table, forms export.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::Serialize;

use sitemapper_core::{CrawlError, CrawlResult, CrawlStats, PageStatus, ReferringPage};

pub struct Reporter;

#[derive(Serialize)]
struct ErrorReport<'a> {
    generated_at: String,
    start_url: &'a str,
    summary: Summary,
    dead_links: Vec<DeadLink<'a>>,
}

#[derive(Serialize)]
struct Summary {
    total_crawled: u64,
    total_discovered: u64,
    total_errors: u64,
    total_2xx: u64,
    total_3xx: u64,
    total_4xx: u64,
    total_5xx: u64,
    duration: String,
}

#[derive(Serialize)]
struct DeadLink<'a> {
    url: &'a str,
    http_status: u16,
    status: PageStatus,
    error_message: &'a str,
    referring_pages: &'a [ReferringPage],
}

#[derive(Serialize)]
struct FormsReport<'a> {
    generated_at: String,
    start_url: &'a str,
    count: usize,
    pages: Vec<&'a str>,
}

impl Reporter {
    /// URLs that belong into the error reports: HTTP 4xx/5xx plus
    /// transport failures and timeouts.
    fn dead_links(results: &[CrawlResult]) -> Vec<&CrawlResult> {
        results
            .iter()
            .filter(|r| {
                r.http_status >= 400
                    || matches!(r.status, PageStatus::Error | PageStatus::Timeout)
            })
            .collect()
    }

    /// Write the JSON error report: summary counters plus one entry per
    /// dead link with its referring pages.
    pub fn save_error_report(
        results: &[CrawlResult],
        stats: &CrawlStats,
        start_url: &str,
        output_path: &Path,
    ) -> Result<PathBuf, CrawlError> {
        let report = ErrorReport {
            generated_at: Local::now().format("%Y-%m-%dT%H:%M:%S").to_string(),
            start_url,
            summary: Summary {
                total_crawled: stats.total_crawled,
                total_discovered: stats.total_discovered,
                total_errors: stats.total_errors,
                total_2xx: stats.total_2xx,
                total_3xx: stats.total_3xx,
                total_4xx: stats.total_4xx,
                total_5xx: stats.total_5xx,
                duration: stats.duration_display(),
            },
            dead_links: Self::dead_links(results)
                .into_iter()
                .map(|r| DeadLink {
                    url: &r.url,
                    http_status: r.http_status,
                    status: r.status,
                    error_message: &r.error_message,
                    referring_pages: &r.referring_pages,
                })
                .collect(),
        };

        let json =
            serde_json::to_string_pretty(&report).map_err(|e| CrawlError::Parse(e.to_string()))?;
        fs::write(output_path, json)?;
        Ok(output_path.to_path_buf())
    }

    /// Wiki-markup table of all dead links, referrers included. Empty
    /// string when there is nothing to report. Referrers render as
    /// `"text" [url]`; a pipe inside a table cell would end the cell.
    pub fn generate_wiki_table(results: &[CrawlResult]) -> String {
        let errors = Self::dead_links(results);
        if errors.is_empty() {
            return String::new();
        }

        let mut lines = vec!["||URL||HTTP||Fehler||Verweisende Seiten||".to_string()];
        for result in errors {
            let http_code = if result.http_status != 0 {
                result.http_status.to_string()
            } else {
                "-".to_string()
            };

            let referring = if result.referring_pages.is_empty() {
                "-".to_string()
            } else {
                result
                    .referring_pages
                    .iter()
                    .map(|referrer| {
                        let text = referrer.link_text.trim();
                        if text.is_empty() {
                            format!("[{}]", referrer.url)
                        } else {
                            format!("\"{}\" [{}]", text, referrer.url)
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(" \\\\ ")
            };

            lines.push(format!(
                "|[{}]|{}|{}|{}|",
                result.url,
                http_code,
                result.status.as_str(),
                referring
            ));
        }
        lines.join("\n")
    }

    /// Export all pages carrying a form (HTTP 200 only) as JSON.
    pub fn save_forms_report(
        results: &[CrawlResult],
        start_url: &str,
        output_path: &Path,
    ) -> Result<PathBuf, CrawlError> {
        let pages: Vec<&str> = results
            .iter()
            .filter(|r| r.has_form && r.http_status == 200)
            .map(|r| r.url.as_str())
            .collect();

        let report = FormsReport {
            generated_at: Local::now().format("%Y-%m-%dT%H:%M:%S").to_string(),
            start_url,
            count: pages.len(),
            pages,
        };

        let json =
            serde_json::to_string_pretty(&report).map_err(|e| CrawlError::Parse(e.to_string()))?;
        fs::write(output_path, json)?;
        Ok(output_path.to_path_buf())
    }
}
