use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a single crawled page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageStatus {
    Pending,
    Crawling,
    Ok,
    Redirect,
    /// Redirect onto another host.
    RedirectExternal,
    Error,
    Timeout,
    /// robots.txt disallowed or filtered.
    Skipped,
    /// Discovered beyond the depth limit, never fetched.
    MaxDepth,
}

impl PageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageStatus::Pending => "pending",
            PageStatus::Crawling => "crawling",
            PageStatus::Ok => "ok",
            PageStatus::Redirect => "redirect",
            PageStatus::RedirectExternal => "redirect_external",
            PageStatus::Error => "error",
            PageStatus::Timeout => "timeout",
            PageStatus::Skipped => "skipped",
            PageStatus::MaxDepth => "max_depth",
        }
    }
}

impl std::fmt::Display for PageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A page that links to a given result, tracked on the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferringPage {
    pub url: String,
    pub link_text: String,
}

/// Result for one unique canonical URL.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlResult {
    pub url: String,
    pub status: PageStatus,
    /// 0 when no HTTP response was received. For redirects this is the
    /// FIRST redirect status, not the terminal response's code.
    pub http_status: u16,
    pub content_type: String,
    pub depth: u32,
    pub parent_url: String,
    pub load_time_ms: f64,
    pub last_modified: String,
    /// Internal links extracted from this page.
    pub links_found: usize,
    pub error_message: String,
    /// Final URL after redirect(s), empty when not redirected.
    pub redirect_url: String,
    pub has_form: bool,
    pub referring_pages: Vec<ReferringPage>,
}

impl CrawlResult {
    pub fn new(url: impl Into<String>, depth: u32, parent_url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: PageStatus::Pending,
            http_status: 0,
            content_type: String::new(),
            depth,
            parent_url: parent_url.into(),
            load_time_ms: 0.0,
            last_modified: String::new(),
            links_found: 0,
            error_message: String::new(),
            redirect_url: String::new(),
            has_form: false,
            referring_pages: Vec::new(),
        }
    }

    /// HTTP error (4xx/5xx) or a transport failure. Redirects are never
    /// errors, whatever their first status code.
    pub fn is_error(&self) -> bool {
        if matches!(self.status, PageStatus::Redirect | PageStatus::RedirectExternal) {
            return false;
        }
        self.http_status >= 400 || matches!(self.status, PageStatus::Error | PageStatus::Timeout)
    }

    pub fn is_external_redirect(&self) -> bool {
        self.status == PageStatus::RedirectExternal
    }

    pub fn is_successful(&self) -> bool {
        matches!(
            self.status,
            PageStatus::Ok | PageStatus::Redirect | PageStatus::RedirectExternal
        )
    }
}

/// Counters for one whole crawl.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CrawlStats {
    pub total_discovered: u64,
    pub total_crawled: u64,
    pub total_errors: u64,
    pub total_skipped: u64,
    pub total_2xx: u64,
    pub total_3xx: u64,
    pub total_4xx: u64,
    pub total_5xx: u64,
    pub queue_size: usize,
    pub max_depth_reached: u32,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub urls_per_second: f64,
}

impl CrawlStats {
    /// Put a response code into its century bucket. 4xx and 5xx also
    /// count as errors.
    pub fn count_http_status(&mut self, status: u16) {
        match status / 100 {
            2 => self.total_2xx += 1,
            3 => self.total_3xx += 1,
            4 => {
                self.total_4xx += 1;
                self.total_errors += 1;
            }
            5 => {
                self.total_5xx += 1;
                self.total_errors += 1;
            }
            _ => {}
        }
    }

    pub fn duration_seconds(&self) -> f64 {
        let Some(start) = self.start_time else { return 0.0 };
        let end = self.end_time.unwrap_or_else(Utc::now);
        (end - start).num_milliseconds() as f64 / 1000.0
    }

    pub fn duration_display(&self) -> String {
        let secs = self.duration_seconds();
        if secs < 60.0 {
            return format!("{secs:.0}s");
        }
        let mins = (secs / 60.0) as u64;
        let remaining = (secs % 60.0) as u64;
        if mins < 60 {
            return format!("{mins}m {remaining}s");
        }
        format!("{}h {}m", mins / 60, mins % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn redirect_is_never_an_error() {
        let mut result = CrawlResult::new("https://a.test/r", 0, "");
        result.status = PageStatus::Redirect;
        result.http_status = 301;
        assert!(!result.is_error());
        assert!(result.is_successful());

        result.status = PageStatus::RedirectExternal;
        assert!(!result.is_error());
        assert!(result.is_external_redirect());
    }

    #[test]
    fn http_4xx_is_an_error() {
        let mut result = CrawlResult::new("https://a.test/gone", 1, "https://a.test/");
        result.status = PageStatus::Error;
        result.http_status = 404;
        assert!(result.is_error());
        assert!(!result.is_successful());
    }

    #[test]
    fn transport_failure_without_status_is_an_error() {
        let mut result = CrawlResult::new("https://a.test/x", 1, "https://a.test/");
        result.status = PageStatus::Error;
        assert_eq!(result.http_status, 0);
        assert!(result.is_error());
    }

    #[test]
    fn status_buckets() {
        let mut stats = CrawlStats::default();
        stats.count_http_status(200);
        stats.count_http_status(204);
        stats.count_http_status(301);
        stats.count_http_status(404);
        stats.count_http_status(500);
        assert_eq!(stats.total_2xx, 2);
        assert_eq!(stats.total_3xx, 1);
        assert_eq!(stats.total_4xx, 1);
        assert_eq!(stats.total_5xx, 1);
        assert_eq!(stats.total_errors, 2);
    }

    #[test]
    fn status_tokens() {
        assert_eq!(PageStatus::RedirectExternal.as_str(), "redirect_external");
        assert_eq!(PageStatus::MaxDepth.to_string(), "max_depth");
        assert_eq!(
            serde_json::to_string(&PageStatus::Ok).expect("serialize"),
            "\"ok\""
        );
    }

    #[test]
    fn duration_formatting() {
        let start = Utc::now();
        let mut stats = CrawlStats {
            start_time: Some(start),
            end_time: Some(start + Duration::seconds(42)),
            ..CrawlStats::default()
        };
        assert_eq!(stats.duration_display(), "42s");

        stats.end_time = Some(start + Duration::seconds(185));
        assert_eq!(stats.duration_display(), "3m 5s");

        stats.end_time = Some(start + Duration::seconds(3_720));
        assert_eq!(stats.duration_display(), "1h 2m");
    }
}
