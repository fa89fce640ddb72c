use serde::{Deserialize, Serialize};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/131.0.0.0 Safari/537.36";

/// A static cookie sent with every request of a crawl.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub start_url: String,
    pub max_depth: u32,
    pub concurrency: usize,
    pub timeout_secs: u64,
    /// Use the headless browser fetcher instead of plain HTTP.
    pub render: bool,
    pub headless: bool,
    pub respect_robots: bool,
    pub cookies: Vec<Cookie>,
    pub user_agent: String,
    /// Extra fetch attempts after the first failure.
    pub max_retries: u32,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            start_url: String::new(),
            max_depth: 10,
            concurrency: 8,
            timeout_secs: 30,
            render: false,
            headless: true,
            respect_robots: true,
            cookies: Vec::new(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_retries: 2,
        }
    }
}

impl CrawlConfig {
    pub fn new(start_url: impl Into<String>) -> Self {
        Self {
            start_url: start_url.into(),
            ..Self::default()
        }
    }
}

/// Render cookies as a `Cookie:` header value, or None when there are none.
pub fn cookie_header(cookies: &[Cookie]) -> Option<String> {
    if cookies.is_empty() {
        return None;
    }
    let joined = cookies
        .iter()
        .map(|c| format!("{}={}", c.name, c.value))
        .collect::<Vec<_>>()
        .join("; ");
    Some(joined)
}
