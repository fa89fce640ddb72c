pub mod config;
pub mod error;
pub mod types;
pub mod urlnorm;

pub use config::{cookie_header, Cookie, CrawlConfig, DEFAULT_USER_AGENT};
pub use error::{friendly_error_message, CrawlError};
pub use types::*;
pub use urlnorm::UrlNormalizer;

use async_trait::async_trait;
use url::Url;

/// Every fetch strategy implements this
#[async_trait]
pub trait PageFetcher: Send + Sync + 'static {
    fn name(&self) -> &str;

    async fn fetch(&self, url: &Url) -> Result<FetchOutcome, CrawlError>;

    /// Release long-lived resources (a browser, for instance).
    /// Shutdown failures are swallowed.
    async fn close(&self) {}
}

/// What a fetch strategy hands back to the scheduler for one URL.
///
/// `http_status` is the FIRST redirect status when the request was
/// redirected, never the terminal response's code. `final_url` is always
/// the terminal URL.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub http_status: u16,
    pub content_type: String,
    pub last_modified: String,
    pub final_url: Url,
    pub redirected: bool,
    pub links: Vec<ExtractedLink>,
    pub has_form: bool,
}

/// One internal link pulled out of a page, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedLink {
    pub url: String,
    pub text: String,
}
