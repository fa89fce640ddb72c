use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, COOKIE, LAST_MODIFIED, LOCATION};
use reqwest::redirect::Policy;
use tracing::debug;
use url::Url;

use sitemapper_core::{
    cookie_header, urlnorm, CrawlConfig, CrawlError, FetchOutcome, PageFetcher, UrlNormalizer,
};

use crate::html;

/// Redirect hops before giving up. The client never follows redirects on
/// its own; the loop below does, so the first 3xx status stays
/// observable.
const MAX_REDIRECT_HOPS: usize = 10;

pub struct HttpFetcher {
    client: reqwest::Client,
    allowed_netloc: String,
    timeout_secs: u64,
}

impl HttpFetcher {
    pub fn new(config: &CrawlConfig) -> Result<Self, CrawlError> {
        let normalizer = UrlNormalizer::new(&config.start_url)?;

        let mut headers = HeaderMap::new();
        if let Some(cookie) = cookie_header(&config.cookies) {
            if let Ok(value) = HeaderValue::from_str(&cookie) {
                headers.insert(COOKIE, value);
            }
        }

        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(true)
            .redirect(Policy::none())
            .default_headers(headers)
            .build()
            .map_err(|e| CrawlError::Network(e.to_string()))?;

        Ok(Self {
            client,
            allowed_netloc: normalizer.netloc().to_string(),
            timeout_secs: config.timeout_secs,
        })
    }

    fn map_error(&self, error: reqwest::Error) -> CrawlError {
        if error.is_timeout() {
            CrawlError::Timeout(self.timeout_secs)
        } else {
            CrawlError::Network(error.to_string())
        }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch(&self, url: &Url) -> Result<FetchOutcome, CrawlError> {
        let mut current = url.clone();
        let mut first_redirect: Option<u16> = None;
        let mut hops = 0;

        let response = loop {
            let response = self
                .client
                .get(current.clone())
                .send()
                .await
                .map_err(|e| self.map_error(e))?;

            let status = response.status();
            if !status.is_redirection() {
                break response;
            }

            hops += 1;
            if hops > MAX_REDIRECT_HOPS {
                return Err(CrawlError::TooManyRedirects);
            }
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| {
                    CrawlError::Network(format!("redirect without Location from {current}"))
                })?;
            let next = current
                .join(location)
                .map_err(|e| CrawlError::InvalidUrl(format!("{location}: {e}")))?;

            first_redirect.get_or_insert(status.as_u16());
            debug!(from = %current, to = %next, status = status.as_u16(), "following redirect");
            current = next;
        };

        let final_url = current;
        let content_type = header_value(response.headers(), &CONTENT_TYPE);
        let last_modified = header_value(response.headers(), &LAST_MODIFIED);
        let redirected = first_redirect.is_some();

        let mut outcome = FetchOutcome {
            http_status: first_redirect.unwrap_or_else(|| response.status().as_u16()),
            content_type,
            last_modified,
            final_url: final_url.clone(),
            redirected,
            links: Vec::new(),
            has_form: false,
        };

        // Redirect onto another host: report it, never parse the body.
        if redirected && urlnorm::url_netloc(&final_url) != self.allowed_netloc {
            return Ok(outcome);
        }

        if !outcome.content_type.to_lowercase().contains("text/html") {
            return Ok(outcome);
        }

        let body = response.text().await.map_err(|e| self.map_error(e))?;

        // Relative hrefs must resolve against the redirect target's path
        // (trailing slash matters), while the original host is kept so the
        // internal-link check survives www/non-www redirects.
        let link_base = if redirected {
            let mut base = url.clone();
            base.set_path(final_url.path());
            base.set_query(final_url.query());
            base
        } else {
            url.clone()
        };

        let parsed = html::parse_page(&body, &link_base, &self.allowed_netloc);
        outcome.links = parsed.links;
        outcome.has_form = parsed.has_form;
        Ok(outcome)
    }
}

fn header_value(headers: &HeaderMap, name: &reqwest::header::HeaderName) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string()
}
