use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use headless_chrome::protocol::cdp::types::Event;
use headless_chrome::protocol::cdp::Network;
use headless_chrome::{Browser, LaunchOptionsBuilder, Tab};
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use sitemapper_core::{
    urlnorm, CrawlConfig, CrawlError, ExtractedLink, FetchOutcome, PageFetcher, UrlNormalizer,
};

// Same prefilter the DOM gives us for free: only absolute http(s) hrefs,
// text capped like the HTML fetcher caps it.
const LINKS_JS: &str = r#"JSON.stringify(
    [...document.querySelectorAll('a[href]')]
        .filter(a => a.href && a.href.startsWith('http'))
        .map(a => ({ href: a.href, text: (a.textContent || '').trim().substring(0, 200) }))
)"#;

const HAS_FORM_JS: &str = "document.querySelectorAll('form').length > 0";

#[derive(Deserialize)]
struct DomLink {
    href: String,
    #[serde(default)]
    text: String,
}

/// Main-frame response captured from the DevTools network events.
#[derive(Debug, Clone)]
struct DocumentResponse {
    url: String,
    status: u16,
    mime_type: String,
}

/// Fetches pages through one long-lived headless Chrome instance. Each
/// fetch opens a short-lived tab that is closed on every exit path.
///
/// The page's real status and content type come from the CDP
/// `Network.responseReceived` events. The intermediate status of a
/// redirect chain is not observable there, so redirects are reported
/// with a synthesized 301.
pub struct BrowserFetcher {
    browser: Browser,
    allowed_netloc: String,
    timeout: Duration,
}

impl BrowserFetcher {
    pub fn launch(config: &CrawlConfig) -> Result<Self, CrawlError> {
        let normalizer = UrlNormalizer::new(&config.start_url)?;

        let mut extra_args: Vec<OsString> = Vec::new();
        extra_args.push(OsString::from("--no-sandbox"));
        extra_args.push(OsString::from("--disable-dev-shm-usage"));
        extra_args.push(OsString::from("--disable-gpu"));

        let mut builder = LaunchOptionsBuilder::default();
        builder
            .headless(config.headless)
            .window_size(Some((1920, 1080)))
            .args(extra_args.iter().map(|a| a.as_ref()).collect());

        if let Ok(chrome_path) = std::env::var("CHROME_PATH") {
            builder.path(Some(resolve_chrome_path(chrome_path)));
        }

        let options = builder
            .build()
            .map_err(|e| CrawlError::Browser(e.to_string()))?;
        let browser = Browser::new(options).map_err(|e| CrawlError::Browser(e.to_string()))?;

        Ok(Self {
            browser,
            allowed_netloc: normalizer.netloc().to_string(),
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    /// Collect document responses for the tab. Must happen before the
    /// navigation so the main-frame response is not missed.
    fn watch_document_responses(
        &self,
        tab: &Arc<Tab>,
    ) -> Arc<Mutex<Vec<DocumentResponse>>> {
        let responses: Arc<Mutex<Vec<DocumentResponse>>> = Arc::new(Mutex::new(Vec::new()));

        let enabled = tab.call_method(Network::Enable {
            max_total_buffer_size: None,
            max_resource_buffer_size: None,
            max_post_data_size: None,
            report_direct_socket_traffic: None,
            enable_durable_messages: None,
        });
        if let Err(e) = enabled {
            warn!("network events unavailable, rendered statuses degrade to 200: {}", e);
            return responses;
        }

        let sink = Arc::clone(&responses);
        let listener = Arc::new(move |event: &Event| {
            if let Event::NetworkResponseReceived(e) = event {
                if e.params.Type == Network::ResourceType::Document {
                    let mut responses = sink.lock().unwrap_or_else(PoisonError::into_inner);
                    responses.push(DocumentResponse {
                        url: e.params.response.url.clone(),
                        status: e.params.response.status as u16,
                        mime_type: e.params.response.mime_type.clone(),
                    });
                }
            }
        });
        if let Err(e) = tab.add_event_listener(listener) {
            warn!("network events unavailable, rendered statuses degrade to 200: {}", e);
        }

        responses
    }

    fn fetch_on_tab(
        &self,
        tab: &Tab,
        url: &Url,
        responses: &Mutex<Vec<DocumentResponse>>,
    ) -> Result<FetchOutcome, CrawlError> {
        tab.navigate_to(url.as_str())
            .map_err(|e| CrawlError::Browser(e.to_string()))?;
        tab.wait_until_navigated()
            .map_err(|e| CrawlError::Browser(e.to_string()))?;

        let final_url = Url::parse(&tab.get_url()).unwrap_or_else(|_| url.clone());
        // Compare canonical forms: navigation may only have added a
        // trailing slash, which is not a redirect.
        let redirected =
            urlnorm::canonicalize_parsed(&final_url) != urlnorm::canonicalize_parsed(url);

        // The main-frame response carries the real status; after a
        // redirect chain it is the terminal document's.
        let document = {
            let responses = responses.lock().unwrap_or_else(PoisonError::into_inner);
            responses
                .iter()
                .rev()
                .find(|r| r.url == final_url.as_str())
                .or_else(|| responses.last())
                .cloned()
        };

        let http_status = if redirected {
            // the intermediate redirect code is not observable, 301 stands in
            301
        } else {
            document.as_ref().map(|d| d.status).unwrap_or(200)
        };
        let content_type = document
            .as_ref()
            .filter(|d| !d.mime_type.is_empty())
            .map(|d| d.mime_type.clone())
            .unwrap_or_else(|| "text/html".to_string());

        let mut outcome = FetchOutcome {
            http_status,
            content_type,
            last_modified: String::new(),
            final_url: final_url.clone(),
            redirected,
            links: Vec::new(),
            has_form: false,
        };

        if redirected && urlnorm::url_netloc(&final_url) != self.allowed_netloc {
            return Ok(outcome);
        }
        if !outcome.content_type.to_lowercase().contains("text/html") {
            return Ok(outcome);
        }

        outcome.has_form = self.eval_bool(tab, HAS_FORM_JS)?;
        outcome.links = self.eval_links(tab)?;
        Ok(outcome)
    }

    fn eval_bool(&self, tab: &Tab, js: &str) -> Result<bool, CrawlError> {
        let value = tab
            .evaluate(js, false)
            .map_err(|e| CrawlError::Browser(e.to_string()))?;
        Ok(matches!(value.value, Some(serde_json::Value::Bool(true))))
    }

    fn eval_links(&self, tab: &Tab) -> Result<Vec<ExtractedLink>, CrawlError> {
        let value = tab
            .evaluate(LINKS_JS, false)
            .map_err(|e| CrawlError::Browser(e.to_string()))?;
        let Some(serde_json::Value::String(json)) = value.value else {
            return Ok(Vec::new());
        };
        let dom_links: Vec<DomLink> =
            serde_json::from_str(&json).map_err(|e| CrawlError::Parse(e.to_string()))?;

        let mut links = Vec::new();
        for dom_link in dom_links {
            let Ok(mut resolved) = Url::parse(&dom_link.href) else {
                continue;
            };
            resolved.set_fragment(None);
            if urlnorm::url_netloc(&resolved) != self.allowed_netloc {
                continue;
            }
            links.push(ExtractedLink { url: resolved.to_string(), text: dom_link.text });
        }
        Ok(links)
    }
}

#[async_trait]
impl PageFetcher for BrowserFetcher {
    fn name(&self) -> &str {
        "browser"
    }

    async fn fetch(&self, url: &Url) -> Result<FetchOutcome, CrawlError> {
        let tab = self
            .browser
            .new_tab()
            .map_err(|e| CrawlError::Browser(e.to_string()))?;
        tab.set_default_timeout(self.timeout);

        let responses = self.watch_document_responses(&tab);
        let outcome = self.fetch_on_tab(&tab, url, &responses);

        if let Err(e) = tab.close(true) {
            debug!(url = %url, "tab close failed: {}", e);
        }
        outcome
    }

    async fn close(&self) {
        // Chrome exits when the Browser handle drops; nothing to surface.
        debug!("shutting down headless browser");
    }
}

/// CHROME_PATH may name the chrome binary itself or a bundled `browsers/`
/// directory next to a frozen executable.
fn resolve_chrome_path(value: String) -> PathBuf {
    let path = PathBuf::from(value);
    if path.is_dir() {
        path.join("chrome")
    } else {
        path
    }
}
