//! Bounded-parallel BFS crawl scheduler.
//!
//! One task per URL, gated by a semaphore of the configured size. All
//! shared state (result map, seen set, queue, referrer bookkeeping,
//! counters) sits behind a single mutex; the seen-set insertion under
//! that mutex is what decides new vs duplicate, so no URL is ever
//! fetched twice.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::debug;
use url::Url;

use sitemapper_core::{
    friendly_error_message, urlnorm, CrawlConfig, CrawlError, CrawlResult, CrawlStats,
    FetchOutcome, PageFetcher, PageStatus, ReferringPage, UrlNormalizer,
};
use sitemapper_fetch::{BrowserFetcher, HttpFetcher};
use sitemapper_robots::RobotsPolicy;

pub type ResultCallback = Arc<dyn Fn(&CrawlResult) + Send + Sync>;
pub type LogCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Referrers recorded per result before the list is capped.
const MAX_REFERRING_PAGES: usize = 50;

struct QueuedUrl {
    url: String,
    depth: u32,
    parent: String,
}

#[derive(Default)]
struct CrawlState {
    results: HashMap<String, CrawlResult>,
    /// Creation order of `results` keys.
    order: Vec<String>,
    seen: HashSet<String>,
    queue: VecDeque<QueuedUrl>,
    /// Referrers recorded before their target got a result.
    pending_referrers: HashMap<String, Vec<ReferringPage>>,
    stats: CrawlStats,
}

impl CrawlState {
    /// Normalize, dedup through the seen set, apply the extension filter
    /// and push onto the queue. True when the URL was new.
    fn enqueue(&mut self, normalizer: &UrlNormalizer, raw: &str, depth: u32, parent: &str) -> bool {
        let Some(normalized) = normalizer.full_normalize(raw) else {
            return false;
        };
        if self.seen.contains(&normalized) {
            return false;
        }
        if urlnorm::has_skipped_extension(&normalized) {
            return false;
        }

        self.seen.insert(normalized.clone());
        self.queue.push_back(QueuedUrl { url: normalized, depth, parent: parent.to_string() });
        self.stats.total_discovered += 1;
        self.stats.queue_size = self.queue.len();
        true
    }

    /// Record `source` as a referrer of `target`, deduped by source URL
    /// and capped. Targets without a result yet park in
    /// `pending_referrers` until one is created.
    fn track_referrer(
        &mut self,
        normalizer: &UrlNormalizer,
        target: &str,
        source: &str,
        link_text: &str,
    ) {
        let Some(normalized) = normalizer.full_normalize(target) else {
            return;
        };

        let list = match self.results.get_mut(&normalized) {
            Some(result) => &mut result.referring_pages,
            None => self.pending_referrers.entry(normalized).or_default(),
        };
        if list.len() >= MAX_REFERRING_PAGES || list.iter().any(|r| r.url == source) {
            return;
        }
        list.push(ReferringPage { url: source.to_string(), link_text: link_text.to_string() });
    }

    /// A link discovered beyond the depth limit still gets a result so
    /// the site tree stays complete; it is never fetched.
    fn insert_phantom(&mut self, normalized: String, depth: u32, parent: &str) {
        if self.seen.contains(&normalized) {
            return;
        }
        self.seen.insert(normalized.clone());

        let mut result = CrawlResult::new(normalized.clone(), depth, parent);
        result.status = PageStatus::MaxDepth;
        self.order.push(normalized.clone());
        self.results.insert(normalized, result);
        self.stats.total_discovered += 1;
    }
}

struct TaskCtx {
    normalizer: UrlNormalizer,
    fetcher: Arc<dyn PageFetcher>,
    robots: RobotsPolicy,
    respect_robots: bool,
    max_depth: u32,
    max_retries: u32,
    state: Arc<Mutex<CrawlState>>,
    semaphore: Semaphore,
    cancelled: Arc<AtomicBool>,
    on_result: ResultCallback,
    on_log: LogCallback,
}

impl TaskCtx {
    fn lock(&self) -> MutexGuard<'_, CrawlState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    fn emit(&self, result: &CrawlResult) {
        (self.on_result)(result);
    }

    fn log(&self, line: &str) {
        (self.on_log)(line);
    }
}

/// Recursive same-origin crawler.
///
/// Crawls a website starting from one URL, follows internal links
/// breadth-first and collects a result per unique canonical URL.
pub struct Crawler {
    config: CrawlConfig,
    normalizer: UrlNormalizer,
    start_url: String,
    fetcher: Arc<dyn PageFetcher>,
    state: Arc<Mutex<CrawlState>>,
    cancelled: Arc<AtomicBool>,
    /// Extra entry points (from the published sitemap), queued at depth 1.
    seed_urls: Vec<String>,
}

impl Crawler {
    /// The fetch strategy is fixed here: plain HTTP, or a rendering
    /// browser when `config.render` is set.
    pub fn new(config: CrawlConfig) -> Result<Self, CrawlError> {
        let normalizer = UrlNormalizer::new(&config.start_url)?;
        let start_url = normalizer.start_url().to_string();

        let fetcher: Arc<dyn PageFetcher> = if config.render {
            Arc::new(BrowserFetcher::launch(&config)?)
        } else {
            Arc::new(HttpFetcher::new(&config)?)
        };

        Ok(Self {
            config,
            normalizer,
            start_url,
            fetcher,
            state: Arc::new(Mutex::new(CrawlState::default())),
            cancelled: Arc::new(AtomicBool::new(false)),
            seed_urls: Vec::new(),
        })
    }

    /// Canonical form of the configured start URL.
    pub fn start_url(&self) -> &str {
        &self.start_url
    }

    /// Register extra seed URLs for the next crawl. Only same-host URLs
    /// are accepted; returns how many were.
    pub fn add_seed_urls(&mut self, urls: &HashSet<String>) -> usize {
        let mut accepted = 0;
        for url in urls {
            if !self.normalizer.is_internal(url) {
                continue;
            }
            self.seed_urls.push(url.clone());
            accepted += 1;
        }
        accepted
    }

    /// Stop the crawl: no new tasks are started, in-flight fetches drain.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Snapshot of the current counters.
    pub fn stats(&self) -> CrawlStats {
        self.lock().stats.clone()
    }

    /// All results so far, in creation order.
    pub fn results(&self) -> Vec<CrawlResult> {
        let state = self.lock();
        state
            .order
            .iter()
            .filter_map(|url| state.results.get(url).cloned())
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, CrawlState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run the crawl. Per-URL failures land in the results, they never
    /// propagate; `on_result` sees every status transition and `on_log`
    /// a human-readable line per URL.
    pub async fn crawl(
        &self,
        on_result: Option<ResultCallback>,
        on_log: Option<LogCallback>,
    ) -> Result<Vec<CrawlResult>, CrawlError> {
        let on_result: ResultCallback = match on_result {
            Some(callback) => callback,
            None => Arc::new(|_| {}),
        };
        let on_log: LogCallback = match on_log {
            Some(callback) => callback,
            None => Arc::new(|_| {}),
        };

        self.lock().stats.start_time = Some(Utc::now());

        let mut robots = RobotsPolicy::new();
        if self.config.respect_robots {
            on_log("Lade robots.txt...");
            robots.load(&self.start_url, &self.config.cookies).await;
            if !robots.sitemaps().is_empty() {
                on_log(&format!(
                    "  robots.txt: {} Sitemap(s) gefunden",
                    robots.sitemaps().len()
                ));
            }
            on_log("  robots.txt geladen");
        } else {
            on_log("robots.txt wird ignoriert (--ignore-robots)");
        }

        let seed_added = {
            let mut state = self.lock();
            state.enqueue(&self.normalizer, &self.start_url, 0, "");
            let mut seed_added = 0;
            for seed in &self.seed_urls {
                if state.enqueue(&self.normalizer, seed, 1, &self.start_url) {
                    seed_added += 1;
                }
            }
            seed_added
        };
        if seed_added > 0 {
            on_log(&format!("  {seed_added} Seed-URLs aus Sitemap in Queue"));
        }

        let ctx = Arc::new(TaskCtx {
            normalizer: self.normalizer.clone(),
            fetcher: Arc::clone(&self.fetcher),
            robots,
            respect_robots: self.config.respect_robots,
            max_depth: self.config.max_depth,
            max_retries: self.config.max_retries,
            state: Arc::clone(&self.state),
            semaphore: Semaphore::new(self.config.concurrency),
            cancelled: Arc::clone(&self.cancelled),
            on_result,
            on_log,
        });

        debug!(
            fetcher = self.fetcher.name(),
            concurrency = self.config.concurrency,
            max_depth = self.config.max_depth,
            "crawl started"
        );

        let mut tasks: JoinSet<()> = JoinSet::new();
        loop {
            if ctx.is_cancelled() {
                break;
            }

            while tasks.len() < self.config.concurrency {
                let job = {
                    let mut state = ctx.lock();
                    let job = state.queue.pop_front();
                    state.stats.queue_size = state.queue.len();
                    job
                };
                let Some(job) = job else { break };
                let task_ctx = Arc::clone(&ctx);
                tasks.spawn(async move { crawl_url(task_ctx, job).await });
            }

            if tasks.is_empty() {
                if ctx.lock().queue.is_empty() {
                    break;
                }
                continue;
            }

            // Park until one task finishes: a slot frees up, or its links
            // refilled the queue.
            let _ = tasks.join_next().await;
        }

        // Cancelled or finished: drain whatever is still in flight.
        while tasks.join_next().await.is_some() {}

        self.fetcher.close().await;

        {
            let mut state = self.lock();
            state.stats.end_time = Some(Utc::now());
            let duration = state.stats.duration_seconds();
            if duration > 0.0 {
                state.stats.urls_per_second = state.stats.total_crawled as f64 / duration;
            }
        }

        Ok(self.results())
    }
}

async fn crawl_url(ctx: Arc<TaskCtx>, job: QueuedUrl) {
    let QueuedUrl { url, depth, parent } = job;

    {
        let mut state = ctx.lock();
        let mut result = CrawlResult::new(url.clone(), depth, parent);
        if let Some(pending) = state.pending_referrers.remove(&url) {
            result.referring_pages = pending;
        }
        state.order.push(url.clone());
        state.results.insert(url.clone(), result);
    }

    if ctx.respect_robots && !ctx.robots.is_allowed(&url) {
        let snapshot = {
            let mut state = ctx.lock();
            state.stats.total_skipped += 1;
            let Some(result) = state.results.get_mut(&url) else { return };
            result.status = PageStatus::Skipped;
            result.error_message = "robots.txt disallowed".to_string();
            result.clone()
        };
        ctx.log(&format!("  SKIP (robots.txt): {url}"));
        ctx.emit(&snapshot);
        return;
    }

    let Ok(_permit) = ctx.semaphore.acquire().await else {
        return;
    };
    if ctx.is_cancelled() {
        return;
    }

    let snapshot = {
        let mut state = ctx.lock();
        let Some(result) = state.results.get_mut(&url) else { return };
        result.status = PageStatus::Crawling;
        result.clone()
    };
    ctx.emit(&snapshot);

    let started = Instant::now();
    match fetch_with_retries(&ctx, &url).await {
        Ok(outcome) => finish_page(&ctx, &url, depth, started, outcome),
        Err(error) => {
            let message = friendly_error_message(&error);
            let snapshot = {
                let mut state = ctx.lock();
                state.stats.total_errors += 1;
                state.stats.total_crawled += 1;
                state.stats.queue_size = state.queue.len();
                let Some(result) = state.results.get_mut(&url) else { return };
                result.status = PageStatus::Error;
                result.error_message = message.clone();
                result.load_time_ms = elapsed_ms(started);
                result.clone()
            };
            ctx.log(&format!("  ERR | {url} | {message}"));
            ctx.emit(&snapshot);
        }
    }
}

async fn fetch_with_retries(ctx: &TaskCtx, url: &str) -> Result<FetchOutcome, CrawlError> {
    let parsed = Url::parse(url).map_err(|e| CrawlError::InvalidUrl(format!("{url}: {e}")))?;

    let mut attempt: u32 = 0;
    loop {
        match ctx.fetcher.fetch(&parsed).await {
            Ok(outcome) => return Ok(outcome),
            Err(error) => {
                if attempt >= ctx.max_retries {
                    return Err(error);
                }
                attempt += 1;
                debug!(url, attempt, "fetch failed, retrying: {}", error);
                ctx.log(&format!("  Retry {attempt}/{}: {url}", ctx.max_retries));
                tokio::time::sleep(std::time::Duration::from_secs(2 * attempt as u64)).await;
            }
        }
    }
}

fn finish_page(ctx: &TaskCtx, url: &str, depth: u32, started: Instant, outcome: FetchOutcome) {
    let mut new_links = 0usize;

    let snapshot = {
        let mut state = ctx.lock();

        // Redirects count as 3xx only, never additionally as the
        // terminal response's bucket.
        let redirect_url = if outcome.redirected {
            outcome.final_url.to_string()
        } else {
            String::new()
        };
        let status = if !redirect_url.is_empty() {
            state.stats.total_3xx += 1;
            if ctx.normalizer.is_internal(&redirect_url) {
                PageStatus::Redirect
            } else {
                PageStatus::RedirectExternal
            }
        } else if outcome.http_status >= 400 {
            state.stats.count_http_status(outcome.http_status);
            PageStatus::Error
        } else {
            state.stats.count_http_status(outcome.http_status);
            PageStatus::Ok
        };

        for link in &outcome.links {
            state.track_referrer(&ctx.normalizer, &link.url, url, &link.text);

            if depth + 1 <= ctx.max_depth {
                if state.enqueue(&ctx.normalizer, &link.url, depth + 1, url) {
                    new_links += 1;
                }
            } else if let Some(normalized) = ctx.normalizer.full_normalize(&link.url) {
                state.insert_phantom(normalized, depth + 1, url);
            }
        }

        state.stats.total_crawled += 1;
        if depth > state.stats.max_depth_reached {
            state.stats.max_depth_reached = depth;
        }
        state.stats.queue_size = state.queue.len();

        let Some(result) = state.results.get_mut(url) else { return };
        result.status = status;
        result.http_status = outcome.http_status;
        result.content_type = outcome.content_type;
        result.last_modified = outcome.last_modified;
        result.redirect_url = redirect_url;
        result.has_form = outcome.has_form;
        result.links_found = outcome.links.len();
        result.load_time_ms = elapsed_ms(started);
        result.clone()
    };

    let status_str = if snapshot.http_status != 0 {
        format!("HTTP {}", snapshot.http_status)
    } else {
        "OK".to_string()
    };
    ctx.log(&format!(
        "  {status_str} | {:.0}ms | d={depth} | +{new_links} Links | {url}",
        snapshot.load_time_ms
    ));
    ctx.emit(&snapshot);
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}
