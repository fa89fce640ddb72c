//! robots.txt policy for a single origin.
//!
//! Only the `User-agent: *` block contributes Allow/Disallow rules;
//! `Sitemap:` lines are collected from every block. An unreachable or
//! unparseable robots.txt allows everything (fail-open).

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, COOKIE};
use tracing::debug;
use url::Url;

use sitemapper_core::{cookie_header, Cookie};

const ROBOTS_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Default)]
pub struct RobotsPolicy {
    /// (path prefix, is_allowed), in file order.
    rules: Vec<(String, bool)>,
    sitemaps: Vec<String>,
    loaded: bool,
}

impl RobotsPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch `/robots.txt` for the URL's origin and parse it. Any failure
    /// leaves the ruleset empty, i.e. everything stays allowed. `loaded`
    /// is set on a parsed 200 and on unreachable-server fail-open; a
    /// server that answers with another status leaves it unset.
    pub async fn load(&mut self, base_url: &str, cookies: &[Cookie]) {
        let Some(robots_url) = robots_url_for(base_url) else {
            self.loaded = true;
            return;
        };

        let mut headers = HeaderMap::new();
        if let Some(cookie) = cookie_header(cookies) {
            if let Ok(value) = HeaderValue::from_str(&cookie) {
                headers.insert(COOKIE, value);
            }
        }
        let client = match reqwest::Client::builder()
            .timeout(ROBOTS_TIMEOUT)
            .danger_accept_invalid_certs(true)
            .default_headers(headers)
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                debug!("robots client build failed: {}", e);
                self.loaded = true;
                return;
            }
        };

        match client.get(robots_url.clone()).send().await {
            Ok(response) if response.status().as_u16() == 200 => {
                match response.text().await {
                    Ok(text) => {
                        self.parse(&text);
                        self.loaded = true;
                    }
                    Err(e) => {
                        debug!(url = %robots_url, "robots.txt read failed: {}", e);
                        self.loaded = true;
                    }
                }
            }
            Ok(response) => {
                debug!(status = response.status().as_u16(), url = %robots_url, "no robots.txt");
            }
            Err(e) => {
                debug!(url = %robots_url, "robots.txt fetch failed: {}", e);
                self.loaded = true;
            }
        }
    }

    fn parse(&mut self, text: &str) {
        let mut in_wildcard_block = false;
        let mut in_specific_block = false;

        for raw in text.lines() {
            let mut line = raw.trim();
            if let Some(idx) = line.find('#') {
                line = line[..idx].trim();
            }
            if line.is_empty() {
                continue;
            }

            let lower = line.to_lowercase();

            if let Some(agent) = directive(line, &lower, "user-agent:") {
                if agent == "*" {
                    in_wildcard_block = true;
                    in_specific_block = false;
                } else {
                    in_wildcard_block = false;
                    in_specific_block = true;
                }
                continue;
            }

            // Outside the wildcard block only sitemap entries matter.
            if !in_wildcard_block || in_specific_block {
                if let Some(sitemap) = directive(line, &lower, "sitemap:") {
                    if !sitemap.is_empty() {
                        self.sitemaps.push(sitemap.to_string());
                    }
                }
                continue;
            }

            if let Some(path) = directive(line, &lower, "disallow:") {
                if !path.is_empty() {
                    self.rules.push((path.to_string(), false));
                }
            } else if let Some(path) = directive(line, &lower, "allow:") {
                if !path.is_empty() {
                    self.rules.push((path.to_string(), true));
                }
            } else if let Some(sitemap) = directive(line, &lower, "sitemap:") {
                if !sitemap.is_empty() {
                    self.sitemaps.push(sitemap.to_string());
                }
            }
        }
    }

    /// Longest matching Allow/Disallow prefix decides. No match, or no
    /// rules at all, means allowed.
    pub fn is_allowed(&self, url: &str) -> bool {
        if self.rules.is_empty() {
            return true;
        }

        let path = Url::parse(url)
            .map(|u| u.path().to_string())
            .unwrap_or_else(|_| "/".to_string());

        let mut best_len = 0;
        let mut allowed = true;
        for (prefix, allow) in &self.rules {
            if path.starts_with(prefix.as_str()) && prefix.len() > best_len {
                best_len = prefix.len();
                allowed = *allow;
            }
        }
        allowed
    }

    /// Sitemap URLs announced in robots.txt, in file order.
    pub fn sitemaps(&self) -> &[String] {
        &self.sitemaps
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }
}

fn robots_url_for(base_url: &str) -> Option<Url> {
    let mut url = Url::parse(base_url).ok()?;
    url.host_str()?;
    url.set_path("/robots.txt");
    url.set_query(None);
    url.set_fragment(None);
    Some(url)
}

fn directive<'a>(line: &'a str, lower: &str, name: &str) -> Option<&'a str> {
    if lower.starts_with(name) {
        Some(line[name.len()..].trim())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn parsed(text: &str) -> RobotsPolicy {
        let mut policy = RobotsPolicy::new();
        policy.parse(text);
        policy
    }

    #[test]
    fn only_wildcard_block_rules_apply() {
        let policy = parsed(
            "User-agent: BadBot\n\
             Disallow: /\n\
             \n\
             User-agent: *\n\
             Disallow: /private\n\
             Allow: /private/public\n",
        );
        assert!(policy.is_allowed("https://a.test/"));
        assert!(!policy.is_allowed("https://a.test/private/x"));
        assert!(policy.is_allowed("https://a.test/private/public/x"));
    }

    #[test]
    fn longest_prefix_wins() {
        let policy = parsed(
            "User-agent: *\n\
             Allow: /dir/deep\n\
             Disallow: /dir\n",
        );
        assert!(!policy.is_allowed("https://a.test/dir/file"));
        assert!(policy.is_allowed("https://a.test/dir/deep/file"));
    }

    #[test]
    fn no_rules_allows_everything() {
        let policy = RobotsPolicy::new();
        assert!(policy.is_allowed("https://a.test/anything"));
    }

    #[test]
    fn comments_are_stripped() {
        let policy = parsed(
            "# full line comment\n\
             User-agent: * # trailing\n\
             Disallow: /secret # another\n",
        );
        assert!(!policy.is_allowed("https://a.test/secret/page"));
        assert!(policy.is_allowed("https://a.test/open"));
    }

    #[test]
    fn sitemaps_collected_from_every_block() {
        let policy = parsed(
            "Sitemap: https://a.test/sitemap-global.xml\n\
             User-agent: OtherBot\n\
             Disallow: /\n\
             Sitemap: https://a.test/sitemap-other.xml\n\
             User-agent: *\n\
             Sitemap: https://a.test/sitemap-wildcard.xml\n",
        );
        assert_eq!(
            policy.sitemaps(),
            [
                "https://a.test/sitemap-global.xml",
                "https://a.test/sitemap-other.xml",
                "https://a.test/sitemap-wildcard.xml",
            ]
        );
        // the OtherBot disallow must not leak into the wildcard rules
        assert!(policy.is_allowed("https://a.test/page"));
    }

    #[tokio::test]
    async fn load_parses_served_rules() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "User-agent: *\nDisallow: /private\nSitemap: https://a.test/sitemap.xml\n",
            ))
            .mount(&server)
            .await;

        let mut policy = RobotsPolicy::new();
        policy.load(&server.uri(), &[]).await;

        assert!(policy.is_loaded());
        assert!(!policy.is_allowed(&format!("{}/private/x", server.uri())));
        assert!(policy.is_allowed(&format!("{}/public", server.uri())));
        assert_eq!(policy.sitemaps(), ["https://a.test/sitemap.xml"]);
    }

    #[tokio::test]
    async fn missing_robots_fails_open_without_loading() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let mut policy = RobotsPolicy::new();
        policy.load(&server.uri(), &[]).await;

        // a reachable server without a robots.txt is not "loaded",
        // but everything stays allowed
        assert!(!policy.is_loaded());
        assert!(policy.is_allowed(&format!("{}/anything", server.uri())));
    }

    #[tokio::test]
    async fn unreachable_robots_fails_open_as_loaded() {
        // nothing listens on this port
        let mut policy = RobotsPolicy::new();
        policy.load("http://127.0.0.1:9/", &[]).await;

        assert!(policy.is_loaded());
        assert!(policy.is_allowed("http://127.0.0.1:9/anything"));
    }
}
