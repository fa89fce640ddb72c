use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use url::Url;

use crate::error::CrawlError;

/// URL endings that are never fetched (no HTML behind them).
pub const SKIP_EXTENSIONS: &[&str] = &[
    ".jpg", ".jpeg", ".png", ".gif", ".svg", ".webp", ".ico", ".bmp",
    ".pdf", ".doc", ".docx", ".xls", ".xlsx", ".ppt", ".pptx",
    ".zip", ".rar", ".gz", ".tar", ".7z",
    ".mp3", ".mp4", ".avi", ".mov", ".wmv", ".flv", ".webm",
    ".css", ".js", ".json", ".xml", ".woff", ".woff2", ".ttf", ".eot",
    ".exe", ".dmg", ".apk", ".msi",
];

// Safe set for re-encoding paths after decoding: alphanumerics plus
// /:@!$&'*+,;=-._~ stay literal, everything else (including non-ASCII)
// is percent-encoded. Queries additionally keep `?`.
const PATH_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b':')
    .remove(b'@')
    .remove(b'!')
    .remove(b'$')
    .remove(b'&')
    .remove(b'\'')
    .remove(b'*')
    .remove(b'+')
    .remove(b',')
    .remove(b';')
    .remove(b'=')
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

const QUERY_SET: &AsciiSet = &PATH_SET.remove(b'?');

/// href values that can never lead to a page.
pub fn is_crawlable_href(href: &str) -> bool {
    let href = href.trim();
    !(href.is_empty()
        || href.starts_with('#')
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:"))
}

/// host[:port] with the default port already dropped by the URL parser.
pub fn url_netloc(url: &Url) -> String {
    let host = url.host_str().unwrap_or("");
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

/// Canonical form used for dedup: scheme and host lowercased, the path
/// percent-decoded and uniformly re-encoded (so gesch%C3%A4ft and
/// geschäft compare equal), empty path becomes `/`, the query gets the
/// same treatment, the fragment is dropped.
pub fn canonicalize(raw: &str) -> Result<String, CrawlError> {
    let url = Url::parse(raw.trim()).map_err(|e| CrawlError::InvalidUrl(format!("{raw}: {e}")))?;
    Ok(canonicalize_parsed(&url))
}

pub fn canonicalize_parsed(url: &Url) -> String {
    let mut out = String::with_capacity(url.as_str().len());
    out.push_str(url.scheme());
    out.push_str("://");
    out.push_str(&url_netloc(url));

    let path = percent_decode_str(url.path()).decode_utf8_lossy();
    let path = utf8_percent_encode(&path, PATH_SET).to_string();
    if path.is_empty() {
        out.push('/');
    } else {
        out.push_str(&path);
    }

    if let Some(query) = url.query() {
        if !query.is_empty() {
            let query = percent_decode_str(query).decode_utf8_lossy();
            out.push('?');
            out.push_str(&utf8_percent_encode(&query, QUERY_SET).to_string());
        }
    }

    out
}

/// True when the canonical URL's path ends in a skipped extension.
pub fn has_skipped_extension(canonical: &str) -> bool {
    let Ok(url) = Url::parse(canonical) else {
        return true;
    };
    let path = url.path().to_lowercase();
    SKIP_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

/// Normalizes discovered URLs relative to a crawl's start URL.
///
/// Internal means the exact same host (and port) as the start URL; a
/// mismatched scheme on an internal link is rewritten to the start
/// scheme so http/https variants of the same page dedup together.
#[derive(Debug, Clone)]
pub struct UrlNormalizer {
    scheme: String,
    netloc: String,
    start_url: String,
}

impl UrlNormalizer {
    pub fn new(start_url: &str) -> Result<Self, CrawlError> {
        let canonical = canonicalize(start_url)?;
        let url = Url::parse(&canonical)
            .map_err(|e| CrawlError::InvalidUrl(format!("{canonical}: {e}")))?;
        if url.host_str().is_none() {
            return Err(CrawlError::InvalidUrl(format!("{start_url}: no host")));
        }
        Ok(Self {
            scheme: url.scheme().to_string(),
            netloc: url_netloc(&url),
            start_url: canonical,
        })
    }

    /// Canonical start URL.
    pub fn start_url(&self) -> &str {
        &self.start_url
    }

    pub fn netloc(&self) -> &str {
        &self.netloc
    }

    /// Canonicalize and apply the scheme rewrite for internal hosts.
    /// None for unparseable input.
    pub fn full_normalize(&self, raw: &str) -> Option<String> {
        let url = Url::parse(raw.trim()).ok()?;
        let mut canonical = canonicalize_parsed(&url);
        if url.scheme() != self.scheme && url_netloc(&url) == self.netloc {
            canonical = format!("{}{}", self.scheme, &canonical[url.scheme().len()..]);
        }
        Some(canonical)
    }

    /// Same host (and port) as the start URL.
    pub fn is_internal(&self, raw: &str) -> bool {
        Url::parse(raw.trim())
            .map(|url| url_netloc(&url) == self.netloc)
            .unwrap_or(false)
    }
}
