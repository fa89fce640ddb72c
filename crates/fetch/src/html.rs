use scraper::{Html, Selector};
use url::Url;

use sitemapper_core::{urlnorm, ExtractedLink};

/// Anchor text is capped at this many characters.
pub const MAX_LINK_TEXT: usize = 200;

pub struct ParsedPage {
    pub links: Vec<ExtractedLink>,
    pub has_form: bool,
}

/// Extract internal links (resolved against `link_base`, fragments
/// stripped) and the form flag from an HTML document.
pub fn parse_page(html_str: &str, link_base: &Url, allowed_netloc: &str) -> ParsedPage {
    let document = Html::parse_document(html_str);
    let links = extract_links(&document, link_base, allowed_netloc);
    let has_form = selector("form")
        .map(|sel| document.select(&sel).next().is_some())
        .unwrap_or(false);
    ParsedPage { links, has_form }
}

fn selector(s: &str) -> Option<Selector> {
    Selector::parse(s).ok()
}

fn extract_links(document: &Html, base: &Url, allowed_netloc: &str) -> Vec<ExtractedLink> {
    let Some(sel) = selector("a[href]") else {
        return Vec::new();
    };

    let mut links = Vec::new();
    for element in document.select(&sel) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let href = href.trim();
        if !urlnorm::is_crawlable_href(href) {
            continue;
        }
        let Ok(mut resolved) = base.join(href) else {
            continue;
        };
        resolved.set_fragment(None);
        if urlnorm::url_netloc(&resolved) != allowed_netloc {
            continue;
        }

        let text: String = element.text().collect();
        let text = truncate_chars(text.trim(), MAX_LINK_TEXT);
        links.push(ExtractedLink { url: resolved.to_string(), text });
    }
    links
}

pub fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://a.test/dir/").expect("base url")
    }

    #[test]
    fn extracts_internal_links_in_document_order() {
        let html = r#"
            <html><body>
                <a href="/x">Seite X</a>
                <a href="sub">Unterseite</a>
                <a href="https://a.test/y">Seite Y</a>
                <a href="https://other.test/z">Extern</a>
            </body></html>
        "#;
        let page = parse_page(html, &base(), "a.test");
        let urls: Vec<&str> = page.links.iter().map(|l| l.url.as_str()).collect();
        assert_eq!(
            urls,
            ["https://a.test/x", "https://a.test/dir/sub", "https://a.test/y"]
        );
        assert_eq!(page.links[0].text, "Seite X");
    }

    #[test]
    fn special_hrefs_are_dropped() {
        let html = r##"
            <a href="#top">Anker</a>
            <a href="javascript:void(0)">JS</a>
            <a href="mailto:x@a.test">Mail</a>
            <a href="tel:+491234">Telefon</a>
            <a href="data:text/plain,x">Data</a>
            <a href="">Leer</a>
            <a href="/real">Echt</a>
        "##;
        let page = parse_page(html, &base(), "a.test");
        assert_eq!(page.links.len(), 1);
        assert_eq!(page.links[0].url, "https://a.test/real");
    }

    #[test]
    fn fragments_are_stripped_from_targets() {
        let html = r#"<a href="/page#section">Link</a>"#;
        let page = parse_page(html, &base(), "a.test");
        assert_eq!(page.links[0].url, "https://a.test/page");
    }

    #[test]
    fn link_text_is_truncated() {
        let long = "x".repeat(500);
        let html = format!(r#"<a href="/p">{long}</a>"#);
        let page = parse_page(&html, &base(), "a.test");
        assert_eq!(page.links[0].text.chars().count(), MAX_LINK_TEXT);
    }

    #[test]
    fn form_detection() {
        let with_form = r#"<body><form action="/s"><input name="q"></form></body>"#;
        let without = r#"<body><p>nichts</p></body>"#;
        assert!(parse_page(with_form, &base(), "a.test").has_form);
        assert!(!parse_page(without, &base(), "a.test").has_form);
    }
}
