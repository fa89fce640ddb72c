//! Writes standards-compliant sitemap.xml files.
//!
//! Above 50,000 URLs the output is split into part files plus a
//! `<sitemapindex>` referencing them by basename.

use std::fs;
use std::path::{Path, PathBuf};

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use tracing::info;

use sitemapper_core::{CrawlError, CrawlResult};

use crate::reader::SITEMAP_NS;

/// Max URLs per sitemap file, per the standard.
pub const MAX_URLS_PER_SITEMAP: usize = 50_000;

pub struct SitemapWriter<'a> {
    results: &'a [CrawlResult],
}

impl<'a> SitemapWriter<'a> {
    pub fn new(results: &'a [CrawlResult]) -> Self {
        Self { results }
    }

    /// Write the sitemap file(s). Returns the written paths; an empty
    /// list when no page qualifies.
    pub fn write(&self, output_path: &Path) -> Result<Vec<PathBuf>, CrawlError> {
        let pages: Vec<&CrawlResult> = self
            .results
            .iter()
            .filter(|r| r.is_successful() && is_html(r))
            .collect();

        if pages.is_empty() {
            return Ok(Vec::new());
        }

        if pages.len() <= MAX_URLS_PER_SITEMAP {
            fs::write(output_path, render_urlset(&pages)?)?;
            info!(file = %output_path.display(), urls = pages.len(), "sitemap written");
            return Ok(vec![output_path.to_path_buf()]);
        }

        self.write_index(&pages, output_path)
    }

    fn write_index(
        &self,
        pages: &[&CrawlResult],
        path: &Path,
    ) -> Result<Vec<PathBuf>, CrawlError> {
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("sitemap");
        let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("xml");
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();

        let mut written = Vec::new();
        for (idx, chunk) in pages.chunks(MAX_URLS_PER_SITEMAP).enumerate() {
            let part = dir.join(format!("{stem}-{}.{ext}", idx + 1));
            fs::write(&part, render_urlset(chunk)?)?;
            written.push(part);
        }

        fs::write(path, render_index(&written)?)?;
        written.insert(0, path.to_path_buf());
        info!(files = written.len(), urls = pages.len(), "sitemap index written");
        Ok(written)
    }
}

fn render_urlset(pages: &[&CrawlResult]) -> Result<Vec<u8>, CrawlError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(xml_error)?;

    let mut urlset = BytesStart::new("urlset");
    urlset.push_attribute(("xmlns", SITEMAP_NS));
    writer.write_event(Event::Start(urlset)).map_err(xml_error)?;

    for page in pages {
        writer
            .write_event(Event::Start(BytesStart::new("url")))
            .map_err(xml_error)?;
        write_text_element(&mut writer, "loc", &page.url)?;
        if !page.last_modified.is_empty() {
            write_text_element(&mut writer, "lastmod", &page.last_modified)?;
        }
        write_text_element(&mut writer, "priority", &estimate_priority(page.depth))?;
        writer
            .write_event(Event::End(BytesEnd::new("url")))
            .map_err(xml_error)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new("urlset")))
        .map_err(xml_error)?;

    let mut out = writer.into_inner();
    out.push(b'\n');
    Ok(out)
}

fn render_index(parts: &[PathBuf]) -> Result<Vec<u8>, CrawlError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(xml_error)?;

    let mut root = BytesStart::new("sitemapindex");
    root.push_attribute(("xmlns", SITEMAP_NS));
    writer.write_event(Event::Start(root)).map_err(xml_error)?;

    for part in parts {
        let basename = part.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        writer
            .write_event(Event::Start(BytesStart::new("sitemap")))
            .map_err(xml_error)?;
        write_text_element(&mut writer, "loc", basename)?;
        writer
            .write_event(Event::End(BytesEnd::new("sitemap")))
            .map_err(xml_error)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new("sitemapindex")))
        .map_err(xml_error)?;

    let mut out = writer.into_inner();
    out.push(b'\n');
    Ok(out)
}

fn write_text_element(
    writer: &mut Writer<Vec<u8>>,
    tag: &str,
    text: &str,
) -> Result<(), CrawlError> {
    writer
        .write_event(Event::Start(BytesStart::new(tag)))
        .map_err(xml_error)?;
    writer
        .write_event(Event::Text(BytesText::new(text)))
        .map_err(xml_error)?;
    writer
        .write_event(Event::End(BytesEnd::new(tag)))
        .map_err(xml_error)?;
    Ok(())
}

/// Depth 0 (start page) = 1.0, depth 1 = 0.8, and so on down to 0.1.
fn estimate_priority(depth: u32) -> String {
    let priority = (1.0 - 0.2 * depth as f64).max(0.1);
    format!("{priority:.1}")
}

fn is_html(result: &CrawlResult) -> bool {
    let content_type = result.content_type.to_lowercase();
    content_type.contains("text/html") || content_type.is_empty()
}

fn xml_error(error: impl std::fmt::Display) -> CrawlError {
    CrawlError::Parse(error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::{parse_sitemap, SitemapEntry};
    use sitemapper_core::PageStatus;

    fn ok_result(url: &str, depth: u32) -> CrawlResult {
        let mut result = CrawlResult::new(url, depth, "");
        result.status = PageStatus::Ok;
        result.http_status = 200;
        result.content_type = "text/html; charset=utf-8".to_string();
        result
    }

    #[test]
    fn writes_a_single_urlset() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("sitemap.xml");

        let mut with_lastmod = ok_result("https://a.test/x", 1);
        with_lastmod.last_modified = "Tue, 02 Jan 2024 10:00:00 GMT".to_string();
        let results = vec![ok_result("https://a.test/", 0), with_lastmod];

        let written = SitemapWriter::new(&results).write(&path).expect("write");
        assert_eq!(written, vec![path.clone()]);

        let xml = std::fs::read_to_string(&path).expect("read");
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains(SITEMAP_NS));
        assert!(xml.contains("<lastmod>Tue, 02 Jan 2024 10:00:00 GMT</lastmod>"));
        assert!(xml.contains("<priority>1.0</priority>"));
        assert!(xml.contains("<priority>0.8</priority>"));

        let entries = parse_sitemap(&xml);
        assert_eq!(
            entries,
            vec![
                SitemapEntry::Url("https://a.test/".to_string()),
                SitemapEntry::Url("https://a.test/x".to_string()),
            ]
        );
    }

    #[test]
    fn filters_failures_and_non_html() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("sitemap.xml");

        let mut error = CrawlResult::new("https://a.test/404", 1, "");
        error.status = PageStatus::Error;
        error.http_status = 404;

        let mut pdf = ok_result("https://a.test/datei.pdf", 1);
        pdf.content_type = "application/pdf".to_string();

        // empty content type counts as HTML (some servers omit the header)
        let mut untyped = ok_result("https://a.test/untyped", 1);
        untyped.content_type = String::new();

        let results = vec![ok_result("https://a.test/", 0), error, pdf, untyped];
        let written = SitemapWriter::new(&results).write(&path).expect("write");
        assert_eq!(written.len(), 1);

        let xml = std::fs::read_to_string(&path).expect("read");
        let urls: Vec<SitemapEntry> = parse_sitemap(&xml);
        assert_eq!(urls.len(), 2);
        assert!(!xml.contains("404"));
        assert!(!xml.contains("datei.pdf"));
    }

    #[test]
    fn nothing_to_write_returns_no_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("sitemap.xml");

        let mut error = CrawlResult::new("https://a.test/x", 0, "");
        error.status = PageStatus::Error;
        error.http_status = 500;

        let written = SitemapWriter::new(&[error]).write(&path).expect("write");
        assert!(written.is_empty());
        assert!(!path.exists());
    }

    #[test]
    fn chunks_above_the_limit_into_an_index() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("sitemap.xml");

        let results: Vec<CrawlResult> = (0..MAX_URLS_PER_SITEMAP + 1)
            .map(|i| ok_result(&format!("https://a.test/seite-{i}"), 1))
            .collect();

        let written = SitemapWriter::new(&results).write(&path).expect("write");
        // index + ceil(50_001 / 50_000) part files
        assert_eq!(written.len(), 3);
        assert_eq!(written[0], path);
        assert!(written[1].ends_with("sitemap-1.xml"));
        assert!(written[2].ends_with("sitemap-2.xml"));

        let index_xml = std::fs::read_to_string(&path).expect("read");
        let entries = parse_sitemap(&index_xml);
        assert_eq!(
            entries,
            vec![
                SitemapEntry::Sitemap("sitemap-1.xml".to_string()),
                SitemapEntry::Sitemap("sitemap-2.xml".to_string()),
            ]
        );

        let part1 = parse_sitemap(&std::fs::read_to_string(&written[1]).expect("read"));
        let part2 = parse_sitemap(&std::fs::read_to_string(&written[2]).expect("read"));
        assert_eq!(part1.len(), MAX_URLS_PER_SITEMAP);
        assert_eq!(part2.len(), 1);
    }

    #[test]
    fn priority_drops_with_depth() {
        assert_eq!(estimate_priority(0), "1.0");
        assert_eq!(estimate_priority(1), "0.8");
        assert_eq!(estimate_priority(2), "0.6");
        assert_eq!(estimate_priority(4), "0.2");
        assert_eq!(estimate_priority(5), "0.1");
        assert_eq!(estimate_priority(20), "0.1");
    }

    #[test]
    fn escapes_special_characters_in_locs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("sitemap.xml");

        let results = vec![ok_result("https://a.test/s?a=1&b=2", 1)];
        SitemapWriter::new(&results).write(&path).expect("write");

        let xml = std::fs::read_to_string(&path).expect("read");
        assert!(xml.contains("<loc>https://a.test/s?a=1&amp;b=2</loc>"));
        let entries = parse_sitemap(&xml);
        assert_eq!(entries, vec![SitemapEntry::Url("https://a.test/s?a=1&b=2".to_string())]);
    }
}
