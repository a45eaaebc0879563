//! Sitemap discovery of catalog and archive pages.
//!
//! Resolution is fail-open: a sitemap that cannot be fetched or parsed
//! yields an empty list and the pipeline carries on with fallback data.

use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashSet;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::fetcher::PageSource;

pub const SITEMAP_NAMESPACE: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";

const CATALOG_MARKERS: [&str; 3] = ["/loto/", "/instant/", "/games/"];
const ARCHIVE_MARKER: &str = "/archive/";

#[derive(Debug, Error)]
pub enum SitemapError {
    #[error("malformed sitemap XML: {0}")]
    Xml(#[from] quick_xml::Error),
}

/// Collects the `<loc>` text of every `<url>` entry, matching elements by
/// local name so any namespace prefix is accepted.
pub fn parse_sitemap(xml: &str) -> Result<Vec<String>, SitemapError> {
    let mut reader = Reader::from_reader(xml.as_bytes());
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut in_url = false;
    let mut in_loc = false;
    let mut locs = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"url" => in_url = true,
                b"loc" if in_url => in_loc = true,
                _ => {}
            },
            Event::End(e) => match e.local_name().as_ref() {
                b"url" => in_url = false,
                b"loc" => in_loc = false,
                _ => {}
            },
            Event::Text(t) if in_loc => {
                let loc = t.unescape()?;
                let loc = loc.trim();
                if !loc.is_empty() {
                    locs.push(loc.to_string());
                }
            }
            Event::CData(c) if in_loc => {
                let raw = c.into_inner();
                let loc = String::from_utf8_lossy(&raw);
                let loc = loc.trim();
                if !loc.is_empty() {
                    locs.push(loc.to_string());
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(locs)
}

fn url_path(loc: &str) -> String {
    Url::parse(loc)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| loc.to_string())
}

/// Catalog pages carry a product marker or sit one level below the root.
pub fn is_catalog_url(loc: &str) -> bool {
    let path = url_path(loc);
    if CATALOG_MARKERS.iter().any(|marker| path.contains(marker)) {
        return true;
    }

    let depth = path.split('/').filter(|s| !s.is_empty()).count();
    depth == 1 && !path.contains("/archive")
}

pub fn is_archive_url(loc: &str) -> bool {
    url_path(loc).contains(ARCHIVE_MARKER)
}

fn dedup(urls: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    urls.into_iter()
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

pub fn filter_catalog_urls(locs: Vec<String>) -> Vec<String> {
    dedup(locs.into_iter().filter(|loc| is_catalog_url(loc)))
}

pub fn filter_archive_urls(locs: Vec<String>) -> Vec<String> {
    dedup(locs.into_iter().filter(|loc| is_archive_url(loc)))
}

async fn fetch_locs<S>(source: &S, sitemap_url: &str) -> Vec<String>
where
    S: PageSource + ?Sized,
{
    let xml = match source.fetch_document(sitemap_url).await {
        Ok(xml) => xml,
        Err(e) => {
            warn!("⚠ Could not fetch sitemap {}: {}", sitemap_url, e);
            return Vec::new();
        }
    };

    match parse_sitemap(&xml) {
        Ok(locs) => locs,
        Err(e) => {
            warn!("⚠ Could not parse sitemap {}: {}", sitemap_url, e);
            Vec::new()
        }
    }
}

pub async fn resolve_catalog_urls<S>(source: &S, sitemap_url: &str) -> Vec<String>
where
    S: PageSource + ?Sized,
{
    let urls = filter_catalog_urls(fetch_locs(source, sitemap_url).await);
    info!("Found {} lottery URLs in {}", urls.len(), sitemap_url);
    urls
}

pub async fn resolve_archive_urls<S>(source: &S, sitemap_url: &str) -> Vec<String>
where
    S: PageSource + ?Sized,
{
    let urls = filter_archive_urls(fetch_locs(source, sitemap_url).await);
    info!("Found {} archive URLs in {}", urls.len(), sitemap_url);
    urls
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::FetchError;
    use async_trait::async_trait;

    /// Serves one fixed body for every URL, or fails every request.
    struct FixedSource(Option<&'static str>);

    #[async_trait]
    impl PageSource for FixedSource {
        async fn fetch_document(&self, url: &str) -> Result<String, FetchError> {
            self.0.map(str::to_string).ok_or(FetchError::Status {
                url: url.to_string(),
                status: 503,
            })
        }

        async fn fetch_page(&self, url: &str) -> Result<String, FetchError> {
            self.fetch_document(url).await
        }
    }

    const MAIN_SITEMAP: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>https://www.stoloto.ru/rusloto</loc><lastmod>2024-05-01</lastmod></url>
  <url><loc>https://www.stoloto.ru/loto/6x45</loc></url>
  <url><loc>https://www.stoloto.ru/instant/gold_horseshoe</loc></url>
  <url><loc>https://www.stoloto.ru/instant/gold_horseshoe</loc></url>
  <url><loc>https://www.stoloto.ru/rusloto/archive/1520</loc></url>
  <url><loc>https://www.stoloto.ru/help/faq/payments</loc></url>
  <url><loc>https://www.stoloto.ru/</loc></url>
</urlset>"#;

    #[test]
    fn test_parse_sitemap_locs() {
        let locs = parse_sitemap(MAIN_SITEMAP).unwrap();
        assert_eq!(locs.len(), 7);
        assert_eq!(locs[0], "https://www.stoloto.ru/rusloto");
    }

    #[test]
    fn test_parse_prefixed_namespace_and_entities() {
        let xml = r#"<sm:urlset xmlns:sm="http://www.sitemaps.org/schemas/sitemap/0.9">
            <sm:url><sm:loc>https://www.stoloto.ru/loto/keno?tab=a&amp;b=c</sm:loc></sm:url>
        </sm:urlset>"#;
        let locs = parse_sitemap(xml).unwrap();
        assert_eq!(locs, vec!["https://www.stoloto.ru/loto/keno?tab=a&b=c"]);
    }

    #[test]
    fn test_loc_outside_url_is_ignored() {
        let xml = r#"<sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
            <sitemap><loc>https://www.stoloto.ru/sitemap_archive.xml</loc></sitemap>
        </sitemapindex>"#;
        assert!(parse_sitemap(xml).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_sitemap_is_error() {
        let xml = "<urlset><url><loc>https://www.stoloto.ru/a</url></urlset>";
        assert!(parse_sitemap(xml).is_err());
    }

    #[test]
    fn test_catalog_filter() {
        let urls = filter_catalog_urls(parse_sitemap(MAIN_SITEMAP).unwrap());
        assert_eq!(
            urls,
            vec![
                "https://www.stoloto.ru/rusloto",
                "https://www.stoloto.ru/loto/6x45",
                "https://www.stoloto.ru/instant/gold_horseshoe",
            ]
        );
    }

    #[test]
    fn test_archive_filter() {
        let urls = filter_archive_urls(parse_sitemap(MAIN_SITEMAP).unwrap());
        assert_eq!(urls, vec!["https://www.stoloto.ru/rusloto/archive/1520"]);
    }

    #[test]
    fn test_shallow_archive_page_is_not_catalog() {
        assert!(!is_catalog_url("https://www.stoloto.ru/archive"));
        assert!(is_catalog_url("https://www.stoloto.ru/4x20/"));
    }

    #[tokio::test]
    async fn test_malformed_sitemap_resolves_to_nothing() {
        let source = FixedSource(Some(
            "<urlset><url><loc>https://www.stoloto.ru/rusloto/archive/1</url></urlset>",
        ));
        assert!(resolve_catalog_urls(&source, "https://test.local/main.xml").await.is_empty());
        assert!(resolve_archive_urls(&source, "https://test.local/archive.xml").await.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_sitemap_resolves_to_nothing() {
        let source = FixedSource(None);
        assert!(resolve_catalog_urls(&source, "https://test.local/main.xml").await.is_empty());
    }

    #[tokio::test]
    async fn test_resolution_classifies_fetched_sitemap() {
        let source = FixedSource(Some(MAIN_SITEMAP));
        let archive = resolve_archive_urls(&source, "https://test.local/archive.xml").await;
        assert_eq!(archive, vec!["https://www.stoloto.ru/rusloto/archive/1520"]);
    }
}
