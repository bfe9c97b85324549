//! Chapter page resolution.
//!
//! Chapter pages are served either as a statically rendered image grid
//! or as a hydration payload listing image paths. The grid is tried
//! first; the payload is only decoded when no qualifying image exists.

use crate::dto::{CDN_URL, ChapterPagesWrapper, PageDto};
use crate::error::ScraperError;
use crate::fetcher::Response;
use crate::script::{ScriptExtractor, decode_payload};
use crate::source::Page;
use reqwest::Url;
use scraper::{Html, Selector};
use std::sync::LazyLock;
use tracing::debug;

/// Fixed segments in front of legacy image paths.
const LEGACY_PREFIX: &str = "wp-content/uploads/WP-manga/data";

/// Name of the anti-bot vendor as it shows up in placeholder pages.
const VENDOR_NAME: &str = "cloudflare";

/// CSS selectors used for parsing.
struct Selectors {
    /// Anti-bot placeholder images.
    placeholder: Selector,
    /// Reader images, minus proxied placeholders.
    page_image: Selector,
}

impl Selectors {
    fn new() -> Self {
        Self {
            placeholder: Selector::parse("img[src*='cdn-cgi'], img[alt~=Cloudflare]").unwrap(),
            page_image: Selector::parse("img.chakra-image:not([src*='cdn-cgi'])").unwrap(),
        }
    }
}

static SELECTORS: LazyLock<Selectors> = LazyLock::new(Selectors::new);

/// Resolves the ordered image list of a chapter page.
///
/// Index is the scrape order for the direct strategy and the payload
/// order for the embedded one; the site's own `numero` is not consulted.
pub fn resolve_pages(response: &Response) -> Result<Vec<Page>, ScraperError> {
    let html = response.text();
    let doc = Html::parse_document(&html);

    if is_blocked(&doc, &html) {
        return Err(ScraperError::Blocked);
    }

    let direct = direct_pages(&doc, &response.url);
    if !direct.is_empty() {
        debug!(pages = direct.len(), "resolved pages from image grid");
        return Ok(direct);
    }

    let pages = embedded_pages(&doc)?;
    debug!(pages = pages.len(), "resolved pages from hydration payload");
    Ok(pages)
}

fn is_blocked(doc: &Html, html: &str) -> bool {
    doc.select(&SELECTORS.placeholder).next().is_some() || html.contains(VENDOR_NAME)
}

fn direct_pages(doc: &Html, base: &Url) -> Vec<Page> {
    doc.select(&SELECTORS.page_image)
        .filter_map(|img| img.value().attr("src"))
        .filter_map(|src| base.join(src.trim()).ok())
        .enumerate()
        .map(|(index, url)| Page {
            index,
            image_url: url.to_string(),
        })
        .collect()
}

fn embedded_pages(doc: &Html) -> Result<Vec<Page>, ScraperError> {
    let json = ScriptExtractor::extract_chapter_pages(doc)?;
    let bundle: ChapterPagesWrapper = decode_payload(&json, "chapter pages")?;

    bundle
        .pages
        .iter()
        .enumerate()
        .map(|(index, page)| {
            Ok(Page {
                index,
                image_url: page_image_url(&bundle, page)?,
            })
        })
        .collect()
}

/// Builds the CDN URL of one page of `bundle`.
pub fn page_image_url(bundle: &ChapterPagesWrapper, page: &PageDto) -> Result<String, ScraperError> {
    if page.is_legacy_path() {
        let mut url = Url::parse(CDN_URL).map_err(|e| ScraperError::InvalidUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| ScraperError::InvalidUrl(CDN_URL.to_string()))?
            .pop_if_empty()
            .extend(LEGACY_PREFIX.split('/'))
            .extend(path_segments(&page.src));
        return Ok(url.to_string());
    }

    let raw = format!(
        "{CDN_URL}/scans/{}/obras/{}/capitulos/{}/{}",
        bundle.manga.scan_id, bundle.manga.id, bundle.chapter_number, page.src
    );
    Url::parse(&raw)
        .map(|url| url.to_string())
        .map_err(|e| ScraperError::InvalidUrl(format!("{raw}: {e}")))
}

/// Trimmed, non-empty path components.
fn path_segments(path: &str) -> impl Iterator<Item = &str> {
    path.trim().split('/').filter(|segment| !segment.is_empty())
}
