//! Source trait and the catalog model handed to the host application.
//!
//! The host drives a [`Source`] page by page and renders whatever it
//! gets back; nothing here is persisted.

mod sussytoons;

pub use sussytoons::SussyToons;

use crate::error::ScraperError;
use async_trait::async_trait;

/// Publication status of a title.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum MangaStatus {
    #[default]
    Unknown,
    Ongoing,
    Completed,
    OnHiatus,
}

/// A title as listed or detailed by the source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manga {
    /// Site-relative URL, e.g. `/obra/42/slug`.
    pub url: String,

    pub title: String,

    /// Plain-text synopsis.
    pub description: Option<String>,

    pub thumbnail_url: Option<String>,

    pub status: MangaStatus,

    /// Genre names joined with `", "`.
    pub genre: String,

    /// Whether the details were filled from a full record.
    pub initialized: bool,
}

/// One page of listing or search results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MangaPage {
    pub mangas: Vec<Manga>,
    pub has_next_page: bool,
}

impl MangaPage {
    /// The soft no-result page.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// A chapter of a title.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Chapter {
    /// Site-relative URL, e.g. `/capitulo/99`.
    pub url: String,

    pub name: String,

    /// Numeric order used for sorting; absent numbers sort last.
    pub chapter_number: Option<f32>,

    /// Release time in Unix seconds, when the date could be parsed.
    pub date_uploaded: Option<i64>,
}

/// An image of a chapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// Position in the returned sequence, from 0.
    pub index: usize,

    /// Absolute image URL.
    pub image_url: String,
}

/// Content source consumed by the host application.
#[async_trait]
pub trait Source: Send + Sync {
    /// Returns the human-readable name of this source.
    fn name(&self) -> &'static str;

    /// Stable identifier of the source.
    fn id(&self) -> i64;

    /// Content language tag.
    fn lang(&self) -> &'static str;

    /// Whether [`Source::latest_updates`] is meaningful.
    fn supports_latest(&self) -> bool;

    async fn popular_manga(&self, page: u32) -> Result<MangaPage, ScraperError>;

    async fn latest_updates(&self, page: u32) -> Result<MangaPage, ScraperError>;

    async fn search_manga(&self, page: u32, query: &str) -> Result<MangaPage, ScraperError>;

    /// Fetches the full record of a title by its site-relative URL.
    async fn manga_details(&self, manga_url: &str) -> Result<Manga, ScraperError>;

    /// Chapters of a title, newest (highest number) first.
    async fn chapter_list(&self, manga_url: &str) -> Result<Vec<Chapter>, ScraperError>;

    /// Images of a chapter in reading order.
    async fn page_list(&self, chapter_url: &str) -> Result<Vec<Page>, ScraperError>;
}
