//! Wire records of the site and their mapping to the catalog model.

use crate::source::{Chapter, Manga, MangaStatus};
use chrono::NaiveDate;
use scraper::Html;
use serde::Deserialize;
use std::cmp::Ordering;

/// Origin serving covers and chapter images.
pub const CDN_URL: &str = "https://cdn.sussytoons.site";

/// Separator used when joining genre names.
const GENRE_SEPARATOR: &str = ", ";

/// Paginated API or hydration result.
#[derive(Debug, Clone, Deserialize)]
pub struct Paginated<T> {
    #[serde(rename = "pagina", default)]
    pub current_page: u32,

    #[serde(rename = "totalPaginas", default)]
    pub total_pages: u32,

    #[serde(rename = "resultado")]
    pub results: T,
}

impl<T> Paginated<T> {
    pub fn has_next_page(&self) -> bool {
        self.current_page < self.total_pages
    }
}

/// Non-paginated result.
#[derive(Debug, Clone, Deserialize)]
pub struct Wrapper<T> {
    #[serde(rename = "resultado")]
    pub results: T,
}

/// Home and updates hydration payload.
#[derive(Debug, Clone, Deserialize)]
pub struct HomeWrapper {
    #[serde(rename = "dataTop", default)]
    pub popular: Option<Paginated<Vec<MangaDto>>>,

    #[serde(rename = "atualizacoesInicial", default)]
    pub latest_updates: Option<Paginated<Vec<MangaDto>>>,
}

/// A title record.
#[derive(Debug, Clone, Deserialize)]
pub struct MangaDto {
    #[serde(rename = "obr_id")]
    pub id: i64,

    #[serde(rename = "obr_nome")]
    pub title: String,

    #[serde(rename = "obr_slug", default)]
    pub slug: Option<String>,

    #[serde(rename = "obr_descricao", default)]
    pub raw_description: Option<String>,

    #[serde(rename = "obr_imagem", default)]
    pub thumbnail_path: Option<String>,

    #[serde(default)]
    pub status: Option<StatusDto>,

    #[serde(rename = "scan_id", default)]
    pub scan_id: Option<i64>,

    #[serde(rename = "tags", default)]
    pub genres: Option<Vec<GenreDto>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusDto {
    #[serde(rename = "stt_nome", default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenreDto {
    #[serde(rename = "tag_nome")]
    pub name: String,
}

impl MangaDto {
    /// Maps the record to the catalog model.
    pub fn to_manga(&self) -> Manga {
        Manga {
            url: format!("/obra/{}/{}", self.id, self.slug.as_deref().unwrap_or("")),
            title: self.title.clone(),
            description: self.description(),
            thumbnail_url: self.thumbnail_url(),
            status: parse_status(self.status.as_ref().and_then(|s| s.name.as_deref())),
            genre: self.genre(),
            initialized: true,
        }
    }

    /// Absolute cover URL, if one can be built.
    pub fn thumbnail_url(&self) -> Option<String> {
        let path = self.thumbnail_path.as_deref()?.trim();
        if path.is_empty() {
            return None;
        }
        if path.starts_with("http") {
            return Some(path.to_string());
        }

        let scan_id = self.scan_id?;
        Some(format!(
            "{CDN_URL}/scans/{scan_id}/obras/{}/{}",
            self.id,
            path.trim_start_matches('/')
        ))
    }

    /// Synopsis with markup stripped.
    pub fn description(&self) -> Option<String> {
        let raw = self.raw_description.as_deref()?;
        let fragment = Html::parse_fragment(raw);
        let text = fragment
            .root_element()
            .text()
            .collect::<String>()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");

        if text.is_empty() { None } else { Some(text) }
    }

    pub fn genre(&self) -> String {
        self.genres
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|g| g.name.trim())
            .filter(|name| !name.is_empty())
            .collect::<Vec<_>>()
            .join(GENRE_SEPARATOR)
    }
}

/// Maps the site's status name, case-insensitively.
pub fn parse_status(name: Option<&str>) -> MangaStatus {
    match name.map(|n| n.trim().to_lowercase()).as_deref() {
        Some("em andamento") => MangaStatus::Ongoing,
        Some("completo") => MangaStatus::Completed,
        Some("hiato") => MangaStatus::OnHiatus,
        _ => MangaStatus::Unknown,
    }
}

/// Chapters embedded in the details payload.
#[derive(Debug, Clone, Deserialize)]
pub struct ChapterListWrapper {
    #[serde(rename = "capitulos", default)]
    pub chapters: Vec<ChapterDto>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChapterDto {
    #[serde(rename = "cap_id")]
    pub id: i64,

    #[serde(rename = "cap_nome")]
    pub name: String,

    #[serde(rename = "cap_numero", default)]
    pub number: Option<f32>,

    #[serde(rename = "cap_lancado_em", default)]
    pub release_date: Option<String>,
}

impl ChapterDto {
    pub fn to_chapter(&self) -> Chapter {
        Chapter {
            url: format!("/capitulo/{}", self.id),
            name: self.name.trim().to_string(),
            chapter_number: self.number,
            date_uploaded: self.release_date.as_deref().and_then(parse_release_date),
        }
    }
}

/// Parses the leading `yyyy-MM-dd` of a date string to Unix seconds.
pub fn parse_release_date(raw: &str) -> Option<i64> {
    let (date, _) = NaiveDate::parse_and_remainder(raw.trim(), "%Y-%m-%d").ok()?;
    Some(date.and_hms_opt(0, 0, 0)?.and_utc().timestamp())
}

/// Sorts by chapter number, highest first; unnumbered chapters go last.
pub fn sort_chapters(chapters: &mut [Chapter]) {
    chapters.sort_by(|a, b| match (a.chapter_number, b.chapter_number) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}

/// Chapter pages payload.
#[derive(Debug, Clone, Deserialize)]
pub struct ChapterPagesWrapper {
    #[serde(rename = "cap_paginas")]
    pub pages: Vec<PageDto>,

    #[serde(rename = "obra")]
    pub manga: MangaReference,

    #[serde(rename = "cap_numero")]
    pub chapter_number: serde_json::Number,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MangaReference {
    #[serde(rename = "obr_id")]
    pub id: i64,

    #[serde(rename = "scan_id")]
    pub scan_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PageDto {
    pub src: String,

    #[serde(rename = "numero", default)]
    pub position: Option<i32>,
}

impl PageDto {
    /// Images uploaded by the old WordPress site.
    pub fn is_legacy_path(&self) -> bool {
        self.src.to_ascii_lowercase().contains("wp-content")
    }
}
