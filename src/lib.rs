//! Sussy Toons - content source for a manga reader host.
//!
//! This library provides functionality for:
//! - Listing, searching and detailing titles from sussytoons.wtf
//! - Extracting catalog data embedded in the site's hydration scripts
//! - Resolving chapter images under the CDN's current and legacy layouts
//! - Fetching through the site's anti-bot challenge with persistent cookies

pub mod config;
pub mod cookies;
pub mod dto;
pub mod error;
pub mod fetcher;
pub mod pages;
pub mod script;
pub mod settings;
pub mod source;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use config::{PreferenceStore, Preferences, SourceConfig};
pub use error::{ConfigError, ScraperError};
pub use fetcher::{ChallengeResolver, HeadlessResolver, ResilientFetcher, Transport};
pub use script::{QuickJsSandbox, ScriptExtractor, ScriptSandbox};
pub use settings::{Setting, SettingChange, SettingKind};
pub use source::{Chapter, Manga, MangaPage, MangaStatus, Page, Source, SussyToons};
