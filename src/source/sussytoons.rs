//! Sussy Toons (sussytoons.wtf) source implementation.
//!
//! Listings and details come from hydration payloads embedded in the
//! site's pages; search goes to the JSON API.

use super::{Chapter, Manga, MangaPage, Page, Source};
use crate::config::SourceConfig;
use crate::cookies::PersistentCookieStore;
use crate::dto::{ChapterListWrapper, HomeWrapper, MangaDto, Paginated, Wrapper, sort_chapters};
use crate::error::ScraperError;
use crate::fetcher::{ChallengeResolver, ReqwestTransport, Request, ResilientFetcher, Response, Transport};
use crate::pages::resolve_pages;
use crate::script::{ScriptExtractor, decode_payload};
use crate::settings::{self, Setting, SettingChange};
use async_trait::async_trait;
use reqwest::Url;
use reqwest::header::{ACCEPT, REFERER};
use scraper::Html;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Results per search page, fixed by the API.
const SEARCH_PAGE_SIZE: &str = "8";

/// Backoff used when the configured one is unusable.
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Sussy Toons source.
pub struct SussyToons {
    config: SourceConfig,
    fetcher: ResilientFetcher,
    extractor: ScriptExtractor,
    cookies: Arc<PersistentCookieStore>,
}

impl SussyToons {
    pub const ID: i64 = 6963507464339951166;

    /// Creates the source with a reqwest transport.
    ///
    /// Pending restore-defaults requests are applied first.
    pub fn new(
        config: SourceConfig,
        resolver: Arc<dyn ChallengeResolver>,
    ) -> Result<Self, ScraperError> {
        let cookies = Arc::new(Self::cookie_store(&config));
        let transport = Arc::new(ReqwestTransport::new(&config.scraping(), cookies.clone())?);
        Self::from_parts(config, cookies, transport, resolver, ScriptExtractor::default())
    }

    /// Creates the source from explicit collaborators.
    pub fn from_parts(
        config: SourceConfig,
        cookies: Arc<PersistentCookieStore>,
        transport: Arc<dyn Transport>,
        resolver: Arc<dyn ChallengeResolver>,
        extractor: ScriptExtractor,
    ) -> Result<Self, ScraperError> {
        if config.apply_restore_defaults()? {
            info!("restored default URLs");
        }

        let retry_delay = Duration::try_from_secs_f64(config.scraping().retry_delay_sec)
            .unwrap_or(DEFAULT_RETRY_DELAY);

        Ok(Self {
            config,
            fetcher: ResilientFetcher::new(transport, resolver, retry_delay),
            extractor,
            cookies,
        })
    }

    /// Cookie store for this source's preference key.
    pub fn cookie_store(config: &SourceConfig) -> PersistentCookieStore {
        PersistentCookieStore::new(
            config.store().clone(),
            format!("cloudflare_cookies_{}", Self::ID),
        )
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    /// The settings screen as it should be rendered now.
    pub fn settings(&self) -> Vec<Setting> {
        settings::setting_screen(&self.config)
    }

    /// Applies a change made on the settings screen.
    ///
    /// Returns a short message to show the user, if any.
    pub fn apply_setting(&self, change: SettingChange) -> Result<Option<&'static str>, ScraperError> {
        Ok(settings::apply(&self.config, &self.cookies, change)?)
    }

    /// Resolves a site-relative path against the base URL.
    fn site_url(&self, path: &str) -> Result<Url, ScraperError> {
        let base = self.config.base_url();
        let raw = if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        };
        Url::parse(&raw).map_err(|e| ScraperError::InvalidUrl(format!("{raw}: {e}")))
    }

    fn page_request(&self, url: Url) -> Request {
        let referer = format!("{}/", self.config.base_url());
        Request::get(url).header(REFERER, &referer)
    }

    /// Fetches a page and isolates its hydration payload.
    async fn fetch_payload(&self, url: Url) -> Result<String, ScraperError> {
        let response = self.fetcher.fetch(&self.page_request(url)).await?;
        self.extract_payload(&response)
    }

    fn extract_payload(&self, response: &Response) -> Result<String, ScraperError> {
        let doc = Html::parse_document(&response.text());
        let payload = self.extractor.extract_json_payload(&doc)?;
        debug!(url = %response.url, chars = payload.len(), "extracted payload");
        Ok(payload)
    }

    /// Like [`Self::fetch_payload`], mapping a missing payload to `None`.
    async fn fetch_optional_payload(&self, url: Url) -> Result<Option<String>, ScraperError> {
        match self.fetch_payload(url).await {
            Ok(payload) => Ok(Some(payload)),
            Err(err) if err.is_not_found() => {
                debug!(error = %err, "no payload, returning empty result");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}

fn to_manga_list(mangas: &[MangaDto]) -> Vec<Manga> {
    mangas.iter().map(MangaDto::to_manga).collect()
}

#[async_trait]
impl Source for SussyToons {
    fn name(&self) -> &'static str {
        "Sussy Toons"
    }

    fn id(&self) -> i64 {
        Self::ID
    }

    fn lang(&self) -> &'static str {
        "pt-BR"
    }

    fn supports_latest(&self) -> bool {
        true
    }

    async fn popular_manga(&self, _page: u32) -> Result<MangaPage, ScraperError> {
        let url = self.site_url("/")?;
        let Some(payload) = self.fetch_optional_payload(url).await? else {
            return Ok(MangaPage::empty());
        };

        let home: HomeWrapper = decode_payload(&payload, "home")?;
        let mangas = home
            .popular
            .map(|top| to_manga_list(&top.results))
            .unwrap_or_default();

        Ok(MangaPage {
            mangas,
            has_next_page: false,
        })
    }

    async fn latest_updates(&self, page: u32) -> Result<MangaPage, ScraperError> {
        let mut url = self.site_url("/atualizacoes")?;
        url.query_pairs_mut().append_pair("pagina", &page.to_string());

        let Some(payload) = self.fetch_optional_payload(url).await? else {
            return Ok(MangaPage::empty());
        };

        let home: HomeWrapper = decode_payload(&payload, "updates")?;
        Ok(home
            .latest_updates
            .map(|latest| MangaPage {
                mangas: to_manga_list(&latest.results),
                has_next_page: latest.has_next_page(),
            })
            .unwrap_or_default())
    }

    async fn search_manga(&self, page: u32, query: &str) -> Result<MangaPage, ScraperError> {
        let raw = format!("{}/obras", self.config.api_url());
        let mut url = Url::parse(&raw).map_err(|e| ScraperError::InvalidUrl(format!("{raw}: {e}")))?;
        url.query_pairs_mut()
            .append_pair("obr_nome", query)
            .append_pair("limite", SEARCH_PAGE_SIZE)
            .append_pair("pagina", &page.to_string())
            .append_pair("todos_generos", "true");

        let request = self
            .page_request(url)
            .header(ACCEPT, "application/json");
        let response = self.fetcher.fetch(&request).await?;
        if !response.is_success() {
            return Err(ScraperError::UnexpectedStatus {
                status: response.status.as_u16(),
                url: response.url.to_string(),
            });
        }

        let result: Paginated<Vec<MangaDto>> = response.json("search results")?;
        Ok(MangaPage {
            mangas: to_manga_list(&result.results),
            has_next_page: result.has_next_page(),
        })
    }

    async fn manga_details(&self, manga_url: &str) -> Result<Manga, ScraperError> {
        let url = self.site_url(manga_url)?;
        let payload = self.fetch_payload(url).await?;
        let details: Wrapper<MangaDto> = decode_payload(&payload, "manga details")?;
        Ok(details.results.to_manga())
    }

    async fn chapter_list(&self, manga_url: &str) -> Result<Vec<Chapter>, ScraperError> {
        let url = self.site_url(manga_url)?;
        let Some(payload) = self.fetch_optional_payload(url).await? else {
            return Ok(Vec::new());
        };

        let wrapper: Wrapper<ChapterListWrapper> = decode_payload(&payload, "chapter list")?;
        let mut chapters: Vec<Chapter> = wrapper
            .results
            .chapters
            .iter()
            .map(|c| c.to_chapter())
            .collect();
        sort_chapters(&mut chapters);

        Ok(chapters)
    }

    async fn page_list(&self, chapter_url: &str) -> Result<Vec<Page>, ScraperError> {
        let url = self.site_url(chapter_url)?;
        let response = self.fetcher.fetch(&self.page_request(url)).await?;
        resolve_pages(&response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DEFAULT_BASE_URL, PreferenceStore, Preferences};
    use crate::source::MangaStatus;
    use crate::testing::{CountingResolver, ScriptedTransport, html_response, hydration_page, status_response};

    const MANGA: &str = r#"{"obr_id":42,"obr_nome":"Omniscient Reader","obr_slug":"omniscient-reader","obr_imagem":"capa.webp","scan_id":3,"status":{"stt_nome":"Em Andamento"},"tags":[{"tag_nome":"Ação"}]}"#;

    fn source_with(responses: Vec<Result<Response, ScraperError>>) -> (SussyToons, Arc<ScriptedTransport>) {
        let mut prefs = Preferences::default();
        prefs.scraping.retry_delay_sec = 0.0;
        let config = SourceConfig::new(Arc::new(PreferenceStore::in_memory(prefs))).with_ci(false);

        let transport = ScriptedTransport::new(responses);
        let source = SussyToons::from_parts(
            config.clone(),
            Arc::new(SussyToons::cookie_store(&config)),
            transport.clone(),
            CountingResolver::succeeding(),
            ScriptExtractor::default(),
        )
        .unwrap();
        (source, transport)
    }

    fn json_response(body: &str) -> Response {
        html_response(body)
    }

    #[test]
    fn test_metadata() {
        let (source, _) = source_with(vec![]);
        assert_eq!(source.name(), "Sussy Toons");
        assert_eq!(source.lang(), "pt-BR");
        assert_eq!(source.id(), 6963507464339951166);
        assert!(source.supports_latest());
    }

    #[test]
    fn test_restore_defaults_applied_on_start() {
        let prefs = Preferences {
            override_base_url: Some("https://mirror.example".to_string()),
            restore_defaults: true,
            ..Preferences::default()
        };
        let config = SourceConfig::new(Arc::new(PreferenceStore::in_memory(prefs))).with_ci(false);
        let source = SussyToons::from_parts(
            config.clone(),
            Arc::new(SussyToons::cookie_store(&config)),
            ScriptedTransport::new(vec![]),
            CountingResolver::succeeding(),
            ScriptExtractor::default(),
        )
        .unwrap();

        assert_eq!(source.config().base_url(), DEFAULT_BASE_URL);
        assert!(!source.config().restore_defaults_enabled());
    }

    #[test]
    fn test_default_retry_delay() {
        let store = Arc::new(PreferenceStore::in_memory(Preferences::default()));
        let config = SourceConfig::new(store).with_ci(false);
        let source = SussyToons::from_parts(
            config.clone(),
            Arc::new(SussyToons::cookie_store(&config)),
            ScriptedTransport::new(vec![]),
            CountingResolver::succeeding(),
            ScriptExtractor::default(),
        )
        .unwrap();

        assert_eq!(source.fetcher.retry_delay(), Duration::from_secs(2));
    }

    #[test]
    fn test_unusable_retry_delay_falls_back() {
        let mut prefs = Preferences::default();
        prefs.scraping.retry_delay_sec = -1.0;
        let config = SourceConfig::new(Arc::new(PreferenceStore::in_memory(prefs))).with_ci(false);
        let source = SussyToons::from_parts(
            config.clone(),
            Arc::new(SussyToons::cookie_store(&config)),
            ScriptedTransport::new(vec![]),
            CountingResolver::succeeding(),
            ScriptExtractor::default(),
        )
        .unwrap();

        assert_eq!(source.fetcher.retry_delay(), DEFAULT_RETRY_DELAY);
    }

    #[tokio::test]
    async fn test_popular_manga() {
        let home = format!(
            r#"{{"dataFeatured":[],"dataTop":{{"pagina":1,"resultado":[{MANGA}],"totalPaginas":1}}}}"#
        );
        let (source, transport) = source_with(vec![Ok(html_response(&hydration_page(&[&home])))]);

        let page = source.popular_manga(1).await.unwrap();
        assert_eq!(page.mangas.len(), 1);
        assert_eq!(page.mangas[0].url, "/obra/42/omniscient-reader");
        assert_eq!(page.mangas[0].status, MangaStatus::Ongoing);
        assert!(!page.has_next_page);
        assert_eq!(transport.requests()[0].url.as_str(), "https://www.sussytoons.wtf/");
    }

    #[tokio::test]
    async fn test_popular_without_payload_is_empty() {
        let (source, _) = source_with(vec![Ok(html_response(&hydration_page(&["0:[]"])))]);
        let page = source.popular_manga(1).await.unwrap();
        assert_eq!(page, MangaPage::empty());
    }

    #[tokio::test]
    async fn test_latest_updates() {
        let updates = format!(
            r#"{{"atualizacoesInicial":{{"pagina":2,"totalPaginas":5,"resultado":[{MANGA},{MANGA}]}}}}"#
        );
        let (source, transport) =
            source_with(vec![Ok(html_response(&hydration_page(&["1:x", &updates])))]);

        let page = source.latest_updates(2).await.unwrap();
        assert_eq!(page.mangas.len(), 2);
        assert!(page.has_next_page);
        assert_eq!(
            transport.requests()[0].url.as_str(),
            "https://www.sussytoons.wtf/atualizacoes?pagina=2"
        );
    }

    #[tokio::test]
    async fn test_latest_malformed_propagates() {
        let updates = r#"{"atualizacoesInicial":{"pagina":"um","resultado":[]}}"#;
        let (source, _) = source_with(vec![Ok(html_response(&hydration_page(&[updates])))]);

        let err = source.latest_updates(1).await.unwrap_err();
        assert!(matches!(err, ScraperError::MalformedPayload { .. }));
    }

    #[tokio::test]
    async fn test_search_manga() {
        let body = format!(r#"{{"pagina":1,"totalPaginas":3,"resultado":[{MANGA}]}}"#);
        let (source, transport) = source_with(vec![Ok(json_response(&body))]);

        let page = source.search_manga(1, "omniscient reader").await.unwrap();
        assert_eq!(page.mangas[0].title, "Omniscient Reader");
        assert!(page.has_next_page);

        let sent = &transport.requests()[0];
        assert_eq!(
            sent.url.as_str(),
            "https://api.sussytoons.wtf/obras?obr_nome=omniscient+reader&limite=8&pagina=1&todos_generos=true"
        );
        assert_eq!(sent.headers.get(ACCEPT).unwrap(), "application/json");
    }

    #[tokio::test]
    async fn test_search_error_status_after_retry() {
        let (source, transport) =
            source_with(vec![Ok(status_response(502)), Ok(status_response(502))]);

        let err = source.search_manga(1, "x").await.unwrap_err();
        assert!(matches!(err, ScraperError::UnexpectedStatus { status: 502, .. }));
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_manga_details() {
        let details = r#"{"resultado":{"obr_id":42,"obr_nome":"Omniscient Reader","obr_descricao":"<p>Fim do mundo.</p>","scan_id":3,"capitulos":[],"status":{"stt_nome":"Hiato"}}}"#;
        let (source, transport) = source_with(vec![Ok(html_response(&hydration_page(&[details])))]);

        let manga = source.manga_details("/obra/42/omniscient-reader").await.unwrap();
        assert_eq!(manga.description.as_deref(), Some("Fim do mundo."));
        assert_eq!(manga.status, MangaStatus::OnHiatus);
        assert_eq!(
            transport.requests()[0].url.as_str(),
            "https://www.sussytoons.wtf/obra/42/omniscient-reader"
        );
    }

    #[tokio::test]
    async fn test_manga_details_missing_is_error() {
        let (source, _) = source_with(vec![Ok(html_response(&hydration_page(&["0:[]"])))]);
        let err = source.manga_details("/obra/1/x").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_chapter_list_sorted() {
        let details = r#"{"resultado":{"obr_id":42,"capitulos":[{"cap_id":1,"cap_nome":"Cap 1","cap_numero":1,"cap_lancado_em":"2024-01-02"},{"cap_id":3,"cap_nome":"Extra","cap_numero":null,"cap_lancado_em":"2024-02-01"},{"cap_id":2,"cap_nome":"Cap 2","cap_numero":2,"cap_lancado_em":"2024-01-09"}],"status":{"stt_nome":"Completo"}}}"#;
        let (source, _) = source_with(vec![Ok(html_response(&hydration_page(&[details])))]);

        let chapters = source.chapter_list("/obra/42/x").await.unwrap();
        let urls: Vec<&str> = chapters.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(urls, vec!["/capitulo/2", "/capitulo/1", "/capitulo/3"]);
        assert_eq!(chapters[1].date_uploaded, Some(1_704_153_600));
    }

    #[tokio::test]
    async fn test_chapter_list_missing_is_empty() {
        let (source, _) = source_with(vec![Ok(html_response("<html></html>"))]);
        assert!(source.chapter_list("/obra/42/x").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_page_list_blocked() {
        let blocked = r#"<html><body><img alt="Cloudflare" src="/x.png"></body></html>"#;
        let (source, _) = source_with(vec![Ok(html_response(blocked))]);

        let err = source.page_list("/capitulo/9").await.unwrap_err();
        assert!(matches!(err, ScraperError::Blocked));
    }

    #[tokio::test]
    async fn test_page_list_direct() {
        let html = r#"<html><body><img class="chakra-image" src="/p/1.jpg"></body></html>"#;
        let (source, transport) = source_with(vec![Ok(html_response(html))]);

        let pages = source.page_list("/capitulo/9").await.unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].image_url, "https://www.sussytoons.wtf/p/1.jpg");
        assert_eq!(
            transport.requests()[0].headers.get(REFERER).unwrap(),
            "https://www.sussytoons.wtf/"
        );
    }
}
