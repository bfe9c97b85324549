//! Extraction of JSON embedded in the site's hydration scripts.
//!
//! Pages ship their data as `self.__next_f.push([1, "..."])` calls. The
//! inline scripts are replayed in a QuickJS sandbox to rebuild the joined
//! hydration text, and the object of interest is cut out with a regex.

use crate::error::ScraperError;
use regex::Regex;
use rquickjs::{Context, Runtime};
use scraper::{Html, Selector};
use serde::de::DeserializeOwned;
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};
use tracing::debug;

/// Home (popular + pagination), updates and details shapes, tried in order.
static PAYLOAD_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"\{"dataFeatured.+totalPaginas":\d+\}{2}|\{"atualizacoesInicial.+\}\}|\{"resultado.+"\}{3}"#,
    )
    .unwrap()
});

/// Chapter pages object inside a raw (still string-escaped) script.
static CHAPTER_PAGES_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"capituloInicial.{3}(.*?\}\]\})").unwrap());

static SCRIPT_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("script").unwrap());

/// Evaluates a script and returns its completion value as a string.
///
/// Implementations must not expose network, filesystem or timer APIs.
pub trait ScriptSandbox: Send + Sync {
    fn evaluate(&self, source: &str) -> Result<String, ScraperError>;
}

/// QuickJS sandbox with only the language intrinsics available.
///
/// Each evaluation gets a fresh runtime bounded in memory and wall time.
#[derive(Debug, Clone, Copy)]
pub struct QuickJsSandbox {
    memory_limit: usize,
    time_limit: Duration,
}

impl Default for QuickJsSandbox {
    fn default() -> Self {
        Self {
            memory_limit: 64 * 1024 * 1024,
            time_limit: Duration::from_secs(5),
        }
    }
}

impl QuickJsSandbox {
    pub fn with_memory_limit(memory_limit: usize) -> Self {
        Self {
            memory_limit,
            ..Self::default()
        }
    }

    pub fn with_time_limit(self, time_limit: Duration) -> Self {
        Self { time_limit, ..self }
    }
}

impl ScriptSandbox for QuickJsSandbox {
    fn evaluate(&self, source: &str) -> Result<String, ScraperError> {
        let runtime = Runtime::new().map_err(|e| ScraperError::Script(e.to_string()))?;
        runtime.set_memory_limit(self.memory_limit);
        let deadline = Instant::now() + self.time_limit;
        runtime.set_interrupt_handler(Some(Box::new(move || Instant::now() >= deadline)));
        let context = Context::full(&runtime).map_err(|e| ScraperError::Script(e.to_string()))?;

        context.with(|ctx| {
            ctx.eval::<String, _>(source).map_err(|err| {
                if Instant::now() >= deadline {
                    return ScraperError::Script(format!(
                        "script exceeded time limit of {:?}",
                        self.time_limit
                    ));
                }
                if !err.is_exception() {
                    return ScraperError::Script(err.to_string());
                }
                let thrown = ctx.catch();
                let message = thrown
                    .as_exception()
                    .and_then(|exception| exception.message())
                    .unwrap_or_else(|| err.to_string());
                ScraperError::Script(message)
            })
        })
    }
}

/// Locates and isolates embedded JSON payloads in a document.
#[derive(Clone)]
pub struct ScriptExtractor {
    sandbox: Arc<dyn ScriptSandbox>,
}

impl Default for ScriptExtractor {
    fn default() -> Self {
        Self::new(Arc::new(QuickJsSandbox::default()))
    }
}

impl ScriptExtractor {
    pub fn new(sandbox: Arc<dyn ScriptSandbox>) -> Self {
        Self { sandbox }
    }

    /// Text of every non-empty inline script, in document order.
    pub fn inline_scripts(doc: &Html) -> Vec<String> {
        doc.select(&SCRIPT_SELECTOR)
            .map(|script| script.text().collect::<String>())
            .filter(|text| !text.trim().is_empty())
            .collect()
    }

    /// Replays the inline scripts and joins the hydration chunks.
    pub fn hydration_text(&self, doc: &Html) -> Result<String, ScraperError> {
        let scripts = Self::inline_scripts(doc);
        if scripts.is_empty() {
            return Err(ScraperError::NotFound("inline scripts".to_string()));
        }

        let program = format!(
            "globalThis.self = globalThis;\n{}\n;(self.__next_f || []).map(it => it[it.length - 1]).join('')",
            scripts.join("\n")
        );
        let text = self.sandbox.evaluate(&program)?;
        debug!(scripts = scripts.len(), chars = text.len(), "rebuilt hydration text");
        Ok(text)
    }

    /// Returns the first home, updates or details JSON object in `doc`.
    pub fn extract_json_payload(&self, doc: &Html) -> Result<String, ScraperError> {
        let text = self.hydration_text(doc)?;
        PAYLOAD_REGEX
            .find(&text)
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| ScraperError::NotFound("hydration payload".to_string()))
    }

    /// Returns the unescaped chapter pages object from the raw scripts.
    ///
    /// No evaluation happens here; the object is still a JSON string
    /// literal inside the script and is decoded as one.
    pub fn extract_chapter_pages(doc: &Html) -> Result<String, ScraperError> {
        let escaped = Self::inline_scripts(doc)
            .iter()
            .find_map(|script| {
                CHAPTER_PAGES_REGEX
                    .captures(script)
                    .and_then(|caps| caps.get(1))
                    .map(|m| m.as_str().to_string())
            })
            .ok_or_else(|| ScraperError::NotFound("chapter pages script".to_string()))?;

        serde_json::from_str::<String>(&format!("\"{escaped}\""))
            .map_err(|e| ScraperError::malformed("chapter pages script", e))
    }
}

/// Deserializes an extracted payload.
pub fn decode_payload<T: DeserializeOwned>(json: &str, context: &str) -> Result<T, ScraperError> {
    serde_json::from_str(json).map_err(|e| ScraperError::malformed(context, e))
}
