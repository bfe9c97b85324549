//! Error types for the Sussy Toons source.
//!
//! Uses `thiserror` for structured error definitions that provide
//! clear context about what went wrong.

use thiserror::Error;

/// Main error type for source operations.
#[derive(Error, Debug)]
pub enum ScraperError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// The server answered with a status the caller can't use
    #[error("Unexpected HTTP {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    /// URL parsing or validation failed
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Expected data is absent from the page
    #[error("Not found: {0}")]
    NotFound(String),

    /// JSON is present but doesn't have the expected shape
    #[error("Malformed payload ({context}): {source}")]
    MalformedPayload {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// The page was replaced by an anti-bot placeholder
    #[error("Conteúdo bloqueado. Abra no WebView para verificar")]
    Blocked,

    /// The interactive challenge was attempted and failed
    #[error("Falha na verificação Cloudflare: {0}")]
    VerificationFailed(String),

    /// The challenge needs an interactive verification that didn't happen
    #[error("CAPTCHA não resolvido")]
    VerificationRequired,

    /// Embedded script evaluation failed
    #[error("Script evaluation failed: {0}")]
    Script(String),

    /// Preference storage failed
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ScraperError {
    /// Wraps a JSON decoding failure with what was being decoded.
    pub fn malformed(context: impl Into<String>, source: serde_json::Error) -> Self {
        ScraperError::MalformedPayload {
            context: context.into(),
            source,
        }
    }

    /// Returns true for the soft "nothing here" condition.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ScraperError::NotFound(_))
    }

    /// Returns true for failures of the challenge verification step.
    pub fn is_verification(&self) -> bool {
        matches!(
            self,
            ScraperError::VerificationFailed(_) | ScraperError::VerificationRequired
        )
    }
}

/// Error type for preference storage.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read or write the preference file
    #[error("Failed to access preference file: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse the preference file
    #[error("Failed to parse preferences: {0}")]
    ParseError(String),

    /// Failed to serialize preferences
    #[error("Failed to write preferences: {0}")]
    WriteError(String),

    /// Invalid preference value
    #[error("Invalid value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Config directory not found
    #[error("Could not determine config directory")]
    NoConfigDir,
}
