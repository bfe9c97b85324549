//! Outbound HTTP with challenge handling and a single blind retry.
//!
//! The fetcher sits between the source and a [`Transport`]. A response
//! that looks like the Cloudflare challenge page is handed to a
//! [`ChallengeResolver`] and the request is replayed; any other
//! unsuccessful attempt is retried once after a fixed delay.

use crate::config::ScrapingConfig;
use crate::cookies::PersistentCookieStore;
use crate::error::ScraperError;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, SERVER};
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Status the challenge page is served with.
const CHALLENGE_STATUS: StatusCode = StatusCode::SERVICE_UNAVAILABLE;

/// Substring of the `Server` header identifying the vendor.
const CHALLENGE_SERVER: &str = "cloudflare";

/// Marker present near the top of the challenge page.
const CHALLENGE_MARKER: &str = "challenge-form";

/// How much of the body is inspected for the marker.
const CHALLENGE_PEEK_BYTES: usize = 5000;

/// An outbound request. Cloned verbatim when replayed.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

impl Request {
    /// Creates a GET request.
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Adds a header, ignoring values that aren't valid header text.
    pub fn header(mut self, name: HeaderName, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
        self
    }
}

/// A fully read response.
#[derive(Debug, Clone)]
pub struct Response {
    /// Final URL after redirects.
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl Response {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decodes the body as JSON.
    pub fn json<T: DeserializeOwned>(&self, context: &str) -> Result<T, ScraperError> {
        serde_json::from_slice(&self.body).map_err(|e| ScraperError::malformed(context, e))
    }

    /// Whether this is the anti-bot challenge page.
    pub fn is_challenge(&self) -> bool {
        if self.status != CHALLENGE_STATUS {
            return false;
        }

        let from_vendor = self
            .headers
            .get(SERVER)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|server| server.contains(CHALLENGE_SERVER));
        if !from_vendor {
            return false;
        }

        let peek = &self.body[..self.body.len().min(CHALLENGE_PEEK_BYTES)];
        String::from_utf8_lossy(peek).contains(CHALLENGE_MARKER)
    }
}

/// Executes a single HTTP exchange.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: &Request) -> Result<Response, ScraperError>;
}

/// Performs the interactive challenge verification for a URL.
///
/// Implementations return once the user has passed (or failed) the
/// verification and are expected to leave the clearance cookies in the
/// source's cookie store.
#[async_trait]
pub trait ChallengeResolver: Send + Sync {
    async fn resolve(&self, url: &Url) -> Result<(), ScraperError>;
}

/// Resolver for hosts without an interactive browser.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeadlessResolver;

#[async_trait]
impl ChallengeResolver for HeadlessResolver {
    async fn resolve(&self, url: &Url) -> Result<(), ScraperError> {
        warn!(url = %url, "challenge needs interactive verification");
        Err(ScraperError::VerificationRequired)
    }
}

/// [`Transport`] backed by a reqwest client with persistent cookies.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(
        config: &ScrapingConfig,
        cookies: Arc<PersistentCookieStore>,
    ) -> Result<Self, ScraperError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .cookie_provider(cookies)
            .timeout(Duration::from_secs(config.timeout_sec))
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: &Request) -> Result<Response, ScraperError> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone());
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;
        let url = response.url().clone();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        debug!(url = %url, status = status.as_u16(), bytes = body.len(), "received response");

        Ok(Response {
            url,
            status,
            headers,
            body,
        })
    }
}

/// Wraps a transport with challenge resolution and one blind retry.
#[derive(Clone)]
pub struct ResilientFetcher {
    transport: Arc<dyn Transport>,
    resolver: Arc<dyn ChallengeResolver>,
    retry_delay: Duration,
}

impl ResilientFetcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        resolver: Arc<dyn ChallengeResolver>,
        retry_delay: Duration,
    ) -> Self {
        Self {
            transport,
            resolver,
            retry_delay,
        }
    }

    /// Delay before the blind retry.
    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    /// Sends `request`, resolving a challenge at most once and retrying
    /// an unsuccessful attempt once.
    ///
    /// A second unsuccessful response is returned as-is; only transport
    /// and verification failures become errors.
    pub async fn fetch(&self, request: &Request) -> Result<Response, ScraperError> {
        let mut challenge_spent = false;
        let first = self.attempt(request, &mut challenge_spent).await;

        let retry = match &first {
            Ok(response) if !response.is_success() => {
                warn!(
                    url = %request.url,
                    status = response.status.as_u16(),
                    "unsuccessful response, retrying once"
                );
                true
            }
            Ok(_) => false,
            Err(err) if err.is_verification() => false,
            Err(err) => {
                warn!(url = %request.url, error = %err, "request failed, retrying once");
                true
            }
        };
        if !retry {
            return first;
        }
        drop(first);

        if !self.retry_delay.is_zero() {
            tokio::time::sleep(self.retry_delay).await;
        }

        self.attempt(request, &mut challenge_spent).await
    }

    async fn attempt(
        &self,
        request: &Request,
        challenge_spent: &mut bool,
    ) -> Result<Response, ScraperError> {
        let response = self.transport.execute(request).await?;
        if *challenge_spent || !response.is_challenge() {
            return Ok(response);
        }

        *challenge_spent = true;
        warn!(url = %request.url, "challenge page detected");
        drop(response);

        self.resolver.resolve(&request.url).await?;
        debug!(url = %request.url, "challenge resolved, replaying request");
        self.transport.execute(request).await
    }
}
