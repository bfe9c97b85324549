//! Scripted collaborators shared by the unit tests.

use crate::error::ScraperError;
use crate::fetcher::{ChallengeResolver, Request, Response, Transport};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, SERVER};
use reqwest::{StatusCode, Url};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

/// Transport answering from a fixed queue and recording what it was sent.
pub(crate) struct ScriptedTransport {
    responses: Mutex<VecDeque<Result<Response, ScraperError>>>,
    requests: Mutex<Vec<Request>>,
    sent_at: Mutex<Vec<Instant>>,
}

impl ScriptedTransport {
    pub(crate) fn new(responses: Vec<Result<Response, ScraperError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
            sent_at: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    /// When each request arrived, on tokio's clock.
    pub(crate) fn sent_at(&self) -> Vec<Instant> {
        self.sent_at.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(&self, request: &Request) -> Result<Response, ScraperError> {
        self.requests.lock().unwrap().push(request.clone());
        self.sent_at.lock().unwrap().push(Instant::now());
        let next = self.responses.lock().unwrap().pop_front();
        match next {
            Some(Ok(mut response)) => {
                response.url = request.url.clone();
                Ok(response)
            }
            Some(Err(err)) => Err(err),
            None => Err(ScraperError::NotFound(format!(
                "no scripted response for {}",
                request.url
            ))),
        }
    }
}

/// Resolver counting its invocations.
pub(crate) struct CountingResolver {
    calls: AtomicUsize,
    succeed: bool,
}

impl CountingResolver {
    pub(crate) fn succeeding() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            succeed: true,
        })
    }

    pub(crate) fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            succeed: false,
        })
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChallengeResolver for CountingResolver {
    async fn resolve(&self, _url: &Url) -> Result<(), ScraperError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.succeed {
            Ok(())
        } else {
            Err(ScraperError::VerificationFailed("user closed the page".to_string()))
        }
    }
}

pub(crate) fn status_response(status: u16) -> Response {
    Response {
        url: Url::parse("https://www.sussytoons.wtf/").unwrap(),
        status: StatusCode::from_u16(status).unwrap(),
        headers: HeaderMap::new(),
        body: Vec::new(),
    }
}

pub(crate) fn html_response(body: &str) -> Response {
    Response {
        body: body.as_bytes().to_vec(),
        ..status_response(200)
    }
}

pub(crate) fn challenge_response() -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(SERVER, HeaderValue::from_static("cloudflare"));
    Response {
        headers,
        body: br#"<html><form id="challenge-form" action="/cdn-cgi/challenge"></form></html>"#
            .to_vec(),
        ..status_response(503)
    }
}

/// A genuine reqwest connect error, from a port nothing listens on.
pub(crate) async fn connection_refused() -> ScraperError {
    let addr = std::net::TcpListener::bind("127.0.0.1:0")
        .and_then(|listener| listener.local_addr())
        .unwrap();
    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    let err = client.get(format!("http://{addr}/")).send().await.unwrap_err();
    ScraperError::HttpError(err)
}

/// Wraps JavaScript source in a `<script>` tag pushing one hydration chunk.
pub(crate) fn hydration_script(chunk: &str) -> String {
    let literal = serde_json::to_string(chunk).unwrap();
    format!("<script>self.__next_f.push([1,{literal}])</script>")
}

/// A page shaped like the site's server-rendered HTML.
pub(crate) fn hydration_page(chunks: &[&str]) -> String {
    let mut html = String::from(
        "<html><head><script src=\"/_next/static/main.js\"></script>\
         <script>(self.__next_f=self.__next_f||[]).push([0])</script></head><body>",
    );
    for chunk in chunks {
        html.push_str(&hydration_script(chunk));
    }
    html.push_str("</body></html>");
    html
}
