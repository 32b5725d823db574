//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building HTTP clients with proper user agent strings
//! - GET requests to fetch page content
//! - Content-Type checks
//! - Error classification into task outcomes

use crate::config::FetcherConfig;
use crate::crawler::parser::parse_html;
use crate::state::TaskState;
use async_trait::async_trait;
use reqwest::{redirect::Policy, Client};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Maximum number of redirects followed for one fetch
const MAX_REDIRECTS: usize = 10;

/// A successfully fetched page
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Page body content
    pub html: String,

    /// Links found on the page (absolute URLs)
    pub links: Vec<String>,

    /// Page title, if one was found
    pub title: Option<String>,
}

/// Reasons a fetch can fail
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("Not an HTML page: {0}")]
    ContentMismatch(String),

    #[error("Request failed: {0}")]
    Request(String),
}

impl FetchError {
    /// The state a task moves to when its fetch fails this way
    pub fn task_state(&self) -> TaskState {
        match self {
            FetchError::Timeout(_) => TaskState::Timeout,
            _ => TaskState::Failed,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        // Connect timeouts report both flags; they count as timeouts
        if e.is_timeout() {
            FetchError::Timeout(e.to_string())
        } else if e.is_connect() {
            FetchError::Connect(e.to_string())
        } else {
            FetchError::Request(e.to_string())
        }
    }
}

/// Something that can retrieve a page and report the links on it
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Fetches `url`, returning its content, links and title
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError>;

    /// Releases any resources held by the fetcher
    async fn shutdown(&self) {}
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The fetcher configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &FetcherConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(Duration::from_secs(config.request_timeout))
        .connect_timeout(Duration::from_secs(config.connect_timeout))
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches pages over HTTP(S)
pub struct HttpFetcher {
    client: Client,
    closed: AtomicBool,
}

impl HttpFetcher {
    /// Creates a fetcher with a client built from `config`
    pub fn new(config: &FetcherConfig) -> Result<Self, reqwest::Error> {
        Ok(Self::with_client(build_http_client(config)?))
    }

    /// Creates a fetcher around an existing client
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ContentFetcher for HttpFetcher {
    /// Fetches a URL and extracts its links
    ///
    /// # Error Classification
    ///
    /// | Condition | Error |
    /// |-----------|-------|
    /// | Timeout (connect or read) | `Timeout` |
    /// | Connection refused / DNS / TLS | `Connect` |
    /// | Non-2xx status | `Status` |
    /// | Content-Type not HTML | `ContentMismatch` |
    /// | Anything else | `Request` |
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(FetchError::Request("fetcher has been shut down".to_string()));
        }

        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        let final_url = response.url().clone();

        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if !is_html(&content_type) {
            return Err(FetchError::ContentMismatch(content_type));
        }

        let html = response.text().await?;

        if final_url != *url {
            tracing::debug!("{} redirected to {}", url, final_url);
        }

        let parsed = parse_html(&html, &final_url);

        Ok(FetchedPage {
            html,
            links: parsed.links,
            title: parsed.title,
        })
    }

    async fn shutdown(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!("HTTP fetcher shut down");
        }
    }
}

fn is_html(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    mime == "text/html" || mime == "application/xhtml+xml"
}
