//! Network access for remote stylesheets, fonts and images.
//!
//! The pipeline only ever sees the [`Fetcher`] trait. [`HttpFetcher`] is the
//! reqwest backed default; [`MemoryFetcher`] serves canned responses and
//! counts requests, which is what the cache tests rely on.

use data_url::DataUrl;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;

/// A completed response. Non-2xx statuses are still responses; callers
/// decide what an unsuccessful status means for them.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl FetchResponse {
    pub fn new(status: u16, content_type: Option<&str>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            content_type: content_type.map(str::to_string),
            body: body.into(),
        }
    }

    /// 2xx status
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    /// The request was cancelled before it completed
    #[error("request aborted")]
    Aborted,

    #[error("request timed out after {0}ms")]
    Timeout(u64),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Asynchronous resource fetcher.
pub trait Fetcher: Send + Sync {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<FetchResponse, FetchError>>;
}

/// Decode a `data:` URI into its MIME essence and payload bytes.
///
/// Returns `None` for anything that is not a well formed data URI.
pub fn decode_data_uri(uri: &str) -> Option<(String, Vec<u8>)> {
    let data_url = DataUrl::process(uri).ok()?;
    let mime = data_url.mime_type();
    let essence = format!("{}/{}", mime.type_, mime.subtype);
    let (body, _fragment) = data_url.decode_to_vec().ok()?;
    Some((essence, body))
}

fn data_response(url: &str) -> Result<FetchResponse, FetchError> {
    decode_data_uri(url)
        .map(|(mime, body)| FetchResponse::new(200, Some(&mime), body))
        .ok_or_else(|| FetchError::Transport(format!("malformed data URI: {}", truncate(url))))
}

fn truncate(url: &str) -> &str {
    match url.char_indices().nth(64) {
        Some((idx, _)) => &url[..idx],
        None => url,
    }
}

/// In-memory fetcher with scripted responses.
///
/// Unknown URLs answer 404. `data:` URIs are decoded without being counted.
#[derive(Default)]
pub struct MemoryFetcher {
    routes: Mutex<HashMap<String, Result<FetchResponse, FetchError>>>,
    hits: Mutex<HashMap<String, usize>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_route(self, url: &str, content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        self.insert(url, FetchResponse::new(200, Some(content_type), body));
        self
    }

    pub fn with_status(self, url: &str, status: u16) -> Self {
        self.insert(url, FetchResponse::new(status, None, Vec::new()));
        self
    }

    pub fn with_error(self, url: &str, error: FetchError) -> Self {
        if let Ok(mut routes) = self.routes.lock() {
            routes.insert(url.to_string(), Err(error));
        }
        self
    }

    pub fn insert(&self, url: &str, response: FetchResponse) {
        if let Ok(mut routes) = self.routes.lock() {
            routes.insert(url.to_string(), Ok(response));
        }
    }

    /// How many times `url` has been requested
    pub fn requests(&self, url: &str) -> usize {
        self.hits
            .lock()
            .map(|h| h.get(url).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn total_requests(&self) -> usize {
        self.hits.lock().map(|h| h.values().sum()).unwrap_or(0)
    }
}

impl Fetcher for MemoryFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<FetchResponse, FetchError>> {
        Box::pin(async move {
            if url.starts_with("data:") {
                return data_response(url);
            }
            if let Ok(mut hits) = self.hits.lock() {
                *hits.entry(url.to_string()).or_insert(0) += 1;
            }
            let route = self
                .routes
                .lock()
                .ok()
                .and_then(|routes| routes.get(url).cloned());
            // let other in-flight requests interleave like a real network would
            tokio::task::yield_now().await;
            route.unwrap_or_else(|| Ok(FetchResponse::new(404, None, Vec::new())))
        })
    }
}

#[cfg(feature = "http")]
pub use http::HttpFetcher;

#[cfg(feature = "http")]
mod http {
    use super::{data_response, FetchError, FetchResponse, Fetcher};
    use crate::error::{Error, Result};
    use futures::future::BoxFuture;
    use log::debug;
    use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, USER_AGENT};
    use reqwest::Client;
    use std::time::Duration;

    /// reqwest backed fetcher. Also serves `data:` and `file:` URLs.
    pub struct HttpFetcher {
        client: Client,
        timeout_ms: u64,
    }

    impl HttpFetcher {
        pub fn new(user_agent: &str, timeout_ms: u64, headers: &[(String, String)]) -> Result<Self> {
            let mut default_headers = HeaderMap::new();
            for (name, value) in headers {
                let name = HeaderName::from_bytes(name.as_bytes())
                    .map_err(|e| Error::Config(format!("bad header name {}: {}", name, e)))?;
                let value = HeaderValue::from_str(value)
                    .map_err(|e| Error::Config(format!("bad header value for {}: {}", name, e)))?;
                default_headers.insert(name, value);
            }
            let user_agent = HeaderValue::from_str(user_agent)
                .map_err(|e| Error::Config(format!("bad user agent: {}", e)))?;
            default_headers.insert(USER_AGENT, user_agent);

            let client = Client::builder()
                .timeout(Duration::from_millis(timeout_ms))
                .default_headers(default_headers)
                .build()
                .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

            Ok(Self { client, timeout_ms })
        }

        async fn fetch_file(&self, url: &str) -> std::result::Result<FetchResponse, FetchError> {
            let path = url::Url::parse(url)
                .ok()
                .and_then(|u| u.to_file_path().ok())
                .ok_or_else(|| FetchError::Transport(format!("bad file URL {}", url)))?;
            match tokio::fs::read(&path).await {
                Ok(body) => Ok(FetchResponse::new(200, None, body)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    Ok(FetchResponse::new(404, None, Vec::new()))
                }
                Err(e) => Err(FetchError::Transport(e.to_string())),
            }
        }

        async fn fetch_http(&self, url: &str) -> std::result::Result<FetchResponse, FetchError> {
            let res = self.client.get(url).send().await.map_err(|e| self.map_err(e))?;
            let status = res.status().as_u16();
            let content_type = res
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = res.bytes().await.map_err(|e| self.map_err(e))?;
            debug!("GET {} -> {} ({} bytes)", url, status, body.len());
            Ok(FetchResponse {
                status,
                content_type,
                body: body.to_vec(),
            })
        }

        fn map_err(&self, e: reqwest::Error) -> FetchError {
            if e.is_timeout() {
                FetchError::Timeout(self.timeout_ms)
            } else {
                FetchError::Transport(e.to_string())
            }
        }
    }

    impl Fetcher for HttpFetcher {
        fn fetch<'a>(
            &'a self,
            url: &'a str,
        ) -> BoxFuture<'a, std::result::Result<FetchResponse, FetchError>> {
            Box::pin(async move {
                if url.starts_with("data:") {
                    data_response(url)
                } else if url.starts_with("file:") {
                    self.fetch_file(url).await
                } else {
                    self.fetch_http(url).await
                }
            })
        }
    }
}
