//! Bulk session list retrieval.

use async_trait::async_trait;
use riptide_torrent_core::SessionSummary;
use url::Url;

use crate::config::HEADER_API_KEY;
use crate::error::{ClientError, ClientResult};

/// Path of the bulk list route relative to the server root.
pub const SESSIONS_PATH: &str = "/v1/sessions";

/// Source of the full session list.
#[async_trait]
pub trait SessionFetcher: Send + Sync {
    /// Fetch every session the caller may see.
    async fn fetch_all(&self) -> ClientResult<Vec<SessionSummary>>;
}

/// Fetcher backed by the HTTP bulk list route.
#[derive(Clone)]
pub struct HttpSessionFetcher {
    http: reqwest::Client,
    url: Url,
    credential: Option<String>,
}

impl HttpSessionFetcher {
    /// Target the server at `base` (e.g. `http://127.0.0.1:7070`).
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidUrl`] when `base` is not an `http`/`https` URL.
    pub fn new(base: &str, credential: Option<String>) -> ClientResult<Self> {
        let mut url =
            Url::parse(base).map_err(|_| ClientError::invalid_url(base, "unparseable"))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ClientError::invalid_url(base, "unsupported scheme"));
        }
        url.set_path(SESSIONS_PATH);
        url.set_query(None);
        Ok(Self {
            http: reqwest::Client::new(),
            url,
            credential,
        })
    }

    /// Resolved bulk list URL.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl SessionFetcher for HttpSessionFetcher {
    async fn fetch_all(&self) -> ClientResult<Vec<SessionSummary>> {
        let fetch_error = |source| ClientError::Fetch {
            url: self.url.to_string(),
            source,
        };
        let mut request = self.http.get(self.url.clone());
        if let Some(credential) = &self.credential {
            request = request.header(HEADER_API_KEY, credential);
        }
        request
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(fetch_error)?
            .json::<Vec<SessionSummary>>()
            .await
            .map_err(fetch_error)
    }
}
