//! Push client configuration.

use std::time::Duration;

use url::Url;

use crate::backoff::MIN_DELAY;
use crate::error::{ClientError, ClientResult};

/// First reconnect delay, also used after every successful open.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
/// Ceiling for the doubling reconnect delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);
/// Header carrying the credential on the upgrade request.
pub const HEADER_API_KEY: &str = "x-riptide-api-key";
/// Path of the push channel relative to the server root.
pub const PUSH_PATH: &str = "/v1/events/ws";

/// Where and how the push client connects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushClientConfig {
    /// `ws://` or `wss://` endpoint of the push channel.
    pub url: Url,
    /// Credential sent in the upgrade request header.
    pub credential: Option<String>,
    /// Initial reconnect delay.
    pub base_delay: Duration,
    /// Maximum reconnect delay.
    pub max_delay: Duration,
}

impl PushClientConfig {
    /// Build a config for an explicit push-channel URL.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidUrl`] when the URL does not parse or is
    /// not a `ws`/`wss` URL.
    pub fn new(url: &str) -> ClientResult<Self> {
        let parsed = Url::parse(url).map_err(|_| ClientError::invalid_url(url, "unparseable"))?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(ClientError::invalid_url(url, "unsupported scheme"));
        }
        Ok(Self {
            url: parsed,
            credential: None,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        })
    }

    /// Derive the push-channel URL from the server's HTTP base URL.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidUrl`] when the base does not parse or is
    /// not an `http`/`https` URL.
    pub fn from_http_base(base: &str) -> ClientResult<Self> {
        let mut url =
            Url::parse(base).map_err(|_| ClientError::invalid_url(base, "unparseable"))?;
        let scheme = match url.scheme() {
            "http" => "ws",
            "https" => "wss",
            _ => return Err(ClientError::invalid_url(base, "unsupported scheme")),
        };
        url.set_scheme(scheme)
            .map_err(|()| ClientError::invalid_url(base, "unsupported scheme"))?;
        url.set_path(PUSH_PATH);
        url.set_query(None);
        Self::new(url.as_str())
    }

    /// Attach the credential sent at upgrade.
    #[must_use]
    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(credential.into());
        self
    }

    /// Override the reconnect delays.
    ///
    /// The base is raised to [`MIN_DELAY`] and the ceiling never drops below it.
    #[must_use]
    pub fn with_delays(mut self, base_delay: Duration, max_delay: Duration) -> Self {
        self.base_delay = base_delay.max(MIN_DELAY);
        self.max_delay = max_delay.max(self.base_delay);
        self
    }
}
