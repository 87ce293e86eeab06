//! Credential verification for the push channel and the session routes.

use async_trait::async_trait;
use axum::http::{HeaderMap, Uri, header::COOKIE};

use crate::http::constants::{COOKIE_TOKEN, HEADER_API_KEY, QUERY_API_KEY};

/// Decides whether a presented credential grants access.
///
/// Credential issuance lives elsewhere; the API only asks for a yes/no.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    /// Return `true` when the credential is valid.
    async fn verify(&self, credential: &str) -> bool;
}

/// Verifier that accepts a single shared token.
#[derive(Clone)]
pub struct StaticTokenVerifier {
    token: String,
}

impl StaticTokenVerifier {
    /// Accept exactly `token`. An empty token rejects every credential.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl CredentialVerifier for StaticTokenVerifier {
    async fn verify(&self, credential: &str) -> bool {
        !self.token.is_empty() && constant_time_eq(self.token.as_bytes(), credential.as_bytes())
    }
}

fn constant_time_eq(expected: &[u8], presented: &[u8]) -> bool {
    if expected.len() != presented.len() {
        return false;
    }
    expected
        .iter()
        .zip(presented)
        .fold(0_u8, |acc, (left, right)| acc | (left ^ right))
        == 0
}

/// Pull the credential from the header, the `api_key` query parameter or the
/// `token` cookie, in that order.
pub(crate) fn extract_credential(headers: &HeaderMap, uri: &Uri) -> Option<String> {
    let header_value = headers
        .get(HEADER_API_KEY)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if let Some(value) = header_value {
        return Some(value.to_string());
    }

    if let Some(query) = uri.query() {
        for pair in query.split('&') {
            if let Some(value) = pair
                .strip_prefix(QUERY_API_KEY)
                .and_then(|rest| rest.strip_prefix('='))
                && !value.is_empty()
            {
                return Some(value.to_string());
            }
        }
    }

    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == COOKIE_TOKEN && !value.is_empty())
        .map(|(_, value)| value.to_string())
}
