//! Shared HTTP constants (headers, credential locations, problem URIs).

pub(crate) const HEADER_API_KEY: &str = "x-riptide-api-key";
pub(crate) const HEADER_REQUEST_ID: &str = "x-request-id";
pub(crate) const QUERY_API_KEY: &str = "api_key";
pub(crate) const COOKIE_TOKEN: &str = "token";

/// Close code sent when the push-channel credential is rejected.
pub(crate) const CLOSE_UNAUTHORIZED: u16 = 4001;
pub(crate) const CLOSE_UNAUTHORIZED_REASON: &str = "Unauthorized";

/// Frames buffered per push connection before it is considered too slow.
pub(crate) const PUSH_CONNECTION_BUFFER: usize = 64;

pub(crate) const PROBLEM_INTERNAL: &str = "https://riptide.dev/problems/internal";
pub(crate) const PROBLEM_UNAUTHORIZED: &str = "https://riptide.dev/problems/unauthorized";
pub(crate) const PROBLEM_BAD_REQUEST: &str = "https://riptide.dev/problems/bad-request";
pub(crate) const PROBLEM_NOT_FOUND: &str = "https://riptide.dev/problems/not-found";
