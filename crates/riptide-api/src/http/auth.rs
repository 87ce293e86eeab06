//! Authentication middleware for the HTTP layer.

use std::sync::Arc;

use axum::{extract::State, http::Request, middleware::Next, response::Response};

use crate::auth::extract_credential;
use crate::http::errors::ApiError;
use crate::state::ApiState;

pub(crate) async fn require_credential(
    State(state): State<Arc<ApiState>>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let credential = extract_credential(req.headers(), req.uri())
        .ok_or_else(|| ApiError::unauthorized("missing API key header, query parameter or cookie"))?;

    if !state.verifier.verify(&credential).await {
        return Err(ApiError::unauthorized("invalid API key"));
    }

    Ok(next.run(req).await)
}
