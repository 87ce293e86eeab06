//! Read-only session routes backing the client's bulk fetch.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
};
use riptide_events::ContentId;
use riptide_torrent_core::{SessionFilter, SessionStatus, SessionSummary};
use serde::Deserialize;
use tracing::error;

use crate::http::errors::ApiError;
use crate::state::ApiState;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct SessionListQuery {
    #[serde(default)]
    pub(crate) status: Option<String>,
    #[serde(default)]
    pub(crate) category: Option<i64>,
}

impl SessionListQuery {
    fn filter(&self) -> Result<SessionFilter, ApiError> {
        let status = match self.status.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(raw.parse::<SessionStatus>().map_err(|_| {
                ApiError::bad_request(format!("status filter '{raw}' is not recognised"))
            })?),
        };
        Ok(SessionFilter {
            status,
            category_id: self.category,
        })
    }
}

pub(crate) async fn list_sessions(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<SessionListQuery>,
) -> Result<Json<Vec<SessionSummary>>, ApiError> {
    let filter = query.filter()?;
    let sessions = state.inspector.list(filter).await.map_err(|err| {
        error!(error = %err, "failed to list sessions");
        ApiError::internal("failed to list sessions")
    })?;
    Ok(Json(sessions))
}

pub(crate) async fn get_session(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionSummary>, ApiError> {
    let content_id = id
        .parse::<ContentId>()
        .map_err(|_| ApiError::bad_request(format!("'{id}' is not a valid content id")))?;
    let session = state.inspector.get(&content_id).await.map_err(|err| {
        error!(error = %err, content_id = %content_id, "failed to load session");
        ApiError::internal("failed to load session")
    })?;
    session
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("session {content_id} not found")))
}
