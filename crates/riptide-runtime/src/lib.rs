#![forbid(unsafe_code)]
#![deny(unused_must_use, rustdoc::broken_intra_doc_links, rustdoc::bare_urls)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

//! Persistence layer for session records.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use riptide_events::ContentId;
use riptide_torrent_core::{SessionFilter, SessionRecord, SessionStatus, TorrentSource};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};

/// Database-backed repository for session records.
#[derive(Clone)]
pub struct RuntimeStore {
    pool: SqlitePool,
}

const UPSERT_SESSION_SQL: &str = r"
    INSERT INTO sessions (
        content_id,
        name,
        source_link,
        source_blob,
        destination,
        category_id,
        status,
        total_size,
        downloaded,
        uploaded,
        added_at,
        completed_at,
        external_id
    )
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
    ON CONFLICT (content_id) DO UPDATE
    SET
        source_link = COALESCE(excluded.source_link, sessions.source_link),
        source_blob = COALESCE(excluded.source_blob, sessions.source_blob),
        destination = excluded.destination,
        status = excluded.status,
        total_size = MAX(sessions.total_size, excluded.total_size)
";

const RECORD_METADATA_SQL: &str = r"
    UPDATE sessions
    SET name = ?2, total_size = ?3
    WHERE content_id = ?1
";

const UPDATE_COUNTERS_SQL: &str = r"
    UPDATE sessions
    SET downloaded = MAX(downloaded, ?2), uploaded = MAX(uploaded, ?3)
    WHERE content_id = ?1
";


const SET_CATEGORY_SQL: &str = r"
    UPDATE sessions
    SET category_id = ?2
    WHERE content_id = ?1
";

const SET_EXTERNAL_ID_SQL: &str = r"
    UPDATE sessions
    SET external_id = ?2
    WHERE content_id = ?1
";

const DELETE_SESSION_SQL: &str = r"
    DELETE FROM sessions
    WHERE content_id = ?1
";

const SELECT_SESSION_COLUMNS: &str = r"
    SELECT
        content_id,
        name,
        source_link,
        source_blob,
        destination,
        category_id,
        status,
        total_size,
        downloaded,
        uploaded,
        added_at,
        completed_at,
        external_id
    FROM sessions
";

impl RuntimeStore {
    /// Open (creating when missing) the database at `url` and apply migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the database is unreachable or migrations fail.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .with_context(|| format!("failed to connect to session database at {url}"))?;
        Self::new(pool).await
    }

    /// Private in-memory database; a single pinned connection keeps it alive.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or migrations fail.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .acquire_timeout(Duration::from_secs(30))
            .connect("sqlite::memory:")
            .await
            .context("failed to open in-memory session database")?;
        Self::new(pool).await
    }

    /// Initialise the store, applying pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if migrations fail.
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to run session migrations")?;
        Ok(Self { pool })
    }

    /// Insert a record, or reactivate an existing one without duplicating it.
    ///
    /// Existing counters, name, category and timestamps are preserved.
    ///
    /// # Errors
    ///
    /// Returns an error if the destination is not UTF-8 or the write fails.
    pub async fn upsert_session(&self, record: &SessionRecord) -> Result<()> {
        let (link, blob) = split_source(record.source.as_ref());
        sqlx::query(UPSERT_SESSION_SQL)
            .bind(record.content_id.as_str())
            .bind(&record.name)
            .bind(link)
            .bind(blob)
            .bind(path_to_str(&record.destination)?)
            .bind(record.category_id)
            .bind(record.status.as_str())
            .bind(clamp_i64(record.total_size))
            .bind(clamp_i64(record.downloaded))
            .bind(clamp_i64(record.uploaded))
            .bind(record.added_at)
            .bind(record.completed_at)
            .bind(record.external_id)
            .execute(&self.pool)
            .await
            .context("failed to upsert session")?;
        Ok(())
    }

    /// Store the name and size reported by resolved metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn record_metadata(
        &self,
        content_id: &ContentId,
        name: &str,
        total_size: u64,
    ) -> Result<bool> {
        let result = sqlx::query(RECORD_METADATA_SQL)
            .bind(content_id.as_str())
            .bind(name)
            .bind(clamp_i64(total_size))
            .execute(&self.pool)
            .await
            .context("failed to record session metadata")?;
        Ok(result.rows_affected() > 0)
    }

    /// Persist transfer counters without touching the status.
    ///
    /// Counters never move backwards; a fresh handle that restarts its
    /// accounting cannot erase progress recorded by an earlier one.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn update_counters(
        &self,
        content_id: &ContentId,
        downloaded: u64,
        uploaded: u64,
    ) -> Result<bool> {
        let result = sqlx::query(UPDATE_COUNTERS_SQL)
            .bind(content_id.as_str())
            .bind(clamp_i64(downloaded))
            .bind(clamp_i64(uploaded))
            .execute(&self.pool)
            .await
            .context("failed to update session counters")?;
        Ok(result.rows_affected() > 0)
    }

    /// Persist a status change the lifecycle permits.
    ///
    /// Returns `false` when the record is missing or its current status cannot
    /// move to `status`.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn set_status(&self, content_id: &ContentId, status: SessionStatus) -> Result<bool> {
        let sql = format!(
            "UPDATE sessions SET status = ?2
            WHERE content_id = ?1 AND status IN ({})",
            entry_states(status)
        );
        let result = sqlx::query(&sql)
            .bind(content_id.as_str())
            .bind(status.as_str())
            .execute(&self.pool)
            .await
            .context("failed to update session status")?;
        Ok(result.rows_affected() > 0)
    }

    /// Persist counters and, when the lifecycle permits it, the status.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn flush(
        &self,
        content_id: &ContentId,
        downloaded: u64,
        uploaded: u64,
        status: SessionStatus,
    ) -> Result<bool> {
        let sql = format!(
            "UPDATE sessions
            SET
                downloaded = MAX(downloaded, ?2),
                uploaded = MAX(uploaded, ?3),
                status = CASE WHEN status IN ({}) THEN ?4 ELSE status END
            WHERE content_id = ?1",
            entry_states(status)
        );
        let result = sqlx::query(&sql)
            .bind(content_id.as_str())
            .bind(clamp_i64(downloaded))
            .bind(clamp_i64(uploaded))
            .bind(status.as_str())
            .execute(&self.pool)
            .await
            .context("failed to flush session")?;
        Ok(result.rows_affected() > 0)
    }

    /// Record completion: seeding status, final counters and the first completion time.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn mark_completed(
        &self,
        content_id: &ContentId,
        downloaded: u64,
        uploaded: u64,
        completed_at: DateTime<Utc>,
    ) -> Result<bool> {
        let from = entry_states(SessionStatus::Seeding);
        let sql = format!(
            "UPDATE sessions
            SET
                downloaded = MAX(downloaded, ?2),
                uploaded = MAX(uploaded, ?3),
                completed_at = CASE WHEN status IN ({from})
                    THEN COALESCE(completed_at, ?4) ELSE completed_at END,
                status = CASE WHEN status IN ({from}) THEN 'seeding' ELSE status END
            WHERE content_id = ?1"
        );
        let result = sqlx::query(&sql)
            .bind(content_id.as_str())
            .bind(clamp_i64(downloaded))
            .bind(clamp_i64(uploaded))
            .bind(completed_at)
            .execute(&self.pool)
            .await
            .context("failed to mark session completed")?;
        Ok(result.rows_affected() > 0)
    }

    /// Assign or clear the category reference.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn set_category(&self, content_id: &ContentId, category: Option<i64>) -> Result<bool> {
        let result = sqlx::query(SET_CATEGORY_SQL)
            .bind(content_id.as_str())
            .bind(category)
            .execute(&self.pool)
            .await
            .context("failed to update session category")?;
        Ok(result.rows_affected() > 0)
    }

    /// Link or unlink an external media-metadata entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn set_external_id(
        &self,
        content_id: &ContentId,
        external_id: Option<i64>,
    ) -> Result<bool> {
        let result = sqlx::query(SET_EXTERNAL_ID_SQL)
            .bind(content_id.as_str())
            .bind(external_id)
            .execute(&self.pool)
            .await
            .context("failed to update session metadata link")?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete the record; returns whether a row existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the deletion fails.
    pub async fn delete(&self, content_id: &ContentId) -> Result<bool> {
        let result = sqlx::query(DELETE_SESSION_SQL)
            .bind(content_id.as_str())
            .execute(&self.pool)
            .await
            .context("failed to delete session")?;
        Ok(result.rows_affected() > 0)
    }

    /// Load a single record.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the row cannot be decoded.
    pub async fn get(&self, content_id: &ContentId) -> Result<Option<SessionRecord>> {
        let sql = format!("{SELECT_SESSION_COLUMNS} WHERE content_id = ?1");
        let row = sqlx::query(&sql)
            .bind(content_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .context("failed to load session")?;
        row.as_ref().map(decode_record).transpose()
    }

    /// Load records matching the filter, most recently added first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row cannot be decoded.
    pub async fn list(&self, filter: &SessionFilter) -> Result<Vec<SessionRecord>> {
        let sql = format!(
            "{SELECT_SESSION_COLUMNS}
            WHERE (?1 IS NULL OR status = ?1)
              AND (?2 IS NULL OR category_id = ?2)
            ORDER BY added_at DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(filter.status.map(SessionStatus::as_str))
            .bind(filter.category_id)
            .fetch_all(&self.pool)
            .await
            .context("failed to list sessions")?;
        rows.iter().map(decode_record).collect()
    }

    /// Records that should be reattached on start.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row cannot be decoded.
    pub async fn list_restorable(&self) -> Result<Vec<SessionRecord>> {
        let restorable = status_list(
            SessionStatus::ALL
                .into_iter()
                .filter(|status| status.is_restorable()),
        );
        let sql = format!(
            "{SELECT_SESSION_COLUMNS}
            WHERE status IN ({restorable})
            ORDER BY added_at ASC"
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .context("failed to list restorable sessions")?;
        rows.iter().map(decode_record).collect()
    }
}

/// Statuses a record may hold when moving to `next`, `next` included.
fn entry_states(next: SessionStatus) -> String {
    status_list(
        SessionStatus::ALL
            .into_iter()
            .filter(|from| *from == next || from.can_transition_to(next)),
    )
}

/// Quoted SQL list of persisted status labels.
fn status_list(statuses: impl Iterator<Item = SessionStatus>) -> String {
    statuses
        .map(|status| format!("'{}'", status.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn decode_record(row: &SqliteRow) -> Result<SessionRecord> {
    let content_id: String = row.try_get("content_id")?;
    let content_id = ContentId::parse_hex(&content_id)
        .with_context(|| format!("persisted content id {content_id} is malformed"))?;
    let status: String = row.try_get("status")?;
    let status = SessionStatus::from_str(&status).context("persisted status is malformed")?;
    let link: Option<String> = row.try_get("source_link")?;
    let blob: Option<Vec<u8>> = row.try_get("source_blob")?;
    let destination: String = row.try_get("destination")?;

    Ok(SessionRecord {
        content_id,
        name: row.try_get("name")?,
        source: link
            .map(|uri| TorrentSource::Link { uri })
            .or_else(|| blob.map(|bytes| TorrentSource::Blob { bytes })),
        destination: PathBuf::from(destination),
        category_id: row.try_get("category_id")?,
        status,
        total_size: clamp_u64(row.try_get("total_size")?),
        downloaded: clamp_u64(row.try_get("downloaded")?),
        uploaded: clamp_u64(row.try_get("uploaded")?),
        added_at: row.try_get("added_at")?,
        completed_at: row.try_get("completed_at")?,
        external_id: row.try_get("external_id")?,
    })
}

fn split_source(source: Option<&TorrentSource>) -> (Option<&str>, Option<&[u8]>) {
    match source {
        Some(TorrentSource::Link { uri }) => (Some(uri.as_str()), None),
        Some(TorrentSource::Blob { bytes }) => (None, Some(bytes.as_slice())),
        None => (None, None),
    }
}

fn path_to_str(path: &Path) -> Result<&str> {
    path.to_str()
        .ok_or_else(|| anyhow!("session destination contains invalid UTF-8"))
}

fn clamp_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn clamp_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or_default()
}
