//! Session domain types and DTOs shared across the workspace.

use std::fmt::{self, Display, Formatter};
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use riptide_events::{ContentId, DiscoveredFile, ProgressSnapshot};
use serde::{Deserialize, Serialize};

use crate::error::TorrentError;
use crate::service::HandleStats;

/// Source describing how a session should be admitted by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TorrentSource {
    /// A magnet-style link whose info hash can be read without the engine.
    Link {
        /// Link string.
        uri: String,
    },
    /// Raw metainfo bytes; the id is only known once the engine parses them.
    Blob {
        /// Opaque metainfo payload.
        bytes: Vec<u8>,
    },
}

impl TorrentSource {
    #[must_use]
    /// Convenience constructor for link sources.
    pub fn link(uri: impl Into<String>) -> Self {
        Self::Link { uri: uri.into() }
    }

    #[must_use]
    /// Convenience constructor for blob sources.
    pub fn blob(bytes: impl Into<Vec<u8>>) -> Self {
        Self::Blob {
            bytes: bytes.into(),
        }
    }
}

/// Persisted lifecycle status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Registered but not yet engaged.
    Queued,
    /// Actively transferring payload.
    Downloading,
    /// Payload complete; uploading to peers.
    Seeding,
    /// Torn down by the user; data kept on disk.
    Paused,
    /// The engine reported a failure.
    Error,
    /// Verifying existing data; transient sub-state of downloading.
    Checking,
}

impl SessionStatus {
    /// Every status, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::Queued,
        Self::Downloading,
        Self::Seeding,
        Self::Paused,
        Self::Error,
        Self::Checking,
    ];

    /// Persisted label for the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Downloading => "downloading",
            Self::Seeding => "seeding",
            Self::Paused => "paused",
            Self::Error => "error",
            Self::Checking => "checking",
        }
    }

    /// Whether a session in this status is reattached on start.
    #[must_use]
    pub const fn is_restorable(self) -> bool {
        matches!(self, Self::Downloading | Self::Seeding | Self::Checking)
    }

    /// Whether the lifecycle permits moving from `self` to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Downloading)
                | (
                    Self::Downloading | Self::Checking,
                    Self::Seeding | Self::Error | Self::Paused
                )
                | (Self::Downloading, Self::Checking)
                | (Self::Checking, Self::Downloading)
                | (Self::Seeding, Self::Paused | Self::Error)
                | (Self::Paused | Self::Error, Self::Downloading)
        )
    }
}

impl Display for SessionStatus {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = TorrentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "queued" => Ok(Self::Queued),
            "downloading" => Ok(Self::Downloading),
            "seeding" => Ok(Self::Seeding),
            "paused" => Ok(Self::Paused),
            "error" => Ok(Self::Error),
            "checking" => Ok(Self::Checking),
            other => Err(TorrentError::InvalidStatus {
                value: other.to_string(),
            }),
        }
    }
}

/// Durable record of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    /// Stable identifier derived from the info hash.
    pub content_id: ContentId,
    /// Display name.
    pub name: String,
    /// Source used to (re)attach the session.
    pub source: Option<TorrentSource>,
    /// Directory the payload is written under.
    pub destination: PathBuf,
    /// Optional category reference.
    pub category_id: Option<i64>,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Total payload size in bytes; zero while unknown.
    pub total_size: u64,
    /// Bytes downloaded as of the last flush.
    pub downloaded: u64,
    /// Bytes uploaded as of the last flush.
    pub uploaded: u64,
    /// Admission timestamp.
    pub added_at: DateTime<Utc>,
    /// Completion timestamp.
    pub completed_at: Option<DateTime<Utc>>,
    /// Link to an external media-metadata entry.
    pub external_id: Option<i64>,
}

impl SessionRecord {
    /// Build the initial record for a freshly admitted session.
    #[must_use]
    pub fn admitted(
        content_id: ContentId,
        name: impl Into<String>,
        source: TorrentSource,
        destination: PathBuf,
    ) -> Self {
        Self {
            content_id,
            name: name.into(),
            source: Some(source),
            destination,
            category_id: None,
            status: SessionStatus::Downloading,
            total_size: 0,
            downloaded: 0,
            uploaded: 0,
            added_at: Utc::now(),
            completed_at: None,
            external_id: None,
        }
    }

    /// Completion ratio derived from persisted counters.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn fraction_complete(&self) -> f64 {
        if self.total_size == 0 {
            0.0
        } else {
            (self.downloaded as f64 / self.total_size as f64).clamp(0.0, 1.0)
        }
    }
}

/// Row returned by the bulk list; a record merged with live metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Stable identifier.
    pub content_id: ContentId,
    /// Display name.
    pub name: String,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Destination directory.
    pub destination: String,
    /// Optional category reference.
    pub category_id: Option<i64>,
    /// Total payload size in bytes.
    pub total_size: u64,
    /// Bytes downloaded.
    pub downloaded: u64,
    /// Bytes uploaded.
    pub uploaded: u64,
    /// Download rate in bytes per second; zero when idle.
    pub download_rate: u64,
    /// Upload rate in bytes per second; zero when idle.
    pub upload_rate: u64,
    /// Completion ratio.
    pub fraction_complete: f64,
    /// Connected peers; zero when idle.
    pub peer_count: u32,
    /// Estimated seconds remaining.
    pub eta_seconds: Option<u64>,
    /// Admission timestamp.
    pub added_at: DateTime<Utc>,
    /// Completion timestamp.
    pub completed_at: Option<DateTime<Utc>>,
    /// Link to an external media-metadata entry.
    pub external_id: Option<i64>,
    /// Payload files of a live session; only filled by single-session lookups.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<DiscoveredFile>,
}

impl SessionSummary {
    /// Project a record, overlaying live metrics when a handle is engaged.
    #[must_use]
    pub fn from_record(record: &SessionRecord, live: Option<&HandleStats>) -> Self {
        let mut summary = Self {
            content_id: record.content_id.clone(),
            name: record.name.clone(),
            status: record.status,
            destination: record.destination.to_string_lossy().into_owned(),
            category_id: record.category_id,
            total_size: record.total_size,
            downloaded: record.downloaded,
            uploaded: record.uploaded,
            download_rate: 0,
            upload_rate: 0,
            fraction_complete: record.fraction_complete(),
            peer_count: 0,
            eta_seconds: None,
            added_at: record.added_at,
            completed_at: record.completed_at,
            external_id: record.external_id,
            files: Vec::new(),
        };
        if let Some(stats) = live {
            if !stats.name.is_empty() {
                summary.name.clone_from(&stats.name);
            }
            if stats.total_size > 0 {
                summary.total_size = stats.total_size;
            }
            summary.downloaded = stats.downloaded;
            summary.uploaded = stats.uploaded;
            summary.download_rate = stats.download_rate;
            summary.upload_rate = stats.upload_rate;
            summary.fraction_complete = stats.fraction_complete;
            summary.peer_count = stats.peer_count;
            summary.eta_seconds = stats.eta_seconds;
        }
        summary
    }

    /// Overwrite the numeric fields carried by a progress sample.
    ///
    /// Status is left untouched so a paused entry stays paused.
    pub fn apply_progress(&mut self, snapshot: &ProgressSnapshot) {
        self.downloaded = snapshot.downloaded;
        self.uploaded = snapshot.uploaded;
        self.download_rate = snapshot.download_rate;
        self.upload_rate = snapshot.upload_rate;
        self.fraction_complete = snapshot.fraction_complete;
        self.peer_count = snapshot.peer_count;
        self.eta_seconds = snapshot.eta_seconds;
    }
}

/// Filter applied to list queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionFilter {
    /// Only return sessions in this status.
    pub status: Option<SessionStatus>,
    /// Only return sessions assigned to this category.
    pub category_id: Option<i64>,
}

/// Identity returned to callers of `add`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionIdentity {
    /// Stable identifier.
    pub content_id: ContentId,
    /// Display name known at the time of the call.
    pub name: String,
}

/// Result of an add request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    /// A new session was registered.
    Added(SessionIdentity),
    /// The id already had a live or attaching handle; nothing new was created.
    Existing(SessionIdentity),
    /// Blob source; the id becomes known once the engine parses the payload.
    Pending,
}

/// Options accompanying a removal request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveOptions {
    /// Delete the downloaded payload from disk.
    #[serde(default)]
    pub delete_files: bool,
}
