//! Event payload types carried across the platform.

use serde::{Deserialize, Serialize};

use crate::content_id::ContentId;

/// Default buffer size for the broadcast channel.
pub const DEFAULT_BUS_CAPACITY: usize = 1_024;

/// Typed domain events surfaced across the system.
///
/// Serialises to the push-channel frame shape `{"type": kind, "data": payload}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Event {
    /// A session was registered and its record persisted.
    Added {
        /// Identifier for the session that was added.
        content_id: ContentId,
        /// Display name known at admission time.
        name: String,
    },
    /// A session was removed and its record deleted.
    Removed {
        /// Identifier for the session that was removed.
        content_id: ContentId,
    },
    /// Periodic metric sample for a live session.
    Progress(ProgressSnapshot),
    /// The engine resolved the session metadata.
    MetadataResolved {
        /// Identifier for the session whose metadata resolved.
        content_id: ContentId,
        /// Name advertised by the metadata.
        name: String,
        /// Total payload size in bytes.
        total_size: u64,
        /// Files contained in the payload.
        files: Vec<DiscoveredFile>,
    },
    /// The session finished downloading and transitioned to seeding.
    Completed {
        /// Identifier for the completed session.
        content_id: ContentId,
    },
    /// The engine reported a failure for the session.
    Error {
        /// Identifier for the failed session.
        content_id: ContentId,
        /// Human readable failure description.
        message: String,
    },
}

impl Event {
    /// Discriminator used for listener routing and wire frames.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Added { .. } => EventKind::Added,
            Self::Removed { .. } => EventKind::Removed,
            Self::Progress(_) => EventKind::Progress,
            Self::MetadataResolved { .. } => EventKind::MetadataResolved,
            Self::Completed { .. } => EventKind::Completed,
            Self::Error { .. } => EventKind::Error,
        }
    }

    /// Identifier of the session the event refers to.
    #[must_use]
    pub const fn content_id(&self) -> &ContentId {
        match self {
            Self::Added { content_id, .. }
            | Self::Removed { content_id }
            | Self::MetadataResolved { content_id, .. }
            | Self::Completed { content_id }
            | Self::Error { content_id, .. } => content_id,
            Self::Progress(snapshot) => &snapshot.content_id,
        }
    }

    /// Serialise the event into its wire frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be encoded as JSON.
    pub fn to_frame(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Decode a wire frame back into an event.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed JSON, unknown kinds or payloads that
    /// do not match the kind.
    pub fn from_frame(frame: &str) -> serde_json::Result<Self> {
        serde_json::from_str(frame)
    }
}

/// Closed set of event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// See [`Event::Added`].
    Added,
    /// See [`Event::Removed`].
    Removed,
    /// See [`Event::Progress`].
    Progress,
    /// See [`Event::MetadataResolved`].
    MetadataResolved,
    /// See [`Event::Completed`].
    Completed,
    /// See [`Event::Error`].
    Error,
}

impl EventKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::Added,
        Self::Removed,
        Self::Progress,
        Self::MetadataResolved,
        Self::Completed,
        Self::Error,
    ];

    /// Wire label for the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Removed => "removed",
            Self::Progress => "progress",
            Self::MetadataResolved => "metadata_resolved",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

/// Point-in-time metrics for a live session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressSnapshot {
    /// Identifier for the sampled session.
    pub content_id: ContentId,
    /// Bytes downloaded so far.
    pub downloaded: u64,
    /// Bytes uploaded so far.
    pub uploaded: u64,
    /// Current download rate in bytes per second.
    pub download_rate: u64,
    /// Current upload rate in bytes per second.
    pub upload_rate: u64,
    /// Completion ratio in the range `0.0..=1.0`.
    pub fraction_complete: f64,
    /// Connected peer count.
    pub peer_count: u32,
    /// Estimated seconds remaining, when the engine can compute one.
    pub eta_seconds: Option<u64>,
}

/// File entry advertised by resolved metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiscoveredFile {
    /// Path of the file relative to the session root.
    pub name: String,
    /// File length in bytes.
    pub length: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn sample_id() -> ContentId {
        ContentId::parse_hex("0123456789abcdef0123456789abcdef01234567").expect("id")
    }

    #[test]
    fn frames_use_type_and_data_envelope() {
        let event = Event::Added {
            content_id: sample_id(),
            name: "Foo".into(),
        };
        let frame: Value = serde_json::from_str(&event.to_frame().expect("frame")).expect("json");
        assert_eq!(
            frame,
            json!({
                "type": "added",
                "data": {
                    "content_id": "0123456789abcdef0123456789abcdef01234567",
                    "name": "Foo"
                }
            })
        );
    }

    #[test]
    fn progress_frames_carry_snapshot_fields() {
        let event = Event::Progress(ProgressSnapshot {
            content_id: sample_id(),
            downloaded: 100,
            uploaded: 5,
            download_rate: 10,
            upload_rate: 1,
            fraction_complete: 0.25,
            peer_count: 3,
            eta_seconds: Some(30),
        });
        let frame: Value = serde_json::from_str(&event.to_frame().expect("frame")).expect("json");
        assert_eq!(frame["type"], "progress");
        assert_eq!(frame["data"]["downloaded"], 100);
        assert_eq!(frame["data"]["peer_count"], 3);
        assert_eq!(Event::from_frame(&frame.to_string()).expect("decode"), event);
    }

    #[test]
    fn unknown_kinds_fail_to_decode() {
        assert!(Event::from_frame(r#"{"type":"exploded","data":{}}"#).is_err());
        assert!(Event::from_frame("not json").is_err());
        assert!(Event::from_frame(r#"{"type":"removed","data":{"content_id":"x"}}"#).is_err());
    }

    #[test]
    fn kind_labels_match_wire_tags() -> anyhow::Result<()> {
        let id = sample_id();
        let events = [
            Event::Added {
                content_id: id.clone(),
                name: String::new(),
            },
            Event::Removed {
                content_id: id.clone(),
            },
            Event::MetadataResolved {
                content_id: id.clone(),
                name: "n".into(),
                total_size: 1,
                files: vec![DiscoveredFile {
                    name: "a.bin".into(),
                    length: 1,
                }],
            },
            Event::Completed {
                content_id: id.clone(),
            },
            Event::Error {
                content_id: id.clone(),
                message: "boom".into(),
            },
        ];
        for event in events {
            let frame: Value = serde_json::from_str(&event.to_frame()?)?;
            assert_eq!(frame["type"], event.kind().as_str());
            assert_eq!(event.content_id(), &id);
        }
        Ok(())
    }
}
