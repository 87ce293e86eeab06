//! Client-side view model of the session list.

use riptide_events::{ContentId, Event, ProgressSnapshot};
use riptide_torrent_core::{SessionStatus, SessionSummary};

/// What applying an event did to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheAction {
    /// An entry was patched or removed in place.
    Patched,
    /// The event referred to an unknown id and was ignored.
    Ignored,
    /// The event cannot be applied as a delta; refetch the bulk list.
    Refetch,
}

/// Ordered list of sessions keyed by content id.
///
/// Holds at most one entry per id; every patch is keyed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionCache {
    entries: Vec<SessionSummary>,
}

impl SessionCache {
    /// Empty cache.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Replace everything with a bulk fetch result, keeping the first row
    /// for any duplicated id.
    pub fn replace_all(&mut self, rows: Vec<SessionSummary>) {
        self.entries.clear();
        for row in rows {
            if self.position(&row.content_id).is_none() {
                self.entries.push(row);
            }
        }
    }

    /// Apply one push event.
    pub fn apply(&mut self, event: &Event) -> CacheAction {
        match event {
            Event::Added { .. } | Event::MetadataResolved { .. } => CacheAction::Refetch,
            Event::Progress(snapshot) => self.apply_progress(snapshot),
            Event::Removed { content_id } => {
                let before = self.entries.len();
                self.entries.retain(|entry| &entry.content_id != content_id);
                if self.entries.len() == before {
                    CacheAction::Ignored
                } else {
                    CacheAction::Patched
                }
            }
            Event::Completed { content_id } => self.patch(content_id, |entry| {
                entry.status = SessionStatus::Seeding;
                entry.fraction_complete = 1.0;
            }),
            Event::Error { content_id, .. } => {
                self.patch(content_id, |entry| entry.status = SessionStatus::Error)
            }
        }
    }

    fn apply_progress(&mut self, snapshot: &ProgressSnapshot) -> CacheAction {
        self.patch(&snapshot.content_id, |entry| entry.apply_progress(snapshot))
    }

    fn patch<F>(&mut self, content_id: &ContentId, update: F) -> CacheAction
    where
        F: FnOnce(&mut SessionSummary),
    {
        match self.entries.iter_mut().find(|entry| &entry.content_id == content_id) {
            Some(entry) => {
                update(entry);
                CacheAction::Patched
            }
            None => CacheAction::Ignored,
        }
    }

    fn position(&self, content_id: &ContentId) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| &entry.content_id == content_id)
    }

    /// Entry for an id.
    #[must_use]
    pub fn get(&self, content_id: &ContentId) -> Option<&SessionSummary> {
        self.position(content_id).map(|index| &self.entries[index])
    }

    /// All entries in server order.
    #[must_use]
    pub fn entries(&self) -> &[SessionSummary] {
        &self.entries
    }

    /// Number of entries.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn id(fill: char) -> ContentId {
        ContentId::parse_hex(&fill.to_string().repeat(40)).expect("id")
    }

    fn row(fill: char, status: SessionStatus) -> SessionSummary {
        SessionSummary {
            content_id: id(fill),
            name: format!("row-{fill}"),
            status,
            destination: "/downloads".into(),
            category_id: None,
            total_size: 1_000,
            downloaded: 100,
            uploaded: 0,
            download_rate: 0,
            upload_rate: 0,
            fraction_complete: 0.1,
            peer_count: 0,
            eta_seconds: None,
            added_at: Utc::now(),
            completed_at: None,
            external_id: None,
            files: Vec::new(),
        }
    }

    fn progress(fill: char, downloaded: u64) -> Event {
        Event::Progress(ProgressSnapshot {
            content_id: id(fill),
            downloaded,
            uploaded: 7,
            download_rate: 50,
            upload_rate: 5,
            fraction_complete: 0.6,
            peer_count: 4,
            eta_seconds: Some(8),
        })
    }

    #[test]
    fn replace_all_drops_duplicate_ids() {
        let mut cache = SessionCache::new();
        let mut duplicate = row('a', SessionStatus::Paused);
        duplicate.name = "second".into();
        cache.replace_all(vec![
            row('a', SessionStatus::Downloading),
            row('b', SessionStatus::Seeding),
            duplicate,
        ]);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&id('a')).map(|entry| entry.name.as_str()), Some("row-a"));
    }

    #[test]
    fn progress_patches_numbers_but_not_status() {
        let mut cache = SessionCache::new();
        cache.replace_all(vec![row('a', SessionStatus::Paused)]);
        assert_eq!(cache.apply(&progress('a', 600)), CacheAction::Patched);
        let entry = cache.get(&id('a')).expect("entry");
        assert_eq!(entry.downloaded, 600);
        assert_eq!(entry.peer_count, 4);
        assert_eq!(entry.eta_seconds, Some(8));
        assert_eq!(entry.status, SessionStatus::Paused);
    }

    #[test]
    fn progress_for_unknown_id_never_creates_an_entry() {
        let mut cache = SessionCache::new();
        cache.replace_all(vec![row('a', SessionStatus::Downloading)]);
        assert_eq!(cache.apply(&progress('f', 10)), CacheAction::Ignored);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&id('f')).is_none());
    }

    #[test]
    fn removed_filters_immediately() {
        let mut cache = SessionCache::new();
        cache.replace_all(vec![
            row('a', SessionStatus::Downloading),
            row('b', SessionStatus::Downloading),
        ]);
        let removed = Event::Removed { content_id: id('a') };
        assert_eq!(cache.apply(&removed), CacheAction::Patched);
        assert_eq!(cache.apply(&removed), CacheAction::Ignored);
        assert_eq!(cache.entries().len(), 1);
        assert_eq!(cache.entries()[0].content_id, id('b'));
    }

    #[test]
    fn completed_and_error_update_status() {
        let mut cache = SessionCache::new();
        cache.replace_all(vec![
            row('a', SessionStatus::Downloading),
            row('b', SessionStatus::Downloading),
        ]);
        cache.apply(&Event::Completed { content_id: id('a') });
        let done = cache.get(&id('a')).expect("entry");
        assert_eq!(done.status, SessionStatus::Seeding);
        assert!((done.fraction_complete - 1.0).abs() < f64::EPSILON);

        cache.apply(&Event::Error {
            content_id: id('b'),
            message: "tracker unreachable".into(),
        });
        assert_eq!(
            cache.get(&id('b')).map(|entry| entry.status),
            Some(SessionStatus::Error)
        );
    }

    #[test]
    fn structural_events_request_a_refetch() {
        let mut cache = SessionCache::new();
        let added = Event::Added {
            content_id: id('c'),
            name: "new".into(),
        };
        let resolved = Event::MetadataResolved {
            content_id: id('c'),
            name: "new".into(),
            total_size: 10,
            files: Vec::new(),
        };
        assert_eq!(cache.apply(&added), CacheAction::Refetch);
        assert_eq!(cache.apply(&resolved), CacheAction::Refetch);
        assert!(cache.is_empty());
    }
}
