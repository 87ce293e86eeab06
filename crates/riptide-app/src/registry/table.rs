//! Owned map of engaged sessions.
//!
//! A slot exists for every id that is either attaching (engine admission in
//! flight) or live. Exclusivity is enforced at insertion: `reserve` refuses an
//! id that already has a slot, so two handles can never be engaged for the
//! same id. Every slot carries a generation; work that finishes after its slot
//! was replaced or torn down sees a mismatch and discards its result.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use riptide_events::ContentId;
use riptide_torrent_core::EngineHandle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub(crate) type Generation = u64;

/// Table shared between the registry and the session tasks it spawns.
pub(crate) type SharedTable = Arc<Mutex<SessionTable>>;

pub(crate) fn lock(table: &SharedTable) -> MutexGuard<'_, SessionTable> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) enum SlotState {
    Attaching,
    Live {
        handle: Arc<dyn EngineHandle>,
        task: JoinHandle<()>,
    },
}

pub(crate) struct Slot {
    pub(crate) generation: Generation,
    pub(crate) cancel: CancellationToken,
    pub(crate) state: SlotState,
}

impl Slot {
    /// Cancel the session task and wait for it to finish its current step.
    ///
    /// Returns the live handle, if any, so the caller can tear it down once no
    /// other writer for the id remains.
    pub(crate) async fn quiesce(self) -> Option<Arc<dyn EngineHandle>> {
        self.cancel.cancel();
        match self.state {
            SlotState::Attaching => None,
            SlotState::Live { handle, task } => {
                if let Err(err) = task.await {
                    tracing::warn!(error = %err, "session task join failed");
                }
                Some(handle)
            }
        }
    }
}

#[derive(Default)]
pub(crate) struct SessionTable {
    slots: HashMap<ContentId, Slot>,
    next_generation: Generation,
}

impl SessionTable {
    /// Claim the id for an attach; `None` when it is already attaching or live.
    pub(crate) fn reserve(&mut self, content_id: &ContentId) -> Option<Generation> {
        if self.slots.contains_key(content_id) {
            return None;
        }
        self.next_generation += 1;
        let generation = self.next_generation;
        self.slots.insert(
            content_id.clone(),
            Slot {
                generation,
                cancel: CancellationToken::new(),
                state: SlotState::Attaching,
            },
        );
        Some(generation)
    }

    /// Promote an attaching slot to live, spawning its task under the lock.
    ///
    /// Returns `false` without calling `spawn` when the slot was released or
    /// replaced while the engine was admitting the handle.
    pub(crate) fn go_live<F>(
        &mut self,
        content_id: &ContentId,
        generation: Generation,
        handle: Arc<dyn EngineHandle>,
        spawn: F,
    ) -> bool
    where
        F: FnOnce(CancellationToken) -> JoinHandle<()>,
    {
        let Some(slot) = self.slots.get_mut(content_id) else {
            return false;
        };
        if slot.generation != generation || !matches!(slot.state, SlotState::Attaching) {
            return false;
        }
        let task = spawn(slot.cancel.clone());
        slot.state = SlotState::Live { handle, task };
        true
    }

    /// Remove the slot regardless of generation.
    pub(crate) fn take(&mut self, content_id: &ContentId) -> Option<Slot> {
        self.slots.remove(content_id)
    }

    /// Remove the slot only while it still belongs to `generation`.
    pub(crate) fn release(&mut self, content_id: &ContentId, generation: Generation) -> bool {
        if self
            .slots
            .get(content_id)
            .is_some_and(|slot| slot.generation == generation)
        {
            self.slots.remove(content_id);
            return true;
        }
        false
    }

    pub(crate) fn drain(&mut self) -> Vec<(ContentId, Slot)> {
        self.slots.drain().collect()
    }

    pub(crate) fn contains(&self, content_id: &ContentId) -> bool {
        self.slots.contains_key(content_id)
    }

    pub(crate) fn live_handle(&self, content_id: &ContentId) -> Option<Arc<dyn EngineHandle>> {
        match &self.slots.get(content_id)?.state {
            SlotState::Live { handle, .. } => Some(Arc::clone(handle)),
            SlotState::Attaching => None,
        }
    }

    pub(crate) fn live_count(&self) -> usize {
        self.slots
            .values()
            .filter(|slot| matches!(slot.state, SlotState::Live { .. }))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use riptide_torrent_core::TorrentEngine;
    use riptide_torrent_core::TorrentSource;
    use riptide_torrent_core::stub::StubEngine;
    use std::path::Path;

    const LINK: &str = "magnet:?xt=urn:btih:cccccccccccccccccccccccccccccccccccccccc";

    fn id() -> ContentId {
        ContentId::parse_hex(&"c".repeat(40)).expect("valid id")
    }

    #[test]
    fn reserve_refuses_occupied_ids() {
        let mut table = SessionTable::default();
        let first = table.reserve(&id());
        assert!(first.is_some());
        assert!(table.reserve(&id()).is_none());
        assert!(table.contains(&id()));
        assert_eq!(table.live_count(), 0);
    }

    #[test]
    fn release_ignores_stale_generations() {
        let mut table = SessionTable::default();
        let first = table.reserve(&id()).expect("first reservation");
        assert!(table.take(&id()).is_some());
        let second = table.reserve(&id()).expect("second reservation");
        assert_ne!(first, second);
        assert!(!table.release(&id(), first));
        assert!(table.contains(&id()));
        assert!(table.release(&id(), second));
        assert!(!table.contains(&id()));
    }

    #[tokio::test]
    async fn go_live_requires_the_reserving_generation() -> Result<()> {
        let engine = StubEngine::new();
        let admission = engine
            .add(&TorrentSource::link(LINK), Path::new("/tmp"))
            .await?;
        let mut table = SessionTable::default();
        let stale = table.reserve(&id()).expect("reservation");
        table.take(&id());
        let current = table.reserve(&id()).expect("reservation");

        let spawned = table.go_live(&id(), stale, Arc::clone(&admission.handle), |_| {
            tokio::spawn(async {})
        });
        assert!(!spawned);
        assert_eq!(table.live_count(), 0);

        let spawned = table.go_live(&id(), current, Arc::clone(&admission.handle), |_| {
            tokio::spawn(async {})
        });
        assert!(spawned);
        assert_eq!(table.live_count(), 1);
        assert!(table.live_handle(&id()).is_some());

        let slot = table.take(&id()).expect("live slot");
        let cancel = slot.cancel.clone();
        assert!(slot.quiesce().await.is_some());
        assert!(cancel.is_cancelled());
        Ok(())
    }
}
