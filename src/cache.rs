use crate::episode::{Episode, NO_EPISODE};
use crate::store::{SleepStore, StoreError};
use log::{debug, info};
use std::sync::Arc;

/// Tracks the most recent episode, swapping it out when the store reports a newer one.
///
/// Episodes are handed out as shared snapshots: a refresh never mutates a snapshot a reader
/// still holds.
#[derive(Debug, Default)]
pub struct EpisodeCache {
    current: Option<Arc<Episode>>,
    store_error: Option<StoreError>,
}

impl EpisodeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recent episode. Falls back to [`Episode::empty`] when the store never had
    /// an episode or cannot be reached. An episode that vanished from the store stays
    /// current with its last data.
    pub fn current(&mut self, store: &dyn SleepStore) -> Arc<Episode> {
        let id = match store.most_recent_episode_id(0) {
            Ok(id) => {
                self.store_error = None;
                id
            }
            Err(StoreError::NotFound(what)) => {
                self.store_error = None;
                match &self.current {
                    Some(current) if current.id() != NO_EPISODE => {
                        debug!("{} not found, keeping episode {}", what, current.id());
                        current.id()
                    }
                    _ => {
                        debug!("No sleep episode yet: {} not found", what);
                        NO_EPISODE
                    }
                }
            }
            Err(e) => {
                debug!("{}", e);
                self.store_error = Some(e);
                NO_EPISODE
            }
        };

        if let Some(current) = &self.current {
            if current.id() == id {
                return Arc::clone(current);
            }
        }

        let episode = if id == NO_EPISODE {
            Episode::empty()
        } else {
            info!("Tracking sleep episode {}", id);
            Episode::load(store, id)
        };
        let episode = Arc::new(episode);
        self.current = Some(Arc::clone(&episode));
        episode
    }

    /// Re-read the current episode after a change notification.
    ///
    /// A freshly swapped-in episode was just loaded and is returned as is. When the store
    /// no longer has the current episode the previous snapshot is kept and the error
    /// returned.
    pub fn refresh_current(&mut self, store: &dyn SleepStore) -> Result<Arc<Episode>, StoreError> {
        let before = self.current.as_ref().map(|episode| episode.id());
        let current = self.current(store);
        if before != Some(current.id()) || current.id() == NO_EPISODE {
            return Ok(current);
        }
        drop(current);

        match self.current.as_mut() {
            Some(slot) => {
                // fetch first so a failed refresh does not copy a snapshot readers still hold
                let record = store.episode(slot.id())?;
                Arc::make_mut(slot).apply(record);
                debug!("Refreshed sleep episode {}", slot.id());
                Ok(Arc::clone(slot))
            }
            None => Ok(Arc::new(Episode::empty())),
        }
    }

    /// The last episode handed out, without asking the store.
    pub fn cached(&self) -> Option<Arc<Episode>> {
        self.current.clone()
    }

    /// Set when the last lookup failed because the store was unreachable.
    pub fn store_error(&self) -> Option<&StoreError> {
        self.store_error.as_ref()
    }
}
