use crate::store::{ChangeCallback, EpisodeRecord, SleepStore, StoreError, Subscribers, Subscription};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

struct MemoryState {
    available: bool,
    headband_on_head: bool,
    episodes: BTreeMap<i64, EpisodeRecord>,
}

/// In-process store. Every mutation notifies the matching listeners.
pub struct MemoryStore {
    state: RwLock<MemoryState>,
    episode_subscribers: Subscribers,
    headband_subscribers: Subscribers,
    episode_queries: AtomicUsize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MemoryState {
                available: true,
                headband_on_head: false,
                episodes: BTreeMap::new(),
            }),
            episode_subscribers: Subscribers::new(),
            headband_subscribers: Subscribers::new(),
            episode_queries: AtomicUsize::new(0),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, MemoryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, MemoryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn upsert_episode(&self, id: i64, record: EpisodeRecord) {
        self.write().episodes.insert(id, record);
        self.episode_subscribers.notify();
    }

    pub fn remove_episode(&self, id: i64) {
        self.write().episodes.remove(&id);
        self.episode_subscribers.notify();
    }

    pub fn set_headband_on_head(&self, on_head: bool) {
        self.write().headband_on_head = on_head;
        self.headband_subscribers.notify();
    }

    /// Simulate the store disappearing (or coming back).
    pub fn set_available(&self, available: bool) {
        self.write().available = available;
        self.episode_subscribers.notify();
        self.headband_subscribers.notify();
    }

    /// Number of [`SleepStore::episode`] queries served so far.
    pub fn episode_queries(&self) -> usize {
        self.episode_queries.load(Ordering::SeqCst)
    }

    pub fn episode_listeners(&self) -> usize {
        self.episode_subscribers.len()
    }

    pub fn headband_listeners(&self) -> usize {
        self.headband_subscribers.len()
    }

    fn available(&self) -> Result<RwLockReadGuard<'_, MemoryState>, StoreError> {
        let state = self.read();
        if state.available {
            Ok(state)
        } else {
            Err(StoreError::Unavailable("memory store switched off".to_string()))
        }
    }
}

impl SleepStore for MemoryStore {
    fn most_recent_episode_id(&self, skip: usize) -> Result<i64, StoreError> {
        let state = self.available()?;
        let mut episodes: Vec<(&i64, &EpisodeRecord)> = state.episodes.iter().collect();
        episodes.sort_by(|a, b| b.1.start_time.cmp(&a.1.start_time));

        episodes
            .get(skip)
            .map(|(id, _)| **id)
            .ok_or_else(|| StoreError::NotFound(format!("sleep episode {skip} before most recent")))
    }

    fn episode(&self, id: i64) -> Result<EpisodeRecord, StoreError> {
        self.episode_queries.fetch_add(1, Ordering::SeqCst);
        self.available()?
            .episodes
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("sleep episode {id}")))
    }

    fn headband_on_head(&self) -> Result<bool, StoreError> {
        Ok(self.available()?.headband_on_head)
    }

    fn subscribe_episode_changes(&self, callback: ChangeCallback) -> Subscription {
        self.episode_subscribers.subscribe(callback)
    }

    fn subscribe_headband_changes(&self, callback: ChangeCallback) -> Subscription {
        self.headband_subscribers.subscribe(callback)
    }
}
