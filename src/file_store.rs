use crate::store::{ChangeCallback, EpisodeRecord, SleepStore, StoreError, Subscribers, Subscription};
use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEpisode {
    pub id: i64,
    #[serde(flatten)]
    pub record: EpisodeRecord,
}

/// On-disk layout of the sleep data snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub headband_on_head: bool,
    #[serde(default)]
    pub episodes: Vec<StoredEpisode>,
}

impl StoreSnapshot {
    pub fn read(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open store file: {}", path.display()))?;
        serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse store file: {}", path.display()))
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write store file: {}", path.display()))
    }
}

#[derive(Default)]
struct FileState {
    snapshot: Option<StoreSnapshot>,
    modified: Option<SystemTime>,
}

/// Store backed by a JSON snapshot file that is reloaded when it changes on disk.
///
/// A missing file makes the store unavailable. A file that fails to parse keeps the
/// previous snapshot, since it is most likely caught mid-write.
pub struct JsonFileStore {
    path: PathBuf,
    state: RwLock<FileState>,
    episode_subscribers: Subscribers,
    headband_subscribers: Subscribers,
}

impl JsonFileStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let store = Self {
            path: path.into(),
            state: RwLock::new(FileState::default()),
            episode_subscribers: Subscribers::new(),
            headband_subscribers: Subscribers::new(),
        };

        if let Err(e) = store.reload_if_changed() {
            warn!("{:#}", e);
        }
        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_state(&self) -> RwLockReadGuard<'_, FileState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, FileState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reload the snapshot if the file's modification time moved. Returns whether the
    /// in-memory snapshot changed; listeners have been notified when it did.
    pub fn reload_if_changed(&self) -> Result<bool> {
        let modified = match std::fs::metadata(&self.path).and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) => {
                let was_available = {
                    let mut state = self.write_state();
                    state.modified = None;
                    state.snapshot.take().is_some()
                };
                if was_available {
                    warn!("Store file {} went away: {}", self.path.display(), e);
                    self.episode_subscribers.notify();
                    self.headband_subscribers.notify();
                    return Ok(true);
                }
                return Ok(false);
            }
        };

        if self.read_state().modified == Some(modified) {
            return Ok(false);
        }

        // a half-written file keeps the old mtime so the next tick parses it again
        let loaded = StoreSnapshot::read(&self.path)?;
        let (episodes_changed, headband_changed) = {
            let mut state = self.write_state();
            state.modified = Some(modified);

            let (episodes_changed, headband_changed) = match &state.snapshot {
                Some(previous) => (
                    previous.episodes != loaded.episodes,
                    previous.headband_on_head != loaded.headband_on_head,
                ),
                None => (true, true),
            };
            state.snapshot = Some(loaded);
            (episodes_changed, headband_changed)
        };

        debug!(
            "Reloaded {} (episodes changed: {}, headband changed: {})",
            self.path.display(),
            episodes_changed,
            headband_changed
        );
        if episodes_changed {
            self.episode_subscribers.notify();
        }
        if headband_changed {
            self.headband_subscribers.notify();
        }
        Ok(episodes_changed || headband_changed)
    }

    /// Poll the file for changes on a background task.
    pub fn watch(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        info!("Watching {} every {:?}", self.path.display(), every);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                if let Err(e) = self.reload_if_changed() {
                    warn!("{:#}", e);
                }
            }
        })
    }

    fn with_snapshot<T>(
        &self,
        f: impl FnOnce(&StoreSnapshot) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        match &self.read_state().snapshot {
            Some(snapshot) => f(snapshot),
            None => Err(StoreError::Unavailable(format!(
                "no readable store file at {}",
                self.path.display()
            ))),
        }
    }
}

impl SleepStore for JsonFileStore {
    fn most_recent_episode_id(&self, skip: usize) -> Result<i64, StoreError> {
        self.with_snapshot(|snapshot| {
            let mut episodes: Vec<&StoredEpisode> = snapshot.episodes.iter().collect();
            episodes.sort_by(|a, b| b.record.start_time.cmp(&a.record.start_time));
            episodes.get(skip).map(|e| e.id).ok_or_else(|| {
                StoreError::NotFound(format!("sleep episode {skip} before most recent"))
            })
        })
    }

    fn episode(&self, id: i64) -> Result<EpisodeRecord, StoreError> {
        self.with_snapshot(|snapshot| {
            snapshot
                .episodes
                .iter()
                .find(|e| e.id == id)
                .map(|e| e.record.clone())
                .ok_or_else(|| StoreError::NotFound(format!("sleep episode {id}")))
        })
    }

    fn headband_on_head(&self) -> Result<bool, StoreError> {
        self.with_snapshot(|snapshot| Ok(snapshot.headband_on_head))
    }

    fn subscribe_episode_changes(&self, callback: ChangeCallback) -> Subscription {
        self.episode_subscribers.subscribe(callback)
    }

    fn subscribe_headband_changes(&self, callback: ChangeCallback) -> Subscription {
        self.headband_subscribers.subscribe(callback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn snapshot(on_head: bool, base: Vec<u8>) -> StoreSnapshot {
        let start = DateTime::<Utc>::from_timestamp_millis(1_700_000_000_000).unwrap();
        StoreSnapshot {
            headband_on_head: on_head,
            episodes: vec![StoredEpisode {
                id: 42,
                record: EpisodeRecord {
                    start_time: start,
                    end_time: start,
                    score: 0,
                    end_reason: 1,
                    total_sleep_units: 0,
                    updated_on: start,
                    base_hypnogram: base,
                    display_hypnogram: Vec::new(),
                },
            }],
        }
    }

    fn bump_mtime(path: &Path, secs: u64) {
        let file = std::fs::OpenOptions::new().write(true).open(path).unwrap();
        file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
            .unwrap();
    }

    #[test]
    fn missing_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().join("missing.json"));
        assert!(matches!(store.headband_on_head(), Err(StoreError::Unavailable(_))));
        assert!(matches!(
            store.most_recent_episode_id(0),
            Err(StoreError::Unavailable(_))
        ));
    }

    #[test]
    fn loads_episodes_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        snapshot(true, vec![3, 3]).write(&path).unwrap();

        let store = JsonFileStore::open(&path);
        assert_eq!(store.headband_on_head(), Ok(true));
        assert_eq!(store.most_recent_episode_id(0), Ok(42));
        assert_eq!(store.episode(42).unwrap().base_hypnogram, vec![3, 3]);
        assert!(matches!(store.episode(7), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn reload_notifies_only_what_changed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        snapshot(false, vec![3]).write(&path).unwrap();
        bump_mtime(&path, 1_000);
        let store = JsonFileStore::open(&path);

        let episodes = Arc::new(AtomicUsize::new(0));
        let headband = Arc::new(AtomicUsize::new(0));
        let e = Arc::clone(&episodes);
        let h = Arc::clone(&headband);
        let _es = store.subscribe_episode_changes(Box::new(move || {
            e.fetch_add(1, Ordering::SeqCst);
        }));
        let _hs = store.subscribe_headband_changes(Box::new(move || {
            h.fetch_add(1, Ordering::SeqCst);
        }));

        assert!(!store.reload_if_changed().unwrap());

        snapshot(false, vec![3, 4]).write(&path).unwrap();
        bump_mtime(&path, 2_000);
        assert!(store.reload_if_changed().unwrap());
        assert_eq!(episodes.load(Ordering::SeqCst), 1);
        assert_eq!(headband.load(Ordering::SeqCst), 0);

        snapshot(true, vec![3, 4]).write(&path).unwrap();
        bump_mtime(&path, 3_000);
        assert!(store.reload_if_changed().unwrap());
        assert_eq!(episodes.load(Ordering::SeqCst), 1);
        assert_eq!(headband.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn corrupt_file_keeps_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        snapshot(true, vec![3]).write(&path).unwrap();
        bump_mtime(&path, 1_000);
        let store = JsonFileStore::open(&path);

        std::fs::write(&path, "{ not json").unwrap();
        bump_mtime(&path, 2_000);
        assert!(store.reload_if_changed().is_err());
        assert_eq!(store.most_recent_episode_id(0), Ok(42));
        assert_eq!(store.headband_on_head(), Ok(true));

        // the writer finishes within the same mtime tick
        snapshot(false, vec![3]).write(&path).unwrap();
        bump_mtime(&path, 2_000);
        assert!(store.reload_if_changed().unwrap());
        assert_eq!(store.headband_on_head(), Ok(false));
    }
}
