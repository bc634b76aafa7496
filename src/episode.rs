use crate::hypnogram::Hypnogram;
use crate::phase_analysis::EndReason;
use crate::store::{EpisodeRecord, SleepStore, StoreError};
use chrono::{DateTime, Local, Utc};
use log::{debug, warn};
use std::fmt;

/// Id used for the placeholder episode when the store has none.
pub const NO_EPISODE: i64 = -1;

pub(crate) const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One night of sleep as recorded by the headband.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Episode {
    id: i64,
    hypnogram: Hypnogram,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    score: i32,
    end_reason: EndReason,
    total_sleep_units: i64,
    last_update: DateTime<Utc>,
}

impl Episode {
    /// Placeholder for "no episode yet": empty hypnograms, nothing to wake from.
    pub fn empty() -> Self {
        Self::blank(NO_EPISODE)
    }

    fn blank(id: i64) -> Self {
        Self {
            id,
            hypnogram: Hypnogram::default(),
            start_time: DateTime::UNIX_EPOCH,
            end_time: DateTime::UNIX_EPOCH,
            score: 0,
            end_reason: EndReason::Unknown,
            total_sleep_units: 0,
            last_update: DateTime::UNIX_EPOCH,
        }
    }

    /// Build the episode `id` and fill it from the store. A failed lookup leaves it blank.
    pub fn load(store: &dyn SleepStore, id: i64) -> Self {
        let mut episode = Self::blank(id);
        if let Err(e) = episode.refresh(store) {
            warn!("Could not load sleep episode {}: {}", id, e);
        }
        episode
    }

    /// Load the `skip`-th most recent episode without touching any cache.
    pub fn most_recent(store: &dyn SleepStore, skip: usize) -> Result<Self, StoreError> {
        let id = store.most_recent_episode_id(skip)?;
        let mut episode = Self::blank(id);
        episode.refresh(store)?;
        Ok(episode)
    }

    pub fn from_record(id: i64, record: EpisodeRecord) -> Self {
        let mut episode = Self::blank(id);
        episode.apply(record);
        episode
    }

    /// Re-read this episode from the store. On error the previous values are kept.
    pub fn refresh(&mut self, store: &dyn SleepStore) -> Result<(), StoreError> {
        let record = store.episode(self.id)?;
        self.apply(record);
        debug!("Refreshed sleep episode {}: {}", self.id, self);
        Ok(())
    }

    /// Replace every attribute, both hypnogram sequences together.
    pub(crate) fn apply(&mut self, record: EpisodeRecord) {
        self.hypnogram = Hypnogram::new(record.base_hypnogram, record.display_hypnogram);
        self.start_time = record.start_time;
        self.end_time = record.end_time;
        self.score = record.score;
        self.end_reason = EndReason::from_code(record.end_reason);
        self.total_sleep_units = record.total_sleep_units;
        self.last_update = record.updated_on;
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn hypnogram(&self) -> &Hypnogram {
        &self.hypnogram
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn end_time(&self) -> DateTime<Utc> {
        self.end_time
    }

    pub fn score(&self) -> i32 {
        self.score
    }

    pub fn end_reason(&self) -> EndReason {
        self.end_reason
    }

    pub fn total_sleep_units(&self) -> i64 {
        self.total_sleep_units
    }

    /// Minutes of sleep, two 30 second units per minute.
    pub fn sleep_minutes(&self) -> i64 {
        self.total_sleep_units / 2
    }

    pub fn last_update(&self) -> DateTime<Utc> {
        self.last_update
    }

    /// Number of 30 second epochs recorded so far.
    pub fn base_epoch_count(&self) -> usize {
        self.hypnogram.base().len()
    }

    fn write_phase_detail(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}: {} ({}) - {} minutes",
            self.hypnogram.display_max_index(),
            self.hypnogram.base_max_index(),
            self.hypnogram.display_phase(-1),
            self.hypnogram.base_phase(-1),
            self.sleep_minutes()
        )
    }
}

fn local(time: DateTime<Utc>) -> impl fmt::Display {
    time.with_timezone(&Local).format(TIMESTAMP_FORMAT)
}

impl fmt::Display for Episode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end_reason {
            EndReason::Active => self.write_phase_detail(f),
            EndReason::Complete => write!(
                f,
                "{} to {}, score: {}",
                local(self.start_time),
                local(self.end_time),
                self.score
            ),
            _ => {
                write!(f, "{} at {}: ", self.end_reason, local(self.end_time))?;
                self.write_phase_detail(f)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::MemoryStore;
    use chrono::Duration;

    fn record(end_reason: i64, base: Vec<u8>, display: Vec<u8>) -> EpisodeRecord {
        let start = DateTime::from_timestamp_millis(1_700_000_000_000).unwrap();
        EpisodeRecord {
            start_time: start,
            end_time: start + Duration::hours(7),
            score: 87,
            end_reason,
            total_sleep_units: 61,
            updated_on: start + Duration::hours(7),
            base_hypnogram: base,
            display_hypnogram: display,
        }
    }

    #[test]
    fn empty_episode_describes_without_data() {
        let episode = Episode::empty();
        assert_eq!(episode.id(), NO_EPISODE);
        let text = episode.to_string();
        assert!(text.starts_with("Unknown at "), "{text}");
        assert!(text.ends_with(": -1/-1: Unknown (Unknown) - 0 minutes"), "{text}");
    }

    #[test]
    fn active_episode_shows_latest_phases() {
        let episode = Episode::from_record(3, record(1, vec![3; 20], vec![3, 2]));
        assert_eq!(episode.to_string(), "1/19: REM (Light) - 30 minutes");
    }

    #[test]
    fn complete_episode_shows_times_and_score() {
        let rec = record(0, vec![3; 20], vec![3, 2]);
        let expected = format!(
            "{} to {}, score: 87",
            rec.start_time.with_timezone(&Local).format(TIMESTAMP_FORMAT),
            rec.end_time.with_timezone(&Local).format(TIMESTAMP_FORMAT)
        );
        assert_eq!(Episode::from_record(3, rec).to_string(), expected);
    }

    #[test]
    fn other_end_reasons_prefix_phase_detail() {
        let rec = record(2, vec![4; 10], vec![4]);
        let expected = format!(
            "Battery Died at {}: 0/9: Deep (Deep) - 30 minutes",
            rec.end_time.with_timezone(&Local).format(TIMESTAMP_FORMAT)
        );
        assert_eq!(Episode::from_record(3, rec).to_string(), expected);
    }

    #[test]
    fn refresh_keeps_state_when_record_disappears() {
        let store = MemoryStore::new();
        store.upsert_episode(8, record(1, vec![3; 10], vec![3]));
        let mut episode = Episode::load(&store, 8);
        assert_eq!(episode.base_epoch_count(), 10);

        store.remove_episode(8);
        let result = episode.refresh(&store);

        assert!(matches!(result, Err(StoreError::NotFound(_))));
        assert_eq!(episode.base_epoch_count(), 10);
        assert_eq!(episode.score(), 87);
    }

    #[test]
    fn refresh_replaces_everything() {
        let store = MemoryStore::new();
        store.upsert_episode(8, record(1, vec![3; 10], vec![3]));
        let mut episode = Episode::load(&store, 8);

        store.upsert_episode(8, record(0, vec![2; 30], vec![2, 2, 2]));
        episode.refresh(&store).unwrap();

        assert_eq!(episode.end_reason(), EndReason::Complete);
        assert_eq!(episode.hypnogram().display_max_index(), 2);
    }

    #[test]
    fn most_recent_skips_back() {
        let store = MemoryStore::new();
        let older = record(0, Vec::new(), Vec::new());
        let mut newer = older.clone();
        newer.start_time = older.start_time + Duration::days(1);
        store.upsert_episode(1, older);
        store.upsert_episode(2, newer);

        assert_eq!(Episode::most_recent(&store, 0).unwrap().id(), 2);
        assert_eq!(Episode::most_recent(&store, 1).unwrap().id(), 1);
        assert!(Episode::most_recent(&store, 2).is_err());
    }
}
