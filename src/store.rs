use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("sleep data store unavailable: {0}")]
    Unavailable(String),
}

/// One sleep episode row as the store reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeRecord {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub start_time: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub end_time: DateTime<Utc>,
    pub score: i32,
    /// Raw end reason code, see [`crate::phase_analysis::EndReason`].
    pub end_reason: i64,
    /// 30 second units spent in any non-wake phase.
    pub total_sleep_units: i64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_on: DateTime<Utc>,
    #[serde(with = "hex")]
    pub base_hypnogram: Vec<u8>,
    #[serde(with = "hex")]
    pub display_hypnogram: Vec<u8>,
}

pub type ChangeCallback = Box<dyn Fn() + Send + Sync>;

/// Source of sleep episodes and headband state.
///
/// Queries are synchronous and expected to be cheap (local storage, no network).
pub trait SleepStore: Send + Sync {
    /// Id of the `skip`-th most recent episode by start time, 0 being the most recent.
    fn most_recent_episode_id(&self, skip: usize) -> Result<i64, StoreError>;

    fn episode(&self, id: i64) -> Result<EpisodeRecord, StoreError>;

    fn headband_on_head(&self) -> Result<bool, StoreError>;

    fn subscribe_episode_changes(&self, callback: ChangeCallback) -> Subscription;

    fn subscribe_headband_changes(&self, callback: ChangeCallback) -> Subscription;
}

type SharedCallback = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Slots {
    next_id: u64,
    callbacks: Vec<(u64, SharedCallback)>,
}

fn lock(slots: &Mutex<Slots>) -> MutexGuard<'_, Slots> {
    slots.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Change listeners registered with a store.
#[derive(Default)]
pub struct Subscribers {
    slots: Arc<Mutex<Slots>>,
}

impl Subscribers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, callback: ChangeCallback) -> Subscription {
        let mut slots = lock(&self.slots);
        let id = slots.next_id;
        slots.next_id += 1;
        slots.callbacks.push((id, Arc::from(callback)));

        Subscription {
            slots: Arc::downgrade(&self.slots),
            id,
        }
    }

    /// Call every listener once. Listeners run outside the lock so they may subscribe or
    /// unsubscribe themselves.
    pub fn notify(&self) {
        let callbacks: Vec<SharedCallback> = lock(&self.slots)
            .callbacks
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();

        for callback in callbacks {
            callback();
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.slots).callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handle for a registered listener. Dropping it unregisters the listener.
#[must_use = "dropping a subscription unregisters it"]
pub struct Subscription {
    slots: Weak<Mutex<Slots>>,
    id: u64,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(slots) = self.slots.upgrade() {
            lock(&slots).callbacks.retain(|(id, _)| *id != self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, ChangeCallback) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);
        (
            count,
            Box::new(move || {
                inner.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }

    #[test]
    fn notify_reaches_every_listener_once() {
        let subscribers = Subscribers::new();
        let (first, first_cb) = counter();
        let (second, second_cb) = counter();
        let _a = subscribers.subscribe(first_cb);
        let _b = subscribers.subscribe(second_cb);

        subscribers.notify();

        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_subscription_unregisters() {
        let subscribers = Subscribers::new();
        let (count, callback) = counter();
        let subscription = subscribers.subscribe(callback);
        assert_eq!(subscribers.len(), 1);

        subscription.unsubscribe();
        subscribers.notify();

        assert!(subscribers.is_empty());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn subscription_outliving_store_is_harmless() {
        let subscribers = Subscribers::new();
        let (_count, callback) = counter();
        let subscription = subscribers.subscribe(callback);
        drop(subscribers);
        drop(subscription);
    }

    #[test]
    fn record_json_uses_hex_and_millis() {
        let record = EpisodeRecord {
            start_time: DateTime::from_timestamp_millis(1_000).unwrap(),
            end_time: DateTime::from_timestamp_millis(2_000).unwrap(),
            score: 80,
            end_reason: 0,
            total_sleep_units: 12,
            updated_on: DateTime::from_timestamp_millis(2_000).unwrap(),
            base_hypnogram: vec![3, 4, 2],
            display_hypnogram: vec![3],
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["base_hypnogram"], "030402");
        assert_eq!(json["start_time"], 1_000);

        let parsed: EpisodeRecord = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, record);
    }
}
