use crate::alarm::AlarmSink;
use crate::audit::AuditLog;
use crate::cache::EpisodeCache;
use crate::episode::Episode;
use crate::phase_analysis::SleepPhase;
use crate::preferences::{AlarmSettings, PreferenceSource};
use crate::store::{SleepStore, StoreError, Subscription};
use crate::wake_logic::{WakeDecision, WakeVerdict};
use chrono::{DateTime, Local, TimeZone};
use log::{debug, error, info, warn};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Nothing evaluated; waiting for the headband to come back.
    HeadbandOff,
    Evaluated {
        verdict: WakeVerdict,
        alarm_sounded: bool,
    },
}

/// Drives the wake decision from timer ticks and store change notifications.
///
/// All evaluation happens on the task that owns the monitor, so the episode cache has a
/// single writer. Notifications only bump a watch channel version; however many arrive
/// before the task observes the channel, it sees one change.
pub struct SleepMonitor {
    store: Arc<dyn SleepStore>,
    preferences: Arc<dyn PreferenceSource>,
    audit: Arc<dyn AuditLog>,
    alarm: Arc<dyn AlarmSink>,
    cache: EpisodeCache,
    episode_changed: Arc<watch::Sender<()>>,
    headband_changed: Arc<watch::Sender<()>>,
    headband_subscription: Option<Subscription>,
    store_unavailable: bool,
    last_waking_from: Option<(i64, isize)>,
}

impl SleepMonitor {
    pub fn new(
        store: Arc<dyn SleepStore>,
        preferences: Arc<dyn PreferenceSource>,
        audit: Arc<dyn AuditLog>,
        alarm: Arc<dyn AlarmSink>,
    ) -> Self {
        Self {
            store,
            preferences,
            audit,
            alarm,
            cache: EpisodeCache::new(),
            episode_changed: Arc::new(watch::Sender::new(())),
            headband_changed: Arc::new(watch::Sender::new(())),
            headband_subscription: None,
            store_unavailable: false,
            last_waking_from: None,
        }
    }

    /// Whether the monitor is parked until the headband state changes.
    pub fn waiting_for_headband(&self) -> bool {
        self.headband_subscription.is_some()
    }

    fn note_store_error(&mut self, err: Option<&StoreError>) {
        match (err, self.store_unavailable) {
            (Some(e @ StoreError::Unavailable(_)), false) => {
                error!("{}", e);
                self.audit
                    .record(&format!("Unable to access sleep data, is the store running? ({})", e));
                self.store_unavailable = true;
            }
            (None, true) => {
                info!("Sleep data store is reachable again");
                self.store_unavailable = false;
            }
            _ => {}
        }
    }

    fn headband_on_head(&mut self) -> bool {
        match self.store.headband_on_head() {
            Ok(on_head) => {
                self.note_store_error(None);
                on_head
            }
            Err(e) => {
                debug!("Headband state unknown: {}", e);
                self.note_store_error(Some(&e));
                false
            }
        }
    }

    fn current_episode(&mut self) -> Arc<Episode> {
        let episode = self.cache.current(self.store.as_ref());
        let err = self.cache.store_error().cloned();
        self.note_store_error(err.as_ref());
        episode
    }

    /// Park until the headband state changes. Returns false if the headband turned out to be
    /// on after all.
    fn wait_for_headband(&mut self) -> bool {
        if self.waiting_for_headband() {
            return true;
        }

        let headband_changed = Arc::clone(&self.headband_changed);
        let subscription = self.store.subscribe_headband_changes(Box::new(move || {
            headband_changed.send_replace(());
        }));
        // a change between the first check and subscribing would never be reported
        if self.headband_on_head() {
            return false;
        }

        self.headband_subscription = Some(subscription);
        self.audit
            .record("Headband is off, check again when headband data changes.");
        true
    }

    /// The episode the last evaluation used, without asking the store.
    pub fn cached_episode(&self) -> Option<Arc<Episode>> {
        self.cache.cached()
    }

    /// One poll: check the headband, evaluate the wake decision and sound the alarm if due.
    pub fn poll_at<Tz: TimeZone>(&mut self, now: &DateTime<Tz>) -> PollOutcome {
        if !self.headband_on_head() && self.wait_for_headband() {
            return PollOutcome::HeadbandOff;
        }
        self.headband_subscription = None;

        let episode = self.current_episode();
        let decision = WakeDecision::new(AlarmSettings::resolve(self.preferences.as_ref()));
        let verdict = decision.should_wake_now(now, &episode);
        if verdict.is_noteworthy() {
            self.audit.record(&verdict.to_string());
        } else {
            debug!("{}", verdict);
        }

        let alarm_sounded = verdict.should_wake() && self.play_alarm(decision.settings().alarm_enabled);
        self.log_interesting(&episode);

        PollOutcome::Evaluated {
            verdict,
            alarm_sounded,
        }
    }

    /// Sound the alarm unless disabled. Returns whether it sounded.
    pub fn play_alarm(&self, enabled: bool) -> bool {
        if enabled {
            self.audit.record("Playing alarm.");
            self.alarm.trigger();
        } else {
            self.audit.record("Alarm would have triggered but is disabled.");
        }
        enabled
    }

    fn log_interesting(&mut self, episode: &Episode) {
        let hypnogram = episode.hypnogram();
        let current = hypnogram.display_phase(-1);
        let previous = hypnogram.display_phase(-2);

        if current == SleepPhase::Wake
            && previous != SleepPhase::Wake
            && previous != SleepPhase::Undefined
        {
            let key = (episode.id(), hypnogram.display_max_index());
            if self.last_waking_from != Some(key) {
                self.audit.record(&format!("Waking from {}", previous));
                self.last_waking_from = Some(key);
            }
        }

        let detail = hypnogram.stage_detail(0);
        if detail.contains_light_deep() {
            debug!("Phase detail contains light-deep: {}", detail);
        }
    }

    /// Refresh the current episode after the store reported a change.
    pub fn sleep_record_changed(&mut self) {
        match self.cache.refresh_current(self.store.as_ref()) {
            Ok(episode) => {
                self.note_store_error(None);
                self.audit.record(&format!("SleepRecord Change: {}", episode));
            }
            Err(StoreError::NotFound(what)) => {
                warn!("Sleep record change, but {} not found; keeping last data", what);
            }
            Err(e) => self.note_store_error(Some(&e)),
        }
    }

    /// Alarm status, current episode and the audit log, separated by blank lines.
    pub fn status_report<Tz: TimeZone>(&mut self, now: &DateTime<Tz>) -> String
    where
        Tz::Offset: fmt::Display,
    {
        let episode = self.current_episode();
        let decision = WakeDecision::new(AlarmSettings::resolve(self.preferences.as_ref()));
        let log_text = self.audit.read_text().unwrap_or_else(|e| {
            warn!("Could not read audit log: {:#}", e);
            String::new()
        });

        format!(
            "{}\n\n{}\n\n{}",
            decision.describe_alarm_status(now, &episode),
            episode,
            log_text
        )
    }

    /// Poll every `poll_every` and on every store change until `shutdown` completes.
    ///
    /// While the headband is off the timer is paused and only a headband change resumes
    /// polling.
    pub async fn run<F>(mut self, poll_every: Duration, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut episode_changed = self.episode_changed.subscribe();
        let mut headband_changed = self.headband_changed.subscribe();

        let sender = Arc::clone(&self.episode_changed);
        let episode_subscription = self.store.subscribe_episode_changes(Box::new(move || {
            sender.send_replace(());
        }));

        let mut ticker = tokio::time::interval(poll_every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        self.audit.record("Sleep monitor started.");
        loop {
            let waiting = self.waiting_for_headband();
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick(), if !waiting => {}
                // changed() marks every version sent so far as seen
                _ = episode_changed.changed() => {
                    self.sleep_record_changed();
                    if waiting {
                        continue;
                    }
                }
                _ = headband_changed.changed(), if waiting => {
                    if !self.headband_on_head() {
                        continue;
                    }
                    self.headband_subscription = None;
                    self.audit.record("Headband is on now.");
                    ticker.reset();
                }
            }

            self.poll_at(&Local::now());
        }

        episode_subscription.unsubscribe();
        self.headband_subscription = None;
        self.audit.record("Sleep monitor stopped.");
    }
}
