//! Decides whether now is a good moment to sound the alarm.
//!
//! The alarm has a target time, either a fixed time of day or a number of hours after the
//! night started. During the wake window before the target, the alarm fires as soon as the
//! sleeper enters or leaves REM from light sleep. Once the target passes it fires
//! unconditionally, but only within a short grace period so that a missed poll does not
//! ring hours late.
//!
//! ```text
//!   too early        |  wake window (30 min)   | grace (10 min) | missed
//! -------------------+-------------------------+----------------+---------
//!                window start               target
//! ```

use crate::episode::Episode;
use crate::phase_analysis::SleepPhase;
use crate::preferences::{AlarmSettings, WakeMode};
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use log::warn;
use std::fmt;

/// How long before the target a phase transition may trigger the alarm.
pub const WAKE_WINDOW: Duration = Duration::minutes(30);
/// How long after the target a missed deadline still triggers the alarm.
pub const ALARM_GRACE: Duration = Duration::minutes(10);
/// Base epochs (one hour) an episode needs before a relative alarm time is trusted.
pub const MIN_BASE_EPOCHS_FOR_RELATIVE_ALARM: usize = 120;

const STATUS_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeVerdict {
    /// Target reached, within the grace period.
    EndOfWindow,
    EnteringRem,
    LeavingRem,
    /// Inside the wake window but no useful transition yet.
    Waiting(SleepPhase),
    TooEarly,
    /// Past the grace period. Never fires retroactively.
    Missed,
}

impl WakeVerdict {
    pub fn should_wake(self) -> bool {
        matches!(
            self,
            WakeVerdict::EndOfWindow | WakeVerdict::EnteringRem | WakeVerdict::LeavingRem
        )
    }

    /// Verdicts worth an audit log line; the others repeat on every poll.
    pub fn is_noteworthy(self) -> bool {
        !matches!(self, WakeVerdict::TooEarly | WakeVerdict::Missed)
    }
}

impl fmt::Display for WakeVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WakeVerdict::EndOfWindow => f.write_str("End of wake window hit."),
            WakeVerdict::EnteringRem => f.write_str("Waking as entering REM."),
            WakeVerdict::LeavingRem => f.write_str("Waking as leaving REM."),
            WakeVerdict::Waiting(phase) => {
                write!(f, "Within wake window.  Current Phase: {}", phase)
            }
            WakeVerdict::TooEarly => f.write_str("Outside of wake window."),
            WakeVerdict::Missed => f.write_str("Past the alarm grace period."),
        }
    }
}

/// Wake decision for one set of resolved alarm settings.
///
/// Holds no state between polls: every call is answered from `now`, the settings and the
/// episode it is given.
#[derive(Debug, Clone)]
pub struct WakeDecision {
    settings: AlarmSettings,
    wake_window: Duration,
    alarm_grace: Duration,
}

impl WakeDecision {
    pub fn new(settings: AlarmSettings) -> Self {
        Self {
            settings,
            wake_window: WAKE_WINDOW,
            alarm_grace: ALARM_GRACE,
        }
    }

    pub fn with_wake_window(mut self, wake_window: Duration) -> Self {
        self.wake_window = wake_window;
        self
    }

    pub fn with_alarm_grace(mut self, alarm_grace: Duration) -> Self {
        self.alarm_grace = alarm_grace;
        self
    }

    pub fn settings(&self) -> &AlarmSettings {
        &self.settings
    }

    /// End of the wake window in `now`'s time zone.
    ///
    /// A relative alarm on an episode shorter than an hour returns a date in the year 9999 so
    /// a fresh episode cannot trigger immediately.
    pub fn target_wake_time<Tz: TimeZone>(&self, now: &DateTime<Tz>, episode: &Episode) -> DateTime<Tz> {
        let tz = now.timezone();
        match self.settings.mode() {
            WakeMode::FixedClockTime => {
                let naive = now.date_naive().and_time(self.settings.fixed_time);
                tz.from_local_datetime(&naive)
                    .earliest()
                    // inside a DST gap the wall clock time does not exist; ring an hour later
                    .or_else(|| {
                        naive
                            .checked_add_signed(Duration::hours(1))
                            .and_then(|later| tz.from_local_datetime(&later).earliest())
                    })
                    .unwrap_or_else(|| far_future(&tz))
            }
            WakeMode::HoursAfterSleepStart => {
                if episode.base_epoch_count() <= MIN_BASE_EPOCHS_FOR_RELATIVE_ALARM {
                    return far_future(&tz);
                }
                let hours = self.settings.hours_after_start;
                Duration::try_hours(i64::from(hours))
                    .and_then(|offset| episode.start_time().checked_add_signed(offset))
                    .map(|target| target.with_timezone(&tz))
                    .unwrap_or_else(|| {
                        warn!("{} hours after sleep start is out of range, alarm will not fire", hours);
                        far_future(&tz)
                    })
            }
        }
    }

    pub fn should_wake_now<Tz: TimeZone>(&self, now: &DateTime<Tz>, episode: &Episode) -> WakeVerdict {
        let target = self.target_wake_time(now, episode);

        let past_target = *now > target;
        let past_grace = target
            .clone()
            .checked_add_signed(self.alarm_grace)
            .is_some_and(|grace_end| *now > grace_end);

        // past the target the phase no longer matters, only how late we are
        if past_target {
            return if past_grace {
                WakeVerdict::Missed
            } else {
                WakeVerdict::EndOfWindow
            };
        }

        let in_window = target
            .checked_sub_signed(self.wake_window)
            .is_some_and(|window_start| *now > window_start);
        if !in_window {
            return WakeVerdict::TooEarly;
        }

        // compare the two most recent completed 5 minute epochs
        let hypnogram = episode.hypnogram();
        let current = hypnogram.display_phase(-1);
        let previous = hypnogram.display_phase(-2);
        match (previous, current) {
            (SleepPhase::Light, SleepPhase::REM) => WakeVerdict::EnteringRem,
            (SleepPhase::REM, SleepPhase::Light) => WakeVerdict::LeavingRem,
            _ => WakeVerdict::Waiting(current),
        }
    }

    /// Human readable alarm target, for display only.
    pub fn describe_alarm_status<Tz: TimeZone>(&self, now: &DateTime<Tz>, episode: &Episode) -> String
    where
        Tz::Offset: fmt::Display,
    {
        let target = self.target_wake_time(now, episode);
        let target = target.format(STATUS_TIME_FORMAT);
        let status = match self.settings.mode() {
            WakeMode::FixedClockTime => format!("Alarm is set for {}", target),
            WakeMode::HoursAfterSleepStart => format!(
                "Alarm is set for {} hours after start of night ({})",
                self.settings.hours_after_start, target
            ),
        };

        if self.settings.alarm_enabled {
            status
        } else {
            format!("{} (sound disabled)", status)
        }
    }
}

fn far_future<Tz: TimeZone>(tz: &Tz) -> DateTime<Tz> {
    NaiveDate::from_ymd_opt(9999, 7, 27)
        .and_then(|date| date.and_hms_opt(7, 30, 0))
        .map(|naive| naive.and_utc())
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
        .with_timezone(tz)
}
