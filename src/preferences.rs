use chrono::{DateTime, Local, NaiveTime};
use log::warn;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};
use thiserror::Error;

pub const PREF_ALARM_ENABLED: &str = "alarm_enabled";
pub const PREF_ALARM_TIME: &str = "alarm_time";
pub const PREF_WAKE_AFTER_HOURS: &str = "wake_after_hours";

/// Key/value preference storage, read fresh on every evaluation.
pub trait PreferenceSource: Send + Sync {
    fn read(&self, key: &str) -> Option<String>;
}

#[derive(Debug, Error)]
pub enum PreferenceError {
    #[error("preference {key} has malformed value {value:?}")]
    Malformed { key: String, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeMode {
    /// Wake at a time of day, re-anchored to today.
    FixedClockTime,
    /// Wake a number of hours after the episode started.
    HoursAfterSleepStart,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmSettings {
    pub alarm_enabled: bool,
    pub fixed_time: NaiveTime,
    pub hours_after_start: u32,
}

impl Default for AlarmSettings {
    fn default() -> Self {
        Self {
            alarm_enabled: true,
            fixed_time: NaiveTime::MIN,
            hours_after_start: 0,
        }
    }
}

impl AlarmSettings {
    /// `wake_after_hours == 0` means a fixed clock time.
    pub fn mode(&self) -> WakeMode {
        if self.hours_after_start == 0 {
            WakeMode::FixedClockTime
        } else {
            WakeMode::HoursAfterSleepStart
        }
    }

    /// Resolve settings from preferences. Missing or malformed values use the defaults.
    pub fn resolve(prefs: &dyn PreferenceSource) -> Self {
        let defaults = Self::default();
        Self {
            alarm_enabled: read_or(prefs, PREF_ALARM_ENABLED, defaults.alarm_enabled, parse_bool),
            fixed_time: read_or(prefs, PREF_ALARM_TIME, defaults.fixed_time, parse_alarm_time),
            hours_after_start: read_or(
                prefs,
                PREF_WAKE_AFTER_HOURS,
                defaults.hours_after_start,
                |raw| raw.trim().parse().ok(),
            ),
        }
    }
}

fn read_or<T>(
    prefs: &dyn PreferenceSource,
    key: &str,
    default: T,
    parse: impl Fn(&str) -> Option<T>,
) -> T {
    let Some(raw) = prefs.read(key) else {
        return default;
    };

    match parse(&raw).ok_or_else(|| PreferenceError::Malformed {
        key: key.to_string(),
        value: raw,
    }) {
        Ok(value) => value,
        Err(e) => {
            warn!("{}, using default", e);
            default
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// `HH:MM`, `HH:MM:SS`, or epoch milliseconds whose local time of day is used.
fn parse_alarm_time(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    if let Ok(time) = NaiveTime::parse_from_str(raw, "%H:%M") {
        return Some(time);
    }
    if let Ok(time) = NaiveTime::parse_from_str(raw, "%H:%M:%S") {
        return Some(time);
    }

    // older settings stored the alarm as a full timestamp
    let millis: i64 = raw.parse().ok()?;
    DateTime::from_timestamp_millis(millis).map(|t| t.with_timezone(&Local).time())
}

/// Preferences held in memory.
#[derive(Debug, Default)]
pub struct MemoryPreferences {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: &str, value: impl Into<String>) {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.into());
    }

    pub fn with(self, key: &str, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }
}

impl PreferenceSource for MemoryPreferences {
    fn read(&self, key: &str) -> Option<String> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }
}

/// Preferences stored as a flat JSON object of strings, re-read on every lookup so edits
/// apply on the next poll.
#[derive(Debug, Clone)]
pub struct JsonPreferences {
    path: PathBuf,
}

impl JsonPreferences {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn load(&self) -> Option<HashMap<String, serde_json::Value>> {
        let file = File::open(&self.path).ok()?;
        match serde_json::from_reader(BufReader::new(file)) {
            Ok(values) => Some(values),
            Err(e) => {
                warn!("Ignoring unreadable preferences {}: {}", self.path.display(), e);
                None
            }
        }
    }
}

impl PreferenceSource for JsonPreferences {
    fn read(&self, key: &str) -> Option<String> {
        let value = self.load()?.remove(key)?;
        match value {
            serde_json::Value::String(s) => Some(s),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}
