use chrono::Duration;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Length of one base (30 second) epoch.
pub const SHORT_EPOCH: Duration = Duration::seconds(30);
/// Length of one display (5 minute) epoch.
pub const LONG_EPOCH: Duration = Duration::minutes(5);
/// Base epochs per display epoch.
pub const EPOCH_MULTIPLIER: usize = 10;

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Serialize)]
pub enum SleepPhase {
    Undefined,
    Wake,
    REM,
    Light,
    Deep,
    /// Particularly deep stage of light sleep. Only appears in the 30 second data.
    LightDeep,
    Unknown,
}

// Raw headband codes. 5 is the upstream "max phases" marker, not a phase.
const PHASE_CODES: [(u8, SleepPhase); 6] = [
    (0, SleepPhase::Undefined),
    (1, SleepPhase::Wake),
    (2, SleepPhase::REM),
    (3, SleepPhase::Light),
    (4, SleepPhase::Deep),
    (6, SleepPhase::LightDeep),
];

impl SleepPhase {
    /// Decode a raw hypnogram byte. Unmapped bytes decode to `Unknown`.
    pub fn from_code(raw: u8) -> Self {
        PHASE_CODES
            .iter()
            .find(|(code, _)| *code == raw)
            .map(|(_, phase)| *phase)
            .unwrap_or(SleepPhase::Unknown)
    }

    /// Canonical raw code, -1 for `Unknown`.
    pub fn code(self) -> i32 {
        PHASE_CODES
            .iter()
            .find(|(_, phase)| *phase == self)
            .map(|(code, _)| i32::from(*code))
            .unwrap_or(-1)
    }

    pub fn name(self) -> &'static str {
        match self {
            SleepPhase::Undefined => "Undefined",
            SleepPhase::Wake => "Wake",
            SleepPhase::REM => "REM",
            SleepPhase::Light => "Light",
            SleepPhase::Deep => "Deep",
            SleepPhase::LightDeep => "Deep Stage of Light",
            SleepPhase::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for SleepPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Why a sleep episode stopped recording.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Serialize)]
pub enum EndReason {
    Complete,
    Active,
    BatteryDied,
    Disconnected,
    ServiceKilled,
    Unknown,
}

const END_REASON_CODES: [(i64, EndReason); 5] = [
    (0, EndReason::Complete),
    (1, EndReason::Active),
    (2, EndReason::BatteryDied),
    (3, EndReason::Disconnected),
    (4, EndReason::ServiceKilled),
];

impl EndReason {
    pub fn from_code(raw: i64) -> Self {
        END_REASON_CODES
            .iter()
            .find(|(code, _)| *code == raw)
            .map(|(_, reason)| *reason)
            .unwrap_or(EndReason::Unknown)
    }

    pub fn code(self) -> i64 {
        END_REASON_CODES
            .iter()
            .find(|(_, reason)| *reason == self)
            .map(|(code, _)| *code)
            .unwrap_or(-1)
    }

    pub fn name(self) -> &'static str {
        match self {
            EndReason::Complete => "Complete",
            EndReason::Active => "In Progress",
            EndReason::BatteryDied => "Battery Died",
            EndReason::Disconnected => "Headband Disconnected",
            EndReason::ServiceKilled => "Service Killed",
            EndReason::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Total minutes spent in each phase of a sequence of display epochs.
pub fn summarize_sleep_phases(display: &[u8]) -> BTreeMap<SleepPhase, i64> {
    let mut total_minutes = BTreeMap::new();
    for &raw in display {
        *total_minutes.entry(SleepPhase::from_code(raw)).or_insert(0) += LONG_EPOCH.num_minutes();
    }
    total_minutes
}
