use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// Smart alarm that wakes you during light sleep near your alarm time
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// JSON snapshot of sleep episodes and headband state
    #[arg(long, env = "SMARTWAKE_STORE", default_value = "sleep_store.json")]
    pub store: PathBuf,

    /// JSON object of alarm preferences (alarm_enabled, alarm_time, wake_after_hours)
    #[arg(long, env = "SMARTWAKE_PREFERENCES", default_value = "preferences.json")]
    pub preferences: PathBuf,

    /// Audit log file
    #[arg(long, env = "SMARTWAKE_LOG", default_value = "SleepMonitorLog")]
    pub log_file: PathBuf,

    /// Seconds between polls while the headband is on
    #[arg(long, env = "SMARTWAKE_POLL_SECONDS", default_value = "30")]
    pub poll_seconds: u64,

    /// Seconds between checks of the store file for changes
    #[arg(long, env = "SMARTWAKE_WATCH_SECONDS", default_value = "5")]
    pub watch_seconds: u64,

    #[command(subcommand)]
    pub command: Command,
}

impl Args {
    pub fn poll_every(&self) -> Duration {
        Duration::from_secs(self.poll_seconds.max(1))
    }

    pub fn watch_every(&self) -> Duration {
        Duration::from_secs(self.watch_seconds.max(1))
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Watch the headband and sound the alarm at a good moment
    Monitor,
    /// Print alarm status, current night and the audit log
    Status,
    /// Describe a recorded night
    Night {
        /// How many nights before the most recent one
        #[arg(long, default_value = "0")]
        skip: usize,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the audit log
    Log,
    /// Empty the audit log
    ClearLog,
    /// Sound the alarm once to test it
    PlayAlarm,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = Args::parse_from(["smartwake", "status"]);
        assert_eq!(args.command, Command::Status);
        assert_eq!(args.poll_every(), Duration::from_secs(30));
        assert_eq!(args.store, PathBuf::from("sleep_store.json"));
    }

    #[test]
    fn night_options() {
        let args = Args::parse_from(["smartwake", "--poll-seconds", "0", "night", "--skip", "2", "--json"]);
        assert_eq!(args.command, Command::Night { skip: 2, json: true });
        assert_eq!(args.poll_every(), Duration::from_secs(1));
    }
}
