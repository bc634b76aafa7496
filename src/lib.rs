pub mod alarm;
pub mod audit;
pub mod cache;
pub mod config;
pub mod episode;
pub mod file_store;
pub mod hypnogram;
pub mod memory_store;
pub mod monitor;
pub mod output;
pub mod phase_analysis;
pub mod preferences;
pub mod stage_detail;
pub mod store;
pub mod wake_logic;

pub use cache::EpisodeCache;
pub use episode::Episode;
pub use hypnogram::Hypnogram;
pub use monitor::{PollOutcome, SleepMonitor};
pub use phase_analysis::{EndReason, SleepPhase};
pub use stage_detail::SleepStageDetail;
pub use store::{EpisodeRecord, SleepStore, StoreError, Subscription};
pub use wake_logic::{WakeDecision, WakeVerdict};
