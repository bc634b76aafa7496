use crate::phase_analysis::SleepPhase;
use std::fmt;

/// One 5 minute stage together with the ten 30 second stages it was derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SleepStageDetail {
    stage: SleepPhase,
    detail: Vec<SleepPhase>,
    index_in_episode: usize,
}

impl SleepStageDetail {
    pub fn new(stage: u8, detail: &[u8], index_in_episode: usize) -> Self {
        Self {
            stage: SleepPhase::from_code(stage),
            detail: detail.iter().map(|&raw| SleepPhase::from_code(raw)).collect(),
            index_in_episode,
        }
    }

    /// Placeholder returned when the episode does not hold enough data.
    pub fn empty() -> Self {
        Self::new(0, &[], 0)
    }

    pub fn stage(&self) -> SleepPhase {
        self.stage
    }

    pub fn detail(&self) -> &[SleepPhase] {
        &self.detail
    }

    /// Position of this stage in the episode's display hypnogram.
    pub fn index_in_episode(&self) -> usize {
        self.index_in_episode
    }

    pub fn contains_light_deep(&self) -> bool {
        self.detail.contains(&SleepPhase::LightDeep)
    }
}

impl fmt::Display for SleepStageDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let detail: Vec<&str> = self.detail.iter().map(|phase| phase.name()).collect();
        write!(f, "{} [{}]", self.stage, detail.join(", "))
    }
}
