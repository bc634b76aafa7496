use crate::phase_analysis::{SleepPhase, EPOCH_MULTIPLIER};
use crate::stage_detail::SleepStageDetail;
use log::debug;

/// The two phase sequences recorded for one sleep episode.
///
/// `base` holds one byte per 30 second epoch and `display` one byte per 5 minute epoch, both
/// oldest first. The lengths are nominally `base == display * 10`, but the store trims trailing
/// undefined epochs from `display` only and appears to write `display` in pairs, so readers
/// never assume the two agree.
///
/// Both sequences are only ever replaced together by building a new value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hypnogram {
    base: Vec<u8>,
    display: Vec<u8>,
}

impl Hypnogram {
    pub fn new(base: Vec<u8>, display: Vec<u8>) -> Self {
        Self { base, display }
    }

    pub fn base(&self) -> &[u8] {
        &self.base
    }

    pub fn display(&self) -> &[u8] {
        &self.display
    }

    pub fn is_empty(&self) -> bool {
        self.base.is_empty() && self.display.is_empty()
    }

    /// Number of 5 minute epochs the base sequence has fully covered.
    pub fn completed_long_epochs(&self) -> usize {
        self.base.len() / EPOCH_MULTIPLIER
    }

    /// Index of the most recent base epoch, -1 when there is none.
    pub fn base_max_index(&self) -> isize {
        self.base.len() as isize - 1
    }

    /// Index of the most recent completed display epoch, -1 when there is none.
    ///
    /// The last element of `display` is not necessarily the most recent one: the base
    /// sequence's count of completed long epochs wins unless `display` has been trimmed
    /// shorter than it.
    pub fn display_max_index(&self) -> isize {
        let completed = self.completed_long_epochs();
        if completed == 0 || self.display.is_empty() {
            return -1;
        }

        // display was trimmed of trailing undefined epochs, its last element is the newest
        if completed > self.display.len() {
            self.display.len() as isize - 1
        } else {
            completed as isize - 1
        }
    }

    /// Phase of a base epoch. Negative indexes count back from the most recent (-1).
    pub fn base_phase(&self, index: isize) -> SleepPhase {
        phase_at(&self.base, self.base_max_index(), index)
    }

    /// Phase of a display epoch. Negative indexes count back from the most recent
    /// completed epoch (-1), see [`Hypnogram::display_max_index`].
    pub fn display_phase(&self, index: isize) -> SleepPhase {
        phase_at(&self.display, self.display_max_index(), index)
    }

    /// The display epoch `epochs_back` before the newest one, with its ten base sub-epochs.
    ///
    /// When the base count of completed long epochs disagrees with the display length the
    /// newest display element is treated as a pair-write artifact and skipped.
    pub fn stage_detail(&self, epochs_back: usize) -> SleepStageDetail {
        let mut back = epochs_back;
        // the newest display element may be the first half of a pair write
        if self.completed_long_epochs() != self.display.len() {
            back += 1;
        }

        if self.display.len() <= back {
            debug!(
                "Not enough data: display hypnogram={}, epochs before most recent: {}",
                self.display.len(),
                back
            );
            return SleepStageDetail::empty();
        }

        let index = self.display.len() - back - 1;
        // base may be shorter than display * 10 while a night is being written
        let start = (index * EPOCH_MULTIPLIER).min(self.base.len());
        let end = ((index + 1) * EPOCH_MULTIPLIER).min(self.base.len());

        SleepStageDetail::new(self.display[index], &self.base[start..end], index)
    }
}

fn phase_at(sequence: &[u8], max_index: isize, index: isize) -> SleepPhase {
    let position = if index >= 0 {
        Some(index)
    } else {
        // -1 is the most recent epoch; far negative indexes fall off the front
        max_index.checked_add(index).and_then(|p| p.checked_add(1))
    };

    position
        .and_then(|position| usize::try_from(position).ok())
        .and_then(|position| sequence.get(position))
        .map(|&raw| SleepPhase::from_code(raw))
        .unwrap_or(SleepPhase::Unknown)
}
