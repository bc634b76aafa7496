use crate::episode::Episode;
use crate::phase_analysis::{summarize_sleep_phases, EndReason, SleepPhase};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Machine readable view of one episode.
#[derive(Debug, Serialize)]
pub struct NightSummary {
    pub episode_id: i64,
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub score: i32,
    pub end_reason: EndReason,
    pub sleep_minutes: i64,
    pub base_epochs: usize,
    pub display_epochs: usize,
    pub current_phase: SleepPhase,
    pub previous_phase: SleepPhase,
    pub minutes_by_phase: BTreeMap<SleepPhase, i64>,
}

impl NightSummary {
    pub fn from_episode(episode: &Episode) -> Self {
        let hypnogram = episode.hypnogram();
        Self {
            episode_id: episode.id(),
            description: episode.to_string(),
            start_time: episode.start_time(),
            end_time: episode.end_time(),
            score: episode.score(),
            end_reason: episode.end_reason(),
            sleep_minutes: episode.sleep_minutes(),
            base_epochs: hypnogram.base().len(),
            display_epochs: hypnogram.display().len(),
            current_phase: hypnogram.display_phase(-1),
            previous_phase: hypnogram.display_phase(-2),
            minutes_by_phase: summarize_sleep_phases(hypnogram.display()),
        }
    }
}

pub fn render_night(episode: &Episode, json: bool) -> Result<String> {
    if json {
        return Ok(serde_json::to_string_pretty(&NightSummary::from_episode(episode))?);
    }

    let mut text = format!("Episode {}: {}\n", episode.id(), episode);
    let totals = summarize_sleep_phases(episode.hypnogram().display());
    if !totals.is_empty() {
        text.push_str("\nTotal Time in Each Phase:\n");
        text.push_str("------------------------\n");
        for (phase, minutes) in totals {
            text.push_str(&format!("{}: {}h {}min\n", phase, minutes / 60, minutes % 60));
        }
    }
    Ok(text)
}
