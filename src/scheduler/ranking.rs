use std::cmp::Ordering;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::dataset::StationId;
use crate::scheduler::conflict::{ScoreWeights, StationAvailability};
use crate::scheduler::state::SchedulerState;

/// Station ranking heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum RankingMethod {
    /// Earliest visible start at the station.
    #[serde(alias = "earliest_start")]
    A,
    /// Highest share of available antennas.
    #[serde(alias = "availability")]
    B,
    /// Lowest station load.
    #[serde(alias = "load")]
    C,
}

impl FromStr for RankingMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "a" | "earliest_start" => Ok(RankingMethod::A),
            "b" | "availability" => Ok(RankingMethod::B),
            "c" | "load" => Ok(RankingMethod::C),
            other => Err(format!("unknown ranking method '{other}' (expected A, B or C)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StationCandidate {
    pub availability: StationAvailability,
    pub load_score: f64,
    pub band_matched: bool,
}

impl StationCandidate {
    pub fn station(&self) -> StationId {
        self.availability.station
    }
}

/// `w_task * count / max_count + w_time * busy / max_busy` for every
/// station, maxima taken over all stations.
pub fn station_load_scores(state: &SchedulerState, weights: ScoreWeights) -> Vec<f64> {
    let counts: Vec<f64> = state
        .stations()
        .iter()
        .map(|s| s.task_count() as f64)
        .collect();
    let busy: Vec<f64> = state
        .stations()
        .iter()
        .map(|s| s.busy_seconds() as f64)
        .collect();
    let max_count = counts.iter().copied().fold(0.0, f64::max);
    let max_busy = busy.iter().copied().fold(0.0, f64::max);

    counts
        .iter()
        .zip(&busy)
        .map(|(&count, &busy)| {
            let count = if max_count > 0.0 { count / max_count } else { 0.0 };
            let busy = if max_busy > 0.0 { busy / max_busy } else { 0.0 };
            weights.weight_task * count + weights.weight_time * busy
        })
        .collect()
}

/// Order candidates by `method`, ties by station id, then move stations of
/// the preferred band to the front keeping their relative order.
pub fn rank(method: RankingMethod, candidates: &mut [StationCandidate]) {
    candidates.sort_by(|a, b| {
        let primary = match method {
            RankingMethod::A => a
                .availability
                .window
                .start
                .cmp(&b.availability.window.start),
            RankingMethod::B => b
                .availability
                .availability_ratio()
                .partial_cmp(&a.availability.availability_ratio())
                .unwrap_or(Ordering::Equal),
            RankingMethod::C => a
                .load_score
                .partial_cmp(&b.load_score)
                .unwrap_or(Ordering::Equal),
        };
        primary.then_with(|| a.station().cmp(&b.station()))
    });
    candidates.sort_by_key(|c| !c.band_matched);
}
