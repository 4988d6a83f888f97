use serde::Serialize;
use strum_macros::Display;

use crate::annealing::occupancy::Occupancy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SearchPhase {
    /// Equalise station load, success rate ignored.
    Balance,
    /// Trade success rate against load balance.
    Refine,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Score {
    pub success_rate: f64,
    pub load_std: f64,
    pub load_gap: f64,
    pub penalty: f64,
    pub value: f64,
}

/// Occupied share of each station's observable time.
pub fn utilization(busy: &[i64], observable: &[i64]) -> Vec<f64> {
    busy.iter()
        .zip(observable)
        .map(|(&b, &o)| if o > 0 { b as f64 / o as f64 } else { 0.0 })
        .collect()
}

pub fn evaluate(phase: SearchPhase, occupancy: &Occupancy<'_>, observable: &[i64]) -> Score {
    let total = occupancy.slots().len();
    let success_rate = if total == 0 {
        0.0
    } else {
        occupancy.assigned() as f64 / total as f64
    };

    let util = utilization(occupancy.station_busy(), observable);
    let load_std = if util.is_empty() {
        0.0
    } else {
        let mean = util.iter().sum::<f64>() / util.len() as f64;
        (util.iter().map(|u| (u - mean).powi(2)).sum::<f64>() / util.len() as f64).sqrt()
    };

    let observed: Vec<f64> = util
        .iter()
        .zip(observable)
        .filter(|(_, o)| **o > 0)
        .map(|(&u, _)| u)
        .collect();
    let load_gap = match (
        observed.iter().copied().reduce(f64::max),
        observed.iter().copied().reduce(f64::min),
    ) {
        (Some(max), Some(min)) => max - min,
        _ => 0.0,
    };

    let penalty = occupancy.penalty();
    let value = match phase {
        SearchPhase::Balance => -1000.0 * load_std - 500.0 * load_gap - penalty,
        SearchPhase::Refine => {
            100.0 * success_rate - 100.0 * load_std - 150.0 * load_gap - penalty
        }
    };

    Score {
        success_rate,
        load_std,
        load_gap,
        penalty,
        value,
    }
}
