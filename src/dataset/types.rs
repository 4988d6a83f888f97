use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::timing::Timestamp;

/// Mission phase of a pass. Climb tasks use a fixed slice of the window,
/// operation tasks run to the end of visibility.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Phase {
    #[serde(alias = "Climb", alias = "CLIMB")]
    Climb,
    #[serde(alias = "Operation", alias = "OPERATION")]
    Operation,
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "climb" => Ok(Phase::Climb),
            "operation" | "op" => Ok(Phase::Operation),
            other => Err(format!("unknown phase '{other}'")),
        }
    }
}

/// Identity of a pass across all stations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PassKey {
    pub satellite: String,
    pub lap: u32,
    pub phase: Phase,
}

impl fmt::Display for PassKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.satellite, self.lap, self.phase)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StationId(pub usize);

impl StationId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for StationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "station#{}", self.0)
    }
}

/// Position of a pass in first-appearance order of the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PassId(pub usize);

impl PassId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for PassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pass#{}", self.0)
    }
}

/// One raw visibility record as read from an antenna's record set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRecord {
    pub satellite: String,
    pub lap: u32,
    pub phase: Phase,
    pub start: Timestamp,
    pub end: Timestamp,
}

impl ObservationRecord {
    pub fn key(&self) -> PassKey {
        PassKey {
            satellite: self.satellite.clone(),
            lap: self.lap,
            phase: self.phase,
        }
    }

    pub fn duration(&self) -> i64 {
        self.end - self.start
    }
}

/// Raw input of one station: one record set per antenna.
#[derive(Debug, Clone, PartialEq)]
pub struct StationData {
    pub name: String,
    pub antenna_count: usize,
    pub band: Option<String>,
    pub record_sets: Vec<Vec<ObservationRecord>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub stations: Vec<StationData>,
}

/// Per-station settings that take precedence over what the input files imply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StationOverride {
    #[serde(default)]
    pub antennas: Option<usize>,
    #[serde(default)]
    pub band: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibilityWindow {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl VisibilityWindow {
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> i64 {
        self.end - self.start
    }

    pub fn contains(&self, start: Timestamp, end: Timestamp) -> bool {
        self.start <= start && end <= self.end
    }
}

/// A pass with its collapsed visibility window at every station.
#[derive(Debug, Clone, PartialEq)]
pub struct Pass {
    pub id: PassId,
    pub key: PassKey,
    /// Indexed by station; `None` where the pass has no usable window.
    pub windows: Vec<Option<VisibilityWindow>>,
}

impl Pass {
    pub fn window(&self, station: StationId) -> Option<&VisibilityWindow> {
        self.windows.get(station.index()).and_then(|w| w.as_ref())
    }

    pub fn candidate_stations(&self) -> impl Iterator<Item = StationId> + '_ {
        self.windows
            .iter()
            .enumerate()
            .filter(|(_, w)| w.is_some())
            .map(|(idx, _)| StationId(idx))
    }

    pub fn candidate_count(&self) -> usize {
        self.windows.iter().filter(|w| w.is_some()).count()
    }

    pub fn earliest_start(&self) -> Option<Timestamp> {
        self.windows.iter().flatten().map(|w| w.start).min()
    }

}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationInfo {
    pub id: StationId,
    pub name: String,
    pub antenna_count: usize,
    pub band: Option<String>,
}

/// Passes whose earliest visible start coincides, in ascending `PassId` order.
#[derive(Debug, Clone, PartialEq)]
pub struct EventBatch {
    pub time: Timestamp,
    pub passes: Vec<PassId>,
}

/// A raw record dropped for being shorter than the minimum task duration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShortRecord {
    pub pass: PassId,
    pub station: StationId,
    pub start: Timestamp,
    pub end: Timestamp,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BuildStats {
    pub total_records: usize,
    pub short_records: usize,
    pub merged_intervals: usize,
    pub dropped_windows: usize,
}

/// The immutable input of a scheduling run.
#[derive(Debug, Clone, PartialEq)]
pub struct Availability {
    pub stations: Vec<StationInfo>,
    pub passes: Vec<Pass>,
    pub timeline: Vec<EventBatch>,
    pub unschedulable: Vec<PassId>,
    pub short_records: Vec<ShortRecord>,
    pub stats: BuildStats,
}

impl Availability {
    pub fn pass(&self, id: PassId) -> &Pass {
        &self.passes[id.index()]
    }

    pub fn station(&self, id: StationId) -> &StationInfo {
        &self.stations[id.index()]
    }

    /// Pass ids by key.
    pub fn pass_index(&self) -> HashMap<&PassKey, PassId> {
        self.passes.iter().map(|p| (&p.key, p.id)).collect()
    }

    /// Stations by name.
    pub fn station_index(&self) -> HashMap<&str, &StationInfo> {
        self.stations.iter().map(|s| (s.name.as_str(), s)).collect()
    }

    /// Passes in processing order.
    pub fn ordered_passes(&self) -> impl Iterator<Item = PassId> + '_ {
        self.timeline.iter().flat_map(|b| b.passes.iter().copied())
    }

    /// Total visible seconds per station, summed over all pass windows.
    pub fn observable_seconds(&self) -> Vec<i64> {
        let mut totals = vec![0; self.stations.len()];
        for pass in &self.passes {
            for (idx, window) in pass.windows.iter().enumerate() {
                if let Some(w) = window {
                    totals[idx] += w.duration();
                }
            }
        }
        totals
    }
}
