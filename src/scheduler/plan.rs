use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::dataset::{Availability, PassId, PassKey, Phase, StationId, VisibilityWindow};
use crate::scheduler::error::SchedulerError;
use crate::scheduler::state::AntennaId;
use crate::scheduler::summary::{ReallocationCounters, RunSummary};
use crate::timing::Timestamp;

/// Where a committed task sits inside its visibility window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WindowFit {
    /// Task covers the whole window.
    Full,
    /// Task starts with the window and ends early.
    HeadAligned,
    /// Task starts late and runs to the end of the window.
    TailAligned,
    /// Task starts late and ends early.
    Inner,
}

impl WindowFit {
    pub fn classify(window: &VisibilityWindow, start: Timestamp, end: Timestamp) -> Self {
        match (start == window.start, end == window.end) {
            (true, true) => WindowFit::Full,
            (true, false) => WindowFit::HeadAligned,
            (false, true) => WindowFit::TailAligned,
            (false, false) => WindowFit::Inner,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub pass: PassId,
    pub station: StationId,
    pub antenna: AntennaId,
    pub start: Timestamp,
    pub end: Timestamp,
    pub fit: WindowFit,
    pub band_matched: bool,
}

impl Assignment {
    pub fn duration(&self) -> i64 {
        self.end - self.start
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailureKind {
    /// Only one station combination existed, and it had already failed.
    NoAlternative,
    /// Every combination of the reallocation window failed.
    ReallocationExhausted,
    /// Greedy placement failed and reallocation was disabled.
    NotAttempted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Allocation {
    Assigned(Assignment),
    Unschedulable,
    Unresolved,
    Failed { reason: FailureKind },
}

impl Allocation {
    pub fn assignment(&self) -> Option<&Assignment> {
        match self {
            Allocation::Assigned(a) => Some(a),
            _ => None,
        }
    }
}

/// One allocation per pass, indexed by `PassId`.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    allocations: Vec<Allocation>,
}

impl Plan {
    /// A plan with every pass unresolved except those no station can see.
    pub fn for_availability(availability: &Availability) -> Self {
        let mut allocations = vec![Allocation::Unresolved; availability.passes.len()];
        for id in &availability.unschedulable {
            allocations[id.index()] = Allocation::Unschedulable;
        }
        Self { allocations }
    }

    pub fn from_allocations(allocations: Vec<Allocation>) -> Self {
        Self { allocations }
    }

    pub fn len(&self) -> usize {
        self.allocations.len()
    }

    pub fn get(&self, pass: PassId) -> &Allocation {
        &self.allocations[pass.index()]
    }

    pub fn set(&mut self, pass: PassId, allocation: Allocation) {
        self.allocations[pass.index()] = allocation;
    }

    pub fn assignment(&self, pass: PassId) -> Option<&Assignment> {
        self.get(pass).assignment()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PassId, &Allocation)> {
        self.allocations
            .iter()
            .enumerate()
            .map(|(idx, a)| (PassId(idx), a))
    }

    pub fn assignments(&self) -> impl Iterator<Item = &Assignment> {
        self.allocations.iter().filter_map(Allocation::assignment)
    }

    pub fn assigned_count(&self) -> usize {
        self.assignments().count()
    }

    /// Assignments by start time, ties by pass id.
    pub fn sorted_by_start(&self) -> Vec<&Assignment> {
        let mut sorted: Vec<&Assignment> = self.assignments().collect();
        sorted.sort_by_key(|a| (a.start, a.pass));
        sorted
    }

    /// Assignments grouped per antenna, each lane sorted by start.
    pub fn lanes(&self) -> BTreeMap<(StationId, AntennaId), Vec<&Assignment>> {
        let mut lanes: BTreeMap<(StationId, AntennaId), Vec<&Assignment>> = BTreeMap::new();
        for assignment in self.sorted_by_start() {
            lanes
                .entry((assignment.station, assignment.antenna))
                .or_default()
                .push(assignment);
        }
        lanes
    }

    /// Status counts and rates of this plan, without run counters.
    pub fn summary(&self, availability: &Availability) -> RunSummary {
        RunSummary::collect(
            availability,
            self,
            ReallocationCounters::default(),
            Duration::ZERO,
        )
    }

    pub fn to_file(&self, availability: &Availability) -> PlanFile {
        let entries = self
            .iter()
            .map(|(id, allocation)| {
                let pass = availability.pass(id);
                let assigned = allocation.assignment();
                PlanEntry {
                    pass: id,
                    satellite: pass.key.satellite.clone(),
                    lap: pass.key.lap,
                    phase: pass.key.phase,
                    station: assigned.map(|a| availability.station(a.station).name.clone()),
                    allocation: allocation.clone(),
                }
            })
            .collect();
        PlanFile {
            passes: self.len(),
            assigned: self.assigned_count(),
            entries,
        }
    }

    /// Rebuilds a plan written by [`Plan::to_file`] against `availability`.
    /// Passes and stations are matched by key and name; passes missing from
    /// the file stay unresolved.
    pub fn from_file(file: &PlanFile, availability: &Availability) -> Result<Self, SchedulerError> {
        let passes = availability.pass_index();
        let stations = availability.station_index();
        let mut plan = Plan::for_availability(availability);
        for entry in &file.entries {
            let key = PassKey {
                satellite: entry.satellite.clone(),
                lap: entry.lap,
                phase: entry.phase,
            };
            let pass = *passes
                .get(&key)
                .ok_or_else(|| SchedulerError::PlanMismatch(format!("unknown pass {}", key)))?;
            let allocation = match (&entry.allocation, &entry.station) {
                (Allocation::Assigned(assignment), Some(name)) => {
                    let station = *stations.get(name.as_str()).ok_or_else(|| {
                        SchedulerError::PlanMismatch(format!("unknown station {}", name))
                    })?;
                    if assignment.antenna.index() >= station.antenna_count {
                        return Err(SchedulerError::PlanMismatch(format!(
                            "{}: antenna {} not present at {}",
                            key, assignment.antenna, name
                        )));
                    }
                    Allocation::Assigned(Assignment {
                        pass,
                        station: station.id,
                        ..assignment.clone()
                    })
                }
                (Allocation::Assigned(_), None) => {
                    return Err(SchedulerError::PlanMismatch(format!(
                        "{}: assigned without a station",
                        key
                    )))
                }
                (other, _) => other.clone(),
            };
            plan.set(pass, allocation);
        }
        Ok(plan)
    }
}

/// Serialized form of a plan, with pass keys and station names spelled out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanFile {
    pub passes: usize,
    pub assigned: usize,
    pub entries: Vec<PlanEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanEntry {
    pub pass: PassId,
    pub satellite: String,
    pub lap: u32,
    pub phase: Phase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub station: Option<String>,
    pub allocation: Allocation,
}
