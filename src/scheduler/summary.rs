use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::dataset::{Availability, Phase};
use crate::scheduler::plan::{Allocation, FailureKind, Plan};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReallocationCounters {
    pub attempts: usize,
    pub successes: usize,
    pub search_nodes: usize,
    /// Assignments replaced by successful reallocations.
    pub rewritten: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PhaseSummary {
    pub passes: usize,
    pub assigned: usize,
    pub band_matched: usize,
    pub success_rate: f64,
    pub band_match_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationSummary {
    pub name: String,
    pub antennas: usize,
    pub tasks: usize,
    pub busy_seconds: i64,
}

/// Outcome counts of a plan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub passes: usize,
    pub assigned: usize,
    pub unschedulable: usize,
    pub no_alternative: usize,
    pub reallocation_exhausted: usize,
    pub not_attempted: usize,
    pub unresolved: usize,
    /// Assigned share of all passes.
    pub success_rate: f64,
    /// Assigned share of the passes that had any chance: unschedulable
    /// passes and single-combination failures are left out.
    pub feasible_success_rate: f64,
    pub climb: PhaseSummary,
    pub operation: PhaseSummary,
    pub reallocation: ReallocationCounters,
    pub stations: Vec<StationSummary>,
    pub elapsed_ms: u64,
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

impl RunSummary {
    pub fn collect(
        availability: &Availability,
        plan: &Plan,
        reallocation: ReallocationCounters,
        elapsed: Duration,
    ) -> Self {
        let mut summary = Self {
            passes: plan.len(),
            assigned: 0,
            unschedulable: 0,
            no_alternative: 0,
            reallocation_exhausted: 0,
            not_attempted: 0,
            unresolved: 0,
            success_rate: 0.0,
            feasible_success_rate: 0.0,
            climb: PhaseSummary::default(),
            operation: PhaseSummary::default(),
            reallocation,
            stations: availability
                .stations
                .iter()
                .map(|s| StationSummary {
                    name: s.name.clone(),
                    antennas: s.antenna_count,
                    tasks: 0,
                    busy_seconds: 0,
                })
                .collect(),
            elapsed_ms: elapsed.as_millis() as u64,
        };

        for (id, allocation) in plan.iter() {
            let phase = match availability.pass(id).key.phase {
                Phase::Climb => &mut summary.climb,
                Phase::Operation => &mut summary.operation,
            };
            phase.passes += 1;

            match allocation {
                Allocation::Assigned(a) => {
                    summary.assigned += 1;
                    phase.assigned += 1;
                    if a.band_matched {
                        phase.band_matched += 1;
                    }
                    let station = &mut summary.stations[a.station.index()];
                    station.tasks += 1;
                    station.busy_seconds += a.duration();
                }
                Allocation::Unschedulable => summary.unschedulable += 1,
                Allocation::Unresolved => summary.unresolved += 1,
                Allocation::Failed { reason } => match reason {
                    FailureKind::NoAlternative => summary.no_alternative += 1,
                    FailureKind::ReallocationExhausted => summary.reallocation_exhausted += 1,
                    FailureKind::NotAttempted => summary.not_attempted += 1,
                },
            }
        }

        for phase in [&mut summary.climb, &mut summary.operation] {
            phase.success_rate = ratio(phase.assigned, phase.passes);
            phase.band_match_rate = ratio(phase.band_matched, phase.assigned);
        }
        summary.success_rate = ratio(summary.assigned, summary.passes);
        summary.feasible_success_rate = ratio(
            summary.assigned,
            summary.passes - summary.unschedulable - summary.no_alternative,
        );
        summary
    }

    pub fn failed(&self) -> usize {
        self.no_alternative + self.reallocation_exhausted + self.not_attempted
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Assigned {}/{} passes ({:.1}%, {:.1}% of feasible)",
            self.assigned,
            self.passes,
            self.success_rate * 100.0,
            self.feasible_success_rate * 100.0
        )?;
        writeln!(
            f,
            "  climb:     {}/{} ({:.1}%)",
            self.climb.assigned,
            self.climb.passes,
            self.climb.success_rate * 100.0
        )?;
        writeln!(
            f,
            "  operation: {}/{} ({:.1}%)",
            self.operation.assigned,
            self.operation.passes,
            self.operation.success_rate * 100.0
        )?;
        writeln!(
            f,
            "Unschedulable: {}, failed: {} (no alternative {}, exhausted {}, not attempted {})",
            self.unschedulable,
            self.failed(),
            self.no_alternative,
            self.reallocation_exhausted,
            self.not_attempted
        )?;
        writeln!(
            f,
            "Reallocation: {}/{} resolved, {} assignments rewritten",
            self.reallocation.successes, self.reallocation.attempts, self.reallocation.rewritten
        )?;
        for s in &self.stations {
            writeln!(
                f,
                "  {:<12} antennas={:<3} tasks={:<5} busy={}s",
                s.name, s.antennas, s.tasks, s.busy_seconds
            )?;
        }
        Ok(())
    }
}
