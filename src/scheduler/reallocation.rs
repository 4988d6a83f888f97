use crate::config::ReallocationConfig;
use crate::dataset::{Availability, PassId};
use crate::scheduler::greedy::{Ledger, Placer};
use crate::scheduler::plan::{Allocation, Assignment, FailureKind};
use crate::scheduler::state::{JournalEntry, SchedulerState};
use crate::timing::REALLOCATION_HORIZON;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveStats {
    pub nodes: usize,
    pub rewritten: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveFailure {
    pub reason: FailureKind,
    pub nodes: usize,
}

/// Re-places a failing pass together with its recent predecessors.
#[derive(Debug, Clone)]
pub struct Reallocator {
    /// `None` walks back to the first pass outside the horizon.
    max_window: Option<usize>,
    max_nodes: usize,
}

struct Scratch {
    state: SchedulerState,
    entries: Vec<JournalEntry>,
    placed: Vec<Assignment>,
    nodes: usize,
}

impl Reallocator {
    pub fn new(config: &ReallocationConfig) -> Self {
        Self {
            max_window: (config.max_window > 0).then(|| config.max_window.max(2)),
            max_nodes: config.max_nodes,
        }
    }

    /// Try to make room for the pass processed at `step`. On success the
    /// ledger holds the new placements; on failure it is unchanged.
    pub fn resolve(
        &self,
        placer: &Placer<'_>,
        ledger: &mut Ledger,
        step: usize,
    ) -> Result<ResolveStats, ResolveFailure> {
        let availability = placer.availability();
        let window = self.window(availability, ledger, step);

        if combinations(availability, ledger, &window) <= 1 {
            return Err(ResolveFailure {
                reason: FailureKind::NoAlternative,
                nodes: 0,
            });
        }

        let mut nodes = 0;
        for len in 2..=window.len() {
            let suffix = &window[window.len() - len..];
            if combinations(availability, ledger, suffix) <= 1 {
                continue;
            }
            let first_step = suffix[0];
            let mut scratch = Scratch {
                state: ledger.state.clone(),
                entries: Vec::new(),
                placed: Vec::new(),
                nodes,
            };
            ledger.journal.rewind(&mut scratch.state, first_step);

            let found = self.search(placer, &ledger.processed, suffix, &mut scratch);
            nodes = scratch.nodes;
            if found {
                log::debug!(
                    "Reallocated {} passes from step {} ({} nodes)",
                    scratch.placed.len(),
                    first_step,
                    nodes
                );
                let rewritten = scratch.placed.len();
                ledger.state = scratch.state;
                ledger.journal.splice_from(first_step, scratch.entries);
                for assignment in scratch.placed {
                    ledger
                        .plan
                        .set(assignment.pass, Allocation::Assigned(assignment));
                }
                return Ok(ResolveStats { nodes, rewritten });
            }
            if nodes >= self.max_nodes {
                log::debug!("Reallocation node budget exhausted at step {}", step);
                break;
            }
        }

        Err(ResolveFailure {
            reason: FailureKind::ReallocationExhausted,
            nodes,
        })
    }

    /// Steps of the committed passes ending within the horizon before the
    /// failing pass, oldest first, followed by the failing step.
    fn window(&self, availability: &Availability, ledger: &Ledger, step: usize) -> Vec<usize> {
        let failing = availability.pass(ledger.processed[step]);
        let threshold = failing.earliest_start().unwrap_or(i64::MIN) - REALLOCATION_HORIZON;

        let mut steps = vec![step];
        for earlier in (0..step).rev() {
            if self.max_window.is_some_and(|max| steps.len() >= max) {
                break;
            }
            let Some(assignment) = ledger.plan.assignment(ledger.processed[earlier]) else {
                continue;
            };
            if assignment.end < threshold {
                break;
            }
            steps.push(earlier);
        }
        steps.reverse();
        steps
    }

    fn search(
        &self,
        placer: &Placer<'_>,
        processed: &[PassId],
        steps: &[usize],
        scratch: &mut Scratch,
    ) -> bool {
        let Some((&step, rest)) = steps.split_first() else {
            return true;
        };
        let pass = placer.availability().pass(processed[step]);

        for station in pass.candidate_stations() {
            if scratch.nodes >= self.max_nodes {
                return false;
            }
            scratch.nodes += 1;

            let Some(assignment) = placer.place_at(&scratch.state, pass, station) else {
                continue;
            };
            let previous = scratch.state.commit(
                assignment.station,
                assignment.antenna,
                assignment.pass,
                assignment.start,
                assignment.end,
            );
            scratch.entries.push(JournalEntry {
                step,
                station: assignment.station,
                antenna: assignment.antenna,
                previous: previous.clone(),
            });
            let (station, antenna) = (assignment.station, assignment.antenna);
            scratch.placed.push(assignment);

            if self.search(placer, processed, rest, scratch) {
                return true;
            }

            scratch.placed.pop();
            scratch.entries.pop();
            scratch.state.restore(station, antenna, previous);
        }
        false
    }
}

fn combinations(availability: &Availability, ledger: &Ledger, steps: &[usize]) -> usize {
    steps.iter().fold(1usize, |acc, &step| {
        acc.saturating_mul(availability.pass(ledger.processed[step]).candidate_count())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::fixtures::{availability, record, station};
    use crate::dataset::{Phase, StationId};
    use crate::scheduler::plan::{Plan, WindowFit};
    use crate::scheduler::state::{AntennaId, Journal};

    /// Nine passes seen only from one station, all but the last committed
    /// back to back within the horizon.
    fn contended() -> (Availability, Ledger) {
        let records = (0..9)
            .map(|i| record(&format!("S{i}"), 1, Phase::Climb, i * 10, i * 10 + 1000))
            .collect();
        let availability = availability(vec![station("A", 1, records)]);
        let processed: Vec<PassId> = availability.ordered_passes().collect();
        let mut plan = Plan::for_availability(&availability);
        for &pass in processed.iter().take(8) {
            let start = availability.pass(pass).earliest_start().unwrap();
            plan.set(
                pass,
                Allocation::Assigned(Assignment {
                    pass,
                    station: StationId(0),
                    antenna: AntennaId::from_index(0).unwrap(),
                    start,
                    end: start + 300,
                    fit: WindowFit::HeadAligned,
                    band_matched: true,
                }),
            );
        }
        let ledger = Ledger {
            state: SchedulerState::new([(StationId(0), "A", 1)]).unwrap(),
            journal: Journal::default(),
            plan,
            processed,
        };
        (availability, ledger)
    }

    fn reallocator(max_window: usize) -> Reallocator {
        Reallocator::new(&ReallocationConfig {
            max_window,
            max_nodes: 100_000,
        })
    }

    #[test]
    fn test_window_capped_by_config() {
        let (availability, ledger) = contended();
        let window = reallocator(6).window(&availability, &ledger, 8);
        assert_eq!(window, vec![3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_zero_cap_walks_whole_horizon() {
        let (availability, ledger) = contended();
        let window = reallocator(0).window(&availability, &ledger, 8);
        assert_eq!(window, (0..9).collect::<Vec<_>>());
    }

    #[test]
    fn test_window_stops_outside_horizon() {
        let (availability, mut ledger) = contended();
        // Ends more than 600 s before the failing pass becomes visible.
        let pass = ledger.processed[2];
        let early = ledger.plan.assignment(pass).cloned().unwrap();
        ledger.plan.set(
            pass,
            Allocation::Assigned(Assignment {
                start: -2000,
                end: -1700,
                ..early
            }),
        );
        let window = reallocator(0).window(&availability, &ledger, 8);
        assert_eq!(window, vec![3, 4, 5, 6, 7, 8]);
    }
}
