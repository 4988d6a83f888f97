use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use strum_macros::Display;

use crate::abort::CancelToken;
use crate::annealing::neighbor::{propose, MoveKind};
use crate::annealing::objective::{evaluate, utilization, SearchPhase};
use crate::annealing::occupancy::Occupancy;
use crate::config::{AnnealingConfig, BandPreference};
use crate::dataset::Availability;
use crate::scheduler::{Allocation, Assignment, Plan};

const MIN_TEMPERATURE: f64 = 0.01;

/// Cooling schedule of one search phase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoolingSchedule {
    pub initial_temperature: f64,
    pub cooling_rate: f64,
    pub inner_iterations: usize,
    /// Share of the total time budget.
    pub budget_share: f64,
}

pub const BALANCE_SCHEDULE: CoolingSchedule = CoolingSchedule {
    initial_temperature: 10_000.0,
    cooling_rate: 0.90,
    inner_iterations: 2_000,
    budget_share: 0.4,
};

pub const REFINE_SCHEDULE: CoolingSchedule = CoolingSchedule {
    initial_temperature: 2_000.0,
    cooling_rate: 0.93,
    inner_iterations: 1_000,
    budget_share: 0.6,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StopReason {
    Cooled,
    Deadline,
    Cancelled,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MoveCounters {
    pub targeted_migration: usize,
    pub median_migration: usize,
    pub swap: usize,
    /// Draws that found no feasible move.
    pub none_found: usize,
}

impl MoveCounters {
    fn count(&mut self, kind: MoveKind, found: bool) {
        if !found {
            self.none_found += 1;
            return;
        }
        match kind {
            MoveKind::TargetedMigration => self.targeted_migration += 1,
            MoveKind::MedianMigration => self.median_migration += 1,
            MoveKind::Swap => self.swap += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseStats {
    pub phase: SearchPhase,
    pub iterations: usize,
    pub accepted: usize,
    pub improved: usize,
    pub temperature_steps: usize,
    pub final_temperature: f64,
    pub start_score: f64,
    pub best_score: f64,
    pub elapsed_ms: u64,
    pub stop_reason: StopReason,
    pub moves: MoveCounters,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnealingStats {
    pub seed: u64,
    /// Refine-phase score of the input plan.
    pub initial_score: f64,
    /// Refine-phase score of the returned plan.
    pub final_score: f64,
    pub phases: Vec<PhaseStats>,
}

#[derive(Debug, Clone)]
pub struct AnnealingOutcome {
    pub plan: Plan,
    pub stats: AnnealingStats,
}

/// Best slots seen so far, scored by the refine objective.
struct Elite {
    slots: Vec<Option<Assignment>>,
    score: f64,
}

/// Two-phase simulated annealing over a committed plan. Moves an assigned
/// pass between stations and antennas; never assigns or drops a pass.
pub struct Annealer<'a> {
    availability: &'a Availability,
    config: AnnealingConfig,
    bands: BandPreference,
    cancel: CancelToken,
    observable: Vec<i64>,
    schedules: [CoolingSchedule; 2],
}

impl<'a> Annealer<'a> {
    pub fn new(availability: &'a Availability, config: &AnnealingConfig, cancel: CancelToken) -> Self {
        Self {
            availability,
            config: *config,
            bands: BandPreference::default(),
            cancel,
            observable: availability.observable_seconds(),
            schedules: [BALANCE_SCHEDULE, REFINE_SCHEDULE],
        }
    }

    /// Band preference used to flag moved assignments.
    pub fn with_bands(mut self, bands: &BandPreference) -> Self {
        self.bands = bands.clone();
        self
    }

    #[cfg(test)]
    pub(crate) fn with_schedules(mut self, schedules: [CoolingSchedule; 2]) -> Self {
        self.schedules = schedules;
        self
    }

    /// Refine-phase objective of `plan`.
    #[cfg(test)]
    pub fn score(&self, plan: &Plan) -> f64 {
        let occupancy = Occupancy::new(self.availability, &self.bands, plan);
        evaluate(SearchPhase::Refine, &occupancy, &self.observable).value
    }

    pub fn optimize(&self, plan: &Plan) -> AnnealingOutcome {
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut occupancy = Occupancy::new(self.availability, &self.bands, plan);
        let initial_score = evaluate(SearchPhase::Refine, &occupancy, &self.observable).value;
        let mut elite = Elite {
            slots: occupancy.slots().to_vec(),
            score: initial_score,
        };
        log::info!(
            "Annealing {} assignments (seed {}, budget {})",
            occupancy.assigned(),
            self.config.seed,
            humantime::format_duration(self.config.time_budget)
        );

        let mut phases = Vec::with_capacity(2);
        for (phase, schedule) in [SearchPhase::Balance, SearchPhase::Refine]
            .into_iter()
            .zip(self.schedules)
        {
            let budget = self.config.time_budget.mul_f64(schedule.budget_share);
            let (stats, phase_best) =
                self.run_phase(phase, &schedule, budget, &mut occupancy, &mut elite, &mut rng);
            log::info!(
                "Phase {} finished ({}): {} iterations, {} accepted, best {:.3}",
                phase,
                stats.stop_reason,
                stats.iterations,
                stats.accepted,
                stats.best_score
            );
            let stop = stats.stop_reason;
            phases.push(stats);
            if stop == StopReason::Cancelled {
                break;
            }
            // The next phase starts from this phase's best state.
            occupancy = Occupancy::from_slots(self.availability, &self.bands, phase_best);
        }

        let allocations = plan
            .iter()
            .map(|(id, allocation)| match &elite.slots[id.index()] {
                Some(assignment) => Allocation::Assigned(assignment.clone()),
                None => allocation.clone(),
            })
            .collect();
        log::info!(
            "Annealing done: score {:.3} -> {:.3}",
            initial_score,
            elite.score
        );

        AnnealingOutcome {
            plan: Plan::from_allocations(allocations),
            stats: AnnealingStats {
                seed: self.config.seed,
                initial_score,
                final_score: elite.score,
                phases,
            },
        }
    }

    fn run_phase(
        &self,
        phase: SearchPhase,
        schedule: &CoolingSchedule,
        budget: Duration,
        occupancy: &mut Occupancy<'_>,
        elite: &mut Elite,
        rng: &mut StdRng,
    ) -> (PhaseStats, Vec<Option<Assignment>>) {
        let started = Instant::now();
        let deadline = started + budget;
        let mut current = evaluate(phase, occupancy, &self.observable).value;
        let mut stats = PhaseStats {
            phase,
            iterations: 0,
            accepted: 0,
            improved: 0,
            temperature_steps: 0,
            final_temperature: schedule.initial_temperature,
            start_score: current,
            best_score: current,
            elapsed_ms: 0,
            stop_reason: StopReason::Cooled,
            moves: MoveCounters::default(),
        };
        let mut phase_best = occupancy.slots().to_vec();
        let mut temperature = schedule.initial_temperature;

        'cooling: while temperature > MIN_TEMPERATURE {
            for _ in 0..schedule.inner_iterations {
                if self.cancel.is_cancelled() {
                    stats.stop_reason = StopReason::Cancelled;
                    break 'cooling;
                }
                if Instant::now() >= deadline {
                    stats.stop_reason = StopReason::Deadline;
                    break 'cooling;
                }
                stats.iterations += 1;

                let util = utilization(occupancy.station_busy(), &self.observable);
                let (kind, mv) =
                    propose(self.availability, occupancy, &util, &self.observable, rng);
                stats.moves.count(kind, mv.is_some());
                let Some(mv) = mv else {
                    continue;
                };

                mv.apply(occupancy);
                let candidate = evaluate(phase, occupancy, &self.observable).value;
                let delta = candidate - current;
                if delta >= 0.0 || rng.gen::<f64>() < (delta / temperature).exp() {
                    stats.accepted += 1;
                    current = candidate;
                    if candidate > stats.best_score {
                        stats.improved += 1;
                        stats.best_score = candidate;
                        phase_best = occupancy.slots().to_vec();
                    }
                    let refine = match phase {
                        SearchPhase::Refine => candidate,
                        SearchPhase::Balance => {
                            evaluate(SearchPhase::Refine, occupancy, &self.observable).value
                        }
                    };
                    if refine > elite.score {
                        elite.score = refine;
                        elite.slots = occupancy.slots().to_vec();
                    }
                } else {
                    mv.revert(occupancy);
                }
            }
            temperature *= schedule.cooling_rate;
            stats.temperature_steps += 1;
            log::trace!(
                "{} step {}: T={:.3} current={:.3}",
                phase,
                stats.temperature_steps,
                temperature,
                current
            );
        }

        stats.final_temperature = temperature;
        stats.elapsed_ms = started.elapsed().as_millis() as u64;
        (stats, phase_best)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::dataset::fixtures::{availability, record, station, synthetic_availability};
    use crate::dataset::{PassId, Phase, StationId};
    use crate::scheduler::{AntennaId, Scheduler, WindowFit};
    use crate::validation::validate_plan;

    const FAST: [CoolingSchedule; 2] = [
        CoolingSchedule {
            initial_temperature: 100.0,
            cooling_rate: 0.5,
            inner_iterations: 50,
            budget_share: 0.4,
        },
        CoolingSchedule {
            initial_temperature: 50.0,
            cooling_rate: 0.5,
            inner_iterations: 50,
            budget_share: 0.6,
        },
    ];

    /// Cools far slower than any test budget allows.
    const GLACIAL: [CoolingSchedule; 2] = [
        CoolingSchedule {
            initial_temperature: 1e6,
            cooling_rate: 0.9999,
            inner_iterations: 10_000,
            budget_share: 0.4,
        },
        CoolingSchedule {
            initial_temperature: 1e6,
            cooling_rate: 0.9999,
            inner_iterations: 10_000,
            budget_share: 0.6,
        },
    ];

    fn budget(millis: u64) -> AnnealingConfig {
        AnnealingConfig {
            enabled: true,
            time_budget: Duration::from_millis(millis),
            seed: 42,
        }
    }

    fn climb_on(pass: usize, station: usize, start: i64) -> Allocation {
        Allocation::Assigned(Assignment {
            pass: PassId(pass),
            station: StationId(station),
            antenna: AntennaId::from_index(0).unwrap(),
            start,
            end: start + 300,
            fit: WindowFit::HeadAligned,
            band_matched: true,
        })
    }

    #[test]
    fn test_balances_two_stations() {
        let availability = availability(vec![
            station(
                "A",
                1,
                vec![
                    record("X", 1, Phase::Climb, 0, 1000),
                    record("Y", 1, Phase::Climb, 5000, 6000),
                ],
            ),
            station(
                "B",
                1,
                vec![
                    record("X", 1, Phase::Climb, 0, 1000),
                    record("Y", 1, Phase::Climb, 5000, 6000),
                ],
            ),
        ]);
        let seed = Plan::from_allocations(vec![climb_on(0, 0, 0), climb_on(1, 0, 5000)]);

        let annealer = Annealer::new(&availability, &budget(10_000), CancelToken::new())
            .with_schedules(FAST);
        let outcome = annealer.optimize(&seed);

        let stations: Vec<usize> = outcome
            .plan
            .assignments()
            .map(|a| a.station.index())
            .collect();
        assert_ne!(stations[0], stations[1]);
        assert!(outcome.stats.final_score > outcome.stats.initial_score);
        assert!((annealer.score(&outcome.plan) - outcome.stats.final_score).abs() < 1e-9);
        assert!(validate_plan(&availability, &outcome.plan).is_clean());
    }

    #[test]
    fn test_refine_starts_from_seed_when_balance_stalls() {
        let availability = availability(vec![
            station(
                "A",
                1,
                vec![
                    record("X", 1, Phase::Climb, 0, 1000),
                    record("Y", 1, Phase::Climb, 5000, 6000),
                ],
            ),
            station(
                "B",
                1,
                vec![
                    record("X", 1, Phase::Climb, 0, 1000),
                    record("Y", 1, Phase::Climb, 5000, 6000),
                ],
            ),
        ]);
        // Already balanced: the Balance objective is at its maximum.
        let seed = Plan::from_allocations(vec![climb_on(0, 0, 0), climb_on(1, 1, 5000)]);
        let hot = CoolingSchedule {
            initial_temperature: 1e6,
            ..FAST[0]
        };

        let outcome = Annealer::new(&availability, &budget(10_000), CancelToken::new())
            .with_schedules([hot, FAST[1]])
            .optimize(&seed);

        let [balance, refine] = outcome.stats.phases.as_slice() else {
            panic!("expected two phases");
        };
        assert_eq!(balance.improved, 0);
        assert!(balance.accepted > 0);
        assert!((refine.start_score - outcome.stats.initial_score).abs() < 1e-9);
        assert!(outcome.stats.final_score >= outcome.stats.initial_score);
    }

    #[test]
    fn test_best_score_never_below_seed() {
        let availability = synthetic_availability(11);
        let seed = Scheduler::new(&availability, &Config::default())
            .unwrap()
            .run()
            .plan;

        let annealer = Annealer::new(&availability, &budget(400), CancelToken::new());
        let outcome = annealer.optimize(&seed);

        assert!(annealer.score(&outcome.plan) >= annealer.score(&seed) - 1e-9);
        assert_eq!(outcome.plan.assigned_count(), seed.assigned_count());
        assert!(validate_plan(&availability, &outcome.plan).is_clean());
        for (id, allocation) in seed.iter() {
            assert_eq!(
                outcome.plan.get(id).assignment().is_some(),
                allocation.assignment().is_some()
            );
        }
    }

    #[test]
    fn test_deadline_ends_both_phases() {
        let availability = synthetic_availability(11);
        let seed = Scheduler::new(&availability, &Config::default())
            .unwrap()
            .run()
            .plan;
        let annealer = Annealer::new(&availability, &budget(300), CancelToken::new())
            .with_schedules(GLACIAL);

        let started = Instant::now();
        let outcome = annealer.optimize(&seed);

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(outcome.stats.phases.len(), 2);
        for phase in &outcome.stats.phases {
            assert_eq!(phase.stop_reason, StopReason::Deadline);
            assert!(phase.iterations > 0);
        }
        assert!(outcome.stats.final_score >= outcome.stats.initial_score);
    }

    #[test]
    fn test_same_seed_same_result() {
        let availability = synthetic_availability(3);
        let seed = Scheduler::new(&availability, &Config::default())
            .unwrap()
            .run()
            .plan;

        let run = || {
            Annealer::new(&availability, &budget(60_000), CancelToken::new())
                .with_schedules(FAST)
                .optimize(&seed)
        };
        let first = run();
        let second = run();
        assert_eq!(first.plan, second.plan);
        assert!(first
            .stats
            .phases
            .iter()
            .all(|p| p.stop_reason == StopReason::Cooled));
    }

    #[test]
    fn test_cancelled_run_returns_seed() {
        let availability = synthetic_availability(5);
        let seed = Scheduler::new(&availability, &Config::default())
            .unwrap()
            .run()
            .plan;
        let cancel = CancelToken::new();
        cancel.cancel();

        let outcome = Annealer::new(&availability, &budget(10_000), cancel).optimize(&seed);
        assert_eq!(outcome.plan, seed);
        assert_eq!(outcome.stats.phases.len(), 1);
        assert_eq!(outcome.stats.phases[0].stop_reason, StopReason::Cancelled);
        assert_eq!(outcome.stats.phases[0].iterations, 0);
    }

    #[test]
    fn test_cancel_stops_running_search() {
        let availability = synthetic_availability(5);
        let seed = Scheduler::new(&availability, &Config::default())
            .unwrap()
            .run()
            .plan;
        let cancel = CancelToken::new();
        let annealer = Annealer::new(&availability, &budget(60_000), cancel.clone())
            .with_schedules(GLACIAL);

        let started = Instant::now();
        let outcome = std::thread::scope(|scope| {
            scope.spawn(|| {
                std::thread::sleep(Duration::from_millis(100));
                cancel.cancel();
            });
            annealer.optimize(&seed)
        });

        assert!(started.elapsed() < Duration::from_secs(10));
        let last = outcome.stats.phases.last().unwrap();
        assert_eq!(last.stop_reason, StopReason::Cancelled);
        assert!(annealer.score(&outcome.plan) >= annealer.score(&seed) - 1e-9);
        assert!(validate_plan(&availability, &outcome.plan).is_clean());
    }
}
