use std::cmp::Ordering;
use std::time::Instant;

use crate::config::{BandPreference, Config};
use crate::dataset::{Availability, Pass, PassId, Phase, StationId};
use crate::scheduler::conflict::{
    antenna_loads, ConflictModel, LoadMetric, LoadPenalty, ScoreWeights, StationAvailability,
};
use crate::scheduler::error::SchedulerError;
use crate::scheduler::plan::{Allocation, Assignment, FailureKind, Plan, WindowFit};
use crate::scheduler::ranking::{rank, station_load_scores, RankingMethod, StationCandidate};
use crate::scheduler::reallocation::Reallocator;
use crate::scheduler::state::{AntennaId, Journal, SchedulerState, StationState};
use crate::scheduler::summary::{ReallocationCounters, RunSummary};
use crate::timing::{Timestamp, MIN_TASK_DURATION};

/// Station and antenna choice plus the end-time rule, shared by the greedy
/// pass and the reallocation search.
pub struct Placer<'a> {
    availability: &'a Availability,
    conflict: ConflictModel,
    ranking: RankingMethod,
    station_score: ScoreWeights,
    load_balance: Option<(LoadMetric, ScoreWeights)>,
    bands: BandPreference,
}

impl<'a> Placer<'a> {
    pub fn new(availability: &'a Availability, config: &Config) -> Self {
        let penalty = config.load_penalty.enabled.then_some(LoadPenalty {
            mode: config.load_penalty.mode,
            factor: config.load_penalty.factor,
        });
        Self {
            availability,
            conflict: ConflictModel::new(
                penalty,
                config.load_balance.metric,
                config.load_balance.weights(),
            ),
            ranking: config.ranking_method,
            station_score: config.station_score,
            load_balance: config
                .load_balance
                .enabled
                .then_some((config.load_balance.metric, config.load_balance.weights())),
            bands: config.bands.clone(),
        }
    }

    pub fn availability(&self) -> &'a Availability {
        self.availability
    }

    /// Every station that sees `pass`, ranked.
    pub fn candidates(&self, state: &SchedulerState, pass: &Pass) -> Vec<StationCandidate> {
        let load_scores = match self.ranking {
            RankingMethod::C => station_load_scores(state, self.station_score),
            _ => Vec::new(),
        };
        let mut candidates: Vec<StationCandidate> = pass
            .candidate_stations()
            .filter_map(|station| {
                let availability = self.conflict.evaluate(
                    &self.availability.passes,
                    pass,
                    state.station(station),
                )?;
                Some(StationCandidate {
                    availability,
                    load_score: load_scores.get(station.index()).copied().unwrap_or(0.0),
                    band_matched: self.band_matched(pass, station),
                })
            })
            .collect();
        rank(self.ranking, &mut candidates);
        candidates
    }

    /// Place `pass` on `station` if one of its antennas is free.
    pub fn place_at(
        &self,
        state: &SchedulerState,
        pass: &Pass,
        station: StationId,
    ) -> Option<Assignment> {
        let availability =
            self.conflict
                .evaluate(&self.availability.passes, pass, state.station(station))?;
        self.place(state, pass, &availability, self.band_matched(pass, station))
    }

    pub fn place(
        &self,
        state: &SchedulerState,
        pass: &Pass,
        availability: &StationAvailability,
        band_matched: bool,
    ) -> Option<Assignment> {
        let station = state.station(availability.station);
        let (antenna, start) = self.choose_antenna(station, availability)?;
        let window = availability.window;
        let end = match pass.key.phase {
            Phase::Climb => start + MIN_TASK_DURATION,
            Phase::Operation => window.end,
        };
        Some(Assignment {
            pass: pass.id,
            station: availability.station,
            antenna,
            start,
            end,
            fit: WindowFit::classify(&window, start, end),
            band_matched,
        })
    }

    fn choose_antenna(
        &self,
        station: &StationState,
        availability: &StationAvailability,
    ) -> Option<(AntennaId, Timestamp)> {
        match self.load_balance {
            Some((metric, weights)) => {
                let loads = antenna_loads(station, metric, weights);
                availability.open_slots().min_by(|a, b| {
                    loads[a.0.index()]
                        .partial_cmp(&loads[b.0.index()])
                        .unwrap_or(Ordering::Equal)
                        .then_with(|| a.0.cmp(&b.0))
                })
            }
            None => availability.open_slots().min_by_key(|&(antenna, start)| {
                // Idle antennas sort before any used one.
                let state = &station.antennas[antenna];
                (start, !state.is_idle(), state.last_end(), antenna)
            }),
        }
    }

    fn band_matched(&self, pass: &Pass, station: StationId) -> bool {
        self.bands.matches(
            pass.key.phase,
            self.availability.station(station).band.as_deref(),
        )
    }
}

/// State, undo journal, plan and processing order of one run.
#[derive(Debug, Clone)]
pub struct Ledger {
    pub state: SchedulerState,
    pub journal: Journal,
    pub plan: Plan,
    /// Pass processed at each step.
    pub processed: Vec<PassId>,
}

impl Ledger {
    pub fn commit(&mut self, step: usize, assignment: Assignment) {
        let previous = self.state.commit(
            assignment.station,
            assignment.antenna,
            assignment.pass,
            assignment.start,
            assignment.end,
        );
        self.journal
            .record(step, assignment.station, assignment.antenna, previous);
        self.plan
            .set(assignment.pass, Allocation::Assigned(assignment));
    }
}

#[derive(Debug, Clone)]
pub struct ScheduleOutcome {
    pub plan: Plan,
    pub summary: RunSummary,
    /// Final antenna counters, kept for consistency checks against the plan.
    #[cfg(test)]
    pub state: SchedulerState,
}

/// Event-driven greedy scheduler.
pub struct Scheduler<'a> {
    placer: Placer<'a>,
    reallocator: Option<Reallocator>,
    ledger: Ledger,
    counters: ReallocationCounters,
}

impl<'a> Scheduler<'a> {
    pub fn new(availability: &'a Availability, config: &Config) -> Result<Self, SchedulerError> {
        config
            .validate()
            .map_err(|e| SchedulerError::InvalidConfig(e.to_string()))?;
        let state = SchedulerState::new(
            availability
                .stations
                .iter()
                .map(|s| (s.id, s.name.as_str(), s.antenna_count)),
        )?;
        Ok(Self {
            placer: Placer::new(availability, config),
            reallocator: config
                .optimization
                .then(|| Reallocator::new(&config.reallocation)),
            ledger: Ledger {
                state,
                journal: Journal::default(),
                plan: Plan::for_availability(availability),
                processed: Vec::with_capacity(availability.passes.len()),
            },
            counters: ReallocationCounters::default(),
        })
    }

    pub fn run(mut self) -> ScheduleOutcome {
        let started = Instant::now();
        let availability = self.placer.availability();
        log::info!(
            "Scheduling {} passes over {} stations",
            availability.passes.len(),
            availability.stations.len()
        );

        for pass in availability.ordered_passes() {
            self.process(pass);
        }

        let summary = RunSummary::collect(
            availability,
            &self.ledger.plan,
            self.counters,
            started.elapsed(),
        );
        log::info!(
            "Assigned {}/{} passes ({:.1}%, {:.1}% of feasible)",
            summary.assigned,
            summary.passes,
            summary.success_rate * 100.0,
            summary.feasible_success_rate * 100.0
        );

        ScheduleOutcome {
            plan: self.ledger.plan,
            summary,
            #[cfg(test)]
            state: self.ledger.state,
        }
    }

    fn process(&mut self, pass_id: PassId) {
        let step = self.ledger.processed.len();
        self.ledger.processed.push(pass_id);
        let pass = self.placer.availability().pass(pass_id);

        for candidate in self.placer.candidates(&self.ledger.state, pass) {
            if let Some(assignment) = self.placer.place(
                &self.ledger.state,
                pass,
                &candidate.availability,
                candidate.band_matched,
            ) {
                log::debug!(
                    "{} -> {} {} [{}, {}]",
                    pass.key,
                    self.placer.availability().station(assignment.station).name,
                    assignment.antenna,
                    assignment.start,
                    assignment.end
                );
                self.ledger.commit(step, assignment);
                return;
            }
        }

        let Some(reallocator) = &self.reallocator else {
            log::debug!("{}: no free antenna, reallocation disabled", pass.key);
            self.ledger.plan.set(
                pass_id,
                Allocation::Failed {
                    reason: FailureKind::NotAttempted,
                },
            );
            return;
        };

        self.counters.attempts += 1;
        match reallocator.resolve(&self.placer, &mut self.ledger, step) {
            Ok(stats) => {
                self.counters.successes += 1;
                self.counters.search_nodes += stats.nodes;
                self.counters.rewritten += stats.rewritten;
            }
            Err(failure) => {
                self.counters.search_nodes += failure.nodes;
                log::debug!("{}: {}", pass.key, failure.reason);
                self.ledger.plan.set(
                    pass_id,
                    Allocation::Failed {
                        reason: failure.reason,
                    },
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::fixtures::{availability, record, station};

    fn config(ranking: RankingMethod) -> Config {
        let mut config = Config::default();
        config.ranking_method = ranking;
        config.load_penalty.enabled = false;
        config
    }

    #[test]
    fn test_end_time_rule() {
        let availability = availability(vec![station(
            "CM",
            2,
            vec![
                record("X", 1, Phase::Climb, 0, 1000),
                record("Y", 1, Phase::Operation, 100, 1000),
            ],
        )]);
        let outcome = Scheduler::new(&availability, &config(RankingMethod::A))
            .unwrap()
            .run();

        let climb = outcome.plan.assignment(PassId(0)).unwrap();
        assert_eq!((climb.start, climb.end), (0, 300));
        assert_eq!(climb.fit, WindowFit::HeadAligned);
        let operation = outcome.plan.assignment(PassId(1)).unwrap();
        assert_eq!((operation.start, operation.end), (100, 1000));
        assert_eq!(operation.fit, WindowFit::Full);
        assert_ne!(climb.antenna, operation.antenna);
    }

    #[test]
    fn test_operation_start_is_delayed_by_gap() {
        let availability = availability(vec![station(
            "CM",
            1,
            vec![
                record("X", 1, Phase::Climb, 0, 400),
                record("X", 2, Phase::Operation, 200, 1200),
            ],
        )]);
        let outcome = Scheduler::new(&availability, &config(RankingMethod::A))
            .unwrap()
            .run();
        let operation = outcome.plan.assignment(PassId(1)).unwrap();
        assert_eq!((operation.start, operation.end), (600, 1200));
        assert_eq!(operation.fit, WindowFit::TailAligned);
    }

    #[test]
    fn test_band_preference_picks_matching_station() {
        let mut qv = station("QV-1", 1, vec![record("X", 1, Phase::Operation, 0, 900)]);
        qv.band = Some("QV".into());
        let mut s = station("S-1", 1, vec![record("X", 1, Phase::Operation, 0, 900)]);
        s.band = Some("S".into());
        let availability = availability(vec![qv, s]);

        let mut cfg = config(RankingMethod::A);
        cfg.bands.operation = Some("S".into());
        let outcome = Scheduler::new(&availability, &cfg).unwrap().run();
        let assignment = outcome.plan.assignment(PassId(0)).unwrap();
        assert_eq!(assignment.station, StationId(1));
        assert!(assignment.band_matched);
        assert_eq!(outcome.summary.operation.band_matched, 1);
    }

    #[test]
    fn test_load_balance_spreads_antennas() {
        let availability = availability(vec![station(
            "CM",
            2,
            vec![
                record("X", 1, Phase::Climb, 0, 400),
                record("X", 2, Phase::Climb, 2000, 2400),
                record("X", 3, Phase::Climb, 4000, 4400),
            ],
        )]);

        let plain = Scheduler::new(&availability, &config(RankingMethod::A))
            .unwrap()
            .run();
        let antennas: Vec<_> = plain.plan.assignments().map(|a| a.antenna.index()).collect();
        // Idle antenna first, then earliest last end.
        assert_eq!(antennas, vec![0, 1, 0]);

        let mut cfg = config(RankingMethod::A);
        cfg.load_balance.enabled = true;
        let balanced = Scheduler::new(&availability, &cfg).unwrap().run();
        let antennas: Vec<_> = balanced
            .plan
            .assignments()
            .map(|a| a.antenna.index())
            .collect();
        assert_eq!(antennas, vec![0, 1, 0]);
        let busy: Vec<_> = balanced.state.stations()[0]
            .antennas
            .iter()
            .map(|(_, a)| a.busy_seconds)
            .collect();
        assert_eq!(busy, vec![600, 300]);
    }

    #[test]
    fn test_failure_without_optimization() {
        let availability = availability(vec![station(
            "CM",
            1,
            vec![
                record("X", 1, Phase::Climb, 0, 400),
                record("Y", 1, Phase::Climb, 100, 800),
            ],
        )]);
        let mut cfg = config(RankingMethod::C);
        cfg.optimization = false;
        let outcome = Scheduler::new(&availability, &cfg).unwrap().run();
        assert_eq!(
            outcome.plan.get(PassId(1)),
            &Allocation::Failed {
                reason: FailureKind::NotAttempted
            }
        );
        assert_eq!(outcome.summary.reallocation.attempts, 0);
    }

    #[test]
    fn test_invalid_antenna_count_rejected() {
        let mut availability = availability(vec![station(
            "CM",
            1,
            vec![record("X", 1, Phase::Climb, 0, 400)],
        )]);
        availability.stations[0].antenna_count = 0;
        assert!(matches!(
            Scheduler::new(&availability, &Config::default()),
            Err(SchedulerError::AntennaCount { .. })
        ));
    }
}
