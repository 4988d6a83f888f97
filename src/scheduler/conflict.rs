use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::dataset::{Pass, StationId, VisibilityWindow};
use crate::scheduler::state::{AntennaId, AntennaState, StationState};
use crate::timing::{required_gap, Timestamp, MIN_TASK_DURATION};

/// How an antenna's load is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LoadMetric {
    TaskCount,
    BusyTime,
    Weighted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PenaltyMode {
    Linear,
    Exponential,
    Adaptive,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub weight_task: f64,
    pub weight_time: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            weight_task: 0.3,
            weight_time: 0.7,
        }
    }
}

/// Virtual delay, in seconds, added to the required gap of loaded antennas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadPenalty {
    pub mode: PenaltyMode,
    pub factor: f64,
}

impl LoadPenalty {
    pub fn delay(&self, load: f64, max_load: f64, avg_load: f64) -> f64 {
        match self.mode {
            PenaltyMode::Linear => {
                if max_load <= 0.0 {
                    return 0.0;
                }
                load / max_load * self.factor
            }
            PenaltyMode::Exponential => {
                if max_load <= 0.0 {
                    return 0.0;
                }
                ((2.0 * load / max_load).exp() - 1.0) * self.factor * 0.2
            }
            PenaltyMode::Adaptive => {
                let deviation = if avg_load > 0.0 {
                    (load - avg_load) / avg_load
                } else {
                    0.0
                };
                if deviation > 0.0 {
                    deviation * self.factor
                } else {
                    deviation * self.factor * 0.5
                }
            }
        }
    }
}

/// Load of every antenna of a station under `metric`. The weighted metric is
/// normalised by the station's busiest antenna on each axis.
pub fn antenna_loads(station: &StationState, metric: LoadMetric, weights: ScoreWeights) -> Vec<f64> {
    let antennas: Vec<&AntennaState> = station.antennas.iter().map(|(_, a)| a).collect();
    match metric {
        LoadMetric::TaskCount => antennas.iter().map(|a| a.task_count as f64).collect(),
        LoadMetric::BusyTime => antennas.iter().map(|a| a.busy_seconds as f64).collect(),
        LoadMetric::Weighted => {
            let max_count = antennas.iter().map(|a| a.task_count).max().unwrap_or(0) as f64;
            let max_busy = antennas.iter().map(|a| a.busy_seconds).max().unwrap_or(0) as f64;
            antennas
                .iter()
                .map(|a| {
                    let count = if max_count > 0.0 {
                        a.task_count as f64 / max_count
                    } else {
                        0.0
                    };
                    let busy = if max_busy > 0.0 {
                        a.busy_seconds as f64 / max_busy
                    } else {
                        0.0
                    };
                    weights.weight_task * count + weights.weight_time * busy
                })
                .collect()
        }
    }
}

/// Load of every antenna as seen by the gap penalty. Unlike [`antenna_loads`],
/// the weighted metric blends the raw count and busy seconds.
fn penalty_loads(station: &StationState, metric: LoadMetric, weights: ScoreWeights) -> Vec<f64> {
    match metric {
        LoadMetric::Weighted => station
            .antennas
            .iter()
            .map(|(_, a)| {
                weights.weight_task * a.task_count as f64
                    + weights.weight_time * a.busy_seconds as f64
            })
            .collect(),
        _ => antenna_loads(station, metric, weights),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AntennaSlot {
    pub antenna: AntennaId,
    /// `None` when the antenna cannot take the pass.
    pub earliest_start: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StationAvailability {
    pub station: StationId,
    pub window: VisibilityWindow,
    pub slots: Vec<AntennaSlot>,
}

impl StationAvailability {
    pub fn available(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.earliest_start.is_some())
            .count()
    }

    pub fn total(&self) -> usize {
        self.slots.len()
    }

    pub fn availability_ratio(&self) -> f64 {
        if self.slots.is_empty() {
            return 0.0;
        }
        self.available() as f64 / self.total() as f64
    }

    pub fn open_slots(&self) -> impl Iterator<Item = (AntennaId, Timestamp)> + '_ {
        self.slots
            .iter()
            .filter_map(|s| s.earliest_start.map(|start| (s.antenna, start)))
    }
}

/// Decides which antennas of a station can take a pass, from their last
/// committed task and the load-aware gap extension.
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictModel {
    penalty: Option<LoadPenalty>,
    metric: LoadMetric,
    weights: ScoreWeights,
}

impl ConflictModel {
    pub fn new(penalty: Option<LoadPenalty>, metric: LoadMetric, weights: ScoreWeights) -> Self {
        Self {
            penalty,
            metric,
            weights,
        }
    }

    pub fn evaluate(
        &self,
        passes: &[Pass],
        pass: &Pass,
        station: &StationState,
    ) -> Option<StationAvailability> {
        let window = *pass.window(station.id)?;
        let delays = self.delays(station);
        let slots = station
            .antennas
            .iter()
            .map(|(antenna, state)| AntennaSlot {
                antenna,
                earliest_start: earliest_start(
                    passes,
                    pass,
                    &window,
                    state,
                    delays[antenna.index()],
                ),
            })
            .collect();
        Some(StationAvailability {
            station: station.id,
            window,
            slots,
        })
    }

    fn delays(&self, station: &StationState) -> Vec<f64> {
        let Some(penalty) = self.penalty else {
            return vec![0.0; station.antennas.len()];
        };
        let loads = penalty_loads(station, self.metric, self.weights);
        let max_load = loads.iter().copied().fold(0.0, f64::max);
        let avg_load = loads.iter().sum::<f64>() / loads.len() as f64;
        loads
            .iter()
            // A negative delay would undercut the hard gap.
            .map(|&load| penalty.delay(load, max_load, avg_load).max(0.0))
            .collect()
    }
}

/// Earliest start at which `antenna` can take `pass` inside `window`.
///
/// Availability is judged against the gap extended by `delay`; the returned
/// start honours only the hard gap.
pub fn earliest_start(
    passes: &[Pass],
    pass: &Pass,
    window: &VisibilityWindow,
    antenna: &AntennaState,
    delay: f64,
) -> Option<Timestamp> {
    let start = match antenna.last {
        None => window.start,
        Some(last) => {
            let previous = &passes[last.pass.index()];
            let gap = required_gap(&previous.key.satellite, &pass.key.satellite);
            let virtual_ready = (last.end + gap) as f64 + delay;
            if virtual_ready.max(window.start as f64) + MIN_TASK_DURATION as f64 > window.end as f64
            {
                return None;
            }
            window.start.max(last.end + gap)
        }
    };
    (start + MIN_TASK_DURATION <= window.end).then_some(start)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{PassId, PassKey, Phase};
    use crate::scheduler::state::SchedulerState;

    fn pass(id: usize, sat: &str, windows: Vec<Option<VisibilityWindow>>) -> Pass {
        Pass {
            id: PassId(id),
            key: PassKey {
                satellite: sat.to_string(),
                lap: 1,
                phase: Phase::Climb,
            },
            windows,
        }
    }

    fn plain_model() -> ConflictModel {
        ConflictModel::new(None, LoadMetric::BusyTime, ScoreWeights::default())
    }

    #[test]
    fn test_gap_rule_same_and_cross_satellite() {
        let passes = vec![
            pass(0, "X", vec![Some(VisibilityWindow::new(0, 400))]),
            pass(1, "X", vec![Some(VisibilityWindow::new(600, 900))]),
            pass(2, "Y", vec![Some(VisibilityWindow::new(600, 1000))]),
        ];
        let mut state = SchedulerState::new([(StationId(0), "CM", 1)]).unwrap();
        state.commit(StationId(0), AntennaId::from_index(0).unwrap(), PassId(0), 0, 300);
        let station = state.station(StationId(0));
        let model = plain_model();

        // Same satellite: ready at 600, window allows 600..900.
        let same = model.evaluate(&passes, &passes[1], station).unwrap();
        assert_eq!(same.slots[0].earliest_start, Some(600));

        // Different satellite: ready at 900, no 300 s left before 1000.
        let cross = model.evaluate(&passes, &passes[2], station).unwrap();
        assert_eq!(cross.slots[0].earliest_start, None);
        assert_eq!(cross.available(), 0);
        assert_eq!(cross.availability_ratio(), 0.0);
    }

    #[test]
    fn test_idle_antenna_starts_at_window() {
        let passes = vec![pass(0, "X", vec![None, Some(VisibilityWindow::new(50, 350))])];
        let state = SchedulerState::new([(StationId(0), "CM", 1), (StationId(1), "KS", 2)])
            .unwrap();
        let model = plain_model();

        assert!(model
            .evaluate(&passes, &passes[0], state.station(StationId(0)))
            .is_none());
        let ks = model
            .evaluate(&passes, &passes[0], state.station(StationId(1)))
            .unwrap();
        assert_eq!(ks.available(), 2);
        assert!((ks.availability_ratio() - 1.0).abs() < 1e-10);
        let open: Vec<_> = ks.open_slots().map(|(_, start)| start).collect();
        assert_eq!(open, vec![50, 50]);
    }

    #[test]
    fn test_penalty_modes() {
        let linear = LoadPenalty {
            mode: PenaltyMode::Linear,
            factor: 150.0,
        };
        assert!((linear.delay(5.0, 10.0, 5.0) - 75.0).abs() < 1e-10);
        assert_eq!(linear.delay(5.0, 0.0, 0.0), 0.0);

        let exponential = LoadPenalty {
            mode: PenaltyMode::Exponential,
            factor: 150.0,
        };
        let expected = (2.0f64.exp() - 1.0) * 150.0 * 0.2;
        assert!((exponential.delay(10.0, 10.0, 5.0) - expected).abs() < 1e-10);

        let adaptive = LoadPenalty {
            mode: PenaltyMode::Adaptive,
            factor: 100.0,
        };
        assert!((adaptive.delay(15.0, 20.0, 10.0) - 50.0).abs() < 1e-10);
        assert!((adaptive.delay(5.0, 20.0, 10.0) + 25.0).abs() < 1e-10);
        assert_eq!(adaptive.delay(5.0, 20.0, 0.0), 0.0);
    }

    #[test]
    fn test_penalty_blocks_loaded_antenna() {
        let passes = vec![
            pass(0, "X", vec![Some(VisibilityWindow::new(0, 1000))]),
            pass(1, "X", vec![Some(VisibilityWindow::new(100, 1000))]),
        ];
        let mut state = SchedulerState::new([(StationId(0), "CM", 2)]).unwrap();
        let ant0 = AntennaId::from_index(0).unwrap();
        state.commit(StationId(0), ant0, PassId(0), 0, 300);
        let station = state.station(StationId(0));

        // Hard gap alone: ready at 600, 600 + 300 <= 1000.
        let plain = plain_model().evaluate(&passes, &passes[1], station).unwrap();
        assert_eq!(plain.slots[0].earliest_start, Some(600));

        // Linear delay of 150 on the only loaded antenna pushes it past 700.
        let penalised = ConflictModel::new(
            Some(LoadPenalty {
                mode: PenaltyMode::Linear,
                factor: 150.0,
            }),
            LoadMetric::BusyTime,
            ScoreWeights::default(),
        )
        .evaluate(&passes, &passes[1], station)
        .unwrap();
        assert_eq!(penalised.slots[0].earliest_start, None);
        assert_eq!(penalised.slots[1].earliest_start, Some(100));
    }

    #[test]
    fn test_weighted_loads_are_normalised() {
        let mut state = SchedulerState::new([(StationId(0), "CM", 2)]).unwrap();
        let ant0 = AntennaId::from_index(0).unwrap();
        state.commit(StationId(0), ant0, PassId(0), 0, 600);
        let loads = antenna_loads(
            state.station(StationId(0)),
            LoadMetric::Weighted,
            ScoreWeights::default(),
        );
        assert!((loads[0] - 1.0).abs() < 1e-10);
        assert_eq!(loads[1], 0.0);
    }

    #[test]
    fn test_weighted_penalty_uses_raw_blend() {
        let mut state = SchedulerState::new([(StationId(0), "CM", 2)]).unwrap();
        let ant0 = AntennaId::from_index(0).unwrap();
        let ant1 = AntennaId::from_index(1).unwrap();
        state.commit(StationId(0), ant0, PassId(0), 0, 150);
        state.commit(StationId(0), ant0, PassId(1), 200, 350);
        state.commit(StationId(0), ant1, PassId(2), 0, 900);
        let model = ConflictModel::new(
            Some(LoadPenalty {
                mode: PenaltyMode::Linear,
                factor: 100.0,
            }),
            LoadMetric::Weighted,
            ScoreWeights::default(),
        );

        // 0.3 * 2 + 0.7 * 300 against 0.3 * 1 + 0.7 * 900.
        let delays = model.delays(state.station(StationId(0)));
        assert!((delays[0] - 100.0 * 210.6 / 630.3).abs() < 1e-9);
        assert!((delays[1] - 100.0).abs() < 1e-9);
    }
}
