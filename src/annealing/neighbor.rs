use std::cmp::Ordering;

use rand::rngs::StdRng;
use rand::Rng;
use serde::Serialize;
use strum_macros::Display;

use crate::annealing::occupancy::Occupancy;
use crate::dataset::{Availability, PassId, StationId};
use crate::scheduler::{AntennaId, Assignment};

const ATTEMPTS: usize = 50;
const SOURCE_STATIONS: usize = 3;
const TARGET_STATIONS: usize = 5;
const TARGET_ANTENNAS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MoveKind {
    TargetedMigration,
    MedianMigration,
    Swap,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Move {
    Migrate {
        from: Assignment,
        to: Assignment,
    },
    Swap {
        first: (Assignment, Assignment),
        second: (Assignment, Assignment),
    },
}

impl Move {
    pub fn apply(&self, occupancy: &mut Occupancy<'_>) {
        match self {
            Move::Migrate { from, to } => {
                occupancy.remove(from.pass);
                occupancy.insert(to.clone());
            }
            Move::Swap { first, second } => {
                occupancy.remove(first.0.pass);
                occupancy.remove(second.0.pass);
                occupancy.insert(first.1.clone());
                occupancy.insert(second.1.clone());
            }
        }
    }

    pub fn revert(&self, occupancy: &mut Occupancy<'_>) {
        match self {
            Move::Migrate { from, to } => {
                occupancy.remove(to.pass);
                occupancy.insert(from.clone());
            }
            Move::Swap { first, second } => {
                occupancy.remove(first.1.pass);
                occupancy.remove(second.1.pass);
                occupancy.insert(first.0.clone());
                occupancy.insert(second.0.clone());
            }
        }
    }
}

/// Draws the move kind (50 % targeted, 30 % median split, 20 % swap) and
/// searches for a feasible move of that kind.
pub fn propose(
    availability: &Availability,
    occupancy: &Occupancy<'_>,
    utilization: &[f64],
    observable: &[i64],
    rng: &mut StdRng,
) -> (MoveKind, Option<Move>) {
    let draw: f64 = rng.gen();
    let mut ranked: Vec<StationId> = (0..utilization.len())
        .filter(|&idx| observable[idx] > 0)
        .map(StationId)
        .collect();
    ranked.sort_by(|a, b| {
        utilization[a.index()]
            .partial_cmp(&utilization[b.index()])
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.cmp(b))
    });

    if draw < 0.5 {
        let mv = targeted_migration(availability, occupancy, utilization, &ranked, rng);
        (MoveKind::TargetedMigration, mv)
    } else if draw < 0.8 {
        let mv = median_migration(availability, occupancy, utilization, &ranked, rng);
        (MoveKind::MedianMigration, mv)
    } else {
        (MoveKind::Swap, swap(availability, occupancy, rng))
    }
}

fn pick<T: Copy>(items: &[T], rng: &mut StdRng) -> Option<T> {
    if items.is_empty() {
        return None;
    }
    Some(items[rng.gen_range(0..items.len())])
}

fn targeted_migration(
    availability: &Availability,
    occupancy: &Occupancy<'_>,
    utilization: &[f64],
    ranked: &[StationId],
    rng: &mut StdRng,
) -> Option<Move> {
    if ranked.len() < 2 {
        return None;
    }
    let low = &ranked[..TARGET_STATIONS.min(ranked.len())];
    let high = &ranked[ranked.len() - SOURCE_STATIONS.min(ranked.len())..];

    for _ in 0..ATTEMPTS {
        let source = pick(high, rng)?;
        let Some(pass_id) = pick(&occupancy.tasks_on(source), rng) else {
            continue;
        };
        let pass = availability.pass(pass_id);
        let from = occupancy.assignment(pass_id)?;

        let mut targets: Vec<(StationId, AntennaId)> = low
            .iter()
            .filter(|&&s| s != source && pass.window(s).is_some())
            .flat_map(|&s| {
                (0..availability.station(s).antenna_count)
                    .filter_map(AntennaId::from_index)
                    .map(move |a| (s, a))
            })
            .collect();
        targets.sort_by(|a, b| {
            utilization[a.0.index()]
                .partial_cmp(&utilization[b.0.index()])
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.cmp(b))
        });

        for &(station, antenna) in targets.iter().take(TARGET_ANTENNAS) {
            if let Some(to) = occupancy.place(pass, station, antenna, &[pass_id]) {
                return Some(Move::Migrate {
                    from: from.clone(),
                    to,
                });
            }
        }
    }
    None
}

fn median_migration(
    availability: &Availability,
    occupancy: &Occupancy<'_>,
    utilization: &[f64],
    ranked: &[StationId],
    rng: &mut StdRng,
) -> Option<Move> {
    if ranked.len() < 2 {
        return None;
    }
    let mid = ranked.len() / 2;
    let median = if ranked.len() % 2 == 0 {
        (utilization[ranked[mid - 1].index()] + utilization[ranked[mid].index()]) / 2.0
    } else {
        utilization[ranked[mid].index()]
    };
    let high: Vec<StationId> = ranked
        .iter()
        .copied()
        .filter(|s| utilization[s.index()] > median)
        .collect();
    let low: Vec<StationId> = ranked
        .iter()
        .copied()
        .filter(|s| utilization[s.index()] < median)
        .collect();
    if high.is_empty() || low.is_empty() {
        return None;
    }

    for _ in 0..ATTEMPTS {
        let source = pick(&high, rng)?;
        let Some(pass_id) = pick(&occupancy.tasks_on(source), rng) else {
            continue;
        };
        let pass = availability.pass(pass_id);
        let targets: Vec<StationId> = low
            .iter()
            .copied()
            .filter(|s| pass.window(*s).is_some())
            .collect();
        let Some(station) = pick(&targets, rng) else {
            continue;
        };
        let antennas = availability.station(station).antenna_count;
        let Some(antenna) = AntennaId::from_index(rng.gen_range(0..antennas)) else {
            continue;
        };
        if let Some(to) = occupancy.place(pass, station, antenna, &[pass_id]) {
            let from = occupancy.assignment(pass_id)?.clone();
            return Some(Move::Migrate { from, to });
        }
    }
    None
}

fn swap(availability: &Availability, occupancy: &Occupancy<'_>, rng: &mut StdRng) -> Option<Move> {
    let tasks: Vec<PassId> = occupancy.assigned_passes();
    if tasks.len() < 2 {
        return None;
    }

    for _ in 0..ATTEMPTS {
        let i = rng.gen_range(0..tasks.len());
        let j = rng.gen_range(0..tasks.len());
        if i == j {
            continue;
        }
        let (a, b) = (
            occupancy.assignment(tasks[i])?,
            occupancy.assignment(tasks[j])?,
        );
        if a.station == b.station && a.antenna == b.antenna {
            continue;
        }
        let ignore = [a.pass, b.pass];
        let pass_a = availability.pass(a.pass);
        let pass_b = availability.pass(b.pass);
        let Some(a_moved) = occupancy.place(pass_a, b.station, b.antenna, &ignore) else {
            continue;
        };
        let Some(b_moved) = occupancy.place(pass_b, a.station, a.antenna, &ignore) else {
            continue;
        };
        return Some(Move::Swap {
            first: (a.clone(), a_moved),
            second: (b.clone(), b_moved),
        });
    }
    None
}
