//! Dataset builders shared by the test suites.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::dataset::builder::{build_availability, BuilderOptions};
use crate::dataset::types::{Availability, Dataset, ObservationRecord, Phase, StationData};

pub fn record(sat: &str, lap: u32, phase: Phase, start: i64, end: i64) -> ObservationRecord {
    ObservationRecord {
        satellite: sat.to_string(),
        lap,
        phase,
        start,
        end,
    }
}

pub fn station(name: &str, antennas: usize, records: Vec<ObservationRecord>) -> StationData {
    StationData {
        name: name.to_string(),
        antenna_count: antennas,
        band: None,
        record_sets: vec![records; antennas],
    }
}

pub fn availability(stations: Vec<StationData>) -> Availability {
    build_availability(&Dataset { stations }, &BuilderOptions::default())
        .expect("fixture dataset builds")
}

/// A pseudo-random constellation seen from several stations with
/// overlapping windows, deterministic for a given seed.
pub fn synthetic_dataset(seed: u64, station_count: usize, satellites: usize) -> Dataset {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut stations: Vec<Vec<ObservationRecord>> = vec![Vec::new(); station_count];

    for sat in 0..satellites {
        let name = format!("SAT-{sat:02}");
        let mut t = rng.gen_range(0..3_000);
        for lap in 1..=6u32 {
            t += rng.gen_range(4_000..7_000);
            let phase = if lap <= 2 { Phase::Climb } else { Phase::Operation };
            for records in stations.iter_mut() {
                if rng.gen_bool(0.35) {
                    continue;
                }
                let start = t + rng.gen_range(-400..400);
                let length = rng.gen_range(200..1_200);
                records.push(record(&name, lap, phase, start, start + length));
            }
        }
    }

    Dataset {
        stations: stations
            .into_iter()
            .enumerate()
            .map(|(idx, records)| {
                let antennas = 1 + idx % 3;
                let mut data = station(&format!("GS{idx}"), antennas, records);
                if data.record_sets.iter().all(Vec::is_empty) {
                    data.record_sets[0].push(record("SAT-99", 1, Phase::Climb, 0, 900));
                }
                data
            })
            .collect(),
    }
}

pub fn synthetic_availability(seed: u64) -> Availability {
    build_availability(&synthetic_dataset(seed, 4, 8), &BuilderOptions::default())
        .expect("synthetic dataset builds")
}
