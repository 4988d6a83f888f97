use std::collections::{BTreeMap, HashMap};

use crate::dataset::error::DatasetError;
use crate::dataset::types::{
    Availability, BuildStats, Dataset, EventBatch, Pass, PassId, PassKey, ShortRecord, StationId,
    StationInfo, VisibilityWindow,
};
use crate::timing::{Timestamp, MAX_ANTENNAS_PER_STATION, MIN_TASK_DURATION};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BuilderOptions {
    /// Intervals of one pass at one station separated by at most this many
    /// seconds are unioned into a single window.
    pub merge_gap: i64,
}

impl Default for BuilderOptions {
    fn default() -> Self {
        Self { merge_gap: 60 }
    }
}

/// Turn raw station record sets into per-pass visibility windows and the
/// event timeline the scheduler walks.
pub fn build_availability(
    dataset: &Dataset,
    options: &BuilderOptions,
) -> Result<Availability, DatasetError> {
    if dataset.stations.is_empty() {
        return Err(DatasetError::InputUnavailable(
            "dataset contains no stations".to_string(),
        ));
    }

    let mut stations = Vec::with_capacity(dataset.stations.len());
    for (idx, station) in dataset.stations.iter().enumerate() {
        if station.record_sets.iter().all(|set| set.is_empty()) {
            return Err(DatasetError::InputUnavailable(format!(
                "station {} has no visibility records",
                station.name
            )));
        }
        if station.antenna_count == 0 || station.antenna_count > MAX_ANTENNAS_PER_STATION {
            return Err(DatasetError::AntennaCount {
                station: station.name.clone(),
                count: station.antenna_count,
                max: MAX_ANTENNAS_PER_STATION,
            });
        }
        stations.push(StationInfo {
            id: StationId(idx),
            name: station.name.clone(),
            antenna_count: station.antenna_count,
            band: station.band.clone(),
        });
    }

    let station_count = stations.len();
    let mut stats = BuildStats::default();
    let mut ids: HashMap<PassKey, PassId> = HashMap::new();
    let mut keys: Vec<PassKey> = Vec::new();
    // [pass][station] -> qualifying intervals
    let mut intervals: Vec<Vec<Vec<(Timestamp, Timestamp)>>> = Vec::new();
    let mut short_records = Vec::new();

    for (s_idx, station) in dataset.stations.iter().enumerate() {
        for record in station.record_sets.iter().flatten() {
            let key = record.key();
            if record.end < record.start {
                return Err(DatasetError::InvalidRecord {
                    station: station.name.clone(),
                    key: key.to_string(),
                    message: format!("stop {} precedes start {}", record.end, record.start),
                });
            }
            stats.total_records += 1;

            let id = *ids.entry(key.clone()).or_insert_with(|| {
                keys.push(key);
                intervals.push(vec![Vec::new(); station_count]);
                PassId(keys.len() - 1)
            });

            if record.duration() < MIN_TASK_DURATION {
                stats.short_records += 1;
                short_records.push(ShortRecord {
                    pass: id,
                    station: StationId(s_idx),
                    start: record.start,
                    end: record.end,
                });
                continue;
            }
            intervals[id.index()][s_idx].push((record.start, record.end));
        }
    }

    let mut passes = Vec::with_capacity(keys.len());
    for (p_idx, (key, per_station)) in keys.into_iter().zip(intervals).enumerate() {
        let mut windows = Vec::with_capacity(station_count);
        for (s_idx, mut list) in per_station.into_iter().enumerate() {
            let raw = list.len();
            let merged = collapse(&mut list, options.merge_gap);
            if merged.len() > 1 {
                log::debug!(
                    "{} at {}: keeping earliest of {} disjoint windows",
                    key,
                    stations[s_idx].name,
                    merged.len()
                );
                stats.dropped_windows += merged.len() - 1;
            }
            stats.merged_intervals += raw.saturating_sub(merged.len());
            windows.push(merged.first().copied());
        }
        passes.push(Pass {
            id: PassId(p_idx),
            key,
            windows,
        });
    }

    let mut batches: BTreeMap<Timestamp, Vec<PassId>> = BTreeMap::new();
    let mut unschedulable = Vec::new();
    for pass in &passes {
        match pass.earliest_start() {
            Some(start) => batches.entry(start).or_default().push(pass.id),
            None => unschedulable.push(pass.id),
        }
    }
    let timeline = batches
        .into_iter()
        .map(|(time, passes)| EventBatch { time, passes })
        .collect();

    if stats.dropped_windows > 0 {
        log::warn!(
            "{} disjoint visibility windows dropped while collapsing",
            stats.dropped_windows
        );
    }
    log::info!(
        "Built availability: {} stations, {} passes ({} unschedulable), {} records ({} short)",
        stations.len(),
        passes.len(),
        unschedulable.len(),
        stats.total_records,
        stats.short_records
    );

    Ok(Availability {
        stations,
        passes,
        timeline,
        unschedulable,
        short_records,
        stats,
    })
}

/// Sort and union intervals that overlap or lie within `merge_gap` of each other.
fn collapse(list: &mut [(Timestamp, Timestamp)], merge_gap: i64) -> Vec<VisibilityWindow> {
    list.sort_unstable();
    let mut merged: Vec<VisibilityWindow> = Vec::new();
    for &(start, end) in list.iter() {
        match merged.last_mut() {
            Some(last) if start <= last.end + merge_gap => last.end = last.end.max(end),
            _ => merged.push(VisibilityWindow::new(start, end)),
        }
    }
    merged
}
