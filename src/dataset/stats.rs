use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use crate::dataset::types::{Availability, Dataset, Phase};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationStats {
    pub name: String,
    pub antennas: usize,
    pub band: Option<String>,
    pub records: usize,
    pub passes: usize,
    pub observable_seconds: i64,
}

/// Summary of a dataset and the availability built from it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetStats {
    pub stations: Vec<StationStats>,
    pub satellites: usize,
    pub passes: usize,
    pub climb_passes: usize,
    pub operation_passes: usize,
    pub unschedulable: usize,
    pub total_records: usize,
    pub short_records: usize,
    pub dropped_windows: usize,
}

impl DatasetStats {
    pub fn collect(dataset: &Dataset, availability: &Availability) -> Self {
        let observable = availability.observable_seconds();
        let stations = dataset
            .stations
            .iter()
            .zip(&availability.stations)
            .map(|(data, info)| StationStats {
                name: info.name.clone(),
                antennas: info.antenna_count,
                band: info.band.clone(),
                records: data.record_sets.iter().map(Vec::len).sum(),
                passes: availability
                    .passes
                    .iter()
                    .filter(|p| p.window(info.id).is_some())
                    .count(),
                observable_seconds: observable[info.id.index()],
            })
            .collect();

        let satellites: BTreeSet<&str> = availability
            .passes
            .iter()
            .map(|p| p.key.satellite.as_str())
            .collect();
        let climb_passes = availability
            .passes
            .iter()
            .filter(|p| p.key.phase == Phase::Climb)
            .count();

        Self {
            stations,
            satellites: satellites.len(),
            passes: availability.passes.len(),
            climb_passes,
            operation_passes: availability.passes.len() - climb_passes,
            unschedulable: availability.unschedulable.len(),
            total_records: availability.stats.total_records,
            short_records: availability.stats.short_records,
            dropped_windows: availability.stats.dropped_windows,
        }
    }
}

impl fmt::Display for DatasetStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Satellites:      {}", self.satellites)?;
        writeln!(
            f,
            "Passes:          {} ({} climb, {} operation, {} unschedulable)",
            self.passes, self.climb_passes, self.operation_passes, self.unschedulable
        )?;
        writeln!(
            f,
            "Records:         {} ({} shorter than 300s)",
            self.total_records, self.short_records
        )?;
        if self.dropped_windows > 0 {
            writeln!(f, "Dropped windows: {}", self.dropped_windows)?;
        }
        writeln!(f, "Stations:")?;
        for s in &self.stations {
            writeln!(
                f,
                "  {:<12} antennas={:<3} band={:<6} records={:<6} passes={:<6} visible={}",
                s.name,
                s.antennas,
                s.band.as_deref().unwrap_or("-"),
                s.records,
                s.passes,
                humantime::format_duration(std::time::Duration::from_secs(
                    s.observable_seconds.max(0) as u64
                ))
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::builder::{build_availability, BuilderOptions};
    use crate::dataset::types::{ObservationRecord, StationData};

    #[test]
    fn test_collect_stats() {
        let rec = |sat: &str, lap, phase, start, end| ObservationRecord {
            satellite: String::from(sat),
            lap,
            phase,
            start,
            end,
        };
        let dataset = Dataset {
            stations: vec![StationData {
                name: "CM".into(),
                antenna_count: 2,
                band: Some("QV".into()),
                record_sets: vec![
                    vec![
                        rec("SAT-1", 1, Phase::Climb, 0, 600),
                        rec("SAT-2", 1, Phase::Operation, 1000, 1100),
                    ];
                    2
                ],
            }],
        };
        let availability = build_availability(&dataset, &BuilderOptions::default()).unwrap();
        let stats = DatasetStats::collect(&dataset, &availability);

        assert_eq!(stats.satellites, 2);
        assert_eq!(stats.passes, 2);
        assert_eq!(stats.climb_passes, 1);
        assert_eq!(stats.unschedulable, 1);
        assert_eq!(stats.short_records, 2);
        assert_eq!(stats.stations[0].records, 4);
        assert_eq!(stats.stations[0].passes, 1);
        assert_eq!(stats.stations[0].observable_seconds, 600);
        assert!(stats.to_string().contains("CM"));
    }
}
