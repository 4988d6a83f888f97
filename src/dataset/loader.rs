use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime};
use csv::{ReaderBuilder, StringRecord, Trim};
use serde::Deserialize;

use crate::dataset::error::DatasetError;
use crate::dataset::types::{Dataset, ObservationRecord, Phase, StationData, StationOverride};
use crate::timing::Timestamp;

pub type StationOverrides = BTreeMap<String, StationOverride>;

const SATELLITE_COLUMNS: &[&str] = &["sat", "Sat", "satellite"];
const LAP_COLUMNS: &[&str] = &["laps", "Laps", "lap"];
const PHASE_COLUMNS: &[&str] = &["Status", "status", "phase"];
const START_COLUMNS: &[&str] = &["start(UTC)", "start", "Start"];
const STOP_COLUMNS: &[&str] = &["stop(UTC)", "stop", "Stop", "end"];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%d %b %Y %H:%M:%S%.f",
];

/// Load a dataset from a CSV directory or a YAML file.
pub fn load_dataset(path: &Path, overrides: &StationOverrides) -> Result<Dataset, DatasetError> {
    if path.is_dir() {
        return load_csv_dir(path, overrides);
    }
    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => load_yaml(path, overrides),
        _ => Err(DatasetError::InputUnavailable(format!(
            "{} is neither a dataset directory nor a YAML file",
            path.display()
        ))),
    }
}

/// Each sub-directory of `root` is a station, each CSV file within it one
/// antenna's record set.
pub fn load_csv_dir(root: &Path, overrides: &StationOverrides) -> Result<Dataset, DatasetError> {
    if !root.exists() {
        return Err(DatasetError::InputUnavailable(format!(
            "dataset directory not found: {}",
            root.display()
        )));
    }

    let mut station_dirs: Vec<PathBuf> = Vec::new();
    for entry in fs::read_dir(root)? {
        let path = entry?.path();
        if path.is_dir() {
            station_dirs.push(path);
        }
    }
    station_dirs.sort();

    let mut dataset = Dataset::default();
    for dir in station_dirs {
        let name = dir
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();

        let mut files = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "csv") {
                files.push(path);
            }
        }
        files.sort();

        let mut record_sets = Vec::with_capacity(files.len());
        for file in &files {
            match parse_csv_file(file) {
                Ok(records) => record_sets.push(records),
                Err(e) => {
                    log::warn!("Failed to parse record file {}: {}", file.display(), e);
                }
            }
        }

        let station_override = overrides.get(&name);
        let antenna_count = station_override
            .and_then(|o| o.antennas)
            .unwrap_or(record_sets.len());
        log::debug!(
            "Loaded station {} ({} record sets, {} antennas)",
            name,
            record_sets.len(),
            antenna_count
        );
        dataset.stations.push(StationData {
            name,
            antenna_count,
            band: station_override.and_then(|o| o.band.clone()),
            record_sets,
        });
    }

    ensure_configured_stations(&dataset, overrides)?;
    Ok(dataset)
}

/// Parse one antenna's record file.
pub fn parse_csv_file(path: &Path) -> Result<Vec<ObservationRecord>, DatasetError> {
    let file = path.display().to_string();
    let csv_error = |source| DatasetError::Csv {
        file: file.clone(),
        source,
    };

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .from_path(path)
        .map_err(csv_error)?;
    let headers = reader.headers().map_err(csv_error)?.clone();

    let column = |aliases: &[&str], name: &'static str| {
        headers
            .iter()
            .position(|h| aliases.contains(&h))
            .ok_or_else(|| DatasetError::MissingColumn {
                file: file.clone(),
                column: name,
            })
    };
    let sat_col = column(SATELLITE_COLUMNS, "sat")?;
    let lap_col = column(LAP_COLUMNS, "laps")?;
    let phase_col = column(PHASE_COLUMNS, "Status")?;
    let start_col = column(START_COLUMNS, "start(UTC)")?;
    let stop_col = column(STOP_COLUMNS, "stop(UTC)")?;

    let mut records = Vec::new();
    for (idx, row) in reader.records().enumerate() {
        let row = row.map_err(csv_error)?;
        if row.iter().all(|field| field.is_empty()) {
            continue;
        }
        // Header is line 1.
        let line = idx + 2;
        let invalid = |message: String| DatasetError::InvalidRow {
            file: file.clone(),
            row: line,
            message,
        };
        let field = |col: usize| row.get(col).unwrap_or_default();

        let lap = parse_lap(field(lap_col))
            .ok_or_else(|| invalid(format!("invalid lap '{}'", field(lap_col))))?;
        let phase: Phase = field(phase_col).parse().map_err(invalid)?;
        let start = time_field(&row, start_col).ok_or_else(|| {
            invalid(format!("invalid start time '{}'", field(start_col)))
        })?;
        let end = time_field(&row, stop_col)
            .ok_or_else(|| invalid(format!("invalid stop time '{}'", field(stop_col))))?;

        records.push(ObservationRecord {
            satellite: field(sat_col).to_string(),
            lap,
            phase,
            start,
            end,
        });
    }

    Ok(records)
}

fn time_field(row: &StringRecord, col: usize) -> Option<Timestamp> {
    row.get(col).and_then(parse_timestamp)
}

fn parse_lap(value: &str) -> Option<u32> {
    value.parse::<u32>().ok().or_else(|| {
        let float = value.parse::<f64>().ok()?;
        (float >= 0.0 && float.fract() == 0.0).then_some(float as u32)
    })
}

/// Accepts RFC 3339, common UTC datetime layouts, or plain UNIX seconds.
pub fn parse_timestamp(value: &str) -> Option<Timestamp> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<i64>() {
        return Some(seconds);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.timestamp());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|dt| dt.and_utc().timestamp())
}

#[derive(Debug, Deserialize)]
struct YamlDataset {
    stations: Vec<YamlStation>,
}

#[derive(Debug, Deserialize)]
struct YamlStation {
    name: String,
    #[serde(default)]
    antennas: Option<usize>,
    #[serde(default)]
    band: Option<String>,
    #[serde(default)]
    records: Vec<YamlRecord>,
}

#[derive(Debug, Deserialize)]
struct YamlRecord {
    #[serde(alias = "sat")]
    satellite: String,
    #[serde(alias = "laps")]
    lap: u32,
    #[serde(alias = "status")]
    phase: Phase,
    start: YamlTime,
    #[serde(alias = "stop")]
    end: YamlTime,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum YamlTime {
    Seconds(i64),
    Text(String),
}

impl YamlTime {
    fn resolve(&self) -> Option<Timestamp> {
        match self {
            YamlTime::Seconds(s) => Some(*s),
            YamlTime::Text(t) => parse_timestamp(t),
        }
    }
}

/// A YAML dataset lists every station's records once; each antenna sees the
/// same records.
pub fn load_yaml(path: &Path, overrides: &StationOverrides) -> Result<Dataset, DatasetError> {
    if !path.exists() {
        return Err(DatasetError::InputUnavailable(format!(
            "dataset file not found: {}",
            path.display()
        )));
    }
    let content = fs::read_to_string(path)?;
    let parsed: YamlDataset = serde_yaml::from_str(&content)?;

    let mut dataset = Dataset::default();
    for station in parsed.stations {
        let mut records = Vec::with_capacity(station.records.len());
        for record in station.records {
            let invalid = |what: &str| DatasetError::InvalidRecord {
                station: station.name.clone(),
                key: format!("{}/{}", record.satellite, record.lap),
                message: format!("unreadable {what} time"),
            };
            let start = record.start.resolve().ok_or_else(|| invalid("start"))?;
            let end = record.end.resolve().ok_or_else(|| invalid("stop"))?;
            records.push(ObservationRecord {
                satellite: record.satellite,
                lap: record.lap,
                phase: record.phase,
                start,
                end,
            });
        }

        let station_override = overrides.get(&station.name);
        let antenna_count = station_override
            .and_then(|o| o.antennas)
            .or(station.antennas)
            .unwrap_or(1);
        let band = station_override
            .and_then(|o| o.band.clone())
            .or(station.band);
        let record_sets = if records.is_empty() {
            Vec::new()
        } else {
            vec![records; antenna_count.max(1)]
        };
        dataset.stations.push(StationData {
            name: station.name,
            antenna_count,
            band,
            record_sets,
        });
    }

    ensure_configured_stations(&dataset, overrides)?;
    Ok(dataset)
}

fn ensure_configured_stations(
    dataset: &Dataset,
    overrides: &StationOverrides,
) -> Result<(), DatasetError> {
    for name in overrides.keys() {
        if !dataset.stations.iter().any(|s| &s.name == name) {
            return Err(DatasetError::InputUnavailable(format!(
                "configured station {name} has no data"
            )));
        }
    }
    Ok(())
}
