use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Input unavailable: {0}")]
    InputUnavailable(String),
    #[error("Station {station}: antenna count {count} outside 1..={max}")]
    AntennaCount {
        station: String,
        count: usize,
        max: usize,
    },
    #[error("Station {station}: invalid record for {key}: {message}")]
    InvalidRecord {
        station: String,
        key: String,
        message: String,
    },
    #[error("Dataset read error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error in {file}: {source}")]
    Csv {
        file: String,
        #[source]
        source: csv::Error,
    },
    #[error("Missing column {column} in {file}")]
    MissingColumn { file: String, column: &'static str },
    #[error("Invalid row {row} in {file}: {message}")]
    InvalidRow {
        file: String,
        row: usize,
        message: String,
    },
    #[error("YAML dataset error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
