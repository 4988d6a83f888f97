use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Station {station}: antenna count {count} outside 1..={max}")]
    AntennaCount {
        station: String,
        count: usize,
        max: usize,
    },
    #[error("Invalid scheduler configuration: {0}")]
    InvalidConfig(String),
    #[error("Plan does not match the dataset: {0}")]
    PlanMismatch(String),
}
