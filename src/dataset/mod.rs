pub mod builder;
pub mod error;
#[cfg(test)]
pub mod fixtures;
pub mod loader;
pub mod stats;
pub mod types;

pub use builder::{build_availability, BuilderOptions};
pub use error::DatasetError;
pub use loader::{load_dataset, StationOverrides};
pub use stats::DatasetStats;
pub use types::{Availability, Dataset, Pass, PassId, PassKey, Phase, StationId, VisibilityWindow};
