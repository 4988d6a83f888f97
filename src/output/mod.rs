mod artifacts;
mod error;

pub use artifacts::{generate_run_id, ArtifactsManager, OutputFormat};
pub use error::OutputError;
