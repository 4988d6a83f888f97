use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum_macros::Display;

use crate::annealing::AnnealingStats;
use crate::config::Config;
use crate::dataset::DatasetStats;
use crate::output::error::OutputError;
use crate::scheduler::{PlanFile, RunSummary};
use crate::validation::ValidationReport;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Yaml,
    Json,
}

impl OutputFormat {
    fn extension(self) -> &'static str {
        match self {
            OutputFormat::Yaml => "yaml",
            OutputFormat::Json => "json",
        }
    }

    fn render<T: Serialize>(self, value: &T) -> Result<String, OutputError> {
        Ok(match self {
            OutputFormat::Yaml => serde_yaml::to_string(value)?,
            OutputFormat::Json => serde_json::to_string_pretty(value)?,
        })
    }
}

impl FromStr for OutputFormat {
    type Err = OutputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Ok(OutputFormat::Yaml),
            "json" => Ok(OutputFormat::Json),
            other => Err(OutputError::UnknownFormat(other.to_string())),
        }
    }
}

/// Run identifier: UTC start time followed by a random UUID.
pub fn generate_run_id(start: DateTime<Utc>) -> String {
    let uuid = uuid::Uuid::new_v4();
    let timestamp = start.format("%Y%m%dT%H%M%SZ");
    format!("{}_{}", timestamp, uuid)
}

/// Writes the files of one scheduling run under `<base>/runs/<run_id>/`.
pub struct ArtifactsManager {
    run_dir: PathBuf,
    format: OutputFormat,
    run_log: RunLog,
}

impl ArtifactsManager {
    pub fn new(base_dir: &Path, run_id: &str, format: OutputFormat) -> Result<Self, OutputError> {
        let run_dir = base_dir.join("runs").join(run_id);
        fs::create_dir_all(&run_dir)?;
        Ok(Self {
            run_dir,
            format,
            run_log: RunLog::new(run_id.to_string()),
        })
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn write_plan(&self, plan: &PlanFile) -> Result<PathBuf, OutputError> {
        self.write("plan", plan)
    }

    pub fn write_validation(&self, report: &ValidationReport) -> Result<PathBuf, OutputError> {
        self.write("validation", report)
    }

    pub fn record_dataset(&mut self, source: &Path, stats: DatasetStats) {
        self.run_log.dataset = Some(source.display().to_string());
        self.run_log.dataset_stats = Some(stats);
    }

    pub fn record_config(&mut self, config: &Config) {
        self.run_log.config = Some(config.clone());
    }

    pub fn record_summary(&mut self, summary: RunSummary) {
        self.run_log.summary = Some(summary);
    }

    pub fn record_annealing(&mut self, stats: AnnealingStats) {
        self.run_log.annealing = Some(stats);
    }

    pub fn record_violations(&mut self, count: usize) {
        self.run_log.violations = Some(count);
    }

    /// Stamps the completion time and writes `run_log.yaml`.
    pub fn finish(&mut self) -> Result<PathBuf, OutputError> {
        self.run_log.completed_at = Some(Utc::now());
        let path = self.run_dir.join("run_log.yaml");
        fs::write(&path, serde_yaml::to_string(&self.run_log)?)?;
        Ok(path)
    }

    fn write<T: Serialize>(&self, name: &str, value: &T) -> Result<PathBuf, OutputError> {
        let path = self
            .run_dir
            .join(format!("{}.{}", name, self.format.extension()));
        fs::write(&path, self.format.render(value)?)?;
        log::debug!("Wrote {}", path.display());
        Ok(path)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunLog {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub dataset: Option<String>,
    pub dataset_stats: Option<DatasetStats>,
    pub config: Option<Config>,
    pub summary: Option<RunSummary>,
    pub annealing: Option<AnnealingStats>,
    pub violations: Option<usize>,
}

impl RunLog {
    pub fn new(run_id: String) -> Self {
        Self {
            run_id,
            started_at: Utc::now(),
            completed_at: None,
            dataset: None,
            dataset_stats: None,
            config: None,
            summary: None,
            annealing: None,
            violations: None,
        }
    }
}
