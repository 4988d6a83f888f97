use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::dataset::{BuilderOptions, Phase, StationOverrides};
use crate::scheduler::{LoadMetric, PenaltyMode, RankingMethod, ScoreWeights};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Run the reallocation resolver when greedy placement fails.
    #[serde(default = "default_true")]
    pub optimization: bool,
    #[serde(default = "default_ranking")]
    pub ranking_method: RankingMethod,
    #[serde(default)]
    pub load_balance: LoadBalanceConfig,
    #[serde(default)]
    pub load_penalty: LoadPenaltyConfig,
    #[serde(default)]
    pub station_score: ScoreWeights,
    #[serde(default)]
    pub bands: BandPreference,
    #[serde(default)]
    pub reallocation: ReallocationConfig,
    #[serde(default)]
    pub annealing: AnnealingConfig,
    #[serde(default)]
    pub dataset: DatasetConfig,
}

fn default_true() -> bool {
    true
}

fn default_ranking() -> RankingMethod {
    RankingMethod::C
}

impl Default for Config {
    fn default() -> Self {
        Self {
            optimization: true,
            ranking_method: default_ranking(),
            load_balance: LoadBalanceConfig::default(),
            load_penalty: LoadPenaltyConfig::default(),
            station_score: ScoreWeights::default(),
            bands: BandPreference::default(),
            reallocation: ReallocationConfig::default(),
            annealing: AnnealingConfig::default(),
            dataset: DatasetConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoadBalanceConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metric")]
    pub metric: LoadMetric,
    #[serde(default = "default_weight_task")]
    pub weight_task: f64,
    #[serde(default = "default_weight_time")]
    pub weight_time: f64,
}

fn default_metric() -> LoadMetric {
    LoadMetric::BusyTime
}

fn default_weight_task() -> f64 {
    0.3
}

fn default_weight_time() -> f64 {
    0.7
}

impl LoadBalanceConfig {
    pub fn weights(&self) -> ScoreWeights {
        ScoreWeights {
            weight_task: self.weight_task,
            weight_time: self.weight_time,
        }
    }
}

impl Default for LoadBalanceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            metric: default_metric(),
            weight_task: default_weight_task(),
            weight_time: default_weight_time(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoadPenaltyConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_penalty_mode")]
    pub mode: PenaltyMode,
    #[serde(default = "default_penalty_factor")]
    pub factor: f64,
}

fn default_penalty_mode() -> PenaltyMode {
    PenaltyMode::Exponential
}

fn default_penalty_factor() -> f64 {
    150.0
}

impl Default for LoadPenaltyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: default_penalty_mode(),
            factor: default_penalty_factor(),
        }
    }
}

/// Preferred frequency band per phase. Stations of that band are tried first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BandPreference {
    #[serde(default)]
    pub climb: Option<String>,
    #[serde(default)]
    pub operation: Option<String>,
}

impl BandPreference {
    /// Whether a station of `band` is preferred for `phase`. Always true when
    /// no band is configured for the phase.
    pub fn matches(&self, phase: Phase, band: Option<&str>) -> bool {
        let preferred = match phase {
            Phase::Climb => self.climb.as_deref(),
            Phase::Operation => self.operation.as_deref(),
        };
        preferred.map_or(true, |p| band == Some(p))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReallocationConfig {
    /// Passes in the search window, the failing one included. 0 removes the
    /// cap; `max_nodes` still bounds the search.
    #[serde(default = "default_max_window")]
    pub max_window: usize,
    /// Placement attempts allowed per failing pass.
    #[serde(default = "default_max_nodes")]
    pub max_nodes: usize,
}

fn default_max_window() -> usize {
    6
}

fn default_max_nodes() -> usize {
    100_000
}

impl Default for ReallocationConfig {
    fn default() -> Self {
        Self {
            max_window: default_max_window(),
            max_nodes: default_max_nodes(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnnealingConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(
        default = "default_time_budget",
        serialize_with = "serialize_duration",
        deserialize_with = "deserialize_duration"
    )]
    pub time_budget: Duration,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_time_budget() -> Duration {
    Duration::from_secs(300)
}

fn default_seed() -> u64 {
    42
}

impl Default for AnnealingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            time_budget: default_time_budget(),
            seed: default_seed(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetConfig {
    #[serde(
        default = "default_merge_gap",
        serialize_with = "serialize_duration",
        deserialize_with = "deserialize_duration"
    )]
    pub merge_gap: Duration,
    #[serde(default)]
    pub stations: StationOverrides,
}

fn default_merge_gap() -> Duration {
    Duration::from_secs(60)
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            merge_gap: default_merge_gap(),
            stations: StationOverrides::new(),
        }
    }
}

impl DatasetConfig {
    pub fn builder_options(&self) -> BuilderOptions {
        BuilderOptions {
            merge_gap: self.merge_gap.as_secs() as i64,
        }
    }
}

fn serialize_duration<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&humantime::format_duration(*value).to_string())
}

fn deserialize_duration<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let s = String::deserialize(deserializer)?;
    humantime::parse_duration(s.trim()).map_err(serde::de::Error::custom)
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let weights = [
            self.load_balance.weight_task,
            self.load_balance.weight_time,
            self.station_score.weight_task,
            self.station_score.weight_time,
        ];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(ConfigError::Invalid(
                "load weights must be non-negative".to_string(),
            ));
        }
        if !self.load_penalty.factor.is_finite() || self.load_penalty.factor < 0.0 {
            return Err(ConfigError::Invalid(
                "load_penalty.factor must be non-negative".to_string(),
            ));
        }
        if self.reallocation.max_window == 1 {
            return Err(ConfigError::Invalid(
                "reallocation.max_window must be 0 (unbounded) or at least 2".to_string(),
            ));
        }
        if self.annealing.time_budget.is_zero() {
            return Err(ConfigError::Invalid(
                "annealing.time_budget must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_document() {
        let config = Config::from_str("{}").unwrap();
        assert_eq!(config, Config::default());
        assert!(config.optimization);
        assert_eq!(config.ranking_method, RankingMethod::C);
        assert_eq!(config.load_penalty.mode, PenaltyMode::Exponential);
        assert_eq!(config.load_penalty.factor, 150.0);
        assert_eq!(config.annealing.time_budget, Duration::from_secs(300));
        assert_eq!(config.annealing.seed, 42);
        assert_eq!(config.dataset.builder_options().merge_gap, 60);
    }

    #[test]
    fn test_full_document() {
        let yaml = r#"
optimization: false
ranking_method: A
load_balance:
  enabled: true
  metric: weighted
load_penalty:
  mode: adaptive
  factor: 90
bands:
  climb: S
reallocation:
  max_window: 4
annealing:
  enabled: true
  time_budget: 1m 30s
  seed: 7
dataset:
  merge_gap: 2m
  stations:
    CM: { antennas: 6, band: QV }
"#;
        let config = Config::from_str(yaml).unwrap();
        assert!(!config.optimization);
        assert_eq!(config.ranking_method, RankingMethod::A);
        assert!(config.load_balance.enabled);
        assert_eq!(config.load_balance.metric, LoadMetric::Weighted);
        assert_eq!(config.load_balance.weight_time, 0.7);
        assert_eq!(config.load_penalty.mode, PenaltyMode::Adaptive);
        assert!(config.load_penalty.enabled);
        assert_eq!(config.bands.climb.as_deref(), Some("S"));
        assert_eq!(config.bands.operation, None);
        assert_eq!(config.reallocation.max_window, 4);
        assert_eq!(config.reallocation.max_nodes, 100_000);
        assert_eq!(config.annealing.time_budget, Duration::from_secs(90));
        assert_eq!(config.dataset.merge_gap, Duration::from_secs(120));
        assert_eq!(config.dataset.stations["CM"].antennas, Some(6));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            Config::from_str("reallocation: { max_window: 1 }"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::from_str("station_score: { weight_task: -1, weight_time: 0.7 }"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::from_str("ranking_method: Z"),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn test_zero_window_means_unbounded() {
        let config = Config::from_str("reallocation: { max_window: 0 }").unwrap();
        assert_eq!(config.reallocation.max_window, 0);
        assert_eq!(config.reallocation.max_nodes, 100_000);
    }

    #[test]
    fn test_round_trip_keeps_durations_readable() {
        let yaml = serde_yaml::to_string(&Config::default()).unwrap();
        assert!(yaml.contains("time_budget: 5m"));
        assert_eq!(Config::from_str(&yaml).unwrap(), Config::default());
    }
}
