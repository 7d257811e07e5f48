use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// Main configuration structure for Faultline.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub analysis: AnalysisConfig,

    #[serde(default)]
    pub prediction: PredictionConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Longest analysis window `validate` accepts (one week)
pub const MAX_WINDOW_MS: u64 = 7 * 24 * 60 * 60 * 1000;

impl Config {
    /// Parse a TOML config file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Load and validate a config file. A missing file means defaults; a file
    /// that exists but does not parse or validate is an error.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let config = if path.exists() {
            Self::from_file(path)?
        } else {
            tracing::debug!("No config file at {}, using defaults", path.display());
            Self::default()
        };

        config.validate()?;
        Ok(config)
    }

    /// Default configuration rendered as TOML, as written by `faultline default-config`.
    pub fn default_toml() -> Result<String> {
        toml::to_string_pretty(&Self::default()).context("Failed to render default config")
    }

    /// Validate the configuration for obvious misconfiguration.
    pub fn validate(&self) -> Result<()> {
        let analysis = &self.analysis;

        let threshold = analysis.anomaly_threshold_std_dev;
        if threshold.is_nan() || threshold <= 0.0 {
            anyhow::bail!("anomaly_threshold_std_dev must be positive, got {}", threshold);
        }

        if analysis.cascade_window_ms == 0 || analysis.cascade_window_ms > MAX_WINDOW_MS {
            anyhow::bail!(
                "cascade_window_ms must be within 1..={}, got {}",
                MAX_WINDOW_MS,
                analysis.cascade_window_ms
            );
        }

        if analysis.cascade_gap_divisor == 0 {
            anyhow::bail!("cascade_gap_divisor cannot be 0");
        }

        if analysis.cascade_min_size < 2 {
            anyhow::bail!(
                "cascade_min_size must be at least 2, got {}",
                analysis.cascade_min_size
            );
        }

        if analysis.error_burst_window_ms == 0 || analysis.error_burst_window_ms > MAX_WINDOW_MS {
            anyhow::bail!(
                "error_burst_window_ms must be within 1..={}, got {}",
                MAX_WINDOW_MS,
                analysis.error_burst_window_ms
            );
        }

        let prediction = &self.prediction;

        if prediction.match_threshold.is_nan()
            || prediction.match_threshold <= 0.0
            || prediction.match_threshold >= 1.0
        {
            anyhow::bail!(
                "prediction match_threshold must be within (0, 1), got {}",
                prediction.match_threshold
            );
        }

        if prediction.latency_threshold_ms == 0 || prediction.timeout_ms == 0 {
            anyhow::bail!("latency_threshold_ms and timeout_ms must be greater than 0");
        }

        if prediction.recent_window < 3 {
            anyhow::bail!(
                "recent_window must cover at least 3 spans, got {}",
                prediction.recent_window
            );
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => anyhow::bail!("Invalid log level: {}", other),
        }

        Ok(())
    }
}

impl FromStr for Config {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        toml::from_str(s).context("Failed to parse TOML config")
    }
}

/// Thresholds for anomaly detection and cascade grouping.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnalysisConfig {
    /// z-score a duration must exceed to count as a latency spike
    #[serde(default = "default_anomaly_threshold")]
    pub anomaly_threshold_std_dev: f64,

    /// How far back cascade grouping looks for ungrouped anomalies
    #[serde(default = "default_cascade_window")]
    pub cascade_window_ms: u64,

    /// Consecutive anomalies further apart than `cascade_window_ms / cascade_gap_divisor`
    /// start a new cascade
    #[serde(default = "default_cascade_gap_divisor")]
    pub cascade_gap_divisor: u64,

    #[serde(default = "default_cascade_min_size")]
    pub cascade_min_size: usize,

    #[serde(default = "default_error_burst_window")]
    pub error_burst_window_ms: u64,

    /// An error burst needs strictly more errors than this inside the window
    #[serde(default = "default_error_burst_min_errors")]
    pub error_burst_min_errors: usize,
}

impl AnalysisConfig {
    /// Largest gap allowed between neighbours in one cascade.
    pub fn cascade_gap_ms(&self) -> i64 {
        i64::try_from(self.cascade_window_ms / self.cascade_gap_divisor.max(1)).unwrap_or(i64::MAX)
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            anomaly_threshold_std_dev: default_anomaly_threshold(),
            cascade_window_ms: default_cascade_window(),
            cascade_gap_divisor: default_cascade_gap_divisor(),
            cascade_min_size: default_cascade_min_size(),
            error_burst_window_ms: default_error_burst_window(),
            error_burst_min_errors: default_error_burst_min_errors(),
        }
    }
}

/// Failure prediction tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PredictionConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// A pattern fires when its matched weight ratio is strictly above this
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f64,

    /// Mean latency the latency indicators compare against
    #[serde(default = "default_latency_threshold")]
    pub latency_threshold_ms: u64,

    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,

    /// Number of most recent spans the windowed indicators look at
    #[serde(default = "default_recent_window")]
    pub recent_window: usize,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            match_threshold: default_match_threshold(),
            latency_threshold_ms: default_latency_threshold(),
            timeout_ms: default_timeout(),
            recent_window: default_recent_window(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub include_modules: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            include_modules: false,
        }
    }
}

// Default providers ---------------------------------------------------------

fn default_true() -> bool {
    true
}

fn default_anomaly_threshold() -> f64 {
    2.5
}

fn default_cascade_window() -> u64 {
    30_000
}

fn default_cascade_gap_divisor() -> u64 {
    3
}

fn default_cascade_min_size() -> usize {
    3
}

fn default_error_burst_window() -> u64 {
    60_000
}

fn default_error_burst_min_errors() -> usize {
    5
}

fn default_match_threshold() -> f64 {
    0.5
}

fn default_latency_threshold() -> u64 {
    5_000
}

fn default_timeout() -> u64 {
    30_000
}

fn default_recent_window() -> usize {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

// Tests ---------------------------------------------------------------------
