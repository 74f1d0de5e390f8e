// Diagnosis configuration
//
// Thresholds of the rule set and parallelism of the service, loadable from a
// TOML file. Every field has a default, so an empty file is a valid config.

use crate::engine::SessionVariables;
use crate::rules::BASELINE;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Settings for a diagnosis run
///
/// # Example
/// ```
/// use tracecause::config::DiagnosisConfig;
///
/// let config = DiagnosisConfig::from_toml_str("baseline = 250.0\nworkers = 2").unwrap();
/// assert_eq!(config.baseline, 250.0);
/// assert_eq!(config.min_calls, 20); // untouched fields keep their defaults
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiagnosisConfig {
    /// Duration (ms) the global context may exceed the accepted operations by
    /// before further operations are taken
    ///
    /// Default: 1000.0
    pub baseline: f64,

    /// Share of the global context duration the accepted operations must
    /// explain before the scan may stop
    ///
    /// Default: 0.8
    pub proportion: f64,

    /// Operations called more often than this are always accepted
    ///
    /// Default: 20
    pub min_calls: usize,

    /// Share of the total exclusive time a problem-context cluster needs to
    /// be chosen without merging further
    ///
    /// Default: 0.8
    pub cluster_significance: f64,

    /// Trees diagnosed concurrently
    ///
    /// Default: available parallelism
    pub workers: usize,

    /// Concurrent firings of one rule within a session
    ///
    /// Default: 1 (sequential)
    pub parallel_firings: usize,
}

impl Default for DiagnosisConfig {
    fn default() -> Self {
        Self {
            baseline: 1000.0,
            proportion: 0.8,
            min_calls: 20,
            cluster_significance: 0.8,
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            parallel_firings: 1,
        }
    }
}

impl DiagnosisConfig {
    /// Load and validate a TOML config file
    pub fn from_toml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).with_context(|| {
            format!("Failed to read config file: {}", path.as_ref().display())
        })?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid config file: {}", path.as_ref().display()))
    }

    /// Parse and validate TOML config text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).context("Failed to parse TOML diagnosis config")?;
        config.validate().map_err(anyhow::Error::msg)?;
        Ok(config)
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if !self.baseline.is_finite() || self.baseline < 0.0 {
            return Err(format!(
                "baseline must be a non-negative duration, got {}",
                self.baseline
            ));
        }

        if !(0.0..=1.0).contains(&self.proportion) {
            return Err(format!(
                "proportion must be in [0, 1], got {}",
                self.proportion
            ));
        }

        if !(0.0..=1.0).contains(&self.cluster_significance) {
            return Err(format!(
                "cluster_significance must be in [0, 1], got {}",
                self.cluster_significance
            ));
        }

        if self.workers == 0 {
            return Err("workers must be at least 1".to_string());
        }

        if self.parallel_firings == 0 {
            return Err("parallel_firings must be at least 1".to_string());
        }

        Ok(())
    }

    /// Session variables every diagnosis session is started with
    pub fn session_variables(&self) -> SessionVariables {
        SessionVariables::new().with(BASELINE, self.baseline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = DiagnosisConfig::default();
        assert_eq!(config.baseline, 1000.0);
        assert_eq!(config.proportion, 0.8);
        assert_eq!(config.min_calls, 20);
        assert_eq!(config.cluster_significance, 0.8);
        assert!(config.workers >= 1);
        assert_eq!(config.parallel_firings, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(
            DiagnosisConfig::from_toml_str("").unwrap(),
            DiagnosisConfig::default()
        );
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = DiagnosisConfig::from_toml_str("treshold = 3").unwrap_err();
        assert!(format!("{err:#}").contains("treshold"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        for toml in [
            "baseline = -1.0",
            "proportion = 1.5",
            "cluster_significance = -0.1",
            "workers = 0",
            "parallel_firings = 0",
        ] {
            assert!(DiagnosisConfig::from_toml_str(toml).is_err(), "{toml}");
        }
    }

    #[test]
    fn test_from_file() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "baseline = 300.0")?;
        writeln!(file, "min_calls = 5")?;
        writeln!(file, "parallel_firings = 4")?;

        let config = DiagnosisConfig::from_toml(file.path())?;
        assert_eq!(config.baseline, 300.0);
        assert_eq!(config.min_calls, 5);
        assert_eq!(config.parallel_firings, 4);
        Ok(())
    }

    #[test]
    fn test_missing_file_names_path() {
        let err = DiagnosisConfig::from_toml("/nonexistent/tracecause.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/tracecause.toml"));
    }

    #[test]
    fn test_session_variables_carry_baseline() {
        let config = DiagnosisConfig {
            baseline: 42.0,
            ..DiagnosisConfig::default()
        };
        let variables = config.session_variables();
        assert_eq!(
            variables.get(BASELINE).and_then(|v| v.as_number()),
            Some(42.0)
        );
    }
}
