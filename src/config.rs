use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::explorer::vanishing::{DEFAULT_EPSILON, DEFAULT_MAX_ITERATIONS};
use crate::explorer::{ConflictPolicy, ExplorationMode, VanishingStrategy};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ExplorerConfig {
    #[serde(default)]
    pub mode: ExplorationMode,
    /// State ceiling of bounded exploration.
    #[serde(default = "default_max_states")]
    pub max_states: usize,
    #[serde(default)]
    pub vanishing: VanishingStrategy,
    #[serde(default)]
    pub conflict_policy: ConflictPolicy,
    #[serde(default = "default_threads")]
    pub threads: usize,
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
    #[serde(default = "default_max_vanishing_iterations")]
    pub max_vanishing_iterations: usize,
    /// States drawn when exporting a DOT graph.
    #[serde(default = "default_display_max_states")]
    pub display_max_states: usize,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            mode: ExplorationMode::default(),
            max_states: default_max_states(),
            vanishing: VanishingStrategy::default(),
            conflict_policy: ConflictPolicy::default(),
            threads: default_threads(),
            epsilon: default_epsilon(),
            max_vanishing_iterations: default_max_vanishing_iterations(),
            display_max_states: default_display_max_states(),
        }
    }
}

impl ExplorerConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            log::debug!("config file {:?} not found, using defaults", path);
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: ExplorerConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        config
            .validate()
            .with_context(|| format!("Invalid config file: {:?}", path))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.threads >= 1, "threads must be at least 1");
        anyhow::ensure!(self.max_states >= 1, "max_states must be at least 1");
        anyhow::ensure!(
            self.epsilon > 0.0 && self.epsilon < 1.0,
            "epsilon must lie in (0, 1), got {}",
            self.epsilon
        );
        anyhow::ensure!(
            self.max_vanishing_iterations >= 1,
            "max_vanishing_iterations must be at least 1"
        );
        Ok(())
    }
}

fn default_max_states() -> usize {
    10_000
}

fn default_threads() -> usize {
    1
}

fn default_epsilon() -> f64 {
    DEFAULT_EPSILON
}

fn default_max_vanishing_iterations() -> usize {
    DEFAULT_MAX_ITERATIONS
}

fn default_display_max_states() -> usize {
    100
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config: ExplorerConfig = toml::from_str(
            r#"
            mode = "coverability"
            vanishing = "simple"
            threads = 4
            "#,
        )
        .unwrap();
        assert_eq!(config.mode, ExplorationMode::Coverability);
        assert_eq!(config.vanishing, VanishingStrategy::Simple);
        assert_eq!(config.threads, 4);
        assert_eq!(config.max_states, 10_000);
        assert_eq!(config.conflict_policy, ConflictPolicy::WeightProportional);
        assert_eq!(config.epsilon, 1e-7);
    }

    #[test]
    fn missing_file_means_defaults() {
        let config = ExplorerConfig::load_from_file("/nonexistent/pnss.toml").unwrap();
        assert_eq!(config, ExplorerConfig::default());
    }

    #[test]
    fn rejects_zero_threads() {
        let config = ExplorerConfig {
            threads: 0,
            ..ExplorerConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
