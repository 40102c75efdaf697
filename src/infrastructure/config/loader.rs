use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::OrchestratorConfig;

/// Configuration error types.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid min_agents/max_agents: min={0} max={1}, min must be <= max and max must be between 1 and 1000")]
    InvalidAgentBounds(usize, usize),

    #[error("invalid priority_levels: {0}, must be at least 1")]
    InvalidPriorityLevels(usize),

    #[error("invalid steal_threshold: {0}, must be in [0.0, 1.0]")]
    InvalidStealThreshold(f64),

    #[error("invalid quorum_size: {0}, must be at least 1")]
    InvalidQuorumSize(usize),

    #[error("invalid scaling thresholds: scale_down ({0}) must be less than scale_up ({1})")]
    InvalidScalingThresholds(f64, f64),

    #[error("agent_types cannot be empty")]
    EmptyAgentTypes,
}

/// Configuration loader with hierarchical merging.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (`Serialized`)
    /// 2. `.swarmforge/config.yaml` (project config)
    /// 3. `.swarmforge/local.yaml` (project local overrides, optional)
    /// 4. Environment variables (`SWARMFORGE_*` prefix, highest priority)
    pub fn load() -> Result<OrchestratorConfig> {
        let config: OrchestratorConfig = Figment::new()
            .merge(Serialized::defaults(OrchestratorConfig::default()))
            .merge(Yaml::file(".swarmforge/config.yaml"))
            .merge(Yaml::file(".swarmforge/local.yaml"))
            .merge(Env::prefixed("SWARMFORGE_").split("__"))
            .extract()
            .context("failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, skipping the project-directory lookup.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<OrchestratorConfig> {
        let config: OrchestratorConfig = Figment::new()
            .merge(Serialized::defaults(OrchestratorConfig::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .with_context(|| format!("failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading.
    pub fn validate(config: &OrchestratorConfig) -> Result<(), ConfigError> {
        if config.min_agents > config.max_agents || config.max_agents == 0 || config.max_agents > 1000 {
            return Err(ConfigError::InvalidAgentBounds(config.min_agents, config.max_agents));
        }

        if config.scheduler.priority_levels == 0 {
            return Err(ConfigError::InvalidPriorityLevels(config.scheduler.priority_levels));
        }

        if !(0.0..=1.0).contains(&config.scheduler.steal_threshold) {
            return Err(ConfigError::InvalidStealThreshold(config.scheduler.steal_threshold));
        }

        if config.coordination.quorum_size == 0 {
            return Err(ConfigError::InvalidQuorumSize(config.coordination.quorum_size));
        }

        if config.scaling.scale_down_threshold >= config.scaling.scale_up_threshold {
            return Err(ConfigError::InvalidScalingThresholds(
                config.scaling.scale_down_threshold,
                config.scaling.scale_up_threshold,
            ));
        }

        if config.agent_types.is_empty() {
            return Err(ConfigError::EmptyAgentTypes);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = OrchestratorConfig::default();
        ConfigLoader::validate(&config).expect("default config should be valid");
    }

    #[test]
    fn yaml_override_parses_and_validates() {
        let yaml = r"
min_agents: 3
max_agents: 20
scheduler:
  steal_threshold: 0.5
scaling:
  scale_up_threshold: 0.9
  scale_down_threshold: 0.1
";
        let config: OrchestratorConfig = Figment::new()
            .merge(Serialized::defaults(OrchestratorConfig::default()))
            .merge(figment::providers::Yaml::string(yaml))
            .extract()
            .unwrap();

        assert_eq!(config.min_agents, 3);
        assert_eq!(config.max_agents, 20);
        ConfigLoader::validate(&config).expect("overridden config should be valid");
    }

    #[test]
    fn rejects_min_agents_above_max_agents() {
        let config = OrchestratorConfig {
            min_agents: 10,
            max_agents: 5,
            ..Default::default()
        };
        let err = ConfigLoader::validate(&config).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidAgentBounds(10, 5)));
    }

    #[test]
    fn rejects_inverted_scaling_thresholds() {
        let mut config = OrchestratorConfig::default();
        config.scaling.scale_up_threshold = 0.2;
        config.scaling.scale_down_threshold = 0.8;
        let err = ConfigLoader::validate(&config).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidScalingThresholds(_, _)));
    }

    #[test]
    fn rejects_empty_agent_types() {
        let config = OrchestratorConfig {
            agent_types: vec![],
            ..Default::default()
        };
        let err = ConfigLoader::validate(&config).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyAgentTypes));
    }

    #[test]
    fn hierarchical_merging_prefers_the_later_file() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let mut base_file = NamedTempFile::new().unwrap();
        writeln!(base_file, "min_agents: 2\nmax_agents: 10").unwrap();
        base_file.flush().unwrap();

        let mut override_file = NamedTempFile::new().unwrap();
        writeln!(override_file, "min_agents: 5").unwrap();
        override_file.flush().unwrap();

        let config: OrchestratorConfig = Figment::new()
            .merge(Serialized::defaults(OrchestratorConfig::default()))
            .merge(Yaml::file(base_file.path()))
            .merge(Yaml::file(override_file.path()))
            .extract()
            .unwrap();

        assert_eq!(config.min_agents, 5, "override should win");
        assert_eq!(config.max_agents, 10, "base value should persist when not overridden");
    }
}
