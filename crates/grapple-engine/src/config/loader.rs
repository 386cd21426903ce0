use super::schema::GrappleConfig;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid placeholder pattern: {0}")]
    Pattern(#[from] regex::Error),
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load from default locations:
    /// 1. ./grapple.yaml
    /// 2. ~/.grapple/config.yaml
    /// 3. Default configuration
    pub async fn load_default() -> Result<GrappleConfig, ConfigError> {
        let local_config = PathBuf::from("./grapple.yaml");
        if local_config.exists() {
            return Self::load_from(&local_config).await;
        }

        if let Some(home) = dirs::home_dir() {
            let home_config = home.join(".grapple").join("config.yaml");
            if home_config.exists() {
                return Self::load_from(&home_config).await;
            }
        }

        Ok(GrappleConfig::default())
    }

    /// An empty file yields the defaults.
    pub async fn load_from(path: &Path) -> Result<GrappleConfig, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        if content.trim().is_empty() {
            return Ok(GrappleConfig::default());
        }
        let config: GrappleConfig = serde_yaml::from_str(&content)?;
        // Surface bad regexes at load time rather than mid-run.
        config.engine.compiled_placeholders()?;
        Ok(config)
    }
}
