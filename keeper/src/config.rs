//! Keeper configuration

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use vault_common::Amount;
use vault_engine::EngineConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeeperConfig {
    /// Engine config TOML; regtest constants when absent
    #[serde(default)]
    pub engine_config: Option<String>,

    /// Block script to replay
    pub script_path: String,

    /// Ratio margin (percentage points above the scheme minimum) under
    /// which a vault is reported at risk
    pub health_buffer: Amount,

    /// Vaults listed per report
    pub report_batch: usize,

    /// Abort the replay on the first unexpected step failure
    #[serde(default)]
    pub stop_on_error: bool,
}

impl KeeperConfig {
    /// Load configuration from the TOML file named by `KEEPER_CONFIG`
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("KEEPER_CONFIG")
            .unwrap_or_else(|_| "keeper-config.toml".to_string());
        Self::load_from(&config_path)
    }

    pub fn load_from(path: &str) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path))?;

        let config: KeeperConfig = toml::from_str(&config_str)
            .context("Failed to parse config TOML")?;

        Ok(config)
    }

    pub fn default_regtest() -> Self {
        Self {
            engine_config: None,
            script_path: "keeper/scripts/liquidation.json".to_string(),
            health_buffer: Amount::from_raw(2_000_000_000), // 20 points
            report_batch: 5,
            stop_on_error: false,
        }
    }

    /// Engine constants for the replay
    pub fn engine(&self) -> Result<EngineConfig> {
        let config = match &self.engine_config {
            Some(path) => EngineConfig::load(path)?,
            None => EngineConfig::regtest(),
        };
        config.validate().context("Invalid engine config")?;
        Ok(config)
    }

    /// Write default config to file
    pub fn write_default(path: &str) -> Result<()> {
        let config = Self::default_regtest();
        let toml_str = toml::to_string_pretty(&config)
            .context("Failed to serialize config")?;

        std::fs::write(path, toml_str)
            .context(format!("Failed to write config to {}", path))?;

        log::info!("Created default config at {}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_creation() {
        let config = KeeperConfig::default_regtest();
        assert_eq!(config.report_batch, 5);
        assert_eq!(config.health_buffer.to_string(), "20.00000000");
        assert_eq!(config.engine().unwrap(), EngineConfig::regtest());
    }

    #[test]
    fn test_parse_toml() {
        let config: KeeperConfig = toml::from_str(
            r#"
            script_path = "demo.json"
            health_buffer = "12.5"
            report_batch = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.engine_config, None);
        assert!(!config.stop_on_error);
        assert_eq!(config.health_buffer, "12.5".parse().unwrap());
    }

    #[test]
    fn test_default_round_trips_through_toml() {
        let path = std::env::temp_dir().join("vault-keeper-default.toml");
        let path = path.to_string_lossy().to_string();
        KeeperConfig::write_default(&path).unwrap();
        assert_eq!(KeeperConfig::load_from(&path).unwrap(), KeeperConfig::default_regtest());
        let _ = std::fs::remove_file(&path);
    }
}
