//! Engine configuration (consensus constants and governance defaults)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use vault_common::Amount;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Network label, informational only
    pub network: String,

    /// Blocks per year used to turn annual rates into per-block rates
    pub blocks_per_year: u64,

    /// Fixed interval price refresh period in blocks
    pub fixed_interval_blocks: u64,

    /// Max relative move between active and next price for a live price
    pub price_deviation: Amount,

    /// Auction window length in blocks
    pub auction_blocks: u64,

    /// Max collateral value (price currency) per auction batch
    pub batch_max_value: Amount,

    /// Relative step a new bid must clear over the current best
    pub min_bid_increment: Amount,

    /// Liquidation penalty used until governance sets one
    pub default_liquidation_penalty: Amount,

    /// Native coin burned on vault creation
    pub vault_creation_fee: Amount,

    /// Native coin refunded on vault close
    pub vault_close_refund: Amount,

    /// Lower bound (percent) on the ratio required after a withdrawal
    pub min_withdraw_ratio: u32,

    /// Share of required collateral that must be held in the native coin
    pub native_collateral_share: Amount,

    /// Native coin symbol (token id 0)
    pub native_symbol: String,

    /// Stable loan token used by payback-with-collateral
    pub stable_symbol: String,

    /// Currency all valuations are expressed in
    pub price_currency: String,
}

impl EngineConfig {
    /// Load configuration from the TOML file named by `VAULT_ENGINE_CONFIG`
    pub fn from_env() -> Result<Self> {
        let config_path = std::env::var("VAULT_ENGINE_CONFIG")
            .unwrap_or_else(|_| "vault-engine.toml".to_string());
        Self::load(&config_path)
    }

    /// Load configuration from a TOML file
    pub fn load(path: &str) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path))?;

        let config: EngineConfig =
            toml::from_str(&config_str).context("Failed to parse config TOML")?;

        config.validate()?;
        Ok(config)
    }

    /// Regression-test network: short price intervals and auctions
    pub fn regtest() -> Self {
        Self {
            network: "regtest".to_string(),
            blocks_per_year: 1_051_200,
            fixed_interval_blocks: 6,
            price_deviation: Amount::from_raw(30_000_000), // 30%
            auction_blocks: 36,
            batch_max_value: Amount::from_raw(10_000 * vault_common::COIN),
            min_bid_increment: Amount::from_raw(1_000_000), // 1%
            default_liquidation_penalty: Amount::from_raw(5_000_000), // 5%
            vault_creation_fee: Amount::from_raw(vault_common::COIN),
            vault_close_refund: Amount::from_raw(vault_common::COIN / 2),
            min_withdraw_ratio: 150,
            native_collateral_share: Amount::from_raw(50_000_000), // 50%
            native_symbol: "DFI".to_string(),
            stable_symbol: "DUSD".to_string(),
            price_currency: "USD".to_string(),
        }
    }

    /// Main network parameters
    pub fn mainnet() -> Self {
        Self {
            network: "mainnet".to_string(),
            fixed_interval_blocks: 120,
            auction_blocks: 720,
            vault_creation_fee: Amount::from_raw(2 * vault_common::COIN),
            vault_close_refund: Amount::from_raw(vault_common::COIN),
            ..Self::regtest()
        }
    }

    /// Reject nonsensical parameter combinations
    pub fn validate(&self) -> Result<()> {
        if self.blocks_per_year == 0 {
            anyhow::bail!("blocks_per_year must be positive");
        }
        if self.fixed_interval_blocks == 0 {
            anyhow::bail!("fixed_interval_blocks must be positive");
        }
        if !self.batch_max_value.is_positive() {
            anyhow::bail!("batch_max_value must be positive");
        }
        if self.vault_close_refund > self.vault_creation_fee {
            anyhow::bail!("vault_close_refund cannot exceed vault_creation_fee");
        }
        if self.native_collateral_share.is_negative() || self.native_collateral_share > Amount::ONE
        {
            anyhow::bail!("native_collateral_share must be within [0, 1]");
        }
        Ok(())
    }

    /// Write default config to file
    pub fn write_default(path: &str) -> Result<()> {
        let config = Self::regtest();
        let toml_str = toml::to_string_pretty(&config).context("Failed to serialize config")?;

        std::fs::write(path, toml_str).context(format!("Failed to write config to {}", path))?;

        log::info!("Created default config at {}", path);
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::regtest()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_creation() {
        let config = EngineConfig::regtest();
        assert_eq!(config.blocks_per_year, 1_051_200);
        assert_eq!(config.fixed_interval_blocks, 6);
        assert_eq!(config.default_liquidation_penalty.to_string(), "0.05000000");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_mainnet_overrides() {
        let config = EngineConfig::mainnet();
        assert_eq!(config.auction_blocks, 720);
        assert_eq!(config.blocks_per_year, 1_051_200);
    }

    #[test]
    fn test_toml_round_trip() {
        let config = EngineConfig::mainnet();
        let text = toml::to_string_pretty(&config).unwrap();
        let back: EngineConfig = toml::from_str(&text).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_validate_rejects_refund_above_fee() {
        let mut config = EngineConfig::regtest();
        config.vault_close_refund = Amount::from_raw(10 * vault_common::COIN);
        assert!(config.validate().is_err());
    }
}
