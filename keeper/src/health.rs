//! Vault health from engine state

use anyhow::{Context, Result};
use vault_common::{Address, Amount, Height, VaultId};
use vault_engine::state::{ConsensusState, Vault, VaultStatus};
use vault_engine::{valuation, EngineConfig};

/// Where a vault stands relative to its scheme minimum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// Margin at or above the buffer
    Healthy,
    /// Margin below the buffer but still covered
    AtRisk,
    /// Below the scheme minimum under the active or the next price
    Undercollateralized,
    /// Some price is not live; ratios are informative only
    Frozen,
}

/// Health snapshot of one vault with loans
#[derive(Debug, Clone)]
pub struct VaultHealth {
    pub vault_id: VaultId,
    pub owner: Address,
    pub scheme_id: String,
    pub min_ratio: u32,
    /// Informative ratio (percent) under active prices
    pub active_ratio: Amount,
    /// Informative ratio (percent) under next prices
    pub next_ratio: Amount,
    /// Worse of the two ratios minus the scheme minimum
    ///
    /// - margin < 0: will be liquidated at the next interval
    /// - 0 <= margin < buffer: at risk
    /// - margin >= buffer: healthy
    pub margin: Amount,
    pub status: HealthStatus,
    pub height: Height,
}

/// `min(active, next) - min_ratio`, in percentage points
pub fn margin(active_ratio: Amount, next_ratio: Amount, min_ratio: u32) -> Result<Amount> {
    let floor = Amount::from_int(i128::from(min_ratio))?;
    Ok(active_ratio.min(next_ratio).checked_sub(floor)?)
}

pub fn classify(margin: Amount, is_live: bool, buffer: Amount) -> HealthStatus {
    if !is_live {
        HealthStatus::Frozen
    } else if margin.is_negative() {
        HealthStatus::Undercollateralized
    } else if margin < buffer {
        HealthStatus::AtRisk
    } else {
        HealthStatus::Healthy
    }
}

/// Health of a vault; `None` for vaults without loans or already in liquidation
pub fn assess(
    state: &ConsensusState,
    config: &EngineConfig,
    vault: &Vault,
    buffer: Amount,
) -> Result<Option<VaultHealth>> {
    if vault.loans.is_empty() || vault.status == VaultStatus::InLiquidation {
        return Ok(None);
    }
    let scheme = state
        .schemes
        .require(&vault.scheme_id)
        .context(format!("Vault {} has no scheme", vault.id))?;
    let values = valuation::value_vault(state, config, vault, false)
        .context(format!("Failed to value vault {}", vault.id))?;

    let active_ratio = values.active.informative_ratio();
    let next_ratio = values.next.informative_ratio();
    let margin = margin(active_ratio, next_ratio, scheme.min_col_ratio)?;
    Ok(Some(VaultHealth {
        vault_id: vault.id.clone(),
        owner: vault.owner.clone(),
        scheme_id: vault.scheme_id.clone(),
        min_ratio: scheme.min_col_ratio,
        active_ratio,
        next_ratio,
        margin,
        status: classify(margin, values.is_live, buffer),
        height: state.height,
    }))
}

/// Health of every vault with loans
pub fn scan(state: &ConsensusState, config: &EngineConfig, buffer: Amount) -> Result<Vec<VaultHealth>> {
    let mut out = Vec::new();
    for vault in state.vaults.iter() {
        if let Some(health) = assess(state, config, vault, buffer)? {
            out.push(health);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use vault_engine::Node;

    fn amt(s: &str) -> Amount {
        s.parse().unwrap()
    }

    #[test]
    fn test_margin_uses_worse_price() {
        assert_eq!(margin(amt("180"), amt("160"), 150).unwrap(), amt("10"));
        assert_eq!(margin(amt("140"), amt("200"), 150).unwrap(), amt("-10"));
    }

    #[test]
    fn test_classify_zones() {
        let buffer = amt("20");
        assert_eq!(classify(amt("-0.00000001"), true, buffer), HealthStatus::Undercollateralized);
        assert_eq!(classify(amt("0"), true, buffer), HealthStatus::AtRisk);
        assert_eq!(classify(amt("19.99"), true, buffer), HealthStatus::AtRisk);
        assert_eq!(classify(amt("20"), true, buffer), HealthStatus::Healthy);
        assert_eq!(classify(amt("-50"), false, buffer), HealthStatus::Frozen);
    }

    #[test]
    fn test_scan_reports_vaults_with_loans() {
        let mut node = Node::new(EngineConfig::regtest()).unwrap();
        let owner = node.call("getnewaddress", &[]).unwrap();
        node.call("setoracleprice", &[json!("DFI/USD"), json!("1")]).unwrap();
        node.call("setoracleprice", &[json!("DUSD/USD"), json!("1")]).unwrap();
        node.call(
            "setcollateraltoken",
            &[json!({"token": "DFI", "factor": "1", "fixedIntervalPriceId": "DFI/USD"})],
        )
        .unwrap();
        node.call(
            "setloantoken",
            &[json!({"symbol": "DUSD", "fixedIntervalPriceId": "DUSD/USD"})],
        )
        .unwrap();
        node.call("createloanscheme", &[json!(150), json!("0"), json!("LOAN150")])
            .unwrap();
        let mut funding = serde_json::Map::new();
        funding.insert(owner.as_str().unwrap().to_string(), json!("100@DFI"));
        node.call("utxostoaccount", &[json!(funding)]).unwrap();

        let empty = node.call("createvault", &[owner.clone()]).unwrap();
        let vault = node.call("createvault", &[owner.clone()]).unwrap();
        node.call("deposittovault", &[vault.clone(), owner.clone(), json!("100@DFI")])
            .unwrap();
        node.call("takeloan", &[json!({"vaultId": vault.clone(), "amounts": "60@DUSD"})])
            .unwrap();

        let engine = node.engine();
        let found = scan(engine.state(), engine.config(), amt("20")).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(json!(found[0].vault_id.as_str()), vault);
        assert_ne!(json!(found[0].vault_id.as_str()), empty);
        // the quotient is floored at 8 digits before scaling to percent
        assert_eq!(found[0].active_ratio, amt("166.666666"));
        assert_eq!(found[0].margin, amt("16.666666"));
        assert_eq!(found[0].status, HealthStatus::AtRisk);
    }
}
