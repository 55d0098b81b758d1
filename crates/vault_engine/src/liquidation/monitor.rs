//! Block-start vault classification

use std::collections::BTreeMap;

use vault_common::{Amount, Height, LoanError, LoanResult, TokenId, VaultId};

use crate::config::EngineConfig;
use crate::state::{ConsensusState, Vault, VaultStatus};
use crate::valuation;

/// Outcome of one classification pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorReport {
    pub may_liquidate: Vec<VaultId>,
    pub restored: Vec<VaultId>,
    pub liquidated: Vec<VaultId>,
}

/// First interval boundary strictly above `height`
pub fn next_boundary(height: Height, interval: u64) -> Height {
    if interval == 0 {
        return height + 1;
    }
    (height / interval + 1) * interval
}

enum Decision {
    Keep,
    MayLiquidate(Height, BTreeMap<TokenId, Amount>),
    Restore,
    Liquidate(BTreeMap<TokenId, Amount>),
}

fn decide(state: &ConsensusState, config: &EngineConfig, vault: &Vault) -> LoanResult<Decision> {
    let height = state.height;
    let min_ratio = state.schemes.require(&vault.scheme_id)?.min_col_ratio;

    if vault.loans.is_empty() {
        return Ok(if vault.status == VaultStatus::MayLiquidate {
            Decision::Restore
        } else {
            Decision::Keep
        });
    }

    let valuation = match valuation::value_vault(state, config, vault, false) {
        Ok(v) if v.is_live => Some(v),
        Ok(_) | Err(LoanError::PriceNotLive(_)) => None,
        Err(e) => return Err(e),
    };
    let due = vault.status == VaultStatus::MayLiquidate
        && vault.liquidation_height.is_some_and(|h| height >= h);

    let Some(valuation) = valuation else {
        if !due {
            return Ok(Decision::Keep);
        }
        // No live price: settle on the prices captured at the crossing
        return match valuation::value_with_prices(state, vault, &vault.captured_prices) {
            Ok(v) if !v.satisfies(min_ratio)? => Ok(Decision::Liquidate(vault.captured_prices.clone())),
            Ok(_) => Ok(Decision::Restore),
            Err(LoanError::PriceNotLive(_)) => Ok(Decision::Keep),
            Err(e) => Err(e),
        };
    };

    // At the liquidation height the captured next price is the active one
    if due && !valuation.active.satisfies(min_ratio)? {
        return Ok(Decision::Liquidate(valuation::active_prices(state, config, vault)?));
    }

    let healthy = valuation.satisfies(min_ratio)?;
    Ok(match (vault.status, healthy) {
        (VaultStatus::Active, false) => Decision::MayLiquidate(
            next_boundary(height, config.fixed_interval_blocks),
            valuation::capture_prices(state, config, vault)?,
        ),
        (VaultStatus::MayLiquidate, false) if due => Decision::MayLiquidate(
            next_boundary(height, config.fixed_interval_blocks),
            valuation::capture_prices(state, config, vault)?,
        ),
        (VaultStatus::MayLiquidate, true) => Decision::Restore,
        _ => Decision::Keep,
    })
}

/// Classify every vault that carries loans or waits for liquidation
pub fn monitor_vaults(state: &mut ConsensusState, config: &EngineConfig) -> LoanResult<MonitorReport> {
    let candidates: Vec<VaultId> = state
        .vaults
        .iter()
        .filter(|v| !v.is_in_liquidation() && (!v.loans.is_empty() || v.status == VaultStatus::MayLiquidate))
        .map(|v| v.id.clone())
        .collect();

    let mut report = MonitorReport::default();
    for vault_id in candidates {
        let decision = {
            let vault = state.vaults.require(&vault_id)?;
            decide(state, config, vault)?
        };
        match decision {
            Decision::Keep => {}
            Decision::MayLiquidate(at, captured) => {
                state.vaults.modify(&mut state.journal, &vault_id, |v| {
                    v.status = VaultStatus::MayLiquidate;
                    v.liquidation_height = Some(at);
                    v.captured_prices = captured;
                    Ok(())
                })?;
                log::info!("Vault {} may be liquidated at height {}", vault_id, at);
                report.may_liquidate.push(vault_id);
            }
            Decision::Restore => {
                state.vaults.modify(&mut state.journal, &vault_id, |v| {
                    v.status = VaultStatus::Active;
                    v.liquidation_height = None;
                    v.captured_prices.clear();
                    Ok(())
                })?;
                log::info!("Vault {} back to active", vault_id);
                report.restored.push(vault_id);
            }
            Decision::Liquidate(prices) => {
                super::auction::start_liquidation(state, config, &vault_id, &prices)?;
                report.liquidated.push(vault_id);
            }
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_boundary() {
        assert_eq!(next_boundary(0, 6), 6);
        assert_eq!(next_boundary(5, 6), 6);
        assert_eq!(next_boundary(6, 6), 12);
        assert_eq!(next_boundary(13, 6), 18);
        assert_eq!(next_boundary(13, 0), 14);
    }
}
