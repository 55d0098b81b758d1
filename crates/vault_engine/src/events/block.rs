//! Block-start processing
//!
//! Runs as event 0 of every block, in a fixed order: scheme updates and
//! destructions, queued governance changes, token splits, the price
//! pipeline shift, vault classification and auction settlement.

use vault_common::{Height, LoanError, LoanResult, TokenId, VaultId};

use crate::config::EngineConfig;
use crate::interest;
use crate::liquidation::{self, AuctionReport, MonitorReport};
use crate::state::ConsensusState;

use super::{governance, split};

/// What block-start processing did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockReport {
    pub height: Height,
    pub schemes_updated: Vec<String>,
    pub schemes_destroyed: Vec<String>,
    pub attributes_applied: usize,
    pub splits: Vec<TokenId>,
    pub prices_refreshed: usize,
    pub monitor: MonitorReport,
    pub auctions: AuctionReport,
}

pub fn begin_block(state: &mut ConsensusState, config: &EngineConfig, height: Height) -> LoanResult<BlockReport> {
    state.set_height(height);
    let mut report = BlockReport {
        height,
        ..BlockReport::default()
    };

    report.schemes_updated = state.schemes.apply_pending(&mut state.journal, height);
    for id in &report.schemes_updated {
        interest::reconcile_scheme(state, config.blocks_per_year, id)?;
    }
    report.schemes_destroyed = destroy_due_schemes(state, config)?;

    let changes = state.attributes.take_due(&mut state.journal, height);
    report.attributes_applied = changes.len();
    for change in changes {
        governance::apply_attribute(state, config, change.key, change.value)?;
    }

    report.splits = split::execute_due(state, config)?;
    report.prices_refreshed = state
        .prices
        .refresh(&mut state.journal, height, config.fixed_interval_blocks);
    report.monitor = liquidation::monitor_vaults(state, config)?;
    report.auctions = liquidation::close_auctions(state, config)?;
    Ok(report)
}

/// Rebind the vaults of schemes due for destruction to the default scheme
fn destroy_due_schemes(state: &mut ConsensusState, config: &EngineConfig) -> LoanResult<Vec<String>> {
    let due = state.schemes.due_destructions(state.height);
    for id in &due {
        let default = state
            .schemes
            .default_id()
            .filter(|d| d != id)
            .map(str::to_string)
            .ok_or_else(|| LoanError::InvariantBreach(format!("no default scheme to replace {}", id)))?;
        let bound: Vec<VaultId> = state.vaults.bound_to(id);
        for vault_id in &bound {
            interest::reconcile_vault(state, config.blocks_per_year, vault_id)?;
            state.vaults.modify(&mut state.journal, vault_id, |v| {
                v.scheme_id = default.clone();
                Ok(())
            })?;
            interest::reconcile_vault(state, config.blocks_per_year, vault_id)?;
        }
        state.schemes.remove(&mut state.journal, id);
        log::info!("Loan scheme {} destroyed, {} vault(s) moved to {}", id, bound.len(), default);
    }
    Ok(due)
}
