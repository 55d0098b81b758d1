//! Liquidation entry, bids and auction settlement

use std::collections::BTreeMap;

use vault_common::{Address, Amount, LoanError, LoanResult, Rounding, TokenId, VaultId};

use crate::config::EngineConfig;
use crate::interest;
use crate::state::{Bid, ConsensusState, LiquidationData, VaultStatus};

use super::planner::{loan_shares, plan_batches};

/// Move a vault into liquidation
///
/// Snapshots the penalty, burns loan principal from minted supply, wipes
/// interest records and moves all collateral into auction batches.
pub fn start_liquidation(
    state: &mut ConsensusState,
    config: &EngineConfig,
    vault_id: &VaultId,
    prices: &BTreeMap<TokenId, Amount>,
) -> LoanResult<()> {
    let vault = state.vaults.require(vault_id)?.clone();
    let penalty = state
        .attributes
        .liquidation_penalty(config.default_liquidation_penalty);
    let liquidation_height = vault.liquidation_height.unwrap_or(state.height);

    let shares = loan_shares(state, &vault, prices)?;
    let batches = plan_batches(
        &vault.collateral,
        &shares,
        prices,
        penalty,
        config.batch_max_value,
        liquidation_height + config.auction_blocks,
    )?;

    for (token, amount) in vault.loans.iter() {
        interest::set_loan(state, vault_id, token, Amount::ZERO)?;
        state
            .tokens
            .adjust_supply(&mut state.journal, token, amount.checked_neg()?, Amount::ZERO)?;
    }
    interest::wipe_vault(state, vault_id);

    let batch_count = batches.len();
    state.vaults.modify(&mut state.journal, vault_id, |v| {
        v.collateral.clear();
        v.status = VaultStatus::InLiquidation;
        v.liquidation_height = Some(liquidation_height);
        v.captured_prices.clear();
        v.liquidation = Some(LiquidationData { penalty, batches });
        Ok(())
    })?;
    log::info!(
        "Vault {} in liquidation at height {} with {} batch(es), penalty {}",
        vault_id,
        liquidation_height,
        batch_count,
        penalty
    );
    Ok(())
}

/// Minimum acceptable bid for a batch
pub fn min_next_bid(start_bid: Amount, best: Option<Amount>, increment: Amount) -> LoanResult<Amount> {
    match best {
        None => Ok(start_bid),
        Some(best) => {
            let stepped = best.mul(Amount::ONE.checked_add(increment)?, Rounding::Ceil)?;
            // must strictly beat the best bid
            Ok(stepped.max(best.checked_add(Amount::from_raw(1))?))
        }
    }
}

/// Escrow a bid on batch `index`, refunding the previous best bidder
pub fn place_bid(
    state: &mut ConsensusState,
    config: &EngineConfig,
    vault_id: &VaultId,
    index: u32,
    bidder: &Address,
    token: TokenId,
    amount: Amount,
) -> LoanResult<()> {
    let height = state.height;
    let vault = state.vaults.require(vault_id)?;
    if !vault.is_in_liquidation() {
        return Err(LoanError::Validation(format!(
            "Cannot bid to vault which is not under liquidation ({})",
            vault_id
        )));
    }
    let batch = vault
        .liquidation
        .as_ref()
        .and_then(|l| l.batches.iter().find(|b| b.index == index))
        .ok_or_else(|| LoanError::Validation(format!("No batch to vault/index {}/{}", vault_id, index)))?;
    if batch.end_height <= height {
        return Err(LoanError::Validation(format!(
            "Auction of batch {} ended at height {}",
            index, batch.end_height
        )));
    }
    if batch.loan_token != token {
        return Err(LoanError::Validation(format!(
            "Bid token does not match auction one ({} != {})",
            token, batch.loan_token
        )));
    }
    let required = min_next_bid(
        batch.start_bid,
        batch.best_bid.as_ref().map(|b| b.amount),
        config.min_bid_increment,
    )?;
    if amount < required {
        return Err(LoanError::Validation(format!(
            "Bid override should be at least {} ({} given)",
            required, amount
        )));
    }
    let previous = batch.best_bid.clone();

    state
        .accounts
        .debit(&mut state.journal, bidder, token, amount)?;
    if let Some(prev) = &previous {
        state
            .accounts
            .credit(&mut state.journal, &prev.owner, prev.token, prev.amount)?;
    }

    let bid = Bid {
        owner: bidder.clone(),
        token,
        amount,
        height,
    };
    state.vaults.modify(&mut state.journal, vault_id, |v| {
        let batch = v
            .liquidation
            .as_mut()
            .and_then(|l| l.batches.iter_mut().find(|b| b.index == index))
            .ok_or(LoanError::InvariantBreach("batch vanished".to_string()))?;
        batch.best_bid = Some(bid);
        Ok(())
    })?;
    log::debug!("Bid {} on {}/{} by {}", amount, vault_id, index, bidder);
    Ok(())
}

/// Settlement summary of one block
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuctionReport {
    pub awarded: usize,
    pub relisted: usize,
    pub written_off: usize,
    pub finished_vaults: Vec<VaultId>,
}

/// Resolve every batch whose window closed at the current height
pub fn close_auctions(state: &mut ConsensusState, config: &EngineConfig) -> LoanResult<AuctionReport> {
    let height = state.height;
    let vault_ids: Vec<VaultId> = state
        .vaults
        .iter()
        .filter(|v| v.is_in_liquidation())
        .map(|v| v.id.clone())
        .collect();

    let mut report = AuctionReport::default();
    for vault_id in vault_ids {
        let vault = state.vaults.require(&vault_id)?.clone();
        let Some(liquidation) = vault.liquidation.clone() else {
            return Err(LoanError::InvariantBreach(format!(
                "vault {} in liquidation without batches",
                vault_id
            )));
        };

        let mut kept = Vec::with_capacity(liquidation.batches.len());
        let mut returned = Vec::new();
        for mut batch in liquidation.batches {
            if batch.end_height > height {
                kept.push(batch);
                continue;
            }
            match batch.best_bid.clone() {
                Some(bid) => {
                    for (token, amount) in batch.collaterals.iter() {
                        state
                            .accounts
                            .credit(&mut state.journal, &bid.owner, token, amount)?;
                    }
                    let penalty = batch
                        .loan_amount
                        .mul(liquidation.penalty, Rounding::Floor)?;
                    let excess = bid
                        .amount
                        .checked_sub(batch.loan_amount)?
                        .checked_sub(penalty)?
                        .max(Amount::ZERO);
                    let burned = bid.amount.checked_sub(excess)?;
                    if excess.is_positive() {
                        state
                            .accounts
                            .credit(&mut state.journal, &vault.owner, bid.token, excess)?;
                    }
                    state
                        .tokens
                        .adjust_circulating(&mut state.journal, bid.token, burned.checked_neg()?)?;
                    let loan_token = batch.loan_token;
                    state.update_burn_info(|info| {
                        info.auction_burn.add(loan_token, burned)?;
                        if penalty.is_positive() {
                            info.auction_penalties.add(loan_token, penalty)?;
                        }
                        Ok(())
                    })?;
                    log::info!(
                        "Batch {}/{} awarded to {} for {}",
                        vault_id,
                        batch.index,
                        bid.owner,
                        bid.amount
                    );
                    report.awarded += 1;
                }
                None if !batch.relisted => {
                    batch.relisted = true;
                    batch.end_height += config.auction_blocks;
                    log::info!(
                        "Batch {}/{} relisted until {}",
                        vault_id,
                        batch.index,
                        batch.end_height
                    );
                    report.relisted += 1;
                    kept.push(batch);
                }
                None => {
                    let loan_token = batch.loan_token;
                    let loan_amount = batch.loan_amount;
                    state.update_burn_info(|info| info.bad_debt.add(loan_token, loan_amount))?;
                    log::warn!(
                        "Batch {}/{} unsold twice, {} of token {} written off",
                        vault_id,
                        batch.index,
                        loan_amount,
                        loan_token
                    );
                    returned.push(batch.collaterals);
                    report.written_off += 1;
                }
            }
        }

        let finished = kept.is_empty();
        state.vaults.modify(&mut state.journal, &vault_id, |v| {
            for basket in &returned {
                for (token, amount) in basket.iter() {
                    v.collateral.add(token, amount)?;
                }
            }
            if finished {
                v.status = VaultStatus::Active;
                v.liquidation = None;
                v.liquidation_height = None;
            } else if let Some(l) = v.liquidation.as_mut() {
                l.batches = kept;
            }
            Ok(())
        })?;
        if finished {
            log::info!("Vault {} liquidation finished", vault_id);
            report.finished_vaults.push(vault_id);
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amt(s: &str) -> Amount {
        s.parse().unwrap()
    }

    #[test]
    fn test_min_next_bid() {
        let start = amt("105");
        assert_eq!(min_next_bid(start, None, amt("0.01")).unwrap(), start);
        assert_eq!(
            min_next_bid(start, Some(amt("110")), amt("0.01")).unwrap(),
            amt("111.1")
        );
        assert_eq!(
            min_next_bid(start, Some(amt("110")), Amount::ZERO).unwrap(),
            amt("110.00000001")
        );
    }
}
