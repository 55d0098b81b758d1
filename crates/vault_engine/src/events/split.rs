//! Token splits
//!
//! A split retires the old token id and moves every balance, vault amount,
//! auction batch and interest checkpoint onto a fresh id under the same
//! symbol, scaled by the multiplier. Positive multipliers multiply, negative
//! ones divide with truncation.

use vault_common::{Amount, Basket, Fixed, LoanError, LoanResult, TokenId, VaultId};

use crate::config::EngineConfig;
use crate::interest;
use crate::state::{
    AttributeKey, AttributeValue, AuctionBatch, ConsensusState, InterestRecord, NewToken, SplitEntry, TokenFlags,
    Vault,
};

/// Apply a split multiplier to any fixed point value
pub fn scale<const D: u32>(value: Fixed<D>, multiplier: i32) -> LoanResult<Fixed<D>> {
    if multiplier > 0 {
        Ok(value.checked_mul_int(multiplier as i128)?)
    } else if multiplier < 0 {
        Ok(Fixed::from_raw(value.raw() / -(multiplier as i128)))
    } else {
        Err(LoanError::Validation("split multiplier must not be zero".to_string()))
    }
}

fn scale_basket(basket: &mut Basket, old: TokenId, new: TokenId, multiplier: i32) -> LoanResult<Amount> {
    let amount = scale(basket.remove(old), multiplier)?;
    if amount.is_positive() {
        basket.set(new, amount);
    }
    Ok(amount)
}

/// Rewrite auction batches that hold or are owed the old token; returns the escrow moved
fn migrate_batches(batches: &mut [AuctionBatch], old: TokenId, new: TokenId, multiplier: i32) -> LoanResult<Amount> {
    let mut held = Amount::ZERO;
    for batch in batches {
        held = held.checked_add(scale_basket(&mut batch.collaterals, old, new, multiplier)?)?;
        if batch.loan_token == old {
            batch.loan_token = new;
            batch.loan_amount = scale(batch.loan_amount, multiplier)?;
            batch.loan_interest = scale(batch.loan_interest, multiplier)?;
            batch.start_bid = scale(batch.start_bid, multiplier)?;
        }
        if let Some(bid) = batch.best_bid.as_mut().filter(|b| b.token == old) {
            bid.token = new;
            bid.amount = scale(bid.amount, multiplier)?;
            held = held.checked_add(bid.amount)?;
        }
    }
    Ok(held)
}

fn touches(vault: &Vault, token: TokenId) -> bool {
    vault.collateral.contains(token)
        || vault.loans.contains(token)
        || vault.liquidation.as_ref().is_some_and(|l| {
            l.batches.iter().any(|b| {
                b.collaterals.contains(token)
                    || b.loan_token == token
                    || b.best_bid.as_ref().is_some_and(|bid| bid.token == token)
            })
        })
}

/// Run the splits scheduled for the current height; returns the new token ids
pub fn execute_due(state: &mut ConsensusState, config: &EngineConfig) -> LoanResult<Vec<TokenId>> {
    let key = AttributeKey::OracleSplits(state.height);
    let Some(AttributeValue::Splits(entries)) = state.attributes.get(&key).cloned() else {
        return Ok(Vec::new());
    };
    let mut created = Vec::with_capacity(entries.len());
    for entry in entries {
        match state.tokens.get(entry.token) {
            Some(token) if !token.is_retired() => {}
            _ => {
                log::warn!("Skipping split of token {}: unknown or already retired", entry.token);
                continue;
            }
        }
        created.push(execute_split(state, config, entry)?);
    }
    Ok(created)
}

pub fn execute_split(state: &mut ConsensusState, config: &EngineConfig, entry: SplitEntry) -> LoanResult<TokenId> {
    let height = state.height;
    let old = state.tokens.require(entry.token)?.clone();
    let new_id = TokenId(state.tokens.next_id());

    state
        .tokens
        .split_retire(&mut state.journal, old.id, new_id, height)?;
    let created = state.tokens.create(
        &mut state.journal,
        NewToken {
            symbol: old.symbol.clone(),
            name: old.name.clone(),
            flags: TokenFlags {
                finalized: false,
                ..old.flags.clone()
            },
            owner: old.owner.clone(),
            fixed_interval_price_id: old.fixed_interval_price_id.clone(),
            interest: old.interest,
        },
        height,
    )?;
    if created != new_id {
        return Err(LoanError::InvariantBreach(format!(
            "split of {} created token {} instead of {}",
            old.symbol, created, new_id
        )));
    }

    let inherited: Vec<(AttributeKey, AttributeValue)> = state
        .attributes
        .iter()
        .filter_map(|(key, value)| match key {
            AttributeKey::Token(id, attr) if *id == old.id => {
                Some((AttributeKey::Token(created, *attr), value.clone()))
            }
            _ => None,
        })
        .collect();
    for (key, value) in inherited {
        state.attributes.set(&mut state.journal, key, value);
    }

    let mut circulating = Amount::ZERO;
    for (holder, amount) in state.accounts.holders(old.id) {
        state
            .accounts
            .debit(&mut state.journal, &holder, old.id, amount)?;
        let scaled = scale(amount, entry.multiplier)?;
        if scaled.is_positive() {
            state
                .accounts
                .credit(&mut state.journal, &holder, created, scaled)?;
            circulating = circulating.checked_add(scaled)?;
        }
    }

    let affected: Vec<VaultId> = state
        .vaults
        .iter()
        .filter(|v| touches(v, old.id))
        .map(|v| v.id.clone())
        .collect();
    let mut loans_total = Amount::ZERO;
    for vault_id in &affected {
        let record = if state.vaults.require(vault_id)?.loans.contains(old.id) {
            Some(interest::checkpoint(state, vault_id, old.id)?)
        } else {
            None
        };
        let multiplier = entry.multiplier;
        let (new_loan, held) = state.vaults.modify(&mut state.journal, vault_id, |v| {
            let mut held = scale_basket(&mut v.collateral, old.id, created, multiplier)?;
            let loan = scale_basket(&mut v.loans, old.id, created, multiplier)?;
            if let Some(liquidation) = v.liquidation.as_mut() {
                held = held.checked_add(migrate_batches(&mut liquidation.batches, old.id, created, multiplier)?)?;
            }
            Ok((loan, held))
        })?;
        loans_total = loans_total.checked_add(new_loan)?;
        circulating = circulating.checked_add(held)?;

        if let Some(record) = record {
            state.interest.erase(&mut state.journal, vault_id, old.id);
            state.interest.set(
                &mut state.journal,
                vault_id,
                created,
                InterestRecord {
                    ipb: record.ipb,
                    ith: scale(record.ith, multiplier)?,
                    height,
                },
            );
            interest::refresh(state, config.blocks_per_year, vault_id, created)?;
        }
    }

    let free_float = scale(old.free_float, entry.multiplier)?;
    state.tokens.modify(&mut state.journal, old.id, |t| {
        t.minted = Amount::ZERO;
        t.free_float = Amount::ZERO;
        t.circulating = Amount::ZERO;
        Ok(())
    })?;
    state.tokens.modify(&mut state.journal, created, |t| {
        t.minted = free_float.checked_add(loans_total)?;
        t.free_float = free_float;
        t.circulating = circulating;
        t.collateral_factor = old.collateral_factor;
        Ok(())
    })?;

    log::info!(
        "Token {} split by {} into {}: {} vault(s) migrated",
        old.symbol,
        entry.multiplier,
        created,
        affected.len()
    );
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale() {
        let x: Amount = "10.5".parse().unwrap();
        assert_eq!(scale(x, 2).unwrap(), "21".parse().unwrap());
        assert_eq!(scale(x, -4).unwrap(), "2.625".parse().unwrap());
        assert_eq!(scale(Amount::from_raw(3), -2).unwrap(), Amount::from_raw(1));
        assert!(scale(x, 0).is_err());
    }
}
