//! Post-condition self-checks
//!
//! `check_structure` runs after every event, `check_block` after every
//! block. A failure is an [`LoanError::InvariantBreach`].

use std::collections::BTreeMap;

use vault_common::{Amount, LoanError, LoanResult, TokenId};

use crate::config::EngineConfig;
use crate::state::{ConsensusState, VaultStatus};
use crate::valuation;

fn breach(message: String) -> LoanError {
    LoanError::InvariantBreach(message)
}

fn tally(totals: &mut BTreeMap<TokenId, Amount>, token: TokenId, amount: Amount) -> LoanResult<()> {
    let total = totals.entry(token).or_insert(Amount::ZERO);
    *total = total.checked_add(amount)?;
    Ok(())
}

/// Every unit a token has in circulation sits in an account, a vault or an auction
fn check_holdings(state: &ConsensusState) -> LoanResult<()> {
    let mut held: BTreeMap<TokenId, Amount> = BTreeMap::new();
    for (_, token, amount) in state.accounts.iter() {
        tally(&mut held, token, amount)?;
    }
    for vault in state.vaults.iter() {
        for (token, amount) in vault.collateral.iter() {
            tally(&mut held, token, amount)?;
        }
        for batch in vault.liquidation.iter().flat_map(|l| l.batches.iter()) {
            for (token, amount) in batch.collaterals.iter() {
                tally(&mut held, token, amount)?;
            }
            if let Some(bid) = &batch.best_bid {
                tally(&mut held, bid.token, bid.amount)?;
            }
        }
    }

    for token in state.tokens.iter() {
        let found = held.remove(&token.id).unwrap_or(Amount::ZERO);
        if found != token.circulating {
            return Err(breach(format!(
                "{} {} held in accounts, vaults and auctions but {} in circulation",
                found, token.symbol, token.circulating
            )));
        }
    }
    if let Some((token, amount)) = held.into_iter().next() {
        return Err(breach(format!("{} held of unknown token {}", amount, token)));
    }
    Ok(())
}

/// Interest records, supply conservation and holdings
pub fn check_structure(state: &ConsensusState) -> LoanResult<()> {
    for (vault_id, token, record) in state.interest.iter() {
        let vault = state
            .vaults
            .get(vault_id)
            .ok_or_else(|| breach(format!("interest record for missing vault {}", vault_id)))?;
        if !vault.loans.contains(token) {
            return Err(breach(format!(
                "interest record for token {} without a loan in vault {}",
                token, vault_id
            )));
        }
        if record.height > state.height {
            return Err(breach(format!(
                "interest record of {} token {} is ahead of the chain ({} > {})",
                vault_id, token, record.height, state.height
            )));
        }
    }

    let mut loans: BTreeMap<TokenId, Amount> = BTreeMap::new();
    for vault in state.vaults.iter() {
        if vault.collateral.iter().any(|(_, amount)| amount.is_negative()) {
            return Err(breach(format!("negative collateral in vault {}", vault.id)));
        }
        for (token, amount) in vault.loans.iter() {
            if !amount.is_positive() {
                return Err(breach(format!(
                    "non-positive loan of token {} in vault {}",
                    token, vault.id
                )));
            }
            if state.interest.get(&vault.id, token).is_none() {
                return Err(breach(format!(
                    "loan of token {} in vault {} has no interest record",
                    token, vault.id
                )));
            }
            tally(&mut loans, token, amount)?;
        }
        if vault.is_in_liquidation() && !vault.loans.is_empty() {
            return Err(breach(format!("vault {} in liquidation still carries loans", vault.id)));
        }
    }

    for token in state.tokens.iter() {
        let in_vaults = loans.get(&token.id).copied().unwrap_or(Amount::ZERO);
        let expected = in_vaults.checked_add(token.free_float)?;
        if token.minted != expected {
            return Err(breach(format!(
                "supply of {} is {} but loans {} plus free float {} make {}",
                token.symbol, token.minted, in_vaults, token.free_float, expected
            )));
        }
    }
    check_holdings(state)
}

/// Structure plus collateralization of every active vault with live prices
pub fn check_block(state: &ConsensusState, config: &EngineConfig) -> LoanResult<()> {
    check_structure(state)?;
    for vault in state.vaults.iter() {
        if vault.status != VaultStatus::Active || vault.loans.is_empty() {
            continue;
        }
        let values = match valuation::value_vault(state, config, vault, false) {
            Ok(v) if v.is_live => v,
            Ok(_) | Err(LoanError::PriceNotLive(_)) => continue,
            Err(e) => return Err(e),
        };
        let min_ratio = state.schemes.require(&vault.scheme_id)?.min_col_ratio;
        if !values.satisfies(min_ratio)? {
            return Err(breach(format!(
                "active vault {} is below its minimum ratio ({} < {})",
                vault.id,
                values.active.ratio().min(values.next.ratio()),
                min_ratio
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{NewToken, TokenFlags};
    use vault_common::Address;

    #[test]
    fn test_supply_mismatch_detected() {
        let mut state = ConsensusState::genesis("DFI").unwrap();
        let id = state
            .tokens
            .create(
                &mut state.journal,
                NewToken {
                    symbol: "TSLA".into(),
                    name: "Tesla".into(),
                    flags: TokenFlags {
                        is_dat: true,
                        mintable: true,
                        ..TokenFlags::default()
                    },
                    ..NewToken::default()
                },
                0,
            )
            .unwrap();
        assert!(check_structure(&state).is_ok());

        state
            .tokens
            .adjust_supply(&mut state.journal, id, Amount::ONE, Amount::ZERO)
            .unwrap();
        assert!(matches!(check_structure(&state), Err(LoanError::InvariantBreach(_))));
    }

    #[test]
    fn test_corrupted_balance_detected() {
        let mut state = ConsensusState::genesis("DFI").unwrap();
        let alice = Address::parse("alice").unwrap();
        state.issue(&alice, TokenId::NATIVE, Amount::ONE).unwrap();
        assert!(check_structure(&state).is_ok());

        // a balance written without a matching issue
        state
            .accounts
            .credit(&mut state.journal, &alice, TokenId::NATIVE, Amount::from_raw(1))
            .unwrap();
        let err = check_structure(&state).unwrap_err();
        assert!(matches!(err, LoanError::InvariantBreach(ref m) if m.contains("in circulation")));

        state.revert_pending();
        assert!(check_structure(&state).is_ok());
    }
}
