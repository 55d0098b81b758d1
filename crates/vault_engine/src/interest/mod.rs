//! Interest engine
//!
//! Lazy accrual on `(IPB, ITH, h)` checkpoints. Every event that changes a
//! loan amount, a scheme rate or a token rate first folds `IPB * elapsed`
//! into `ITH`, then recomputes `IPB`. Collateral events never touch the
//! records.

pub mod calc;

use vault_common::{Amount, HighPrecision, LoanError, LoanResult, TokenId, VaultId};

use crate::state::{ConsensusState, InterestRecord};

pub use calc::{accrued_to, interest_per_block, reported, truncated};

/// Split of a payback into its parts
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PaybackOutcome {
    /// Taken from the payer
    pub paid: Amount,
    /// Loan principal removed (may exceed `paid` when a rebate covers the rest)
    pub principal: Amount,
    /// Positive interest settled
    pub interest: Amount,
    /// Part of the offered amount left with the payer
    pub surplus: Amount,
    /// Principal cleared by negative interest rather than by the payer
    pub rebate: Amount,
}

/// `rS + rT` for one position
pub fn effective_rate(state: &ConsensusState, vault_id: &VaultId, token: TokenId) -> LoanResult<Amount> {
    let vault = state.vaults.require(vault_id)?;
    let scheme = state.schemes.require(&vault.scheme_id)?;
    let token = state.tokens.require(token)?;
    Ok(scheme.rate.checked_add(token.interest)?)
}

/// Interest accrued up to the current height without writing anything
pub fn accrued_interest(state: &ConsensusState, vault_id: &VaultId, token: TokenId) -> LoanResult<HighPrecision> {
    match state.interest.get(vault_id, token) {
        Some(record) => calc::accrued_to(record, state.height),
        None => Ok(HighPrecision::ZERO),
    }
}

/// Fold accrued interest into ITH; a second call in the same block changes nothing
pub fn checkpoint(state: &mut ConsensusState, vault_id: &VaultId, token: TokenId) -> LoanResult<InterestRecord> {
    let height = state.height;
    let Some(record) = state.interest.get(vault_id, token).copied() else {
        return Ok(InterestRecord {
            height,
            ..InterestRecord::default()
        });
    };
    if record.height >= height {
        return Ok(record);
    }
    let updated = InterestRecord {
        ipb: record.ipb,
        ith: calc::accrued_to(&record, height)?,
        height,
    };
    state
        .interest
        .set(&mut state.journal, vault_id, token, updated);
    log::debug!(
        "Checkpoint {} token {} at {}: ith {}",
        vault_id,
        token,
        height,
        updated.ith
    );
    Ok(updated)
}

/// Recompute IPB from the current loan and rates; erase the record once the loan is gone
pub fn refresh(state: &mut ConsensusState, blocks_per_year: u64, vault_id: &VaultId, token: TokenId) -> LoanResult<()> {
    let loan = state.vaults.require(vault_id)?.loans.get(token);
    if loan.is_zero() {
        state.interest.erase(&mut state.journal, vault_id, token);
        return Ok(());
    }
    let rate = effective_rate(state, vault_id, token)?;
    let ipb = calc::interest_per_block(loan, rate, blocks_per_year)?;
    let ith = state
        .interest
        .get(vault_id, token)
        .map(|r| r.ith)
        .unwrap_or(HighPrecision::ZERO);
    let height = state.height;
    state
        .interest
        .set(&mut state.journal, vault_id, token, InterestRecord { ipb, ith, height });
    Ok(())
}

/// Checkpoint then refresh one position
pub fn reconcile(state: &mut ConsensusState, blocks_per_year: u64, vault_id: &VaultId, token: TokenId) -> LoanResult<()> {
    checkpoint(state, vault_id, token)?;
    refresh(state, blocks_per_year, vault_id, token)
}

/// Reconcile every loan of one vault
pub fn reconcile_vault(state: &mut ConsensusState, blocks_per_year: u64, vault_id: &VaultId) -> LoanResult<()> {
    let tokens = state.vaults.require(vault_id)?.loans.tokens();
    for token in tokens {
        reconcile(state, blocks_per_year, vault_id, token)?;
    }
    Ok(())
}

/// Reconcile every vault bound to a scheme after its rate changed
pub fn reconcile_scheme(state: &mut ConsensusState, blocks_per_year: u64, scheme_id: &str) -> LoanResult<usize> {
    let vaults = state.vaults.bound_to(scheme_id);
    for vault_id in &vaults {
        reconcile_vault(state, blocks_per_year, vault_id)?;
    }
    Ok(vaults.len())
}

/// Reconcile every position in `token` after its rate changed
pub fn reconcile_token(state: &mut ConsensusState, blocks_per_year: u64, token: TokenId) -> LoanResult<usize> {
    let vaults: Vec<VaultId> = state
        .vaults
        .iter()
        .filter(|v| v.loans.contains(token))
        .map(|v| v.id.clone())
        .collect();
    for vault_id in &vaults {
        reconcile(state, blocks_per_year, vault_id, token)?;
    }
    Ok(vaults.len())
}

/// Write a new loan amount; callers move token supply themselves
pub fn set_loan(state: &mut ConsensusState, vault_id: &VaultId, token: TokenId, amount: Amount) -> LoanResult<()> {
    if amount.is_negative() {
        return Err(LoanError::InvariantBreach(format!(
            "negative loan {} for token {} in vault {}",
            amount, token, vault_id
        )));
    }
    state.vaults.modify(&mut state.journal, vault_id, |vault| {
        vault.loans.set(token, amount);
        Ok(())
    })
}

/// Add `amount` of new debt to a position, letting a negative reservoir absorb it first
///
/// The full `amount` is always minted. Whatever the reservoir absorbs, and
/// any principal a fully negated position leaves behind, is owed by no one
/// and goes to free float.
pub fn apply_take_loan(
    state: &mut ConsensusState,
    blocks_per_year: u64,
    vault_id: &VaultId,
    token: TokenId,
    amount: Amount,
) -> LoanResult<()> {
    let mut record = checkpoint(state, vault_id, token)?;
    let mut loan = state.vaults.require(vault_id)?.loans.get(token);

    // Rebate ran the whole position to zero: close it, the new loan starts fresh
    if record.ith.is_negative() && loan.to_high_precision()?.checked_add(record.ith)? <= HighPrecision::ZERO {
        set_loan(state, vault_id, token, Amount::ZERO)?;
        state
            .tokens
            .adjust_supply(&mut state.journal, token, Amount::ZERO, loan)?;
        state.interest.erase(&mut state.journal, vault_id, token);
        record = InterestRecord {
            height: state.height,
            ..InterestRecord::default()
        };
        loan = Amount::ZERO;
    }

    let amount_hp = amount.to_high_precision()?;
    let (new_loan, ith, absorbed) = if record.ith.is_negative() && record.ith.abs() >= amount_hp {
        (loan, record.ith.checked_add(amount_hp)?, amount)
    } else {
        let absorbed = calc::truncated(record.ith.min(HighPrecision::ZERO))?.abs();
        (
            loan.checked_add(amount)?.checked_sub(absorbed)?,
            record.ith.max(HighPrecision::ZERO),
            absorbed,
        )
    };

    set_loan(state, vault_id, token, new_loan)?;
    state
        .tokens
        .adjust_supply(&mut state.journal, token, amount, absorbed)?;
    let height = state.height;
    state.interest.set(
        &mut state.journal,
        vault_id,
        token,
        InterestRecord {
            ipb: record.ipb,
            ith,
            height,
        },
    );
    refresh(state, blocks_per_year, vault_id, token)
}

/// Pay `amount` against a position: positive interest first, then principal
///
/// Minted supply drops by the principal actually paid. Principal cleared by
/// a negative reservoir moves to free float.
pub fn apply_payback(
    state: &mut ConsensusState,
    blocks_per_year: u64,
    vault_id: &VaultId,
    token: TokenId,
    amount: Amount,
) -> LoanResult<PaybackOutcome> {
    let loan = state.vaults.require(vault_id)?.loans.get(token);
    if loan.is_zero() {
        return Err(LoanError::Validation(format!(
            "There is no loan on token ({}) in this vault!",
            token
        )));
    }
    let record = checkpoint(state, vault_id, token)?;

    let mut outcome = PaybackOutcome::default();
    let (new_loan, ith) = if record.ith.is_negative() {
        let owed = loan.checked_add(calc::truncated(record.ith)?)?.max(Amount::ZERO);
        if amount >= owed {
            outcome.paid = owed;
            outcome.principal = loan;
            outcome.rebate = loan.checked_sub(owed)?;
            outcome.surplus = amount.checked_sub(owed)?;
            (Amount::ZERO, HighPrecision::ZERO)
        } else {
            outcome.paid = amount;
            outcome.principal = amount;
            (loan.checked_sub(amount)?, record.ith)
        }
    } else {
        let (interest, ith) = calc::consume_reservoir(record.ith, amount)?;
        let remaining = amount.checked_sub(interest)?;
        let principal = remaining.min(loan);
        outcome.interest = interest;
        outcome.principal = principal;
        outcome.paid = interest.checked_add(principal)?;
        outcome.surplus = remaining.checked_sub(principal)?;
        (loan.checked_sub(principal)?, ith)
    };

    set_loan(state, vault_id, token, new_loan)?;
    let burned = outcome.principal.checked_sub(outcome.rebate)?;
    state
        .tokens
        .adjust_supply(&mut state.journal, token, burned.checked_neg()?, outcome.rebate)?;
    if new_loan.is_zero() {
        state.interest.erase(&mut state.journal, vault_id, token);
    } else {
        let height = state.height;
        state.interest.set(
            &mut state.journal,
            vault_id,
            token,
            InterestRecord {
                ipb: record.ipb,
                ith,
                height,
            },
        );
        refresh(state, blocks_per_year, vault_id, token)?;
    }
    Ok(outcome)
}

/// Drop every record of a vault (liquidation entry, close)
pub fn wipe_vault(state: &mut ConsensusState, vault_id: &VaultId) {
    for (token, _) in state.interest.for_vault(vault_id) {
        state.interest.erase(&mut state.journal, vault_id, token);
    }
}
