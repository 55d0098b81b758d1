//! Loan handlers: take, payback, payback with collateral, auction bids

use vault_common::{Address, Amount, LoanError, LoanResult, Rounding, TokenId, VaultId};

use crate::config::EngineConfig;
use crate::interest;
use crate::liquidation;
use crate::state::ConsensusState;
use crate::valuation;

use super::vaults::{ensure_unlocked, resolve_amount};
use super::{EventContext, PaybackLoan, PlaceAuctionBid, TakeLoan, TokenPayback};

pub fn take_loan(
    state: &mut ConsensusState,
    config: &EngineConfig,
    ctx: &EventContext<'_>,
    req: TakeLoan,
) -> LoanResult<()> {
    let vault = state.vaults.require(&req.vault_id)?.clone();
    vault.ensure_not_liquidating()?;
    ensure_unlocked(state, &vault)?;
    ctx.authorize(&vault.owner)?;
    if vault.collateral.is_empty() {
        return Err(LoanError::Validation(format!(
            "Vault <{}> has no collaterals",
            req.vault_id
        )));
    }

    let mut amounts = Vec::with_capacity(req.amounts.len());
    for requested in &req.amounts {
        let (token, amount) = resolve_amount(state, requested)?;
        if !state.tokens.require(token)?.flags.is_loan_token {
            return Err(LoanError::Validation(format!(
                "Loan token with id ({}) does not exist!",
                token
            )));
        }
        if state.attributes.is_locked(token) {
            return Err(LoanError::TokenLocked(token));
        }
        amounts.push((token, amount));
    }
    if amounts.is_empty() {
        return Err(LoanError::MalformedArgs("No loan amounts given".to_string()));
    }

    for &(token, amount) in &amounts {
        interest::apply_take_loan(state, config.blocks_per_year, &req.vault_id, token, amount)?;
    }

    let updated = state.vaults.require(&req.vault_id)?;
    let min_ratio = state.schemes.require(&updated.scheme_id)?.min_col_ratio;
    valuation::check_collateralization(state, config, updated, min_ratio)?;

    let to = req.to.unwrap_or_else(|| vault.owner.clone());
    for (token, amount) in amounts {
        state.issue(&to, token, amount)?;
        log::info!("Loan {} of token {} taken on {}", amount, token, req.vault_id);
    }
    Ok(())
}

pub fn payback_loan(
    state: &mut ConsensusState,
    config: &EngineConfig,
    ctx: &EventContext<'_>,
    req: PaybackLoan,
) -> LoanResult<()> {
    let vault = state.vaults.require(&req.vault_id)?;
    vault.ensure_not_liquidating()?;
    ensure_unlocked(state, vault)?;
    ctx.authorize(&req.from)?;
    if req.loans.is_empty() {
        return Err(LoanError::MalformedArgs("No payback amounts given".to_string()));
    }

    for entry in &req.loans {
        let loan_token = state.tokens.resolve(&entry.loan_token)?.id;
        if !state.vaults.require(&req.vault_id)?.loans.contains(loan_token) {
            return Err(LoanError::Validation(format!(
                "There is no loan on token ({}) in this vault!",
                loan_token
            )));
        }
        let (pay_token, _) = resolve_amount(state, &entry.amount)?;
        if pay_token == loan_token {
            same_token_payback(state, config, &req.vault_id, &req.from, entry)?;
        } else {
            cross_token_payback(state, config, &req.vault_id, &req.from, loan_token, entry)?;
        }
    }
    Ok(())
}

fn same_token_payback(
    state: &mut ConsensusState,
    config: &EngineConfig,
    vault_id: &VaultId,
    from: &Address,
    entry: &TokenPayback,
) -> LoanResult<()> {
    let (token, amount) = resolve_amount(state, &entry.amount)?;
    let outcome = interest::apply_payback(state, config.blocks_per_year, vault_id, token, amount)?;
    state.retire(from, token, outcome.paid)?;
    if outcome.interest.is_positive() {
        state.update_burn_info(|info| info.add_payback_interest(token, outcome.interest))?;
    }
    log::info!(
        "Payback {} of token {} on {} (principal {}, interest {})",
        outcome.paid,
        token,
        vault_id,
        outcome.principal,
        outcome.interest
    );
    Ok(())
}

/// Pay a loan with another token at the active oracle price, minus the governance fee
fn cross_token_payback(
    state: &mut ConsensusState,
    config: &EngineConfig,
    vault_id: &VaultId,
    from: &Address,
    loan_token: TokenId,
    entry: &TokenPayback,
) -> LoanResult<()> {
    let (pay_token, amount) = resolve_amount(state, &entry.amount)?;
    if !state.attributes.payback_allowed(loan_token, pay_token) {
        return Err(LoanError::Validation(format!(
            "Payback of loan via token {} is not currently active",
            pay_token
        )));
    }
    let loan_price = live_price(state, config, loan_token)?;
    let pay_price = live_price(state, config, pay_token)?;
    let fee_pct = state.attributes.payback_fee_pct(loan_token, pay_token);

    let net = amount.mul(Amount::ONE.checked_sub(fee_pct)?, Rounding::Floor)?;
    let converted = net
        .mul(pay_price, Rounding::Floor)?
        .div(loan_price, Rounding::Floor)?;
    if !converted.is_positive() {
        return Err(LoanError::AmountOutOfRange(format!(
            "{} is worth nothing in token {}",
            entry.amount, loan_token
        )));
    }

    let outcome = interest::apply_payback(state, config.blocks_per_year, vault_id, loan_token, converted)?;
    let spent = if outcome.surplus.is_positive() {
        amount
            .mul(outcome.paid, Rounding::Ceil)?
            .div(converted, Rounding::Ceil)?
            .min(amount)
    } else {
        amount
    };
    let fee = spent.mul(fee_pct, Rounding::Ceil)?.min(spent);
    let burned = spent.checked_sub(fee)?;

    state.retire(from, pay_token, spent)?;
    state.update_burn_info(|info| {
        if fee.is_positive() {
            info.payback_fees.add(pay_token, fee)?;
        }
        if burned.is_positive() {
            info.payback_burn.add(pay_token, burned)?;
        }
        if outcome.interest.is_positive() {
            info.add_payback_interest(loan_token, outcome.interest)?;
        }
        Ok(())
    })?;
    log::info!(
        "Payback of token {} on {} with {} of token {} (fee {})",
        loan_token,
        vault_id,
        spent,
        pay_token,
        fee
    );
    Ok(())
}

fn live_price(state: &ConsensusState, config: &EngineConfig, token: TokenId) -> LoanResult<Amount> {
    let price = valuation::token_price(state, config, token)?;
    if !price.is_live {
        return Err(LoanError::PriceNotLive(format!("price of token {} is not live", token)));
    }
    Ok(price.active)
}

/// Settle the stable-coin loan from the vault's own stable-coin collateral
pub fn payback_with_collateral(
    state: &mut ConsensusState,
    config: &EngineConfig,
    ctx: &EventContext<'_>,
    vault_id: &VaultId,
) -> LoanResult<()> {
    let vault = state.vaults.require(vault_id)?.clone();
    vault.ensure_not_liquidating()?;
    ensure_unlocked(state, &vault)?;
    ctx.authorize(&vault.owner)?;

    let stable = state
        .tokens
        .get_by_symbol(&config.stable_symbol)
        .map(|t| t.id)
        .ok_or_else(|| LoanError::Validation(format!("Cannot find token {}", config.stable_symbol)))?;
    if !state.attributes.payback_collateral_enabled(stable) {
        return Err(LoanError::Validation(format!(
            "Payback of {} loan with collateral is not currently active",
            config.stable_symbol
        )));
    }
    let collateral = vault.collateral.get(stable);
    if collateral.is_zero() {
        return Err(LoanError::Validation(format!(
            "Vault does not have any {} collaterals",
            config.stable_symbol
        )));
    }
    let loan = vault.loans.get(stable);
    if loan.is_zero() {
        return Err(LoanError::Validation(format!(
            "Vault does not have any {} loans",
            config.stable_symbol
        )));
    }

    let ith = interest::accrued_interest(state, vault_id, stable)?;
    let owed = if ith.is_negative() {
        loan.checked_add(interest::truncated(ith)?)?.max(Amount::ZERO)
    } else {
        loan.checked_add(interest::reported(ith)?)?
    };
    let used = collateral.min(owed);

    let outcome = interest::apply_payback(state, config.blocks_per_year, vault_id, stable, used)?;
    state
        .vaults
        .modify(&mut state.journal, vault_id, |v| v.collateral.sub(stable, outcome.paid))?;
    state
        .tokens
        .adjust_circulating(&mut state.journal, stable, outcome.paid.checked_neg()?)?;
    if outcome.interest.is_positive() {
        state.update_burn_info(|info| info.add_payback_interest(stable, outcome.interest))?;
    }

    let updated = state.vaults.require(vault_id)?;
    if !updated.loans.is_empty() {
        let min_ratio = state.schemes.require(&updated.scheme_id)?.min_col_ratio;
        let values = valuation::value_vault(state, config, updated, true)?;
        if !values.satisfies(min_ratio)? {
            return Err(LoanError::RatioViolation(format!(
                "Vault does not have enough collateralization ratio defined by loan scheme - {} < {}",
                values.active.ratio().min(values.next.ratio()),
                min_ratio
            )));
        }
    }
    log::info!(
        "Vault {} paid {} of {} from collateral",
        vault_id,
        outcome.paid,
        config.stable_symbol
    );
    Ok(())
}

pub fn place_auction_bid(
    state: &mut ConsensusState,
    config: &EngineConfig,
    ctx: &EventContext<'_>,
    req: PlaceAuctionBid,
) -> LoanResult<()> {
    ctx.authorize(&req.from)?;
    let (token, amount) = resolve_amount(state, &req.amount)?;
    liquidation::place_bid(state, config, &req.vault_id, req.index, &req.from, token, amount)
}
