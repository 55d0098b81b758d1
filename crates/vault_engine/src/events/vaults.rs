//! Vault lifecycle handlers: create, update, deposit, withdraw, close

use vault_common::{Address, Amount, LoanError, LoanResult, TokenAmount, TokenId, VaultId};

use crate::config::EngineConfig;
use crate::interest;
use crate::state::{ConsensusState, Vault, VaultStatus};
use crate::valuation;

use super::EventContext;

/// Resolve `x@TOKEN` to an existing token id
pub(crate) fn resolve_amount(state: &ConsensusState, amount: &TokenAmount) -> LoanResult<(TokenId, Amount)> {
    let token = state.tokens.resolve(&amount.token)?;
    Ok((token.id, amount.amount))
}

/// A vault holding a locked loan token is frozen
pub(crate) fn ensure_unlocked(state: &ConsensusState, vault: &Vault) -> LoanResult<()> {
    match vault
        .loans
        .tokens()
        .into_iter()
        .find(|t| state.attributes.is_locked(*t))
    {
        Some(token) => Err(LoanError::TokenLocked(token)),
        None => Ok(()),
    }
}

/// Vault that may still be changed by its owner or a depositor
fn mutable_vault(state: &ConsensusState, vault_id: &VaultId) -> LoanResult<Vault> {
    let vault = state.vaults.require(vault_id)?;
    vault.ensure_not_liquidating()?;
    ensure_unlocked(state, vault)?;
    Ok(vault.clone())
}

fn usable_scheme(state: &ConsensusState, scheme_id: &str) -> LoanResult<u32> {
    let scheme = state.schemes.get(scheme_id).ok_or_else(|| {
        LoanError::Validation(format!("Cannot find existing loan scheme with id {}", scheme_id))
    })?;
    if scheme.is_pending_destruction() {
        return Err(LoanError::Validation(format!(
            "Cannot set {} as loan scheme, set to be destroyed",
            scheme_id
        )));
    }
    Ok(scheme.min_col_ratio)
}

pub fn create_vault(
    state: &mut ConsensusState,
    config: &EngineConfig,
    ctx: &EventContext<'_>,
    owner: Address,
    scheme_id: Option<String>,
) -> LoanResult<VaultId> {
    let scheme_id = match scheme_id.filter(|s| !s.is_empty()) {
        Some(id) => id,
        None => state
            .schemes
            .default_id()
            .map(str::to_string)
            .ok_or_else(|| LoanError::Validation("There is no default loan scheme".to_string()))?,
    };
    usable_scheme(state, &scheme_id)?;

    let vault_id = ctx.txid.clone();
    let height = state.height;
    state.vaults.insert(
        &mut state.journal,
        Vault::new(vault_id.clone(), owner.clone(), scheme_id.clone(), height),
    )?;
    let fee = config.vault_creation_fee;
    state.update_burn_info(|info| {
        info.vault_fees = info.vault_fees.checked_add(fee)?;
        Ok(())
    })?;
    log::info!("Vault {} created for {} on scheme {}", vault_id, owner, scheme_id);
    Ok(vault_id)
}

pub fn update_vault(
    state: &mut ConsensusState,
    config: &EngineConfig,
    ctx: &EventContext<'_>,
    vault_id: &VaultId,
    owner: Option<Address>,
    scheme_id: Option<String>,
) -> LoanResult<()> {
    let vault = mutable_vault(state, vault_id)?;
    if vault.status != VaultStatus::Active {
        return Err(LoanError::Validation(format!(
            "Vault {} may be liquidated, cannot update",
            vault_id
        )));
    }
    ctx.authorize(&vault.owner)?;

    if let Some(scheme_id) = scheme_id.filter(|s| *s != vault.scheme_id) {
        let min_ratio = usable_scheme(state, &scheme_id)?;
        // accrue at the old rate before rebinding
        interest::reconcile_vault(state, config.blocks_per_year, vault_id)?;
        state.vaults.modify(&mut state.journal, vault_id, |v| {
            v.scheme_id = scheme_id.clone();
            Ok(())
        })?;
        interest::reconcile_vault(state, config.blocks_per_year, vault_id)?;

        // the native share rule only binds loans and withdrawals
        let updated = state.vaults.require(vault_id)?;
        if !updated.loans.is_empty() {
            valuation::check_ratio(state, config, updated, min_ratio)?;
        }
        log::info!("Vault {} moved to scheme {}", vault_id, scheme_id);
    }

    if let Some(owner) = owner {
        state.vaults.modify(&mut state.journal, vault_id, |v| {
            v.owner = owner;
            Ok(())
        })?;
    }
    Ok(())
}

pub fn deposit(
    state: &mut ConsensusState,
    ctx: &EventContext<'_>,
    vault_id: &VaultId,
    from: &Address,
    amount: &TokenAmount,
) -> LoanResult<()> {
    mutable_vault(state, vault_id)?;
    let (token, amount) = resolve_amount(state, amount)?;
    if !state.tokens.require(token)?.flags.is_collateral_token {
        return Err(LoanError::Validation(format!(
            "Collateral token with id ({}) does not exist!",
            token
        )));
    }
    ctx.authorize(from)?;

    state.accounts.debit(&mut state.journal, from, token, amount)?;
    state.vaults.modify(&mut state.journal, vault_id, |v| v.collateral.add(token, amount))?;
    log::debug!("Deposit {} of token {} into {}", amount, token, vault_id);
    Ok(())
}

pub fn withdraw(
    state: &mut ConsensusState,
    config: &EngineConfig,
    ctx: &EventContext<'_>,
    vault_id: &VaultId,
    to: &Address,
    amount: &TokenAmount,
) -> LoanResult<()> {
    let vault = mutable_vault(state, vault_id)?;
    ctx.authorize(&vault.owner)?;
    let (token, amount) = resolve_amount(state, amount)?;
    let held = vault.collateral.get(token);
    if held.is_zero() {
        return Err(LoanError::Validation(format!(
            "Collateral for vault <{}> not found",
            vault_id
        )));
    }
    if held < amount {
        return Err(LoanError::Validation(format!(
            "Amount {} is less than {}",
            held, amount
        )));
    }

    state.vaults.modify(&mut state.journal, vault_id, |v| v.collateral.sub(token, amount))?;
    let updated = state.vaults.require(vault_id)?;
    if !updated.loans.is_empty() {
        let min_ratio = state.schemes.require(&updated.scheme_id)?.min_col_ratio;
        valuation::check_collateralization(state, config, updated, min_ratio.max(config.min_withdraw_ratio))?;
    }
    state.accounts.credit(&mut state.journal, to, token, amount)?;
    log::debug!("Withdraw {} of token {} from {}", amount, token, vault_id);
    Ok(())
}

pub fn close_vault(
    state: &mut ConsensusState,
    config: &EngineConfig,
    ctx: &EventContext<'_>,
    vault_id: &VaultId,
    to: &Address,
) -> LoanResult<()> {
    let vault = mutable_vault(state, vault_id)?;
    ctx.authorize(&vault.owner)?;
    if !vault.loans.is_empty() {
        return Err(LoanError::Validation(format!(
            "Vault <{}> has loans",
            vault_id
        )));
    }

    for (token, amount) in vault.collateral.iter() {
        state.accounts.credit(&mut state.journal, to, token, amount)?;
    }
    let refund = config.vault_close_refund;
    if refund.is_positive() {
        state.issue(to, TokenId::NATIVE, refund)?;
        state.update_burn_info(|info| {
            info.vault_fees = info.vault_fees.checked_sub(refund)?;
            Ok(())
        })?;
    }
    interest::wipe_vault(state, vault_id);
    state.vaults.remove(&mut state.journal, vault_id)?;
    log::info!("Vault {} closed", vault_id);
    Ok(())
}
