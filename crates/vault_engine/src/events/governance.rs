//! Token, loan scheme and governance attribute handlers

use vault_common::{Address, Amount, CurrencyPair, Height, LoanError, LoanResult, TokenAmount, TokenRef, TokenId};

use crate::config::EngineConfig;
use crate::interest;
use crate::state::{
    AttributeKey, AttributeValue, ConsensusState, NewToken, PendingChange, TokenAttr, TokenFlags,
};

use super::vaults::resolve_amount;
use super::{CreateToken, EventContext, SetCollateralToken, SetLoanScheme, SetLoanToken, TokenUpdateArgs};

pub fn create_token(state: &mut ConsensusState, req: CreateToken) -> LoanResult<()> {
    let height = state.height;
    let id = state.tokens.create(
        &mut state.journal,
        NewToken {
            symbol: req.symbol,
            name: req.name,
            flags: req.flags,
            owner: req.owner,
            fixed_interval_price_id: None,
            interest: Amount::ZERO,
        },
        height,
    )?;
    log::info!("Token {} created", id);
    Ok(())
}

pub fn update_token(state: &mut ConsensusState, token: &TokenRef, update: TokenUpdateArgs) -> LoanResult<()> {
    let token = state.tokens.resolve(token)?;
    if token.is_retired() {
        return Err(LoanError::Validation(format!("token {} was retired by a split", token.symbol)));
    }
    let id = token.id;
    state.tokens.update(&mut state.journal, id, update.into())
}

/// Mint free float of mintable tokens; owned tokens need the owner's key
pub fn mint_tokens(
    state: &mut ConsensusState,
    ctx: &EventContext<'_>,
    to: &Address,
    amounts: &[TokenAmount],
) -> LoanResult<()> {
    for requested in amounts {
        let (token, amount) = resolve_amount(state, requested)?;
        let info = state.tokens.require(token)?;
        if info.is_retired() {
            return Err(LoanError::Validation(format!("token {} was retired by a split", info.symbol)));
        }
        if let Some(owner) = &info.owner {
            ctx.authorize(owner)?;
        }
        state.tokens.mint(&mut state.journal, token, amount)?;
        state.issue(to, token, amount)?;
    }
    Ok(())
}

pub fn burn_tokens(
    state: &mut ConsensusState,
    ctx: &EventContext<'_>,
    from: &Address,
    amounts: &[TokenAmount],
) -> LoanResult<()> {
    ctx.authorize(from)?;
    for requested in amounts {
        let (token, amount) = resolve_amount(state, requested)?;
        state.retire(from, token, amount)?;
        state.tokens.burn(&mut state.journal, token, amount)?;
    }
    Ok(())
}

pub fn utxos_to_account(state: &mut ConsensusState, to: &Address, amount: &TokenAmount) -> LoanResult<()> {
    let (token, amount) = resolve_amount(state, amount)?;
    if token != TokenId::NATIVE {
        return Err(LoanError::Validation(
            "Only the native coin can be moved from utxos".to_string(),
        ));
    }
    state.issue(to, token, amount)
}

fn ensure_price_feed(state: &ConsensusState, pair: &CurrencyPair) -> LoanResult<()> {
    if state.prices.get(pair).is_none() {
        return Err(LoanError::Validation(format!(
            "Price feed {} does not belong to any oracle",
            pair
        )));
    }
    Ok(())
}

pub fn set_loan_token(state: &mut ConsensusState, config: &EngineConfig, req: SetLoanToken) -> LoanResult<()> {
    ensure_price_feed(state, &req.price_id)?;
    let height = state.height;
    let id = state.tokens.create(
        &mut state.journal,
        NewToken {
            symbol: req.symbol.clone(),
            name: req.name,
            flags: TokenFlags {
                is_dat: true,
                is_loan_token: true,
                mintable: req.mintable,
                tradeable: true,
                ..TokenFlags::default()
            },
            owner: None,
            fixed_interval_price_id: Some(req.price_id.clone()),
            interest: req.interest,
        },
        height,
    )?;
    for (attr, value) in [
        (TokenAttr::FixedIntervalPriceId, AttributeValue::Pair(req.price_id)),
        (TokenAttr::LoanMintingEnabled, AttributeValue::Bool(true)),
        (TokenAttr::LoanMintingInterest, AttributeValue::Decimal(req.interest)),
    ] {
        apply_attribute(state, config, AttributeKey::Token(id, attr), value)?;
    }
    log::info!("Loan token {} ({}) set", req.symbol, id);
    Ok(())
}

pub fn set_collateral_token(
    state: &mut ConsensusState,
    config: &EngineConfig,
    req: SetCollateralToken,
) -> LoanResult<()> {
    let id = state.tokens.resolve(&req.token)?.id;
    if req.factor.is_negative() || req.factor > Amount::ONE {
        return Err(LoanError::AmountOutOfRange(format!(
            "collateral factor {} must be between 0 and 1",
            req.factor
        )));
    }
    ensure_price_feed(state, &req.price_id)?;
    for (attr, value) in [
        (TokenAttr::FixedIntervalPriceId, AttributeValue::Pair(req.price_id)),
        (TokenAttr::LoanCollateralFactor, AttributeValue::Decimal(req.factor)),
        (TokenAttr::LoanCollateralEnabled, AttributeValue::Bool(true)),
    ] {
        apply_attribute(state, config, AttributeKey::Token(id, attr), value)?;
    }
    log::info!("Collateral token {} set with factor {}", id, req.factor);
    Ok(())
}

pub fn create_loan_scheme(state: &mut ConsensusState, req: SetLoanScheme) -> LoanResult<()> {
    state
        .schemes
        .create(&mut state.journal, &req.id, req.ratio, req.rate)?;
    log::info!("Loan scheme {} created ({}%, {}%)", req.id, req.ratio, req.rate);
    Ok(())
}

pub fn update_loan_scheme(state: &mut ConsensusState, config: &EngineConfig, req: SetLoanScheme) -> LoanResult<()> {
    let height = state.height;
    let applied = state.schemes.update(
        &mut state.journal,
        &req.id,
        req.ratio,
        req.rate,
        req.activate_at,
        height,
    )?;
    if applied {
        let count = interest::reconcile_scheme(state, config.blocks_per_year, &req.id)?;
        log::info!("Loan scheme {} updated, {} vault(s) reconciled", req.id, count);
    } else {
        log::info!("Loan scheme {} update queued", req.id);
    }
    Ok(())
}

pub fn set_default_loan_scheme(state: &mut ConsensusState, id: &str) -> LoanResult<()> {
    state.schemes.set_default(&mut state.journal, id)
}

pub fn destroy_loan_scheme(state: &mut ConsensusState, id: &str, at: Option<Height>) -> LoanResult<()> {
    let height = state.height;
    match at {
        Some(at) => state.schemes.schedule_destroy(&mut state.journal, id, at, height),
        None => {
            let bound = state.vaults.bound_to(id).len();
            state.schemes.destroy(&mut state.journal, id, bound)
        }
    }
}

/// Reject changes naming unknown tokens or splits that are not in the future
fn validate_change(state: &ConsensusState, key: &AttributeKey, value: &AttributeValue) -> LoanResult<()> {
    match key {
        AttributeKey::Token(id, attr) => {
            state.tokens.require(*id)?;
            if let TokenAttr::LoanPayback(other) | TokenAttr::LoanPaybackFeePct(other) = attr {
                state.tokens.require(*other)?;
            }
        }
        AttributeKey::TokenLock(id) => {
            state.tokens.require(*id)?;
        }
        AttributeKey::OracleSplits(at) => {
            if *at <= state.height {
                return Err(LoanError::Validation(format!(
                    "Cannot set split at height {} at or below current height {}",
                    at, state.height
                )));
            }
            if let AttributeValue::Splits(entries) = value {
                for entry in entries {
                    let token = state.tokens.require(entry.token)?;
                    if !token.flags.is_loan_token {
                        return Err(LoanError::Validation(format!(
                            "Token {} is not a loan token, cannot split",
                            entry.token
                        )));
                    }
                }
            }
        }
        AttributeKey::LiquidationPenalty => {}
    }
    Ok(())
}

/// Write one attribute and project it onto the token it names
pub(crate) fn apply_attribute(
    state: &mut ConsensusState,
    config: &EngineConfig,
    key: AttributeKey,
    value: AttributeValue,
) -> LoanResult<()> {
    state.attributes.set(&mut state.journal, key, value.clone());
    let AttributeKey::Token(token, attr) = key else {
        return Ok(());
    };
    match (attr, value) {
        (TokenAttr::LoanMintingEnabled, AttributeValue::Bool(enabled)) => {
            state.tokens.modify(&mut state.journal, token, |t| {
                t.flags.is_loan_token = enabled;
                Ok(())
            })
        }
        (TokenAttr::LoanCollateralEnabled, AttributeValue::Bool(enabled)) => {
            state.tokens.modify(&mut state.journal, token, |t| {
                t.flags.is_collateral_token = enabled;
                Ok(())
            })
        }
        (TokenAttr::LoanCollateralFactor, AttributeValue::Decimal(factor)) => {
            state.tokens.modify(&mut state.journal, token, |t| {
                t.collateral_factor = factor;
                Ok(())
            })
        }
        (TokenAttr::FixedIntervalPriceId, AttributeValue::Pair(pair)) => {
            state.tokens.modify(&mut state.journal, token, |t| {
                t.fixed_interval_price_id = Some(pair);
                Ok(())
            })
        }
        (TokenAttr::LoanMintingInterest, AttributeValue::Decimal(rate)) => {
            if state.tokens.require(token)?.interest == rate {
                return Ok(());
            }
            state.tokens.set_interest(&mut state.journal, token, rate)?;
            let count = interest::reconcile_token(state, config.blocks_per_year, token)?;
            log::info!("Token {} interest set to {}%, {} position(s) reconciled", token, rate, count);
            Ok(())
        }
        _ => Ok(()),
    }
}

pub fn set_gov(
    state: &mut ConsensusState,
    config: &EngineConfig,
    changes: Vec<(AttributeKey, AttributeValue)>,
) -> LoanResult<()> {
    if changes.is_empty() {
        return Err(LoanError::MalformedArgs("No attributes given".to_string()));
    }
    for (key, value) in &changes {
        validate_change(state, key, value)?;
    }
    for (key, value) in changes {
        apply_attribute(state, config, key, value)?;
    }
    Ok(())
}

pub fn set_gov_height(
    state: &mut ConsensusState,
    changes: Vec<(AttributeKey, AttributeValue)>,
    height: Height,
) -> LoanResult<()> {
    if height <= state.height {
        return Err(LoanError::Validation(
            "setgovheight height must be above the current block height".to_string(),
        ));
    }
    if changes.is_empty() {
        return Err(LoanError::MalformedArgs("No attributes given".to_string()));
    }
    for (key, value) in &changes {
        validate_change(state, key, value)?;
    }
    let pending = changes
        .into_iter()
        .map(|(key, value)| PendingChange { key, value })
        .collect();
    state.attributes.schedule(&mut state.journal, height, pending);
    log::info!("Governance changes queued for height {}", height);
    Ok(())
}
