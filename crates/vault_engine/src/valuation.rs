//! Collateral and loan valuation, ratio rules

use std::collections::BTreeMap;

use vault_common::{Amount, LoanError, LoanResult, Rounding, TokenId};

use crate::config::EngineConfig;
use crate::interest;
use crate::state::{ConsensusState, ValidPrice, Vault};

/// Values of one vault under one price set
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Valuation {
    pub collateral: Amount,
    /// Native coin part of `collateral`
    pub native_collateral: Amount,
    /// Loans plus accrued interest
    pub loans: Amount,
}

impl Valuation {
    /// Whole percent, -1 without loans
    pub fn ratio(&self) -> i64 {
        if !self.loans.is_positive() {
            return -1;
        }
        match self.collateral.div(self.loans, Rounding::Floor) {
            Ok(q) => i64::try_from(q.raw().saturating_mul(100) / Amount::SCALE).unwrap_or(i64::MAX),
            Err(_) => i64::MAX,
        }
    }

    /// Percent with 8 decimals, -1 without loans
    pub fn informative_ratio(&self) -> Amount {
        if !self.loans.is_positive() {
            return Amount::from_raw(-Amount::SCALE);
        }
        self.collateral
            .div(self.loans, Rounding::Floor)
            .and_then(|q| q.checked_mul_int(100))
            .unwrap_or(Amount::from_raw(i128::MAX))
    }

    /// Collateral needed for `ratio_pct`
    pub fn required(&self, ratio_pct: u32) -> LoanResult<Amount> {
        Ok(self
            .loans
            .checked_mul_int(ratio_pct as i128)?
            .div(Amount::from_int(100)?, Rounding::Ceil)?)
    }

    pub fn satisfies(&self, ratio_pct: u32) -> LoanResult<bool> {
        Ok(self.collateral >= self.required(ratio_pct)?)
    }

    /// Native coin must cover `share` of the required collateral
    pub fn satisfies_native_rule(&self, ratio_pct: u32, share: Amount) -> LoanResult<bool> {
        if !self.loans.is_positive() {
            return Ok(true);
        }
        let needed = self.required(ratio_pct)?.mul(share, Rounding::Ceil)?;
        Ok(self.native_collateral >= needed)
    }
}

/// Valuation under both the active and the next price
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VaultValuation {
    pub active: Valuation,
    pub next: Valuation,
    /// Every required price is live
    pub is_live: bool,
}

impl VaultValuation {
    pub fn satisfies(&self, ratio_pct: u32) -> LoanResult<bool> {
        Ok(self.active.satisfies(ratio_pct)? && self.next.satisfies(ratio_pct)?)
    }
}

/// Fixed interval price of a token
pub fn token_price(state: &ConsensusState, config: &EngineConfig, token: TokenId) -> LoanResult<ValidPrice> {
    let token = state.tokens.require(token)?;
    let pair = token
        .fixed_interval_price_id
        .as_ref()
        .ok_or_else(|| LoanError::PriceNotLive(format!("{} has no fixed interval price", token.symbol)))?;
    state.prices.get_valid_price(pair, config.price_deviation)
}

fn loan_total(state: &ConsensusState, vault: &Vault, token: TokenId, amount: Amount) -> LoanResult<Amount> {
    let ith = interest::accrued_interest(state, &vault.id, token)?;
    Ok(amount.checked_add(interest::reported(ith)?)?.max(Amount::ZERO))
}

fn add_collateral(
    acc: &mut Valuation,
    token: TokenId,
    amount: Amount,
    price: Amount,
    factor: Amount,
) -> LoanResult<()> {
    let value = amount
        .mul(price, Rounding::Floor)?
        .mul(factor, Rounding::Floor)?;
    acc.collateral = acc.collateral.checked_add(value)?;
    if token == TokenId::NATIVE {
        acc.native_collateral = acc.native_collateral.checked_add(value)?;
    }
    Ok(())
}

/// Value a vault with oracle prices. With `require_live` a non-live price fails.
pub fn value_vault(
    state: &ConsensusState,
    config: &EngineConfig,
    vault: &Vault,
    require_live: bool,
) -> LoanResult<VaultValuation> {
    let mut out = VaultValuation {
        is_live: true,
        ..VaultValuation::default()
    };

    for (token, amount) in vault.collateral.iter() {
        let price = token_price(state, config, token)?;
        if !price.is_live {
            if require_live {
                return Err(LoanError::PriceNotLive(token_pair_label(state, token)));
            }
            out.is_live = false;
        }
        let factor = state.tokens.require(token)?.collateral_factor;
        add_collateral(&mut out.active, token, amount, price.active, factor)?;
        add_collateral(&mut out.next, token, amount, price.next, factor)?;
    }

    for (token, amount) in vault.loans.iter() {
        let price = token_price(state, config, token)?;
        if !price.is_live {
            if require_live {
                return Err(LoanError::PriceNotLive(token_pair_label(state, token)));
            }
            out.is_live = false;
        }
        let total = loan_total(state, vault, token, amount)?;
        out.active.loans = out.active.loans.checked_add(total.mul(price.active, Rounding::Ceil)?)?;
        out.next.loans = out.next.loans.checked_add(total.mul(price.next, Rounding::Ceil)?)?;
    }
    Ok(out)
}

/// Value a vault with an explicit price per token (captured liquidation prices)
pub fn value_with_prices(
    state: &ConsensusState,
    vault: &Vault,
    prices: &BTreeMap<TokenId, Amount>,
) -> LoanResult<Valuation> {
    let price_of = |token: TokenId| {
        prices
            .get(&token)
            .copied()
            .ok_or_else(|| LoanError::PriceNotLive(format!("no captured price for token {}", token)))
    };
    let mut out = Valuation::default();
    for (token, amount) in vault.collateral.iter() {
        let factor = state.tokens.require(token)?.collateral_factor;
        add_collateral(&mut out, token, amount, price_of(token)?, factor)?;
    }
    for (token, amount) in vault.loans.iter() {
        let total = loan_total(state, vault, token, amount)?;
        out.loans = out.loans.checked_add(total.mul(price_of(token)?, Rounding::Ceil)?)?;
    }
    Ok(out)
}

fn collect_prices(
    state: &ConsensusState,
    config: &EngineConfig,
    vault: &Vault,
    next: bool,
) -> LoanResult<BTreeMap<TokenId, Amount>> {
    let mut prices = BTreeMap::new();
    for token in vault.collateral.tokens().into_iter().chain(vault.loans.tokens()) {
        let price = token_price(state, config, token)?;
        prices.insert(token, if next { price.next } else { price.active });
    }
    Ok(prices)
}

/// Next prices of every token in the vault
pub fn capture_prices(
    state: &ConsensusState,
    config: &EngineConfig,
    vault: &Vault,
) -> LoanResult<BTreeMap<TokenId, Amount>> {
    collect_prices(state, config, vault, true)
}

/// Active prices of every token in the vault
pub fn active_prices(
    state: &ConsensusState,
    config: &EngineConfig,
    vault: &Vault,
) -> LoanResult<BTreeMap<TokenId, Amount>> {
    collect_prices(state, config, vault, false)
}

fn token_pair_label(state: &ConsensusState, token: TokenId) -> String {
    state
        .tokens
        .get(token)
        .and_then(|t| t.fixed_interval_price_id.as_ref())
        .map(|p| p.to_string())
        .unwrap_or_else(|| token.to_string())
}

/// Collateral ratio under both prices, for vaults carrying loans
pub fn check_ratio(
    state: &ConsensusState,
    config: &EngineConfig,
    vault: &Vault,
    ratio_pct: u32,
) -> LoanResult<VaultValuation> {
    let valuation = value_vault(state, config, vault, true)?;
    if !vault.loans.is_empty() && !valuation.satisfies(ratio_pct)? {
        return Err(LoanError::RatioViolation(format!(
            "{} < {}",
            valuation.active.ratio().min(valuation.next.ratio()),
            ratio_pct
        )));
    }
    Ok(valuation)
}

/// Ratio and native rule for a vault after a loan or a withdrawal
pub fn check_collateralization(
    state: &ConsensusState,
    config: &EngineConfig,
    vault: &Vault,
    ratio_pct: u32,
) -> LoanResult<VaultValuation> {
    let valuation = check_ratio(state, config, vault, ratio_pct)?;
    if !vault.loans.is_empty() {
        let share = config.native_collateral_share;
        if !valuation.active.satisfies_native_rule(ratio_pct, share)?
            || !valuation.next.satisfies_native_rule(ratio_pct, share)?
        {
            return Err(LoanError::RatioViolation(format!(
                "At least 50% of the minimum required collateral must be in {}",
                config.native_symbol
            )));
        }
    }
    Ok(valuation)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amt(s: &str) -> Amount {
        s.parse().unwrap()
    }

    #[test]
    fn test_ratio_without_loans() {
        let v = Valuation {
            collateral: amt("100"),
            ..Valuation::default()
        };
        assert_eq!(v.ratio(), -1);
        assert_eq!(v.informative_ratio(), amt("-1"));
        assert!(v.satisfies_native_rule(150, amt("0.5")).unwrap());
    }

    #[test]
    fn test_ratio_and_required() {
        let v = Valuation {
            collateral: amt("150"),
            native_collateral: amt("74"),
            loans: amt("100"),
        };
        assert_eq!(v.ratio(), 150);
        assert_eq!(v.informative_ratio(), amt("150"));
        assert_eq!(v.required(150).unwrap(), amt("150"));
        assert!(v.satisfies(150).unwrap());
        assert!(!v.satisfies(151).unwrap());
        assert!(!v.satisfies_native_rule(150, amt("0.5")).unwrap());
    }
}
