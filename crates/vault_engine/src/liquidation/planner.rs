//! Auction batch planner

use std::collections::BTreeMap;

use vault_common::{Amount, Basket, Height, LoanError, LoanResult, Rounding, TokenId};

use crate::interest;
use crate::state::{AuctionBatch, ConsensusState, Vault};

/// Loan position as it enters liquidation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoanShare {
    pub token: TokenId,
    /// Principal plus interest, never negative
    pub total: Amount,
    /// Positive interest part of `total`
    pub interest: Amount,
    /// `total` valued at the liquidation price
    pub value: Amount,
}

/// Liquidation inputs collected from the vault before it is cleared
pub fn loan_shares(
    state: &ConsensusState,
    vault: &Vault,
    prices: &BTreeMap<TokenId, Amount>,
) -> LoanResult<Vec<LoanShare>> {
    let mut shares = Vec::with_capacity(vault.loans.len());
    for (token, principal) in vault.loans.iter() {
        let interest = interest::reported(interest::accrued_interest(state, &vault.id, token)?)?;
        let total = principal.checked_add(interest)?.max(Amount::ZERO);
        let price = prices
            .get(&token)
            .copied()
            .ok_or_else(|| LoanError::PriceNotLive(format!("no liquidation price for token {}", token)))?;
        shares.push(LoanShare {
            token,
            total,
            interest: interest.max(Amount::ZERO).min(total),
            value: total.mul(price, Rounding::Ceil)?,
        });
    }
    Ok(shares)
}

/// Split `amount` into `parts` equal pieces, remainder to the last
fn split_even(amount: Amount, parts: u32) -> LoanResult<Vec<Amount>> {
    let parts = parts.max(1) as i128;
    let piece = Amount::from_raw(amount.raw() / parts);
    let mut out = vec![piece; parts as usize];
    let used = piece.checked_mul_int(parts - 1)?;
    if let Some(last) = out.last_mut() {
        *last = amount.checked_sub(used)?;
    }
    Ok(out)
}

fn collateral_value(basket: &Basket, prices: &BTreeMap<TokenId, Amount>) -> LoanResult<Amount> {
    let mut total = Amount::ZERO;
    for (token, amount) in basket.iter() {
        let price = prices.get(&token).copied().unwrap_or(Amount::ZERO);
        total = total.checked_add(amount.mul(price, Rounding::Floor)?)?;
    }
    Ok(total)
}

/// Cut a vault's collateral into auction batches
///
/// # Algorithm
/// 1. Each loan token receives the share of every collateral equal to its
///    share of the total loan value; the last loan token takes the remainder
/// 2. A share worth more than `batch_max_value` is split into
///    `ceil(value / batch_max_value)` equal batches, remainder to the last
/// 3. Each batch starts at `loan * (1 + penalty)`
pub fn plan_batches(
    collateral: &Basket,
    shares: &[LoanShare],
    prices: &BTreeMap<TokenId, Amount>,
    penalty: Amount,
    batch_max_value: Amount,
    end_height: Height,
) -> LoanResult<Vec<AuctionBatch>> {
    let total_value = shares
        .iter()
        .try_fold(Amount::ZERO, |acc, s| acc.checked_add(s.value))?;
    if !total_value.is_positive() {
        return Err(LoanError::InvariantBreach(
            "liquidating a vault without loan value".to_string(),
        ));
    }
    let markup = Amount::ONE.checked_add(penalty)?;

    let mut remaining = collateral.clone();
    let mut batches = Vec::new();
    for (i, share) in shares.iter().enumerate() {
        let last_share = i + 1 == shares.len();
        let mut slice = Basket::new();
        for (token, amount) in collateral.iter() {
            let part = if last_share {
                remaining.get(token)
            } else {
                amount.mul(share.value, Rounding::Floor)?.div(total_value, Rounding::Floor)?
            };
            remaining.sub(token, part)?;
            slice.set(token, part);
        }

        let value = collateral_value(&slice, prices)?;
        let count = if value <= batch_max_value {
            1
        } else {
            let n = value
                .div(batch_max_value, Rounding::Ceil)?
                .rescale::<0>(Rounding::Ceil)?
                .raw();
            u32::try_from(n).map_err(|_| LoanError::Overflow)?
        };

        let loan_parts = split_even(share.total, count)?;
        let interest_parts = split_even(share.interest, count)?;
        let mut collateral_parts: Vec<Basket> = vec![Basket::new(); count as usize];
        for (token, amount) in slice.iter() {
            for (k, piece) in split_even(amount, count)?.into_iter().enumerate() {
                collateral_parts[k].set(token, piece);
            }
        }

        for (k, collaterals) in collateral_parts.into_iter().enumerate() {
            let loan_amount = loan_parts[k];
            batches.push(AuctionBatch {
                index: batches.len() as u32,
                collaterals,
                loan_token: share.token,
                loan_amount,
                loan_interest: interest_parts[k],
                start_bid: loan_amount.mul(markup, Rounding::Ceil)?,
                best_bid: None,
                end_height,
                relisted: false,
            });
        }
    }
    Ok(batches)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amt(s: &str) -> Amount {
        s.parse().unwrap()
    }

    fn share(token: u32, total: &str, value: &str) -> LoanShare {
        LoanShare {
            token: TokenId(token),
            total: amt(total),
            interest: Amount::ZERO,
            value: amt(value),
        }
    }

    fn prices() -> BTreeMap<TokenId, Amount> {
        BTreeMap::from([
            (TokenId(0), amt("1")),
            (TokenId(1), amt("10")),
            (TokenId(2), amt("1")),
        ])
    }

    #[test]
    fn test_single_batch() {
        let mut collateral = Basket::new();
        collateral.set(TokenId(0), amt("150"));
        let batches = plan_batches(
            &collateral,
            &[share(1, "10", "100")],
            &prices(),
            amt("0.05"),
            amt("10000"),
            50,
        )
        .unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].collaterals.get(TokenId(0)), amt("150"));
        assert_eq!(batches[0].start_bid, amt("10.5"));
        assert_eq!(batches[0].end_height, 50);
    }

    #[test]
    fn test_split_by_max_value() {
        let mut collateral = Basket::new();
        collateral.set(TokenId(0), amt("25000"));
        let batches = plan_batches(
            &collateral,
            &[share(1, "1000", "10000")],
            &prices(),
            amt("0.05"),
            amt("10000"),
            50,
        )
        .unwrap();
        assert_eq!(batches.len(), 3);
        let total: i128 = batches.iter().map(|b| b.collaterals.get(TokenId(0)).raw()).sum();
        assert_eq!(total, amt("25000").raw());
        let loans: i128 = batches.iter().map(|b| b.loan_amount.raw()).sum();
        assert_eq!(loans, amt("1000").raw());
        assert_eq!(batches[2].index, 2);
    }

    #[test]
    fn test_proportional_shares_use_all_collateral() {
        let mut collateral = Basket::new();
        collateral.set(TokenId(0), amt("301"));
        let batches = plan_batches(
            &collateral,
            &[share(1, "10", "100"), share(2, "200", "200")],
            &prices(),
            amt("0.05"),
            amt("10000"),
            50,
        )
        .unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].loan_token, TokenId(1));
        let first = batches[0].collaterals.get(TokenId(0));
        let second = batches[1].collaterals.get(TokenId(0));
        assert_eq!(first.checked_add(second).unwrap(), amt("301"));
        assert_eq!(first, amt("100.33333333"));
    }

    #[test]
    fn test_no_loan_value_rejected() {
        let collateral = Basket::new();
        assert!(plan_batches(&collateral, &[], &prices(), amt("0.05"), amt("1"), 1).is_err());
    }
}
