//! Burn accounting

use vault_common::{Amount, Basket, LoanResult, TokenId};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BurnInfo {
    /// Native coin burned by vault creation, net of close refunds
    pub vault_fees: Amount,
    /// Interest paid back, per loan token
    pub payback_tokens: Basket,
    /// Cross-token payback fees, per paying token
    pub payback_fees: Basket,
    /// Tokens burned to repay loans in another token
    pub payback_burn: Basket,
    /// Liquidation penalties collected from winning bids
    pub auction_penalties: Basket,
    /// Winning bid amounts burned against liquidated loans
    pub auction_burn: Basket,
    /// Loan share written off after failed auctions
    pub bad_debt: Basket,
}

impl BurnInfo {
    pub fn add_payback_interest(&mut self, token: TokenId, amount: Amount) -> LoanResult<()> {
        if amount.is_positive() {
            self.payback_tokens.add(token, amount)?;
        }
        Ok(())
    }
}
