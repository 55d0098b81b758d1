//! Requests that must always be rejected without touching state

use proptest::prelude::*;
use serde_json::{json, Value};

/// Address that never enters the harness wallet
pub const STRANGER: &str = "stranger";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Attack {
    /// Deposit collateral from someone else's account
    ForeignDeposit,
    /// Pay back from someone else's account
    ForeignPayback,
    /// Bid with someone else's tokens
    ForeignBid,
    /// Burn someone else's tokens
    ForeignBurn,
    /// Amount beyond the fixed point range
    OverflowAmount,
    /// Token that does not exist
    UnknownToken,
    /// Vault id that was never created
    UnknownVault,
    /// Loan token that is not a loan token
    CollateralAsLoan,
}

impl Attack {
    /// RPC method and arguments against `vault`
    pub fn request(self, vault: &str, owner: &str) -> (&'static str, Value) {
        match self {
            Attack::ForeignDeposit => ("deposittovault", json!([vault, STRANGER, "1@DFI"])),
            Attack::ForeignPayback => (
                "paybackloan",
                json!([{"vaultId": vault, "from": STRANGER, "amounts": "1@DUSD"}]),
            ),
            Attack::ForeignBid => ("placeauctionbid", json!([vault, 0, STRANGER, "1@DUSD"])),
            Attack::ForeignBurn => ("burntokens", json!(["1@DFI", STRANGER])),
            Attack::OverflowAmount => (
                "deposittovault",
                json!([vault, owner, "99999999999999999999999999999999999@DFI"]),
            ),
            Attack::UnknownToken => ("deposittovault", json!([vault, owner, "1@NOSUCH"])),
            Attack::UnknownVault => (
                "deposittovault",
                json!(["ff".repeat(32), owner, "1@DFI"]),
            ),
            Attack::CollateralAsLoan => (
                "takeloan",
                json!([{"vaultId": vault, "amounts": "1@DFI"}]),
            ),
        }
    }
}

pub fn attack() -> impl Strategy<Value = Attack> {
    prop_oneof![
        Just(Attack::ForeignDeposit),
        Just(Attack::ForeignPayback),
        Just(Attack::ForeignBid),
        Just(Attack::ForeignBurn),
        Just(Attack::OverflowAmount),
        Just(Attack::UnknownToken),
        Just(Attack::UnknownVault),
        Just(Attack::CollateralAsLoan),
    ]
}
