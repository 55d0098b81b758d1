//! Strategies for operation sequences and raw amounts

use proptest::collection::vec;
use proptest::prelude::*;

/// Which loan token an operation touches
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoanToken {
    Dusd,
    Tsla,
}

impl LoanToken {
    pub fn symbol(self) -> &'static str {
        match self {
            LoanToken::Dusd => "DUSD",
            LoanToken::Tsla => "TSLA",
        }
    }
}

/// Price feeds the harness moves around
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Feed {
    Dfi,
    Tsla,
}

/// One step of a scenario. Amounts are satoshis, vault numbers index the
/// harness vaults modulo their count.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Op {
    Deposit { vault: usize, sats: i64 },
    Withdraw { vault: usize, sats: i64 },
    Take { vault: usize, token: LoanToken, sats: i64 },
    Payback { vault: usize, token: LoanToken, sats: i64 },
    /// Move a feed by `permille` of its last submitted price
    Price { feed: Feed, permille: i32 },
    /// Token interest of DUSD in percent, may be negative
    Rate { pct: i32 },
    Bid { vault: usize, token: LoanToken, sats: i64 },
    Generate { blocks: u8 },
}

pub fn loan_token() -> impl Strategy<Value = LoanToken> {
    prop_oneof![Just(LoanToken::Dusd), Just(LoanToken::Tsla)]
}

pub fn feed() -> impl Strategy<Value = Feed> {
    prop_oneof![Just(Feed::Dfi), Just(Feed::Tsla)]
}

/// Up to 100 coins, biased toward small and dust values
pub fn sats() -> impl Strategy<Value = i64> {
    prop_oneof![
        2 => 1i64..1_000,
        3 => 1_000i64..1_000_000_000,
        3 => 1_000_000_000i64..10_000_000_000,
    ]
}

pub fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (any::<usize>(), sats()).prop_map(|(vault, sats)| Op::Deposit { vault, sats }),
        2 => (any::<usize>(), sats()).prop_map(|(vault, sats)| Op::Withdraw { vault, sats }),
        3 => (any::<usize>(), loan_token(), sats())
            .prop_map(|(vault, token, sats)| Op::Take { vault, token, sats }),
        2 => (any::<usize>(), loan_token(), sats())
            .prop_map(|(vault, token, sats)| Op::Payback { vault, token, sats }),
        2 => (feed(), -400i32..600).prop_map(|(feed, permille)| Op::Price { feed, permille }),
        1 => (-20i32..20).prop_map(|pct| Op::Rate { pct }),
        1 => (any::<usize>(), loan_token(), sats())
            .prop_map(|(vault, token, sats)| Op::Bid { vault, token, sats }),
        3 => (1u8..40).prop_map(|blocks| Op::Generate { blocks }),
    ]
}

pub fn ops(max_len: usize) -> impl Strategy<Value = Vec<Op>> {
    vec(op(), 1..max_len)
}

/// Raw values of an `Amount` loan, always positive
pub fn loan_raw() -> impl Strategy<Value = i128> {
    1i128..1_000_000_000_000_000
}

/// Annual rates from -100% to +100% at 8 digits
pub fn rate_raw() -> impl Strategy<Value = i128> {
    -10_000_000_000i128..10_000_000_000
}
