//! Identifiers and collections shared across the engine

use core::fmt;
use core::str::FromStr;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{LoanError, LoanResult};
use crate::fixed::Amount;

/// Block height
pub type Height = u64;

/// Stable token identifier, assigned monotonically and never reused
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenId(pub u32);

impl TokenId {
    /// Native coin
    pub const NATIVE: TokenId = TokenId(0);
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transaction id, 64 lowercase hex characters
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxId(pub String);

impl TxId {
    pub fn parse(s: &str) -> LoanResult<Self> {
        if s.len() != 64 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(LoanError::MalformedArgs(format!(
                "txid must be of length 64 (not {}, for '{}')",
                s.len(),
                s
            )));
        }
        Ok(TxId(s.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A vault is identified by the id of its creating transaction
pub type VaultId = TxId;

/// Owner / recipient address on the native ledger
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(pub String);

impl Address {
    /// Validate the textual form (non-empty, alphanumeric, bounded length)
    pub fn parse(s: &str) -> LoanResult<Self> {
        let valid = !s.is_empty()
            && s.len() <= 128
            && s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_');
        if !valid {
            return Err(LoanError::InvalidAddress(s.to_string()));
        }
        Ok(Address(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `(token, currency)` pair used for oracle valuation, e.g. `TSLA/USD`
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyPair {
    pub token: String,
    pub currency: String,
}

impl CurrencyPair {
    pub fn new(token: &str, currency: &str) -> Self {
        Self {
            token: token.to_string(),
            currency: currency.to_string(),
        }
    }
}

impl FromStr for CurrencyPair {
    type Err = LoanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((token, currency))
                if !token.is_empty() && !currency.is_empty() && !currency.contains('/') =>
            {
                Ok(CurrencyPair::new(token, currency))
            }
            _ => Err(LoanError::MalformedArgs(format!(
                "Invalid currency pair '{}', expected TOKEN/CURRENCY",
                s
            ))),
        }
    }
}

impl TryFrom<String> for CurrencyPair {
    type Error = LoanError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CurrencyPair> for String {
    fn from(pair: CurrencyPair) -> Self {
        pair.to_string()
    }
}

impl fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.token, self.currency)
    }
}

/// Multiset of `(token -> amount)`; zero entries are never stored
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Basket(BTreeMap<TokenId, Amount>);

impl Basket {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn get(&self, token: TokenId) -> Amount {
        self.0.get(&token).copied().unwrap_or(Amount::ZERO)
    }

    pub fn contains(&self, token: TokenId) -> bool {
        self.0.contains_key(&token)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TokenId, Amount)> + '_ {
        self.0.iter().map(|(k, v)| (*k, *v))
    }

    pub fn tokens(&self) -> Vec<TokenId> {
        self.0.keys().copied().collect()
    }

    /// Overwrite an entry; zero removes it
    pub fn set(&mut self, token: TokenId, amount: Amount) {
        if amount.is_zero() {
            self.0.remove(&token);
        } else {
            self.0.insert(token, amount);
        }
    }

    pub fn remove(&mut self, token: TokenId) -> Amount {
        self.0.remove(&token).unwrap_or(Amount::ZERO)
    }

    pub fn add(&mut self, token: TokenId, amount: Amount) -> LoanResult<()> {
        if amount.is_negative() {
            return Err(LoanError::AmountOutOfRange(amount.to_string()));
        }
        let next = self.get(token).checked_add(amount)?;
        self.set(token, next);
        Ok(())
    }

    /// Subtract, failing when the entry would go negative
    pub fn sub(&mut self, token: TokenId, amount: Amount) -> LoanResult<()> {
        if amount.is_negative() {
            return Err(LoanError::AmountOutOfRange(amount.to_string()));
        }
        let current = self.get(token);
        if current < amount {
            return Err(LoanError::Validation(format!(
                "amount {} is less than {}",
                current, amount
            )));
        }
        self.set(token, current.checked_sub(amount)?);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}
