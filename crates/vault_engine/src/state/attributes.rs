//! Typed governance registry
//!
//! Every `v0/...` key the engine consumes is an enumerated variant with a
//! value schema. Changes are either effective now or queued for a height;
//! the queue collapses into the effective map at block start.

use core::fmt;
use core::str::FromStr;
use std::collections::BTreeMap;

use vault_common::{Amount, CurrencyPair, Height, LoanError, LoanResult, TokenId};

use super::undo::{Journal, UndoRecord};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TokenAttr {
    LoanMintingEnabled,
    LoanMintingInterest,
    LoanCollateralEnabled,
    LoanCollateralFactor,
    FixedIntervalPriceId,
    LoanPaybackCollateral,
    /// Loan may be paid back with the given token
    LoanPayback(TokenId),
    /// Fee charged when paying back with the given token
    LoanPaybackFeePct(TokenId),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AttributeKey {
    Token(TokenId, TokenAttr),
    LiquidationPenalty,
    TokenLock(TokenId),
    OracleSplits(Height),
}

/// Token split instruction: positive multiplies, negative divides
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SplitEntry {
    pub token: TokenId,
    pub multiplier: i32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttributeValue {
    Bool(bool),
    Decimal(Amount),
    Pair(CurrencyPair),
    Splits(Vec<SplitEntry>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingChange {
    pub key: AttributeKey,
    pub value: AttributeValue,
}

fn malformed(key: &str, reason: &str) -> LoanError {
    LoanError::MalformedArgs(format!("Invalid attribute key {}: {}", key, reason))
}

fn parse_token_id(key: &str, s: &str) -> LoanResult<TokenId> {
    s.parse::<u32>()
        .map(TokenId)
        .map_err(|_| malformed(key, "token id must be numeric"))
}

impl FromStr for AttributeKey {
    type Err = LoanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('/').collect();
        match parts.as_slice() {
            ["v0", "token", id, attr] => {
                let id = parse_token_id(s, id)?;
                let attr = match *attr {
                    "loan_minting_enabled" => TokenAttr::LoanMintingEnabled,
                    "loan_minting_interest" => TokenAttr::LoanMintingInterest,
                    "loan_collateral_enabled" => TokenAttr::LoanCollateralEnabled,
                    "loan_collateral_factor" => TokenAttr::LoanCollateralFactor,
                    "fixed_interval_price_id" => TokenAttr::FixedIntervalPriceId,
                    "loan_payback_collateral" => TokenAttr::LoanPaybackCollateral,
                    _ => return Err(malformed(s, "unsupported token attribute")),
                };
                Ok(AttributeKey::Token(id, attr))
            }
            ["v0", "token", id, attr, other] => {
                let id = parse_token_id(s, id)?;
                let other = parse_token_id(s, other)?;
                let attr = match *attr {
                    "loan_payback" => TokenAttr::LoanPayback(other),
                    "loan_payback_fee_pct" => TokenAttr::LoanPaybackFeePct(other),
                    _ => return Err(malformed(s, "unsupported token attribute")),
                };
                Ok(AttributeKey::Token(id, attr))
            }
            ["v0", "params", "loan", "liquidation_penalty"] => Ok(AttributeKey::LiquidationPenalty),
            ["v0", "locks", "token", id] => Ok(AttributeKey::TokenLock(parse_token_id(s, id)?)),
            ["v0", "oracles", "splits", height] => height
                .parse::<Height>()
                .map(AttributeKey::OracleSplits)
                .map_err(|_| malformed(s, "split height must be numeric")),
            _ => Err(malformed(s, "unknown key")),
        }
    }
}

impl fmt::Display for TokenAttr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenAttr::LoanMintingEnabled => f.write_str("loan_minting_enabled"),
            TokenAttr::LoanMintingInterest => f.write_str("loan_minting_interest"),
            TokenAttr::LoanCollateralEnabled => f.write_str("loan_collateral_enabled"),
            TokenAttr::LoanCollateralFactor => f.write_str("loan_collateral_factor"),
            TokenAttr::FixedIntervalPriceId => f.write_str("fixed_interval_price_id"),
            TokenAttr::LoanPaybackCollateral => f.write_str("loan_payback_collateral"),
            TokenAttr::LoanPayback(other) => write!(f, "loan_payback/{}", other),
            TokenAttr::LoanPaybackFeePct(other) => write!(f, "loan_payback_fee_pct/{}", other),
        }
    }
}

impl fmt::Display for AttributeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeKey::Token(id, attr) => write!(f, "v0/token/{}/{}", id, attr),
            AttributeKey::LiquidationPenalty => f.write_str("v0/params/loan/liquidation_penalty"),
            AttributeKey::TokenLock(id) => write!(f, "v0/locks/token/{}", id),
            AttributeKey::OracleSplits(height) => write!(f, "v0/oracles/splits/{}", height),
        }
    }
}

/// Render a decimal without trailing zeros, "0.05000000" -> "0.05"
pub fn trim_decimal(value: Amount) -> String {
    let text = value.to_string();
    if !text.contains('.') {
        return text;
    }
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Bool(b) => write!(f, "{}", b),
            AttributeValue::Decimal(d) => f.write_str(&trim_decimal(*d)),
            AttributeValue::Pair(p) => write!(f, "{}", p),
            AttributeValue::Splits(entries) => {
                let rendered: Vec<String> = entries
                    .iter()
                    .map(|e| format!("{}/{}", e.token, e.multiplier))
                    .collect();
                f.write_str(&rendered.join(","))
            }
        }
    }
}

fn parse_bool(key: &AttributeKey, raw: &str) -> LoanResult<AttributeValue> {
    match raw {
        "true" => Ok(AttributeValue::Bool(true)),
        "false" => Ok(AttributeValue::Bool(false)),
        _ => Err(LoanError::MalformedArgs(format!(
            "Boolean value must be either \"true\" or \"false\" for {}",
            key
        ))),
    }
}

fn parse_decimal(raw: &str) -> LoanResult<Amount> {
    raw.parse::<Amount>().map_err(LoanError::from)
}

fn parse_fraction(key: &AttributeKey, raw: &str) -> LoanResult<AttributeValue> {
    let value = parse_decimal(raw)?;
    if value.is_negative() || value > Amount::ONE {
        return Err(LoanError::AmountOutOfRange(format!(
            "{} must be between 0 and 1",
            key
        )));
    }
    Ok(AttributeValue::Decimal(value))
}

fn parse_splits(raw: &str) -> LoanResult<AttributeValue> {
    let mut entries = Vec::new();
    for item in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (token, multiplier) = item.split_once('/').ok_or_else(|| {
            LoanError::MalformedArgs(format!("Split entry '{}' must be <token id>/<multiplier>", item))
        })?;
        let token = token
            .parse::<u32>()
            .map(TokenId)
            .map_err(|_| LoanError::MalformedArgs(format!("Invalid split token id '{}'", token)))?;
        let multiplier = multiplier
            .parse::<i32>()
            .map_err(|_| LoanError::MalformedArgs(format!("Invalid split multiplier '{}'", multiplier)))?;
        if matches!(multiplier, -1..=1) {
            return Err(LoanError::Validation(format!(
                "Split multiplier for token {} must not be -1, 0 or 1",
                token
            )));
        }
        entries.push(SplitEntry { token, multiplier });
    }
    if entries.is_empty() {
        return Err(LoanError::MalformedArgs("No split entries".to_string()));
    }
    Ok(AttributeValue::Splits(entries))
}

impl AttributeKey {
    /// Parse the textual value according to this key's schema
    pub fn parse_value(&self, raw: &str) -> LoanResult<AttributeValue> {
        let raw = raw.trim();
        match self {
            AttributeKey::Token(_, attr) => match attr {
                TokenAttr::LoanMintingEnabled
                | TokenAttr::LoanCollateralEnabled
                | TokenAttr::LoanPaybackCollateral
                | TokenAttr::LoanPayback(_) => parse_bool(self, raw),
                TokenAttr::LoanMintingInterest => Ok(AttributeValue::Decimal(parse_decimal(raw)?)),
                TokenAttr::LoanCollateralFactor | TokenAttr::LoanPaybackFeePct(_) => {
                    parse_fraction(self, raw)
                }
                TokenAttr::FixedIntervalPriceId => Ok(AttributeValue::Pair(raw.parse()?)),
            },
            AttributeKey::LiquidationPenalty => parse_fraction(self, raw),
            AttributeKey::TokenLock(_) => parse_bool(self, raw),
            AttributeKey::OracleSplits(_) => parse_splits(raw),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct AttributeRegistry {
    values: BTreeMap<AttributeKey, AttributeValue>,
    pending: BTreeMap<Height, Vec<PendingChange>>,
}

impl AttributeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &AttributeKey) -> Option<&AttributeValue> {
        self.values.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AttributeKey, &AttributeValue)> {
        self.values.iter()
    }

    pub fn pending(&self) -> impl Iterator<Item = (&Height, &Vec<PendingChange>)> {
        self.pending.iter()
    }

    pub fn set(&mut self, journal: &mut Journal, key: AttributeKey, value: AttributeValue) {
        let prev = self.values.insert(key, value.clone());
        if prev.as_ref() != Some(&value) {
            journal.record(UndoRecord::Attribute(key, prev));
        }
    }

    /// Queue changes for `height`
    pub fn schedule(&mut self, journal: &mut Journal, height: Height, changes: Vec<PendingChange>) {
        if changes.is_empty() {
            return;
        }
        let prev = self.pending.get(&height).cloned();
        journal.record(UndoRecord::PendingAttributes(height, prev));
        self.pending.entry(height).or_default().extend(changes);
    }

    /// Remove and return the changes queued at or before `height`
    pub fn take_due(&mut self, journal: &mut Journal, height: Height) -> Vec<PendingChange> {
        let due: Vec<Height> = self.pending.range(..=height).map(|(h, _)| *h).collect();
        let mut out = Vec::new();
        for h in due {
            if let Some(changes) = self.pending.remove(&h) {
                journal.record(UndoRecord::PendingAttributes(h, Some(changes.clone())));
                out.extend(changes);
            }
        }
        out
    }

    fn bool_value(&self, key: &AttributeKey) -> bool {
        matches!(self.values.get(key), Some(AttributeValue::Bool(true)))
    }

    fn decimal_value(&self, key: &AttributeKey) -> Option<Amount> {
        match self.values.get(key) {
            Some(AttributeValue::Decimal(d)) => Some(*d),
            _ => None,
        }
    }

    pub fn is_locked(&self, token: TokenId) -> bool {
        self.bool_value(&AttributeKey::TokenLock(token))
    }

    pub fn liquidation_penalty(&self, default: Amount) -> Amount {
        self.decimal_value(&AttributeKey::LiquidationPenalty)
            .unwrap_or(default)
    }

    pub fn payback_collateral_enabled(&self, token: TokenId) -> bool {
        self.bool_value(&AttributeKey::Token(token, TokenAttr::LoanPaybackCollateral))
    }

    /// Whether `loan` may be paid back with `with`
    pub fn payback_allowed(&self, loan: TokenId, with: TokenId) -> bool {
        self.bool_value(&AttributeKey::Token(loan, TokenAttr::LoanPayback(with)))
    }

    pub fn payback_fee_pct(&self, loan: TokenId, with: TokenId) -> Amount {
        self.decimal_value(&AttributeKey::Token(loan, TokenAttr::LoanPaybackFeePct(with)))
            .unwrap_or(Amount::ZERO)
    }

    pub(crate) fn restore(&mut self, key: AttributeKey, value: Option<AttributeValue>) {
        match value {
            Some(v) => {
                self.values.insert(key, v);
            }
            None => {
                self.values.remove(&key);
            }
        }
    }

    pub(crate) fn restore_pending(&mut self, height: Height, changes: Option<Vec<PendingChange>>) {
        match changes {
            Some(c) => {
                self.pending.insert(height, c);
            }
            None => {
                self.pending.remove(&height);
            }
        }
    }
}
