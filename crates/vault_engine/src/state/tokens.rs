//! Token registry: identity, classification, interest and minted supply

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use vault_common::{
    Address, Amount, CurrencyPair, Height, LoanError, LoanResult, TokenId, TokenRef,
};

use super::undo::{Journal, UndoRecord};

/// Max symbol length for DAT tokens
pub const MAX_SYMBOL_LEN: usize = 8;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenFlags {
    pub is_dat: bool,
    pub is_loan_token: bool,
    pub is_collateral_token: bool,
    pub mintable: bool,
    pub tradeable: bool,
    pub finalized: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub id: TokenId,
    pub symbol: String,
    pub name: String,
    pub flags: TokenFlags,
    /// Holder allowed to mint, if any
    pub owner: Option<Address>,
    /// Loan principal outstanding plus free float
    pub minted: Amount,
    /// Part of `minted` that is not owed by any vault
    pub free_float: Amount,
    /// Units held in accounts, vault collateral and auction escrow
    pub circulating: Amount,
    pub fixed_interval_price_id: Option<CurrencyPair>,
    /// Collateral value multiplier in [0, 1]
    pub collateral_factor: Amount,
    /// Annual interest in percent, may be negative
    pub interest: Amount,
    /// Set once retired by a split
    pub descendant: Option<(TokenId, Height)>,
    pub creation_height: Height,
}

impl Token {
    pub fn is_retired(&self) -> bool {
        self.descendant.is_some()
    }

    /// `SYMBOL` for DATs, `SYMBOL#id` otherwise
    pub fn display_symbol(&self) -> String {
        if self.flags.is_dat {
            self.symbol.clone()
        } else {
            format!("{}#{}", self.symbol, self.id)
        }
    }
}

/// Parameters for a new token
#[derive(Clone, Debug, Default)]
pub struct NewToken {
    pub symbol: String,
    pub name: String,
    pub flags: TokenFlags,
    pub owner: Option<Address>,
    pub fixed_interval_price_id: Option<CurrencyPair>,
    pub interest: Amount,
}

/// Pre-finalization update
#[derive(Clone, Debug, Default)]
pub struct TokenUpdate {
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub mintable: Option<bool>,
    pub tradeable: Option<bool>,
    pub finalize: bool,
}

#[derive(Clone, Debug, Default)]
pub struct TokenRegistry {
    tokens: BTreeMap<TokenId, Token>,
    next_id: u32,
}

fn validate_symbol(symbol: &str) -> LoanResult<()> {
    let valid = !symbol.is_empty()
        && symbol.len() <= MAX_SYMBOL_LEN
        && symbol.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'.');
    if !valid {
        return Err(LoanError::MalformedArgs(format!(
            "token symbol '{}' should be non-empty, alphanumeric and at most {} chars",
            symbol, MAX_SYMBOL_LEN
        )));
    }
    Ok(())
}

impl TokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: TokenId) -> Option<&Token> {
        self.tokens.get(&id)
    }

    /// Active (non-retired) token by symbol
    pub fn get_by_symbol(&self, symbol: &str) -> Option<&Token> {
        self.tokens
            .values()
            .find(|t| t.symbol == symbol && !t.is_retired())
    }

    pub fn resolve(&self, token: &TokenRef) -> LoanResult<&Token> {
        let found = match token {
            TokenRef::Id(id) => self.get(TokenId(*id)),
            TokenRef::Symbol(symbol) => self.get_by_symbol(symbol),
            TokenRef::SymbolWithId(symbol, id) => {
                self.get(TokenId(*id)).filter(|t| &t.symbol == symbol)
            }
        };
        found.ok_or_else(|| LoanError::UnknownToken(token.to_string()))
    }

    pub fn require(&self, id: TokenId) -> LoanResult<&Token> {
        self.get(id)
            .ok_or_else(|| LoanError::UnknownToken(id.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Token> {
        self.tokens.values()
    }

    pub fn next_id(&self) -> u32 {
        self.next_id
    }

    pub fn create(
        &mut self,
        journal: &mut Journal,
        token: NewToken,
        height: Height,
    ) -> LoanResult<TokenId> {
        validate_symbol(&token.symbol)?;
        if token.flags.is_dat && self.get_by_symbol(&token.symbol).is_some() {
            return Err(LoanError::Validation(format!(
                "token '{}' already exists!",
                token.symbol
            )));
        }
        let id = TokenId(self.next_id);
        journal.record(UndoRecord::NextTokenId(self.next_id));
        self.next_id = self
            .next_id
            .checked_add(1)
            .ok_or(LoanError::Overflow)?;

        let token = Token {
            id,
            symbol: token.symbol,
            name: token.name,
            flags: token.flags,
            owner: token.owner,
            minted: Amount::ZERO,
            free_float: Amount::ZERO,
            circulating: Amount::ZERO,
            fixed_interval_price_id: token.fixed_interval_price_id,
            collateral_factor: Amount::ONE,
            interest: token.interest,
            descendant: None,
            creation_height: height,
        };
        journal.record(UndoRecord::Token(id, None));
        self.tokens.insert(id, token);
        Ok(id)
    }

    /// Apply `f` to a copy of the token and journal the prior value if it changed
    pub fn modify<F>(&mut self, journal: &mut Journal, id: TokenId, f: F) -> LoanResult<()>
    where
        F: FnOnce(&mut Token) -> LoanResult<()>,
    {
        let current = self.require(id)?.clone();
        let mut next = current.clone();
        f(&mut next)?;
        if next != current {
            journal.record(UndoRecord::Token(id, Some(current)));
            self.tokens.insert(id, next);
        }
        Ok(())
    }

    pub fn update(&mut self, journal: &mut Journal, id: TokenId, update: TokenUpdate) -> LoanResult<()> {
        if let Some(symbol) = &update.symbol {
            validate_symbol(symbol)?;
            if let Some(other) = self.get_by_symbol(symbol) {
                if other.id != id {
                    return Err(LoanError::Validation(format!(
                        "token with symbol '{}' already exists",
                        symbol
                    )));
                }
            }
        }
        self.modify(journal, id, |token| {
            if token.flags.finalized {
                return Err(LoanError::Validation(format!(
                    "token {} is finalized",
                    token.symbol
                )));
            }
            if let Some(symbol) = update.symbol {
                token.symbol = symbol;
            }
            if let Some(name) = update.name {
                token.name = name;
            }
            if let Some(mintable) = update.mintable {
                token.flags.mintable = mintable;
            }
            if let Some(tradeable) = update.tradeable {
                token.flags.tradeable = tradeable;
            }
            if update.finalize {
                token.flags.finalized = true;
            }
            Ok(())
        })
    }

    /// Direct mint by the token owner (free float)
    pub fn mint(&mut self, journal: &mut Journal, id: TokenId, amount: Amount) -> LoanResult<()> {
        if !amount.is_positive() {
            return Err(LoanError::AmountOutOfRange(amount.to_string()));
        }
        self.modify(journal, id, |token| {
            if !token.flags.mintable {
                return Err(LoanError::Validation(format!(
                    "token {} is not mintable",
                    token.symbol
                )));
            }
            token.minted = token.minted.checked_add(amount)?;
            token.free_float = token.free_float.checked_add(amount)?;
            Ok(())
        })
    }

    /// Direct burn of free float
    pub fn burn(&mut self, journal: &mut Journal, id: TokenId, amount: Amount) -> LoanResult<()> {
        if !amount.is_positive() {
            return Err(LoanError::AmountOutOfRange(amount.to_string()));
        }
        self.modify(journal, id, |token| {
            if token.free_float < amount {
                return Err(LoanError::Validation(format!(
                    "cannot burn {} {}: only {} in free float",
                    amount, token.symbol, token.free_float
                )));
            }
            token.minted = token.minted.checked_sub(amount)?;
            token.free_float = token.free_float.checked_sub(amount)?;
            Ok(())
        })
    }

    /// Move minted supply and free float by signed deltas
    pub fn adjust_supply(
        &mut self,
        journal: &mut Journal,
        id: TokenId,
        minted: Amount,
        free_float: Amount,
    ) -> LoanResult<()> {
        if minted.is_zero() && free_float.is_zero() {
            return Ok(());
        }
        self.modify(journal, id, |token| {
            let next_minted = token.minted.checked_add(minted)?;
            let next_float = token.free_float.checked_add(free_float)?;
            if next_minted.is_negative() || next_float.is_negative() {
                return Err(LoanError::InvariantBreach(format!(
                    "supply of {} would become negative",
                    token.symbol
                )));
            }
            token.minted = next_minted;
            token.free_float = next_float;
            Ok(())
        })
    }

    pub fn adjust_circulating(
        &mut self,
        journal: &mut Journal,
        id: TokenId,
        delta: Amount,
    ) -> LoanResult<()> {
        if delta.is_zero() {
            return Ok(());
        }
        self.modify(journal, id, |token| {
            let next = token.circulating.checked_add(delta)?;
            if next.is_negative() {
                return Err(LoanError::InvariantBreach(format!(
                    "circulating {} would become negative",
                    token.symbol
                )));
            }
            token.circulating = next;
            Ok(())
        })
    }

    pub fn set_interest(&mut self, journal: &mut Journal, id: TokenId, rate: Amount) -> LoanResult<()> {
        self.modify(journal, id, |token| {
            token.interest = rate;
            Ok(())
        })
    }

    /// Retire `id` in favour of `descendant`
    pub fn split_retire(
        &mut self,
        journal: &mut Journal,
        id: TokenId,
        descendant: TokenId,
        height: Height,
    ) -> LoanResult<()> {
        let base = self.require(id)?.symbol.clone();
        let generation = self
            .tokens
            .values()
            .filter(|t| t.is_retired() && t.symbol.split('/').next() == Some(base.as_str()))
            .count()
            + 1;
        self.modify(journal, id, |token| {
            if token.is_retired() {
                return Err(LoanError::Validation(format!(
                    "token {} was already split",
                    token.symbol
                )));
            }
            token.flags.finalized = true;
            token.flags.mintable = false;
            token.flags.is_loan_token = false;
            token.flags.is_collateral_token = false;
            token.descendant = Some((descendant, height));
            token.symbol = format!("{}/v{}", token.symbol, generation);
            Ok(())
        })
    }

    /// Bootstrap the native coin as token 0
    pub fn create_native(&mut self, journal: &mut Journal, symbol: &str) -> LoanResult<TokenId> {
        self.create(
            journal,
            NewToken {
                symbol: symbol.to_string(),
                name: "Default Defi token".to_string(),
                flags: TokenFlags {
                    is_dat: true,
                    tradeable: true,
                    finalized: true,
                    ..TokenFlags::default()
                },
                owner: None,
                fixed_interval_price_id: None,
                interest: Amount::ZERO,
            },
            0,
        )
    }

    pub(crate) fn restore(&mut self, id: TokenId, token: Option<Token>) {
        match token {
            Some(t) => {
                self.tokens.insert(id, t);
            }
            None => {
                self.tokens.remove(&id);
            }
        }
    }

    pub(crate) fn restore_next_id(&mut self, next_id: u32) {
        self.next_id = next_id;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loan_token(symbol: &str) -> NewToken {
        NewToken {
            symbol: symbol.to_string(),
            name: symbol.to_string(),
            flags: TokenFlags {
                is_dat: true,
                is_loan_token: true,
                mintable: true,
                tradeable: true,
                ..TokenFlags::default()
            },
            owner: None,
            fixed_interval_price_id: Some(CurrencyPair::new(symbol, "USD")),
            interest: Amount::ZERO,
        }
    }

    #[test]
    fn test_ids_are_monotonic() {
        let mut reg = TokenRegistry::new();
        let mut j = Journal::default();
        let dfi = reg.create_native(&mut j, "DFI").unwrap();
        let tsla = reg.create(&mut j, loan_token("TSLA"), 1).unwrap();
        assert_eq!(dfi, TokenId(0));
        assert_eq!(tsla, TokenId(1));
        assert!(reg.create(&mut j, loan_token("TSLA"), 1).is_err());
    }

    #[test]
    fn test_resolve_forms() {
        let mut reg = TokenRegistry::new();
        let mut j = Journal::default();
        reg.create_native(&mut j, "DFI").unwrap();
        let id = reg.create(&mut j, loan_token("DUSD"), 1).unwrap();
        assert_eq!(reg.resolve(&TokenRef::Id(1)).unwrap().id, id);
        assert_eq!(reg.resolve(&"DUSD".parse().unwrap()).unwrap().id, id);
        assert_eq!(reg.resolve(&"DUSD#1".parse().unwrap()).unwrap().id, id);
        assert!(reg.resolve(&"DUSD#0".parse().unwrap()).is_err());
    }

    #[test]
    fn test_finalized_token_rejects_update() {
        let mut reg = TokenRegistry::new();
        let mut j = Journal::default();
        let id = reg.create(&mut j, loan_token("GOOGL"), 1).unwrap();
        reg.update(&mut j, id, TokenUpdate { finalize: true, ..Default::default() })
            .unwrap();
        let err = reg
            .update(&mut j, id, TokenUpdate { name: Some("x".into()), ..Default::default() })
            .unwrap_err();
        assert!(matches!(err, LoanError::Validation(_)));
    }

    #[test]
    fn test_mint_burn_free_float() {
        let mut reg = TokenRegistry::new();
        let mut j = Journal::default();
        let id = reg.create(&mut j, loan_token("TSLA"), 1).unwrap();
        reg.mint(&mut j, id, Amount::from_raw(500)).unwrap();
        reg.adjust_supply(&mut j, id, Amount::from_raw(100), Amount::ZERO).unwrap();
        assert_eq!(reg.get(id).unwrap().minted.raw(), 600);
        assert!(reg.burn(&mut j, id, Amount::from_raw(501)).is_err());
        reg.burn(&mut j, id, Amount::from_raw(500)).unwrap();
        assert_eq!(reg.get(id).unwrap().minted.raw(), 100);
        assert_eq!(reg.get(id).unwrap().free_float, Amount::ZERO);
        assert!(reg
            .adjust_supply(&mut j, id, Amount::from_raw(-101), Amount::ZERO)
            .is_err());
        assert!(reg
            .adjust_supply(&mut j, id, Amount::ZERO, Amount::from_raw(-1))
            .is_err());
        assert!(reg.adjust_circulating(&mut j, id, Amount::from_raw(-1)).is_err());
    }

    #[test]
    fn test_split_retire() {
        let mut reg = TokenRegistry::new();
        let mut j = Journal::default();
        let old = reg.create(&mut j, loan_token("TSLA"), 1).unwrap();
        reg.split_retire(&mut j, old, TokenId(9), 50).unwrap();
        let retired = reg.get(old).unwrap();
        assert!(retired.flags.finalized);
        assert!(!retired.flags.mintable);
        assert_eq!(retired.descendant, Some((TokenId(9), 50)));
        assert_eq!(retired.symbol, "TSLA/v1");
        assert!(reg.get_by_symbol("TSLA").is_none());
    }
}
