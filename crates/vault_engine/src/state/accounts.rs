//! Account balances on the native ledger

use std::collections::BTreeMap;

use vault_common::{Address, Amount, Basket, LoanError, LoanResult, TokenId};

use super::undo::{Journal, UndoRecord};

#[derive(Clone, Debug, Default)]
pub struct Accounts {
    balances: BTreeMap<(Address, TokenId), Amount>,
}

impl Accounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance(&self, owner: &Address, token: TokenId) -> Amount {
        self.balances
            .get(&(owner.clone(), token))
            .copied()
            .unwrap_or(Amount::ZERO)
    }

    pub fn balances_of(&self, owner: &Address) -> Basket {
        let mut basket = Basket::new();
        for ((addr, token), amount) in &self.balances {
            if addr == owner {
                basket.set(*token, *amount);
            }
        }
        basket
    }

    /// Holders of `token` with their balances
    pub fn holders(&self, token: TokenId) -> Vec<(Address, Amount)> {
        self.balances
            .iter()
            .filter(|((_, t), _)| *t == token)
            .map(|((a, _), v)| (a.clone(), *v))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Address, TokenId, Amount)> {
        self.balances.iter().map(|((a, t), v)| (a, *t, *v))
    }

    fn write(&mut self, journal: &mut Journal, owner: &Address, token: TokenId, amount: Amount) {
        let prev = self.balance(owner, token);
        if prev == amount {
            return;
        }
        journal.record(UndoRecord::Balance(owner.clone(), token, prev));
        self.restore(owner.clone(), token, amount);
    }

    pub fn credit(&mut self, journal: &mut Journal, owner: &Address, token: TokenId, amount: Amount) -> LoanResult<()> {
        if amount.is_negative() {
            return Err(LoanError::AmountOutOfRange(amount.to_string()));
        }
        let next = self.balance(owner, token).checked_add(amount)?;
        self.write(journal, owner, token, next);
        Ok(())
    }

    pub fn debit(&mut self, journal: &mut Journal, owner: &Address, token: TokenId, amount: Amount) -> LoanResult<()> {
        if amount.is_negative() {
            return Err(LoanError::AmountOutOfRange(amount.to_string()));
        }
        let current = self.balance(owner, token);
        if current < amount {
            return Err(LoanError::Validation(format!(
                "amount {} is less than {} for token {} of {}",
                current, amount, token, owner
            )));
        }
        self.write(journal, owner, token, current.checked_sub(amount)?);
        Ok(())
    }

    pub(crate) fn restore(&mut self, owner: Address, token: TokenId, amount: Amount) {
        if amount.is_zero() {
            self.balances.remove(&(owner, token));
        } else {
            self.balances.insert((owner, token), amount);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credit_debit() {
        let mut acc = Accounts::new();
        let mut j = Journal::default();
        let alice = Address::parse("alice").unwrap();
        acc.credit(&mut j, &alice, TokenId(0), Amount::from_raw(100)).unwrap();
        assert!(acc.debit(&mut j, &alice, TokenId(0), Amount::from_raw(101)).is_err());
        acc.debit(&mut j, &alice, TokenId(0), Amount::from_raw(100)).unwrap();
        assert!(acc.balances_of(&alice).is_empty());
        assert_eq!(j.len(), 2);
    }
}
