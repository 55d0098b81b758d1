//! Consensus state: every persistent view plus the undo machinery

pub mod accounts;
pub mod attributes;
pub mod burn_info;
pub mod interest;
pub mod prices;
pub mod schemes;
pub mod tokens;
pub mod undo;
pub mod vault;

pub use accounts::Accounts;
pub use attributes::{AttributeKey, AttributeRegistry, AttributeValue, PendingChange, SplitEntry, TokenAttr};
pub use burn_info::BurnInfo;
pub use interest::{InterestRecord, InterestStore};
pub use prices::{FixedIntervalPrice, PriceView, ValidPrice};
pub use schemes::{LoanScheme, SchemeRegistry};
pub use tokens::{NewToken, Token, TokenFlags, TokenRegistry, TokenUpdate};
pub use undo::{Journal, UndoLog, UndoRecord};
pub use vault::{AuctionBatch, Bid, LiquidationData, Vault, VaultStatus, VaultStore};

use vault_common::{Address, Amount, Height, LoanResult, TokenId};

/// Single explicit state threaded through every handler
#[derive(Clone, Debug, Default)]
pub struct ConsensusState {
    pub height: Height,
    pub tokens: TokenRegistry,
    pub schemes: SchemeRegistry,
    pub vaults: VaultStore,
    pub interest: InterestStore,
    pub accounts: Accounts,
    pub attributes: AttributeRegistry,
    pub prices: PriceView,
    pub burn_info: BurnInfo,
    pub journal: Journal,
    pub undo_log: UndoLog,
}

impl ConsensusState {
    /// Genesis state with the native coin registered as token 0
    pub fn genesis(native_symbol: &str) -> LoanResult<Self> {
        let mut state = Self::default();
        state.tokens.create_native(&mut state.journal, native_symbol)?;
        state.journal.take();
        Ok(state)
    }

    pub fn set_height(&mut self, height: Height) {
        if height != self.height {
            self.journal.record(UndoRecord::Height(self.height));
            self.height = height;
        }
    }

    /// Credit newly circulating units to an account
    pub fn issue(&mut self, owner: &Address, token: TokenId, amount: Amount) -> LoanResult<()> {
        self.accounts.credit(&mut self.journal, owner, token, amount)?;
        self.tokens.adjust_circulating(&mut self.journal, token, amount)
    }

    /// Debit units from an account and take them out of circulation
    pub fn retire(&mut self, owner: &Address, token: TokenId, amount: Amount) -> LoanResult<()> {
        self.accounts.debit(&mut self.journal, owner, token, amount)?;
        self.tokens
            .adjust_circulating(&mut self.journal, token, amount.checked_neg()?)
    }

    /// Mutate burn accounting with a journaled snapshot
    pub fn update_burn_info<F>(&mut self, f: F) -> LoanResult<()>
    where
        F: FnOnce(&mut BurnInfo) -> LoanResult<()>,
    {
        let mut next = self.burn_info.clone();
        f(&mut next)?;
        if next != self.burn_info {
            let prev = std::mem::replace(&mut self.burn_info, next);
            self.journal.record(UndoRecord::BurnInfo(Box::new(prev)));
        }
        Ok(())
    }

    fn undo(&mut self, record: UndoRecord) {
        match record {
            UndoRecord::Height(h) => self.height = h,
            UndoRecord::Token(id, token) => self.tokens.restore(id, token),
            UndoRecord::NextTokenId(next) => self.tokens.restore_next_id(next),
            UndoRecord::Scheme(id, scheme) => self.schemes.restore(id, scheme),
            UndoRecord::DefaultScheme(id) => self.schemes.restore_default(id),
            UndoRecord::Vault(id, vault) => self.vaults.restore(id, vault),
            UndoRecord::Interest(vault, token, rec) => self.interest.restore(vault, token, rec),
            UndoRecord::Balance(owner, token, amount) => self.accounts.restore(owner, token, amount),
            UndoRecord::Attribute(key, value) => self.attributes.restore(key, value),
            UndoRecord::PendingAttributes(height, changes) => {
                self.attributes.restore_pending(height, changes)
            }
            UndoRecord::Price(pair, entry) => self.prices.restore(pair, entry),
            UndoRecord::BurnInfo(info) => self.burn_info = *info,
        }
    }

    fn replay_reverse(&mut self, records: Vec<UndoRecord>) {
        for record in records.into_iter().rev() {
            self.undo(record);
        }
        self.vaults.rebuild_index();
    }

    /// Discard the effects of the event in progress
    pub fn revert_pending(&mut self) {
        let records = self.journal.take();
        self.replay_reverse(records);
    }

    /// Keep the effects of the event in progress under `(height, event_index)`
    pub fn commit(&mut self, height: Height, event_index: u32) {
        let records = self.journal.take();
        self.undo_log.insert(height, event_index, records);
    }

    /// Undo every committed event of `height`, last event first
    pub fn disconnect(&mut self, height: Height) -> usize {
        let events = self.undo_log.take_height(height);
        let count = events.len();
        for (_, records) in events {
            self.replay_reverse(records);
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vault_common::{Address, Amount, TokenId};

    #[test]
    fn test_revert_pending_restores_everything() {
        let mut state = ConsensusState::genesis("DFI").unwrap();
        let alice = Address::parse("alice").unwrap();
        state.issue(&alice, TokenId::NATIVE, Amount::ONE).unwrap();
        assert_eq!(state.tokens.get(TokenId::NATIVE).unwrap().circulating, Amount::ONE);
        state.set_height(3);
        state
            .schemes
            .create(&mut state.journal, "A", 150, Amount::ONE)
            .unwrap();
        state.revert_pending();

        assert_eq!(state.height, 0);
        assert!(state.accounts.balance(&alice, TokenId::NATIVE).is_zero());
        assert!(state.tokens.get(TokenId::NATIVE).unwrap().circulating.is_zero());
        assert!(state.schemes.get("A").is_none());
        assert!(state.schemes.default_id().is_none());
    }

    #[test]
    fn test_disconnect_committed_events() {
        let mut state = ConsensusState::genesis("DFI").unwrap();
        let alice = Address::parse("alice").unwrap();
        state.set_height(1);
        state.commit(1, 0);
        state
            .accounts
            .credit(&mut state.journal, &alice, TokenId::NATIVE, Amount::ONE)
            .unwrap();
        state.commit(1, 1);
        state
            .update_burn_info(|b| {
                b.vault_fees = Amount::ONE;
                Ok(())
            })
            .unwrap();
        state.commit(1, 2);

        assert_eq!(state.disconnect(1), 3);
        assert_eq!(state.height, 0);
        assert!(state.burn_info.vault_fees.is_zero());
        assert!(state.accounts.balance(&alice, TokenId::NATIVE).is_zero());
    }
}
