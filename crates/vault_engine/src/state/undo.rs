//! Undo journal for block rollback
//!
//! Every mutator writes the prior value of the key it touches into the
//! pending journal. A successful event moves its journal into the undo log
//! under `(height, event_index)`; a failed event replays its own journal in
//! reverse; disconnecting a block replays every entry of that height in
//! reverse event order.

use std::collections::BTreeMap;

use vault_common::{Address, Amount, CurrencyPair, Height, TokenId, VaultId};

use super::attributes::{AttributeKey, AttributeValue, PendingChange};
use super::burn_info::BurnInfo;
use super::interest::InterestRecord;
use super::prices::FixedIntervalPrice;
use super::schemes::LoanScheme;
use super::tokens::Token;
use super::vault::Vault;

/// Prior value of one key in one consensus view
#[derive(Clone, Debug, PartialEq)]
pub enum UndoRecord {
    Height(Height),
    Token(TokenId, Option<Token>),
    NextTokenId(u32),
    Scheme(String, Option<LoanScheme>),
    DefaultScheme(Option<String>),
    Vault(VaultId, Option<Vault>),
    Interest(VaultId, TokenId, Option<InterestRecord>),
    Balance(Address, TokenId, Amount),
    Attribute(AttributeKey, Option<AttributeValue>),
    PendingAttributes(Height, Option<Vec<PendingChange>>),
    Price(CurrencyPair, Option<FixedIntervalPrice>),
    BurnInfo(Box<BurnInfo>),
}

/// Undo records of the event currently being applied
#[derive(Clone, Debug, Default)]
pub struct Journal {
    pending: Vec<UndoRecord>,
}

impl Journal {
    pub fn record(&mut self, record: UndoRecord) {
        self.pending.push(record);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drain everything recorded so far
    pub fn take(&mut self) -> Vec<UndoRecord> {
        std::mem::take(&mut self.pending)
    }
}

/// Committed undo records keyed on `(height, event_index)`
#[derive(Clone, Debug, Default)]
pub struct UndoLog {
    entries: BTreeMap<(Height, u32), Vec<UndoRecord>>,
}

impl UndoLog {
    pub fn insert(&mut self, height: Height, event_index: u32, records: Vec<UndoRecord>) {
        if records.is_empty() {
            return;
        }
        self.entries
            .entry((height, event_index))
            .or_default()
            .extend(records);
    }

    /// Remove all entries for `height`, highest event index first
    pub fn take_height(&mut self, height: Height) -> Vec<(u32, Vec<UndoRecord>)> {
        let keys: Vec<(Height, u32)> = self
            .entries
            .range((height, 0)..=(height, u32::MAX))
            .map(|(k, _)| *k)
            .collect();
        let mut out = Vec::with_capacity(keys.len());
        for key in keys.into_iter().rev() {
            if let Some(records) = self.entries.remove(&key) {
                out.push((key.1, records));
            }
        }
        out
    }

    /// Forget undo data older than `height` (finalized blocks)
    pub fn prune_below(&mut self, height: Height) {
        self.entries = self.entries.split_off(&(height, 0));
    }

    pub fn heights(&self) -> Vec<Height> {
        let mut heights: Vec<Height> = self.entries.keys().map(|(h, _)| *h).collect();
        heights.dedup();
        heights
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_height_reverse_order() {
        let mut log = UndoLog::default();
        log.insert(5, 0, vec![UndoRecord::Height(4)]);
        log.insert(5, 2, vec![UndoRecord::NextTokenId(3)]);
        log.insert(6, 0, vec![UndoRecord::Height(5)]);

        let taken = log.take_height(5);
        assert_eq!(taken.len(), 2);
        assert_eq!(taken[0].0, 2);
        assert_eq!(taken[1].0, 0);
        assert_eq!(log.heights(), vec![6]);
    }

    #[test]
    fn test_empty_records_not_stored() {
        let mut log = UndoLog::default();
        log.insert(1, 0, Vec::new());
        assert!(log.is_empty());
    }

    #[test]
    fn test_prune_below() {
        let mut log = UndoLog::default();
        log.insert(1, 0, vec![UndoRecord::Height(0)]);
        log.insert(2, 0, vec![UndoRecord::Height(1)]);
        log.prune_below(2);
        assert_eq!(log.heights(), vec![2]);
    }
}
