//! Stored interest checkpoints keyed on (vault, loan token)

use std::collections::BTreeMap;

use vault_common::{Height, HighPrecision, TokenId, VaultId};

use super::undo::{Journal, UndoRecord};

/// Lazy accrual checkpoint
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InterestRecord {
    /// Interest per block
    pub ipb: HighPrecision,
    /// Interest to height, not yet folded into the loan
    pub ith: HighPrecision,
    /// Height of the last reconciliation
    pub height: Height,
}

#[derive(Clone, Debug, Default)]
pub struct InterestStore {
    records: BTreeMap<(VaultId, TokenId), InterestRecord>,
}

impl InterestStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, vault: &VaultId, token: TokenId) -> Option<&InterestRecord> {
        self.records.get(&(vault.clone(), token))
    }

    pub fn set(&mut self, journal: &mut Journal, vault: &VaultId, token: TokenId, record: InterestRecord) {
        let key = (vault.clone(), token);
        let prev = self.records.insert(key, record);
        if prev != Some(record) {
            journal.record(UndoRecord::Interest(vault.clone(), token, prev));
        }
    }

    pub fn erase(&mut self, journal: &mut Journal, vault: &VaultId, token: TokenId) {
        if let Some(prev) = self.records.remove(&(vault.clone(), token)) {
            journal.record(UndoRecord::Interest(vault.clone(), token, Some(prev)));
        }
    }

    /// All records of one vault, ordered by token id
    pub fn for_vault(&self, vault: &VaultId) -> Vec<(TokenId, InterestRecord)> {
        self.records
            .iter()
            .filter(|((v, _), _)| v == vault)
            .map(|((_, t), r)| (*t, *r))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&VaultId, TokenId, &InterestRecord)> {
        self.records.iter().map(|((v, t), r)| (v, *t, r))
    }

    pub(crate) fn restore(&mut self, vault: VaultId, token: TokenId, record: Option<InterestRecord>) {
        match record {
            Some(r) => {
                self.records.insert((vault, token), r);
            }
            None => {
                self.records.remove(&(vault, token));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_erase_journal() {
        let mut store = InterestStore::new();
        let mut j = Journal::default();
        let vault = VaultId::parse(&"aa".repeat(32)).unwrap();
        let rec = InterestRecord {
            ipb: HighPrecision::from_raw(5),
            ith: HighPrecision::ZERO,
            height: 3,
        };
        store.set(&mut j, &vault, TokenId(1), rec);
        store.set(&mut j, &vault, TokenId(1), rec);
        assert_eq!(j.len(), 1);
        assert_eq!(store.for_vault(&vault).len(), 1);

        store.erase(&mut j, &vault, TokenId(1));
        store.erase(&mut j, &vault, TokenId(1));
        assert_eq!(j.len(), 2);
        assert!(store.get(&vault, TokenId(1)).is_none());
    }
}
