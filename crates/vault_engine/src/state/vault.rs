//! Vault store and the scheme -> vaults index

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use vault_common::{Address, Amount, Basket, Height, LoanError, LoanResult, TokenId, VaultId};

use super::undo::{Journal, UndoRecord};

/// Persisted lifecycle state; `frozen` is derived from prices and locks
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VaultStatus {
    Active,
    MayLiquidate,
    InLiquidation,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bid {
    pub owner: Address,
    pub token: TokenId,
    pub amount: Amount,
    pub height: Height,
}

/// One auctioned slice of a liquidated vault
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuctionBatch {
    pub index: u32,
    pub collaterals: Basket,
    pub loan_token: TokenId,
    /// Principal plus interest covered by this batch
    pub loan_amount: Amount,
    /// Interest part of `loan_amount`
    pub loan_interest: Amount,
    pub start_bid: Amount,
    pub best_bid: Option<Bid>,
    pub end_height: Height,
    pub relisted: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LiquidationData {
    pub penalty: Amount,
    pub batches: Vec<AuctionBatch>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Vault {
    pub id: VaultId,
    pub owner: Address,
    pub scheme_id: String,
    pub collateral: Basket,
    pub loans: Basket,
    pub status: VaultStatus,
    /// Height the vault gets liquidated at unless its ratio recovers
    pub liquidation_height: Option<Height>,
    /// Next prices captured when the vault crossed its ratio
    pub captured_prices: BTreeMap<TokenId, Amount>,
    pub liquidation: Option<LiquidationData>,
    pub creation_height: Height,
}

impl Vault {
    pub fn new(id: VaultId, owner: Address, scheme_id: String, height: Height) -> Self {
        Self {
            id,
            owner,
            scheme_id,
            collateral: Basket::new(),
            loans: Basket::new(),
            status: VaultStatus::Active,
            liquidation_height: None,
            captured_prices: BTreeMap::new(),
            liquidation: None,
            creation_height: height,
        }
    }

    pub fn is_in_liquidation(&self) -> bool {
        self.status == VaultStatus::InLiquidation
    }

    /// Reject anything but bids while in liquidation
    pub fn ensure_not_liquidating(&self) -> LoanResult<()> {
        if self.is_in_liquidation() {
            return Err(LoanError::Liquidated(self.id.to_string()));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default)]
pub struct VaultStore {
    vaults: BTreeMap<VaultId, Vault>,
    by_scheme: BTreeMap<String, BTreeSet<VaultId>>,
}

impl VaultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &VaultId) -> Option<&Vault> {
        self.vaults.get(id)
    }

    pub fn require(&self, id: &VaultId) -> LoanResult<&Vault> {
        self.get(id)
            .ok_or_else(|| LoanError::Validation(format!("Vault <{}> not found", id)))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Vault> {
        self.vaults.values()
    }

    pub fn ids(&self) -> Vec<VaultId> {
        self.vaults.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.vaults.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vaults.is_empty()
    }

    /// Vaults currently bound to `scheme_id`
    pub fn bound_to(&self, scheme_id: &str) -> Vec<VaultId> {
        self.by_scheme
            .get(scheme_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn index_insert(&mut self, vault: &Vault) {
        self.by_scheme
            .entry(vault.scheme_id.clone())
            .or_default()
            .insert(vault.id.clone());
    }

    fn index_remove(&mut self, vault: &Vault) {
        if let Some(set) = self.by_scheme.get_mut(&vault.scheme_id) {
            set.remove(&vault.id);
            if set.is_empty() {
                self.by_scheme.remove(&vault.scheme_id);
            }
        }
    }

    fn put(&mut self, vault: Vault) {
        if let Some(prev) = self.vaults.remove(&vault.id) {
            self.index_remove(&prev);
        }
        self.index_insert(&vault);
        self.vaults.insert(vault.id.clone(), vault);
    }

    pub fn insert(&mut self, journal: &mut Journal, vault: Vault) -> LoanResult<()> {
        if self.vaults.contains_key(&vault.id) {
            return Err(LoanError::Validation(format!("Vault <{}> already exists", vault.id)));
        }
        journal.record(UndoRecord::Vault(vault.id.clone(), None));
        self.put(vault);
        Ok(())
    }

    /// Apply `f` to a copy of the vault and journal the prior value if it changed
    pub fn modify<F, R>(&mut self, journal: &mut Journal, id: &VaultId, f: F) -> LoanResult<R>
    where
        F: FnOnce(&mut Vault) -> LoanResult<R>,
    {
        let current = self.require(id)?.clone();
        let mut next = current.clone();
        let out = f(&mut next)?;
        if next != current {
            journal.record(UndoRecord::Vault(id.clone(), Some(current)));
            self.put(next);
        }
        Ok(out)
    }

    pub fn remove(&mut self, journal: &mut Journal, id: &VaultId) -> LoanResult<Vault> {
        let vault = self
            .vaults
            .remove(id)
            .ok_or_else(|| LoanError::Validation(format!("Vault <{}> not found", id)))?;
        self.index_remove(&vault);
        journal.record(UndoRecord::Vault(id.clone(), Some(vault.clone())));
        Ok(vault)
    }

    /// Recompute the scheme index from the vault records
    pub fn rebuild_index(&mut self) {
        self.by_scheme.clear();
        let vaults: Vec<Vault> = self.vaults.values().cloned().collect();
        for vault in &vaults {
            self.index_insert(vault);
        }
    }

    /// Raw restore used by undo; the index is rebuilt afterwards
    pub(crate) fn restore(&mut self, id: VaultId, vault: Option<Vault>) {
        match vault {
            Some(v) => {
                self.vaults.insert(id, v);
            }
            None => {
                self.vaults.remove(&id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vid(n: u8) -> VaultId {
        VaultId::parse(&format!("{:02x}", n).repeat(32)).unwrap()
    }

    #[test]
    fn test_scheme_index_follows_rebind() {
        let mut store = VaultStore::new();
        let mut j = Journal::default();
        let owner = Address::parse("owner1").unwrap();
        store
            .insert(&mut j, Vault::new(vid(1), owner.clone(), "A".into(), 1))
            .unwrap();
        store
            .insert(&mut j, Vault::new(vid(2), owner, "A".into(), 1))
            .unwrap();
        assert_eq!(store.bound_to("A").len(), 2);

        store
            .modify(&mut j, &vid(1), |v| {
                v.scheme_id = "B".into();
                Ok(())
            })
            .unwrap();
        assert_eq!(store.bound_to("A"), vec![vid(2)]);
        assert_eq!(store.bound_to("B"), vec![vid(1)]);
    }

    #[test]
    fn test_modify_failure_leaves_vault() {
        let mut store = VaultStore::new();
        let mut j = Journal::default();
        store
            .insert(&mut j, Vault::new(vid(1), Address::parse("o").unwrap(), "A".into(), 1))
            .unwrap();
        let before = j.len();
        let res: LoanResult<()> = store.modify(&mut j, &vid(1), |v| {
            v.scheme_id = "B".into();
            Err(LoanError::Validation("nope".into()))
        });
        assert!(res.is_err());
        assert_eq!(j.len(), before);
        assert_eq!(store.get(&vid(1)).unwrap().scheme_id, "A");
    }

    #[test]
    fn test_rebuild_index_after_restore() {
        let mut store = VaultStore::new();
        let mut j = Journal::default();
        store
            .insert(&mut j, Vault::new(vid(3), Address::parse("o").unwrap(), "A".into(), 1))
            .unwrap();
        store.restore(vid(3), None);
        store.rebuild_index();
        assert!(store.bound_to("A").is_empty());
    }
}
