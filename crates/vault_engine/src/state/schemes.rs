//! Loan scheme registry
//!
//! Schemes are owned here by id; vaults only store the scheme id. The
//! reverse relation (vaults bound to a scheme) lives in the vault store as
//! a derived index.

use std::collections::BTreeMap;

use vault_common::{Amount, Height, LoanError, LoanResult};

use super::undo::{Journal, UndoRecord};

pub const MAX_SCHEME_ID_LEN: usize = 8;
pub const MIN_COLLATERAL_RATIO: u32 = 100;

/// Update scheduled for a later height
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingSchemeUpdate {
    pub min_col_ratio: u32,
    pub rate: Amount,
    pub height: Height,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoanScheme {
    pub id: String,
    /// Minimum collateralization ratio in percent
    pub min_col_ratio: u32,
    /// Base annual interest in percent, may be negative
    pub rate: Amount,
    pub destroy_height: Option<Height>,
    pub pending_update: Option<PendingSchemeUpdate>,
}

impl LoanScheme {
    pub fn is_pending_destruction(&self) -> bool {
        self.destroy_height.is_some()
    }
}

#[derive(Clone, Debug, Default)]
pub struct SchemeRegistry {
    schemes: BTreeMap<String, LoanScheme>,
    default_id: Option<String>,
}

fn validate_id(id: &str) -> LoanResult<()> {
    if id.is_empty() || id.len() > MAX_SCHEME_ID_LEN {
        return Err(LoanError::MalformedArgs(format!(
            "id cannot be empty or more than {} chars long",
            MAX_SCHEME_ID_LEN
        )));
    }
    Ok(())
}

fn validate_ratio(ratio: u32) -> LoanResult<()> {
    if ratio < MIN_COLLATERAL_RATIO {
        return Err(LoanError::Validation(format!(
            "minimum collateral ratio cannot be less than {}",
            MIN_COLLATERAL_RATIO
        )));
    }
    Ok(())
}

impl SchemeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&LoanScheme> {
        self.schemes.get(id)
    }

    pub fn require(&self, id: &str) -> LoanResult<&LoanScheme> {
        self.get(id)
            .ok_or_else(|| LoanError::Validation(format!("Cannot find existing loan scheme with id {}", id)))
    }

    pub fn default_id(&self) -> Option<&str> {
        self.default_id.as_deref()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LoanScheme> {
        self.schemes.values()
    }

    fn ensure_unique_terms(&self, skip: &str, ratio: u32, rate: Amount) -> LoanResult<()> {
        if let Some(other) = self
            .schemes
            .values()
            .find(|s| s.id != skip && s.min_col_ratio == ratio && s.rate == rate)
        {
            return Err(LoanError::Validation(format!(
                "Loan scheme {} with same interestrate and mincolratio already exists",
                other.id
            )));
        }
        Ok(())
    }

    fn put(&mut self, journal: &mut Journal, scheme: LoanScheme) {
        journal.record(UndoRecord::Scheme(
            scheme.id.clone(),
            self.schemes.get(&scheme.id).cloned(),
        ));
        self.schemes.insert(scheme.id.clone(), scheme);
    }

    /// Create a scheme; the first one created becomes the default
    pub fn create(&mut self, journal: &mut Journal, id: &str, ratio: u32, rate: Amount) -> LoanResult<()> {
        validate_id(id)?;
        validate_ratio(ratio)?;
        if self.schemes.contains_key(id) {
            return Err(LoanError::Validation(format!(
                "Loan scheme already exist with id {}",
                id
            )));
        }
        self.ensure_unique_terms(id, ratio, rate)?;

        self.put(
            journal,
            LoanScheme {
                id: id.to_string(),
                min_col_ratio: ratio,
                rate,
                destroy_height: None,
                pending_update: None,
            },
        );
        if self.default_id.is_none() {
            journal.record(UndoRecord::DefaultScheme(None));
            self.default_id = Some(id.to_string());
        }
        Ok(())
    }

    /// Update ratio and rate now, or queue the change for `activate_at`.
    /// Returns true when the change took effect immediately.
    pub fn update(
        &mut self,
        journal: &mut Journal,
        id: &str,
        ratio: u32,
        rate: Amount,
        activate_at: Option<Height>,
        height: Height,
    ) -> LoanResult<bool> {
        validate_ratio(ratio)?;
        let mut scheme = self.require(id)?.clone();
        if scheme.is_pending_destruction() {
            return Err(LoanError::Validation(format!(
                "Loan scheme {} is pending destruction",
                id
            )));
        }
        self.ensure_unique_terms(id, ratio, rate)?;

        match activate_at {
            Some(at) if at > height => {
                scheme.pending_update = Some(PendingSchemeUpdate {
                    min_col_ratio: ratio,
                    rate,
                    height: at,
                });
                self.put(journal, scheme);
                Ok(false)
            }
            Some(at) if at < height => Err(LoanError::Validation(
                "Update height below current block height, set future height".to_string(),
            )),
            _ => {
                scheme.min_col_ratio = ratio;
                scheme.rate = rate;
                scheme.pending_update = None;
                self.put(journal, scheme);
                Ok(true)
            }
        }
    }

    /// Apply queued updates due at or before `height`, returning the affected ids
    pub fn apply_pending(&mut self, journal: &mut Journal, height: Height) -> Vec<String> {
        let due: Vec<LoanScheme> = self
            .schemes
            .values()
            .filter(|s| s.pending_update.as_ref().is_some_and(|u| u.height <= height))
            .cloned()
            .collect();
        let mut applied = Vec::with_capacity(due.len());
        for mut scheme in due {
            if let Some(update) = scheme.pending_update.take() {
                scheme.min_col_ratio = update.min_col_ratio;
                scheme.rate = update.rate;
                applied.push(scheme.id.clone());
                self.put(journal, scheme);
            }
        }
        applied
    }

    pub fn set_default(&mut self, journal: &mut Journal, id: &str) -> LoanResult<()> {
        let scheme = self.require(id)?;
        if scheme.is_pending_destruction() {
            return Err(LoanError::Validation(format!(
                "Cannot set {} as default, set to be destroyed",
                id
            )));
        }
        if self.default_id.as_deref() == Some(id) {
            return Err(LoanError::Validation(format!(
                "Loan scheme with id {} is already set as default",
                id
            )));
        }
        journal.record(UndoRecord::DefaultScheme(self.default_id.clone()));
        self.default_id = Some(id.to_string());
        Ok(())
    }

    fn ensure_destroyable(&self, id: &str) -> LoanResult<()> {
        self.require(id)?;
        if self.default_id.as_deref() == Some(id) {
            return Err(LoanError::Validation(
                "Cannot destroy default loan scheme, set new default first".to_string(),
            ));
        }
        Ok(())
    }

    /// Remove a scheme immediately; `bound_vaults` is the size of its vault index
    pub fn destroy(&mut self, journal: &mut Journal, id: &str, bound_vaults: usize) -> LoanResult<()> {
        self.ensure_destroyable(id)?;
        if bound_vaults > 0 {
            return Err(LoanError::Validation(format!(
                "Loan scheme {} is bound to {} vault(s), use delayed destruction",
                id, bound_vaults
            )));
        }
        self.remove(journal, id);
        Ok(())
    }

    pub fn schedule_destroy(
        &mut self,
        journal: &mut Journal,
        id: &str,
        at: Height,
        height: Height,
    ) -> LoanResult<()> {
        self.ensure_destroyable(id)?;
        if at <= height {
            return Err(LoanError::Validation(
                "Destruction height below current block height, set future height".to_string(),
            ));
        }
        let mut scheme = self.require(id)?.clone();
        scheme.destroy_height = Some(at);
        self.put(journal, scheme);
        Ok(())
    }

    /// Ids whose scheduled destruction is due at `height`
    pub fn due_destructions(&self, height: Height) -> Vec<String> {
        self.schemes
            .values()
            .filter(|s| s.destroy_height.is_some_and(|h| h <= height))
            .map(|s| s.id.clone())
            .collect()
    }

    pub fn remove(&mut self, journal: &mut Journal, id: &str) {
        if let Some(prev) = self.schemes.remove(id) {
            journal.record(UndoRecord::Scheme(id.to_string(), Some(prev)));
        }
    }

    pub(crate) fn restore(&mut self, id: String, scheme: Option<LoanScheme>) {
        match scheme {
            Some(s) => {
                self.schemes.insert(id, s);
            }
            None => {
                self.schemes.remove(&id);
            }
        }
    }

    pub(crate) fn restore_default(&mut self, id: Option<String>) {
        self.default_id = id;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pct(s: &str) -> Amount {
        s.parse().unwrap()
    }

    #[test]
    fn test_first_scheme_is_default() {
        let mut reg = SchemeRegistry::new();
        let mut j = Journal::default();
        reg.create(&mut j, "LOAN150", 150, pct("5")).unwrap();
        reg.create(&mut j, "LOAN200", 200, pct("3")).unwrap();
        assert_eq!(reg.default_id(), Some("LOAN150"));
    }

    #[test]
    fn test_create_validation() {
        let mut reg = SchemeRegistry::new();
        let mut j = Journal::default();
        assert!(reg.create(&mut j, "LOANTOOLONG", 150, pct("1")).is_err());
        assert!(reg.create(&mut j, "LOAN99", 99, pct("1")).is_err());
        reg.create(&mut j, "A", 150, pct("1")).unwrap();
        assert!(reg.create(&mut j, "A", 175, pct("1")).is_err());
        assert!(reg.create(&mut j, "B", 150, pct("1")).is_err());
    }

    #[test]
    fn test_delayed_update() {
        let mut reg = SchemeRegistry::new();
        let mut j = Journal::default();
        reg.create(&mut j, "A", 150, pct("1")).unwrap();
        let applied = reg.update(&mut j, "A", 175, pct("2"), Some(20), 10).unwrap();
        assert!(!applied);
        assert_eq!(reg.get("A").unwrap().min_col_ratio, 150);
        assert!(reg.apply_pending(&mut j, 19).is_empty());
        assert_eq!(reg.apply_pending(&mut j, 20), vec!["A".to_string()]);
        assert_eq!(reg.get("A").unwrap().min_col_ratio, 175);
    }

    #[test]
    fn test_default_cannot_be_destroyed() {
        let mut reg = SchemeRegistry::new();
        let mut j = Journal::default();
        reg.create(&mut j, "A", 150, pct("1")).unwrap();
        reg.create(&mut j, "B", 200, pct("1")).unwrap();
        assert!(reg.destroy(&mut j, "A", 0).is_err());
        assert!(reg.destroy(&mut j, "B", 2).is_err());
        reg.schedule_destroy(&mut j, "B", 30, 10).unwrap();
        assert!(reg.set_default(&mut j, "B").is_err());
        assert_eq!(reg.due_destructions(30), vec!["B".to_string()]);
        reg.destroy(&mut j, "B", 0).unwrap();
        assert!(reg.get("B").is_none());
    }
}
