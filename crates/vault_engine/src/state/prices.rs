//! Fixed interval price view
//!
//! Oracle submissions land in `latest`. At every interval boundary the
//! pipeline shifts: `active <- next`, `next <- latest`. Safety checks read
//! both `active` and `next`; a price is live only when both exist and do
//! not deviate by more than the configured threshold.

use std::collections::BTreeMap;

use vault_common::{Amount, CurrencyPair, Height, LoanError, LoanResult, Rounding};

use super::undo::{Journal, UndoRecord};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FixedIntervalPrice {
    pub pair: CurrencyPair,
    pub active: Option<Amount>,
    pub next: Option<Amount>,
    /// Most recent oracle submission
    pub latest: Amount,
    pub last_update: Height,
    /// Height the active price was last shifted at
    pub active_height: Height,
}

/// Result of a price lookup
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ValidPrice {
    pub active: Amount,
    pub next: Amount,
    pub is_live: bool,
}

/// Check if `next` stays within `deviation` of `active`
///
/// # Arguments
/// * `active` - Price currently in force
/// * `next` - Price that becomes active at the next boundary
/// * `deviation` - Max relative move (0.3 = 30%)
///
/// # Returns
/// * `true` if `|next - active| / active < deviation`
pub fn is_within_deviation(active: Amount, next: Amount, deviation: Amount) -> bool {
    if !active.is_positive() || !next.is_positive() {
        return false;
    }
    let diff = match next.checked_sub(active) {
        Ok(d) => d.abs(),
        Err(_) => return false,
    };
    match diff.div(active, Rounding::Floor) {
        Ok(relative) => relative < deviation,
        Err(_) => false,
    }
}

#[derive(Clone, Debug, Default)]
pub struct PriceView {
    prices: BTreeMap<CurrencyPair, FixedIntervalPrice>,
}

impl PriceView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, pair: &CurrencyPair) -> Option<&FixedIntervalPrice> {
        self.prices.get(pair)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FixedIntervalPrice> {
        self.prices.values()
    }

    fn put(&mut self, journal: &mut Journal, entry: FixedIntervalPrice) {
        let prev = self.prices.get(&entry.pair).cloned();
        if prev.as_ref() == Some(&entry) {
            return;
        }
        journal.record(UndoRecord::Price(entry.pair.clone(), prev));
        self.prices.insert(entry.pair.clone(), entry);
    }

    /// Record an oracle submission; the first one seeds both pipeline slots
    pub fn submit(&mut self, journal: &mut Journal, pair: &CurrencyPair, price: Amount, height: Height) -> LoanResult<()> {
        if !price.is_positive() {
            return Err(LoanError::AmountOutOfRange(format!(
                "price {} for {} must be positive",
                price, pair
            )));
        }
        let entry = match self.prices.get(pair) {
            Some(existing) => FixedIntervalPrice {
                latest: price,
                last_update: height,
                ..existing.clone()
            },
            None => FixedIntervalPrice {
                pair: pair.clone(),
                active: Some(price),
                next: Some(price),
                latest: price,
                last_update: height,
                active_height: height,
            },
        };
        self.put(journal, entry);
        Ok(())
    }

    /// Shift every pipeline at an interval boundary. Returns the number shifted.
    pub fn refresh(&mut self, journal: &mut Journal, height: Height, interval: u64) -> usize {
        if interval == 0 || height % interval != 0 {
            return 0;
        }
        let shifted: Vec<FixedIntervalPrice> = self
            .prices
            .values()
            .map(|p| FixedIntervalPrice {
                active: p.next,
                next: Some(p.latest),
                active_height: height,
                ..p.clone()
            })
            .collect();
        let mut count = 0;
        for entry in shifted {
            if self.prices.get(&entry.pair) != Some(&entry) {
                count += 1;
            }
            self.put(journal, entry);
        }
        if count > 0 {
            log::debug!("Refreshed {} fixed interval prices at height {}", count, height);
        }
        count
    }

    /// Resolve the price pair, reporting liveness
    pub fn get_valid_price(&self, pair: &CurrencyPair, deviation: Amount) -> LoanResult<ValidPrice> {
        let entry = self
            .prices
            .get(pair)
            .ok_or_else(|| LoanError::PriceNotLive(pair.to_string()))?;
        match (entry.active, entry.next) {
            (Some(active), Some(next)) => Ok(ValidPrice {
                active,
                next,
                is_live: is_within_deviation(active, next, deviation),
            }),
            _ => Err(LoanError::PriceNotLive(pair.to_string())),
        }
    }

    pub(crate) fn restore(&mut self, pair: CurrencyPair, entry: Option<FixedIntervalPrice>) {
        match entry {
            Some(e) => {
                self.prices.insert(pair, e);
            }
            None => {
                self.prices.remove(&pair);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amt(s: &str) -> Amount {
        s.parse().unwrap()
    }

    #[test]
    fn test_deviation_within_tolerance() {
        assert!(is_within_deviation(amt("1"), amt("1.29"), amt("0.3")));
        assert!(!is_within_deviation(amt("1"), amt("1.3"), amt("0.3")));
        assert!(is_within_deviation(amt("1"), amt("0.71"), amt("0.3")));
        assert!(!is_within_deviation(Amount::ZERO, amt("1"), amt("0.3")));
    }

    #[test]
    fn test_first_submission_seeds_both() {
        let mut view = PriceView::new();
        let mut j = Journal::default();
        let pair = CurrencyPair::new("DFI", "USD");
        view.submit(&mut j, &pair, amt("10"), 1).unwrap();
        let price = view.get_valid_price(&pair, amt("0.3")).unwrap();
        assert_eq!(price.active, amt("10"));
        assert_eq!(price.next, amt("10"));
        assert!(price.is_live);
    }

    #[test]
    fn test_pipeline_shift() {
        let mut view = PriceView::new();
        let mut j = Journal::default();
        let pair = CurrencyPair::new("TSLA", "USD");
        view.submit(&mut j, &pair, amt("10"), 1).unwrap();
        view.submit(&mut j, &pair, amt("12"), 2).unwrap();

        assert_eq!(view.refresh(&mut j, 5, 6), 0);
        view.refresh(&mut j, 6, 6);
        let price = view.get_valid_price(&pair, amt("0.3")).unwrap();
        assert_eq!(price.active, amt("10"));
        assert_eq!(price.next, amt("12"));

        view.refresh(&mut j, 12, 6);
        let price = view.get_valid_price(&pair, amt("0.3")).unwrap();
        assert_eq!(price.active, amt("12"));
    }

    #[test]
    fn test_large_jump_not_live() {
        let mut view = PriceView::new();
        let mut j = Journal::default();
        let pair = CurrencyPair::new("TSLA", "USD");
        view.submit(&mut j, &pair, amt("10"), 1).unwrap();
        view.submit(&mut j, &pair, amt("20"), 2).unwrap();
        view.refresh(&mut j, 6, 6);
        assert!(!view.get_valid_price(&pair, amt("0.3")).unwrap().is_live);
        assert!(view.get_valid_price(&CurrencyPair::new("X", "USD"), amt("0.3")).is_err());
    }
}
