//! Priority queue of vault health (min-heap by margin)

use priority_queue::PriorityQueue;
use std::cmp::Reverse;
use std::collections::HashMap;
use vault_common::{Amount, VaultId};

use crate::health::{HealthStatus, VaultHealth};

/// Margin-ordered queue: the vault closest to liquidation first
pub struct HealthQueue {
    queue: PriorityQueue<VaultId, Reverse<i128>>,
    map: HashMap<VaultId, VaultHealth>,
}

impl HealthQueue {
    pub fn new() -> Self {
        Self {
            queue: PriorityQueue::new(),
            map: HashMap::new(),
        }
    }

    /// Push or update a vault's health
    pub fn push(&mut self, health: VaultHealth) {
        let id = health.vault_id.clone();
        let margin = health.margin.raw();
        self.map.insert(id.clone(), health);
        self.queue.push(id, Reverse(margin));
    }

    /// Pop the vault with the lowest margin
    pub fn pop(&mut self) -> Option<VaultHealth> {
        let (id, _priority) = self.queue.pop()?;
        self.map.remove(&id)
    }

    pub fn peek(&self) -> Option<&VaultHealth> {
        let (id, _priority) = self.queue.peek()?;
        self.map.get(id)
    }

    pub fn remove(&mut self, id: &VaultId) -> Option<VaultHealth> {
        self.queue.remove(id);
        self.map.remove(id)
    }

    pub fn get(&self, id: &VaultId) -> Option<&VaultHealth> {
        self.map.get(id)
    }

    pub fn contains(&self, id: &VaultId) -> bool {
        self.map.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Replace the contents with a fresh scan; vaults missing from it are dropped
    pub fn refresh(&mut self, scan: Vec<VaultHealth>) {
        self.clear();
        for health in scan {
            self.push(health);
        }
    }

    /// Vaults below their scheme minimum, lowest margin first
    pub fn liquidatable(&self) -> Vec<VaultHealth> {
        self.sorted_where(|h| h.status == HealthStatus::Undercollateralized)
    }

    /// Covered vaults whose margin is under `buffer`, lowest margin first
    pub fn at_risk(&self, buffer: Amount) -> Vec<VaultHealth> {
        self.sorted_where(|h| {
            h.status != HealthStatus::Frozen && !h.margin.is_negative() && h.margin < buffer
        })
    }

    pub fn frozen(&self) -> Vec<VaultHealth> {
        self.sorted_where(|h| h.status == HealthStatus::Frozen)
    }

    fn sorted_where(&self, keep: impl Fn(&VaultHealth) -> bool) -> Vec<VaultHealth> {
        let mut out: Vec<VaultHealth> = self.map.values().filter(|h| keep(h)).cloned().collect();
        out.sort_by(|a, b| a.margin.cmp(&b.margin).then_with(|| a.vault_id.cmp(&b.vault_id)));
        out
    }

    pub fn clear(&mut self) {
        self.queue.clear();
        self.map.clear();
    }
}

impl Default for HealthQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::classify;
    use vault_common::Address;

    fn make_health(idx: u8, margin: &str) -> VaultHealth {
        let margin: Amount = margin.parse().unwrap();
        VaultHealth {
            vault_id: VaultId::parse(&format!("{:02x}", idx).repeat(32)).unwrap(),
            owner: Address::parse("owner").unwrap(),
            scheme_id: "LOAN150".to_string(),
            min_ratio: 150,
            active_ratio: margin,
            next_ratio: margin,
            margin,
            status: classify(margin, true, "20".parse().unwrap()),
            height: 0,
        }
    }

    #[test]
    fn test_queue_push_pop() {
        let mut queue = HealthQueue::new();
        queue.push(make_health(1, "-5"));
        queue.push(make_health(2, "10"));
        queue.push(make_health(3, "-10"));
        assert_eq!(queue.len(), 3);

        assert_eq!(queue.pop().unwrap().margin, "-10".parse().unwrap());
        assert_eq!(queue.pop().unwrap().margin, "-5".parse().unwrap());
    }

    #[test]
    fn test_queue_peek() {
        let mut queue = HealthQueue::new();
        queue.push(make_health(1, "5"));
        queue.push(make_health(2, "-5"));

        assert_eq!(queue.peek().unwrap().margin, "-5".parse().unwrap());
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_liquidatable_and_at_risk() {
        let mut queue = HealthQueue::new();
        queue.push(make_health(1, "-5"));
        queue.push(make_health(2, "25"));
        queue.push(make_health(3, "-1"));
        queue.push(make_health(4, "3"));

        let liquidatable = queue.liquidatable();
        assert_eq!(liquidatable.len(), 2);
        assert_eq!(liquidatable[0].margin, "-5".parse().unwrap());

        let at_risk = queue.at_risk("20".parse().unwrap());
        assert_eq!(at_risk.len(), 1);
        assert_eq!(at_risk[0].margin, "3".parse().unwrap());
    }

    #[test]
    fn test_push_replaces_and_refresh_drops() {
        let mut queue = HealthQueue::new();
        let mut health = make_health(7, "30");
        let id = health.vault_id.clone();
        queue.push(health.clone());

        health.margin = "-2".parse().unwrap();
        queue.push(health);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.get(&id).unwrap().margin, "-2".parse().unwrap());
        assert_eq!(queue.peek().unwrap().vault_id, id);

        queue.refresh(vec![make_health(8, "1")]);
        assert!(!queue.contains(&id));
        assert_eq!(queue.len(), 1);
        assert!(queue.remove(&make_health(8, "1").vault_id).is_some());
        assert!(queue.is_empty());
    }
}
