//! Block-ordered engine driving the consensus state
//!
//! Every block starts with block-start processing as event 0. Requests are
//! appended to the tip block as the next event index, atomically: a failing
//! request leaves no trace. Undo records are kept per `(height, event)` so
//! the tip can be disconnected.

use std::collections::{BTreeMap, BTreeSet};

use sha3::{Digest, Sha3_256};
use vault_common::{Address, Height, LoanError, LoanResult, TxId};

use crate::config::EngineConfig;
use crate::events::{self, block::BlockReport, EventContext, Request};
use crate::invariants;
use crate::state::ConsensusState;

/// Blocks of undo data kept behind the tip
pub const UNDO_DEPTH: Height = 10_000;

/// Deterministic transaction id: SHA3-256 over height, event index and method
pub fn tx_id(height: Height, event_index: u32, method: &str) -> TxId {
    let mut hasher = Sha3_256::new();
    hasher.update(height.to_le_bytes());
    hasher.update(event_index.to_le_bytes());
    hasher.update(method.as_bytes());
    let digest = hasher.finalize();
    TxId(digest.iter().map(|b| format!("{:02x}", b)).collect())
}

pub struct Engine {
    state: ConsensusState,
    config: EngineConfig,
    /// Next free event index per connected height
    next_event: BTreeMap<Height, u32>,
    /// Addresses this node signs for
    wallet: BTreeSet<Address>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> LoanResult<Self> {
        config
            .validate()
            .map_err(|e| LoanError::Validation(format!("invalid engine config: {:#}", e)))?;
        let state = ConsensusState::genesis(&config.native_symbol)?;
        log::info!("Engine started on {} at genesis", config.network);
        Ok(Self {
            state,
            config,
            next_event: BTreeMap::from([(0, 1)]),
            wallet: BTreeSet::new(),
        })
    }

    pub fn state(&self) -> &ConsensusState {
        &self.state
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn height(&self) -> Height {
        self.state.height
    }

    pub fn wallet(&self) -> &BTreeSet<Address> {
        &self.wallet
    }

    /// Derive a fresh wallet address
    pub fn new_address(&mut self, label: Option<&str>) -> LoanResult<Address> {
        let seed = format!("{}:{}", self.wallet.len(), label.unwrap_or_default());
        let digest = Sha3_256::digest(seed.as_bytes());
        let hex: String = digest.iter().take(16).map(|b| format!("{:02x}", b)).collect();
        let address = Address::parse(&format!("df1q{}", hex))?;
        self.wallet.insert(address.clone());
        Ok(address)
    }

    pub fn import_address(&mut self, address: Address) {
        self.wallet.insert(address);
    }

    /// Apply one event at `(height, index)`; commits on success, reverts otherwise
    fn apply_event(&mut self, index: u32, request: Request, trusted: bool) -> LoanResult<TxId> {
        let height = self.state.height;
        let method = request.method();
        let txid = tx_id(height, index, method);
        let ctx = EventContext {
            txid: &txid,
            wallet: if trusted { None } else { Some(&self.wallet) },
        };
        let outcome = events::apply(&mut self.state, &self.config, &ctx, request)
            .and_then(|()| invariants::check_structure(&self.state));
        match outcome {
            Ok(()) => {
                self.state.commit(height, index);
                Ok(txid)
            }
            Err(e) => {
                self.state.revert_pending();
                if e.is_fatal() {
                    log::error!("{} at {}/{} broke an invariant: {}", method, height, index, e);
                } else {
                    log::warn!("{} rejected: {}", method, e);
                }
                Err(e)
            }
        }
    }

    /// Append a wallet-signed request to the tip block
    pub fn submit(&mut self, request: Request) -> LoanResult<TxId> {
        let height = self.state.height;
        let index = self.next_event.get(&height).copied().unwrap_or(1);
        let txid = self.apply_event(index, request, false)?;
        self.next_event.insert(height, index + 1);
        Ok(txid)
    }

    fn begin_block(&mut self) -> LoanResult<BlockReport> {
        let height = self.state.height + 1;
        let report = match events::block::begin_block(&mut self.state, &self.config, height) {
            Ok(report) => report,
            Err(e) => {
                self.state.revert_pending();
                log::error!("Block-start processing failed at height {}: {}", height, e);
                return Err(e);
            }
        };
        self.state.commit(height, 0);
        self.next_event.insert(height, 1);
        Ok(report)
    }

    fn end_block(&mut self) -> LoanResult<()> {
        let height = self.state.height;
        if let Err(e) = invariants::check_block(&self.state, &self.config) {
            log::error!("Block {} failed the invariant check: {}", height, e);
            self.disconnect_tip()?;
            return Err(e);
        }
        if height > UNDO_DEPTH {
            self.state.undo_log.prune_below(height - UNDO_DEPTH);
        }
        Ok(())
    }

    /// Mine `blocks` empty blocks
    pub fn generate(&mut self, blocks: u64) -> LoanResult<Vec<BlockReport>> {
        let mut reports = Vec::with_capacity(blocks as usize);
        for _ in 0..blocks {
            let report = self.begin_block()?;
            self.end_block()?;
            reports.push(report);
        }
        Ok(reports)
    }

    /// Connect a block of already-signed requests; any failure disconnects it
    pub fn connect_block(&mut self, txs: Vec<Request>) -> LoanResult<(BlockReport, Vec<TxId>)> {
        let report = self.begin_block()?;
        let mut txids = Vec::with_capacity(txs.len());
        for (i, tx) in txs.into_iter().enumerate() {
            let index = u32::try_from(i + 1).map_err(|_| LoanError::Overflow)?;
            match self.apply_event(index, tx, true) {
                Ok(txid) => txids.push(txid),
                Err(e) => {
                    self.disconnect_tip()?;
                    return Err(e);
                }
            }
            self.next_event.insert(self.state.height, index + 1);
        }
        self.end_block()?;
        Ok((report, txids))
    }

    /// Undo every event of the tip block; returns the new tip height
    pub fn disconnect_tip(&mut self) -> LoanResult<Height> {
        let height = self.state.height;
        if height == 0 {
            return Err(LoanError::Validation("Cannot invalidate the genesis block".to_string()));
        }
        let events = self.state.disconnect(height);
        if self.state.height == height {
            return Err(LoanError::InvariantBreach(format!(
                "no undo data left for block {}",
                height
            )));
        }
        self.next_event.remove(&height);
        log::info!("Disconnected block {} ({} event(s))", height, events);
        Ok(self.state.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tx_id_is_deterministic_hex() {
        let a = tx_id(5, 1, "createvault");
        assert_eq!(a, tx_id(5, 1, "createvault"));
        assert_ne!(a, tx_id(5, 2, "createvault"));
        assert_eq!(a.as_str().len(), 64);
        assert!(TxId::parse(a.as_str()).is_ok());
    }

    #[test]
    fn test_generate_and_disconnect() {
        let mut engine = Engine::new(EngineConfig::regtest()).unwrap();
        engine.generate(3).unwrap();
        assert_eq!(engine.height(), 3);
        assert_eq!(engine.disconnect_tip().unwrap(), 2);
        assert!(engine.disconnect_tip().is_ok());
        assert!(engine.disconnect_tip().is_ok());
        assert!(engine.disconnect_tip().is_err());
    }

    #[test]
    fn test_unknown_signer_rejected() {
        let mut engine = Engine::new(EngineConfig::regtest()).unwrap();
        let stranger = Address::parse("stranger").unwrap();
        let err = engine
            .submit(Request::BurnTokens {
                from: stranger,
                amounts: vec!["1@DFI".parse().unwrap()],
            })
            .unwrap_err();
        assert!(matches!(err, LoanError::Authorization(_)));
        assert_eq!(engine.state().journal.len(), 0);
    }
}
