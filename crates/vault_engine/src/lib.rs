//! Vault and loan engine with lazy interest accrual
//!
//! Deterministic state machine: vaults lock collateral, mint loan tokens
//! against it, accrue interest per block and are liquidated through
//! batched auctions when their collateralization falls below the scheme
//! minimum. Everything runs block by block and can be rolled back.

pub mod config;
pub mod engine;
pub mod events;
pub mod interest;
pub mod invariants;
pub mod liquidation;
pub mod rpc;
pub mod state;
pub mod valuation;

// Re-export commonly used types
pub use config::EngineConfig;
pub use engine::{tx_id, Engine};
pub use events::Request;
pub use rpc::{Node, RpcError};
pub use state::ConsensusState;
pub use vault_common::{LoanError, LoanResult};
