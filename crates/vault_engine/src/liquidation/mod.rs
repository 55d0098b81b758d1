//! Liquidation engine
//!
//! `active -> mayLiquidate -> inLiquidation -> active`. The monitor
//! classifies vaults at block start, the planner cuts a liquidated vault
//! into auction batches, the auction module takes bids and settles.

pub mod auction;
pub mod monitor;
pub mod planner;

pub use auction::{close_auctions, place_bid, start_liquidation, AuctionReport};
pub use monitor::{monitor_vaults, next_boundary, MonitorReport};
pub use planner::plan_batches;
