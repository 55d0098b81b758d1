//! Bounds generated scenarios so replays stay short and meaningful

use crate::generators::Op;

/// Blocks a single scenario may mine in total
pub const MAX_BLOCKS: u32 = 240;

/// Smallest price a feed may be pushed to, in satoshis
pub const MIN_PRICE_SATS: i64 = 1_000_000;

pub trait Sanitize {
    fn sanitize(self, vaults: usize) -> Self;
}

impl Sanitize for Op {
    fn sanitize(self, vaults: usize) -> Op {
        let vaults = vaults.max(1);
        match self {
            Op::Deposit { vault, sats } => Op::Deposit {
                vault: vault % vaults,
                sats: sats.max(1),
            },
            Op::Withdraw { vault, sats } => Op::Withdraw {
                vault: vault % vaults,
                sats: sats.max(1),
            },
            Op::Take { vault, token, sats } => Op::Take {
                vault: vault % vaults,
                token,
                sats: sats.max(1),
            },
            Op::Payback { vault, token, sats } => Op::Payback {
                vault: vault % vaults,
                token,
                sats: sats.max(1),
            },
            Op::Bid { vault, token, sats } => Op::Bid {
                vault: vault % vaults,
                token,
                sats: sats.max(1),
            },
            // a feed must never reach zero
            Op::Price { feed, permille } => Op::Price {
                feed,
                permille: permille.clamp(-900, 2_000),
            },
            Op::Rate { pct } => Op::Rate { pct: pct.clamp(-100, 100) },
            Op::Generate { blocks } => Op::Generate { blocks: blocks.max(1) },
        }
    }
}

impl Sanitize for Vec<Op> {
    fn sanitize(self, vaults: usize) -> Vec<Op> {
        let mut mined = 0u32;
        let mut out = Vec::with_capacity(self.len());
        for op in self {
            let op = op.sanitize(vaults);
            if let Op::Generate { blocks } = op {
                if mined >= MAX_BLOCKS {
                    continue;
                }
                let blocks = u32::from(blocks).min(MAX_BLOCKS - mined);
                mined += blocks;
                out.push(Op::Generate { blocks: blocks as u8 });
                continue;
            }
            out.push(op);
        }
        out
    }
}

/// Blocks mined by an already sanitized scenario
pub fn blocks_mined(ops: &[Op]) -> u32 {
    ops.iter()
        .map(|op| match op {
            Op::Generate { blocks } => u32::from(*blocks),
            _ => 0,
        })
        .sum()
}
