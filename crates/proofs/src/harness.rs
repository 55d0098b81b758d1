//! Regtest node preloaded with a small loan market, driven by [`Op`]s

use serde_json::{json, Value};
use vault_common::{rpc_code, Amount, LoanResult, TxId};
use vault_engine::rpc::{Node, RpcError};
use vault_engine::{invariants, EngineConfig};

use crate::generators::{Feed, LoanToken, Op};
use crate::sanitizer::MIN_PRICE_SATS;

const DFI_START_SATS: i64 = 100_000_000;
const TSLA_START_SATS: i64 = 1_000_000_000;

pub struct Harness {
    pub node: Node,
    pub owner: String,
    pub bidder: String,
    pub vaults: Vec<TxId>,
    prices: [i64; 2],
    applied: usize,
    rejected: usize,
}

fn sats_str(sats: i64) -> String {
    Amount::from_raw(i128::from(sats)).to_string()
}

fn amount(sats: i64, token: LoanToken) -> String {
    format!("{}@{}", sats_str(sats), token.symbol())
}

impl Harness {
    /// DFI collateral, DUSD and TSLA loans, `vaults` vaults with 100 DFI each
    pub fn new(vaults: usize) -> Result<Self, RpcError> {
        let mut node = Node::new(EngineConfig::regtest())?;
        let owner = address(&mut node, "owner")?;
        let bidder = address(&mut node, "bidder")?;
        let mut h = Self {
            node,
            owner,
            bidder,
            vaults: Vec::with_capacity(vaults),
            prices: [DFI_START_SATS, TSLA_START_SATS],
            applied: 0,
            rejected: 0,
        };

        h.call("setoracleprice", json!(["DFI/USD", sats_str(DFI_START_SATS)]))?;
        h.call("setoracleprice", json!(["DUSD/USD", "1"]))?;
        h.call("setoracleprice", json!(["TSLA/USD", sats_str(TSLA_START_SATS)]))?;
        h.call(
            "setcollateraltoken",
            json!([{"token": "DFI", "factor": "1", "fixedIntervalPriceId": "DFI/USD"}]),
        )?;
        h.call(
            "setloantoken",
            json!([{"symbol": "DUSD", "fixedIntervalPriceId": "DUSD/USD", "interest": "0"}]),
        )?;
        h.call(
            "setloantoken",
            json!([{"symbol": "TSLA", "fixedIntervalPriceId": "TSLA/USD", "interest": "1"}]),
        )?;
        h.call("createloanscheme", json!([150, "2", "LOAN150"]))?;

        let mut funding = serde_json::Map::new();
        funding.insert(h.owner.clone(), json!("1000000@DFI"));
        h.call("utxostoaccount", json!([funding]))?;
        let (owner, bidder) = (h.owner.clone(), h.bidder.clone());
        h.call("minttokens", json!([["100@DUSD", "100@TSLA"], owner]))?;
        h.call("minttokens", json!([["10000@DUSD", "10000@TSLA"], bidder]))?;

        for _ in 0..vaults {
            let id = h.call("createvault", json!([owner, "LOAN150"]))?;
            let id = TxId::parse(id.as_str().unwrap_or_default())?;
            h.call("deposittovault", json!([id.as_str(), owner, "100@DFI"]))?;
            h.vaults.push(id);
        }
        h.call("generate", json!([1]))?;
        Ok(h)
    }

    pub fn call(&mut self, method: &str, args: Value) -> Result<Value, RpcError> {
        let params = match args {
            Value::Array(items) => items,
            other => vec![other],
        };
        self.node.call(method, &params)
    }

    pub fn height(&self) -> u64 {
        self.node.engine().height()
    }

    /// (applied, rejected) operation counts
    pub fn counts(&self) -> (usize, usize) {
        (self.applied, self.rejected)
    }

    /// Replay one operation. Ordinary rejections are counted and swallowed;
    /// only an invariant breach comes back as an error.
    pub fn apply(&mut self, op: &Op) -> Result<(), RpcError> {
        let owner = self.owner.clone();
        let result = match *op {
            Op::Deposit { vault, sats } => {
                let id = self.vault(vault);
                self.call("deposittovault", json!([id, owner, format!("{}@DFI", sats_str(sats))]))
            }
            Op::Withdraw { vault, sats } => {
                let id = self.vault(vault);
                self.call("withdrawfromvault", json!([id, owner, format!("{}@DFI", sats_str(sats))]))
            }
            Op::Take { vault, token, sats } => {
                let id = self.vault(vault);
                self.call("takeloan", json!([{"vaultId": id, "amounts": amount(sats, token)}]))
            }
            Op::Payback { vault, token, sats } => {
                let id = self.vault(vault);
                self.call(
                    "paybackloan",
                    json!([{"vaultId": id, "from": owner, "amounts": amount(sats, token)}]),
                )
            }
            Op::Price { feed, permille } => self.move_price(feed, permille),
            Op::Rate { pct } => {
                let dusd = self
                    .node
                    .engine()
                    .state()
                    .tokens
                    .get_by_symbol("DUSD")
                    .map(|t| t.id.to_string())
                    .unwrap_or_default();
                let mut change = serde_json::Map::new();
                change.insert(
                    format!("v0/token/{}/loan_minting_interest", dusd),
                    json!(pct.to_string()),
                );
                self.call("setgov", json!([change]))
            }
            Op::Bid { vault, token, sats } => {
                let id = self.vault(vault);
                let bidder = self.bidder.clone();
                self.call("placeauctionbid", json!([id, 0, bidder, amount(sats, token)]))
            }
            Op::Generate { blocks } => self.call("generate", json!([blocks])),
        };
        match result {
            Ok(_) => {
                self.applied += 1;
                Ok(())
            }
            Err(e) if e.code == rpc_code::INVALID_REQUEST => Err(e),
            Err(e) => {
                log::debug!("{:?} rejected: {}", op, e);
                self.rejected += 1;
                Ok(())
            }
        }
    }

    fn vault(&self, index: usize) -> String {
        self.vaults
            .get(index % self.vaults.len().max(1))
            .map(|id| id.as_str().to_string())
            .unwrap_or_default()
    }

    fn move_price(&mut self, feed: Feed, permille: i32) -> Result<Value, RpcError> {
        let (slot, pair) = match feed {
            Feed::Dfi => (0, "DFI/USD"),
            Feed::Tsla => (1, "TSLA/USD"),
        };
        let next = self.prices[slot]
            .saturating_mul(i64::from(1_000 + permille))
            / 1_000;
        self.prices[slot] = next.max(MIN_PRICE_SATS);
        let price = sats_str(self.prices[slot]);
        self.call("setoracleprice", json!([pair, price]))
    }

    /// Everything observable through the read-only RPC methods
    pub fn snapshot(&mut self) -> Result<Value, RpcError> {
        let owner = self.owner.clone();
        let bidder = self.bidder.clone();
        Ok(json!({
            "height": self.call("getblockcount", json!([]))?,
            "vaults": self.call("listvaults", json!([{"verbose": true}]))?,
            "auctions": self.call("listauctions", json!([]))?,
            "burn": self.call("getburninfo", json!([]))?,
            "tokens": self.call("listtokens", json!([]))?,
            "schemes": self.call("listloanschemes", json!([]))?,
            "govs": self.call("listgovs", json!([]))?,
            "prices": self.call("listfixedintervalprices", json!([]))?,
            "owner": self.call("getaccount", json!([owner]))?,
            "bidder": self.call("getaccount", json!([bidder]))?,
        }))
    }

    /// Full block-level invariant check on the current state
    pub fn check(&self) -> LoanResult<()> {
        invariants::check_block(self.node.engine().state(), self.node.engine().config())
    }
}

fn address(node: &mut Node, label: &str) -> Result<String, RpcError> {
    let value = node.call("getnewaddress", &[json!(label)])?;
    Ok(value.as_str().unwrap_or_default().to_string())
}
