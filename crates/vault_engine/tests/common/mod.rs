//! Shared node fixture for the integration tests

#![allow(dead_code)]

use serde_json::{json, Value};
use vault_common::{Amount, HighPrecision, TokenId, TxId};
use vault_engine::rpc::{Node, RpcError};
use vault_engine::{interest, EngineConfig};

pub struct Fixture {
    pub node: Node,
    pub owner: String,
}

fn params(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

impl Fixture {
    /// Empty regtest node with one wallet address
    pub fn bare() -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut node = Node::new(EngineConfig::regtest()).expect("regtest config is valid");
        let owner = node
            .call("getnewaddress", &[json!("owner")])
            .expect("address")
            .as_str()
            .expect("address string")
            .to_string();
        Self { node, owner }
    }

    /// DFI collateral at 1 USD, DUSD loan token at 1 USD, scheme LOAN150 (150%, 1%),
    /// 1000 DFI on the owner's account
    pub fn dusd_market() -> Self {
        let mut fx = Self::bare();
        fx.set_price("DFI/USD", "1");
        fx.set_price("DUSD/USD", "1");
        fx.call(
            "setcollateraltoken",
            json!([{"token": "DFI", "factor": "1", "fixedIntervalPriceId": "DFI/USD"}]),
        );
        fx.call(
            "setloantoken",
            json!([{"symbol": "DUSD", "name": "Decentralized USD", "fixedIntervalPriceId": "DUSD/USD", "interest": "0"}]),
        );
        fx.call("createloanscheme", json!([150, "1", "LOAN150"]));
        let owner = fx.owner.clone();
        fx.fund(&owner, "1000@DFI");
        fx.generate(1);
        fx
    }

    /// Move native coins from utxos onto `owner`'s account
    pub fn fund(&mut self, owner: &str, amount: &str) {
        let mut entry = serde_json::Map::new();
        entry.insert(owner.to_string(), json!(amount));
        self.call("utxostoaccount", json!([entry]));
    }

    pub fn call(&mut self, method: &str, args: Value) -> Value {
        match self.node.call(method, &params(args)) {
            Ok(v) => v,
            Err(e) => panic!("{} failed: {}", method, e),
        }
    }

    pub fn try_call(&mut self, method: &str, args: Value) -> Result<Value, RpcError> {
        self.node.call(method, &params(args))
    }

    pub fn generate(&mut self, blocks: u64) {
        self.call("generate", json!([blocks]));
    }

    pub fn height(&self) -> u64 {
        self.node.engine().height()
    }

    pub fn set_price(&mut self, pair: &str, price: &str) {
        self.call("setoracleprice", json!([pair, price]));
    }

    pub fn new_address(&mut self, label: &str) -> String {
        self.call("getnewaddress", json!([label]))
            .as_str()
            .expect("address string")
            .to_string()
    }

    pub fn token_id(&self, symbol: &str) -> TokenId {
        self.node
            .engine()
            .state()
            .tokens
            .get_by_symbol(symbol)
            .unwrap_or_else(|| panic!("token {} exists", symbol))
            .id
    }

    /// Vault on `scheme` holding `collateral` deposited from the owner
    pub fn open_vault(&mut self, scheme: &str, collateral: &[&str]) -> TxId {
        let owner = self.owner.clone();
        let id = self.call("createvault", json!([owner, scheme]));
        let id = TxId::parse(id.as_str().expect("vault id")).expect("hex id");
        for amount in collateral {
            self.call("deposittovault", json!([id.as_str(), owner, amount]));
        }
        id
    }

    pub fn take_loan(&mut self, vault: &TxId, amounts: Value) {
        self.call("takeloan", json!([{"vaultId": vault.as_str(), "amounts": amounts}]));
    }

    pub fn vault(&mut self, vault: &TxId) -> Value {
        self.call("getvault", json!([vault.as_str()]))
    }

    pub fn loan(&self, vault: &TxId, symbol: &str) -> Amount {
        let token = self.token_id(symbol);
        self.node
            .engine()
            .state()
            .vaults
            .get(vault)
            .map(|v| v.loans.get(token))
            .unwrap_or(Amount::ZERO)
    }

    pub fn minted(&self, symbol: &str) -> Amount {
        let token = self.token_id(symbol);
        self.node.engine().state().tokens.get(token).map(|t| t.minted).unwrap_or_default()
    }

    pub fn free_float(&self, symbol: &str) -> Amount {
        let token = self.token_id(symbol);
        self.node.engine().state().tokens.get(token).map(|t| t.free_float).unwrap_or_default()
    }

    pub fn balance(&self, owner: &str, symbol: &str) -> Amount {
        let token = self.token_id(symbol);
        let owner = vault_common::Address::parse(owner).expect("address");
        self.node.engine().state().accounts.balance(&owner, token)
    }

    /// Interest accrued up to the tip, not written back
    pub fn accrued(&self, vault: &TxId, symbol: &str) -> HighPrecision {
        let token = self.token_id(symbol);
        interest::accrued_interest(self.node.engine().state(), vault, token).expect("accrual")
    }

    pub fn stored_interest(&mut self, vault: &TxId, symbol: &str) -> Value {
        self.call("getstoredinterest", json!([vault.as_str(), symbol]))
    }
}

pub fn amt(s: &str) -> Amount {
    s.parse().expect("decimal")
}
