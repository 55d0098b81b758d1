//! JSON-RPC style surface over the engine
//!
//! State-changing methods are normalized by [`requests::parse`] and
//! submitted to the tip block; everything else is a read-only view or a
//! chain helper (`generate`, `invalidateblock`, wallet addresses).

pub mod args;
pub mod requests;
pub mod views;

use std::fmt;

use serde::Serialize;
use serde_json::{json, Value};
use vault_common::{Height, LoanError, LoanResult};

use crate::config::EngineConfig;
use crate::engine::Engine;

/// Error returned to RPC callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

impl From<LoanError> for RpcError {
    fn from(e: LoanError) -> Self {
        Self {
            code: e.rpc_code(),
            message: e.to_string(),
        }
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

impl std::error::Error for RpcError {}

/// A single node: engine plus wallet, driven by method calls
pub struct Node {
    engine: Engine,
}

impl Node {
    pub fn new(config: EngineConfig) -> LoanResult<Self> {
        Ok(Self {
            engine: Engine::new(config)?,
        })
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    pub fn call(&mut self, method: &str, params: &[Value]) -> Result<Value, RpcError> {
        log::debug!("rpc {} {:?}", method, params);
        self.dispatch(method, params).map_err(RpcError::from)
    }

    fn dispatch(&mut self, method: &str, params: &[Value]) -> LoanResult<Value> {
        if let Some(request) = requests::parse(method, params)? {
            let txid = self.engine.submit(request)?;
            return Ok(Value::String(txid.to_string()));
        }
        match method {
            "generate" => {
                let blocks = args::get(params, 0)
                    .map(|v| args::height(v, "nblocks"))
                    .transpose()?
                    .unwrap_or(1);
                let reports = self.engine.generate(blocks)?;
                Ok(json!(reports.iter().map(|r| r.height).collect::<Vec<Height>>()))
            }
            "getblockcount" => Ok(json!(self.engine.height())),
            "invalidateblock" => self.invalidate(params),
            "getnewaddress" => {
                let label = args::opt_str(params, 0, "label")?;
                Ok(Value::String(self.engine.new_address(label)?.to_string()))
            }
            "importaddress" => {
                let address = args::address(args::required(params, 0, "address")?, "address")?;
                self.engine.import_address(address);
                Ok(Value::Null)
            }
            _ => self.view(method, params),
        }
    }

    /// Disconnect blocks down to below `height`, or just the tip
    fn invalidate(&mut self, params: &[Value]) -> LoanResult<Value> {
        let target = match args::get(params, 0) {
            Some(v) => args::height(v, "height")?,
            None => self.engine.height(),
        };
        if target == 0 || target > self.engine.height() {
            return Err(LoanError::MalformedArgs(format!(
                "Block height {} out of range",
                target
            )));
        }
        while self.engine.height() >= target {
            self.engine.disconnect_tip()?;
        }
        Ok(json!(self.engine.height()))
    }

    fn view(&self, method: &str, params: &[Value]) -> LoanResult<Value> {
        let state = self.engine.state();
        let config = self.engine.config();
        match method {
            "getvault" => {
                let vault_id = args::txid(args::required(params, 0, "vaultId")?, "vaultId")?;
                let verbose = args::get(params, 1)
                    .map(|v| args::boolean(v, "verbose"))
                    .transpose()?
                    .unwrap_or(false);
                views::get_vault(state, config, &vault_id, verbose)
            }
            "getstoredinterest" => {
                let vault_id = args::txid(args::required(params, 0, "vaultId")?, "vaultId")?;
                let token = args::token_ref(args::required(params, 1, "token")?, "token")?;
                views::get_stored_interest(state, &vault_id, state.tokens.resolve(&token)?.id)
            }
            "listvaults" => {
                let filter = match args::get(params, 0) {
                    Some(v) => {
                        let obj = args::object(v, "options")?;
                        views::VaultFilter {
                            owner: args::opt_string(obj, "ownerAddress")?,
                            scheme_id: args::opt_string(obj, "loanSchemeId")?,
                            state: args::opt_string(obj, "state")?,
                            verbose: args::opt_bool(obj, "verbose")?.unwrap_or(false),
                        }
                    }
                    None => views::VaultFilter::default(),
                };
                let mut page = views::Pagination::default();
                if let Some(v) = args::get(params, 1) {
                    let obj = args::object(v, "pagination")?;
                    if let Some(start) = args::field(obj, "start") {
                        page.start = Some(args::txid(start, "start")?);
                    }
                    page.including_start = args::opt_bool(obj, "including_start")?.unwrap_or(false);
                    if let Some(limit) = args::field(obj, "limit") {
                        page.limit = usize::try_from(args::height(limit, "limit")?).map_err(|_| LoanError::Overflow)?;
                    }
                }
                views::list_vaults(state, config, &filter, &page)
            }
            "getinterest" => {
                let scheme_id = args::str_arg(params, 0, "id")?;
                let token = args::get(params, 1)
                    .map(|v| args::token_ref(v, "token"))
                    .transpose()?
                    .map(|t| state.tokens.resolve(&t).map(|t| t.id))
                    .transpose()?;
                views::get_interest(state, scheme_id, token)
            }
            "listauctions" => views::list_auctions(state),
            "getburninfo" => Ok(views::get_burn_info(state)),
            "gettoken" => {
                let token = args::token_ref(args::required(params, 0, "key")?, "key")?;
                views::get_token(state.tokens.resolve(&token)?)
            }
            "listtokens" => views::list_tokens(state),
            "getloanscheme" => views::get_loan_scheme(state, args::str_arg(params, 0, "id")?),
            "listloanschemes" => Ok(views::list_loan_schemes(state)),
            "getgov" => Ok(views::get_gov(state)),
            "listgovs" => Ok(views::list_govs(state)),
            "getaccount" => {
                let owner = args::address(args::required(params, 0, "owner")?, "owner")?;
                Ok(views::get_account(state, &owner))
            }
            "listfixedintervalprices" => Ok(views::list_fixed_interval_prices(state, config)),
            _ => Err(LoanError::MalformedArgs(format!("Method not found: {}", method))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node() -> Node {
        Node::new(EngineConfig::regtest()).unwrap()
    }

    #[test]
    fn test_unknown_method() {
        let mut node = node();
        let err = node.call("nosuchmethod", &[]).unwrap_err();
        assert_eq!(err.code, vault_common::rpc_code::INVALID_PARAMETER);
    }

    #[test]
    fn test_generate_and_invalidate() {
        let mut node = node();
        node.call("generate", &[json!(3)]).unwrap();
        assert_eq!(node.call("getblockcount", &[]).unwrap(), json!(3));
        node.call("invalidateblock", &[json!(2)]).unwrap();
        assert_eq!(node.call("getblockcount", &[]).unwrap(), json!(1));
        assert!(node.call("invalidateblock", &[json!(5)]).is_err());
    }

    #[test]
    fn test_malformed_args_code() {
        let mut node = node();
        let err = node.call("createvault", &[]).unwrap_err();
        assert_eq!(err.code, vault_common::rpc_code::INVALID_PARAMETER);
    }
}
