//! Canonical requests and their handlers
//!
//! Every inbound event is normalized into a [`Request`] before it touches
//! state. Handlers bring interest checkpoints current, mutate the views,
//! validate against prices and schemes, and leave post-state
//! classification to the liquidation monitor.

pub mod block;
pub mod governance;
pub mod loans;
pub mod split;
pub mod vaults;

use std::collections::BTreeSet;

use vault_common::{Address, Amount, CurrencyPair, Height, LoanError, LoanResult, TokenAmount, TokenRef, TxId, VaultId};

use crate::config::EngineConfig;
use crate::state::{AttributeKey, AttributeValue, ConsensusState, TokenFlags, TokenUpdate};

/// Who may sign for which address while applying one event
#[derive(Debug, Clone, Copy)]
pub struct EventContext<'a> {
    pub txid: &'a TxId,
    /// Addresses the local wallet can sign for; `None` trusts every signer
    pub wallet: Option<&'a BTreeSet<Address>>,
}

impl EventContext<'_> {
    pub fn authorize(&self, address: &Address) -> LoanResult<()> {
        match self.wallet {
            Some(wallet) if !wallet.contains(address) => Err(LoanError::Authorization(format!(
                "Incorrect authorization for {}",
                address
            ))),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateToken {
    pub symbol: String,
    pub name: String,
    pub flags: TokenFlags,
    /// Only this holder may mint
    pub owner: Option<Address>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetLoanToken {
    pub symbol: String,
    pub name: String,
    pub price_id: CurrencyPair,
    pub mintable: bool,
    pub interest: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCollateralToken {
    pub token: TokenRef,
    pub factor: Amount,
    pub price_id: CurrencyPair,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetLoanScheme {
    pub ratio: u32,
    pub rate: Amount,
    pub id: String,
    pub activate_at: Option<Height>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TakeLoan {
    pub vault_id: VaultId,
    pub to: Option<Address>,
    pub amounts: Vec<TokenAmount>,
}

/// Payment in `amount.token` against the loan in `loan_token`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPayback {
    pub loan_token: TokenRef,
    pub amount: TokenAmount,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaybackLoan {
    pub vault_id: VaultId,
    pub from: Address,
    pub loans: Vec<TokenPayback>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceAuctionBid {
    pub vault_id: VaultId,
    pub index: u32,
    pub from: Address,
    pub amount: TokenAmount,
}

/// Canonical form of every state-changing event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    CreateToken(CreateToken),
    UpdateToken { token: TokenRef, update: TokenUpdateArgs },
    MintTokens { to: Address, amounts: Vec<TokenAmount> },
    BurnTokens { from: Address, amounts: Vec<TokenAmount> },
    SetLoanToken(SetLoanToken),
    SetCollateralToken(SetCollateralToken),
    CreateLoanScheme(SetLoanScheme),
    UpdateLoanScheme(SetLoanScheme),
    SetDefaultLoanScheme { id: String },
    DestroyLoanScheme { id: String, at: Option<Height> },
    SetGov { changes: Vec<(AttributeKey, AttributeValue)> },
    SetGovHeight { changes: Vec<(AttributeKey, AttributeValue)>, height: Height },
    SetOraclePrice { pair: CurrencyPair, price: Amount },
    UtxosToAccount { to: Address, amount: TokenAmount },
    CreateVault { owner: Address, scheme_id: Option<String> },
    UpdateVault { vault_id: VaultId, owner: Option<Address>, scheme_id: Option<String> },
    DepositToVault { vault_id: VaultId, from: Address, amount: TokenAmount },
    WithdrawFromVault { vault_id: VaultId, to: Address, amount: TokenAmount },
    CloseVault { vault_id: VaultId, to: Address },
    TakeLoan(TakeLoan),
    PaybackLoan(PaybackLoan),
    PaybackWithCollateral { vault_id: VaultId },
    PlaceAuctionBid(PlaceAuctionBid),
}

/// `updatetoken` fields as given by the caller
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenUpdateArgs {
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub mintable: Option<bool>,
    pub tradeable: Option<bool>,
    pub finalize: bool,
}

impl From<TokenUpdateArgs> for TokenUpdate {
    fn from(args: TokenUpdateArgs) -> Self {
        TokenUpdate {
            symbol: args.symbol,
            name: args.name,
            mintable: args.mintable,
            tradeable: args.tradeable,
            finalize: args.finalize,
        }
    }
}

impl Request {
    /// RPC method name of the request
    pub fn method(&self) -> &'static str {
        match self {
            Request::CreateToken(_) => "createtoken",
            Request::UpdateToken { .. } => "updatetoken",
            Request::MintTokens { .. } => "minttokens",
            Request::BurnTokens { .. } => "burntokens",
            Request::SetLoanToken(_) => "setloantoken",
            Request::SetCollateralToken(_) => "setcollateraltoken",
            Request::CreateLoanScheme(_) => "createloanscheme",
            Request::UpdateLoanScheme(_) => "updateloanscheme",
            Request::SetDefaultLoanScheme { .. } => "setdefaultloanscheme",
            Request::DestroyLoanScheme { .. } => "destroyloanscheme",
            Request::SetGov { .. } => "setgov",
            Request::SetGovHeight { .. } => "setgovheight",
            Request::SetOraclePrice { .. } => "setoracleprice",
            Request::UtxosToAccount { .. } => "utxostoaccount",
            Request::CreateVault { .. } => "createvault",
            Request::UpdateVault { .. } => "updatevault",
            Request::DepositToVault { .. } => "deposittovault",
            Request::WithdrawFromVault { .. } => "withdrawfromvault",
            Request::CloseVault { .. } => "closevault",
            Request::TakeLoan(_) => "takeloan",
            Request::PaybackLoan(_) => "paybackloan",
            Request::PaybackWithCollateral { .. } => "paybackwithcollateral",
            Request::PlaceAuctionBid(_) => "placeauctionbid",
        }
    }
}

/// Apply one request against the state. The caller owns atomicity.
pub fn apply(
    state: &mut ConsensusState,
    config: &EngineConfig,
    ctx: &EventContext<'_>,
    request: Request,
) -> LoanResult<()> {
    match request {
        Request::CreateToken(req) => governance::create_token(state, req),
        Request::UpdateToken { token, update } => governance::update_token(state, &token, update),
        Request::MintTokens { to, amounts } => governance::mint_tokens(state, ctx, &to, &amounts),
        Request::BurnTokens { from, amounts } => governance::burn_tokens(state, ctx, &from, &amounts),
        Request::SetLoanToken(req) => governance::set_loan_token(state, config, req),
        Request::SetCollateralToken(req) => governance::set_collateral_token(state, config, req),
        Request::CreateLoanScheme(req) => governance::create_loan_scheme(state, req),
        Request::UpdateLoanScheme(req) => governance::update_loan_scheme(state, config, req),
        Request::SetDefaultLoanScheme { id } => governance::set_default_loan_scheme(state, &id),
        Request::DestroyLoanScheme { id, at } => governance::destroy_loan_scheme(state, &id, at),
        Request::SetGov { changes } => governance::set_gov(state, config, changes),
        Request::SetGovHeight { changes, height } => governance::set_gov_height(state, changes, height),
        Request::SetOraclePrice { pair, price } => {
            let height = state.height;
            state.prices.submit(&mut state.journal, &pair, price, height)
        }
        Request::UtxosToAccount { to, amount } => governance::utxos_to_account(state, &to, &amount),
        Request::CreateVault { owner, scheme_id } => {
            vaults::create_vault(state, config, ctx, owner, scheme_id).map(|_| ())
        }
        Request::UpdateVault {
            vault_id,
            owner,
            scheme_id,
        } => vaults::update_vault(state, config, ctx, &vault_id, owner, scheme_id),
        Request::DepositToVault {
            vault_id,
            from,
            amount,
        } => vaults::deposit(state, ctx, &vault_id, &from, &amount),
        Request::WithdrawFromVault { vault_id, to, amount } => {
            vaults::withdraw(state, config, ctx, &vault_id, &to, &amount)
        }
        Request::CloseVault { vault_id, to } => vaults::close_vault(state, config, ctx, &vault_id, &to),
        Request::TakeLoan(req) => loans::take_loan(state, config, ctx, req),
        Request::PaybackLoan(req) => loans::payback_loan(state, config, ctx, req),
        Request::PaybackWithCollateral { vault_id } => {
            loans::payback_with_collateral(state, config, ctx, &vault_id)
        }
        Request::PlaceAuctionBid(req) => loans::place_auction_bid(state, config, ctx, req),
    }
}
