//! JSON views over the consensus state

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{json, Value};
use vault_common::{Amount, Basket, Height, HighPrecision, LoanError, LoanResult, Rounding, TokenId, VaultId};

use crate::config::EngineConfig;
use crate::interest;
use crate::state::{AuctionBatch, ConsensusState, LoanScheme, Token, Vault, VaultStatus};
use crate::valuation;

fn symbol(state: &ConsensusState, token: TokenId) -> String {
    state
        .tokens
        .get(token)
        .map(Token::display_symbol)
        .unwrap_or_else(|| token.to_string())
}

fn amount_str<const D: u32>(state: &ConsensusState, token: TokenId, amount: vault_common::Fixed<D>) -> String {
    format!("{}@{}", amount, symbol(state, token))
}

fn basket_strs(state: &ConsensusState, basket: &Basket) -> Vec<String> {
    basket
        .iter()
        .map(|(token, amount)| amount_str(state, token, amount))
        .collect()
}

/// Reported vault state, `frozen` when prices are stale or a loan token is locked
pub fn state_label(state: &ConsensusState, config: &EngineConfig, vault: &Vault) -> &'static str {
    if vault.is_in_liquidation() {
        return "inLiquidation";
    }
    let locked = vault.loans.tokens().into_iter().any(|t| state.attributes.is_locked(t));
    let live = vault
        .collateral
        .tokens()
        .into_iter()
        .chain(vault.loans.tokens())
        .all(|t| valuation::token_price(state, config, t).is_ok_and(|p| p.is_live));
    if locked || !live {
        return "frozen";
    }
    match vault.status {
        VaultStatus::MayLiquidate => "mayLiquidate",
        _ => "active",
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BidView {
    owner: String,
    amount: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchView {
    index: u32,
    collaterals: Vec<String>,
    loan: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    highest_bid: Option<BidView>,
}

fn batch_view(state: &ConsensusState, batch: &AuctionBatch) -> BatchView {
    BatchView {
        index: batch.index,
        collaterals: basket_strs(state, &batch.collaterals),
        loan: amount_str(state, batch.loan_token, batch.loan_amount),
        highest_bid: batch.best_bid.as_ref().map(|bid| BidView {
            owner: bid.owner.to_string(),
            amount: amount_str(state, bid.token, bid.amount),
        }),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VaultView {
    vault_id: String,
    loan_scheme_id: String,
    owner_address: String,
    state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    liquidation_height: Option<Height>,
    #[serde(skip_serializing_if = "Option::is_none")]
    liquidation_penalty: Option<Amount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    batch_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    batches: Option<Vec<BatchView>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    collateral_amounts: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    loan_amounts: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    interest_amounts: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    collateral_value: Option<Amount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    loan_value: Option<Amount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    interest_value: Option<Amount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    informative_ratio: Option<Amount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    collateral_ratio: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_collateral_ratio: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    interests_per_block: Option<Vec<String>>,
}

fn penalty_pct(penalty: Amount) -> LoanResult<Amount> {
    Ok(penalty.checked_mul_int(100)?)
}

fn vault_view(state: &ConsensusState, config: &EngineConfig, vault: &Vault, verbose: bool) -> LoanResult<VaultView> {
    let mut view = VaultView {
        vault_id: vault.id.to_string(),
        loan_scheme_id: vault.scheme_id.clone(),
        owner_address: vault.owner.to_string(),
        state: state_label(state, config, vault),
        liquidation_height: None,
        liquidation_penalty: None,
        batch_count: None,
        batches: None,
        collateral_amounts: None,
        loan_amounts: None,
        interest_amounts: None,
        collateral_value: None,
        loan_value: None,
        interest_value: None,
        informative_ratio: None,
        collateral_ratio: None,
        next_collateral_ratio: None,
        interests_per_block: None,
    };

    if let Some(liquidation) = &vault.liquidation {
        view.liquidation_height = vault.liquidation_height;
        view.liquidation_penalty = Some(penalty_pct(liquidation.penalty)?);
        view.batch_count = Some(liquidation.batches.len());
        view.batches = Some(liquidation.batches.iter().map(|b| batch_view(state, b)).collect());
        return Ok(view);
    }

    let mut loan_amounts = Vec::new();
    let mut interest_amounts = Vec::new();
    let mut per_block = Vec::new();
    let mut interest_value = Amount::ZERO;
    for (token, principal) in vault.loans.iter() {
        let reported = interest::reported(interest::accrued_interest(state, &vault.id, token)?)?;
        loan_amounts.push(amount_str(state, token, principal.checked_add(reported)?.max(Amount::ZERO)));
        interest_amounts.push(amount_str(state, token, reported));
        let ipb = state
            .interest
            .get(&vault.id, token)
            .map(|r| r.ipb)
            .unwrap_or(HighPrecision::ZERO);
        per_block.push(amount_str(state, token, ipb));
        if let Ok(price) = valuation::token_price(state, config, token) {
            interest_value = interest_value.checked_add(reported.mul(price.active, Rounding::Ceil)?)?;
        }
    }
    view.collateral_amounts = Some(basket_strs(state, &vault.collateral));
    view.loan_amounts = Some(loan_amounts);
    view.interest_amounts = Some(interest_amounts);

    let unknown = Amount::from_raw(-Amount::SCALE);
    match valuation::value_vault(state, config, vault, false) {
        Ok(values) => {
            view.collateral_value = Some(values.active.collateral);
            view.loan_value = Some(values.active.loans);
            view.interest_value = Some(interest_value);
            view.informative_ratio = Some(values.active.informative_ratio());
            view.collateral_ratio = Some(values.active.ratio());
            if verbose {
                view.next_collateral_ratio = Some(values.next.ratio());
            }
        }
        Err(LoanError::PriceNotLive(_)) => {
            view.collateral_value = Some(unknown);
            view.loan_value = Some(unknown);
            view.interest_value = Some(unknown);
            view.informative_ratio = Some(unknown);
            view.collateral_ratio = Some(-1);
            if verbose {
                view.next_collateral_ratio = Some(-1);
            }
        }
        Err(e) => return Err(e),
    }
    if verbose {
        view.interests_per_block = Some(per_block);
    }
    Ok(view)
}

pub fn get_vault(state: &ConsensusState, config: &EngineConfig, vault_id: &VaultId, verbose: bool) -> LoanResult<Value> {
    let vault = state.vaults.require(vault_id)?;
    to_value(&vault_view(state, config, vault, verbose)?)
}

/// Stored checkpoint, not brought to the current height
pub fn get_stored_interest(state: &ConsensusState, vault_id: &VaultId, token: TokenId) -> LoanResult<Value> {
    state.vaults.require(vault_id)?;
    let record = state.interest.get(vault_id, token).copied().unwrap_or_default();
    Ok(json!({
        "interestPerBlock": record.ipb.to_string(),
        "interestToHeight": record.ith.to_string(),
        "height": record.height,
    }))
}

/// `listvaults` filter
#[derive(Debug, Clone, Default)]
pub struct VaultFilter {
    pub owner: Option<String>,
    pub scheme_id: Option<String>,
    pub state: Option<String>,
    pub verbose: bool,
}

/// `listvaults` pagination
#[derive(Debug, Clone)]
pub struct Pagination {
    pub start: Option<VaultId>,
    pub including_start: bool,
    pub limit: usize,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            start: None,
            including_start: false,
            limit: 100,
        }
    }
}

pub fn list_vaults(
    state: &ConsensusState,
    config: &EngineConfig,
    filter: &VaultFilter,
    page: &Pagination,
) -> LoanResult<Value> {
    let mut out = Vec::new();
    for vault in state.vaults.iter() {
        if out.len() >= page.limit {
            break;
        }
        if let Some(start) = &page.start {
            if vault.id < *start || (vault.id == *start && !page.including_start) {
                continue;
            }
        }
        if filter.owner.as_deref().is_some_and(|o| o != vault.owner.as_str()) {
            continue;
        }
        if filter.scheme_id.as_deref().is_some_and(|s| s != vault.scheme_id) {
            continue;
        }
        let label = state_label(state, config, vault);
        if filter.state.as_deref().is_some_and(|s| !s.eq_ignore_ascii_case(label)) {
            continue;
        }
        if filter.verbose {
            out.push(to_value(&vault_view(state, config, vault, false)?)?);
        } else {
            out.push(json!({
                "vaultId": vault.id.to_string(),
                "ownerAddress": vault.owner.to_string(),
                "loanSchemeId": vault.scheme_id,
                "state": label,
            }));
        }
    }
    Ok(Value::Array(out))
}

/// Per-token interest aggregates of the vaults bound to a scheme
pub fn get_interest(
    state: &ConsensusState,
    scheme_id: &str,
    token: Option<TokenId>,
) -> LoanResult<Value> {
    state.schemes.require(scheme_id)?;
    let mut totals: BTreeMap<TokenId, (Amount, HighPrecision)> = BTreeMap::new();
    for vault_id in state.vaults.bound_to(scheme_id) {
        for (t, record) in state.interest.for_vault(&vault_id) {
            if token.is_some_and(|wanted| wanted != t) {
                continue;
            }
            let reported = interest::reported(interest::accrued_to(&record, state.height)?)?;
            let entry = totals.entry(t).or_insert((Amount::ZERO, HighPrecision::ZERO));
            entry.0 = entry.0.checked_add(reported)?;
            entry.1 = entry.1.checked_add(record.ipb)?;
        }
    }
    let mut out = Vec::with_capacity(totals.len());
    for (t, (total, ipb)) in totals {
        out.push(json!({
            "token": symbol(state, t),
            "totalInterest": total,
            "interestPerBlock": ipb.to_string(),
            "realizedInterestPerBlock": ipb.rescale::<8>(Rounding::TowardZero)?,
        }));
    }
    Ok(Value::Array(out))
}

pub fn list_auctions(state: &ConsensusState) -> LoanResult<Value> {
    let mut out = Vec::new();
    for vault in state.vaults.iter().filter(|v| v.is_in_liquidation()) {
        let Some(liquidation) = &vault.liquidation else {
            continue;
        };
        let batches: Vec<BatchView> = liquidation.batches.iter().map(|b| batch_view(state, b)).collect();
        out.push(json!({
            "vaultId": vault.id.to_string(),
            "loanSchemeId": vault.scheme_id,
            "ownerAddress": vault.owner.to_string(),
            "state": "inLiquidation",
            "liquidationHeight": vault.liquidation_height,
            "batchCount": liquidation.batches.len(),
            "liquidationPenalty": penalty_pct(liquidation.penalty)?,
            "batches": batches,
        }));
    }
    Ok(Value::Array(out))
}

pub fn get_burn_info(state: &ConsensusState) -> Value {
    let info = &state.burn_info;
    json!({
        "vaultFees": info.vault_fees,
        "paybackTokens": basket_strs(state, &info.payback_tokens),
        "paybackFees": basket_strs(state, &info.payback_fees),
        "paybackBurn": basket_strs(state, &info.payback_burn),
        "auctionPenalties": basket_strs(state, &info.auction_penalties),
        "auctionBurn": basket_strs(state, &info.auction_burn),
        "badDebt": basket_strs(state, &info.bad_debt),
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenView<'a> {
    symbol: &'a str,
    symbol_key: String,
    name: &'a str,
    #[serde(rename = "isDAT")]
    is_dat: bool,
    is_loan_token: bool,
    is_collateral_token: bool,
    mintable: bool,
    tradeable: bool,
    finalized: bool,
    minted: Amount,
    creation_height: Height,
    #[serde(skip_serializing_if = "Option::is_none")]
    destruction_height: Option<Height>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fixed_interval_price_id: Option<String>,
    collateral_factor: Amount,
    interest: Amount,
}

fn token_view(token: &Token) -> TokenView<'_> {
    TokenView {
        symbol: &token.symbol,
        symbol_key: token.display_symbol(),
        name: &token.name,
        is_dat: token.flags.is_dat,
        is_loan_token: token.flags.is_loan_token,
        is_collateral_token: token.flags.is_collateral_token,
        mintable: token.flags.mintable,
        tradeable: token.flags.tradeable,
        finalized: token.flags.finalized,
        minted: token.minted,
        creation_height: token.creation_height,
        destruction_height: token.descendant.map(|(_, h)| h),
        fixed_interval_price_id: token.fixed_interval_price_id.as_ref().map(|p| p.to_string()),
        collateral_factor: token.collateral_factor,
        interest: token.interest,
    }
}

pub fn get_token(token: &Token) -> LoanResult<Value> {
    let mut out = serde_json::Map::new();
    out.insert(token.id.to_string(), to_value(&token_view(token))?);
    Ok(Value::Object(out))
}

pub fn list_tokens(state: &ConsensusState) -> LoanResult<Value> {
    let mut out = serde_json::Map::new();
    for token in state.tokens.iter() {
        out.insert(token.id.to_string(), to_value(&token_view(token))?);
    }
    Ok(Value::Object(out))
}

fn scheme_view(state: &ConsensusState, scheme: &LoanScheme) -> Value {
    json!({
        "id": scheme.id,
        "mincolratio": scheme.min_col_ratio,
        "interestrate": scheme.rate,
        "default": state.schemes.default_id() == Some(scheme.id.as_str()),
    })
}

pub fn get_loan_scheme(state: &ConsensusState, id: &str) -> LoanResult<Value> {
    Ok(scheme_view(state, state.schemes.require(id)?))
}

pub fn list_loan_schemes(state: &ConsensusState) -> Value {
    let mut schemes: Vec<&LoanScheme> = state.schemes.iter().collect();
    schemes.sort_by(|a, b| (a.min_col_ratio, a.rate).cmp(&(b.min_col_ratio, b.rate)));
    Value::Array(schemes.into_iter().map(|s| scheme_view(state, s)).collect())
}

pub fn get_gov(state: &ConsensusState) -> Value {
    let attributes: serde_json::Map<String, Value> = state
        .attributes
        .iter()
        .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
        .collect();
    json!({ "ATTRIBUTES": attributes })
}

/// Effective attributes plus the changes queued per height
pub fn list_govs(state: &ConsensusState) -> Value {
    let mut pending = serde_json::Map::new();
    for (height, changes) in state.attributes.pending() {
        let entries: serde_json::Map<String, Value> = changes
            .iter()
            .map(|c| (c.key.to_string(), Value::String(c.value.to_string())))
            .collect();
        pending.insert(height.to_string(), Value::Object(entries));
    }
    json!({ "ATTRIBUTES": get_gov(state)["ATTRIBUTES"].clone(), "pending": pending })
}

pub fn get_account(state: &ConsensusState, owner: &vault_common::Address) -> Value {
    Value::Array(
        basket_strs(state, &state.accounts.balances_of(owner))
            .into_iter()
            .map(Value::String)
            .collect(),
    )
}

pub fn list_fixed_interval_prices(state: &ConsensusState, config: &EngineConfig) -> Value {
    let prices: Vec<Value> = state
        .prices
        .iter()
        .map(|p| {
            let live = state
                .prices
                .get_valid_price(&p.pair, config.price_deviation)
                .is_ok_and(|v| v.is_live);
            json!({
                "priceFeedId": p.pair.to_string(),
                "activePrice": p.active,
                "nextPrice": p.next,
                "activePriceBlock": p.active_height,
                "nextPriceBlock": crate::liquidation::next_boundary(p.active_height, config.fixed_interval_blocks),
                "lastUpdate": p.last_update,
                "isLive": live,
            })
        })
        .collect();
    Value::Array(prices)
}

fn to_value<T: Serialize>(value: &T) -> LoanResult<Value> {
    serde_json::to_value(value).map_err(|e| LoanError::InvariantBreach(format!("cannot render view: {}", e)))
}
