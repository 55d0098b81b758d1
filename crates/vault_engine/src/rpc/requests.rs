//! Normalize state-changing RPC calls into canonical requests

use serde_json::Value;
use vault_common::{Address, LoanError, LoanResult};

use crate::events::{
    CreateToken, PaybackLoan, PlaceAuctionBid, Request, SetCollateralToken, SetLoanScheme, SetLoanToken,
    TakeLoan, TokenPayback, TokenUpdateArgs,
};
use crate::state::{AttributeKey, AttributeValue, TokenFlags};

use super::args;

/// `None` when `method` is not a state-changing call
pub fn parse(method: &str, params: &[Value]) -> LoanResult<Option<Request>> {
    let request = match method {
        "createtoken" => create_token(params)?,
        "updatetoken" => {
            let token = args::token_ref(args::required(params, 0, "token")?, "token")?;
            let obj = args::object(args::required(params, 1, "metadata")?, "metadata")?;
            Request::UpdateToken {
                token,
                update: TokenUpdateArgs {
                    symbol: args::opt_string(obj, "symbol")?,
                    name: args::opt_string(obj, "name")?,
                    mintable: args::opt_bool(obj, "mintable")?,
                    tradeable: args::opt_bool(obj, "tradeable")?,
                    finalize: args::opt_bool(obj, "finalize")?.unwrap_or(false),
                },
            }
        }
        "minttokens" => Request::MintTokens {
            amounts: args::token_amounts(args::required(params, 0, "amounts")?, "amounts")?,
            to: args::address(args::required(params, 1, "to")?, "to")?,
        },
        "burntokens" => Request::BurnTokens {
            amounts: args::token_amounts(args::required(params, 0, "amounts")?, "amounts")?,
            from: args::address(args::required(params, 1, "from")?, "from")?,
        },
        "setloantoken" => set_loan_token(params)?,
        "setcollateraltoken" => {
            let obj = args::object(args::required(params, 0, "metadata")?, "metadata")?;
            Request::SetCollateralToken(SetCollateralToken {
                token: args::token_ref(args::required_field(obj, "token")?, "token")?,
                factor: args::decimal(args::required_field(obj, "factor")?, "factor")?,
                price_id: args::as_str(args::required_field(obj, "fixedIntervalPriceId")?, "fixedIntervalPriceId")?
                    .parse()?,
            })
        }
        "createloanscheme" => Request::CreateLoanScheme(loan_scheme(params)?),
        "updateloanscheme" => Request::UpdateLoanScheme(loan_scheme(params)?),
        "setdefaultloanscheme" => Request::SetDefaultLoanScheme {
            id: args::str_arg(params, 0, "id")?.to_string(),
        },
        "destroyloanscheme" => Request::DestroyLoanScheme {
            id: args::str_arg(params, 0, "id")?.to_string(),
            at: args::get(params, 1).map(|v| args::height(v, "height")).transpose()?,
        },
        "setgov" => Request::SetGov {
            changes: attributes(args::required(params, 0, "attributes")?)?,
        },
        "setgovheight" => Request::SetGovHeight {
            changes: attributes(args::required(params, 0, "attributes")?)?,
            height: args::height(args::required(params, 1, "height")?, "height")?,
        },
        "setoracleprice" => Request::SetOraclePrice {
            pair: args::str_arg(params, 0, "pair")?.parse()?,
            price: args::decimal(args::required(params, 1, "price")?, "price")?,
        },
        "utxostoaccount" => utxos_to_account(params)?,
        "createvault" => Request::CreateVault {
            owner: args::address(args::required(params, 0, "ownerAddress")?, "ownerAddress")?,
            scheme_id: args::opt_str(params, 1, "loanSchemeId")?.map(str::to_string),
        },
        "updatevault" => {
            let obj = args::object(args::required(params, 1, "parameters")?, "parameters")?;
            let owner = args::field(obj, "ownerAddress")
                .map(|v| args::address(v, "ownerAddress"))
                .transpose()?;
            let scheme_id = args::opt_string(obj, "loanSchemeId")?;
            if owner.is_none() && scheme_id.is_none() {
                return Err(LoanError::MalformedArgs(
                    "At least ownerAddress OR loanSchemeId must be set".to_string(),
                ));
            }
            Request::UpdateVault {
                vault_id: args::txid(args::required(params, 0, "vaultId")?, "vaultId")?,
                owner,
                scheme_id,
            }
        }
        "deposittovault" => Request::DepositToVault {
            vault_id: args::txid(args::required(params, 0, "vaultId")?, "vaultId")?,
            from: args::address(args::required(params, 1, "from")?, "from")?,
            amount: args::token_amount(args::required(params, 2, "amount")?, "amount")?,
        },
        "withdrawfromvault" => Request::WithdrawFromVault {
            vault_id: args::txid(args::required(params, 0, "vaultId")?, "vaultId")?,
            to: args::address(args::required(params, 1, "to")?, "to")?,
            amount: args::token_amount(args::required(params, 2, "amount")?, "amount")?,
        },
        "closevault" => Request::CloseVault {
            vault_id: args::txid(args::required(params, 0, "vaultId")?, "vaultId")?,
            to: args::address(args::required(params, 1, "to")?, "to")?,
        },
        "takeloan" => {
            let obj = args::object(args::required(params, 0, "metadata")?, "metadata")?;
            Request::TakeLoan(TakeLoan {
                vault_id: args::txid(args::required_field(obj, "vaultId")?, "vaultId")?,
                to: args::field(obj, "to").map(|v| args::address(v, "to")).transpose()?,
                amounts: args::token_amounts(args::required_field(obj, "amounts")?, "amounts")?,
            })
        }
        "paybackloan" => payback_loan(params)?,
        "paybackwithcollateral" => Request::PaybackWithCollateral {
            vault_id: args::txid(args::required(params, 0, "vaultId")?, "vaultId")?,
        },
        "placeauctionbid" => Request::PlaceAuctionBid(PlaceAuctionBid {
            vault_id: args::txid(args::required(params, 0, "vaultId")?, "vaultId")?,
            index: args::ratio(args::required(params, 1, "index")?, "index")?,
            from: args::address(args::required(params, 2, "from")?, "from")?,
            amount: args::token_amount(args::required(params, 3, "amount")?, "amount")?,
        }),
        _ => return Ok(None),
    };
    Ok(Some(request))
}

fn create_token(params: &[Value]) -> LoanResult<Request> {
    let obj = args::object(args::required(params, 0, "metadata")?, "metadata")?;
    let symbol = args::as_str(args::required_field(obj, "symbol")?, "symbol")?.to_string();
    Ok(Request::CreateToken(CreateToken {
        name: args::opt_string(obj, "name")?.unwrap_or_else(|| symbol.clone()),
        flags: TokenFlags {
            is_dat: args::opt_bool(obj, "isDAT")?.unwrap_or(false),
            mintable: args::opt_bool(obj, "mintable")?.unwrap_or(true),
            tradeable: args::opt_bool(obj, "tradeable")?.unwrap_or(true),
            ..TokenFlags::default()
        },
        owner: args::field(obj, "collateralAddress")
            .map(|v| args::address(v, "collateralAddress"))
            .transpose()?,
        symbol,
    }))
}

fn set_loan_token(params: &[Value]) -> LoanResult<Request> {
    let obj = args::object(args::required(params, 0, "metadata")?, "metadata")?;
    let symbol = args::as_str(args::required_field(obj, "symbol")?, "symbol")?.to_string();
    Ok(Request::SetLoanToken(SetLoanToken {
        name: args::opt_string(obj, "name")?.unwrap_or_else(|| symbol.clone()),
        price_id: args::as_str(args::required_field(obj, "fixedIntervalPriceId")?, "fixedIntervalPriceId")?
            .parse()?,
        mintable: args::opt_bool(obj, "mintable")?.unwrap_or(true),
        interest: args::field(obj, "interest")
            .map(|v| args::decimal(v, "interest"))
            .transpose()?
            .unwrap_or_default(),
        symbol,
    }))
}

fn loan_scheme(params: &[Value]) -> LoanResult<SetLoanScheme> {
    Ok(SetLoanScheme {
        ratio: args::ratio(args::required(params, 0, "mincolratio")?, "mincolratio")?,
        rate: args::decimal(args::required(params, 1, "interestrate")?, "interestrate")?,
        id: args::str_arg(params, 2, "id")?.to_string(),
        activate_at: args::get(params, 3).map(|v| args::height(v, "ACTIVATE_AFTER_BLOCK")).transpose()?,
    })
}

fn attributes(value: &Value) -> LoanResult<Vec<(AttributeKey, AttributeValue)>> {
    let obj = args::object(value, "attributes")?;
    let mut changes = Vec::with_capacity(obj.len());
    for (key, raw) in obj {
        let key: AttributeKey = key.parse()?;
        let value = key.parse_value(&args::attribute_text(raw, "attributes")?)?;
        changes.push((key, value));
    }
    Ok(changes)
}

fn utxos_to_account(params: &[Value]) -> LoanResult<Request> {
    let obj = args::object(args::required(params, 0, "amounts")?, "amounts")?;
    let mut entries = obj.iter();
    let (Some((to, amount)), None) = (entries.next(), entries.next()) else {
        return Err(LoanError::MalformedArgs(
            "utxostoaccount takes exactly one {address: amount} entry".to_string(),
        ));
    };
    Ok(Request::UtxosToAccount {
        to: Address::parse(to)?,
        amount: args::token_amount(amount, "amount")?,
    })
}

fn payback_loan(params: &[Value]) -> LoanResult<Request> {
    let obj = args::object(args::required(params, 0, "metadata")?, "metadata")?;
    let vault_id = args::txid(args::required_field(obj, "vaultId")?, "vaultId")?;
    let from = args::address(args::required_field(obj, "from")?, "from")?;

    let mut loans = Vec::new();
    if let Some(amounts) = args::field(obj, "amounts") {
        for amount in args::token_amounts(amounts, "amounts")? {
            loans.push(TokenPayback {
                loan_token: amount.token.clone(),
                amount,
            });
        }
    }
    if let Some(entries) = args::field(obj, "loans") {
        let entries = entries
            .as_array()
            .ok_or_else(|| LoanError::MalformedArgs("loans must be an array".to_string()))?;
        for entry in entries {
            let entry = args::object(entry, "loans")?;
            let loan_token = args::token_ref(args::required_field(entry, "dToken")?, "dToken")?;
            for amount in args::token_amounts(args::required_field(entry, "amounts")?, "amounts")? {
                loans.push(TokenPayback {
                    loan_token: loan_token.clone(),
                    amount,
                });
            }
        }
    }
    if loans.is_empty() {
        return Err(LoanError::MalformedArgs("amounts or loans must be given".to_string()));
    }
    Ok(Request::PaybackLoan(PaybackLoan { vault_id, from, loans }))
}
