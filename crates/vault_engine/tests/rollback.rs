//! Disconnecting blocks restores every observable view

mod common;

use common::{amt, Fixture};
use serde_json::{json, Value};
use vault_common::Address;
use vault_engine::{tx_id, Request};

/// Everything an RPC caller can see, in one value
fn snapshot(fx: &mut Fixture) -> Value {
    let owner = fx.owner.clone();
    json!({
        "height": fx.call("getblockcount", json!([])),
        "vaults": fx.call("listvaults", json!([{"verbose": true}])),
        "auctions": fx.call("listauctions", json!([])),
        "burn": fx.call("getburninfo", json!([])),
        "tokens": fx.call("listtokens", json!([])),
        "schemes": fx.call("listloanschemes", json!([])),
        "govs": fx.call("listgovs", json!([])),
        "prices": fx.call("listfixedintervalprices", json!([])),
        "account": fx.call("getaccount", json!([owner])),
    })
}

#[test]
fn test_invalidate_undoes_liquidation_and_auction() {
    let mut fx = Fixture::dusd_market();
    fx.set_price("TSLA/USD", "100");
    fx.call(
        "setloantoken",
        json!([{"symbol": "TSLA", "fixedIntervalPriceId": "TSLA/USD"}]),
    );
    fx.call("createloanscheme", json!([150, "0", "ZERO150"]));
    let vault = fx.open_vault("ZERO150", &["150@DFI"]);
    fx.take_loan(&vault, json!("1@TSLA"));
    fx.generate(1);

    let fork_point = fx.height();
    let before = snapshot(&mut fx);

    fx.generate(1);
    fx.set_price("TSLA/USD", "120");
    let bidder = fx.new_address("bidder");
    fx.call("minttokens", json!(["2@TSLA", bidder]));
    for _ in 0..24 {
        fx.generate(1);
        if fx.vault(&vault)["state"] == json!("inLiquidation") {
            break;
        }
    }
    assert_eq!(fx.vault(&vault)["state"], json!("inLiquidation"));
    fx.call("placeauctionbid", json!([vault.as_str(), 0, bidder, "1.05@TSLA"]));
    fx.generate(40);
    assert_eq!(fx.balance(&bidder, "DFI"), amt("150"));

    fx.call("invalidateblock", json!([fork_point + 1]));
    assert_eq!(fx.height(), fork_point);
    assert_eq!(snapshot(&mut fx), before);
    assert_eq!(fx.balance(&bidder, "TSLA"), amt("0"));
    assert_eq!(fx.minted("TSLA"), amt("1"));

    // the chain keeps going from the restored tip
    fx.generate(12);
    assert_eq!(fx.vault(&vault)["state"], json!("active"));
}

#[test]
fn test_invalidate_restores_interest_and_queued_changes() {
    let mut fx = Fixture::dusd_market();
    let vault = fx.open_vault("LOAN150", &["10@DFI"]);
    fx.take_loan(&vault, json!("1@DUSD"));
    fx.generate(1);
    let fork_point = fx.height();
    let stored = fx.stored_interest(&vault, "DUSD");
    let before = snapshot(&mut fx);

    fx.generate(1);
    let dusd = fx.token_id("DUSD");
    fx.call(
        "setgovheight",
        json!([{ format!("v0/token/{}/loan_minting_interest", dusd): "5" }, fx.height() + 2]),
    );
    fx.call("updateloanscheme", json!([150, "4", "LOAN150"]));
    fx.generate(5);
    assert_ne!(fx.stored_interest(&vault, "DUSD"), stored);

    fx.call("invalidateblock", json!([fork_point + 1]));
    assert_eq!(fx.stored_interest(&vault, "DUSD"), stored);
    assert_eq!(snapshot(&mut fx), before);
}

#[test]
fn test_failed_block_is_disconnected_whole() {
    let mut fx = Fixture::dusd_market();
    let before = snapshot(&mut fx);
    let height = fx.height();

    let receiver = Address::parse("receiver").unwrap();
    let missing_vault = tx_id(height, 99, "createvault");
    let err = fx
        .node
        .engine_mut()
        .connect_block(vec![
            Request::MintTokens {
                to: receiver.clone(),
                amounts: vec!["5@DUSD".parse().unwrap()],
            },
            Request::CloseVault {
                vault_id: missing_vault,
                to: receiver,
            },
        ])
        .unwrap_err();
    assert!(!err.is_fatal());

    assert_eq!(fx.height(), height);
    assert_eq!(snapshot(&mut fx), before);
    assert_eq!(fx.minted("DUSD"), amt("0"));
}

#[test]
fn test_connect_block_accepts_foreign_signers() {
    let mut fx = Fixture::dusd_market();
    let outsider = Address::parse("outsider").unwrap();
    let (report, txids) = fx
        .node
        .engine_mut()
        .connect_block(vec![
            Request::UtxosToAccount {
                to: outsider.clone(),
                amount: "10@DFI".parse().unwrap(),
            },
            Request::CreateVault {
                owner: outsider.clone(),
                scheme_id: None,
            },
        ])
        .unwrap();
    assert_eq!(report.height, fx.height());
    assert_eq!(txids.len(), 2);

    let listed = fx.call("listvaults", json!([{"ownerAddress": outsider.as_str()}]));
    assert_eq!(listed[0]["vaultId"], json!(txids[1].as_str()));

    // the wallet still cannot act for the outsider
    let err = fx
        .try_call("deposittovault", json!([txids[1].as_str(), outsider.as_str(), "1@DFI"]))
        .unwrap_err();
    assert_eq!(err.code, vault_common::rpc_code::VERIFY_REJECTED);
}
