//! Liquidation state machine and auctions

mod common;

use common::{amt, Fixture};
use serde_json::{json, Value};
use vault_common::{rpc_code, TxId};

/// TSLA at 100 USD with no interest anywhere, one vault at exactly 150%
fn vault_at_min_ratio() -> (Fixture, TxId) {
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
    assert_eq!(fx.vault(&vault)["collateralRatio"], json!(150));
    (fx, vault)
}

/// Generate one block at a time until the vault reports `state`
fn generate_until(fx: &mut Fixture, vault: &TxId, state: &str, max_blocks: u64) -> Value {
    for _ in 0..max_blocks {
        fx.generate(1);
        let view = fx.vault(vault);
        if view["state"] == json!(state) {
            return view;
        }
    }
    panic!("vault never reached {} within {} blocks", state, max_blocks);
}

#[test]
fn test_price_rise_liquidates_vault() {
    let (mut fx, vault) = vault_at_min_ratio();
    assert_eq!(fx.minted("TSLA"), amt("1"));

    fx.set_price("TSLA/USD", "120");
    let view = generate_until(&mut fx, &vault, "mayLiquidate", 12);
    assert_eq!(view["collateralRatio"], json!(150));
    let verbose = fx.call("getvault", json!([vault.as_str(), true]));
    assert_eq!(verbose["nextCollateralRatio"], json!(125));

    let view = generate_until(&mut fx, &vault, "inLiquidation", 12);
    assert_eq!(view["batchCount"], json!(1));
    assert_eq!(amt(view["liquidationPenalty"].as_str().unwrap()), amt("5"));
    assert_eq!(view["liquidationHeight"], json!(fx.height()));
    assert_eq!(view["batches"][0]["loan"], json!("1.00000000@TSLA"));
    assert_eq!(view["batches"][0]["collaterals"], json!(["150.00000000@DFI"]));
    assert!(view.get("collateralAmounts").is_none());

    // principal leaves the supply on entry
    assert_eq!(fx.minted("TSLA"), amt("0"));
    assert!(fx.node.engine().state().interest.for_vault(&vault).is_empty());

    let auctions = fx.call("listauctions", json!([]));
    assert_eq!(auctions.as_array().map(Vec::len), Some(1));
    assert_eq!(auctions[0]["vaultId"], json!(vault.as_str()));

    let owner = fx.owner.clone();
    let err = fx
        .try_call("deposittovault", json!([vault.as_str(), owner, "1@DFI"]))
        .unwrap_err();
    assert_eq!(err.code, rpc_code::VERIFY_REJECTED);
}

#[test]
fn test_auction_awarded_to_best_bid() {
    let (mut fx, vault) = vault_at_min_ratio();
    fx.set_price("TSLA/USD", "120");
    generate_until(&mut fx, &vault, "inLiquidation", 24);

    let first = fx.new_address("first");
    let second = fx.new_address("second");
    fx.call("minttokens", json!(["2@TSLA", first]));
    fx.call("minttokens", json!(["2@TSLA", second]));

    // start bid is loan * (1 + penalty)
    let err = fx
        .try_call("placeauctionbid", json!([vault.as_str(), 0, first, "1@TSLA"]))
        .unwrap_err();
    assert_eq!(err.code, rpc_code::VERIFY_REJECTED);
    fx.call("placeauctionbid", json!([vault.as_str(), 0, first, "1.05@TSLA"]));
    assert_eq!(fx.balance(&first, "TSLA"), amt("0.95"));

    // a new bid must clear the best by the minimum increment
    assert!(fx
        .try_call("placeauctionbid", json!([vault.as_str(), 0, second, "1.06@TSLA"]))
        .is_err());
    fx.call("placeauctionbid", json!([vault.as_str(), 0, second, "1.07@TSLA"]));
    assert_eq!(fx.balance(&first, "TSLA"), amt("2"));
    assert_eq!(fx.balance(&second, "TSLA"), amt("0.93"));

    let view = fx.vault(&vault);
    assert_eq!(view["batches"][0]["highestBid"]["owner"], json!(second));
    assert_eq!(view["batches"][0]["highestBid"]["amount"], json!("1.07000000@TSLA"));

    fx.generate(36);
    let view = fx.vault(&vault);
    assert_eq!(view["state"], json!("active"));
    assert_eq!(view["collateralAmounts"], json!([]));
    assert_eq!(fx.balance(&second, "DFI"), amt("150"));
    // bid above loan plus penalty goes back to the vault owner
    let owner = fx.owner.clone();
    assert_eq!(fx.balance(&owner, "TSLA"), amt("1.02"));

    let burn = fx.call("getburninfo", json!([]));
    assert_eq!(burn["auctionBurn"], json!(["1.05000000@TSLA"]));
    assert_eq!(burn["auctionPenalties"], json!(["0.05000000@TSLA"]));
    assert_eq!(burn["badDebt"], json!([]));
}

#[test]
fn test_unsold_batch_relisted_then_written_off() {
    let (mut fx, vault) = vault_at_min_ratio();
    fx.set_price("TSLA/USD", "120");
    generate_until(&mut fx, &vault, "inLiquidation", 24);

    fx.generate(36);
    let view = fx.vault(&vault);
    assert_eq!(view["state"], json!("inLiquidation"));
    assert_eq!(view["batchCount"], json!(1));

    fx.generate(36);
    let view = fx.vault(&vault);
    assert_eq!(view["state"], json!("active"));
    assert_eq!(view["collateralAmounts"], json!(["150.00000000@DFI"]));
    let burn = fx.call("getburninfo", json!([]));
    assert_eq!(burn["badDebt"], json!(["1.00000000@TSLA"]));
}

#[test]
fn test_top_up_restores_active() {
    let (mut fx, vault) = vault_at_min_ratio();
    fx.set_price("TSLA/USD", "120");
    generate_until(&mut fx, &vault, "mayLiquidate", 12);

    let owner = fx.owner.clone();
    fx.call("deposittovault", json!([vault.as_str(), owner, "100@DFI"]));
    fx.generate(1);
    let view = fx.vault(&vault);
    assert_eq!(view["state"], json!("active"));
    assert_eq!(fx.loan(&vault, "TSLA"), amt("1"));

    fx.generate(12);
    assert_eq!(fx.vault(&vault)["state"], json!("active"));
}

#[test]
fn test_locked_token_freezes_vault_but_not_liquidation() {
    let (mut fx, vault) = vault_at_min_ratio();
    let tsla = fx.token_id("TSLA");
    fx.call("setgov", json!([{ format!("v0/locks/token/{}", tsla): "true" }]));

    assert_eq!(fx.vault(&vault)["state"], json!("frozen"));
    let owner = fx.owner.clone();
    let err = fx
        .try_call("deposittovault", json!([vault.as_str(), owner, "10@DFI"]))
        .unwrap_err();
    assert_eq!(err.code, rpc_code::VERIFY_REJECTED);
    assert!(err.message.contains("locked"));

    fx.set_price("TSLA/USD", "120");
    for _ in 0..24 {
        fx.generate(1);
        if fx.node.engine().state().vaults.get(&vault).is_some_and(|v| v.is_in_liquidation()) {
            return;
        }
    }
    panic!("locked vault was never liquidated");
}

#[test]
fn test_stale_price_blocks_loans() {
    let (mut fx, vault) = vault_at_min_ratio();
    fx.call("deposittovault", json!([vault.as_str(), fx.owner.clone(), "300@DFI"]));

    // a 50% jump breaks the deviation window until both slots agree
    fx.set_price("TSLA/USD", "150");
    let start = fx.height();
    let boundary = (start / 6 + 1) * 6;
    fx.generate(boundary - start);
    assert_eq!(fx.vault(&vault)["state"], json!("frozen"));
    let err = fx
        .try_call("takeloan", json!([{"vaultId": vault.as_str(), "amounts": "0.1@TSLA"}]))
        .unwrap_err();
    assert_eq!(err.code, rpc_code::VERIFY_REJECTED);

    fx.generate(6);
    assert_eq!(fx.vault(&vault)["state"], json!("active"));
    fx.take_loan(&vault, json!("0.1@TSLA"));
}

#[test]
fn test_split_carries_open_auction() {
    let (mut fx, vault) = vault_at_min_ratio();
    fx.set_price("TSLA/USD", "120");
    generate_until(&mut fx, &vault, "inLiquidation", 24);

    let bidder = fx.new_address("bidder");
    fx.call("minttokens", json!(["2@TSLA", bidder]));
    fx.call("placeauctionbid", json!([vault.as_str(), 0, bidder, "1.05@TSLA"]));

    let old = fx.token_id("TSLA");
    let at = fx.height() + 2;
    fx.call(
        "setgov",
        json!([{ format!("v0/oracles/splits/{}", at): format!("{}/2", old) }]),
    );
    fx.generate(2);
    assert_ne!(fx.token_id("TSLA"), old);

    let view = fx.vault(&vault);
    assert_eq!(view["state"], json!("inLiquidation"));
    assert_eq!(view["batches"][0]["loan"], json!("2.00000000@TSLA"));
    assert_eq!(view["batches"][0]["highestBid"]["amount"], json!("2.10000000@TSLA"));
    assert_eq!(fx.balance(&bidder, "TSLA"), amt("1.9"));
    // only free float remains after the loan left the supply on entry
    assert_eq!(fx.minted("TSLA"), amt("4"));

    // bids now go in the new token
    let err = fx
        .try_call("placeauctionbid", json!([vault.as_str(), 0, bidder, format!("1.9@{}", old)]))
        .unwrap_err();
    assert_eq!(err.code, rpc_code::VERIFY_REJECTED);

    generate_until(&mut fx, &vault, "active", 48);
    assert_eq!(fx.balance(&bidder, "DFI"), amt("150"));
    let owner = fx.owner.clone();
    assert_eq!(fx.balance(&owner, "TSLA"), amt("2"));
    let burn = fx.call("getburninfo", json!([]));
    assert_eq!(burn["auctionBurn"], json!(["2.10000000@TSLA"]));
}
