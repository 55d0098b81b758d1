//! Properties over random scenarios and over the interest arithmetic

use proptest::collection::vec;
use proptest::prelude::*;
use vault_common::math::{div_round, pow10, Rounding};
use vault_common::{rpc_code, Amount, HighPrecision};
use vault_engine::interest::calc::consume_reservoir;
use vault_engine::interest::{accrued_to, interest_per_block, reported, truncated};
use vault_engine::state::InterestRecord;

use crate::adversary::attack;
use crate::generators::{loan_raw, ops, rate_raw};
use crate::harness::Harness;
use crate::sanitizer::Sanitize;

const BPY: u64 = 1_051_200;
const VAULTS: usize = 3;
/// Bound on generated interest reservoirs, raw 24-digit units
const ITH_BOUND: i128 = pow10(30);

fn harness() -> Harness {
    let _ = env_logger::builder().is_test(true).try_init();
    Harness::new(VAULTS).expect("market setup")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Supply conservation and collateralization survive any scenario
    #[test]
    fn prop_invariants_hold_under_random_ops(ops in ops(40)) {
        let mut h = harness();
        for op in ops.sanitize(VAULTS) {
            let applied = h.apply(&op);
            prop_assert!(applied.is_ok(), "{:?} broke an invariant: {:?}", op, applied);
            let checked = h.check();
            prop_assert!(checked.is_ok(), "after {:?}: {:?}", op, checked);
        }
        let (applied, rejected) = h.counts();
        prop_assert!(applied + rejected > 0);
    }

    /// Disconnecting every block a scenario mined restores all views
    #[test]
    fn prop_invalidate_restores_snapshot(ops in ops(30)) {
        let mut h = harness();
        let fork_point = h.height();
        let before = h.snapshot().expect("snapshot");

        h.call("generate", serde_json::json!([1])).expect("generate");
        for op in ops.sanitize(VAULTS) {
            prop_assert!(h.apply(&op).is_ok());
        }
        h.call("invalidateblock", serde_json::json!([fork_point + 1])).expect("invalidate");

        prop_assert_eq!(h.height(), fork_point);
        prop_assert_eq!(h.snapshot().expect("snapshot"), before);
    }

    /// Foreign signers and malformed references never change state
    #[test]
    fn prop_attacks_are_rejected_cleanly(setup in ops(15), attacks in vec(attack(), 1..8)) {
        let mut h = harness();
        for op in setup.sanitize(VAULTS) {
            prop_assert!(h.apply(&op).is_ok());
        }
        let before = h.snapshot().expect("snapshot");
        let vault = h.vaults[0].as_str().to_string();
        let owner = h.owner.clone();
        for a in attacks {
            let (method, args) = a.request(&vault, &owner);
            let err = h.call(method, args);
            prop_assert!(err.is_err(), "{:?} was accepted", a);
            if let Err(e) = err {
                prop_assert_ne!(e.code, rpc_code::INVALID_REQUEST);
            }
        }
        prop_assert_eq!(h.snapshot().expect("snapshot"), before);
    }
}

proptest! {
    /// IPB is the truncated quotient of `amount * rate`, signed like the rate
    #[test]
    fn prop_ipb_truncates_toward_zero(loan in loan_raw(), rate in rate_raw()) {
        let ipb = interest_per_block(Amount::from_raw(loan), Amount::from_raw(rate), BPY).unwrap();
        let exact = loan * pow10(6) * rate.abs();
        let magnitude = ipb.raw().abs();
        prop_assert!(magnitude * BPY as i128 <= exact);
        prop_assert!(exact < (magnitude + 1) * BPY as i128);
        if ipb.raw() != 0 {
            prop_assert_eq!(ipb.is_negative(), rate < 0);
        }
    }

    /// Accrual is linear in elapsed blocks
    #[test]
    fn prop_accrual_is_linear(
        loan in loan_raw(),
        rate in rate_raw(),
        start in 0u64..10_000,
        a in 0u64..5_000,
        b in 0u64..5_000,
    ) {
        let ipb = interest_per_block(Amount::from_raw(loan), Amount::from_raw(rate), BPY).unwrap();
        let record = InterestRecord { ipb, ith: HighPrecision::ZERO, height: start };
        let at_a = accrued_to(&record, start + a).unwrap();
        let at_ab = accrued_to(&record, start + a + b).unwrap();
        prop_assert_eq!(at_ab, at_a.checked_add(ipb.checked_mul_int(i128::from(b)).unwrap()).unwrap());
        // heights below the checkpoint never accrue
        prop_assert_eq!(accrued_to(&record, start.saturating_sub(a)).unwrap(), HighPrecision::ZERO);
    }

    /// Reported interest rounds up, truncated rounds toward zero, one satoshi apart at most
    #[test]
    fn prop_reported_brackets_truncated(raw in -ITH_BOUND..ITH_BOUND) {
        let ith = HighPrecision::from_raw(raw);
        let up = reported(ith).unwrap();
        let down = truncated(ith).unwrap();
        prop_assert!(up >= down);
        prop_assert!(up.raw() - down.raw() <= 1);
        prop_assert!(up.raw() * pow10(16) >= raw);
        prop_assert!(down.raw().abs() * pow10(16) <= raw.abs());
    }

    /// A partial interest payment leaves exactly the unpaid remainder
    #[test]
    fn prop_reservoir_payment_conserves(
        ith in 1i128..ITH_BOUND,
        payment in 1i128..100_000_000_000_000,
    ) {
        let ith = HighPrecision::from_raw(ith);
        let owed = reported(ith).unwrap();
        let (paid, after) = consume_reservoir(ith, Amount::from_raw(payment)).unwrap();
        if paid < owed {
            prop_assert_eq!(paid, Amount::from_raw(payment));
            prop_assert!(after.is_positive());
            prop_assert_eq!(after.raw() + paid.raw() * pow10(16), ith.raw());
        } else {
            prop_assert_eq!(paid, owed);
            prop_assert_eq!(after, HighPrecision::ZERO);
        }
    }

    /// Floor and ceil bracket the exact quotient
    #[test]
    fn prop_div_round_brackets_quotient(n in any::<i64>(), d in any::<i32>()) {
        prop_assume!(d != 0);
        let (n, d) = (i128::from(n), i128::from(d));
        let floor = div_round(n, d, Rounding::Floor).unwrap();
        let ceil = div_round(n, d, Rounding::Ceil).unwrap();
        let toward = div_round(n, d, Rounding::TowardZero).unwrap();
        prop_assert!(ceil - floor <= 1);
        prop_assert!(floor <= toward && toward <= ceil);
        if d > 0 {
            prop_assert!(floor * d <= n && n <= ceil * d);
        } else {
            prop_assert!(floor * d >= n && n >= ceil * d);
        }
    }
}
