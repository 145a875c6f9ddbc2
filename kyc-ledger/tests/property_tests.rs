//! Property-based tests for ledger invariants
//!
//! These tests use proptest to verify critical invariants:
//! - Conservation: Move keeps balance(A) + balance(B) constant
//! - Immutability: Update succeeds iff national ID and tax ID are unchanged
//! - Round trip: Insert then Retrieve returns the canonical encoding
//! - History: N puts yield N history entries in put order

use kyc_ledger::{
    codec,
    storage::{LedgerStore, MemoryStore},
    Address, Config, Customer, Error, TransactionEngine,
};
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;

fn test_engine() -> TransactionEngine {
    TransactionEngine::new(Arc::new(MemoryStore::new()), &Config::in_memory())
}

/// Strategy for identifier-like strings
fn id_strategy() -> impl Strategy<Value = String> {
    "[A-Z0-9]{1,12}"
}

/// Strategy for free-form category maps
fn attributes_strategy() -> impl Strategy<Value = BTreeMap<String, String>> {
    prop::collection::btree_map("[a-z]{1,8}", "[ -~]{0,16}", 0..4)
}

/// Strategy for generating customer records
fn customer_strategy() -> impl Strategy<Value = Customer> {
    (
        (id_strategy(), id_strategy(), "[ -~]{0,24}", any::<i32>()),
        ("[a-zA-Z0-9 ]{0,24}", "[a-zA-Z ]{0,12}"),
        (
            attributes_strategy(),
            attributes_strategy(),
            attributes_strategy(),
            attributes_strategy(),
        ),
    )
        .prop_map(
            |((national_id, tax_id, name, score), (street, city), (edu, emp, health, poss))| {
                Customer {
                    name,
                    gender: "F".to_string(),
                    dob: "1990-01-01".to_string(),
                    national_id,
                    address: Address {
                        address_line: street,
                        city,
                    },
                    tax_id,
                    score,
                    marital_status: "single".to_string(),
                    education: edu,
                    employment: emp,
                    health,
                    possessions: poss,
                }
            },
        )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: Move conserves the sum of the two balances
    #[test]
    fn prop_move_conserves_sum(
        a in -1_000_000_000i64..1_000_000_000,
        b in -1_000_000_000i64..1_000_000_000,
        amount in -1_000_000_000i64..1_000_000_000,
    ) {
        let engine = test_engine();
        engine.seed("a", &a.to_string(), "b", &b.to_string()).unwrap();

        let transfer = engine.move_asset("a", "b", &amount.to_string()).unwrap();

        prop_assert_eq!(transfer.from_balance, a - amount);
        prop_assert_eq!(transfer.to_balance, b + amount);

        let new_a = codec::decode_balance(&engine.query("a").unwrap()).unwrap();
        let new_b = codec::decode_balance(&engine.query("b").unwrap()).unwrap();
        prop_assert_eq!(new_a + new_b, a + b);
    }

    /// Property: Update succeeds iff the immutable fields are unchanged
    #[test]
    fn prop_update_respects_immutable_fields(
        stored in customer_strategy(),
        proposed in customer_strategy(),
        keep_ids in any::<bool>(),
    ) {
        let engine = test_engine();
        let key = engine.insert(&codec::encode_customer(&stored)).unwrap();
        let before = engine.retrieve(&key).unwrap();

        let mut proposed = proposed;
        if keep_ids {
            proposed.national_id = stored.national_id.clone();
            proposed.tax_id = stored.tax_id.clone();
        }
        let unchanged_ids =
            proposed.national_id == stored.national_id && proposed.tax_id == stored.tax_id;

        let result = engine.update(&key, &codec::encode_customer(&proposed));

        if unchanged_ids {
            prop_assert!(result.is_ok());
            prop_assert_eq!(engine.retrieve(&key).unwrap(), codec::encode_customer(&proposed));
        } else {
            let is_violation = matches!(result, Err(Error::ImmutableFieldViolation { .. }));
            prop_assert!(is_violation);
            prop_assert_eq!(engine.retrieve(&key).unwrap(), before);
        }
    }

    /// Property: Insert then Retrieve is byte-identical to the canonical encoding
    #[test]
    fn prop_insert_retrieve_round_trip(customer in customer_strategy()) {
        let engine = test_engine();
        let payload = codec::encode_customer(&customer);

        let key = engine.insert(&payload).unwrap();
        prop_assert_eq!(&key, &customer.national_id);

        let stored = engine.retrieve(&key).unwrap();
        prop_assert_eq!(&stored, &payload);
        prop_assert_eq!(codec::decode_customer(&stored).unwrap(), customer);
    }

    /// Property: N puts produce N history entries in put order
    #[test]
    fn prop_history_length_and_order(values in prop::collection::vec("[a-z0-9]{1,8}", 1..20)) {
        let store = Arc::new(MemoryStore::new());
        for value in &values {
            store.put("k", value.as_bytes()).unwrap();
        }
        let engine = TransactionEngine::new(store, &Config::in_memory());

        let json = engine.history("k").unwrap();
        let history: Vec<String> = serde_json::from_slice(&json).unwrap();
        prop_assert_eq!(history, values);
    }

    /// Property: paging through history visits every entry exactly once
    #[test]
    fn prop_history_pages_partition(count in 1usize..40, page in 1usize..10) {
        let engine = test_engine();
        for i in 0..count {
            engine.store().put("k", i.to_string().as_bytes()).unwrap();
        }

        let mut cursor = 0u64;
        let mut seen = Vec::new();
        loop {
            let result = engine.history_page("k", cursor, page).unwrap();
            prop_assert!(result.entries.len() <= page);
            seen.extend(result.entries.iter().map(|e| e.seq));
            match result.next_cursor {
                Some(next) => cursor = next,
                None => break,
            }
        }

        prop_assert_eq!(seen, (0..count as u64).collect::<Vec<_>>());
    }
}
