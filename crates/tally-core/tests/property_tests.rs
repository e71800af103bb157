//! Property-based tests for the core invariants.

use chrono::NaiveDate;
use proptest::prelude::*;
use rust_decimal::Decimal;
use tally_core::{account, Amount, Cost, Directive, Inventory, Position, Price, PriceMap};

// ============================================================================
// Generators
// ============================================================================

fn arb_decimal() -> impl Strategy<Value = Decimal> {
    (-1_000_000i64..1_000_000i64).prop_map(|n| Decimal::new(n, 2))
}

fn arb_nonzero_decimal() -> impl Strategy<Value = Decimal> {
    arb_decimal().prop_filter("non-zero", |d| !d.is_zero())
}

fn arb_positive_decimal() -> impl Strategy<Value = Decimal> {
    (1i64..1_000_000i64).prop_map(|n| Decimal::new(n, 2))
}

fn arb_currency() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("USD".to_string()),
        Just("EUR".to_string()),
        Just("GBP".to_string()),
        Just("HOOL".to_string()),
    ]
}

fn arb_date() -> impl Strategy<Value = NaiveDate> {
    (2020i32..2025i32, 1u32..13u32, 1u32..29u32)
        .prop_map(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d).unwrap())
}

fn arb_cost() -> impl Strategy<Value = Option<Cost>> {
    prop::option::of((arb_positive_decimal(), arb_currency(), arb_date()).prop_map(
        |(number, currency, date)| Cost::new(number, currency).with_date(date),
    ))
}

fn arb_position() -> impl Strategy<Value = Position> {
    (arb_nonzero_decimal(), arb_currency(), arb_cost()).prop_map(|(number, currency, cost)| {
        Position {
            units: Amount::new(number, currency),
            cost,
        }
    })
}

fn arb_inventory() -> impl Strategy<Value = Inventory> {
    prop::collection::vec(arb_position(), 0..12).prop_map(|positions| {
        let mut inventory = Inventory::new();
        for position in positions {
            inventory.add_position(position);
        }
        inventory
    })
}

fn arb_account() -> impl Strategy<Value = String> {
    let component = "[A-Z][a-zA-Z0-9]{0,6}";
    (
        prop_oneof![
            Just("Assets"),
            Just("Liabilities"),
            Just("Equity"),
            Just("Income"),
            Just("Expenses"),
        ],
        prop::collection::vec(component, 1..4),
    )
        .prop_map(|(root, components)| format!("{root}:{}", components.join(":")))
}

// ============================================================================
// Inventory
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Invariants hold after any sequence of insertions.
    #[test]
    fn prop_inventory_invariants(inventory in arb_inventory()) {
        prop_assert!(inventory.check_invariants().is_ok());
    }

    /// Applying an amount and its negation restores the prior state.
    #[test]
    fn prop_add_then_negate_is_identity(
        inventory in arb_inventory(),
        number in arb_nonzero_decimal(),
        currency in arb_currency(),
        cost in arb_cost(),
    ) {
        let before = inventory.clone();
        let mut after = inventory;
        after.add_amount(Amount::new(number, currency.as_str()), cost.clone());
        after.add_amount(Amount::new(-number, currency.as_str()), cost);
        prop_assert_eq!(before, after);
    }

    /// Merging inventories sums per-currency units.
    #[test]
    fn prop_add_inventory_sums_units(
        a in arb_inventory(),
        b in arb_inventory(),
        currency in arb_currency(),
    ) {
        let expected = a.units(&currency) + b.units(&currency);
        let mut merged = a;
        merged.add_inventory(&b);
        prop_assert_eq!(merged.units(&currency), expected);
    }

    /// Splitting partitions the inventory by currency without losing units.
    #[test]
    fn prop_split_partitions(inventory in arb_inventory()) {
        let parts = inventory.split();
        for (currency, part) in &parts {
            prop_assert_eq!(part.units(currency), inventory.units(currency));
            for position in part.iter() {
                prop_assert_eq!(&position.units.currency, currency);
            }
        }
    }

    /// Averaging preserves per-currency unit totals.
    #[test]
    fn prop_average_preserves_units(inventory in arb_inventory()) {
        let averaged = inventory.average();
        for currency in inventory.currencies() {
            prop_assert_eq!(averaged.units(&currency), inventory.units(&currency));
        }
        prop_assert!(averaged.check_invariants().is_ok());
    }
}

// ============================================================================
// Account names
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// join is the inverse of split.
    #[test]
    fn prop_join_split_round_trip(name in arb_account()) {
        prop_assert_eq!(account::join(&account::split(&name)), name);
    }

    /// Generated names satisfy the account grammar.
    #[test]
    fn prop_generated_accounts_are_valid(name in arb_account()) {
        prop_assert!(account::is_valid(&name));
    }

    /// parents yields the account, then each ancestor, ending at the root.
    #[test]
    fn prop_parents_chain(name in arb_account()) {
        let chain: Vec<&str> = account::parents(&name).collect();
        prop_assert_eq!(chain[0], name.as_str());
        prop_assert_eq!(*chain.last().unwrap(), account::root(1, &name));
        for pair in chain.windows(2) {
            prop_assert_eq!(account::parent(pair[0]), Some(pair[1]));
        }
    }

    /// The separator transformer is a bijection.
    #[test]
    fn prop_transformer_round_trip(name in arb_account()) {
        let transformer = account::AccountTransformer::new('_');
        prop_assert_eq!(transformer.parse(&transformer.render(&name)), name);
    }
}

// ============================================================================
// Price map
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Forward and inverse rates are reciprocal up to decimal precision.
    #[test]
    fn prop_price_reciprocity(
        date in arb_date(),
        rate in arb_positive_decimal(),
    ) {
        let directives = vec![Directive::Price(Price::new(
            date,
            "HOOL",
            Amount::new(rate, "USD"),
        ))];
        let prices = PriceMap::build(&directives);

        let (_, forward) = prices.get_latest_price("HOOL", "USD").unwrap();
        let (_, backward) = prices.get_latest_price("USD", "HOOL").unwrap();

        let product = forward * backward;
        let error = (product - Decimal::ONE).abs();
        prop_assert!(error < Decimal::new(1, 20), "product {product}");
    }

    /// A dated lookup never returns a sample dated at or after the query.
    #[test]
    fn prop_dated_lookup_strictly_before(
        dates in prop::collection::btree_set(arb_date(), 1..8),
        query in arb_date(),
        rate in arb_positive_decimal(),
    ) {
        let directives: Vec<Directive> = dates
            .iter()
            .map(|d| Directive::Price(Price::new(*d, "HOOL", Amount::new(rate, "USD"))))
            .collect();
        let prices = PriceMap::build(&directives);

        match prices.get_price("HOOL", "USD", Some(query)) {
            Some((Some(found), _)) => prop_assert!(found < query),
            Some((None, _)) => prop_assert!(false, "dated sample expected"),
            None => prop_assert!(dates.iter().all(|d| *d >= query)),
        }
    }
}
