//! Booking engine for the tally ledger.
//!
//! This crate turns parsed transactions with partial postings into fully
//! booked ones:
//!
//! - [`book`] categorizes postings into currency buckets, matches reducing
//!   postings against per-account inventories under each account's booking
//!   method, interpolates the one permitted missing number per bucket, and
//!   binds every cost spec into a concrete cost.
//! - [`process_pads`] splices synthetic padding transactions in front of
//!   balance assertions that a `pad` directive promised to satisfy.
//!
//! Errors are data: every pass returns `(output, errors)` and later passes
//! run regardless of earlier failures.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod book;
mod pad;

pub use book::{book, book_with_balances};
pub use pad::{process_pads, PadError};

use rust_decimal::prelude::Signed;
use rust_decimal::Decimal;
use std::collections::HashMap;
use thiserror::Error;

use tally_core::{
    BookingMethod, InternedStr, NaiveDate, Posting, PostingCost, PriceAnnotation, ReduceError,
    Transaction,
};

/// Options controlling the booking pass.
#[derive(Debug, Clone)]
pub struct BookingOptions {
    /// Booking method for accounts whose `open` does not name one.
    pub default_method: BookingMethod,
    /// Explicit per-currency tolerances; the `*` key applies to all
    /// currencies without their own entry.
    pub tolerance_defaults: HashMap<String, Decimal>,
    /// Scale factor applied to the last significant digit of each posting
    /// when inferring tolerances.
    pub inferred_tolerance_multiplier: Decimal,
    /// Whether inferred tolerances propagate through cost and price rates
    /// into the cost currency.
    pub infer_tolerance_from_cost: bool,
}

impl Default for BookingOptions {
    fn default() -> Self {
        Self {
            default_method: BookingMethod::Strict,
            tolerance_defaults: HashMap::new(),
            inferred_tolerance_multiplier: Decimal::new(5, 1),
            infer_tolerance_from_cost: true,
        }
    }
}

/// An error produced while booking a transaction.
#[derive(Debug, Clone, Error)]
pub enum BookError {
    /// A posting could not be placed in any currency bucket.
    #[error("{date}: cannot place posting to {account} in a currency bucket: {message}")]
    Categorization {
        /// Transaction date.
        date: NaiveDate,
        /// The posting's account.
        account: String,
        /// What was missing.
        message: String,
    },

    /// Postings of one account hold the same commodity at cost in both
    /// directions within a single transaction.
    #[error("{date}: postings to {account} both augment and reduce {currency} at cost")]
    SelfReduction {
        /// Transaction date.
        date: NaiveDate,
        /// The conflicted account.
        account: String,
        /// The commodity held in both directions.
        currency: InternedStr,
    },

    /// A reduction failed to match inventory lots.
    #[error("{date}: while reducing {account}: {source}")]
    Reduction {
        /// Transaction date.
        date: NaiveDate,
        /// The account being reduced.
        account: String,
        /// The underlying lot-matching failure.
        source: ReduceError,
    },

    /// The missing numbers of a transaction cannot be solved.
    #[error("{date}: {message}")]
    Interpolation {
        /// Transaction date.
        date: NaiveDate,
        /// Why interpolation failed.
        message: String,
    },

    /// A fully specified transaction does not balance.
    #[error("{date}: transaction does not balance: {residual} {currency}")]
    Unbalanced {
        /// Transaction date.
        date: NaiveDate,
        /// The unbalanced currency.
        currency: InternedStr,
        /// The residual left over.
        residual: Decimal,
    },

    /// A posting still carries a missing field after booking, which breaks
    /// the parser/booking contract.
    #[error("{date}: posting to {account} still incomplete after booking")]
    Incomplete {
        /// Transaction date.
        date: NaiveDate,
        /// The offending account.
        account: String,
    },
}

/// The weight a fully specified posting contributes to its transaction's
/// residual: cost times units in the cost currency when held at cost, else
/// price times units in the price currency, else the units themselves.
///
/// Returns `None` while any needed number is still missing.
#[must_use]
pub fn posting_weight(posting: &Posting) -> Option<(InternedStr, Decimal)> {
    let units = posting.amount()?;

    if let Some(cost) = &posting.cost {
        return match cost {
            PostingCost::Bound(cost) => Some((cost.currency.clone(), units.number * cost.number)),
            PostingCost::Spec(spec) => {
                let currency = spec.currency.clone()?;
                match (spec.number_per, spec.number_total) {
                    (Some(per), None) => Some((currency, units.number * per)),
                    (None, Some(total)) => Some((currency, total * units.number.signum())),
                    (Some(per), Some(total)) => Some((
                        currency,
                        (per * units.number.abs() + total) * units.number.signum(),
                    )),
                    (None, None) => None,
                }
            }
        };
    }

    if let Some(price) = &posting.price {
        return match price {
            PriceAnnotation::Unit(amount) => {
                Some((amount.currency.clone(), units.number * amount.number))
            }
            PriceAnnotation::Total(amount) => Some((
                amount.currency.clone(),
                amount.number * units.number.signum(),
            )),
            _ => None,
        };
    }

    Some((units.currency.clone(), units.number))
}

/// Per-currency sum of posting weights. Postings with missing numbers are
/// skipped.
#[must_use]
pub fn residual(transaction: &Transaction) -> HashMap<InternedStr, Decimal> {
    let mut residuals: HashMap<InternedStr, Decimal> = HashMap::new();
    for posting in &transaction.postings {
        if let Some((currency, weight)) = posting_weight(posting) {
            *residuals.entry(currency).or_default() += weight;
        }
    }
    residuals
}

/// Infer per-currency tolerances for a transaction.
///
/// Each posting whose units carry decimal places contributes half-ish of its
/// last digit (scaled by the configured multiplier) to its currency. With
/// cost inference enabled, that tolerance also propagates through the cost
/// or price rate into the cost currency. Explicit defaults from the option
/// map participate in the same per-currency maximum, and everything is
/// capped at 0.5.
#[must_use]
pub fn infer_tolerances(
    transaction: &Transaction,
    options: &BookingOptions,
) -> HashMap<InternedStr, Decimal> {
    let cap = Decimal::new(5, 1);
    let mut tolerances: HashMap<InternedStr, Decimal> = HashMap::new();
    let mut bump = |currency: &InternedStr, tolerance: Decimal| {
        let tolerance = tolerance.min(cap);
        tolerances
            .entry(currency.clone())
            .and_modify(|t| *t = (*t).max(tolerance))
            .or_insert(tolerance);
    };

    for posting in &transaction.postings {
        let Some(units) = posting.amount() else {
            continue;
        };
        let scale = units.number.scale();
        if scale == 0 {
            continue;
        }
        // multiplier * 10^-scale
        let tolerance = Decimal::new(1, scale) * options.inferred_tolerance_multiplier;
        bump(&units.currency, tolerance);

        if !options.infer_tolerance_from_cost {
            continue;
        }
        if let Some(cost) = posting.bound_cost() {
            bump(&cost.currency, tolerance * cost.number);
        } else if let Some(PostingCost::Spec(spec)) = &posting.cost {
            if let (Some(per), Some(currency)) = (spec.number_per, &spec.currency) {
                bump(currency, tolerance * per);
            }
        } else if let Some(PriceAnnotation::Unit(price)) = &posting.price {
            bump(&price.currency, tolerance * price.number);
        }
    }

    for (currency, tolerance) in &options.tolerance_defaults {
        if currency != "*" {
            bump(&InternedStr::new(currency.as_str()), *tolerance);
        }
    }

    tolerances
}

/// The tolerance for a currency: the inferred map entry, the `*` wildcard
/// default, or zero.
#[must_use]
pub fn tolerance_for(
    tolerances: &HashMap<InternedStr, Decimal>,
    options: &BookingOptions,
    currency: &InternedStr,
) -> Decimal {
    tolerances.get(currency).copied().unwrap_or_else(|| {
        options
            .tolerance_defaults
            .get("*")
            .copied()
            .unwrap_or(Decimal::ZERO)
            .min(Decimal::new(5, 1))
    })
}

/// Check whether a transaction's residual is small under its inferred
/// tolerances.
#[must_use]
pub fn is_balanced(transaction: &Transaction, options: &BookingOptions) -> bool {
    let tolerances = infer_tolerances(transaction, options);
    residual(transaction)
        .iter()
        .all(|(currency, amount)| amount.abs() <= tolerance_for(&tolerances, options, currency))
}

/// The signed units an account receives from a transaction in one currency.
#[must_use]
pub fn posting_units(transaction: &Transaction, account: &str, currency: &str) -> Decimal {
    transaction
        .postings
        .iter()
        .filter(|p| p.account == account)
        .filter_map(Posting::amount)
        .filter(|a| a.currency == currency)
        .map(|a| a.number)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tally_core::{Amount, Cost, CostSpec};

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn test_weight_plain() {
        let posting = Posting::new("Assets:Cash", Amount::new(dec!(10.00), "USD"));
        let (currency, weight) = posting_weight(&posting).unwrap();
        assert_eq!(currency, "USD");
        assert_eq!(weight, dec!(10.00));
    }

    #[test]
    fn test_weight_bound_cost() {
        let posting = Posting::new("Assets:Stock", Amount::new(dec!(10), "HOOL"))
            .with_cost(Cost::new(dec!(100.00), "USD"));
        let (currency, weight) = posting_weight(&posting).unwrap();
        assert_eq!(currency, "USD");
        assert_eq!(weight, dec!(1000.00));
    }

    #[test]
    fn test_weight_cost_spec_total() {
        let posting = Posting::new("Assets:Stock", Amount::new(dec!(-10), "HOOL")).with_cost_spec(
            CostSpec::empty()
                .with_number_total(dec!(1500))
                .with_currency("USD"),
        );
        let (currency, weight) = posting_weight(&posting).unwrap();
        assert_eq!(currency, "USD");
        assert_eq!(weight, dec!(-1500));
    }

    #[test]
    fn test_weight_unit_price() {
        let posting = Posting::new("Assets:USD", Amount::new(dec!(-100.00), "USD"))
            .with_price(PriceAnnotation::Unit(Amount::new(dec!(0.85), "EUR")));
        let (currency, weight) = posting_weight(&posting).unwrap();
        assert_eq!(currency, "EUR");
        assert_eq!(weight, dec!(-85.0000));
    }

    #[test]
    fn test_weight_total_price() {
        let posting = Posting::new("Assets:USD", Amount::new(dec!(-100.00), "USD"))
            .with_price(PriceAnnotation::Total(Amount::new(dec!(85.00), "EUR")));
        let (currency, weight) = posting_weight(&posting).unwrap();
        assert_eq!(currency, "EUR");
        assert_eq!(weight, dec!(-85.00));
    }

    #[test]
    fn test_weight_missing() {
        assert!(posting_weight(&Posting::auto("Assets:Cash")).is_none());

        let spec_without_number = Posting::new("Assets:Stock", Amount::new(dec!(10), "HOOL"))
            .with_cost_spec(CostSpec::empty().with_currency("USD"));
        assert!(posting_weight(&spec_without_number).is_none());
    }

    #[test]
    fn test_residual() {
        let txn = Transaction::new(date(2023, 1, 2), "t")
            .with_posting(Posting::new("Expenses:Food", Amount::new(dec!(10.00), "USD")))
            .with_posting(Posting::new("Assets:Cash", Amount::new(dec!(-7.00), "USD")));

        let residuals = residual(&txn);
        assert_eq!(residuals.get("USD"), Some(&dec!(3.00)));
    }

    #[test]
    fn test_infer_tolerances_from_scale() {
        let txn = Transaction::new(date(2023, 1, 2), "t")
            .with_posting(Posting::new("Expenses:Food", Amount::new(dec!(10.00), "USD")))
            .with_posting(Posting::new("Assets:Cash", Amount::new(dec!(-10.0), "USD")));

        let tolerances = infer_tolerances(&txn, &BookingOptions::default());
        // The coarser posting wins: 0.1 * 0.5.
        assert_eq!(tolerances.get("USD"), Some(&dec!(0.05)));
    }

    #[test]
    fn test_infer_tolerances_integer_posting_contributes_nothing() {
        let txn = Transaction::new(date(2023, 1, 2), "t")
            .with_posting(Posting::new("Assets:Stock", Amount::new(dec!(10), "HOOL")));

        let tolerances = infer_tolerances(&txn, &BookingOptions::default());
        assert!(tolerances.get("HOOL").is_none());
    }

    #[test]
    fn test_infer_tolerances_through_cost() {
        let txn = Transaction::new(date(2023, 1, 2), "t").with_posting(
            Posting::new("Assets:Stock", Amount::new(dec!(10.00), "HOOL"))
                .with_cost(Cost::new(dec!(100), "USD")),
        );

        let tolerances = infer_tolerances(&txn, &BookingOptions::default());
        assert_eq!(tolerances.get("HOOL"), Some(&dec!(0.005)));
        // 0.005 * 100
        assert_eq!(tolerances.get("USD"), Some(&dec!(0.500)));

        let without = infer_tolerances(
            &txn,
            &BookingOptions {
                infer_tolerance_from_cost: false,
                ..Default::default()
            },
        );
        assert!(without.get("USD").is_none());
    }

    #[test]
    fn test_tolerance_cap() {
        let txn = Transaction::new(date(2023, 1, 2), "t").with_posting(
            Posting::new("Assets:Stock", Amount::new(dec!(10.0), "HOOL"))
                .with_cost(Cost::new(dec!(1000), "USD")),
        );

        let tolerances = infer_tolerances(&txn, &BookingOptions::default());
        // 0.05 * 1000 = 50, capped.
        assert_eq!(tolerances.get("USD"), Some(&dec!(0.5)));
    }

    #[test]
    fn test_tolerance_defaults_participate() {
        let mut options = BookingOptions::default();
        options
            .tolerance_defaults
            .insert("USD".to_string(), dec!(0.01));

        let txn = Transaction::new(date(2023, 1, 2), "t")
            .with_posting(Posting::new("Expenses:Food", Amount::new(dec!(10.00), "USD")));

        let tolerances = infer_tolerances(&txn, &options);
        // Explicit 0.01 beats inferred 0.005.
        assert_eq!(tolerances.get("USD"), Some(&dec!(0.01)));
    }

    #[test]
    fn test_wildcard_default() {
        let mut options = BookingOptions::default();
        options.tolerance_defaults.insert("*".to_string(), dec!(0.02));

        let tolerances = HashMap::new();
        assert_eq!(
            tolerance_for(&tolerances, &options, &InternedStr::new("JPY")),
            dec!(0.02)
        );
    }

    #[test]
    fn test_is_balanced() {
        let balanced = Transaction::new(date(2023, 1, 2), "t")
            .with_posting(Posting::new("Expenses:Food", Amount::new(dec!(10.00), "USD")))
            .with_posting(Posting::new("Assets:Cash", Amount::new(dec!(-10.00), "USD")));
        assert!(is_balanced(&balanced, &BookingOptions::default()));

        let off_by_little = Transaction::new(date(2023, 1, 2), "t")
            .with_posting(Posting::new("Expenses:Food", Amount::new(dec!(10.004), "USD")))
            .with_posting(Posting::new("Assets:Cash", Amount::new(dec!(-10.00), "USD")));
        assert!(is_balanced(&off_by_little, &BookingOptions::default()));

        let off_by_much = Transaction::new(date(2023, 1, 2), "t")
            .with_posting(Posting::new("Expenses:Food", Amount::new(dec!(10.00), "USD")))
            .with_posting(Posting::new("Assets:Cash", Amount::new(dec!(-9.00), "USD")));
        assert!(!is_balanced(&off_by_much, &BookingOptions::default()));
    }
}
