//! The full booking pass.
//!
//! Walks the sorted directive stream, rewriting each transaction:
//! categorize postings into currency buckets, book reductions against the
//! per-account inventories, interpolate the one permitted missing number
//! per bucket, and bind every cost spec to a concrete cost. Transactions
//! that fail to book pass through unchanged with their errors recorded, and
//! leave the inventories untouched.

use rust_decimal::prelude::Signed;
use rust_decimal::Decimal;
use std::collections::HashMap;

use tally_core::{
    Amount, BookingMethod, Directive, IncompleteAmount, InternedStr, Inventory, NaiveDate,
    Posting, PostingCost, PriceAnnotation, Transaction,
};

use crate::{infer_tolerances, posting_weight, tolerance_for, BookError, BookingOptions};

/// Book a directive stream against empty opening balances.
#[must_use]
pub fn book(
    directives: Vec<Directive>,
    options: &BookingOptions,
) -> (Vec<Directive>, Vec<BookError>) {
    book_with_balances(directives, options, HashMap::new())
}

/// Book a directive stream, starting from the given per-account balances.
///
/// Only transactions are rewritten. The stream must already be sorted; each
/// transaction is booked against the balances accumulated from the
/// transactions before it.
#[must_use]
pub fn book_with_balances(
    directives: Vec<Directive>,
    options: &BookingOptions,
    mut balances: HashMap<String, Inventory>,
) -> (Vec<Directive>, Vec<BookError>) {
    let mut methods: HashMap<String, BookingMethod> = HashMap::new();
    let mut errors = Vec::new();
    let mut out = Vec::with_capacity(directives.len());

    for directive in directives {
        match directive {
            Directive::Open(open) => {
                let method = open
                    .booking
                    .as_deref()
                    .and_then(|name| name.parse().ok())
                    .unwrap_or(options.default_method);
                methods.insert(open.account.clone(), method);
                balances.entry(open.account.clone()).or_default();
                out.push(Directive::Open(open));
            }
            Directive::Transaction(txn) => {
                match book_transaction(&txn, &methods, &mut balances, options) {
                    Ok(booked) => out.push(Directive::Transaction(booked)),
                    Err(mut errs) => {
                        errors.append(&mut errs);
                        out.push(Directive::Transaction(txn));
                    }
                }
            }
            other => out.push(other),
        }
    }

    (out, errors)
}

/// A working posting: its original index, the rewritten posting, and
/// whether a reduction already consumed it from the inventory.
#[derive(Debug, Clone)]
struct Worked {
    idx: usize,
    posting: Posting,
    booked: bool,
}

/// Book one transaction. On success the affected balances are updated; on
/// error they are left alone.
fn book_transaction(
    txn: &Transaction,
    methods: &HashMap<String, BookingMethod>,
    balances: &mut HashMap<String, Inventory>,
    options: &BookingOptions,
) -> Result<Transaction, Vec<BookError>> {
    let date = txn.date;

    check_self_reduction(txn)?;
    let groups = categorize(txn, balances)?;

    // Working copies of the touched inventories; committed only on success.
    let mut local: HashMap<String, Inventory> = HashMap::new();
    let mut new_postings: Vec<Worked> = Vec::new();
    let mut errors = Vec::new();

    for (bucket, group) in groups {
        match book_group(date, &bucket, group, methods, options, balances, &mut local) {
            Ok(mut postings) => new_postings.append(&mut postings),
            Err(e) => errors.push(e),
        }
    }
    if !errors.is_empty() {
        return Err(errors);
    }

    // Reassemble in original posting order; a booked reduction expands into
    // several postings at its original position.
    new_postings.sort_by_key(|w| w.idx);
    let mut booked = txn.clone();
    booked.postings = new_postings.into_iter().map(|w| w.posting).collect();

    // Contract check: nothing may remain missing after booking.
    for posting in &booked.postings {
        if posting.is_incomplete() {
            errors.push(BookError::Incomplete {
                date,
                account: posting.account.clone(),
            });
        }
    }
    if !errors.is_empty() {
        return Err(errors);
    }

    for (account, inventory) in local {
        balances.insert(account, inventory);
    }
    Ok(booked)
}

/// Error when at-cost postings of one account push the same commodity in
/// both directions within a single transaction.
fn check_self_reduction(txn: &Transaction) -> Result<(), Vec<BookError>> {
    let mut signs: HashMap<(&str, &InternedStr), Decimal> = HashMap::new();
    let mut errors = Vec::new();

    for posting in &txn.postings {
        if posting.cost.is_none() {
            continue;
        }
        let Some(units) = posting.amount() else {
            continue;
        };
        if units.is_zero() {
            continue;
        }
        let key = (posting.account.as_str(), &units.currency);
        let sign = units.number.signum();
        if let Some(prior) = signs.insert(key, sign) {
            if prior != sign {
                errors.push(BookError::SelfReduction {
                    date: txn.date,
                    account: posting.account.clone(),
                    currency: units.currency.clone(),
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Categorize postings into currency buckets and replace inferable missing
/// currencies with the bucket currency.
///
/// The bucket of a posting is its cost currency if known, else its price
/// currency, else its units currency when it has neither cost nor price;
/// cost and price currencies absorb each other when only one is written.
/// Fully elided postings replicate into every bucket. A posting whose cost
/// currency is written nowhere (a bare `{...}` reduction with no price)
/// takes its bucket from the account's existing lots. A posting that still
/// lands nowhere is an error.
fn categorize(
    txn: &Transaction,
    balances: &HashMap<String, Inventory>,
) -> Result<Vec<(InternedStr, Vec<Worked>)>, Vec<BookError>> {
    let date = txn.date;
    let mut buckets: Vec<InternedStr> = Vec::new();
    let mut grouped: HashMap<InternedStr, Vec<Worked>> = HashMap::new();
    let mut autos: Vec<Worked> = Vec::new();
    let mut unplaced: Vec<Worked> = Vec::new();

    for (idx, posting) in txn.postings.iter().enumerate() {
        let units_currency = posting
            .units
            .as_ref()
            .and_then(IncompleteAmount::currency)
            .cloned();
        let written_cost = posting
            .cost
            .as_ref()
            .and_then(PostingCost::currency)
            .cloned();
        let written_price = posting
            .price
            .as_ref()
            .and_then(PriceAnnotation::currency)
            .cloned();
        let cost_currency = written_cost.clone().or_else(|| written_price.clone());
        let price_currency = written_price.or(written_cost);

        let bucket = if posting.cost.is_some() || posting.price.is_some() {
            cost_currency.or(price_currency)
        } else {
            units_currency
        };

        let worked = Worked {
            idx,
            posting: posting.clone(),
            booked: false,
        };

        if posting.units.is_none() && posting.cost.is_none() && posting.price.is_none() {
            autos.push(worked);
        } else if let Some(bucket) = bucket {
            if !grouped.contains_key(&bucket) {
                buckets.push(bucket.clone());
            }
            grouped.entry(bucket).or_default().push(worked);
        } else {
            unplaced.push(worked);
        }
    }

    let mut errors = Vec::new();

    // A posting with numbers but no currency anywhere takes its bucket
    // from the account's lots when those agree on one cost currency, or
    // from the transaction's single bucket.
    for worked in unplaced {
        let from_lots = bucket_from_lots(balances, &worked.posting);
        if let Some(bucket) = from_lots {
            if !grouped.contains_key(&bucket) {
                buckets.push(bucket.clone());
            }
            grouped.entry(bucket).or_default().push(worked);
        } else if buckets.len() == 1 {
            grouped
                .get_mut(&buckets[0])
                .expect("bucket exists")
                .push(worked);
        } else {
            errors.push(BookError::Categorization {
                date,
                account: worked.posting.account.clone(),
                message: "no currency can be inferred".to_string(),
            });
        }
    }

    // A fully elided posting absorbs the residual of every bucket. Two of
    // them in one transaction cannot be told apart.
    if autos.len() > 1 {
        errors.push(BookError::Interpolation {
            date,
            message: "too many missing numbers".to_string(),
        });
    } else if let Some(auto) = autos.into_iter().next() {
        if buckets.is_empty() {
            errors.push(BookError::Categorization {
                date,
                account: auto.posting.account.clone(),
                message: "no currency can be inferred for elided posting".to_string(),
            });
        } else {
            for bucket in &buckets {
                grouped
                    .get_mut(bucket)
                    .expect("bucket exists")
                    .push(auto.clone());
            }
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    // Replace missing currencies with the bucket currency, group by group.
    let mut out = Vec::with_capacity(buckets.len());
    for bucket in buckets {
        let mut group = grouped.remove(&bucket).unwrap_or_default();
        group.sort_by_key(|w| w.idx);
        for worked in &mut group {
            if let Err(message) = fill_currencies(&mut worked.posting, &bucket) {
                errors.push(BookError::Categorization {
                    date,
                    account: worked.posting.account.clone(),
                    message,
                });
            }
        }
        out.push((bucket, group));
    }

    if errors.is_empty() {
        Ok(out)
    } else {
        Err(errors)
    }
}

/// The cost currency shared by all of the account's lots in the posting's
/// units currency, if there is exactly one.
fn bucket_from_lots(
    balances: &HashMap<String, Inventory>,
    posting: &Posting,
) -> Option<InternedStr> {
    if posting.cost.is_none() {
        return None;
    }
    let units_currency = posting.units.as_ref().and_then(IncompleteAmount::currency);
    let inventory = balances.get(&posting.account)?;

    let mut cost_currencies: Vec<InternedStr> = inventory
        .iter()
        .filter(|p| units_currency.map_or(true, |c| &p.units.currency == c))
        .filter_map(|p| p.cost.as_ref().map(|c| c.currency.clone()))
        .collect();
    cost_currencies.sort();
    cost_currencies.dedup();

    if cost_currencies.len() == 1 {
        cost_currencies.pop()
    } else {
        None
    }
}

/// Fill the bucket currency into a posting's missing currency slots.
fn fill_currencies(posting: &mut Posting, bucket: &InternedStr) -> Result<(), String> {
    // A bare number can only take the bucket currency when the bucket *is*
    // the units currency, i.e. the posting has no cost and no price.
    if let Some(IncompleteAmount::NumberOnly(number)) = posting.units {
        if posting.cost.is_none() && posting.price.is_none() {
            posting.units = Some(IncompleteAmount::Complete(Amount::new(
                number,
                bucket.clone(),
            )));
        } else {
            return Err("units currency cannot be inferred".to_string());
        }
    }

    if let Some(PostingCost::Spec(spec)) = &mut posting.cost {
        if spec.currency.is_none() {
            spec.currency = Some(bucket.clone());
        }
    }

    if let Some(price) = &mut posting.price {
        match price {
            PriceAnnotation::UnitIncomplete(IncompleteAmount::NumberOnly(n)) => {
                *price = PriceAnnotation::Unit(Amount::new(*n, bucket.clone()));
            }
            PriceAnnotation::TotalIncomplete(IncompleteAmount::NumberOnly(n)) => {
                *price = PriceAnnotation::Total(Amount::new(*n, bucket.clone()));
            }
            PriceAnnotation::UnitEmpty => {
                *price = PriceAnnotation::UnitIncomplete(IncompleteAmount::CurrencyOnly(
                    bucket.clone(),
                ));
            }
            PriceAnnotation::TotalEmpty => {
                *price = PriceAnnotation::TotalIncomplete(IncompleteAmount::CurrencyOnly(
                    bucket.clone(),
                ));
            }
            _ => {}
        }
    }

    Ok(())
}

/// The missing number of a posting; at most one is solvable per bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MissingNumber {
    Units,
    CostNumber,
    PriceNumber,
}

/// Book one currency group: reductions, interpolation, a second reduction
/// chance for interpolated postings, cost binding, then augmentation of the
/// working inventories.
fn book_group(
    date: NaiveDate,
    bucket: &InternedStr,
    group: Vec<Worked>,
    methods: &HashMap<String, BookingMethod>,
    options: &BookingOptions,
    balances: &HashMap<String, Inventory>,
    local: &mut HashMap<String, Inventory>,
) -> Result<Vec<Worked>, BookError> {
    let mut worked = reduce_pass(date, group, methods, options, balances, local)?;

    // Find the group's missing numbers.
    let mut missing: Vec<(usize, MissingNumber)> = Vec::new();
    for (i, w) in worked.iter().enumerate() {
        if w.posting.amount().is_none() {
            missing.push((i, MissingNumber::Units));
        }
        if let Some(PostingCost::Spec(spec)) = &w.posting.cost {
            if !spec.has_number() {
                missing.push((i, MissingNumber::CostNumber));
            }
        }
        if let Some(price) = &w.posting.price {
            if price.amount().is_none() {
                missing.push((i, MissingNumber::PriceNumber));
            }
        }
    }
    if missing.len() > 1 {
        return Err(BookError::Interpolation {
            date,
            message: "too many missing numbers".to_string(),
        });
    }

    // Solve the single missing number against the residual of the fully
    // specified siblings; the solved posting may itself turn out to be a
    // reduction.
    let solved = if let Some((target, kind)) = missing.into_iter().next() {
        let mut residual = Decimal::ZERO;
        for (i, w) in worked.iter().enumerate() {
            if i == target {
                continue;
            }
            let (_, weight) =
                posting_weight(&w.posting).ok_or_else(|| BookError::Interpolation {
                    date,
                    message: "too many missing numbers".to_string(),
                })?;
            residual += weight;
        }
        solve_missing(date, bucket, &mut worked[target].posting, kind, residual)?;
        worked = reduce_pass(date, worked, methods, options, balances, local)?;
        true
    } else {
        false
    };

    // Close out: a group with nothing to solve must already sum to zero
    // within tolerance. Weights here still see original cost specs, so
    // totals are exact. Solved groups balance by construction.
    if !solved {
        let mut residual = Decimal::ZERO;
        for w in &worked {
            let (_, weight) =
                posting_weight(&w.posting).ok_or_else(|| BookError::Incomplete {
                    date,
                    account: w.posting.account.clone(),
                })?;
            residual += weight;
        }
        let mut probe = Transaction::new(date, "");
        probe.postings = worked.iter().map(|w| w.posting.clone()).collect();
        let tolerances = infer_tolerances(&probe, options);
        if residual.abs() > tolerance_for(&tolerances, options, bucket) {
            return Err(BookError::Unbalanced {
                date,
                currency: bucket.clone(),
                residual,
            });
        }
    }

    // Bind surviving cost specs (augmentations and NONE-method postings).
    for w in &mut worked {
        let posting = &mut w.posting;
        if let Some(PostingCost::Spec(spec)) = &posting.cost {
            let units = posting.amount().ok_or_else(|| BookError::Incomplete {
                date,
                account: posting.account.clone(),
            })?;
            let cost =
                spec.bind(units.number, date)
                    .ok_or_else(|| BookError::Interpolation {
                        date,
                        message: format!(
                            "cost for {} cannot be resolved from {spec}",
                            posting.account
                        ),
                    })?;
            if cost.number.is_sign_negative() {
                return Err(BookError::Interpolation {
                    date,
                    message: format!("negative cost for {}", posting.account),
                });
            }
            posting.cost = Some(PostingCost::Bound(cost));
        }
    }

    // Apply everything a reduction did not already consume.
    for w in &worked {
        if w.booked {
            continue;
        }
        let posting = &w.posting;
        if let Some(units) = posting.amount() {
            let inventory = local
                .entry(posting.account.clone())
                .or_insert_with(|| balances.get(&posting.account).cloned().unwrap_or_default());
            let cost = posting.bound_cost().cloned();
            inventory.add_amount(units.clone(), cost);
        }
    }

    Ok(worked)
}

/// Replace reducing postings with the lots they consume.
///
/// A posting reduces when it carries a cost spec, its units are known, its
/// account's method matches lots, and the account holds opposing units.
/// Consumption happens against the working inventory, so a failed
/// transaction never leaks partial reductions. Already-booked postings pass
/// through untouched, which makes the pass safe to run again after
/// interpolation.
fn reduce_pass(
    date: NaiveDate,
    group: Vec<Worked>,
    methods: &HashMap<String, BookingMethod>,
    options: &BookingOptions,
    balances: &HashMap<String, Inventory>,
    local: &mut HashMap<String, Inventory>,
) -> Result<Vec<Worked>, BookError> {
    let mut out: Vec<Worked> = Vec::with_capacity(group.len());

    for w in group {
        let method = methods
            .get(&w.posting.account)
            .copied()
            .unwrap_or(options.default_method);

        let reducible = !w.booked
            && method != BookingMethod::None
            && matches!(w.posting.cost, Some(PostingCost::Spec(_)))
            && w.posting.amount().is_some();
        if !reducible {
            out.push(w);
            continue;
        }

        let units = w.posting.amount().expect("units checked above").clone();
        let inventory = local
            .entry(w.posting.account.clone())
            .or_insert_with(|| balances.get(&w.posting.account).cloned().unwrap_or_default());
        if !inventory.is_reduced_by(&units) {
            out.push(w);
            continue;
        }

        let Some(PostingCost::Spec(spec)) = &w.posting.cost else {
            unreachable!("reducible postings carry a spec");
        };
        let consumed =
            inventory
                .reduce(&units, spec, method)
                .map_err(|source| BookError::Reduction {
                    date,
                    account: w.posting.account.clone(),
                    source,
                })?;

        for lot in consumed {
            let mut reduction = w.posting.clone();
            reduction.units = Some(IncompleteAmount::Complete(lot.units));
            reduction.cost = Some(PostingCost::Bound(lot.cost.expect("reductions match lots")));
            out.push(Worked {
                idx: w.idx,
                posting: reduction,
                booked: true,
            });
        }
    }

    Ok(out)
}

/// Solve one missing number so the bucket residual becomes zero.
fn solve_missing(
    date: NaiveDate,
    bucket: &InternedStr,
    posting: &mut Posting,
    kind: MissingNumber,
    residual: Decimal,
) -> Result<(), BookError> {
    match kind {
        MissingNumber::Units => {
            let written_currency = posting
                .units
                .as_ref()
                .and_then(IncompleteAmount::currency)
                .cloned();
            // Without a written currency the units can only take the bucket
            // currency, which is wrong as soon as a cost or price redirects
            // the bucket elsewhere.
            let units_currency = match written_currency {
                Some(currency) => currency,
                None if posting.cost.is_none() && posting.price.is_none() => bucket.clone(),
                None => {
                    return Err(BookError::Interpolation {
                        date,
                        message: format!(
                            "units currency for {} cannot be inferred",
                            posting.account
                        ),
                    })
                }
            };

            let number = if let Some(PostingCost::Spec(spec)) = &posting.cost {
                let Some(per) = spec.number_per else {
                    return Err(BookError::Interpolation {
                        date,
                        message: format!(
                            "units for {} cannot be inferred without a per-unit cost",
                            posting.account
                        ),
                    });
                };
                -residual / per
            } else if let Some(price) = &posting.price {
                match price.amount() {
                    Some(per) if price.is_unit() => -residual / per.number,
                    _ => {
                        return Err(BookError::Interpolation {
                            date,
                            message: format!(
                                "units for {} cannot be inferred from a total price",
                                posting.account
                            ),
                        })
                    }
                }
            } else {
                -residual
            };

            if number.is_zero() {
                return Err(BookError::Interpolation {
                    date,
                    message: format!("interpolated zero units for {}", posting.account),
                });
            }
            posting.units = Some(IncompleteAmount::Complete(Amount::new(
                number,
                units_currency,
            )));
        }

        MissingNumber::CostNumber => {
            let units_number = posting
                .amount()
                .ok_or_else(|| BookError::Interpolation {
                    date,
                    message: "too many missing numbers".to_string(),
                })?
                .number;
            let per = -residual / units_number;
            if per.is_sign_negative() {
                return Err(BookError::Interpolation {
                    date,
                    message: format!("negative cost for {}", posting.account),
                });
            }
            let Some(PostingCost::Spec(spec)) = &mut posting.cost else {
                unreachable!("missing cost number implies a spec");
            };
            spec.number_per = Some(per);
        }

        MissingNumber::PriceNumber => {
            let units_number = posting
                .amount()
                .ok_or_else(|| BookError::Interpolation {
                    date,
                    message: "too many missing numbers".to_string(),
                })?
                .number;
            let price = posting.price.as_mut().expect("missing price implies one");
            let is_unit = price.is_unit();
            let currency = price.currency().cloned().unwrap_or_else(|| bucket.clone());
            *price = if is_unit {
                PriceAnnotation::Unit(Amount::new(-residual / units_number, currency))
            } else {
                PriceAnnotation::Total(Amount::new(-residual * units_number.signum(), currency))
            };
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tally_core::{Cost, CostSpec, Open};

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn open(d: NaiveDate, account: &str) -> Directive {
        Directive::Open(Open::new(d, account))
    }

    fn open_with_booking(d: NaiveDate, account: &str, booking: &str) -> Directive {
        Directive::Open(Open::new(d, account).with_booking(booking))
    }

    fn txn_of(d: NaiveDate, narration: &str, postings: Vec<Posting>) -> Directive {
        let mut txn = Transaction::new(d, narration);
        txn.postings = postings;
        Directive::Transaction(txn)
    }

    fn booked_txn(directive: &Directive) -> &Transaction {
        directive.as_transaction().expect("transaction")
    }

    #[test]
    fn test_trivial_balanced_transaction() {
        let directives = vec![
            open(date(2023, 1, 1), "Assets:Cash"),
            open(date(2023, 1, 1), "Expenses:Food"),
            txn_of(
                date(2023, 1, 2),
                "lunch",
                vec![
                    Posting::new("Expenses:Food", Amount::new(dec!(10.00), "USD")),
                    Posting::new("Assets:Cash", Amount::new(dec!(-10.00), "USD")),
                ],
            ),
        ];

        let (out, errors) = book(directives, &BookingOptions::default());
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn test_elided_posting_interpolates() {
        let directives = vec![
            open(date(2023, 1, 1), "Assets:Cash"),
            open(date(2023, 1, 1), "Expenses:Food"),
            txn_of(
                date(2023, 1, 2),
                "lunch",
                vec![
                    Posting::new("Expenses:Food", Amount::new(dec!(10.00), "USD")),
                    Posting::auto("Assets:Cash"),
                ],
            ),
        ];

        let (out, errors) = book(directives, &BookingOptions::default());
        assert!(errors.is_empty(), "{errors:?}");

        let txn = booked_txn(&out[2]);
        let filled = txn.postings[1].amount().expect("interpolated");
        assert_eq!(filled.number, dec!(-10.00));
        assert_eq!(filled.currency, "USD");
    }

    #[test]
    fn test_currency_only_posting_interpolates() {
        let directives = vec![
            open(date(2023, 1, 1), "Assets:Cash"),
            open(date(2023, 1, 1), "Expenses:Food"),
            txn_of(
                date(2023, 1, 2),
                "lunch",
                vec![
                    Posting::new("Expenses:Food", Amount::new(dec!(10.00), "USD")),
                    Posting::with_incomplete(
                        "Assets:Cash",
                        IncompleteAmount::CurrencyOnly("USD".into()),
                    ),
                ],
            ),
        ];

        let (out, errors) = book(directives, &BookingOptions::default());
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(
            booked_txn(&out[2]).postings[1].amount().unwrap().number,
            dec!(-10.00)
        );
    }

    #[test]
    fn test_two_elided_postings_error() {
        let directives = vec![
            open(date(2023, 1, 1), "Assets:Cash"),
            open(date(2023, 1, 1), "Expenses:Food"),
            txn_of(
                date(2023, 1, 2),
                "lunch",
                vec![Posting::auto("Expenses:Food"), Posting::auto("Assets:Cash")],
            ),
        ];

        let (_, errors) = book(directives, &BookingOptions::default());
        assert_eq!(errors.len(), 1);
        assert!(matches!(&errors[0], BookError::Interpolation { message, .. }
            if message.contains("too many missing numbers")));
    }

    #[test]
    fn test_elided_posting_absorbs_multiple_currencies() {
        let directives = vec![
            open(date(2023, 1, 1), "Assets:Cash"),
            open(date(2023, 1, 1), "Expenses:Travel"),
            txn_of(
                date(2023, 1, 2),
                "trip",
                vec![
                    Posting::new("Expenses:Travel", Amount::new(dec!(10.00), "USD")),
                    Posting::new("Expenses:Travel", Amount::new(dec!(20.00), "EUR")),
                    Posting::auto("Assets:Cash"),
                ],
            ),
        ];

        let (out, errors) = book(directives, &BookingOptions::default());
        assert!(errors.is_empty(), "{errors:?}");

        let txn = booked_txn(&out[2]);
        // The elided posting replicated into both buckets.
        assert_eq!(txn.postings.len(), 4);
        let mut amounts: Vec<(String, Decimal)> = txn
            .postings
            .iter()
            .filter(|p| p.account == "Assets:Cash")
            .map(|p| {
                let a = p.amount().unwrap();
                (a.currency.to_string(), a.number)
            })
            .collect();
        amounts.sort();
        assert_eq!(
            amounts,
            vec![
                ("EUR".to_string(), dec!(-20.00)),
                ("USD".to_string(), dec!(-10.00)),
            ]
        );
    }

    #[test]
    fn test_augmentation_binds_cost_with_transaction_date() {
        let directives = vec![
            open(date(2023, 1, 1), "Assets:Cash"),
            open(date(2023, 1, 1), "Assets:Stock"),
            txn_of(
                date(2023, 1, 2),
                "buy",
                vec![
                    Posting::new("Assets:Stock", Amount::new(dec!(10), "HOOL")).with_cost_spec(
                        CostSpec::empty()
                            .with_number_per(dec!(100.00))
                            .with_currency("USD"),
                    ),
                    Posting::new("Assets:Cash", Amount::new(dec!(-1000.00), "USD")),
                ],
            ),
        ];

        let (out, errors) = book(directives, &BookingOptions::default());
        assert!(errors.is_empty(), "{errors:?}");

        let txn = booked_txn(&out[2]);
        let cost = txn.postings[0].bound_cost().expect("bound cost");
        assert_eq!(cost.number, dec!(100.00));
        assert_eq!(cost.currency, "USD");
        assert_eq!(cost.date, Some(date(2023, 1, 2)));
    }

    #[test]
    fn test_missing_cost_number_interpolates() {
        // 10 HOOL {USD} against -1000 USD: per-unit cost comes out at 100.
        let directives = vec![
            open(date(2023, 1, 1), "Assets:Cash"),
            open(date(2023, 1, 1), "Assets:Stock"),
            txn_of(
                date(2023, 1, 2),
                "buy",
                vec![
                    Posting::new("Assets:Stock", Amount::new(dec!(10), "HOOL"))
                        .with_cost_spec(CostSpec::empty().with_currency("USD")),
                    Posting::new("Assets:Cash", Amount::new(dec!(-1000.00), "USD")),
                ],
            ),
        ];

        let (out, errors) = book(directives, &BookingOptions::default());
        assert!(errors.is_empty(), "{errors:?}");

        let cost = booked_txn(&out[2]).postings[0].bound_cost().unwrap();
        assert_eq!(cost.number, dec!(100));
    }

    #[test]
    fn test_missing_units_with_cost_interpolates() {
        let directives = vec![
            open(date(2023, 1, 1), "Assets:Cash"),
            open(date(2023, 1, 1), "Assets:Stock"),
            txn_of(
                date(2023, 1, 2),
                "buy",
                vec![
                    Posting::with_incomplete(
                        "Assets:Stock",
                        IncompleteAmount::CurrencyOnly("HOOL".into()),
                    )
                    .with_cost_spec(
                        CostSpec::empty()
                            .with_number_per(dec!(100.00))
                            .with_currency("USD"),
                    ),
                    Posting::new("Assets:Cash", Amount::new(dec!(-1000.00), "USD")),
                ],
            ),
        ];

        let (out, errors) = book(directives, &BookingOptions::default());
        assert!(errors.is_empty(), "{errors:?}");

        let units = booked_txn(&out[2]).postings[0].amount().unwrap();
        assert_eq!(units.number, dec!(10));
        assert_eq!(units.currency, "HOOL");
    }

    #[test]
    fn test_missing_price_interpolates() {
        let directives = vec![
            open(date(2023, 1, 1), "Assets:USD"),
            open(date(2023, 1, 1), "Assets:EUR"),
            txn_of(
                date(2023, 1, 2),
                "exchange",
                vec![
                    Posting::new("Assets:USD", Amount::new(dec!(-100.00), "USD"))
                        .with_price(PriceAnnotation::UnitIncomplete(
                            IncompleteAmount::CurrencyOnly("EUR".into()),
                        )),
                    Posting::new("Assets:EUR", Amount::new(dec!(85.00), "EUR")),
                ],
            ),
        ];

        let (out, errors) = book(directives, &BookingOptions::default());
        assert!(errors.is_empty(), "{errors:?}");

        let txn = booked_txn(&out[2]);
        let Some(PriceAnnotation::Unit(price)) = &txn.postings[0].price else {
            panic!("expected solved unit price");
        };
        assert_eq!(price.number, dec!(0.85));
        assert_eq!(price.currency, "EUR");
    }

    #[test]
    fn test_fifo_reduction_splits_lots() {
        let hool = |per: Decimal| CostSpec::empty().with_number_per(per).with_currency("USD");
        let directives = vec![
            open(date(2023, 1, 1), "Assets:Cash"),
            open_with_booking(date(2023, 1, 1), "Assets:Stock", "FIFO"),
            txn_of(
                date(2023, 1, 1),
                "buy one",
                vec![
                    Posting::new("Assets:Stock", Amount::new(dec!(10), "HOOL"))
                        .with_cost_spec(hool(dec!(100.00))),
                    Posting::new("Assets:Cash", Amount::new(dec!(-1000.00), "USD")),
                ],
            ),
            txn_of(
                date(2023, 1, 2),
                "buy two",
                vec![
                    Posting::new("Assets:Stock", Amount::new(dec!(10), "HOOL"))
                        .with_cost_spec(hool(dec!(120.00))),
                    Posting::new("Assets:Cash", Amount::new(dec!(-1200.00), "USD")),
                ],
            ),
            txn_of(
                date(2023, 1, 3),
                "sell",
                vec![
                    Posting::new("Assets:Stock", Amount::new(dec!(-15), "HOOL"))
                        .with_cost_spec(CostSpec::empty())
                        .with_price(PriceAnnotation::Unit(Amount::new(dec!(130.00), "USD"))),
                    Posting::auto("Assets:Cash"),
                ],
            ),
        ];

        let (out, errors) = book(directives, &BookingOptions::default());
        assert!(errors.is_empty(), "{errors:?}");

        let sale = booked_txn(&out[4]);
        let stock: Vec<&Posting> = sale
            .postings
            .iter()
            .filter(|p| p.account == "Assets:Stock")
            .collect();
        assert_eq!(stock.len(), 2);

        assert_eq!(stock[0].amount().unwrap().number, dec!(-10));
        assert_eq!(stock[0].bound_cost().unwrap().number, dec!(100.00));
        assert_eq!(stock[0].bound_cost().unwrap().date, Some(date(2023, 1, 1)));

        assert_eq!(stock[1].amount().unwrap().number, dec!(-5));
        assert_eq!(stock[1].bound_cost().unwrap().number, dec!(120.00));

        // The cash offset absorbed the cost-basis residual.
        let cash = sale
            .postings
            .iter()
            .find(|p| p.account == "Assets:Cash")
            .unwrap();
        assert_eq!(cash.amount().unwrap().number, dec!(1600.00));
    }

    #[test]
    fn test_strict_ambiguous_reduction_errors() {
        let directives = vec![
            open(date(2023, 1, 1), "Assets:Cash"),
            open(date(2023, 1, 1), "Assets:Stock"),
            txn_of(
                date(2023, 1, 1),
                "buy one",
                vec![
                    Posting::new("Assets:Stock", Amount::new(dec!(10), "HOOL")).with_cost_spec(
                        CostSpec::empty()
                            .with_number_per(dec!(100.00))
                            .with_currency("USD"),
                    ),
                    Posting::new("Assets:Cash", Amount::new(dec!(-1000.00), "USD")),
                ],
            ),
            txn_of(
                date(2023, 1, 2),
                "buy two",
                vec![
                    Posting::new("Assets:Stock", Amount::new(dec!(10), "HOOL")).with_cost_spec(
                        CostSpec::empty()
                            .with_number_per(dec!(120.00))
                            .with_currency("USD"),
                    ),
                    Posting::new("Assets:Cash", Amount::new(dec!(-1200.00), "USD")),
                ],
            ),
            txn_of(
                date(2023, 1, 3),
                "ambiguous sell",
                vec![
                    Posting::new("Assets:Stock", Amount::new(dec!(-5), "HOOL"))
                        .with_cost_spec(CostSpec::empty())
                        .with_price(PriceAnnotation::Unit(Amount::new(dec!(130.00), "USD"))),
                    Posting::auto("Assets:Cash"),
                ],
            ),
        ];

        let (_, errors) = book(directives, &BookingOptions::default());
        assert_eq!(errors.len(), 1);
        assert!(matches!(&errors[0], BookError::Reduction { .. }));
    }

    #[test]
    fn test_reduction_exceeding_lots_leaves_inventory_alone() {
        let spec = CostSpec::empty()
            .with_number_per(dec!(100.00))
            .with_currency("USD");
        let directives = vec![
            open(date(2023, 1, 1), "Assets:Cash"),
            open_with_booking(date(2023, 1, 1), "Assets:Stock", "FIFO"),
            txn_of(
                date(2023, 1, 1),
                "buy",
                vec![
                    Posting::new("Assets:Stock", Amount::new(dec!(10), "HOOL"))
                        .with_cost_spec(spec.clone()),
                    Posting::new("Assets:Cash", Amount::new(dec!(-1000.00), "USD")),
                ],
            ),
            txn_of(
                date(2023, 1, 2),
                "oversell",
                vec![
                    Posting::new("Assets:Stock", Amount::new(dec!(-15), "HOOL"))
                        .with_cost_spec(spec.clone()),
                    Posting::new("Assets:Cash", Amount::new(dec!(1500.00), "USD")),
                ],
            ),
            // A later exact sale still books, proving the failed one did
            // not consume anything.
            txn_of(
                date(2023, 1, 3),
                "sell all",
                vec![
                    Posting::new("Assets:Stock", Amount::new(dec!(-10), "HOOL"))
                        .with_cost_spec(spec),
                    Posting::new("Assets:Cash", Amount::new(dec!(1000.00), "USD")),
                ],
            ),
        ];

        let (_, errors) = book(directives, &BookingOptions::default());
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            &errors[0],
            BookError::Reduction {
                source: tally_core::ReduceError::InsufficientUnits { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_booking_none_allows_negative_holdings() {
        let spec = CostSpec::empty()
            .with_number_per(dec!(100.00))
            .with_currency("USD");
        let directives = vec![
            open(date(2023, 1, 1), "Assets:Cash"),
            open_with_booking(date(2023, 1, 1), "Assets:Stock", "NONE"),
            txn_of(
                date(2023, 1, 2),
                "short sell",
                vec![
                    Posting::new("Assets:Stock", Amount::new(dec!(-10), "HOOL"))
                        .with_cost_spec(spec),
                    Posting::new("Assets:Cash", Amount::new(dec!(1000.00), "USD")),
                ],
            ),
        ];

        let (out, errors) = book(directives, &BookingOptions::default());
        assert!(errors.is_empty(), "{errors:?}");
        let cost = booked_txn(&out[2]).postings[0].bound_cost().unwrap();
        assert_eq!(cost.number, dec!(100.00));
    }

    #[test]
    fn test_self_reduction_errors() {
        let spec = CostSpec::empty()
            .with_number_per(dec!(100.00))
            .with_currency("USD");
        let directives = vec![
            open(date(2023, 1, 1), "Assets:Stock"),
            txn_of(
                date(2023, 1, 2),
                "both ways",
                vec![
                    Posting::new("Assets:Stock", Amount::new(dec!(10), "HOOL"))
                        .with_cost_spec(spec.clone()),
                    Posting::new("Assets:Stock", Amount::new(dec!(-10), "HOOL"))
                        .with_cost_spec(spec),
                ],
            ),
        ];

        let (_, errors) = book(directives, &BookingOptions::default());
        assert!(errors
            .iter()
            .any(|e| matches!(e, BookError::SelfReduction { .. })));
    }

    #[test]
    fn test_unbalanced_transaction_errors() {
        let directives = vec![
            open(date(2023, 1, 1), "Assets:Cash"),
            open(date(2023, 1, 1), "Expenses:Food"),
            txn_of(
                date(2023, 1, 2),
                "off by one",
                vec![
                    Posting::new("Expenses:Food", Amount::new(dec!(10.00), "USD")),
                    Posting::new("Assets:Cash", Amount::new(dec!(-9.00), "USD")),
                ],
            ),
        ];

        let (_, errors) = book(directives, &BookingOptions::default());
        assert_eq!(errors.len(), 1);
        assert!(matches!(&errors[0], BookError::Unbalanced { residual, .. }
            if *residual == dec!(1.00)));
    }

    #[test]
    fn test_residual_within_tolerance_passes() {
        let directives = vec![
            open(date(2023, 1, 1), "Assets:Cash"),
            open(date(2023, 1, 1), "Expenses:Food"),
            txn_of(
                date(2023, 1, 2),
                "rounding",
                vec![
                    Posting::new("Expenses:Food", Amount::new(dec!(10.004), "USD")),
                    Posting::new("Assets:Cash", Amount::new(dec!(-10.00), "USD")),
                ],
            ),
        ];

        let (_, errors) = book(directives, &BookingOptions::default());
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn test_interpolated_zero_units_rejected() {
        let directives = vec![
            open(date(2023, 1, 1), "Assets:Cash"),
            open(date(2023, 1, 1), "Expenses:Food"),
            txn_of(
                date(2023, 1, 2),
                "nothing to absorb",
                vec![
                    Posting::new("Expenses:Food", Amount::new(dec!(10.00), "USD")),
                    Posting::new("Assets:Cash", Amount::new(dec!(-10.00), "USD")),
                    Posting::auto("Assets:Cash"),
                ],
            ),
        ];

        let (_, errors) = book(directives, &BookingOptions::default());
        assert!(matches!(&errors[0], BookError::Interpolation { message, .. }
            if message.contains("zero units")));
    }

    #[test]
    fn test_initial_balances_feed_reductions() {
        let mut opening = Inventory::new();
        opening.add_amount(
            Amount::new(dec!(10), "HOOL"),
            Some(Cost::new(dec!(100.00), "USD").with_date(date(2022, 6, 1))),
        );
        let mut balances = HashMap::new();
        balances.insert("Assets:Stock".to_string(), opening);

        let directives = vec![
            open(date(2023, 1, 1), "Assets:Cash"),
            txn_of(
                date(2023, 1, 2),
                "sell from opening lot",
                vec![
                    Posting::new("Assets:Stock", Amount::new(dec!(-5), "HOOL"))
                        .with_cost_spec(CostSpec::empty()),
                    Posting::auto("Assets:Cash"),
                ],
            ),
        ];

        let (out, errors) = book_with_balances(directives, &BookingOptions::default(), balances);
        assert!(errors.is_empty(), "{errors:?}");
        let cost = booked_txn(&out[1]).postings[0].bound_cost().unwrap();
        assert_eq!(cost.number, dec!(100.00));
        assert_eq!(cost.date, Some(date(2022, 6, 1)));
    }
}
