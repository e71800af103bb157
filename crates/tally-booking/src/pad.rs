//! Pad directive processing.
//!
//! A `pad` directive promises that whatever the next balance assertion on
//! its account needs will be drawn from a source account. This pass walks
//! the booked stream, keeps running balances, and when a balance assertion
//! would need units in some currency, splices a synthetic flag-`P`
//! transaction dated at the pad:
//!
//! ```text
//! 2023-01-01 pad Assets:Bank Equity:Opening-Balances
//! 2023-02-01 balance Assets:Bank 500.00 USD
//! ```
//!
//! becomes
//!
//! ```text
//! 2023-01-01 pad Assets:Bank Equity:Opening-Balances
//! 2023-01-01 P "(Padding inserted for Balance of 500.00 USD for difference 500.00 USD)"
//!   Assets:Bank              500.00 USD
//!   Equity:Opening-Balances -500.00 USD
//! 2023-02-01 balance Assets:Bank 500.00 USD
//! ```
//!
//! Each currency pads at most once per pad directive; a pad that never
//! inserts anything is an error, as is padding an account holding
//! positions at cost.

use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

use tally_core::{
    Amount, Directive, InternedStr, Inventory, NaiveDate, Posting, Transaction,
};

/// Error from the pad pass.
#[derive(Debug, Clone, Error)]
pub enum PadError {
    /// A pad directive never caused an insertion.
    #[error("{date}: unused pad for {account}")]
    Unused {
        /// The pad's date.
        date: NaiveDate,
        /// The padded account.
        account: String,
    },

    /// The padded account holds positions at cost in the asserted currency.
    #[error("{date}: cannot pad {account}: it holds {currency} at cost")]
    CostedAccount {
        /// The pad's date.
        date: NaiveDate,
        /// The padded account.
        account: String,
        /// The currency held at cost.
        currency: InternedStr,
    },
}

/// A pad waiting for balance assertions to consume it.
#[derive(Debug)]
struct ActivePad {
    date: NaiveDate,
    source_account: String,
    /// Where in the output stream synthetic transactions are spliced.
    insert_at: usize,
    /// Currencies already padded under this pad.
    padded: HashSet<InternedStr>,
    used: bool,
}

/// Insert synthetic padding transactions into a booked directive stream.
///
/// The stream must be sorted. Returns the stream with padding transactions
/// spliced in just after their pad directives, plus any pad errors.
#[must_use]
pub fn process_pads(directives: Vec<Directive>) -> (Vec<Directive>, Vec<PadError>) {
    let mut balances: HashMap<String, Inventory> = HashMap::new();
    let mut active: HashMap<String, ActivePad> = HashMap::new();
    let mut out: Vec<Directive> = Vec::with_capacity(directives.len());
    let mut errors = Vec::new();

    for directive in directives {
        match directive {
            Directive::Open(open) => {
                balances.entry(open.account.clone()).or_default();
                out.push(Directive::Open(open));
            }

            Directive::Transaction(txn) => {
                apply_transaction(&mut balances, &txn);
                out.push(Directive::Transaction(txn));
            }

            Directive::Pad(pad) => {
                out.push(Directive::Pad(pad.clone()));
                let replaced = active.insert(
                    pad.account.clone(),
                    ActivePad {
                        date: pad.date,
                        source_account: pad.source_account.clone(),
                        insert_at: out.len(),
                        padded: HashSet::new(),
                        used: false,
                    },
                );
                if let Some(previous) = replaced {
                    if !previous.used {
                        errors.push(PadError::Unused {
                            date: previous.date,
                            account: pad.account.clone(),
                        });
                    }
                }
            }

            Directive::Balance(balance) => {
                let currency = balance.amount.currency.clone();
                if let Some(pad) = active.get_mut(&balance.account) {
                    if !pad.padded.contains(&currency) {
                        pad.padded.insert(currency.clone());

                        let current = balances
                            .get(&balance.account)
                            .map_or(Decimal::ZERO, |inv| inv.units(&currency));
                        let difference = balance.amount.number - current;

                        if !difference.is_zero() {
                            let holds_at_cost = balances
                                .get(&balance.account)
                                .is_some_and(|inv| {
                                    inv.iter().any(|p| {
                                        p.cost.is_some() && p.units.currency == currency
                                    })
                                });
                            if holds_at_cost {
                                errors.push(PadError::CostedAccount {
                                    date: pad.date,
                                    account: balance.account.clone(),
                                    currency: currency.clone(),
                                });
                            } else {
                                let amount = Amount::new(difference, currency.clone());
                                let synthetic = padding_transaction(
                                    pad.date,
                                    &balance.account,
                                    &pad.source_account,
                                    &balance.amount,
                                    &amount,
                                );
                                apply_transaction(&mut balances, &synthetic);

                                let at = pad.insert_at;
                                out.insert(at, Directive::Transaction(synthetic));
                                pad.used = true;
                                // Every splice point at or after the insertion
                                // shifts by one, including this pad's own, so
                                // a later currency lands after this entry.
                                for other in active.values_mut() {
                                    if other.insert_at >= at {
                                        other.insert_at += 1;
                                    }
                                }
                            }
                        }
                    }
                }
                out.push(Directive::Balance(balance));
            }

            other => out.push(other),
        }
    }

    for (account, pad) in active {
        if !pad.used {
            errors.push(PadError::Unused {
                date: pad.date,
                account,
            });
        }
    }

    (out, errors)
}

/// Replay a transaction's postings into the running balances.
fn apply_transaction(balances: &mut HashMap<String, Inventory>, txn: &Transaction) {
    for posting in &txn.postings {
        if let Some(units) = posting.amount() {
            balances
                .entry(posting.account.clone())
                .or_default()
                .add_amount(units.clone(), posting.bound_cost().cloned());
        }
    }
}

/// The synthetic transaction a pad inserts: the difference on the padded
/// account, its negation on the source, both uncosted.
fn padding_transaction(
    date: NaiveDate,
    account: &str,
    source_account: &str,
    asserted: &Amount,
    difference: &Amount,
) -> Transaction {
    Transaction::new(
        date,
        format!("(Padding inserted for Balance of {asserted} for difference {difference})"),
    )
    .with_flag('P')
    .with_posting(Posting::new(account, difference.clone()))
    .with_posting(Posting::new(source_account, -difference))
}
