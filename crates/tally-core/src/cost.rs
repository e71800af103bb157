//! Cost and cost specification types.
//!
//! A [`Cost`] is the fully resolved acquisition cost of a lot: per-unit
//! number, currency, acquisition date, and optional label. A [`CostSpec`] is
//! what the parser emits from `{...}` syntax: every field may be absent, and
//! booking either matches it against existing lots or binds it into a
//! concrete [`Cost`].

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::intern::InternedStr;
use crate::Amount;

/// The acquisition cost of a lot.
///
/// Buying 10 HOOL at 100 USD on 2023-01-02 produces a cost of
/// `{100 USD, 2023-01-02}`.
///
/// # Examples
///
/// ```
/// use tally_core::Cost;
/// use rust_decimal_macros::dec;
/// use chrono::NaiveDate;
///
/// let cost = Cost::new(dec!(100.00), "USD")
///     .with_date(NaiveDate::from_ymd_opt(2023, 1, 2).unwrap());
/// assert_eq!(cost.number, dec!(100.00));
/// assert_eq!(cost.currency, "USD");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Cost {
    /// Cost per unit.
    pub number: Decimal,
    /// Currency of the cost.
    pub currency: InternedStr,
    /// Acquisition date. Booking fills this from the transaction date when
    /// the user did not write one.
    pub date: Option<NaiveDate>,
    /// Lot label for explicit lot identification.
    pub label: Option<String>,
}

impl Cost {
    /// Create a new cost with the given per-unit number and currency.
    #[must_use]
    pub fn new(number: Decimal, currency: impl Into<InternedStr>) -> Self {
        Self {
            number,
            currency: currency.into(),
            date: None,
            label: None,
        }
    }

    /// Add a date to this cost.
    #[must_use]
    pub const fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    /// Add a label to this cost.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// The per-unit cost as an amount.
    #[must_use]
    pub fn as_amount(&self) -> Amount {
        Amount::new(self.number, self.currency.clone())
    }

    /// Total cost for the given number of units.
    #[must_use]
    pub fn total_cost(&self, units: Decimal) -> Amount {
        Amount::new(units * self.number, self.currency.clone())
    }
}

impl fmt::Display for Cost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{} {}", self.number, self.currency)?;
        if let Some(date) = self.date {
            write!(f, ", {date}")?;
        }
        if let Some(label) = &self.label {
            write!(f, ", \"{label}\"")?;
        }
        write!(f, "}}")
    }
}

/// An unbound cost specification from `{...}` / `{{...}}` syntax.
///
/// All fields are optional. On a reduction the populated fields narrow the
/// set of candidate lots; on an augmentation booking resolves the spec into
/// a concrete [`Cost`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CostSpec {
    /// Cost per unit, if written.
    pub number_per: Option<Decimal>,
    /// Total cost, if written (alternative to `number_per`).
    pub number_total: Option<Decimal>,
    /// Currency of the cost, if written.
    pub currency: Option<InternedStr>,
    /// Acquisition date, if written.
    pub date: Option<NaiveDate>,
    /// Lot label, if written.
    pub label: Option<String>,
    /// Whether to merge with existing lots (average-cost syntax `{*}`).
    pub merge: bool,
}

impl CostSpec {
    /// Create an empty cost spec.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Set the per-unit cost.
    #[must_use]
    pub const fn with_number_per(mut self, number: Decimal) -> Self {
        self.number_per = Some(number);
        self
    }

    /// Set the total cost.
    #[must_use]
    pub const fn with_number_total(mut self, number: Decimal) -> Self {
        self.number_total = Some(number);
        self
    }

    /// Set the currency.
    #[must_use]
    pub fn with_currency(mut self, currency: impl Into<InternedStr>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    /// Set the date.
    #[must_use]
    pub const fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    /// Set the label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the merge flag.
    #[must_use]
    pub const fn with_merge(mut self) -> Self {
        self.merge = true;
        self
    }

    /// Check if every field is absent.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.number_per.is_none()
            && self.number_total.is_none()
            && self.currency.is_none()
            && self.date.is_none()
            && self.label.is_none()
            && !self.merge
    }

    /// Whether either cost number was written.
    #[must_use]
    pub const fn has_number(&self) -> bool {
        self.number_per.is_some() || self.number_total.is_some()
    }

    /// Check if this spec matches a concrete cost.
    ///
    /// Every populated field must agree with the corresponding cost field.
    #[must_use]
    pub fn matches(&self, cost: &Cost) -> bool {
        if let Some(n) = &self.number_per {
            if n != &cost.number {
                return false;
            }
        }
        if let Some(c) = &self.currency {
            if c != &cost.currency {
                return false;
            }
        }
        if let Some(d) = &self.date {
            if cost.date.as_ref() != Some(d) {
                return false;
            }
        }
        if let Some(l) = &self.label {
            if cost.label.as_ref() != Some(l) {
                return false;
            }
        }
        true
    }

    /// Bind this spec into a concrete [`Cost`] for the given units.
    ///
    /// The per-unit number combines both written forms:
    /// `(number_total + number_per * |units|) / |units|`, with absent terms
    /// omitted. `default_date` fills a missing acquisition date.
    ///
    /// Returns `None` when the currency or both numbers are missing, or the
    /// units are zero while only a total was written.
    #[must_use]
    pub fn bind(&self, units: Decimal, default_date: NaiveDate) -> Option<Cost> {
        let currency = self.currency.clone()?;

        let number = match (self.number_per, self.number_total) {
            (Some(per), None) => per,
            (None, Some(total)) => {
                if units.is_zero() {
                    return None;
                }
                total / units.abs()
            }
            (Some(per), Some(total)) => {
                if units.is_zero() {
                    return None;
                }
                (total + per * units.abs()) / units.abs()
            }
            (None, None) => return None,
        };

        Some(Cost {
            number,
            currency,
            date: self.date.or(Some(default_date)),
            label: self.label.clone(),
        })
    }
}

impl fmt::Display for CostSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();

        if let Some(n) = self.number_per {
            parts.push(format!("{n}"));
        }
        if let Some(n) = self.number_total {
            parts.push(format!("# {n}"));
        }
        if let Some(c) = &self.currency {
            parts.push(c.to_string());
        }
        if let Some(d) = self.date {
            parts.push(d.to_string());
        }
        if let Some(l) = &self.label {
            parts.push(format!("\"{l}\""));
        }
        if self.merge {
            parts.push("*".to_string());
        }

        write!(f, "{{{}}}", parts.join(", "))
    }
}
