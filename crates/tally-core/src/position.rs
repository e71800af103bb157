//! Position type: units held at an optional cost.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Amount, Cost, CostSpec};

/// Units of a currency held at an optional cost.
///
/// Plain currency holdings (cash) have no cost. Holdings acquired at a
/// price (stock, crypto) carry their cost basis as a lot.
///
/// # Examples
///
/// ```
/// use tally_core::{Amount, Cost, Position};
/// use rust_decimal_macros::dec;
///
/// let cash = Position::simple(Amount::new(dec!(1000.00), "USD"));
/// assert!(cash.cost.is_none());
///
/// let stock = Position::with_cost(
///     Amount::new(dec!(10), "HOOL"),
///     Cost::new(dec!(100.00), "USD"),
/// );
/// assert!(stock.cost.is_some());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    /// The units held.
    pub units: Amount,
    /// The cost basis, if tracked.
    pub cost: Option<Cost>,
}

impl Position {
    /// Create a position without cost tracking.
    #[must_use]
    pub const fn simple(units: Amount) -> Self {
        Self { units, cost: None }
    }

    /// Create a position with a cost basis.
    #[must_use]
    pub const fn with_cost(units: Amount, cost: Cost) -> Self {
        Self {
            units,
            cost: Some(cost),
        }
    }

    /// Check if this position has zero units.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.units.is_zero()
    }

    /// Get the currency of this position's units.
    #[must_use]
    pub fn currency(&self) -> &str {
        &self.units.currency
    }

    /// Get the cost currency, if this position has a cost.
    #[must_use]
    pub fn cost_currency(&self) -> Option<&str> {
        self.cost.as_ref().map(|c| c.currency.as_str())
    }

    /// The book value (units times per-unit cost) of this position.
    ///
    /// Returns `None` for uncosted positions.
    #[must_use]
    pub fn book_value(&self) -> Option<Amount> {
        self.cost.as_ref().map(|c| c.total_cost(self.units.number))
    }

    /// Check if this position matches a cost specification.
    ///
    /// An uncosted position only matches the empty spec.
    #[must_use]
    pub fn matches_cost_spec(&self, spec: &CostSpec) -> bool {
        match (&self.cost, spec.is_empty()) {
            (None, true) => true,
            (None, false) => false,
            (Some(cost), _) => spec.matches(cost),
        }
    }

    /// Negate this position.
    #[must_use]
    pub fn neg(&self) -> Self {
        Self {
            units: -&self.units,
            cost: self.cost.clone(),
        }
    }

    /// Split this position, taking `take_units` and leaving the rest.
    ///
    /// Both halves share the same cost.
    #[must_use]
    pub fn split(&self, take_units: Decimal) -> (Self, Self) {
        let taken = Self {
            units: Amount::new(take_units, self.units.currency.clone()),
            cost: self.cost.clone(),
        };
        let remaining = Self {
            units: Amount::new(self.units.number - take_units, self.units.currency.clone()),
            cost: self.cost.clone(),
        };
        (taken, remaining)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.units)?;
        if let Some(cost) = &self.cost {
            write!(f, " {cost}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn test_simple() {
        let pos = Position::simple(Amount::new(dec!(1000.00), "USD"));
        assert_eq!(pos.currency(), "USD");
        assert!(pos.cost.is_none());
        assert!(pos.book_value().is_none());
    }

    #[test]
    fn test_with_cost() {
        let cost = Cost::new(dec!(150.00), "USD").with_date(date(2023, 1, 15));
        let pos = Position::with_cost(Amount::new(dec!(10), "HOOL"), cost);

        assert_eq!(pos.currency(), "HOOL");
        assert_eq!(pos.cost_currency(), Some("USD"));

        let book = pos.book_value().unwrap();
        assert_eq!(book.number, dec!(1500.00));
        assert_eq!(book.currency, "USD");
    }

    #[test]
    fn test_is_empty() {
        assert!(Position::simple(Amount::zero("USD")).is_empty());
        assert!(!Position::simple(Amount::new(dec!(1), "USD")).is_empty());
    }

    #[test]
    fn test_neg() {
        let pos = Position::simple(Amount::new(dec!(100), "USD"));
        assert_eq!(pos.neg().units.number, dec!(-100));
    }

    #[test]
    fn test_split() {
        let cost = Cost::new(dec!(150.00), "USD");
        let pos = Position::with_cost(Amount::new(dec!(10), "HOOL"), cost);

        let (taken, remaining) = pos.split(dec!(3));
        assert_eq!(taken.units.number, dec!(3));
        assert_eq!(remaining.units.number, dec!(7));
        assert_eq!(taken.cost, pos.cost);
        assert_eq!(remaining.cost, pos.cost);
    }

    #[test]
    fn test_matches_cost_spec() {
        let cost = Cost::new(dec!(150.00), "USD").with_date(date(2023, 1, 15));
        let pos = Position::with_cost(Amount::new(dec!(10), "HOOL"), cost);

        assert!(pos.matches_cost_spec(&CostSpec::empty()));
        assert!(pos.matches_cost_spec(&CostSpec::empty().with_number_per(dec!(150.00))));
        assert!(!pos.matches_cost_spec(&CostSpec::empty().with_number_per(dec!(160.00))));

        let cash = Position::simple(Amount::new(dec!(100), "USD"));
        assert!(cash.matches_cost_spec(&CostSpec::empty()));
        assert!(!cash.matches_cost_spec(&CostSpec::empty().with_currency("USD")));
    }

    #[test]
    fn test_display() {
        let pos = Position::with_cost(
            Amount::new(dec!(10), "HOOL"),
            Cost::new(dec!(150.00), "USD"),
        );
        assert_eq!(format!("{pos}"), "10 HOOL {150.00 USD}");
    }
}
