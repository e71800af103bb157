//! Inventory: the multiset of positions held by an account.
//!
//! An [`Inventory`] maps a lot key `(currency, cost)` to a [`Position`].
//! Uncosted holdings of a currency share the single no-cost key; every
//! distinct cost is its own lot. Two invariants hold at all times: no
//! position has zero units, and keys are unique. Iteration order is the
//! key order, so results never depend on insertion order.

use rust_decimal::prelude::Signed;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use crate::intern::InternedStr;
use crate::{Amount, Cost, CostSpec, Position};

/// How lots are selected when a posting reduces a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BookingMethod {
    /// Exactly one lot must match, or the reduction is ambiguous.
    #[default]
    Strict,
    /// Like STRICT, but an exact-size match disambiguates.
    StrictWithSize,
    /// No lot matching; reductions simply augment, allowing negative
    /// holdings.
    None,
    /// Collapse all lots of the currency to their average cost first.
    Average,
    /// Consume the oldest lots first.
    Fifo,
    /// Consume the newest lots first.
    Lifo,
    /// Consume the highest-cost lots first.
    Hifo,
}

impl FromStr for BookingMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "STRICT" => Ok(Self::Strict),
            "STRICT_WITH_SIZE" => Ok(Self::StrictWithSize),
            "NONE" => Ok(Self::None),
            "AVERAGE" => Ok(Self::Average),
            "FIFO" => Ok(Self::Fifo),
            "LIFO" => Ok(Self::Lifo),
            "HIFO" => Ok(Self::Hifo),
            _ => Err(format!("unknown booking method: {s}")),
        }
    }
}

impl fmt::Display for BookingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Strict => "STRICT",
            Self::StrictWithSize => "STRICT_WITH_SIZE",
            Self::None => "NONE",
            Self::Average => "AVERAGE",
            Self::Fifo => "FIFO",
            Self::Lifo => "LIFO",
            Self::Hifo => "HIFO",
        };
        write!(f, "{s}")
    }
}

/// Outcome of applying an amount to an inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchResult {
    /// No entry existed at the key; a new position was created.
    Created,
    /// The new units opposed the sign of the existing position.
    Reduced,
    /// The new units extended the existing position.
    Augmented,
    /// Zero units against no existing entry; nothing happened.
    Ignored,
}

/// Error from reducing an inventory.
///
/// Reduction errors never leave the inventory partially mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReduceError {
    /// Multiple lots match but the booking method requires a unique match.
    AmbiguousMatch {
        /// Number of lots that matched.
        num_matches: usize,
        /// The currency being reduced.
        currency: InternedStr,
    },
    /// No lot matches the cost specification.
    NoMatchingLot {
        /// The currency being reduced.
        currency: InternedStr,
        /// The cost spec that failed to match.
        cost_spec: CostSpec,
    },
    /// The matching lots hold fewer units than requested.
    InsufficientUnits {
        /// The currency being reduced.
        currency: InternedStr,
        /// Units requested.
        requested: Decimal,
        /// Units available across matching lots.
        available: Decimal,
    },
}

impl fmt::Display for ReduceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AmbiguousMatch {
                num_matches,
                currency,
            } => write!(f, "ambiguous match: {num_matches} lots match for {currency}"),
            Self::NoMatchingLot {
                currency,
                cost_spec,
            } => write!(f, "no lot matching {cost_spec} for {currency}"),
            Self::InsufficientUnits {
                currency,
                requested,
                available,
            } => write!(
                f,
                "insufficient units of {currency}: requested {requested}, available {available}"
            ),
        }
    }
}

impl std::error::Error for ReduceError {}

type LotKey = (InternedStr, Option<Cost>);

/// A collection of positions keyed by (currency, cost).
///
/// # Examples
///
/// ```
/// use tally_core::{Amount, Cost, Inventory, MatchResult};
/// use rust_decimal_macros::dec;
///
/// let mut inv = Inventory::new();
///
/// let (prior, outcome) = inv.add_amount(Amount::new(dec!(100), "USD"), None);
/// assert!(prior.is_none());
/// assert_eq!(outcome, MatchResult::Created);
///
/// inv.add_amount(Amount::new(dec!(10), "HOOL"), Some(Cost::new(dec!(100.00), "USD")));
/// assert_eq!(inv.units("HOOL"), dec!(10));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    positions: BTreeMap<LotKey, Position>,
}

impl Inventory {
    /// Create an empty inventory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if the inventory holds no positions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Number of positions (lots plus uncosted holdings).
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Iterate positions in key order.
    pub fn iter(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    /// Apply an amount at an optional cost to the inventory.
    ///
    /// Returns the prior position at the lot key (if any) and what happened:
    ///
    /// - no entry and zero units → [`MatchResult::Ignored`]
    /// - no entry and non-zero units → [`MatchResult::Created`]
    /// - existing entry, opposite sign → [`MatchResult::Reduced`]
    /// - existing entry, same sign → [`MatchResult::Augmented`]
    ///
    /// An entry whose units reach zero is removed.
    pub fn add_amount(
        &mut self,
        units: Amount,
        cost: Option<Cost>,
    ) -> (Option<Position>, MatchResult) {
        let key = (units.currency.clone(), cost.clone());

        match self.positions.get_mut(&key) {
            None => {
                if units.is_zero() {
                    return (None, MatchResult::Ignored);
                }
                self.positions.insert(key, Position { units, cost });
                (None, MatchResult::Created)
            }
            Some(existing) => {
                let prior = existing.clone();
                let outcome = if existing.units.number.signum() == units.number.signum()
                    || units.is_zero()
                {
                    MatchResult::Augmented
                } else {
                    MatchResult::Reduced
                };
                existing.units.number += units.number;
                if existing.units.is_zero() {
                    self.positions.remove(&key);
                }
                (Some(prior), outcome)
            }
        }
    }

    /// Apply a position to the inventory.
    pub fn add_position(&mut self, position: Position) -> (Option<Position>, MatchResult) {
        self.add_amount(position.units, position.cost)
    }

    /// Apply every position of another inventory, in its iteration order.
    pub fn add_inventory(&mut self, other: &Self) {
        for position in other.iter() {
            self.add_position(position.clone());
        }
    }

    /// Check if applying `units` would reduce some existing position.
    ///
    /// True iff the amount is non-zero and a position with the same currency
    /// and opposite sign exists.
    #[must_use]
    pub fn is_reduced_by(&self, units: &Amount) -> bool {
        !units.is_zero()
            && self.positions.values().any(|p| {
                p.units.currency == units.currency
                    && p.units.number.signum() != units.number.signum()
            })
    }

    /// Check if every position's magnitude is within a single tolerance.
    #[must_use]
    pub fn is_small(&self, tolerance: Decimal) -> bool {
        self.positions
            .values()
            .all(|p| p.units.number.abs() <= tolerance)
    }

    /// Check if every position's magnitude is within its currency's
    /// tolerance, falling back to `default` for currencies without one.
    #[must_use]
    pub fn is_small_map(
        &self,
        tolerances: &HashMap<InternedStr, Decimal>,
        default: Decimal,
    ) -> bool {
        self.positions.values().all(|p| {
            let tolerance = tolerances
                .get(&p.units.currency)
                .copied()
                .unwrap_or(default);
            p.units.number.abs() <= tolerance
        })
    }

    /// Check if some currency is held in both directions.
    #[must_use]
    pub fn is_mixed(&self) -> bool {
        let mut signs: HashMap<&InternedStr, Decimal> = HashMap::new();
        for p in self.positions.values() {
            let sign = p.units.number.signum();
            if let Some(prior) = signs.insert(&p.units.currency, sign) {
                if prior != sign {
                    return true;
                }
            }
        }
        false
    }

    /// Signed sum of units held in a currency, across all lots.
    #[must_use]
    pub fn units(&self, currency: &str) -> Decimal {
        self.positions
            .values()
            .filter(|p| p.units.currency == currency)
            .map(|p| p.units.number)
            .sum()
    }

    /// All units currencies, sorted and deduplicated.
    #[must_use]
    pub fn currencies(&self) -> Vec<InternedStr> {
        let mut out: Vec<InternedStr> = self
            .positions
            .values()
            .map(|p| p.units.currency.clone())
            .collect();
        out.dedup();
        out
    }

    /// All cost currencies, sorted and deduplicated.
    #[must_use]
    pub fn cost_currencies(&self) -> Vec<InternedStr> {
        let mut out: Vec<InternedStr> = self
            .positions
            .values()
            .filter_map(|p| p.cost.as_ref().map(|c| c.currency.clone()))
            .collect();
        out.sort();
        out.dedup();
        out
    }

    /// The set of (units currency, cost currency) pairs held.
    #[must_use]
    pub fn currency_pairs(&self) -> BTreeSet<(InternedStr, Option<InternedStr>)> {
        self.positions
            .values()
            .map(|p| {
                (
                    p.units.currency.clone(),
                    p.cost.as_ref().map(|c| c.currency.clone()),
                )
            })
            .collect()
    }

    /// Collapse lots to per-unit averages.
    ///
    /// Positions are grouped by (units currency, cost currency); each group
    /// becomes a single position whose units are the group sum and whose
    /// cost is the total book value divided by the total units, dated at the
    /// earliest lot date with no label. Groups summing to zero units are
    /// dropped; uncosted holdings pass through merged.
    #[must_use]
    pub fn average(&self) -> Self {
        #[derive(Default)]
        struct Group {
            units: Decimal,
            book_value: Decimal,
            earliest: Option<chrono::NaiveDate>,
        }

        let mut groups: BTreeMap<(InternedStr, Option<InternedStr>), Group> = BTreeMap::new();

        for p in self.positions.values() {
            let key = (
                p.units.currency.clone(),
                p.cost.as_ref().map(|c| c.currency.clone()),
            );
            let group = groups.entry(key).or_default();
            group.units += p.units.number;
            if let Some(cost) = &p.cost {
                group.book_value += p.units.number * cost.number;
                group.earliest = match (group.earliest, cost.date) {
                    (Some(a), Some(b)) => Some(a.min(b)),
                    (a, b) => a.or(b),
                };
            }
        }

        let mut result = Self::new();
        for ((currency, cost_currency), group) in groups {
            if group.units.is_zero() {
                continue;
            }
            let units = Amount::new(group.units, currency);
            match cost_currency {
                Some(cost_currency) => {
                    let mut cost = Cost::new(group.book_value / group.units, cost_currency);
                    cost.date = group.earliest;
                    result.add_position(Position::with_cost(units, cost));
                }
                None => {
                    result.add_amount(units, None);
                }
            }
        }
        result
    }

    /// Split into one inventory per units currency.
    #[must_use]
    pub fn split(&self) -> BTreeMap<InternedStr, Self> {
        let mut out: BTreeMap<InternedStr, Self> = BTreeMap::new();
        for p in self.positions.values() {
            out.entry(p.units.currency.clone())
                .or_default()
                .add_position(p.clone());
        }
        out
    }

    /// Verify the structural invariants: no zero-unit position, and every
    /// position stored under its own lot key.
    ///
    /// # Errors
    ///
    /// Returns a description of the first violated invariant.
    pub fn check_invariants(&self) -> Result<(), String> {
        for ((currency, cost), position) in &self.positions {
            if position.units.is_zero() {
                return Err(format!("zero-unit position for {currency}"));
            }
            if &position.units.currency != currency || &position.cost != cost {
                return Err(format!("position stored under wrong key for {currency}"));
            }
        }
        Ok(())
    }

    /// Reduce matching lots under a booking method.
    ///
    /// Candidates are the costed lots in the reduction's currency with the
    /// opposite sign that match `spec`. Returns the consumed portions, each
    /// carrying the sign of the reduction and the cost of the lot it came
    /// from, in consumption order. On error no units have been consumed,
    /// though AVERAGE may already have collapsed the currency's lots.
    ///
    /// [`BookingMethod::None`] never reaches this function: under it
    /// reductions are ordinary augmentations.
    ///
    /// # Errors
    ///
    /// [`ReduceError::NoMatchingLot`] when no candidate exists,
    /// [`ReduceError::AmbiguousMatch`] when STRICT cannot pick a unique lot,
    /// and [`ReduceError::InsufficientUnits`] when the candidates cannot
    /// cover the requested quantity.
    pub fn reduce(
        &mut self,
        units: &Amount,
        spec: &CostSpec,
        method: BookingMethod,
    ) -> Result<Vec<Position>, ReduceError> {
        if method == BookingMethod::Average {
            // Collapse this currency's lots first, then book against the
            // single averaged lot.
            let averaged = self.average();
            let kept: Vec<Position> = self
                .positions
                .values()
                .filter(|p| p.units.currency != units.currency)
                .cloned()
                .collect();
            let replaced: Vec<Position> = averaged
                .iter()
                .filter(|p| p.units.currency == units.currency)
                .cloned()
                .collect();
            self.positions.clear();
            for p in kept.into_iter().chain(replaced) {
                self.add_position(p);
            }
            return self.reduce(units, spec, BookingMethod::Strict);
        }

        let candidates = self.matching_lots(units, spec);
        if candidates.is_empty() {
            return Err(ReduceError::NoMatchingLot {
                currency: units.currency.clone(),
                cost_spec: spec.clone(),
            });
        }

        let requested = units.number.abs();
        let available: Decimal = candidates
            .iter()
            .map(|key| self.positions[key].units.number.abs())
            .sum();
        if requested > available {
            return Err(ReduceError::InsufficientUnits {
                currency: units.currency.clone(),
                requested,
                available,
            });
        }

        let ordered = match method {
            BookingMethod::Strict => self.order_strict(candidates, units, false)?,
            BookingMethod::StrictWithSize => self.order_strict(candidates, units, true)?,
            BookingMethod::Fifo => self.order_by_date(candidates, false),
            BookingMethod::Lifo => self.order_by_date(candidates, true),
            BookingMethod::Hifo => self.order_by_cost(candidates),
            BookingMethod::Average | BookingMethod::None => unreachable!(),
        };

        Ok(self.consume(units, &ordered))
    }

    /// Costed lots in the reduction's currency with opposite sign matching
    /// the spec, in key order.
    fn matching_lots(&self, units: &Amount, spec: &CostSpec) -> Vec<LotKey> {
        self.positions
            .iter()
            .filter(|((_, cost), p)| {
                cost.is_some()
                    && p.units.currency == units.currency
                    && p.units.number.signum() != units.number.signum()
                    && p.matches_cost_spec(spec)
            })
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// STRICT ordering: a unique candidate wins outright. Several
    /// candidates are acceptable only when the reduction consumes them all
    /// (the total-match exception) or, with `accept_size`, when exactly one
    /// lot has the same magnitude as the reduction.
    fn order_strict(
        &self,
        candidates: Vec<LotKey>,
        units: &Amount,
        accept_size: bool,
    ) -> Result<Vec<LotKey>, ReduceError> {
        if candidates.len() == 1 {
            return Ok(candidates);
        }

        if accept_size {
            let exact: Vec<LotKey> = candidates
                .iter()
                .filter(|key| self.positions[*key].units.number.abs() == units.number.abs())
                .cloned()
                .collect();
            if !exact.is_empty() {
                // Oldest exact-size match wins.
                return Ok(self.order_by_date(exact, false).into_iter().take(1).collect());
            }
        }

        let total: Decimal = candidates
            .iter()
            .map(|key| self.positions[key].units.number.abs())
            .sum();
        if total == units.number.abs() {
            return Ok(self.order_by_date(candidates, false));
        }

        Err(ReduceError::AmbiguousMatch {
            num_matches: candidates.len(),
            currency: units.currency.clone(),
        })
    }

    /// Order lots by acquisition date, oldest first (reversed for LIFO).
    /// Undated lots sort first.
    fn order_by_date(&self, mut candidates: Vec<LotKey>, reverse: bool) -> Vec<LotKey> {
        candidates.sort_by_key(|(_, cost)| cost.as_ref().and_then(|c| c.date));
        if reverse {
            candidates.reverse();
        }
        candidates
    }

    /// Order lots by per-unit cost, highest first.
    fn order_by_cost(&self, mut candidates: Vec<LotKey>) -> Vec<LotKey> {
        candidates.sort_by(|(_, a), (_, b)| {
            let a = a.as_ref().map(|c| c.number).unwrap_or_default();
            let b = b.as_ref().map(|c| c.number).unwrap_or_default();
            b.cmp(&a)
        });
        candidates
    }

    /// Consume lots in order until the reduction is satisfied; the last lot
    /// is split if only part of it is needed. Callers have already verified
    /// sufficiency.
    fn consume(&mut self, units: &Amount, ordered: &[LotKey]) -> Vec<Position> {
        let sign = units.number.signum();
        let mut remaining = units.number.abs();
        let mut consumed = Vec::new();

        for key in ordered {
            if remaining.is_zero() {
                break;
            }
            let position = self.positions.get_mut(key).expect("candidate lot exists");
            let available = position.units.number.abs();
            let take = remaining.min(available);

            consumed.push(Position {
                units: Amount::new(take * sign, units.currency.clone()),
                cost: position.cost.clone(),
            });

            position.units.number += take * sign;
            if position.units.is_zero() {
                self.positions.remove(key);
            }
            remaining -= take;
        }

        consumed
    }
}

impl fmt::Display for Inventory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "(empty)");
        }
        for (i, position) in self.positions.values().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{position}")?;
        }
        Ok(())
    }
}

impl FromIterator<Position> for Inventory {
    fn from_iter<I: IntoIterator<Item = Position>>(iter: I) -> Self {
        let mut inv = Self::new();
        for position in iter {
            inv.add_position(position);
        }
        inv
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

    fn lot(units: Decimal, currency: &str, cost: Decimal, d: NaiveDate) -> Position {
        Position::with_cost(
            Amount::new(units, currency),
            Cost::new(cost, "USD").with_date(d),
        )
    }

    #[test]
    fn test_add_amount_outcomes() {
        let mut inv = Inventory::new();

        // Zero against nothing: ignored.
        let (prior, outcome) = inv.add_amount(Amount::zero("USD"), None);
        assert!(prior.is_none());
        assert_eq!(outcome, MatchResult::Ignored);
        assert!(inv.is_empty());

        // First units: created.
        let (prior, outcome) = inv.add_amount(Amount::new(dec!(100), "USD"), None);
        assert!(prior.is_none());
        assert_eq!(outcome, MatchResult::Created);

        // Same sign: augmented.
        let (prior, outcome) = inv.add_amount(Amount::new(dec!(50), "USD"), None);
        assert_eq!(prior.unwrap().units.number, dec!(100));
        assert_eq!(outcome, MatchResult::Augmented);
        assert_eq!(inv.units("USD"), dec!(150));

        // Opposite sign: reduced.
        let (prior, outcome) = inv.add_amount(Amount::new(dec!(-30), "USD"), None);
        assert_eq!(prior.unwrap().units.number, dec!(150));
        assert_eq!(outcome, MatchResult::Reduced);
        assert_eq!(inv.units("USD"), dec!(120));

        // Reduction to exactly zero removes the entry.
        inv.add_amount(Amount::new(dec!(-120), "USD"), None);
        assert!(inv.is_empty());
    }

    #[test]
    fn test_costed_lots_do_not_merge() {
        let mut inv = Inventory::new();
        inv.add_position(lot(dec!(10), "HOOL", dec!(100), date(2023, 1, 1)));
        inv.add_position(lot(dec!(5), "HOOL", dec!(120), date(2023, 1, 2)));

        assert_eq!(inv.len(), 2);
        assert_eq!(inv.units("HOOL"), dec!(15));
    }

    #[test]
    fn test_same_lot_merges() {
        let mut inv = Inventory::new();
        inv.add_position(lot(dec!(10), "HOOL", dec!(100), date(2023, 1, 1)));
        let (prior, outcome) = inv.add_position(lot(dec!(5), "HOOL", dec!(100), date(2023, 1, 1)));

        assert_eq!(outcome, MatchResult::Augmented);
        assert_eq!(prior.unwrap().units.number, dec!(10));
        assert_eq!(inv.len(), 1);
    }

    #[test]
    fn test_add_inventory_cancels() {
        let mut inv = Inventory::new();
        inv.add_amount(Amount::new(dec!(100), "USD"), None);

        let mut other = Inventory::new();
        other.add_amount(Amount::new(dec!(-100), "USD"), None);
        other.add_amount(Amount::new(dec!(1), "EUR"), None);

        inv.add_inventory(&other);
        assert_eq!(inv.units("USD"), Decimal::ZERO);
        assert_eq!(inv.units("EUR"), dec!(1));
    }

    #[test]
    fn test_is_reduced_by() {
        let mut inv = Inventory::new();
        inv.add_amount(Amount::new(dec!(100), "USD"), None);

        assert!(inv.is_reduced_by(&Amount::new(dec!(-10), "USD")));
        assert!(!inv.is_reduced_by(&Amount::new(dec!(10), "USD")));
        assert!(!inv.is_reduced_by(&Amount::new(dec!(-10), "EUR")));
        assert!(!inv.is_reduced_by(&Amount::zero("USD")));
    }

    #[test]
    fn test_is_small() {
        let mut inv = Inventory::new();
        inv.add_amount(Amount::new(dec!(0.004), "USD"), None);
        inv.add_amount(Amount::new(dec!(-0.001), "EUR"), None);

        assert!(inv.is_small(dec!(0.005)));
        assert!(!inv.is_small(dec!(0.003)));

        let mut tolerances = HashMap::new();
        tolerances.insert(InternedStr::new("USD"), dec!(0.005));
        assert!(inv.is_small_map(&tolerances, dec!(0.01)));
        assert!(!inv.is_small_map(&tolerances, Decimal::ZERO));
    }

    #[test]
    fn test_is_mixed() {
        let mut inv = Inventory::new();
        inv.add_position(lot(dec!(10), "HOOL", dec!(100), date(2023, 1, 1)));
        assert!(!inv.is_mixed());

        inv.add_position(lot(dec!(-5), "HOOL", dec!(120), date(2023, 1, 2)));
        assert!(inv.is_mixed());
    }

    #[test]
    fn test_currencies_and_pairs() {
        let mut inv = Inventory::new();
        inv.add_amount(Amount::new(dec!(100), "USD"), None);
        inv.add_position(lot(dec!(10), "HOOL", dec!(100), date(2023, 1, 1)));

        let currencies = inv.currencies();
        assert_eq!(currencies, vec![InternedStr::new("HOOL"), InternedStr::new("USD")]);
        assert_eq!(inv.cost_currencies(), vec![InternedStr::new("USD")]);

        let pairs = inv.currency_pairs();
        assert!(pairs.contains(&(InternedStr::new("USD"), None)));
        assert!(pairs.contains(&(InternedStr::new("HOOL"), Some(InternedStr::new("USD")))));
    }

    #[test]
    fn test_average() {
        let mut inv = Inventory::new();
        inv.add_position(lot(dec!(10), "HOOL", dec!(100), date(2023, 1, 2)));
        inv.add_position(lot(dec!(10), "HOOL", dec!(120), date(2023, 1, 1)));

        let averaged = inv.average();
        assert_eq!(averaged.len(), 1);
        let position = averaged.iter().next().unwrap();
        assert_eq!(position.units.number, dec!(20));
        let cost = position.cost.as_ref().unwrap();
        assert_eq!(cost.number, dec!(110));
        // Earliest date wins, label dropped.
        assert_eq!(cost.date, Some(date(2023, 1, 1)));
        assert!(cost.label.is_none());
    }

    #[test]
    fn test_average_drops_zero_groups() {
        let mut inv = Inventory::new();
        inv.add_position(lot(dec!(10), "HOOL", dec!(100), date(2023, 1, 1)));
        inv.add_position(lot(dec!(-10), "HOOL", dec!(120), date(2023, 1, 2)));

        assert!(inv.average().is_empty());
    }

    #[test]
    fn test_split() {
        let mut inv = Inventory::new();
        inv.add_amount(Amount::new(dec!(100), "USD"), None);
        inv.add_amount(Amount::new(dec!(50), "EUR"), None);

        let parts = inv.split();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts["USD"].units("USD"), dec!(100));
        assert_eq!(parts["EUR"].units("EUR"), dec!(50));
    }

    #[test]
    fn test_check_invariants() {
        let mut inv = Inventory::new();
        inv.add_amount(Amount::new(dec!(100), "USD"), None);
        inv.add_position(lot(dec!(10), "HOOL", dec!(100), date(2023, 1, 1)));
        assert!(inv.check_invariants().is_ok());
    }

    #[test]
    fn test_reduce_strict_unique() {
        let mut inv = Inventory::new();
        inv.add_position(lot(dec!(10), "HOOL", dec!(100), date(2023, 1, 1)));

        let consumed = inv
            .reduce(
                &Amount::new(dec!(-5), "HOOL"),
                &CostSpec::empty(),
                BookingMethod::Strict,
            )
            .unwrap();

        assert_eq!(consumed.len(), 1);
        assert_eq!(consumed[0].units.number, dec!(-5));
        assert_eq!(consumed[0].cost.as_ref().unwrap().number, dec!(100));
        assert_eq!(inv.units("HOOL"), dec!(5));
    }

    #[test]
    fn test_reduce_strict_ambiguous() {
        let mut inv = Inventory::new();
        inv.add_position(lot(dec!(10), "HOOL", dec!(100), date(2023, 1, 1)));
        inv.add_position(lot(dec!(10), "HOOL", dec!(120), date(2023, 1, 2)));

        let err = inv
            .reduce(
                &Amount::new(dec!(-5), "HOOL"),
                &CostSpec::empty(),
                BookingMethod::Strict,
            )
            .unwrap_err();
        assert!(matches!(err, ReduceError::AmbiguousMatch { num_matches: 2, .. }));
        // No mutation on error.
        assert_eq!(inv.units("HOOL"), dec!(20));
    }

    #[test]
    fn test_reduce_strict_total_match_exception() {
        let mut inv = Inventory::new();
        inv.add_position(lot(dec!(10), "HOOL", dec!(100), date(2023, 1, 1)));
        inv.add_position(lot(dec!(10), "HOOL", dec!(120), date(2023, 1, 2)));

        // Consuming the entire holding is unambiguous.
        let consumed = inv
            .reduce(
                &Amount::new(dec!(-20), "HOOL"),
                &CostSpec::empty(),
                BookingMethod::Strict,
            )
            .unwrap();
        assert_eq!(consumed.len(), 2);
        assert!(inv.is_empty());
    }

    #[test]
    fn test_reduce_strict_with_spec() {
        let mut inv = Inventory::new();
        inv.add_position(lot(dec!(10), "HOOL", dec!(100), date(2023, 1, 1)));
        inv.add_position(lot(dec!(10), "HOOL", dec!(120), date(2023, 1, 2)));

        let spec = CostSpec::empty().with_date(date(2023, 1, 1));
        let consumed = inv
            .reduce(&Amount::new(dec!(-3), "HOOL"), &spec, BookingMethod::Strict)
            .unwrap();
        assert_eq!(consumed[0].cost.as_ref().unwrap().number, dec!(100));
        assert_eq!(inv.units("HOOL"), dec!(17));
    }

    #[test]
    fn test_reduce_strict_with_size() {
        let mut inv = Inventory::new();
        inv.add_position(lot(dec!(10), "HOOL", dec!(100), date(2023, 1, 1)));
        inv.add_position(lot(dec!(5), "HOOL", dec!(120), date(2023, 1, 2)));

        // -5 exactly matches the second lot's size.
        let consumed = inv
            .reduce(
                &Amount::new(dec!(-5), "HOOL"),
                &CostSpec::empty(),
                BookingMethod::StrictWithSize,
            )
            .unwrap();
        assert_eq!(consumed.len(), 1);
        assert_eq!(consumed[0].cost.as_ref().unwrap().number, dec!(120));
        assert_eq!(inv.units("HOOL"), dec!(10));
    }

    #[test]
    fn test_reduce_fifo_splits_last_lot() {
        let mut inv = Inventory::new();
        inv.add_position(lot(dec!(10), "HOOL", dec!(100), date(2023, 1, 1)));
        inv.add_position(lot(dec!(10), "HOOL", dec!(120), date(2023, 1, 2)));

        let consumed = inv
            .reduce(
                &Amount::new(dec!(-15), "HOOL"),
                &CostSpec::empty(),
                BookingMethod::Fifo,
            )
            .unwrap();

        assert_eq!(consumed.len(), 2);
        assert_eq!(consumed[0].units.number, dec!(-10));
        assert_eq!(consumed[0].cost.as_ref().unwrap().number, dec!(100));
        assert_eq!(consumed[1].units.number, dec!(-5));
        assert_eq!(consumed[1].cost.as_ref().unwrap().number, dec!(120));

        // 5 units of the 120 lot remain.
        assert_eq!(inv.len(), 1);
        let rest = inv.iter().next().unwrap();
        assert_eq!(rest.units.number, dec!(5));
        assert_eq!(rest.cost.as_ref().unwrap().number, dec!(120));
    }

    #[test]
    fn test_reduce_lifo() {
        let mut inv = Inventory::new();
        inv.add_position(lot(dec!(10), "HOOL", dec!(100), date(2023, 1, 1)));
        inv.add_position(lot(dec!(10), "HOOL", dec!(120), date(2023, 1, 2)));

        let consumed = inv
            .reduce(
                &Amount::new(dec!(-15), "HOOL"),
                &CostSpec::empty(),
                BookingMethod::Lifo,
            )
            .unwrap();

        assert_eq!(consumed[0].cost.as_ref().unwrap().number, dec!(120));
        assert_eq!(consumed[1].cost.as_ref().unwrap().number, dec!(100));
        assert_eq!(consumed[1].units.number, dec!(-5));
    }

    #[test]
    fn test_reduce_hifo() {
        let mut inv = Inventory::new();
        inv.add_position(lot(dec!(10), "HOOL", dec!(100), date(2023, 1, 1)));
        inv.add_position(lot(dec!(10), "HOOL", dec!(150), date(2023, 1, 2)));
        inv.add_position(lot(dec!(10), "HOOL", dec!(120), date(2023, 1, 3)));

        let consumed = inv
            .reduce(
                &Amount::new(dec!(-15), "HOOL"),
                &CostSpec::empty(),
                BookingMethod::Hifo,
            )
            .unwrap();

        assert_eq!(consumed[0].cost.as_ref().unwrap().number, dec!(150));
        assert_eq!(consumed[1].cost.as_ref().unwrap().number, dec!(120));
        assert_eq!(consumed[1].units.number, dec!(-5));
    }

    #[test]
    fn test_reduce_insufficient_no_mutation() {
        let mut inv = Inventory::new();
        inv.add_position(lot(dec!(10), "HOOL", dec!(100), date(2023, 1, 1)));

        let err = inv
            .reduce(
                &Amount::new(dec!(-15), "HOOL"),
                &CostSpec::empty(),
                BookingMethod::Fifo,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            ReduceError::InsufficientUnits { requested, available, .. }
                if requested == dec!(15) && available == dec!(10)
        ));
        assert_eq!(inv.units("HOOL"), dec!(10));
    }

    #[test]
    fn test_reduce_no_matching_lot() {
        let mut inv = Inventory::new();
        inv.add_position(lot(dec!(10), "HOOL", dec!(100), date(2023, 1, 1)));

        let spec = CostSpec::empty().with_number_per(dec!(160));
        let err = inv
            .reduce(&Amount::new(dec!(-5), "HOOL"), &spec, BookingMethod::Strict)
            .unwrap_err();
        assert!(matches!(err, ReduceError::NoMatchingLot { .. }));
    }

    #[test]
    fn test_reduce_average() {
        let mut inv = Inventory::new();
        inv.add_position(lot(dec!(10), "HOOL", dec!(100), date(2023, 1, 1)));
        inv.add_position(lot(dec!(10), "HOOL", dec!(120), date(2023, 1, 2)));

        let consumed = inv
            .reduce(
                &Amount::new(dec!(-5), "HOOL"),
                &CostSpec::empty(),
                BookingMethod::Average,
            )
            .unwrap();

        assert_eq!(consumed.len(), 1);
        assert_eq!(consumed[0].cost.as_ref().unwrap().number, dec!(110));
        assert_eq!(inv.units("HOOL"), dec!(15));
    }

    #[test]
    fn test_display() {
        let mut inv = Inventory::new();
        assert_eq!(format!("{inv}"), "(empty)");

        inv.add_amount(Amount::new(dec!(100), "USD"), None);
        assert_eq!(format!("{inv}"), "100 USD");
    }

    #[test]
    fn test_from_iterator() {
        let inv: Inventory = vec![
            Position::simple(Amount::new(dec!(100), "USD")),
            Position::simple(Amount::new(dec!(50), "USD")),
        ]
        .into_iter()
        .collect();
        assert_eq!(inv.units("USD"), dec!(150));
    }
}
