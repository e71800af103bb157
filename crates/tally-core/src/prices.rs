//! Price map: dated rate series per ordered currency pair.
//!
//! Built once from the final directive stream and read-only afterwards.
//! Each `price` directive contributes one sample to the `(base, quote)`
//! pair it names. When a ledger quotes both directions of the same pair,
//! the direction with fewer samples is folded into the other, and every
//! canonical pair also materializes its pointwise reciprocal so lookups
//! work in either direction.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::intern::InternedStr;
use crate::Directive;

/// An ordered currency pair: (base, quote).
pub type CurrencyPair = (InternedStr, InternedStr);

/// A dated price database for currency pairs.
///
/// # Examples
///
/// ```
/// use tally_core::{Amount, Directive, Price, PriceMap};
/// use chrono::NaiveDate;
/// use rust_decimal_macros::dec;
///
/// let d = NaiveDate::from_ymd_opt(2023, 5, 1).unwrap();
/// let directives = vec![Directive::Price(Price::new(
///     d,
///     "HOOL",
///     Amount::new(dec!(100.00), "USD"),
/// ))];
///
/// let prices = PriceMap::build(&directives);
/// let (date, rate) = prices.get_latest_price("HOOL", "USD").unwrap();
/// assert_eq!(date, Some(d));
/// assert_eq!(rate, dec!(100.00));
/// ```
#[derive(Debug, Clone, Default)]
pub struct PriceMap {
    /// Date-sorted samples per ordered pair, both directions materialized.
    rates: HashMap<CurrencyPair, Vec<(NaiveDate, Decimal)>>,
    /// The canonical (explicitly quoted, majority-direction) pairs.
    forward_pairs: BTreeSet<CurrencyPair>,
}

impl PriceMap {
    /// Build a price map from the `price` directives in a stream.
    #[must_use]
    pub fn build(directives: &[Directive]) -> Self {
        // Unique dates per explicit pair, last write per date winning.
        let mut explicit: BTreeMap<CurrencyPair, BTreeMap<NaiveDate, Decimal>> = BTreeMap::new();
        for directive in directives {
            if let Directive::Price(price) = directive {
                let pair = (
                    InternedStr::new(price.currency.as_str()),
                    price.amount.currency.clone(),
                );
                explicit
                    .entry(pair)
                    .or_default()
                    .insert(price.date, price.amount.number);
            }
        }

        // Fold the minority direction of doubly-quoted pairs into the
        // majority one, skipping zero rates and dates already observed
        // directly.
        let pairs: Vec<CurrencyPair> = explicit.keys().cloned().collect();
        for pair in &pairs {
            let (base, quote) = pair;
            let inverse = (quote.clone(), base.clone());
            if base >= quote || !explicit.contains_key(&inverse) {
                continue;
            }
            let n_fwd = explicit[pair].len();
            let n_inv = explicit[&inverse].len();
            let (major, minor) = if n_fwd >= n_inv {
                (pair.clone(), inverse)
            } else {
                (inverse, pair.clone())
            };

            let folded = explicit.remove(&minor).unwrap_or_default();
            let target = explicit.entry(major).or_default();
            for (date, rate) in folded {
                if rate.is_zero() {
                    continue;
                }
                target.entry(date).or_insert(Decimal::ONE / rate);
            }
        }

        // Materialize both directions.
        let mut map = Self::default();
        for (pair, samples) in explicit {
            let forward: Vec<(NaiveDate, Decimal)> = samples.into_iter().collect();
            let backward: Vec<(NaiveDate, Decimal)> = forward
                .iter()
                .filter(|(_, rate)| !rate.is_zero())
                .map(|(date, rate)| (*date, Decimal::ONE / *rate))
                .collect();
            map.rates.insert((pair.1.clone(), pair.0.clone()), backward);
            map.rates.insert(pair.clone(), forward);
            map.forward_pairs.insert(pair);
        }
        map
    }

    /// The canonical forward pairs, for reporting.
    pub fn forward_pairs(&self) -> impl Iterator<Item = &CurrencyPair> {
        self.forward_pairs.iter()
    }

    /// Look up the rate for a pair.
    ///
    /// Without a date, the most recent sample is returned. With a date, the
    /// greatest sample dated strictly before it is returned; a date at or
    /// before the earliest sample finds nothing. `base == quote` is the
    /// identity rate with no date.
    #[must_use]
    pub fn get_price(
        &self,
        base: &str,
        quote: &str,
        date: Option<NaiveDate>,
    ) -> Option<(Option<NaiveDate>, Decimal)> {
        if base == quote {
            return Some((None, Decimal::ONE));
        }
        let samples = self.rates.get(&(InternedStr::new(base), InternedStr::new(quote)))?;
        match date {
            None => samples.last().map(|(d, r)| (Some(*d), *r)),
            Some(date) => {
                let idx = samples.partition_point(|(d, _)| *d < date);
                if idx == 0 {
                    None
                } else {
                    let (d, r) = samples[idx - 1];
                    Some((Some(d), r))
                }
            }
        }
    }

    /// The most recent sample for a pair.
    #[must_use]
    pub fn get_latest_price(&self, base: &str, quote: &str) -> Option<(Option<NaiveDate>, Decimal)> {
        self.get_price(base, quote, None)
    }

    /// The full date-sorted sample list for a pair.
    ///
    /// Falls back to the reciprocal of the inverse pair when the requested
    /// direction has no samples at all.
    #[must_use]
    pub fn get_all_prices(&self, base: &str, quote: &str) -> Option<Vec<(NaiveDate, Decimal)>> {
        let key = (InternedStr::new(base), InternedStr::new(quote));
        if let Some(samples) = self.rates.get(&key) {
            return Some(samples.clone());
        }
        let inverse = (key.1, key.0);
        self.rates.get(&inverse).map(|samples| {
            samples
                .iter()
                .filter(|(_, rate)| !rate.is_zero())
                .map(|(date, rate)| (*date, Decimal::ONE / *rate))
                .collect()
        })
    }

    /// Synthesize `(B, to)` samples from `(B, from) × (from, to)`.
    ///
    /// Every base currency quoted in `from` (optionally restricted to
    /// `base_set`) gains projected samples in `to` on the dates it already
    /// has `from` samples, skipping dates where a direct `(B, to)` sample
    /// exists. Both directions of the projected pair are updated.
    pub fn project(&mut self, from: &str, to: &str, base_set: Option<&BTreeSet<InternedStr>>) {
        let from = InternedStr::new(from);
        let to = InternedStr::new(to);
        if from == to {
            return;
        }

        let Some(conversions) = self.rates.get(&(from.clone(), to.clone())).cloned() else {
            return;
        };

        let bases: Vec<InternedStr> = self
            .rates
            .keys()
            .filter(|(base, quote)| {
                *quote == from
                    && *base != to
                    && base_set.map_or(true, |set| set.contains(base))
            })
            .map(|(base, _)| base.clone())
            .collect();

        for base in bases {
            let samples = self.rates[&(base.clone(), from.clone())].clone();
            let mut projected: Vec<(NaiveDate, Decimal)> = Vec::new();
            for (date, rate) in samples {
                // Conversion rate in effect on the sample's date.
                let idx = conversions.partition_point(|(d, _)| *d <= date);
                if idx == 0 {
                    continue;
                }
                projected.push((date, rate * conversions[idx - 1].1));
            }
            if projected.is_empty() {
                continue;
            }

            let forward = self.rates.entry((base.clone(), to.clone())).or_default();
            let existing: BTreeSet<NaiveDate> = forward.iter().map(|(d, _)| *d).collect();
            for (date, rate) in &projected {
                if !existing.contains(date) {
                    forward.push((*date, *rate));
                }
            }
            forward.sort_by_key(|(d, _)| *d);

            let backward = self.rates.entry((to.clone(), base.clone())).or_default();
            let existing: BTreeSet<NaiveDate> = backward.iter().map(|(d, _)| *d).collect();
            for (date, rate) in &projected {
                if !rate.is_zero() && !existing.contains(date) {
                    backward.push((*date, Decimal::ONE / *rate));
                }
            }
            backward.sort_by_key(|(d, _)| *d);

            self.forward_pairs.insert((base, to.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Amount, Price};
    use rust_decimal_macros::dec;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn price(d: NaiveDate, base: &str, number: Decimal, quote: &str) -> Directive {
        Directive::Price(Price::new(d, base, Amount::new(number, quote)))
    }

    #[test]
    fn test_build_and_latest() {
        let prices = PriceMap::build(&[
            price(date(2023, 1, 1), "HOOL", dec!(100), "USD"),
            price(date(2023, 6, 1), "HOOL", dec!(120), "USD"),
        ]);

        let (d, rate) = prices.get_latest_price("HOOL", "USD").unwrap();
        assert_eq!(d, Some(date(2023, 6, 1)));
        assert_eq!(rate, dec!(120));
    }

    #[test]
    fn test_last_write_wins_per_date() {
        let prices = PriceMap::build(&[
            price(date(2023, 1, 1), "HOOL", dec!(100), "USD"),
            price(date(2023, 1, 1), "HOOL", dec!(101), "USD"),
        ]);

        let all = prices.get_all_prices("HOOL", "USD").unwrap();
        assert_eq!(all, vec![(date(2023, 1, 1), dec!(101))]);
    }

    #[test]
    fn test_dated_lookup_strictly_before() {
        let prices = PriceMap::build(&[
            price(date(2023, 1, 1), "HOOL", dec!(100), "USD"),
            price(date(2023, 6, 1), "HOOL", dec!(120), "USD"),
        ]);

        // Between samples: the earlier one.
        let (d, rate) = prices
            .get_price("HOOL", "USD", Some(date(2023, 3, 1)))
            .unwrap();
        assert_eq!(d, Some(date(2023, 1, 1)));
        assert_eq!(rate, dec!(100));

        // Exactly on a sample date: strictly-before excludes it.
        let (d, _) = prices
            .get_price("HOOL", "USD", Some(date(2023, 6, 1)))
            .unwrap();
        assert_eq!(d, Some(date(2023, 1, 1)));

        // Before the earliest sample: nothing.
        assert!(prices
            .get_price("HOOL", "USD", Some(date(2022, 12, 31)))
            .is_none());
    }

    #[test]
    fn test_identity_pair() {
        let prices = PriceMap::build(&[]);
        let (d, rate) = prices.get_price("USD", "USD", None).unwrap();
        assert_eq!(d, None);
        assert_eq!(rate, Decimal::ONE);
    }

    #[test]
    fn test_materialized_inverse() {
        let prices = PriceMap::build(&[price(date(2023, 1, 1), "EUR", dec!(1.25), "USD")]);

        let (_, forward) = prices.get_latest_price("EUR", "USD").unwrap();
        let (_, backward) = prices.get_latest_price("USD", "EUR").unwrap();
        assert_eq!(forward, dec!(1.25));
        assert_eq!(backward, dec!(0.8));
    }

    #[test]
    fn test_forward_inverse_reconciliation() {
        // USD/EUR quoted twice, EUR/USD once: USD/EUR is canonical and the
        // single EUR/USD sample folds in, inverted.
        let prices = PriceMap::build(&[
            price(date(2023, 1, 1), "USD", dec!(0.8), "EUR"),
            price(date(2023, 2, 1), "USD", dec!(0.9), "EUR"),
            price(date(2023, 3, 1), "EUR", dec!(1.25), "USD"),
        ]);

        let forward: Vec<CurrencyPair> = prices.forward_pairs().cloned().collect();
        assert_eq!(forward.len(), 1);
        assert_eq!(forward[0].0, "USD");
        assert_eq!(forward[0].1, "EUR");

        let all = prices.get_all_prices("USD", "EUR").unwrap();
        assert_eq!(
            all,
            vec![
                (date(2023, 1, 1), dec!(0.8)),
                (date(2023, 2, 1), dec!(0.9)),
                (date(2023, 3, 1), dec!(0.8)),
            ]
        );
    }

    #[test]
    fn test_reconciliation_direct_sample_kept() {
        // A folded inverse sample never overwrites a direct one on the same
        // date.
        let prices = PriceMap::build(&[
            price(date(2023, 1, 1), "USD", dec!(0.8), "EUR"),
            price(date(2023, 2, 1), "USD", dec!(0.9), "EUR"),
            price(date(2023, 1, 1), "EUR", dec!(2), "USD"),
        ]);

        let all = prices.get_all_prices("USD", "EUR").unwrap();
        assert_eq!(all[0], (date(2023, 1, 1), dec!(0.8)));
    }

    #[test]
    fn test_inverse_reciprocity() {
        let prices = PriceMap::build(&[price(date(2023, 1, 1), "EUR", dec!(1.25), "USD")]);

        let (_, forward) = prices
            .get_price("EUR", "USD", Some(date(2023, 2, 1)))
            .unwrap();
        let (_, backward) = prices
            .get_price("USD", "EUR", Some(date(2023, 2, 1)))
            .unwrap();
        assert_eq!(forward * backward, Decimal::ONE);
    }

    #[test]
    fn test_unknown_pair() {
        let prices = PriceMap::build(&[]);
        assert!(prices.get_price("HOOL", "USD", None).is_none());
        assert!(prices.get_all_prices("HOOL", "USD").is_none());
    }

    #[test]
    fn test_project() {
        let mut prices = PriceMap::build(&[
            price(date(2023, 1, 2), "HOOL", dec!(100), "USD"),
            price(date(2023, 1, 1), "USD", dec!(0.9), "EUR"),
        ]);

        prices.project("USD", "EUR", None);

        // HOOL/EUR synthesized at the HOOL sample date.
        let (d, rate) = prices.get_latest_price("HOOL", "EUR").unwrap();
        assert_eq!(d, Some(date(2023, 1, 2)));
        assert_eq!(rate, dec!(90.0));

        // Inverse updated too.
        let (_, inverse) = prices.get_latest_price("EUR", "HOOL").unwrap();
        assert_eq!(inverse, Decimal::ONE / dec!(90.0));
    }

    #[test]
    fn test_project_skips_existing_dates() {
        let mut prices = PriceMap::build(&[
            price(date(2023, 1, 2), "HOOL", dec!(100), "USD"),
            price(date(2023, 1, 2), "HOOL", dec!(95), "EUR"),
            price(date(2023, 1, 1), "USD", dec!(0.9), "EUR"),
        ]);

        prices.project("USD", "EUR", None);

        // The direct HOOL/EUR sample on 2023-01-02 is kept.
        let (_, rate) = prices.get_latest_price("HOOL", "EUR").unwrap();
        assert_eq!(rate, dec!(95));
    }

    #[test]
    fn test_project_base_set_restriction() {
        let mut prices = PriceMap::build(&[
            price(date(2023, 1, 2), "HOOL", dec!(100), "USD"),
            price(date(2023, 1, 2), "MSFT", dec!(50), "USD"),
            price(date(2023, 1, 1), "USD", dec!(0.9), "EUR"),
        ]);

        let only_hool: BTreeSet<InternedStr> = [InternedStr::new("HOOL")].into_iter().collect();
        prices.project("USD", "EUR", Some(&only_hool));

        assert!(prices.get_latest_price("HOOL", "EUR").is_some());
        assert!(prices.get_latest_price("MSFT", "EUR").is_none());
    }
}
