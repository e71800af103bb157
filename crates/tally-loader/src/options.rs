//! Option map parsing and storage.

use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use tally_booking::BookingOptions;
use tally_core::account::AccountTypes;
use tally_core::BookingMethod;

/// Recognized option names.
const KNOWN_OPTIONS: &[&str] = &[
    "title",
    "filename",
    "operating_currency",
    "name_assets",
    "name_liabilities",
    "name_equity",
    "name_income",
    "name_expenses",
    "account_previous_balances",
    "account_previous_earnings",
    "account_previous_conversions",
    "account_current_earnings",
    "account_current_conversions",
    "account_unrealized_gains",
    "conversion_currency",
    "inferred_tolerance_default",
    "inferred_tolerance_multiplier",
    "infer_tolerance_from_cost",
    "booking_method",
];

/// Options that may legitimately appear more than once.
const REPEATABLE_OPTIONS: &[&str] = &["operating_currency", "inferred_tolerance_default"];

/// A problem found while applying an option.
#[derive(Debug, Clone)]
pub struct OptionWarning {
    /// Warning code.
    pub code: &'static str,
    /// Warning message.
    pub message: String,
    /// Option name.
    pub option: String,
    /// Option value as written.
    pub value: String,
}

/// The aggregated option map of a loaded ledger.
///
/// The top-level file's options dominate; included files only contribute
/// their operating currencies.
#[derive(Debug, Clone)]
pub struct Options {
    /// Display title; no semantic effect.
    pub title: Option<String>,
    /// Source filename, set by the loader.
    pub filename: Option<String>,
    /// Ordered operating currencies, first occurrence kept.
    pub operating_currency: Vec<String>,
    /// Root name for asset accounts.
    pub name_assets: String,
    /// Root name for liability accounts.
    pub name_liabilities: String,
    /// Root name for equity accounts.
    pub name_equity: String,
    /// Root name for income accounts.
    pub name_income: String,
    /// Root name for expense accounts.
    pub name_expenses: String,
    /// Equity sub-account receiving period-opening balances.
    pub account_previous_balances: String,
    /// Equity sub-account receiving prior-period earnings.
    pub account_previous_earnings: String,
    /// Equity sub-account receiving prior-period conversions.
    pub account_previous_conversions: String,
    /// Equity sub-account receiving current-period earnings.
    pub account_current_earnings: String,
    /// Equity sub-account receiving current-period conversions.
    pub account_current_conversions: String,
    /// Sub-account for unrealized gains.
    pub account_unrealized_gains: Option<String>,
    /// Transfer currency for synthetic conversion entries.
    pub conversion_currency: Option<String>,
    /// Per-currency tolerance defaults; the `*` key is the wildcard.
    pub inferred_tolerance_default: HashMap<String, Decimal>,
    /// Scale factor for tolerances inferred from input precision.
    pub inferred_tolerance_multiplier: Decimal,
    /// Whether inferred tolerances propagate through cost rates.
    pub infer_tolerance_from_cost: bool,
    /// Default booking method name.
    pub booking_method: String,
    /// Unrecognized options, kept verbatim.
    pub custom: HashMap<String, String>,
    /// Names already set, for duplicate detection.
    set_options: HashSet<String>,
    /// Warnings collected while applying options.
    pub warnings: Vec<OptionWarning>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            title: None,
            filename: None,
            operating_currency: Vec::new(),
            name_assets: "Assets".to_string(),
            name_liabilities: "Liabilities".to_string(),
            name_equity: "Equity".to_string(),
            name_income: "Income".to_string(),
            name_expenses: "Expenses".to_string(),
            account_previous_balances: "Opening-Balances".to_string(),
            account_previous_earnings: "Earnings:Previous".to_string(),
            account_previous_conversions: "Conversions:Previous".to_string(),
            account_current_earnings: "Earnings:Current".to_string(),
            account_current_conversions: "Conversions:Current".to_string(),
            account_unrealized_gains: None,
            conversion_currency: None,
            inferred_tolerance_default: HashMap::new(),
            inferred_tolerance_multiplier: Decimal::new(5, 1),
            infer_tolerance_from_cost: true,
            booking_method: "STRICT".to_string(),
            custom: HashMap::new(),
            set_options: HashSet::new(),
            warnings: Vec::new(),
        }
    }
}

impl Options {
    /// Create options with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an option from the top-level file.
    pub fn set(&mut self, key: &str, value: &str) {
        if !KNOWN_OPTIONS.contains(&key) {
            self.warnings.push(OptionWarning {
                code: "unknown-option",
                message: format!("unknown option \"{key}\""),
                option: key.to_string(),
                value: value.to_string(),
            });
        } else if !REPEATABLE_OPTIONS.contains(&key) && self.set_options.contains(key) {
            self.warnings.push(OptionWarning {
                code: "duplicate-option",
                message: format!("option \"{key}\" can only be set once"),
                option: key.to_string(),
                value: value.to_string(),
            });
        }
        self.set_options.insert(key.to_string());

        match key {
            "title" => self.title = Some(value.to_string()),
            "filename" => self.filename = Some(value.to_string()),
            "operating_currency" => self.add_operating_currency(value),
            "name_assets" => self.name_assets = value.to_string(),
            "name_liabilities" => self.name_liabilities = value.to_string(),
            "name_equity" => self.name_equity = value.to_string(),
            "name_income" => self.name_income = value.to_string(),
            "name_expenses" => self.name_expenses = value.to_string(),
            "account_previous_balances" => self.account_previous_balances = value.to_string(),
            "account_previous_earnings" => self.account_previous_earnings = value.to_string(),
            "account_previous_conversions" => {
                self.account_previous_conversions = value.to_string();
            }
            "account_current_earnings" => self.account_current_earnings = value.to_string(),
            "account_current_conversions" => {
                self.account_current_conversions = value.to_string();
            }
            "account_unrealized_gains" => {
                self.account_unrealized_gains = Some(value.to_string());
            }
            "conversion_currency" => self.conversion_currency = Some(value.to_string()),
            "inferred_tolerance_multiplier" => match Decimal::from_str(value) {
                Ok(multiplier) => self.inferred_tolerance_multiplier = multiplier,
                Err(_) => self.invalid_value(key, value, "expected a decimal number"),
            },
            "inferred_tolerance_default" => {
                // "CURRENCY:TOLERANCE", with "*" as the wildcard currency.
                match value
                    .split_once(':')
                    .and_then(|(currency, tol)| {
                        Decimal::from_str(tol).ok().map(|tol| (currency, tol))
                    }) {
                    Some((currency, tolerance)) => {
                        self.inferred_tolerance_default
                            .insert(currency.to_string(), tolerance);
                    }
                    None => self.invalid_value(key, value, "expected CURRENCY:TOLERANCE"),
                }
            }
            "infer_tolerance_from_cost" => match parse_bool(value) {
                Some(flag) => self.infer_tolerance_from_cost = flag,
                None => self.invalid_value(key, value, "expected TRUE or FALSE"),
            },
            "booking_method" => {
                if value.parse::<BookingMethod>().is_err() {
                    self.invalid_value(key, value, "expected a booking method name");
                }
                self.booking_method = value.to_string();
            }
            _ => {
                self.custom.insert(key.to_string(), value.to_string());
            }
        }
    }

    /// Apply an option from an included file: only the unioned options
    /// contribute, everything else stays with the top-level file.
    pub fn merge_included(&mut self, key: &str, value: &str) {
        if key == "operating_currency" {
            self.add_operating_currency(value);
        }
    }

    fn add_operating_currency(&mut self, currency: &str) {
        if !self.operating_currency.iter().any(|c| c == currency) {
            self.operating_currency.push(currency.to_string());
        }
    }

    fn invalid_value(&mut self, key: &str, value: &str, expected: &str) {
        self.warnings.push(OptionWarning {
            code: "invalid-value",
            message: format!("invalid value \"{value}\" for option \"{key}\": {expected}"),
            option: key.to_string(),
            value: value.to_string(),
        });
    }

    /// Get an unrecognized option's value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.custom.get(key).map(String::as_str)
    }

    /// The account type names configured by the `name_*` options.
    #[must_use]
    pub fn account_types(&self) -> AccountTypes {
        AccountTypes {
            assets: self.name_assets.clone(),
            liabilities: self.name_liabilities.clone(),
            equity: self.name_equity.clone(),
            income: self.name_income.clone(),
            expenses: self.name_expenses.clone(),
        }
    }

    /// The booking-engine view of these options.
    #[must_use]
    pub fn booking_options(&self) -> BookingOptions {
        BookingOptions {
            default_method: self
                .booking_method
                .parse()
                .unwrap_or(BookingMethod::Strict),
            tolerance_defaults: self.inferred_tolerance_default.clone(),
            inferred_tolerance_multiplier: self.inferred_tolerance_multiplier,
            infer_tolerance_from_cost: self.infer_tolerance_from_cost,
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    if value.eq_ignore_ascii_case("true") {
        Some(true)
    } else if value.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}
