//! Validation rules for booked ledgers.
//!
//! The validator is a pure function over the booked directive stream: it
//! never throws and never mutates its input, it only accumulates a list of
//! [`ValidationError`]s. The suite covers:
//!
//! - account lifecycle (opened before use, at most one open and close,
//!   nothing but notes and documents after close)
//! - account name syntax
//! - duplicate balance assertions and commodity declarations
//! - per-account currency constraints from `open`
//! - transaction balance under inferred tolerances
//! - balance assertions against running inventories

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

use tally_booking::{infer_tolerances, residual, tolerance_for, BookingOptions};
use tally_core::{account, Amount, Directive, Inventory, Transaction};

/// Validation error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// E1001: account used before it was opened.
    AccountNotOpen,
    /// E1002: duplicate open directive.
    AccountAlreadyOpen,
    /// E1003: account used after it was closed.
    AccountClosed,
    /// E1004: account closed while holding a balance.
    AccountCloseNotEmpty,
    /// E1005: malformed account name.
    InvalidAccountName,
    /// E2001: balance assertion failed.
    BalanceAssertionFailed,
    /// E2002: conflicting balance assertions on one day.
    DuplicateBalance,
    /// E3001: transaction does not balance.
    TransactionUnbalanced,
    /// E5002: posting currency not allowed by the account's open.
    CurrencyNotAllowed,
    /// E5003: duplicate commodity declaration.
    DuplicateCommodity,
}

impl ErrorCode {
    /// The error code string.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::AccountNotOpen => "E1001",
            Self::AccountAlreadyOpen => "E1002",
            Self::AccountClosed => "E1003",
            Self::AccountCloseNotEmpty => "E1004",
            Self::InvalidAccountName => "E1005",
            Self::BalanceAssertionFailed => "E2001",
            Self::DuplicateBalance => "E2002",
            Self::TransactionUnbalanced => "E3001",
            Self::CurrencyNotAllowed => "E5002",
            Self::DuplicateCommodity => "E5003",
        }
    }

    /// Whether this condition is suspicious rather than invalid.
    #[must_use]
    pub const fn is_warning(&self) -> bool {
        matches!(self, Self::AccountCloseNotEmpty)
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A validation error.
#[derive(Debug, Clone, Error)]
#[error("[{code}] {message}")]
pub struct ValidationError {
    /// Error code.
    pub code: ErrorCode,
    /// Error message.
    pub message: String,
    /// Date of the directive that caused the error.
    pub date: NaiveDate,
    /// Additional context.
    pub context: Option<String>,
}

impl ValidationError {
    fn new(code: ErrorCode, message: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            code,
            message: message.into(),
            date,
            context: None,
        }
    }

    fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

/// Options for the validation pass.
#[derive(Debug, Clone, Default)]
pub struct ValidationOptions {
    /// Tolerance configuration, shared with the booking engine.
    pub booking: BookingOptions,
}

/// Lifecycle state of one account.
#[derive(Debug, Clone)]
struct AccountState {
    opened: NaiveDate,
    closed: Option<NaiveDate>,
    currencies: HashSet<String>,
}

/// Validate a booked directive stream with default options.
#[must_use]
pub fn validate(directives: &[Directive]) -> Vec<ValidationError> {
    validate_with_options(directives, &ValidationOptions::default())
}

/// Validate a booked directive stream.
///
/// The stream must be sorted; the checks replay it front to back,
/// maintaining account lifecycles and running inventories.
#[must_use]
pub fn validate_with_options(
    directives: &[Directive],
    options: &ValidationOptions,
) -> Vec<ValidationError> {
    let mut accounts: HashMap<String, AccountState> = HashMap::new();
    let mut inventories: HashMap<String, Inventory> = HashMap::new();
    let mut commodities: HashSet<String> = HashSet::new();
    let mut assertions: HashMap<(String, String, NaiveDate), Decimal> = HashMap::new();
    let mut errors = Vec::new();

    for directive in directives {
        match directive {
            Directive::Open(open) => {
                if !account::is_valid(&open.account) {
                    errors.push(
                        ValidationError::new(
                            ErrorCode::InvalidAccountName,
                            format!("invalid account name \"{}\"", open.account),
                            open.date,
                        )
                        .with_context(open.account.clone()),
                    );
                }
                if let Some(existing) = accounts.get(&open.account) {
                    errors.push(ValidationError::new(
                        ErrorCode::AccountAlreadyOpen,
                        format!(
                            "account {} is already open (opened on {})",
                            open.account, existing.opened
                        ),
                        open.date,
                    ));
                    continue;
                }
                accounts.insert(
                    open.account.clone(),
                    AccountState {
                        opened: open.date,
                        closed: None,
                        currencies: open.currencies.iter().cloned().collect(),
                    },
                );
                inventories.entry(open.account.clone()).or_default();
            }

            Directive::Close(close) => match accounts.get_mut(&close.account) {
                Some(state) => {
                    if state.closed.is_some() {
                        errors.push(ValidationError::new(
                            ErrorCode::AccountClosed,
                            format!("account {} is already closed", close.account),
                            close.date,
                        ));
                    } else if close.date < state.opened {
                        errors.push(ValidationError::new(
                            ErrorCode::AccountNotOpen,
                            format!(
                                "account {} closed on {} before it opened on {}",
                                close.account, close.date, state.opened
                            ),
                            close.date,
                        ));
                    } else {
                        if let Some(inventory) = inventories.get(&close.account) {
                            if !inventory.is_empty() {
                                errors.push(
                                    ValidationError::new(
                                        ErrorCode::AccountCloseNotEmpty,
                                        format!(
                                            "account {} closed with a non-zero balance",
                                            close.account
                                        ),
                                        close.date,
                                    )
                                    .with_context(format!("balance: {inventory}")),
                                );
                            }
                        }
                        state.closed = Some(close.date);
                    }
                }
                None => {
                    errors.push(ValidationError::new(
                        ErrorCode::AccountNotOpen,
                        format!("account {} was never opened", close.account),
                        close.date,
                    ));
                }
            },

            Directive::Commodity(commodity) => {
                if !commodities.insert(commodity.currency.clone()) {
                    errors.push(ValidationError::new(
                        ErrorCode::DuplicateCommodity,
                        format!("duplicate commodity declaration for {}", commodity.currency),
                        commodity.date,
                    ));
                }
            }

            Directive::Transaction(txn) => {
                check_transaction(txn, &accounts, &mut inventories, options, &mut errors);
            }

            Directive::Balance(balance) => {
                check_account_usage(&accounts, &balance.account, balance.date, false, &mut errors);

                let key = (
                    balance.account.clone(),
                    balance.amount.currency.to_string(),
                    balance.date,
                );
                if let Some(prior) = assertions.get(&key) {
                    if *prior != balance.amount.number {
                        errors.push(ValidationError::new(
                            ErrorCode::DuplicateBalance,
                            format!(
                                "conflicting balance assertions for {} on {}: {} vs {}",
                                balance.account, balance.date, prior, balance.amount
                            ),
                            balance.date,
                        ));
                    }
                } else {
                    assertions.insert(key, balance.amount.number);
                }

                check_balance_assertion(balance, &inventories, &mut errors);
            }

            Directive::Pad(pad) => {
                check_account_usage(&accounts, &pad.account, pad.date, false, &mut errors);
                check_account_usage(&accounts, &pad.source_account, pad.date, false, &mut errors);
            }

            // Notes and documents may trail a closed account.
            Directive::Note(note) => {
                check_account_usage(&accounts, &note.account, note.date, true, &mut errors);
            }
            Directive::Document(document) => {
                check_account_usage(&accounts, &document.account, document.date, true, &mut errors);
            }

            Directive::Event(_)
            | Directive::Query(_)
            | Directive::Price(_)
            | Directive::Custom(_) => {}
        }
    }

    errors
}

/// Check a single account reference against the lifecycle table.
fn check_account_usage(
    accounts: &HashMap<String, AccountState>,
    account: &str,
    date: NaiveDate,
    allow_after_close: bool,
    errors: &mut Vec<ValidationError>,
) {
    match accounts.get(account) {
        None => {
            errors.push(ValidationError::new(
                ErrorCode::AccountNotOpen,
                format!("account {account} was never opened"),
                date,
            ));
        }
        Some(state) => {
            if date < state.opened {
                errors.push(ValidationError::new(
                    ErrorCode::AccountNotOpen,
                    format!(
                        "account {account} used on {date} but not opened until {}",
                        state.opened
                    ),
                    date,
                ));
            }
            if let Some(closed) = state.closed {
                if date > closed && !allow_after_close {
                    errors.push(ValidationError::new(
                        ErrorCode::AccountClosed,
                        format!("account {account} used on {date} but closed on {closed}"),
                        date,
                    ));
                }
            }
        }
    }
}

fn check_transaction(
    txn: &Transaction,
    accounts: &HashMap<String, AccountState>,
    inventories: &mut HashMap<String, Inventory>,
    options: &ValidationOptions,
    errors: &mut Vec<ValidationError>,
) {
    for posting in &txn.postings {
        check_account_usage(accounts, &posting.account, txn.date, false, errors);

        if let (Some(state), Some(units)) = (accounts.get(&posting.account), posting.amount()) {
            if !state.currencies.is_empty() && !state.currencies.contains(units.currency.as_str())
            {
                errors.push(ValidationError::new(
                    ErrorCode::CurrencyNotAllowed,
                    format!(
                        "Invalid currency '{}' for account '{}'",
                        units.currency, posting.account
                    ),
                    txn.date,
                ));
            }
        }
    }

    // Residual per currency under the inferred tolerances.
    let tolerances = infer_tolerances(txn, &options.booking);
    let mut residuals: Vec<_> = residual(txn).into_iter().collect();
    residuals.sort_by(|a, b| a.0.cmp(&b.0));
    for (currency, amount) in residuals {
        if amount.abs() > tolerance_for(&tolerances, &options.booking, &currency) {
            errors.push(ValidationError::new(
                ErrorCode::TransactionUnbalanced,
                format!("transaction does not balance: {amount} {currency}"),
                txn.date,
            ));
        }
    }

    // Replay into the running inventories.
    for posting in &txn.postings {
        if let Some(units) = posting.amount() {
            inventories
                .entry(posting.account.clone())
                .or_default()
                .add_amount(units.clone(), posting.bound_cost().cloned());
        }
    }
}

fn check_balance_assertion(
    balance: &tally_core::Balance,
    inventories: &HashMap<String, Inventory>,
    errors: &mut Vec<ValidationError>,
) {
    let actual = inventories
        .get(&balance.account)
        .map_or(Decimal::ZERO, |inv| inv.units(&balance.amount.currency));
    let expected = balance.amount.number;
    let tolerance = balance
        .tolerance
        .unwrap_or_else(|| balance.amount.inferred_tolerance());
    let difference = actual - expected;

    if difference.abs() > tolerance {
        errors.push(
            ValidationError::new(
                ErrorCode::BalanceAssertionFailed,
                format!(
                    "balance of {} differs from expected {}: found {}",
                    balance.account,
                    balance.amount,
                    Amount::new(actual, balance.amount.currency.clone()),
                ),
                balance.date,
            )
            .with_context(format!("difference: {difference}")),
        );
    }
}
