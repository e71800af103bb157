//! Core types for the tally ledger engine.
//!
//! This crate provides the fundamental types used throughout the project:
//!
//! - [`Amount`] - a decimal number with a currency
//! - [`Cost`] / [`CostSpec`] - bound and unbound lot costs
//! - [`Position`] - units held at an optional cost
//! - [`Inventory`] - keyed positions with booking-method reduction
//! - [`Directive`] - the twelve ledger entry kinds
//! - [`PriceMap`] - dated rates per currency pair
//! - [`account`] - the account-name algebra
//!
//! # Example
//!
//! ```
//! use tally_core::{Amount, BookingMethod, Cost, CostSpec, Inventory, Position};
//! use rust_decimal_macros::dec;
//! use chrono::NaiveDate;
//!
//! let mut inv = Inventory::new();
//! let cost = Cost::new(dec!(100.00), "USD")
//!     .with_date(NaiveDate::from_ymd_opt(2023, 1, 2).unwrap());
//! inv.add_position(Position::with_cost(Amount::new(dec!(10), "HOOL"), cost));
//!
//! let consumed = inv
//!     .reduce(
//!         &Amount::new(dec!(-5), "HOOL"),
//!         &CostSpec::empty(),
//!         BookingMethod::Fifo,
//!     )
//!     .unwrap();
//!
//! assert_eq!(inv.units("HOOL"), dec!(5));
//! assert_eq!(consumed[0].cost.as_ref().unwrap().number, dec!(100.00));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod account;
pub mod amount;
pub mod cost;
pub mod directive;
pub mod format;
pub mod intern;
pub mod inventory;
pub mod position;
pub mod prices;

pub use amount::{is_valid_currency, Amount, IncompleteAmount};
pub use cost::{Cost, CostSpec};
pub use directive::{
    sort_directives, Balance, Close, Commodity, Custom, Directive, Document, Event, MetaValue,
    Metadata, Note, Open, Pad, Posting, PostingCost, Price, PriceAnnotation, Query, Transaction,
};
pub use format::{format_directive, FormatConfig};
pub use intern::InternedStr;
pub use inventory::{BookingMethod, Inventory, MatchResult, ReduceError};
pub use position::Position;
pub use prices::{CurrencyPair, PriceMap};

// Re-export commonly used external types.
pub use chrono::NaiveDate;
pub use rust_decimal::Decimal;
