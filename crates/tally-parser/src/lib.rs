//! Parser for the tally ledger text format.
//!
//! Produces a stream of [`Directive`]s from source text, along with the
//! `option` / `include` / `plugin` lines and any parse errors. The grammar
//! recovers from errors, so directives and errors can both be non-empty.
//!
//! # Example
//!
//! ```
//! let source = "2023-01-02 * \"Coffee\"\n  Expenses:Food:Coffee  5.00 USD\n  Assets:Cash\n";
//!
//! let result = tally_parser::parse(source);
//! assert!(result.errors.is_empty());
//! assert_eq!(result.directives.len(), 1);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod grammar;
mod span;

pub use error::{ParseError, ParseErrorKind};
pub use span::{Span, Spanned};

use tally_core::Directive;

/// Result of parsing one source text.
#[derive(Debug)]
pub struct ParseResult {
    /// Successfully parsed directives, in file order.
    pub directives: Vec<Spanned<Directive>>,
    /// `option "KEY" "VALUE"` lines.
    pub options: Vec<(String, String, Span)>,
    /// `include "PATH"` lines.
    pub includes: Vec<(String, Span)>,
    /// `plugin "NAME" ["CONFIG"]` lines.
    pub plugins: Vec<(String, Option<String>, Span)>,
    /// Parse errors encountered.
    pub errors: Vec<ParseError>,
}

/// Parse ledger source text.
#[must_use]
pub fn parse(source: &str) -> ParseResult {
    grammar::parse(source)
}

/// Parse ledger source text, returning only directives and errors.
#[must_use]
pub fn parse_directives(source: &str) -> (Vec<Spanned<Directive>>, Vec<ParseError>) {
    let result = parse(source);
    (result.directives, result.errors)
}
