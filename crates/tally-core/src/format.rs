//! Directive pretty-printer.
//!
//! Renders directives back to ledger text with configurable amount
//! alignment. Printing the loaded stream and reloading it yields an equal
//! stream.

use crate::{Directive, MetaValue, Metadata, Posting, Transaction};
use std::fmt::Write;

/// Formatter configuration.
#[derive(Debug, Clone)]
pub struct FormatConfig {
    /// Column amounts are aligned to.
    pub amount_column: usize,
    /// Indentation for postings.
    pub indent: String,
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            amount_column: 50,
            indent: "  ".to_string(),
        }
    }
}

/// Format a directive to ledger text, trailing newline included.
#[must_use]
pub fn format_directive(directive: &Directive, config: &FormatConfig) -> String {
    match directive {
        Directive::Transaction(txn) => format_transaction(txn, config),
        other => {
            let mut out = other.to_string();
            out.push('\n');
            push_metadata(&mut out, other.meta(), &config.indent);
            out
        }
    }
}

fn format_transaction(txn: &Transaction, config: &FormatConfig) -> String {
    let mut out = String::new();

    write!(out, "{} {}", txn.date, txn.flag).unwrap();
    if let Some(payee) = &txn.payee {
        write!(out, " \"{}\"", escape_string(payee)).unwrap();
    }
    write!(out, " \"{}\"", escape_string(&txn.narration)).unwrap();
    for tag in &txn.tags {
        write!(out, " #{tag}").unwrap();
    }
    for link in &txn.links {
        write!(out, " ^{link}").unwrap();
    }
    out.push('\n');

    push_metadata(&mut out, &txn.meta, &config.indent);

    for posting in &txn.postings {
        out.push_str(&format_posting(posting, config));
        out.push('\n');
    }

    out
}

fn format_posting(posting: &Posting, config: &FormatConfig) -> String {
    let mut line = String::new();
    line.push_str(&config.indent);
    if let Some(flag) = posting.flag {
        write!(line, "{flag} ").unwrap();
    }
    line.push_str(&posting.account);

    if let Some(units) = &posting.units {
        let amount = units.to_string();
        let pad = config
            .amount_column
            .saturating_sub(line.len() + amount.len())
            .max(2);
        for _ in 0..pad {
            line.push(' ');
        }
        line.push_str(&amount);
    }
    if let Some(cost) = &posting.cost {
        write!(line, " {cost}").unwrap();
    }
    if let Some(price) = &posting.price {
        write!(line, " {price}").unwrap();
    }
    line
}

fn push_metadata(out: &mut String, meta: &Metadata, indent: &str) {
    for (key, value) in meta {
        match value {
            MetaValue::None => writeln!(out, "{indent}{key}:").unwrap(),
            value => writeln!(out, "{indent}{key}: {value}").unwrap(),
        }
    }
}

fn escape_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}
