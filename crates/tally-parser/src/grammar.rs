//! The ledger grammar, written with chumsky combinators.
//!
//! The grammar covers the full documented format: all twelve dated
//! directives, multi-line transactions with indented postings, cost specs,
//! price annotations, tags, links, metadata lines, `option` / `include` /
//! `plugin`, `pushtag` / `poptag`, `pushmeta` / `popmeta`, comments, and
//! arithmetic expressions in number position. Error recovery skips a bad
//! line and keeps going.

use chumsky::prelude::*;
use rust_decimal::Decimal;
use std::str::FromStr;

use chrono::NaiveDate;
use tally_core::{
    Amount, Balance, Close, Commodity, CostSpec, Custom, Directive, Document, Event,
    IncompleteAmount, MetaValue, Metadata, Note, Open, Pad, Posting, PostingCost, Price,
    PriceAnnotation, Query, Transaction,
};

use crate::error::{ParseError, ParseErrorKind};
use crate::span::{Span, Spanned};
use crate::ParseResult;

type In<'a> = &'a str;
type Extra<'a> = extra::Err<Rich<'a, char>>;

const fn to_span(s: SimpleSpan) -> Span {
    Span::new(s.start, s.end)
}

/// Parse ledger source text.
pub fn parse(source: &str) -> ParseResult {
    let (items, errs) = file().parse(source).into_output_errors();
    let items = items.unwrap_or_default();

    let mut directives = Vec::new();
    let mut options = Vec::new();
    let mut includes = Vec::new();
    let mut plugins = Vec::new();

    // pushtag/pushmeta state threads through the file in declaration order.
    let mut tag_stack: Vec<String> = Vec::new();
    let mut meta_stack: Vec<(String, MetaValue)> = Vec::new();

    for (item, simple_span) in items {
        let span = to_span(simple_span);
        match item {
            Item::Directive(d) => {
                let d = apply_pushed_tags(d, &tag_stack);
                let d = apply_pushed_meta(d, &meta_stack);
                directives.push(Spanned::new(d, span));
            }
            Item::Option(key, value) => options.push((key, value, span)),
            Item::Include(path) => includes.push((path, span)),
            Item::Plugin(name, config) => plugins.push((name, config, span)),
            Item::Pushtag(tag) => tag_stack.push(tag),
            Item::Poptag(tag) => {
                if let Some(pos) = tag_stack.iter().rposition(|t| t == &tag) {
                    tag_stack.remove(pos);
                }
            }
            Item::Pushmeta(key, value) => meta_stack.push((key, value)),
            Item::Popmeta(key) => {
                if let Some(pos) = meta_stack.iter().rposition(|(k, _)| k == &key) {
                    meta_stack.remove(pos);
                }
            }
            Item::Comment => {}
        }
    }

    let errors: Vec<ParseError> = errs
        .into_iter()
        .map(|e| {
            let span = to_span(*e.span());
            let kind = if e.found().is_none() {
                ParseErrorKind::UnexpectedEof
            } else {
                ParseErrorKind::Syntax(e.to_string())
            };
            ParseError::new(kind, span)
        })
        .collect();

    ParseResult {
        directives,
        options,
        includes,
        plugins,
        errors,
    }
}

/// Add active pushed tags to transactions.
fn apply_pushed_tags(directive: Directive, tag_stack: &[String]) -> Directive {
    match directive {
        Directive::Transaction(mut txn) if !tag_stack.is_empty() => {
            for tag in tag_stack {
                if !txn.tags.contains(tag) {
                    txn.tags.push(tag.clone());
                }
            }
            Directive::Transaction(txn)
        }
        other => other,
    }
}

/// Add active pushed metadata to any directive, without clobbering keys the
/// directive wrote itself.
fn apply_pushed_meta(mut directive: Directive, meta_stack: &[(String, MetaValue)]) -> Directive {
    if !meta_stack.is_empty() {
        let meta = directive.meta_mut();
        for (key, value) in meta_stack {
            if !meta.contains_key(key) {
                meta.insert(key.clone(), value.clone());
            }
        }
    }
    directive
}

/// Top-level items of a ledger file.
#[derive(Debug, Clone)]
enum Item {
    Directive(Directive),
    Option(String, String),
    Include(String),
    Plugin(String, Option<String>),
    Pushtag(String),
    Poptag(String),
    Pushmeta(String, MetaValue),
    Popmeta(String),
    Comment,
}

// ---------------------------------------------------------------------------
// File structure
// ---------------------------------------------------------------------------

fn file<'a>() -> impl Parser<'a, In<'a>, Vec<(Item, SimpleSpan)>, Extra<'a>> {
    blank_lines().ignore_then(
        item()
            .map_with(|item, e| Some((item, e.span())))
            .recover_with(via_parser(
                // Skip at least one character, then the rest of the line.
                any()
                    .then(none_of("\r\n").repeated())
                    .then_ignore(newline().or_not())
                    .to(None),
            ))
            .then_ignore(blank_lines())
            .repeated()
            .collect::<Vec<_>>()
            .map(|items| items.into_iter().flatten().collect()),
    )
}

/// Blank lines, comment lines, and org-mode section lines.
fn blank_lines<'a>() -> impl Parser<'a, In<'a>, (), Extra<'a>> + Clone {
    choice((
        ws().then_ignore(newline()),
        ws().then_ignore(just(';'))
            .then_ignore(none_of("\r\n").repeated())
            .then_ignore(newline()),
        just('*')
            .then(none_of("\r\n").repeated())
            .then_ignore(newline())
            .ignored(),
    ))
    .repeated()
    .ignored()
}

fn item<'a>() -> impl Parser<'a, In<'a>, Item, Extra<'a>> {
    choice((
        dated_directive().map(Item::Directive),
        option_line(),
        include_line(),
        plugin_line(),
        pushtag_line(),
        poptag_line(),
        pushmeta_line(),
        popmeta_line(),
        // Trailing comment with no final newline.
        ws().ignore_then(just(';'))
            .then(none_of("\r\n").repeated())
            .to(Item::Comment),
    ))
}

/// Horizontal whitespace.
fn ws<'a>() -> impl Parser<'a, In<'a>, (), Extra<'a>> + Clone {
    one_of(" \t").repeated().ignored()
}

/// Required horizontal whitespace.
fn ws1<'a>() -> impl Parser<'a, In<'a>, (), Extra<'a>> + Clone {
    one_of(" \t").repeated().at_least(1).ignored()
}

fn newline<'a>() -> impl Parser<'a, In<'a>, (), Extra<'a>> + Clone {
    just('\n')
        .ignored()
        .or(just('\r').ignore_then(just('\n')).ignored())
}

fn trailing_comment<'a>() -> impl Parser<'a, In<'a>, (), Extra<'a>> + Clone {
    ws().then(just(';').then(none_of("\r\n").repeated()))
        .ignored()
}

// ---------------------------------------------------------------------------
// Undated lines: option, include, plugin, pushtag/poptag, pushmeta/popmeta
// ---------------------------------------------------------------------------

fn option_line<'a>() -> impl Parser<'a, In<'a>, Item, Extra<'a>> {
    just("option")
        .ignore_then(ws1())
        .ignore_then(string_literal())
        .then_ignore(ws1())
        .then(string_literal())
        .then_ignore(ws())
        .then_ignore(trailing_comment().or_not())
        .map(|(key, value)| Item::Option(key, value))
}

fn include_line<'a>() -> impl Parser<'a, In<'a>, Item, Extra<'a>> {
    just("include")
        .ignore_then(ws1())
        .ignore_then(string_literal())
        .then_ignore(ws())
        .then_ignore(trailing_comment().or_not())
        .map(Item::Include)
}

fn plugin_line<'a>() -> impl Parser<'a, In<'a>, Item, Extra<'a>> {
    just("plugin")
        .ignore_then(ws1())
        .ignore_then(string_literal())
        .then(ws1().ignore_then(string_literal()).or_not())
        .then_ignore(ws())
        .then_ignore(trailing_comment().or_not())
        .map(|(name, config)| Item::Plugin(name, config))
}

fn pushtag_line<'a>() -> impl Parser<'a, In<'a>, Item, Extra<'a>> {
    just("pushtag")
        .ignore_then(ws1())
        .ignore_then(just('#'))
        .ignore_then(tag_name())
        .then_ignore(ws())
        .then_ignore(trailing_comment().or_not())
        .map(Item::Pushtag)
}

fn poptag_line<'a>() -> impl Parser<'a, In<'a>, Item, Extra<'a>> {
    just("poptag")
        .ignore_then(ws1())
        .ignore_then(just('#'))
        .ignore_then(tag_name())
        .then_ignore(ws())
        .then_ignore(trailing_comment().or_not())
        .map(Item::Poptag)
}

fn pushmeta_line<'a>() -> impl Parser<'a, In<'a>, Item, Extra<'a>> {
    just("pushmeta")
        .ignore_then(ws1())
        .ignore_then(meta_key())
        .then_ignore(just(':'))
        .then_ignore(ws())
        .then(meta_value())
        .then_ignore(ws())
        .then_ignore(trailing_comment().or_not())
        .map(|(key, value)| Item::Pushmeta(key, value))
}

fn popmeta_line<'a>() -> impl Parser<'a, In<'a>, Item, Extra<'a>> {
    just("popmeta")
        .ignore_then(ws1())
        .ignore_then(meta_key())
        .then_ignore(just(':'))
        .then_ignore(ws())
        .then_ignore(trailing_comment().or_not())
        .map(Item::Popmeta)
}

// ---------------------------------------------------------------------------
// Primitives: strings, dates, numbers, currencies, accounts, tags, links
// ---------------------------------------------------------------------------

fn single_line_string<'a>() -> impl Parser<'a, In<'a>, String, Extra<'a>> + Clone {
    just('"')
        .ignore_then(
            none_of("\"\\")
                .or(just('\\').ignore_then(any()))
                .repeated()
                .collect::<String>(),
        )
        .then_ignore(just('"'))
}

fn multiline_string<'a>() -> impl Parser<'a, In<'a>, String, Extra<'a>> + Clone {
    just("\"\"\"")
        .ignore_then(
            any()
                .and_is(just("\"\"\"").not())
                .repeated()
                .collect::<String>(),
        )
        .then_ignore(just("\"\"\""))
}

fn string_literal<'a>() -> impl Parser<'a, In<'a>, String, Extra<'a>> + Clone {
    multiline_string().or(single_line_string())
}

fn digits<'a>() -> impl Parser<'a, In<'a>, &'a str, Extra<'a>> + Clone {
    one_of("0123456789").repeated().at_least(1).to_slice()
}

fn date<'a>() -> impl Parser<'a, In<'a>, NaiveDate, Extra<'a>> + Clone {
    digits()
        .then_ignore(just('-').or(just('/')))
        .then(digits())
        .then_ignore(just('-').or(just('/')))
        .then(digits())
        .try_map(|((year, month), day): ((&str, &str), &str), span| {
            let y: i32 = year
                .parse()
                .map_err(|_| Rich::custom(span, "invalid year"))?;
            let m: u32 = month
                .parse()
                .map_err(|_| Rich::custom(span, "invalid month"))?;
            let d: u32 = day.parse().map_err(|_| Rich::custom(span, "invalid day"))?;
            NaiveDate::from_ymd_opt(y, m, d).ok_or_else(|| Rich::custom(span, "invalid date"))
        })
}

/// A number literal with optional comma grouping and leading-dot decimals.
fn number_literal<'a>() -> impl Parser<'a, In<'a>, Decimal, Extra<'a>> + Clone {
    let int_part = digits()
        .then(just(',').then(digits()).repeated())
        .to_slice();
    let frac_part = just('.').then(digits()).to_slice();

    let body = choice((
        int_part
            .then(frac_part.clone().or_not())
            .map(|(int, frac)| (Some(int), frac)),
        frac_part.map(|frac: &str| (None, Some(frac))),
    ));

    body.try_map(|(int_part, frac_part): (Option<&str>, Option<&str>), span| {
        let mut s = String::new();
        match int_part {
            Some(int) => s.extend(int.chars().filter(|&c| c != ',')),
            None => s.push('0'),
        }
        if let Some(frac) = frac_part {
            s.push_str(frac);
        }
        Decimal::from_str(&s).map_err(|_| Rich::custom(span, "invalid number"))
    })
}

/// Arithmetic in number position: `+ - * /`, parentheses, unary signs.
fn expr<'a>() -> impl Parser<'a, In<'a>, Decimal, Extra<'a>> + Clone {
    recursive(|expr| {
        let atom = choice((
            just('(')
                .ignore_then(ws())
                .ignore_then(expr.clone())
                .then_ignore(ws())
                .then_ignore(just(')')),
            number_literal(),
        ));

        let unary = choice((just('-'), just('+')))
            .then_ignore(ws())
            .repeated()
            .collect::<Vec<_>>()
            .then(atom)
            .map(|(signs, n): (Vec<char>, Decimal)| {
                if signs.iter().filter(|&&c| c == '-').count() % 2 == 1 {
                    -n
                } else {
                    n
                }
            });

        let term = unary.clone().foldl(
            ws().ignore_then(just('*').or(just('/')))
                .then_ignore(ws())
                .then(unary)
                .repeated(),
            |left, (op, right)| {
                if op == '*' {
                    left * right
                } else {
                    left / right
                }
            },
        );

        term.clone().foldl(
            ws().ignore_then(just('+').or(just('-')))
                .then_ignore(ws())
                .then(term)
                .repeated(),
            |left, (op, right)| {
                if op == '+' {
                    left + right
                } else {
                    left - right
                }
            },
        )
    })
}

fn number<'a>() -> impl Parser<'a, In<'a>, Decimal, Extra<'a>> + Clone {
    expr()
}

fn currency<'a>() -> impl Parser<'a, In<'a>, String, Extra<'a>> + Clone {
    one_of("/ABCDEFGHIJKLMNOPQRSTUVWXYZ")
        .then(one_of("ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789'._-/").repeated())
        .to_slice()
        .map(|s: &str| s.to_string())
}

fn account<'a>() -> impl Parser<'a, In<'a>, String, Extra<'a>> + Clone {
    let first_component = one_of("ABCDEFGHIJKLMNOPQRSTUVWXYZ")
        .then(one_of("ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-").repeated())
        .to_slice();
    let component = one_of("ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789")
        .then(one_of("ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-").repeated())
        .to_slice();

    first_component
        .then(just(':').then(component).repeated().at_least(1))
        .to_slice()
        .map(|s: &str| s.to_string())
}

/// Transaction flag: `*`, `!`, a single flag letter, or the `txn` keyword.
fn flag<'a>() -> impl Parser<'a, In<'a>, char, Extra<'a>> + Clone {
    choice((just("txn").to('*'), one_of("*!&#?%PSTCURM")))
}

fn tag_name<'a>() -> impl Parser<'a, In<'a>, String, Extra<'a>> + Clone {
    one_of("ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_/.")
        .repeated()
        .at_least(1)
        .collect()
}

fn tag<'a>() -> impl Parser<'a, In<'a>, String, Extra<'a>> + Clone {
    just('#').ignore_then(tag_name())
}

fn link<'a>() -> impl Parser<'a, In<'a>, String, Extra<'a>> + Clone {
    just('^').ignore_then(tag_name())
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

fn meta_key<'a>() -> impl Parser<'a, In<'a>, String, Extra<'a>> + Clone {
    one_of("abcdefghijklmnopqrstuvwxyz")
        .then(one_of("abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789-_").repeated())
        .to_slice()
        .map(|s: &str| s.to_string())
}

fn meta_value<'a>() -> impl Parser<'a, In<'a>, MetaValue, Extra<'a>> + Clone {
    choice((
        string_literal().map(MetaValue::String),
        // Account before currency: a currency matcher accepts an account
        // prefix.
        account().map(MetaValue::Account),
        tag().map(MetaValue::Tag),
        link().map(MetaValue::Link),
        // Date before number: "2023" parses as a number.
        date().map(MetaValue::Date),
        amount().map(MetaValue::Amount),
        number().map(MetaValue::Number),
        just("TRUE").to(MetaValue::Bool(true)),
        just("FALSE").to(MetaValue::Bool(false)),
        currency().map(MetaValue::Currency),
    ))
}

/// An indented `key: value` line under a directive.
fn meta_line<'a>() -> impl Parser<'a, In<'a>, (String, MetaValue), Extra<'a>> {
    newline()
        .ignore_then(ws1())
        .ignore_then(meta_key())
        .then_ignore(just(':'))
        .then_ignore(ws())
        .then(meta_value().or_not())
        .then_ignore(ws())
        .then_ignore(trailing_comment().or_not())
        .map(|(key, value)| (key, value.unwrap_or(MetaValue::None)))
}

fn collect_meta(items: Vec<(String, MetaValue)>) -> Metadata {
    let mut meta = Metadata::new();
    for (k, v) in items {
        meta.insert(k, v);
    }
    meta
}

// ---------------------------------------------------------------------------
// Amounts, costs, prices
// ---------------------------------------------------------------------------

fn amount<'a>() -> impl Parser<'a, In<'a>, Amount, Extra<'a>> + Clone {
    number()
        .then_ignore(ws())
        .then(currency())
        .map(|(n, c)| Amount::new(n, c))
}

/// An amount any part of which may be elided.
fn incomplete_amount<'a>() -> impl Parser<'a, In<'a>, IncompleteAmount, Extra<'a>> + Clone {
    choice((
        number()
            .then_ignore(ws())
            .then(currency())
            .map(|(n, c)| IncompleteAmount::Complete(Amount::new(n, c))),
        number().map(IncompleteAmount::NumberOnly),
        currency().map(|c| IncompleteAmount::CurrencyOnly(c.into())),
    ))
}

/// One element inside a `{...}` cost spec.
#[derive(Debug, Clone)]
enum CostAtom {
    Amount(Decimal, String),
    NumberOnly(Decimal),
    CurrencyOnly(String),
    Date(NaiveDate),
    Label(String),
    Merge,
    /// `#` separating per-unit from total components.
    Hash,
}

fn cost_atom<'a>() -> impl Parser<'a, In<'a>, CostAtom, Extra<'a>> + Clone {
    choice((
        // Date before number: "2023" is a valid number prefix of a date.
        date().map(CostAtom::Date),
        number()
            .then_ignore(ws())
            .then(currency())
            .map(|(n, c)| CostAtom::Amount(n, c)),
        number().map(CostAtom::NumberOnly),
        currency().map(CostAtom::CurrencyOnly),
        string_literal().map(CostAtom::Label),
        just('*').to(CostAtom::Merge),
        just('#').to(CostAtom::Hash),
    ))
}

/// `{...}` per-unit cost spec or `{{...}}` total cost spec.
///
/// Components separate on whitespace, commas, or slashes; `#` inside single
/// braces splits per-unit components from total ones.
fn cost_spec<'a>() -> impl Parser<'a, In<'a>, CostSpec, Extra<'a>> + Clone {
    let delimiter = just(',').or(just('/')).to(None);
    let atoms = cost_atom()
        .map(Some)
        .or(delimiter)
        .padded()
        .repeated()
        .collect::<Vec<_>>()
        .map(|v| v.into_iter().flatten().collect::<Vec<_>>());

    let single = just('{')
        .ignore_then(atoms.clone())
        .then_ignore(just('}'))
        .map(|atoms| assemble_cost_spec(atoms, false));
    let double = just("{{")
        .ignore_then(atoms)
        .then_ignore(just("}}"))
        .map(|atoms| assemble_cost_spec(atoms, true));

    double.or(single)
}

fn assemble_cost_spec(atoms: Vec<CostAtom>, total_braces: bool) -> CostSpec {
    let mut spec = CostSpec::default();

    let hash_pos = atoms.iter().position(|a| matches!(a, CostAtom::Hash));
    let (per_unit, total): (Vec<_>, Vec<_>) = match hash_pos {
        Some(pos) => {
            let (before, after) = atoms.split_at(pos);
            (before.to_vec(), after[1..].to_vec())
        }
        None if total_braces => (vec![], atoms),
        None => (atoms, vec![]),
    };

    for atom in per_unit {
        match atom {
            CostAtom::Amount(n, c) => {
                spec.number_per = Some(n);
                spec.currency = Some(c.into());
            }
            CostAtom::NumberOnly(n) => spec.number_per = Some(n),
            CostAtom::CurrencyOnly(c) => {
                spec.currency.get_or_insert_with(|| c.into());
            }
            CostAtom::Date(d) => spec.date = Some(d),
            CostAtom::Label(l) => spec.label = Some(l),
            CostAtom::Merge => spec.merge = true,
            CostAtom::Hash => {}
        }
    }
    for atom in total {
        match atom {
            CostAtom::Amount(n, c) => {
                spec.number_total = Some(n);
                spec.currency = Some(c.into());
            }
            CostAtom::NumberOnly(n) => spec.number_total = Some(n),
            CostAtom::CurrencyOnly(c) => {
                spec.currency.get_or_insert_with(|| c.into());
            }
            CostAtom::Date(d) => {
                spec.date.get_or_insert(d);
            }
            CostAtom::Label(l) => {
                spec.label.get_or_insert(l);
            }
            CostAtom::Merge => spec.merge = true,
            CostAtom::Hash => {}
        }
    }

    spec
}

/// `@ amount` (per-unit) or `@@ amount` (total), amount possibly partial or
/// absent.
fn price_annotation<'a>() -> impl Parser<'a, In<'a>, PriceAnnotation, Extra<'a>> + Clone {
    let price_amount = choice((
        incomplete_amount().map(Some),
        empty().to(None),
    ));

    choice((
        just("@@")
            .ignore_then(ws())
            .ignore_then(price_amount.clone())
            .map(|amount| match amount {
                Some(IncompleteAmount::Complete(a)) => PriceAnnotation::Total(a),
                Some(ia) => PriceAnnotation::TotalIncomplete(ia),
                None => PriceAnnotation::TotalEmpty,
            }),
        just('@')
            .ignore_then(ws())
            .ignore_then(price_amount)
            .map(|amount| match amount {
                Some(IncompleteAmount::Complete(a)) => PriceAnnotation::Unit(a),
                Some(ia) => PriceAnnotation::UnitIncomplete(ia),
                None => PriceAnnotation::UnitEmpty,
            }),
    ))
}

// ---------------------------------------------------------------------------
// Dated directives
// ---------------------------------------------------------------------------

type Build<'a> = Box<dyn Fn(NaiveDate) -> Directive + 'a>;

fn dated_directive<'a>() -> impl Parser<'a, In<'a>, Directive, Extra<'a>> {
    date()
        .then_ignore(ws1())
        .then(choice((
            transaction_body(),
            balance_body(),
            open_body(),
            close_body(),
            commodity_body(),
            pad_body(),
            event_body(),
            query_body(),
            note_body(),
            document_body(),
            price_body(),
            custom_body(),
        )))
        .map(|(d, build)| build(d))
}

/// Lines under a transaction header.
#[derive(Debug, Clone)]
enum TxnLine {
    Posting(Posting),
    Meta(String, MetaValue),
    TagsLinks(Vec<String>, Vec<String>),
}

/// Header items after the flag: payee/narration strings, tags, links, in
/// any order.
#[derive(Debug, Clone)]
enum HeaderItem {
    Str(String),
    Tag(String),
    Link(String),
}

fn transaction_body<'a>() -> impl Parser<'a, In<'a>, Build<'a>, Extra<'a>> {
    let header_item = choice((
        string_literal().map(HeaderItem::Str),
        tag().map(HeaderItem::Tag),
        link().map(HeaderItem::Link),
    ));

    flag()
        .then_ignore(ws())
        .then(header_item.separated_by(ws()).collect::<Vec<_>>())
        .then_ignore(ws())
        .then_ignore(trailing_comment().or_not())
        .then(txn_line().repeated().collect::<Vec<_>>())
        .map(move |((flag, header), lines)| {
            Box::new(move |date: NaiveDate| {
                let mut strings = Vec::new();
                let mut tags = Vec::new();
                let mut links = Vec::new();
                for item in header.clone() {
                    match item {
                        HeaderItem::Str(s) => strings.push(s),
                        HeaderItem::Tag(t) => tags.push(t),
                        HeaderItem::Link(l) => links.push(l),
                    }
                }

                let (payee, narration) = match strings.len() {
                    0 => (None, String::new()),
                    1 => (None, strings[0].clone()),
                    _ => (Some(strings[0].clone()), strings[1].clone()),
                };

                let mut txn = Transaction::new(date, narration).with_flag(flag);
                txn.payee = payee;
                txn.tags = tags;
                txn.links = links;
                for line in lines.clone().into_iter().flatten() {
                    match line {
                        TxnLine::Posting(p) => txn.postings.push(p),
                        TxnLine::Meta(k, v) => {
                            txn.meta.insert(k, v);
                        }
                        TxnLine::TagsLinks(t, l) => {
                            txn.tags.extend(t);
                            txn.links.extend(l);
                        }
                    }
                }
                Directive::Transaction(txn)
            }) as Build<'a>
        })
}

/// One indented line of a transaction: metadata, tag/link continuation, a
/// posting, or a comment (which yields nothing).
fn txn_line<'a>() -> impl Parser<'a, In<'a>, Option<TxnLine>, Extra<'a>> {
    let meta_entry = newline()
        .ignore_then(ws1())
        .ignore_then(meta_key())
        .then_ignore(just(':'))
        .then_ignore(ws())
        .then(meta_value().or_not())
        .then_ignore(ws())
        .then_ignore(trailing_comment().or_not())
        .map(|(k, v)| Some(TxnLine::Meta(k, v.unwrap_or(MetaValue::None))));

    let tag_or_link = choice((tag().map(Ok), link().map(Err)));
    let tags_links_line = newline()
        .ignore_then(ws1())
        .ignore_then(tag_or_link.separated_by(ws()).at_least(1).collect::<Vec<_>>())
        .then_ignore(ws())
        .then_ignore(trailing_comment().or_not())
        .map(|items: Vec<Result<String, String>>| {
            let mut tags = Vec::new();
            let mut links = Vec::new();
            for item in items {
                match item {
                    Ok(tag) => tags.push(tag),
                    Err(link) => links.push(link),
                }
            }
            Some(TxnLine::TagsLinks(tags, links))
        });

    let comment_only = newline()
        .ignore_then(ws())
        .ignore_then(just(';'))
        .ignore_then(none_of("\r\n").repeated())
        .map(|()| None);

    choice((
        meta_entry,
        tags_links_line,
        posting().map(|p| Some(TxnLine::Posting(p))),
        comment_only,
    ))
}

/// Metadata indented under a posting (deeper than the posting itself).
fn posting_meta<'a>() -> impl Parser<'a, In<'a>, (String, MetaValue), Extra<'a>> {
    newline()
        .ignore_then(just("    ").or(just("\t\t")))
        .ignore_then(ws())
        .ignore_then(meta_key())
        .then_ignore(just(':'))
        .then_ignore(ws())
        .then(meta_value().or_not())
        .then_ignore(ws())
        .then_ignore(trailing_comment().or_not())
        .map(|(k, v)| (k, v.unwrap_or(MetaValue::None)))
}

fn posting<'a>() -> impl Parser<'a, In<'a>, Posting, Extra<'a>> {
    // units [{cost}] [@ price], or cost/price alone when units are elided.
    let amount_cost_price = incomplete_amount()
        .then(ws().ignore_then(cost_spec()).or_not())
        .then(ws().ignore_then(price_annotation()).or_not())
        .map(|((units, cost), price)| (Some(units), cost, price));
    let cost_only = cost_spec()
        .then(ws().ignore_then(price_annotation()).or_not())
        .map(|(cost, price)| (None, Some(cost), price));
    let price_only = price_annotation().map(|price| (None, None, Some(price)));

    newline()
        .ignore_then(ws1())
        .ignore_then(flag().then_ignore(ws1()).or_not())
        .then(account())
        .then_ignore(ws())
        .then(amount_cost_price.or(cost_only).or(price_only).or_not())
        .then_ignore(ws())
        .then_ignore(trailing_comment().or_not())
        .then(posting_meta().repeated().collect::<Vec<_>>())
        .map(|(((flag, account), parts), meta_items)| {
            let mut posting = match parts {
                Some((units, cost, price)) => {
                    let mut p = match units {
                        Some(u) => Posting::with_incomplete(&account, u),
                        None => Posting::auto(&account),
                    };
                    p.cost = cost.map(PostingCost::Spec);
                    p.price = price;
                    p
                }
                None => Posting::auto(&account),
            };
            posting.flag = flag;
            posting.meta = collect_meta(meta_items);
            posting
        })
}

fn balance_body<'a>() -> impl Parser<'a, In<'a>, Build<'a>, Extra<'a>> {
    // NUMBER [~ TOLERANCE] CURRENCY
    let tolerance = ws()
        .ignore_then(just('~'))
        .ignore_then(ws())
        .ignore_then(number());

    just("balance")
        .ignore_then(ws1())
        .ignore_then(account())
        .then_ignore(ws1())
        .then(number().then(tolerance.or_not()).then_ignore(ws()).then(currency()))
        .then_ignore(ws())
        .then_ignore(trailing_comment().or_not())
        .then(meta_line().repeated().collect::<Vec<_>>())
        .map(move |((account, ((number, tolerance), currency)), meta_items)| {
            let meta = collect_meta(meta_items);
            Box::new(move |date: NaiveDate| {
                Directive::Balance(Balance {
                    date,
                    account: account.clone(),
                    amount: Amount::new(number, currency.as_str()),
                    tolerance,
                    meta: meta.clone(),
                })
            }) as Build<'a>
        })
}

fn open_body<'a>() -> impl Parser<'a, In<'a>, Build<'a>, Extra<'a>> {
    just("open")
        .ignore_then(ws1())
        .ignore_then(account())
        .then_ignore(ws())
        .then(
            currency()
                .separated_by(just(',').then(ws()))
                .collect::<Vec<_>>(),
        )
        .then_ignore(ws())
        .then(string_literal().or_not())
        .then_ignore(ws())
        .then_ignore(trailing_comment().or_not())
        .then(meta_line().repeated().collect::<Vec<_>>())
        .map(move |(((account, currencies), booking), meta_items)| {
            let meta = collect_meta(meta_items);
            Box::new(move |date: NaiveDate| {
                Directive::Open(Open {
                    date,
                    account: account.clone(),
                    currencies: currencies.clone(),
                    booking: booking.clone(),
                    meta: meta.clone(),
                })
            }) as Build<'a>
        })
}

fn close_body<'a>() -> impl Parser<'a, In<'a>, Build<'a>, Extra<'a>> {
    just("close")
        .ignore_then(ws1())
        .ignore_then(account())
        .then_ignore(ws())
        .then_ignore(trailing_comment().or_not())
        .then(meta_line().repeated().collect::<Vec<_>>())
        .map(move |(account, meta_items)| {
            let meta = collect_meta(meta_items);
            Box::new(move |date: NaiveDate| {
                Directive::Close(Close {
                    date,
                    account: account.clone(),
                    meta: meta.clone(),
                })
            }) as Build<'a>
        })
}

fn commodity_body<'a>() -> impl Parser<'a, In<'a>, Build<'a>, Extra<'a>> {
    just("commodity")
        .ignore_then(ws1())
        .ignore_then(currency())
        .then_ignore(ws())
        .then_ignore(trailing_comment().or_not())
        .then(meta_line().repeated().collect::<Vec<_>>())
        .map(move |(currency, meta_items)| {
            let meta = collect_meta(meta_items);
            Box::new(move |date: NaiveDate| {
                Directive::Commodity(Commodity {
                    date,
                    currency: currency.clone(),
                    meta: meta.clone(),
                })
            }) as Build<'a>
        })
}

fn pad_body<'a>() -> impl Parser<'a, In<'a>, Build<'a>, Extra<'a>> {
    just("pad")
        .ignore_then(ws1())
        .ignore_then(account())
        .then_ignore(ws1())
        .then(account())
        .then_ignore(ws())
        .then_ignore(trailing_comment().or_not())
        .then(meta_line().repeated().collect::<Vec<_>>())
        .map(move |((account, source), meta_items)| {
            let meta = collect_meta(meta_items);
            Box::new(move |date: NaiveDate| {
                Directive::Pad(Pad {
                    date,
                    account: account.clone(),
                    source_account: source.clone(),
                    meta: meta.clone(),
                })
            }) as Build<'a>
        })
}

fn event_body<'a>() -> impl Parser<'a, In<'a>, Build<'a>, Extra<'a>> {
    just("event")
        .ignore_then(ws1())
        .ignore_then(string_literal())
        .then_ignore(ws1())
        .then(string_literal())
        .then_ignore(ws())
        .then_ignore(trailing_comment().or_not())
        .then(meta_line().repeated().collect::<Vec<_>>())
        .map(move |((name, value), meta_items)| {
            let meta = collect_meta(meta_items);
            Box::new(move |date: NaiveDate| {
                Directive::Event(Event {
                    date,
                    name: name.clone(),
                    value: value.clone(),
                    meta: meta.clone(),
                })
            }) as Build<'a>
        })
}

fn query_body<'a>() -> impl Parser<'a, In<'a>, Build<'a>, Extra<'a>> {
    just("query")
        .ignore_then(ws1())
        .ignore_then(string_literal())
        .then_ignore(ws1())
        .then(string_literal())
        .then_ignore(ws())
        .then_ignore(trailing_comment().or_not())
        .then(meta_line().repeated().collect::<Vec<_>>())
        .map(move |((name, query), meta_items)| {
            let meta = collect_meta(meta_items);
            Box::new(move |date: NaiveDate| {
                Directive::Query(Query {
                    date,
                    name: name.clone(),
                    query: query.clone(),
                    meta: meta.clone(),
                })
            }) as Build<'a>
        })
}

fn note_body<'a>() -> impl Parser<'a, In<'a>, Build<'a>, Extra<'a>> {
    just("note")
        .ignore_then(ws1())
        .ignore_then(account())
        .then_ignore(ws1())
        .then(string_literal())
        .then_ignore(ws())
        .then_ignore(trailing_comment().or_not())
        .then(meta_line().repeated().collect::<Vec<_>>())
        .map(move |((account, comment), meta_items)| {
            let meta = collect_meta(meta_items);
            Box::new(move |date: NaiveDate| {
                Directive::Note(Note {
                    date,
                    account: account.clone(),
                    comment: comment.clone(),
                    meta: meta.clone(),
                })
            }) as Build<'a>
        })
}

fn document_body<'a>() -> impl Parser<'a, In<'a>, Build<'a>, Extra<'a>> {
    let tag_or_link = choice((tag().map(Ok), link().map(Err)));

    just("document")
        .ignore_then(ws1())
        .ignore_then(account())
        .then_ignore(ws1())
        .then(string_literal())
        .then_ignore(ws())
        .then(tag_or_link.separated_by(ws()).collect::<Vec<_>>())
        .then_ignore(ws())
        .then_ignore(trailing_comment().or_not())
        .then(meta_line().repeated().collect::<Vec<_>>())
        .map(move |(((account, path), tags_links), meta_items)| {
            let mut tags = Vec::new();
            let mut links = Vec::new();
            for item in tags_links {
                match item {
                    Ok(tag) => tags.push(tag),
                    Err(link) => links.push(link),
                }
            }
            let meta = collect_meta(meta_items);
            Box::new(move |date: NaiveDate| {
                Directive::Document(Document {
                    date,
                    account: account.clone(),
                    path: path.clone(),
                    tags: tags.clone(),
                    links: links.clone(),
                    meta: meta.clone(),
                })
            }) as Build<'a>
        })
}

fn price_body<'a>() -> impl Parser<'a, In<'a>, Build<'a>, Extra<'a>> {
    just("price")
        .ignore_then(ws1())
        .ignore_then(currency())
        .then_ignore(ws1())
        .then(amount())
        .then_ignore(ws())
        .then_ignore(trailing_comment().or_not())
        .then(meta_line().repeated().collect::<Vec<_>>())
        .map(move |((currency, amount), meta_items)| {
            let meta = collect_meta(meta_items);
            Box::new(move |date: NaiveDate| {
                Directive::Price(Price {
                    date,
                    currency: currency.clone(),
                    amount: amount.clone(),
                    meta: meta.clone(),
                })
            }) as Build<'a>
        })
}

fn custom_body<'a>() -> impl Parser<'a, In<'a>, Build<'a>, Extra<'a>> {
    just("custom")
        .ignore_then(ws1())
        .ignore_then(string_literal())
        .then_ignore(ws())
        .then(meta_value().separated_by(ws1()).collect::<Vec<_>>())
        .then_ignore(ws())
        .then_ignore(trailing_comment().or_not())
        .map(move |(name, values)| {
            Box::new(move |date: NaiveDate| {
                Directive::Custom(Custom {
                    date,
                    name: name.clone(),
                    values: values.clone(),
                    meta: Metadata::new(),
                })
            }) as Build<'a>
        })
}
