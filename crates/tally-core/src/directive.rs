//! Directive types: the twelve kinds of ledger entry.
//!
//! - [`Transaction`] - transfers between accounts, the only compound directive
//! - [`Balance`] - assert an account balance in one currency on a date
//! - [`Open`] / [`Close`] - account lifecycle
//! - [`Commodity`] - per-currency metadata attachment point
//! - [`Pad`] - request automatic padding before the next balance assertion
//! - [`Note`], [`Document`], [`Event`], [`Query`], [`Price`], [`Custom`]
//!
//! Every directive carries a date and a metadata map; dispatch is by
//! exhaustive match on the [`Directive`] sum type.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::{Amount, Cost, CostSpec, IncompleteAmount};

/// Metadata value types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetaValue {
    /// String value.
    String(String),
    /// Account reference.
    Account(String),
    /// Currency code.
    Currency(String),
    /// Tag reference.
    Tag(String),
    /// Link reference.
    Link(String),
    /// Date value.
    Date(NaiveDate),
    /// Numeric value.
    Number(Decimal),
    /// Boolean value.
    Bool(bool),
    /// Amount value.
    Amount(Amount),
    /// Key present without a value.
    None,
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "\"{s}\""),
            Self::Account(a) => write!(f, "{a}"),
            Self::Currency(c) => write!(f, "{c}"),
            Self::Tag(t) => write!(f, "#{t}"),
            Self::Link(l) => write!(f, "^{l}"),
            Self::Date(d) => write!(f, "{d}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Amount(a) => write!(f, "{a}"),
            Self::None => write!(f, ""),
        }
    }
}

/// Key-value metadata attached to directives and postings.
///
/// A sorted map keeps printing deterministic.
pub type Metadata = BTreeMap<String, MetaValue>;

/// The cost attached to a posting.
///
/// The parser only produces the unbound [`CostSpec`] form; the booking
/// engine rewrites every surviving cost into the bound [`Cost`] form. After
/// booking, a `Spec` is a contract violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostingCost {
    /// Unbound specification from `{...}` syntax.
    Spec(CostSpec),
    /// Fully resolved lot cost.
    Bound(Cost),
}

impl PostingCost {
    /// Get the bound cost, if booking has resolved it.
    #[must_use]
    pub const fn as_bound(&self) -> Option<&Cost> {
        match self {
            Self::Bound(cost) => Some(cost),
            Self::Spec(_) => None,
        }
    }

    /// Get the unbound spec, if still unresolved.
    #[must_use]
    pub const fn as_spec(&self) -> Option<&CostSpec> {
        match self {
            Self::Spec(spec) => Some(spec),
            Self::Bound(_) => None,
        }
    }

    /// The cost currency, when written or resolved.
    #[must_use]
    pub fn currency(&self) -> Option<&crate::InternedStr> {
        match self {
            Self::Spec(spec) => spec.currency.as_ref(),
            Self::Bound(cost) => Some(&cost.currency),
        }
    }
}

impl fmt::Display for PostingCost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spec(spec) => write!(f, "{spec}"),
            Self::Bound(cost) => write!(f, "{cost}"),
        }
    }
}

/// Price annotation on a posting (`@` per-unit or `@@` total).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriceAnnotation {
    /// Per-unit price with a complete amount.
    Unit(Amount),
    /// Total price with a complete amount.
    Total(Amount),
    /// Per-unit price with a partially written amount.
    UnitIncomplete(IncompleteAmount),
    /// Total price with a partially written amount.
    TotalIncomplete(IncompleteAmount),
    /// `@` with nothing after it.
    UnitEmpty,
    /// `@@` with nothing after it.
    TotalEmpty,
}

impl PriceAnnotation {
    /// Get the complete amount if available.
    #[must_use]
    pub const fn amount(&self) -> Option<&Amount> {
        match self {
            Self::Unit(a) | Self::Total(a) => Some(a),
            Self::UnitIncomplete(ia) | Self::TotalIncomplete(ia) => ia.as_amount(),
            Self::UnitEmpty | Self::TotalEmpty => None,
        }
    }

    /// The price currency, when written.
    #[must_use]
    pub fn currency(&self) -> Option<&crate::InternedStr> {
        match self {
            Self::Unit(a) | Self::Total(a) => Some(&a.currency),
            Self::UnitIncomplete(ia) | Self::TotalIncomplete(ia) => ia.currency(),
            Self::UnitEmpty | Self::TotalEmpty => None,
        }
    }

    /// Check if this is a per-unit price (`@` rather than `@@`).
    #[must_use]
    pub const fn is_unit(&self) -> bool {
        matches!(
            self,
            Self::Unit(_) | Self::UnitIncomplete(_) | Self::UnitEmpty
        )
    }
}

impl fmt::Display for PriceAnnotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unit(a) => write!(f, "@ {a}"),
            Self::Total(a) => write!(f, "@@ {a}"),
            Self::UnitIncomplete(ia) => write!(f, "@ {ia}"),
            Self::TotalIncomplete(ia) => write!(f, "@@ {ia}"),
            Self::UnitEmpty => write!(f, "@"),
            Self::TotalEmpty => write!(f, "@@"),
        }
    }
}

/// One leg of a transaction.
///
/// The parser leaves out whatever the user elided; booking fills every
/// missing field or reports an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    /// The account for this posting.
    pub account: String,
    /// The units; `None` means fully elided.
    pub units: Option<IncompleteAmount>,
    /// Per-unit acquisition cost (spec before booking, bound after).
    pub cost: Option<PostingCost>,
    /// Price annotation (`@` or `@@`).
    pub price: Option<PriceAnnotation>,
    /// Posting flag.
    pub flag: Option<char>,
    /// Posting metadata.
    pub meta: Metadata,
}

impl Posting {
    /// Create a posting with complete units.
    #[must_use]
    pub fn new(account: impl Into<String>, units: Amount) -> Self {
        Self {
            account: account.into(),
            units: Some(IncompleteAmount::Complete(units)),
            cost: None,
            price: None,
            flag: None,
            meta: Metadata::new(),
        }
    }

    /// Create a posting with a partially written amount.
    #[must_use]
    pub fn with_incomplete(account: impl Into<String>, units: IncompleteAmount) -> Self {
        Self {
            account: account.into(),
            units: Some(units),
            cost: None,
            price: None,
            flag: None,
            meta: Metadata::new(),
        }
    }

    /// Create a fully elided posting (absorbs the residual).
    #[must_use]
    pub fn auto(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            units: None,
            cost: None,
            price: None,
            flag: None,
            meta: Metadata::new(),
        }
    }

    /// Get the complete amount if available.
    #[must_use]
    pub fn amount(&self) -> Option<&Amount> {
        self.units.as_ref().and_then(IncompleteAmount::as_amount)
    }

    /// Get the bound cost if booking has resolved one.
    #[must_use]
    pub fn bound_cost(&self) -> Option<&Cost> {
        self.cost.as_ref().and_then(PostingCost::as_bound)
    }

    /// Attach an unbound cost spec.
    #[must_use]
    pub fn with_cost_spec(mut self, spec: CostSpec) -> Self {
        self.cost = Some(PostingCost::Spec(spec));
        self
    }

    /// Attach a bound cost.
    #[must_use]
    pub fn with_cost(mut self, cost: Cost) -> Self {
        self.cost = Some(PostingCost::Bound(cost));
        self
    }

    /// Attach a price annotation.
    #[must_use]
    pub fn with_price(mut self, price: PriceAnnotation) -> Self {
        self.price = Some(price);
        self
    }

    /// Attach a flag.
    #[must_use]
    pub const fn with_flag(mut self, flag: char) -> Self {
        self.flag = Some(flag);
        self
    }

    /// Check whether any MISSING state remains: elided or partial units, an
    /// unbound cost, or an incomplete price.
    #[must_use]
    pub fn is_incomplete(&self) -> bool {
        let units_incomplete = !matches!(self.units, Some(IncompleteAmount::Complete(_)));
        let cost_incomplete = matches!(self.cost, Some(PostingCost::Spec(_)));
        let price_incomplete = matches!(
            self.price,
            Some(
                PriceAnnotation::UnitIncomplete(_)
                    | PriceAnnotation::TotalIncomplete(_)
                    | PriceAnnotation::UnitEmpty
                    | PriceAnnotation::TotalEmpty
            )
        );
        units_incomplete || cost_incomplete || price_incomplete
    }
}

impl fmt::Display for Posting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "  ")?;
        if let Some(flag) = self.flag {
            write!(f, "{flag} ")?;
        }
        write!(f, "{}", self.account)?;
        if let Some(units) = &self.units {
            write!(f, "  {units}")?;
        }
        if let Some(cost) = &self.cost {
            write!(f, " {cost}")?;
        }
        if let Some(price) = &self.price {
            write!(f, " {price}")?;
        }
        Ok(())
    }
}

/// All directive types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Directive {
    /// Transfers between accounts.
    Transaction(Transaction),
    /// Balance assertion.
    Balance(Balance),
    /// Account opening.
    Open(Open),
    /// Account closing.
    Close(Close),
    /// Commodity declaration.
    Commodity(Commodity),
    /// Automatic padding request.
    Pad(Pad),
    /// Dated event value.
    Event(Event),
    /// Stored named query.
    Query(Query),
    /// Note on an account.
    Note(Note),
    /// Document attached to an account.
    Document(Document),
    /// Commodity price point.
    Price(Price),
    /// User-defined directive.
    Custom(Custom),
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transaction(t) => write!(f, "{t}"),
            Self::Balance(b) => write!(f, "{b}"),
            Self::Open(o) => write!(f, "{o}"),
            Self::Close(c) => write!(f, "{c}"),
            Self::Commodity(c) => write!(f, "{c}"),
            Self::Pad(p) => write!(f, "{p}"),
            Self::Event(e) => write!(f, "{e}"),
            Self::Query(q) => write!(f, "{q}"),
            Self::Note(n) => write!(f, "{n}"),
            Self::Document(d) => write!(f, "{d}"),
            Self::Price(p) => write!(f, "{p}"),
            Self::Custom(c) => write!(f, "{c}"),
        }
    }
}

impl Directive {
    /// The date of this directive.
    #[must_use]
    pub const fn date(&self) -> NaiveDate {
        match self {
            Self::Transaction(t) => t.date,
            Self::Balance(b) => b.date,
            Self::Open(o) => o.date,
            Self::Close(c) => c.date,
            Self::Commodity(c) => c.date,
            Self::Pad(p) => p.date,
            Self::Event(e) => e.date,
            Self::Query(q) => q.date,
            Self::Note(n) => n.date,
            Self::Document(d) => d.date,
            Self::Price(p) => p.date,
            Self::Custom(c) => c.date,
        }
    }

    /// The metadata of this directive.
    #[must_use]
    pub const fn meta(&self) -> &Metadata {
        match self {
            Self::Transaction(t) => &t.meta,
            Self::Balance(b) => &b.meta,
            Self::Open(o) => &o.meta,
            Self::Close(c) => &c.meta,
            Self::Commodity(c) => &c.meta,
            Self::Pad(p) => &p.meta,
            Self::Event(e) => &e.meta,
            Self::Query(q) => &q.meta,
            Self::Note(n) => &n.meta,
            Self::Document(d) => &d.meta,
            Self::Price(p) => &p.meta,
            Self::Custom(c) => &c.meta,
        }
    }

    /// Mutable access to the metadata of this directive.
    pub fn meta_mut(&mut self) -> &mut Metadata {
        match self {
            Self::Transaction(t) => &mut t.meta,
            Self::Balance(b) => &mut b.meta,
            Self::Open(o) => &mut o.meta,
            Self::Close(c) => &mut c.meta,
            Self::Commodity(c) => &mut c.meta,
            Self::Pad(p) => &mut p.meta,
            Self::Event(e) => &mut e.meta,
            Self::Query(q) => &mut q.meta,
            Self::Note(n) => &mut n.meta,
            Self::Document(d) => &mut d.meta,
            Self::Price(p) => &mut p.meta,
            Self::Custom(c) => &mut c.meta,
        }
    }

    /// Check if this is a transaction.
    #[must_use]
    pub const fn is_transaction(&self) -> bool {
        matches!(self, Self::Transaction(_))
    }

    /// Get as a transaction, if this is one.
    #[must_use]
    pub const fn as_transaction(&self) -> Option<&Transaction> {
        match self {
            Self::Transaction(t) => Some(t),
            _ => None,
        }
    }

    /// The directive type name.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Transaction(_) => "transaction",
            Self::Balance(_) => "balance",
            Self::Open(_) => "open",
            Self::Close(_) => "close",
            Self::Commodity(_) => "commodity",
            Self::Pad(_) => "pad",
            Self::Event(_) => "event",
            Self::Query(_) => "query",
            Self::Note(_) => "note",
            Self::Document(_) => "document",
            Self::Price(_) => "price",
            Self::Custom(_) => "custom",
        }
    }

    /// Same-date ordering rank: openings first, then balance assertions,
    /// then everything else, with documents and closings at the end.
    #[must_use]
    pub const fn sort_rank(&self) -> i8 {
        match self {
            Self::Open(_) => -2,
            Self::Balance(_) => -1,
            Self::Document(_) => 1,
            Self::Close(_) => 2,
            _ => 0,
        }
    }
}

/// Sort directives by (date, rank), keeping declaration order for ties.
pub fn sort_directives(directives: &mut [Directive]) {
    directives.sort_by(|a, b| {
        a.date()
            .cmp(&b.date())
            .then_with(|| a.sort_rank().cmp(&b.sort_rank()))
    });
}

/// A transaction directive.
///
/// The sum of all posting weights must come to zero, per currency, within
/// the inferred tolerance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction date.
    pub date: NaiveDate,
    /// Flag: `*` complete, `!` incomplete, `P` synthesized padding.
    pub flag: char,
    /// Payee.
    pub payee: Option<String>,
    /// Narration (description).
    pub narration: String,
    /// Tags.
    pub tags: Vec<String>,
    /// Links.
    pub links: Vec<String>,
    /// Metadata.
    pub meta: Metadata,
    /// Postings.
    pub postings: Vec<Posting>,
}

impl Transaction {
    /// Create a new transaction with flag `*`.
    #[must_use]
    pub fn new(date: NaiveDate, narration: impl Into<String>) -> Self {
        Self {
            date,
            flag: '*',
            payee: None,
            narration: narration.into(),
            tags: Vec::new(),
            links: Vec::new(),
            meta: Metadata::new(),
            postings: Vec::new(),
        }
    }

    /// Set the flag.
    #[must_use]
    pub const fn with_flag(mut self, flag: char) -> Self {
        self.flag = flag;
        self
    }

    /// Set the payee.
    #[must_use]
    pub fn with_payee(mut self, payee: impl Into<String>) -> Self {
        self.payee = Some(payee.into());
        self
    }

    /// Add a tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Add a link.
    #[must_use]
    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.links.push(link.into());
        self
    }

    /// Add a posting.
    #[must_use]
    pub fn with_posting(mut self, posting: Posting) -> Self {
        self.postings.push(posting);
        self
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ", self.date, self.flag)?;
        if let Some(payee) = &self.payee {
            write!(f, "\"{payee}\" ")?;
        }
        write!(f, "\"{}\"", self.narration)?;
        for tag in &self.tags {
            write!(f, " #{tag}")?;
        }
        for link in &self.links {
            write!(f, " ^{link}")?;
        }
        for posting in &self.postings {
            write!(f, "\n{posting}")?;
        }
        Ok(())
    }
}

/// A balance assertion.
///
/// Asserts the account's balance in one currency at the beginning of the
/// date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    /// Assertion date.
    pub date: NaiveDate,
    /// Account to check.
    pub account: String,
    /// Expected amount.
    pub amount: Amount,
    /// Explicit tolerance (`~` syntax).
    pub tolerance: Option<Decimal>,
    /// Metadata.
    pub meta: Metadata,
}

impl Balance {
    /// Create a new balance assertion.
    #[must_use]
    pub fn new(date: NaiveDate, account: impl Into<String>, amount: Amount) -> Self {
        Self {
            date,
            account: account.into(),
            amount,
            tolerance: None,
            meta: Metadata::new(),
        }
    }

    /// Set an explicit tolerance.
    #[must_use]
    pub const fn with_tolerance(mut self, tolerance: Decimal) -> Self {
        self.tolerance = Some(tolerance);
        self
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} balance {} ", self.date, self.account)?;
        if let Some(tolerance) = self.tolerance {
            write!(f, "{} ~ {} {}", self.amount.number, tolerance, self.amount.currency)
        } else {
            write!(f, "{}", self.amount)
        }
    }
}

/// An account opening.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Open {
    /// Opening date.
    pub date: NaiveDate,
    /// Account name.
    pub account: String,
    /// Allowed currencies; empty means unconstrained.
    pub currencies: Vec<String>,
    /// Booking method name for this account.
    pub booking: Option<String>,
    /// Metadata.
    pub meta: Metadata,
}

impl Open {
    /// Create a new open directive.
    #[must_use]
    pub fn new(date: NaiveDate, account: impl Into<String>) -> Self {
        Self {
            date,
            account: account.into(),
            currencies: Vec::new(),
            booking: None,
            meta: Metadata::new(),
        }
    }

    /// Set the currency whitelist.
    #[must_use]
    pub fn with_currencies(mut self, currencies: Vec<String>) -> Self {
        self.currencies = currencies;
        self
    }

    /// Set the booking method.
    #[must_use]
    pub fn with_booking(mut self, booking: impl Into<String>) -> Self {
        self.booking = Some(booking.into());
        self
    }
}

impl fmt::Display for Open {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} open {}", self.date, self.account)?;
        if !self.currencies.is_empty() {
            write!(f, " {}", self.currencies.join(","))?;
        }
        if let Some(booking) = &self.booking {
            write!(f, " \"{booking}\"")?;
        }
        Ok(())
    }
}

/// An account closing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Close {
    /// Closing date.
    pub date: NaiveDate,
    /// Account name.
    pub account: String,
    /// Metadata.
    pub meta: Metadata,
}

impl Close {
    /// Create a new close directive.
    #[must_use]
    pub fn new(date: NaiveDate, account: impl Into<String>) -> Self {
        Self {
            date,
            account: account.into(),
            meta: Metadata::new(),
        }
    }
}

impl fmt::Display for Close {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} close {}", self.date, self.account)
    }
}

/// A commodity declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commodity {
    /// Declaration date.
    pub date: NaiveDate,
    /// Currency code.
    pub currency: String,
    /// Metadata.
    pub meta: Metadata,
}

impl Commodity {
    /// Create a new commodity declaration.
    #[must_use]
    pub fn new(date: NaiveDate, currency: impl Into<String>) -> Self {
        Self {
            date,
            currency: currency.into(),
            meta: Metadata::new(),
        }
    }
}

impl fmt::Display for Commodity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} commodity {}", self.date, self.currency)
    }
}

/// A padding request.
///
/// Asks the engine to insert whatever transaction is needed for the next
/// balance assertion on `account` to hold, drawing from `source_account`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pad {
    /// Pad date.
    pub date: NaiveDate,
    /// Account to pad.
    pub account: String,
    /// Account the padding draws from.
    pub source_account: String,
    /// Metadata.
    pub meta: Metadata,
}

impl Pad {
    /// Create a new pad directive.
    #[must_use]
    pub fn new(
        date: NaiveDate,
        account: impl Into<String>,
        source_account: impl Into<String>,
    ) -> Self {
        Self {
            date,
            account: account.into(),
            source_account: source_account.into(),
            meta: Metadata::new(),
        }
    }
}

impl fmt::Display for Pad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} pad {} {}", self.date, self.account, self.source_account)
    }
}

/// A dated event value (e.g. location, employer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Event date.
    pub date: NaiveDate,
    /// Event name.
    pub name: String,
    /// Event value.
    pub value: String,
    /// Metadata.
    pub meta: Metadata,
}

impl Event {
    /// Create a new event directive.
    #[must_use]
    pub fn new(date: NaiveDate, name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            date,
            name: name.into(),
            value: value.into(),
            meta: Metadata::new(),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} event \"{}\" \"{}\"", self.date, self.name, self.value)
    }
}

/// A stored named query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    /// Query date.
    pub date: NaiveDate,
    /// Query name.
    pub name: String,
    /// Query string.
    pub query: String,
    /// Metadata.
    pub meta: Metadata,
}

impl Query {
    /// Create a new query directive.
    #[must_use]
    pub fn new(date: NaiveDate, name: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            date,
            name: name.into(),
            query: query.into(),
            meta: Metadata::new(),
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} query \"{}\" \"{}\"", self.date, self.name, self.query)
    }
}

/// A note on an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// Note date.
    pub date: NaiveDate,
    /// Account.
    pub account: String,
    /// Note text.
    pub comment: String,
    /// Metadata.
    pub meta: Metadata,
}

impl Note {
    /// Create a new note directive.
    #[must_use]
    pub fn new(date: NaiveDate, account: impl Into<String>, comment: impl Into<String>) -> Self {
        Self {
            date,
            account: account.into(),
            comment: comment.into(),
            meta: Metadata::new(),
        }
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} note {} \"{}\"", self.date, self.account, self.comment)
    }
}

/// A document attached to an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Document date.
    pub date: NaiveDate,
    /// Account.
    pub account: String,
    /// Path to the document file.
    pub path: String,
    /// Tags.
    pub tags: Vec<String>,
    /// Links.
    pub links: Vec<String>,
    /// Metadata.
    pub meta: Metadata,
}

impl Document {
    /// Create a new document directive.
    #[must_use]
    pub fn new(date: NaiveDate, account: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            date,
            account: account.into(),
            path: path.into(),
            tags: Vec::new(),
            links: Vec::new(),
            meta: Metadata::new(),
        }
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} document {} \"{}\"", self.date, self.account, self.path)
    }
}

/// A commodity price point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// Price date.
    pub date: NaiveDate,
    /// Currency being priced.
    pub currency: String,
    /// Price in the quote currency.
    pub amount: Amount,
    /// Metadata.
    pub meta: Metadata,
}

impl Price {
    /// Create a new price directive.
    #[must_use]
    pub fn new(date: NaiveDate, currency: impl Into<String>, amount: Amount) -> Self {
        Self {
            date,
            currency: currency.into(),
            amount,
            meta: Metadata::new(),
        }
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} price {} {}", self.date, self.currency, self.amount)
    }
}

/// A user-defined directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Custom {
    /// Directive date.
    pub date: NaiveDate,
    /// Custom type name.
    pub name: String,
    /// Values.
    pub values: Vec<MetaValue>,
    /// Metadata.
    pub meta: Metadata,
}

impl Custom {
    /// Create a new custom directive.
    #[must_use]
    pub fn new(date: NaiveDate, name: impl Into<String>) -> Self {
        Self {
            date,
            name: name.into(),
            values: Vec::new(),
            meta: Metadata::new(),
        }
    }

    /// Add a value.
    #[must_use]
    pub fn with_value(mut self, value: MetaValue) -> Self {
        self.values.push(value);
        self
    }
}

impl fmt::Display for Custom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} custom \"{}\"", self.date, self.name)?;
        for value in &self.values {
            write!(f, " {value}")?;
        }
        Ok(())
    }
}
