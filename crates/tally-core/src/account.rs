//! Account-name algebra.
//!
//! Account names are colon-separated hierarchies whose first component names
//! one of the five account types:
//!
//! ```text
//! Assets:US:BofA:Checking
//! Liabilities:CreditCard
//! Equity:Opening-Balances
//! Income:Salary
//! Expenses:Food:Groceries
//! ```
//!
//! Everything here is a pure function over `&str`; nothing allocates unless
//! it has to return an owned name.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The account-name component separator.
pub const SEP: char = ':';

/// Join account name components into an account name.
#[must_use]
pub fn join(components: &[&str]) -> String {
    components.join(":")
}

/// Split an account name into its components.
#[must_use]
pub fn split(account: &str) -> Vec<&str> {
    account.split(SEP).collect()
}

/// Get the parent of an account name, or `None` for a root account.
///
/// ```
/// assert_eq!(tally_core::account::parent("Assets:Bank:Checking"), Some("Assets:Bank"));
/// assert_eq!(tally_core::account::parent("Assets"), None);
/// ```
#[must_use]
pub fn parent(account: &str) -> Option<&str> {
    account.rfind(SEP).map(|idx| &account[..idx])
}

/// Get the last component of an account name.
#[must_use]
pub fn leaf(account: &str) -> &str {
    account.rfind(SEP).map_or(account, |idx| &account[idx + 1..])
}

/// Get the account name with its root (type) component removed.
///
/// Returns the empty string for a bare root.
#[must_use]
pub fn sans_root(account: &str) -> &str {
    account.find(SEP).map_or("", |idx| &account[idx + 1..])
}

/// Get the first `n` components of an account name.
#[must_use]
pub fn root(n: usize, account: &str) -> &str {
    if n == 0 {
        return "";
    }
    match account.match_indices(SEP).nth(n - 1) {
        Some((idx, _)) => &account[..idx],
        None => account,
    }
}

/// Check whether an account name contains the given component.
#[must_use]
pub fn has_component(account: &str, component: &str) -> bool {
    account.split(SEP).any(|c| c == component)
}

/// Longest common ancestor of a set of account names.
///
/// Returns the empty string when the names share no leading components.
#[must_use]
pub fn common_prefix<'a, I>(accounts: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut iter = accounts.into_iter();
    let Some(first) = iter.next() else {
        return String::new();
    };
    let mut shared: Vec<&str> = first.split(SEP).collect();

    for account in iter {
        let components: Vec<&str> = account.split(SEP).collect();
        let common = shared
            .iter()
            .zip(components.iter())
            .take_while(|(a, b)| a == b)
            .count();
        shared.truncate(common);
        if shared.is_empty() {
            break;
        }
    }

    shared.join(":")
}

/// Iterator from an account up through its ancestors to the root.
///
/// Yields the account itself first, then each parent, ending at the root
/// component. The iterator is a plain value and can be restarted by calling
/// [`parents`] again.
///
/// ```
/// let chain: Vec<&str> = tally_core::account::parents("Assets:Bank:Checking").collect();
/// assert_eq!(chain, vec!["Assets:Bank:Checking", "Assets:Bank", "Assets"]);
/// ```
pub fn parents(account: &str) -> Parents<'_> {
    Parents {
        current: if account.is_empty() { None } else { Some(account) },
    }
}

/// Iterator returned by [`parents`].
#[derive(Debug, Clone)]
pub struct Parents<'a> {
    current: Option<&'a str>,
}

impl<'a> Iterator for Parents<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let current = self.current?;
        self.current = parent(current);
        Some(current)
    }
}

/// Check whether a string is a well-formed account name.
///
/// The type component is an uppercase letter followed by letters, digits, or
/// dashes; it must be followed by one or more components each starting with
/// an uppercase letter or digit.
#[must_use]
pub fn is_valid(account: &str) -> bool {
    let mut components = account.split(SEP);

    let Some(ty) = components.next() else {
        return false;
    };
    if !is_valid_component(ty, false) {
        return false;
    }

    let mut rest = 0;
    for component in components {
        if !is_valid_component(component, true) {
            return false;
        }
        rest += 1;
    }
    rest >= 1
}

fn is_valid_component(component: &str, allow_leading_digit: bool) -> bool {
    let mut chars = component.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !(first.is_ascii_uppercase() || (allow_leading_digit && first.is_ascii_digit())) {
        return false;
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '-')
}

/// Bijective rewriting of the account separator.
///
/// Some downstream consumers cannot tolerate `:` in identifiers; a
/// transformer swaps it for another character and back again.
#[derive(Debug, Clone, Copy)]
pub struct AccountTransformer {
    rsep: char,
}

impl AccountTransformer {
    /// Create a transformer that renders accounts with `rsep` as separator.
    #[must_use]
    pub const fn new(rsep: char) -> Self {
        Self { rsep }
    }

    /// Rewrite `:` to the alternative separator.
    #[must_use]
    pub fn render(&self, account: &str) -> String {
        account.replace(SEP, &self.rsep.to_string())
    }

    /// Restore `:` from the alternative separator.
    #[must_use]
    pub fn parse(&self, rendered: &str) -> String {
        rendered.replace(self.rsep, ":")
    }
}

/// The five account types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountType {
    /// Things owned.
    Assets,
    /// Things owed.
    Liabilities,
    /// Residual interest.
    Equity,
    /// Money in.
    Income,
    /// Money out.
    Expenses,
}

impl AccountType {
    /// All five types, in conventional order.
    pub const ALL: [Self; 5] = [
        Self::Assets,
        Self::Liabilities,
        Self::Equity,
        Self::Income,
        Self::Expenses,
    ];

    /// The normal sign of balances in accounts of this type: +1 for accounts
    /// that increase with debits (assets, expenses), −1 for the rest.
    #[must_use]
    pub const fn sign(self) -> i8 {
        match self {
            Self::Assets | Self::Expenses => 1,
            Self::Liabilities | Self::Equity | Self::Income => -1,
        }
    }

    /// Whether this type appears on the balance sheet.
    #[must_use]
    pub const fn is_balance_sheet(self) -> bool {
        matches!(self, Self::Assets | Self::Liabilities | Self::Equity)
    }

    /// Whether this type appears on the income statement.
    #[must_use]
    pub const fn is_income_statement(self) -> bool {
        matches!(self, Self::Income | Self::Expenses)
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Assets => "Assets",
            Self::Liabilities => "Liabilities",
            Self::Equity => "Equity",
            Self::Income => "Income",
            Self::Expenses => "Expenses",
        };
        write!(f, "{s}")
    }
}

/// Mapping from root component names to account types.
///
/// The five root names default to the conventional English ones and are
/// configurable through the ledger options (`name_assets` etc.).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountTypes {
    /// Root name for asset accounts.
    pub assets: String,
    /// Root name for liability accounts.
    pub liabilities: String,
    /// Root name for equity accounts.
    pub equity: String,
    /// Root name for income accounts.
    pub income: String,
    /// Root name for expense accounts.
    pub expenses: String,
}

impl Default for AccountTypes {
    fn default() -> Self {
        Self {
            assets: "Assets".to_string(),
            liabilities: "Liabilities".to_string(),
            equity: "Equity".to_string(),
            income: "Income".to_string(),
            expenses: "Expenses".to_string(),
        }
    }
}

impl AccountTypes {
    /// Classify an account name by its root component.
    #[must_use]
    pub fn get(&self, account: &str) -> Option<AccountType> {
        let root = account.split(SEP).next()?;
        if root == self.assets {
            Some(AccountType::Assets)
        } else if root == self.liabilities {
            Some(AccountType::Liabilities)
        } else if root == self.equity {
            Some(AccountType::Equity)
        } else if root == self.income {
            Some(AccountType::Income)
        } else if root == self.expenses {
            Some(AccountType::Expenses)
        } else {
            None
        }
    }

    /// The root name for an account type.
    #[must_use]
    pub fn name(&self, ty: AccountType) -> &str {
        match ty {
            AccountType::Assets => &self.assets,
            AccountType::Liabilities => &self.liabilities,
            AccountType::Equity => &self.equity,
            AccountType::Income => &self.income,
            AccountType::Expenses => &self.expenses,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_split_round_trip() {
        let name = "Assets:US:BofA:Checking";
        assert_eq!(join(&split(name)), name);
    }

    #[test]
    fn test_parent() {
        assert_eq!(parent("Assets:Bank:Checking"), Some("Assets:Bank"));
        assert_eq!(parent("Assets:Bank"), Some("Assets"));
        assert_eq!(parent("Assets"), None);
    }

    #[test]
    fn test_leaf() {
        assert_eq!(leaf("Assets:Bank:Checking"), "Checking");
        assert_eq!(leaf("Assets"), "Assets");
    }

    #[test]
    fn test_sans_root() {
        assert_eq!(sans_root("Assets:Bank:Checking"), "Bank:Checking");
        assert_eq!(sans_root("Assets"), "");
    }

    #[test]
    fn test_root() {
        assert_eq!(root(1, "Assets:Bank:Checking"), "Assets");
        assert_eq!(root(2, "Assets:Bank:Checking"), "Assets:Bank");
        assert_eq!(root(3, "Assets:Bank:Checking"), "Assets:Bank:Checking");
        assert_eq!(root(5, "Assets:Bank"), "Assets:Bank");
        assert_eq!(root(0, "Assets:Bank"), "");
    }

    #[test]
    fn test_has_component() {
        assert!(has_component("Assets:Bank:Checking", "Bank"));
        assert!(!has_component("Assets:Bank:Checking", "Ban"));
    }

    #[test]
    fn test_common_prefix() {
        assert_eq!(
            common_prefix(["Assets:Bank:Checking", "Assets:Bank:Savings"]),
            "Assets:Bank"
        );
        assert_eq!(
            common_prefix(["Assets:Bank", "Liabilities:Card"]),
            ""
        );
        assert_eq!(common_prefix(["Assets:Bank"]), "Assets:Bank");
        assert_eq!(common_prefix(std::iter::empty()), "");
    }

    #[test]
    fn test_parents() {
        let chain: Vec<&str> = parents("Assets:Bank:Checking").collect();
        assert_eq!(chain, vec!["Assets:Bank:Checking", "Assets:Bank", "Assets"]);

        // Restartable: a fresh call yields the same sequence.
        let again: Vec<&str> = parents("Assets:Bank:Checking").collect();
        assert_eq!(chain, again);
    }

    #[test]
    fn test_is_valid() {
        for name in [
            "Assets:Bank",
            "Assets:Bank:Checking",
            "Equity:Opening-Balances",
            "Income:Salary2024",
            "Assets:401k",
        ] {
            assert!(is_valid(name), "{name} should be valid");
        }
        for name in ["Assets", "Assets:", "Assets:bank", "assets:Bank", ""] {
            assert!(!is_valid(name), "{name} should be invalid");
        }
    }

    #[test]
    fn test_transformer_round_trip() {
        let xf = AccountTransformer::new('_');
        let rendered = xf.render("Assets:Bank:Checking");
        assert_eq!(rendered, "Assets_Bank_Checking");
        assert_eq!(xf.parse(&rendered), "Assets:Bank:Checking");
    }

    #[test]
    fn test_account_type_signs() {
        assert_eq!(AccountType::Assets.sign(), 1);
        assert_eq!(AccountType::Expenses.sign(), 1);
        assert_eq!(AccountType::Liabilities.sign(), -1);
        assert_eq!(AccountType::Equity.sign(), -1);
        assert_eq!(AccountType::Income.sign(), -1);
    }

    #[test]
    fn test_account_type_statement() {
        assert!(AccountType::Assets.is_balance_sheet());
        assert!(!AccountType::Assets.is_income_statement());
        assert!(AccountType::Income.is_income_statement());
    }

    #[test]
    fn test_account_types_lookup() {
        let types = AccountTypes::default();
        assert_eq!(types.get("Assets:Bank"), Some(AccountType::Assets));
        assert_eq!(types.get("Expenses:Food"), Some(AccountType::Expenses));
        assert_eq!(types.get("Foo:Bar"), None);
        assert_eq!(types.name(AccountType::Equity), "Equity");
    }

    #[test]
    fn test_account_types_configurable() {
        let types = AccountTypes {
            assets: "Activa".to_string(),
            ..Default::default()
        };
        assert_eq!(types.get("Activa:Bank"), Some(AccountType::Assets));
        assert_eq!(types.get("Assets:Bank"), None);
    }
}
