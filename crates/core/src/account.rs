use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::money::Money;

/// Root of the transient bridge subtree. Value parked here is always on its
/// way somewhere else.
pub const CLEARING_PREFIX: &str = "Assets:Clearing:";

pub const EXPENSES_UNCATEGORIZED: &str = "Expenses:Uncategorized";
pub const INCOME_UNCATEGORIZED: &str = "Income:Uncategorized";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountType {
    Assets,
    Liabilities,
    Equity,
    Income,
    Expenses,
}

impl AccountType {
    /// Classify an account path by its root segment.
    pub fn of(account: &str) -> Option<Self> {
        match account.split(':').next()? {
            "Assets" => Some(AccountType::Assets),
            "Liabilities" => Some(AccountType::Liabilities),
            "Equity" => Some(AccountType::Equity),
            "Income" => Some(AccountType::Income),
            "Expenses" => Some(AccountType::Expenses),
            _ => None,
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountType::Assets => write!(f, "Assets"),
            AccountType::Liabilities => write!(f, "Liabilities"),
            AccountType::Equity => write!(f, "Equity"),
            AccountType::Income => write!(f, "Income"),
            AccountType::Expenses => write!(f, "Expenses"),
        }
    }
}

pub fn is_clearing_account(account: &str) -> bool {
    account.starts_with(CLEARING_PREFIX)
}

/// `clearing_account(&["WX", "CC", "CMB"])` → `Assets:Clearing:WX:CC:CMB`.
pub fn clearing_account(segments: &[&str]) -> String {
    format!("{CLEARING_PREFIX}{}", segments.join(":"))
}

/// The `:Unknown` leaf under `account`. Idempotent.
pub fn unknown_variant(account: &str) -> String {
    if account.ends_with(":Unknown") {
        account.to_string()
    } else {
        format!("{account}:Unknown")
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum LedgerError {
    #[error("Unbalanced entry in {currency}: postings sum to {residual}")]
    Unbalanced { currency: String, residual: Money },
    #[error("Entry must have at least two postings")]
    EmptyTransaction,
    #[error("Invalid account path: '{0}'")]
    InvalidAccount(String),
}
