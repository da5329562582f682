pub mod account;
pub mod entry;
pub mod money;
pub mod period;
pub mod transaction;

pub use account::{
    clearing_account, is_clearing_account, unknown_variant, AccountType, LedgerError,
    CLEARING_PREFIX, EXPENSES_UNCATEGORIZED, INCOME_UNCATEGORIZED,
};
pub use entry::{Amount, EntryMeta, LedgerEntry, Posting, UnvalidatedEntry};
pub use money::Money;
pub use period::{DateRange, RangeError};
pub use transaction::{
    ForeignAmount, LineItem, LinkTag, Metadata, SecondaryTender, SourceId, Transaction, TxType,
};
