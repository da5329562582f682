use tracing::warn;

use paychain_core::{
    Amount, EntryMeta, LedgerEntry, LedgerError, Money, Posting, Transaction, UnvalidatedEntry,
};

use crate::allocate::allocate;
use crate::rules::CategoryRuleEngine;

/// Turns reconciled records into balanced [`LedgerEntry`] values. Rendering
/// ledger text is left to the writer.
pub struct EntryBuilder<'a> {
    categorizer: &'a CategoryRuleEngine,
}

impl<'a> EntryBuilder<'a> {
    pub fn new(categorizer: &'a CategoryRuleEngine) -> Self {
        Self { categorizer }
    }

    /// Build one entry per record, sorted by date (stable). Records whose
    /// postings do not balance are skipped and counted.
    pub fn build_all(&self, transactions: &[Transaction]) -> (Vec<LedgerEntry>, usize) {
        let mut entries = Vec::with_capacity(transactions.len());
        let mut skipped = 0;
        for tx in transactions {
            match self.build(tx) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    warn!(
                        date = %tx.date,
                        source_account = %tx.source_account,
                        error = %e,
                        "skipping record that does not form a balanced entry"
                    );
                    skipped += 1;
                }
            }
        }
        entries.sort_by_key(|e| e.date);
        (entries, skipped)
    }

    pub fn build(&self, tx: &Transaction) -> Result<LedgerEntry, LedgerError> {
        let postings = match self.itemized_postings(tx) {
            Some(postings) => postings,
            None => {
                let counter = match &tx.counter_account {
                    Some(account) => account.clone(),
                    None => self.categorizer.categorize_or_fallback(tx),
                };
                two_postings(tx, &counter)
            }
        };

        LedgerEntry::validate(UnvalidatedEntry {
            date: tx.date.date(),
            payee: tx.payee.clone(),
            narration: tx.narration.clone(),
            link: tx.link(),
            meta: EntryMeta {
                reference_id: tx.reference_id.clone(),
                counterpart_ref: tx.counterpart_ref.clone(),
                payment_method: tx.payment_method.clone(),
                raw_category: tx.raw_category.clone(),
            },
            postings,
        })
    }

    /// Source posting, the optional secondary tender, then one posting per
    /// allocated category. `None` when the record has no priced items.
    fn itemized_postings(&self, tx: &Transaction) -> Option<Vec<Posting>> {
        if tx.metadata.items.is_empty() {
            return None;
        }

        let tender = tx
            .metadata
            .secondary_tender
            .as_ref()
            .filter(|t| !t.amount.is_zero() && !t.amount.is_negative());
        let tender_amount = tender.map(|t| t.amount).unwrap_or_default();

        let allocations = allocate(&tx.metadata.items, -tx.amount + tender_amount);
        if allocations.is_empty() {
            return None;
        }

        let mut postings = vec![Posting::new(&tx.source_account, tx.amount, &tx.currency)];
        if let Some(tender) = tender {
            postings.push(Posting::new(&tender.account, -tender.amount, &tx.currency));
        }
        postings.extend(allocations.iter().map(|a| {
            Posting::new(&a.category, a.amount, &tx.currency).with_items(a.item_summary())
        }));
        Some(postings)
    }
}

/// Source and counter posting. A foreign pair prices the source side in the
/// foreign currency and books the counter side there.
fn two_postings(tx: &Transaction, counter: &str) -> Vec<Posting> {
    let source = Posting::new(&tx.source_account, tx.amount, &tx.currency);
    match &tx.metadata.foreign {
        Some(foreign) => {
            let magnitude = foreign.amount.abs();
            let counter_units: Money = if tx.amount.is_negative() {
                magnitude
            } else {
                -magnitude
            };
            vec![
                source.with_total_price(Amount::new(magnitude, &foreign.currency)),
                Posting::new(counter, counter_units, &foreign.currency),
            ]
        }
        None => vec![source, Posting::new(counter, -tx.amount, &tx.currency)],
    }
}
