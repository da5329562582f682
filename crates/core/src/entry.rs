use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::account::{AccountType, LedgerError};
use super::money::Money;
use super::transaction::LinkTag;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Amount {
    pub number: Money,
    pub currency: String,
}

impl Amount {
    pub fn new(number: Money, currency: &str) -> Self {
        Amount {
            number,
            currency: currency.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    pub account: String,
    pub units: Amount,
    /// Total price of the units in another currency (unsigned, like a
    /// ledger `@@` annotation).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_price: Option<Amount>,
    /// Human readable item summary for itemized postings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<String>,
}

impl Posting {
    pub fn new(account: &str, number: Money, currency: &str) -> Self {
        Posting {
            account: account.to_string(),
            units: Amount::new(number, currency),
            total_price: None,
            items: None,
        }
    }

    pub fn with_total_price(mut self, price: Amount) -> Self {
        self.total_price = Some(Amount::new(price.number.abs(), &price.currency));
        self
    }

    pub fn with_items(mut self, items: String) -> Self {
        self.items = Some(items);
        self
    }

    /// The amount this posting contributes to the balance check.
    pub fn weight(&self) -> Amount {
        match &self.total_price {
            Some(price) if self.units.number.is_negative() => {
                Amount::new(-price.number, &price.currency)
            }
            Some(price) => price.clone(),
            None => self.units.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counterpart_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_category: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnvalidatedEntry {
    pub date: NaiveDate,
    pub payee: String,
    pub narration: String,
    pub link: Option<LinkTag>,
    pub meta: EntryMeta,
    pub postings: Vec<Posting>,
}

impl UnvalidatedEntry {
    /// Per-currency sum of posting weights.
    pub fn residuals(&self) -> BTreeMap<String, Money> {
        let mut sums: BTreeMap<String, Money> = BTreeMap::new();
        for posting in &self.postings {
            let weight = posting.weight();
            *sums.entry(weight.currency).or_default() += weight.number;
        }
        sums
    }
}

/// A double-entry set of postings whose weights sum to zero in every
/// currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub date: NaiveDate,
    pub payee: String,
    pub narration: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<LinkTag>,
    pub meta: EntryMeta,
    pub postings: Vec<Posting>,
}

impl LedgerEntry {
    pub fn validate(entry: UnvalidatedEntry) -> Result<LedgerEntry, LedgerError> {
        if entry.postings.len() < 2 {
            return Err(LedgerError::EmptyTransaction);
        }

        if let Some(posting) = entry
            .postings
            .iter()
            .find(|p| AccountType::of(&p.account).is_none())
        {
            return Err(LedgerError::InvalidAccount(posting.account.clone()));
        }

        if let Some((currency, residual)) = entry
            .residuals()
            .into_iter()
            .find(|(_, residual)| !residual.is_zero())
        {
            return Err(LedgerError::Unbalanced { currency, residual });
        }

        Ok(LedgerEntry {
            date: entry.date,
            payee: entry.payee,
            narration: entry.narration,
            link: entry.link,
            meta: entry.meta,
            postings: entry.postings,
        })
    }
}
