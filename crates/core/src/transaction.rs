use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::money::Money;

/// Stable handle for the source (importer) a record came from. Assigned when
/// the source is constructed, never derived from memory identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct SourceId(pub u32);

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "source#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxType {
    Expense,
    Income,
    Transfer,
    #[default]
    Other,
}

/// Identifier shared by every record that belongs to one real-world payment.
/// Serialized in its rendered `clr-NNNNNN` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct LinkTag(pub u32);

impl fmt::Display for LinkTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "clr-{:06}", self.0)
    }
}

impl From<LinkTag> for String {
    fn from(tag: LinkTag) -> Self {
        tag.to_string()
    }
}

impl TryFrom<String> for LinkTag {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.strip_prefix("clr-")
            .and_then(|n| n.parse().ok())
            .map(LinkTag)
            .ok_or_else(|| format!("Invalid link tag: '{s}'"))
    }
}

/// One line of an itemized receipt, at listed (pre-discount) prices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub category: String,
}

impl LineItem {
    pub fn listed_subtotal(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// The same payment expressed in a second currency, e.g. a HKD wallet charge
/// that settled a CNY receipt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignAmount {
    pub amount: Money,
    pub currency: String,
}

/// Part of an itemized payment settled by a second instrument (gift card,
/// voucher balance).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecondaryTender {
    pub account: String,
    pub amount: Money,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Metadata {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<LineItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub foreign: Option<ForeignAmount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<LinkTag>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_tender: Option<SecondaryTender>,
}

/// The normalized record every importer produces and every reconciliation
/// stage consumes. A negative `amount` leaves `source_account`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub date: NaiveDateTime,
    pub amount: Money,
    pub currency: String,
    #[serde(default)]
    pub payee: String,
    #[serde(default)]
    pub narration: String,
    #[serde(default)]
    pub raw_category: Option<String>,
    #[serde(default)]
    pub source_account: String,
    #[serde(default)]
    pub counter_account: Option<String>,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub reference_id: Option<String>,
    #[serde(default)]
    pub counterpart_ref: Option<String>,
    #[serde(default)]
    pub tx_type: TxType,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub source: SourceId,
}

impl Transaction {
    pub fn new(
        date: NaiveDateTime,
        amount: Money,
        currency: &str,
        source_account: &str,
        tx_type: TxType,
    ) -> Self {
        Transaction {
            date,
            amount,
            currency: currency.to_string(),
            payee: String::new(),
            narration: String::new(),
            raw_category: None,
            source_account: source_account.to_string(),
            counter_account: None,
            payment_method: None,
            reference_id: None,
            counterpart_ref: None,
            tx_type,
            metadata: Metadata::default(),
            source: SourceId::default(),
        }
    }

    /// `payee narration`, the text the matchers and detectors look at.
    pub fn description(&self) -> String {
        format!("{} {}", self.payee, self.narration)
    }

    pub fn link(&self) -> Option<LinkTag> {
        self.metadata.link
    }

    pub fn is_linked(&self) -> bool {
        self.metadata.link.is_some()
    }

    /// Non-empty correlation identifiers carried by this record.
    pub fn refs(&self) -> impl Iterator<Item = &str> {
        [self.reference_id.as_deref(), self.counterpart_ref.as_deref()]
            .into_iter()
            .flatten()
            .filter(|r| !r.is_empty())
    }

    pub fn payment_method(&self) -> &str {
        self.payment_method.as_deref().unwrap_or_default()
    }
}
