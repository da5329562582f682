use paychain_core::clearing_account;

use crate::config::Merchant;

/// Recognises big merchants whose own exports carry the item-level side of a
/// payment, and routes the paying record into that merchant's clearing
/// account instead of an expense category.
pub struct MerchantDetector<'a> {
    merchants: &'a [Merchant],
}

impl<'a> MerchantDetector<'a> {
    pub fn new(merchants: &'a [Merchant]) -> Self {
        Self { merchants }
    }

    /// `Assets:Clearing:<Merchant>:<platform>` for merchants with their own
    /// payment backends, `Assets:Clearing:<Merchant>` otherwise, `None` when
    /// no merchant keyword occurs in `payee narration` (case-insensitive).
    pub fn detect(&self, platform: &str, payee: &str, narration: &str) -> Option<String> {
        let text = format!("{payee} {narration}").to_lowercase();
        let merchant = self.merchants.iter().find(|m| {
            m.keywords
                .iter()
                .any(|kw| text.contains(kw.to_lowercase().as_str()))
        })?;

        Some(if merchant.sub_clearing {
            clearing_account(&[merchant.name.as_str(), platform])
        } else {
            clearing_account(&[merchant.name.as_str()])
        })
    }
}
