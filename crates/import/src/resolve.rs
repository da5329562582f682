use paychain_core::clearing_account;

use crate::config::{CardType, Tables};

/// Maps free-text funding instruments such as `招商银行信用卡(0913)` to account
/// paths. Never fails: unplaced strings come back as the caller's fallback.
pub struct PaymentResolver<'a> {
    tables: &'a Tables,
    default_card: CardType,
}

impl<'a> PaymentResolver<'a> {
    pub fn new(tables: &'a Tables, default_card: CardType) -> Self {
        Self {
            tables,
            default_card,
        }
    }

    /// Resolve `method`, paid on `platform`, to the account value left from.
    ///
    /// Order: platform wallets (longest prefix first), composite
    /// `channel-instrument` strings, channel keywords, then bank cards
    /// (`Assets:Clearing:<platform>:<CC|Bank>:<BANK>`). Unplaced strings
    /// return `fallback`.
    pub fn resolve(&self, method: &str, platform: &str, fallback: &str) -> String {
        let method = method.trim();
        if method.is_empty() || method == "/" {
            return fallback.to_string();
        }

        if let Some(wallets) = self.tables.wallets.get(platform) {
            if let Some(account) = longest_prefix(wallets.iter(), method) {
                return account.to_string();
            }
        }

        if let Some((prefix, rest)) = method.split_once('-') {
            if let Some(channel) = self.channel_of(prefix.trim()) {
                return clearing_account(&[platform, channel]);
            }
            return self.resolve(rest, platform, fallback);
        }

        if let Some(channel) = self.channel_of(method) {
            return clearing_account(&[platform, channel]);
        }

        let card = self.card_type(method);
        match self.bank_code(method) {
            Some(code) => clearing_account(&[platform, card.clearing_segment(), code]),
            None => fallback.to_string(),
        }
    }

    /// Resolution for sources that post straight to real accounts instead of
    /// a clearing bridge: wallets → wallet account, bank cards →
    /// `Liabilities:CreditCard:<BANK>` or `Assets:Bank:<BANK>`.
    pub fn resolve_direct(&self, method: &str, fallback: &str) -> String {
        let method = method.trim();
        if method.is_empty() || method == "/" {
            return fallback.to_string();
        }

        if let Some(account) = longest_prefix(self.tables.direct_wallets.iter(), method) {
            return account.to_string();
        }

        if let Some((_, rest)) = method.split_once('-') {
            return self.resolve_direct(rest, fallback);
        }

        let card = self.card_type(method);
        match self.bank_code(method) {
            Some(code) => format!("{}:{code}", card.direct_prefix()),
            None => fallback.to_string(),
        }
    }

    fn channel_of(&self, text: &str) -> Option<&'a str> {
        self.tables
            .channels
            .iter()
            .find(|c| c.keywords.iter().any(|kw| text.contains(kw.as_str())))
            .map(|c| c.code.as_str())
    }

    fn card_type(&self, method: &str) -> CardType {
        let has = |keywords: &[String]| keywords.iter().any(|kw| method.contains(kw.as_str()));
        if has(self.tables.debit_keywords.as_slice()) {
            CardType::Debit
        } else if has(self.tables.credit_keywords.as_slice()) {
            CardType::Credit
        } else {
            self.default_card
        }
    }

    fn bank_code(&self, method: &str) -> Option<&'a str> {
        self.tables
            .banks
            .iter()
            .find(|b| method.contains(b.name.as_str()))
            .map(|b| b.code.as_str())
    }
}

/// Longest keyword that `method` starts with. A short keyword never shadows
/// a longer one it is a prefix of.
fn longest_prefix<'t>(
    table: impl Iterator<Item = (&'t String, &'t String)>,
    method: &str,
) -> Option<&'t str> {
    let mut entries: Vec<_> = table.collect();
    entries.sort_by(|a, b| b.0.chars().count().cmp(&a.0.chars().count()));
    entries
        .into_iter()
        .find(|(keyword, _)| method.starts_with(keyword.as_str()))
        .map(|(_, account)| account.as_str())
}
