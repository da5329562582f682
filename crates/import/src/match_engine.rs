use std::collections::HashMap;

use chrono::Duration;
use serde::Serialize;
use tracing::debug;

use paychain_core::Transaction;

use crate::config::MatchingConfig;
use crate::util::token_sort_ratio;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Reference,
    Intermediary,
    Fuzzy,
}

/// A matched pair, by index into the slice given to [`MatchingEngine::run`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub a: usize,
    pub b: usize,
    pub match_type: MatchType,
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MatchingOutput {
    pub matched: Vec<MatchResult>,
    /// Indices not consumed by any phase, ascending.
    pub unmatched: Vec<usize>,
}

/// Reports which records look like two sides of one payment. Never mutates
/// the records it is given.
pub struct MatchingEngine {
    pub date_tolerance: Duration,
    pub fuzzy_threshold: f64,
    intermediary_keywords: Vec<String>,
}

const DEFAULT_INTERMEDIARY_KEYWORDS: &[&str] =
    &["支付宝", "财付通", "微信", "alipay", "wechat", "tenpay"];

impl Default for MatchingEngine {
    fn default() -> Self {
        Self::new(Duration::days(3), 0.7)
    }
}

impl MatchingEngine {
    pub fn new(date_tolerance: Duration, fuzzy_threshold: f64) -> Self {
        Self {
            date_tolerance,
            fuzzy_threshold,
            intermediary_keywords: DEFAULT_INTERMEDIARY_KEYWORDS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    pub fn from_config(config: &MatchingConfig, intermediary_keywords: &[String]) -> Self {
        Self::new(config.date_tolerance(), config.fuzzy_threshold)
            .with_intermediary_keywords(intermediary_keywords.to_vec())
    }

    /// Platform names looked for (lowercased) in bank-side text in phase 2.
    pub fn with_intermediary_keywords(mut self, keywords: Vec<String>) -> Self {
        self.intermediary_keywords = keywords.into_iter().map(|k| k.to_lowercase()).collect();
        self
    }

    /// Run the reference, intermediary and fuzzy phases in order. An index
    /// consumed by one phase is invisible to every later one.
    pub fn run(&self, transactions: &[Transaction]) -> MatchingOutput {
        let mut consumed = vec![false; transactions.len()];
        let mut matched = Vec::new();

        self.phase_reference(transactions, &mut consumed, &mut matched);
        let after_reference = matched.len();
        self.phase_intermediary(transactions, &mut consumed, &mut matched);
        let after_intermediary = matched.len();
        self.phase_fuzzy(transactions, &mut consumed, &mut matched);

        debug!(
            reference = after_reference,
            intermediary = after_intermediary - after_reference,
            fuzzy = matched.len() - after_intermediary,
            "matching phases complete"
        );

        let unmatched = (0..consumed.len()).filter(|&i| !consumed[i]).collect();

        MatchingOutput { matched, unmatched }
    }

    fn phase_reference(
        &self,
        txs: &[Transaction],
        consumed: &mut [bool],
        matched: &mut Vec<MatchResult>,
    ) {
        // Keys in first-seen order.
        let mut order: Vec<&str> = Vec::new();
        let mut index: HashMap<&str, Vec<usize>> = HashMap::new();
        for (i, tx) in txs.iter().enumerate() {
            for key in tx.refs() {
                let slots = index.entry(key).or_insert_with(|| {
                    order.push(key);
                    Vec::new()
                });
                if slots.last() != Some(&i) {
                    slots.push(i);
                }
            }
        }

        for key in order {
            let Some(indices) = index.get(key) else { continue };
            let Some((&first, rest)) = indices.split_first() else { continue };
            if consumed[first] {
                continue;
            }
            let partner = rest
                .iter()
                .copied()
                .find(|&j| !consumed[j] && txs[j].source_account != txs[first].source_account);
            if let Some(j) = partner {
                debug!(reference = key, a = first, b = j, "reference match");
                consumed[first] = true;
                consumed[j] = true;
                matched.push(MatchResult {
                    a: first,
                    b: j,
                    match_type: MatchType::Reference,
                    confidence: 1.0,
                });
            }
        }
    }

    fn phase_intermediary(
        &self,
        txs: &[Transaction],
        consumed: &mut [bool],
        matched: &mut Vec<MatchResult>,
    ) {
        let (platform, bank): (Vec<usize>, Vec<usize>) = (0..txs.len())
            .filter(|&i| !consumed[i])
            .partition(|&i| !txs[i].payment_method().is_empty());

        for p in platform {
            let ptx = &txs[p];
            let hit = bank.iter().copied().find(|&b| {
                let btx = &txs[b];
                !consumed[b]
                    && same_value(ptx, btx)
                    && self.within_window(ptx, btx)
                    && self.mentions_platform(btx)
            });
            if let Some(b) = hit {
                debug!(a = p, b, "intermediary match");
                consumed[p] = true;
                consumed[b] = true;
                matched.push(MatchResult {
                    a: p,
                    b,
                    match_type: MatchType::Intermediary,
                    confidence: 0.9,
                });
            }
        }
    }

    fn phase_fuzzy(
        &self,
        txs: &[Transaction],
        consumed: &mut [bool],
        matched: &mut Vec<MatchResult>,
    ) {
        for i in 0..txs.len() {
            if consumed[i] {
                continue;
            }
            for j in (i + 1)..txs.len() {
                if consumed[j] {
                    continue;
                }
                let (a, b) = (&txs[i], &txs[j]);
                if a.source_account == b.source_account
                    || !same_value(a, b)
                    || !self.within_window(a, b)
                {
                    continue;
                }
                let similarity = token_sort_ratio(&a.description(), &b.description());
                if similarity >= self.fuzzy_threshold {
                    debug!(a = i, b = j, similarity, "fuzzy match");
                    consumed[i] = true;
                    consumed[j] = true;
                    matched.push(MatchResult {
                        a: i,
                        b: j,
                        match_type: MatchType::Fuzzy,
                        confidence: similarity,
                    });
                    break;
                }
            }
        }
    }

    fn within_window(&self, a: &Transaction, b: &Transaction) -> bool {
        (a.date - b.date).abs() <= self.date_tolerance
    }

    fn mentions_platform(&self, tx: &Transaction) -> bool {
        let text = tx.description().to_lowercase();
        self.intermediary_keywords
            .iter()
            .any(|kw| text.contains(kw.as_str()))
    }
}

fn same_value(a: &Transaction, b: &Transaction) -> bool {
    a.amount.abs() == b.amount.abs() && a.currency == b.currency
}
