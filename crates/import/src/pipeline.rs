use serde::Serialize;
use tracing::{debug, info};

use paychain_core::{DateRange, LedgerEntry, SourceId, Transaction, TxType};

use crate::clearing::MerchantDetector;
use crate::config::{CardType, MatcherKind, ReconcileConfig, ResolveMode, SourceConfig, Tables};
use crate::dedup::deduplicate;
use crate::links::{
    assign_clearing_links, ClearingStats, DefaultClearingMatcher, MatcherRegistry,
    ReferenceOnlyMatcher,
};
use crate::match_engine::{MatchingEngine, MatchingOutput};
use crate::postings::EntryBuilder;
use crate::resolve::PaymentResolver;
use crate::rules::CategoryRuleEngine;

/// Records extracted from one source file. `source` is assigned by the host
/// when the source is opened and stamped on every record.
#[derive(Debug, Clone)]
pub struct SourceBatch {
    pub source: SourceId,
    pub name: String,
    pub transactions: Vec<Transaction>,
}

/// Fills in accounts that importers leave to configuration: the source
/// account from the payment method, and a merchant clearing counter account
/// for expenses.
pub struct Normalizer<'a> {
    resolver: PaymentResolver<'a>,
    detector: MerchantDetector<'a>,
}

impl<'a> Normalizer<'a> {
    pub fn new(tables: &'a Tables, default_card: CardType) -> Self {
        Self {
            resolver: PaymentResolver::new(tables, default_card),
            detector: MerchantDetector::new(&tables.merchants),
        }
    }

    pub fn normalize(&self, source: &SourceConfig, tx: &mut Transaction) {
        let Some(platform) = source.platform.as_deref() else {
            return;
        };

        if tx.source_account.is_empty() {
            let method = tx.payment_method();
            let resolved = match source.resolve {
                ResolveMode::Clearing => Some(self.resolver.resolve(
                    method,
                    platform,
                    &format!("Assets:Clearing:{platform}:Unknown"),
                )),
                ResolveMode::Direct => Some(
                    self.resolver
                        .resolve_direct(method, &format!("Assets:{platform}:Unknown")),
                ),
                ResolveMode::None => None,
            };
            if let Some(account) = resolved {
                tx.source_account = account;
            }
        }

        if tx.counter_account.is_none() && tx.tx_type == TxType::Expense {
            tx.counter_account = self.detector.detect(platform, &tx.payee, &tx.narration);
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineStats {
    pub sources: usize,
    pub records_in: usize,
    pub duplicates: usize,
    /// Records dropped by the date range.
    pub filtered: usize,
    pub clearing: ClearingStats,
    pub entries: usize,
    pub skipped_entries: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutput {
    pub transactions: Vec<Transaction>,
    pub entries: Vec<LedgerEntry>,
    pub stats: PipelineStats,
}

/// One reconciliation run: per-source cleanup, the clearing pass over the
/// merged record set, then entry building.
pub struct Pipeline {
    config: ReconcileConfig,
    categorizer: CategoryRuleEngine,
}

impl Pipeline {
    pub fn new(config: &ReconcileConfig) -> Self {
        Self {
            config: config.clone(),
            categorizer: CategoryRuleEngine::with_user_rules(config.rules.clone()),
        }
    }

    pub fn run(&self, batches: Vec<SourceBatch>, range: Option<DateRange>) -> PipelineOutput {
        let mut stats = PipelineStats {
            sources: batches.len(),
            ..PipelineStats::default()
        };
        let registry = self.registry(&batches);
        let mut transactions = self.merge(batches, range, &mut stats);

        stats.clearing = assign_clearing_links(&mut transactions, &registry);

        let (entries, skipped) = EntryBuilder::new(&self.categorizer).build_all(&transactions);
        stats.entries = entries.len();
        stats.skipped_entries = skipped;

        info!(
            sources = stats.sources,
            records = transactions.len(),
            duplicates = stats.duplicates,
            filtered = stats.filtered,
            entries = stats.entries,
            skipped = stats.skipped_entries,
            "reconciliation complete"
        );

        PipelineOutput {
            transactions,
            entries,
            stats,
        }
    }

    /// The merged record set [`Pipeline::run`] links: each source
    /// deduplicated, date filtered and normalized, then flattened in source
    /// order.
    pub fn prepare(
        &self,
        batches: Vec<SourceBatch>,
        range: Option<DateRange>,
    ) -> Vec<Transaction> {
        self.merge(batches, range, &mut PipelineStats::default())
    }

    /// Cross-source pairing report over an already merged record set.
    pub fn analyze(&self, transactions: &[Transaction]) -> MatchingOutput {
        MatchingEngine::from_config(
            &self.config.matching,
            &self.config.tables.intermediary_keywords,
        )
        .run(transactions)
    }

    fn merge(
        &self,
        batches: Vec<SourceBatch>,
        range: Option<DateRange>,
        stats: &mut PipelineStats,
    ) -> Vec<Transaction> {
        let normalizer = Normalizer::new(&self.config.tables, self.config.resolver.default_card);

        let mut transactions = Vec::new();
        for batch in batches {
            let source_config = self.config.source(&batch.name);
            let before = batch.transactions.len();
            stats.records_in += before;

            let unique = deduplicate(batch.transactions);
            let duplicates = before - unique.len();
            stats.duplicates += duplicates;

            let kept: Vec<Transaction> = match range {
                Some(range) => unique
                    .into_iter()
                    .filter(|tx| range.contains_timestamp(tx.date))
                    .collect(),
                None => unique,
            };
            stats.filtered += before - duplicates - kept.len();

            debug!(source = %batch.name, records = kept.len(), duplicates, "source prepared");
            for mut tx in kept {
                tx.source = batch.source;
                normalizer.normalize(&source_config, &mut tx);
                transactions.push(tx);
            }
        }
        transactions
    }

    fn registry(&self, batches: &[SourceBatch]) -> MatcherRegistry {
        let mut registry = MatcherRegistry::new(Box::new(DefaultClearingMatcher {
            date_tolerance: self.config.clearing.date_tolerance(),
        }));
        for batch in batches {
            if self.config.source(&batch.name).matcher == MatcherKind::ReferenceOnly {
                registry.register(batch.source, Box::new(ReferenceOnlyMatcher));
            }
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use paychain_core::Money;
    use rust_decimal_macros::dec;

    fn tx(year: i32, amount: rust_decimal::Decimal) -> Transaction {
        let date = NaiveDate::from_ymd_opt(year, 7, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        Transaction::new(date, Money::from_decimal(amount), "CNY", "", TxType::Expense)
    }

    fn wechat_config() -> ReconcileConfig {
        ReconcileConfig::from_toml("[sources.wechat]\nplatform = \"WX\"\n").unwrap()
    }

    #[test]
    fn normalizer_resolves_source_and_merchant_counter() {
        let config = wechat_config();
        let normalizer = Normalizer::new(&config.tables, CardType::Credit);
        let mut record = tx(2024, dec!(-88));
        record.payment_method = Some("招商银行信用卡(0913)".into());
        record.payee = "奥乐齐".into();

        normalizer.normalize(&config.source("wechat"), &mut record);
        assert_eq!(record.source_account, "Assets:Clearing:WX:CC:CMB");
        assert_eq!(record.counter_account.as_deref(), Some("Assets:Clearing:ALDI"));
    }

    #[test]
    fn normalizer_direct_mode_and_fallback() {
        let config = ReconcileConfig::from_toml(
            "[sources.wechat]\nplatform = \"WX\"\nresolve = \"direct\"\n",
        )
        .unwrap();
        let normalizer = Normalizer::new(&config.tables, CardType::Credit);

        let mut card = tx(2024, dec!(-1));
        card.payment_method = Some("招商银行信用卡".into());
        normalizer.normalize(&config.source("wechat"), &mut card);
        assert_eq!(card.source_account, "Liabilities:CreditCard:CMB");

        let mut unknown = tx(2024, dec!(-1));
        normalizer.normalize(&config.source("wechat"), &mut unknown);
        assert_eq!(unknown.source_account, "Assets:WX:Unknown");
    }

    #[test]
    fn normalizer_leaves_sources_without_platform() {
        let config = ReconcileConfig::default();
        let normalizer = Normalizer::new(&config.tables, CardType::Credit);
        let mut record = tx(2024, dec!(-1));
        record.source_account = "Assets:Bank:CMB".into();
        record.payee = "ALDI".into();
        normalizer.normalize(&config.source("bank"), &mut record);
        assert_eq!(record.source_account, "Assets:Bank:CMB");
        assert_eq!(record.counter_account, None);
    }

    #[test]
    fn normalizer_keeps_explicit_accounts() {
        let config = wechat_config();
        let normalizer = Normalizer::new(&config.tables, CardType::Credit);
        let mut record = tx(2024, dec!(-1));
        record.source_account = "Assets:WeChat".into();
        record.counter_account = Some("Expenses:Food".into());
        record.payee = "ALDI".into();
        normalizer.normalize(&config.source("wechat"), &mut record);
        assert_eq!(record.source_account, "Assets:WeChat");
        assert_eq!(record.counter_account.as_deref(), Some("Expenses:Food"));
    }

    #[test]
    fn run_counts_duplicates_and_filtered() {
        let pipeline = Pipeline::new(&wechat_config());
        let mut a = tx(2024, dec!(-10));
        a.reference_id = Some("A".into());
        let mut dup = tx(2024, dec!(-10));
        dup.reference_id = Some("A".into());
        let old = tx(2019, dec!(-5));

        let batch = SourceBatch {
            source: SourceId(3),
            name: "wechat".into(),
            transactions: vec![a, dup, old],
        };
        let range = DateRange::parse_years("2020:2026").unwrap();
        let out = pipeline.run(vec![batch], Some(range));

        assert_eq!(out.stats.records_in, 3);
        assert_eq!(out.stats.duplicates, 1);
        assert_eq!(out.stats.filtered, 1);
        assert_eq!(out.transactions.len(), 1);
        assert_eq!(out.transactions[0].source, SourceId(3));
        assert_eq!(out.transactions[0].source_account, "Assets:Clearing:WX:Unknown");
        assert_eq!(out.stats.entries, 1);
    }

    #[test]
    fn reference_only_sources_get_their_matcher() {
        let config = ReconcileConfig::from_toml(
            "[sources.aldi]\nmatcher = \"reference_only\"\n",
        )
        .unwrap();
        let pipeline = Pipeline::new(&config);

        let mut receipt = tx(2024, dec!(-20));
        receipt.source_account = "Assets:Clearing:ALDI".into();
        receipt.counter_account = Some("Expenses:Food".into());
        let mut payment = tx(2024, dec!(-20));
        payment.source_account = "Assets:Clearing:WX:CC:CMB".into();
        payment.counter_account = Some("Assets:Clearing:ALDI".into());
        payment.tx_type = TxType::Transfer;

        let batches = vec![
            SourceBatch { source: SourceId(0), name: "aldi".into(), transactions: vec![receipt] },
            SourceBatch { source: SourceId(1), name: "wechat".into(), transactions: vec![payment] },
        ];
        let out = pipeline.run(batches, None);
        // Same amount and day, but the receipt source only trusts shared ids.
        assert_eq!(out.stats.clearing.unmatched_terminal, 1);
        assert!(!out.transactions[1].is_linked());
    }

    #[test]
    fn prepared_records_pair_on_resolved_accounts() {
        let config = ReconcileConfig::from_toml(
            "[sources.wechat]\nplatform = \"WX\"\n\n[sources.alipay]\nplatform = \"Alipay\"\n",
        )
        .unwrap();
        let pipeline = Pipeline::new(&config);

        let mut wx = tx(2024, dec!(-66));
        wx.payment_method = Some("招商银行信用卡".into());
        wx.reference_id = Some("ORD-1".into());
        let mut ali = tx(2024, dec!(66));
        ali.payment_method = Some("余额".into());
        ali.counterpart_ref = Some("ORD-1".into());

        let raw = vec![wx.clone(), ali.clone()];
        assert!(pipeline.analyze(&raw).matched.is_empty());

        let batches = vec![
            SourceBatch { source: SourceId(0), name: "wechat".into(), transactions: vec![wx] },
            SourceBatch { source: SourceId(1), name: "alipay".into(), transactions: vec![ali] },
        ];
        let prepared = pipeline.prepare(batches, None);
        let accounts: Vec<_> = prepared.iter().map(|t| t.source_account.as_str()).collect();
        assert_eq!(accounts, vec!["Assets:Clearing:WX:CC:CMB", "Assets:Alipay"]);

        let out = pipeline.analyze(&prepared);
        assert_eq!(out.matched.len(), 1);
        assert_eq!(out.matched[0].match_type, crate::match_engine::MatchType::Reference);
    }

    #[test]
    fn analyze_uses_configured_threshold() {
        let config = ReconcileConfig::from_toml("[matching]\nfuzzy_threshold = 0.0\n").unwrap();
        let pipeline = Pipeline::new(&config);
        let mut a = tx(2024, dec!(-3));
        a.source_account = "Assets:WeChat".into();
        a.payee = "abc".into();
        let mut b = tx(2024, dec!(-3));
        b.source_account = "Assets:Alipay".into();
        b.payee = "xyz".into();

        let out = pipeline.analyze(&[a, b]);
        assert_eq!(out.matched.len(), 1);
    }
}
