pub mod allocate;
pub mod clearing;
pub mod config;
pub mod dedup;
pub mod links;
pub mod match_engine;
pub mod pipeline;
pub mod postings;
pub mod resolve;
pub mod rules;
pub(crate) mod util;

pub use allocate::{allocate, Allocation};
pub use clearing::MerchantDetector;
pub use config::{
    Bank, CardType, Channel, ClearingConfig, ConfigError, MatcherKind, MatchingConfig, Merchant,
    ReconcileConfig, ResolveMode, ResolverConfig, SourceConfig, Tables,
};
pub use dedup::deduplicate;
pub use links::{
    amounts_match, assign_clearing_links, is_terminal_expense, ClearingMatcher, ClearingStats,
    CycleWarning, DefaultClearingMatcher, MatcherRegistry, ReferenceOnlyMatcher,
};
pub use match_engine::{MatchResult, MatchType, MatchingEngine, MatchingOutput};
pub use pipeline::{Normalizer, Pipeline, PipelineOutput, PipelineStats, SourceBatch};
pub use postings::EntryBuilder;
pub use resolve::PaymentResolver;
pub use rules::{
    builtin_rules, fallback_account, CategoryRule, CategoryRuleEngine, MatchType as RuleMatchType,
};
