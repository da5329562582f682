use std::collections::{HashMap, HashSet};

use chrono::Duration;
use serde::Serialize;
use tracing::{debug, info, warn};

use paychain_core::{is_clearing_account, unknown_variant, LinkTag, SourceId, Transaction, TxType};

/// Per-source hook choosing the upstream hop for `current` among
/// `candidates` (records whose counter account is `current`'s source
/// account and that are not yet linked). Returns an index into
/// `candidates`.
pub trait ClearingMatcher {
    fn match_clearing(&self, current: &Transaction, candidates: &[&Transaction]) -> Option<usize>;
}

/// Shared reference first; otherwise the nearest-in-time candidate inside
/// the window whose value equals `current`'s, in either currency.
#[derive(Debug, Clone)]
pub struct DefaultClearingMatcher {
    pub date_tolerance: Duration,
}

impl Default for DefaultClearingMatcher {
    fn default() -> Self {
        Self {
            date_tolerance: Duration::days(3),
        }
    }
}

impl ClearingMatcher for DefaultClearingMatcher {
    fn match_clearing(&self, current: &Transaction, candidates: &[&Transaction]) -> Option<usize> {
        if let Some(hit) = match_by_reference(current, candidates) {
            return Some(hit);
        }

        let mut by_distance: Vec<(usize, Duration)> = candidates
            .iter()
            .enumerate()
            .map(|(i, c)| (i, (c.date - current.date).abs()))
            .collect();
        by_distance.sort_by_key(|&(_, distance)| distance);

        by_distance
            .into_iter()
            .take_while(|&(_, distance)| distance <= self.date_tolerance)
            .map(|(i, _)| i)
            .find(|&i| amounts_match(current, candidates[i]))
    }
}

/// Only an exact shared identifier counts. For sources whose dates do not
/// line up with the payment that funded them, such as receipts dated at
/// pickup.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceOnlyMatcher;

impl ClearingMatcher for ReferenceOnlyMatcher {
    fn match_clearing(&self, current: &Transaction, candidates: &[&Transaction]) -> Option<usize> {
        match_by_reference(current, candidates)
    }
}

fn match_by_reference(current: &Transaction, candidates: &[&Transaction]) -> Option<usize> {
    let refs: HashSet<&str> = current.refs().collect();
    if refs.is_empty() {
        return None;
    }
    candidates
        .iter()
        .position(|c| c.refs().any(|r| refs.contains(r)))
}

/// Same absolute value in the same currency, or one side's foreign pair
/// equals the other side's native amount. Symmetric.
pub fn amounts_match(a: &Transaction, b: &Transaction) -> bool {
    if a.amount.abs() == b.amount.abs() && a.currency == b.currency {
        return true;
    }
    foreign_equals_native(a, b) || foreign_equals_native(b, a)
}

fn foreign_equals_native(a: &Transaction, b: &Transaction) -> bool {
    a.metadata
        .foreign
        .as_ref()
        .is_some_and(|f| f.amount.abs() == b.amount.abs() && f.currency == b.currency)
}

/// Matchers by source; sources without an entry use the default matcher.
pub struct MatcherRegistry {
    default: Box<dyn ClearingMatcher>,
    overrides: HashMap<SourceId, Box<dyn ClearingMatcher>>,
}

impl Default for MatcherRegistry {
    fn default() -> Self {
        Self::new(Box::new(DefaultClearingMatcher::default()))
    }
}

impl MatcherRegistry {
    pub fn new(default: Box<dyn ClearingMatcher>) -> Self {
        Self {
            default,
            overrides: HashMap::new(),
        }
    }

    pub fn register(&mut self, source: SourceId, matcher: Box<dyn ClearingMatcher>) {
        self.overrides.insert(source, matcher);
    }

    pub fn for_source(&self, source: SourceId) -> &dyn ClearingMatcher {
        self.overrides
            .get(&source)
            .map(|m| m.as_ref())
            .unwrap_or(self.default.as_ref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleWarning {
    pub link: LinkTag,
    /// The clearing account the chain came back to.
    pub account: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClearingStats {
    /// Link tags handed out, one per seed.
    pub chains: usize,
    /// Records that received a tag, seeds included.
    pub linked: usize,
    /// Seeds for which no upstream hop was found at all.
    pub unmatched_terminal: usize,
    pub cycles: usize,
    pub warnings: Vec<CycleWarning>,
}

/// A clearing-funded expense whose counter side is a real category (or
/// absent): the downstream end of a chain.
pub fn is_terminal_expense(tx: &Transaction) -> bool {
    tx.tx_type == TxType::Expense
        && is_clearing_account(&tx.source_account)
        && !tx
            .counter_account
            .as_deref()
            .is_some_and(is_clearing_account)
}

/// Tag every clearing chain reachable from a terminal expense, walking
/// upstream through the clearing accounts that funded it. Link ids are
/// handed out from zero in input order. Records are updated in place.
pub fn assign_clearing_links(
    transactions: &mut [Transaction],
    registry: &MatcherRegistry,
) -> ClearingStats {
    let mut counter_index: HashMap<String, Vec<usize>> = HashMap::new();
    for (i, tx) in transactions.iter().enumerate() {
        if let Some(counter) = tx.counter_account.as_deref() {
            if is_clearing_account(counter) {
                counter_index.entry(counter.to_string()).or_default().push(i);
            }
        }
    }

    let mut stats = ClearingStats::default();

    for seed in 0..transactions.len() {
        if transactions[seed].is_linked() || !is_terminal_expense(&transactions[seed]) {
            continue;
        }

        let link = LinkTag(stats.chains as u32);
        stats.chains += 1;
        transactions[seed].metadata.link = Some(link);
        stats.linked += 1;

        let hops = propagate(transactions, seed, link, registry, &counter_index, &mut stats);
        if hops == 0 {
            stats.unmatched_terminal += 1;
        }
    }

    info!(
        chains = stats.chains,
        linked = stats.linked,
        unmatched = stats.unmatched_terminal,
        cycles = stats.cycles,
        "clearing links assigned"
    );
    stats
}

/// Walk upstream from `seed`, returning the number of records newly tagged.
fn propagate(
    transactions: &mut [Transaction],
    seed: usize,
    link: LinkTag,
    registry: &MatcherRegistry,
    counter_index: &HashMap<String, Vec<usize>>,
    stats: &mut ClearingStats,
) -> usize {
    let mut visited: HashSet<String> = HashSet::new();
    let mut current = seed;
    let mut hops = 0;

    loop {
        let account = transactions[current].source_account.clone();
        if !is_clearing_account(&account) {
            break;
        }
        if !visited.insert(account.clone()) {
            warn!(%link, account = %account, "clearing chain revisits an account, halting");
            transactions[current].source_account = unknown_variant(&account);
            stats.cycles += 1;
            stats.warnings.push(CycleWarning { link, account });
            break;
        }

        let pool: Vec<usize> = counter_index
            .get(&account)
            .map(|slots| {
                slots
                    .iter()
                    .copied()
                    .filter(|&i| !transactions[i].is_linked())
                    .collect()
            })
            .unwrap_or_default();
        if pool.is_empty() {
            break;
        }

        let picked = {
            let candidates: Vec<&Transaction> = pool.iter().map(|&i| &transactions[i]).collect();
            let cur = &transactions[current];
            registry.for_source(cur.source).match_clearing(cur, &candidates)
        };
        let Some(next) = picked.and_then(|p| pool.get(p).copied()) else {
            break;
        };

        debug!(%link, from = current, to = next, account = %account, "clearing hop");
        transactions[next].metadata.link = Some(link);
        stats.linked += 1;
        hops += 1;
        current = next;
    }

    hops
}
