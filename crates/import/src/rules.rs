use serde::{Deserialize, Serialize};

use paychain_core::{Transaction, TxType, EXPENSES_UNCATEGORIZED, INCOME_UNCATEGORIZED};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryRule {
    pub name: String,
    #[serde(default)]
    pub priority: i32,
    pub pattern: String,
    #[serde(default)]
    pub match_type: MatchType,
    pub account: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub enum MatchType {
    #[default]
    Contains,
    Exact,
    Regex,
}

const BUILTIN_KEYWORDS: &[(&str, &str)] = &[
    ("星巴克", "Expenses:Food:Coffee"),
    ("starbucks", "Expenses:Food:Coffee"),
    ("瑞幸", "Expenses:Food:Coffee"),
    ("luckin", "Expenses:Food:Coffee"),
    ("咖啡", "Expenses:Food:Coffee"),
    ("coffee", "Expenses:Food:Coffee"),
    ("滴滴", "Expenses:Transport:Taxi"),
    ("出租车", "Expenses:Transport:Taxi"),
    ("地铁", "Expenses:Transport:PublicTransit"),
    ("公交", "Expenses:Transport:PublicTransit"),
    ("12306", "Expenses:Transport:PublicTransit"),
    ("美团外卖", "Expenses:Food:Delivery"),
    ("饿了么", "Expenses:Food:Delivery"),
    ("麦当劳", "Expenses:Food:Restaurant"),
    ("食堂", "Expenses:Food:Restaurant"),
    ("超市", "Expenses:Food:Grocery"),
    ("数码电器", "Expenses:Shopping:Electronics"),
    ("日用百货", "Expenses:Shopping:DailyGoods"),
    ("药房", "Expenses:Health:Medicine"),
    ("医院", "Expenses:Health:Medical"),
    ("书店", "Expenses:Education:Books"),
    ("手续费", "Expenses:Finance:Fees"),
    ("保险", "Expenses:Finance:Insurance"),
    ("中国移动", "Expenses:Housing:Utilities"),
    ("电费", "Expenses:Housing:Utilities"),
];

const BUILTIN_REGEXES: &[(&str, &str)] = &[
    (r"美团.*外卖", "Expenses:Food:Delivery"),
    (r"uber.*eats", "Expenses:Food:Delivery"),
    (r"工资|薪资|salary", "Income:Salary"),
    (r"退款|退货", "Income:Refund"),
    (r"利息.*收入", "Income:Interest"),
    (r"红包", "Income:Uncategorized"),
];

/// Built-in rules: keywords first, then the broader regexes.
pub fn builtin_rules() -> Vec<CategoryRule> {
    let keywords = BUILTIN_KEYWORDS.iter().map(|(kw, account)| CategoryRule {
        name: format!("builtin:{kw}"),
        priority: 0,
        pattern: kw.to_string(),
        match_type: MatchType::Contains,
        account: account.to_string(),
    });
    let regexes = BUILTIN_REGEXES.iter().map(|(re, account)| CategoryRule {
        name: format!("builtin-re:{re}"),
        priority: -1,
        pattern: re.to_string(),
        match_type: MatchType::Regex,
        account: account.to_string(),
    });
    keywords.chain(regexes).collect()
}

/// Internal pairing of a rule with its precompiled regex (if applicable).
struct CompiledRule {
    rule: CategoryRule,
    compiled_regex: Option<regex::Regex>,
}

/// Supplies the opposing account for records that do not carry one.
pub struct CategoryRuleEngine {
    rules: Vec<CompiledRule>,
}

impl Default for CategoryRuleEngine {
    fn default() -> Self {
        Self::new(builtin_rules())
    }
}

impl CategoryRuleEngine {
    pub fn new(rules: Vec<CategoryRule>) -> Self {
        let mut compiled: Vec<CompiledRule> = rules
            .into_iter()
            .map(|rule| {
                let compiled_regex = if let MatchType::Regex = &rule.match_type {
                    regex::RegexBuilder::new(&rule.pattern)
                        .case_insensitive(true)
                        .build()
                        .ok()
                } else {
                    None
                };
                CompiledRule { rule, compiled_regex }
            })
            .collect();
        // Highest priority first; stable, so equal priorities keep input order.
        compiled.sort_by(|a, b| b.rule.priority.cmp(&a.rule.priority));
        Self { rules: compiled }
    }

    /// User rules are tried before the built-ins at equal priority.
    pub fn with_user_rules(user_rules: Vec<CategoryRule>) -> Self {
        let mut rules = user_rules;
        rules.extend(builtin_rules());
        Self::new(rules)
    }

    pub fn find_matching_rule(&self, tx: &Transaction) -> Option<&CategoryRule> {
        let text = categorizable_text(tx);
        self.rules
            .iter()
            .find(|cr| rule_matches(cr, &text))
            .map(|cr| &cr.rule)
    }

    pub fn categorize(&self, tx: &Transaction) -> Option<&str> {
        self.find_matching_rule(tx).map(|r| r.account.as_str())
    }

    /// Categorized account, or the uncategorized bucket for the record's
    /// direction.
    pub fn categorize_or_fallback(&self, tx: &Transaction) -> String {
        match self.categorize(tx) {
            Some(account) => account.to_string(),
            None => fallback_account(tx.tx_type).to_string(),
        }
    }
}

pub fn fallback_account(tx_type: TxType) -> &'static str {
    match tx_type {
        TxType::Income => INCOME_UNCATEGORIZED,
        _ => EXPENSES_UNCATEGORIZED,
    }
}

fn categorizable_text(tx: &Transaction) -> String {
    let mut text = tx.description();
    if let Some(raw) = &tx.raw_category {
        text.push(' ');
        text.push_str(raw);
    }
    text.to_lowercase()
}

fn rule_matches(cr: &CompiledRule, text: &str) -> bool {
    let rule = &cr.rule;
    let pattern = rule.pattern.to_lowercase();

    match &rule.match_type {
        MatchType::Contains => text.contains(&pattern),
        MatchType::Exact => text.trim() == pattern,
        MatchType::Regex => cr
            .compiled_regex
            .as_ref()
            .is_some_and(|re| re.is_match(text)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use paychain_core::Money;

    fn make_tx(payee: &str, narration: &str, tx_type: TxType) -> Transaction {
        let date = NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let mut tx = Transaction::new(date, Money::from_cents(-3500), "CNY", "Assets:WeChat", tx_type);
        tx.payee = payee.to_string();
        tx.narration = narration.to_string();
        tx
    }

    fn make_rule(pattern: &str, match_type: MatchType, account: &str, priority: i32) -> CategoryRule {
        CategoryRule {
            name: "test".to_string(),
            priority,
            pattern: pattern.to_string(),
            match_type,
            account: account.to_string(),
        }
    }

    #[test]
    fn contains_match_case_insensitive() {
        let engine = CategoryRuleEngine::new(vec![make_rule(
            "Starbucks",
            MatchType::Contains,
            "Expenses:Food:Coffee",
            1,
        )]);
        let tx = make_tx("STARBUCKS RESERVE", "latte", TxType::Expense);
        assert_eq!(engine.categorize(&tx), Some("Expenses:Food:Coffee"));
    }

    #[test]
    fn exact_match() {
        let engine = CategoryRuleEngine::new(vec![make_rule(
            "starbucks latte",
            MatchType::Exact,
            "Expenses:Food:Coffee",
            1,
        )]);
        assert!(engine.categorize(&make_tx("Starbucks", "latte", TxType::Expense)).is_some());
        assert!(engine.categorize(&make_tx("Starbucks", "mocha", TxType::Expense)).is_none());
    }

    #[test]
    fn regex_match_ignores_case() {
        let engine = CategoryRuleEngine::new(vec![make_rule(
            r"uber.*eats",
            MatchType::Regex,
            "Expenses:Food:Delivery",
            1,
        )]);
        assert!(engine.categorize(&make_tx("Uber", "EATS order", TxType::Expense)).is_some());
        assert!(engine.categorize(&make_tx("Uber", "trip", TxType::Expense)).is_none());
    }

    #[test]
    fn raw_category_participates() {
        let engine = CategoryRuleEngine::default();
        let mut tx = make_tx("京东", "订单", TxType::Expense);
        tx.raw_category = Some("数码电器".to_string());
        assert_eq!(engine.categorize(&tx), Some("Expenses:Shopping:Electronics"));
    }

    #[test]
    fn priority_ordering_highest_wins() {
        let engine = CategoryRuleEngine::new(vec![
            make_rule("coffee", MatchType::Contains, "Expenses:Food:Coffee", 1),
            make_rule("coffee", MatchType::Contains, "Expenses:Food:Restaurant", 10),
        ]);
        let tx = make_tx("Blue Bottle Coffee", "", TxType::Expense);
        assert_eq!(engine.categorize(&tx), Some("Expenses:Food:Restaurant"));
    }

    #[test]
    fn user_rules_shadow_builtins() {
        let engine = CategoryRuleEngine::with_user_rules(vec![make_rule(
            "星巴克",
            MatchType::Contains,
            "Expenses:Work:Meals",
            0,
        )]);
        let tx = make_tx("星巴克", "拿铁", TxType::Expense);
        assert_eq!(engine.categorize(&tx), Some("Expenses:Work:Meals"));
    }

    #[test]
    fn keywords_beat_builtin_regexes() {
        let engine = CategoryRuleEngine::default();
        let tx = make_tx("美团外卖", "午餐", TxType::Expense);
        assert_eq!(engine.categorize(&tx), Some("Expenses:Food:Delivery"));
        let refund = make_tx("某商户", "退款", TxType::Income);
        assert_eq!(engine.categorize(&refund), Some("Income:Refund"));
    }

    #[test]
    fn fallback_follows_direction() {
        let engine = CategoryRuleEngine::new(vec![]);
        assert_eq!(
            engine.categorize_or_fallback(&make_tx("x", "y", TxType::Expense)),
            EXPENSES_UNCATEGORIZED
        );
        assert_eq!(
            engine.categorize_or_fallback(&make_tx("x", "y", TxType::Income)),
            INCOME_UNCATEGORIZED
        );
    }
}
