use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rules::{CategoryRule, MatchType};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("fuzzy_threshold must be within 0..=1, got {0}")]
    ThresholdOutOfRange(f64),
    #[error("date tolerance must not be negative, got {0} days")]
    NegativeTolerance(i64),
    #[error("Rule '{name}' has an invalid regex: {source}")]
    InvalidRegex {
        name: String,
        #[source]
        source: regex::Error,
    },
}

/// Settings plus the lookup tables read by the resolver, detector and
/// matching engine. An empty TOML document yields the built-in defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    pub matching: MatchingConfig,
    pub clearing: ClearingConfig,
    pub resolver: ResolverConfig,
    pub tables: Tables,
    pub rules: Vec<CategoryRule>,
    pub sources: BTreeMap<String, SourceConfig>,
}

impl ReconcileConfig {
    pub fn from_toml(toml_content: &str) -> Result<Self, ConfigError> {
        let config: ReconcileConfig = toml::from_str(toml_content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let threshold = self.matching.fuzzy_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::ThresholdOutOfRange(threshold));
        }
        for days in [self.matching.date_tolerance_days, self.clearing.date_tolerance_days] {
            if days < 0 {
                return Err(ConfigError::NegativeTolerance(days));
            }
        }
        for rule in &self.rules {
            if rule.match_type == MatchType::Regex {
                regex::Regex::new(&rule.pattern).map_err(|source| ConfigError::InvalidRegex {
                    name: rule.name.clone(),
                    source,
                })?;
            }
        }
        Ok(())
    }

    pub fn source(&self, name: &str) -> SourceConfig {
        self.sources.get(name).cloned().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    pub date_tolerance_days: i64,
    pub fuzzy_threshold: f64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            date_tolerance_days: 3,
            fuzzy_threshold: 0.7,
        }
    }
}

impl MatchingConfig {
    pub fn date_tolerance(&self) -> Duration {
        Duration::days(self.date_tolerance_days)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClearingConfig {
    pub date_tolerance_days: i64,
}

impl Default for ClearingConfig {
    fn default() -> Self {
        Self {
            date_tolerance_days: 3,
        }
    }
}

impl ClearingConfig {
    pub fn date_tolerance(&self) -> Duration {
        Duration::days(self.date_tolerance_days)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardType {
    #[default]
    Credit,
    Debit,
}

impl CardType {
    /// Segment used under a platform clearing root.
    pub fn clearing_segment(self) -> &'static str {
        match self {
            CardType::Credit => "CC",
            CardType::Debit => "Bank",
        }
    }

    /// Account prefix used when posting directly to the card.
    pub fn direct_prefix(self) -> &'static str {
        match self {
            CardType::Credit => "Liabilities:CreditCard",
            CardType::Debit => "Assets:Bank",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub default_card: CardType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveMode {
    #[default]
    Clearing,
    Direct,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatcherKind {
    #[default]
    Default,
    ReferenceOnly,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Clearing platform code for this source, e.g. `WX`.
    pub platform: Option<String>,
    pub resolve: ResolveMode,
    pub matcher: MatcherKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub code: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bank {
    pub name: String,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Merchant {
    pub name: String,
    pub keywords: Vec<String>,
    /// The merchant runs its own payment flow, so its clearing account is
    /// split per paying platform.
    #[serde(default)]
    pub sub_clearing: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Tables {
    /// platform → (wallet keyword → account). Matched as prefixes.
    pub wallets: BTreeMap<String, BTreeMap<String, String>>,
    /// Wallet keywords for sources that post directly to real accounts.
    pub direct_wallets: BTreeMap<String, String>,
    pub channels: Vec<Channel>,
    pub banks: Vec<Bank>,
    pub credit_keywords: Vec<String>,
    pub debit_keywords: Vec<String>,
    pub merchants: Vec<Merchant>,
    /// Platform names that show up in bank statement text.
    pub intermediary_keywords: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn pairs(items: &[(&str, &str)]) -> BTreeMap<String, String> {
    items
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

impl Default for Tables {
    fn default() -> Self {
        let wallets = [
            ("WX", pairs(&[("零钱", "Assets:WeChat"), ("零钱通", "Assets:WeChat")])),
            ("Alipay", pairs(&[("余额", "Assets:Alipay"), ("余额宝", "Assets:Alipay")])),
            (
                "JD",
                pairs(&[
                    ("白条", "Liabilities:JD:BaiTiao"),
                    ("京东白条", "Liabilities:JD:BaiTiao"),
                    ("小金库", "Assets:JD:XiaoJinKu"),
                    ("京东小金库", "Assets:JD:XiaoJinKu"),
                ]),
            ),
        ]
        .into_iter()
        .map(|(platform, table)| (platform.to_string(), table))
        .collect();

        let direct_wallets = pairs(&[
            ("零钱", "Assets:WeChat"),
            ("零钱通", "Assets:WeChat"),
            ("余额", "Assets:Alipay"),
            ("余额宝", "Assets:Alipay"),
            ("京东白条", "Liabilities:JD:BaiTiao"),
            ("京东小金库", "Assets:JD:XiaoJinKu"),
            ("微信支付", "Assets:WeChat"),
            ("财付通", "Assets:WeChat"),
            ("支付宝", "Assets:Alipay"),
            ("支付宝支付", "Assets:Alipay"),
            ("京东支付", "Assets:JD"),
        ]);

        let channels = vec![
            Channel {
                code: "WX".to_string(),
                keywords: strings(&["微信", "财付通", "WeChat", "Tenpay"]),
            },
            Channel {
                code: "Alipay".to_string(),
                keywords: strings(&["支付宝", "Alipay"]),
            },
            Channel {
                code: "ApplePay".to_string(),
                keywords: strings(&["Apple"]),
            },
        ];

        let banks = [
            ("招商银行", "CMB"),
            ("工商银行", "ICBC"),
            ("建设银行", "CCB"),
            ("中国银行", "BOC"),
            ("中信银行", "CITIC"),
            ("农业银行", "ABC"),
            ("交通银行", "COMM"),
            ("浦发银行", "SPDB"),
            ("兴业银行", "CIB"),
            ("民生银行", "CMBC"),
            ("光大银行", "CEB"),
            ("平安银行", "PAB"),
            ("广发银行", "GDB"),
            ("邮储银行", "PSBC"),
            ("汇丰", "HSBC"),
        ]
        .iter()
        .map(|(name, code)| Bank {
            name: name.to_string(),
            code: code.to_string(),
        })
        .collect();

        let merchants = vec![
            Merchant {
                name: "Costco".to_string(),
                keywords: strings(&["Costco", "开市客"]),
                sub_clearing: false,
            },
            Merchant {
                name: "ALDI".to_string(),
                keywords: strings(&["ALDI", "奥乐齐"]),
                sub_clearing: false,
            },
            Merchant {
                name: "JD".to_string(),
                keywords: strings(&["京东", "JD", "jd.com"]),
                sub_clearing: true,
            },
        ];

        Self {
            wallets,
            direct_wallets,
            channels,
            banks,
            credit_keywords: strings(&["信用卡"]),
            debit_keywords: strings(&["储蓄卡"]),
            merchants,
            intermediary_keywords: strings(&["支付宝", "财付通", "微信", "alipay", "wechat", "tenpay"]),
        }
    }
}
