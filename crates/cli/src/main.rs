// paychain - reconcile normalized payment records from several sources

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_subscriber::EnvFilter;

use paychain_core::{DateRange, SourceId, Transaction};
use paychain_import::{
    MatchResult, MatchingOutput, PaymentResolver, Pipeline, PipelineOutput, ReconcileConfig,
    SourceBatch,
};

#[derive(Parser)]
#[command(name = "paychain")]
#[command(about = "Link payments across wallet, merchant and bank exports")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full reconciliation and write entries plus statistics as JSON
    #[command(after_help = "\
Examples:
  paychain reconcile -i bundle.json
  paychain reconcile -i bundle.json -c paychain.toml --years 2023:2025 -o out.json")]
    Reconcile {
        /// JSON bundle: {\"sources\": [{\"name\": .., \"transactions\": [..]}]}
        #[arg(long, short = 'i')]
        input: PathBuf,

        /// TOML configuration (defaults apply when omitted)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Keep records dated in [START-01-01, END-01-01)
        #[arg(long, value_name = "START:END")]
        years: Option<String>,

        /// Output file (stdout when omitted)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Report cross-source pairs found by the matching engine
    Match {
        #[arg(long, short = 'i')]
        input: PathBuf,

        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        #[arg(long, value_name = "START:END")]
        years: Option<String>,
    },

    /// Resolve one payment-method string to an account
    Resolve {
        /// Payment method as printed in the export, e.g. 招商银行信用卡(0913)
        payment: String,

        /// Clearing platform code, e.g. WX
        #[arg(long, short = 'p')]
        platform: String,

        /// Account returned when nothing matches
        #[arg(long)]
        fallback: Option<String>,

        /// Resolve to real accounts instead of clearing accounts
        #[arg(long)]
        direct: bool,

        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },
}

#[derive(Debug, Deserialize)]
struct Bundle {
    sources: Vec<BundleSource>,
}

#[derive(Debug, Deserialize)]
struct BundleSource {
    name: String,
    #[serde(default)]
    transactions: Vec<Transaction>,
}

#[derive(Serialize)]
struct MatchReport<'a> {
    matched: Vec<MatchLine<'a>>,
    unmatched: usize,
}

#[derive(Serialize)]
struct MatchLine<'a> {
    #[serde(flatten)]
    result: &'a MatchResult,
    left: String,
    right: String,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Reconcile {
            input,
            config,
            years,
            output,
        } => cmd_reconcile(&input, config.as_deref(), years.as_deref(), output.as_deref()),
        Commands::Match {
            input,
            config,
            years,
        } => cmd_match(&input, config.as_deref(), years.as_deref()),
        Commands::Resolve {
            payment,
            platform,
            fallback,
            direct,
            config,
        } => cmd_resolve(&payment, &platform, fallback, direct, config.as_deref()),
    }
}

fn cmd_reconcile(
    input: &Path,
    config: Option<&Path>,
    years: Option<&str>,
    output: Option<&Path>,
) -> Result<()> {
    let config = load_config(config)?;
    let range = parse_range(years)?;
    let batches = load_bundle(input)?;
    let result = Pipeline::new(&config).run(batches, range);
    info!("{}", summary(&result));
    write_json(&result, output)
}

fn cmd_match(input: &Path, config: Option<&Path>, years: Option<&str>) -> Result<()> {
    let config = load_config(config)?;
    let range = parse_range(years)?;
    let pipeline = Pipeline::new(&config);
    let transactions = pipeline.prepare(load_bundle(input)?, range);
    let out = pipeline.analyze(&transactions);
    write_json(&match_report(&transactions, &out), None)
}

fn parse_range(years: Option<&str>) -> Result<Option<DateRange>> {
    let range = years
        .map(DateRange::parse_years)
        .transpose()
        .context("Invalid --years value")?;
    if let Some(range) = range {
        info!(%range, "restricting records to date range");
    }
    Ok(range)
}

fn match_report<'a>(transactions: &[Transaction], out: &'a MatchingOutput) -> MatchReport<'a> {
    let label = |i: usize| {
        let tx = &transactions[i];
        format!(
            "{} {} {} {} {}",
            tx.date.date(),
            tx.amount,
            tx.currency,
            tx.source_account,
            tx.description().trim()
        )
    };
    MatchReport {
        matched: out
            .matched
            .iter()
            .map(|m| MatchLine {
                result: m,
                left: label(m.a),
                right: label(m.b),
            })
            .collect(),
        unmatched: out.unmatched.len(),
    }
}

fn cmd_resolve(
    payment: &str,
    platform: &str,
    fallback: Option<String>,
    direct: bool,
    config: Option<&Path>,
) -> Result<()> {
    let config = load_config(config)?;
    let resolver = PaymentResolver::new(&config.tables, config.resolver.default_card);
    let account = if direct {
        let fallback = fallback.unwrap_or_else(|| format!("Assets:{platform}:Unknown"));
        resolver.resolve_direct(payment, &fallback)
    } else {
        let fallback = fallback.unwrap_or_else(|| format!("Assets:Clearing:{platform}:Unknown"));
        resolver.resolve(payment, platform, &fallback)
    };
    println!("{account}");
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<ReconcileConfig> {
    match path {
        Some(path) => ReconcileConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(ReconcileConfig::default()),
    }
}

/// Parse a bundle, handing out source handles in file order and stamping
/// them on every record.
fn parse_bundle(json: &str) -> Result<Vec<SourceBatch>> {
    let bundle: Bundle = serde_json::from_str(json).context("Malformed bundle JSON")?;
    Ok(bundle
        .sources
        .into_iter()
        .enumerate()
        .map(|(i, source)| {
            let id = SourceId(i as u32);
            let transactions = source
                .transactions
                .into_iter()
                .map(|mut tx| {
                    tx.source = id;
                    tx
                })
                .collect();
            SourceBatch {
                source: id,
                name: source.name,
                transactions,
            }
        })
        .collect())
}

fn load_bundle(path: &Path) -> Result<Vec<SourceBatch>> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let batches =
        parse_bundle(&json).with_context(|| format!("Failed to parse {}", path.display()))?;
    info!(
        sources = batches.len(),
        records = batches.iter().map(|b| b.transactions.len()).sum::<usize>(),
        "bundle loaded"
    );
    Ok(batches)
}

fn write_json<T: Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => std::fs::write(path, json + "\n")
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => {
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{json}")?;
        }
    }
    Ok(())
}

fn summary(output: &PipelineOutput) -> String {
    let s = &output.stats;
    format!(
        "{} entries, {} chains, {} linked, {} unmatched",
        s.entries, s.clearing.chains, s.clearing.linked, s.clearing.unmatched_terminal
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUNDLE: &str = r#"{
        "sources": [
            {
                "name": "aldi",
                "transactions": [
                    {
                        "date": "2024-03-09T18:45:00",
                        "amount": "-141.80",
                        "currency": "CNY",
                        "payee": "ALDI",
                        "source_account": "Assets:Clearing:ALDI",
                        "tx_type": "expense",
                        "reference_id": "ALDI-77"
                    }
                ]
            },
            {
                "name": "wechat",
                "transactions": [
                    {
                        "date": "2024-03-09T18:46:00",
                        "amount": "-141.80",
                        "currency": "CNY",
                        "source_account": "Assets:Clearing:WX:CC:CMB",
                        "counter_account": "Assets:Clearing:ALDI",
                        "tx_type": "transfer",
                        "counterpart_ref": "ALDI-77"
                    }
                ]
            },
            { "name": "empty" }
        ]
    }"#;

    #[test]
    fn bundle_assigns_source_ids_in_order() {
        let batches = parse_bundle(BUNDLE).unwrap();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[1].name, "wechat");
        assert_eq!(batches[1].source, SourceId(1));
        assert_eq!(batches[1].transactions[0].source, SourceId(1));
        assert!(batches[2].transactions.is_empty());
    }

    #[test]
    fn bundle_reconciles_end_to_end() {
        let batches = parse_bundle(BUNDLE).unwrap();
        let out = Pipeline::new(&ReconcileConfig::default()).run(batches, None);
        assert_eq!(out.stats.clearing.chains, 1);
        assert_eq!(out.stats.clearing.linked, 2);
        assert_eq!(summary(&out), "2 entries, 1 chains, 2 linked, 0 unmatched");
    }

    #[test]
    fn match_pairs_records_after_normalization() {
        let bundle = r#"{
            "sources": [
                {
                    "name": "wechat",
                    "transactions": [
                        {
                            "date": "2024-05-02T10:00:00",
                            "amount": "-66.00",
                            "currency": "CNY",
                            "payee": "书店",
                            "source_account": "",
                            "tx_type": "expense",
                            "payment_method": "招商银行信用卡",
                            "reference_id": "ORD-1"
                        }
                    ]
                },
                {
                    "name": "alipay",
                    "transactions": [
                        {
                            "date": "2024-05-02T10:05:00",
                            "amount": "66.00",
                            "currency": "CNY",
                            "payee": "转账",
                            "source_account": "",
                            "tx_type": "income",
                            "payment_method": "余额",
                            "counterpart_ref": "ORD-1"
                        }
                    ]
                }
            ]
        }"#;
        let config = ReconcileConfig::from_toml(
            "[sources.wechat]\nplatform = \"WX\"\n\n[sources.alipay]\nplatform = \"Alipay\"\n",
        )
        .unwrap();
        let pipeline = Pipeline::new(&config);
        let transactions = pipeline.prepare(parse_bundle(bundle).unwrap(), None);
        let out = pipeline.analyze(&transactions);

        let report = match_report(&transactions, &out);
        assert_eq!(report.matched.len(), 1);
        assert_eq!(report.unmatched, 0);
        assert!(report.matched[0].left.contains("Assets:Clearing:WX:CC:CMB"));
        assert!(report.matched[0].right.contains("Assets:Alipay"));
    }

    #[test]
    fn malformed_bundle_is_an_error() {
        assert!(parse_bundle("{\"sources\": 3}").is_err());
    }

    #[test]
    fn load_bundle_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_bundle(&dir.path().join("nope.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read"));
    }

    #[test]
    fn write_json_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        write_json(&serde_json::json!({"ok": true}), Some(&path)).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"ok\": true"));
    }
}
