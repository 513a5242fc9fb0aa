//! Marketlake CLI: read, rank, append and probe commands over the lake.
//!
//! Commands:
//! - `bars`, `ticks`, `news`, `currencies`, `gold`, `metadata`, `summary`: reads
//! - `movers`: daily gainers and losers
//! - `append-gold`, `append-currency`: add a Parquet batch to a series
//! - `exists`: probe an object path
//! - `intervals`: backfill date chunks

mod log;

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use polars::prelude::DataFrame;
use std::path::{Path, PathBuf};
use tracing::debug;

use marketlake_core::config::StorageConfig;
use marketlake_core::data::frame::from_parquet_bytes;
use marketlake_core::intervals::{date_intervals, DEFAULT_CHUNK_MONTHS};
use marketlake_core::validate::parse_date;
use marketlake_core::{AppendReport, CurrencyTable, MarketLake, NewsSource, RangeQuery};

#[derive(Parser)]
#[command(
    name = "marketlake",
    about = "Marketlake CLI: hybrid cold/hot market data lake"
)]
struct Cli {
    /// Storage config file (TOML). Takes precedence over --root.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Object-store root (local path or file:// URL).
    #[arg(long, global = true)]
    root: Option<String>,

    /// IANA timezone, e.g. Europe/Warsaw.
    #[arg(long, global = true)]
    timezone: Option<String>,

    /// Debug logging on stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct RangeArgs {
    /// Entity filter (ISIN).
    #[arg(long)]
    entity: Option<String>,

    /// Inclusive lower date bound (YYYY-MM-DD).
    #[arg(long)]
    from: Option<String>,

    /// Inclusive upper date bound (YYYY-MM-DD).
    #[arg(long)]
    to: Option<String>,
}

impl RangeArgs {
    fn query(&self) -> Result<RangeQuery> {
        Ok(RangeQuery::parse(
            self.entity.as_deref(),
            self.from.as_deref(),
            self.to.as_deref(),
        )?)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Daily OHLC bars: cold seed plus aggregated live ticks.
    Bars {
        #[command(flatten)]
        range: RangeArgs,
    },

    /// Raw live ticks with their partition date.
    Ticks {
        #[command(flatten)]
        range: RangeArgs,
    },

    /// News articles, distinct by link, newest first.
    News {
        #[command(flatten)]
        range: RangeArgs,

        /// Single source: interia or bankier.
        #[arg(long)]
        source: Option<String>,

        /// Only articles dated today or later (ignores --from/--to).
        #[arg(long)]
        today: bool,
    },

    /// Currency rates of one table.
    Currencies {
        /// mid_market_rate, mid_market_rate_unpopular or bid_ask.
        #[arg(long, default_value = "mid_market_rate")]
        table: String,

        /// Currency code filter, e.g. USD.
        #[arg(long)]
        code: Option<String>,

        #[arg(long)]
        from: Option<String>,

        #[arg(long)]
        to: Option<String>,

        /// Print day-over-day changes instead of rates.
        #[arg(long)]
        changes: bool,
    },

    /// Gold prices.
    Gold {
        #[arg(long)]
        from: Option<String>,

        #[arg(long)]
        to: Option<String>,

        /// Print price changes instead of prices.
        #[arg(long)]
        changes: bool,

        /// Maximum number of change rows.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Latest company metadata snapshot.
    Metadata {
        /// Single entity (ISIN).
        #[arg(long)]
        entity: Option<String>,

        /// Print only the entity identifiers.
        #[arg(long)]
        ids: bool,
    },

    /// Daily gainers and losers as JSON.
    Movers {
        #[arg(long)]
        from: Option<String>,

        #[arg(long)]
        to: Option<String>,
    },

    /// Most recent generated summary.
    Summary,

    /// Append a Parquet batch to the gold series.
    AppendGold {
        /// Parquet file with `date` and `price`.
        file: PathBuf,

        /// Overwrite the stored series instead of appending.
        #[arg(long)]
        replace: bool,
    },

    /// Append a Parquet batch to a currency table.
    AppendCurrency {
        #[arg(long, default_value = "mid_market_rate")]
        table: String,

        /// Parquet file with currency rows.
        file: PathBuf,

        /// Overwrite the stored table instead of appending.
        #[arg(long)]
        replace: bool,
    },

    /// Report whether an object exists under the root.
    Exists {
        /// Object path relative to the root.
        path: String,
    },

    /// Split a date range into backfill chunks.
    Intervals {
        #[arg(long)]
        start: String,

        /// Defaults to today.
        #[arg(long)]
        end: Option<String>,

        #[arg(long, default_value_t = DEFAULT_CHUNK_MONTHS)]
        months: u32,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    log::init_logging(cli.verbose);

    let lake = || open_lake(cli.config.as_ref(), cli.root.as_deref(), cli.timezone.as_deref());

    match cli.command {
        Commands::Bars { range } => print_frame(&lake()?.daily_bars(&range.query()?)?),
        Commands::Ticks { range } => print_frame(&lake()?.ticks(&range.query()?)?),
        Commands::News {
            range,
            source,
            today,
        } => {
            let lake = lake()?;
            let source = source
                .as_deref()
                .map(str::parse::<NewsSource>)
                .transpose()?;
            let df = if today {
                let today = Utc::now().with_timezone(&lake.timezone()).date_naive();
                lake.today_news(range.entity.as_deref(), source, today)?
            } else {
                lake.news(&range.query()?, source)?
            };
            print_frame(&df)
        }
        Commands::Currencies {
            table,
            code,
            from,
            to,
            changes,
        } => {
            let table: CurrencyTable = table.parse()?;
            let lake = lake()?;
            let query = RangeQuery::parse(code.as_deref(), from.as_deref(), to.as_deref())?;
            if changes {
                print_json(&lake.currency_changes(table, &query)?)
            } else {
                print_frame(&lake.currencies(table, &query)?)
            }
        }
        Commands::Gold {
            from,
            to,
            changes,
            limit,
        } => {
            let lake = lake()?;
            let query = RangeQuery::parse(None, from.as_deref(), to.as_deref())?;
            if changes {
                print_json(&lake.gold_changes(&query, limit)?)
            } else {
                if limit.is_some() {
                    bail!("--limit only applies with --changes");
                }
                print_frame(&lake.gold_prices(&query)?)
            }
        }
        Commands::Metadata { entity, ids } => {
            let lake = lake()?;
            if ids {
                if entity.is_some() {
                    bail!("--ids and --entity are mutually exclusive");
                }
                for id in lake.latest_entity_ids()? {
                    println!("{id}");
                }
                Ok(())
            } else {
                print_frame(&lake.companies_metadata(entity.as_deref())?)
            }
        }
        Commands::Movers { from, to } => {
            let lake = lake()?;
            let query = RangeQuery::parse(None, from.as_deref(), to.as_deref())?;
            print_json(&lake.movers(&query)?)
        }
        Commands::Summary => match lake()?.latest_summary()? {
            Some(df) => print_frame(&df),
            None => {
                println!("No summaries stored.");
                Ok(())
            }
        },
        Commands::AppendGold { file, replace } => {
            let lake = lake()?;
            let batch = read_batch(&file)?;
            let report = if replace {
                lake.replace_gold(&batch)?
            } else {
                lake.append_gold(&batch)?
            };
            print_report(&report)
        }
        Commands::AppendCurrency {
            table,
            file,
            replace,
        } => {
            let lake = lake()?;
            let table: CurrencyTable = table.parse()?;
            let batch = read_batch(&file)?;
            let report = if replace {
                lake.replace_currency(table, &batch)?
            } else {
                lake.append_currency(table, &batch)?
            };
            print_report(&report)
        }
        Commands::Exists { path } => {
            let lake = lake()?;
            let found = lake.exists(&path)?;
            println!("{path}: {}", if found { "present" } else { "absent" });
            if !found {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Intervals { start, end, months } => run_intervals(&start, end.as_deref(), months),
    }
}

fn open_lake(
    config: Option<&PathBuf>,
    root: Option<&str>,
    timezone: Option<&str>,
) -> Result<MarketLake> {
    let mut storage = match (config, root) {
        (Some(path), _) => StorageConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        (None, Some(root)) => StorageConfig::local(root),
        (None, None) => bail!("one of --config or --root is required"),
    };
    if let Some(tz) = timezone {
        storage = storage.with_timezone(tz);
    }
    debug!(root = %storage.root, timezone = %storage.timezone, "opening lake");
    Ok(MarketLake::new(storage)?)
}

fn run_intervals(start: &str, end: Option<&str>, months: u32) -> Result<()> {
    let start = parse_date(start)?;
    let end: NaiveDate = match end {
        Some(raw) => parse_date(raw)?,
        None => Utc::now().date_naive(),
    };
    for (from, to) in date_intervals(start, end, months)? {
        println!("{from} {to}");
    }
    Ok(())
}

fn read_batch(path: &Path) -> Result<DataFrame> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(from_parquet_bytes(bytes)?)
}

fn print_frame(df: &DataFrame) -> Result<()> {
    if df.height() == 0 {
        println!("No rows.");
    } else {
        println!("{df}");
    }
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_report(report: &AppendReport) -> Result<()> {
    println!(
        "{}: {} prior + {} fresh -> {} written ({} duplicates dropped)",
        report.object,
        report.prior_rows,
        report.fresh_rows,
        report.written_rows,
        report.duplicates_dropped
    );
    Ok(())
}
