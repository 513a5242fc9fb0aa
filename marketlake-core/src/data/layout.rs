//! Persisted object layout for every logical series.
//!
//! - hot ticks:   `ohlc/year={Y}/month={M}/day={D}/ticks.parquet`
//! - cold seed:   `ohlc_seed/{YYYY-MM-DD}.parquet`
//! - currencies:  `currencies/{table}.parquet`
//! - gold:        `gold_prices/gold_prices.parquet`
//! - news:        `news/year={Y}/month={M}/day={D}/{Source}Source.parquet`
//! - metadata:    `companies_metadata/{YYYY-MM-DD}.parquet`
//! - summaries:   `llm_summaries/**.parquet`
//!
//! Partition values are not zero-padded (`month=5`).

use chrono::{Datelike, NaiveDate};
use std::fmt;
use std::str::FromStr;

use crate::validate::ValidationError;

pub const HOT_TICKS_PREFIX: &str = "ohlc";
pub const COLD_SEED_PREFIX: &str = "ohlc_seed";
pub const CURRENCIES_PREFIX: &str = "currencies";
pub const GOLD_OBJECT: &str = "gold_prices/gold_prices.parquet";
pub const NEWS_PREFIX: &str = "news";
pub const METADATA_PREFIX: &str = "companies_metadata";
pub const SUMMARIES_PREFIX: &str = "llm_summaries";

const TICKS_FILE: &str = "ticks.parquet";

/// Date column derived from the `year=/month=/day=` segments on read.
pub const PARTITION_DATE: &str = "partition_date";

/// `{prefix}/year={Y}/month={M}/day={D}`
pub fn day_partition(prefix: &str, day: NaiveDate) -> String {
    format!(
        "{prefix}/year={}/month={}/day={}",
        day.year(),
        day.month(),
        day.day()
    )
}

pub fn tick_partition_object(day: NaiveDate) -> String {
    format!("{}/{TICKS_FILE}", day_partition(HOT_TICKS_PREFIX, day))
}

pub fn seed_object(as_of: NaiveDate) -> String {
    format!("{COLD_SEED_PREFIX}/{as_of}.parquet")
}

pub fn metadata_object(as_of: NaiveDate) -> String {
    format!("{METADATA_PREFIX}/{as_of}.parquet")
}

/// Currency rate tables published by the central bank source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CurrencyTable {
    MidMarketRate,
    MidMarketRateUnpopular,
    BidAsk,
}

impl CurrencyTable {
    pub const ALL: [CurrencyTable; 3] = [
        CurrencyTable::MidMarketRate,
        CurrencyTable::MidMarketRateUnpopular,
        CurrencyTable::BidAsk,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CurrencyTable::MidMarketRate => "mid_market_rate",
            CurrencyTable::MidMarketRateUnpopular => "mid_market_rate_unpopular",
            CurrencyTable::BidAsk => "bid_ask",
        }
    }

    pub fn object(self) -> String {
        format!("{CURRENCIES_PREFIX}/{}.parquet", self.as_str())
    }
}

impl fmt::Display for CurrencyTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CurrencyTable {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CurrencyTable::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownName {
                kind: "currency table",
                value: s.to_string(),
            })
    }
}

/// News feeds, one object per feed per ingestion day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NewsSource {
    Interia,
    Bankier,
}

impl NewsSource {
    pub fn as_str(self) -> &'static str {
        match self {
            NewsSource::Interia => "interia",
            NewsSource::Bankier => "bankier",
        }
    }

    /// `InteriaSource.parquet`
    pub fn file_name(self) -> &'static str {
        match self {
            NewsSource::Interia => "InteriaSource.parquet",
            NewsSource::Bankier => "BankierSource.parquet",
        }
    }

    pub fn object(self, day: NaiveDate) -> String {
        format!("{}/{}", day_partition(NEWS_PREFIX, day), self.file_name())
    }
}

impl FromStr for NewsSource {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "interia" => Ok(NewsSource::Interia),
            "bankier" => Ok(NewsSource::Bankier),
            _ => Err(ValidationError::UnknownName {
                kind: "news source",
                value: s.to_string(),
            }),
        }
    }
}

/// Hive `key=value` segments of an object key, in path order.
pub fn partition_values(key: &str) -> Vec<(String, String)> {
    key.split('/')
        .filter_map(|seg| {
            let (k, v) = seg.split_once('=')?;
            if k.is_empty() {
                None
            } else {
                Some((k.to_string(), v.to_string()))
            }
        })
        .collect()
}

/// Calendar day encoded by `year=/month=/day=` segments, if all three parse.
pub fn partition_date(key: &str) -> Option<NaiveDate> {
    let parts = partition_values(key);
    let get = |name: &str| {
        parts
            .iter()
            .find(|(k, _)| k == name)
            .and_then(|(_, v)| v.parse::<u32>().ok())
    };
    NaiveDate::from_ymd_opt(get("year")? as i32, get("month")?, get("day")?)
}

/// Date carried by a snapshot object name: the first ten characters of the
/// file stem, e.g. `2024-05-01.parquet` or `2024-05-01T10:00:00.parquet`.
pub fn snapshot_date(key: &str) -> Option<NaiveDate> {
    let file = key.rsplit('/').next()?;
    let head = file.get(..10)?;
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

pub fn file_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn partition_paths_are_unpadded() {
        assert_eq!(
            tick_partition_object(d(2024, 5, 3)),
            "ohlc/year=2024/month=5/day=3/ticks.parquet"
        );
        assert_eq!(
            NewsSource::Bankier.object(d(2024, 12, 31)),
            "news/year=2024/month=12/day=31/BankierSource.parquet"
        );
        assert_eq!(seed_object(d(2024, 5, 3)), "ohlc_seed/2024-05-03.parquet");
        assert_eq!(
            CurrencyTable::BidAsk.object(),
            "currencies/bid_ask.parquet"
        );
    }

    #[test]
    fn parses_partition_segments() {
        let key = "news/year=2024/month=5/day=3/InteriaSource.parquet";
        assert_eq!(
            partition_values(key),
            vec![
                ("year".to_string(), "2024".to_string()),
                ("month".to_string(), "5".to_string()),
                ("day".to_string(), "3".to_string()),
            ]
        );
        assert_eq!(partition_date(key), Some(d(2024, 5, 3)));
        assert_eq!(partition_date("ohlc_seed/2024-05-03.parquet"), None);
    }

    #[test]
    fn snapshot_names_carry_dates() {
        assert_eq!(snapshot_date("ohlc_seed/2024-05-03.parquet"), Some(d(2024, 5, 3)));
        assert_eq!(
            snapshot_date("ohlc_seed/2024-05-03T10:11:12.123.parquet"),
            Some(d(2024, 5, 3))
        );
        assert_eq!(snapshot_date("ohlc_seed/history.parquet"), None);
    }

    #[test]
    fn names_parse() {
        assert_eq!("bid_ask".parse::<CurrencyTable>().unwrap(), CurrencyTable::BidAsk);
        assert!("gold".parse::<CurrencyTable>().is_err());
        assert_eq!("Interia".parse::<NewsSource>().unwrap(), NewsSource::Interia);
        assert!("reuters".parse::<NewsSource>().is_err());
    }
}
