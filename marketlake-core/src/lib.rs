//! Marketlake Core: hybrid cold/hot market-data access over an object store.
//!
//! This crate contains:
//! - Whitelisted filter predicates (no caller text reaches a query)
//! - The storage connector: object stores, layout, canonical schemas
//! - Cold/hot merging of seed and live partitioned data
//! - Daily OHLC aggregation, period-over-period changes and movers ranking
//! - Incremental appends with natural-key deduplication
//! - [`MarketLake`], the typed read and write operations

pub mod append;
pub mod change;
pub mod config;
pub mod data;
pub mod domain;
pub mod error;
pub mod filter;
pub mod intervals;
pub mod lake;
pub mod merge;
pub mod movers;
pub mod ohlc;
pub mod validate;

pub use append::{AppendReport, IncrementalAppender, KeyPolicy};
pub use change::{ChangeCalculator, ChangeRecord, Precision, SeriesPoint};
pub use config::{ConfigError, StorageConfig};
pub use data::{Connection, Connector, CurrencyTable, NewsSource, Scan, StorageError};
pub use domain::{DailyBar, EntityMeta, NewsItem, PriceTick};
pub use error::{ComputationError, LakeError};
pub use filter::{FilterError, FilterSpec, FilterValue, Predicate};
pub use lake::{MarketLake, RangeQuery};
pub use merge::{ColdHotMerger, MergeOutcome};
pub use movers::{Mover, MoverKind, Movers, MoversRanker};
pub use ohlc::OhlcAggregator;
pub use validate::ValidationError;
