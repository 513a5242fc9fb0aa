//! The typed operations callers use: reads, derived views and writes.
//!
//! Every operation validates its inputs first, then opens exactly one
//! connection, does its work and releases the connection. Nothing is
//! retried; any failure aborts the operation without a partial result.

use chrono::NaiveDate;
use chrono_tz::Tz;
use polars::prelude::*;
use tracing::info;

use crate::append::{AppendReport, IncrementalAppender};
use crate::change::{ChangeCalculator, ChangeColumns, ChangeRecord};
use crate::config::StorageConfig;
use crate::data::connector::Scan;
use crate::data::layout::{self, CurrencyTable, NewsSource, GOLD_OBJECT, HOT_TICKS_PREFIX};
use crate::data::schema::SeriesSchema;
use crate::data::{Connection, Connector};
use crate::domain::bar::{bars_from_frame, bars_to_frame};
use crate::domain::entity::{meta_from_frame, meta_to_frame};
use crate::domain::news::{news_from_frame, news_to_frame};
use crate::domain::tick::ticks_to_frame;
use crate::domain::{DailyBar, EntityMeta, NewsItem, PriceTick};
use crate::error::{ComputationError, LakeError};
use crate::filter::{FilterSpec, FilterValue, Predicate, CURRENCY, DATE_ENTITY, GOLD, METADATA, NEWS};
use crate::merge::{ColdHotMerger, DAILY_PRICES};
use crate::movers::{Movers, MoversRanker};
use crate::ohlc::OhlcAggregator;
use crate::validate::{self, ValidationError};

/// Entity and date-range filter shared by most reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeQuery {
    pub entity_id: Option<String>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

impl RangeQuery {
    /// No filter at all.
    pub fn all() -> Self {
        Self::default()
    }

    /// Parse raw request values. Dates must be `YYYY-MM-DD` and the range
    /// must not be inverted.
    pub fn parse(
        entity_id: Option<&str>,
        date_from: Option<&str>,
        date_to: Option<&str>,
    ) -> Result<Self, ValidationError> {
        let query = Self {
            entity_id: entity_id.map(String::from),
            date_from: validate::parse_optional_date(date_from)?,
            date_to: validate::parse_optional_date(date_to)?,
        };
        validate::validate_range(query.date_from, query.date_to)?;
        Ok(query)
    }

    pub fn entity(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn since(mut self, date: NaiveDate) -> Self {
        self.date_from = Some(date);
        self
    }

    pub fn until(mut self, date: NaiveDate) -> Self {
        self.date_to = Some(date);
        self
    }

    fn check(&self, entity: fn(&str) -> Result<(), ValidationError>) -> Result<(), ValidationError> {
        validate::validate_range(self.date_from, self.date_to)?;
        if let Some(id) = &self.entity_id {
            entity(id)?;
        }
        Ok(())
    }

    /// Build the predicate, binding the entity to `entity_param`.
    fn predicate(&self, spec: &FilterSpec, entity_param: &'static str) -> Result<Predicate, LakeError> {
        Ok(spec.build([
            ("date_from", self.date_from.map(FilterValue::from)),
            ("date_to", self.date_to.map(FilterValue::from)),
            (entity_param, self.entity_id.clone().map(FilterValue::from)),
        ])?)
    }
}

fn frame_err(e: PolarsError) -> LakeError {
    ComputationError::Frame(e.to_string()).into()
}

/// Market-data lake over one configured object-store root.
#[derive(Debug, Clone)]
pub struct MarketLake {
    connector: Connector,
}

impl MarketLake {
    pub fn new(config: StorageConfig) -> Result<Self, LakeError> {
        Ok(Self {
            connector: Connector::new(config)?,
        })
    }

    pub fn connector(&self) -> &Connector {
        &self.connector
    }

    pub fn timezone(&self) -> Tz {
        self.connector.timezone()
    }

    pub fn exists(&self, path: &str) -> Result<bool, LakeError> {
        self.connector
            .with_connection(|conn| conn.exists(path).map_err(LakeError::from))
    }

    // ── Prices ──────────────────────────────────────────────────────

    /// Daily bars: live ticks aggregated per day plus the seed bars, sorted
    /// by entity then date.
    pub fn daily_bars(&self, query: &RangeQuery) -> Result<DataFrame, LakeError> {
        query.check(validate::validate_isin)?;
        let predicate = query.predicate(&DATE_ENTITY, "entity_id")?;
        self.connector
            .with_connection(|conn| daily_bars_on(conn, &predicate))
    }

    pub fn daily_bar_rows(&self, query: &RangeQuery) -> Result<Vec<DailyBar>, LakeError> {
        let df = self.daily_bars(query)?;
        Ok(bars_from_frame(&df, self.timezone())?)
    }

    /// Raw live ticks with their partition columns.
    pub fn ticks(&self, query: &RangeQuery) -> Result<DataFrame, LakeError> {
        query.check(validate::validate_isin)?;
        let predicate = query.predicate(&DATE_ENTITY, "entity_id")?;
        self.connector.with_connection(|conn| {
            Ok(conn.execute(&Scan::prefix(HOT_TICKS_PREFIX).hive(), &predicate)?)
        })
    }

    /// Latest gainers and losers among entities with metadata.
    pub fn movers(&self, query: &RangeQuery) -> Result<Movers, LakeError> {
        query.check(validate::validate_isin)?;
        let predicate = query.predicate(&DATE_ENTITY, "entity_id")?;
        let tz = self.timezone();
        self.connector.with_connection(|conn| {
            let bars = daily_bars_on(conn, &predicate)?;
            let changes = ChangeCalculator::daily_close().compute_frame(
                &bars,
                &ChangeColumns::DAILY_CLOSE,
                tz,
            )?;
            let meta = meta_from_frame(&metadata_on(conn, &Predicate::empty())?)?;
            Ok(MoversRanker::new().rank(&changes, &meta))
        })
    }

    // ── News ────────────────────────────────────────────────────────

    /// Articles from one source or all, one row per link, newest
    /// ingestion partition first.
    pub fn news(&self, query: &RangeQuery, source: Option<NewsSource>) -> Result<DataFrame, LakeError> {
        query.check(validate::validate_isin)?;
        let predicate = query.predicate(&NEWS, "entity_id")?;
        let tz = self.timezone();
        self.connector.with_connection(|conn| {
            let mut scan = Scan::prefix(layout::NEWS_PREFIX).hive();
            if let Some(source) = source {
                scan = scan.file_name(source.file_name());
            }
            let raw = conn.execute(&scan, &predicate)?;
            if raw.height() == 0 {
                return Ok(news_to_frame(&[])?);
            }
            let columns: Vec<Expr> = SeriesSchema::News
                .fields(tz.name())
                .iter()
                .map(|f| col(f.name().clone()))
                .collect();
            SeriesSchema::News
                .conform(&raw, tz.name())?
                .lazy()
                .sort(
                    [layout::PARTITION_DATE],
                    SortMultipleOptions::default()
                        .with_order_descending(true)
                        .with_maintain_order(true),
                )
                .unique_stable(Some(vec!["link".into()]), UniqueKeepStrategy::First)
                .select(columns)
                .collect()
                .map_err(frame_err)
        })
    }

    pub fn news_rows(
        &self,
        query: &RangeQuery,
        source: Option<NewsSource>,
    ) -> Result<Vec<NewsItem>, LakeError> {
        let df = self.news(query, source)?;
        Ok(news_from_frame(&df, self.timezone())?)
    }

    /// Articles dated `today` or later.
    pub fn today_news(
        &self,
        entity_id: Option<&str>,
        source: Option<NewsSource>,
        today: NaiveDate,
    ) -> Result<DataFrame, LakeError> {
        let mut query = RangeQuery::all().since(today);
        query.entity_id = entity_id.map(String::from);
        self.news(&query, source)
    }

    // ── Currencies and gold ─────────────────────────────────────────

    /// Rates of one table; the query entity is a currency code.
    pub fn currencies(&self, table: CurrencyTable, query: &RangeQuery) -> Result<DataFrame, LakeError> {
        query.check(validate::validate_currency_code)?;
        let predicate = query.predicate(&CURRENCY, "code")?;
        let tz = self.timezone();
        self.connector.with_connection(|conn| {
            let df = conn.execute(&Scan::object(table.object()), &predicate)?;
            Ok(SeriesSchema::Currency.conform(&df, tz.name())?)
        })
    }

    /// Day-over-day change per currency code, newest first.
    pub fn currency_changes(
        &self,
        table: CurrencyTable,
        query: &RangeQuery,
    ) -> Result<Vec<ChangeRecord>, LakeError> {
        let df = self.currencies(table, query)?;
        Ok(ChangeCalculator::currency().compute_frame(&df, &ChangeColumns::CURRENCY, self.timezone())?)
    }

    /// Gold prices. The gold series has no entity; setting one is rejected
    /// as an unknown filter parameter.
    pub fn gold_prices(&self, query: &RangeQuery) -> Result<DataFrame, LakeError> {
        query.check(|_| Ok(()))?;
        let predicate = query.predicate(&GOLD, "entity_id")?;
        let tz = self.timezone();
        self.connector.with_connection(|conn| {
            let df = conn.execute(&Scan::object(GOLD_OBJECT), &predicate)?;
            Ok(SeriesSchema::Gold.conform(&df, tz.name())?)
        })
    }

    /// Gold price changes, newest first, cut to `limit` rows.
    pub fn gold_changes(
        &self,
        query: &RangeQuery,
        limit: Option<usize>,
    ) -> Result<Vec<ChangeRecord>, LakeError> {
        let df = self.gold_prices(query)?;
        Ok(ChangeCalculator::gold()
            .with_limit(limit)
            .compute_frame(&df, &ChangeColumns::GOLD, self.timezone())?)
    }

    // ── Reference data ──────────────────────────────────────────────

    /// Rows of the most recent metadata snapshot, optionally one entity.
    pub fn companies_metadata(&self, entity_id: Option<&str>) -> Result<DataFrame, LakeError> {
        if let Some(id) = entity_id {
            validate::validate_isin(id)?;
        }
        let predicate = METADATA.build([("entity_id", entity_id.map(FilterValue::from))])?;
        self.connector
            .with_connection(|conn| metadata_on(conn, &predicate))
    }

    pub fn latest_entity_ids(&self) -> Result<Vec<String>, LakeError> {
        let df = self.companies_metadata(None)?;
        Ok(meta_from_frame(&df)?
            .into_iter()
            .map(|m| m.entity_id)
            .collect())
    }

    /// The most recent row of the summaries series, if there is one.
    pub fn latest_summary(&self) -> Result<Option<DataFrame>, LakeError> {
        self.connector.with_connection(|conn| {
            let df = conn.execute(&Scan::prefix(layout::SUMMARIES_PREFIX), &Predicate::empty())?;
            if df.height() == 0 {
                return Ok(None);
            }
            let latest = df
                .lazy()
                .sort(
                    ["date"],
                    SortMultipleOptions::default()
                        .with_order_descending(true)
                        .with_nulls_last(true)
                        .with_maintain_order(true),
                )
                .limit(1)
                .collect()
                .map_err(frame_err)?;
            Ok(Some(latest))
        })
    }

    // ── Writes ──────────────────────────────────────────────────────

    /// Overwrite one day's live tick partition. Returns the object path.
    pub fn write_tick_partition(&self, ticks: &[PriceTick], day: NaiveDate) -> Result<String, LakeError> {
        for tick in ticks {
            validate::validate_isin(&tick.entity_id)?;
        }
        let df = ticks_to_frame(ticks, self.timezone())?;
        let path = layout::tick_partition_object(day);
        self.connector.with_connection(|conn| {
            conn.write(&df, &path)?;
            info!(object = %path, rows = df.height(), "tick partition written");
            Ok(path.clone())
        })
    }

    /// Write a seed snapshot of daily bars as of `as_of`.
    pub fn write_seed(&self, bars: &[DailyBar], as_of: NaiveDate) -> Result<String, LakeError> {
        for bar in bars {
            validate::validate_isin(&bar.entity_id)?;
        }
        let df = bars_to_frame(bars)?;
        let path = layout::seed_object(as_of);
        self.connector.with_connection(|conn| {
            conn.write(&df, &path)?;
            info!(object = %path, rows = df.height(), "seed written");
            Ok(path.clone())
        })
    }

    /// Add articles to one source's partition for `day`; links stay unique.
    pub fn append_news(
        &self,
        items: &[NewsItem],
        source: NewsSource,
        day: NaiveDate,
    ) -> Result<AppendReport, LakeError> {
        for item in items {
            for id in &item.matched_entities {
                validate::validate_isin(id)?;
            }
        }
        let fresh = news_to_frame(items)?;
        let path = source.object(day);
        self.connector.with_connection(|conn| {
            IncrementalAppender::for_series(SeriesSchema::News).append(conn, &path, &fresh)
        })
    }

    /// Append rates to a currency table. Re-appending a covered range
    /// duplicates rows.
    pub fn append_currency(&self, table: CurrencyTable, fresh: &DataFrame) -> Result<AppendReport, LakeError> {
        self.connector.with_connection(|conn| {
            IncrementalAppender::for_series(SeriesSchema::Currency).append(conn, &table.object(), fresh)
        })
    }

    /// Replace a currency table wholesale, e.g. after a backfill.
    pub fn replace_currency(&self, table: CurrencyTable, fresh: &DataFrame) -> Result<AppendReport, LakeError> {
        self.connector.with_connection(|conn| {
            IncrementalAppender::for_series(SeriesSchema::Currency).replace(conn, &table.object(), fresh)
        })
    }

    pub fn append_gold(&self, fresh: &DataFrame) -> Result<AppendReport, LakeError> {
        self.connector.with_connection(|conn| {
            IncrementalAppender::for_series(SeriesSchema::Gold).append(conn, GOLD_OBJECT, fresh)
        })
    }

    pub fn replace_gold(&self, fresh: &DataFrame) -> Result<AppendReport, LakeError> {
        self.connector.with_connection(|conn| {
            IncrementalAppender::for_series(SeriesSchema::Gold).replace(conn, GOLD_OBJECT, fresh)
        })
    }

    /// Write a metadata snapshot dated `as_of`.
    pub fn write_metadata_snapshot(&self, meta: &[EntityMeta], as_of: NaiveDate) -> Result<String, LakeError> {
        for m in meta {
            validate::validate_isin(&m.entity_id)?;
        }
        let df = meta_to_frame(meta, as_of)?;
        let path = layout::metadata_object(as_of);
        self.connector.with_connection(|conn| {
            conn.write(&df, &path)?;
            info!(object = %path, rows = df.height(), "metadata snapshot written");
            Ok(path.clone())
        })
    }
}

fn daily_bars_on(conn: &Connection, predicate: &Predicate) -> Result<DataFrame, LakeError> {
    let tz = conn.timezone();
    let aggregator = OhlcAggregator::new(tz);
    let outcome = ColdHotMerger::new(conn, DAILY_PRICES)
        .merge_with(predicate, |ticks| {
            aggregator.aggregate_frame(&ticks).map_err(LakeError::from)
        })?;

    let columns: Vec<Expr> = SeriesSchema::DailyBar
        .fields(tz.name())
        .iter()
        .map(|f| col(f.name().clone()))
        .collect();
    SeriesSchema::DailyBar
        .conform(&outcome.frame, tz.name())?
        .lazy()
        .select(columns)
        .sort(
            ["entity_id", "date"],
            SortMultipleOptions::default().with_maintain_order(true),
        )
        .collect()
        .map_err(frame_err)
}

fn metadata_on(conn: &Connection, predicate: &Predicate) -> Result<DataFrame, LakeError> {
    let tz = conn.timezone();
    let all = conn.execute(&Scan::prefix(layout::METADATA_PREFIX), &Predicate::empty())?;
    let all = SeriesSchema::Metadata.conform(&all, tz.name())?;
    if all.height() == 0 {
        return Ok(all);
    }

    let mut lf = all
        .lazy()
        .filter(col("date").eq(col("date").max()));
    if let Some(expr) = predicate.to_expr() {
        lf = lf.filter(expr);
    }
    lf.collect().map_err(frame_err)
}
