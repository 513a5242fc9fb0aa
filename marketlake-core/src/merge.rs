//! Cold (seed) and hot (partitioned) data combined behind one query.
//!
//! The cutover is the latest date the cold dataset covers. Cold rows are
//! read only when the query can reach them: no lower date bound, or a lower
//! bound at or before the cutover. Hot rows are always read. Both sides get
//! the same predicate and are combined by relaxed-schema union; rows for the
//! same `(entity, date)` from both sides are left for the consumer to
//! resolve.

use chrono::NaiveDate;
use polars::prelude::*;
use tracing::{info, warn};

use crate::data::connector::Scan;
use crate::data::frame;
use crate::data::layout::{self, COLD_SEED_PREFIX, HOT_TICKS_PREFIX};
use crate::data::Connection;
use crate::error::{ComputationError, LakeError};
use crate::filter::Predicate;

/// Where a merged series lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeSource {
    /// Prefix of single-object cold snapshots named `YYYY-MM-DD….parquet`.
    pub cold_prefix: &'static str,
    /// Prefix of the `year=/month=/day=` partitioned hot data.
    pub hot_prefix: &'static str,
    /// Date column of the cold rows.
    pub cold_date_column: &'static str,
}

/// Daily prices: seed bars plus live ticks.
pub const DAILY_PRICES: MergeSource = MergeSource {
    cold_prefix: COLD_SEED_PREFIX,
    hot_prefix: HOT_TICKS_PREFIX,
    cold_date_column: "date",
};

#[derive(Debug, Clone)]
pub struct MergeOutcome {
    /// Latest cold date; `None` when there is no cold data.
    pub cutover: Option<NaiveDate>,
    pub cold_included: bool,
    pub frame: DataFrame,
}

pub struct ColdHotMerger<'c> {
    conn: &'c Connection,
    source: MergeSource,
}

impl<'c> ColdHotMerger<'c> {
    pub fn new(conn: &'c Connection, source: MergeSource) -> Self {
        Self { conn, source }
    }

    /// Latest date covered by the cold dataset.
    ///
    /// Taken from the object names when every name carries a date, else from
    /// the cold date column.
    pub fn cutover(&self) -> Result<Option<NaiveDate>, LakeError> {
        let objects: Vec<String> = self
            .conn
            .list(self.source.cold_prefix)?
            .into_iter()
            .filter(|key| key.ends_with(".parquet"))
            .collect();
        if objects.is_empty() {
            return Ok(None);
        }

        let named: Option<Vec<NaiveDate>> =
            objects.iter().map(|key| layout::snapshot_date(key)).collect();
        if let Some(dates) = named {
            return Ok(dates.into_iter().max());
        }

        let cold = self.conn.execute(
            &Scan::prefix(self.source.cold_prefix).select([self.source.cold_date_column]),
            &Predicate::empty(),
        )?;
        if cold.height() == 0 {
            return Ok(None);
        }
        let dates = frame::dates(&cold, self.source.cold_date_column, self.conn.timezone())?;
        Ok(dates.into_iter().flatten().max())
    }

    /// Merge both sides unchanged.
    pub fn merge(&self, predicate: &Predicate) -> Result<MergeOutcome, LakeError> {
        self.merge_with(predicate, Ok)
    }

    /// Merge with `hot` applied to the hot rows before the union, e.g. to
    /// aggregate ticks into bars.
    pub fn merge_with<F>(&self, predicate: &Predicate, hot: F) -> Result<MergeOutcome, LakeError>
    where
        F: FnOnce(DataFrame) -> Result<DataFrame, LakeError>,
    {
        let cutover = self.cutover()?;
        let date_from = predicate.value("date_from").and_then(|v| v.as_date());

        let cold_included = match cutover {
            None => {
                warn!(prefix = self.source.cold_prefix, "cold dataset absent, reading hot data only");
                false
            }
            Some(cut) => date_from.map_or(true, |from| from <= cut),
        };

        let mut frames = Vec::with_capacity(2);
        if cold_included {
            frames.push(
                self.conn
                    .execute(&Scan::prefix(self.source.cold_prefix), predicate)?,
            );
        }
        let hot_rows = self
            .conn
            .execute(&Scan::prefix(self.source.hot_prefix).hive(), predicate)?;
        frames.push(hot(hot_rows)?);

        let frame = frame::relaxed_union(frames)
            .map_err(|e| ComputationError::Frame(e.to_string()))?;
        info!(
            cutover = ?cutover,
            cold_included,
            rows = frame.height(),
            "cold/hot merge"
        );
        Ok(MergeOutcome {
            cutover,
            cold_included,
            frame,
        })
    }
}
