//! Period-over-period change of a value series.
//!
//! Within each partition (entity, currency code, or the whole series when
//! there is no partition) rows are ordered by date ascending and each row is
//! compared with the one before it:
//! - `change_pct = (value - prev_value) / prev_value * 100`, optionally rounded
//! - `is_rise = value > prev_value`, false for the first row and for ties
//!
//! Rows of one partition that share a date are chained by value ascending,
//! so the highest value closes the day. Output is ordered by date
//! descending, then partition ascending, then by that chain from last to
//! first, and cut to the row limit when one is set. Neither order depends on
//! the input order.

use chrono::NaiveDate;
use chrono_tz::Tz;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::data::frame::{self, date_column, frame_err};
use crate::error::ComputationError;

/// One observation of the input series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub entity_id: Option<String>,
    pub date: NaiveDate,
    pub value: f64,
}

impl SeriesPoint {
    pub fn new(entity_id: Option<&str>, date: NaiveDate, value: f64) -> Self {
        Self {
            entity_id: entity_id.map(String::from),
            date,
            value,
        }
    }
}

/// One computed change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub entity_id: Option<String>,
    pub date: NaiveDate,
    pub value: f64,
    pub prev_value: Option<f64>,
    pub change_pct: Option<f64>,
    pub is_rise: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Precision {
    Full,
    Decimals(u32),
}

impl Precision {
    fn apply(self, x: f64) -> f64 {
        match self {
            Precision::Full => x,
            Precision::Decimals(n) => {
                let scale = 10f64.powi(n as i32);
                (x * scale).round() / scale
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChangeCalculator {
    precision: Precision,
    limit: Option<usize>,
}

impl Default for ChangeCalculator {
    fn default() -> Self {
        Self {
            precision: Precision::Full,
            limit: None,
        }
    }
}

impl ChangeCalculator {
    pub fn new(precision: Precision, limit: Option<usize>) -> Self {
        Self { precision, limit }
    }

    /// Currency rates: 4 decimals, whole series.
    pub fn currency() -> Self {
        Self::new(Precision::Decimals(4), None)
    }

    /// Gold: full precision, latest change only.
    pub fn gold() -> Self {
        Self::new(Precision::Full, Some(1))
    }

    /// Daily closes for the movers ranking: 4 decimals, whole series.
    pub fn daily_close() -> Self {
        Self::new(Precision::Decimals(4), None)
    }

    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn compute(&self, points: &[SeriesPoint]) -> Result<Vec<ChangeRecord>, ComputationError> {
        let mut partitions: BTreeMap<Option<&str>, Vec<(usize, &SeriesPoint)>> = BTreeMap::new();
        for (row, point) in points.iter().enumerate() {
            if !point.value.is_finite() {
                return Err(ComputationError::invalid(
                    row,
                    format!("value {} is not finite", point.value),
                ));
            }
            partitions
                .entry(point.entity_id.as_deref())
                .or_default()
                .push((row, point));
        }

        let mut records = Vec::with_capacity(points.len());
        for (_, mut rows) in partitions {
            rows.sort_by(|(_, a), (_, b)| {
                a.date.cmp(&b.date).then(a.value.total_cmp(&b.value))
            });
            let mut prev: Option<f64> = None;
            for (_, point) in rows {
                let change_pct = prev
                    .filter(|p| *p != 0.0)
                    .map(|p| self.precision.apply((point.value - p) / p * 100.0));
                records.push(ChangeRecord {
                    entity_id: point.entity_id.clone(),
                    date: point.date,
                    value: point.value,
                    prev_value: prev,
                    change_pct,
                    is_rise: prev.is_some_and(|p| point.value > p),
                });
                prev = Some(point.value);
            }
        }

        records.sort_by(|a, b| {
            b.date
                .cmp(&a.date)
                .then_with(|| a.entity_id.cmp(&b.entity_id))
                .then(b.value.total_cmp(&a.value))
        });
        if let Some(limit) = self.limit {
            records.truncate(limit);
        }
        Ok(records)
    }

    /// Compute over frame columns; see [`points_from_frame`].
    pub fn compute_frame(
        &self,
        df: &DataFrame,
        columns: &ChangeColumns,
        tz: Tz,
    ) -> Result<Vec<ChangeRecord>, ComputationError> {
        let points = points_from_frame(df, columns, tz)?;
        self.compute(&points)
    }
}

/// Column names of a frame holding a value series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeColumns {
    pub date: &'static str,
    pub value: &'static str,
    pub partition: Option<&'static str>,
}

impl ChangeColumns {
    pub const CURRENCY: ChangeColumns = ChangeColumns {
        date: "effective_date",
        value: "mid",
        partition: Some("code"),
    };

    pub const GOLD: ChangeColumns = ChangeColumns {
        date: "date",
        value: "price",
        partition: None,
    };

    pub const DAILY_CLOSE: ChangeColumns = ChangeColumns {
        date: "date",
        value: "close",
        partition: Some("entity_id"),
    };
}

/// Series points from a frame. Rows with a null value carry no observation
/// and are skipped; a null date is an invalid record.
pub fn points_from_frame(
    df: &DataFrame,
    columns: &ChangeColumns,
    tz: Tz,
) -> Result<Vec<SeriesPoint>, ComputationError> {
    if df.height() == 0 {
        return Ok(Vec::new());
    }
    let dates = frame::dates(df, columns.date, tz)?;
    let values = frame::floats(df, columns.value)?;
    let partitions = match columns.partition {
        Some(name) => frame::strings(df, name)?,
        None => vec![None; df.height()],
    };

    let mut points = Vec::with_capacity(df.height());
    let mut skipped = 0usize;
    for i in 0..df.height() {
        let Some(value) = values[i] else {
            skipped += 1;
            continue;
        };
        let date = dates[i].ok_or_else(|| ComputationError::invalid(i, "null date"))?;
        points.push(SeriesPoint {
            entity_id: partitions[i].clone(),
            date,
            value,
        });
    }
    if skipped > 0 {
        debug!(column = columns.value, skipped, "rows without a value skipped");
    }
    Ok(points)
}

/// `entity_id, date, value, prev_value, change_pct, is_rise`.
pub fn records_to_frame(records: &[ChangeRecord]) -> Result<DataFrame, ComputationError> {
    let ids: Vec<Option<&str>> = records.iter().map(|r| r.entity_id.as_deref()).collect();
    let dates: Vec<Option<NaiveDate>> = records.iter().map(|r| Some(r.date)).collect();
    let values: Vec<f64> = records.iter().map(|r| r.value).collect();
    let prevs: Vec<Option<f64>> = records.iter().map(|r| r.prev_value).collect();
    let changes: Vec<Option<f64>> = records.iter().map(|r| r.change_pct).collect();
    let rises: Vec<bool> = records.iter().map(|r| r.is_rise).collect();

    DataFrame::new(vec![
        Column::new("entity_id".into(), ids),
        date_column("date", &dates).map_err(frame_err)?,
        Column::new("value".into(), values),
        Column::new("prev_value".into(), prevs),
        Column::new("change_pct".into(), changes),
        Column::new("is_rise".into(), rises),
    ])
    .map_err(frame_err)
}
