//! Tick-to-daily-bar aggregation.
//!
//! Ticks are grouped by `(entity_id, trading day)`. Tick rows read from the
//! lake carry a `partition_date` and that is their trading day, the same date
//! the range filter sees. Ticks without one fall back to their calendar date
//! in the configured timezone. Per group:
//! - `open`: price at the earliest timestamp
//! - `close`: price at the latest timestamp
//! - `low` / `high`: min / max price
//! - `volume`: sum of volumes
//!
//! Timestamp ties: among ticks sharing the earliest timestamp the lowest
//! price opens; among ticks sharing the latest timestamp the highest price
//! closes. The result never depends on input order.

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use polars::prelude::*;
use std::collections::BTreeMap;

use crate::data::frame;
use crate::data::layout::PARTITION_DATE;
use crate::domain::bar::{bars_to_frame, DailyBar};
use crate::domain::tick::{ticks_from_frame, PriceTick};
use crate::error::ComputationError;

#[derive(Debug, Clone, Copy)]
pub struct OhlcAggregator {
    tz: Tz,
}

struct Accumulator {
    open_at: DateTime<Utc>,
    open: f64,
    close_at: DateTime<Utc>,
    close: f64,
    low: f64,
    high: f64,
    volume: i64,
}

impl Accumulator {
    fn new(tick: &PriceTick) -> Self {
        Self {
            open_at: tick.timestamp,
            open: tick.price,
            close_at: tick.timestamp,
            close: tick.price,
            low: tick.price,
            high: tick.price,
            volume: tick.volume,
        }
    }

    fn push(&mut self, row: usize, tick: &PriceTick) -> Result<(), ComputationError> {
        let (at, price) = (tick.timestamp, tick.price);
        if at < self.open_at || (at == self.open_at && price < self.open) {
            self.open_at = at;
            self.open = price;
        }
        if at > self.close_at || (at == self.close_at && price > self.close) {
            self.close_at = at;
            self.close = price;
        }
        self.low = self.low.min(price);
        self.high = self.high.max(price);
        self.volume = self
            .volume
            .checked_add(tick.volume)
            .ok_or_else(|| ComputationError::invalid(row, "volume sum overflows"))?;
        Ok(())
    }
}

impl OhlcAggregator {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// One bar per `(entity_id, day)` that has at least one tick, sorted by
    /// entity then day. Any malformed tick fails the whole batch.
    pub fn aggregate(&self, ticks: &[PriceTick]) -> Result<Vec<DailyBar>, ComputationError> {
        self.fold(ticks.iter().map(|tick| (tick.date_in(self.tz), tick)))
    }

    /// Like [`aggregate`](Self::aggregate), but each tick is booked on the
    /// day it is paired with instead of its timestamp's date.
    pub fn aggregate_on(
        &self,
        ticks: &[(NaiveDate, PriceTick)],
    ) -> Result<Vec<DailyBar>, ComputationError> {
        self.fold(ticks.iter().map(|(day, tick)| (*day, tick)))
    }

    fn fold<'a>(
        &self,
        rows: impl Iterator<Item = (NaiveDate, &'a PriceTick)>,
    ) -> Result<Vec<DailyBar>, ComputationError> {
        let mut groups: BTreeMap<(&str, NaiveDate), Accumulator> = BTreeMap::new();

        for (row, (day, tick)) in rows.enumerate() {
            check(row, tick)?;
            let key = (tick.entity_id.as_str(), day);
            match groups.get_mut(&key) {
                Some(acc) => acc.push(row, tick)?,
                None => {
                    groups.insert(key, Accumulator::new(tick));
                }
            }
        }

        Ok(groups
            .into_iter()
            .map(|((entity_id, date), acc)| DailyBar {
                entity_id: entity_id.to_string(),
                date,
                open: acc.open,
                high: acc.high,
                low: acc.low,
                close: acc.close,
                volume: acc.volume,
            })
            .collect())
    }

    /// Frame-level aggregation: tick rows in, canonical daily-bar frame out.
    /// Rows are booked on their `partition_date` when the frame has one.
    pub fn aggregate_frame(&self, df: &DataFrame) -> Result<DataFrame, ComputationError> {
        if df.height() == 0 {
            return bars_to_frame(&[]);
        }
        let ticks = ticks_from_frame(df)?;
        if df.column(PARTITION_DATE).is_err() {
            return bars_to_frame(&self.aggregate(&ticks)?);
        }
        let days = frame::dates(df, PARTITION_DATE, self.tz)?;
        let paired: Vec<(NaiveDate, PriceTick)> = days
            .into_iter()
            .zip(ticks)
            .map(|(day, tick)| (day.unwrap_or_else(|| tick.date_in(self.tz)), tick))
            .collect();
        bars_to_frame(&self.aggregate_on(&paired)?)
    }
}

fn check(row: usize, tick: &PriceTick) -> Result<(), ComputationError> {
    if tick.entity_id.is_empty() {
        return Err(ComputationError::invalid(row, "empty entity_id"));
    }
    if !tick.price.is_finite() {
        return Err(ComputationError::invalid(
            row,
            format!("price {} is not finite", tick.price),
        ));
    }
    if tick.volume < 0 {
        return Err(ComputationError::invalid(
            row,
            format!("negative volume {}", tick.volume),
        ));
    }
    Ok(())
}
