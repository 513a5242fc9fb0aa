//! DailyBar: one entity's aggregated OHLCV for one trading day.

use chrono::NaiveDate;
use chrono_tz::Tz;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::data::frame::{self, date_column, frame_err};
use crate::error::ComputationError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyBar {
    pub entity_id: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

impl DailyBar {
    /// high >= low and both bracket open and close.
    pub fn is_sane(&self) -> bool {
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
    }
}

/// Frame in the canonical daily-bar column order.
pub fn bars_to_frame(bars: &[DailyBar]) -> Result<DataFrame, ComputationError> {
    let dates: Vec<Option<NaiveDate>> = bars.iter().map(|b| Some(b.date)).collect();
    let ids: Vec<&str> = bars.iter().map(|b| b.entity_id.as_str()).collect();
    let opens: Vec<f64> = bars.iter().map(|b| b.open).collect();
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();
    let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
    let volumes: Vec<i64> = bars.iter().map(|b| b.volume).collect();

    DataFrame::new(vec![
        date_column("date", &dates).map_err(frame_err)?,
        Column::new("entity_id".into(), ids),
        Column::new("open".into(), opens),
        Column::new("close".into(), closes),
        Column::new("low".into(), lows),
        Column::new("high".into(), highs),
        Column::new("volume".into(), volumes),
    ])
    .map_err(frame_err)
}

/// Typed bars from a frame. Null OHLC or identity fields are invalid
/// records; a null volume reads as 0.
pub fn bars_from_frame(df: &DataFrame, tz: Tz) -> Result<Vec<DailyBar>, ComputationError> {
    let dates = frame::dates(df, "date", tz)?;
    let ids = frame::strings(df, "entity_id")?;
    let opens = frame::floats(df, "open")?;
    let highs = frame::floats(df, "high")?;
    let lows = frame::floats(df, "low")?;
    let closes = frame::floats(df, "close")?;
    let volumes = frame::ints(df, "volume")?;

    let mut bars = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let price = |values: &[Option<f64>], name: &str| {
            values[i].ok_or_else(|| ComputationError::invalid(i, format!("null {name}")))
        };
        bars.push(DailyBar {
            entity_id: ids[i]
                .clone()
                .ok_or_else(|| ComputationError::invalid(i, "null entity_id"))?,
            date: dates[i].ok_or_else(|| ComputationError::invalid(i, "null date"))?,
            open: price(&opens, "open")?,
            high: price(&highs, "high")?,
            low: price(&lows, "low")?,
            close: price(&closes, "close")?,
            volume: volumes[i].unwrap_or(0),
        });
    }
    Ok(bars)
}
