//! PriceTick: one intraday price observation.

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::data::frame::{self, frame_err};
use crate::error::ComputationError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceTick {
    pub entity_id: String,
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub volume: i64,
}

impl PriceTick {
    pub fn new(entity_id: impl Into<String>, timestamp: DateTime<Utc>, price: f64, volume: i64) -> Self {
        Self {
            entity_id: entity_id.into(),
            timestamp,
            price,
            volume,
        }
    }

    /// Trading day of the tick in `tz`.
    pub fn date_in(&self, tz: Tz) -> NaiveDate {
        self.timestamp.with_timezone(&tz).date_naive()
    }
}

/// Frame with the canonical tick schema; timestamps are labelled with `tz`.
pub fn ticks_to_frame(ticks: &[PriceTick], tz: Tz) -> Result<DataFrame, ComputationError> {
    let ids: Vec<&str> = ticks.iter().map(|t| t.entity_id.as_str()).collect();
    let micros: Vec<i64> = ticks.iter().map(|t| t.timestamp.timestamp_micros()).collect();
    let prices: Vec<f64> = ticks.iter().map(|t| t.price).collect();
    let volumes: Vec<i64> = ticks.iter().map(|t| t.volume).collect();

    let timestamp = Column::new("timestamp".into(), micros)
        .cast(&DataType::Datetime(TimeUnit::Microseconds, None))
        .map_err(frame_err)?;
    let df = DataFrame::new(vec![
        Column::new("entity_id".into(), ids),
        timestamp,
        Column::new("price".into(), prices),
        Column::new("volume".into(), volumes),
    ])
    .map_err(frame_err)?;
    frame::normalize_timezone(df, tz).map_err(frame_err)
}

/// Typed ticks from a frame. Null identity, timestamp or price fields are
/// invalid records; a null volume reads as 0.
pub fn ticks_from_frame(df: &DataFrame) -> Result<Vec<PriceTick>, ComputationError> {
    let ids = frame::strings(df, "entity_id")?;
    let stamps = frame::instants(df, "timestamp")?;
    let prices = frame::floats(df, "price")?;
    let volumes = match df.column("volume") {
        Ok(_) => frame::ints(df, "volume")?,
        Err(_) => vec![None; df.height()],
    };

    let mut ticks = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        ticks.push(PriceTick {
            entity_id: ids[i]
                .clone()
                .ok_or_else(|| ComputationError::invalid(i, "null entity_id"))?,
            timestamp: stamps[i].ok_or_else(|| ComputationError::invalid(i, "null timestamp"))?,
            price: prices[i].ok_or_else(|| ComputationError::invalid(i, "null price"))?,
            volume: volumes[i].unwrap_or(0),
        });
    }
    Ok(ticks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::schema::SeriesSchema;
    use chrono::TimeZone;

    fn tick(h: u32, m: u32, price: f64) -> PriceTick {
        PriceTick::new(
            "PLPKO0000016",
            Utc.with_ymd_and_hms(2024, 3, 1, h, m, 0).unwrap(),
            price,
            10,
        )
    }

    #[test]
    fn frame_has_canonical_schema_and_roundtrips() {
        let ticks = vec![tick(9, 0, 100.0), tick(9, 5, 101.5)];
        let df = ticks_to_frame(&ticks, chrono_tz::Europe::Warsaw).unwrap();
        SeriesSchema::Tick.validate(&df, "Europe/Warsaw").unwrap();
        assert_eq!(ticks_from_frame(&df).unwrap(), ticks);
    }

    #[test]
    fn date_follows_timezone() {
        let late = tick(23, 30, 1.0);
        assert_eq!(late.date_in(chrono_tz::Tz::UTC), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(
            late.date_in(chrono_tz::Europe::Warsaw),
            NaiveDate::from_ymd_opt(2024, 3, 2).unwrap()
        );
    }

    #[test]
    fn missing_volume_reads_as_zero() {
        let df = ticks_to_frame(&[tick(9, 0, 100.0)], chrono_tz::Tz::UTC)
            .unwrap()
            .drop("volume")
            .unwrap();
        assert_eq!(ticks_from_frame(&df).unwrap()[0].volume, 0);
    }

    #[test]
    fn null_price_is_invalid_record() {
        let mut df = ticks_to_frame(&[tick(9, 0, 100.0)], chrono_tz::Tz::UTC).unwrap();
        df.with_column(Column::new("price".into(), &[None::<f64>])).unwrap();
        assert!(matches!(
            ticks_from_frame(&df),
            Err(ComputationError::InvalidRecord { row: 0, .. })
        ));
    }
}
