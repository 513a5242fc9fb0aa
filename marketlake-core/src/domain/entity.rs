//! Entity reference metadata (name, ticker, sector).

use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::data::frame::{self, date_column, frame_err};
use crate::error::ComputationError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityMeta {
    pub entity_id: String,
    pub name: Option<String>,
    pub ticker: Option<String>,
    pub sector: Option<String>,
}

impl EntityMeta {
    pub fn new(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_ticker(mut self, ticker: impl Into<String>) -> Self {
        self.ticker = Some(ticker.into());
        self
    }

    pub fn with_sector(mut self, sector: impl Into<String>) -> Self {
        self.sector = Some(sector.into());
        self
    }
}

/// Snapshot frame; every row carries the snapshot date.
pub fn meta_to_frame(meta: &[EntityMeta], as_of: NaiveDate) -> Result<DataFrame, ComputationError> {
    let ids: Vec<&str> = meta.iter().map(|m| m.entity_id.as_str()).collect();
    let names: Vec<Option<&str>> = meta.iter().map(|m| m.name.as_deref()).collect();
    let tickers: Vec<Option<&str>> = meta.iter().map(|m| m.ticker.as_deref()).collect();
    let sectors: Vec<Option<&str>> = meta.iter().map(|m| m.sector.as_deref()).collect();
    let dates: Vec<Option<NaiveDate>> = vec![Some(as_of); meta.len()];

    DataFrame::new(vec![
        Column::new("entity_id".into(), ids),
        Column::new("name".into(), names),
        Column::new("ticker".into(), tickers),
        Column::new("sector".into(), sectors),
        date_column("date", &dates).map_err(frame_err)?,
    ])
    .map_err(frame_err)
}

/// Typed metadata. Only `entity_id` is required; absent optional columns
/// read as `None`.
pub fn meta_from_frame(df: &DataFrame) -> Result<Vec<EntityMeta>, ComputationError> {
    let ids = frame::strings(df, "entity_id")?;
    let optional = |name: &str| -> Result<Vec<Option<String>>, ComputationError> {
        match df.column(name) {
            Ok(_) => frame::strings(df, name),
            Err(_) => Ok(vec![None; df.height()]),
        }
    };
    let names = optional("name")?;
    let tickers = optional("ticker")?;
    let sectors = optional("sector")?;

    ids.into_iter()
        .enumerate()
        .map(|(i, id)| {
            Ok(EntityMeta {
                entity_id: id.ok_or_else(|| ComputationError::invalid(i, "null entity_id"))?,
                name: names[i].clone(),
                ticker: tickers[i].clone(),
                sector: sectors[i].clone(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_keeps_optional_fields() {
        let meta = vec![
            EntityMeta::new("PLPKO0000016")
                .with_name("PKO BP")
                .with_ticker("PKO")
                .with_sector("Banking"),
            EntityMeta::new("PLCDPRO00015"),
        ];
        let df = meta_to_frame(&meta, NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()).unwrap();
        assert_eq!(meta_from_frame(&df).unwrap(), meta);
    }

    #[test]
    fn missing_optional_columns_read_as_none() {
        let df = df!("entity_id" => &["PLPKO0000016"]).unwrap();
        let meta = meta_from_frame(&df).unwrap();
        assert_eq!(meta, vec![EntityMeta::new("PLPKO0000016")]);
    }
}
