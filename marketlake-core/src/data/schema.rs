//! Canonical per-series schemas and the coercion policy.
//!
//! Policy: pad and preserve.
//! - a canonical column that is missing is added, null-filled, with the canonical dtype
//! - a canonical column that is present is cast strictly; a failed cast is an error
//! - columns outside the canonical set are kept as they are

use polars::prelude::*;

/// The logical series with a fixed file schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesSchema {
    DailyBar,
    Tick,
    News,
    Currency,
    Gold,
    Metadata,
}

impl SeriesSchema {
    /// Canonical fields, in file order. Tick timestamps carry `tz`.
    pub fn fields(self, tz: &str) -> Vec<Field> {
        match self {
            SeriesSchema::DailyBar => vec![
                Field::new("date".into(), DataType::Date),
                Field::new("entity_id".into(), DataType::String),
                Field::new("open".into(), DataType::Float64),
                Field::new("close".into(), DataType::Float64),
                Field::new("low".into(), DataType::Float64),
                Field::new("high".into(), DataType::Float64),
                Field::new("volume".into(), DataType::Int64),
            ],
            SeriesSchema::Tick => vec![
                Field::new("entity_id".into(), DataType::String),
                Field::new(
                    "timestamp".into(),
                    DataType::Datetime(TimeUnit::Microseconds, Some(tz.into())),
                ),
                Field::new("price".into(), DataType::Float64),
                Field::new("volume".into(), DataType::Int64),
            ],
            SeriesSchema::News => vec![
                Field::new("title".into(), DataType::String),
                Field::new("link".into(), DataType::String),
                Field::new("date".into(), DataType::Date),
                Field::new("summary".into(), DataType::String),
                Field::new(
                    "matched_entities".into(),
                    DataType::List(Box::new(DataType::String)),
                ),
            ],
            SeriesSchema::Currency => vec![
                Field::new("effective_date".into(), DataType::Date),
                Field::new("code".into(), DataType::String),
                Field::new("mid".into(), DataType::Float64),
            ],
            SeriesSchema::Gold => vec![
                Field::new("date".into(), DataType::Date),
                Field::new("price".into(), DataType::Float64),
            ],
            SeriesSchema::Metadata => vec![
                Field::new("entity_id".into(), DataType::String),
                Field::new("name".into(), DataType::String),
                Field::new("ticker".into(), DataType::String),
                Field::new("sector".into(), DataType::String),
                Field::new("date".into(), DataType::Date),
            ],
        }
    }

    /// Column that uniquely identifies a row, if the series has one.
    pub fn natural_key(self) -> Option<&'static str> {
        match self {
            SeriesSchema::News => Some("link"),
            _ => None,
        }
    }

    /// Strict check: every canonical column present with the canonical dtype.
    pub fn validate(self, df: &DataFrame, tz: &str) -> Result<(), SchemaError> {
        let actual = df.schema();
        for field in self.fields(tz) {
            let actual_dtype = actual
                .get(field.name())
                .ok_or_else(|| SchemaError::MissingColumn(field.name().to_string()))?;
            if actual_dtype != field.dtype() {
                return Err(SchemaError::TypeMismatch {
                    column: field.name().to_string(),
                    expected: field.dtype().clone(),
                    actual: actual_dtype.clone(),
                });
            }
        }
        Ok(())
    }

    /// Apply the pad-and-preserve policy.
    ///
    /// Canonical columns come first in canonical order, extras follow in
    /// their original order.
    pub fn conform(self, df: &DataFrame, tz: &str) -> Result<DataFrame, SchemaError> {
        let height = df.height();
        let fields = self.fields(tz);
        let mut columns: Vec<Column> = Vec::with_capacity(df.width() + fields.len());

        for field in &fields {
            let column = match df.column(field.name()) {
                Ok(existing) if existing.dtype() == field.dtype() => existing.clone(),
                Ok(existing) => existing
                    .as_materialized_series()
                    .strict_cast(field.dtype())
                    .map_err(|_| SchemaError::TypeMismatch {
                        column: field.name().to_string(),
                        expected: field.dtype().clone(),
                        actual: existing.dtype().clone(),
                    })?
                    .into(),
                Err(_) => Series::full_null(field.name().clone(), height, field.dtype()).into(),
            };
            columns.push(column);
        }

        for existing in df.get_columns() {
            if !fields.iter().any(|f| f.name() == existing.name()) {
                columns.push(existing.clone());
            }
        }

        DataFrame::new(columns).map_err(|e| SchemaError::Frame(e.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("Missing required column: {0}")]
    MissingColumn(String),

    #[error("Type mismatch in column {column}: expected {expected:?}, got {actual:?}")]
    TypeMismatch {
        column: String,
        expected: DataType,
        actual: DataType,
    },

    #[error("frame error: {0}")]
    Frame(String),
}
