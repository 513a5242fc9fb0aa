//! DataFrame helpers shared by the connector and the typed conversions.

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use polars::prelude::*;
use std::io::Cursor;

use super::object_store::StorageError;
use crate::error::ComputationError;

pub(crate) const EPOCH: NaiveDate = match NaiveDate::from_ymd_opt(1970, 1, 1) {
    Some(d) => d,
    None => panic!("epoch"),
};

/// Serialize a frame to Parquet bytes.
pub fn to_parquet_bytes(df: &DataFrame) -> Result<Vec<u8>, StorageError> {
    let mut buf: Vec<u8> = Vec::new();
    ParquetWriter::new(&mut buf)
        .finish(&mut df.clone())
        .map_err(|e| StorageError::Parquet(format!("write parquet: {e}")))?;
    Ok(buf)
}

/// Deserialize Parquet bytes into a frame.
pub fn from_parquet_bytes(bytes: Vec<u8>) -> Result<DataFrame, StorageError> {
    ParquetReader::new(Cursor::new(bytes))
        .finish()
        .map_err(|e| StorageError::Parquet(format!("read parquet: {e}")))
}

/// Relaxed-schema union: columns missing on one side are null-filled and
/// differing dtypes are widened to their supertype.
pub fn relaxed_union(frames: Vec<DataFrame>) -> PolarsResult<DataFrame> {
    let mut frames: Vec<DataFrame> = frames.into_iter().filter(|f| f.width() > 0).collect();
    match frames.len() {
        0 => Ok(DataFrame::empty()),
        1 => Ok(frames.remove(0)),
        _ => {
            let lazy: Vec<LazyFrame> = frames.into_iter().map(|f| f.lazy()).collect();
            concat_lf_diagonal(
                lazy,
                UnionArgs {
                    to_supertypes: true,
                    rechunk: true,
                    ..Default::default()
                },
            )?
            .collect()
        }
    }
}

/// Label every datetime column with `tz`.
///
/// Naive datetimes are taken as UTC instants; zoned datetimes keep their
/// instant and change only the zone they are shown in.
pub fn normalize_timezone(df: DataFrame, tz: Tz) -> PolarsResult<DataFrame> {
    let targets: Vec<(PlSmallStr, TimeUnit)> = df
        .get_columns()
        .iter()
        .filter_map(|c| match c.dtype() {
            DataType::Datetime(unit, zone) if zone.as_deref() != Some(tz.name()) => {
                Some((c.name().clone(), *unit))
            }
            _ => None,
        })
        .collect();
    if targets.is_empty() {
        return Ok(df);
    }

    let exprs: Vec<Expr> = targets
        .into_iter()
        .map(|(name, unit)| {
            col(name.clone()).cast(DataType::Datetime(unit, Some(tz.name().into())))
        })
        .collect();
    df.lazy().with_columns(exprs).collect()
}

pub(crate) fn column<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Column, ComputationError> {
    df.column(name)
        .map_err(|_| ComputationError::MissingColumn(name.to_string()))
}

pub(crate) fn frame_err(e: PolarsError) -> ComputationError {
    ComputationError::Frame(e.to_string())
}

/// Values of a string column.
pub(crate) fn strings(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>, ComputationError> {
    let col = column(df, name)?;
    let cast = col.cast(&DataType::String).map_err(frame_err)?;
    let ca = cast.str().map_err(frame_err)?;
    Ok(ca.into_iter().map(|v| v.map(String::from)).collect())
}

/// Values of a numeric column as `f64`.
pub(crate) fn floats(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>, ComputationError> {
    let col = column(df, name)?;
    if !col.dtype().is_primitive_numeric() {
        return Err(ComputationError::Frame(format!(
            "column '{name}' is {:?}, expected a number",
            col.dtype()
        )));
    }
    let cast = col.cast(&DataType::Float64).map_err(frame_err)?;
    let ca = cast.f64().map_err(frame_err)?;
    Ok(ca.into_iter().collect())
}

/// Values of a numeric column as `i64`.
pub(crate) fn ints(df: &DataFrame, name: &str) -> Result<Vec<Option<i64>>, ComputationError> {
    let col = column(df, name)?;
    if !col.dtype().is_primitive_numeric() {
        return Err(ComputationError::Frame(format!(
            "column '{name}' is {:?}, expected a number",
            col.dtype()
        )));
    }
    let cast = col.cast(&DataType::Int64).map_err(frame_err)?;
    let ca = cast.i64().map_err(frame_err)?;
    Ok(ca.into_iter().collect())
}

/// Instants of a datetime column.
pub(crate) fn instants(
    df: &DataFrame,
    name: &str,
) -> Result<Vec<Option<DateTime<Utc>>>, ComputationError> {
    let col = column(df, name)?;
    let unit = match col.dtype() {
        DataType::Datetime(unit, _) => *unit,
        other => {
            return Err(ComputationError::Frame(format!(
                "column '{name}' is {other:?}, expected a datetime"
            )))
        }
    };
    let phys = col.cast(&DataType::Int64).map_err(frame_err)?;
    let ca = phys.i64().map_err(frame_err)?;
    Ok(ca
        .into_iter()
        .map(|v| {
            v.and_then(|v| match unit {
                TimeUnit::Nanoseconds => Some(DateTime::from_timestamp_nanos(v)),
                TimeUnit::Microseconds => DateTime::from_timestamp_micros(v),
                TimeUnit::Milliseconds => DateTime::from_timestamp_millis(v),
            })
        })
        .collect())
}

/// Calendar dates of a date or datetime column. Datetimes are read in `tz`.
pub(crate) fn dates(
    df: &DataFrame,
    name: &str,
    tz: Tz,
) -> Result<Vec<Option<NaiveDate>>, ComputationError> {
    let col = column(df, name)?;
    match col.dtype() {
        DataType::Date => {
            let phys = col.cast(&DataType::Int32).map_err(frame_err)?;
            let ca = phys.i32().map_err(frame_err)?;
            Ok(ca
                .into_iter()
                .map(|v| v.map(|days| EPOCH + chrono::Duration::days(days as i64)))
                .collect())
        }
        DataType::Datetime(_, _) => Ok(instants(df, name)?
            .into_iter()
            .map(|v| v.map(|t| t.with_timezone(&tz).date_naive()))
            .collect()),
        other => Err(ComputationError::Frame(format!(
            "column '{name}' is {other:?}, expected a date"
        ))),
    }
}

/// Build a `Date` column from calendar dates.
pub(crate) fn date_column(name: &str, values: &[Option<NaiveDate>]) -> PolarsResult<Column> {
    let days: Vec<Option<i32>> = values
        .iter()
        .map(|d| d.map(|d| (d - EPOCH).num_days() as i32))
        .collect();
    Column::new(name.into(), days).cast(&DataType::Date)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parquet_bytes_roundtrip() {
        let df = df!(
            "entity_id" => &["A", "B"],
            "price" => &[1.5, 2.5],
        )
        .unwrap();
        let bytes = to_parquet_bytes(&df).unwrap();
        let back = from_parquet_bytes(bytes).unwrap();
        assert!(back.equals(&df));
    }

    #[test]
    fn relaxed_union_null_fills_missing_columns() {
        let a = df!("entity_id" => &["A"], "price" => &[1.0]).unwrap();
        let b = df!("entity_id" => &["B"], "volume" => &[10i64]).unwrap();

        let out = relaxed_union(vec![a, b]).unwrap();
        assert_eq!(out.height(), 2);
        assert_eq!(out.width(), 3);
        assert_eq!(out.column("price").unwrap().null_count(), 1);
        assert_eq!(out.column("volume").unwrap().null_count(), 1);
    }

    #[test]
    fn relaxed_union_widens_types() {
        let a = df!("v" => &[1i32]).unwrap();
        let b = df!("v" => &[2.5f64]).unwrap();
        let out = relaxed_union(vec![a, b]).unwrap();
        assert_eq!(out.column("v").unwrap().dtype(), &DataType::Float64);
    }

    #[test]
    fn relaxed_union_of_nothing_is_empty() {
        assert_eq!(relaxed_union(vec![]).unwrap().height(), 0);
        assert_eq!(
            relaxed_union(vec![DataFrame::empty()]).unwrap().width(),
            0
        );
    }

    #[test]
    fn dates_from_datetime_use_timezone() {
        // 2024-01-01T23:30:00Z is already 2024-01-02 in Warsaw (UTC+1).
        let micros = 1_704_151_800_000_000i64;
        let df = DataFrame::new(vec![Column::new("ts".into(), &[micros])
            .cast(&DataType::Datetime(TimeUnit::Microseconds, None))
            .unwrap()])
        .unwrap();

        let warsaw = dates(&df, "ts", chrono_tz::Europe::Warsaw).unwrap();
        let utc = dates(&df, "ts", chrono_tz::Tz::UTC).unwrap();
        assert_eq!(warsaw[0], NaiveDate::from_ymd_opt(2024, 1, 2));
        assert_eq!(utc[0], NaiveDate::from_ymd_opt(2024, 1, 1));
    }

    #[test]
    fn normalize_labels_naive_datetimes() {
        let df = DataFrame::new(vec![Column::new("ts".into(), &[0i64])
            .cast(&DataType::Datetime(TimeUnit::Microseconds, None))
            .unwrap()])
        .unwrap();
        let out = normalize_timezone(df, chrono_tz::Europe::Warsaw).unwrap();
        assert_eq!(
            out.column("ts").unwrap().dtype(),
            &DataType::Datetime(TimeUnit::Microseconds, Some("Europe/Warsaw".into()))
        );
        let instants = instants(&out, "ts").unwrap();
        assert_eq!(instants[0], DateTime::from_timestamp_micros(0));
    }

    #[test]
    fn date_column_roundtrip() {
        let d = NaiveDate::from_ymd_opt(2024, 5, 3);
        let col = date_column("date", &[d, None, Some(EPOCH)]).unwrap();
        assert_eq!(col.dtype(), &DataType::Date);
        let df = DataFrame::new(vec![col]).unwrap();
        assert_eq!(
            dates(&df, "date", chrono_tz::Tz::UTC).unwrap(),
            vec![d, None, Some(EPOCH)]
        );
    }
}
