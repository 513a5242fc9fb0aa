//! Read-union-write appends to a single persisted object.
//!
//! The persisted frame (empty when the object does not exist yet) is unioned
//! with the fresh batch under relaxed schema rules. Series with a natural key
//! then keep exactly one row per key, and a row with a null key fails the
//! append. Key-less series are written as they are, so re-appending an
//! already covered date range duplicates rows.

use polars::prelude::*;
use serde::Serialize;
use tracing::info;

use crate::data::frame;
use crate::data::schema::SeriesSchema;
use crate::data::Connection;
use crate::error::{ComputationError, LakeError};

/// How rows of a series are identified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPolicy {
    /// No natural key: no deduplication.
    None,
    /// One row per value of this column; the first occurrence wins.
    Unique(&'static str),
}

/// What an append did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppendReport {
    pub object: String,
    pub prior_rows: usize,
    pub fresh_rows: usize,
    pub written_rows: usize,
    pub duplicates_dropped: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct IncrementalAppender {
    policy: KeyPolicy,
    schema: Option<SeriesSchema>,
}

impl IncrementalAppender {
    pub fn new(policy: KeyPolicy) -> Self {
        Self {
            policy,
            schema: None,
        }
    }

    /// Appender for a canonical series: keyed by its natural key, and every
    /// written frame is conformed to its schema.
    pub fn for_series(schema: SeriesSchema) -> Self {
        let policy = match schema.natural_key() {
            Some(key) => KeyPolicy::Unique(key),
            None => KeyPolicy::None,
        };
        Self {
            policy,
            schema: Some(schema),
        }
    }

    pub fn policy(&self) -> KeyPolicy {
        self.policy
    }

    /// Union `prior` and `fresh`, prior rows first, then apply the key policy.
    /// Returns the merged frame and the number of rows dropped as duplicates.
    pub fn merge(
        &self,
        prior: DataFrame,
        fresh: DataFrame,
        tz: &str,
    ) -> Result<(DataFrame, usize), LakeError> {
        let union = frame::relaxed_union(vec![prior, fresh])
            .map_err(|e| ComputationError::Frame(e.to_string()))?;
        let union = match self.schema {
            Some(schema) => schema.conform(&union, tz)?,
            None => union,
        };

        match self.policy {
            KeyPolicy::None => Ok((union, 0)),
            KeyPolicy::Unique(key) => {
                let keys = union
                    .column(key)
                    .map_err(|_| ComputationError::MissingColumn(key.to_string()))?;
                if let Some(row) = keys.is_null().into_iter().position(|n| n == Some(true)) {
                    return Err(ComputationError::invalid(row, format!("null {key}")).into());
                }
                let before = union.height();
                let deduped = union
                    .lazy()
                    .unique_stable(Some(vec![key.into()]), UniqueKeepStrategy::First)
                    .collect()
                    .map_err(|e| ComputationError::Frame(e.to_string()))?;
                let dropped = before - deduped.height();
                Ok((deduped, dropped))
            }
        }
    }

    /// Append `fresh` to the object at `path` and write the result back.
    pub fn append(
        &self,
        conn: &Connection,
        path: &str,
        fresh: &DataFrame,
    ) -> Result<AppendReport, LakeError> {
        let prior = if conn.exists(path)? {
            conn.read(path)?
        } else {
            DataFrame::empty()
        };
        let prior_rows = prior.height();
        let tz = conn.timezone();

        let (merged, duplicates_dropped) = self.merge(prior, fresh.clone(), tz.name())?;
        conn.write(&merged, path)?;

        let report = AppendReport {
            object: path.to_string(),
            prior_rows,
            fresh_rows: fresh.height(),
            written_rows: merged.height(),
            duplicates_dropped,
        };
        info!(
            object = %report.object,
            prior = report.prior_rows,
            fresh = report.fresh_rows,
            written = report.written_rows,
            dropped = report.duplicates_dropped,
            "append complete"
        );
        Ok(report)
    }

    /// Overwrite the object at `path` with `fresh` alone, under the same
    /// schema and key rules as [`append`](Self::append).
    pub fn replace(
        &self,
        conn: &Connection,
        path: &str,
        fresh: &DataFrame,
    ) -> Result<AppendReport, LakeError> {
        let tz = conn.timezone();
        let (merged, duplicates_dropped) =
            self.merge(DataFrame::empty(), fresh.clone(), tz.name())?;
        conn.write(&merged, path)?;
        info!(object = %path, rows = merged.height(), "object replaced");
        Ok(AppendReport {
            object: path.to_string(),
            prior_rows: 0,
            fresh_rows: fresh.height(),
            written_rows: merged.height(),
            duplicates_dropped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use crate::data::Connector;

    fn conn(dir: &tempfile::TempDir) -> Connection {
        Connector::new(StorageConfig::local(dir.path().display().to_string()))
            .unwrap()
            .connect()
            .unwrap()
    }

    #[test]
    fn keyed_append_keeps_first_occurrence() {
        let dir = tempfile::tempdir().unwrap();
        let conn = conn(&dir);
        let appender = IncrementalAppender::new(KeyPolicy::Unique("link"));

        let first = df!("link" => &["a", "b"], "title" => &["A", "B"]).unwrap();
        appender.append(&conn, "news/x.parquet", &first).unwrap();

        let second = df!("link" => &["b", "c"], "title" => &["B2", "C"]).unwrap();
        let report = appender.append(&conn, "news/x.parquet", &second).unwrap();
        assert_eq!(report.prior_rows, 2);
        assert_eq!(report.written_rows, 3);
        assert_eq!(report.duplicates_dropped, 1);

        let stored = conn.read("news/x.parquet").unwrap();
        let titles: Vec<Option<&str>> = stored.column("title").unwrap().str().unwrap().into_iter().collect();
        assert_eq!(titles, vec![Some("A"), Some("B"), Some("C")]);
    }

    #[test]
    fn keyless_append_keeps_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let conn = conn(&dir);
        let appender = IncrementalAppender::new(KeyPolicy::None);
        let batch = df!("price" => &[250.0]).unwrap();

        appender.append(&conn, "gold.parquet", &batch).unwrap();
        let report = appender.append(&conn, "gold.parquet", &batch).unwrap();
        assert_eq!(report.written_rows, 2);
        assert_eq!(report.duplicates_dropped, 0);
    }

    #[test]
    fn union_preserves_extra_and_fills_missing_columns() {
        let appender = IncrementalAppender::new(KeyPolicy::None);
        let prior = df!("code" => &["USD"], "mid" => &[3.9]).unwrap();
        let fresh = df!("code" => &["EUR"], "mid" => &[4.3], "table" => &["A"]).unwrap();

        let (merged, _) = appender.merge(prior, fresh, "UTC").unwrap();
        assert_eq!(merged.height(), 2);
        assert_eq!(merged.column("table").unwrap().null_count(), 1);
    }

    #[test]
    fn series_appender_conforms_to_schema() {
        let appender = IncrementalAppender::for_series(SeriesSchema::Gold);
        assert_eq!(appender.policy(), KeyPolicy::None);
        let fresh = df!("price" => &[250i64]).unwrap();
        let (merged, _) = appender.merge(DataFrame::empty(), fresh, "UTC").unwrap();
        assert_eq!(merged.column("price").unwrap().dtype(), &DataType::Float64);
        assert_eq!(merged.column("date").unwrap().dtype(), &DataType::Date);
    }

    #[test]
    fn missing_key_column_is_an_error() {
        let appender = IncrementalAppender::new(KeyPolicy::Unique("link"));
        let fresh = df!("title" => &["t"]).unwrap();
        assert!(appender.merge(DataFrame::empty(), fresh, "UTC").is_err());
    }

    #[test]
    fn null_keys_fail_instead_of_collapsing() {
        let appender = IncrementalAppender::new(KeyPolicy::Unique("link"));
        let prior = df!("link" => &[Some("https://x/1")], "title" => &["a"]).unwrap();
        let fresh = df!("link" => &[None::<&str>, None], "title" => &["b", "c"]).unwrap();

        let err = appender.merge(prior, fresh, "UTC").unwrap_err();
        assert!(matches!(
            err,
            LakeError::Computation(ComputationError::InvalidRecord { row: 1, .. })
        ));
    }
}
