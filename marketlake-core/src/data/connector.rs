//! Scoped connections to the object-store root.
//!
//! A [`Connector`] holds the validated configuration and hands out a fresh
//! [`Connection`] per logical operation. Connections are never pooled; the
//! release happens when the value drops, on success and error paths alike.

use chrono::NaiveDate;
use chrono_tz::Tz;
use polars::prelude::*;
use tracing::debug;

use super::frame::{self, date_column};
use super::layout;
use super::object_store::{normalize_key, LocalObjectStore, ObjectStore, StorageError};
use crate::config::StorageConfig;
use crate::filter::Predicate;

/// What a query reads.
#[derive(Debug, Clone, PartialEq)]
pub struct Scan {
    target: Target,
    hive: bool,
    columns: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq)]
enum Target {
    /// A single object; absence is an error.
    Object(String),
    /// Every Parquet object under a prefix, optionally only those with a
    /// given file name. Absence means an empty result.
    Prefix {
        prefix: String,
        file_name: Option<String>,
    },
}

impl Scan {
    pub fn object(path: impl Into<String>) -> Self {
        Self {
            target: Target::Object(path.into()),
            hive: false,
            columns: None,
        }
    }

    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self {
            target: Target::Prefix {
                prefix: prefix.into(),
                file_name: None,
            },
            hive: false,
            columns: None,
        }
    }

    /// Add `year=/month=/day=` path segments as columns, plus
    /// `partition_date` and, when the file has none, `date`.
    pub fn hive(mut self) -> Self {
        self.hive = true;
        self
    }

    /// Only objects named exactly `name` (prefix scans only).
    pub fn file_name(mut self, name: impl Into<String>) -> Self {
        if let Target::Prefix { file_name, .. } = &mut self.target {
            *file_name = Some(name.into());
        }
        self
    }

    /// Project the result onto these columns, in this order.
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }
}

/// Builds connections from one validated configuration.
#[derive(Debug, Clone)]
pub struct Connector {
    config: StorageConfig,
    tz: Tz,
}

impl Connector {
    pub fn new(config: StorageConfig) -> Result<Self, StorageError> {
        config.validate()?;
        let tz = config.tz()?;
        Ok(Self { config, tz })
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Open a fresh connection. Only local roots are supported.
    pub fn connect(&self) -> Result<Connection, StorageError> {
        let root = self.config.root.trim();
        let path = match root.strip_prefix("file://") {
            Some(path) => path,
            None if root.contains("://") => {
                return Err(StorageError::UnsupportedBackend(root.to_string()))
            }
            None => root,
        };
        let store = LocalObjectStore::open(path)?;
        Ok(Connection::new(Box::new(store), self.tz))
    }

    /// Run `f` on a fresh connection that is released when `f` returns.
    pub fn with_connection<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<StorageError>,
        F: FnOnce(&Connection) -> Result<T, E>,
    {
        let conn = self.connect()?;
        f(&conn)
    }
}

/// One short-lived connection.
pub struct Connection {
    store: Box<dyn ObjectStore>,
    tz: Tz,
}

impl Connection {
    pub fn new(store: Box<dyn ObjectStore>, tz: Tz) -> Self {
        debug!(root = %store.location(), tz = %tz, "connection acquired");
        Self { store, tz }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Existence probe: not-found is `false`, any other failure propagates.
    pub fn exists(&self, path: &str) -> Result<bool, StorageError> {
        match self.store.head(path) {
            Ok(_) => Ok(true),
            Err(StorageError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Object keys under `prefix`, sorted ascending.
    pub fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        self.store.list(prefix)
    }

    /// Read one object whole.
    pub fn read(&self, path: &str) -> Result<DataFrame, StorageError> {
        self.execute(&Scan::object(path), &Predicate::empty())
    }

    /// Overwrite the object at `path` with `df`. Datetime columns are
    /// labelled with the connection timezone first.
    pub fn write(&self, df: &DataFrame, path: &str) -> Result<(), StorageError> {
        let key = normalize_key(path)?;
        let normalized = frame::normalize_timezone(df.clone(), self.tz)
            .map_err(|e| StorageError::Query(e.to_string()))?;
        let bytes = frame::to_parquet_bytes(&normalized)?;
        self.store.put(&key, &bytes)?;
        debug!(object = %key, rows = df.height(), "frame written");
        Ok(())
    }

    /// Run a scan with a predicate.
    ///
    /// Objects are combined by relaxed-schema union, datetime columns are
    /// normalized to the connection timezone, then the predicate and the
    /// projection apply. A prefix with no objects yields an empty frame.
    pub fn execute(&self, scan: &Scan, predicate: &Predicate) -> Result<DataFrame, StorageError> {
        let keys = match &scan.target {
            Target::Object(path) => vec![normalize_key(path)?],
            Target::Prefix { prefix, file_name } => self
                .store
                .list(prefix)?
                .into_iter()
                .filter(|key| key.ends_with(".parquet"))
                .filter(|key| {
                    file_name
                        .as_deref()
                        .map_or(true, |name| layout::file_name(key) == name)
                })
                .collect(),
        };

        let mut frames = Vec::with_capacity(keys.len());
        for key in &keys {
            let bytes = self.store.get(key)?;
            let mut df = frame::from_parquet_bytes(bytes)?;
            if scan.hive {
                df = with_hive_columns(df, key).map_err(|e| StorageError::Query(e.to_string()))?;
            }
            frames.push(df);
        }
        debug!(objects = keys.len(), predicate = %predicate, "scan");

        let combined = frame::relaxed_union(frames).map_err(query_err)?;
        if combined.width() == 0 {
            return Ok(combined);
        }
        let combined = frame::normalize_timezone(combined, self.tz).map_err(query_err)?;

        let mut lf = combined.lazy();
        if let Some(expr) = predicate.to_expr() {
            lf = lf.filter(expr);
        }
        if let Some(columns) = &scan.columns {
            lf = lf.select(columns.iter().map(|c| col(c.as_str())).collect::<Vec<_>>());
        }
        lf.collect().map_err(query_err)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        debug!(root = %self.store.location(), "connection released");
    }
}

fn query_err(e: PolarsError) -> StorageError {
    StorageError::Query(e.to_string())
}

fn with_hive_columns(mut df: DataFrame, key: &str) -> PolarsResult<DataFrame> {
    let height = df.height();
    for (name, value) in layout::partition_values(key) {
        if df.column(&name).is_ok() {
            continue;
        }
        let column = match value.parse::<i32>() {
            Ok(n) => Column::new(name.as_str().into(), vec![n; height]),
            Err(_) => Column::new(name.as_str().into(), vec![value.as_str(); height]),
        };
        df.with_column(column)?;
    }

    if let Some(day) = layout::partition_date(key) {
        let values: Vec<Option<NaiveDate>> = vec![Some(day); height];
        df.with_column(date_column(layout::PARTITION_DATE, &values)?)?;
        if df.column("date").is_err() {
            df.with_column(date_column("date", &values)?)?;
        }
    }
    Ok(df)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::DATE_ENTITY;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn connector(dir: &tempfile::TempDir) -> Connector {
        Connector::new(StorageConfig::local(dir.path().display().to_string())).unwrap()
    }

    #[test]
    fn write_then_read_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let conn = connector(&dir).connect().unwrap();
        let df = df!(
            "code" => &["USD", "EUR"],
            "mid" => &[3.95, 4.31],
        )
        .unwrap();

        conn.write(&df, "currencies/mid_market_rate.parquet").unwrap();
        let back = conn.read("currencies/mid_market_rate.parquet").unwrap();
        assert!(back.equals(&df));
    }

    #[test]
    fn exists_maps_not_found_to_false() {
        let dir = tempfile::tempdir().unwrap();
        let conn = connector(&dir).connect().unwrap();
        assert!(!conn.exists("gold_prices/gold_prices.parquet").unwrap());

        let df = df!("price" => &[250.0]).unwrap();
        conn.write(&df, "gold_prices/gold_prices.parquet").unwrap();
        assert!(conn.exists("gold_prices/gold_prices.parquet").unwrap());
    }

    #[test]
    fn missing_object_is_not_found_but_empty_prefix_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let conn = connector(&dir).connect().unwrap();

        assert!(matches!(
            conn.read("nope.parquet"),
            Err(StorageError::NotFound { .. })
        ));
        let out = conn
            .execute(&Scan::prefix("ohlc").hive(), &Predicate::empty())
            .unwrap();
        assert_eq!(out.height(), 0);
    }

    #[test]
    fn hive_scan_adds_partition_columns_and_filters() {
        let dir = tempfile::tempdir().unwrap();
        let conn = connector(&dir).connect().unwrap();
        for (day, entity) in [(1, "A"), (2, "A"), (2, "B")] {
            let df = df!("entity_id" => &[entity], "price" => &[10.0]).unwrap();
            let key = format!("ohlc/year=2024/month=5/day={day}/{entity}.parquet");
            conn.write(&df, &key).unwrap();
        }

        let predicate = DATE_ENTITY
            .build([
                ("date_from", Some(d(2024, 5, 2).into())),
                ("entity_id", Some("A".into())),
            ])
            .unwrap();
        let out = conn
            .execute(&Scan::prefix("ohlc").hive(), &predicate)
            .unwrap();
        assert_eq!(out.height(), 1);
        assert_eq!(out.column("day").unwrap().i32().unwrap().get(0), Some(2));
        assert!(out.column(layout::PARTITION_DATE).is_ok());
    }

    #[test]
    fn file_name_and_projection() {
        let dir = tempfile::tempdir().unwrap();
        let conn = connector(&dir).connect().unwrap();
        let df = df!("link" => &["l1"], "title" => &["t"]).unwrap();
        conn.write(&df, "news/year=2024/month=5/day=1/InteriaSource.parquet")
            .unwrap();
        conn.write(&df, "news/year=2024/month=5/day=1/BankierSource.parquet")
            .unwrap();

        let out = conn
            .execute(
                &Scan::prefix("news")
                    .file_name("BankierSource.parquet")
                    .select(["link"]),
                &Predicate::empty(),
            )
            .unwrap();
        assert_eq!(out.height(), 1);
        assert_eq!(out.width(), 1);
    }

    #[test]
    fn remote_roots_are_rejected() {
        let connector = Connector::new(StorageConfig::local("s3://bucket/lake")).unwrap();
        assert!(matches!(
            connector.connect(),
            Err(StorageError::UnsupportedBackend(_))
        ));
    }

    #[test]
    fn with_connection_propagates_closure_errors() {
        let dir = tempfile::tempdir().unwrap();
        let result: Result<(), StorageError> = connector(&dir)
            .with_connection(|conn| conn.read("missing.parquet").map(|_| ()));
        assert!(matches!(result, Err(StorageError::NotFound { .. })));
    }
}
