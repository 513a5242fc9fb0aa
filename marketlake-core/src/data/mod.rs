//! Storage: object stores, layout, canonical schemas and the connector.

pub mod connector;
pub mod frame;
pub mod layout;
pub mod object_store;
pub mod schema;

pub use connector::{Connection, Connector, Scan};
pub use layout::{CurrencyTable, NewsSource};
pub use object_store::{LocalObjectStore, ObjectStore, StorageError};
pub use schema::{SchemaError, SeriesSchema};
