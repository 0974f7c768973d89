//! Core traits for the import pipeline.
//!
//! - [`RemoteReader`]: read-only access to the foreign database
//! - [`RemoteConnector`]: establishes a [`RemoteReader`] from settings
//! - [`LocalStore`]: the shared local write connection
//! - [`EntityWriter`]: validates and persists one record of one entity type
//!
//! The engine only talks to these traits; drivers under `drivers/` provide
//! MySQL and in-memory implementations.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::config::ConnectionParams;
use crate::error::Result;

use super::entity::{EntityType, LocalId};
use super::query::{ReadMode, RemoteQuery};
use super::row::{Record, Row};

/// Forward-only, non-restartable sequence of remote rows.
///
/// Re-reading a table means issuing the query again, which may observe a
/// different snapshot if the foreign database changed in between.
pub enum RowCursor {
    /// All rows already fetched.
    Materialized(std::vec::IntoIter<Row>),
    /// Rows arriving from a background reader.
    Streaming(mpsc::Receiver<Result<Row>>),
}

impl RowCursor {
    pub fn from_rows(rows: Vec<Row>) -> Self {
        RowCursor::Materialized(rows.into_iter())
    }

    /// Next row, `None` once exhausted.
    pub async fn next(&mut self) -> Option<Result<Row>> {
        match self {
            RowCursor::Materialized(iter) => iter.next().map(Ok),
            RowCursor::Streaming(rx) => rx.recv().await,
        }
    }

    /// Drain the remaining rows, stopping at the first error.
    pub async fn collect_all(mut self) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        while let Some(row) = self.next().await {
            rows.push(row?);
        }
        Ok(rows)
    }
}

/// Read rows from the foreign database.
#[async_trait]
pub trait RemoteReader: Send + Sync {
    /// Run the query and materialize every row.
    async fn fetch_all(&self, query: &RemoteQuery) -> Result<Vec<Row>>;

    /// Run the query and stream rows one at a time.
    fn stream(&self, query: &RemoteQuery) -> RowCursor;

    /// Run the query in the requested mode.
    async fn read(&self, query: &RemoteQuery, mode: ReadMode) -> Result<RowCursor> {
        match mode {
            ReadMode::Materialize => Ok(RowCursor::from_rows(self.fetch_all(query).await?)),
            ReadMode::Stream => Ok(self.stream(query)),
        }
    }

    /// Check the connection is alive.
    async fn ping(&self) -> Result<()>;

    /// Get the database type identifier (e.g., "mysql", "memory").
    fn db_type(&self) -> &str;

    /// Close the connection pool.
    async fn close(&self);
}

/// Opens remote readers from connection settings.
#[async_trait]
pub trait RemoteConnector: Send + Sync {
    async fn connect(&self, params: &ConnectionParams) -> Result<Arc<dyn RemoteReader>>;
}

/// The local write connection shared by a whole run.
///
/// Not owned by the engine: it is opened by the caller and only ever reset
/// after a failed row, never replaced.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Insert a row and return its generated id.
    async fn insert(&self, table: &str, record: &Record) -> Result<LocalId>;

    /// Rows whose columns equal every value in `criteria`. Results include `id`.
    async fn find(&self, table: &str, criteria: &Record) -> Result<Vec<Row>>;

    /// Number of rows in a table.
    async fn count(&self, table: &str) -> Result<u64>;

    /// Clear any pending transaction or statement state.
    async fn reset(&self) -> Result<()>;

    /// Get the store type identifier (e.g., "mysql", "memory").
    fn store_type(&self) -> &str;
}

/// Validation messages keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-field error set.
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn fields(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn messages(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.0.iter()
    }
}

/// Result of asking a writer to persist a record.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
    /// Persisted with this local id.
    Created(LocalId),
    /// Rejected by validation; nothing was written.
    Invalid(FieldErrors),
}

/// Validates and persists one record of a single entity type.
///
/// Validation failures come back as [`WriteOutcome::Invalid`]; `Err` is
/// reserved for unexpected failures (lost connection, constraint violations
/// the writer did not anticipate).
#[async_trait]
pub trait EntityWriter: Send + Sync {
    fn entity(&self) -> EntityType;

    async fn create(&self, record: &Record) -> Result<WriteOutcome>;
}
