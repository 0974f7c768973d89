//! Core abstractions for mapping-driven imports.
//!
//! This module provides the foundational types and traits used throughout
//! the import engine:
//!
//! - [`value`]: scalar values flowing from remote rows to local records
//! - [`row`]: ordered column/value maps
//! - [`entity`]: entity kinds and id types
//! - [`query`]: the remote query model (filters, joins, read modes)
//! - [`traits`]: remote reader, local store and entity writer contracts
//!
//! # Architecture
//!
//! Core defines database-agnostic contracts implemented by `drivers/`
//! (MySQL and in-memory). The engine and migration plans only see the traits,
//! so the whole pipeline runs against in-memory drivers in tests.

pub mod entity;
pub mod query;
pub mod row;
pub mod traits;
pub mod value;

pub use entity::{EntityType, LocalId, RemoteId};
pub use query::{Filter, Join, JoinKind, ReadMode, RemoteQuery, SelectColumn, SortOrder};
pub use row::{Record, Row};
pub use traits::{
    EntityWriter, FieldErrors, LocalStore, RemoteConnector, RemoteReader, RowCursor, WriteOutcome,
};
pub use value::Value;
