//! Database driver implementations.
//!
//! Each driver implements the core reader/store traits:
//!
//! - [`mysql`]: MySQL/MariaDB, for the foreign database and the local schema
//! - [`memory`]: in-memory tables for dry runs and tests

pub mod memory;
pub mod mysql;

pub use memory::{MemoryConnector, MemoryReader, MemoryStore};
pub use mysql::{MysqlConnector, MysqlDialect, MysqlReader, MysqlStore};
