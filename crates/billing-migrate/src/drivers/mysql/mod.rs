//! MySQL/MariaDB database driver.
//!
//! - [`MysqlDialect`]: SQL rendering of the query model
//! - [`MysqlReader`]: foreign database reader (pooled, streaming)
//! - [`MysqlStore`]: local store on a single connection
//!
//! # Supported Versions
//!
//! - MySQL 5.7+, 8.0+
//! - MariaDB 10.2+

mod dialect;
mod reader;
mod store;
mod values;

pub use dialect::MysqlDialect;
pub use reader::{MysqlConnector, MysqlReader};
pub use store::MysqlStore;
