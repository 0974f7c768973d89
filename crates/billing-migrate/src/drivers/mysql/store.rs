//! MySQL/MariaDB local store.
//!
//! One connection for the whole run. After a failed row the connection is
//! reset with `ROLLBACK`, never replaced.

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::{ConnectOptions, Connection, Executor, Row as _};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::core::traits::LocalStore;
use crate::core::{LocalId, Record, Row};
use crate::error::{MigrateError, Result};

use super::dialect::MysqlDialect;
use super::values::{bind_all, decode_row};

/// MySQL local store.
pub struct MysqlStore {
    conn: Mutex<MySqlConnection>,
    dialect: MysqlDialect,
}

impl MysqlStore {
    /// Open the local connection from a `mysql://` URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = MySqlConnectOptions::from_str(url)
            .map_err(|e| MigrateError::local(e, "parsing local database URL"))?;
        let conn = options
            .connect()
            .await
            .map_err(|e| MigrateError::local(e, "connecting to local database"))?;
        info!("Connected to local MySQL store");
        Ok(Self::from_connection(conn))
    }

    /// Wrap an already open connection.
    pub fn from_connection(conn: MySqlConnection) -> Self {
        Self {
            conn: Mutex::new(conn),
            dialect: MysqlDialect::new(),
        }
    }

    /// Close the connection.
    pub async fn close(self) -> Result<()> {
        self.conn
            .into_inner()
            .close()
            .await
            .map_err(|e| MigrateError::local(e, "closing local connection"))
    }
}

#[async_trait]
impl LocalStore for MysqlStore {
    async fn insert(&self, table: &str, record: &Record) -> Result<LocalId> {
        let (sql, params) = self.dialect.build_insert(table, record);
        let mut conn = self.conn.lock().await;
        let result = bind_all(sqlx::query(&sql), &params)
            .execute(&mut *conn)
            .await
            .map_err(|e| MigrateError::local(e, format!("inserting into {}", table)))?;
        debug!("{}: inserted id {}", table, result.last_insert_id());
        Ok(result.last_insert_id())
    }

    async fn find(&self, table: &str, criteria: &Record) -> Result<Vec<Row>> {
        let (sql, params) = self.dialect.build_find(table, criteria);
        let mut conn = self.conn.lock().await;
        let rows = bind_all(sqlx::query(&sql), &params)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| MigrateError::local(e, format!("searching {}", table)))?;
        Ok(rows.iter().map(decode_row).collect())
    }

    async fn count(&self, table: &str) -> Result<u64> {
        let sql = self.dialect.build_count(table);
        let mut conn = self.conn.lock().await;
        let row = sqlx::query(&sql)
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| MigrateError::local(e, format!("counting {}", table)))?;
        let count: i64 = row
            .try_get("cnt")
            .map_err(|e| MigrateError::local(e, format!("counting {}", table)))?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn reset(&self) -> Result<()> {
        let mut conn = self.conn.lock().await;
        conn.execute("ROLLBACK")
            .await
            .map_err(|e| MigrateError::local(e, "resetting local connection"))?;
        Ok(())
    }

    fn store_type(&self) -> &str {
        "mysql"
    }
}
