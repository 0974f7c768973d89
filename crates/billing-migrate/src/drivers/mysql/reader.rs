//! MySQL/MariaDB remote reader.
//!
//! Uses SQLx for connection pooling. Joins and filters are rendered into SQL
//! by [`MysqlDialect`]; streaming runs the query on a background task that
//! feeds a bounded channel.
//!
//! A streamed result stays open on the server for a whole pass while the
//! consumer writes each row locally before pulling the next. Once the
//! channel is full the server sees a stalled client, so every connection
//! raises `net_write_timeout` for the session.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use sqlx::Executor;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::{validate_connection, ConnectionParams};
use crate::core::traits::{RemoteConnector, RemoteReader, RowCursor};
use crate::core::{RemoteQuery, Row, Value};
use crate::error::{MigrateError, Result};

use super::dialect::MysqlDialect;
use super::values::{bind_all, decode_row};

/// Connection pool timeout.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Reads are sequential; a second connection serves materialized lookups
/// while a stream is open.
const POOL_MAX_CONNECTIONS: u32 = 2;

/// Rows buffered ahead of the consumer when streaming.
const STREAM_BUFFER: usize = 256;

/// Seconds the server waits on a stalled streaming client (server default 60).
const NET_WRITE_TIMEOUT_SECS: u64 = 4 * 60 * 60;

/// Configured init statements, then the session timeout for streaming.
fn session_statements(params: &ConnectionParams) -> Vec<String> {
    let mut statements = params.init_statements();
    statements.push(format!(
        "SET SESSION net_write_timeout = {}",
        NET_WRITE_TIMEOUT_SECS
    ));
    statements
}

/// MySQL/MariaDB remote reader.
pub struct MysqlReader {
    pool: MySqlPool,
    dialect: MysqlDialect,
}

impl MysqlReader {
    /// Open a pool to the foreign database.
    ///
    /// The optional charset and SQL-mode statements run on every new
    /// connection. Failures are reported against the settings field most
    /// likely at fault.
    pub async fn connect(params: &ConnectionParams) -> Result<Self> {
        let errors = validate_connection(params);
        if let Some((field, messages)) = errors.iter().next() {
            return Err(MigrateError::connection(
                field.clone(),
                messages.join(" "),
            ));
        }

        let options = MySqlConnectOptions::new()
            .host(&params.host)
            .port(params.port)
            .database(&params.database)
            .username(&params.user)
            .password(&params.pass);

        let init = Arc::new(session_statements(params));
        let pool = MySqlPoolOptions::new()
            .max_connections(POOL_MAX_CONNECTIONS)
            .acquire_timeout(POOL_CONNECTION_TIMEOUT)
            .after_connect(move |conn, _meta| {
                let init = Arc::clone(&init);
                Box::pin(async move {
                    for statement in init.iter() {
                        conn.execute(statement.as_str()).await?;
                    }
                    Ok(())
                })
            })
            .connect_with(options)
            .await
            .map_err(|e| connect_error(&e))?;

        sqlx::query("SELECT 1")
            .fetch_one(&pool)
            .await
            .map_err(|e| connect_error(&e))?;

        info!(
            "Connected to MySQL source: {}:{}/{}",
            params.host, params.port, params.database
        );

        Ok(Self {
            pool,
            dialect: MysqlDialect::new(),
        })
    }

    async fn stream_impl(
        pool: MySqlPool,
        sql: String,
        params: Vec<Value>,
        tx: mpsc::Sender<Result<Row>>,
    ) -> Result<()> {
        let query = bind_all(sqlx::query(&sql), &params);
        let mut rows = query.fetch(&pool);
        while let Some(row) = rows.try_next().await? {
            if tx.send(Ok(decode_row(&row))).await.is_err() {
                break; // Receiver dropped
            }
        }
        Ok(())
    }
}

/// Attribute a connect failure to a settings field.
fn connect_error(e: &sqlx::Error) -> MigrateError {
    let message = e.to_string();
    let field = match e {
        sqlx::Error::Database(db) => {
            let text = db.message().to_lowercase();
            if text.contains("access denied") {
                "user"
            } else if text.contains("unknown database") {
                "database"
            } else {
                "host"
            }
        }
        _ => "host",
    };
    MigrateError::connection(field, message)
}

#[async_trait]
impl RemoteReader for MysqlReader {
    async fn fetch_all(&self, query: &RemoteQuery) -> Result<Vec<Row>> {
        let (sql, params) = self.dialect.build_select(query);
        debug!("{}", sql);
        let rows = bind_all(sqlx::query(&sql), &params)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(decode_row).collect())
    }

    fn stream(&self, query: &RemoteQuery) -> RowCursor {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let pool = self.pool.clone();
        let (sql, params) = self.dialect.build_select(query);
        debug!("{}", sql);

        tokio::spawn(async move {
            let result = Self::stream_impl(pool, sql, params, tx.clone()).await;
            if let Err(e) = result {
                let _ = tx.send(Err(e)).await;
            }
        });

        RowCursor::Streaming(rx)
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }

    fn db_type(&self) -> &str {
        "mysql"
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Opens [`MysqlReader`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct MysqlConnector;

#[async_trait]
impl RemoteConnector for MysqlConnector {
    async fn connect(&self, params: &ConnectionParams) -> Result<Arc<dyn RemoteReader>> {
        Ok(Arc::new(MysqlReader::connect(params).await?))
    }
}
