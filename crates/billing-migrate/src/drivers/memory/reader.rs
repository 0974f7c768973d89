//! Remote reader over in-memory tables.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::config::ConnectionParams;
use crate::core::query::split_qualified;
use crate::core::traits::{RemoteConnector, RemoteReader, RowCursor};
use crate::core::{Filter, JoinKind, RemoteQuery, Row, SortOrder, Value};
use crate::error::{MigrateError, Result};

use super::{compare_values, values_equal};

/// Foreign database held in memory. Tables that were never loaded read as
/// empty.
#[derive(Debug, Clone, Default)]
pub struct MemoryReader {
    tables: HashMap<String, Vec<Row>>,
}

/// A base row plus the joined rows, keyed by alias.
type Scope<'a> = HashMap<&'a str, Option<&'a Row>>;

impl MemoryReader {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_table(mut self, name: impl Into<String>, rows: Vec<Row>) -> Self {
        self.tables.insert(name.into(), rows);
        self
    }

    pub fn insert_row(&mut self, table: &str, row: Row) {
        self.tables.entry(table.to_string()).or_default().push(row);
    }

    fn rows_of(&self, table: &str) -> &[Row] {
        self.tables.get(table).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Evaluate a query: joins, filters, ordering, limit, projection.
    pub fn evaluate(&self, query: &RemoteQuery) -> Result<Vec<Row>> {
        let mut scopes: Vec<Scope<'_>> = Vec::new();

        'rows: for base in self.rows_of(&query.table) {
            let mut scope: Scope<'_> = HashMap::new();
            scope.insert(query.alias.as_str(), Some(base));

            for join in &query.joins {
                let key = lookup(&scope, &join.left, &query.alias);
                let matched = self
                    .rows_of(&join.table)
                    .iter()
                    .find(|candidate| values_equal(&key, candidate.get(&join.right)));
                if matched.is_none() && join.kind == JoinKind::Inner {
                    continue 'rows;
                }
                scope.insert(join.alias.as_str(), matched);
            }

            for filter in &query.filters {
                if !matches(filter, &scope, &query.alias) {
                    continue 'rows;
                }
            }
            scopes.push(scope);
        }

        if !query.order_by.is_empty() {
            scopes.sort_by(|a, b| {
                for (column, order) in &query.order_by {
                    let ord = compare_values(
                        &lookup(a, column, &query.alias),
                        &lookup(b, column, &query.alias),
                    )
                    .unwrap_or(Ordering::Equal);
                    let ord = match order {
                        SortOrder::Asc => ord,
                        SortOrder::Desc => ord.reverse(),
                    };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }

        if let Some(limit) = query.limit {
            scopes.truncate(limit);
        }

        scopes
            .iter()
            .map(|scope| project(query, scope))
            .collect()
    }
}

fn lookup(scope: &Scope<'_>, reference: &str, base_alias: &str) -> Value {
    let (alias, column) = split_qualified(reference);
    scope
        .get(alias.unwrap_or(base_alias))
        .copied()
        .flatten()
        .map(|row| row.get(column).clone())
        .unwrap_or(Value::Null)
}

fn matches(filter: &Filter, scope: &Scope<'_>, base_alias: &str) -> bool {
    let value = lookup(scope, filter.column(), base_alias);
    let cmp = |other: &Value| compare_values(&value, other);
    match filter {
        Filter::Eq(_, v) => values_equal(&value, v),
        Filter::Ne(_, v) => matches!(cmp(v), Some(o) if o != Ordering::Equal),
        Filter::Gt(_, v) => cmp(v) == Some(Ordering::Greater),
        Filter::Gte(_, v) => matches!(cmp(v), Some(Ordering::Greater | Ordering::Equal)),
        Filter::Lt(_, v) => cmp(v) == Some(Ordering::Less),
        Filter::Lte(_, v) => matches!(cmp(v), Some(Ordering::Less | Ordering::Equal)),
        Filter::In(_, values) => values.iter().any(|v| values_equal(&value, v)),
        Filter::IsNull(_) => value.is_null(),
        Filter::NotNull(_) => !value.is_null(),
    }
}

fn project(query: &RemoteQuery, scope: &Scope<'_>) -> Result<Row> {
    let mut row = Row::new();
    if query.columns.is_empty() {
        if let Some(Some(base)) = scope.get(query.alias.as_str()) {
            for (column, value) in base.iter() {
                row.set(column.clone(), value.clone());
            }
        }
    } else {
        for column in &query.columns {
            row.set(
                column.output_name(),
                lookup(scope, &column.source, &query.alias),
            );
        }
    }
    for join in &query.joins {
        for column in &join.columns {
            let (alias, _) = split_qualified(&column.source);
            if alias.is_some_and(|a| !scope.contains_key(a)) {
                return Err(MigrateError::Config(format!(
                    "Join column {} refers to an unknown alias",
                    column.source
                )));
            }
            row.set(
                column.output_name(),
                lookup(scope, &column.source, &query.alias),
            );
        }
    }
    Ok(row)
}

#[async_trait]
impl RemoteReader for MemoryReader {
    async fn fetch_all(&self, query: &RemoteQuery) -> Result<Vec<Row>> {
        self.evaluate(query)
    }

    fn stream(&self, query: &RemoteQuery) -> RowCursor {
        match self.evaluate(query) {
            Ok(rows) => RowCursor::from_rows(rows),
            Err(e) => {
                let (tx, rx) = mpsc::channel(1);
                let _ = tx.try_send(Err(e));
                RowCursor::Streaming(rx)
            }
        }
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn db_type(&self) -> &str {
        "memory"
    }

    async fn close(&self) {}
}

/// Connector handing out one shared [`MemoryReader`].
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    reader: Arc<MemoryReader>,
}

impl MemoryConnector {
    pub fn new(reader: MemoryReader) -> Self {
        Self {
            reader: Arc::new(reader),
        }
    }
}

#[async_trait]
impl RemoteConnector for MemoryConnector {
    async fn connect(&self, params: &ConnectionParams) -> Result<Arc<dyn RemoteReader>> {
        if params.host.trim().is_empty() {
            return Err(MigrateError::connection("host", "host is required"));
        }
        Ok(self.reader.clone())
    }
}
