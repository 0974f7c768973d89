//! MySQL/MariaDB SQL dialect.
//!
//! Turns the query model into SQL text plus positional (`?`) parameters.
//! Identifiers are always quoted; values are always bound.

use crate::core::query::split_qualified;
use crate::core::{Filter, JoinKind, Record, RemoteQuery, SortOrder, Value};

/// MySQL/MariaDB dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct MysqlDialect;

impl MysqlDialect {
    pub fn new() -> Self {
        Self
    }

    pub fn name(&self) -> &str {
        "mysql"
    }

    /// Quote an identifier, doubling embedded backticks.
    pub fn quote_ident(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    /// Quote `alias.column` (or a bare column, qualified with `default_alias`).
    fn quote_ref(&self, reference: &str, default_alias: &str) -> String {
        let (alias, column) = split_qualified(reference);
        format!(
            "{}.{}",
            self.quote_ident(alias.unwrap_or(default_alias)),
            self.quote_ident(column)
        )
    }

    /// SELECT for a remote query.
    pub fn build_select(&self, query: &RemoteQuery) -> (String, Vec<Value>) {
        let alias = query.alias.as_str();
        let mut select: Vec<String> = if query.columns.is_empty() {
            vec![format!("{}.*", self.quote_ident(alias))]
        } else {
            query
                .columns
                .iter()
                .map(|c| {
                    format!(
                        "{} AS {}",
                        self.quote_ref(&c.source, alias),
                        self.quote_ident(c.output_name())
                    )
                })
                .collect()
        };
        for join in &query.joins {
            select.extend(join.columns.iter().map(|c| {
                format!(
                    "{} AS {}",
                    self.quote_ref(&c.source, &join.alias),
                    self.quote_ident(c.output_name())
                )
            }));
        }

        let mut sql = format!(
            "SELECT {} FROM {} AS {}",
            select.join(", "),
            self.quote_ident(&query.table),
            self.quote_ident(alias)
        );

        for join in &query.joins {
            let kind = match join.kind {
                JoinKind::Inner => "INNER JOIN",
                JoinKind::Left => "LEFT JOIN",
            };
            sql.push_str(&format!(
                " {} {} AS {} ON {} = {}.{}",
                kind,
                self.quote_ident(&join.table),
                self.quote_ident(&join.alias),
                self.quote_ref(&join.left, alias),
                self.quote_ident(&join.alias),
                self.quote_ident(&join.right)
            ));
        }

        let mut params = Vec::new();
        let conditions: Vec<String> = query
            .filters
            .iter()
            .map(|f| self.build_condition(f, alias, &mut params))
            .collect();
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }

        if !query.order_by.is_empty() {
            let order: Vec<String> = query
                .order_by
                .iter()
                .map(|(column, dir)| {
                    let dir = match dir {
                        SortOrder::Asc => "ASC",
                        SortOrder::Desc => "DESC",
                    };
                    format!("{} {}", self.quote_ref(column, alias), dir)
                })
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&order.join(", "));
        }

        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        (sql, params)
    }

    fn build_condition(&self, filter: &Filter, alias: &str, params: &mut Vec<Value>) -> String {
        let column = self.quote_ref(filter.column(), alias);
        let (op, value) = match filter {
            Filter::Eq(_, v) => ("=", v),
            Filter::Ne(_, v) => ("<>", v),
            Filter::Gt(_, v) => (">", v),
            Filter::Gte(_, v) => (">=", v),
            Filter::Lt(_, v) => ("<", v),
            Filter::Lte(_, v) => ("<=", v),
            Filter::In(_, values) if values.is_empty() => return "1 = 0".to_string(),
            Filter::In(_, values) => {
                params.extend(values.iter().cloned());
                return format!("{} IN ({})", column, vec!["?"; values.len()].join(", "));
            }
            Filter::IsNull(_) => return format!("{} IS NULL", column),
            Filter::NotNull(_) => return format!("{} IS NOT NULL", column),
        };
        params.push(value.clone());
        format!("{} {} ?", column, op)
    }

    /// INSERT of one record.
    pub fn build_insert(&self, table: &str, record: &Record) -> (String, Vec<Value>) {
        let columns: Vec<String> = record.columns().map(|c| self.quote_ident(c)).collect();
        let params: Vec<Value> = record.iter().map(|(_, v)| v.clone()).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.quote_ident(table),
            columns.join(", "),
            vec!["?"; params.len()].join(", ")
        );
        (sql, params)
    }

    /// SELECT rows equal to every criteria value; NULL criteria match NULL.
    pub fn build_find(&self, table: &str, criteria: &Record) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let conditions: Vec<String> = criteria
            .iter()
            .map(|(column, value)| {
                if value.is_null() {
                    format!("{} IS NULL", self.quote_ident(column))
                } else {
                    params.push(value.clone());
                    format!("{} = ?", self.quote_ident(column))
                }
            })
            .collect();

        let mut sql = format!("SELECT * FROM {}", self.quote_ident(table));
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        (sql, params)
    }

    pub fn build_count(&self, table: &str) -> String {
        format!("SELECT COUNT(*) AS cnt FROM {}", self.quote_ident(table))
    }
}
