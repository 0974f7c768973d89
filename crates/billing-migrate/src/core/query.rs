//! Remote query model.
//!
//! Migration plans describe what they need from the foreign database with a
//! [`RemoteQuery`]; drivers translate it (SQL for MySQL, direct evaluation for
//! the in-memory reader). Joins are part of the query so enrichment happens
//! once at query-build time instead of row by row.

use super::value::Value;

/// How rows are delivered to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadMode {
    /// Fetch everything up front; use when the same table is revisited.
    Materialize,
    /// Pull one row at a time.
    #[default]
    Stream,
}

/// A selected column with an optional output name.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectColumn {
    /// Column reference, optionally qualified by table alias (`c.code`).
    pub source: String,
    /// Name in the resulting row; defaults to the unqualified column name.
    pub alias: Option<String>,
}

impl SelectColumn {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            alias: None,
        }
    }

    pub fn aliased(source: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            alias: Some(alias.into()),
        }
    }

    /// Name of this column in the output row.
    pub fn output_name(&self) -> &str {
        match &self.alias {
            Some(a) => a,
            None => split_qualified(&self.source).1,
        }
    }
}

/// Join type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

/// An equality join that pulls extra columns into each row.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub table: String,
    pub alias: String,
    /// Column on an earlier table (qualified).
    pub left: String,
    /// Column on the joined table (unqualified).
    pub right: String,
    pub columns: Vec<SelectColumn>,
}

impl Join {
    pub fn left(
        table: impl Into<String>,
        alias: impl Into<String>,
        left: impl Into<String>,
        right: impl Into<String>,
    ) -> Self {
        Self {
            kind: JoinKind::Left,
            table: table.into(),
            alias: alias.into(),
            left: left.into(),
            right: right.into(),
            columns: Vec::new(),
        }
    }

    pub fn inner(
        table: impl Into<String>,
        alias: impl Into<String>,
        left: impl Into<String>,
        right: impl Into<String>,
    ) -> Self {
        Self {
            kind: JoinKind::Inner,
            ..Self::left(table, alias, left, right)
        }
    }

    /// Select a joined column under an output name.
    #[must_use]
    pub fn select(mut self, column: &str, alias: impl Into<String>) -> Self {
        let source = format!("{}.{}", self.alias, column);
        self.columns.push(SelectColumn::aliased(source, alias));
        self
    }
}

/// Row filter.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    Ne(String, Value),
    Gt(String, Value),
    Gte(String, Value),
    Lt(String, Value),
    Lte(String, Value),
    In(String, Vec<Value>),
    IsNull(String),
    NotNull(String),
}

impl Filter {
    /// Column the filter applies to.
    pub fn column(&self) -> &str {
        match self {
            Filter::Eq(c, _)
            | Filter::Ne(c, _)
            | Filter::Gt(c, _)
            | Filter::Gte(c, _)
            | Filter::Lt(c, _)
            | Filter::Lte(c, _)
            | Filter::In(c, _)
            | Filter::IsNull(c)
            | Filter::NotNull(c) => c,
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// A query against one foreign table.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteQuery {
    pub table: String,
    pub alias: String,
    /// Selected base-table columns; empty selects all of them.
    pub columns: Vec<SelectColumn>,
    pub joins: Vec<Join>,
    pub filters: Vec<Filter>,
    pub order_by: Vec<(String, SortOrder)>,
    pub limit: Option<usize>,
}

impl RemoteQuery {
    /// Query all columns of a table, aliased as `t`.
    pub fn table(name: impl Into<String>) -> Self {
        Self {
            table: name.into(),
            alias: "t".to_string(),
            columns: Vec::new(),
            joins: Vec::new(),
            filters: Vec::new(),
            order_by: Vec::new(),
            limit: None,
        }
    }

    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    #[must_use]
    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.columns
            .extend(columns.iter().map(|c| SelectColumn::new(*c)));
        self
    }

    #[must_use]
    pub fn join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    #[must_use]
    pub fn eq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::Eq(column.into(), value.into()))
    }

    #[must_use]
    pub fn order_by(mut self, column: impl Into<String>, order: SortOrder) -> Self {
        self.order_by.push((column.into(), order));
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Qualify a column reference with the base alias if it has none.
    pub fn qualify(&self, column: &str) -> String {
        if column.contains('.') {
            column.to_string()
        } else {
            format!("{}.{}", self.alias, column)
        }
    }
}

/// Split `alias.column` into its parts; unqualified names have no alias.
pub fn split_qualified(reference: &str) -> (Option<&str>, &str) {
    match reference.split_once('.') {
        Some((alias, column)) => (Some(alias), column),
        None => (None, reference),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_names() {
        assert_eq!(SelectColumn::new("t.email").output_name(), "email");
        assert_eq!(SelectColumn::new("email").output_name(), "email");
        assert_eq!(
            SelectColumn::aliased("c.code", "currency_code").output_name(),
            "currency_code"
        );
    }

    #[test]
    fn test_builder_collects_parts() {
        let q = RemoteQuery::table("tblinvoices")
            .alias("i")
            .join(Join::left("tblclients", "cl", "i.userid", "id").select("currency", "client_currency"))
            .eq("status", "Paid")
            .order_by("id", SortOrder::Asc);

        assert_eq!(q.alias, "i");
        assert_eq!(q.joins[0].columns[0].source, "cl.currency");
        assert_eq!(q.qualify("status"), "i.status");
        assert_eq!(q.qualify("cl.id"), "cl.id");
        assert_eq!(q.filters[0].column(), "status");
    }
}
