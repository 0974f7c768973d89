//! Local store over in-memory tables.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::core::traits::LocalStore;
use crate::core::{LocalId, Record, Row};
use crate::error::{MigrateError, Result};

use super::values_equal;

#[derive(Debug, Default)]
struct Tables {
    rows: HashMap<String, Vec<Row>>,
    next_id: HashMap<String, LocalId>,
    resets: u64,
}

/// Auto-increment tables; every inserted row gets an `id` column.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| MigrateError::local("lock poisoned", "memory store"))
    }

    /// Insert directly, bypassing writers (fixtures).
    pub fn seed(&self, table: &str, record: Record) -> Result<LocalId> {
        let mut tables = self.lock()?;
        Ok(insert_row(&mut tables, table, record))
    }

    /// Snapshot of a table.
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.lock()
            .map(|t| t.rows.get(table).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    /// Number of times [`LocalStore::reset`] was called.
    pub fn reset_count(&self) -> u64 {
        self.lock().map(|t| t.resets).unwrap_or(0)
    }
}

fn insert_row(tables: &mut Tables, table: &str, record: Record) -> LocalId {
    let next = tables.next_id.entry(table.to_string()).or_insert(1);
    let id = *next;
    *next += 1;

    let mut row = Row::new().with("id", id);
    for (column, value) in record {
        if column != "id" {
            row.set(column, value);
        }
    }
    tables.rows.entry(table.to_string()).or_default().push(row);
    id
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn insert(&self, table: &str, record: &Record) -> Result<LocalId> {
        let mut tables = self.lock()?;
        Ok(insert_row(&mut tables, table, record.clone()))
    }

    async fn find(&self, table: &str, criteria: &Record) -> Result<Vec<Row>> {
        let tables = self.lock()?;
        Ok(tables
            .rows
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| {
                        criteria
                            .iter()
                            .all(|(column, value)| values_equal(row.get(column), value))
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn count(&self, table: &str) -> Result<u64> {
        let tables = self.lock()?;
        Ok(tables.rows.get(table).map(|r| r.len() as u64).unwrap_or(0))
    }

    async fn reset(&self) -> Result<()> {
        self.lock()?.resets += 1;
        Ok(())
    }

    fn store_type(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ids_increment_per_table() {
        let store = MemoryStore::new();
        let rec = Row::new().with("name", "a");
        assert_eq!(store.insert("clients", &rec).await.unwrap(), 1);
        assert_eq!(store.insert("clients", &rec).await.unwrap(), 2);
        assert_eq!(store.insert("invoices", &rec).await.unwrap(), 1);
        assert_eq!(store.count("clients").await.unwrap(), 2);
        assert_eq!(store.count("missing").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_find_matches_all_criteria() {
        let store = MemoryStore::new();
        store
            .seed("modules", Row::new().with("company_id", 1i64).with("class", "cpanel"))
            .unwrap();
        store
            .seed("modules", Row::new().with("company_id", 2i64).with("class", "cpanel"))
            .unwrap();

        let criteria = Row::new().with("company_id", 2i64).with("class", "cpanel");
        let found = store.find("modules", &criteria).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].int("id"), Some(2));
    }

    #[tokio::test]
    async fn test_reset_is_counted() {
        let store = MemoryStore::new();
        store.reset().await.unwrap();
        store.reset().await.unwrap();
        assert_eq!(store.reset_count(), 2);
    }
}
