//! In-memory storage sink
//!
//! Tracks natural keys per table, giving the same insert-or-ignore
//! accounting as Postgres without a database. Backs `--dry-run` and the
//! test suite.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::entities::RowBatch;
use crate::error::Result;

use super::{EntityStore, InsertStats};

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<&'static str, HashSet<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Distinct rows currently held for a table.
    pub async fn row_count(&self, table: &str) -> usize {
        self.tables
            .lock()
            .await
            .get(table)
            .map(HashSet::len)
            .unwrap_or(0)
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn insert_ignore(&self, batch: RowBatch) -> Result<InsertStats> {
        let table = batch.entity().table();
        let keys = batch.natural_keys();
        let total = keys.len() as u64;

        let mut tables = self.tables.lock().await;
        let existing = tables.entry(table).or_default();

        let mut inserted = 0u64;
        for key in keys {
            if existing.insert(key) {
                inserted += 1;
            }
        }

        Ok(InsertStats {
            inserted,
            skipped: total - inserted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{SaleRow, StorageRow};

    fn sale(id: &str) -> SaleRow {
        SaleRow::from_api(&serde_json::json!({
            "g_number": "G-1",
            "date": "2026-08-01",
            "barcode": 1,
            "sale_id": id,
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_duplicate_keys_are_skipped() {
        let store = MemoryStore::new();

        let stats = store
            .insert_ignore(RowBatch::Sales(vec![sale("a"), sale("b"), sale("a")]))
            .await
            .unwrap();
        assert_eq!(stats.inserted, 2);
        assert_eq!(stats.skipped, 1);

        let stats = store
            .insert_ignore(RowBatch::Sales(vec![sale("b"), sale("c")]))
            .await
            .unwrap();
        assert_eq!(stats.inserted, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(store.row_count("sales").await, 3);
    }
}
