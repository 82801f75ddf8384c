use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

/// One stored row: column name to cell value.
pub type Row = BTreeMap<String, Value>;

/// Ordered primary-key columns identifying a row (or, as a prefix, a
/// partition). Column order is significant, mirroring a column-family
/// store's clustering order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowKey {
    columns: Vec<(String, Value)>,
}

impl RowKey {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.columns.push((column.to_string(), value.into()));
        self
    }

    pub fn columns(&self) -> &[(String, Value)] {
        &self.columns
    }

    fn encode(&self) -> String {
        let mut encoded = String::new();
        for (_, value) in &self.columns {
            encoded.push_str(&value.to_string());
            encoded.push('\u{1f}');
        }
        encoded
    }
}

/// Row-oriented port over the durable column-family store. Operations are
/// parameter-bound and carry no business logic; tables without native
/// secondary indexes are queried through caller-maintained projections.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Writes a full row. An existing row under the same key is replaced.
    async fn insert(&self, table: &str, key: &RowKey, row: Row) -> Result<(), StorageError>;
    async fn fetch(&self, table: &str, key: &RowKey) -> Result<Option<Row>, StorageError>;
    /// Applies column assignments to an existing row. Returns `false` when
    /// no row matched the key.
    async fn update(&self, table: &str, key: &RowKey, assignments: Row)
        -> Result<bool, StorageError>;
    async fn remove(&self, table: &str, key: &RowKey) -> Result<bool, StorageError>;
    /// All rows whose leading key columns equal `partition`, in clustering
    /// order.
    async fn scan(&self, table: &str, partition: &RowKey) -> Result<Vec<Row>, StorageError>;
    async fn ping(&self) -> Result<(), StorageError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("durable store unavailable: {0}")]
    Unavailable(String),
    #[error("stored row is corrupt: {0}")]
    Corrupt(String),
}

#[derive(Debug, Default)]
struct Table {
    rows: BTreeMap<String, (RowKey, Row)>,
}

/// Process-local durable store: one ordered map per table, keyed by the
/// encoded primary key.
#[derive(Debug, Default)]
pub struct InMemoryDurableStore {
    tables: RwLock<HashMap<String, Table>>,
}

impl InMemoryDurableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows currently held by `table`.
    pub async fn row_count(&self, table: &str) -> usize {
        let tables = self.tables.read().await;
        tables.get(table).map(|t| t.rows.len()).unwrap_or(0)
    }
}

fn key_matches_partition(key: &RowKey, partition: &RowKey) -> bool {
    let prefix = partition.columns();
    let columns = key.columns();
    if prefix.len() > columns.len() {
        return false;
    }
    prefix
        .iter()
        .zip(columns)
        .all(|(wanted, actual)| wanted == actual)
}

#[async_trait]
impl DurableStore for InMemoryDurableStore {
    async fn insert(&self, table: &str, key: &RowKey, row: Row) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        tables
            .entry(table.to_string())
            .or_default()
            .rows
            .insert(key.encode(), (key.clone(), row));
        Ok(())
    }

    async fn fetch(&self, table: &str, key: &RowKey) -> Result<Option<Row>, StorageError> {
        let tables = self.tables.read().await;
        Ok(tables
            .get(table)
            .and_then(|t| t.rows.get(&key.encode()))
            .map(|(_, row)| row.clone()))
    }

    async fn update(
        &self,
        table: &str,
        key: &RowKey,
        assignments: Row,
    ) -> Result<bool, StorageError> {
        let mut tables = self.tables.write().await;
        let Some(table) = tables.get_mut(table) else {
            return Ok(false);
        };
        let Some((_, row)) = table.rows.get_mut(&key.encode()) else {
            return Ok(false);
        };
        for (column, value) in assignments {
            row.insert(column, value);
        }
        Ok(true)
    }

    async fn remove(&self, table: &str, key: &RowKey) -> Result<bool, StorageError> {
        let mut tables = self.tables.write().await;
        Ok(tables
            .get_mut(table)
            .map(|t| t.rows.remove(&key.encode()).is_some())
            .unwrap_or(false))
    }

    async fn scan(&self, table: &str, partition: &RowKey) -> Result<Vec<Row>, StorageError> {
        let tables = self.tables.read().await;
        Ok(tables
            .get(table)
            .map(|t| {
                t.rows
                    .values()
                    .filter(|(key, _)| key_matches_partition(key, partition))
                    .map(|(_, row)| row.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn ping(&self) -> Result<(), StorageError> {
        Ok(())
    }
}
