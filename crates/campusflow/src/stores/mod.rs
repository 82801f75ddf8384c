pub mod cache;
pub mod durable;
pub mod graph;

pub use cache::{CacheError, CacheStore, InMemoryCacheStore};
pub use durable::{DurableStore, InMemoryDurableStore, Row, RowKey, StorageError};
pub use graph::{GraphError, GraphStore, GraphUpdate, InMemoryGraphStore, InterestSnapshot};
