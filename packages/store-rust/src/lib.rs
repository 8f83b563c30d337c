//! entitygraph store: a normalized entity store with atomic multi-table
//! commits, memoized reads and change observers.

pub mod config;
pub mod logging;
pub mod query;
pub mod storage;
pub mod store;

pub use config::{RemovalMode, StoreConfig};
pub use query::{CacheStats, QueryCache, QueryKey};
pub use storage::{
    ChangeObserver, CompositeChangeObserver, ObserverId, StorageEngine, StoreSnapshot,
    SwapStorage, TableSnapshot, Transaction,
};
pub use store::{ModelHandle, ModelStore};
