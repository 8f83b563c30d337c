//! Versioned table storage for the model store.
//!
//! Provides the layers underneath [`ModelStore`](crate::ModelStore):
//!
//! - [`StorageEngine`]: owns the current [`StoreSnapshot`] and publishes
//!   new ones atomically ([`SwapStorage`] keeps it behind an `ArcSwap`)
//! - [`Transaction`]: private working copy of the tables one write touches,
//!   committed all at once or dropped
//!
//! Additionally defines [`ChangeObserver`] for reacting to committed changes
//! and [`CompositeChangeObserver`] for fan-out to subscribers.

pub mod engine;
pub mod engines;
pub mod observer;
pub mod snapshot;
pub mod transaction;

pub use engine::*;
pub use engines::SwapStorage;
pub use observer::*;
pub use snapshot::*;
pub use transaction::*;
