//! Concrete [`StorageEngine`](super::StorageEngine) implementations.

pub mod swap;

pub use swap::SwapStorage;
