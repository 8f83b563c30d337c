use serde::{Deserialize, Serialize};

/// What `remove` leaves behind in a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RemovalMode {
    /// Keep the slot as an empty marker; reads treat it as absent.
    #[default]
    Tombstone,
    /// Drop the slot entirely.
    Delete,
}

/// Store-level configuration.
///
/// Controls memoized query capacity and removal behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StoreConfig {
    /// Maximum number of memoized query results kept at once.
    pub memo_capacity: usize,
    /// How removed records are represented.
    pub removal: RemovalMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            memo_capacity: 1024,
            removal: RemovalMode::Tombstone,
        }
    }
}
