//! Engine configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default capacity of the node manager's materialized-node cache.
pub const DEFAULT_NODE_CACHE_SIZE: usize = 16_000;

/// Configuration for a [`crate::ClaimTrie`] instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the four repository databases.
    pub data_dir: PathBuf,
    /// Use the in-memory trie (preferred) instead of the disk-backed one.
    pub ram_trie: bool,
    /// Capacity of the node manager's materialized-node cache.
    pub node_cache_size: usize,
}

impl Config {
    /// A configuration rooted at `data_dir`, with the in-memory trie.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ram_trie: true,
            node_cache_size: DEFAULT_NODE_CACHE_SIZE,
        }
    }

    /// Select the disk-backed trie.
    pub fn with_persistent_trie(mut self) -> Self {
        self.ram_trie = false;
        self
    }

    /// Override the node-cache capacity.
    pub fn with_node_cache_size(mut self, size: usize) -> Self {
        self.node_cache_size = size;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new("claimtrie_data")
    }
}
