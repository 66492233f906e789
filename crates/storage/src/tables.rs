//! Table definitions for the four repositories.
//!
//! Every table uses raw byte keys except the block table, whose `u32` key
//! order coincides with big-endian height order.

use redb::TableDefinition;

/// Table definitions for ClaimTrie storage.
pub struct Tables;

impl Tables {
    /// Per-name change log: name → concatenated consensus records.
    pub const CHANGES: TableDefinition<'static, &'static [u8], &'static [u8]> =
        TableDefinition::new("changes");

    /// Computed roots: height → 32-byte hash.
    pub const BLOCK_HASHES: TableDefinition<'static, u32, &'static [u8]> =
        TableDefinition::new("block_hashes");

    /// Temporal index: `be32 height || 0x00 || name` → ().
    pub const TEMPORAL: TableDefinition<'static, &'static [u8], ()> =
        TableDefinition::new("temporal");

    /// Trie vertices: `prefix || merkle_hash` → child list plus claim-hash slot.
    pub const TRIE_NODES: TableDefinition<'static, &'static [u8], &'static [u8]> =
        TableDefinition::new("trie_nodes");
}
