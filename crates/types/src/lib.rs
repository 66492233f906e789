//! Core types, errors, and cryptographic primitives for the ClaimTrie.
//!
//! This crate provides the foundational pieces used throughout the engine:
//! - Value types for claims and stakes (OutPoint, ClaimId, Claim, Status)
//! - The Change record and its consensus binary codec
//! - Cryptographic hashing (double SHA-256) and merkle helpers
//! - Name normalization (NFD + Unicode case fold)
//! - Network parameters and fork heights
//! - Error types using snafu

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod change;
pub mod codec;
pub mod error;
pub mod hash;
pub mod merkle;
pub mod normalization;
pub mod params;
pub mod types;

// Re-export commonly used items at the crate root.
pub use change::{Change, ChangeType};
pub use error::{ClaimTrieError, Result};
pub use hash::{
    hash_merkle_branches, sha256d, Hash, EMPTY_TRIE_HASH, NO_CHILDREN_HASH, NO_CLAIMS_HASH,
};
pub use merkle::{compute_merkle_path, compute_merkle_root};
pub use normalization::{normalize, normalize_if_necessary};
pub use params::{set_network, Network, Params};
pub use types::{Amount, Claim, ClaimId, Height, OutPoint, Status};
