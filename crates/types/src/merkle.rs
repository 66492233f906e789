//! Merkle computations over ordered hash lists.
//!
//! The consensus rule pairs adjacent hashes with a double SHA-256 and, when a
//! level holds an odd count, duplicates the last element. This differs from
//! padded binary trees, so the fold is implemented directly.

use crate::hash::{hash_merkle_branches, Hash};

/// Compute the merkle root of an ordered hash list.
///
/// Returns `None` for an empty list; the caller substitutes the sentinel
/// appropriate to its context.
pub fn compute_merkle_root(hashes: &[Hash]) -> Option<Hash> {
    if hashes.is_empty() {
        return None;
    }
    let mut level = hashes.to_vec();
    while level.len() > 1 {
        if level.len() & 1 == 1 {
            let last = level[level.len() - 1];
            level.push(last);
        }
        level = level
            .chunks_exact(2)
            .map(|pair| hash_merkle_branches(&pair[0], &pair[1]))
            .collect();
    }
    Some(level[0])
}

/// Compute the sibling path for the leaf at `idx`, bottom level first.
///
/// The path pairs with the same duplicate-last procedure as
/// [`compute_merkle_root`]: a verifier folds the leaf upward, placing each
/// partial on the side indicated by the corresponding bit of `idx`.
pub fn compute_merkle_path(hashes: &[Hash], idx: usize) -> Vec<Hash> {
    let mut partials = Vec::new();
    if hashes.is_empty() || idx >= hashes.len() {
        return partials;
    }
    let mut level = hashes.to_vec();
    let mut idx = idx;
    while level.len() > 1 {
        if level.len() & 1 == 1 {
            let last = level[level.len() - 1];
            level.push(last);
        }
        partials.push(level[idx ^ 1]);
        idx >>= 1;
        level = level
            .chunks_exact(2)
            .map(|pair| hash_merkle_branches(&pair[0], &pair[1]))
            .collect();
    }
    partials
}
