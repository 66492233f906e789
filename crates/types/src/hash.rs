//! Cryptographic hashing for the ClaimTrie.
//!
//! Every consensus hash in the trie is a double SHA-256. Three well-known
//! 32-byte sentinels are reserved: the root of an empty trie and the two
//! placeholders used by the post-fork vertex hash when a name has no
//! children or no claims.

use sha2::{Digest, Sha256};

/// SHA-256 hash output (32 bytes).
pub type Hash = [u8; 32];

/// Merkle root reported for an empty trie.
pub const EMPTY_TRIE_HASH: Hash = sentinel(1);

/// Placeholder child root for a vertex with no children (post-fork hashing).
pub const NO_CHILDREN_HASH: Hash = sentinel(2);

/// Placeholder claim root for a name with no activated claims (post-fork hashing).
pub const NO_CLAIMS_HASH: Hash = sentinel(3);

const fn sentinel(tag: u8) -> Hash {
    let mut h = [0u8; 32];
    h[0] = tag;
    h
}

/// Compute SHA-256 of arbitrary data.
#[inline]
pub fn sha256(data: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Compute double SHA-256 of arbitrary data.
#[inline]
pub fn sha256d(data: &[u8]) -> Hash {
    sha256(&sha256(data))
}

/// Combine two child hashes into their parent: `SHA-256d(left || right)`.
pub fn hash_merkle_branches(left: &Hash, right: &Hash) -> Hash {
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(left);
    buf[32..].copy_from_slice(right);
    sha256d(&buf)
}

/// Render a hash in the conventional display order (byte-reversed hex).
pub fn to_display_hex(h: &Hash) -> String {
    let mut rev = *h;
    rev.reverse();
    hex::encode(rev)
}

/// Parse a hash from its display order (byte-reversed hex).
pub fn from_display_hex(s: &str) -> Option<Hash> {
    let mut h = [0u8; 32];
    hex::decode_to_slice(s, &mut h).ok()?;
    h.reverse();
    Some(h)
}
