//! Core value types for claims and stakes.

use std::fmt;
use std::str::FromStr;

use ripemd::Ripemd160;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::params::Params;

/// Block height. Negative values only appear as disabled fork sentinels.
pub type Height = i32;

/// Stake amount in base units.
pub type Amount = i64;

/// A transaction output reference: 32-byte transaction hash plus output index.
///
/// Ordering is lexicographic on the raw hash bytes, then by index; the
/// derived ordering over the fields in declaration order matches that rule
/// and is part of consensus (bid tie-breaking).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct OutPoint {
    /// Transaction hash, in internal byte order.
    pub hash: [u8; 32],
    /// Output index within the transaction.
    pub index: u32,
}

impl OutPoint {
    /// Create an outpoint from a transaction hash and output index.
    pub const fn new(hash: [u8; 32], index: u32) -> Self {
        Self { hash, index }
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Transaction hashes display byte-reversed, per convention.
        let mut rev = self.hash;
        rev.reverse();
        write!(f, "{}:{}", hex::encode(rev), self.index)
    }
}

/// A 20-byte claim identifier.
///
/// For a fresh claim it is `RIPEMD-160(SHA-256(tx_hash || be32(index)))` of
/// the originating outpoint. Presented to users as byte-reversed hex.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct ClaimId(pub [u8; 20]);

impl ClaimId {
    /// Derive the identifier for a claim created at `op`.
    pub fn from_outpoint(op: &OutPoint) -> Self {
        let mut buf = [0u8; 36];
        buf[..32].copy_from_slice(&op.hash);
        buf[32..].copy_from_slice(&op.index.to_be_bytes());
        let sha = Sha256::digest(buf);
        let mut id = [0u8; 20];
        id.copy_from_slice(&Ripemd160::digest(sha));
        Self(id)
    }

    /// Raw identifier bytes.
    pub const fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for ClaimId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut rev = self.0;
        rev.reverse();
        write!(f, "{}", hex::encode(rev))
    }
}

/// Error returned when parsing a [`ClaimId`] from hex.
#[derive(Debug, PartialEq, Eq)]
pub struct ParseClaimIdError;

impl fmt::Display for ParseClaimIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid claim id hex")
    }
}

impl std::error::Error for ParseClaimIdError {}

impl FromStr for ClaimId {
    type Err = ParseClaimIdError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut id = [0u8; 20];
        hex::decode_to_slice(s, &mut id).map_err(|_| ParseClaimIdError)?;
        id.reverse();
        Ok(Self(id))
    }
}

/// Lifecycle of a claim or support inside a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    /// Landed in a block, waiting out its activation delay.
    Accepted,
    /// Participating in the bid for the name.
    Activated,
    /// Spent in the current block; removed on the next advance.
    Deactivated,
}

/// A stake on a name: either a claim or a support.
///
/// Supports carry the same shape and are linked to their claim solely by
/// `claim_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    /// Anchoring transaction output.
    pub out_point: OutPoint,
    /// Identifier linking updates and supports to this claim.
    pub claim_id: ClaimId,
    /// Staked amount.
    pub amount: Amount,
    /// Height at which the stake landed in a block.
    pub accepted_at: Height,
    /// `accepted_at` plus the computed activation delay.
    pub active_at: Height,
    /// Height from which the stake is visible at all. Only the
    /// normalization-fork migration produces values later than `accepted_at`.
    pub visible_at: Height,
    /// Current lifecycle status.
    pub status: Status,
    /// Opaque payload bytes (metadata, URL, ...). Empty for supports.
    pub value: Vec<u8>,
    /// Arrival order within the node, used by the v3 hash leaf.
    pub sequence: u32,
}

impl Claim {
    /// The height at which this stake expires.
    ///
    /// Stakes whose original expiration lands after the extension fork get
    /// the extended lifetime; the rule is evaluated against `accepted_at`.
    pub fn expire_at(&self) -> Height {
        let params = Params::active();
        if self.accepted_at + params.original_claim_expiration_time
            > params.extended_claim_expiration_fork_height
        {
            self.accepted_at + params.extended_claim_expiration_time
        } else {
            self.accepted_at + params.original_claim_expiration_time
        }
    }
}
