//! Stable binary serialization of change records.
//!
//! The change log persists each record in a fixed big-endian layout:
//!
//! ```text
//! be32 type || be32 height || be32 active_height || be32 visible_height ||
//! be64 amount || 20B claim_id || 32B outpoint_hash || be32 outpoint_index ||
//! be32 value_len || value || be32 child_count || (be32 len || name)*
//! ```
//!
//! The name itself is the storage key and is not part of the record;
//! decoding takes the name and re-attaches it.

use snafu::Snafu;

use crate::change::{Change, ChangeType};
use crate::types::{ClaimId, OutPoint};

/// Error type for codec operations.
#[derive(Debug, Snafu)]
pub enum CodecError {
    /// The record ended before all fields were read.
    #[snafu(display("Truncated change record: needed {needed} more bytes"))]
    Truncated {
        /// How many bytes the next field required.
        needed: usize,
    },

    /// The type discriminant is outside the closed enum.
    #[snafu(display("Unknown change type {value}"))]
    UnknownType {
        /// The rejected discriminant.
        value: u32,
    },
}

/// Result type for codec operations.
pub type Result<T> = std::result::Result<T, CodecError>;

/// Append the consensus serialization of `chg` to `buf`.
pub fn encode_change(chg: &Change, buf: &mut Vec<u8>) {
    buf.extend_from_slice(&(chg.change_type as u32).to_be_bytes());
    buf.extend_from_slice(&(chg.height as u32).to_be_bytes());
    buf.extend_from_slice(&(chg.active_height as u32).to_be_bytes());
    buf.extend_from_slice(&(chg.visible_height as u32).to_be_bytes());
    buf.extend_from_slice(&chg.amount.to_be_bytes());
    buf.extend_from_slice(chg.claim_id.as_bytes());
    buf.extend_from_slice(&chg.out_point.hash);
    buf.extend_from_slice(&chg.out_point.index.to_be_bytes());
    buf.extend_from_slice(&(chg.value.len() as u32).to_be_bytes());
    buf.extend_from_slice(&chg.value);
    buf.extend_from_slice(&(chg.spent_children.len() as u32).to_be_bytes());
    for child in &chg.spent_children {
        buf.extend_from_slice(&(child.len() as u32).to_be_bytes());
        buf.extend_from_slice(child);
    }
}

/// Decode a single record from the front of `data`, attaching `name`.
///
/// Advances `data` past the record.
pub fn decode_change(name: &[u8], data: &mut &[u8]) -> Result<Change> {
    let type_raw = read_u32(data)?;
    let change_type =
        ChangeType::from_u32(type_raw).ok_or(CodecError::UnknownType { value: type_raw })?;
    let height = read_u32(data)? as i32;
    let active_height = read_u32(data)? as i32;
    let visible_height = read_u32(data)? as i32;
    let amount = i64::from_be_bytes(read_array::<8>(data)?);
    let claim_id = ClaimId(read_array::<20>(data)?);
    let hash = read_array::<32>(data)?;
    let index = read_u32(data)?;
    let value = read_bytes(data)?;
    let child_count = read_u32(data)? as usize;
    let mut spent_children = std::collections::BTreeSet::new();
    for _ in 0..child_count {
        spent_children.insert(read_bytes(data)?);
    }

    Ok(Change {
        change_type,
        height,
        active_height,
        visible_height,
        name: name.to_vec(),
        claim_id,
        out_point: OutPoint::new(hash, index),
        amount,
        value,
        spent_children,
    })
}

/// Decode a concatenation of records, attaching `name` to each, then
/// stable-sort by height.
///
/// The sort matters: the normalization-fork migration appends records that
/// carry pre-fork heights after later records are already on disk.
pub fn decode_changes(name: &[u8], mut data: &[u8]) -> Result<Vec<Change>> {
    let mut changes = Vec::new();
    while !data.is_empty() {
        changes.push(decode_change(name, &mut data)?);
    }
    changes.sort_by_key(|c| c.height);
    Ok(changes)
}

fn read_array<const N: usize>(data: &mut &[u8]) -> Result<[u8; N]> {
    if data.len() < N {
        return Err(CodecError::Truncated { needed: N });
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&data[..N]);
    *data = &data[N..];
    Ok(out)
}

fn read_u32(data: &mut &[u8]) -> Result<u32> {
    Ok(u32::from_be_bytes(read_array::<4>(data)?))
}

fn read_bytes(data: &mut &[u8]) -> Result<Vec<u8>> {
    let len = read_u32(data)? as usize;
    if data.len() < len {
        return Err(CodecError::Truncated { needed: len });
    }
    let out = data[..len].to_vec();
    *data = &data[len..];
    Ok(out)
}
