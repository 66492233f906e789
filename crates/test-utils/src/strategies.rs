//! Strategy definitions.

use claimtrie_types::{Change, ChangeType, ClaimId, OutPoint};
use proptest::prelude::*;

/// An arbitrary claim name: 1-24 bytes drawn from a printable alphabet, so
/// generated names share prefixes often enough to exercise edge splits.
pub fn arb_name() -> impl Strategy<Value = Vec<u8>> {
    proptest::collection::vec(proptest::sample::select(b"abct0!".to_vec()), 1..24)
}

/// An arbitrary outpoint.
pub fn arb_out_point() -> impl Strategy<Value = OutPoint> {
    (any::<[u8; 32]>(), any::<u32>()).prop_map(|(hash, index)| OutPoint::new(hash, index))
}

/// An arbitrary claim identifier.
pub fn arb_claim_id() -> impl Strategy<Value = ClaimId> {
    any::<[u8; 20]>().prop_map(ClaimId)
}

/// A positive stake amount.
pub fn arb_amount() -> impl Strategy<Value = i64> {
    1i64..1_000_000
}

/// An arbitrary add-claim change at the given height.
pub fn arb_add_claim(height: i32) -> impl Strategy<Value = Change> {
    (arb_name(), arb_out_point(), arb_amount()).prop_map(move |(name, out_point, amount)| {
        Change::new(ChangeType::AddClaim)
            .with_name(&name)
            .with_height(height)
            .with_out_point(out_point)
            .with_claim_id(ClaimId::from_outpoint(&out_point))
            .with_amount(amount)
    })
}
