//! The Change record: one claim-script event applied to a name.

use std::collections::BTreeSet;

use crate::types::{Amount, ClaimId, Height, OutPoint};

/// The five claim-script events a block can carry for a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ChangeType {
    /// A new claim lands on the name.
    AddClaim = 0,
    /// An existing claim's output is spent.
    SpendClaim = 1,
    /// A spent claim is reissued at a new output, keeping its identity.
    UpdateClaim = 2,
    /// A support lands for some claim on the name.
    AddSupport = 3,
    /// An existing support's output is spent.
    SpendSupport = 4,
}

impl ChangeType {
    /// Decode from the wire discriminant.
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::AddClaim),
            1 => Some(Self::SpendClaim),
            2 => Some(Self::UpdateClaim),
            3 => Some(Self::AddSupport),
            4 => Some(Self::SpendSupport),
            _ => None,
        }
    }

    /// Whether this event removes a stake.
    pub fn is_spend(self) -> bool {
        matches!(self, Self::SpendClaim | Self::SpendSupport)
    }
}

/// One event applied to a name at a height.
///
/// `active_height` and `visible_height` are zero except for records
/// synthesized by the normalization-fork migration. `spent_children` is
/// filled at the block boundary and feeds the legacy takeover-delay
/// workaround.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Change {
    /// Event discriminant.
    pub change_type: ChangeType,
    /// Block height the event landed at.
    pub height: Height,
    /// Explicit activation height for synthesized records; 0 otherwise.
    pub active_height: Height,
    /// Explicit visibility height for synthesized records; 0 otherwise.
    pub visible_height: Height,
    /// Target name (raw bytes; normalized at and after the fork).
    pub name: Vec<u8>,
    /// Claim identifier; default for spends that do not carry one.
    pub claim_id: ClaimId,
    /// Anchoring transaction output.
    pub out_point: OutPoint,
    /// Staked amount.
    pub amount: Amount,
    /// Opaque payload bytes.
    pub value: Vec<u8>,
    /// Names spent earlier in the same block that strictly extend `name`.
    pub spent_children: BTreeSet<Vec<u8>>,
}

impl Default for ChangeType {
    fn default() -> Self {
        Self::AddClaim
    }
}

impl Change {
    /// Start a change of the given type; fill fields with the `with_` setters.
    pub fn new(change_type: ChangeType) -> Self {
        Self {
            change_type,
            ..Self::default()
        }
    }

    /// Set the target name.
    pub fn with_name(mut self, name: &[u8]) -> Self {
        self.name = name.to_vec();
        self
    }

    /// Set the landing height.
    pub fn with_height(mut self, height: Height) -> Self {
        self.height = height;
        self
    }

    /// Set the anchoring output.
    pub fn with_out_point(mut self, out_point: OutPoint) -> Self {
        self.out_point = out_point;
        self
    }

    /// Set the staked amount.
    pub fn with_amount(mut self, amount: Amount) -> Self {
        self.amount = amount;
        self
    }

    /// Set the claim identifier.
    pub fn with_claim_id(mut self, claim_id: ClaimId) -> Self {
        self.claim_id = claim_id;
        self
    }

    /// Set the payload bytes.
    pub fn with_value(mut self, value: Vec<u8>) -> Self {
        self.value = value;
        self
    }
}
