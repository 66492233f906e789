//! Network parameters and fork heights.
//!
//! Parameters are process-wide: `set_network` installs them once at startup,
//! before any trie is constructed. Tests that need custom fork heights
//! install a modified copy with [`Params::set_active`] and serialize
//! themselves.

use std::collections::HashMap;
use std::sync::LazyLock;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::types::Height;

/// The supported networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Network {
    /// Production network.
    Mainnet,
    /// Public test network.
    Testnet3,
    /// Local regression-test network.
    Regtest,
}

/// Consensus constants for one network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Params {
    /// Upper bound on the activation delay, in blocks.
    pub max_active_delay: Height,
    /// Blocks of continuous ownership per block of delay.
    pub active_delay_factor: Height,
    /// Stake lifetime before the expiration fork.
    pub original_claim_expiration_time: Height,
    /// Stake lifetime at and after the expiration fork.
    pub extended_claim_expiration_time: Height,
    /// Height at which the extended lifetime takes effect.
    pub extended_claim_expiration_fork_height: Height,
    /// Height below which the legacy delay workarounds reproduce old-cache bugs.
    pub max_removal_workaround_height: Height,
    /// Height at which name keys become normalized.
    pub normalized_name_fork_height: Height,
    /// Height at which the per-name hash covers all activated claims (v2).
    pub all_claims_in_merkle_fork_height: Height,
    /// Height at which the v3 hash leaf takes effect; `Height::MAX` when unscheduled.
    pub grand_fork_height: Height,
}

const MAINNET: Params = Params {
    max_active_delay: 4032,
    active_delay_factor: 32,
    original_claim_expiration_time: 262_974,
    extended_claim_expiration_time: 2_102_400,
    extended_claim_expiration_fork_height: 400_155,
    max_removal_workaround_height: 658_300,
    normalized_name_fork_height: 539_940,
    all_claims_in_merkle_fork_height: 658_309,
    grand_fork_height: Height::MAX,
};

const TESTNET3: Params = Params {
    original_claim_expiration_time: 262_974,
    extended_claim_expiration_time: 2_102_400,
    extended_claim_expiration_fork_height: 1,
    max_removal_workaround_height: 100,
    normalized_name_fork_height: 1,
    all_claims_in_merkle_fork_height: 109,
    ..MAINNET
};

const REGTEST: Params = Params {
    original_claim_expiration_time: 500,
    extended_claim_expiration_time: 600,
    extended_claim_expiration_fork_height: 800,
    max_removal_workaround_height: -1,
    normalized_name_fork_height: 250,
    all_claims_in_merkle_fork_height: 349,
    grand_fork_height: 850,
    ..MAINNET
};

static ACTIVE: RwLock<Params> = RwLock::new(MAINNET);

impl Params {
    /// The constants for `network`.
    pub const fn for_network(network: Network) -> Self {
        match network {
            Network::Mainnet => MAINNET,
            Network::Testnet3 => TESTNET3,
            Network::Regtest => REGTEST,
        }
    }

    /// A copy of the currently installed constants.
    pub fn active() -> Self {
        *ACTIVE.read()
    }

    /// Install custom constants. Test-only in spirit; production code goes
    /// through [`set_network`].
    pub fn set_active(params: Params) {
        *ACTIVE.write() = params;
    }
}

/// Install the constants for `network` process-wide.
pub fn set_network(network: Network) {
    Params::set_active(Params::for_network(network));
}

/// Hard-coded heights at which the historical cache bug forced a zero
/// takeover delay for specific names, consulted below
/// `max_removal_workaround_height`.
///
/// The data is part of mainnet consensus; entries are keyed by raw name
/// bytes.
pub fn delay_workarounds() -> &'static HashMap<&'static [u8], &'static [Height]> {
    static TABLE: LazyLock<HashMap<&'static [u8], &'static [Height]>> = LazyLock::new(|| {
        let mut m: HashMap<&'static [u8], &'static [Height]> = HashMap::new();
        m.insert(b"travtest01".as_slice(), &[426_898]);
        m
    });
    &TABLE
}
