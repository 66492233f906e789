//! The per-name state machine.
//!
//! A [`Node`] holds every live claim and support for one name, the pointer
//! to the current best claim, and the height of the last takeover. It is
//! reconstructed on demand by replaying the name's change log; nothing here
//! touches storage.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use claimtrie_types::error::OutPointConflictSnafu;
use claimtrie_types::hash::sha256d;
use claimtrie_types::{
    Amount, Change, ChangeType, ClaimId, Hash, Height, OutPoint, Params, Result, Status,
};

/// Per-name state: ordered claims, supports, best-claim index, takeover height.
///
/// `best_claim` indexes into `claims`; it is re-derived whenever the list is
/// reordered or shrunk, so it never dangles. `support_sums` tracks the sum of
/// activated support amounts per claim id.
#[derive(Debug, Clone, Default)]
pub struct Node {
    /// All claims on the name, in arrival order (until sorted for hashing).
    pub claims: Vec<Claim>,
    /// All supports on the name, including ones whose claim is gone.
    pub supports: Vec<Claim>,
    /// Index of the current best claim, if any claim is activated.
    pub best_claim: Option<usize>,
    /// Height at which the best claim last changed identity.
    pub taken_over_at: Height,
    /// Sum of activated support amounts, per claim id.
    pub support_sums: HashMap<ClaimId, Amount>,
    next_sequence: u32,
}

pub use claimtrie_types::Claim;

impl Node {
    /// An empty node.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current best claim, if any.
    pub fn best(&self) -> Option<&Claim> {
        self.best_claim.map(|i| &self.claims[i])
    }

    /// Whether the node has an activated best claim.
    pub fn has_active_best_claim(&self) -> bool {
        self.best().is_some_and(|c| c.status == Status::Activated)
    }

    /// Whether no claim on the node is activated.
    pub fn has_zero_active_claims(&self) -> bool {
        !self.claims.iter().any(|c| c.status == Status::Activated)
    }

    /// A claim's amount plus its activated support sum.
    pub fn effective_amount(&self, claim: &Claim) -> Amount {
        claim.amount + self.support_sums.get(&claim.claim_id).copied().unwrap_or(0)
    }

    /// Apply one change at its landing height, with the activation delay the
    /// manager computed for it.
    ///
    /// Spends of unknown outpoints and updates without a matching spend are
    /// tolerated with a single log line: historical blocks contain such
    /// transactions and must still hash identically.
    pub fn apply_change(&mut self, chg: &Change, delay: Height) -> Result<()> {
        let visible_at = if chg.visible_height > 0 {
            chg.visible_height
        } else {
            chg.height
        };

        match chg.change_type {
            ChangeType::AddClaim => {
                if self.claims.iter().any(|c| c.out_point == chg.out_point) {
                    return OutPointConflictSnafu {
                        out_point: chg.out_point.to_string(),
                    }
                    .fail();
                }
                self.claims.push(Claim {
                    out_point: chg.out_point,
                    claim_id: chg.claim_id,
                    amount: chg.amount,
                    accepted_at: chg.height,
                    active_at: chg.height + delay,
                    visible_at,
                    status: Status::Accepted,
                    value: chg.value.clone(),
                    sequence: self.next_sequence,
                });
                self.next_sequence += 1;
            }

            ChangeType::SpendClaim => {
                match self.claims.iter_mut().find(|c| c.out_point == chg.out_point) {
                    Some(c) => c.status = Status::Deactivated,
                    None => log_once(format!(
                        "spending claim but no claim at output {} for {}",
                        chg.out_point,
                        String::from_utf8_lossy(&chg.name),
                    )),
                }
            }

            ChangeType::UpdateClaim => {
                // The matching claim was spent earlier in this block; it keeps
                // its id, accepted height, and sequence.
                match self
                    .claims
                    .iter_mut()
                    .find(|c| c.claim_id == chg.claim_id && c.status == Status::Deactivated)
                {
                    Some(c) => {
                        c.out_point = chg.out_point;
                        c.amount = chg.amount;
                        c.value = chg.value.clone();
                        c.status = Status::Accepted;
                        c.active_at = chg.height + delay;
                    }
                    None => log_once(format!(
                        "updating claim but no spent claim with id {} for {}",
                        chg.claim_id,
                        String::from_utf8_lossy(&chg.name),
                    )),
                }
            }

            ChangeType::AddSupport => {
                self.supports.push(Claim {
                    out_point: chg.out_point,
                    claim_id: chg.claim_id,
                    amount: chg.amount,
                    accepted_at: chg.height,
                    active_at: chg.height + delay,
                    visible_at,
                    status: Status::Accepted,
                    value: chg.value.clone(),
                    sequence: 0,
                });
            }

            ChangeType::SpendSupport => {
                let sums = &mut self.support_sums;
                match self
                    .supports
                    .iter_mut()
                    .find(|s| s.out_point == chg.out_point)
                {
                    Some(s) => {
                        if s.status == Status::Activated {
                            *sums.entry(s.claim_id).or_insert(0) -= s.amount;
                        }
                        s.status = Status::Deactivated;
                    }
                    None => log_once(format!(
                        "spending support but no support at output {} for {}",
                        chg.out_point,
                        String::from_utf8_lossy(&chg.name),
                    )),
                }
            }
        }
        Ok(())
    }

    /// Advance the node from `height` through every event height up to
    /// `max_height`: expire, activate, and re-bid at each step.
    pub fn adjust_to(&mut self, height: Height, max_height: Height) -> &mut Self {
        let changed = self.handle_expired_and_activated(height) > 0;
        self.update_takeover_height(height, changed);
        if max_height > height {
            let mut h = self.next_update(height);
            while h > 0 && h <= max_height {
                let changed = self.handle_expired_and_activated(h) > 0;
                self.update_takeover_height(h, changed);
                h = self.next_update(h);
            }
        }
        self
    }

    /// Flip pending stakes whose activation height has arrived, and remove
    /// expired or deactivated ones. Returns how many stakes changed.
    pub fn handle_expired_and_activated(&mut self, height: Height) -> usize {
        let best_out = self.best_claim.map(|i| self.claims[i].out_point);
        let mut changed = 0;

        fn update(
            items: &mut Vec<Claim>,
            height: Height,
            mut sums: Option<&mut HashMap<ClaimId, Amount>>,
            changed: &mut usize,
        ) {
            let mut i = 0;
            while i < items.len() {
                let c = &mut items[i];
                if c.status == Status::Accepted && c.active_at <= height && c.visible_at <= height
                {
                    c.status = Status::Activated;
                    *changed += 1;
                    if let Some(sums) = sums.as_mut() {
                        *sums.entry(c.claim_id).or_insert(0) += c.amount;
                    }
                }
                if c.expire_at() <= height || c.status == Status::Deactivated {
                    if c.status == Status::Activated {
                        if let Some(sums) = sums.as_mut() {
                            *sums.entry(c.claim_id).or_insert(0) -= c.amount;
                        }
                    }
                    items.remove(i);
                    *changed += 1;
                    continue;
                }
                i += 1;
            }
        }

        update(&mut self.claims, height, None, &mut changed);
        update(
            &mut self.supports,
            height,
            Some(&mut self.support_sums),
            &mut changed,
        );

        self.best_claim =
            best_out.and_then(|op| self.claims.iter().position(|c| c.out_point == op));
        changed
    }

    /// Re-bid at `height`. A takeover happens when there is no activated
    /// winner or the winner's identity changes; a takeover immediately
    /// activates every visible pending stake before the winner is chosen.
    pub fn update_takeover_height(&mut self, height: Height, refind_best: bool) {
        let mut candidate = if refind_best {
            self.find_best_claim()
        } else {
            self.best_claim
        };

        let candidate_id = candidate.map(|i| self.claims[i].claim_id);
        let best_id = self.best_claim.map(|i| self.claims[i].claim_id);

        let takeover_happening =
            candidate_id.is_none() || !self.has_active_best_claim() || candidate_id != best_id;

        if takeover_happening {
            if self.activate_all_claims(height) > 0 {
                candidate = self.find_best_claim();
            }
            self.taken_over_at = height;
            self.best_claim = candidate;
        }
    }

    /// Activate every visible pending stake. Returns how many flipped.
    fn activate_all_claims(&mut self, height: Height) -> usize {
        let mut count = 0;
        for c in &mut self.claims {
            if c.status == Status::Accepted && c.active_at > height && c.visible_at <= height {
                c.active_at = height;
                c.status = Status::Activated;
                count += 1;
            }
        }
        for s in &mut self.supports {
            if s.status == Status::Accepted && s.active_at > height && s.visible_at <= height {
                s.active_at = height;
                s.status = Status::Activated;
                *self.support_sums.entry(s.claim_id).or_insert(0) += s.amount;
                count += 1;
            }
        }
        count
    }

    /// The activated claim winning the bid, by effective amount, then
    /// earlier acceptance, then smaller outpoint.
    fn find_best_claim(&self) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (i, candidate) in self.claims.iter().enumerate() {
            if candidate.status != Status::Activated {
                continue;
            }
            let Some(b) = best else {
                best = Some(i);
                continue;
            };
            let current = &self.claims[b];
            let ca = self.effective_amount(candidate);
            let ba = self.effective_amount(current);
            if ca > ba
                || (ca == ba
                    && (candidate.accepted_at < current.accepted_at
                        || (candidate.accepted_at == current.accepted_at
                            && candidate.out_point < current.out_point)))
            {
                best = Some(i);
            }
        }
        best
    }

    /// The smallest height above `height` at which this node's state could
    /// change (activation, visibility, or expiration), or 0 when none is
    /// pending.
    pub fn next_update(&self, height: Height) -> Height {
        let mut next = Height::MAX;
        for c in self.claims.iter().chain(self.supports.iter()) {
            let e = c.expire_at();
            if e > height && e < next {
                next = e;
            }
            if c.status == Status::Accepted {
                let m = c.active_at.max(c.visible_at);
                if m > height && m < next {
                    next = m;
                }
            }
        }
        if next == Height::MAX {
            0
        } else {
            next
        }
    }

    /// Order claims by bid: effective amount descending, acceptance height
    /// ascending, outpoint ascending. The post-fork hash leaves depend on
    /// this order.
    pub fn sort_claims_by_bid(&mut self) {
        let best_out = self.best_claim.map(|i| self.claims[i].out_point);
        let Node {
            claims,
            support_sums,
            ..
        } = self;
        claims.sort_by(|a, b| {
            let ea = a.amount + support_sums.get(&a.claim_id).copied().unwrap_or(0);
            let eb = b.amount + support_sums.get(&b.claim_id).copied().unwrap_or(0);
            eb.cmp(&ea)
                .then(a.accepted_at.cmp(&b.accepted_at))
                .then(a.out_point.cmp(&b.out_point))
        });
        self.best_claim =
            best_out.and_then(|op| self.claims.iter().position(|c| c.out_point == op));
    }
}

/// The activation delay earned by continuous ownership, clamped.
pub fn calculate_delay(current: Height, took_over: Height) -> Height {
    let params = Params::active();
    let delay = (current - took_over) / params.active_delay_factor;
    delay.min(params.max_active_delay)
}

/// The pre-fork per-name hash:
/// `H(H(outpoint.hash) || H(ascii(outpoint.index)) || H(be64(takeover)))`.
pub fn calculate_node_hash(op: &OutPoint, takeover: Height) -> Hash {
    let tx_hash = sha256d(&op.hash);
    let n_out_hash = sha256d(op.index.to_string().as_bytes());
    let height_hash = sha256d(&(takeover as u64).to_be_bytes());

    let mut buf = Vec::with_capacity(96);
    buf.extend_from_slice(&tx_hash);
    buf.extend_from_slice(&n_out_hash);
    buf.extend_from_slice(&height_hash);
    sha256d(&buf)
}

/// The v3 hash leaf:
/// `SHA-256(outpoint.hash || be32 index || be32 bid || be32 sequence || be32 takeover || name)`.
pub fn compute_bid_seq_name_hash(
    name: &[u8],
    claim: &Claim,
    bid: u32,
    takeover: Height,
) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(claim.out_point.hash);
    hasher.update(claim.out_point.index.to_be_bytes());
    hasher.update(bid.to_be_bytes());
    hasher.update(claim.sequence.to_be_bytes());
    hasher.update((takeover as u32).to_be_bytes());
    hasher.update(name);
    hasher.finalize().into()
}

/// All v3 leaves of a node, in bid order, activated claims only.
pub fn compute_claim_hashes(name: &[u8], node: &mut Node) -> Vec<Hash> {
    node.sort_claims_by_bid();
    let takeover = node.taken_over_at;
    node.claims
        .iter()
        .enumerate()
        .filter(|(_, c)| c.status == Status::Activated)
        .map(|(bid, c)| compute_bid_seq_name_hash(name, c, bid as u32, takeover))
        .collect()
}

/// The v2 hash leaves of a node: pre-fork claim hashes of all activated
/// claims, in bid order.
pub fn compute_claim_hashes_v2(node: &mut Node) -> Vec<Hash> {
    node.sort_claims_by_bid();
    let takeover = node.taken_over_at;
    node.claims
        .iter()
        .filter(|c| c.status == Status::Activated)
        .map(|c| calculate_node_hash(&c.out_point, takeover))
        .collect()
}

/// Log a message at most once per process. Historical blocks replay
/// malformed transactions by the million; one line is enough.
pub fn log_once(message: String) {
    static LOGGED: LazyLock<Mutex<HashSet<String>>> =
        LazyLock::new(|| Mutex::new(HashSet::new()));
    let mut logged = LOGGED.lock();
    if logged.insert(message.clone()) {
        tracing::info!("{message}");
    }
}
