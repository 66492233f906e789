//! Hash-fork decorators for the node manager.
//!
//! [`HashV2Manager`] switches the per-name value at
//! `all_claims_in_merkle_fork_height` from the best-claim hash to a merkle
//! root over every activated claim in bid order. [`HashV3Manager`] switches
//! the leaf formula again at `grand_fork_height` and drops empty-name
//! changes on ingest.

use claimtrie_types::{compute_merkle_root, Change, Hash, Height, Params, Result};

use crate::manager::Manager;
use crate::node::{compute_claim_hashes, compute_claim_hashes_v2, Node};

/// Decorator applying the v2 (all-claims) hash fork.
pub struct HashV2Manager<M> {
    inner: M,
}

impl<M: Manager> HashV2Manager<M> {
    /// Wrap `inner`.
    pub fn new(inner: M) -> Self {
        Self { inner }
    }

    fn compute_claim_hashes(&self, name: &[u8]) -> Result<(Option<Hash>, Height)> {
        let Some(mut node) = self.inner.node_at(self.height(), name)? else {
            return Ok((None, 0));
        };
        let hashes = compute_claim_hashes_v2(&mut node);
        let next = node.next_update(self.height());
        Ok((compute_merkle_root(&hashes), next))
    }
}

impl<M: Manager> Manager for HashV2Manager<M> {
    fn append_change(&mut self, chg: Change) -> Result<()> {
        self.inner.append_change(chg)
    }

    fn increment_height_to(&mut self, height: Height) -> Result<Vec<Vec<u8>>> {
        self.inner.increment_height_to(height)
    }

    fn decrement_height_to(
        &mut self,
        affected_names: Vec<Vec<u8>>,
        height: Height,
    ) -> Result<()> {
        self.inner.decrement_height_to(affected_names, height)
    }

    fn height(&self) -> Height {
        self.inner.height()
    }

    fn node_at(&self, height: Height, name: &[u8]) -> Result<Option<Node>> {
        self.inner.node_at(height, name)
    }

    fn hash(&self, name: &[u8]) -> Result<(Option<Hash>, Height)> {
        if self.height() >= Params::active().all_claims_in_merkle_fork_height {
            return self.compute_claim_hashes(name);
        }
        self.inner.hash(name)
    }

    fn iterate_names(&self, predicate: &mut dyn FnMut(&[u8]) -> bool) -> Result<()> {
        self.inner.iterate_names(predicate)
    }
}

/// Decorator applying the v3 (bid/sequence/name) hash fork.
pub struct HashV3Manager<M> {
    inner: M,
}

impl<M: Manager> HashV3Manager<M> {
    /// Wrap `inner`.
    pub fn new(inner: M) -> Self {
        Self { inner }
    }

    fn bid_seq_name_hash(&self, name: &[u8]) -> Result<(Option<Hash>, Height)> {
        let Some(mut node) = self.inner.node_at(self.height(), name)? else {
            return Ok((None, 0));
        };
        let hashes = compute_claim_hashes(name, &mut node);
        let next = node.next_update(self.height());
        Ok((compute_merkle_root(&hashes), next))
    }
}

impl<M: Manager> Manager for HashV3Manager<M> {
    fn append_change(&mut self, chg: Change) -> Result<()> {
        if self.height() >= Params::active().grand_fork_height && chg.name.is_empty() {
            // Empty names are excluded from v3 hashing entirely.
            return Ok(());
        }
        self.inner.append_change(chg)
    }

    fn increment_height_to(&mut self, height: Height) -> Result<Vec<Vec<u8>>> {
        self.inner.increment_height_to(height)
    }

    fn decrement_height_to(
        &mut self,
        affected_names: Vec<Vec<u8>>,
        height: Height,
    ) -> Result<()> {
        self.inner.decrement_height_to(affected_names, height)
    }

    fn height(&self) -> Height {
        self.inner.height()
    }

    fn node_at(&self, height: Height, name: &[u8]) -> Result<Option<Node>> {
        self.inner.node_at(height, name)
    }

    fn hash(&self, name: &[u8]) -> Result<(Option<Hash>, Height)> {
        if self.height() >= Params::active().grand_fork_height {
            if name.is_empty() {
                return Ok((None, 0));
            }
            return self.bid_seq_name_hash(name);
        }
        self.inner.hash(name)
    }

    fn iterate_names(&self, predicate: &mut dyn FnMut(&[u8]) -> bool) -> Result<()> {
        self.inner.iterate_names(predicate)
    }
}
