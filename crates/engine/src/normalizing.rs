//! Normalizing decorator for the node manager.
//!
//! Incoming names are normalized once the fork height is reached. Exactly at
//! the fork, a one-shot migration re-keys every name whose normalized form
//! differs from its raw form: each claim and support is re-added under the
//! normalized key with its original activation height, and spent under the
//! raw key. The synthesized records are consensus-fixed.

use claimtrie_types::{normalize, normalize_if_necessary, Change, ChangeType, Hash, Height,
    Params, Result};

use crate::manager::Manager;

/// Decorator applying the normalization fork to an inner manager.
pub struct NormalizingManager<M> {
    inner: M,
    normalized_at: Option<Height>,
}

impl<M: Manager> NormalizingManager<M> {
    /// Wrap `inner`.
    pub fn new(inner: M) -> Self {
        Self {
            inner,
            normalized_at: None,
        }
    }

    fn add_normalization_fork_changes_if_necessary(&mut self, height: Height) -> Result<()> {
        let fork_height = Params::active().normalized_name_fork_height;

        if self.inner.height() + 1 != height {
            // Initialization phase: a catch-up jump past the fork means the
            // migration already happened in an earlier run.
            if height >= fork_height {
                self.normalized_at = Some(fork_height);
            }
        }
        if self.normalized_at.is_some() || height != fork_height {
            return Ok(());
        }
        self.normalized_at = Some(height);
        tracing::info!("generating changes for the normalization fork");

        let mut affected: Vec<Vec<u8>> = Vec::new();
        self.inner.iterate_names(&mut |name| {
            if normalize(name).as_ref() != name {
                affected.push(name.to_vec());
            }
            true
        })?;

        for name in affected {
            let norm = normalize(&name).into_owned();
            let Some(node) = self.inner.node_at(self.inner.height(), &name)? else {
                continue;
            };
            for c in node.claims.iter() {
                let mut add = Change::new(ChangeType::AddClaim)
                    .with_name(&norm)
                    .with_height(c.accepted_at)
                    .with_out_point(c.out_point)
                    .with_claim_id(c.claim_id)
                    .with_amount(c.amount)
                    .with_value(c.value.clone());
                // Both are needed to reproduce the historical hashes.
                add.active_height = c.active_at;
                add.visible_height = height;
                self.inner.append_change(add)?;
                self.inner.append_change(
                    Change::new(ChangeType::SpendClaim)
                        .with_name(&name)
                        .with_height(height)
                        .with_out_point(c.out_point),
                )?;
            }
            for s in node.supports.iter() {
                let mut add = Change::new(ChangeType::AddSupport)
                    .with_name(&norm)
                    .with_height(s.accepted_at)
                    .with_out_point(s.out_point)
                    .with_claim_id(s.claim_id)
                    .with_amount(s.amount)
                    .with_value(s.value.clone());
                add.active_height = s.active_at;
                add.visible_height = height;
                self.inner.append_change(add)?;
                self.inner.append_change(
                    Change::new(ChangeType::SpendSupport)
                        .with_name(&name)
                        .with_height(height)
                        .with_out_point(s.out_point),
                )?;
            }
        }
        Ok(())
    }
}

impl<M: Manager> Manager for NormalizingManager<M> {
    fn append_change(&mut self, mut chg: Change) -> Result<()> {
        chg.name = normalize_if_necessary(&chg.name, chg.height).into_owned();
        self.inner.append_change(chg)
    }

    fn increment_height_to(&mut self, height: Height) -> Result<Vec<Vec<u8>>> {
        self.add_normalization_fork_changes_if_necessary(height)?;
        self.inner.increment_height_to(height)
    }

    fn decrement_height_to(
        &mut self,
        affected_names: Vec<Vec<u8>>,
        height: Height,
    ) -> Result<()> {
        // Rolling back below the fork re-arms the migration.
        if self.normalized_at.is_some_and(|h| h > height) {
            self.normalized_at = None;
        }
        self.inner.decrement_height_to(affected_names, height)
    }

    fn height(&self) -> Height {
        self.inner.height()
    }

    fn node_at(&self, height: Height, name: &[u8]) -> Result<Option<crate::node::Node>> {
        self.inner.node_at(height, name)
    }

    fn hash(&self, name: &[u8]) -> Result<(Option<Hash>, Height)> {
        self.inner.hash(name)
    }

    fn iterate_names(&self, predicate: &mut dyn FnMut(&[u8]) -> bool) -> Result<()> {
        self.inner.iterate_names(predicate)
    }
}
