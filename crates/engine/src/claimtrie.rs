//! The ClaimTrie facade.
//!
//! Glues the repositories, the node manager stack, and the merkle trie
//! behind the public surface: record claim events, commit blocks, roll back,
//! and answer node and proof queries. One writer, many readers: mutations
//! take the exclusive lock, queries the shared one.

use std::collections::BTreeSet;

use parking_lot::RwLock;

use claimtrie_types::error::{
    HashMismatchSnafu, InvalidHeightSnafu, NotFoundSnafu, RollbackPastCommittedSnafu,
};
use claimtrie_types::{
    compute_merkle_path, normalize_if_necessary, Amount, Change, ChangeType, ClaimId, Hash,
    Height, OutPoint, Params, Result, EMPTY_TRIE_HASH,
};
use claimtrie_storage::{BlockRepo, ChangeRepo, StorageEngine, TemporalRepo, TrieRepo};

use crate::config::Config;
use crate::hashfork::{HashV2Manager, HashV3Manager};
use crate::manager::{BaseManager, Manager};
use crate::node::{compute_claim_hashes, compute_claim_hashes_v2, Node};
use crate::normalizing::NormalizingManager;
use crate::trie::{HashSidePair, MerkleTrie, PersistentTrie, RamTrie, TrieError};

type ManagerStack = HashV3Manager<HashV2Manager<NormalizingManager<BaseManager>>>;

/// The name-registry engine: a merkle trie over ranked ownership claims,
/// supporting linear history with exact rollback.
pub struct ClaimTrie {
    inner: RwLock<Inner>,
}

impl std::fmt::Debug for ClaimTrie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaimTrie").finish_non_exhaustive()
    }
}

struct Inner {
    block_repo: BlockRepo,
    temporal_repo: TemporalRepo,
    node_manager: ManagerStack,
    merkle_trie: Box<dyn MerkleTrie>,
    height: Height,
}

impl ClaimTrie {
    /// Open the engine at `config.data_dir`, replaying to the last committed
    /// height and verifying the stored root.
    pub fn new(config: Config) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir).map_err(|e| {
            claimtrie_types::ClaimTrieError::Storage {
                message: format!("creating {}: {e}", config.data_dir.display()),
            }
        })?;

        let change_repo =
            ChangeRepo::new(StorageEngine::open(config.data_dir.join("changes.redb"))?)?;
        let block_repo =
            BlockRepo::new(StorageEngine::open(config.data_dir.join("block_hashes.redb"))?)?;
        let temporal_repo =
            TemporalRepo::new(StorageEngine::open(config.data_dir.join("temporal.redb"))?)?;

        let merkle_trie: Box<dyn MerkleTrie> = if config.ram_trie {
            Box::new(RamTrie::new())
        } else {
            let trie_repo = TrieRepo::new(StorageEngine::open(config.data_dir.join("trie.redb"))?)?;
            Box::new(PersistentTrie::new(trie_repo))
        };

        let node_manager = HashV3Manager::new(HashV2Manager::new(NormalizingManager::new(
            BaseManager::new(change_repo, config.node_cache_size),
        )));

        let mut inner = Inner {
            block_repo,
            temporal_repo,
            node_manager,
            merkle_trie,
            height: 0,
        };
        inner.restore()?;
        Ok(Self {
            inner: RwLock::new(inner),
        })
    }

    /// Record a new claim for the next block.
    pub fn add_claim(
        &self,
        name: &[u8],
        out_point: OutPoint,
        id: ClaimId,
        amount: Amount,
        value: Vec<u8>,
    ) -> Result<()> {
        self.inner.write().forward_change(
            Change::new(ChangeType::AddClaim)
                .with_name(name)
                .with_out_point(out_point)
                .with_claim_id(id)
                .with_amount(amount)
                .with_value(value),
        )
    }

    /// Record a claim update for the next block.
    pub fn update_claim(
        &self,
        name: &[u8],
        out_point: OutPoint,
        amount: Amount,
        id: ClaimId,
        value: Vec<u8>,
    ) -> Result<()> {
        self.inner.write().forward_change(
            Change::new(ChangeType::UpdateClaim)
                .with_name(name)
                .with_out_point(out_point)
                .with_claim_id(id)
                .with_amount(amount)
                .with_value(value),
        )
    }

    /// Record a claim spend for the next block.
    pub fn spend_claim(&self, name: &[u8], out_point: OutPoint, id: ClaimId) -> Result<()> {
        self.inner.write().forward_change(
            Change::new(ChangeType::SpendClaim)
                .with_name(name)
                .with_out_point(out_point)
                .with_claim_id(id),
        )
    }

    /// Record a new support for the next block.
    pub fn add_support(
        &self,
        name: &[u8],
        value: Vec<u8>,
        out_point: OutPoint,
        amount: Amount,
        id: ClaimId,
    ) -> Result<()> {
        self.inner.write().forward_change(
            Change::new(ChangeType::AddSupport)
                .with_name(name)
                .with_out_point(out_point)
                .with_claim_id(id)
                .with_amount(amount)
                .with_value(value),
        )
    }

    /// Record a support spend for the next block.
    pub fn spend_support(&self, name: &[u8], out_point: OutPoint, id: ClaimId) -> Result<()> {
        self.inner.write().forward_change(
            Change::new(ChangeType::SpendSupport)
                .with_name(name)
                .with_out_point(out_point)
                .with_claim_id(id),
        )
    }

    /// Commit the buffered changes as the next block and persist its root.
    pub fn append_block(&self) -> Result<()> {
        self.inner.write().append_block()
    }

    /// Roll back to `height`, restoring and verifying its stored root.
    pub fn reset_height(&self, height: Height) -> Result<()> {
        self.inner.write().reset_height(height)
    }

    /// The root at the current height.
    pub fn merkle_hash(&self) -> Result<Hash> {
        self.inner.write().merkle_root()
    }

    /// The current block height.
    pub fn height(&self) -> Height {
        self.inner.read().height
    }

    /// The node for `name` at the current height.
    pub fn node(&self, name: &[u8]) -> Result<Option<Node>> {
        let inner = self.inner.read();
        inner.node_at(inner.height, name)
    }

    /// The node for `name` as of `height`.
    pub fn node_at(&self, height: Height, name: &[u8]) -> Result<Option<Node>> {
        self.inner.read().node_at(height, name)
    }

    /// The names whose state changed or was scheduled to change at `height`.
    pub fn names_changed_in_block(&self, height: Height) -> Result<Vec<Vec<u8>>> {
        Ok(self.inner.read().temporal_repo.nodes_at(height)?)
    }

    /// The proof path for the claim at bid position `bid` on `name`.
    ///
    /// Available at and after the all-claims fork, on the in-memory trie.
    pub fn merkle_path(&self, name: &[u8], bid: usize) -> Result<Vec<HashSidePair>> {
        self.inner.write().merkle_path(name, bid)
    }
}

impl Inner {
    /// Startup: resume from the last committed height and verify its root.
    fn restore(&mut self) -> Result<()> {
        let Some((height, stored)) = self.block_repo.load_last()? else {
            return Ok(());
        };
        self.node_manager.increment_height_to(height)?;
        self.height = height;

        match self.merkle_trie.set_root(&stored) {
            Ok(()) => {}
            Err(TrieError::FullRebuildRequired) => self.run_full_trie_rebuild(None)?,
            Err(e) => return Err(e.into()),
        }

        let computed = self.merkle_root()?;
        if computed != stored {
            tracing::warn!(
                height,
                expected = %claimtrie_types::hash::to_display_hex(&stored),
                actual = %claimtrie_types::hash::to_display_hex(&computed),
                "unable to restore the claim trie root"
            );
            return HashMismatchSnafu {
                height,
                expected: stored,
                actual: computed,
            }
            .fail();
        }
        tracing::info!(height, root = %claimtrie_types::hash::to_display_hex(&stored), "claim trie restored");
        Ok(())
    }

    fn forward_change(&mut self, mut chg: Change) -> Result<()> {
        chg.height = self.height + 1;
        self.node_manager.append_change(chg)
    }

    fn append_block(&mut self) -> Result<()> {
        let height = self.height + 1;
        let touched = self.node_manager.increment_height_to(height)?;
        let scheduled = self.temporal_repo.nodes_at(height)?;
        self.height = height;

        let mut names: BTreeSet<Vec<u8>> = touched.into_iter().collect();
        names.extend(scheduled);

        let mut update_names = Vec::new();
        let mut update_heights = Vec::new();
        for name in &names {
            let (hash, next) = self.node_manager.hash(name)?;
            self.merkle_trie.update(name, hash, true)?;
            // Record the touch at this height; rollback collects its names
            // from the temporal index.
            update_names.push(name.clone());
            update_heights.push(height);
            if next <= 0 {
                continue;
            }
            // The key may normalize differently by the time the update fires.
            update_names.push(normalize_if_necessary(name, next).into_owned());
            update_heights.push(next);
        }
        self.temporal_repo.set_nodes_at(&update_names, &update_heights)?;

        let params = Params::active();
        if height == params.all_claims_in_merkle_fork_height || height == params.grand_fork_height
        {
            // Every leaf changes formula at a hash fork.
            tracing::warn!(
                height,
                "hash fork reached; recomputing every name (this is slow and memory-hungry)"
            );
            self.run_full_trie_rebuild(None)?;
        }

        let root = self.merkle_root()?;
        self.block_repo.set(height, &root)?;
        tracing::debug!(height, "block appended");
        Ok(())
    }

    fn reset_height(&mut self, height: Height) -> Result<()> {
        if height > self.height {
            return InvalidHeightSnafu {
                height,
                message: format!("cannot reset above the current height {}", self.height),
            }
            .fail();
        }
        if height == self.height {
            return Ok(());
        }

        let mut affected: BTreeSet<Vec<u8>> = BTreeSet::new();
        for h in height + 1..=self.height {
            affected.extend(self.temporal_repo.nodes_at(h)?);
        }
        let affected: Vec<Vec<u8>> = affected.into_iter().collect();

        self.node_manager
            .decrement_height_to(affected.clone(), height)?;

        let params = Params::active();
        let passed_hash_fork = (self.height >= params.all_claims_in_merkle_fork_height
            && height < params.all_claims_in_merkle_fork_height)
            || (self.height >= params.grand_fork_height && height < params.grand_fork_height);

        let stored = if height == 0 {
            EMPTY_TRIE_HASH
        } else {
            self.block_repo
                .get(height)?
                .ok_or_else(|| RollbackPastCommittedSnafu { height }.build())?
        };
        self.height = height;

        // Crossing the hash fork backwards invalidates every vertex; either
        // way the affected names must be replayed (some of their logs are
        // now empty and their vertices erased).
        let rebuild_names = if passed_hash_fork {
            let mut all: BTreeSet<Vec<u8>> = affected.into_iter().collect();
            self.node_manager.iterate_names(&mut |name| {
                all.insert(name.to_vec());
                true
            })?;
            all.into_iter().collect()
        } else {
            affected
        };

        match self.merkle_trie.set_root(&stored) {
            Ok(()) => {}
            Err(TrieError::FullRebuildRequired) => {
                self.run_full_trie_rebuild(Some(rebuild_names))?
            }
            Err(e) => return Err(e.into()),
        }

        let computed = self.merkle_root()?;
        if computed != stored {
            return HashMismatchSnafu {
                height,
                expected: stored,
                actual: computed,
            }
            .fail();
        }
        self.block_repo.delete_above(height)?;
        tracing::info!(height, "claim trie reset");
        Ok(())
    }

    /// Recompute the trie value of every name (or just `names`), straight
    /// from the change log.
    fn run_full_trie_rebuild(&mut self, names: Option<Vec<Vec<u8>>>) -> Result<()> {
        let list = match names {
            Some(list) => list,
            None => {
                let mut all = Vec::new();
                self.node_manager.iterate_names(&mut |name| {
                    all.push(name.to_vec());
                    true
                })?;
                all
            }
        };
        for name in list {
            let (hash, _) = self.node_manager.hash(&name)?;
            self.merkle_trie.update(&name, hash, false)?;
        }
        Ok(())
    }

    fn merkle_root(&mut self) -> Result<Hash> {
        if self.height >= Params::active().all_claims_in_merkle_fork_height {
            Ok(self.merkle_trie.merkle_hash_all_claims()?)
        } else {
            Ok(self.merkle_trie.merkle_hash()?)
        }
    }

    fn node_at(&self, height: Height, name: &[u8]) -> Result<Option<Node>> {
        let key = normalize_if_necessary(name, height);
        self.node_manager.node_at(height, &key)
    }

    fn merkle_path(&mut self, name: &[u8], bid: usize) -> Result<Vec<HashSidePair>> {
        let params = Params::active();
        if self.height < params.all_claims_in_merkle_fork_height {
            return InvalidHeightSnafu {
                height: self.height,
                message: "proofs require the all-claims hash fork".to_string(),
            }
            .fail();
        }

        let key = normalize_if_necessary(name, self.height).into_owned();
        let Some(mut node) = self.node_manager.node_at(self.height, &key)? else {
            return NotFoundSnafu {
                name: String::from_utf8_lossy(&key).into_owned(),
            }
            .fail();
        };

        let mut pairs = self.merkle_trie.merkle_path(&key)?;
        let claim_hashes = if self.height >= params.grand_fork_height {
            compute_claim_hashes(&key, &mut node)
        } else {
            compute_claim_hashes_v2(&mut node)
        };
        let partials = compute_merkle_path(&claim_hashes, bid);
        for j in (0..partials.len()).rev() {
            pairs.push(HashSidePair {
                right: ((bid >> j) & 1) > 0,
                hash: partials[j],
            });
        }
        Ok(pairs)
    }
}
