//! The node manager: on-demand materialization over the change log.
//!
//! The manager buffers the current block's changes, materializes nodes by
//! replaying a name's log, caches the results, and supports decrementing
//! back to an earlier height by truncating logs. Decorators layer the
//! normalization fork and the hash forks on top of [`BaseManager`].

use std::collections::HashSet;
use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;

use claimtrie_types::error::{InvalidHeightSnafu, NameTooLongSnafu};
use claimtrie_types::{
    params::delay_workarounds, Change, ChangeType, Hash, Height, Params, Result,
};
use claimtrie_storage::ChangeRepo;

use crate::node::{calculate_delay, calculate_node_hash, log_once, Node};

/// Names longer than this are rejected on `AddClaim`.
pub const MAX_NAME_LENGTH: usize = 255;

/// The node manager contract shared by the base implementation and its
/// fork decorators.
pub trait Manager: Send {
    /// Stamp and buffer a change for the next block.
    fn append_change(&mut self, chg: Change) -> Result<()>;

    /// Commit the buffer and move to `height`. Returns the names touched,
    /// in arrival order, with duplicates.
    fn increment_height_to(&mut self, height: Height) -> Result<Vec<Vec<u8>>>;

    /// Truncate the logs of `affected_names` to `height` and move back.
    fn decrement_height_to(&mut self, affected_names: Vec<Vec<u8>>, height: Height)
        -> Result<()>;

    /// The manager's current height.
    fn height(&self) -> Height;

    /// Materialize the node for `name` as of `height`, or `None` when the
    /// name has no live claims there.
    fn node_at(&self, height: Height, name: &[u8]) -> Result<Option<Node>>;

    /// The per-name trie value at the current height, together with the
    /// node's next-update height (0 when none).
    fn hash(&self, name: &[u8]) -> Result<(Option<Hash>, Height)>;

    /// Invoke `predicate` with every name in the log until it returns false.
    fn iterate_names(&self, predicate: &mut dyn FnMut(&[u8]) -> bool) -> Result<()>;
}

struct CacheEntry {
    node: Node,
    height: Height,
}

/// The base manager: change buffer, LRU node cache, and replay logic.
pub struct BaseManager {
    repo: ChangeRepo,
    height: Height,
    changes: Vec<Change>,
    cache: Mutex<LruCache<Vec<u8>, CacheEntry>>,
}

impl BaseManager {
    /// Wrap a change repository with a node cache of `node_cache_size`
    /// entries.
    pub fn new(repo: ChangeRepo, node_cache_size: usize) -> Self {
        let capacity = NonZeroUsize::new(node_cache_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            repo,
            height: 0,
            changes: Vec::new(),
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Replay `changes` into a fresh node as of `height`.
    ///
    /// Changes must be sorted by height; the node advances through the gaps
    /// between change heights so delays and takeovers land where they did
    /// on chain.
    fn new_node_from_changes(&self, changes: &[Change], height: Height) -> Result<Option<Node>> {
        if changes.is_empty() {
            return Ok(None);
        }

        let mut node = Node::new();
        let mut previous = changes[0].height;
        let mut count = changes.len();

        for (i, chg) in changes.iter().enumerate() {
            if chg.height > height {
                count = i;
                break;
            }
            if previous < chg.height {
                node.adjust_to(previous, chg.height - 1);
                previous = chg.height;
            }
            let delay = self.get_delay_for_name(&node, chg)?;
            node.apply_change(chg, delay)?;
        }

        if count == 0 {
            return Ok(None);
        }
        node.adjust_to(changes[count - 1].height, height);
        if node.claims.is_empty() {
            return Ok(None);
        }
        Ok(Some(node))
    }

    fn get_delay_for_name(&self, node: &Node, chg: &Change) -> Result<Height> {
        // The active status of the best claim is ignored on purpose: updates
        // deactivate and reactivate within a block, and the takeover pass
        // accounts for the final status.
        let has_best = node.best_claim.is_some();
        if has_best && node.best().is_some_and(|b| b.claim_id == chg.claim_id) {
            return Ok(0);
        }
        if chg.active_height >= chg.height {
            // Synthesized records carry their activation height explicitly.
            return Ok(chg.active_height - chg.height);
        }
        if !has_best {
            return Ok(0);
        }

        let delay = calculate_delay(chg.height, node.taken_over_at);
        if delay > 0 && self.workaround_is_needed(node, chg)? {
            if chg.height >= self.height {
                log_once(format!(
                    "delay workaround applies to {} at {}, claim id {}",
                    String::from_utf8_lossy(&chg.name),
                    chg.height,
                    chg.claim_id,
                ));
            }
            return Ok(0);
        }
        Ok(delay)
    }

    /// Reproduce the zero-delay bug of the historical cache.
    ///
    /// Below the removal-workaround height a hard-coded table names the
    /// affected (name, height) pairs. At and after it the condition is
    /// computed: the node has no activated claims while at least two child
    /// branches in the persisted log host an activated winner, none of them
    /// spent within the same block.
    fn workaround_is_needed(&self, node: &Node, chg: &Change) -> Result<bool> {
        if chg.change_type.is_spend() {
            return Ok(false);
        }
        let params = Params::active();
        if chg.height >= params.max_removal_workaround_height {
            Ok(node.has_zero_active_claims()
                && self.has_children(&chg.name, chg.height, &chg.spent_children, 2)?)
        } else if !node.claims.is_empty() {
            Ok(delay_workarounds()
                .get(chg.name.as_slice())
                .is_some_and(|heights| heights.contains(&chg.height)))
        } else {
            Ok(false)
        }
    }

    /// Whether at least `required` distinct child branches of `name` host an
    /// activated best claim at `height`. Consensus-critical: computed from
    /// the persisted log, never from the cache.
    fn has_children(
        &self,
        name: &[u8],
        height: Height,
        spent_children: &std::collections::BTreeSet<Vec<u8>>,
        required: usize,
    ) -> Result<bool> {
        let mut branches: HashSet<u8> = HashSet::new();
        let mut failed = None;
        self.repo.iterate_children(name, &mut |changes| {
            let Some(first) = changes.first() else {
                return true;
            };
            // Child names are strictly longer than the starter name.
            let branch = first.name[name.len()];
            if branches.contains(&branch) {
                return true;
            }
            if spent_children.contains(&first.name) {
                // Children spent in the same block cannot count as active.
                return true;
            }
            match self.new_node_from_changes(&changes, height) {
                Ok(Some(node)) if node.has_active_best_claim() => {
                    branches.insert(branch);
                    branches.len() < required
                }
                Ok(_) => true,
                Err(err) => {
                    failed = Some(err);
                    false
                }
            }
        })?;
        if let Some(err) = failed {
            return Err(err);
        }
        Ok(branches.len() >= required)
    }
}

impl Manager for BaseManager {
    fn append_change(&mut self, chg: Change) -> Result<()> {
        if chg.change_type == ChangeType::AddClaim && chg.name.len() > MAX_NAME_LENGTH {
            return NameTooLongSnafu { len: chg.name.len() }.fail();
        }
        self.cache.lock().pop(&chg.name);
        self.changes.push(chg);
        Ok(())
    }

    fn increment_height_to(&mut self, height: Height) -> Result<Vec<Vec<u8>>> {
        if height <= self.height {
            return InvalidHeightSnafu {
                height,
                message: format!("must exceed the current height {}", self.height),
            }
            .fail();
        }

        if height >= Params::active().max_removal_workaround_height {
            collect_child_names(&mut self.changes);
        }

        let names: Vec<Vec<u8>> = self.changes.iter().map(|c| c.name.clone()).collect();
        self.repo.append_changes(&self.changes)?;
        self.changes.clear();
        self.height = height;
        Ok(names)
    }

    fn decrement_height_to(
        &mut self,
        affected_names: Vec<Vec<u8>>,
        height: Height,
    ) -> Result<()> {
        if height >= self.height {
            return InvalidHeightSnafu {
                height,
                message: format!("must precede the current height {}", self.height),
            }
            .fail();
        }
        let mut cache = self.cache.lock();
        for name in affected_names {
            cache.pop(&name);
            self.repo.drop_changes(&name, height)?;
        }
        drop(cache);
        self.height = height;
        Ok(())
    }

    fn height(&self) -> Height {
        self.height
    }

    fn node_at(&self, height: Height, name: &[u8]) -> Result<Option<Node>> {
        {
            let mut cache = self.cache.lock();
            if let Some(entry) = cache.get(name) {
                if entry.height == height {
                    return Ok(Some(entry.node.clone()));
                }
            }
        }

        let changes = self.repo.load_changes(name)?;
        let Some(node) = self.new_node_from_changes(&changes, height)? else {
            return Ok(None);
        };
        self.cache.lock().put(
            name.to_vec(),
            CacheEntry {
                node: node.clone(),
                height,
            },
        );
        Ok(Some(node))
    }

    fn hash(&self, name: &[u8]) -> Result<(Option<Hash>, Height)> {
        let Some(node) = self.node_at(self.height, name)? else {
            return Ok((None, 0));
        };
        let next = node.next_update(self.height);
        if node.has_active_best_claim() {
            let best = node.best().map(|c| (c.out_point, node.taken_over_at));
            if let Some((out_point, takeover)) = best {
                return Ok((Some(calculate_node_hash(&out_point, takeover)), next));
            }
        }
        Ok((None, next))
    }

    fn iterate_names(&self, predicate: &mut dyn FnMut(&[u8]) -> bool) -> Result<()> {
        self.repo.iterate_all(predicate)?;
        Ok(())
    }
}

/// Fill each non-spend change's `spent_children` with the names spent
/// earlier in the same block that strictly extend its name.
///
/// The old tree-collapse path could drop a node from the cached trie when a
/// spend removed its last child in the same block; the delay workaround must
/// see through that, so the set is computed at the block boundary.
fn collect_child_names(changes: &mut [Change]) {
    for i in 0..changes.len() {
        if changes[i].change_type.is_spend() {
            continue;
        }
        let mut spent = std::collections::BTreeSet::new();
        let name = changes[i].name.clone();
        for earlier in changes[..i].iter() {
            if earlier.change_type != ChangeType::SpendClaim {
                continue;
            }
            if earlier.name.len() > name.len() && earlier.name.starts_with(&name) {
                spent.insert(earlier.name.clone());
            }
        }
        changes[i].spent_children = spent;
    }
}
