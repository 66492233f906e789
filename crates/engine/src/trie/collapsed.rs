//! Collapsed-edge radix trie.
//!
//! Edges between branch points carry multi-byte keys, so the trie holds one
//! vertex per name plus one per branch point. Children stay sorted by their
//! first key byte; none of a vertex's children share a first byte.

use claimtrie_types::Hash;

/// One vertex: the edge key leading to it, its sorted children, and the two
/// memoized hashes.
#[derive(Debug, Default)]
pub(crate) struct CollapsedVertex {
    pub key: Vec<u8>,
    pub children: Vec<CollapsedVertex>,
    pub merkle_hash: Option<Hash>,
    pub claim_hash: Option<Hash>,
}

impl CollapsedVertex {
    /// Index of the first child whose first key byte is >= `b`.
    fn sort_search(&self, b: u8) -> usize {
        self.children.partition_point(|child| child.key[0] < b)
    }

    fn find_nearest(&self, b: u8) -> Option<usize> {
        let index = self.sort_search(b);
        (index < self.children.len()).then_some(index)
    }

    fn insert_child(&mut self, vertex: CollapsedVertex) -> usize {
        let index = self.sort_search(vertex.key[0]);
        self.children.insert(index, vertex);
        index
    }
}

/// The trie, rooted at an empty-key vertex that is never removed.
#[derive(Debug)]
pub(crate) struct CollapsedTrie {
    pub root: CollapsedVertex,
    nodes: usize,
}

impl Default for CollapsedTrie {
    fn default() -> Self {
        Self {
            root: CollapsedVertex::default(),
            nodes: 1,
        }
    }
}

fn match_length(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

impl CollapsedTrie {
    /// Number of vertices, root included.
    pub fn node_count(&self) -> usize {
        self.nodes
    }

    /// Find or create the vertex for `key`, invalidating merkle hashes on
    /// the way down. Returns whether a vertex was created.
    pub fn insert_or_find(&mut self, key: &[u8]) -> (bool, &mut CollapsedVertex) {
        if key.is_empty() {
            return (false, &mut self.root);
        }
        // Split borrows force the recursion to live in a helper.
        let nodes = &mut self.nodes;
        Self::insert(nodes, &mut self.root, key)
    }

    fn insert<'a>(
        nodes: &mut usize,
        vertex: &'a mut CollapsedVertex,
        key: &[u8],
    ) -> (bool, &'a mut CollapsedVertex) {
        vertex.merkle_hash = None;

        let Some(index) = vertex.find_nearest(key[0]) else {
            *nodes += 1;
            let at = vertex.insert_child(CollapsedVertex {
                key: key.to_vec(),
                ..CollapsedVertex::default()
            });
            return (true, &mut vertex.children[at]);
        };

        let matched = match_length(key, &vertex.children[index].key);
        if matched == 0 {
            *nodes += 1;
            let at = vertex.insert_child(CollapsedVertex {
                key: key.to_vec(),
                ..CollapsedVertex::default()
            });
            return (true, &mut vertex.children[at]);
        }

        if matched == key.len() && matched == vertex.children[index].key.len() {
            let child = &mut vertex.children[index];
            child.merkle_hash = None;
            return (false, child);
        }

        if matched < vertex.children[index].key.len() {
            // Split the edge: the existing child becomes a grandchild under
            // a fresh vertex keyed by the shared prefix.
            let mut old = std::mem::take(&mut vertex.children[index]);
            let prefix = old.key[..matched].to_vec();
            old.key = old.key[matched..].to_vec();
            let mut split = CollapsedVertex {
                key: prefix,
                ..CollapsedVertex::default()
            };
            split.children.push(old);
            vertex.children[index] = split;
            *nodes += 1;
            if matched == key.len() {
                return (true, &mut vertex.children[index]);
            }
        }

        let child = &mut vertex.children[index];
        Self::insert(nodes, child, &key[matched..])
    }

    /// The vertex for `key`, if present.
    pub fn find(&self, key: &[u8]) -> Option<&CollapsedVertex> {
        if key.is_empty() {
            return Some(&self.root);
        }
        let mut vertex = &self.root;
        let mut key = key;
        loop {
            let index = vertex.find_nearest(key[0])?;
            let child = &vertex.children[index];
            let matched = match_length(key, &child.key);
            if matched == key.len() && matched == child.key.len() {
                return Some(child);
            }
            if matched < child.key.len() || matched == key.len() {
                return None;
            }
            vertex = child;
            key = &key[matched..];
        }
    }

    /// The root-to-vertex path for `key`, as (child index within parent,
    /// vertex) pairs starting at the root (whose index is `-1`).
    pub fn find_path(&self, key: &[u8]) -> Option<(Vec<i32>, Vec<&CollapsedVertex>)> {
        let mut indexes = vec![-1];
        let mut path = vec![&self.root];
        if key.is_empty() {
            return Some((indexes, path));
        }
        let mut vertex = &self.root;
        let mut key = key;
        loop {
            let index = vertex.find_nearest(key[0])?;
            let child = &vertex.children[index];
            let matched = match_length(key, &child.key);
            if matched < child.key.len() && matched < key.len() {
                return None;
            }
            indexes.push(index as i32);
            path.push(child);
            if matched == key.len() && matched == child.key.len() {
                return Some((indexes, path));
            }
            if matched == key.len() {
                return None;
            }
            vertex = child;
            key = &key[matched..];
        }
    }

    /// Clear the claim hash at `key` and re-collapse pass-through vertices
    /// bottom-up. Returns whether any vertex was removed or merged.
    pub fn erase(&mut self, key: &[u8]) -> bool {
        let before = self.nodes;
        let nodes = &mut self.nodes;
        Self::erase_in(nodes, &mut self.root, key);
        self.root.merkle_hash = None;
        before > self.nodes
    }

    fn erase_in(nodes: &mut usize, vertex: &mut CollapsedVertex, key: &[u8]) -> bool {
        if key.is_empty() {
            vertex.claim_hash = None;
            vertex.merkle_hash = None;
            return true;
        }
        let Some(index) = vertex.find_nearest(key[0]) else {
            return false;
        };
        let matched = match_length(key, &vertex.children[index].key);
        if matched < vertex.children[index].key.len() {
            return false;
        }
        vertex.merkle_hash = None;
        let found = Self::erase_in(nodes, &mut vertex.children[index], &key[matched..]);
        if !found {
            return false;
        }

        let child = &mut vertex.children[index];
        if child.claim_hash.is_none() {
            if child.children.len() == 1 {
                // Merge the single grandchild into the child edge.
                let mut grand = child.children.remove(0);
                let mut merged_key = std::mem::take(&mut child.key);
                merged_key.extend_from_slice(&grand.key);
                grand.key = merged_key;
                grand.merkle_hash = None;
                *child = grand;
                *nodes -= 1;
            } else if child.children.is_empty() {
                vertex.children.remove(index);
                *nodes -= 1;
            }
        }
        true
    }
}
