//! The B-tree engine.
//!
//! [`BTree`] owns the tree file, the header, the optional page cache and
//! the authoritative in-memory root, and orchestrates search, insert/split
//! and traversal over them.
//!
//! # Lifecycle
//! ```text
//! create/open ──▶ mutating (insert/search/iterate) ──▶ finalize
//!                                                        │
//!                        root + dirty cache + header ────┘ written, synced
//! ```
//! Only a finalized file is guaranteed self-consistent on disk: the header
//! and the root page are deliberately not rewritten on every mutation, so
//! a tree that is dropped mid-ingest may leave the file describing an
//! older state.

use std::io;
use std::path::Path;

use tracing::{debug, trace, warn};

use crate::cache::{CacheStats, PageCache};
use crate::common::config::{resolve_degree, AUTO_DEGREE};
use crate::common::{Error, NodeAddress, Result};
use crate::storage::{FileManager, TreeHeader};
use crate::tree::entry::Entry;
use crate::tree::iter::OrderedEntries;
use crate::tree::node::Node;

/// A disk-resident B-tree of [`Entry`]s, ordered by key.
///
/// Inserting a key that is already stored merges into the existing entry's
/// count; the tree never holds two entries with the same key. Deletion is
/// not supported.
///
/// All operations take `&mut self`: the engine is single-threaded by
/// design and even reads may reshape the cache.
///
/// # Example
/// ```no_run
/// use tallytree::{BTree, Entry};
///
/// let mut tree = BTree::create("counts.bt", 0)?; // 0 = automatic degree
/// for key in [3, 1, 3, 7] {
///     tree.insert(Entry::new(key))?;
/// }
/// assert_eq!(tree.search(3)?.map(|e| e.count()), Some(2));
/// tree.finalize()?;
/// # Ok::<(), tallytree::Error>(())
/// ```
pub struct BTree {
    file: FileManager,
    cache: Option<PageCache>,
    header: TreeHeader,
    /// The authoritative copy of the root node.
    ///
    /// The root lives here, not in the cache; its page on disk stays stale
    /// until a split demotes it or `finalize` runs. Writes aimed at the
    /// root's address are suppressed so a cached duplicate can never
    /// shadow this copy.
    root: Node,
    finalized: bool,
}

impl BTree {
    // ========================================================================
    // Construction
    // ========================================================================

    /// Create a new tree file with no page cache.
    ///
    /// `degree` 0 ([`AUTO_DEGREE`]) selects the largest degree whose node
    /// block fits in one 4096-byte disk block.
    ///
    /// # Errors
    /// Returns [`Error::InvalidDegree`] for degree 1, or an I/O error if
    /// the file already exists or cannot be created.
    pub fn create<P: AsRef<Path>>(path: P, degree: u32) -> Result<Self> {
        Self::create_inner(path, degree, None)
    }

    /// Create a new tree file with a page cache of `capacity` nodes.
    ///
    /// # Panics
    /// Panics if `capacity` is 0; use [`BTree::create`] for an uncached tree.
    pub fn create_with_cache<P: AsRef<Path>>(
        path: P,
        degree: u32,
        capacity: usize,
    ) -> Result<Self> {
        Self::create_inner(path, degree, Some(PageCache::new(capacity)))
    }

    /// Open an existing tree file, or create one with automatic degree if
    /// it doesn't exist. No page cache.
    ///
    /// # Errors
    /// Returns [`Error::CorruptHeader`] if the header fails validation.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_inner(path, None)
    }

    /// Open or create, with a page cache of `capacity` nodes.
    ///
    /// # Panics
    /// Panics if `capacity` is 0; use [`BTree::open`] for an uncached tree.
    pub fn open_with_cache<P: AsRef<Path>>(path: P, capacity: usize) -> Result<Self> {
        Self::open_inner(path, Some(PageCache::new(capacity)))
    }

    fn create_inner<P: AsRef<Path>>(
        path: P,
        degree: u32,
        cache: Option<PageCache>,
    ) -> Result<Self> {
        let degree = resolve_degree(degree)?;

        let mut file = FileManager::create(&path)?;
        let root_address = file.allocate(degree)?;
        let root = Node::new_leaf();
        file.write_node(root_address, &root, degree)?;

        let header = TreeHeader::new(degree, root_address);
        file.write_header(&header)?;
        file.sync()?;

        debug!(path = ?path.as_ref(), degree, "tree created");
        Ok(Self {
            file,
            cache,
            header,
            root,
            finalized: false,
        })
    }

    fn open_inner<P: AsRef<Path>>(path: P, cache: Option<PageCache>) -> Result<Self> {
        if !path.as_ref().exists() {
            return Self::create_inner(path, AUTO_DEGREE, cache);
        }

        let mut file = FileManager::open(&path)?;
        let header = file.read_header()?;
        header.validate(file.file_size())?;
        let root = file.read_node(header.root, header.degree)?;

        debug!(
            path = ?path.as_ref(),
            degree = header.degree,
            keys = header.key_count,
            height = header.height,
            "tree opened"
        );
        Ok(Self {
            file,
            cache,
            header,
            root,
            finalized: false,
        })
    }

    // ========================================================================
    // Public API: queries
    // ========================================================================

    /// Look up a key.
    ///
    /// Returns the stored entry (key + occurrence count) or `None`.
    /// Costs O(height) node fetches, served from the cache where possible.
    pub fn search(&mut self, key: i64) -> Result<Option<Entry>> {
        // The root is examined in place; descent below it goes through
        // the page-fetch path.
        let mut address = match self.root.position_of(key) {
            Ok(position) => return Ok(Some(self.root.entries[position])),
            Err(_) if self.root.is_leaf() => return Ok(None),
            Err(child_index) => self.root.child(child_index),
        };

        loop {
            let node = self.fetch_node(address)?;
            match node.position_of(key) {
                Ok(position) => return Ok(Some(node.entries[position])),
                Err(_) if node.is_leaf() => return Ok(None),
                Err(child_index) => address = node.child(child_index),
            }
        }
    }

    /// Iterate every entry in ascending key order.
    ///
    /// The iterator fetches nodes on demand through the cache, holding at
    /// most one node per tree level in memory. It borrows the tree
    /// mutably, so the tree cannot change shape mid-iteration.
    ///
    /// # Errors
    /// Construction fails if the leftmost descent hits an I/O or decode
    /// error; later failures surface as `Some(Err(_))` items.
    pub fn ordered_entries(&mut self) -> Result<OrderedEntries<'_>> {
        OrderedEntries::new(self)
    }

    /// Feed every entry, in ascending key order, to `sink`.
    ///
    /// This is the bulk-export seam: the caller decides what an entry
    /// becomes (a database row, a text line, a record in another store).
    pub fn dump_ordered<F>(&mut self, mut sink: F) -> Result<()>
    where
        F: FnMut(&Entry) -> Result<()>,
    {
        for entry in self.ordered_entries()? {
            sink(&entry?)?;
        }
        Ok(())
    }

    /// Write every entry as a `"<key> <count>"` line in ascending key order.
    pub fn dump_to_writer<W: io::Write>(&mut self, out: &mut W) -> Result<()> {
        self.dump_ordered(|entry| {
            writeln!(out, "{} {}", entry.key(), entry.count())?;
            Ok(())
        })
    }

    // ========================================================================
    // Public API: mutation
    // ========================================================================

    /// Insert an entry.
    ///
    /// If the key is already stored, the existing entry absorbs this one's
    /// count (for an [`Entry::new`] that means +1); otherwise the entry is
    /// placed in a leaf, splitting full nodes on the way down.
    pub fn insert(&mut self, entry: Entry) -> Result<()> {
        if self.root.is_full(self.header.degree) {
            self.grow_root()?;
        }

        let root_address = self.header.root;
        let mut root = std::mem::take(&mut self.root);
        let result = self.insert_nonfull(root_address, &mut root, entry);
        self.root = root;
        result
    }

    /// Remove a key.
    ///
    /// Deletion is unsupported and this is deliberately a no-op: the tree
    /// only ever grows, and nothing downstream needs removal.
    pub fn delete(&mut self, _key: i64) {}

    /// Write back every dirty cached node without finalizing.
    ///
    /// Bounds the loss window during a long ingest. The root and header
    /// are still only written by [`BTree::finalize`].
    pub fn flush(&mut self) -> Result<()> {
        let degree = self.header.degree;
        let dirty = match self.cache.as_mut() {
            Some(cache) => cache.take_dirty(),
            None => Vec::new(),
        };
        for (address, node) in dirty {
            self.file.write_node(address, &node, degree)?;
        }
        Ok(())
    }

    /// Flush everything and close the tree.
    ///
    /// Writes the in-memory root to its page, writes back every dirty
    /// cached node (order-independent - node regions are disjoint), writes
    /// the header and syncs. Consuming `self` makes "no inserts after
    /// finalize" a compile-time guarantee.
    pub fn finalize(mut self) -> Result<()> {
        let degree = self.header.degree;

        let root_address = self.header.root;
        let root = std::mem::take(&mut self.root);
        self.file.write_node(root_address, &root, degree)?;

        let dirty = match self.cache.as_mut() {
            Some(cache) => cache.take_dirty(),
            None => Vec::new(),
        };
        for (address, node) in dirty {
            self.file.write_node(address, &node, degree)?;
        }

        self.file.write_header(&self.header)?;
        self.file.sync()?;
        self.finalized = true;

        debug!(
            keys = self.header.key_count,
            height = self.header.height,
            "tree finalized"
        );
        Ok(())
    }

    // ========================================================================
    // Public API: accessors
    // ========================================================================

    /// Number of stored entries (distinct keys).
    #[inline]
    pub fn len(&self) -> u64 {
        u64::from(self.header.key_count)
    }

    /// Whether the tree holds no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.header.key_count == 0
    }

    /// Height of the tree; a lone leaf root has height 1.
    #[inline]
    pub fn height(&self) -> u32 {
        self.header.height
    }

    /// The tree's minimum degree `t`.
    #[inline]
    pub fn degree(&self) -> u32 {
        self.header.degree
    }

    /// Number of node regions in the file, including regions whose node
    /// was since demoted (regions are append-only and never reclaimed).
    #[inline]
    pub fn node_count(&self) -> u64 {
        self.file.node_count(self.header.degree)
    }

    /// Cache counters, if a cache is configured.
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(PageCache::stats)
    }

    /// Walk the whole tree and verify its structural invariants.
    ///
    /// Checks strict key ordering (within and across nodes), occupancy
    /// bounds, child arity, uniform leaf depth matching the recorded
    /// height, and that the entry total matches the recorded key count.
    /// Diagnostic: O(n) node fetches.
    ///
    /// # Errors
    /// Returns [`Error::CorruptNode`] describing the first violation.
    pub fn check_invariants(&mut self) -> Result<()> {
        let root_address = self.header.root;
        let root = self.root.clone();
        let mut leaf_depths: Vec<u32> = Vec::new();
        let mut total_entries: u64 = 0;

        self.verify_subtree(
            root_address,
            &root,
            true,
            1,
            None,
            None,
            &mut leaf_depths,
            &mut total_entries,
        )?;

        let height = self.header.height;
        if leaf_depths.iter().any(|&depth| depth != height) {
            return Err(Error::CorruptNode {
                address: root_address,
                reason: format!(
                    "leaf depths {:?} disagree with height {}",
                    leaf_depths, height
                ),
            });
        }
        if total_entries != u64::from(self.header.key_count) {
            return Err(Error::CorruptNode {
                address: root_address,
                reason: format!(
                    "{} entries stored but key count says {}",
                    total_entries, self.header.key_count
                ),
            });
        }
        Ok(())
    }

    // ========================================================================
    // Internal: insert machinery
    // ========================================================================

    /// Replace a full root with a fresh one and split the old root into it.
    ///
    /// This is the only place height grows. The demoted root gets its
    /// first real page write here; from now on it moves through the cache
    /// like any other node.
    fn grow_root(&mut self) -> Result<()> {
        let old_address = self.header.root;
        let new_address = self.file.allocate(self.header.degree)?;

        let demoted = std::mem::replace(&mut self.root, Node::internal_over(old_address));
        self.header.root = new_address;
        self.header.height += 1;
        self.save_node(old_address, demoted)?;

        debug!(
            %old_address,
            %new_address,
            height = self.header.height,
            "root split"
        );

        let mut root = std::mem::take(&mut self.root);
        let result = self.split_child(new_address, &mut root, 0);
        self.root = root;
        result
    }

    /// Insert into the subtree rooted at `node`, which is not full.
    ///
    /// The duplicate check comes first at every level - before any slots
    /// shift and before any child splits - so a merge never mutates
    /// structure and an insert never has to roll back.
    fn insert_nonfull(
        &mut self,
        address: NodeAddress,
        node: &mut Node,
        entry: Entry,
    ) -> Result<()> {
        match node.position_of(entry.key()) {
            Ok(position) => {
                node.entries[position].merge_from(&entry);
                self.persist(address, node)
            }
            Err(position) if node.is_leaf() => {
                node.entries.insert(position, entry);
                self.header.key_count += 1;
                self.persist(address, node)
            }
            Err(position) => {
                let mut child_index = position;
                let mut child = self.fetch_node(node.child(child_index))?;

                if child.is_full(self.header.degree) {
                    self.split_child(address, node, child_index)?;

                    // The promoted median now sits at child_index. The
                    // entry may match it (merge here) or belong to its
                    // right (shift one child over).
                    match entry.key().cmp(&node.key_at(child_index)) {
                        std::cmp::Ordering::Equal => {
                            node.entries[child_index].merge_from(&entry);
                            return self.persist(address, node);
                        }
                        std::cmp::Ordering::Greater => child_index += 1,
                        std::cmp::Ordering::Less => {}
                    }
                    child = self.fetch_node(node.child(child_index))?;
                }

                let child_address = node.child(child_index);
                self.insert_nonfull(child_address, &mut child, entry)
            }
        }
    }

    /// Split the full child at `parent.children[index]`.
    ///
    /// The child keeps its lower half in place; the upper half moves to a
    /// freshly allocated sibling; the median entry is promoted into the
    /// parent between them. Both halves are persisted through the cache;
    /// the parent is persisted unless it is the root.
    fn split_child(
        &mut self,
        parent_address: NodeAddress,
        parent: &mut Node,
        index: usize,
    ) -> Result<()> {
        let degree = self.header.degree;
        let child_address = parent.children[index];
        let mut child = self.fetch_node(child_address)?;

        let (median, sibling) = child.split_upper_half(degree);
        let sibling_address = self.file.allocate(degree)?;

        trace!(
            %child_address,
            %sibling_address,
            promoted = median.key(),
            "child split"
        );

        parent.entries.insert(index, median);
        parent.children.insert(index + 1, sibling_address);

        self.save_node(child_address, child)?;
        self.save_node(sibling_address, sibling)?;
        self.persist(parent_address, parent)
    }

    // ========================================================================
    // Internal: the page-fetch path
    // ========================================================================

    /// Fetch the node at `address`, through the cache when one is
    /// configured.
    ///
    /// A miss reads from disk and makes the node resident; if that evicts
    /// a dirty slot, the evicted node is written back first.
    fn fetch_node(&mut self, address: NodeAddress) -> Result<Node> {
        let degree = self.header.degree;

        let cached = match self.cache.as_mut() {
            Some(cache) => cache.get(address).cloned(),
            None => return self.file.read_node(address, degree),
        };
        if let Some(node) = cached {
            return Ok(node);
        }

        let node = self.file.read_node(address, degree)?;
        if let Some(cache) = self.cache.as_mut() {
            if let Some((evicted_address, evicted)) = cache.insert(address, node.clone(), false) {
                self.file.write_node(evicted_address, &evicted, degree)?;
            }
        }
        Ok(node)
    }

    /// Store a mutated non-root node, through the cache when one is
    /// configured (write-back) or straight to disk otherwise
    /// (write-through).
    fn save_node(&mut self, address: NodeAddress, node: Node) -> Result<()> {
        debug_assert_ne!(
            address, self.header.root,
            "the root is never saved through the cache path"
        );
        let degree = self.header.degree;

        if let Some(cache) = self.cache.as_mut() {
            if let Some((evicted_address, evicted)) = cache.insert(address, node, true) {
                self.file.write_node(evicted_address, &evicted, degree)?;
            }
            Ok(())
        } else {
            self.file.write_node(address, &node, degree)
        }
    }

    /// Persist a node mutated during descent.
    ///
    /// Writes addressed at the current root are suppressed: the engine's
    /// in-memory root is authoritative until finalize or a demotion, and a
    /// cached duplicate of it could otherwise shadow live state.
    fn persist(&mut self, address: NodeAddress, node: &Node) -> Result<()> {
        if address == self.header.root {
            return Ok(());
        }
        self.save_node(address, node.clone())
    }

    // ========================================================================
    // Internal: invariant checking
    // ========================================================================

    #[allow(clippy::too_many_arguments)]
    fn verify_subtree(
        &mut self,
        address: NodeAddress,
        node: &Node,
        is_root: bool,
        depth: u32,
        lower: Option<i64>,
        upper: Option<i64>,
        leaf_depths: &mut Vec<u32>,
        total_entries: &mut u64,
    ) -> Result<()> {
        let degree = self.header.degree;
        let corrupt = |reason: String| Error::CorruptNode { address, reason };

        let count = node.entry_count();
        if count > Node::max_keys(degree) {
            return Err(corrupt(format!("{} keys exceed capacity", count)));
        }
        if !is_root && count < Node::min_keys(degree) {
            return Err(corrupt(format!(
                "{} keys below minimum {}",
                count,
                Node::min_keys(degree)
            )));
        }

        for window in node.entries.windows(2) {
            if window[0].key() >= window[1].key() {
                return Err(corrupt(format!(
                    "keys not strictly ascending ({} then {})",
                    window[0].key(),
                    window[1].key()
                )));
            }
        }
        for entry in &node.entries {
            if lower.is_some_and(|bound| entry.key() <= bound)
                || upper.is_some_and(|bound| entry.key() >= bound)
            {
                return Err(corrupt(format!(
                    "key {} escapes its separator bounds",
                    entry.key()
                )));
            }
        }

        if node.is_leaf() {
            leaf_depths.push(depth);
        } else {
            if node.children.len() != count + 1 {
                return Err(corrupt(format!(
                    "{} children for {} keys",
                    node.children.len(),
                    count
                )));
            }
            for child_index in 0..=count {
                let child_address = node.children[child_index];
                let child = self.fetch_node(child_address)?;
                let child_lower = if child_index == 0 {
                    lower
                } else {
                    Some(node.key_at(child_index - 1))
                };
                let child_upper = if child_index == count {
                    upper
                } else {
                    Some(node.key_at(child_index))
                };
                self.verify_subtree(
                    child_address,
                    &child,
                    false,
                    depth + 1,
                    child_lower,
                    child_upper,
                    leaf_depths,
                    total_entries,
                )?;
            }
        }

        *total_entries += count as u64;
        Ok(())
    }

    // ========================================================================
    // Internal: shared with the iterator
    // ========================================================================

    /// A copy of the authoritative root, for walks that start above the
    /// page-fetch path.
    pub(crate) fn root_snapshot(&self) -> Node {
        self.root.clone()
    }

    /// The iterator's window into the page-fetch path.
    pub(crate) fn fetch_for_iteration(&mut self, address: NodeAddress) -> Result<Node> {
        self.fetch_node(address)
    }
}

impl Drop for BTree {
    fn drop(&mut self) {
        if !self.finalized {
            warn!(
                keys = self.header.key_count,
                "tree dropped without finalize; unflushed state is lost"
            );
        }
    }
}
