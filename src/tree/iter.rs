//! Disk-driven in-order traversal.
//!
//! [`OrderedEntries`] walks the tree with an explicit frame stack instead
//! of native recursion, so its memory use is bounded by tree height rather
//! than entry count. Nodes are fetched lazily through the engine's
//! cache-aware page-fetch path as the walk first reaches them.

use crate::common::{NodeAddress, Result};
use crate::tree::btree::BTree;
use crate::tree::entry::Entry;
use crate::tree::node::Node;

/// One level of the in-order walk.
///
/// `index` is the next entry to emit; `descend_next` records that the
/// entry at `index - 1` was just emitted and its right subtree (the child
/// at `index`) must be visited before the next entry.
struct Frame {
    node: Node,
    index: usize,
    descend_next: bool,
}

impl Frame {
    fn new(node: Node) -> Self {
        Self {
            node,
            index: 0,
            descend_next: false,
        }
    }
}

/// What the top frame asks for on one step of the walk.
enum Step {
    Emit(Entry),
    Descend(NodeAddress),
    Pop,
}

/// An iterator over every entry in ascending key order.
///
/// Yields `Result<Entry>`: a fetch that fails mid-walk surfaces as an
/// `Err` item and ends the iteration; entries already yielded stay valid.
///
/// Borrowing the tree mutably for the iterator's lifetime means the tree
/// cannot be mutated mid-walk - stale-frame hazards are ruled out at
/// compile time rather than left undefined.
///
/// # Example
/// ```no_run
/// use tallytree::{BTree, Entry};
///
/// let mut tree = BTree::open("counts.bt")?;
/// for entry in tree.ordered_entries()? {
///     let entry = entry?;
///     println!("{} {}", entry.key(), entry.count());
/// }
/// # Ok::<(), tallytree::Error>(())
/// ```
pub struct OrderedEntries<'a> {
    tree: &'a mut BTree,
    stack: Vec<Frame>,
}

impl<'a> OrderedEntries<'a> {
    /// Start a walk at the tree's root.
    ///
    /// Pushes the root frame and descends the leftmost child chain, one
    /// frame per level. A tree whose root is an empty leaf yields nothing.
    pub(crate) fn new(tree: &'a mut BTree) -> Result<Self> {
        let root = tree.root_snapshot();
        let leftmost_child = root.child(0);

        let mut entries = Self {
            tree,
            stack: Vec::new(),
        };
        entries.stack.push(Frame::new(root));
        entries.push_left_chain(leftmost_child)?;
        Ok(entries)
    }

    /// Push frames for `address` and every leftmost descendant below it,
    /// leaving the minimum of that subtree on top of the stack.
    fn push_left_chain(&mut self, mut address: NodeAddress) -> Result<()> {
        while address.is_valid() {
            let node = self.tree.fetch_for_iteration(address)?;
            address = node.child(0);
            self.stack.push(Frame::new(node));
        }
        Ok(())
    }

    /// Decide what the top frame does next, advancing its cursor.
    fn step(&mut self) -> Option<Step> {
        let frame = self.stack.last_mut()?;

        if frame.descend_next {
            frame.descend_next = false;
            return Some(Step::Descend(frame.node.child(frame.index)));
        }
        if frame.index == frame.node.entry_count() {
            return Some(Step::Pop);
        }

        let entry = frame.node.entries()[frame.index];
        frame.index += 1;
        frame.descend_next = true;
        Some(Step::Emit(entry))
    }
}

impl Iterator for OrderedEntries<'_> {
    type Item = Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.step()? {
                Step::Emit(entry) => return Some(Ok(entry)),
                Step::Descend(address) => {
                    // A leaf answers NIL for every child, making the
                    // descend step a no-op there.
                    if address.is_valid() {
                        if let Err(error) = self.push_left_chain(address) {
                            self.stack.clear();
                            return Some(Err(error));
                        }
                    }
                }
                Step::Pop => {
                    self.stack.pop();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn collect_keys(tree: &mut BTree) -> Vec<i64> {
        tree.ordered_entries()
            .unwrap()
            .map(|entry| entry.unwrap().key())
            .collect()
    }

    #[test]
    fn test_empty_tree_yields_nothing() {
        let dir = tempdir().unwrap();
        let mut tree = BTree::create(dir.path().join("t.bt"), 2).unwrap();

        assert_eq!(tree.ordered_entries().unwrap().count(), 0);
    }

    #[test]
    fn test_single_leaf_in_order() {
        let dir = tempdir().unwrap();
        let mut tree = BTree::create(dir.path().join("t.bt"), 2).unwrap();

        for key in [30, 10, 20] {
            tree.insert(Entry::new(key)).unwrap();
        }
        assert_eq!(collect_keys(&mut tree), vec![10, 20, 30]);
    }

    #[test]
    fn test_multi_level_in_order() {
        let dir = tempdir().unwrap();
        let mut tree = BTree::create(dir.path().join("t.bt"), 2).unwrap();

        let keys: Vec<i64> = (0..64).map(|k| (k * 37) % 64).collect();
        for &key in &keys {
            tree.insert(Entry::new(key)).unwrap();
        }
        assert!(tree.height() > 2);
        assert_eq!(collect_keys(&mut tree), (0..64).collect::<Vec<i64>>());
    }

    #[test]
    fn test_counts_travel_with_keys() {
        let dir = tempdir().unwrap();
        let mut tree = BTree::create(dir.path().join("t.bt"), 2).unwrap();

        for key in [5, 6, 5, 7, 5] {
            tree.insert(Entry::new(key)).unwrap();
        }

        let collected: Vec<(i64, i32)> = tree
            .ordered_entries()
            .unwrap()
            .map(|entry| {
                let entry = entry.unwrap();
                (entry.key(), entry.count())
            })
            .collect();
        assert_eq!(collected, vec![(5, 3), (6, 1), (7, 1)]);
    }

    #[test]
    fn test_iteration_is_repeatable() {
        let dir = tempdir().unwrap();
        let mut tree = BTree::create(dir.path().join("t.bt"), 2).unwrap();

        for key in 0..32 {
            tree.insert(Entry::new(key)).unwrap();
        }

        let first = collect_keys(&mut tree);
        let second = collect_keys(&mut tree);
        assert_eq!(first, second);
    }
}
