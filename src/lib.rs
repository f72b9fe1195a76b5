//! tallytree - an external-memory B-tree that counts key occurrences.
//!
//! A disk-resident ordered index for streams of `i64` keys too large to
//! count in memory. Inserting a key that is already stored merges into its
//! occurrence count instead of storing a duplicate, so the tree holds one
//! entry per distinct key; a full traversal yields the entries in
//! ascending key order for bulk export.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                        tallytree                        │
//! ├─────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────┐    │
//! │  │              Engine (tree/)                     │    │
//! │  │   BTree: insert/split · search · traversal      │    │
//! │  │   Entry + Node codecs · OrderedEntries          │    │
//! │  └─────────────────────────────────────────────────┘    │
//! │                          ↓                              │
//! │  ┌─────────────────────────────────────────────────┐    │
//! │  │            Page Cache (cache/)                  │    │
//! │  │   Bounded LRU, dirty tracking, write-back       │    │
//! │  │   eviction · CacheStats                         │    │
//! │  └─────────────────────────────────────────────────┘    │
//! │                          ↓                              │
//! │  ┌─────────────────────────────────────────────────┐    │
//! │  │            Storage (storage/)                   │    │
//! │  │   FileManager: header + node-region I/O         │    │
//! │  │   TreeHeader: the 20-byte file header           │    │
//! │  └─────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//! - [`common`] - Shared primitives (NodeAddress, Error, config)
//! - [`storage`] - File I/O and on-disk formats
//! - [`cache`] - The bounded write-back page cache
//! - [`tree`] - The B-tree engine, entries, nodes and traversal
//!
//! # Quick Start
//! ```no_run
//! use tallytree::{BTree, Entry};
//!
//! // Degree 0 picks the largest node that fits one 4KB disk block.
//! let mut tree = BTree::create_with_cache("counts.bt", 0, 128)?;
//!
//! for key in [17, 3, 17, 92, 3, 17] {
//!     tree.insert(Entry::new(key))?;
//! }
//!
//! assert_eq!(tree.search(17)?.map(|e| e.count()), Some(3));
//!
//! // Ascending export: 3 2 / 17 3 / 92 1
//! let mut out = Vec::new();
//! tree.dump_to_writer(&mut out)?;
//!
//! tree.finalize()?;
//! # Ok::<(), tallytree::Error>(())
//! ```
//!
//! # Scope
//! Single-threaded and synchronous by design; every operation takes
//! `&mut self`. Deletion is a deliberate no-op. The file is guaranteed
//! self-consistent only after [`BTree::finalize`].

// Core modules
pub mod cache;
pub mod common;
pub mod storage;
pub mod tree;

// Re-export commonly used items at crate root for convenience
pub use common::config::{AUTO_DEGREE, HEADER_SIZE, MAX_NODE_SIZE};
pub use common::{Error, NodeAddress, Result};

pub use cache::{CacheStats, PageCache};
pub use storage::{FileManager, TreeHeader};
pub use tree::{BTree, Entry, OrderedEntries};
