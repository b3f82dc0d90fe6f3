//! minisql - the storage and indexing core of a small disk-oriented database
//!
//! Pages live in a single file and are cached in memory by a buffer pool.
//! Indexes are B+Trees whose nodes are buffer pool pages.
//!
//! # Architecture
//!
//! - **Storage Layer** (`storage`): page I/O and on-page formats
//!   - `DiskManager`: extent-based page allocation with bitmap pages
//!   - `DiskScheduler`: background worker that performs page I/O
//!   - `SlottedPage` / `TablePage`: variable-length rows within a page
//!   - `TableHeap`: chain of table pages holding opaque rows
//!
//! - **Buffer Pool** (`buffer`): caches pages in a fixed number of frames
//!   - `BufferPoolManager`: fetches, pins, evicts and flushes pages
//!   - `LruReplacer`: least-recently-unpinned eviction behind the `Replacer` trait
//!   - `ReadPageGuard` / `WritePageGuard`: RAII pins with shared or exclusive access
//!
//! - **Index** (`index`): disk-resident B+Tree
//!   - `BPlusTree`: unique fixed-size keys mapped to `RowId`s
//!   - `IndexIterator`: ordered scan over the leaf chain
//!   - `IndexRootsPage`: directory of tree roots at the reserved page 0
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use minisql::buffer::BufferPoolManager;
//! use minisql::index::{BPlusTree, IntegerKeyManager};
//! use minisql::storage::disk::DiskManager;
//! use minisql::{PageId, RowId, SlotId};
//!
//! let disk_manager = Arc::new(DiskManager::new("test.db").unwrap());
//! let bpm = Arc::new(BufferPoolManager::new(64, disk_manager));
//!
//! let km = IntegerKeyManager::new_i32();
//! let mut tree = BPlusTree::new(0, bpm, Arc::new(km), None, None).unwrap();
//!
//! let rid = RowId::new(PageId::new(7), SlotId::new(0));
//! tree.insert(&km.encode(42), rid).unwrap();
//! assert_eq!(tree.get_value(&km.encode(42)).unwrap(), Some(rid));
//! ```

pub mod buffer;
pub mod common;
pub mod index;
pub mod storage;

// Re-export commonly used types at the crate root
pub use common::{DbError, IndexId, PageId, Result, RowId, SlotId};
