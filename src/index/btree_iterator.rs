use crate::buffer::{BufferPoolManager, ReadPageGuard};
use crate::common::{PageId, Result, RowId, INVALID_PAGE_ID};

use super::btree_page::BTreePage;
use super::LeafPage;

/// Forward cursor over the leaf chain of a [`BPlusTree`](super::BPlusTree).
///
/// Holds a read guard on the current leaf, so the leaf stays pinned until
/// the cursor moves past it or is dropped. The cursor borrows the tree, so
/// the tree cannot be modified while it is alive:
///
/// ```compile_fail
/// # use std::sync::Arc;
/// # use minisql::buffer::BufferPoolManager;
/// # use minisql::index::{BPlusTree, IntegerKeyManager};
/// # use minisql::storage::disk::DiskManager;
/// # use minisql::{PageId, RowId, SlotId};
/// # let dm = Arc::new(DiskManager::new("iter.db").unwrap());
/// # let bpm = Arc::new(BufferPoolManager::new(16, dm));
/// let km = IntegerKeyManager::new_i32();
/// let mut tree = BPlusTree::new(0, bpm, Arc::new(km), None, None).unwrap();
/// let rid = RowId::new(PageId::new(1), SlotId::new(0));
///
/// let iter = tree.begin().unwrap();
/// tree.insert(&km.encode(1), rid).unwrap();
/// drop(iter);
/// ```
pub struct IndexIterator<'a> {
    bpm: &'a BufferPoolManager,
    guard: Option<ReadPageGuard>,
    page_id: PageId,
    index: usize,
}

impl<'a> IndexIterator<'a> {
    pub(crate) fn new(
        bpm: &'a BufferPoolManager,
        guard: ReadPageGuard,
        index: usize,
    ) -> Result<Self> {
        let page_id = guard.page_id();
        let mut iter = Self {
            bpm,
            guard: Some(guard),
            page_id,
            index,
        };
        iter.skip_exhausted_leaves()?;
        Ok(iter)
    }

    pub(crate) fn end(bpm: &'a BufferPoolManager) -> Self {
        Self {
            bpm,
            guard: None,
            page_id: INVALID_PAGE_ID,
            index: 0,
        }
    }

    pub fn is_end(&self) -> bool {
        self.guard.is_none()
    }

    /// Current leaf and slot; `(INVALID_PAGE_ID, 0)` at the end.
    pub fn position(&self) -> (PageId, usize) {
        (self.page_id, self.index)
    }

    /// Moves forward until the cursor sits on an entry or runs off the last leaf.
    fn skip_exhausted_leaves(&mut self) -> Result<()> {
        loop {
            let next_page_id = match &self.guard {
                None => return Ok(()),
                Some(guard) => {
                    let leaf = LeafPage::new(guard.data());
                    if self.index < leaf.size() {
                        return Ok(());
                    }
                    leaf.next_page_id()
                }
            };

            // Unpin before following the link
            self.guard = None;
            self.index = 0;
            self.page_id = next_page_id;

            if next_page_id.is_valid() {
                self.guard = Some(self.bpm.fetch_page_read(next_page_id)?);
            }
        }
    }

    /// Returns the entry under the cursor and advances past it.
    pub fn next_entry(&mut self) -> Result<Option<(Vec<u8>, RowId)>> {
        self.skip_exhausted_leaves()?;

        let entry = match &self.guard {
            None => return Ok(None),
            Some(guard) => {
                let leaf = LeafPage::new(guard.data());
                (leaf.key_at(self.index).to_vec(), leaf.value_at(self.index))
            }
        };

        self.index += 1;
        Ok(Some(entry))
    }
}

impl PartialEq for IndexIterator<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.position() == other.position()
    }
}

impl std::fmt::Debug for IndexIterator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexIterator")
            .field("page_id", &self.page_id)
            .field("index", &self.index)
            .finish()
    }
}

impl Iterator for IndexIterator<'_> {
    type Item = Result<(Vec<u8>, RowId)>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => None,
            Err(e) => {
                self.guard = None;
                self.page_id = INVALID_PAGE_ID;
                Some(Err(e))
            }
        }
    }
}
