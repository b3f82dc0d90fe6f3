use std::cmp::Ordering;
use std::sync::Arc;

use log::debug;

use crate::buffer::{BufferPoolManager, ReadPageGuard, WritePageGuard};
use crate::common::{DbError, IndexId, PageId, Result, RowId, INVALID_PAGE_ID};

use super::btree_page::{BTreePage, BTreePageMut, PageHeader, TreePage};
use super::index_roots_page;
use super::{IndexIterator, InternalPage, KeyManager, LeafPage};

/// A disk-resident B+Tree mapping unique fixed-size keys to [`RowId`]s.
///
/// Every node is a buffer pool page. The root page id is mirrored into the
/// index roots page so the tree can be reopened by `index_id`.
///
/// The tree does no latching of its own: mutations take `&mut self`, and a
/// live [`IndexIterator`] borrows the tree, so it is dropped before any
/// mutation can start.
pub struct BPlusTree {
    index_id: IndexId,
    root_page_id: PageId,
    bpm: Arc<BufferPoolManager>,
    key_manager: Arc<dyn KeyManager>,
    leaf_max_size: usize,
    internal_max_size: usize,
}

impl BPlusTree {
    /// Opens the tree registered under `index_id`, or an empty one.
    ///
    /// `None` fan-outs use as many entries as fit in a page, keeping one slot
    /// spare for the entry that triggers a split.
    pub fn new(
        index_id: IndexId,
        bpm: Arc<BufferPoolManager>,
        key_manager: Arc<dyn KeyManager>,
        leaf_max_size: Option<usize>,
        internal_max_size: Option<usize>,
    ) -> Result<Self> {
        let key_size = key_manager.key_size();
        let leaf_capacity = LeafPage::<&[u8]>::capacity(key_size);
        let internal_capacity = InternalPage::<&[u8]>::capacity(key_size);

        if leaf_capacity < 3 || internal_capacity < 4 {
            return Err(DbError::InvalidIndexConfig(format!(
                "key size {} is too large for a page",
                key_size
            )));
        }

        let leaf_max_size = leaf_max_size.unwrap_or(leaf_capacity - 1);
        let internal_max_size = internal_max_size.unwrap_or(internal_capacity - 1);

        if leaf_max_size < 2 || leaf_max_size >= leaf_capacity {
            return Err(DbError::InvalidIndexConfig(format!(
                "leaf max size {} must be in 2..{}",
                leaf_max_size, leaf_capacity
            )));
        }
        if internal_max_size < 3 || internal_max_size >= internal_capacity {
            return Err(DbError::InvalidIndexConfig(format!(
                "internal max size {} must be in 3..{}",
                internal_max_size, internal_capacity
            )));
        }

        index_roots_page::bootstrap(&bpm)?;
        let root_page_id = index_roots_page::read(&bpm)?
            .get_root_id(index_id)
            .unwrap_or(INVALID_PAGE_ID);

        debug!(
            "opened index {} (root {}, leaf max {}, internal max {})",
            index_id, root_page_id, leaf_max_size, internal_max_size
        );

        Ok(Self {
            index_id,
            root_page_id,
            bpm,
            key_manager,
            leaf_max_size,
            internal_max_size,
        })
    }

    pub fn index_id(&self) -> IndexId {
        self.index_id
    }

    pub fn root_page_id(&self) -> PageId {
        self.root_page_id
    }

    pub fn is_empty(&self) -> bool {
        !self.root_page_id.is_valid()
    }

    pub fn leaf_max_size(&self) -> usize {
        self.leaf_max_size
    }

    pub fn internal_max_size(&self) -> usize {
        self.internal_max_size
    }

    pub fn key_manager(&self) -> &Arc<dyn KeyManager> {
        &self.key_manager
    }

    fn check_key(&self, key: &[u8]) -> Result<()> {
        let expected = self.key_manager.key_size();
        if key.len() != expected {
            return Err(DbError::KeySizeMismatch {
                expected,
                actual: key.len(),
            });
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Search
    // ------------------------------------------------------------------

    /// Point lookup.
    pub fn get_value(&self, key: &[u8]) -> Result<Option<RowId>> {
        self.check_key(key)?;
        if self.is_empty() {
            return Ok(None);
        }

        let guard = self.find_leaf_page(Some(key))?;
        let leaf = LeafPage::new(guard.data());
        Ok(leaf.lookup(key, &*self.key_manager))
    }

    /// Descends to the leaf that may hold `key`, or the left-most leaf for `None`.
    /// Only one page is pinned at a time.
    pub(crate) fn find_leaf_page(&self, key: Option<&[u8]>) -> Result<ReadPageGuard> {
        let mut page_id = self.root_page_id;

        loop {
            let guard = self.bpm.fetch_page_read(page_id)?;
            let child = match TreePage::load(guard.data())? {
                TreePage::Leaf(_) => None,
                TreePage::Internal(node) => Some(match key {
                    Some(key) => node.lookup(key, &*self.key_manager),
                    None => node.value_at(0),
                }),
            };

            match child {
                Some(child) => page_id = child,
                None => return Ok(guard),
            }
        }
    }

    // ------------------------------------------------------------------
    // Insertion
    // ------------------------------------------------------------------

    /// Inserts a unique key. Returns false, changing nothing, if the key exists.
    ///
    /// A split first pins every page it will allocate and the leaf it
    /// splits, so running out of frames or disk space at that point leaves
    /// the tree untouched.
    pub fn insert(&mut self, key: &[u8], value: RowId) -> Result<bool> {
        self.check_key(key)?;

        if self.is_empty() {
            self.start_new_tree(key, value)?;
            return Ok(true);
        }

        let (leaf_id, leaf_size) = {
            let guard = self.find_leaf_page(Some(key))?;
            let leaf = LeafPage::new(guard.data());
            if leaf.lookup(key, &*self.key_manager).is_some() {
                return Ok(false);
            }
            (guard.page_id(), leaf.size())
        };

        if leaf_size < self.leaf_max_size {
            let mut guard = self.bpm.fetch_page_write(leaf_id)?;
            LeafPage::new(guard.data_mut()).insert(key, value, &*self.key_manager);
            return Ok(true);
        }

        let needed = self.pages_needed_for_split(leaf_id)?;
        let mut reserved = self.reserve_pages(needed)?;
        let mut leaf_guard = match self.bpm.fetch_page_write(leaf_id) {
            Ok(guard) => guard,
            Err(e) => {
                self.release_reserved(reserved)?;
                return Err(e);
            }
        };

        let (separator, new_leaf_id, parent_id) = {
            let mut new_guard = Self::take_reserved(&mut reserved)?;
            let new_leaf_id = new_guard.page_id();

            let mut leaf = LeafPage::new(leaf_guard.data_mut());
            leaf.insert(key, value, &*self.key_manager);

            let mut new_leaf = LeafPage::new(new_guard.data_mut());
            new_leaf.init(
                new_leaf_id,
                leaf.parent_page_id(),
                self.key_manager.key_size(),
                self.leaf_max_size,
            );
            leaf.move_half_to(&mut new_leaf);
            new_leaf.set_next_page_id(leaf.next_page_id());
            leaf.set_next_page_id(new_leaf_id);

            debug!("split leaf {} into {}", leaf_id, new_leaf_id);
            (new_leaf.key_at(0).to_vec(), new_leaf_id, leaf.parent_page_id())
        };
        drop(leaf_guard);

        self.insert_into_parent(leaf_id, parent_id, &separator, new_leaf_id, &mut reserved)?;
        debug_assert!(reserved.is_empty());
        Ok(true)
    }

    fn start_new_tree(&mut self, key: &[u8], value: RowId) -> Result<()> {
        let mut guard = self.bpm.new_page()?;
        let root_id = guard.page_id();

        let mut leaf = LeafPage::new(guard.data_mut());
        leaf.init(
            root_id,
            INVALID_PAGE_ID,
            self.key_manager.key_size(),
            self.leaf_max_size,
        );
        leaf.insert(key, value, &*self.key_manager);
        drop(guard);

        self.root_page_id = root_id;
        self.update_root_page_id()?;
        debug!("index {} started at root {}", self.index_id, root_id);
        Ok(())
    }

    /// Counts the pages a split starting at the full leaf `leaf_id` allocates:
    /// one per full node on the path, plus a new root if the root splits.
    fn pages_needed_for_split(&self, leaf_id: PageId) -> Result<usize> {
        let mut needed = 1;
        let mut parent_id = {
            let guard = self.bpm.fetch_page_read(leaf_id)?;
            PageHeader::new(guard.data()).parent_page_id()
        };

        while parent_id.is_valid() {
            let guard = self.bpm.fetch_page_read(parent_id)?;
            let parent = PageHeader::new(guard.data());
            if parent.size() < self.internal_max_size {
                return Ok(needed);
            }
            needed += 1;
            parent_id = parent.parent_page_id();
        }

        // The root splits too
        Ok(needed + 1)
    }

    /// Allocates and pins `count` pages, giving all of them back on failure.
    fn reserve_pages(&self, count: usize) -> Result<Vec<WritePageGuard>> {
        let mut reserved = Vec::with_capacity(count);

        for _ in 0..count {
            match self.bpm.new_page() {
                Ok(guard) => reserved.push(guard),
                Err(e) => {
                    self.release_reserved(reserved)?;
                    return Err(e);
                }
            }
        }

        Ok(reserved)
    }

    fn release_reserved(&self, reserved: Vec<WritePageGuard>) -> Result<()> {
        for guard in reserved {
            let page_id = guard.page_id();
            drop(guard);
            self.bpm.delete_page(page_id)?;
        }
        Ok(())
    }

    fn take_reserved(reserved: &mut Vec<WritePageGuard>) -> Result<WritePageGuard> {
        reserved.pop().ok_or_else(|| {
            DbError::IndexCorrupted("split needed more pages than reserved".to_string())
        })
    }

    /// Links `new_id`, split off from `old_id`, into `parent_id` under `key`,
    /// splitting upward as far as needed.
    fn insert_into_parent(
        &mut self,
        old_id: PageId,
        parent_id: PageId,
        key: &[u8],
        new_id: PageId,
        reserved: &mut Vec<WritePageGuard>,
    ) -> Result<()> {
        if !parent_id.is_valid() {
            let root_id = {
                let mut guard = Self::take_reserved(reserved)?;
                let root_id = guard.page_id();
                let mut root = InternalPage::new(guard.data_mut());
                root.init(
                    root_id,
                    INVALID_PAGE_ID,
                    self.key_manager.key_size(),
                    self.internal_max_size,
                );
                root.populate_new_root(old_id, key, new_id);
                root_id
            };
            self.set_parent(old_id, root_id)?;
            self.set_parent(new_id, root_id)?;

            self.root_page_id = root_id;
            self.update_root_page_id()?;
            debug!("index {} grew a new root {}", self.index_id, root_id);
            return Ok(());
        }

        let (separator, sibling_id, grandparent_id, moved) = {
            let mut parent_guard = self.bpm.fetch_page_write(parent_id)?;
            let mut parent = InternalPage::new(parent_guard.data_mut());

            let size = parent.insert_node_after(old_id, key, new_id).ok_or_else(|| {
                DbError::IndexCorrupted(format!("{} is not a child of {}", old_id, parent_id))
            })?;
            if size <= self.internal_max_size {
                return Ok(());
            }

            let mut sibling_guard = Self::take_reserved(reserved)?;
            let sibling_id = sibling_guard.page_id();
            let mut sibling = InternalPage::new(sibling_guard.data_mut());
            sibling.init(
                sibling_id,
                parent.parent_page_id(),
                self.key_manager.key_size(),
                self.internal_max_size,
            );
            let moved = parent.move_half_to(&mut sibling);

            debug!("split internal {} into {}", parent_id, sibling_id);
            (
                sibling.key_at(0).to_vec(),
                sibling_id,
                parent.parent_page_id(),
                moved,
            )
        };

        for child in moved {
            self.set_parent(child, sibling_id)?;
        }

        self.insert_into_parent(parent_id, grandparent_id, &separator, sibling_id, reserved)
    }

    fn set_parent(&self, page_id: PageId, parent_id: PageId) -> Result<()> {
        let mut guard = self.bpm.fetch_page_write(page_id)?;
        PageHeader::new(guard.data_mut()).set_parent_page_id(parent_id);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Removal
    // ------------------------------------------------------------------

    /// Removes `key`. Returns whether it was present.
    pub fn remove(&mut self, key: &[u8]) -> Result<bool> {
        self.check_key(key)?;
        if self.is_empty() {
            return Ok(false);
        }

        let leaf_id = self.find_leaf_page(Some(key))?.page_id();

        let (size, min_size, is_root) = {
            let mut guard = self.bpm.fetch_page_write(leaf_id)?;
            if LeafPage::new(guard.data())
                .lookup(key, &*self.key_manager)
                .is_none()
            {
                return Ok(false);
            }

            let mut leaf = LeafPage::new(guard.data_mut());
            leaf.remove(key, &*self.key_manager);
            (leaf.size(), leaf.min_size(), leaf.is_root())
        };

        if (is_root && size == 0) || (!is_root && size < min_size) {
            if self.coalesce_or_redistribute(leaf_id)? {
                self.bpm.delete_page(leaf_id)?;
            }
        }

        Ok(true)
    }

    /// Restores minimum occupancy of an underfull node. Returns true if
    /// the caller must delete `node_id`.
    fn coalesce_or_redistribute(&mut self, node_id: PageId) -> Result<bool> {
        let parent_id = {
            let guard = self.bpm.fetch_page_read(node_id)?;
            PageHeader::new(guard.data()).parent_page_id()
        };

        if !parent_id.is_valid() {
            return self.adjust_root(node_id);
        }

        let (node_index, sibling_id) = {
            let guard = self.bpm.fetch_page_read(parent_id)?;
            let parent = InternalPage::new(guard.data());
            let node_index = parent.value_index(node_id).ok_or_else(|| {
                DbError::IndexCorrupted(format!("{} is not a child of {}", node_id, parent_id))
            })?;
            // Prefer the left sibling
            let sibling_index = if node_index == 0 { 1 } else { node_index - 1 };
            (node_index, parent.value_at(sibling_index))
        };

        let (sibling_size, min_size) = {
            let guard = self.bpm.fetch_page_read(sibling_id)?;
            let sibling = PageHeader::new(guard.data());
            (sibling.size(), sibling.min_size())
        };

        if sibling_size > min_size {
            self.redistribute(sibling_id, node_id, parent_id, node_index)?;
            return Ok(false);
        }

        if node_index == 0 {
            // Node is leftmost: pull the right sibling into it
            self.coalesce(node_id, sibling_id, parent_id, 1)?;
            self.bpm.delete_page(sibling_id)?;
            Ok(false)
        } else {
            self.coalesce(sibling_id, node_id, parent_id, node_index)?;
            Ok(true)
        }
    }

    /// Moves every entry of `right_id` into `left_id` and drops the separator
    /// at `right_index` from the parent, then fixes up the parent.
    /// The caller deletes `right_id`.
    fn coalesce(
        &mut self,
        left_id: PageId,
        right_id: PageId,
        parent_id: PageId,
        right_index: usize,
    ) -> Result<()> {
        let moved = {
            let mut parent_guard = self.bpm.fetch_page_write(parent_id)?;
            let mut left_guard = self.bpm.fetch_page_write(left_id)?;
            let mut right_guard = self.bpm.fetch_page_write(right_id)?;
            let mut parent = InternalPage::new(parent_guard.data_mut());

            let moved = match (
                TreePage::load(left_guard.data_mut())?,
                TreePage::load(right_guard.data_mut())?,
            ) {
                (TreePage::Leaf(mut left), TreePage::Leaf(mut right)) => {
                    right.move_all_to(&mut left);
                    Vec::new()
                }
                (TreePage::Internal(mut left), TreePage::Internal(mut right)) => {
                    let middle_key = parent.key_at(right_index).to_vec();
                    right.move_all_to(&mut left, &middle_key)
                }
                _ => {
                    return Err(DbError::IndexCorrupted(format!(
                        "siblings {} and {} differ in kind",
                        left_id, right_id
                    )))
                }
            };

            parent.remove(right_index);
            debug!("coalesced {} into {}", right_id, left_id);
            moved
        };

        for child in moved {
            self.set_parent(child, left_id)?;
        }

        let (parent_size, parent_min, parent_is_root) = {
            let guard = self.bpm.fetch_page_read(parent_id)?;
            let parent = PageHeader::new(guard.data());
            (parent.size(), parent.min_size(), parent.is_root())
        };

        let underfull = if parent_is_root {
            parent_size <= 1
        } else {
            parent_size < parent_min
        };
        if underfull && self.coalesce_or_redistribute(parent_id)? {
            self.bpm.delete_page(parent_id)?;
        }

        Ok(())
    }

    /// Borrows one entry from `sibling_id` into `node_id` and fixes the
    /// separator between them in the parent.
    fn redistribute(
        &mut self,
        sibling_id: PageId,
        node_id: PageId,
        parent_id: PageId,
        node_index: usize,
    ) -> Result<()> {
        let moved_child = {
            let mut parent_guard = self.bpm.fetch_page_write(parent_id)?;
            let mut sibling_guard = self.bpm.fetch_page_write(sibling_id)?;
            let mut node_guard = self.bpm.fetch_page_write(node_id)?;
            let mut parent = InternalPage::new(parent_guard.data_mut());

            match (
                TreePage::load(sibling_guard.data_mut())?,
                TreePage::load(node_guard.data_mut())?,
            ) {
                (TreePage::Leaf(mut sibling), TreePage::Leaf(mut node)) => {
                    if node_index == 0 {
                        sibling.move_first_to_end_of(&mut node);
                        parent.set_key_at(1, sibling.key_at(0));
                    } else {
                        sibling.move_last_to_front_of(&mut node);
                        parent.set_key_at(node_index, node.key_at(0));
                    }
                    None
                }
                (TreePage::Internal(mut sibling), TreePage::Internal(mut node)) => {
                    if node_index == 0 {
                        let middle_key = parent.key_at(1).to_vec();
                        let child = sibling.move_first_to_end_of(&mut node, &middle_key);
                        parent.set_key_at(1, sibling.key_at(0));
                        Some(child)
                    } else {
                        let middle_key = parent.key_at(node_index).to_vec();
                        let child = sibling.move_last_to_front_of(&mut node, &middle_key);
                        parent.set_key_at(node_index, node.key_at(0));
                        Some(child)
                    }
                }
                _ => {
                    return Err(DbError::IndexCorrupted(format!(
                        "siblings {} and {} differ in kind",
                        sibling_id, node_id
                    )))
                }
            }
        };

        if let Some(child) = moved_child {
            self.set_parent(child, node_id)?;
        }

        debug!("redistributed from {} into {}", sibling_id, node_id);
        Ok(())
    }

    /// Shrinks the tree at the root. Returns true if the old root page must
    /// be deleted by the caller.
    fn adjust_root(&mut self, root_id: PageId) -> Result<bool> {
        let new_root = {
            let mut guard = self.bpm.fetch_page_write(root_id)?;
            match TreePage::load(guard.data_mut())? {
                TreePage::Internal(mut root) if root.size() == 1 => {
                    Some(root.remove_and_return_only_child())
                }
                TreePage::Internal(root) if root.size() == 0 => Some(INVALID_PAGE_ID),
                TreePage::Leaf(root) if root.size() == 0 => Some(INVALID_PAGE_ID),
                _ => None,
            }
        };

        let Some(new_root) = new_root else {
            return Ok(false);
        };

        if new_root.is_valid() {
            self.set_parent(new_root, INVALID_PAGE_ID)?;
            debug!("index {} root {} replaced by {}", self.index_id, root_id, new_root);
        } else {
            debug!("index {} is now empty", self.index_id);
        }

        self.root_page_id = new_root;
        self.update_root_page_id()?;
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Iteration
    // ------------------------------------------------------------------

    /// Iterator positioned at the smallest key.
    pub fn begin(&self) -> Result<IndexIterator<'_>> {
        if self.is_empty() {
            return Ok(self.end());
        }
        let guard = self.find_leaf_page(None)?;
        IndexIterator::new(&self.bpm, guard, 0)
    }

    /// Iterator positioned at the first key `>= key`.
    pub fn begin_at(&self, key: &[u8]) -> Result<IndexIterator<'_>> {
        self.check_key(key)?;
        if self.is_empty() {
            return Ok(self.end());
        }
        let guard = self.find_leaf_page(Some(key))?;
        let index = LeafPage::new(guard.data()).key_index(key, &*self.key_manager);
        IndexIterator::new(&self.bpm, guard, index)
    }

    /// The past-the-end position.
    pub fn end(&self) -> IndexIterator<'_> {
        IndexIterator::end(&self.bpm)
    }

    /// All entries with `start <= key <= end`, in key order.
    pub fn range_scan(&self, start: &[u8], end: &[u8]) -> Result<Vec<(Vec<u8>, RowId)>> {
        self.check_key(end)?;
        let mut result = Vec::new();

        for item in self.begin_at(start)? {
            let (key, rid) = item?;
            if self.key_manager.compare_keys(&key, end) == Ordering::Greater {
                break;
            }
            result.push((key, rid));
        }

        Ok(result)
    }

    // ------------------------------------------------------------------
    // Root bookkeeping and maintenance
    // ------------------------------------------------------------------

    /// Mirrors the current root into the index roots page.
    fn update_root_page_id(&self) -> Result<()> {
        let index_id = self.index_id;
        let root = self.root_page_id;
        index_roots_page::modify(&self.bpm, |roots| {
            if !roots.update(index_id, root) {
                roots.insert(index_id, root)?;
            }
            Ok(())
        })
    }

    /// Frees every page of the tree and forgets its root record.
    pub fn destroy(&mut self) -> Result<()> {
        if !self.is_empty() {
            self.destroy_subtree(self.root_page_id)?;
        }
        self.root_page_id = INVALID_PAGE_ID;

        let index_id = self.index_id;
        index_roots_page::modify(&self.bpm, |roots| Ok(roots.delete(index_id)))?;
        debug!("destroyed index {}", index_id);
        Ok(())
    }

    fn destroy_subtree(&self, page_id: PageId) -> Result<()> {
        let children = {
            let guard = self.bpm.fetch_page_read(page_id)?;
            match TreePage::load(guard.data())? {
                TreePage::Leaf(_) => Vec::new(),
                TreePage::Internal(node) => (0..node.size()).map(|i| node.value_at(i)).collect(),
            }
        };

        for child in children {
            self.destroy_subtree(child)?;
        }
        self.bpm.delete_page(page_id)?;
        Ok(())
    }

    /// Number of levels; 0 for an empty tree.
    pub fn height(&self) -> Result<usize> {
        if self.is_empty() {
            return Ok(0);
        }

        let mut height = 1;
        let mut page_id = self.root_page_id;
        loop {
            let guard = self.bpm.fetch_page_read(page_id)?;
            match TreePage::load(guard.data())? {
                TreePage::Leaf(_) => return Ok(height),
                TreePage::Internal(node) => page_id = node.value_at(0),
            }
            height += 1;
        }
    }

    /// Debug check that no page of the buffer pool was left pinned.
    pub fn check(&self) -> bool {
        self.bpm.check_all_unpinned()
    }

    /// Walks the whole tree checking key order, occupancy bounds, parent
    /// pointers, uniform leaf depth and the leaf chain.
    pub fn verify(&self) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }

        let mut leaves = Vec::new();
        let mut leaf_depth = None;
        self.verify_subtree(
            self.root_page_id,
            INVALID_PAGE_ID,
            None,
            None,
            1,
            &mut leaf_depth,
            &mut leaves,
        )?;

        // The leaf chain visits leaves in key order and ends at the last one.
        for pair in leaves.windows(2) {
            let guard = self.bpm.fetch_page_read(pair[0])?;
            let next = LeafPage::new(guard.data()).next_page_id();
            if next != pair[1] {
                return Err(corrupted(format!(
                    "leaf {} links to {} instead of {}",
                    pair[0], next, pair[1]
                )));
            }
        }
        if let Some(&last) = leaves.last() {
            let guard = self.bpm.fetch_page_read(last)?;
            let next = LeafPage::new(guard.data()).next_page_id();
            if next.is_valid() {
                return Err(corrupted(format!("last leaf {} links to {}", last, next)));
            }
        }

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn verify_subtree(
        &self,
        page_id: PageId,
        parent_id: PageId,
        lower: Option<&[u8]>,
        upper: Option<&[u8]>,
        depth: usize,
        leaf_depth: &mut Option<usize>,
        leaves: &mut Vec<PageId>,
    ) -> Result<()> {
        let km = &*self.key_manager;
        let guard = self.bpm.fetch_page_read(page_id)?;
        let page = TreePage::load(guard.data())?;

        let header = PageHeader::new(guard.data());
        if header.page_id() != page_id {
            return Err(corrupted(format!(
                "page {} records id {}",
                page_id,
                header.page_id()
            )));
        }
        if header.parent_page_id() != parent_id {
            return Err(corrupted(format!(
                "page {} has parent {} instead of {}",
                page_id,
                header.parent_page_id(),
                parent_id
            )));
        }

        let size = header.size();
        let is_root = !parent_id.is_valid();
        if size > header.max_size() || (!is_root && size < header.min_size()) {
            return Err(corrupted(format!(
                "page {} has size {} outside [{}, {}]",
                page_id,
                size,
                header.min_size(),
                header.max_size()
            )));
        }

        let in_bounds = |key: &[u8]| {
            lower.map_or(true, |lo| km.compare_keys(key, lo) != Ordering::Less)
                && upper.map_or(true, |hi| km.compare_keys(key, hi) == Ordering::Less)
        };

        match page {
            TreePage::Leaf(leaf) => {
                for i in 0..size {
                    if !in_bounds(leaf.key_at(i))
                        || (i > 0
                            && km.compare_keys(leaf.key_at(i - 1), leaf.key_at(i))
                                != Ordering::Less)
                    {
                        return Err(corrupted(format!("leaf {} is out of order", page_id)));
                    }
                }

                match *leaf_depth {
                    None => *leaf_depth = Some(depth),
                    Some(expected) if expected != depth => {
                        return Err(corrupted(format!(
                            "leaf {} at depth {}, expected {}",
                            page_id, depth, expected
                        )))
                    }
                    _ => {}
                }
                leaves.push(page_id);
                Ok(())
            }
            TreePage::Internal(node) => {
                if is_root && size < 2 {
                    return Err(corrupted(format!("root {} has {} children", page_id, size)));
                }
                for i in 1..size {
                    if !in_bounds(node.key_at(i))
                        || (i > 1
                            && km.compare_keys(node.key_at(i - 1), node.key_at(i))
                                != Ordering::Less)
                    {
                        return Err(corrupted(format!("internal {} is out of order", page_id)));
                    }
                }

                let children: Vec<(PageId, Option<Vec<u8>>, Option<Vec<u8>>)> = (0..size)
                    .map(|i| {
                        let lo = if i == 0 {
                            lower.map(<[u8]>::to_vec)
                        } else {
                            Some(node.key_at(i).to_vec())
                        };
                        let hi = if i + 1 < size {
                            Some(node.key_at(i + 1).to_vec())
                        } else {
                            upper.map(<[u8]>::to_vec)
                        };
                        (node.value_at(i), lo, hi)
                    })
                    .collect();
                drop(guard);

                for (child, lo, hi) in children {
                    self.verify_subtree(
                        child,
                        page_id,
                        lo.as_deref(),
                        hi.as_deref(),
                        depth + 1,
                        leaf_depth,
                        leaves,
                    )?;
                }
                Ok(())
            }
        }
    }
}

fn corrupted(message: String) -> DbError {
    DbError::IndexCorrupted(message)
}
