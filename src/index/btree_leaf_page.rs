use std::cmp::Ordering;

use crate::common::{PageId, RowId, INVALID_PAGE_ID};

use super::btree_page::{
    entries_per_page, read_i32, write_i32, BTreePage, BTreePageMut, IndexPageType,
    BTREE_PAGE_HEADER_SIZE,
};
use super::KeyManager;

const NEXT_PAGE_ID_OFFSET: usize = BTREE_PAGE_HEADER_SIZE;

/// Header size of a leaf page: common header plus `next_page_id`
pub const LEAF_PAGE_HEADER_SIZE: usize = BTREE_PAGE_HEADER_SIZE + 4;

/// Leaf node: sorted `(key, RowId)` pairs and a link to the next leaf.
///
/// Each entry is `key_size` key bytes followed by an encoded [`RowId`].
pub struct LeafPage<B> {
    data: B,
}

impl<B> LeafPage<B> {
    /// Entries that physically fit in one page for the given key size.
    pub fn capacity(key_size: usize) -> usize {
        entries_per_page(LEAF_PAGE_HEADER_SIZE, key_size + RowId::ENCODED_SIZE)
    }
}

impl<B: AsRef<[u8]>> BTreePage for LeafPage<B> {
    fn bytes(&self) -> &[u8] {
        self.data.as_ref()
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> BTreePageMut for LeafPage<B> {
    fn bytes_mut(&mut self) -> &mut [u8] {
        self.data.as_mut()
    }
}

impl<B: AsRef<[u8]>> LeafPage<B> {
    pub fn new(data: B) -> Self {
        Self { data }
    }

    fn pair_size(&self) -> usize {
        self.key_size() + RowId::ENCODED_SIZE
    }

    fn entry_offset(&self, index: usize) -> usize {
        LEAF_PAGE_HEADER_SIZE + index * self.pair_size()
    }

    pub fn next_page_id(&self) -> PageId {
        PageId::new(read_i32(self.bytes(), NEXT_PAGE_ID_OFFSET))
    }

    pub fn key_at(&self, index: usize) -> &[u8] {
        let offset = self.entry_offset(index);
        &self.bytes()[offset..offset + self.key_size()]
    }

    pub fn value_at(&self, index: usize) -> RowId {
        let offset = self.entry_offset(index) + self.key_size();
        RowId::decode(&self.bytes()[offset..offset + RowId::ENCODED_SIZE])
    }

    /// First index whose key is `>= key`; `size()` if there is none.
    pub fn key_index(&self, key: &[u8], km: &dyn KeyManager) -> usize {
        let mut left = 0;
        let mut right = self.size();

        while left < right {
            let mid = left + (right - left) / 2;
            if km.compare_keys(self.key_at(mid), key) == Ordering::Less {
                left = mid + 1;
            } else {
                right = mid;
            }
        }

        left
    }

    pub fn lookup(&self, key: &[u8], km: &dyn KeyManager) -> Option<RowId> {
        let index = self.key_index(key, km);
        if index < self.size() && km.compare_keys(self.key_at(index), key) == Ordering::Equal {
            Some(self.value_at(index))
        } else {
            None
        }
    }

    fn entries(&self, from: usize, to: usize) -> &[u8] {
        &self.bytes()[self.entry_offset(from)..self.entry_offset(to)]
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> LeafPage<B> {
    pub fn init(&mut self, page_id: PageId, parent_page_id: PageId, key_size: usize, max_size: usize) {
        self.init_header(IndexPageType::Leaf, page_id, parent_page_id, key_size, max_size);
        self.set_next_page_id(INVALID_PAGE_ID);
    }

    pub fn set_next_page_id(&mut self, next_page_id: PageId) {
        write_i32(self.bytes_mut(), NEXT_PAGE_ID_OFFSET, next_page_id.as_i32());
    }

    /// Inserts a key that is not yet present, keeping entries sorted.
    /// Returns the new size.
    pub fn insert(&mut self, key: &[u8], value: RowId, km: &dyn KeyManager) -> usize {
        let index = self.key_index(key, km);
        self.insert_at(index, key, value);
        self.size()
    }

    fn insert_at(&mut self, index: usize, key: &[u8], value: RowId) {
        let size = self.size();
        debug_assert!(size < Self::capacity(self.key_size()));

        let start = self.entry_offset(index);
        let end = self.entry_offset(size);
        let pair_size = self.pair_size();
        let key_size = self.key_size();

        let data = self.bytes_mut();
        data.copy_within(start..end, start + pair_size);
        data[start..start + key_size].copy_from_slice(key);
        value.encode(&mut data[start + key_size..start + pair_size]);

        self.set_size(size + 1);
    }

    /// Removes `key` if present. Returns whether an entry was removed.
    pub fn remove(&mut self, key: &[u8], km: &dyn KeyManager) -> bool {
        let index = self.key_index(key, km);
        if index >= self.size() || km.compare_keys(self.key_at(index), key) != Ordering::Equal {
            return false;
        }
        self.remove_at(index);
        true
    }

    fn remove_at(&mut self, index: usize) {
        let size = self.size();
        let start = self.entry_offset(index);
        let next = self.entry_offset(index + 1);
        let end = self.entry_offset(size);

        self.bytes_mut().copy_within(next..end, start);
        self.set_size(size - 1);
    }

    fn append_entries(&mut self, entries: &[u8], count: usize) {
        let size = self.size();
        let start = self.entry_offset(size);
        self.bytes_mut()[start..start + entries.len()].copy_from_slice(entries);
        self.set_size(size + count);
    }

    /// Moves the upper half of the entries into an empty `recipient`.
    pub fn move_half_to<C: AsRef<[u8]> + AsMut<[u8]>>(&mut self, recipient: &mut LeafPage<C>) {
        let size = self.size();
        let keep = size - size / 2;

        recipient.append_entries(self.entries(keep, size), size - keep);
        self.set_size(keep);
    }

    /// Appends every entry to `recipient`, its left sibling, and hands over
    /// the next-leaf link.
    pub fn move_all_to<C: AsRef<[u8]> + AsMut<[u8]>>(&mut self, recipient: &mut LeafPage<C>) {
        let size = self.size();

        recipient.append_entries(self.entries(0, size), size);
        recipient.set_next_page_id(self.next_page_id());
        self.set_size(0);
    }

    /// Moves the first entry to the end of `recipient`, its left sibling.
    pub fn move_first_to_end_of<C: AsRef<[u8]> + AsMut<[u8]>>(
        &mut self,
        recipient: &mut LeafPage<C>,
    ) {
        recipient.append_entries(self.entries(0, 1), 1);
        self.remove_at(0);
    }

    /// Moves the last entry to the front of `recipient`, its right sibling.
    pub fn move_last_to_front_of<C: AsRef<[u8]> + AsMut<[u8]>>(
        &mut self,
        recipient: &mut LeafPage<C>,
    ) {
        let last = self.size() - 1;
        recipient.insert_at(0, self.key_at(last), self.value_at(last));
        self.remove_at(last);
    }
}
