use std::cmp::Ordering;

use crate::common::PageId;

use super::btree_page::{
    entries_per_page, read_i32, write_i32, BTreePage, BTreePageMut, IndexPageType,
    BTREE_PAGE_HEADER_SIZE,
};
use super::KeyManager;

/// Header size of an internal page
pub const INTERNAL_PAGE_HEADER_SIZE: usize = BTREE_PAGE_HEADER_SIZE;

const CHILD_SIZE: usize = 4;

/// Internal node: `size` child pointers separated by keys.
///
/// Entry `i` is `(key_i, child_i)`. The key in slot 0 is never compared;
/// every key in `child_i` is `>= key_i` and `< key_{i+1}`.
pub struct InternalPage<B> {
    data: B,
}

impl<B> InternalPage<B> {
    /// Entries that physically fit in one page for the given key size.
    pub fn capacity(key_size: usize) -> usize {
        entries_per_page(INTERNAL_PAGE_HEADER_SIZE, key_size + CHILD_SIZE)
    }
}

impl<B: AsRef<[u8]>> BTreePage for InternalPage<B> {
    fn bytes(&self) -> &[u8] {
        self.data.as_ref()
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> BTreePageMut for InternalPage<B> {
    fn bytes_mut(&mut self) -> &mut [u8] {
        self.data.as_mut()
    }
}

impl<B: AsRef<[u8]>> InternalPage<B> {
    pub fn new(data: B) -> Self {
        Self { data }
    }

    fn pair_size(&self) -> usize {
        self.key_size() + CHILD_SIZE
    }

    fn entry_offset(&self, index: usize) -> usize {
        INTERNAL_PAGE_HEADER_SIZE + index * self.pair_size()
    }

    pub fn key_at(&self, index: usize) -> &[u8] {
        let offset = self.entry_offset(index);
        &self.bytes()[offset..offset + self.key_size()]
    }

    pub fn value_at(&self, index: usize) -> PageId {
        let offset = self.entry_offset(index) + self.key_size();
        PageId::new(read_i32(self.bytes(), offset))
    }

    /// Slot holding `child`, if any.
    pub fn value_index(&self, child: PageId) -> Option<usize> {
        (0..self.size()).find(|&i| self.value_at(i) == child)
    }

    /// Child whose subtree may contain `key`.
    pub fn lookup(&self, key: &[u8], km: &dyn KeyManager) -> PageId {
        // Last slot in 1..size whose key is <= `key`, or slot 0.
        let mut left = 1;
        let mut right = self.size();

        while left < right {
            let mid = left + (right - left) / 2;
            if km.compare_keys(self.key_at(mid), key) == Ordering::Greater {
                right = mid;
            } else {
                left = mid + 1;
            }
        }

        self.value_at(left - 1)
    }

    fn children(&self, from: usize, to: usize) -> Vec<PageId> {
        (from..to).map(|i| self.value_at(i)).collect()
    }

    fn entries(&self, from: usize, to: usize) -> &[u8] {
        &self.bytes()[self.entry_offset(from)..self.entry_offset(to)]
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> InternalPage<B> {
    pub fn init(&mut self, page_id: PageId, parent_page_id: PageId, key_size: usize, max_size: usize) {
        self.init_header(IndexPageType::Internal, page_id, parent_page_id, key_size, max_size);
    }

    pub fn set_key_at(&mut self, index: usize, key: &[u8]) {
        let offset = self.entry_offset(index);
        let key_size = self.key_size();
        self.bytes_mut()[offset..offset + key_size].copy_from_slice(key);
    }

    pub fn set_value_at(&mut self, index: usize, child: PageId) {
        let offset = self.entry_offset(index) + self.key_size();
        write_i32(self.bytes_mut(), offset, child.as_i32());
    }

    /// Turns an empty page into a root with two children.
    pub fn populate_new_root(&mut self, old_child: PageId, key: &[u8], new_child: PageId) {
        self.set_size(2);
        self.set_value_at(0, old_child);
        self.set_key_at(1, key);
        self.set_value_at(1, new_child);
    }

    /// Inserts `(key, new_child)` right after the slot of `old_child`.
    /// Returns the new size, or `None` if `old_child` is not here.
    pub fn insert_node_after(
        &mut self,
        old_child: PageId,
        key: &[u8],
        new_child: PageId,
    ) -> Option<usize> {
        let index = self.value_index(old_child)? + 1;
        self.insert_at(index, key, new_child);
        Some(self.size())
    }

    fn insert_at(&mut self, index: usize, key: &[u8], child: PageId) {
        let size = self.size();
        debug_assert!(size < Self::capacity(self.key_size()));

        let start = self.entry_offset(index);
        let end = self.entry_offset(size);
        let pair_size = self.pair_size();

        self.bytes_mut().copy_within(start..end, start + pair_size);
        self.set_size(size + 1);
        self.set_key_at(index, key);
        self.set_value_at(index, child);
    }

    pub fn remove(&mut self, index: usize) {
        let size = self.size();
        let start = self.entry_offset(index);
        let next = self.entry_offset(index + 1);
        let end = self.entry_offset(size);

        self.bytes_mut().copy_within(next..end, start);
        self.set_size(size - 1);
    }

    /// Empties a page that has a single child and returns that child.
    pub fn remove_and_return_only_child(&mut self) -> PageId {
        let child = self.value_at(0);
        self.set_size(0);
        child
    }

    fn append_entries(&mut self, entries: &[u8], count: usize) {
        let size = self.size();
        let start = self.entry_offset(size);
        self.bytes_mut()[start..start + entries.len()].copy_from_slice(entries);
        self.set_size(size + count);
    }

    /// Moves the upper half of the entries into an empty `recipient`. The key
    /// left in the recipient's slot 0 is the separator for the parent.
    /// Returns the children that changed parent.
    pub fn move_half_to<C: AsRef<[u8]> + AsMut<[u8]>>(
        &mut self,
        recipient: &mut InternalPage<C>,
    ) -> Vec<PageId> {
        let size = self.size();
        let keep = size - size / 2;

        recipient.append_entries(self.entries(keep, size), size - keep);
        let moved = self.children(keep, size);
        self.set_size(keep);
        moved
    }

    /// Appends every entry to `recipient`, its left sibling. `middle_key` is
    /// the parent's separator between the two and becomes the key of this
    /// page's first child. Returns the children that changed parent.
    pub fn move_all_to<C: AsRef<[u8]> + AsMut<[u8]>>(
        &mut self,
        recipient: &mut InternalPage<C>,
        middle_key: &[u8],
    ) -> Vec<PageId> {
        let size = self.size();
        self.set_key_at(0, middle_key);

        recipient.append_entries(self.entries(0, size), size);
        let moved = self.children(0, size);
        self.set_size(0);
        moved
    }

    /// Moves the first child to the end of `recipient`, its left sibling,
    /// under `middle_key`. Afterwards `key_at(0)` is the new separator.
    /// Returns the moved child.
    pub fn move_first_to_end_of<C: AsRef<[u8]> + AsMut<[u8]>>(
        &mut self,
        recipient: &mut InternalPage<C>,
        middle_key: &[u8],
    ) -> PageId {
        let child = self.value_at(0);
        let size = recipient.size();
        recipient.insert_at(size, middle_key, child);
        self.remove(0);
        child
    }

    /// Moves the last child to the front of `recipient`, its right sibling.
    /// `middle_key` becomes the key of the recipient's former first child and
    /// the recipient's `key_at(0)` is the new separator. Returns the moved child.
    pub fn move_last_to_front_of<C: AsRef<[u8]> + AsMut<[u8]>>(
        &mut self,
        recipient: &mut InternalPage<C>,
        middle_key: &[u8],
    ) -> PageId {
        let last = self.size() - 1;
        let child = self.value_at(last);

        recipient.set_key_at(0, middle_key);
        recipient.insert_at(0, self.key_at(last), child);
        self.remove(last);
        child
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{INVALID_PAGE_ID, PAGE_SIZE};
    use crate::index::IntegerKeyManager;

    fn key(k: i64) -> Vec<u8> {
        IntegerKeyManager::new_i32().encode(k)
    }

    /// Children 100, 101, ... separated by `keys`.
    fn internal_with<'a>(data: &'a mut [u8], first_child: i32, keys: &[i64]) -> InternalPage<&'a mut [u8]> {
        let mut page = InternalPage::new(data);
        page.init(PageId::new(1), INVALID_PAGE_ID, 4, 16);
        page.populate_new_root(PageId::new(first_child), &key(keys[0]), PageId::new(first_child + 1));
        for (i, &k) in keys.iter().enumerate().skip(1) {
            let prev = PageId::new(first_child + i as i32);
            page.insert_node_after(prev, &key(k), PageId::new(first_child + i as i32 + 1))
                .unwrap();
        }
        page
    }

    fn keys_of<B: AsRef<[u8]>>(page: &InternalPage<B>) -> Vec<i64> {
        let km = IntegerKeyManager::new_i32();
        (1..page.size()).map(|i| km.decode(page.key_at(i))).collect()
    }

    fn children_of<B: AsRef<[u8]>>(page: &InternalPage<B>) -> Vec<i32> {
        (0..page.size()).map(|i| page.value_at(i).as_i32()).collect()
    }

    #[test]
    fn test_internal_lookup() {
        let km = IntegerKeyManager::new_i32();
        let mut data = [0u8; PAGE_SIZE];
        let page = internal_with(&mut data, 100, &[10, 20, 30]);

        assert_eq!(page.size(), 4);
        assert_eq!(page.lookup(&key(5), &km), PageId::new(100));
        assert_eq!(page.lookup(&key(10), &km), PageId::new(101));
        assert_eq!(page.lookup(&key(25), &km), PageId::new(102));
        assert_eq!(page.lookup(&key(30), &km), PageId::new(103));
        assert_eq!(page.lookup(&key(99), &km), PageId::new(103));
        assert_eq!(page.value_index(PageId::new(102)), Some(2));
        assert_eq!(page.value_index(PageId::new(7)), None);
    }

    #[test]
    fn test_internal_insert_after_and_remove() {
        let mut data = [0u8; PAGE_SIZE];
        let mut page = internal_with(&mut data, 100, &[10, 30]);

        assert_eq!(page.insert_node_after(PageId::new(101), &key(20), PageId::new(200)), Some(4));
        assert_eq!(keys_of(&page), vec![10, 20, 30]);
        assert_eq!(children_of(&page), vec![100, 101, 200, 102]);

        page.remove(2);
        assert_eq!(keys_of(&page), vec![10, 30]);
        assert_eq!(children_of(&page), vec![100, 101, 102]);
        assert_eq!(page.insert_node_after(PageId::new(999), &key(1), PageId::new(1)), None);
    }

    #[test]
    fn test_internal_move_half() {
        let mut left_data = [0u8; PAGE_SIZE];
        let mut right_data = [0u8; PAGE_SIZE];
        let mut left = internal_with(&mut left_data, 100, &[10, 20, 30, 40]);
        let mut right = InternalPage::new(&mut right_data[..]);
        right.init(PageId::new(2), INVALID_PAGE_ID, 4, 16);

        let moved = left.move_half_to(&mut right);
        assert_eq!(children_of(&left), vec![100, 101, 102]);
        assert_eq!(children_of(&right), vec![103, 104]);
        assert_eq!(moved, vec![PageId::new(103), PageId::new(104)]);
        // Separator for the parent
        assert_eq!(right.key_at(0), &key(30)[..]);
    }

    #[test]
    fn test_internal_move_all_and_borrow() {
        let mut left_data = [0u8; PAGE_SIZE];
        let mut right_data = [0u8; PAGE_SIZE];
        let mut left = internal_with(&mut left_data, 100, &[10]);
        let mut right = internal_with(&mut right_data, 200, &[60, 70]);

        // Parent separator between the two is 50
        let moved = right.move_first_to_end_of(&mut left, &key(50));
        assert_eq!(moved, PageId::new(200));
        assert_eq!(keys_of(&left), vec![10, 50]);
        assert_eq!(children_of(&left), vec![100, 101, 200]);
        assert_eq!(right.key_at(0), &key(60)[..]);
        assert_eq!(children_of(&right), vec![201, 202]);

        // Give it back; the separator is now 60
        let moved = left.move_last_to_front_of(&mut right, &key(60));
        assert_eq!(moved, PageId::new(200));
        assert_eq!(right.key_at(0), &key(50)[..]);
        assert_eq!(keys_of(&right), vec![60, 70]);
        assert_eq!(children_of(&right), vec![200, 201, 202]);

        let moved = right.move_all_to(&mut left, &key(50));
        assert_eq!(moved.len(), 3);
        assert_eq!(keys_of(&left), vec![10, 50, 60, 70]);
        assert_eq!(children_of(&left), vec![100, 101, 200, 201, 202]);
        assert_eq!(right.size(), 0);
    }

    #[test]
    fn test_remove_and_return_only_child() {
        let mut data = [0u8; PAGE_SIZE];
        let mut page = internal_with(&mut data, 100, &[10]);
        page.remove(1);
        assert_eq!(page.remove_and_return_only_child(), PageId::new(100));
        assert_eq!(page.size(), 0);
    }
}
