use crate::common::{PageId, Result, RowId, SlotId, INVALID_PAGE_ID, PAGE_SIZE};

use super::slotted_page::{SlottedPage, SLOTTED_PAGE_HEADER_SIZE, SLOT_SIZE};

/// Table page header layout (after the slotted page header):
///
/// | Field        | Offset | Size |
/// |--------------|--------|------|
/// | prev_page_id | 16     | 4    |
/// | next_page_id | 20     | 4    |
const PREV_PAGE_ID_OFFSET: usize = SLOTTED_PAGE_HEADER_SIZE;
const NEXT_PAGE_ID_OFFSET: usize = SLOTTED_PAGE_HEADER_SIZE + 4;

pub const TABLE_PAGE_HEADER_SIZE: usize = SLOTTED_PAGE_HEADER_SIZE + 8;

/// Largest tuple an empty table page can hold.
pub const MAX_TUPLE_SIZE: usize = PAGE_SIZE - TABLE_PAGE_HEADER_SIZE - SLOT_SIZE;

/// One page of a table heap: a slotted page doubly linked to its neighbours.
pub struct TablePage<B> {
    inner: SlottedPage<B>,
}

impl<B: AsRef<[u8]>> TablePage<B> {
    pub fn new(data: B) -> Self {
        Self {
            inner: SlottedPage::new(data),
        }
    }

    fn read_page_id(&self, offset: usize) -> PageId {
        let data = self.inner.bytes();
        PageId::new(i32::from_le_bytes([
            data[offset],
            data[offset + 1],
            data[offset + 2],
            data[offset + 3],
        ]))
    }

    pub fn page_id(&self) -> PageId {
        self.inner.page_id()
    }

    pub fn prev_page_id(&self) -> PageId {
        self.read_page_id(PREV_PAGE_ID_OFFSET)
    }

    pub fn next_page_id(&self) -> PageId {
        self.read_page_id(NEXT_PAGE_ID_OFFSET)
    }

    pub fn can_insert(&self, tuple_size: usize) -> bool {
        self.inner.can_insert(tuple_size)
    }

    pub fn free_space(&self) -> usize {
        self.inner.free_space()
    }

    /// Live tuple in `slot_id`; `None` when the slot is free, flagged as
    /// deleted or out of range.
    pub fn get_tuple(&self, slot_id: SlotId) -> Option<&[u8]> {
        self.inner.get_tuple(slot_id).ok()
    }

    /// First live slot at or after `from`.
    pub fn next_live_slot(&self, from: u32) -> Option<SlotId> {
        (from..self.inner.num_slots())
            .map(SlotId::new)
            .find(|&slot_id| self.inner.get_slot(slot_id).is_some_and(|e| e.is_live()))
    }

    pub fn tuple_count(&self) -> usize {
        self.inner.tuple_count()
    }

    pub fn row_ids(&self) -> impl Iterator<Item = RowId> + '_ {
        let page_id = self.page_id();
        self.inner
            .slot_ids()
            .map(move |slot_id| RowId::new(page_id, slot_id))
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> TablePage<B> {
    pub fn init(&mut self, page_id: PageId, prev_page_id: PageId) {
        self.inner.init(page_id, TABLE_PAGE_HEADER_SIZE);
        self.set_prev_page_id(prev_page_id);
        self.set_next_page_id(INVALID_PAGE_ID);
    }

    fn write_page_id(&mut self, offset: usize, page_id: PageId) {
        self.inner.bytes_mut()[offset..offset + 4]
            .copy_from_slice(&page_id.as_i32().to_le_bytes());
    }

    pub fn set_prev_page_id(&mut self, page_id: PageId) {
        self.write_page_id(PREV_PAGE_ID_OFFSET, page_id);
    }

    pub fn set_next_page_id(&mut self, page_id: PageId) {
        self.write_page_id(NEXT_PAGE_ID_OFFSET, page_id);
    }

    pub fn insert_tuple(&mut self, tuple: &[u8]) -> Result<RowId> {
        let slot_id = self.inner.insert_tuple(tuple)?;
        Ok(RowId::new(self.page_id(), slot_id))
    }

    pub fn update_tuple(&mut self, slot_id: SlotId, tuple: &[u8]) -> Result<bool> {
        self.inner.update_tuple(slot_id, tuple)
    }

    pub fn mark_delete(&mut self, slot_id: SlotId) -> bool {
        self.inner.mark_delete(slot_id)
    }

    pub fn rollback_delete(&mut self, slot_id: SlotId) -> bool {
        self.inner.rollback_delete(slot_id)
    }

    pub fn apply_delete(&mut self, slot_id: SlotId) -> bool {
        self.inner.apply_delete(slot_id)
    }
}
