use crate::common::{DbError, PageId, Result, SlotId, PAGE_SIZE};

/// Slotted page layout:
///
/// +------------------+
/// | Page Header      |  (header_size bytes)
/// +------------------+
/// | Slot Array       |  (grows downward)
/// +------------------+
/// | Free Space       |
/// +------------------+
/// | Tuple Data       |  (grows upward from the end of the page)
/// +------------------+
///
/// Header fields (little endian):
///
/// | Field            | Offset | Size |
/// |------------------|--------|------|
/// | page_id          | 0      | 4    |
/// | num_slots        | 4      | 4    |
/// | free_space_start | 8      | 4    |
/// | free_space_end   | 12     | 4    |
///
/// A slot is `offset u16, length u16`. Offset 0 marks a free slot, and the
/// top bit of `length` marks a tuple as deleted but not yet removed.
pub const SLOTTED_PAGE_HEADER_SIZE: usize = 16;

pub const SLOT_SIZE: usize = 4;

const PAGE_ID_OFFSET: usize = 0;
const NUM_SLOTS_OFFSET: usize = 4;
const FREE_SPACE_START_OFFSET: usize = 8;
const FREE_SPACE_END_OFFSET: usize = 12;

const DELETE_MASK: u16 = 0x8000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotEntry {
    pub offset: u16,
    pub length: u16,
    pub deleted: bool,
}

impl SlotEntry {
    fn free() -> Self {
        Self {
            offset: 0,
            length: 0,
            deleted: false,
        }
    }

    pub fn is_free(&self) -> bool {
        self.offset == 0
    }

    pub fn is_live(&self) -> bool {
        !self.is_free() && !self.deleted
    }

    fn range(&self) -> std::ops::Range<usize> {
        self.offset as usize..self.offset as usize + self.length as usize
    }
}

/// View of a page buffer as a slotted page of variable-length tuples.
///
/// Slot ids are stable: removing a tuple frees its slot for reuse but never
/// renumbers other slots.
pub struct SlottedPage<B> {
    data: B,
}

impl<B: AsRef<[u8]>> SlottedPage<B> {
    pub fn new(data: B) -> Self {
        debug_assert_eq!(data.as_ref().len(), PAGE_SIZE);
        Self { data }
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        self.data.as_ref()
    }

    fn read_u32(&self, offset: usize) -> u32 {
        let data = self.bytes();
        u32::from_le_bytes([
            data[offset],
            data[offset + 1],
            data[offset + 2],
            data[offset + 3],
        ])
    }

    fn read_u16(&self, offset: usize) -> u16 {
        let data = self.bytes();
        u16::from_le_bytes([data[offset], data[offset + 1]])
    }

    pub fn page_id(&self) -> PageId {
        PageId::new(self.read_u32(PAGE_ID_OFFSET) as i32)
    }

    pub fn num_slots(&self) -> u32 {
        self.read_u32(NUM_SLOTS_OFFSET)
    }

    pub fn free_space_start(&self) -> usize {
        self.read_u32(FREE_SPACE_START_OFFSET) as usize
    }

    pub fn free_space_end(&self) -> usize {
        self.read_u32(FREE_SPACE_END_OFFSET) as usize
    }

    pub fn free_space(&self) -> usize {
        self.free_space_end().saturating_sub(self.free_space_start())
    }

    /// Start of the slot array, derived from where it currently ends.
    fn slot_array_base(&self) -> usize {
        self.free_space_start() - self.num_slots() as usize * SLOT_SIZE
    }

    fn slot_offset(&self, slot_id: SlotId) -> usize {
        self.slot_array_base() + slot_id.as_u32() as usize * SLOT_SIZE
    }

    pub fn get_slot(&self, slot_id: SlotId) -> Option<SlotEntry> {
        if slot_id.as_u32() >= self.num_slots() {
            return None;
        }

        let at = self.slot_offset(slot_id);
        let length = self.read_u16(at + 2);
        Some(SlotEntry {
            offset: self.read_u16(at),
            length: length & !DELETE_MASK,
            deleted: length & DELETE_MASK != 0,
        })
    }

    /// Whether a tuple of `tuple_size` bytes fits, counting a new slot
    /// unless a free one can be reused.
    pub fn can_insert(&self, tuple_size: usize) -> bool {
        let slot_cost = if self.find_free_slot().is_some() {
            0
        } else {
            SLOT_SIZE
        };
        self.free_space() >= tuple_size + slot_cost
    }

    fn find_free_slot(&self) -> Option<SlotId> {
        (0..self.num_slots())
            .map(SlotId::new)
            .find(|&slot_id| self.get_slot(slot_id).is_some_and(|e| e.is_free()))
    }

    /// Bytes of a live tuple.
    pub fn get_tuple(&self, slot_id: SlotId) -> Result<&[u8]> {
        let entry = self
            .get_slot(slot_id)
            .ok_or(DbError::InvalidSlotId(slot_id))?;
        if !entry.is_live() {
            return Err(DbError::EmptySlot(slot_id));
        }
        Ok(&self.bytes()[entry.range()])
    }

    /// Live slots in ascending order.
    pub fn slot_ids(&self) -> impl Iterator<Item = SlotId> + '_ {
        (0..self.num_slots())
            .map(SlotId::new)
            .filter(move |&slot_id| self.get_slot(slot_id).is_some_and(|e| e.is_live()))
    }

    pub fn tuple_count(&self) -> usize {
        self.slot_ids().count()
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> SlottedPage<B> {
    pub(crate) fn bytes_mut(&mut self) -> &mut [u8] {
        self.data.as_mut()
    }

    fn write_u32(&mut self, offset: usize, value: u32) {
        self.bytes_mut()[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn write_u16(&mut self, offset: usize, value: u16) {
        self.bytes_mut()[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
    }

    /// Formats an empty page whose header takes `header_size` bytes.
    pub fn init(&mut self, page_id: PageId, header_size: usize) {
        debug_assert!(header_size >= SLOTTED_PAGE_HEADER_SIZE);
        self.bytes_mut().fill(0);
        self.write_u32(PAGE_ID_OFFSET, page_id.as_i32() as u32);
        self.write_u32(NUM_SLOTS_OFFSET, 0);
        self.write_u32(FREE_SPACE_START_OFFSET, header_size as u32);
        self.write_u32(FREE_SPACE_END_OFFSET, PAGE_SIZE as u32);
    }

    fn set_slot(&mut self, slot_id: SlotId, entry: SlotEntry) {
        let at = self.slot_offset(slot_id);
        let length = if entry.deleted {
            entry.length | DELETE_MASK
        } else {
            entry.length
        };
        self.write_u16(at, entry.offset);
        self.write_u16(at + 2, length);
    }

    /// Copies `tuple` below the data area and returns its offset.
    fn place(&mut self, tuple: &[u8]) -> u16 {
        let end = self.free_space_end();
        let start = end - tuple.len();
        self.bytes_mut()[start..end].copy_from_slice(tuple);
        self.write_u32(FREE_SPACE_END_OFFSET, start as u32);
        start as u16
    }

    /// Removes the bytes of `entry` from the data area, shifting every tuple
    /// stored below it up and fixing their slots.
    fn reclaim(&mut self, entry: SlotEntry) {
        let length = entry.length as usize;
        let data_start = self.free_space_end();
        let hole = entry.offset as usize;

        self.bytes_mut()
            .copy_within(data_start..hole, data_start + length);
        self.write_u32(FREE_SPACE_END_OFFSET, (data_start + length) as u32);

        for slot_id in (0..self.num_slots()).map(SlotId::new) {
            if let Some(mut other) = self.get_slot(slot_id) {
                if !other.is_free() && (other.offset as usize) < hole {
                    other.offset += entry.length;
                    self.set_slot(slot_id, other);
                }
            }
        }
    }

    /// Stores a tuple, reusing a free slot when there is one.
    pub fn insert_tuple(&mut self, tuple: &[u8]) -> Result<SlotId> {
        if !self.can_insert(tuple.len()) {
            return Err(DbError::PageOverflow {
                tuple_size: tuple.len(),
                available: self.free_space().saturating_sub(SLOT_SIZE),
            });
        }

        let slot_id = match self.find_free_slot() {
            Some(slot_id) => slot_id,
            None => {
                let slot_id = SlotId::new(self.num_slots());
                let start = self.free_space_start();
                self.write_u32(NUM_SLOTS_OFFSET, slot_id.as_u32() + 1);
                self.write_u32(FREE_SPACE_START_OFFSET, (start + SLOT_SIZE) as u32);
                slot_id
            }
        };

        let offset = self.place(tuple);
        self.set_slot(
            slot_id,
            SlotEntry {
                offset,
                length: tuple.len() as u16,
                deleted: false,
            },
        );
        Ok(slot_id)
    }

    /// Flags a live tuple as deleted. Returns false if it is not live.
    pub fn mark_delete(&mut self, slot_id: SlotId) -> bool {
        match self.get_slot(slot_id) {
            Some(mut entry) if entry.is_live() => {
                entry.deleted = true;
                self.set_slot(slot_id, entry);
                true
            }
            _ => false,
        }
    }

    /// Clears the delete flag. Returns false if the tuple was not flagged.
    pub fn rollback_delete(&mut self, slot_id: SlotId) -> bool {
        match self.get_slot(slot_id) {
            Some(mut entry) if !entry.is_free() && entry.deleted => {
                entry.deleted = false;
                self.set_slot(slot_id, entry);
                true
            }
            _ => false,
        }
    }

    /// Removes a tuple for good, flagged or not, and frees its space.
    pub fn apply_delete(&mut self, slot_id: SlotId) -> bool {
        match self.get_slot(slot_id) {
            Some(entry) if !entry.is_free() => {
                self.reclaim(entry);
                self.set_slot(slot_id, SlotEntry::free());
                true
            }
            _ => false,
        }
    }

    /// Replaces a live tuple. Returns false, leaving the page unchanged,
    /// when the new bytes do not fit.
    pub fn update_tuple(&mut self, slot_id: SlotId, tuple: &[u8]) -> Result<bool> {
        let entry = self
            .get_slot(slot_id)
            .ok_or(DbError::InvalidSlotId(slot_id))?;
        if !entry.is_live() {
            return Err(DbError::EmptySlot(slot_id));
        }

        if tuple.len() > self.free_space() + entry.length as usize {
            return Ok(false);
        }

        self.reclaim(entry);
        let offset = self.place(tuple);
        self.set_slot(
            slot_id,
            SlotEntry {
                offset,
                length: tuple.len() as u16,
                deleted: false,
            },
        );
        Ok(true)
    }
}
