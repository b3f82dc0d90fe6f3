use std::fmt;

/// Logical page identifier - stable id of a page independent of where it lives in the file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId(pub i32);

impl PageId {
    pub fn new(id: i32) -> Self {
        Self(id)
    }

    pub fn as_i32(&self) -> i32 {
        self.0
    }

    /// Returns true unless this is the `INVALID_PAGE_ID` sentinel (or any negative id).
    pub fn is_valid(&self) -> bool {
        self.0 >= 0
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PageId({})", self.0)
    }
}

/// Frame identifier type - identifies a buffer frame in the buffer pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(pub u32);

impl FrameId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn as_usize(&self) -> usize {
        self.0 as usize
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FrameId({})", self.0)
    }
}

/// Slot identifier within a table page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(pub u32);

impl SlotId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

/// Row identifier - physical location of a row as (page, slot)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowId {
    pub page_id: PageId,
    pub slot_id: SlotId,
}

impl RowId {
    /// Encoded size inside index pages: page id (4) + slot (4).
    pub const ENCODED_SIZE: usize = 8;

    pub fn new(page_id: PageId, slot_id: SlotId) -> Self {
        Self { page_id, slot_id }
    }

    pub fn encode(&self, out: &mut [u8]) {
        out[0..4].copy_from_slice(&self.page_id.as_i32().to_le_bytes());
        out[4..8].copy_from_slice(&self.slot_id.as_u32().to_le_bytes());
    }

    pub fn decode(data: &[u8]) -> Self {
        let page_id = i32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        let slot = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
        Self::new(PageId::new(page_id), SlotId::new(slot))
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RowId({}, {})", self.page_id.0, self.slot_id.0)
    }
}

/// Identifier of an index in the index roots directory
pub type IndexId = u32;

/// A page-sized byte buffer
pub type PageData = [u8; crate::common::PAGE_SIZE];
