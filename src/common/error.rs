use thiserror::Error;

use super::types::{FrameId, PageId, SlotId};

/// Database error types
#[derive(Error, Debug)]
pub enum DbError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Page {0} not found")]
    PageNotFound(PageId),

    #[error("Frame {0} not found")]
    FrameNotFound(FrameId),

    #[error("Buffer pool is full, no evictable frames available")]
    BufferPoolFull,

    #[error("Invalid page ID: {0}")]
    InvalidPageId(PageId),

    #[error("Page {0} is still pinned")]
    PageStillPinned(PageId),

    #[error("Page {0} is not pinned")]
    PageNotPinned(PageId),

    #[error("Disk is full: cannot allocate beyond {max_pages} pages")]
    OutOfDiskSpace { max_pages: u32 },

    #[error("Extent capacity {0} is out of range")]
    InvalidExtentCapacity(u32),

    #[error("File was created with {stored} pages per extent, opened with {requested}")]
    ExtentCapacityMismatch { stored: u32, requested: u32 },

    #[error("Disk scheduler error: {0}")]
    DiskScheduler(String),

    #[error("Page overflow: tuple size {tuple_size} exceeds available space {available}")]
    PageOverflow { tuple_size: usize, available: usize },

    #[error("Tuple of {0} bytes can never fit in a page")]
    TupleTooLarge(usize),

    #[error("Invalid slot ID: {0:?}")]
    InvalidSlotId(SlotId),

    #[error("Slot {0:?} is empty")]
    EmptySlot(SlotId),

    #[error("Index corrupted: {0}")]
    IndexCorrupted(String),

    #[error("Invalid index configuration: {0}")]
    InvalidIndexConfig(String),

    #[error("Key size mismatch: expected {expected} bytes, got {actual}")]
    KeySizeMismatch { expected: usize, actual: usize },

    #[error("Index roots page is full")]
    IndexRootsFull,
}

pub type Result<T> = std::result::Result<T, DbError>;
