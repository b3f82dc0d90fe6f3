use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::{RawRwLock, RwLock};

use crate::common::{FrameId, PageData, PageId, INVALID_PAGE_ID, PAGE_SIZE};

/// Owned read lock on a frame's bytes.
pub type FrameReadLock = ArcRwLockReadGuard<RawRwLock, Box<PageData>>;
/// Owned write lock on a frame's bytes.
pub type FrameWriteLock = ArcRwLockWriteGuard<RawRwLock, Box<PageData>>;

/// FrameHeader manages a single buffer frame in the buffer pool.
/// It stores metadata about the frame and the actual page data.
///
/// `page_id`, `pin_count` and `is_dirty` only change while the buffer pool
/// lock is held; the atomics let guards and tests read them without it.
pub struct FrameHeader {
    /// The frame ID (index in the buffer pool)
    frame_id: FrameId,
    /// The page ID stored in this frame (INVALID_PAGE_ID if empty)
    page_id: RwLock<PageId>,
    /// Number of outstanding pins
    pin_count: AtomicU32,
    /// Whether the page has been modified since being read from disk
    is_dirty: AtomicBool,
    /// The page bytes. Shared so a page guard can own its lock.
    data: Arc<RwLock<Box<PageData>>>,
}

impl FrameHeader {
    /// Creates a new FrameHeader for the given frame ID.
    pub fn new(frame_id: FrameId) -> Self {
        Self {
            frame_id,
            page_id: RwLock::new(INVALID_PAGE_ID),
            pin_count: AtomicU32::new(0),
            is_dirty: AtomicBool::new(false),
            data: Arc::new(RwLock::new(Box::new([0u8; PAGE_SIZE]))),
        }
    }

    /// Returns the frame ID.
    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    /// Returns the page ID stored in this frame.
    pub fn page_id(&self) -> PageId {
        *self.page_id.read()
    }

    /// Sets the page ID stored in this frame.
    pub fn set_page_id(&self, page_id: PageId) {
        *self.page_id.write() = page_id;
    }

    /// Returns the current pin count.
    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Acquire)
    }

    /// Increments the pin count and returns the new value.
    pub fn pin(&self) -> u32 {
        self.pin_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Decrements the pin count and returns the new value.
    /// Returns None if the pin count was already 0.
    pub fn unpin(&self) -> Option<u32> {
        self.pin_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current.checked_sub(1)
            })
            .ok()
            .map(|previous| previous - 1)
    }

    /// Returns whether the page is dirty.
    pub fn is_dirty(&self) -> bool {
        self.is_dirty.load(Ordering::Acquire)
    }

    /// Sets the dirty flag.
    pub fn set_dirty(&self, dirty: bool) {
        self.is_dirty.store(dirty, Ordering::Release);
    }

    /// Locks the page bytes for reading; the lock owns a handle to the buffer.
    pub(crate) fn read_data_arc(&self) -> FrameReadLock {
        self.data.read_arc()
    }

    /// Locks the page bytes for writing; the lock owns a handle to the buffer.
    pub(crate) fn write_data_arc(&self) -> FrameWriteLock {
        self.data.write_arc()
    }

    /// Copies data from the given slice into the frame.
    pub fn copy_from(&self, data: &[u8]) {
        assert_eq!(data.len(), PAGE_SIZE);
        self.data.write().copy_from_slice(data);
    }

    /// Copies data from the frame into the given slice.
    pub fn copy_to(&self, data: &mut [u8]) {
        assert_eq!(data.len(), PAGE_SIZE);
        data.copy_from_slice(&self.data.read()[..]);
    }

    /// Resets the frame to its initial state.
    pub fn reset(&self) {
        *self.page_id.write() = INVALID_PAGE_ID;
        self.pin_count.store(0, Ordering::Release);
        self.is_dirty.store(false, Ordering::Release);
        self.data.write().fill(0);
    }
}
