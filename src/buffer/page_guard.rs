use std::ops::{Deref, DerefMut};

use crate::common::PageId;

use super::{FrameReadLock, FrameWriteLock};

/// Callback type for releasing a page guard
pub(crate) type ReleaseCallback = Box<dyn FnOnce(PageId, bool) + Send + Sync>;

/// Base page guard that manages the common functionality
struct PageGuardBase {
    /// The page ID being guarded
    page_id: PageId,
    /// Callback to release the guard
    release_callback: Option<ReleaseCallback>,
    /// Whether the page was marked dirty
    is_dirty: bool,
}

impl PageGuardBase {
    fn new(page_id: PageId, release_callback: ReleaseCallback) -> Self {
        Self {
            page_id,
            release_callback: Some(release_callback),
            is_dirty: false,
        }
    }

    fn drop_impl(&mut self) {
        if let Some(callback) = self.release_callback.take() {
            callback(self.page_id, self.is_dirty);
        }
    }
}

/// RAII guard for read-only access to a pinned page.
/// Releases the data lock, then unpins the page when dropped.
pub struct ReadPageGuard {
    base: PageGuardBase,
    data_guard: Option<FrameReadLock>,
}

impl ReadPageGuard {
    pub(crate) fn new(
        page_id: PageId,
        data_guard: FrameReadLock,
        release_callback: ReleaseCallback,
    ) -> Self {
        Self {
            base: PageGuardBase::new(page_id, release_callback),
            data_guard: Some(data_guard),
        }
    }

    /// Returns the page ID.
    pub fn page_id(&self) -> PageId {
        self.base.page_id
    }

    /// Returns a reference to the page data.
    pub fn data(&self) -> &[u8] {
        match &self.data_guard {
            Some(guard) => &guard[..],
            None => &[],
        }
    }

    /// Drops this guard, releasing the page.
    pub fn drop_guard(self) {
        drop(self);
    }
}

impl Deref for ReadPageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl Drop for ReadPageGuard {
    fn drop(&mut self) {
        self.data_guard.take();
        self.base.drop_impl();
    }
}

/// RAII guard for read-write access to a pinned page.
/// The page is reported dirty on release iff [`WritePageGuard::data_mut`] was called.
pub struct WritePageGuard {
    base: PageGuardBase,
    data_guard: Option<FrameWriteLock>,
}

impl WritePageGuard {
    pub(crate) fn new(
        page_id: PageId,
        data_guard: FrameWriteLock,
        release_callback: ReleaseCallback,
    ) -> Self {
        Self {
            base: PageGuardBase::new(page_id, release_callback),
            data_guard: Some(data_guard),
        }
    }

    /// Returns the page ID.
    pub fn page_id(&self) -> PageId {
        self.base.page_id
    }

    /// Returns a reference to the page data.
    pub fn data(&self) -> &[u8] {
        match &self.data_guard {
            Some(guard) => &guard[..],
            None => &[],
        }
    }

    /// Returns a mutable reference to the page data and marks the page dirty.
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.base.is_dirty = true;
        match &mut self.data_guard {
            Some(guard) => &mut guard[..],
            None => &mut [],
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.base.is_dirty
    }

    /// Drops this guard, releasing the page.
    pub fn drop_guard(self) {
        drop(self);
    }
}

impl Deref for WritePageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl DerefMut for WritePageGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.data_mut()
    }
}

impl Drop for WritePageGuard {
    fn drop(&mut self) {
        // Drop the data guard first to release the lock
        self.data_guard.take();
        // Then call the release callback
        self.base.drop_impl();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::FrameHeader;
    use crate::common::{FrameId, PAGE_SIZE};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_read_page_guard() {
        let frame = FrameHeader::new(FrameId::new(0));
        frame.set_page_id(PageId::new(1));

        let mut data = [0u8; PAGE_SIZE];
        data[0] = 42;
        frame.copy_from(&data);

        let released = Arc::new(AtomicBool::new(false));
        let released_clone = released.clone();

        let guard = ReadPageGuard::new(
            PageId::new(1),
            frame.read_data_arc(),
            Box::new(move |_, _| {
                released_clone.store(true, Ordering::SeqCst);
            }),
        );

        assert_eq!(guard.page_id(), PageId::new(1));
        assert_eq!(guard.data()[0], 42);
        assert!(!released.load(Ordering::SeqCst));

        drop(guard);
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn test_write_page_guard() {
        let frame = FrameHeader::new(FrameId::new(0));
        frame.set_page_id(PageId::new(1));

        let released = Arc::new(AtomicBool::new(false));
        let dirty = Arc::new(AtomicBool::new(false));
        let released_clone = released.clone();
        let dirty_clone = dirty.clone();

        let mut guard = WritePageGuard::new(
            PageId::new(1),
            frame.write_data_arc(),
            Box::new(move |_, is_dirty| {
                released_clone.store(true, Ordering::SeqCst);
                dirty_clone.store(is_dirty, Ordering::SeqCst);
            }),
        );

        assert_eq!(guard.page_id(), PageId::new(1));
        assert!(!guard.is_dirty());

        guard.data_mut()[0] = 42;
        assert!(guard.is_dirty());
        assert!(!released.load(Ordering::SeqCst));

        drop(guard);
        assert!(released.load(Ordering::SeqCst));
        assert!(dirty.load(Ordering::SeqCst));

        // The data lock is gone, so this does not block
        let mut read_data = [0u8; PAGE_SIZE];
        frame.copy_to(&mut read_data);
        assert_eq!(read_data[0], 42);
    }

    #[test]
    fn test_write_page_guard_read_only_is_clean() {
        let frame = FrameHeader::new(FrameId::new(0));
        let dirty = Arc::new(AtomicBool::new(true));
        let dirty_clone = dirty.clone();

        let guard = WritePageGuard::new(
            PageId::new(3),
            frame.write_data_arc(),
            Box::new(move |_, is_dirty| dirty_clone.store(is_dirty, Ordering::SeqCst)),
        );
        assert_eq!(guard.data()[0], 0);
        drop(guard);

        assert!(!dirty.load(Ordering::SeqCst));
    }
}
