use std::collections::{HashMap, LinkedList};
use std::sync::Arc;

use log::{debug, error, warn};
use parking_lot::Mutex;

use crate::common::{DbError, FrameId, PageId, Result, PAGE_SIZE};
use crate::storage::disk::{DiskManager, DiskScheduler};

use super::{FrameHeader, LruReplacer, ReadPageGuard, Replacer, WritePageGuard};

/// Bookkeeping protected by the pool lock
struct PoolState {
    /// Page table: maps page IDs to frame IDs
    page_table: HashMap<PageId, FrameId>,
    /// Free list: frames that hold no page
    free_list: LinkedList<FrameId>,
    /// Eviction policy over unpinned frames
    replacer: Box<dyn Replacer>,
}

/// Shared between the pool and the release callbacks of its page guards
struct BufferPoolInner {
    frames: Vec<Arc<FrameHeader>>,
    state: Mutex<PoolState>,
    disk_scheduler: DiskScheduler,
}

/// BufferPoolManager caches disk pages in a fixed set of frames.
///
/// Pages are handed out as [`ReadPageGuard`]/[`WritePageGuard`]s; dropping a
/// guard unpins the page. A page is only eligible for eviction once its pin
/// count reaches zero.
pub struct BufferPoolManager {
    /// Number of frames in the buffer pool
    pool_size: usize,
    inner: Arc<BufferPoolInner>,
}

impl BufferPoolManager {
    /// Creates a pool of `pool_size` frames using LRU eviction.
    pub fn new(pool_size: usize, disk_manager: Arc<DiskManager>) -> Self {
        Self::with_replacer(pool_size, disk_manager, Box::new(LruReplacer::new()))
    }

    /// Creates a pool with a custom eviction policy.
    pub fn with_replacer(
        pool_size: usize,
        disk_manager: Arc<DiskManager>,
        replacer: Box<dyn Replacer>,
    ) -> Self {
        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = LinkedList::new();

        for i in 0..pool_size {
            let frame_id = FrameId::new(i as u32);
            frames.push(Arc::new(FrameHeader::new(frame_id)));
            free_list.push_back(frame_id);
        }

        let inner = Arc::new(BufferPoolInner {
            frames,
            state: Mutex::new(PoolState {
                page_table: HashMap::new(),
                free_list,
                replacer,
            }),
            disk_scheduler: DiskScheduler::new(disk_manager),
        });

        Self { pool_size, inner }
    }

    /// Allocates a fresh zeroed page on disk and returns it pinned for writing.
    pub fn new_page(&self) -> Result<WritePageGuard> {
        let frame = {
            let mut state = self.inner.state.lock();
            let frame_id = self.inner.get_free_frame(&mut state)?;

            let page_id = match self.disk_manager().allocate_page() {
                Ok(page_id) => page_id,
                Err(e) => {
                    state.free_list.push_back(frame_id);
                    return Err(e);
                }
            };

            let frame = Arc::clone(&self.inner.frames[frame_id.as_usize()]);
            frame.reset();
            frame.set_page_id(page_id);
            frame.pin();
            // The disk copy may hold bytes of a previously freed page.
            frame.set_dirty(true);
            state.page_table.insert(page_id, frame_id);

            debug!("new {} in {}", page_id, frame_id);
            frame
        };

        Ok(WritePageGuard::new(
            frame.page_id(),
            frame.write_data_arc(),
            self.release_callback(),
        ))
    }

    /// Pins a page for shared access, reading it from disk if needed.
    pub fn fetch_page_read(&self, page_id: PageId) -> Result<ReadPageGuard> {
        let frame = self.fetch_page(page_id)?;
        Ok(ReadPageGuard::new(
            page_id,
            frame.read_data_arc(),
            self.release_callback(),
        ))
    }

    /// Pins a page for exclusive access, reading it from disk if needed.
    pub fn fetch_page_write(&self, page_id: PageId) -> Result<WritePageGuard> {
        let frame = self.fetch_page(page_id)?;
        Ok(WritePageGuard::new(
            page_id,
            frame.write_data_arc(),
            self.release_callback(),
        ))
    }

    /// Drops one pin on a resident page. Page guards call this on drop; it is
    /// public for callers that track pins themselves.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<()> {
        self.inner.unpin_page(page_id, is_dirty)
    }

    /// Removes a page from the pool and frees it on disk.
    ///
    /// A page that is not resident is not a no-op: it is still freed on disk,
    /// so evicted pages can be deleted without fetching them first. Returns
    /// `Ok(false)` for the reserved index roots page, leaving it untouched.
    /// Fails with [`DbError::PageStillPinned`] while anyone holds a pin.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        if self.disk_manager().is_reserved_page(page_id) {
            warn!("refusing to delete reserved {}", page_id);
            return Ok(false);
        }

        {
            let mut state = self.inner.state.lock();

            if let Some(&frame_id) = state.page_table.get(&page_id) {
                let frame = &self.inner.frames[frame_id.as_usize()];

                // Cannot delete a pinned page
                if frame.pin_count() > 0 {
                    return Err(DbError::PageStillPinned(page_id));
                }

                state.page_table.remove(&page_id);
                state.replacer.pin(frame_id);
                frame.reset();
                state.free_list.push_back(frame_id);
            }

            // Deallocate under the pool lock so no one can fetch the page in between.
            self.disk_manager().deallocate_page(page_id)?;
        }

        debug!("deleted {}", page_id);
        Ok(true)
    }

    /// Writes a resident page to disk and clears its dirty flag.
    /// Returns false if the page is not resident.
    ///
    /// The caller must not hold a write guard on the same page.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        if !page_id.is_valid() {
            return Err(DbError::InvalidPageId(page_id));
        }

        // Pin so the frame cannot be evicted while its bytes are copied.
        let frame = {
            let mut state = self.inner.state.lock();
            let Some(&frame_id) = state.page_table.get(&page_id) else {
                return Ok(false);
            };
            let frame = Arc::clone(&self.inner.frames[frame_id.as_usize()]);
            frame.pin();
            state.replacer.pin(frame_id);
            frame
        };

        let mut data = [0u8; PAGE_SIZE];
        {
            let lock = frame.read_data_arc();
            data.copy_from_slice(&lock[..]);
            // Cleared while writers are excluded; a later write marks it again.
            frame.set_dirty(false);
        }

        let result = self.inner.disk_scheduler.schedule_write_sync(page_id, &data);
        if result.is_err() {
            frame.set_dirty(true);
        }
        self.inner.unpin_page(page_id, false)?;
        result.map(|_| true)
    }

    /// Flushes every resident page.
    pub fn flush_all_pages(&self) -> Result<()> {
        let page_ids: Vec<PageId> = self.inner.state.lock().page_table.keys().copied().collect();

        for page_id in page_ids {
            self.flush_page(page_id)?;
        }

        Ok(())
    }

    /// Whether the disk manager considers `page_id` unallocated.
    pub fn is_page_free(&self, page_id: PageId) -> Result<bool> {
        self.disk_manager().is_page_free(page_id)
    }

    /// Returns the pin count for a page.
    pub fn get_pin_count(&self, page_id: PageId) -> Option<u32> {
        let state = self.inner.state.lock();

        state
            .page_table
            .get(&page_id)
            .map(|&frame_id| self.inner.frames[frame_id.as_usize()].pin_count())
    }

    /// Whether a page currently occupies a frame.
    pub fn is_resident(&self, page_id: PageId) -> bool {
        self.inner.state.lock().page_table.contains_key(&page_id)
    }

    /// Returns the pool size.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Returns the number of free frames.
    pub fn free_frame_count(&self) -> usize {
        self.inner.state.lock().free_list.len()
    }

    /// Returns the number of frames the replacer may evict.
    pub fn evictable_frame_count(&self) -> usize {
        self.inner.state.lock().replacer.size()
    }

    /// Debug check that no page is still pinned. Logs every leaked pin.
    pub fn check_all_unpinned(&self) -> bool {
        let state = self.inner.state.lock();
        let mut ok = true;

        for (&page_id, &frame_id) in state.page_table.iter() {
            let pin_count = self.inner.frames[frame_id.as_usize()].pin_count();
            if pin_count != 0 {
                error!("{} is still pinned ({} pins)", page_id, pin_count);
                ok = false;
            }
        }

        ok
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        self.inner.disk_scheduler.disk_manager()
    }

    fn fetch_page(&self, page_id: PageId) -> Result<Arc<FrameHeader>> {
        if !page_id.is_valid() || page_id > self.disk_manager().max_page_id() {
            return Err(DbError::InvalidPageId(page_id));
        }

        let mut state = self.inner.state.lock();

        if let Some(&frame_id) = state.page_table.get(&page_id) {
            let frame = Arc::clone(&self.inner.frames[frame_id.as_usize()]);
            frame.pin();
            state.replacer.pin(frame_id);
            return Ok(frame);
        }

        let frame_id = self.inner.get_free_frame(&mut state)?;
        let frame = Arc::clone(&self.inner.frames[frame_id.as_usize()]);

        let mut data = [0u8; PAGE_SIZE];
        if let Err(e) = self.inner.disk_scheduler.schedule_read_sync(page_id, &mut data) {
            state.free_list.push_back(frame_id);
            return Err(e);
        }

        frame.copy_from(&data);
        frame.set_page_id(page_id);
        frame.set_dirty(false);
        frame.pin();
        state.page_table.insert(page_id, frame_id);

        Ok(frame)
    }

    fn release_callback(&self) -> Box<dyn FnOnce(PageId, bool) + Send + Sync> {
        let inner = Arc::clone(&self.inner);
        Box::new(move |page_id, is_dirty| {
            if let Err(e) = inner.unpin_page(page_id, is_dirty) {
                warn!("releasing guard on {}: {}", page_id, e);
            }
        })
    }
}

impl BufferPoolInner {
    fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<()> {
        let mut state = self.state.lock();

        let frame_id = *state
            .page_table
            .get(&page_id)
            .ok_or(DbError::PageNotFound(page_id))?;
        let frame = &self.frames[frame_id.as_usize()];

        if is_dirty {
            frame.set_dirty(true);
        }

        match frame.unpin() {
            None => Err(DbError::PageNotPinned(page_id)),
            Some(0) => {
                state.replacer.unpin(frame_id);
                Ok(())
            }
            Some(_) => Ok(()),
        }
    }

    /// Takes a frame from the free list, or evicts the replacer's victim,
    /// writing it back first if dirty.
    fn get_free_frame(&self, state: &mut PoolState) -> Result<FrameId> {
        if let Some(frame_id) = state.free_list.pop_front() {
            return Ok(frame_id);
        }

        let frame_id = state.replacer.victim().ok_or(DbError::BufferPoolFull)?;
        let frame = &self.frames[frame_id.as_usize()];
        let old_page_id = frame.page_id();

        if frame.is_dirty() {
            let mut data = [0u8; PAGE_SIZE];
            frame.copy_to(&mut data);
            if let Err(e) = self.disk_scheduler.schedule_write_sync(old_page_id, &data) {
                error!("failed to write back {}: {}", old_page_id, e);
                state.replacer.unpin(frame_id);
                return Err(e);
            }
        }

        debug!("evicted {} from {}", old_page_id, frame_id);
        state.page_table.remove(&old_page_id);
        frame.reset();

        Ok(frame_id)
    }
}

impl Drop for BufferPoolManager {
    fn drop(&mut self) {
        if let Err(e) = self.flush_all_pages() {
            error!("failed to flush buffer pool: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::INDEX_ROOTS_PAGE_ID;
    use tempfile::NamedTempFile;

    fn create_bpm(pool_size: usize) -> (BufferPoolManager, NamedTempFile) {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
        let bpm = BufferPoolManager::new(pool_size, dm);
        (bpm, temp_file)
    }

    #[test]
    fn test_buffer_pool_manager_new() {
        let (bpm, _temp) = create_bpm(10);
        assert_eq!(bpm.pool_size(), 10);
        assert_eq!(bpm.free_frame_count(), 10);
        assert_eq!(bpm.evictable_frame_count(), 0);
    }

    #[test]
    fn test_buffer_pool_manager_new_page() {
        let (bpm, _temp) = create_bpm(10);

        let guard = bpm.new_page().unwrap();
        let page_id = guard.page_id();
        // Page 0 is the reserved index roots page
        assert_eq!(page_id, PageId::new(1));
        assert_eq!(bpm.get_pin_count(page_id), Some(1));
        assert_eq!(bpm.free_frame_count(), 9);
        assert!(guard.data().iter().all(|b| *b == 0));

        drop(guard);
        assert_eq!(bpm.get_pin_count(page_id), Some(0));
        assert_eq!(bpm.evictable_frame_count(), 1);
    }

    #[test]
    fn test_buffer_pool_manager_read_write() {
        let (bpm, _temp) = create_bpm(10);

        let page_id = bpm.new_page().unwrap().page_id();

        {
            let mut guard = bpm.fetch_page_write(page_id).unwrap();
            guard.data_mut()[0] = 42;
            guard.data_mut()[100] = 255;
        }

        assert_eq!(bpm.get_pin_count(page_id), Some(0));

        {
            let guard = bpm.fetch_page_read(page_id).unwrap();
            assert_eq!(guard.data()[0], 42);
            assert_eq!(guard.data()[100], 255);
        }
    }

    #[test]
    fn test_buffer_pool_manager_multiple_readers() {
        let (bpm, _temp) = create_bpm(4);
        let page_id = bpm.new_page().unwrap().page_id();

        let g1 = bpm.fetch_page_read(page_id).unwrap();
        let g2 = bpm.fetch_page_read(page_id).unwrap();
        assert_eq!(bpm.get_pin_count(page_id), Some(2));
        assert_eq!(bpm.evictable_frame_count(), 0);

        drop(g1);
        assert_eq!(bpm.evictable_frame_count(), 0);
        drop(g2);
        assert_eq!(bpm.evictable_frame_count(), 1);
    }

    #[test]
    fn test_buffer_pool_manager_unpin_errors() {
        let (bpm, _temp) = create_bpm(4);
        let page_id = bpm.new_page().unwrap().page_id();

        assert!(matches!(
            bpm.unpin_page(page_id, false),
            Err(DbError::PageNotPinned(_))
        ));
        assert!(matches!(
            bpm.unpin_page(PageId::new(77), false),
            Err(DbError::PageNotFound(_))
        ));
    }

    #[test]
    fn test_buffer_pool_manager_flush() {
        let (bpm, temp) = create_bpm(10);

        let page_id = {
            let mut guard = bpm.new_page().unwrap();
            guard.data_mut()[0] = 42;
            guard.page_id()
        };

        assert!(bpm.flush_page(page_id).unwrap());
        assert!(!bpm.flush_page(PageId::new(9)).unwrap());
        assert_eq!(bpm.get_pin_count(page_id), Some(0));

        drop(bpm);

        let dm = Arc::new(DiskManager::new(temp.path()).unwrap());
        let bpm2 = BufferPoolManager::new(10, dm);

        let guard = bpm2.fetch_page_read(page_id).unwrap();
        assert_eq!(guard.data()[0], 42);
    }

    #[test]
    fn test_buffer_pool_manager_eviction_writes_back() {
        let (bpm, _temp) = create_bpm(3);

        let page_ids: Vec<_> = (0..3)
            .map(|i| {
                let mut guard = bpm.new_page().unwrap();
                guard.data_mut()[0] = i as u8 + 1;
                guard.page_id()
            })
            .collect();

        assert_eq!(bpm.free_frame_count(), 0);
        assert_eq!(bpm.evictable_frame_count(), 3);

        // Evicts the least recently unpinned page (the first one)
        let new_page_id = bpm.new_page().unwrap().page_id();
        assert_eq!(new_page_id, PageId::new(4));
        assert!(!bpm.is_resident(page_ids[0]));

        let guard = bpm.fetch_page_read(page_ids[0]).unwrap();
        assert_eq!(guard.data()[0], 1);
    }

    #[test]
    fn test_buffer_pool_manager_delete_page() {
        let (bpm, _temp) = create_bpm(10);

        let page_id = bpm.new_page().unwrap().page_id();

        {
            let _guard = bpm.fetch_page_read(page_id).unwrap();
            assert!(matches!(
                bpm.delete_page(page_id),
                Err(DbError::PageStillPinned(_))
            ));
        }

        assert!(bpm.delete_page(page_id).unwrap());
        assert_eq!(bpm.get_pin_count(page_id), None);
        assert!(bpm.is_page_free(page_id).unwrap());
        assert_eq!(bpm.free_frame_count(), 10);
    }

    #[test]
    fn test_delete_page_not_resident_frees_on_disk() {
        let (bpm, _temp) = create_bpm(1);

        let first = bpm.new_page().unwrap().page_id();
        // Evicts the first page
        let second = bpm.new_page().unwrap().page_id();
        assert!(!bpm.is_resident(first));

        assert!(bpm.delete_page(first).unwrap());
        assert!(bpm.is_page_free(first).unwrap());
        assert!(bpm.is_resident(second));
        assert_eq!(bpm.disk_manager().get_allocated_pages(), 2);

        // Deleting it again finds nothing to free but still succeeds
        assert!(bpm.delete_page(first).unwrap());
        assert_eq!(bpm.disk_manager().get_allocated_pages(), 2);
    }

    #[test]
    fn test_delete_reserved_page_is_refused() {
        let (bpm, _temp) = create_bpm(2);

        assert!(!bpm.delete_page(INDEX_ROOTS_PAGE_ID).unwrap());
        assert!(!bpm.is_page_free(INDEX_ROOTS_PAGE_ID).unwrap());
    }

    #[test]
    fn test_buffer_pool_manager_buffer_pool_full() {
        let (bpm, _temp) = create_bpm(2);

        let _guard1 = bpm.new_page().unwrap();
        let _guard2 = bpm.new_page().unwrap();

        assert!(matches!(bpm.new_page(), Err(DbError::BufferPoolFull)));
        // The failed call must not leak an allocated page
        assert_eq!(bpm.disk_manager().get_allocated_pages(), 3);
    }

    #[test]
    fn test_fetch_invalid_page_id() {
        let (bpm, _temp) = create_bpm(2);
        assert!(matches!(
            bpm.fetch_page_read(PageId::new(-1)),
            Err(DbError::InvalidPageId(_))
        ));
    }

    #[test]
    fn test_check_all_unpinned() {
        let (bpm, _temp) = create_bpm(2);
        let guard = bpm.new_page().unwrap();
        assert!(!bpm.check_all_unpinned());
        drop(guard);
        assert!(bpm.check_all_unpinned());
    }
}
