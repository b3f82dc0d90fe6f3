use std::sync::Arc;

use log::debug;

use crate::buffer::BufferPoolManager;
use crate::common::{DbError, PageId, Result, RowId, INVALID_PAGE_ID};

use super::page::{TablePage, MAX_TUPLE_SIZE};
use super::TableIterator;

/// Unordered collection of opaque rows stored in a chain of table pages.
///
/// Deletion is two-phase: `mark_delete` hides a row, then `apply_delete`
/// removes it or `rollback_delete` restores it.
pub struct TableHeap {
    bpm: Arc<BufferPoolManager>,
    first_page_id: PageId,
}

impl TableHeap {
    /// Allocates the first page of a new, empty heap.
    pub fn create(bpm: Arc<BufferPoolManager>) -> Result<Self> {
        let first_page_id = {
            let mut guard = bpm.new_page()?;
            let page_id = guard.page_id();
            TablePage::new(guard.data_mut()).init(page_id, INVALID_PAGE_ID);
            page_id
        };

        debug!("created table heap at {}", first_page_id);
        Ok(Self { bpm, first_page_id })
    }

    /// Reattaches to a heap whose first page already exists.
    pub fn open(bpm: Arc<BufferPoolManager>, first_page_id: PageId) -> Self {
        Self { bpm, first_page_id }
    }

    pub fn first_page_id(&self) -> PageId {
        self.first_page_id
    }

    /// Stores a row in the first page with room, growing the chain if none has.
    pub fn insert_tuple(&self, tuple: &[u8]) -> Result<RowId> {
        if tuple.len() > MAX_TUPLE_SIZE {
            return Err(DbError::TupleTooLarge(tuple.len()));
        }

        let mut page_id = self.first_page_id;
        loop {
            let mut guard = self.bpm.fetch_page_write(page_id)?;

            let (fits, next_page_id) = {
                let page = TablePage::new(guard.data());
                (page.can_insert(tuple.len()), page.next_page_id())
            };

            if fits {
                return TablePage::new(guard.data_mut()).insert_tuple(tuple);
            }

            if next_page_id.is_valid() {
                page_id = next_page_id;
                continue;
            }

            // Last page is full: link a fresh one behind it
            let mut new_guard = self.bpm.new_page()?;
            let new_page_id = new_guard.page_id();
            let mut new_page = TablePage::new(new_guard.data_mut());
            new_page.init(new_page_id, page_id);
            TablePage::new(guard.data_mut()).set_next_page_id(new_page_id);

            debug!("table heap {} grew page {}", self.first_page_id, new_page_id);
            return new_page.insert_tuple(tuple);
        }
    }

    /// Reads a live row. Rows flagged for deletion read as absent.
    pub fn get_tuple(&self, rid: RowId) -> Result<Option<Vec<u8>>> {
        let guard = self.bpm.fetch_page_read(rid.page_id)?;
        let page = TablePage::new(guard.data());
        Ok(page.get_tuple(rid.slot_id).map(<[u8]>::to_vec))
    }

    /// Replaces a row in place. Returns false when the row is not live or the
    /// new bytes do not fit in its page; the caller then deletes and reinserts.
    pub fn update_tuple(&self, rid: RowId, tuple: &[u8]) -> Result<bool> {
        if tuple.len() > MAX_TUPLE_SIZE {
            return Ok(false);
        }

        let mut guard = self.bpm.fetch_page_write(rid.page_id)?;
        if TablePage::new(guard.data()).get_tuple(rid.slot_id).is_none() {
            return Ok(false);
        }
        TablePage::new(guard.data_mut()).update_tuple(rid.slot_id, tuple)
    }

    pub fn mark_delete(&self, rid: RowId) -> Result<bool> {
        let mut guard = self.bpm.fetch_page_write(rid.page_id)?;
        Ok(TablePage::new(guard.data_mut()).mark_delete(rid.slot_id))
    }

    pub fn rollback_delete(&self, rid: RowId) -> Result<bool> {
        let mut guard = self.bpm.fetch_page_write(rid.page_id)?;
        Ok(TablePage::new(guard.data_mut()).rollback_delete(rid.slot_id))
    }

    pub fn apply_delete(&self, rid: RowId) -> Result<bool> {
        let mut guard = self.bpm.fetch_page_write(rid.page_id)?;
        Ok(TablePage::new(guard.data_mut()).apply_delete(rid.slot_id))
    }

    /// Deletes every page of the heap.
    pub fn free_heap(self) -> Result<()> {
        let mut page_id = self.first_page_id;
        let mut freed = 0;

        while page_id.is_valid() {
            let next_page_id = {
                let guard = self.bpm.fetch_page_read(page_id)?;
                TablePage::new(guard.data()).next_page_id()
            };
            self.bpm.delete_page(page_id)?;
            freed += 1;
            page_id = next_page_id;
        }

        debug!("freed table heap {} ({} pages)", self.first_page_id, freed);
        Ok(())
    }

    /// Iterates live rows in page-chain order, pinning one page at a time.
    pub fn iter(&self) -> Result<TableIterator> {
        TableIterator::new(Arc::clone(&self.bpm), self.first_page_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::SlotId;
    use crate::storage::disk::DiskManager;
    use tempfile::NamedTempFile;

    fn create_heap(pool_size: usize) -> (TableHeap, NamedTempFile) {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
        let bpm = Arc::new(BufferPoolManager::new(pool_size, dm));
        (TableHeap::create(bpm).unwrap(), temp_file)
    }

    #[test]
    fn test_insert_and_get() {
        let (heap, _temp) = create_heap(4);
        let rid = heap.insert_tuple(b"first row").unwrap();

        assert_eq!(rid.page_id, heap.first_page_id());
        assert_eq!(heap.get_tuple(rid).unwrap(), Some(b"first row".to_vec()));

        let missing = RowId::new(rid.page_id, SlotId::new(42));
        assert_eq!(heap.get_tuple(missing).unwrap(), None);
    }

    #[test]
    fn test_tuple_too_large() {
        let (heap, _temp) = create_heap(4);
        let tuple = vec![0u8; MAX_TUPLE_SIZE + 1];
        assert!(matches!(
            heap.insert_tuple(&tuple),
            Err(DbError::TupleTooLarge(_))
        ));
    }

    #[test]
    fn test_heap_grows_across_pages() {
        let (heap, _temp) = create_heap(4);
        let tuple = vec![1u8; 1000];

        let rids: Vec<RowId> = (0..10).map(|_| heap.insert_tuple(&tuple).unwrap()).collect();
        assert!(rids.iter().any(|rid| rid.page_id != heap.first_page_id()));
        for rid in &rids {
            assert_eq!(heap.get_tuple(*rid).unwrap().unwrap().len(), 1000);
        }
    }

    #[test]
    fn test_two_phase_delete() {
        let (heap, _temp) = create_heap(4);
        let rid = heap.insert_tuple(b"doomed").unwrap();

        assert!(heap.mark_delete(rid).unwrap());
        assert_eq!(heap.get_tuple(rid).unwrap(), None);
        assert!(heap.rollback_delete(rid).unwrap());
        assert_eq!(heap.get_tuple(rid).unwrap(), Some(b"doomed".to_vec()));

        assert!(heap.mark_delete(rid).unwrap());
        assert!(heap.apply_delete(rid).unwrap());
        assert!(!heap.rollback_delete(rid).unwrap());
        assert_eq!(heap.get_tuple(rid).unwrap(), None);
    }

    #[test]
    fn test_update_tuple() {
        let (heap, _temp) = create_heap(4);
        let rid = heap.insert_tuple(b"v1").unwrap();

        assert!(heap.update_tuple(rid, b"version two").unwrap());
        assert_eq!(heap.get_tuple(rid).unwrap(), Some(b"version two".to_vec()));

        // Fill the page so a big update cannot fit
        while heap.insert_tuple(&[0u8; 500]).unwrap().page_id == rid.page_id {}
        assert!(!heap.update_tuple(rid, &[7u8; 2000]).unwrap());
        assert_eq!(heap.get_tuple(rid).unwrap(), Some(b"version two".to_vec()));
    }

    #[test]
    fn test_free_heap() {
        let (heap, _temp) = create_heap(4);
        for _ in 0..12 {
            heap.insert_tuple(&[3u8; 1500]).unwrap();
        }
        let bpm = Arc::clone(&heap.bpm);
        let first = heap.first_page_id();

        heap.free_heap().unwrap();
        assert!(bpm.is_page_free(first).unwrap());
        // Only the reserved index roots page is left
        assert_eq!(bpm.disk_manager().get_allocated_pages(), 1);
    }
}
