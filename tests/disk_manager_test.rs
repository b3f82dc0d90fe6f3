//! Integration tests for the disk manager and scheduler

use std::sync::Arc;
use std::thread;

use minisql::common::{DbError, PageId, INDEX_ROOTS_PAGE_ID, PAGE_SIZE};
use minisql::storage::disk::{DiskManager, DiskScheduler};
use tempfile::NamedTempFile;

#[test]
fn test_disk_manager_create_file() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = DiskManager::new(temp_file.path()).unwrap();

    // A new file holds just the index roots page
    assert_eq!(dm.get_allocated_pages(), 1);
    assert_eq!(dm.get_extent_count(), 1);
    assert!(!dm.is_page_free(INDEX_ROOTS_PAGE_ID).unwrap());
    assert_eq!(dm.get_num_reads(), 0);
}

#[test]
fn test_disk_manager_creates_parent_directories() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("deeper").join("db.minisql");

    let dm = DiskManager::new(&path).unwrap();
    dm.allocate_page().unwrap();
    dm.sync().unwrap();
    assert!(path.exists());
}

#[test]
fn test_disk_manager_allocates_lowest_free_ids() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = DiskManager::new(temp_file.path()).unwrap();

    for i in 1..=10 {
        assert_eq!(dm.allocate_page().unwrap(), PageId::new(i));
    }
    assert_eq!(dm.get_allocated_pages(), 11);

    assert!(dm.deallocate_page(PageId::new(4)).unwrap());
    assert!(dm.is_page_free(PageId::new(4)).unwrap());
    assert_eq!(dm.allocate_page().unwrap(), PageId::new(4));
}

#[test]
fn test_disk_manager_allocation_counts_match_bitmaps() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = DiskManager::with_extent_capacity(temp_file.path(), 8).unwrap();

    let pages: Vec<PageId> = (0..30).map(|_| dm.allocate_page().unwrap()).collect();
    for page_id in pages.iter().step_by(3) {
        assert!(dm.deallocate_page(*page_id).unwrap());
    }

    let extent_total: u32 = (0..dm.get_extent_count())
        .map(|e| dm.get_extent_used_pages(e).unwrap())
        .sum();
    assert_eq!(extent_total, dm.get_allocated_pages());
    assert_eq!(dm.get_allocated_pages(), 21);

    let free = (0..32)
        .filter(|&i| dm.is_page_free(PageId::new(i)).unwrap())
        .count();
    assert_eq!(free, 32 - 21);
}

#[test]
fn test_disk_manager_extent_growth() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = DiskManager::with_extent_capacity(temp_file.path(), 4).unwrap();

    for _ in 0..9 {
        dm.allocate_page().unwrap();
    }
    assert_eq!(dm.get_extent_count(), 3);
    assert_eq!(dm.get_extent_used_pages(0), Some(4));
    assert_eq!(dm.get_extent_used_pages(2), Some(2));
    assert_eq!(dm.get_extent_used_pages(3), None);

    // A hole in the first extent is filled before the last extent
    dm.deallocate_page(PageId::new(1)).unwrap();
    assert_eq!(dm.allocate_page().unwrap(), PageId::new(1));
}

#[test]
fn test_disk_manager_double_free_is_rejected() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = DiskManager::new(temp_file.path()).unwrap();

    let page_id = dm.allocate_page().unwrap();
    assert!(dm.deallocate_page(page_id).unwrap());
    assert!(!dm.deallocate_page(page_id).unwrap());
    assert!(!dm.deallocate_page(PageId::new(12345)).unwrap());
    assert!(!dm.deallocate_page(INDEX_ROOTS_PAGE_ID).unwrap());
    assert_eq!(dm.get_allocated_pages(), 1);
}

#[test]
fn test_disk_manager_read_write_page() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = DiskManager::new(temp_file.path()).unwrap();

    let a = dm.allocate_page().unwrap();
    let b = dm.allocate_page().unwrap();

    let mut data_a = [0u8; PAGE_SIZE];
    let mut data_b = [0u8; PAGE_SIZE];
    for i in 0..PAGE_SIZE {
        data_a[i] = (i % 251) as u8;
        data_b[i] = (i % 13) as u8;
    }
    dm.write_page(a, &data_a).unwrap();
    dm.write_page(b, &data_b).unwrap();

    let mut buf = [0u8; PAGE_SIZE];
    dm.read_page(a, &mut buf).unwrap();
    assert_eq!(buf, data_a);
    dm.read_page(b, &mut buf).unwrap();
    assert_eq!(buf, data_b);
}

#[test]
fn test_disk_manager_rejects_invalid_ids() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = DiskManager::new(temp_file.path()).unwrap();
    let mut buf = [0u8; PAGE_SIZE];

    assert!(matches!(
        dm.read_page(PageId::new(-1), &mut buf),
        Err(DbError::InvalidPageId(_))
    ));
    assert!(!dm.is_page_free(PageId::new(-3)).unwrap());
}

#[test]
fn test_disk_manager_reopen_preserves_allocation() {
    let temp_file = NamedTempFile::new().unwrap();
    let path = temp_file.path().to_path_buf();
    let mut payload = [0u8; PAGE_SIZE];
    payload[..5].copy_from_slice(b"hello");

    {
        let dm = DiskManager::with_extent_capacity(&path, 4).unwrap();
        for _ in 0..6 {
            dm.allocate_page().unwrap();
        }
        dm.deallocate_page(PageId::new(2)).unwrap();
        dm.write_page(PageId::new(5), &payload).unwrap();
        dm.close().unwrap();
    }

    let dm = DiskManager::with_extent_capacity(&path, 4).unwrap();
    assert_eq!(dm.get_allocated_pages(), 6);
    assert_eq!(dm.get_extent_count(), 2);
    assert!(dm.is_page_free(PageId::new(2)).unwrap());
    assert!(!dm.is_page_free(PageId::new(5)).unwrap());

    let mut buf = [0u8; PAGE_SIZE];
    dm.read_page(PageId::new(5), &mut buf).unwrap();
    assert_eq!(&buf[..5], b"hello");

    assert_eq!(dm.allocate_page().unwrap(), PageId::new(2));
}

#[test]
fn test_disk_manager_extent_capacity_is_persisted() {
    let temp_file = NamedTempFile::new().unwrap();
    let path = temp_file.path().to_path_buf();

    {
        let dm = DiskManager::with_extent_capacity(&path, 4).unwrap();
        for _ in 0..5 {
            dm.allocate_page().unwrap();
        }
        dm.close().unwrap();
    }

    assert!(matches!(
        DiskManager::with_extent_capacity(&path, 8),
        Err(DbError::ExtentCapacityMismatch {
            stored: 4,
            requested: 8
        })
    ));

    // Opening without a capacity adopts the stored one
    let dm = DiskManager::new(&path).unwrap();
    assert_eq!(dm.get_extent_capacity(), 4);
    assert_eq!(dm.get_extent_count(), 2);
    assert_eq!(dm.physical_page_id(PageId::new(4)).unwrap(), 7);
}

#[test]
fn test_disk_manager_rejects_invalid_extent_capacity() {
    let temp_file = NamedTempFile::new().unwrap();
    assert!(matches!(
        DiskManager::with_extent_capacity(temp_file.path(), 0),
        Err(DbError::InvalidExtentCapacity(0))
    ));
}

#[test]
fn test_disk_scheduler_round_trip() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
    let scheduler = DiskScheduler::new(Arc::clone(&dm));

    let page_id = dm.allocate_page().unwrap();
    let mut data = [0u8; PAGE_SIZE];
    data[100..104].copy_from_slice(&[1, 2, 3, 4]);
    scheduler.schedule_write_sync(page_id, &data).unwrap();

    let mut buf = [0u8; PAGE_SIZE];
    scheduler.schedule_read_sync(page_id, &mut buf).unwrap();
    assert_eq!(&buf[100..104], &[1, 2, 3, 4]);
}

#[test]
fn test_disk_scheduler_concurrent_requests() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
    let scheduler = Arc::new(DiskScheduler::new(Arc::clone(&dm)));

    let page_ids: Vec<PageId> = (0..8).map(|_| dm.allocate_page().unwrap()).collect();

    let handles: Vec<_> = page_ids
        .iter()
        .map(|&page_id| {
            let scheduler = Arc::clone(&scheduler);
            thread::spawn(move || {
                let data = [page_id.as_i32() as u8; PAGE_SIZE];
                scheduler.schedule_write_sync(page_id, &data).unwrap();

                let mut buf = [0u8; PAGE_SIZE];
                scheduler.schedule_read_sync(page_id, &mut buf).unwrap();
                assert_eq!(buf, data);
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}
