use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use log::{debug, error, warn};
use parking_lot::Mutex;

use crate::common::{
    DbError, PageId, Result, BITMAP_SIZE, INDEX_ROOTS_PAGE_ID, MAX_EXTENTS, META_PHYSICAL_PAGE_ID,
    PAGE_SIZE,
};

use super::bitmap_page::BitmapPage;
use super::meta_page::DiskMetaPage;

/// State guarded by the disk lock. Every helper that touches the file or the
/// meta page takes `&mut DiskInner`, so a public call holds the lock exactly once.
struct DiskInner {
    file: File,
    meta: DiskMetaPage,
}

/// DiskManager owns the database file and hands out logical page ids.
///
/// Logical page `INDEX_ROOTS_PAGE_ID` is allocated when the file is created,
/// before any other page.
///
/// The file is a meta page followed by extents, each extent being one bitmap
/// page and `extent_capacity` data pages:
///
/// ```text
/// [meta][bitmap 0][data 0 .. cap-1][bitmap 1][data 0 .. cap-1]...
/// ```
///
/// Logical id `extent * cap + offset` lives at physical page
/// `extent * (cap + 1) + 2 + offset`.
pub struct DiskManager {
    inner: Mutex<DiskInner>,
    /// Path to the database file
    db_path: PathBuf,
    /// Data pages per extent, recorded in the meta page
    extent_capacity: u32,
    /// Number of page reads performed
    num_reads: AtomicU32,
    /// Number of page writes performed
    num_writes: AtomicU32,
}

impl DiskManager {
    /// Opens (or creates) the database file. A new file gets the default
    /// extent capacity; an existing one keeps the capacity it was created with.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        Self::open(db_path.as_ref(), None)
    }

    /// Opens (or creates) the database file with `extent_capacity` data pages
    /// per extent. Small capacities are useful to exercise extent growth.
    ///
    /// Fails with `ExtentCapacityMismatch` if the file already exists with a
    /// different capacity.
    pub fn with_extent_capacity<P: AsRef<Path>>(db_path: P, extent_capacity: u32) -> Result<Self> {
        Self::open(db_path.as_ref(), Some(extent_capacity))
    }

    fn open(db_path: &Path, requested: Option<u32>) -> Result<Self> {
        if let Some(capacity) = requested {
            Self::check_capacity(capacity)?;
        }

        let db_path = db_path.to_path_buf();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&db_path)?;

        let mut inner = DiskInner {
            file,
            meta: DiskMetaPage::new(),
        };

        let mut buf = [0u8; PAGE_SIZE];
        Self::read_physical(&mut inner, META_PHYSICAL_PAGE_ID, &mut buf)?;
        inner.meta = DiskMetaPage::decode(&buf);

        let fresh = !inner.meta.is_initialized();
        let extent_capacity = if fresh {
            requested.unwrap_or(BITMAP_SIZE)
        } else {
            let stored = inner.meta.extent_capacity;
            Self::check_capacity(stored)?;
            match requested {
                Some(requested) if requested != stored => {
                    return Err(DbError::ExtentCapacityMismatch { stored, requested });
                }
                _ => stored,
            }
        };
        inner.meta.extent_capacity = extent_capacity;

        debug!(
            "opened {} with {} extents of {} pages, {} pages allocated",
            db_path.display(),
            inner.meta.num_extents(),
            extent_capacity,
            inner.meta.num_allocated_pages
        );

        let disk_manager = Self {
            inner: Mutex::new(inner),
            db_path,
            extent_capacity,
            num_reads: AtomicU32::new(0),
            num_writes: AtomicU32::new(0),
        };

        if fresh {
            disk_manager.reserve_index_roots_page()?;
        }
        Ok(disk_manager)
    }

    fn check_capacity(extent_capacity: u32) -> Result<()> {
        if extent_capacity == 0 || extent_capacity > BITMAP_SIZE {
            return Err(DbError::InvalidExtentCapacity(extent_capacity));
        }
        Ok(())
    }

    /// Claims `INDEX_ROOTS_PAGE_ID` on a new file so no other page can take it.
    fn reserve_index_roots_page(&self) -> Result<()> {
        let page_id = self.allocate_page()?;
        if page_id != INDEX_ROOTS_PAGE_ID {
            return Err(DbError::IndexCorrupted(format!(
                "new file handed out {} before the index roots page",
                page_id
            )));
        }
        debug!("reserved {} for the index roots", page_id);
        self.sync()
    }

    /// Whether `page_id` is reserved for the lifetime of the file.
    pub fn is_reserved_page(&self, page_id: PageId) -> bool {
        page_id == INDEX_ROOTS_PAGE_ID
    }

    /// Reads a logical page into `data`. Pages never written read back as zeros.
    pub fn read_page(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "Buffer must be PAGE_SIZE bytes");
        let physical = self.physical_page_id(page_id)?;

        let mut inner = self.inner.lock();
        Self::read_physical(&mut inner, physical, data)?;

        self.num_reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Writes `data` to a logical page.
    pub fn write_page(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "Buffer must be PAGE_SIZE bytes");
        let physical = self.physical_page_id(page_id)?;

        let mut inner = self.inner.lock();
        Self::write_physical(&mut inner, physical, data).map_err(|e| {
            error!("write of {} failed: {}", page_id, e);
            e
        })?;

        self.num_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Allocates a free logical page, creating a new extent when every
    /// existing one is full.
    pub fn allocate_page(&self) -> Result<PageId> {
        let mut inner = self.inner.lock();

        let extent = match inner
            .meta
            .extent_used_pages
            .iter()
            .position(|used| *used < self.extent_capacity)
        {
            Some(extent) => extent as u32,
            None => {
                if inner.meta.num_extents() >= MAX_EXTENTS {
                    return Err(DbError::OutOfDiskSpace {
                        max_pages: MAX_EXTENTS * self.extent_capacity,
                    });
                }
                inner.meta.extent_used_pages.push(0);
                let extent = inner.meta.num_extents() - 1;
                debug!("created extent {}", extent);
                extent
            }
        };

        let bitmap_physical = self.bitmap_physical_id(extent);
        let mut buf = [0u8; PAGE_SIZE];
        Self::read_physical(&mut inner, bitmap_physical, &mut buf)?;

        let offset = BitmapPage::new(&mut buf, self.extent_capacity)
            .allocate()
            .ok_or_else(|| {
                DbError::IndexCorrupted(format!(
                    "extent {} bitmap is full but meta page reports free pages",
                    extent
                ))
            })?;
        Self::write_physical(&mut inner, bitmap_physical, &buf)?;

        inner.meta.extent_used_pages[extent as usize] += 1;
        inner.meta.num_allocated_pages += 1;

        let page_id = PageId::new((extent * self.extent_capacity + offset) as i32);
        debug!("allocated {}", page_id);
        Ok(page_id)
    }

    /// Returns a page to its extent. Freeing a page that is already free (or
    /// was never part of any extent) is reported as `Ok(false)`.
    /// The reserved index roots page is never freed.
    pub fn deallocate_page(&self, page_id: PageId) -> Result<bool> {
        if self.is_reserved_page(page_id) {
            warn!("deallocate of reserved {}", page_id);
            return Ok(false);
        }

        let Some((extent, offset)) = self.locate(page_id) else {
            warn!("deallocate of out-of-range {}", page_id);
            return Ok(false);
        };

        let mut inner = self.inner.lock();
        if extent >= inner.meta.num_extents() {
            warn!("deallocate of {} in an extent that does not exist", page_id);
            return Ok(false);
        }

        let bitmap_physical = self.bitmap_physical_id(extent);
        let mut buf = [0u8; PAGE_SIZE];
        Self::read_physical(&mut inner, bitmap_physical, &mut buf)?;

        if !BitmapPage::new(&mut buf, self.extent_capacity).deallocate(offset) {
            warn!("deallocate of {} which is already free", page_id);
            return Ok(false);
        }
        Self::write_physical(&mut inner, bitmap_physical, &buf)?;

        inner.meta.extent_used_pages[extent as usize] -= 1;
        inner.meta.num_allocated_pages -= 1;

        debug!("deallocated {}", page_id);
        Ok(true)
    }

    /// Reads the owning bitmap bit. Ids outside the addressable range are not free.
    pub fn is_page_free(&self, page_id: PageId) -> Result<bool> {
        let Some((extent, offset)) = self.locate(page_id) else {
            return Ok(false);
        };

        let mut inner = self.inner.lock();
        if extent >= inner.meta.num_extents() {
            return Ok(true);
        }

        let mut buf = [0u8; PAGE_SIZE];
        Self::read_physical(&mut inner, self.bitmap_physical_id(extent), &mut buf)?;
        Ok(BitmapPage::new(&mut buf, self.extent_capacity).is_page_free(offset))
    }

    /// Maps a logical page id to its physical page number.
    pub fn physical_page_id(&self, page_id: PageId) -> Result<u32> {
        let (extent, offset) = self
            .locate(page_id)
            .ok_or(DbError::InvalidPageId(page_id))?;
        Ok(self.bitmap_physical_id(extent) + 1 + offset)
    }

    /// Largest logical id this file layout can address.
    pub fn max_page_id(&self) -> PageId {
        PageId::new((MAX_EXTENTS * self.extent_capacity - 1) as i32)
    }

    fn locate(&self, page_id: PageId) -> Option<(u32, u32)> {
        if !page_id.is_valid() || page_id > self.max_page_id() {
            return None;
        }
        let logical = page_id.as_i32() as u32;
        Some((logical / self.extent_capacity, logical % self.extent_capacity))
    }

    fn bitmap_physical_id(&self, extent: u32) -> u32 {
        extent * (self.extent_capacity + 1) + 1
    }

    fn read_physical(inner: &mut DiskInner, physical: u32, data: &mut [u8]) -> Result<()> {
        let offset = physical as u64 * PAGE_SIZE as u64;
        inner.file.seek(SeekFrom::Start(offset))?;

        // Past the end of the file the page reads as zeros.
        let mut filled = 0;
        while filled < data.len() {
            let n = inner.file.read(&mut data[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        data[filled..].fill(0);
        Ok(())
    }

    fn write_physical(inner: &mut DiskInner, physical: u32, data: &[u8]) -> Result<()> {
        let offset = physical as u64 * PAGE_SIZE as u64;
        inner.file.seek(SeekFrom::Start(offset))?;
        inner.file.write_all(data)?;
        Ok(())
    }

    fn persist_meta(inner: &mut DiskInner) -> Result<()> {
        let mut buf = [0u8; PAGE_SIZE];
        inner.meta.encode(&mut buf);
        Self::write_physical(inner, META_PHYSICAL_PAGE_ID, &buf)?;
        inner.file.flush()?;
        inner.file.sync_all()?;
        Ok(())
    }

    /// Returns the number of allocated logical pages.
    pub fn get_allocated_pages(&self) -> u32 {
        self.inner.lock().meta.num_allocated_pages
    }

    /// Returns the number of extents in the file.
    pub fn get_extent_count(&self) -> u32 {
        self.inner.lock().meta.num_extents()
    }

    /// Returns the number of pages allocated inside one extent.
    pub fn get_extent_used_pages(&self, extent: u32) -> Option<u32> {
        self.inner
            .lock()
            .meta
            .extent_used_pages
            .get(extent as usize)
            .copied()
    }

    pub fn get_extent_capacity(&self) -> u32 {
        self.extent_capacity
    }

    /// Returns the number of disk reads performed.
    pub fn get_num_reads(&self) -> u32 {
        self.num_reads.load(Ordering::Relaxed)
    }

    /// Returns the number of disk writes performed.
    pub fn get_num_writes(&self) -> u32 {
        self.num_writes.load(Ordering::Relaxed)
    }

    pub fn get_db_path(&self) -> &Path {
        &self.db_path
    }

    /// Persists the meta page and fsyncs the file.
    pub fn sync(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        Self::persist_meta(&mut inner)
    }

    /// Persists everything and closes the file, reporting any I/O failure
    /// that `Drop` would only be able to log.
    pub fn close(self) -> Result<()> {
        self.sync()
    }
}

impl Drop for DiskManager {
    fn drop(&mut self) {
        if let Err(e) = Self::persist_meta(self.inner.get_mut()) {
            error!("failed to persist disk meta page: {}", e);
        }
    }
}
