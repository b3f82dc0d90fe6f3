use bytes::{Buf, BufMut};
use log::debug;

use crate::buffer::BufferPoolManager;
use crate::common::{DbError, IndexId, PageId, Result, INDEX_ROOTS_PAGE_ID, PAGE_SIZE};

const RECORD_SIZE: usize = 8;
const HEADER_SIZE: usize = 8;

/// Tags a page as the index roots directory ("IDXR")
pub const INDEX_ROOTS_MAGIC: u32 = 0x5258_4449;

/// Most index roots one page can record
pub const MAX_INDEX_ROOTS: usize = (PAGE_SIZE - HEADER_SIZE) / RECORD_SIZE;

/// Directory of B+Tree root pages, stored at [`INDEX_ROOTS_PAGE_ID`].
///
/// On disk: `magic u32`, `count u32`, then `count` records of
/// `(index_id u32, root_page_id i32)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexRootsPage {
    roots: Vec<(IndexId, PageId)>,
}

impl IndexRootsPage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(mut data: &[u8]) -> Result<Self> {
        let magic = data.get_u32_le();
        if magic != INDEX_ROOTS_MAGIC {
            return Err(DbError::IndexCorrupted(format!(
                "page {} is not an index roots page (magic {:#010x})",
                INDEX_ROOTS_PAGE_ID, magic
            )));
        }

        let count = data.get_u32_le() as usize;
        if count > MAX_INDEX_ROOTS {
            return Err(DbError::IndexCorrupted(format!(
                "index roots page claims {} records",
                count
            )));
        }

        let roots = (0..count)
            .map(|_| {
                let index_id = data.get_u32_le();
                let root = PageId::new(data.get_i32_le());
                (index_id, root)
            })
            .collect();

        Ok(Self { roots })
    }

    pub fn encode(&self, out: &mut [u8]) {
        out.fill(0);
        let mut buf = out;
        buf.put_u32_le(INDEX_ROOTS_MAGIC);
        buf.put_u32_le(self.roots.len() as u32);
        for (index_id, root) in &self.roots {
            buf.put_u32_le(*index_id);
            buf.put_i32_le(root.as_i32());
        }
    }

    /// Adds a record. Returns false if `index_id` already has one.
    pub fn insert(&mut self, index_id: IndexId, root_page_id: PageId) -> Result<bool> {
        if self.get_root_id(index_id).is_some() {
            return Ok(false);
        }
        if self.roots.len() >= MAX_INDEX_ROOTS {
            return Err(DbError::IndexRootsFull);
        }
        self.roots.push((index_id, root_page_id));
        Ok(true)
    }

    /// Changes an existing record. Returns false if there is none.
    pub fn update(&mut self, index_id: IndexId, root_page_id: PageId) -> bool {
        match self.roots.iter_mut().find(|(id, _)| *id == index_id) {
            Some(record) => {
                record.1 = root_page_id;
                true
            }
            None => false,
        }
    }

    pub fn delete(&mut self, index_id: IndexId) -> bool {
        let before = self.roots.len();
        self.roots.retain(|(id, _)| *id != index_id);
        self.roots.len() != before
    }

    pub fn get_root_id(&self, index_id: IndexId) -> Option<PageId> {
        self.roots
            .iter()
            .find(|(id, _)| *id == index_id)
            .map(|(_, root)| *root)
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

/// Formats the index roots page the first time an index is opened.
///
/// The disk manager reserves the page when the file is created, so it is
/// either still blank or already formatted. Anything else is reported as
/// corruption rather than overwritten.
pub fn bootstrap(bpm: &BufferPoolManager) -> Result<()> {
    if bpm.is_page_free(INDEX_ROOTS_PAGE_ID)? {
        return Err(DbError::IndexCorrupted(format!(
            "{} is not reserved for the index roots",
            INDEX_ROOTS_PAGE_ID
        )));
    }

    let mut guard = bpm.fetch_page_write(INDEX_ROOTS_PAGE_ID)?;
    if guard.data().iter().all(|b| *b == 0) {
        IndexRootsPage::new().encode(guard.data_mut());
        debug!("formatted index roots page");
        return Ok(());
    }

    IndexRootsPage::decode(guard.data()).map(|_| ())
}

/// Reads the roots page, applies `f`, and writes it back.
pub(crate) fn modify<T>(
    bpm: &BufferPoolManager,
    f: impl FnOnce(&mut IndexRootsPage) -> Result<T>,
) -> Result<T> {
    let mut guard = bpm.fetch_page_write(INDEX_ROOTS_PAGE_ID)?;
    let mut roots = IndexRootsPage::decode(guard.data())?;
    let result = f(&mut roots)?;
    roots.encode(guard.data_mut());
    Ok(result)
}

pub(crate) fn read(bpm: &BufferPoolManager) -> Result<IndexRootsPage> {
    let guard = bpm.fetch_page_read(INDEX_ROOTS_PAGE_ID)?;
    IndexRootsPage::decode(guard.data())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roots_records() {
        let mut roots = IndexRootsPage::new();
        assert!(roots.insert(1, PageId::new(10)).unwrap());
        assert!(roots.insert(2, PageId::new(20)).unwrap());
        assert!(!roots.insert(1, PageId::new(99)).unwrap());

        assert!(roots.update(1, PageId::new(11)));
        assert!(!roots.update(3, PageId::new(30)));
        assert_eq!(roots.get_root_id(1), Some(PageId::new(11)));

        assert!(roots.delete(2));
        assert!(!roots.delete(2));
        assert_eq!(roots.get_root_id(2), None);
        assert_eq!(roots.len(), 1);
    }

    #[test]
    fn test_roots_codec() {
        let mut roots = IndexRootsPage::new();
        roots.insert(7, PageId::new(-1)).unwrap();
        roots.insert(9, PageId::new(123)).unwrap();

        let mut data = [0u8; PAGE_SIZE];
        roots.encode(&mut data);
        assert_eq!(&data[0..4], &INDEX_ROOTS_MAGIC.to_le_bytes());
        assert_eq!(&data[4..8], &2u32.to_le_bytes());
        assert_eq!(IndexRootsPage::decode(&data).unwrap(), roots);
    }

    #[test]
    fn test_roots_page_full() {
        let mut roots = IndexRootsPage::new();
        for id in 0..MAX_INDEX_ROOTS as u32 {
            roots.insert(id, PageId::new(1)).unwrap();
        }
        assert!(matches!(
            roots.insert(u32::MAX, PageId::new(1)),
            Err(DbError::IndexRootsFull)
        ));

        let mut data = [0u8; PAGE_SIZE];
        roots.encode(&mut data);
        assert_eq!(IndexRootsPage::decode(&data).unwrap().len(), MAX_INDEX_ROOTS);
    }

    #[test]
    fn test_decode_rejects_bad_count() {
        let mut data = [0u8; PAGE_SIZE];
        IndexRootsPage::new().encode(&mut data);
        data[4..8].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(IndexRootsPage::decode(&data).is_err());
    }

    #[test]
    fn test_decode_rejects_foreign_page() {
        // A blank page, or any page without the tag, is not a roots page
        let data = [0u8; PAGE_SIZE];
        assert!(matches!(
            IndexRootsPage::decode(&data),
            Err(DbError::IndexCorrupted(_))
        ));
    }
}
