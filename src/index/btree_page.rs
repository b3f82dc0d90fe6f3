//! Header shared by B+Tree leaf and internal pages.
//!
//! Every tree page starts with the same little-endian header:
//!
//! | Field          | Offset | Size |
//! |----------------|--------|------|
//! | page_type      | 0      | 4    |
//! | key_size       | 4      | 4    |
//! | size           | 8      | 4    |
//! | max_size       | 12     | 4    |
//! | parent_page_id | 16     | 4    |
//! | page_id        | 20     | 4    |
//!
//! Leaf pages append `next_page_id` at offset 24.

use crate::common::{DbError, PageId, Result, PAGE_SIZE};

use super::{InternalPage, LeafPage};

const PAGE_TYPE_OFFSET: usize = 0;
const KEY_SIZE_OFFSET: usize = 4;
const SIZE_OFFSET: usize = 8;
const MAX_SIZE_OFFSET: usize = 12;
const PARENT_PAGE_ID_OFFSET: usize = 16;
const PAGE_ID_OFFSET: usize = 20;

/// Size of the header common to both page kinds
pub const BTREE_PAGE_HEADER_SIZE: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexPageType {
    Leaf,
    Internal,
}

impl IndexPageType {
    fn to_u32(self) -> u32 {
        match self {
            IndexPageType::Leaf => 1,
            IndexPageType::Internal => 2,
        }
    }

    fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(IndexPageType::Leaf),
            2 => Some(IndexPageType::Internal),
            _ => None,
        }
    }
}

/// Read access to the common header.
pub trait BTreePage {
    fn bytes(&self) -> &[u8];

    fn page_type(&self) -> Option<IndexPageType> {
        IndexPageType::from_u32(read_u32(self.bytes(), PAGE_TYPE_OFFSET))
    }

    fn is_leaf(&self) -> bool {
        self.page_type() == Some(IndexPageType::Leaf)
    }

    fn key_size(&self) -> usize {
        read_u32(self.bytes(), KEY_SIZE_OFFSET) as usize
    }

    fn size(&self) -> usize {
        read_u32(self.bytes(), SIZE_OFFSET) as usize
    }

    fn max_size(&self) -> usize {
        read_u32(self.bytes(), MAX_SIZE_OFFSET) as usize
    }

    /// Occupancy every non-root page must keep: `ceil(max_size / 2)`.
    fn min_size(&self) -> usize {
        (self.max_size() + 1) / 2
    }

    fn parent_page_id(&self) -> PageId {
        PageId::new(read_i32(self.bytes(), PARENT_PAGE_ID_OFFSET))
    }

    fn page_id(&self) -> PageId {
        PageId::new(read_i32(self.bytes(), PAGE_ID_OFFSET))
    }

    fn is_root(&self) -> bool {
        !self.parent_page_id().is_valid()
    }
}

/// Write access to the common header.
pub trait BTreePageMut: BTreePage {
    fn bytes_mut(&mut self) -> &mut [u8];

    fn init_header(
        &mut self,
        page_type: IndexPageType,
        page_id: PageId,
        parent_page_id: PageId,
        key_size: usize,
        max_size: usize,
    ) {
        let data = self.bytes_mut();
        data.fill(0);
        write_u32(data, PAGE_TYPE_OFFSET, page_type.to_u32());
        write_u32(data, KEY_SIZE_OFFSET, key_size as u32);
        write_u32(data, SIZE_OFFSET, 0);
        write_u32(data, MAX_SIZE_OFFSET, max_size as u32);
        write_i32(data, PARENT_PAGE_ID_OFFSET, parent_page_id.as_i32());
        write_i32(data, PAGE_ID_OFFSET, page_id.as_i32());
    }

    fn set_size(&mut self, size: usize) {
        write_u32(self.bytes_mut(), SIZE_OFFSET, size as u32);
    }

    fn set_parent_page_id(&mut self, parent_page_id: PageId) {
        write_i32(
            self.bytes_mut(),
            PARENT_PAGE_ID_OFFSET,
            parent_page_id.as_i32(),
        );
    }
}

/// Header-only view, used where the page kind does not matter.
pub struct PageHeader<B> {
    data: B,
}

impl<B: AsRef<[u8]>> PageHeader<B> {
    pub fn new(data: B) -> Self {
        Self { data }
    }
}

impl<B: AsRef<[u8]>> BTreePage for PageHeader<B> {
    fn bytes(&self) -> &[u8] {
        self.data.as_ref()
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> BTreePageMut for PageHeader<B> {
    fn bytes_mut(&mut self) -> &mut [u8] {
        self.data.as_mut()
    }
}

/// A tree page whose kind has been read from its header.
pub enum TreePage<B> {
    Leaf(LeafPage<B>),
    Internal(InternalPage<B>),
}

impl<B: AsRef<[u8]>> TreePage<B> {
    /// Interprets a page buffer, rejecting unknown page types and sizes that
    /// do not fit the page.
    pub fn load(data: B) -> Result<Self> {
        let header = PageHeader::new(data.as_ref());
        let page_type = header.page_type().ok_or_else(|| {
            DbError::IndexCorrupted(format!(
                "page {} has unknown type {}",
                header.page_id(),
                read_u32(data.as_ref(), PAGE_TYPE_OFFSET)
            ))
        })?;

        let (capacity, max_size, size) = match page_type {
            IndexPageType::Leaf => (
                LeafPage::<B>::capacity(header.key_size()),
                header.max_size(),
                header.size(),
            ),
            IndexPageType::Internal => (
                InternalPage::<B>::capacity(header.key_size()),
                header.max_size(),
                header.size(),
            ),
        };
        if header.key_size() == 0 || max_size >= capacity || size > max_size + 1 {
            return Err(DbError::IndexCorrupted(format!(
                "page {} claims size {} with max {} (capacity {})",
                header.page_id(),
                size,
                max_size,
                capacity
            )));
        }

        Ok(match page_type {
            IndexPageType::Leaf => TreePage::Leaf(LeafPage::new(data)),
            IndexPageType::Internal => TreePage::Internal(InternalPage::new(data)),
        })
    }
}

pub(crate) fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

pub(crate) fn read_i32(data: &[u8], offset: usize) -> i32 {
    read_u32(data, offset) as i32
}

pub(crate) fn write_u32(data: &mut [u8], offset: usize, value: u32) {
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

pub(crate) fn write_i32(data: &mut [u8], offset: usize, value: i32) {
    write_u32(data, offset, value as u32);
}

/// Number of `pair_size` entries that fit after a header of `header_size`.
pub(crate) fn entries_per_page(header_size: usize, pair_size: usize) -> usize {
    (PAGE_SIZE - header_size) / pair_size
}
