use super::types::{FrameId, PageId};

/// Size of a page in bytes (4 KB)
pub const PAGE_SIZE: usize = 4096;

/// Invalid page ID constant
pub const INVALID_PAGE_ID: PageId = PageId(-1);

/// Invalid frame ID constant
pub const INVALID_FRAME_ID: FrameId = FrameId(u32::MAX);

/// Default buffer pool size (number of frames)
pub const DEFAULT_BUFFER_POOL_SIZE: usize = 64;

/// Physical page holding the disk file meta data
pub const META_PHYSICAL_PAGE_ID: u32 = 0;

/// Logical page reserved for the index roots directory
pub const INDEX_ROOTS_PAGE_ID: PageId = PageId(0);

/// Bytes at the front of a bitmap page used by its header
pub const BITMAP_PAGE_HEADER_SIZE: usize = 8;

/// Number of data pages tracked by one bitmap page (one extent)
pub const BITMAP_SIZE: u32 = ((PAGE_SIZE - BITMAP_PAGE_HEADER_SIZE) * 8) as u32;

/// Bytes at the front of the meta page used by the extent/allocation counters
pub const META_PAGE_HEADER_SIZE: usize = 8;

/// Bytes at the end of the meta page holding the extent capacity
pub const META_PAGE_TRAILER_SIZE: usize = 4;

/// Number of extents the meta page can describe
pub const MAX_EXTENTS: u32 =
    ((PAGE_SIZE - META_PAGE_HEADER_SIZE - META_PAGE_TRAILER_SIZE) / 4) as u32;

/// Largest logical page id the default disk layout can address
pub const MAX_VALID_PAGE_ID: i32 = (MAX_EXTENTS * BITMAP_SIZE - 1) as i32;
