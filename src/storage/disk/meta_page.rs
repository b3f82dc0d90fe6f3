use bytes::{Buf, BufMut};

use crate::common::{MAX_EXTENTS, META_PAGE_TRAILER_SIZE, PAGE_SIZE};

const CAPACITY_OFFSET: usize = PAGE_SIZE - META_PAGE_TRAILER_SIZE;

/// In-memory copy of physical page 0.
///
/// On disk: `num_extents u32`, `num_allocated_pages u32`, followed by one
/// `u32` used-page counter per extent. Unused counter slots are zero. The
/// last four bytes hold `extent_capacity`; zero marks a file that was never
/// initialised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskMetaPage {
    pub extent_capacity: u32,
    pub num_allocated_pages: u32,
    pub extent_used_pages: Vec<u32>,
}

impl DiskMetaPage {
    pub fn new() -> Self {
        Self {
            extent_capacity: 0,
            num_allocated_pages: 0,
            extent_used_pages: Vec::new(),
        }
    }

    pub fn num_extents(&self) -> u32 {
        self.extent_used_pages.len() as u32
    }

    pub fn is_initialized(&self) -> bool {
        self.extent_capacity != 0
    }

    /// Decodes the meta page. An all-zero page decodes to an uninitialised disk.
    pub fn decode(mut data: &[u8]) -> Self {
        debug_assert_eq!(data.len(), PAGE_SIZE);

        let extent_capacity = (&data[CAPACITY_OFFSET..]).get_u32_le();
        let num_extents = data.get_u32_le().min(MAX_EXTENTS);
        let num_allocated_pages = data.get_u32_le();
        let extent_used_pages = (0..num_extents).map(|_| data.get_u32_le()).collect();

        Self {
            extent_capacity,
            num_allocated_pages,
            extent_used_pages,
        }
    }

    pub fn encode(&self, out: &mut [u8]) {
        debug_assert_eq!(out.len(), PAGE_SIZE);
        out.fill(0);

        (&mut out[CAPACITY_OFFSET..]).put_u32_le(self.extent_capacity);

        let mut buf = out;
        buf.put_u32_le(self.num_extents());
        buf.put_u32_le(self.num_allocated_pages);
        for used in &self.extent_used_pages {
            buf.put_u32_le(*used);
        }
    }
}

impl Default for DiskMetaPage {
    fn default() -> Self {
        Self::new()
    }
}
