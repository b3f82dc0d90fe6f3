use crate::common::{BITMAP_PAGE_HEADER_SIZE, BITMAP_SIZE, PAGE_SIZE};

const PAGE_ALLOCATED_OFFSET: usize = 0;
const NEXT_FREE_PAGE_OFFSET: usize = 4;

/// Free-space bitmap for one extent.
///
/// Layout:
///
/// | Field            | Offset | Size                 |
/// |------------------|--------|----------------------|
/// | page_allocated   | 0      | 4                    |
/// | next_free_page   | 4      | 4                    |
/// | bits             | 8      | PAGE_SIZE - 8        |
///
/// Bit `i` set means data page `i` of the extent is allocated. `next_free_page`
/// is only a hint; it is re-validated before use.
pub struct BitmapPage<'a> {
    data: &'a mut [u8],
    capacity: u32,
}

impl<'a> BitmapPage<'a> {
    /// Wraps a page buffer tracking `capacity` data pages.
    pub fn new(data: &'a mut [u8], capacity: u32) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        assert!(capacity > 0 && capacity <= BITMAP_SIZE);
        Self { data, capacity }
    }

    pub fn page_allocated(&self) -> u32 {
        read_u32(self.data, PAGE_ALLOCATED_OFFSET)
    }

    fn set_page_allocated(&mut self, count: u32) {
        write_u32(self.data, PAGE_ALLOCATED_OFFSET, count);
    }

    pub fn next_free_page(&self) -> u32 {
        read_u32(self.data, NEXT_FREE_PAGE_OFFSET)
    }

    fn set_next_free_page(&mut self, offset: u32) {
        write_u32(self.data, NEXT_FREE_PAGE_OFFSET, offset);
    }

    pub fn is_full(&self) -> bool {
        self.page_allocated() >= self.capacity
    }

    /// Marks one free page as allocated and returns its offset in the extent.
    pub fn allocate(&mut self) -> Option<u32> {
        if self.is_full() {
            return None;
        }

        let hint = self.next_free_page();
        let offset = if hint < self.capacity && self.bit_is_clear(hint) {
            hint
        } else {
            self.scan_free_from(0)?
        };

        self.set_bit(offset);
        self.set_page_allocated(self.page_allocated() + 1);

        let next = self.scan_free_from(offset + 1).unwrap_or(self.capacity);
        self.set_next_free_page(next);

        Some(offset)
    }

    /// Clears the bit for `offset`. Returns false if it was already free.
    pub fn deallocate(&mut self, offset: u32) -> bool {
        if offset >= self.capacity || self.bit_is_clear(offset) {
            return false;
        }

        self.clear_bit(offset);
        self.set_page_allocated(self.page_allocated() - 1);
        if offset < self.next_free_page() || self.next_free_page() >= self.capacity {
            self.set_next_free_page(offset);
        }
        true
    }

    /// Out-of-range offsets are reported as not free.
    pub fn is_page_free(&self, offset: u32) -> bool {
        offset < self.capacity && self.bit_is_clear(offset)
    }

    fn scan_free_from(&self, start: u32) -> Option<u32> {
        (start..self.capacity)
            .chain(0..start.min(self.capacity))
            .find(|&i| self.bit_is_clear(i))
    }

    fn bit_is_clear(&self, offset: u32) -> bool {
        let (byte, mask) = locate(offset);
        self.data[byte] & mask == 0
    }

    fn set_bit(&mut self, offset: u32) {
        let (byte, mask) = locate(offset);
        self.data[byte] |= mask;
    }

    fn clear_bit(&mut self, offset: u32) {
        let (byte, mask) = locate(offset);
        self.data[byte] &= !mask;
    }
}

fn locate(offset: u32) -> (usize, u8) {
    let byte = BITMAP_PAGE_HEADER_SIZE + (offset / 8) as usize;
    (byte, 1u8 << (offset % 8))
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

fn write_u32(data: &mut [u8], offset: usize, value: u32) {
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}
