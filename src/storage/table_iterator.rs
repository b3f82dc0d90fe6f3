use std::sync::Arc;

use crate::buffer::{BufferPoolManager, ReadPageGuard};
use crate::common::{PageId, Result, RowId, INVALID_PAGE_ID};

use super::page::TablePage;

/// Cursor over the live rows of a [`TableHeap`](super::TableHeap).
pub struct TableIterator {
    bpm: Arc<BufferPoolManager>,
    guard: Option<ReadPageGuard>,
    next_slot: u32,
}

impl TableIterator {
    pub(crate) fn new(bpm: Arc<BufferPoolManager>, first_page_id: PageId) -> Result<Self> {
        let guard = if first_page_id.is_valid() {
            Some(bpm.fetch_page_read(first_page_id)?)
        } else {
            None
        };

        Ok(Self {
            bpm,
            guard,
            next_slot: 0,
        })
    }

    /// Current page id, `INVALID_PAGE_ID` once exhausted.
    pub fn page_id(&self) -> PageId {
        self.guard
            .as_ref()
            .map_or(INVALID_PAGE_ID, |guard| guard.page_id())
    }

    pub fn next_row(&mut self) -> Result<Option<(RowId, Vec<u8>)>> {
        loop {
            let next_page_id = match &self.guard {
                None => return Ok(None),
                Some(guard) => {
                    let page = TablePage::new(guard.data());
                    if let Some(slot_id) = page.next_live_slot(self.next_slot) {
                        self.next_slot = slot_id.as_u32() + 1;
                        let row = page.get_tuple(slot_id).unwrap_or_default().to_vec();
                        return Ok(Some((RowId::new(page.page_id(), slot_id), row)));
                    }
                    page.next_page_id()
                }
            };

            self.guard = None;
            self.next_slot = 0;
            if next_page_id.is_valid() {
                self.guard = Some(self.bpm.fetch_page_read(next_page_id)?);
            }
        }
    }
}

impl Iterator for TableIterator {
    type Item = Result<(RowId, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_row() {
            Ok(Some(row)) => Some(Ok(row)),
            Ok(None) => None,
            Err(e) => {
                self.guard = None;
                Some(Err(e))
            }
        }
    }
}
