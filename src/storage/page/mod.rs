mod slotted_page;
mod table_page;

pub use slotted_page::{SlotEntry, SlottedPage, SLOTTED_PAGE_HEADER_SIZE, SLOT_SIZE};
pub use table_page::{TablePage, MAX_TUPLE_SIZE, TABLE_PAGE_HEADER_SIZE};
