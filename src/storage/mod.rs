pub mod disk;
pub mod page;
mod table_heap;
mod table_iterator;

pub use table_heap::TableHeap;
pub use table_iterator::TableIterator;
