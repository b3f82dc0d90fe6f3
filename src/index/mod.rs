pub mod btree_index;
pub mod btree_internal_page;
pub mod btree_iterator;
pub mod btree_leaf_page;
pub mod btree_page;
pub mod index_roots_page;
pub mod key_manager;

pub use btree_index::BPlusTree;
pub use btree_internal_page::InternalPage;
pub use btree_iterator::IndexIterator;
pub use btree_leaf_page::LeafPage;
pub use btree_page::{BTreePage, BTreePageMut, IndexPageType, PageHeader, TreePage};
pub use index_roots_page::IndexRootsPage;
pub use key_manager::{BytewiseKeyManager, IntegerKeyManager, KeyManager};
