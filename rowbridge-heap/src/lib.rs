//! Row-store side of the scan bridge.
//!
//! [`HeapRelation`] is the seam through which scans read blocks, check tuple
//! visibility and fetch out-of-line values. [`MemHeap`] implements it over
//! in-memory pages with slot kinds, pins, MVCC headers and a toast store.

pub mod mem_heap;
pub mod mvcc;
pub mod page;
pub mod relation;
pub mod toast;

pub use mem_heap::{DEFAULT_TUPLES_PER_PAGE, EnumRegistry, MAX_TUPLES_PER_PAGE, MemHeap};
pub use mvcc::{TupleVersion, TxnManager, TxnStatus};
pub use page::{FIRST_OFFSET_NUMBER, HeapTuple, ItemId, Page, PageGuard};
pub use relation::HeapRelation;
pub use toast::ToastStore;
