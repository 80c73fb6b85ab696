//! The access surface a scan needs from a row-store relation.

use rowbridge_codec::{EnumCatalog, ToastFetcher};
use rowbridge_result::Result;
use rowbridge_types::{BlockNumber, RelationId, Snapshot, TupleDesc};

use crate::page::{HeapTuple, PageGuard};

/// Read access to a heap relation.
///
/// Implementations must be shareable across scan threads. Pages come back
/// pinned; the pin is released when the returned guard drops, on every exit
/// path of the reader.
pub trait HeapRelation: Send + Sync {
    fn relation_id(&self) -> RelationId;

    /// Schema-qualified name used in generated queries.
    fn name(&self) -> &str;

    fn tuple_desc(&self) -> &TupleDesc;

    /// Number of blocks at the time of the call.
    fn nblocks(&self) -> BlockNumber;

    /// Average live tuples per block, from the relation's statistics.
    fn tuples_per_block(&self) -> f64;

    /// Pin block `block` and take a stable view of its contents.
    fn read_block(&self, block: BlockNumber) -> Result<PageGuard>;

    /// The row store's own MVCC visibility rule.
    fn is_visible(&self, tuple: &HeapTuple, snapshot: &Snapshot) -> bool;

    fn toast(&self) -> &dyn ToastFetcher;

    fn enums(&self) -> &dyn EnumCatalog;
}
