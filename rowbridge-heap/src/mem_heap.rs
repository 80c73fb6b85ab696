//! In-memory heap relation.
//!
//! Pages are held behind `Arc` and modified copy-on-write, so a reader that
//! has pinned a page keeps a stable view while writers continue on a fresh
//! copy. Outstanding pins are counted for leak checks.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use rowbridge_codec::{CompressionMethod, EnumCatalog, ToastFetcher};
use rowbridge_result::{Error, Result};
use rowbridge_types::{
    BlockNumber, Datum, EnumDictionary, ItemPointer, OffsetNumber, RelationId, Snapshot,
    TXN_ID_FROZEN, TupleDesc, TxnId, TypeId,
};
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::mvcc::{TupleVersion, TxnManager};
use crate::page::{HeapTuple, ItemId, Page, PageGuard};
use crate::relation::HeapRelation;
use crate::toast::ToastStore;

pub const DEFAULT_TUPLES_PER_PAGE: usize = 64;

/// Most line pointers a page can address with an [`OffsetNumber`].
pub const MAX_TUPLES_PER_PAGE: usize = OffsetNumber::MAX as usize;

const NO_FAILURE: u64 = u64::MAX;

/// Enum types known to a relation, keyed by type id.
#[derive(Debug, Default)]
pub struct EnumRegistry {
    types: FxHashMap<TypeId, Arc<EnumDictionary>>,
}

impl EnumRegistry {
    pub fn register(&mut self, dict: EnumDictionary) {
        self.types.insert(dict.type_id, Arc::new(dict));
    }
}

impl EnumCatalog for EnumRegistry {
    fn enum_dictionary(&self, type_id: TypeId) -> Option<Arc<EnumDictionary>> {
        self.types.get(&type_id).cloned()
    }
}

#[derive(Debug)]
pub struct MemHeap {
    id: RelationId,
    name: String,
    desc: TupleDesc,
    tuples_per_page: usize,
    pages: RwLock<Vec<Arc<Page>>>,
    txns: TxnManager,
    toast: ToastStore,
    enums: EnumRegistry,
    pins: Arc<AtomicUsize>,
    pins_taken: AtomicU64,
    failing_block: AtomicU64,
}

impl MemHeap {
    pub fn new(id: RelationId, name: impl Into<String>, desc: TupleDesc) -> Self {
        Self {
            id,
            name: name.into(),
            desc,
            tuples_per_page: DEFAULT_TUPLES_PER_PAGE,
            pages: RwLock::new(Vec::new()),
            txns: TxnManager::new(),
            toast: ToastStore::new(id.wrapping_add(1)),
            enums: EnumRegistry::default(),
            pins: Arc::new(AtomicUsize::new(0)),
            pins_taken: AtomicU64::new(0),
            failing_block: AtomicU64::new(NO_FAILURE),
        }
    }

    /// Slots per page before inserts move on to a new block, clamped to
    /// `1..=MAX_TUPLES_PER_PAGE`.
    pub fn with_tuples_per_page(mut self, n: usize) -> Self {
        self.tuples_per_page = n.clamp(1, MAX_TUPLES_PER_PAGE);
        self
    }

    pub fn tuples_per_page(&self) -> usize {
        self.tuples_per_page
    }

    pub fn with_enum(mut self, dict: EnumDictionary) -> Self {
        self.enums.register(dict);
        self
    }

    pub fn txn_manager(&self) -> &TxnManager {
        &self.txns
    }

    pub fn toast_store(&self) -> &ToastStore {
        &self.toast
    }

    /// Store `payload` out of line and return the pointer datum.
    pub fn toast_value(&self, payload: &[u8], compression: Option<CompressionMethod>) -> Datum {
        Datum::from_bytes(self.toast.store(payload, compression))
    }

    /// Pins currently held by readers.
    pub fn outstanding_pins(&self) -> usize {
        self.pins.load(Ordering::Acquire)
    }

    /// Pins taken since the heap was created.
    pub fn pins_taken(&self) -> u64 {
        self.pins_taken.load(Ordering::Relaxed)
    }

    /// Make reads of `block` fail with an I/O error.
    pub fn inject_read_failure(&self, block: Option<BlockNumber>) {
        let v = block.map_or(NO_FAILURE, u64::from);
        self.failing_block.store(v, Ordering::Relaxed);
    }

    /// Insert a tuple created by `txn`.
    pub fn insert(&self, txn: TxnId, values: Vec<Option<Datum>>) -> Result<ItemPointer> {
        if values.len() > self.desc.natts() {
            return Err(Error::InvalidArgumentError(format!(
                "tuple has {} attributes, relation {} has {}",
                values.len(),
                self.name,
                self.desc.natts()
            )));
        }
        let tuple = HeapTuple::new(TupleVersion::new(txn), values);
        Ok(self.push_item(ItemId::Normal(tuple)))
    }

    /// Insert a tuple visible to every snapshot.
    pub fn insert_frozen(&self, values: Vec<Option<Datum>>) -> Result<ItemPointer> {
        self.insert(TXN_ID_FROZEN, values)
    }

    /// Mark the tuple at `tid` deleted by `txn`.
    pub fn delete(&self, txn: TxnId, tid: ItemPointer) -> Result<()> {
        self.update_page(tid.block, |page| match page.item_mut(tid.offset) {
            Some(ItemId::Normal(tuple)) => {
                tuple.version.deleted_by = txn;
                page.all_visible = false;
                Ok(())
            }
            _ => Err(Error::NotFound),
        })
    }

    /// Turn the slot at `tid` into a dead line pointer.
    pub fn kill(&self, tid: ItemPointer) -> Result<()> {
        self.set_item(tid, ItemId::Dead)
    }

    /// Turn the slot at `tid` into a redirect to `target` on the same page.
    pub fn redirect(&self, tid: ItemPointer, target: OffsetNumber) -> Result<()> {
        self.set_item(tid, ItemId::Redirect(target))
    }

    /// Append an unused line pointer.
    pub fn add_unused_slot(&self) -> ItemPointer {
        self.push_item(ItemId::Unused)
    }

    /// Start a new block for subsequent inserts.
    pub fn seal_block(&self) {
        let mut pages = self.pages.write().expect("heap pages lock poisoned");
        pages.push(Arc::new(Page::new()));
    }

    pub fn set_all_visible(&self, block: BlockNumber, all_visible: bool) -> Result<()> {
        self.update_page(block, |page| {
            page.all_visible = all_visible;
            Ok(())
        })
    }

    /// Live (normal) slots across all pages.
    pub fn live_tuples(&self) -> usize {
        self.pages
            .read()
            .expect("heap pages lock poisoned")
            .iter()
            .map(|p| p.live_tuples())
            .sum()
    }

    fn set_item(&self, tid: ItemPointer, item: ItemId) -> Result<()> {
        self.update_page(tid.block, |page| {
            let slot = page.item_mut(tid.offset).ok_or(Error::NotFound)?;
            *slot = item;
            Ok(())
        })
    }

    fn push_item(&self, item: ItemId) -> ItemPointer {
        let mut pages = self.pages.write().expect("heap pages lock poisoned");
        let full = pages
            .last()
            .is_none_or(|p| usize::from(p.max_offset()) >= self.tuples_per_page);
        if full {
            pages.push(Arc::new(Page::new()));
        }
        let block = (pages.len() - 1) as BlockNumber;
        let page = Arc::make_mut(&mut pages[block as usize]);
        page.all_visible = false;
        let offset = page.push(item);
        ItemPointer::new(block, offset)
    }

    fn update_page<T>(
        &self,
        block: BlockNumber,
        f: impl FnOnce(&mut Page) -> Result<T>,
    ) -> Result<T> {
        let mut pages = self.pages.write().expect("heap pages lock poisoned");
        let page = pages.get_mut(block as usize).ok_or(Error::NotFound)?;
        f(Arc::make_mut(page))
    }
}

impl HeapRelation for MemHeap {
    fn relation_id(&self) -> RelationId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn tuple_desc(&self) -> &TupleDesc {
        &self.desc
    }

    fn nblocks(&self) -> BlockNumber {
        self.pages.read().expect("heap pages lock poisoned").len() as BlockNumber
    }

    fn tuples_per_block(&self) -> f64 {
        let pages = self.pages.read().expect("heap pages lock poisoned");
        if pages.is_empty() {
            return 0.0;
        }
        let live: usize = pages.iter().map(|p| p.live_tuples()).sum();
        live as f64 / pages.len() as f64
    }

    fn read_block(&self, block: BlockNumber) -> Result<PageGuard> {
        if self.failing_block.load(Ordering::Relaxed) == u64::from(block) {
            debug!(relation = %self.name, block, "injected read failure");
            return Err(Error::Io(std::io::Error::other(format!(
                "could not read block {block} of relation {}",
                self.name
            ))));
        }
        let page = {
            let pages = self.pages.read().expect("heap pages lock poisoned");
            let page = pages.get(block as usize).ok_or_else(|| {
                Error::InvalidArgumentError(format!(
                    "block {block} is beyond the end of relation {}",
                    self.name
                ))
            })?;
            Arc::clone(page)
        };
        self.pins_taken.fetch_add(1, Ordering::Relaxed);
        Ok(PageGuard::pin(block, page, Arc::clone(&self.pins)))
    }

    fn is_visible(&self, tuple: &HeapTuple, snapshot: &Snapshot) -> bool {
        tuple.version.is_visible_for(&self.txns, snapshot)
    }

    fn toast(&self) -> &dyn ToastFetcher {
        &self.toast
    }

    fn enums(&self) -> &dyn EnumCatalog {
        &self.enums
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowbridge_types::{ColumnDesc, RowType};

    fn heap() -> MemHeap {
        MemHeap::new(
            100,
            "public.t",
            TupleDesc::new(vec![
                ColumnDesc::new("a", RowType::Int4),
                ColumnDesc::new("b", RowType::Text),
            ]),
        )
        .with_tuples_per_page(2)
    }

    #[test]
    fn inserts_fill_pages_in_order() {
        let heap = heap();
        let tids: Vec<_> = (0..5)
            .map(|i| heap.insert_frozen(vec![Some(Datum::from_i32(i))]).unwrap())
            .collect();
        assert_eq!(
            tids,
            vec![
                ItemPointer::new(0, 1),
                ItemPointer::new(0, 2),
                ItemPointer::new(1, 1),
                ItemPointer::new(1, 2),
                ItemPointer::new(2, 1),
            ]
        );
        assert_eq!(heap.nblocks(), 3);
        assert_eq!(heap.live_tuples(), 5);
        assert!((heap.tuples_per_block() - 5.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn too_many_attributes_is_rejected() {
        let heap = heap();
        let values = vec![Some(Datum::from_i32(1)), None, None];
        assert!(matches!(
            heap.insert_frozen(values),
            Err(Error::InvalidArgumentError(_))
        ));
    }

    #[test]
    fn pinned_page_is_stable_under_writes() {
        let heap = heap();
        let tid = heap.insert_frozen(vec![Some(Datum::from_i32(1))]).unwrap();
        let guard = heap.read_block(0).unwrap();
        assert_eq!(heap.outstanding_pins(), 1);

        heap.kill(tid).unwrap();
        heap.insert_frozen(vec![Some(Datum::from_i32(2))]).unwrap();
        assert!(guard.page().item(1).is_some_and(ItemId::is_normal));
        assert_eq!(guard.page().max_offset(), 1);
        drop(guard);

        let fresh = heap.read_block(0).unwrap();
        assert_eq!(fresh.page().item(1), Some(&ItemId::Dead));
        assert_eq!(fresh.page().max_offset(), 2);
        drop(fresh);
        assert_eq!(heap.outstanding_pins(), 0);
        assert_eq!(heap.pins_taken(), 2);
    }

    #[test]
    fn injected_failure_takes_no_pin() {
        let heap = heap();
        heap.insert_frozen(vec![]).unwrap();
        heap.inject_read_failure(Some(0));
        assert!(matches!(heap.read_block(0), Err(Error::Io(_))));
        assert_eq!(heap.outstanding_pins(), 0);
        heap.inject_read_failure(None);
        assert!(heap.read_block(0).is_ok());
        assert!(heap.read_block(7).is_err());
    }

    #[test]
    fn rolled_back_insert_is_invisible() {
        let heap = heap();
        let txn = heap.txn_manager().begin();
        let tid = heap.insert(txn.txn_id, vec![Some(Datum::from_i32(5))]).unwrap();
        heap.txn_manager().abort(txn.txn_id);

        let guard = heap.read_block(tid.block).unwrap();
        let Some(ItemId::Normal(tuple)) = guard.page().item(tid.offset) else {
            panic!("expected a normal slot");
        };
        assert!(!heap.is_visible(tuple, &heap.txn_manager().read_snapshot()));
    }

    #[test]
    fn page_capacity_stays_addressable() {
        let heap = MemHeap::new(
            9,
            "public.wide",
            TupleDesc::new(vec![ColumnDesc::new("v", RowType::Int4)]),
        )
        .with_tuples_per_page(100_000);
        assert_eq!(heap.tuples_per_page(), MAX_TUPLES_PER_PAGE);

        let mut last = None;
        for v in 0..=MAX_TUPLES_PER_PAGE {
            last = Some(heap.insert_frozen(vec![Some(Datum::from_i32(v as i32))]).unwrap());
        }
        assert_eq!(heap.nblocks(), 2);
        assert_eq!(last.map(|tid| (tid.block, tid.offset)), Some((1, 1)));
        let guard = heap.read_block(0).unwrap();
        assert_eq!(usize::from(guard.page().max_offset()), MAX_TUPLES_PER_PAGE);
    }
}
