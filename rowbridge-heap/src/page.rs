//! Heap pages: line pointers (slots) and the tuples they point to.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use rowbridge_types::{BlockNumber, Datum, OffsetNumber};

use crate::mvcc::TupleVersion;

/// First valid line pointer offset on a page.
pub const FIRST_OFFSET_NUMBER: OffsetNumber = 1;

/// One stored tuple: its version header and attribute values.
///
/// A tuple written before columns were added to the relation carries fewer
/// attributes than the current descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct HeapTuple {
    pub version: TupleVersion,
    values: Vec<Option<Datum>>,
}

impl HeapTuple {
    pub fn new(version: TupleVersion, values: Vec<Option<Datum>>) -> Self {
        Self { version, values }
    }

    /// Attributes physically present in the tuple.
    #[inline]
    pub fn natts(&self) -> usize {
        self.values.len()
    }

    /// Value of a present attribute; `None` for NULL or past `natts`.
    #[inline]
    pub fn attribute(&self, idx: usize) -> Option<&Datum> {
        self.values.get(idx).and_then(Option::as_ref)
    }
}

/// Line pointer state.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemId {
    Unused,
    Dead,
    /// Points at another slot on the same page (HOT chain root).
    Redirect(OffsetNumber),
    Normal(HeapTuple),
}

impl ItemId {
    #[inline]
    pub fn is_normal(&self) -> bool {
        matches!(self, ItemId::Normal(_))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    items: Vec<ItemId>,
    /// Every normal tuple is visible to every snapshot.
    pub all_visible: bool,
}

impl Page {
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest used offset number (slots are numbered from 1).
    #[inline]
    pub fn max_offset(&self) -> OffsetNumber {
        OffsetNumber::try_from(self.items.len()).unwrap_or(OffsetNumber::MAX)
    }

    pub fn item(&self, offset: OffsetNumber) -> Option<&ItemId> {
        let idx = usize::from(offset).checked_sub(usize::from(FIRST_OFFSET_NUMBER))?;
        self.items.get(idx)
    }

    pub(crate) fn item_mut(&mut self, offset: OffsetNumber) -> Option<&mut ItemId> {
        let idx = usize::from(offset).checked_sub(usize::from(FIRST_OFFSET_NUMBER))?;
        self.items.get_mut(idx)
    }

    pub(crate) fn push(&mut self, item: ItemId) -> OffsetNumber {
        self.items.push(item);
        self.max_offset()
    }

    pub fn live_tuples(&self) -> usize {
        self.items.iter().filter(|i| i.is_normal()).count()
    }
}

/// A pinned page. The pin is released when the guard drops.
///
/// Pages are copy-on-write: writers never modify a page that a guard holds,
/// so a pinned page stays stable for as long as the guard lives.
#[derive(Debug)]
pub struct PageGuard {
    block: BlockNumber,
    page: Arc<Page>,
    pins: Arc<AtomicUsize>,
}

impl PageGuard {
    pub(crate) fn pin(block: BlockNumber, page: Arc<Page>, pins: Arc<AtomicUsize>) -> Self {
        pins.fetch_add(1, Ordering::AcqRel);
        tracing::trace!(block, "pin");
        Self { block, page, pins }
    }

    #[inline]
    pub fn block(&self) -> BlockNumber {
        self.block
    }

    #[inline]
    pub fn page(&self) -> &Page {
        &self.page
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        self.pins.fetch_sub(1, Ordering::AcqRel);
        tracing::trace!(block = self.block, "unpin");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_start_at_one() {
        let mut page = Page::new();
        assert_eq!(page.max_offset(), 0);
        assert!(page.item(0).is_none());
        let off = page.push(ItemId::Dead);
        assert_eq!(off, FIRST_OFFSET_NUMBER);
        let off = page.push(ItemId::Normal(HeapTuple::new(TupleVersion::frozen(), vec![])));
        assert_eq!(off, 2);
        assert_eq!(page.item(1), Some(&ItemId::Dead));
        assert!(page.item(2).is_some_and(ItemId::is_normal));
        assert_eq!(page.live_tuples(), 1);
    }

    #[test]
    fn guard_releases_pin_on_drop() {
        let pins = Arc::new(AtomicUsize::new(0));
        let page = Arc::new(Page::new());
        let a = PageGuard::pin(0, Arc::clone(&page), Arc::clone(&pins));
        let b = PageGuard::pin(1, page, Arc::clone(&pins));
        assert_eq!(pins.load(Ordering::Acquire), 2);
        drop(a);
        assert_eq!(pins.load(Ordering::Acquire), 1);
        drop(b);
        assert_eq!(pins.load(Ordering::Acquire), 0);
    }

    #[test]
    fn short_tuples_read_null_past_natts() {
        let t = HeapTuple::new(TupleVersion::frozen(), vec![Some(Datum::from_i32(7))]);
        assert_eq!(t.natts(), 1);
        assert_eq!(t.attribute(0), Some(&Datum::from_i32(7)));
        assert_eq!(t.attribute(1), None);
    }
}
