//! Per-row work shared by block cursors and bridge workers.

use std::fmt;
use std::sync::Arc;

use rowbridge_codec::{DecodeContext, ScratchPool};
use rowbridge_expr::ValueFilter;
use rowbridge_heap::{HeapRelation, HeapTuple};
use rowbridge_result::Result;
use rowbridge_types::{Datum, Snapshot};

/// Immutable description of what a scan reads, shared by all its readers.
pub(crate) struct ScanContext {
    pub relation: Arc<dyn HeapRelation>,
    pub snapshot: Snapshot,
    /// Attributes to deform, ascending: output columns plus filter columns.
    pub needed_columns: Vec<usize>,
    /// Descriptor index of each output column, in projection order.
    pub output_columns: Vec<usize>,
    pub filters: Vec<ValueFilter>,
}

/// What happened to one live tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RowOutcome {
    Invisible,
    Filtered,
    Accepted,
}

impl ScanContext {
    #[inline]
    pub fn natts(&self) -> usize {
        self.relation.tuple_desc().natts()
    }

    #[inline]
    pub fn count_only(&self) -> bool {
        self.output_columns.is_empty()
    }

    /// Check visibility, deform the needed attributes into `row` and run the
    /// value filters. `row` holds the deformed values whatever the outcome
    /// past visibility.
    pub fn process(
        &self,
        tuple: &HeapTuple,
        all_visible: bool,
        row: &mut Vec<Option<Datum>>,
        pool: &ScratchPool,
    ) -> Result<RowOutcome> {
        if !all_visible && !self.relation.is_visible(tuple, &self.snapshot) {
            return Ok(RowOutcome::Invisible);
        }
        self.deform(tuple, row);
        if !self.filters.is_empty() {
            let ctx = DecodeContext::new(self.relation.toast(), pool);
            for filter in &self.filters {
                if !filter.matches(row.as_slice(), &ctx)? {
                    return Ok(RowOutcome::Filtered);
                }
            }
        }
        Ok(RowOutcome::Accepted)
    }

    /// Attributes past the tuple's own count take the column's missing
    /// default, or NULL.
    fn deform(&self, tuple: &HeapTuple, row: &mut Vec<Option<Datum>>) {
        let desc = self.relation.tuple_desc();
        row.clear();
        row.resize(desc.natts(), None);
        for &column in &self.needed_columns {
            row[column] = if column < tuple.natts() {
                tuple.attribute(column).cloned()
            } else {
                desc.column(column).and_then(|c| c.missing_default.clone())
            };
        }
    }
}

impl fmt::Debug for ScanContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanContext")
            .field("relation", &self.relation.name())
            .field("snapshot", &self.snapshot)
            .field("needed_columns", &self.needed_columns)
            .field("output_columns", &self.output_columns)
            .field("filters", &self.filters)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowbridge_expr::{CompareOp, Expr, Filter, compile};
    use rowbridge_heap::{ItemId, MemHeap};
    use rowbridge_types::{ColumnDesc, RowType, TupleDesc};

    fn tuples(heap: &MemHeap) -> Vec<HeapTuple> {
        let guard = heap.read_block(0).unwrap();
        let page = guard.page();
        (1..=page.max_offset())
            .filter_map(|off| match page.item(off) {
                Some(ItemId::Normal(t)) => Some(t.clone()),
                _ => None,
            })
            .collect()
    }

    fn heap() -> MemHeap {
        MemHeap::new(
            9000,
            "public.t",
            TupleDesc::new(vec![
                ColumnDesc::new("a", RowType::Int4),
                ColumnDesc::new("b", RowType::Int8),
                ColumnDesc::new("c", RowType::Int4).with_missing_default(Datum::from_i32(42)),
            ]),
        )
    }

    fn context(heap: Arc<MemHeap>, needed: Vec<usize>, filters: Vec<ValueFilter>) -> ScanContext {
        let snapshot = heap.txn_manager().read_snapshot();
        ScanContext {
            relation: heap,
            snapshot,
            needed_columns: needed,
            output_columns: vec![0],
            filters,
        }
    }

    #[test]
    fn short_tuples_take_missing_defaults() {
        let heap = heap();
        heap.insert_frozen(vec![Some(Datum::from_i32(1))]).unwrap();
        let heap = Arc::new(heap);
        let ctx = context(Arc::clone(&heap), vec![0, 1, 2], vec![]);
        let tuples = tuples(&heap);
        let pool = ScratchPool::new();
        let mut row = Vec::new();
        let outcome = ctx.process(&tuples[0], true, &mut row, &pool).unwrap();
        assert_eq!(outcome, RowOutcome::Accepted);
        assert_eq!(row, vec![Some(Datum::from_i32(1)), None, Some(Datum::from_i32(42))]);
    }

    #[test]
    fn unneeded_columns_stay_null() {
        let heap = heap();
        heap.insert_frozen(vec![
            Some(Datum::from_i32(1)),
            Some(Datum::from_i64(2)),
            Some(Datum::from_i32(3)),
        ])
        .unwrap();
        let heap = Arc::new(heap);
        let ctx = context(Arc::clone(&heap), vec![1], vec![]);
        let pool = ScratchPool::new();
        let mut row = Vec::new();
        ctx.process(&tuples(&heap)[0], true, &mut row, &pool).unwrap();
        assert_eq!(row, vec![None, Some(Datum::from_i64(2)), None]);
    }

    #[test]
    fn filters_reject_after_visibility() {
        let heap = heap();
        for v in [5i64, 50] {
            heap.insert_frozen(vec![Some(Datum::from_i32(0)), Some(Datum::from_i64(v))])
                .unwrap();
        }
        let heap = Arc::new(heap);
        let expr = Expr::Pred(Filter::compare(1, CompareOp::Gt, 10i64));
        let filter = compile(&expr, heap.tuple_desc()).pushed().unwrap();
        let ctx = context(Arc::clone(&heap), vec![0, 1], vec![filter]);
        let pool = ScratchPool::new();
        let mut row = Vec::new();
        let outcomes: Vec<_> = tuples(&heap)
            .iter()
            .map(|t| ctx.process(t, false, &mut row, &pool).unwrap())
            .collect();
        assert_eq!(outcomes, vec![RowOutcome::Filtered, RowOutcome::Accepted]);
    }
}
