//! Heap fixtures spanning many blocks with every slot kind the scan must
//! step over.

use std::sync::Arc;

use rowbridge_codec::numeric::NumericVar;
use rowbridge_codec::varlena::{make_compressed_varlena, make_varlena};
use rowbridge_codec::CompressionMethod;
use rowbridge_heap::MemHeap;
use rowbridge_types::{BlockNumber, ColumnDesc, Datum, ItemPointer, RowType, TupleDesc};

/// `id int4, label text, amount numeric(12,2), born date`.
pub fn fixture_desc() -> TupleDesc {
    TupleDesc::new(vec![
        ColumnDesc::new("id", RowType::Int4),
        ColumnDesc::new("label", RowType::Text),
        ColumnDesc::new("amount", RowType::numeric(12, 2)),
        ColumnDesc::new("born", RowType::Date),
    ])
}

/// Label stored for row `id`; long labels are toasted or compressed.
pub fn fixture_label(id: i32, long: bool) -> String {
    if long {
        format!("{id}:{}", "long label ".repeat(200))
    } else {
        format!("row-{id}")
    }
}

/// Amount stored for row `id`, scaled by 100.
pub fn fixture_amount(id: i32) -> i128 {
    i128::from(id) * 125 - 5_000
}

/// A populated heap and the ids a fresh snapshot must see.
#[derive(Debug, Clone)]
pub struct Fixture {
    pub heap: Arc<MemHeap>,
    /// Ids of visible rows in physical order.
    pub visible_ids: Vec<i32>,
    /// Ids whose label is stored long (toasted or compressed).
    pub long_ids: Vec<i32>,
}

/// Builder for [`Fixture`].
#[derive(Debug, Clone)]
pub struct HeapFixture {
    rows: usize,
    tuples_per_page: usize,
    aborted_every: usize,
    deleted_every: usize,
    dead_every: usize,
    long_every: usize,
    null_label_every: usize,
    all_visible: bool,
}

impl Default for HeapFixture {
    fn default() -> Self {
        Self {
            rows: 1000,
            tuples_per_page: 32,
            aborted_every: 0,
            deleted_every: 0,
            dead_every: 0,
            long_every: 0,
            null_label_every: 0,
            all_visible: false,
        }
    }
}

impl HeapFixture {
    pub fn new(rows: usize) -> Self {
        Self {
            rows,
            ..Self::default()
        }
    }

    pub fn tuples_per_page(mut self, n: usize) -> Self {
        self.tuples_per_page = n;
        self
    }

    /// Every `n`th row is inserted by a transaction that rolls back.
    pub fn aborted_every(mut self, n: usize) -> Self {
        self.aborted_every = n;
        self
    }

    /// Every `n`th row is deleted by a committed transaction.
    pub fn deleted_every(mut self, n: usize) -> Self {
        self.deleted_every = n;
        self
    }

    /// After every `n`th row a dead, a redirect and an unused slot follow.
    pub fn dead_every(mut self, n: usize) -> Self {
        self.dead_every = n;
        self
    }

    /// Every `n`th row gets a long label, alternating between out-of-line
    /// (plain, pglz, lz4) and inline compressed storage.
    pub fn long_every(mut self, n: usize) -> Self {
        self.long_every = n;
        self
    }

    pub fn null_label_every(mut self, n: usize) -> Self {
        self.null_label_every = n;
        self
    }

    /// Set the all-visible flag on blocks whose tuples are all visible.
    pub fn all_visible(mut self, on: bool) -> Self {
        self.all_visible = on;
        self
    }

    pub fn build(self) -> Fixture {
        let heap = MemHeap::new(16_384, "public.fixture", fixture_desc())
            .with_tuples_per_page(self.tuples_per_page);
        let every = |n: usize, i: usize| n > 0 && i % n == n - 1;

        let writer = heap.txn_manager().begin();
        let aborted = heap.txn_manager().begin();
        let deleter = heap.txn_manager().begin();

        let mut visible_ids = Vec::with_capacity(self.rows);
        let mut long_ids = Vec::new();
        let mut hidden_blocks: Vec<BlockNumber> = Vec::new();
        let mut deleted: Vec<ItemPointer> = Vec::new();

        for i in 0..self.rows {
            let id = i as i32;
            let long = every(self.long_every, i);
            let label = if every(self.null_label_every, i) {
                None
            } else if long {
                long_ids.push(id);
                let text = fixture_label(id, true);
                Some(match (i / self.long_every.max(1)) % 4 {
                    0 => heap.toast_value(text.as_bytes(), None),
                    1 => heap.toast_value(text.as_bytes(), Some(CompressionMethod::Pglz)),
                    2 => heap.toast_value(text.as_bytes(), Some(CompressionMethod::Lz4)),
                    _ => Datum::from_bytes(make_compressed_varlena(
                        text.as_bytes(),
                        CompressionMethod::Pglz,
                    )),
                })
            } else {
                Some(Datum::from_bytes(make_varlena(fixture_label(id, false).as_bytes())))
            };
            let amount = NumericVar::from_scaled_i128(fixture_amount(id), 2)
                .to_bytes()
                .map(|b| Datum::from_bytes(make_varlena(&b)))
                .ok();
            let values = vec![
                Some(Datum::from_i32(id)),
                label,
                amount,
                Some(Datum::from_i32(id - 500)),
            ];

            let is_aborted = every(self.aborted_every, i);
            let txn = if is_aborted { aborted.txn_id } else { writer.txn_id };
            let Ok(tid) = heap.insert(txn, values) else {
                continue;
            };
            if is_aborted {
                hidden_blocks.push(tid.block);
            } else if every(self.deleted_every, i) {
                deleted.push(tid);
                hidden_blocks.push(tid.block);
            } else {
                visible_ids.push(id);
            }

            if every(self.dead_every, i) {
                if let Ok(dead) = heap.insert(writer.txn_id, vec![Some(Datum::from_i32(-1))]) {
                    let _ = heap.kill(dead);
                    if let Ok(root) = heap.insert(writer.txn_id, vec![Some(Datum::from_i32(-2))]) {
                        let _ = heap.redirect(root, dead.offset);
                    }
                }
                heap.add_unused_slot();
            }
        }

        for tid in deleted {
            let _ = heap.delete(deleter.txn_id, tid);
        }
        heap.txn_manager().commit(writer.txn_id);
        heap.txn_manager().abort(aborted.txn_id);
        heap.txn_manager().commit(deleter.txn_id);

        if self.all_visible {
            use rowbridge_heap::HeapRelation;
            for block in 0..heap.nblocks() {
                if !hidden_blocks.contains(&block) {
                    let _ = heap.set_all_visible(block, true);
                }
            }
        }

        Fixture {
            heap: Arc::new(heap),
            visible_ids,
            long_ids,
        }
    }
}
