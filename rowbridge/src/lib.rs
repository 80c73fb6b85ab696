//! rowbridge: snapshot-consistent heap scans into Arrow record batches
//!
//! This crate is the entrypoint for the rowbridge workspace. It re-exports
//! the scan contract and the pieces an embedder needs to describe a relation
//! and its predicates.
//!
//! # Quick Start
//!
//! Scan an in-memory heap with a pushed-down filter:
//!
//! ```rust
//! use std::sync::Arc;
//! use rowbridge::heap::MemHeap;
//! use rowbridge::types::{ColumnDesc, Datum, RowType, TupleDesc};
//! use rowbridge::{CompareOp, Expr, Filter, ScanOptions, ScanPlan, ScanRequest};
//!
//! let heap = MemHeap::new(
//!     16_384,
//!     "public.events",
//!     TupleDesc::new(vec![ColumnDesc::new("id", RowType::Int8)]),
//! );
//! for id in 0..10 {
//!     heap.insert_frozen(vec![Some(Datum::from_i64(id))]).unwrap();
//! }
//! let snapshot = heap.txn_manager().read_snapshot();
//! let request = ScanRequest::new(Arc::new(heap), snapshot)
//!     .with_filter(Expr::Pred(Filter::compare(0, CompareOp::GtEq, 7)));
//! let plan = ScanPlan::bind(request, ScanOptions::default()).unwrap();
//! assert_eq!(plan.query_text(), r#"SELECT "id" FROM "public"."events" WHERE "id" >= 7"#);
//!
//! let batches = rowbridge::collect(&plan).unwrap();
//! assert_eq!(rowbridge::row_count(&batches), 3);
//! ```
//!
//! # Architecture
//!
//! - **Values** (`rowbridge-codec`): conversions between row-store datums and
//!   Arrow arrays, in both directions.
//! - **Predicates** (`rowbridge-expr`): pushed-down filter trees, their SQL
//!   rendering and their per-value evaluator.
//! - **Row store** (`rowbridge-heap`): the `HeapRelation` seam and an
//!   in-memory heap implementing it.
//! - **Scan** (`rowbridge-scan`): block claiming, cursors, the worker bridge
//!   and the engine-facing `ScanPlan`.

pub use rowbridge_scan::{
    BlockClaimer, BlockCursor, CancelToken, CursorStatus, GlobalScanState, LocalScanState,
    OutputBatch, ScanOptions, ScanPlan, ScanRequest, WorkerBridge, collect, execute, row_count,
};

pub use rowbridge_expr::{
    CompareOp, Expr, Filter, Literal, Operator, PatternKind, PatternTarget, Translation,
};

pub use rowbridge_result::{Error, Result};

pub mod codec {
    //! Value conversion between row-store datums and Arrow arrays.

    pub use rowbridge_codec::*;
}

pub mod heap {
    //! Row-store access: the relation seam and the in-memory heap.

    pub use rowbridge_heap::*;
}

pub mod types {
    //! Identifiers, row-store types, datums and snapshots.

    pub use rowbridge_types::*;
}
