//! Block-claiming heap scans that produce Arrow record batches.
//!
//! A scan is bound once ([`ScanPlan::bind`]), started once per execution
//! ([`ScanPlan::init_global`]) and then read by any number of local states,
//! one per engine thread. Readers claim heap blocks from a shared counter so
//! that every block is read exactly once; within one reader rows come out in
//! physical page and slot order.
//!
//! Large scans may instead run through the [`WorkerBridge`]: worker threads
//! read and filter pages and hand row-store tuples to the local states,
//! which only convert them to columnar form.

pub mod batch;
mod context;
pub mod cursor;
pub mod driver;
pub mod global_state;
pub mod options;
pub mod plan;
pub mod worker_bridge;

pub use batch::OutputBatch;
pub use cursor::{BlockCursor, CursorStatus};
pub use driver::{collect, execute, row_count};
pub use global_state::{BlockClaimer, CancelToken, GlobalScanState};
pub use options::{MAX_WORKERS_ENV, ScanOptions};
pub use plan::{LocalScanState, ScanPlan, ScanRequest};
pub use worker_bridge::{NativeTuple, WorkerBridge, WorkerMessage};
