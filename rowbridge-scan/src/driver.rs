//! Helpers that run a bound scan to completion.
//!
//! An engine normally drives [`ScanPlan`] itself. These drivers do the same
//! for embedders and tests: one local state per reader, each pulled until
//! exhausted.

use std::sync::Arc;

use arrow::record_batch::RecordBatch;
use rayon::prelude::*;
use rowbridge_result::{Error, Result};

use crate::global_state::GlobalScanState;
use crate::plan::ScanPlan;

/// Run the scan on the calling thread with a single reader.
pub fn collect(plan: &ScanPlan) -> Result<Vec<RecordBatch>> {
    let global = plan.init_global()?;
    run_reader(plan, &global)
}

/// Run the scan with `global.max_threads()` readers on a dedicated rayon
/// pool. Batches from different readers are concatenated in reader order,
/// which says nothing about storage order.
pub fn execute(plan: &ScanPlan) -> Result<Vec<RecordBatch>> {
    let global = plan.init_global()?;
    let readers = global.max_threads();
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(readers)
        .thread_name(|i| format!("rowbridge-reader-{i}"))
        .build()
        .map_err(|e| Error::Internal(format!("failed to build reader pool: {e}")))?;
    let per_reader: Vec<Result<Vec<RecordBatch>>> = pool.install(|| {
        (0..readers)
            .into_par_iter()
            .map(|_| run_reader(plan, &global))
            .collect()
    });
    let mut batches = Vec::new();
    for result in per_reader {
        batches.extend(result?);
    }
    Ok(batches)
}

fn run_reader(plan: &ScanPlan, global: &Arc<GlobalScanState>) -> Result<Vec<RecordBatch>> {
    let mut local = plan.init_local(global)?;
    let mut batches = Vec::new();
    while let Some(batch) = plan.produce(&mut local)? {
        batches.push(batch);
    }
    Ok(batches)
}

/// Total rows across `batches`.
pub fn row_count(batches: &[RecordBatch]) -> usize {
    batches.iter().map(RecordBatch::num_rows).sum()
}
