//! State shared by every reader of one scan execution.

use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use rowbridge_types::BlockNumber;
use tracing::{debug, info};

use crate::context::ScanContext;
use crate::worker_bridge::WorkerBridge;

/// Cooperative cancellation flag shared by readers and workers.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Hands out block numbers in `[0, nblocks)` exactly once.
///
/// The block count is fixed when the claimer is created; blocks appended to
/// the relation afterwards are not part of this scan.
#[derive(Debug)]
pub struct BlockClaimer {
    nblocks: BlockNumber,
    next: Mutex<BlockNumber>,
}

impl BlockClaimer {
    pub fn new(nblocks: BlockNumber) -> Self {
        Self {
            nblocks,
            next: Mutex::new(0),
        }
    }

    #[inline]
    pub fn nblocks(&self) -> BlockNumber {
        self.nblocks
    }

    /// Next unclaimed block, or `None` once every block has been handed out.
    pub fn claim_next_block(&self) -> Option<BlockNumber> {
        let mut next = self.next.lock().expect("block counter lock poisoned");
        if *next == self.nblocks {
            return None;
        }
        let block = *next;
        *next += 1;
        debug!(block, "claimed block");
        Some(block)
    }

    /// Claim up to `n` consecutive blocks.
    pub fn claim_block_range(&self, n: BlockNumber) -> Option<Range<BlockNumber>> {
        let mut next = self.next.lock().expect("block counter lock poisoned");
        if *next == self.nblocks {
            return None;
        }
        let start = *next;
        let end = start.saturating_add(n.max(1)).min(self.nblocks);
        *next = end;
        debug!(start, end, "claimed block range");
        Some(start..end)
    }
}

#[derive(Debug, Default)]
struct Counters {
    total_scanned: u64,
    total_emitted: u64,
    active_readers: usize,
}

/// Global state of one scan execution.
pub struct GlobalScanState {
    context: Arc<ScanContext>,
    claimer: Arc<BlockClaimer>,
    counters: Mutex<Counters>,
    query_text: String,
    max_threads: usize,
    cancel: CancelToken,
    bridge: Option<Mutex<WorkerBridge>>,
}

impl GlobalScanState {
    pub(crate) fn new(
        context: Arc<ScanContext>,
        claimer: Arc<BlockClaimer>,
        query_text: String,
        max_threads: usize,
        cancel: CancelToken,
        bridge: Option<WorkerBridge>,
    ) -> Self {
        Self {
            context,
            claimer,
            counters: Mutex::new(Counters::default()),
            query_text,
            max_threads: max_threads.max(1),
            cancel,
            bridge: bridge.map(Mutex::new),
        }
    }

    pub fn claim_next_block(&self) -> Option<BlockNumber> {
        self.claimer.claim_next_block()
    }

    pub fn nblocks(&self) -> BlockNumber {
        self.claimer.nblocks()
    }

    /// Delegated query text for this scan.
    pub fn query_text(&self) -> &str {
        &self.query_text
    }

    /// Threads the engine may run local readers on.
    pub fn max_threads(&self) -> usize {
        self.max_threads
    }

    /// Request cancellation of every reader and worker of this scan.
    pub fn cancel(&self) {
        debug!("scan cancellation requested");
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn total_scanned(&self) -> u64 {
        self.counters().total_scanned
    }

    pub fn total_emitted(&self) -> u64 {
        self.counters().total_emitted
    }

    pub fn active_readers(&self) -> usize {
        self.counters().active_readers
    }

    /// Whether rows come from worker threads instead of block cursors.
    pub fn uses_worker_bridge(&self) -> bool {
        self.bridge.is_some()
    }

    pub(crate) fn context(&self) -> &Arc<ScanContext> {
        &self.context
    }

    pub(crate) fn claimer(&self) -> Arc<BlockClaimer> {
        Arc::clone(&self.claimer)
    }

    pub(crate) fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub(crate) fn bridge(&self) -> Option<MutexGuard<'_, WorkerBridge>> {
        self.bridge
            .as_ref()
            .map(|b| b.lock().expect("worker bridge lock poisoned"))
    }

    pub(crate) fn register_reader(&self) {
        self.counters().active_readers += 1;
    }

    /// Merge one reader's counts. Readers register lazily, so a reader
    /// leaving with none active does not mean the scan is over; the totals
    /// are logged when the state itself is dropped.
    pub(crate) fn finish_reader(&self, scanned: u64, emitted: u64) {
        let mut counters = self.counters();
        counters.total_scanned += scanned;
        counters.total_emitted += emitted;
        counters.active_readers = counters.active_readers.saturating_sub(1);
        debug!(scanned, emitted, active = counters.active_readers, "reader finished");
    }

    fn counters(&self) -> MutexGuard<'_, Counters> {
        self.counters.lock().expect("scan counters lock poisoned")
    }
}

impl Drop for GlobalScanState {
    fn drop(&mut self) {
        let counters = self
            .counters
            .get_mut()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        info!(
            relation = self.context.relation.name(),
            scanned = counters.total_scanned,
            emitted = counters.total_emitted,
            cancelled = self.cancel.is_cancelled(),
            "scan finished"
        );
    }
}

impl std::fmt::Debug for GlobalScanState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalScanState")
            .field("nblocks", &self.claimer.nblocks())
            .field("query_text", &self.query_text)
            .field("max_threads", &self.max_threads)
            .field("worker_bridge", &self.bridge.is_some())
            .finish()
    }
}
