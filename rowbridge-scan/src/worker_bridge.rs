//! Parallel worker bridge.
//!
//! Worker threads run the claim/read/visibility loop over ranges of
//! [`WORKER_SCAN_BLOCK`] blocks and hand back deformed, filtered row-store
//! tuples through one bounded queue each. Columnar conversion stays with the
//! scan's local readers, which pull chunks from the bridge.
//!
//! Each queue ends with a [`WorkerMessage::Done`] sentinel. A queue that
//! disconnects without one means its worker died, which fails the scan
//! instead of losing rows.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel as xchan;
use rowbridge_codec::ScratchPool;
use rowbridge_heap::{FIRST_OFFSET_NUMBER, ItemId};
use rowbridge_result::{Error, Result};
use rowbridge_types::{Datum, WORKER_SCAN_BLOCK};
use tracing::{debug, trace, warn};

use crate::context::{RowOutcome, ScanContext};
use crate::global_state::{BlockClaimer, CancelToken};

/// A deformed row-store tuple, indexed by attribute number.
pub type NativeTuple = Vec<Option<Datum>>;

/// How long the orchestrator sleeps on empty queues before rechecking
/// cancellation.
const WAIT_INTERVAL: Duration = Duration::from_millis(50);

/// Message from a worker to the orchestrator.
#[derive(Debug)]
pub enum WorkerMessage {
    Tuples(Vec<NativeTuple>),
    /// The worker claimed no further blocks; `scanned` counts visible rows it
    /// examined.
    Done { scanned: u64 },
    Failed(Error),
}

struct WorkerQueue {
    worker: usize,
    rx: xchan::Receiver<WorkerMessage>,
}

/// Orchestrator side of the bridge.
pub struct WorkerBridge {
    queues: Vec<WorkerQueue>,
    handles: Vec<JoinHandle<()>>,
    next: usize,
    cancel: CancelToken,
    stop: CancelToken,
    scanned: u64,
    failed: bool,
}

impl WorkerBridge {
    /// Start `workers` threads over the blocks left in `claimer`.
    pub(crate) fn launch(
        context: Arc<ScanContext>,
        claimer: Arc<BlockClaimer>,
        cancel: CancelToken,
        workers: usize,
        queue_depth: usize,
        chunk_rows: usize,
    ) -> Result<Self> {
        let mut bridge = WorkerBridge {
            queues: Vec::with_capacity(workers),
            handles: Vec::with_capacity(workers),
            next: 0,
            cancel,
            stop: CancelToken::new(),
            scanned: 0,
            failed: false,
        };
        for worker in 0..workers.max(1) {
            let (tx, rx) = xchan::bounded(queue_depth.max(1));
            let job = WorkerJob {
                worker,
                context: Arc::clone(&context),
                claimer: Arc::clone(&claimer),
                cancel: bridge.cancel.clone(),
                stop: bridge.stop.clone(),
                chunk_rows: chunk_rows.max(1),
            };
            // On a spawn failure `bridge` drops here and joins what started.
            let handle = thread::Builder::new()
                .name(format!("rowbridge-worker-{worker}"))
                .spawn(move || job.run(tx))?;
            bridge.queues.push(WorkerQueue { worker, rx });
            bridge.handles.push(handle);
        }
        debug!(
            relation = context.relation.name(),
            workers = bridge.queues.len(),
            "launched scan workers"
        );
        Ok(bridge)
    }

    /// Workers whose queue is still open.
    pub fn live_workers(&self) -> usize {
        self.queues.len()
    }

    /// Next chunk of tuples from any worker, or `None` once every worker
    /// has finished.
    ///
    /// Live queues are polled round-robin. When all of them are empty the
    /// call blocks until one becomes ready, waking periodically to check for
    /// cancellation.
    pub fn next_chunk(&mut self) -> Result<Option<Vec<NativeTuple>>> {
        if self.failed {
            return Err(Error::Internal("worker bridge already failed".into()));
        }
        loop {
            if self.cancel.is_cancelled() {
                self.shutdown();
                return Err(Error::Cancelled);
            }
            let mut polled = 0;
            while polled < self.queues.len() {
                let idx = self.next % self.queues.len();
                match self.queues[idx].rx.try_recv() {
                    Ok(WorkerMessage::Tuples(rows)) => {
                        self.next = idx + 1;
                        trace!(worker = self.queues[idx].worker, rows = rows.len(), "worker chunk");
                        return Ok(Some(rows));
                    }
                    Ok(WorkerMessage::Done { scanned }) => {
                        let queue = self.queues.remove(idx);
                        self.scanned += scanned;
                        debug!(worker = queue.worker, scanned, "worker finished");
                    }
                    Ok(WorkerMessage::Failed(err)) => {
                        let queue = self.queues.remove(idx);
                        return Err(self.fail(queue.worker, err));
                    }
                    Err(xchan::TryRecvError::Empty) => {
                        self.next = idx + 1;
                        polled += 1;
                    }
                    Err(xchan::TryRecvError::Disconnected) => {
                        let queue = self.queues.remove(idx);
                        let err = Error::Internal(format!(
                            "scan worker {} exited without finishing",
                            queue.worker
                        ));
                        return Err(self.fail(queue.worker, err));
                    }
                }
            }
            if self.queues.is_empty() {
                self.join_workers();
                return Ok(None);
            }
            let mut select = xchan::Select::new();
            for queue in &self.queues {
                select.recv(&queue.rx);
            }
            // Readiness only; the message is taken by the next polling pass.
            let _ = select.ready_timeout(WAIT_INTERVAL);
        }
    }

    /// Rows examined by workers that have finished, reset on read.
    pub fn take_scanned(&mut self) -> u64 {
        std::mem::take(&mut self.scanned)
    }

    /// Stop every worker, drop their queues and join them.
    pub fn shutdown(&mut self) {
        if self.handles.is_empty() && self.queues.is_empty() {
            return;
        }
        self.stop.cancel();
        // Dropping the receivers wakes workers blocked on a full queue.
        self.queues.clear();
        self.join_workers();
    }

    fn fail(&mut self, worker: usize, err: Error) -> Error {
        if err.is_cancellation() {
            debug!(worker, "worker observed cancellation");
        } else {
            warn!(worker, error = %err, "scan worker failed");
        }
        self.failed = true;
        self.shutdown();
        err
    }

    fn join_workers(&mut self) {
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                warn!("scan worker panicked");
            }
        }
    }
}

impl Drop for WorkerBridge {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for WorkerBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerBridge")
            .field("live_workers", &self.queues.len())
            .field("threads", &self.handles.len())
            .field("failed", &self.failed)
            .finish()
    }
}

/// Everything one worker thread owns.
struct WorkerJob {
    worker: usize,
    context: Arc<ScanContext>,
    claimer: Arc<BlockClaimer>,
    cancel: CancelToken,
    stop: CancelToken,
    chunk_rows: usize,
}

impl WorkerJob {
    fn run(self, tx: xchan::Sender<WorkerMessage>) {
        let message = match self.scan(&tx) {
            Ok(scanned) => WorkerMessage::Done { scanned },
            Err(err) => WorkerMessage::Failed(err),
        };
        // The orchestrator may already be gone.
        let _ = tx.send(message);
    }

    fn stopped(&self) -> bool {
        self.cancel.is_cancelled() || self.stop.is_cancelled()
    }

    fn scan(&self, tx: &xchan::Sender<WorkerMessage>) -> Result<u64> {
        let ctx = &self.context;
        let count_only = ctx.count_only();
        let mut pool = ScratchPool::new();
        let mut row = Vec::with_capacity(ctx.natts());
        let mut chunk: Vec<NativeTuple> = Vec::with_capacity(self.chunk_rows);
        let mut scanned = 0u64;

        while let Some(range) = self.claimer.claim_block_range(WORKER_SCAN_BLOCK) {
            for block in range {
                if self.stopped() {
                    return Err(Error::Cancelled);
                }
                {
                    let guard = ctx.relation.read_block(block)?;
                    let page = guard.page();
                    for offset in FIRST_OFFSET_NUMBER..=page.max_offset() {
                        let Some(ItemId::Normal(tuple)) = page.item(offset) else {
                            continue;
                        };
                        match ctx.process(tuple, page.all_visible, &mut row, &pool)? {
                            RowOutcome::Invisible => {}
                            RowOutcome::Filtered => scanned += 1,
                            RowOutcome::Accepted => {
                                scanned += 1;
                                if count_only {
                                    chunk.push(Vec::new());
                                } else {
                                    chunk.push(std::mem::replace(
                                        &mut row,
                                        Vec::with_capacity(ctx.natts()),
                                    ));
                                }
                            }
                        }
                    }
                }
                pool.reset();
                if chunk.len() >= self.chunk_rows {
                    self.send(tx, &mut chunk)?;
                }
            }
        }
        if !chunk.is_empty() {
            self.send(tx, &mut chunk)?;
        }
        Ok(scanned)
    }

    /// Pages are unpinned before a send can block on a full queue.
    fn send(&self, tx: &xchan::Sender<WorkerMessage>, chunk: &mut Vec<NativeTuple>) -> Result<()> {
        let rows = std::mem::replace(chunk, Vec::with_capacity(self.chunk_rows));
        trace!(worker = self.worker, rows = rows.len(), "sending chunk");
        tx.send(WorkerMessage::Tuples(rows))
            .map_err(|_| Error::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowbridge_heap::HeapRelation;
    use rowbridge_test_utils::{Fixture, HeapFixture, init_tracing_for_tests};

    fn launch(fixture: &Fixture, workers: usize, depth: usize) -> WorkerBridge {
        let heap = Arc::clone(&fixture.heap);
        let snapshot = heap.txn_manager().read_snapshot();
        let claimer = Arc::new(BlockClaimer::new(heap.nblocks()));
        let context = Arc::new(ScanContext {
            relation: heap,
            snapshot,
            needed_columns: vec![0],
            output_columns: vec![0],
            filters: vec![],
        });
        WorkerBridge::launch(context, claimer, CancelToken::new(), workers, depth, 40).unwrap()
    }

    fn id_of(row: &NativeTuple) -> i32 {
        row[0].as_ref().unwrap().as_i32().unwrap()
    }

    #[test]
    fn every_visible_row_arrives_once() {
        init_tracing_for_tests();
        let fixture = HeapFixture::new(3_000)
            .tuples_per_page(20)
            .aborted_every(7)
            .deleted_every(11)
            .dead_every(5)
            .build();
        let mut bridge = launch(&fixture, 3, 1);
        let mut ids = Vec::new();
        while let Some(rows) = bridge.next_chunk().unwrap() {
            ids.extend(rows.iter().map(id_of));
        }
        ids.sort_unstable();
        let mut expected = fixture.visible_ids.clone();
        expected.sort_unstable();
        assert_eq!(ids, expected);
        assert_eq!(bridge.take_scanned(), expected.len() as u64);
        assert_eq!(bridge.live_workers(), 0);
        assert!(bridge.handles.is_empty());
        assert_eq!(fixture.heap.outstanding_pins(), 0);
    }

    #[test]
    fn worker_read_failure_fails_the_bridge() {
        let fixture = HeapFixture::new(2_000).tuples_per_page(10).build();
        fixture.heap.inject_read_failure(Some(150));
        let mut bridge = launch(&fixture, 2, 2);
        let err = loop {
            match bridge.next_chunk() {
                Ok(Some(_)) => {}
                Ok(None) => panic!("failure was swallowed"),
                Err(err) => break err,
            }
        };
        assert!(matches!(err, Error::Io(_)), "{err}");
        assert!(bridge.handles.is_empty());
        assert_eq!(fixture.heap.outstanding_pins(), 0);
        assert!(bridge.next_chunk().is_err());
    }

    #[test]
    fn cancellation_stops_and_joins_workers() {
        let fixture = HeapFixture::new(5_000).tuples_per_page(10).build();
        let mut bridge = launch(&fixture, 4, 1);
        assert!(bridge.next_chunk().unwrap().is_some());
        bridge.cancel.cancel();
        let err = bridge.next_chunk().unwrap_err();
        assert!(err.is_cancellation());
        assert!(bridge.handles.is_empty());
        assert_eq!(bridge.live_workers(), 0);
        assert_eq!(fixture.heap.outstanding_pins(), 0);
    }

    #[test]
    fn dropping_an_undrained_bridge_joins_workers() {
        let fixture = HeapFixture::new(5_000).tuples_per_page(10).build();
        let bridge = launch(&fixture, 4, 1);
        drop(bridge);
        assert_eq!(fixture.heap.outstanding_pins(), 0);
    }
}
