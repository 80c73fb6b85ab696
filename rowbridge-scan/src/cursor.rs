//! Single-reader heap cursor: claim a block, walk its slots, fill a batch.

use std::sync::Arc;

use rowbridge_codec::{DecodeContext, ScratchPool};
use rowbridge_heap::{FIRST_OFFSET_NUMBER, ItemId, PageGuard};
use rowbridge_result::{Error, Result};
use rowbridge_types::{BlockNumber, Datum, OffsetNumber};
use tracing::trace;

use crate::batch::OutputBatch;
use crate::context::{RowOutcome, ScanContext};
use crate::global_state::{BlockClaimer, CancelToken};

/// Why [`BlockCursor::read_next`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorStatus {
    /// The batch reached capacity; the cursor may still hold a page.
    Full,
    /// No blocks remain for this cursor.
    Exhausted,
}

/// Reads claimed blocks in slot order and appends visible rows to a batch.
///
/// The cursor keeps its page pinned across calls when a batch fills in the
/// middle of a page. The pin is released when the page is done, when an
/// error unwinds the read, and when the cursor drops.
pub struct BlockCursor {
    context: Arc<ScanContext>,
    claimer: Arc<BlockClaimer>,
    cancel: CancelToken,
    current: Option<PageGuard>,
    next_offset: OffsetNumber,
    remaining: usize,
    all_visible: bool,
    scanned: u64,
    emitted: u64,
    row: Vec<Option<Datum>>,
}

impl BlockCursor {
    pub(crate) fn new(
        context: Arc<ScanContext>,
        claimer: Arc<BlockClaimer>,
        cancel: CancelToken,
    ) -> Self {
        let natts = context.natts();
        Self {
            context,
            claimer,
            cancel,
            current: None,
            next_offset: FIRST_OFFSET_NUMBER,
            remaining: 0,
            all_visible: false,
            scanned: 0,
            emitted: 0,
            row: Vec::with_capacity(natts),
        }
    }

    /// Visible rows examined so far, including rows rejected by filters.
    pub fn scanned(&self) -> u64 {
        self.scanned
    }

    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Block currently pinned by this cursor.
    pub fn current_block(&self) -> Option<BlockNumber> {
        self.current.as_ref().map(PageGuard::block)
    }

    /// Fill `batch` until it is full or no blocks remain.
    pub fn read_next(&mut self, batch: &mut OutputBatch, pool: &ScratchPool) -> Result<CursorStatus> {
        let result = self.fill(batch, pool);
        if result.is_err() {
            self.release();
        }
        result
    }

    /// Unpin the current page, if any.
    pub fn release(&mut self) {
        if let Some(guard) = self.current.take() {
            trace!(block = guard.block(), "cursor released page");
        }
        self.remaining = 0;
    }

    fn fill(&mut self, batch: &mut OutputBatch, pool: &ScratchPool) -> Result<CursorStatus> {
        loop {
            if batch.is_full() {
                return Ok(CursorStatus::Full);
            }
            if self.current.is_none() && !self.advance()? {
                return Ok(CursorStatus::Exhausted);
            }
            let Some(guard) = self.current.as_ref() else {
                continue;
            };
            let page = guard.page();
            while self.remaining > 0 && !batch.is_full() {
                let offset = self.next_offset;
                self.next_offset += 1;
                self.remaining -= 1;
                let Some(ItemId::Normal(tuple)) = page.item(offset) else {
                    continue;
                };
                match self
                    .context
                    .process(tuple, self.all_visible, &mut self.row, pool)?
                {
                    RowOutcome::Invisible => {}
                    RowOutcome::Filtered => self.scanned += 1,
                    RowOutcome::Accepted => {
                        self.scanned += 1;
                        let ctx = DecodeContext::new(self.context.relation.toast(), pool);
                        batch.append_row(&self.row, &ctx)?;
                        self.emitted += 1;
                    }
                }
            }
            if self.remaining == 0 {
                self.release();
            }
        }
    }

    /// Claim and pin the next block. Cancellation is honoured here, between
    /// pages.
    fn advance(&mut self) -> Result<bool> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let Some(block) = self.claimer.claim_next_block() else {
            return Ok(false);
        };
        let guard = self.context.relation.read_block(block)?;
        let page = guard.page();
        self.all_visible = page.all_visible;
        self.next_offset = FIRST_OFFSET_NUMBER;
        self.remaining = usize::from(page.max_offset());
        trace!(
            block,
            slots = self.remaining,
            all_visible = self.all_visible,
            "cursor pinned page"
        );
        self.current = Some(guard);
        Ok(true)
    }
}

impl std::fmt::Debug for BlockCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockCursor")
            .field("block", &self.current_block())
            .field("next_offset", &self.next_offset)
            .field("remaining", &self.remaining)
            .field("scanned", &self.scanned)
            .field("emitted", &self.emitted)
            .finish()
    }
}
