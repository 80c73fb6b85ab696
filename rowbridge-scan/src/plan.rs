//! Bind-time scan descriptor and the engine-facing scan contract.
//!
//! The engine drives a scan in four steps: [`ScanPlan::bind`] once,
//! [`ScanPlan::init_global`] once per execution, [`ScanPlan::init_local`]
//! once per execution thread, then [`ScanPlan::produce`] on each local state
//! until it returns `None`.

use std::sync::Arc;

use arrow::datatypes::{Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use rowbridge_codec::{ColumnKind, DecodeContext, MappingOptions, ScratchPool, bind_column};
use rowbridge_expr::sql::quote_ident;
use rowbridge_expr::{Expr, Translation, compile, translate};
use rowbridge_heap::HeapRelation;
use rowbridge_result::{Error, Result};
use rowbridge_types::{COUNT_STAR_COLUMN, Snapshot};
use tracing::{debug, info};

use crate::batch::OutputBatch;
use crate::context::ScanContext;
use crate::cursor::{BlockCursor, CursorStatus};
use crate::global_state::{BlockClaimer, CancelToken, GlobalScanState};
use crate::options::ScanOptions;
use crate::worker_bridge::{NativeTuple, WorkerBridge};

/// What the engine asks to read.
#[derive(Clone)]
pub struct ScanRequest {
    pub relation: Arc<dyn HeapRelation>,
    pub snapshot: Snapshot,
    /// Output columns by descriptor index, in output order. Empty, or the
    /// single entry [`COUNT_STAR_COLUMN`], requests a row count only.
    pub projection: Vec<u64>,
    /// Top-level filters, all of which must hold.
    pub filters: Vec<Expr>,
}

impl ScanRequest {
    /// Request for every column of `relation`.
    pub fn new(relation: Arc<dyn HeapRelation>, snapshot: Snapshot) -> Self {
        let projection = (0..relation.tuple_desc().natts() as u64).collect();
        Self {
            relation,
            snapshot,
            projection,
            filters: Vec::new(),
        }
    }

    pub fn with_projection(mut self, projection: Vec<u64>) -> Self {
        self.projection = projection;
        self
    }

    pub fn with_filter(mut self, filter: Expr) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn count_only(self) -> Self {
        self.with_projection(vec![COUNT_STAR_COLUMN])
    }

    pub fn is_count_only(&self) -> bool {
        self.projection.is_empty() || self.projection == [COUNT_STAR_COLUMN]
    }
}

impl std::fmt::Debug for ScanRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanRequest")
            .field("relation", &self.relation.name())
            .field("snapshot", &self.snapshot)
            .field("projection", &self.projection)
            .field("filters", &self.filters)
            .finish()
    }
}

/// A bound scan: output schema, compiled filters and generated query text.
#[derive(Debug)]
pub struct ScanPlan {
    context: Arc<ScanContext>,
    schema: SchemaRef,
    kinds: Vec<ColumnKind>,
    options: ScanOptions,
    query_text: String,
    requires_recheck: bool,
}

impl ScanPlan {
    /// Resolve column types and filters. Fails before any page is read when
    /// a projected column has no columnar type.
    pub fn bind(request: ScanRequest, options: ScanOptions) -> Result<Self> {
        let relation = request.relation;
        let desc = relation.tuple_desc();
        let natts = desc.natts();
        let count_only = request.projection.is_empty() || request.projection == [COUNT_STAR_COLUMN];

        let mut output_columns = Vec::new();
        if !count_only {
            output_columns.reserve(request.projection.len());
            for &p in &request.projection {
                let column = usize::try_from(p)
                    .ok()
                    .filter(|&c| c < natts)
                    .ok_or_else(|| {
                        Error::InvalidArgumentError(format!(
                            "projection index {p} out of range for {} ({natts} columns)",
                            relation.name()
                        ))
                    })?;
                output_columns.push(column);
            }
        }

        let mapping = MappingOptions {
            convert_unsupported_numeric_to_double: options.convert_unsupported_numeric_to_double,
        };
        let mut kinds = Vec::with_capacity(output_columns.len());
        let mut fields = Vec::with_capacity(output_columns.len());
        for &column in &output_columns {
            let desc_column = &desc.columns()[column];
            let kind = bind_column(desc_column, relation.enums(), &mapping)?;
            fields.push(kind.field(&desc_column.name));
            kinds.push(kind);
        }

        let mut filters = Vec::new();
        let mut filter_columns = Vec::new();
        let mut where_parts = Vec::new();
        let mut requires_recheck = false;
        let mut text_complete = true;
        for expr in &request.filters {
            let columns = expr.columns();
            if let Some(&bad) = columns.iter().find(|&&c| c >= natts) {
                return Err(Error::InvalidArgumentError(format!(
                    "filter references column {bad} of {} ({natts} columns)",
                    relation.name()
                )));
            }
            match compile(expr, desc) {
                Translation::Pushed(filter) => {
                    filters.push(filter);
                    filter_columns.extend(columns);
                }
                Translation::Dropped => {}
                Translation::Unsupported(reason) => {
                    debug!(%reason, "filter left for downstream recheck");
                    requires_recheck = true;
                }
            }
            match translate(expr, desc) {
                Translation::Pushed(sql) => where_parts.push(sql),
                Translation::Dropped => {}
                Translation::Unsupported(_) => text_complete = false,
            }
        }
        if !text_complete {
            requires_recheck = true;
            where_parts.clear();
        }

        let mut needed_columns = output_columns.clone();
        needed_columns.extend(filter_columns);
        needed_columns.sort_unstable();
        needed_columns.dedup();

        let query_text = query_text(relation.name(), desc, &output_columns, &where_parts);
        info!(
            relation = relation.name(),
            columns = output_columns.len(),
            filters = filters.len(),
            count_only,
            requires_recheck,
            "bound scan"
        );

        let context = Arc::new(ScanContext {
            relation,
            snapshot: request.snapshot,
            needed_columns,
            output_columns,
            filters,
        });
        Ok(Self {
            context,
            schema: Arc::new(Schema::new(fields)),
            kinds,
            options,
            query_text,
            requires_recheck,
        })
    }

    pub fn schema(&self) -> SchemaRef {
        Arc::clone(&self.schema)
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    pub fn is_count_only(&self) -> bool {
        self.context.count_only()
    }

    /// Delegated sub-query equivalent to this scan.
    pub fn query_text(&self) -> &str {
        &self.query_text
    }

    /// Whether some filter could not be applied here and the engine must
    /// re-evaluate it on the output.
    pub fn requires_recheck(&self) -> bool {
        self.requires_recheck
    }

    /// Estimated tuple count from the relation's statistics.
    pub fn cardinality(&self) -> u64 {
        let relation = &self.context.relation;
        let estimate = relation.tuples_per_block() * f64::from(relation.nblocks());
        if estimate.is_finite() && estimate > 0.0 {
            estimate.round() as u64
        } else {
            0
        }
    }

    /// Bridge workers this scan would use.
    pub fn worker_count(&self) -> usize {
        self.options.worker_count(self.cardinality())
    }

    /// Create the shared state of one execution. The block count is fixed
    /// here; the worker bridge, when used, starts here too.
    pub fn init_global(&self) -> Result<Arc<GlobalScanState>> {
        let relation = &self.context.relation;
        let nblocks = relation.nblocks();
        let claimer = Arc::new(BlockClaimer::new(nblocks));
        let cancel = CancelToken::new();
        let workers = self.worker_count();
        let bridged = self.options.use_worker_bridge
            && workers > 1
            && nblocks > 0
            && nblocks >= self.options.parallel_block_threshold;
        let bridge = if bridged {
            Some(WorkerBridge::launch(
                Arc::clone(&self.context),
                Arc::clone(&claimer),
                cancel.clone(),
                workers,
                self.options.worker_queue_depth,
                self.options.batch_capacity,
            )?)
        } else {
            None
        };
        info!(
            relation = relation.name(),
            nblocks,
            workers = if bridged { workers } else { 0 },
            "scan started"
        );
        Ok(Arc::new(GlobalScanState::new(
            Arc::clone(&self.context),
            claimer,
            self.query_text.clone(),
            self.options.max_threads,
            cancel,
            bridge,
        )))
    }

    /// Create the state of one execution thread.
    pub fn init_local(&self, global: &Arc<GlobalScanState>) -> Result<LocalScanState> {
        let batch = OutputBatch::new(
            self.schema(),
            &self.kinds,
            self.context.output_columns.clone(),
            self.options.batch_capacity,
        )?;
        global.register_reader();
        let cursor = BlockCursor::new(
            Arc::clone(global.context()),
            global.claimer(),
            global.cancel_token().clone(),
        );
        Ok(LocalScanState {
            global: Arc::clone(global),
            cursor,
            batch,
            pool: ScratchPool::new(),
            pending: Vec::new().into_iter(),
            bridge_scanned: 0,
            bridge_emitted: 0,
            finished: false,
        })
    }

    /// Fill the next batch of `local`.
    pub fn produce(&self, local: &mut LocalScanState) -> Result<Option<RecordBatch>> {
        local.produce()
    }
}

/// Per-thread scan state.
///
/// Dropping an unfinished local state releases its page pin and merges its
/// counts into the global state.
#[derive(Debug)]
pub struct LocalScanState {
    global: Arc<GlobalScanState>,
    cursor: BlockCursor,
    batch: OutputBatch,
    pool: ScratchPool,
    pending: std::vec::IntoIter<NativeTuple>,
    bridge_scanned: u64,
    bridge_emitted: u64,
    finished: bool,
}

impl LocalScanState {
    /// Next full batch, the final partial batch, or `None` when exhausted.
    ///
    /// On error or cancellation the partially filled batch is discarded.
    pub fn produce(&mut self) -> Result<Option<RecordBatch>> {
        if self.finished {
            return Ok(None);
        }
        match self.fill_batch() {
            Ok(batch) => Ok(batch),
            Err(err) => {
                self.batch.discard();
                self.pool.reset();
                if !err.is_cancellation() {
                    self.global.cancel();
                }
                self.finish();
                Err(err)
            }
        }
    }

    pub fn global(&self) -> &Arc<GlobalScanState> {
        &self.global
    }

    fn fill_batch(&mut self) -> Result<Option<RecordBatch>> {
        let status = if self.global.uses_worker_bridge() {
            self.fill_from_bridge()?
        } else {
            self.cursor.read_next(&mut self.batch, &self.pool)?
        };
        let batch = if self.batch.is_empty() {
            None
        } else {
            Some(self.batch.finish()?)
        };
        self.pool.reset();
        if status == CursorStatus::Exhausted {
            self.finish();
        }
        Ok(batch)
    }

    fn fill_from_bridge(&mut self) -> Result<CursorStatus> {
        let context = Arc::clone(self.global.context());
        loop {
            while !self.batch.is_full() {
                let Some(row) = self.pending.next() else {
                    break;
                };
                let ctx = DecodeContext::new(context.relation.toast(), &self.pool);
                self.batch.append_row(&row, &ctx)?;
                self.bridge_emitted += 1;
            }
            if self.batch.is_full() {
                return Ok(CursorStatus::Full);
            }
            let mut bridge = self
                .global
                .bridge()
                .ok_or_else(|| Error::Internal("scan has no worker bridge".into()))?;
            match bridge.next_chunk()? {
                Some(rows) => self.pending = rows.into_iter(),
                None => {
                    self.bridge_scanned += bridge.take_scanned();
                    return Ok(CursorStatus::Exhausted);
                }
            }
        }
    }

    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.cursor.release();
        self.global.finish_reader(
            self.cursor.scanned() + self.bridge_scanned,
            self.cursor.emitted() + self.bridge_emitted,
        );
    }
}

impl Drop for LocalScanState {
    fn drop(&mut self) {
        self.finish();
    }
}

fn query_text(
    relation: &str,
    desc: &rowbridge_types::TupleDesc,
    output_columns: &[usize],
    where_parts: &[String],
) -> String {
    let select = if output_columns.is_empty() {
        "count(*)".to_string()
    } else {
        output_columns
            .iter()
            .map(|&c| quote_ident(&desc.columns()[c].name))
            .collect::<Vec<_>>()
            .join(", ")
    };
    let from = relation
        .split('.')
        .map(quote_ident)
        .collect::<Vec<_>>()
        .join(".");
    let mut text = format!("SELECT {select} FROM {from}");
    if !where_parts.is_empty() {
        text.push_str(" WHERE ");
        text.push_str(&where_parts.join(" AND "));
    }
    text
}
