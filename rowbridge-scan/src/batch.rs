//! Fixed-capacity columnar output buffer.

use arrow::datatypes::SchemaRef;
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use rowbridge_codec::{ColumnAppender, ColumnKind, DecodeContext};
use rowbridge_result::Result;
use rowbridge_types::Datum;

/// Rows of one batch under construction.
///
/// Holds one appender per output column. In count-only mode there are no
/// appenders and only the row count advances.
pub struct OutputBatch {
    schema: SchemaRef,
    appenders: Vec<ColumnAppender>,
    /// Descriptor index feeding each appender.
    sources: Vec<usize>,
    rows: usize,
    capacity: usize,
}

impl OutputBatch {
    pub fn new(
        schema: SchemaRef,
        kinds: &[ColumnKind],
        sources: Vec<usize>,
        capacity: usize,
    ) -> Result<Self> {
        let capacity = capacity.max(1);
        let appenders = kinds
            .iter()
            .map(|k| ColumnAppender::new(k, capacity))
            .collect::<Result<Vec<_>>>()?;
        debug_assert_eq!(appenders.len(), sources.len());
        Ok(Self {
            schema,
            appenders,
            sources,
            rows: 0,
            capacity,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.rows >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Convert the output columns of a deformed row and append them.
    pub fn append_row(&mut self, row: &[Option<Datum>], ctx: &DecodeContext<'_>) -> Result<()> {
        for (appender, &source) in self.appenders.iter_mut().zip(&self.sources) {
            appender.append(row.get(source).and_then(Option::as_ref), ctx)?;
        }
        self.rows += 1;
        Ok(())
    }

    /// Emit the buffered rows and start an empty batch.
    pub fn finish(&mut self) -> Result<RecordBatch> {
        let rows = std::mem::take(&mut self.rows);
        if self.appenders.is_empty() {
            let options = RecordBatchOptions::new().with_row_count(Some(rows));
            return Ok(RecordBatch::try_new_with_options(
                self.schema.clone(),
                vec![],
                &options,
            )?);
        }
        let columns = self
            .appenders
            .iter_mut()
            .map(ColumnAppender::finish)
            .collect::<Result<Vec<_>>>()?;
        Ok(RecordBatch::try_new(self.schema.clone(), columns)?)
    }

    /// Drop buffered rows without emitting them.
    pub fn discard(&mut self) {
        self.rows = 0;
        for appender in &mut self.appenders {
            // A builder that fails to finish holds nothing worth keeping.
            let _ = appender.finish();
        }
    }
}

impl std::fmt::Debug for OutputBatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputBatch")
            .field("columns", &self.appenders.len())
            .field("rows", &self.rows)
            .field("capacity", &self.capacity)
            .finish()
    }
}
