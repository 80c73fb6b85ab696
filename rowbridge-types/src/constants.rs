/// Rows per emitted batch; matches the columnar engine's vector size.
pub const STANDARD_VECTOR_SIZE: usize = 2048;

/// Blocks a parallel worker claims per visit to the shared counter.
pub const WORKER_SCAN_BLOCK: u32 = 16;

/// Projection id the columnar engine uses for `COUNT(*)`.
pub const COUNT_STAR_COLUMN: u64 = u64::MAX;

/// Days between the Unix epoch (1970-01-01) and the row-store epoch (2000-01-01).
pub const PG_EPOCH_OFFSET_DAYS: i32 = 10_957;

/// Microseconds in one day.
pub const MICROS_PER_DAY: i64 = 86_400_000_000;

/// Microseconds between the Unix epoch and the row-store epoch.
pub const PG_EPOCH_OFFSET_MICROS: i64 = PG_EPOCH_OFFSET_DAYS as i64 * MICROS_PER_DAY;

/// Size of a 4-byte varlena length word.
pub const VARHDRSZ: usize = 4;

/// Alignment boundary for array data areas.
pub const MAXIMUM_ALIGNOF: usize = 8;

/// Largest decimal precision the columnar side stores exactly.
pub const MAX_DECIMAL_PRECISION: u8 = 38;
