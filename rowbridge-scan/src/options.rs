//! Scan configuration.

use rowbridge_types::STANDARD_VECTOR_SIZE;

/// Environment variable that caps [`ScanOptions::max_workers_per_scan`].
pub const MAX_WORKERS_ENV: &str = "ROWBRIDGE_MAX_WORKERS";

/// Options for one scan execution.
#[derive(Clone, Debug)]
pub struct ScanOptions {
    /// Rows per output batch.
    pub batch_capacity: usize,
    /// Thread budget for local readers.
    pub max_threads: usize,
    pub max_workers_per_scan: usize,
    pub max_parallel_workers: usize,
    /// Relations with fewer blocks never use the worker bridge.
    pub parallel_block_threshold: u32,
    /// Tuple chunks buffered per worker queue.
    pub worker_queue_depth: usize,
    /// Map numerics without a usable precision to `Float64` instead of
    /// failing the bind.
    pub convert_unsupported_numeric_to_double: bool,
    pub use_worker_bridge: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            batch_capacity: STANDARD_VECTOR_SIZE,
            max_threads: std::thread::available_parallelism().map_or(1, |n| n.get()),
            max_workers_per_scan: 2,
            max_parallel_workers: 8,
            parallel_block_threshold: 0,
            worker_queue_depth: 64,
            convert_unsupported_numeric_to_double: false,
            use_worker_bridge: true,
        }
    }
}

impl ScanOptions {
    /// Defaults with [`MAX_WORKERS_ENV`] applied when set to a number.
    pub fn from_env() -> Self {
        let mut options = Self::default();
        if let Some(cap) = std::env::var(MAX_WORKERS_ENV)
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
        {
            options.max_workers_per_scan = options.max_workers_per_scan.min(cap);
        }
        options
    }

    /// Reader workers for a scan of `cardinality` estimated rows: one per
    /// factor of 2^8 in the row count, within the configured limits.
    pub fn worker_count(&self, cardinality: u64) -> usize {
        let log2 = if cardinality == 0 {
            0
        } else {
            63 - cardinality.leading_zeros() as usize
        };
        let base = log2 / 8;
        base.min(self.max_workers_per_scan.min(self.max_parallel_workers))
            .max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_formula() {
        let options = ScanOptions {
            max_workers_per_scan: 4,
            max_parallel_workers: 8,
            ..ScanOptions::default()
        };
        assert_eq!(options.worker_count(0), 1);
        assert_eq!(options.worker_count(255), 1);
        assert_eq!(options.worker_count(65_535), 1);
        assert_eq!(options.worker_count(65_536), 2);
        assert_eq!(options.worker_count(1 << 24), 3);
        assert_eq!(options.worker_count(u64::MAX), 4);

        let capped = ScanOptions {
            max_parallel_workers: 2,
            ..options
        };
        assert_eq!(capped.worker_count(u64::MAX), 2);
    }

    #[test]
    fn defaults() {
        let options = ScanOptions::default();
        assert_eq!(options.batch_capacity, 2048);
        assert!(options.max_threads >= 1);
        assert!(!options.convert_unsupported_numeric_to_double);
    }
}
