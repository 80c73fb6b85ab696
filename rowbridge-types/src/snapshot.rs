use std::sync::Arc;

/// Transaction identifier in the row store.
pub type TxnId = u64;

/// Marks a row version that no transaction has deleted.
pub const TXN_ID_NONE: TxnId = u64::MAX;

/// Creator id for row versions that are visible to every snapshot.
pub const TXN_ID_FROZEN: TxnId = 1;

/// MVCC visibility marker bound to a scan.
///
/// `txn_id` is the transaction running the scan (its own writes are visible).
/// Every id at or above `xmax` had not started when the snapshot was taken,
/// and `in_progress` lists the ids below `xmax` that were still running. Work
/// by either group stays invisible no matter how those transactions end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub txn_id: TxnId,
    pub xmax: TxnId,
    in_progress: Arc<[TxnId]>,
}

impl Snapshot {
    pub fn new(txn_id: TxnId, xmax: TxnId, mut in_progress: Vec<TxnId>) -> Self {
        in_progress.sort_unstable();
        in_progress.dedup();
        Self {
            txn_id,
            xmax,
            in_progress: in_progress.into(),
        }
    }

    /// Sorted ids that were running when the snapshot was taken.
    pub fn in_progress(&self) -> &[TxnId] {
        &self.in_progress
    }

    /// Whether `txn` had finished before the snapshot was taken. Its outcome
    /// (commit or abort) is then fixed from this snapshot's point of view.
    pub fn finished_before(&self, txn: TxnId) -> bool {
        txn < self.xmax && self.in_progress.binary_search(&txn).is_err()
    }

    /// Whether `txn` is the snapshot's own writing transaction.
    pub fn is_own(&self, txn: TxnId) -> bool {
        self.txn_id != TXN_ID_NONE && txn == self.txn_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_and_future_transactions_are_unfinished() {
        let snapshot = Snapshot::new(TXN_ID_NONE, 10, vec![7, 4, 7]);
        assert_eq!(snapshot.in_progress(), &[4, 7]);
        assert!(snapshot.finished_before(TXN_ID_FROZEN));
        assert!(snapshot.finished_before(5));
        assert!(!snapshot.finished_before(4));
        assert!(!snapshot.finished_before(10));
        assert!(!snapshot.is_own(TXN_ID_NONE));
    }
}
