//! Transaction bookkeeping and tuple visibility for the in-memory heap.
//!
//! The scan core never evaluates these rules itself; it asks the relation
//! through [`crate::HeapRelation::is_visible`] whenever a page is not marked
//! all-visible.

use std::sync::{Arc, Mutex};

use rowbridge_types::{Snapshot, TXN_ID_FROZEN, TXN_ID_NONE, TxnId};
use rustc_hash::{FxHashMap, FxHashSet};

/// Transaction status values tracked by the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnStatus {
    Active,
    Committed,
    Aborted,
    None,
}

impl TxnStatus {
    pub fn is_committed(self) -> bool {
        matches!(self, TxnStatus::Committed)
    }

    pub fn is_aborted(self) -> bool {
        matches!(self, TxnStatus::Aborted)
    }
}

#[derive(Debug)]
struct TxnTable {
    next_txn_id: TxnId,
    statuses: FxHashMap<TxnId, TxnStatus>,
    /// Transactions begun and not yet committed or aborted.
    active: FxHashSet<TxnId>,
}

impl TxnTable {
    fn snapshot(&self, txn_id: TxnId) -> Snapshot {
        let running = self
            .active
            .iter()
            .copied()
            .filter(|&id| id != txn_id)
            .collect();
        Snapshot::new(txn_id, self.next_txn_id, running)
    }

    fn finish(&mut self, txn_id: TxnId, status: TxnStatus) {
        self.active.remove(&txn_id);
        self.statuses.insert(txn_id, status);
    }
}

/// Hands out transaction ids and tracks their outcome.
#[derive(Clone, Debug)]
pub struct TxnManager {
    inner: Arc<Mutex<TxnTable>>,
}

impl TxnManager {
    pub fn new() -> Self {
        let mut statuses = FxHashMap::with_capacity_and_hasher(1, Default::default());
        statuses.insert(TXN_ID_FROZEN, TxnStatus::Committed);
        Self {
            inner: Arc::new(Mutex::new(TxnTable {
                next_txn_id: TXN_ID_FROZEN + 1,
                statuses,
                active: FxHashSet::default(),
            })),
        }
    }

    fn table(&self) -> std::sync::MutexGuard<'_, TxnTable> {
        self.inner.lock().expect("txn table lock poisoned")
    }

    /// Begin a transaction and return the snapshot it reads with.
    pub fn begin(&self) -> Snapshot {
        let mut table = self.table();
        let txn_id = table.next_txn_id;
        table.next_txn_id += 1;
        table.statuses.insert(txn_id, TxnStatus::Active);
        table.active.insert(txn_id);
        table.snapshot(txn_id)
    }

    /// Snapshot of a read-only statement that owns no writes.
    pub fn read_snapshot(&self) -> Snapshot {
        self.table().snapshot(TXN_ID_NONE)
    }

    pub fn status(&self, txn_id: TxnId) -> TxnStatus {
        match txn_id {
            TXN_ID_NONE => TxnStatus::None,
            TXN_ID_FROZEN => TxnStatus::Committed,
            id => self
                .table()
                .statuses
                .get(&id)
                .copied()
                .unwrap_or(TxnStatus::None),
        }
    }

    pub fn commit(&self, txn_id: TxnId) {
        self.table().finish(txn_id, TxnStatus::Committed);
    }

    pub fn abort(&self, txn_id: TxnId) {
        self.table().finish(txn_id, TxnStatus::Aborted);
    }

    /// Id the next [`TxnManager::begin`] will hand out.
    pub fn next_txn_id(&self) -> TxnId {
        self.table().next_txn_id
    }
}

impl Default for TxnManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Creating and deleting transaction of one tuple version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TupleVersion {
    pub created_by: TxnId,
    /// [`TXN_ID_NONE`] while the tuple is live.
    pub deleted_by: TxnId,
}

impl TupleVersion {
    pub fn new(created_by: TxnId) -> Self {
        Self {
            created_by,
            deleted_by: TXN_ID_NONE,
        }
    }

    pub fn frozen() -> Self {
        Self::new(TXN_ID_FROZEN)
    }

    /// Visibility of this version to `snapshot`.
    ///
    /// A version is visible when its creator is the snapshot's own
    /// transaction, or committed before the snapshot was taken, and no
    /// transaction in either of those groups deleted it.
    pub fn is_visible_for(&self, manager: &TxnManager, snapshot: &Snapshot) -> bool {
        tracing::trace!(
            created_by = self.created_by,
            deleted_by = self.deleted_by,
            txn_id = snapshot.txn_id,
            xmax = snapshot.xmax,
            "visibility check"
        );

        let committed_before =
            |txn: TxnId| snapshot.finished_before(txn) && manager.status(txn).is_committed();

        if snapshot.is_own(self.created_by) {
            return self.deleted_by != snapshot.txn_id;
        }
        if !committed_before(self.created_by) {
            return false;
        }
        match self.deleted_by {
            TXN_ID_NONE => true,
            tx if snapshot.is_own(tx) => false,
            tx => !committed_before(tx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic() {
        let manager = TxnManager::new();
        let a = manager.begin();
        let b = manager.begin();
        assert!(b.txn_id > a.txn_id);
        assert_eq!(manager.status(a.txn_id), TxnStatus::Active);
        assert_eq!(b.in_progress(), &[a.txn_id]);
        assert_eq!(manager.next_txn_id(), b.txn_id + 1);
    }

    #[test]
    fn committed_insert_then_delete() {
        let manager = TxnManager::new();
        let writer = manager.begin();
        let mut version = TupleVersion::new(writer.txn_id);

        assert!(version.is_visible_for(&manager, &writer));
        assert!(!version.is_visible_for(&manager, &manager.read_snapshot()));

        manager.commit(writer.txn_id);
        let reader = manager.read_snapshot();
        assert!(version.is_visible_for(&manager, &reader));

        let deleter = manager.begin();
        version.deleted_by = deleter.txn_id;
        assert!(!version.is_visible_for(&manager, &deleter));
        assert!(version.is_visible_for(&manager, &reader));

        manager.commit(deleter.txn_id);
        assert!(version.is_visible_for(&manager, &reader));
        assert!(!version.is_visible_for(&manager, &manager.read_snapshot()));
    }

    #[test]
    fn commits_after_the_snapshot_stay_hidden() {
        let manager = TxnManager::new();
        let early = manager.begin();
        let late = manager.begin();
        let early_row = TupleVersion::new(early.txn_id);
        let late_row = TupleVersion::new(late.txn_id);
        manager.commit(late.txn_id);

        let reader = manager.read_snapshot();
        manager.commit(early.txn_id);

        assert!(!early_row.is_visible_for(&manager, &reader));
        assert!(late_row.is_visible_for(&manager, &reader));
        assert!(early_row.is_visible_for(&manager, &manager.read_snapshot()));

        // A delete by a transaction running at snapshot time is not seen.
        let deleter = manager.begin();
        let reader = manager.read_snapshot();
        let mut gone = late_row;
        gone.deleted_by = deleter.txn_id;
        manager.commit(deleter.txn_id);
        assert!(gone.is_visible_for(&manager, &reader));
        assert!(!gone.is_visible_for(&manager, &manager.read_snapshot()));
    }

    #[test]
    fn aborted_writes_never_show() {
        let manager = TxnManager::new();
        let writer = manager.begin();
        let version = TupleVersion::new(writer.txn_id);
        manager.abort(writer.txn_id);
        assert!(!version.is_visible_for(&manager, &manager.read_snapshot()));

        let mut frozen = TupleVersion::frozen();
        let deleter = manager.begin();
        frozen.deleted_by = deleter.txn_id;
        manager.abort(deleter.txn_id);
        assert!(frozen.is_visible_for(&manager, &manager.read_snapshot()));
    }
}
