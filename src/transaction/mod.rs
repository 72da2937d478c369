use std::sync::Mutex;

use crate::common::config::{Rid, TransactionId};
use crate::common::error::DbResult;
use crate::storage::record::RmFileHandle;

/// One undo-able write, recorded in the order it happened. Abort replays
/// these in reverse to put the record file back the way it was.
#[derive(Debug, Clone)]
pub enum WriteRecord {
    /// A record was inserted at `rid`; undo by deleting it.
    Insert { rid: Rid },
    /// A record was deleted from `rid`; undo by reinserting `before`.
    Delete { rid: Rid, before: Vec<u8> },
    /// A record at `rid` was overwritten; undo by writing `before` back.
    Update { rid: Rid, before: Vec<u8> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Running,
    Committed,
    Aborted,
}

pub struct Transaction {
    id: TransactionId,
    state: TransactionState,
    write_set: Vec<WriteRecord>,
}

impl Transaction {
    fn new(id: TransactionId) -> Self {
        Self {
            id,
            state: TransactionState::Running,
            write_set: Vec::new(),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn record_write(&mut self, write: WriteRecord) {
        self.write_set.push(write);
    }
}

/// Owns every live transaction and is the sole place commit/abort
/// semantics are implemented. Commit simply clears the write set --
/// durability beyond the flush-on-commit a caller performs through the
/// buffer pool is out of scope here. Abort walks the write set in
/// reverse, undoing each write against the record file it came from.
pub struct TransactionManager {
    next_id: Mutex<TransactionId>,
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionManager {
    pub fn new() -> Self {
        Self {
            next_id: Mutex::new(0),
        }
    }

    pub fn begin(&self) -> Transaction {
        let mut next_id = self.next_id.lock().unwrap();
        let id = *next_id;
        *next_id += 1;
        Transaction::new(id)
    }

    /// Commits `txn`: its write set is simply discarded, since each write
    /// was already applied to the record file as it happened.
    pub fn commit(&self, txn: &mut Transaction) {
        txn.write_set.clear();
        txn.state = TransactionState::Committed;
    }

    /// Aborts `txn`, undoing every write it made against `fh` in reverse
    /// order. A transaction whose writes span more than one record file
    /// needs one `abort` call per file, each filtering to the writes that
    /// apply to it -- there is no catalog here to route writes by table.
    pub fn abort(&self, txn: &mut Transaction, fh: &RmFileHandle) -> DbResult<()> {
        for write in txn.write_set.drain(..).rev() {
            match write {
                WriteRecord::Insert { rid } => {
                    fh.delete_record(rid)?;
                }
                WriteRecord::Delete { rid, before } => {
                    fh.insert_record_at(rid, &before)?;
                }
                WriteRecord::Update { rid, before } => {
                    fh.update_record(rid, &before)?;
                }
            }
        }
        txn.state = TransactionState::Aborted;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempdir::TempDir;

    use super::*;
    use crate::buffer::BufferPoolManager;
    use crate::storage::disk::DiskManager;

    fn setup() -> (Arc<BufferPoolManager>, RmFileHandle, TempDir) {
        let dir = TempDir::new("test").unwrap();
        let bpm = Arc::new(BufferPoolManager::new(64, DiskManager::new()));
        let fh = RmFileHandle::create(bpm.clone(), dir.path().join("t.rec"), 4).unwrap();
        (bpm, fh, dir)
    }

    #[test]
    fn abort_undoes_insert_by_deleting() {
        let (_bpm, fh, _dir) = setup();
        let txm = TransactionManager::new();
        let mut txn = txm.begin();

        let rid = fh.insert_record(b"abcd").unwrap();
        txn.record_write(WriteRecord::Insert { rid });

        txm.abort(&mut txn, &fh).unwrap();
        // The slot is free again: a fresh insert reclaims the same rid.
        let reused = fh.insert_record(b"zzzz").unwrap();
        assert_eq!(reused, rid);
        assert_eq!(txn.state(), TransactionState::Aborted);
    }

    #[test]
    fn abort_undoes_delete_by_reinserting() {
        let (_bpm, fh, _dir) = setup();
        let txm = TransactionManager::new();
        let mut txn = txm.begin();

        let rid = fh.insert_record(b"abcd").unwrap();
        let before = fh.get_record(rid).unwrap().data;
        fh.delete_record(rid).unwrap();
        txn.record_write(WriteRecord::Delete { rid, before });

        txm.abort(&mut txn, &fh).unwrap();
        assert_eq!(fh.get_record(rid).unwrap().data, b"abcd");
    }

    #[test]
    fn abort_undoes_update_by_restoring_previous_bytes() {
        let (_bpm, fh, _dir) = setup();
        let txm = TransactionManager::new();
        let mut txn = txm.begin();

        let rid = fh.insert_record(b"old!").unwrap();
        let before = fh.get_record(rid).unwrap().data;
        fh.update_record(rid, b"new!").unwrap();
        txn.record_write(WriteRecord::Update { rid, before });

        txm.abort(&mut txn, &fh).unwrap();
        assert_eq!(fh.get_record(rid).unwrap().data, b"old!");
    }

    #[test]
    fn abort_undoes_multiple_writes_in_reverse_order() {
        let (_bpm, fh, _dir) = setup();
        let txm = TransactionManager::new();
        let mut txn = txm.begin();

        let rid1 = fh.insert_record(b"aaaa").unwrap();
        txn.record_write(WriteRecord::Insert { rid: rid1 });
        let rid2 = fh.insert_record(b"bbbb").unwrap();
        txn.record_write(WriteRecord::Insert { rid: rid2 });

        txm.abort(&mut txn, &fh).unwrap();
        // Both slots are free again; fresh inserts reclaim them lowest
        // slot first, regardless of the order they were freed in.
        let first_reused = fh.insert_record(b"yyyy").unwrap();
        let second_reused = fh.insert_record(b"zzzz").unwrap();
        assert_eq!(first_reused, rid1);
        assert_eq!(second_reused, rid2);
    }

    #[test]
    fn commit_clears_write_set_without_touching_records() {
        let (_bpm, fh, _dir) = setup();
        let txm = TransactionManager::new();
        let mut txn = txm.begin();

        let rid = fh.insert_record(b"abcd").unwrap();
        txn.record_write(WriteRecord::Insert { rid });
        txm.commit(&mut txn);

        assert_eq!(fh.get_record(rid).unwrap().data, b"abcd");
        assert_eq!(txn.state(), TransactionState::Committed);
    }

    /// Property 8: undoing a mixed insert/delete/update write-set restores
    /// the page's bytes exactly, not just the individual record values.
    #[test]
    fn abort_restores_byte_identical_page_contents() {
        use crate::common::config::PageId;

        let (bpm, fh, _dir) = setup();
        let base1 = fh.insert_record(b"base").unwrap();
        let base2 = fh.insert_record(b"mor1").unwrap();

        let page_id = PageId::new(fh.fd(), base1.page_no);
        let snapshot = {
            let page = bpm.fetch_page(page_id).unwrap();
            let bytes = page.get_data().to_vec();
            bpm.unpin_page(page_id, false);
            bytes
        };

        let txm = TransactionManager::new();
        let mut txn = txm.begin();

        let rid_ins = fh.insert_record(b"new!").unwrap();
        txn.record_write(WriteRecord::Insert { rid: rid_ins });

        let before_del = fh.get_record(base1).unwrap().data;
        fh.delete_record(base1).unwrap();
        txn.record_write(WriteRecord::Delete { rid: base1, before: before_del });

        let before_upd = fh.get_record(base2).unwrap().data;
        fh.update_record(base2, b"mod1").unwrap();
        txn.record_write(WriteRecord::Update { rid: base2, before: before_upd });

        txm.abort(&mut txn, &fh).unwrap();

        let restored = {
            let page = bpm.fetch_page(page_id).unwrap();
            let bytes = page.get_data().to_vec();
            bpm.unpin_page(page_id, false);
            bytes
        };
        assert_eq!(restored, snapshot);
    }
}
