// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! The lock manager: registries, hierarchical dispatch, and scheduling
//!
//! All public operations serialize on one process-wide mutex. Acquire,
//! release, and upgrade run through a single traversal that resolves the
//! target's granularity, creating missing lock state on the way down for
//! grant-creating operations and pruning empty state on the way back for
//! releases. Blocked transactions park in the pending queue until a release
//! frees the object and `pick_transaction` hands the lock off.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info};
use parking_lot::Mutex;

use crate::buffer::{BufferManager, SourceId, TableId, TransactionId};

use super::deadlock::{self, DeadlockInfo};
use super::error::LockError;
use super::object::{self, TableLockState};
use super::pending::{self, PendingQueue};
use super::target::{LockAccess, LockObject, LockResult, LockTarget};

/// Lock-side state of one registered transaction.
#[derive(Debug)]
pub(crate) struct TransactionInfo {
    pub(crate) id: TransactionId,
    /// Scheduling priority. Higher values win; ties share a pending bucket.
    pub(crate) importance: u64,
    /// Every lock currently held, in acquisition order.
    pub(crate) held: Vec<LockTarget>,
    /// The single unfulfilled request this transaction is blocked on.
    pub(crate) pending: Option<LockTarget>,
}

impl TransactionInfo {
    pub(crate) fn new(id: TransactionId, importance: u64) -> Self {
        TransactionInfo {
            id,
            importance,
            held: Vec::new(),
            pending: None,
        }
    }
}

/// Registry entry for one table.
#[derive(Debug)]
struct TableMeta {
    #[allow(dead_code)] // kept for the table's lifetime; read back by recovery tooling
    source: SourceId,
}

/// One pass through the table → page → row traversal.
#[derive(Debug, Clone, Copy)]
enum Operation {
    Acquire { process_pending: bool },
    Release,
    Upgrade { new_access: LockAccess },
}

impl Operation {
    /// Whether missing lock state may be allocated along the way.
    fn creates_lock_state(&self) -> bool {
        matches!(self, Operation::Acquire { .. })
    }

    /// Whether a transaction that is already pending must be rejected
    /// before the traversal starts.
    fn checks_pending(&self) -> bool {
        match *self {
            Operation::Acquire { process_pending } => process_pending,
            Operation::Release => false,
            Operation::Upgrade { .. } => true,
        }
    }
}

/// Everything behind the mutex.
#[derive(Default)]
pub(crate) struct ManagerState {
    tables: HashMap<TableId, TableMeta>,
    pub(crate) transactions: HashMap<TransactionId, TransactionInfo>,
    /// Dense per-table lock slots indexed by `TableId::index`. Slots are
    /// grown on demand and retained once allocated, even after the table's
    /// last lock is released.
    table_locks: Vec<Option<TableLockState>>,
    pub(crate) pending: PendingQueue,
}

impl ManagerState {
    /// The shared traversal behind acquire, release, and upgrade.
    fn operate(
        &mut self,
        buffer: &dyn BufferManager,
        owner: TransactionId,
        target: &LockTarget,
        op: Operation,
    ) -> Result<LockResult, LockError> {
        if !self.transactions.contains_key(&owner) {
            return Err(LockError::TransactionNotRegistered(owner));
        }
        let table = target.object.table();
        if !self.tables.contains_key(&table) {
            return Err(LockError::TableNotRegistered(table));
        }
        if op.checks_pending() && self.transactions[&owner].pending.is_some() {
            return Err(LockError::AlreadyPending(owner));
        }

        // A release that matches the owner's pending lock cancels the wait
        // instead of touching object state.
        if matches!(op, Operation::Release) {
            let info = self.transactions.get_mut(&owner).expect("validated above");
            if pending::dequeue(&mut self.pending, info, target) {
                return Ok(LockResult { blocked: false });
            }
        }

        let slot = table.index();
        if self.table_locks.len() <= slot {
            if !op.creates_lock_state() {
                return Err(LockError::LockNotHeld(*target));
            }
            self.table_locks.resize_with(slot + 1, || None);
        }
        if self.table_locks[slot].is_none() {
            if !op.creates_lock_state() {
                return Err(LockError::LockNotHeld(*target));
            }
            self.table_locks[slot] = Some(TableLockState::default());
        }

        let ManagerState {
            transactions,
            table_locks,
            pending,
            ..
        } = self;
        let info = transactions.get_mut(&owner).expect("validated above");
        let table_state = table_locks[slot].as_mut().expect("located above");

        let (page, row_offset) = match target.object {
            LockObject::Table(_) => {
                return apply(op, &mut table_state.counts, info, pending, target);
            }
            LockObject::Page(_, page) => (page, None),
            LockObject::Row(_, address) => {
                let decoded = buffer.decode_pointer(address).unwrap_or_else(|| {
                    panic!("unable to decode row pointer {address}: lock state disagrees with the buffer manager")
                });
                (decoded.0, Some(decoded.1))
            }
        };

        let page_state = match table_state.pages.entry(page) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                if !op.creates_lock_state() {
                    return Err(LockError::LockNotHeld(*target));
                }
                entry.insert(Default::default())
            }
        };

        let result = match row_offset {
            None => apply(op, &mut page_state.counts, info, pending, target),
            Some(offset) => {
                let row_state = match page_state.rows.entry(offset) {
                    Entry::Occupied(entry) => entry.into_mut(),
                    Entry::Vacant(entry) => {
                        if !op.creates_lock_state() {
                            return Err(LockError::LockNotHeld(*target));
                        }
                        entry.insert(Default::default())
                    }
                };
                let result = apply(op, &mut row_state.counts, info, pending, target);
                if result.is_ok() && matches!(op, Operation::Release) && row_state.is_empty() {
                    page_state.rows.remove(&offset);
                }
                result
            }
        };

        // Pages drain upward like rows; the table-level slot stays put.
        if result.is_ok() && matches!(op, Operation::Release) {
            if let Some(state) = table_state.pages.get(&page) {
                if state.is_empty() {
                    table_state.pages.remove(&page);
                }
            }
        }
        result
    }
}

/// Per-granularity handler: every level applies the operation to its own
/// mode counters the same way.
fn apply(
    op: Operation,
    counts: &mut object::LockCounts,
    owner: &mut TransactionInfo,
    queue: &mut PendingQueue,
    target: &LockTarget,
) -> Result<LockResult, LockError> {
    match op {
        Operation::Acquire { process_pending } => {
            apply_acquire(counts, owner, queue, *target, process_pending)
        }
        Operation::Release => {
            if object::release_object(counts, owner, target) {
                Ok(LockResult { blocked: false })
            } else {
                Err(LockError::LockNotHeld(*target))
            }
        }
        Operation::Upgrade { new_access } => {
            if !object::release_object(counts, owner, target) {
                return Err(LockError::LockNotHeld(*target));
            }
            let upgraded = LockTarget {
                object: target.object,
                access: new_access,
            };
            apply_acquire(counts, owner, queue, upgraded, true)
        }
    }
}

fn apply_acquire(
    counts: &mut object::LockCounts,
    owner: &mut TransactionInfo,
    queue: &mut PendingQueue,
    target: LockTarget,
    process_pending: bool,
) -> Result<LockResult, LockError> {
    if object::try_acquire_object(counts, owner, target) {
        return Ok(LockResult { blocked: false });
    }
    if process_pending && !pending::enqueue(queue, owner, target) {
        return Err(LockError::AlreadyPending(owner.id));
    }
    Ok(LockResult { blocked: true })
}

/// Transactional hierarchical lock manager.
///
/// Arbitrates concurrent access to tables, pages, and rows under the
/// IS/S/U/IX/SIX/X compatibility matrix. Thread-safe; every operation
/// serializes on one internal mutex and runs to completion without
/// suspending.
pub struct LockManager {
    buffer: Arc<dyn BufferManager>,
    state: Mutex<ManagerState>,
}

impl LockManager {
    pub fn new(buffer: Arc<dyn BufferManager>) -> Self {
        LockManager {
            buffer,
            state: Mutex::new(ManagerState::default()),
        }
    }

    /// Register a table backed by `source`. The source must have an index
    /// page, otherwise the registration is rejected.
    pub fn register_table(&self, table: TableId, source: SourceId) -> Result<(), LockError> {
        let mut state = self.state.lock();
        if state.tables.contains_key(&table) {
            return Err(LockError::TableAlreadyRegistered(table));
        }
        if self.buffer.index_page(source).is_none() {
            return Err(LockError::InvalidSource(source));
        }
        state.tables.insert(table, TableMeta { source });
        debug!("registered {table} backed by {source}");
        Ok(())
    }

    pub fn unregister_table(&self, table: TableId) -> Result<(), LockError> {
        let mut state = self.state.lock();
        if state.tables.remove(&table).is_none() {
            return Err(LockError::TableNotRegistered(table));
        }
        debug!("unregistered {table}");
        Ok(())
    }

    /// Register a transaction with its scheduling priority. Higher
    /// `importance` wins when blocked transactions compete for a freed lock.
    pub fn register_transaction(
        &self,
        txn: TransactionId,
        importance: u64,
    ) -> Result<(), LockError> {
        let mut state = self.state.lock();
        if state.transactions.contains_key(&txn) {
            return Err(LockError::TransactionAlreadyRegistered(txn));
        }
        state
            .transactions
            .insert(txn, TransactionInfo::new(txn, importance));
        debug!("registered {txn} with importance {importance}");
        Ok(())
    }

    /// Unregister a transaction. The transaction must have released every
    /// lock and must not be waiting on one.
    pub fn unregister_transaction(&self, txn: TransactionId) -> Result<(), LockError> {
        let mut state = self.state.lock();
        let info = state
            .transactions
            .get(&txn)
            .ok_or(LockError::TransactionNotRegistered(txn))?;
        if !info.held.is_empty() || info.pending.is_some() {
            return Err(LockError::TransactionBusy(txn));
        }
        state.transactions.remove(&txn);
        debug!("unregistered {txn}");
        Ok(())
    }

    /// Try to take `target` for `owner`.
    ///
    /// A compatible request is granted immediately. An incompatible one
    /// parks the transaction in the pending queue and reports
    /// `blocked = true`; the caller then waits for [`pick_transaction`] to
    /// hand the lock off once a holder releases.
    ///
    /// [`pick_transaction`]: LockManager::pick_transaction
    pub fn acquire_lock(
        &self,
        owner: TransactionId,
        target: LockTarget,
    ) -> Result<LockResult, LockError> {
        let mut state = self.state.lock();
        let result = state.operate(
            self.buffer.as_ref(),
            owner,
            &target,
            Operation::Acquire {
                process_pending: true,
            },
        )?;
        if result.blocked {
            debug!("{owner} blocked on {target}");
        }
        Ok(result)
    }

    /// Release a lock held by `owner`, or cancel its pending request when
    /// `target` matches it. Empty row and page state is pruned on the way
    /// out.
    pub fn release_lock(&self, owner: TransactionId, target: LockTarget) -> Result<(), LockError> {
        let mut state = self.state.lock();
        state
            .operate(self.buffer.as_ref(), owner, &target, Operation::Release)
            .map(|_| ())
    }

    /// Exchange a held lock for the same object at `new_access`.
    ///
    /// The old lock is released first; if the new mode conflicts with the
    /// remaining holders the transaction ends up pending on the upgraded
    /// target, exactly as a blocked acquire.
    pub fn upgrade_lock(
        &self,
        owner: TransactionId,
        old: LockTarget,
        new_access: LockAccess,
    ) -> Result<LockResult, LockError> {
        let mut state = self.state.lock();
        let result = state.operate(
            self.buffer.as_ref(),
            owner,
            &old,
            Operation::Upgrade { new_access },
        )?;
        if result.blocked {
            debug!("{owner} blocked upgrading {old} to {new_access}");
        }
        Ok(result)
    }

    /// Whether any lock is currently held anywhere under `table`.
    pub fn table_has_locks(&self, table: TableId) -> bool {
        let state = self.state.lock();
        state
            .table_locks
            .get(table.index())
            .and_then(|slot| slot.as_ref())
            .map(|table_state| !table_state.is_empty())
            .unwrap_or(false)
    }

    /// Hand a freed lock to the first blocked transaction that can take it.
    ///
    /// Buckets are scanned from the highest importance down; inside a bucket
    /// the scan is round-robin, resuming after the candidate tried last. The
    /// granted transaction is removed from the queue and returned; `None`
    /// means every pending request is still blocked.
    pub fn pick_transaction(&self) -> Option<TransactionId> {
        let mut state = self.state.lock();
        let importances: Vec<u64> = state.pending.keys().rev().copied().collect();

        for importance in importances {
            let (len, cursor) = {
                let bucket = state
                    .pending
                    .get_mut(&importance)
                    .expect("buckets cannot disappear while scanning");
                // The cursor can point past the end after queue removals;
                // restart the revolution from the front in that case.
                if bucket.last_try >= bucket.transactions.len() as isize {
                    bucket.last_try = -1;
                }
                (bucket.transactions.len(), bucket.last_try)
            };
            let stop = if cursor < 0 { len as isize - 1 } else { cursor };

            loop {
                let candidate = {
                    let bucket = state
                        .pending
                        .get_mut(&importance)
                        .expect("buckets cannot disappear while scanning");
                    bucket.last_try = (bucket.last_try + 1) % len as isize;
                    bucket.transactions[bucket.last_try as usize]
                };
                let target = state
                    .transactions
                    .get(&candidate)
                    .and_then(|info| info.pending)
                    .unwrap_or_else(|| {
                        panic!("queued {candidate} has no pending lock: pending queue is corrupted")
                    });

                let result = state
                    .operate(
                        self.buffer.as_ref(),
                        candidate,
                        &target,
                        Operation::Acquire {
                            process_pending: false,
                        },
                    )
                    .unwrap_or_else(|error| {
                        panic!("re-acquire of {target} for queued {candidate} failed: {error}")
                    });

                if !result.blocked {
                    state
                        .transactions
                        .get_mut(&candidate)
                        .expect("validated by the re-acquire")
                        .pending = None;
                    let bucket = state
                        .pending
                        .get_mut(&importance)
                        .expect("buckets cannot disappear while scanning");
                    bucket.transactions.remove(bucket.last_try as usize);
                    bucket.last_try -= 1;
                    if bucket.transactions.is_empty() {
                        state.pending.remove(&importance);
                    }
                    debug!("granted pending {target}, scheduling {candidate}");
                    return Some(candidate);
                }

                let position = state.pending[&importance].last_try;
                if position == stop {
                    break;
                }
            }
        }
        None
    }

    /// Build the wait-for graph over all pending transactions, reduce it,
    /// and report every deadlock cycle with one victim per cycle.
    ///
    /// The detector is an advisory oracle: it mutates nothing. The caller
    /// breaks the deadlocks by issuing [`rollback`] for each entry in
    /// [`DeadlockInfo::rollbacks`].
    ///
    /// [`rollback`]: LockManager::rollback
    pub fn detect_deadlock(&self) -> DeadlockInfo {
        let state = self.state.lock();
        deadlock::detect(&state)
    }

    /// Abort a blocked transaction: cancel its pending request, then release
    /// every held lock in reverse acquisition order.
    pub fn rollback(&self, txn: TransactionId) -> Result<(), LockError> {
        let mut state = self.state.lock();
        let (pending_target, held) = {
            let info = state
                .transactions
                .get(&txn)
                .ok_or(LockError::TransactionNotRegistered(txn))?;
            let pending_target = info.pending.ok_or(LockError::NotPending(txn))?;
            (pending_target, info.held.clone())
        };

        if let Err(error) = state.operate(
            self.buffer.as_ref(),
            txn,
            &pending_target,
            Operation::Release,
        ) {
            panic!("failed to cancel {pending_target} while rolling back {txn}: {error}");
        }
        for target in held.iter().rev() {
            if let Err(error) = state.operate(self.buffer.as_ref(), txn, target, Operation::Release)
            {
                panic!("failed to release {target} while rolling back {txn}: {error}");
            }
        }
        info!("rolled back {txn}: {} locks released", held.len());
        Ok(())
    }

    /// Whether `txn` is currently blocked on a pending lock.
    pub fn has_pending_lock(&self, txn: TransactionId) -> bool {
        let state = self.state.lock();
        state
            .transactions
            .get(&txn)
            .map(|info| info.pending.is_some())
            .unwrap_or(false)
    }

    /// Number of locks `txn` currently holds across all granularities.
    pub fn held_lock_count(&self, txn: TransactionId) -> usize {
        let state = self.state.lock();
        state
            .transactions
            .get(&txn)
            .map(|info| info.held.len())
            .unwrap_or(0)
    }

    /// Number of transactions currently waiting in the pending queue.
    pub fn pending_transaction_count(&self) -> usize {
        let state = self.state.lock();
        state
            .pending
            .values()
            .map(|bucket| bucket.transactions.len())
            .sum()
    }
}
