// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Pending queue for blocked transactions
//!
//! Blocked transactions wait in buckets keyed by importance. The scheduler
//! walks buckets from the most important down and hands locks off
//! round-robin inside each bucket, so equal-importance waiters cannot starve
//! one another. Lower buckets are only reached when every higher bucket is
//! stuck.

use std::collections::BTreeMap;

use crate::buffer::TransactionId;

use super::manager::TransactionInfo;
use super::target::LockTarget;

/// Blocked transactions sharing one importance value, in arrival order.
#[derive(Debug)]
pub(crate) struct PendingBucket {
    pub(crate) transactions: Vec<TransactionId>,
    /// Round-robin cursor over `transactions`: index of the candidate the
    /// scheduler tried last, or -1 when none has been tried yet.
    pub(crate) last_try: isize,
}

impl PendingBucket {
    pub(crate) fn new() -> Self {
        PendingBucket {
            transactions: Vec::new(),
            last_try: -1,
        }
    }
}

/// Buckets keyed by importance; scheduling traverses keys in descending
/// order. A bucket present in the map is never empty.
pub(crate) type PendingQueue = BTreeMap<u64, PendingBucket>;

/// Queue `owner` behind its importance bucket and record `target` as its
/// pending lock. Fails when the transaction already has a pending lock or is
/// already queued.
pub(crate) fn enqueue(
    queue: &mut PendingQueue,
    owner: &mut TransactionInfo,
    target: LockTarget,
) -> bool {
    if owner.pending.is_some() {
        return false;
    }

    let bucket = queue
        .entry(owner.importance)
        .or_insert_with(PendingBucket::new);
    if bucket.transactions.contains(&owner.id) {
        return false;
    }

    bucket.transactions.push(owner.id);
    owner.pending = Some(target);
    true
}

/// Remove `owner` from its bucket, provided `target` matches its pending
/// lock exactly. Empty buckets are dropped from the queue.
pub(crate) fn dequeue(
    queue: &mut PendingQueue,
    owner: &mut TransactionInfo,
    target: &LockTarget,
) -> bool {
    match &owner.pending {
        Some(pending) if pending == target => {}
        _ => return false,
    }

    let Some(bucket) = queue.get_mut(&owner.importance) else {
        return false;
    };
    let Some(position) = bucket.transactions.iter().position(|&txn| txn == owner.id) else {
        return false;
    };

    bucket.transactions.remove(position);
    if bucket.transactions.is_empty() {
        queue.remove(&owner.importance);
    }
    owner.pending = None;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::TableId;
    use crate::lock::target::LockAccess;

    fn txn(id: u64, importance: u64) -> TransactionInfo {
        TransactionInfo::new(TransactionId::new(id), importance)
    }

    fn target(access: LockAccess) -> LockTarget {
        LockTarget::table(TableId::new(0), access)
    }

    #[test]
    fn test_enqueue_records_pending_lock() {
        let mut queue = PendingQueue::new();
        let mut owner = txn(1, 5);

        assert!(enqueue(&mut queue, &mut owner, target(LockAccess::Shared)));
        assert_eq!(owner.pending, Some(target(LockAccess::Shared)));
        assert_eq!(queue[&5].transactions, vec![TransactionId::new(1)]);
        assert_eq!(queue[&5].last_try, -1);
    }

    #[test]
    fn test_enqueue_rejects_second_pending_lock() {
        let mut queue = PendingQueue::new();
        let mut owner = txn(1, 5);

        assert!(enqueue(&mut queue, &mut owner, target(LockAccess::Shared)));
        assert!(!enqueue(&mut queue, &mut owner, target(LockAccess::Exclusive)));
        assert_eq!(owner.pending, Some(target(LockAccess::Shared)));
    }

    #[test]
    fn test_dequeue_requires_exact_target() {
        let mut queue = PendingQueue::new();
        let mut owner = txn(1, 5);
        enqueue(&mut queue, &mut owner, target(LockAccess::Shared));

        assert!(!dequeue(&mut queue, &mut owner, &target(LockAccess::Exclusive)));
        assert!(dequeue(&mut queue, &mut owner, &target(LockAccess::Shared)));
        assert_eq!(owner.pending, None);
    }

    #[test]
    fn test_dequeue_drops_empty_bucket() {
        let mut queue = PendingQueue::new();
        let mut first = txn(1, 5);
        let mut second = txn(2, 5);
        enqueue(&mut queue, &mut first, target(LockAccess::Shared));
        enqueue(&mut queue, &mut second, target(LockAccess::Update));

        assert!(dequeue(&mut queue, &mut first, &target(LockAccess::Shared)));
        assert_eq!(queue[&5].transactions, vec![TransactionId::new(2)]);

        assert!(dequeue(&mut queue, &mut second, &target(LockAccess::Update)));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_buckets_separate_by_importance() {
        let mut queue = PendingQueue::new();
        let mut low = txn(1, 1);
        let mut high = txn(2, 9);
        enqueue(&mut queue, &mut low, target(LockAccess::Shared));
        enqueue(&mut queue, &mut high, target(LockAccess::Shared));

        let importances: Vec<u64> = queue.keys().rev().copied().collect();
        assert_eq!(importances, vec![9, 1]);
    }
}
