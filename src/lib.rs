// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! LockLite - a transactional hierarchical lock manager
//!
//! LockLite arbitrates concurrent access by transactions to tables, pages
//! within tables, and rows within pages. It is the concurrency-control core
//! of a storage engine: the buffer manager, transaction log, and query
//! layers sit outside and talk to it through opaque handles.
//!
//! # Features
//!
//! - **Six lock modes**: the classical IS/S/U/IX/SIX/X compatibility matrix
//! - **Three granularities**: table, page, and row targets in one hierarchy,
//!   with lock state created lazily and pruned on release
//! - **Priority scheduling**: blocked transactions queue in importance
//!   buckets; freed locks are handed off round-robin within a bucket and
//!   strictly by priority across buckets
//! - **Deadlock detection**: wait-for graph reduction and cycle discovery
//!   with one victim per cycle
//! - **Rollback**: a blocked transaction sheds its pending request and every
//!   held lock in one call
//!
//! # Usage
//!
//! ```ignore
//! let manager = LockManager::new(buffer);
//! manager.register_table(table, source)?;
//! manager.register_transaction(txn, 1)?;
//!
//! let result = manager.acquire_lock(txn, LockTarget::table(table, LockAccess::Shared))?;
//! if result.blocked {
//!     // wait until a release lets pick_transaction() hand the lock over,
//!     // or ask detect_deadlock() whether this wait can ever end
//! }
//! ```
//!
//! Every operation is thread-safe and serializes on one internal mutex; no
//! call suspends while holding it.

pub mod buffer;
pub mod lock;

// Re-export the public API at the crate root
pub use buffer::{BufferManager, PageId, RowAddress, SourceId, TableId, TransactionId};
pub use lock::{
    DeadlockInfo, LockAccess, LockError, LockManager, LockObject, LockResult, LockTarget,
};

/// LockLite version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// LockLite crate name
pub const CRATE_NAME: &str = env!("CARGO_PKG_NAME");
