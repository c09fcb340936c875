// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Transactional hierarchical locking
//!
//! This module provides the lock manager and its supporting types:
//! - Lock targets over tables, pages, and rows with six access modes
//! - The mode compatibility matrix
//! - Per-object lock state with lazy creation and pruning
//! - The priority-bucketed pending queue and round-robin scheduler
//! - Wait-for graph deadlock detection with victim selection

mod compat;
mod deadlock;
mod error;
mod manager;
mod object;
mod pending;
mod target;

pub use deadlock::DeadlockInfo;
pub use error::LockError;
pub use manager::LockManager;
pub use target::{LockAccess, LockObject, LockResult, LockTarget};
