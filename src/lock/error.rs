// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Lock manager error types

use thiserror::Error;

use crate::buffer::{SourceId, TableId, TransactionId};

use super::target::LockTarget;

/// Expected failures of lock manager operations.
///
/// Everything here is recoverable and acted upon by the caller. Violations
/// of the manager's internal invariants are not errors; they panic.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    #[error("transaction {0} is not registered")]
    TransactionNotRegistered(TransactionId),

    #[error("transaction {0} is already registered")]
    TransactionAlreadyRegistered(TransactionId),

    #[error("table {0} is not registered")]
    TableNotRegistered(TableId),

    #[error("table {0} is already registered")]
    TableAlreadyRegistered(TableId),

    #[error("source {0} has no index page")]
    InvalidSource(SourceId),

    #[error("transaction {0} still holds or awaits locks")]
    TransactionBusy(TransactionId),

    #[error("transaction {0} already has a pending lock")]
    AlreadyPending(TransactionId),

    #[error("{0} is not held")]
    LockNotHeld(LockTarget),

    #[error("transaction {0} has no pending lock")]
    NotPending(TransactionId),
}
