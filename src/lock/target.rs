// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Lock targets: what a transaction asks to lock and in which mode

use serde::{Deserialize, Serialize};

use crate::buffer::{PageId, RowAddress, TableId};

/// Lock modes, weakest to strongest.
///
/// The discriminants index the compatibility matrix and must not be
/// reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockAccess {
    IntentShared = 0,
    Shared = 1,
    Update = 2,
    IntentExclusive = 3,
    SharedIntentExclusive = 4,
    Exclusive = 5,
}

impl LockAccess {
    /// Number of lock modes.
    pub const COUNT: usize = 6;

    /// All modes in matrix order.
    pub const ALL: [LockAccess; Self::COUNT] = [
        LockAccess::IntentShared,
        LockAccess::Shared,
        LockAccess::Update,
        LockAccess::IntentExclusive,
        LockAccess::SharedIntentExclusive,
        LockAccess::Exclusive,
    ];

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for LockAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LockAccess::IntentShared => "IS",
            LockAccess::Shared => "S",
            LockAccess::Update => "U",
            LockAccess::IntentExclusive => "IX",
            LockAccess::SharedIntentExclusive => "SIX",
            LockAccess::Exclusive => "X",
        };
        write!(f, "{}", name)
    }
}

/// Identity of a lockable object in the table → page → row hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockObject {
    /// A whole table.
    Table(TableId),
    /// A page within a table.
    Page(TableId, PageId),
    /// A row within a table, named by its opaque address.
    Row(TableId, RowAddress),
}

impl LockObject {
    /// The table this object belongs to.
    pub fn table(&self) -> TableId {
        match *self {
            LockObject::Table(table) => table,
            LockObject::Page(table, _) => table,
            LockObject::Row(table, _) => table,
        }
    }
}

impl std::fmt::Display for LockObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockObject::Table(table) => write!(f, "{}", table),
            LockObject::Page(table, page) => write!(f, "{} of {}", page, table),
            LockObject::Row(table, address) => write!(f, "{} of {}", address, table),
        }
    }
}

/// A lockable object plus the requested access mode.
///
/// Two targets naming the same object under different modes are distinct;
/// a transaction may hold both at once if the matrix allows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LockTarget {
    pub object: LockObject,
    pub access: LockAccess,
}

impl LockTarget {
    pub fn table(table: TableId, access: LockAccess) -> Self {
        LockTarget {
            object: LockObject::Table(table),
            access,
        }
    }

    pub fn page(table: TableId, page: PageId, access: LockAccess) -> Self {
        LockTarget {
            object: LockObject::Page(table, page),
            access,
        }
    }

    pub fn row(table: TableId, address: RowAddress, access: LockAccess) -> Self {
        LockTarget {
            object: LockObject::Row(table, address),
            access,
        }
    }

    /// Whether two targets name the same object, ignoring access mode.
    pub fn same_object(&self, other: &LockTarget) -> bool {
        self.object == other.object
    }
}

impl std::fmt::Display for LockTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} on {}", self.access, self.object)
    }
}

/// Outcome of an acquire or upgrade attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LockResult {
    /// The request could not be granted; the transaction is now waiting
    /// (or, for a no-wait attempt, simply denied).
    pub blocked: bool,
}
