// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Buffer manager interface and storage handle types
//!
//! The lock manager never inspects pages or rows itself. It names them
//! through opaque handles and asks the buffer manager to resolve row
//! addresses into their physical (page, offset) position.

use serde::{Deserialize, Serialize};

/// Identifier of a table registered with the lock manager.
///
/// Table ids are dense: the id doubles as an index into the manager's
/// per-table lock slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TableId(u32);

impl TableId {
    pub const fn new(index: u32) -> Self {
        TableId(index)
    }

    /// Position of this table in dense per-table storage.
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for TableId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "table_{}", self.0)
    }
}

/// Unique identifier for a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransactionId(u64);

impl TransactionId {
    pub const fn new(id: u64) -> Self {
        TransactionId(id)
    }

    /// Get the underlying ID value
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "txn_{}", self.0)
    }
}

/// Identifier of a buffer page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PageId(u64);

impl PageId {
    pub const fn new(id: u64) -> Self {
        PageId(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "page_{}", self.0)
    }
}

/// Opaque address of a row inside a source file.
///
/// Only the buffer manager can decode it; the lock manager treats it as an
/// identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RowAddress(u64);

impl RowAddress {
    pub const fn new(raw: u64) -> Self {
        RowAddress(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for RowAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "addr_{:x}", self.0)
    }
}

/// Identifier of the source file backing a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceId(u64);

impl SourceId {
    pub const fn new(id: u64) -> Self {
        SourceId(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "source_{}", self.0)
    }
}

/// Pointer resolution service provided by the buffer/page manager.
///
/// Both methods are called with the lock manager's mutex held; they must not
/// block on I/O and must not call back into the lock manager.
pub trait BufferManager: Send + Sync {
    /// Decode a row address into its owning page and the row's offset within
    /// that page. `None` means the address is unknown to the buffer manager.
    fn decode_pointer(&self, address: RowAddress) -> Option<(PageId, u64)>;

    /// The index page backing a source file, or `None` when the source has
    /// none and cannot host a table.
    fn index_page(&self, source: SourceId) -> Option<PageId>;
}
