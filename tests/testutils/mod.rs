//! Shared fixtures for lock manager integration tests

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use locklite::{BufferManager, LockManager, PageId, RowAddress, SourceId};

/// Buffer manager stub backed by a fixed pointer map.
///
/// Row addresses decode to whatever the test wired up; every source has an
/// index page unless explicitly marked missing.
#[derive(Default)]
pub struct StubBufferManager {
    rows: HashMap<RowAddress, (PageId, u64)>,
    missing_sources: HashSet<SourceId>,
}

impl StubBufferManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_row(mut self, address: RowAddress, page: PageId, offset: u64) -> Self {
        self.rows.insert(address, (page, offset));
        self
    }

    pub fn without_source(mut self, source: SourceId) -> Self {
        self.missing_sources.insert(source);
        self
    }
}

impl BufferManager for StubBufferManager {
    fn decode_pointer(&self, address: RowAddress) -> Option<(PageId, u64)> {
        self.rows.get(&address).copied()
    }

    fn index_page(&self, source: SourceId) -> Option<PageId> {
        if self.missing_sources.contains(&source) {
            None
        } else {
            Some(PageId::new(0))
        }
    }
}

pub fn manager() -> LockManager {
    LockManager::new(Arc::new(StubBufferManager::new()))
}

pub fn manager_with(buffer: StubBufferManager) -> LockManager {
    LockManager::new(Arc::new(buffer))
}
