// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Lock mode compatibility matrix

use super::target::LockAccess;

/// Row = requested mode, column = existing granted mode.
///
/// This is the classical multi-granularity matrix for
/// IS / S / U / IX / SIX / X under the `LockAccess` discriminant order.
const COMPATIBILITY: [[bool; LockAccess::COUNT]; LockAccess::COUNT] = [
    // existing:  IS     S      U      IX     SIX    X
    /* IS  */ [true, true, true, true, true, false],
    /* S   */ [true, true, true, false, false, false],
    /* U   */ [true, true, false, false, false, false],
    /* IX  */ [true, false, false, true, false, false],
    /* SIX */ [true, false, false, false, false, false],
    /* X   */ [false, false, false, false, false, false],
];

/// True when a new request of `requested` may coexist with an existing
/// holder of `existing` on the same object.
pub(crate) fn compatible(requested: LockAccess, existing: LockAccess) -> bool {
    COMPATIBILITY[requested.index()][existing.index()]
}
