// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Wait-for graph deadlock detection
//!
//! Nodes are the pending transactions; an edge runs from a waiter to every
//! transaction holding a lock that is incompatible with the waiter's pending
//! request on the same object. The graph is reduced by repeatedly discarding
//! nodes with no incoming or no outgoing edges; whatever survives contains a
//! cycle. A depth-first walk finds one, the node the walk re-enters becomes
//! the victim, and the process repeats on the remaining graph until it is
//! cycle-free.

use std::collections::{BTreeSet, HashMap};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::buffer::TransactionId;

use super::compat::compatible;
use super::manager::ManagerState;
use super::target::LockTarget;

/// Deadlock report: the victims to roll back, plus the pending and held
/// locks of every transaction that sat on a cycle.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct DeadlockInfo {
    /// One victim per discovered cycle; rolling all of them back breaks
    /// every cycle.
    pub rollbacks: Vec<TransactionId>,
    /// Pending lock of each involved transaction.
    pub pending: HashMap<TransactionId, LockTarget>,
    /// Held locks of each involved transaction that other involved
    /// transactions are waiting on.
    pub acquired: HashMap<TransactionId, Vec<LockTarget>>,
}

impl DeadlockInfo {
    pub fn has_deadlock(&self) -> bool {
        !self.rollbacks.is_empty()
    }
}

struct Node {
    txn: TransactionId,
    pending: LockTarget,
    /// Live incoming edge ids; shrinks during reduction and victim removal.
    ins: Vec<usize>,
    /// Live outgoing edge ids.
    outs: Vec<usize>,
    /// Incoming edge ids as built, kept for the final report.
    all_ins: Vec<usize>,
    // depth-first walk state
    previous: Option<usize>,
    next_out: isize,
    touched: bool,
}

impl Node {
    fn new(txn: TransactionId, pending: LockTarget) -> Self {
        Node {
            txn,
            pending,
            ins: Vec::new(),
            outs: Vec::new(),
            all_ins: Vec::new(),
            previous: None,
            next_out: -1,
            touched: false,
        }
    }
}

struct Edge {
    from: usize,
    to: usize,
    /// Indices into the holder's held-lock list that justify this edge.
    to_acquired: Vec<usize>,
}

/// Run detection over the manager state. Read-only: the caller consumes
/// `rollbacks` and issues the actual aborts.
pub(crate) fn detect(state: &ManagerState) -> DeadlockInfo {
    let (mut nodes, edges) = build_graph(state);
    let mut active: BTreeSet<usize> = (0..nodes.len()).collect();
    let mut involved: BTreeSet<usize> = BTreeSet::new();
    let mut info = DeadlockInfo::default();

    loop {
        reduce(&mut nodes, &edges, &mut active);
        let Some(entry) = find_cycle(&mut nodes, &edges, &active) else {
            break;
        };
        save_cycle(&nodes, entry, &mut involved);
        remove_node(&mut nodes, &edges, &mut active, entry);
        warn!("deadlock cycle found, selected {} as victim", nodes[entry].txn);
        info.rollbacks.push(nodes[entry].txn);
    }

    for &id in &involved {
        let node = &nodes[id];
        info.pending.insert(node.txn, node.pending);

        let mut indices: BTreeSet<usize> = BTreeSet::new();
        for &edge in &node.all_ins {
            if involved.contains(&edges[edge].from) {
                indices.extend(edges[edge].to_acquired.iter().copied());
            }
        }
        if !indices.is_empty() {
            let held = &state.transactions[&node.txn].held;
            info.acquired
                .insert(node.txn, indices.iter().map(|&i| held[i]).collect());
        }
    }

    if !info.rollbacks.is_empty() {
        debug!(
            "deadlock report: {} victims, {} involved transactions",
            info.rollbacks.len(),
            involved.len()
        );
    }
    info
}

/// One node per pending transaction; one edge per (waiter, holder) pair with
/// at least one incompatible held lock on the waiter's pending object.
fn build_graph(state: &ManagerState) -> (Vec<Node>, Vec<Edge>) {
    let mut nodes = Vec::new();
    for bucket in state.pending.values() {
        for &txn in &bucket.transactions {
            let pending = state
                .transactions
                .get(&txn)
                .and_then(|info| info.pending)
                .unwrap_or_else(|| {
                    panic!("queued {txn} has no pending lock: pending queue is corrupted")
                });
            nodes.push(Node::new(txn, pending));
        }
    }

    let mut edges = Vec::new();
    for from in 0..nodes.len() {
        let pending = nodes[from].pending;
        for to in 0..nodes.len() {
            let holder = &state.transactions[&nodes[to].txn];
            let justification: Vec<usize> = holder
                .held
                .iter()
                .enumerate()
                .filter(|(_, held)| {
                    held.same_object(&pending) && !compatible(pending.access, held.access)
                })
                .map(|(index, _)| index)
                .collect();

            if !justification.is_empty() {
                let edge = edges.len();
                edges.push(Edge {
                    from,
                    to,
                    to_acquired: justification,
                });
                nodes[from].outs.push(edge);
                nodes[to].ins.push(edge);
                nodes[to].all_ins.push(edge);
            }
        }
    }
    (nodes, edges)
}

/// Repeatedly discard nodes with zero in- or out-degree. Neither can sit on
/// a cycle, and removing one may expose its neighbors for discarding.
fn reduce(nodes: &mut [Node], edges: &[Edge], active: &mut BTreeSet<usize>) {
    let mut worklist: Vec<usize> = active.iter().copied().collect();
    while let Some(id) = worklist.pop() {
        if !active.contains(&id) {
            continue;
        }
        if !nodes[id].ins.is_empty() && !nodes[id].outs.is_empty() {
            continue;
        }
        active.remove(&id);

        let ins = std::mem::take(&mut nodes[id].ins);
        for edge in ins {
            let from = edges[edge].from;
            nodes[from].outs.retain(|&out| out != edge);
            if active.contains(&from) {
                worklist.push(from);
            }
        }
        let outs = std::mem::take(&mut nodes[id].outs);
        for edge in outs {
            let to = edges[edge].to;
            nodes[to].ins.retain(|&inbound| inbound != edge);
            if active.contains(&to) {
                worklist.push(to);
            }
        }
    }
}

/// Depth-first walk over the reduced graph. Returns the first node the walk
/// re-enters; its `previous` chain traces the cycle. `None` when the graph
/// is empty. Every active node has in- and out-degree at least one here, so
/// a non-empty graph must yield a cycle.
fn find_cycle(nodes: &mut [Node], edges: &[Edge], active: &BTreeSet<usize>) -> Option<usize> {
    let start = *active.iter().next()?;
    for &id in active {
        nodes[id].previous = None;
        nodes[id].next_out = -1;
        nodes[id].touched = false;
    }

    let mut current = start;
    loop {
        nodes[current].touched = true;
        nodes[current].next_out += 1;
        let position = nodes[current].next_out as usize;
        if position < nodes[current].outs.len() {
            let next = edges[nodes[current].outs[position]].to;
            if nodes[next].next_out != -1 {
                nodes[next].previous = Some(current);
                return Some(next);
            } else if !nodes[next].touched {
                nodes[next].previous = Some(current);
                current = next;
            }
        } else {
            let previous = nodes[current].previous.take();
            current = previous.unwrap_or_else(|| {
                panic!("wait-for graph reduction left an acyclic graph: deadlock state is corrupted")
            });
        }
    }
}

/// Record every node on the cycle entered at `entry` as involved.
fn save_cycle(nodes: &[Node], entry: usize, involved: &mut BTreeSet<usize>) {
    let mut current = entry;
    loop {
        involved.insert(current);
        current = nodes[current]
            .previous
            .unwrap_or_else(|| panic!("cycle chain broken at node {current}"));
        if current == entry {
            break;
        }
    }
}

/// Detach `victim` from the graph entirely.
fn remove_node(nodes: &mut [Node], edges: &[Edge], active: &mut BTreeSet<usize>, victim: usize) {
    let ins = std::mem::take(&mut nodes[victim].ins);
    for edge in ins {
        let from = edges[edge].from;
        nodes[from].outs.retain(|&out| out != edge);
    }
    let outs = std::mem::take(&mut nodes[victim].outs);
    for edge in outs {
        let to = edges[edge].to;
        nodes[to].ins.retain(|&inbound| inbound != edge);
    }
    active.remove(&victim);
}
