// SPDX-License-Identifier: Apache-2.0

//! Wire coverage: which values each node of a formula has taken across a
//! sample stream.
//!
//! A Bool node is covered once it has been seen both true and false. An Int
//! node contributes 64 bit positions; a position is covered once it has been
//! seen both 0 and 1 in the two's-complement pattern of the node's value.
//! Only the low 64 bits are tracked, so values that differ only above bit 63
//! look identical here.

use num_bigint::{BigInt, Sign};
use serde::Serialize;

use crate::expr::{ExprModel, NodeId, Sort};
use crate::expr_eval::{EvalObserver, Value};
use crate::fraction::Fraction;
use crate::metric::MetricError;

pub const INT_WIRE_BITS: u64 = 64;

/// Low 64 bits of `value`'s two's-complement representation.
pub fn low_u64_twos_complement(value: &BigInt) -> u64 {
    let magnitude_low = value.magnitude().iter_u64_digits().next().unwrap_or(0);
    match value.sign() {
        Sign::Minus => magnitude_low.wrapping_neg(),
        Sign::NoSign | Sign::Plus => magnitude_low,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverageEntry {
    Bool { seen_true: bool, seen_false: bool },
    Int { ever_one: u64, ever_zero: u64 },
}

impl CoverageEntry {
    pub fn new(sort: Sort) -> Self {
        match sort {
            Sort::Bool => CoverageEntry::Bool {
                seen_true: false,
                seen_false: false,
            },
            Sort::Int => CoverageEntry::Int {
                ever_one: 0,
                ever_zero: 0,
            },
        }
    }

    pub fn sort(&self) -> Sort {
        match self {
            CoverageEntry::Bool { .. } => Sort::Bool,
            CoverageEntry::Int { .. } => Sort::Int,
        }
    }

    pub fn observe(&mut self, value: &Value) {
        match (self, value) {
            (
                CoverageEntry::Bool {
                    seen_true,
                    seen_false,
                },
                Value::Bool(b),
            ) => {
                *seen_true |= *b;
                *seen_false |= !*b;
            }
            (
                CoverageEntry::Int {
                    ever_one,
                    ever_zero,
                },
                Value::Int(v),
            ) => {
                let bits = low_u64_twos_complement(v);
                *ever_one |= bits;
                *ever_zero |= !bits;
            }
            (entry, value) => panic!(
                "observed a {:?} value for a {:?} node",
                value.sort(),
                entry.sort()
            ),
        }
    }

    pub fn merge(&mut self, other: &CoverageEntry) {
        match (self, other) {
            (
                CoverageEntry::Bool {
                    seen_true,
                    seen_false,
                },
                CoverageEntry::Bool {
                    seen_true: other_true,
                    seen_false: other_false,
                },
            ) => {
                *seen_true |= *other_true;
                *seen_false |= *other_false;
            }
            (
                CoverageEntry::Int {
                    ever_one,
                    ever_zero,
                },
                CoverageEntry::Int {
                    ever_one: other_one,
                    ever_zero: other_zero,
                },
            ) => {
                *ever_one |= *other_one;
                *ever_zero |= *other_zero;
            }
            (entry, other) => panic!(
                "cannot merge {:?} coverage into {:?} coverage",
                other.sort(),
                entry.sort()
            ),
        }
    }

    pub fn covered(&self) -> u64 {
        match self {
            CoverageEntry::Bool {
                seen_true,
                seen_false,
            } => u64::from(*seen_true && *seen_false),
            CoverageEntry::Int {
                ever_one,
                ever_zero,
            } => u64::from((ever_one & ever_zero).count_ones()),
        }
    }

    pub fn total(&self) -> u64 {
        match self {
            CoverageEntry::Bool { .. } => 1,
            CoverageEntry::Int { .. } => INT_WIRE_BITS,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeCoverage {
    pub node: NodeId,
    pub op: &'static str,
    pub sort: Sort,
    pub covered: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CoverageSummary {
    pub covered: u64,
    pub total: u64,
    pub nodes: Vec<NodeCoverage>,
}

/// Per-node coverage state, keyed by `NodeId`. Entries are created the first
/// time a node is observed and never removed.
#[derive(Debug, Clone, Default)]
pub struct CoverageAccumulator {
    entries: Vec<Option<CoverageEntry>>,
}

impl CoverageAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the all-uncovered entry for `node` if it has none yet.
    pub fn register(&mut self, node: NodeId, sort: Sort) -> &mut CoverageEntry {
        if self.entries.len() <= node.index {
            self.entries.resize(node.index + 1, None);
        }
        self.entries[node.index].get_or_insert_with(|| CoverageEntry::new(sort))
    }

    pub fn observe(&mut self, node: NodeId, value: &Value) {
        self.register(node, value.sort()).observe(value);
    }

    pub fn entry(&self, node: NodeId) -> Option<&CoverageEntry> {
        self.entries.get(node.index).and_then(|e| e.as_ref())
    }

    pub fn registered_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }

    fn registered(&self) -> impl Iterator<Item = (NodeId, &CoverageEntry)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(index, e)| e.as_ref().map(|e| (NodeId { index }, e)))
    }

    /// ORs `other` into `self`. The update is commutative and associative, so
    /// accumulators filled from disjoint parts of a stream can be merged in
    /// any order.
    pub fn merge(&mut self, other: &CoverageAccumulator) {
        for (node, entry) in other.registered() {
            self.register(node, entry.sort()).merge(entry);
        }
    }

    pub fn counts(&self) -> (u64, u64) {
        self.registered().fold((0, 0), |(covered, total), (_, e)| {
            (covered + e.covered(), total + e.total())
        })
    }

    pub fn summary(&self, model: &ExprModel) -> CoverageSummary {
        let nodes: Vec<NodeCoverage> = self
            .registered()
            .map(|(node, entry)| NodeCoverage {
                node,
                op: model.get(node).kind.name(),
                sort: entry.sort(),
                covered: entry.covered(),
                total: entry.total(),
            })
            .collect();
        let (covered, total) = self.counts();
        CoverageSummary {
            covered,
            total,
            nodes,
        }
    }

    /// Covered fraction over all registered nodes; `NoSamples` when nothing
    /// has been observed.
    pub fn result(&self) -> Result<Fraction, MetricError> {
        let (covered, total) = self.counts();
        Fraction::new(covered, total).ok_or(MetricError::NoSamples)
    }
}

impl EvalObserver for CoverageAccumulator {
    fn on_node_value(&mut self, node: NodeId, value: &Value) {
        self.observe(node, value);
    }
}
