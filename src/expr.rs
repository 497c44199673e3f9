// SPDX-License-Identifier: Apache-2.0

//! Immutable expression model of a formula over integers and booleans.
//!
//! Nodes live in an arena in post order: every node's operands have smaller
//! `NodeId`s than the node itself. Each distinct `TermRef` of the source term
//! store maps to exactly one node, so shared sub-expressions are shared nodes.

use std::collections::HashMap;
use std::fmt;

use num_bigint::BigInt;
use serde::Serialize;

use crate::term::{Term, TermRef, TermSort, TermStore};

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize)]
pub struct NodeId {
    pub index: usize,
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.index)
    }
}

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize)]
pub enum Sort {
    Bool,
    Int,
}

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize)]
pub enum CompareOp {
    Le,
    Lt,
    Gt,
    Ge,
    Eq,
}

impl CompareOp {
    pub fn apply(self, lhs: &BigInt, rhs: &BigInt) -> bool {
        match self {
            CompareOp::Le => lhs <= rhs,
            CompareOp::Lt => lhs < rhs,
            CompareOp::Gt => lhs > rhs,
            CompareOp::Ge => lhs >= rhs,
            CompareOp::Eq => lhs == rhs,
        }
    }

    pub fn smt_name(self) -> &'static str {
        match self {
            CompareOp::Le => "<=",
            CompareOp::Lt => "<",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Eq => "=",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprKind {
    And(Vec<NodeId>),
    Or(Vec<NodeId>),
    Not(NodeId),
    Compare {
        op: CompareOp,
        lhs: NodeId,
        rhs: NodeId,
    },
    Add(Vec<NodeId>),
    Sub {
        lhs: NodeId,
        rhs: NodeId,
    },
    Mul(Vec<NodeId>),
    Neg(NodeId),
    Literal(BigInt),
    Symbol(String),
}

impl ExprKind {
    pub fn sort(&self) -> Sort {
        match self {
            ExprKind::And(_) | ExprKind::Or(_) | ExprKind::Not(_) | ExprKind::Compare { .. } => {
                Sort::Bool
            }
            ExprKind::Add(_)
            | ExprKind::Sub { .. }
            | ExprKind::Mul(_)
            | ExprKind::Neg(_)
            | ExprKind::Literal(_)
            | ExprKind::Symbol(_) => Sort::Int,
        }
    }

    pub fn operands(&self) -> Vec<NodeId> {
        match self {
            ExprKind::And(args) | ExprKind::Or(args) | ExprKind::Add(args) | ExprKind::Mul(args) => {
                args.clone()
            }
            ExprKind::Not(arg) | ExprKind::Neg(arg) => vec![*arg],
            ExprKind::Compare { lhs, rhs, .. } | ExprKind::Sub { lhs, rhs } => vec![*lhs, *rhs],
            ExprKind::Literal(_) | ExprKind::Symbol(_) => vec![],
        }
    }

    /// Short operator name, e.g. for per-node reports.
    pub fn name(&self) -> &'static str {
        match self {
            ExprKind::And(_) => "and",
            ExprKind::Or(_) => "or",
            ExprKind::Not(_) => "not",
            ExprKind::Compare { op, .. } => op.smt_name(),
            ExprKind::Add(_) => "+",
            ExprKind::Sub { .. } => "-",
            ExprKind::Mul(_) => "*",
            ExprKind::Neg(_) => "neg",
            ExprKind::Literal(_) => "literal",
            ExprKind::Symbol(_) => "symbol",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExprNode {
    pub id: NodeId,
    pub kind: ExprKind,
}

impl ExprNode {
    pub fn sort(&self) -> Sort {
        self.kind.sort()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// The formula contains a term the model cannot represent; carries the
    /// offending term's kind name.
    UnsupportedExpression(String),
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::UnsupportedExpression(kind) => {
                write!(f, "unsupported expression: {}", kind)
            }
        }
    }
}

impl std::error::Error for BuildError {}

#[derive(Debug, Clone)]
pub struct ExprModel {
    nodes: Vec<ExprNode>,
    root: NodeId,
}

impl ExprModel {
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn nodes(&self) -> &[ExprNode] {
        &self.nodes
    }

    pub fn get(&self, id: NodeId) -> &ExprNode {
        &self.nodes[id.index]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Names of all variables referenced by `Symbol` nodes, in node order.
    pub fn symbol_names(&self) -> Vec<&str> {
        self.nodes
            .iter()
            .filter_map(|node| match &node.kind {
                ExprKind::Symbol(name) => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn count_by_sort(&self, sort: Sort) -> usize {
        self.nodes.iter().filter(|n| n.sort() == sort).count()
    }
}

/// Builds the expression model rooted at `root`.
pub fn build_expression_model(store: &TermStore, root: TermRef) -> Result<ExprModel, BuildError> {
    let mut builder = ModelBuilder {
        store,
        nodes: Vec::new(),
        memo: HashMap::new(),
    };
    let root_id = builder.build(root)?;
    if builder.nodes[root_id.index].sort() != Sort::Bool {
        return Err(BuildError::UnsupportedExpression(format!(
            "non-boolean root ({})",
            store.get(root).kind_name()
        )));
    }
    log::debug!(
        "built expression model; terms: {} nodes: {} root: {}",
        store.len(),
        builder.nodes.len(),
        root_id
    );
    Ok(ExprModel {
        nodes: builder.nodes,
        root: root_id,
    })
}

struct ModelBuilder<'a> {
    store: &'a TermStore,
    nodes: Vec<ExprNode>,
    memo: HashMap<TermRef, NodeId>,
}

impl<'a> ModelBuilder<'a> {
    fn unsupported<T>(&self, term_ref: TermRef) -> Result<T, BuildError> {
        Err(BuildError::UnsupportedExpression(
            self.store.get(term_ref).kind_name(),
        ))
    }

    fn add(&mut self, kind: ExprKind) -> NodeId {
        let id = NodeId {
            index: self.nodes.len(),
        };
        self.nodes.push(ExprNode { id, kind });
        id
    }

    /// Node for an already built operand of `parent`, which must have sort
    /// `want`.
    fn operand(&self, arg: TermRef, want: Sort, parent: TermRef) -> Result<NodeId, BuildError> {
        match self.memo.get(&arg) {
            Some(id) if self.nodes[id.index].sort() == want => Ok(*id),
            _ => self.unsupported(parent),
        }
    }

    fn operands(
        &self,
        args: &[TermRef],
        want: Sort,
        parent: TermRef,
    ) -> Result<Vec<NodeId>, BuildError> {
        args.iter()
            .map(|arg| self.operand(*arg, want, parent))
            .collect()
    }

    /// Builds `root` and everything below it in post order. Terms are
    /// visited from an explicit stack, so deep terms do not grow the call
    /// stack.
    fn build(&mut self, root: TermRef) -> Result<NodeId, BuildError> {
        let store = self.store;
        // (term, operands already built)
        let mut stack: Vec<(TermRef, bool)> = vec![(root, false)];
        while let Some((term_ref, operands_built)) = stack.pop() {
            if self.memo.contains_key(&term_ref) {
                continue;
            }
            if operands_built {
                let kind = self.lower(term_ref)?;
                let id = self.add(kind);
                self.memo.insert(term_ref, id);
                continue;
            }
            match store.get(term_ref) {
                Term::Numeral(_)
                | Term::Const {
                    sort: TermSort::Int,
                    ..
                } => {}
                Term::Const { .. } => return self.unsupported(term_ref),
                Term::App { op, args } => {
                    if !is_supported_app(op, args.len()) {
                        return self.unsupported(term_ref);
                    }
                    stack.push((term_ref, true));
                    stack.extend(
                        args.iter()
                            .rev()
                            .filter(|arg| !self.memo.contains_key(*arg))
                            .map(|arg| (*arg, false)),
                    );
                    continue;
                }
            }
            stack.push((term_ref, true));
        }
        match self.memo.get(&root) {
            Some(id) => Ok(*id),
            None => self.unsupported(root),
        }
    }

    /// Lowers one term whose operands are all built.
    fn lower(&self, term_ref: TermRef) -> Result<ExprKind, BuildError> {
        Ok(match self.store.get(term_ref) {
            Term::Numeral(value) => ExprKind::Literal(value.clone()),
            Term::Const {
                name,
                sort: TermSort::Int,
            } => ExprKind::Symbol(name.clone()),
            Term::Const { .. } => return self.unsupported(term_ref),
            Term::App { op, args } => match (op.as_str(), args.len()) {
                ("and", _) => ExprKind::And(self.operands(args, Sort::Bool, term_ref)?),
                ("or", _) => ExprKind::Or(self.operands(args, Sort::Bool, term_ref)?),
                ("not", 1) => ExprKind::Not(self.operand(args[0], Sort::Bool, term_ref)?),
                ("<=" | "<" | ">" | ">=" | "=", 2) => {
                    let op = match op.as_str() {
                        "<=" => CompareOp::Le,
                        "<" => CompareOp::Lt,
                        ">" => CompareOp::Gt,
                        ">=" => CompareOp::Ge,
                        _ => CompareOp::Eq,
                    };
                    let lhs = self.operand(args[0], Sort::Int, term_ref)?;
                    let rhs = self.operand(args[1], Sort::Int, term_ref)?;
                    ExprKind::Compare { op, lhs, rhs }
                }
                ("+", n) if n >= 1 => ExprKind::Add(self.operands(args, Sort::Int, term_ref)?),
                ("*", n) if n >= 1 => ExprKind::Mul(self.operands(args, Sort::Int, term_ref)?),
                ("-", 1) => ExprKind::Neg(self.operand(args[0], Sort::Int, term_ref)?),
                ("-", 2) => {
                    let lhs = self.operand(args[0], Sort::Int, term_ref)?;
                    let rhs = self.operand(args[1], Sort::Int, term_ref)?;
                    ExprKind::Sub { lhs, rhs }
                }
                _ => return self.unsupported(term_ref),
            },
        })
    }
}

/// Whether an application of `op` to `arity` operands has an `ExprKind`.
/// Checked before the operands are visited.
fn is_supported_app(op: &str, arity: usize) -> bool {
    match op {
        "and" | "or" => true,
        "not" => arity == 1,
        "<=" | "<" | ">" | ">=" | "=" => arity == 2,
        "+" | "*" => arity >= 1,
        "-" => arity == 1 || arity == 2,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smt2::parse_formula;
    use test_case::test_case;

    fn build(text: &str) -> Result<ExprModel, BuildError> {
        let formula = parse_formula(text).unwrap();
        build_expression_model(&formula.store, formula.root)
    }

    #[test]
    fn test_nodes_are_post_ordered() {
        let model = build(
            "(declare-fun x () Int)
(declare-fun y () Int)
(assert (or (> (+ x y) 3) (not (= (* x 2) (- y)))))",
        )
        .unwrap();
        for node in model.nodes() {
            for operand in node.kind.operands() {
                assert!(operand < node.id, "{:?} precedes {:?}", operand, node.id);
            }
        }
        assert_eq!(model.root().index, model.len() - 1);
        assert_eq!(model.get(model.root()).kind.name(), "and");
    }

    #[test]
    fn test_shared_subterm_is_one_node() {
        let model = build(
            "(declare-fun x () Int)
(assert (> (+ x 1) 0))
(assert (< (+ x 1) 10))",
        )
        .unwrap();
        let adds = model
            .nodes()
            .iter()
            .filter(|n| matches!(n.kind, ExprKind::Add(_)))
            .count();
        assert_eq!(adds, 1);
        assert_eq!(model.symbol_names(), vec!["x"]);
    }

    #[test]
    fn test_unary_minus_is_neg_and_binary_is_sub() {
        let model = build(
            "(declare-fun x () Int)
(assert (= (- x) (- x 1)))",
        )
        .unwrap();
        assert!(model.nodes().iter().any(|n| matches!(n.kind, ExprKind::Neg(_))));
        assert!(model.nodes().iter().any(|n| matches!(n.kind, ExprKind::Sub { .. })));
    }

    #[test_case("(declare-fun p () Bool) (assert p)", "const:Bool"; "bool constant")]
    #[test_case("(declare-fun x () Int) (assert (> (ite (> x 0) 1 2) 0))", "ite"; "ite")]
    #[test_case("(declare-fun x () Int) (assert (> (div x 2) 0))", "div"; "div")]
    #[test_case("(declare-fun x () Int) (assert (distinct x 1))", "distinct"; "distinct")]
    #[test_case("(declare-fun x () Int) (assert (> (- x 1 2) 0))", "-"; "ternary minus")]
    #[test_case("(declare-fun x () Int) (assert (= (> x 1) (> x 2)))", "="; "bool equality")]
    #[test_case("(declare-fun x () Int) (assert (and (> x 1) x))", "and"; "int operand of and")]
    #[test_case("(assert true)", "true"; "true literal")]
    fn test_unsupported(text: &str, kind: &str) {
        assert_eq!(
            build(text).unwrap_err(),
            BuildError::UnsupportedExpression(kind.to_string())
        );
    }

    #[test]
    fn test_int_root_is_rejected() {
        let mut store = TermStore::new();
        let x = store.constant("x", TermSort::Int);
        let err = build_expression_model(&store, x).unwrap_err();
        assert!(matches!(err, BuildError::UnsupportedExpression(_)));
    }

    #[test]
    fn test_deep_term_builds_without_recursion() {
        let depth = 20_000;
        let mut store = TermStore::new();
        let x = store.constant("x", TermSort::Int);
        let one = store.numeral(BigInt::from(1));
        let mut sum = x;
        for _ in 0..depth {
            sum = store.app("+", vec![sum, one]);
        }
        let zero = store.numeral(BigInt::from(0));
        let cmp = store.app(">", vec![sum, zero]);
        let root = store.app("and", vec![cmp]);
        let model = build_expression_model(&store, root).unwrap();
        assert_eq!(model.len(), depth + 5);
        assert_eq!(model.get(NodeId { index: 0 }).kind.name(), "symbol");
        assert_eq!(model.root().index, model.len() - 1);
        for node in model.nodes() {
            for operand in node.kind.operands() {
                assert!(operand < node.id);
            }
        }
    }
}
