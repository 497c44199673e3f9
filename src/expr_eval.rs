// SPDX-License-Identifier: Apache-2.0

//! Evaluator for `ExprModel`s.
//!
//! The model is compiled once into a table of steps indexed by `NodeId`, with
//! every variable resolved to a dense slot. Evaluating a sample walks the
//! table in order, so each node is computed exactly once per sample no matter
//! how many parents share it, and `and`/`or` always evaluate every operand.

use std::fmt;

use num_bigint::BigInt;
use num_traits::{One, Zero};

use crate::expr::{CompareOp, ExprKind, ExprModel, NodeId, Sort};
use crate::sample::Sample;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Bool(bool),
    Int(BigInt),
}

impl Value {
    pub fn sort(&self) -> Sort {
        match self {
            Value::Bool(_) => Sort::Bool,
            Value::Int(_) => Sort::Int,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(_) => None,
        }
    }

    pub fn as_int(&self) -> Option<&BigInt> {
        match self {
            Value::Int(v) => Some(v),
            Value::Bool(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(v) => write!(f, "{}", v),
        }
    }
}

/// Receives every node value as it is computed, operands before the nodes
/// that use them.
pub trait EvalObserver {
    fn on_node_value(&mut self, node: NodeId, value: &Value);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    /// The sample has no binding for a variable the formula references.
    UnknownVariable(String),
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalError::UnknownVariable(name) => {
                write!(f, "sample has no value for variable {:?}", name)
            }
        }
    }
}

impl std::error::Error for EvalError {}

#[derive(Debug, Clone)]
enum Step {
    And(Vec<usize>),
    Or(Vec<usize>),
    Not(usize),
    Compare(CompareOp, usize, usize),
    Add(Vec<usize>),
    Sub(usize, usize),
    Mul(Vec<usize>),
    Neg(usize),
    Literal(BigInt),
    Slot(usize),
}

fn indices(ids: &[NodeId]) -> Vec<usize> {
    ids.iter().map(|id| id.index).collect()
}

fn bool_at(values: &[Value], index: usize) -> bool {
    match &values[index] {
        Value::Bool(b) => *b,
        Value::Int(_) => unreachable!("node {} is Int-sorted where Bool was required", index),
    }
}

fn int_at(values: &[Value], index: usize) -> &BigInt {
    match &values[index] {
        Value::Int(v) => v,
        Value::Bool(_) => unreachable!("node {} is Bool-sorted where Int was required", index),
    }
}

fn eval_step(step: &Step, values: &[Value], slot_values: &[BigInt]) -> Value {
    match step {
        Step::And(args) => Value::Bool(args.iter().all(|arg| bool_at(values, *arg))),
        Step::Or(args) => Value::Bool(args.iter().any(|arg| bool_at(values, *arg))),
        Step::Not(arg) => Value::Bool(!bool_at(values, *arg)),
        Step::Compare(op, lhs, rhs) => {
            Value::Bool(op.apply(int_at(values, *lhs), int_at(values, *rhs)))
        }
        Step::Add(args) => Value::Int(
            args.iter()
                .fold(BigInt::zero(), |acc, arg| acc + int_at(values, *arg)),
        ),
        Step::Sub(lhs, rhs) => Value::Int(int_at(values, *lhs) - int_at(values, *rhs)),
        Step::Mul(args) => Value::Int(
            args.iter()
                .fold(BigInt::one(), |acc, arg| acc * int_at(values, *arg)),
        ),
        Step::Neg(arg) => Value::Int(-int_at(values, *arg)),
        Step::Literal(v) => Value::Int(v.clone()),
        Step::Slot(slot) => Value::Int(slot_values[*slot].clone()),
    }
}

#[derive(Debug, Clone)]
pub struct Evaluator {
    steps: Vec<Step>,
    slot_names: Vec<String>,
    root: NodeId,
    slot_values: Vec<BigInt>,
    values: Vec<Value>,
}

pub fn make_evaluator(model: &ExprModel) -> Evaluator {
    Evaluator::new(model)
}

impl Evaluator {
    pub fn new(model: &ExprModel) -> Self {
        let mut slot_names: Vec<String> = Vec::new();
        let mut steps = Vec::with_capacity(model.len());
        for node in model.nodes() {
            let step = match &node.kind {
                ExprKind::And(args) => Step::And(indices(args)),
                ExprKind::Or(args) => Step::Or(indices(args)),
                ExprKind::Not(arg) => Step::Not(arg.index),
                ExprKind::Compare { op, lhs, rhs } => Step::Compare(*op, lhs.index, rhs.index),
                ExprKind::Add(args) => Step::Add(indices(args)),
                ExprKind::Sub { lhs, rhs } => Step::Sub(lhs.index, rhs.index),
                ExprKind::Mul(args) => Step::Mul(indices(args)),
                ExprKind::Neg(arg) => Step::Neg(arg.index),
                ExprKind::Literal(value) => Step::Literal(value.clone()),
                ExprKind::Symbol(name) => {
                    // Symbol terms are hash-consed, so each name appears once.
                    slot_names.push(name.clone());
                    Step::Slot(slot_names.len() - 1)
                }
            };
            steps.push(step);
        }
        let slot_values = vec![BigInt::zero(); slot_names.len()];
        Self {
            steps,
            slot_names,
            root: model.root(),
            slot_values,
            values: Vec::with_capacity(model.len()),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Variables the formula references, in slot order.
    pub fn variable_names(&self) -> &[String] {
        &self.slot_names
    }

    /// Resolves every variable against `sample`. Fails before any node is
    /// evaluated, so a sample with a missing variable is never partially
    /// observed.
    fn bind(&mut self, sample: &Sample) -> Result<(), EvalError> {
        let map = sample.to_map();
        for (slot, name) in self.slot_names.iter().enumerate() {
            match map.get(name.as_str()) {
                Some(value) => self.slot_values[slot].clone_from(value),
                None => return Err(EvalError::UnknownVariable(name.clone())),
            }
        }
        Ok(())
    }

    /// Evaluates every node for `sample`, reporting each value to `observer`
    /// as it is computed, and returns the root's value.
    pub fn evaluate(
        &mut self,
        sample: &Sample,
        mut observer: Option<&mut dyn EvalObserver>,
    ) -> Result<Value, EvalError> {
        self.bind(sample)?;
        let steps = &self.steps;
        let slot_values = &self.slot_values;
        let values = &mut self.values;
        values.clear();
        for (index, step) in steps.iter().enumerate() {
            let value = eval_step(step, values, slot_values);
            values.push(value);
            if let Some(observer) = observer.as_deref_mut() {
                observer.on_node_value(NodeId { index }, &values[index]);
            }
        }
        Ok(values[self.root.index].clone())
    }

    /// Value of `node` for the most recently evaluated sample.
    pub fn node_value(&self, node: NodeId) -> Option<&Value> {
        self.values.get(node.index)
    }
}
