// SPDX-License-Identifier: Apache-2.0

//! `SatOracle` backed by the Z3 SMT solver.

use std::collections::HashMap;

use num_bigint::BigInt;
use z3::{
    ast::{Ast, Bool, Int},
    Context, SatResult, Solver,
};

use crate::expr::{CompareOp, ExprKind, ExprModel};
use crate::oracle::{OracleError, SatOracle, SatVerdict};

enum Z3Value<'ctx> {
    Bool(Bool<'ctx>),
    Int(Int<'ctx>),
}

fn int_literal<'ctx>(ctx: &'ctx Context, value: &BigInt) -> Result<Int<'ctx>, OracleError> {
    Int::from_str(ctx, &value.to_string())
        .ok_or_else(|| OracleError::Solver(format!("z3 rejected integer literal {}", value)))
}

/// Translates every node of `model` in arena order; operands always precede
/// their users.
fn translate_model<'ctx>(ctx: &'ctx Context, model: &ExprModel) -> Result<Bool<'ctx>, OracleError> {
    let mut values: Vec<Z3Value<'ctx>> = Vec::with_capacity(model.len());
    let bool_at = |values: &[Z3Value<'ctx>], index: usize| -> Result<Bool<'ctx>, OracleError> {
        match &values[index] {
            Z3Value::Bool(b) => Ok(b.clone()),
            Z3Value::Int(_) => Err(OracleError::Solver(format!("node n{} is not Bool", index))),
        }
    };
    let int_at = |values: &[Z3Value<'ctx>], index: usize| -> Result<Int<'ctx>, OracleError> {
        match &values[index] {
            Z3Value::Int(i) => Ok(i.clone()),
            Z3Value::Bool(_) => Err(OracleError::Solver(format!("node n{} is not Int", index))),
        }
    };
    for node in model.nodes() {
        let value = match &node.kind {
            ExprKind::And(operands) | ExprKind::Or(operands) => {
                let bools = operands
                    .iter()
                    .map(|id| bool_at(&values, id.index))
                    .collect::<Result<Vec<_>, _>>()?;
                let refs: Vec<&Bool<'ctx>> = bools.iter().collect();
                if matches!(node.kind, ExprKind::And(_)) {
                    Z3Value::Bool(Bool::and(ctx, &refs))
                } else {
                    Z3Value::Bool(Bool::or(ctx, &refs))
                }
            }
            ExprKind::Not(operand) => Z3Value::Bool(bool_at(&values, operand.index)?.not()),
            ExprKind::Compare { op, lhs, rhs } => {
                let lhs = int_at(&values, lhs.index)?;
                let rhs = int_at(&values, rhs.index)?;
                Z3Value::Bool(match op {
                    CompareOp::Le => lhs.le(&rhs),
                    CompareOp::Lt => lhs.lt(&rhs),
                    CompareOp::Gt => lhs.gt(&rhs),
                    CompareOp::Ge => lhs.ge(&rhs),
                    CompareOp::Eq => lhs._eq(&rhs),
                })
            }
            ExprKind::Add(operands) | ExprKind::Mul(operands) => {
                let ints = operands
                    .iter()
                    .map(|id| int_at(&values, id.index))
                    .collect::<Result<Vec<_>, _>>()?;
                let refs: Vec<&Int<'ctx>> = ints.iter().collect();
                if matches!(node.kind, ExprKind::Add(_)) {
                    Z3Value::Int(Int::add(ctx, &refs))
                } else {
                    Z3Value::Int(Int::mul(ctx, &refs))
                }
            }
            ExprKind::Sub { lhs, rhs } => {
                let lhs = int_at(&values, lhs.index)?;
                let rhs = int_at(&values, rhs.index)?;
                Z3Value::Int(Int::sub(ctx, &[&lhs, &rhs]))
            }
            ExprKind::Neg(operand) => Z3Value::Int(int_at(&values, operand.index)?.unary_minus()),
            ExprKind::Literal(value) => Z3Value::Int(int_literal(ctx, value)?),
            ExprKind::Symbol(name) => Z3Value::Int(Int::new_const(ctx, name.as_str())),
        };
        values.push(value);
    }
    bool_at(&values, model.root().index)
}

/// Z3 session holding the formula at its base scope. Integer constants are
/// created by name, so a binding for a name the formula never mentions is a
/// harmless fresh constant.
pub struct Z3Oracle<'ctx> {
    ctx: &'ctx Context,
    solver: Solver<'ctx>,
    constants: HashMap<String, Int<'ctx>>,
    depth: usize,
}

impl<'ctx> Z3Oracle<'ctx> {
    pub fn new(ctx: &'ctx Context, model: &ExprModel) -> Result<Self, OracleError> {
        let solver = Solver::new(ctx);
        let formula = translate_model(ctx, model)?;
        solver.assert(&formula);
        Ok(Self {
            ctx,
            solver,
            constants: HashMap::new(),
            depth: 0,
        })
    }
}

impl<'ctx> SatOracle for Z3Oracle<'ctx> {
    fn push(&mut self) {
        self.solver.push();
        self.depth += 1;
    }

    fn assert_binding(&mut self, name: &str, value: &BigInt) -> Result<(), OracleError> {
        let ctx = self.ctx;
        let constant = self
            .constants
            .entry(name.to_string())
            .or_insert_with(|| Int::new_const(ctx, name));
        let literal = int_literal(ctx, value)?;
        self.solver.assert(&constant._eq(&literal));
        Ok(())
    }

    fn check(&mut self) -> Result<SatVerdict, OracleError> {
        Ok(match self.solver.check() {
            SatResult::Sat => SatVerdict::Sat,
            SatResult::Unsat => SatVerdict::Unsat,
            SatResult::Unknown => SatVerdict::Unknown,
        })
    }

    fn pop(&mut self) -> Result<(), OracleError> {
        if self.depth == 0 {
            return Err(OracleError::ScopeUnderflow);
        }
        self.solver.pop(1);
        self.depth -= 1;
        Ok(())
    }
}
