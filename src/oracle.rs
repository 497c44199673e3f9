// SPDX-License-Identifier: Apache-2.0

//! Scoped satisfiability sessions used by the satisfies metric.
//!
//! A session holds the formula at its base scope. Callers open a scope with
//! `push`, assert variable bindings into it, `check`, and `pop` to discard
//! the bindings again.

use std::fmt;

use num_bigint::BigInt;

use crate::expr::ExprModel;
use crate::expr_eval::{make_evaluator, EvalError, Evaluator, Value};
use crate::sample::Sample;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SatVerdict {
    Sat,
    Unsat,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    /// `pop` without a matching `push`.
    ScopeUnderflow,
    Solver(String),
}

impl fmt::Display for OracleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OracleError::ScopeUnderflow => write!(f, "pop without a matching push"),
            OracleError::Solver(msg) => write!(f, "solver error: {}", msg),
        }
    }
}

impl std::error::Error for OracleError {}

pub trait SatOracle {
    fn push(&mut self);
    fn assert_binding(&mut self, name: &str, value: &BigInt) -> Result<(), OracleError>;
    fn check(&mut self) -> Result<SatVerdict, OracleError>;
    fn pop(&mut self) -> Result<(), OracleError>;

    /// Checks the formula under `sample`'s bindings in a fresh scope. Only the
    /// last binding of a repeated name is asserted.
    fn check_sample(&mut self, sample: &Sample) -> Result<SatVerdict, OracleError> {
        self.push();
        let bindings = sample.bindings();
        let verdict = bindings
            .iter()
            .enumerate()
            .filter(|(i, (name, _))| !bindings[i + 1..].iter().any(|(later, _)| later == name))
            .try_for_each(|(_, (name, value))| self.assert_binding(name, value))
            .and_then(|()| self.check());
        self.pop()?;
        verdict
    }
}

/// Decides the formula by evaluating it under the asserted bindings. Only
/// complete assignments are decided; a formula variable without a binding
/// makes the verdict `Unknown`.
pub struct EvalOracle {
    evaluator: Evaluator,
    bindings: Vec<(String, BigInt)>,
    scope_starts: Vec<usize>,
}

impl EvalOracle {
    pub fn new(model: &ExprModel) -> Self {
        Self {
            evaluator: make_evaluator(model),
            bindings: Vec::new(),
            scope_starts: Vec::new(),
        }
    }

    pub fn scope_depth(&self) -> usize {
        self.scope_starts.len()
    }
}

impl SatOracle for EvalOracle {
    fn push(&mut self) {
        self.scope_starts.push(self.bindings.len());
    }

    fn assert_binding(&mut self, name: &str, value: &BigInt) -> Result<(), OracleError> {
        self.bindings.push((name.to_string(), value.clone()));
        Ok(())
    }

    fn check(&mut self) -> Result<SatVerdict, OracleError> {
        let sample = Sample::new(self.bindings.clone());
        match self.evaluator.evaluate(&sample, None) {
            Ok(Value::Bool(true)) => Ok(SatVerdict::Sat),
            Ok(Value::Bool(false)) => Ok(SatVerdict::Unsat),
            Ok(Value::Int(_)) => Err(OracleError::Solver(
                "formula root evaluated to an integer".to_string(),
            )),
            Err(EvalError::UnknownVariable(name)) => {
                log::debug!("no binding for {}; verdict unknown", name);
                Ok(SatVerdict::Unknown)
            }
        }
    }

    fn pop(&mut self) -> Result<(), OracleError> {
        let start = self
            .scope_starts
            .pop()
            .ok_or(OracleError::ScopeUnderflow)?;
        self.bindings.truncate(start);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::build_expression_model;
    use crate::smt2::parse_formula;

    fn range_oracle() -> EvalOracle {
        let formula =
            parse_formula("(declare-fun x () Int) (assert (> x 0)) (assert (< x 10))").unwrap();
        let model = build_expression_model(&formula.store, formula.root).unwrap();
        EvalOracle::new(&model)
    }

    #[test]
    fn test_check_sample() {
        let mut oracle = range_oracle();
        let inside: Sample = vec![("x", 5)].into_iter().collect();
        let outside: Sample = vec![("x", -1)].into_iter().collect();
        assert_eq!(oracle.check_sample(&inside), Ok(SatVerdict::Sat));
        assert_eq!(oracle.check_sample(&outside), Ok(SatVerdict::Unsat));
        assert_eq!(oracle.scope_depth(), 0);
    }

    #[test]
    fn test_nested_scopes_discard_bindings() {
        let mut oracle = range_oracle();
        oracle.push();
        oracle.assert_binding("x", &BigInt::from(3)).unwrap();
        assert_eq!(oracle.check(), Ok(SatVerdict::Sat));
        oracle.push();
        oracle.assert_binding("x", &BigInt::from(30)).unwrap();
        assert_eq!(oracle.check(), Ok(SatVerdict::Unsat));
        oracle.pop().unwrap();
        assert_eq!(oracle.check(), Ok(SatVerdict::Sat));
        oracle.pop().unwrap();
        assert_eq!(oracle.check(), Ok(SatVerdict::Unknown));
    }

    #[test]
    fn test_pop_underflow() {
        let mut oracle = range_oracle();
        assert_eq!(oracle.pop(), Err(OracleError::ScopeUnderflow));
    }

    #[test]
    fn test_missing_binding_is_unknown() {
        let mut oracle = range_oracle();
        let sample: Sample = vec![("y", 5)].into_iter().collect();
        assert_eq!(oracle.check_sample(&sample), Ok(SatVerdict::Unknown));
    }

    #[derive(Default)]
    struct RecordingOracle {
        asserted: Vec<(String, BigInt)>,
    }

    impl SatOracle for RecordingOracle {
        fn push(&mut self) {}

        fn assert_binding(&mut self, name: &str, value: &BigInt) -> Result<(), OracleError> {
            self.asserted.push((name.to_string(), value.clone()));
            Ok(())
        }

        fn check(&mut self) -> Result<SatVerdict, OracleError> {
            Ok(SatVerdict::Sat)
        }

        fn pop(&mut self) -> Result<(), OracleError> {
            Ok(())
        }
    }

    #[test]
    fn test_repeated_name_asserts_last_binding_only() {
        let mut oracle = RecordingOracle::default();
        let sample: Sample = vec![("x", 1), ("y", 7), ("x", 2)].into_iter().collect();
        oracle.check_sample(&sample).unwrap();
        assert_eq!(
            oracle.asserted,
            vec![
                ("y".to_string(), BigInt::from(7)),
                ("x".to_string(), BigInt::from(2))
            ]
        );

        let mut eval = range_oracle();
        let sample: Sample = vec![("x", 50), ("x", 5)].into_iter().collect();
        assert_eq!(eval.check_sample(&sample), Ok(SatVerdict::Sat));
    }
}
