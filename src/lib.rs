// SPDX-License-Identifier: Apache-2.0

//! Satisfaction rate and wire coverage of sample streams over integer
//! formulas.
//!
//! Typical flow: parse a formula with `smt2::parse_formula`, build its
//! `ExprModel`, then drain a `SampleReader` through one of the `metric`
//! engines (or `parallel::ParallelCoverageRunner` for coverage on many
//! threads).

pub mod expr;
pub mod expr_eval;
pub mod fraction;
pub mod metric;
pub mod oracle;
#[cfg(any(feature = "with-z3-system", feature = "with-z3-built"))]
pub mod oracle_z3;
pub mod parallel;
pub mod sample;
pub mod smt2;
pub mod term;
pub mod wire_coverage;

pub use expr::{build_expression_model, BuildError, ExprModel, NodeId, Sort};
pub use expr_eval::{make_evaluator, EvalError, EvalObserver, Evaluator, Value};
pub use fraction::Fraction;
pub use metric::{
    apply_metric, ManualMetric, Metric, MetricError, MetricOptions, SatisfiesMetric,
    UnknownVariablePolicy,
};
pub use oracle::{EvalOracle, OracleError, SatOracle, SatVerdict};
pub use sample::{Sample, SampleParseError, SampleReader};
pub use wire_coverage::CoverageAccumulator;
