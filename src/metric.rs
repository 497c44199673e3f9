// SPDX-License-Identifier: Apache-2.0

//! Metric engines: drain a sample stream and produce a fraction.
//!
//! `SatisfiesMetric` asks a `SatOracle` about each sample. `ManualMetric`
//! evaluates the formula itself and, when built with a coverage accumulator,
//! reports wire coverage instead of the satisfaction rate.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::expr::ExprModel;
use crate::expr_eval::{make_evaluator, EvalError, EvalObserver, Evaluator, Value};
use crate::fraction::Fraction;
use crate::oracle::{OracleError, SatOracle, SatVerdict};
use crate::sample::{Sample, SampleParseError};
use crate::wire_coverage::CoverageAccumulator;

pub const DEFAULT_PROGRESS_EVERY: u64 = 1000;

/// What to do with a sample that lacks a value for a formula variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownVariablePolicy {
    /// Abort the run with `UnknownVariable`.
    #[default]
    Fail,
    /// Warn, count the sample as unsatisfied and make no coverage
    /// observation for it.
    Skip,
}

impl FromStr for UnknownVariablePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fail" => Ok(UnknownVariablePolicy::Fail),
            "skip" => Ok(UnknownVariablePolicy::Skip),
            other => Err(format!(
                "invalid unknown-variable policy {:?}; expected fail or skip",
                other
            )),
        }
    }
}

impl fmt::Display for UnknownVariablePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnknownVariablePolicy::Fail => write!(f, "fail"),
            UnknownVariablePolicy::Skip => write!(f, "skip"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricOptions {
    /// Log a progress line every this many samples; zero disables it.
    pub progress_every: u64,
    pub on_unknown_variable: UnknownVariablePolicy,
}

impl Default for MetricOptions {
    fn default() -> Self {
        Self {
            progress_every: DEFAULT_PROGRESS_EVERY,
            on_unknown_variable: UnknownVariablePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SatisfiedCounts {
    pub satisfied: u64,
    pub samples: u64,
}

impl SatisfiedCounts {
    pub fn record(&mut self, satisfied: bool) {
        self.samples += 1;
        if satisfied {
            self.satisfied += 1;
        }
    }

    pub fn merge(&mut self, other: &SatisfiedCounts) {
        self.satisfied += other.satisfied;
        self.samples += other.samples;
    }

    pub fn fraction(&self) -> Result<Fraction, MetricError> {
        Fraction::new(self.satisfied, self.samples).ok_or(MetricError::NoSamples)
    }
}

#[derive(Debug)]
pub enum MetricError {
    /// No sample was counted, so there is no fraction to report.
    NoSamples,
    Eval(EvalError),
    Oracle(OracleError),
    Sample(SampleParseError),
}

impl fmt::Display for MetricError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricError::NoSamples => write!(f, "no samples were processed"),
            MetricError::Eval(e) => write!(f, "{}", e),
            MetricError::Oracle(e) => write!(f, "{}", e),
            MetricError::Sample(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for MetricError {}

impl From<EvalError> for MetricError {
    fn from(e: EvalError) -> Self {
        MetricError::Eval(e)
    }
}

impl From<OracleError> for MetricError {
    fn from(e: OracleError) -> Self {
        MetricError::Oracle(e)
    }
}

impl From<SampleParseError> for MetricError {
    fn from(e: SampleParseError) -> Self {
        MetricError::Sample(e)
    }
}

pub trait Metric {
    fn count_sample(&mut self, sample: &Sample) -> Result<(), MetricError>;
    fn result(&self) -> Result<Fraction, MetricError>;
    fn counts(&self) -> SatisfiedCounts;
}

fn report_progress(counts: &SatisfiedCounts, options: &MetricOptions) {
    if options.progress_every != 0 && counts.samples % options.progress_every == 0 {
        log::info!("{}/{}", counts.satisfied, counts.samples);
    }
}

/// Satisfaction rate decided by an oracle session. An `Unknown` verdict is
/// counted as unsatisfied.
///
/// Samples are checked against the formula's variables before the oracle
/// sees them, so a missing variable follows `on_unknown_variable` the same
/// way it does for `ManualMetric`.
pub struct SatisfiesMetric<O: SatOracle> {
    oracle: O,
    variables: Vec<String>,
    options: MetricOptions,
    counts: SatisfiedCounts,
}

impl<O: SatOracle> SatisfiesMetric<O> {
    pub fn new(model: &ExprModel, oracle: O, options: MetricOptions) -> Self {
        Self {
            oracle,
            variables: model
                .symbol_names()
                .into_iter()
                .map(str::to_string)
                .collect(),
            options,
            counts: SatisfiedCounts::default(),
        }
    }

    fn missing_variable(&self, sample: &Sample) -> Option<&str> {
        self.variables
            .iter()
            .map(String::as_str)
            .find(|name| sample.get(name).is_none())
    }

    pub fn into_oracle(self) -> O {
        self.oracle
    }
}

impl<O: SatOracle> Metric for SatisfiesMetric<O> {
    fn count_sample(&mut self, sample: &Sample) -> Result<(), MetricError> {
        if let Some(name) = self.missing_variable(sample) {
            match self.options.on_unknown_variable {
                UnknownVariablePolicy::Fail => {
                    return Err(EvalError::UnknownVariable(name.to_string()).into());
                }
                UnknownVariablePolicy::Skip => {
                    log::warn!("sample has no value for {}; counting it as unsatisfied", name);
                    self.counts.record(false);
                    report_progress(&self.counts, &self.options);
                    return Ok(());
                }
            }
        }
        let verdict = self.oracle.check_sample(sample)?;
        if verdict == SatVerdict::Unknown {
            log::warn!(
                "oracle returned unknown for sample {}; counting it as unsatisfied",
                self.counts.samples + 1
            );
        }
        self.counts.record(verdict == SatVerdict::Sat);
        report_progress(&self.counts, &self.options);
        Ok(())
    }

    fn result(&self) -> Result<Fraction, MetricError> {
        self.counts.fraction()
    }

    fn counts(&self) -> SatisfiedCounts {
        self.counts
    }
}

/// Evaluates the formula directly. With a coverage accumulator attached,
/// `result()` is the wire coverage rather than the satisfaction rate.
pub struct ManualMetric {
    evaluator: Evaluator,
    options: MetricOptions,
    counts: SatisfiedCounts,
    coverage: Option<CoverageAccumulator>,
}

impl ManualMetric {
    pub fn new(model: &ExprModel, options: MetricOptions) -> Self {
        Self {
            evaluator: make_evaluator(model),
            options,
            counts: SatisfiedCounts::default(),
            coverage: None,
        }
    }

    pub fn with_coverage(model: &ExprModel, options: MetricOptions) -> Self {
        Self {
            coverage: Some(CoverageAccumulator::new()),
            ..Self::new(model, options)
        }
    }

    pub fn coverage(&self) -> Option<&CoverageAccumulator> {
        self.coverage.as_ref()
    }

    pub fn into_coverage(self) -> Option<CoverageAccumulator> {
        self.coverage
    }
}

impl Metric for ManualMetric {
    fn count_sample(&mut self, sample: &Sample) -> Result<(), MetricError> {
        let observer = self
            .coverage
            .as_mut()
            .map(|coverage| coverage as &mut dyn EvalObserver);
        let satisfied = match self.evaluator.evaluate(sample, observer) {
            Ok(value) => value == Value::Bool(true),
            Err(EvalError::UnknownVariable(name))
                if self.options.on_unknown_variable == UnknownVariablePolicy::Skip =>
            {
                log::warn!("sample has no value for {}; counting it as unsatisfied", name);
                false
            }
            Err(e) => return Err(e.into()),
        };
        self.counts.record(satisfied);
        report_progress(&self.counts, &self.options);
        Ok(())
    }

    fn result(&self) -> Result<Fraction, MetricError> {
        match &self.coverage {
            Some(coverage) => coverage.result(),
            None => self.counts.fraction(),
        }
    }

    fn counts(&self) -> SatisfiedCounts {
        self.counts
    }
}

/// Feeds `samples` to `metric` in order, stopping at the first stream error
/// or after `max_samples` samples. Returns the number of samples counted.
pub fn apply_metric<M, I>(
    metric: &mut M,
    samples: I,
    max_samples: Option<u64>,
) -> Result<u64, MetricError>
where
    M: Metric + ?Sized,
    I: IntoIterator<Item = Result<Sample, SampleParseError>>,
{
    let mut counted = 0u64;
    let mut samples = samples.into_iter();
    while max_samples.map_or(true, |max| counted < max) {
        let Some(sample) = samples.next() else {
            break;
        };
        metric.count_sample(&sample?)?;
        counted += 1;
    }
    log::debug!("counted {} samples", counted);
    Ok(counted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::build_expression_model;
    use crate::oracle::EvalOracle;
    use crate::sample::SampleReader;
    use crate::smt2::parse_formula;
    use pretty_assertions::assert_eq;

    fn model(text: &str) -> ExprModel {
        let formula = parse_formula(text).unwrap();
        build_expression_model(&formula.store, formula.root).unwrap()
    }

    fn range_model() -> ExprModel {
        model("(declare-fun x () Int) (assert (> x 0)) (assert (< x 10))")
    }

    fn stream(text: &str) -> SampleReader<&[u8]> {
        SampleReader::new(text.as_bytes())
    }

    #[test]
    fn test_satisfaction_rate_both_engines() {
        let model = range_model();
        let text = "0: x:5;\n1: x:(- 1);\n2: x:9;\n";

        let mut manual = ManualMetric::new(&model, MetricOptions::default());
        assert_eq!(apply_metric(&mut manual, stream(text), None).unwrap(), 3);
        assert_eq!(
            manual.counts(),
            SatisfiedCounts {
                satisfied: 2,
                samples: 3
            }
        );
        assert_eq!(manual.result().unwrap().to_string(), "2/3");

        let mut satisfies =
            SatisfiesMetric::new(&model, EvalOracle::new(&model), MetricOptions::default());
        apply_metric(&mut satisfies, stream(text), None).unwrap();
        assert_eq!(satisfies.counts(), manual.counts());
        assert_eq!(satisfies.result().unwrap(), manual.result().unwrap());
    }

    #[test]
    fn test_coverage_mode_replaces_satisfaction_rate() {
        let model = model("(declare-fun x () Int) (assert (> x 0))");
        let mut metric = ManualMetric::with_coverage(&model, MetricOptions::default());
        apply_metric(&mut metric, stream("0: x:1;\n1: x:(- 1);\n"), None).unwrap();
        assert_eq!(metric.counts().satisfied, 1);
        assert_eq!(metric.result().unwrap().to_string(), "1/2");
        assert_eq!(metric.coverage().unwrap().counts(), (65, 130));
    }

    #[test]
    fn test_empty_stream_has_no_result() {
        let model = range_model();
        let mut manual = ManualMetric::new(&model, MetricOptions::default());
        let mut covered = ManualMetric::with_coverage(&model, MetricOptions::default());
        assert_eq!(apply_metric(&mut manual, stream(""), None).unwrap(), 0);
        assert_eq!(apply_metric(&mut covered, stream("\n\n"), None).unwrap(), 0);
        assert!(matches!(manual.result(), Err(MetricError::NoSamples)));
        assert!(matches!(covered.result(), Err(MetricError::NoSamples)));
    }

    #[test]
    fn test_unknown_variable_fails_by_default() {
        let model = range_model();
        let mut metric = ManualMetric::with_coverage(&model, MetricOptions::default());
        let err = apply_metric(&mut metric, stream("0: x:5;\n1: y:5;\n2: x:6;\n"), None)
            .unwrap_err();
        assert!(matches!(err, MetricError::Eval(EvalError::UnknownVariable(ref n)) if n == "x"));
        assert_eq!(metric.counts().samples, 1);
    }

    #[test]
    fn test_unknown_variable_skip_policy() {
        let model = range_model();
        let options = MetricOptions {
            on_unknown_variable: UnknownVariablePolicy::Skip,
            ..MetricOptions::default()
        };
        let mut metric = ManualMetric::with_coverage(&model, options);
        apply_metric(&mut metric, stream("0: y:5;\n"), None).unwrap();
        assert_eq!(
            metric.counts(),
            SatisfiedCounts {
                satisfied: 0,
                samples: 1
            }
        );
        assert_eq!(metric.coverage().unwrap().registered_count(), 0);
        assert!(matches!(metric.result(), Err(MetricError::NoSamples)));

        apply_metric(&mut metric, stream("0: x:5;\n"), None).unwrap();
        assert_eq!(
            metric.counts(),
            SatisfiedCounts {
                satisfied: 1,
                samples: 2
            }
        );
    }

    #[test]
    fn test_satisfies_unknown_variable_fails_by_default() {
        let model = range_model();
        let mut metric =
            SatisfiesMetric::new(&model, EvalOracle::new(&model), MetricOptions::default());
        let err = apply_metric(&mut metric, stream("0: x:5;\n1: y:5;\n2: x:6;\n"), None)
            .unwrap_err();
        assert!(matches!(err, MetricError::Eval(EvalError::UnknownVariable(ref n)) if n == "x"));
        assert_eq!(metric.counts().samples, 1);
    }

    #[test]
    fn test_satisfies_unknown_variable_skip_policy() {
        let model = range_model();
        let options = MetricOptions {
            on_unknown_variable: UnknownVariablePolicy::Skip,
            ..MetricOptions::default()
        };
        let mut metric = SatisfiesMetric::new(&model, EvalOracle::new(&model), options);
        apply_metric(&mut metric, stream("0: x:5;\n1: y:5;\n"), None).unwrap();
        assert_eq!(metric.result().unwrap().to_string(), "1/2");
        assert_eq!(metric.into_oracle().scope_depth(), 0);
    }

    /// An oracle that cannot decide anything.
    struct UndecidedOracle;

    impl SatOracle for UndecidedOracle {
        fn push(&mut self) {}

        fn assert_binding(
            &mut self,
            _name: &str,
            _value: &num_bigint::BigInt,
        ) -> Result<(), OracleError> {
            Ok(())
        }

        fn check(&mut self) -> Result<SatVerdict, OracleError> {
            Ok(SatVerdict::Unknown)
        }

        fn pop(&mut self) -> Result<(), OracleError> {
            Ok(())
        }
    }

    #[test]
    fn test_unknown_verdict_counts_as_unsatisfied() {
        let model = range_model();
        let mut metric = SatisfiesMetric::new(&model, UndecidedOracle, MetricOptions::default());
        apply_metric(&mut metric, stream("0: x:5;\n1: x:6;\n"), None).unwrap();
        assert_eq!(
            metric.counts(),
            SatisfiedCounts {
                satisfied: 0,
                samples: 2
            }
        );
        assert_eq!(metric.result().unwrap().to_string(), "0");
    }

    #[test]
    fn test_stream_error_stops_consumption() {
        let model = range_model();
        let mut metric = ManualMetric::new(&model, MetricOptions::default());
        let err = apply_metric(&mut metric, stream("0: x:5;\n1: x:five;\n2: x:6;\n"), None)
            .unwrap_err();
        assert!(matches!(err, MetricError::Sample(ref e) if e.line() == 2));
        assert_eq!(metric.counts().samples, 1);
    }

    #[test]
    fn test_max_samples_caps_the_run() {
        let model = range_model();
        let mut metric = ManualMetric::new(&model, MetricOptions::default());
        let counted =
            apply_metric(&mut metric, stream("0: x:5;\n1: x:50;\n2: x:bad;\n"), Some(2)).unwrap();
        assert_eq!(counted, 2);
        assert_eq!(metric.result().unwrap().to_string(), "1/2");
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!(
            "skip".parse::<UnknownVariablePolicy>(),
            Ok(UnknownVariablePolicy::Skip)
        );
        assert_eq!(UnknownVariablePolicy::Fail.to_string(), "fail");
        assert!("ignore".parse::<UnknownVariablePolicy>().is_err());
    }
}
