// SPDX-License-Identifier: Apache-2.0

use std::path::Path;
use std::str::FromStr;

use clap::ArgMatches;
use wirecov::parallel::ParallelCoverageRunner;
use wirecov::{
    apply_metric, EvalOracle, ExprModel, Fraction, ManualMetric, Metric, SatisfiesMetric,
};

use crate::common::{load_model, open_samples};
use crate::driver_config::{resolve_run_settings, DriverConfig, RunSettings};
use crate::report_cli_error::report_error_chain_and_exit;
use crate::solver_choice::SolverChoice;

const SUBCOMMAND: &str = "calc-metric";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Satisfies,
    WireCoverage,
}

impl FromStr for MetricKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "satisfies" => Ok(MetricKind::Satisfies),
            "wire_coverage" => Ok(MetricKind::WireCoverage),
            _ => Err(format!(
                "invalid metric: {}; expected satisfies or wire_coverage",
                s
            )),
        }
    }
}

fn drain<M: Metric>(
    mut metric: M,
    samples_path: &Path,
    settings: &RunSettings,
) -> anyhow::Result<Fraction> {
    let samples = open_samples(samples_path)?;
    let counted = apply_metric(&mut metric, samples, settings.max_samples)?;
    let counts = metric.counts();
    log::info!(
        "counted {} samples; satisfied: {}/{}",
        counted,
        counts.satisfied,
        counts.samples
    );
    Ok(metric.result()?)
}

fn satisfies(
    model: &ExprModel,
    samples_path: &Path,
    settings: &RunSettings,
) -> anyhow::Result<Fraction> {
    if settings.threads.map_or(false, |threads| threads > 1) {
        log::warn!("--threads only applies to wire_coverage; running satisfies on one thread");
    }
    match settings.solver {
        SolverChoice::Eval => drain(
            SatisfiesMetric::new(model, EvalOracle::new(model), settings.options),
            samples_path,
            settings,
        ),
        #[cfg(any(feature = "with-z3-system", feature = "with-z3-built"))]
        SolverChoice::Z3 => {
            let cfg = z3::Config::new();
            let ctx = z3::Context::new(&cfg);
            let oracle = wirecov::oracle_z3::Z3Oracle::new(&ctx, model)?;
            drain(
                SatisfiesMetric::new(model, oracle, settings.options),
                samples_path,
                settings,
            )
        }
    }
}

fn wire_coverage(
    model: &ExprModel,
    samples_path: &Path,
    settings: &RunSettings,
) -> anyhow::Result<Fraction> {
    if settings.threads == Some(1) {
        return drain(
            ManualMetric::with_coverage(model, settings.options),
            samples_path,
            settings,
        );
    }
    let mut runner = ParallelCoverageRunner::new(model, settings.options);
    if let Some(threads) = settings.threads {
        runner = runner.with_threads(threads);
    }
    let outcome = runner.run(open_samples(samples_path)?, settings.max_samples)?;
    log::info!(
        "counted {} samples on {} threads; satisfied: {}",
        outcome.counts.samples,
        runner.threads(),
        outcome.counts.satisfied
    );
    Ok(outcome.coverage_result()?)
}

pub fn run_calc_metric(
    formula_path: &Path,
    samples_path: &Path,
    metric: MetricKind,
    settings: &RunSettings,
) -> anyhow::Result<Fraction> {
    let model = load_model(formula_path)?;
    match metric {
        MetricKind::Satisfies => satisfies(&model, samples_path, settings),
        MetricKind::WireCoverage => wire_coverage(&model, samples_path, settings),
    }
}

pub fn handle_calc_metric(matches: &ArgMatches, config: &Option<DriverConfig>) {
    let formula = matches
        .get_one::<String>("formula")
        .expect("formula is required");
    let samples = matches
        .get_one::<String>("samples")
        .expect("samples is required");
    let metric = *matches
        .get_one::<MetricKind>("metric")
        .expect("metric is required");
    let settings = resolve_run_settings(matches, config);
    log::info!("calc-metric settings: {:?}", settings);

    match run_calc_metric(Path::new(formula), Path::new(samples), metric, &settings) {
        Ok(fraction) => println!("{}", fraction),
        Err(e) => report_error_chain_and_exit(
            &e,
            SUBCOMMAND,
            vec![("formula", formula.as_str()), ("samples", samples.as_str())],
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wirecov::MetricOptions;

    fn write(dir: &Path, name: &str, text: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, text).unwrap();
        path
    }

    fn settings(threads: Option<usize>) -> RunSettings {
        RunSettings {
            options: MetricOptions::default(),
            max_samples: None,
            threads,
            solver: SolverChoice::Eval,
        }
    }

    #[test]
    fn test_satisfies_and_coverage_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let formula = write(
            dir.path(),
            "f.smt2",
            "(declare-fun x () Int) (assert (> x 0)) (assert (< x 10))",
        );
        let samples = write(dir.path(), "s.txt", "0: x:5;\n1: x:(- 1);\n2: x:9;\n");
        let rate =
            run_calc_metric(&formula, &samples, MetricKind::Satisfies, &settings(None)).unwrap();
        assert_eq!(rate.to_string(), "2/3");

        let sequential =
            run_calc_metric(&formula, &samples, MetricKind::WireCoverage, &settings(Some(1)))
                .unwrap();
        let parallel =
            run_calc_metric(&formula, &samples, MetricKind::WireCoverage, &settings(Some(3)))
                .unwrap();
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn test_metric_kind_parse() {
        assert_eq!(
            "wire_coverage".parse::<MetricKind>(),
            Ok(MetricKind::WireCoverage)
        );
        assert!("coverage".parse::<MetricKind>().is_err());
    }
}
