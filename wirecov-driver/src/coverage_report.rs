// SPDX-License-Identifier: Apache-2.0

use std::path::Path;

use clap::ArgMatches;
use serde::Serialize;
use wirecov::parallel::ParallelCoverageRunner;
use wirecov::wire_coverage::CoverageSummary;
use wirecov::Fraction;

use crate::common::{load_model, open_samples};
use crate::driver_config::{resolve_run_settings, DriverConfig, RunSettings};
use crate::report_cli_error::report_error_chain_and_exit;

#[derive(Debug, Serialize)]
pub struct CoverageReport {
    pub formula: String,
    pub samples: u64,
    pub satisfied: u64,
    /// Wire coverage as `covered/total` in lowest terms.
    pub coverage: String,
    pub coverage_ratio: f64,
    #[serde(flatten)]
    pub summary: CoverageSummary,
}

pub fn run_coverage_report(
    formula_path: &Path,
    samples_path: &Path,
    settings: &RunSettings,
) -> anyhow::Result<CoverageReport> {
    let model = load_model(formula_path)?;
    let mut runner = ParallelCoverageRunner::new(&model, settings.options);
    if let Some(threads) = settings.threads {
        runner = runner.with_threads(threads);
    }
    let outcome = runner.run(open_samples(samples_path)?, settings.max_samples)?;
    let coverage: Fraction = outcome.coverage_result()?;
    Ok(CoverageReport {
        formula: formula_path.display().to_string(),
        samples: outcome.counts.samples,
        satisfied: outcome.counts.satisfied,
        coverage: coverage.to_string(),
        coverage_ratio: coverage.to_f64(),
        summary: outcome.coverage.summary(&model),
    })
}

pub fn handle_coverage_report(matches: &ArgMatches, config: &Option<DriverConfig>) {
    let formula = matches
        .get_one::<String>("formula")
        .expect("formula is required");
    let samples = matches
        .get_one::<String>("samples")
        .expect("samples is required");
    let settings = resolve_run_settings(matches, config);

    let report = run_coverage_report(Path::new(formula), Path::new(samples), &settings)
        .and_then(|report| Ok(serde_json::to_string_pretty(&report)?));
    match report {
        Ok(json) => println!("{}", json),
        Err(e) => report_error_chain_and_exit(
            &e,
            "coverage-report",
            vec![("formula", formula.as_str()), ("samples", samples.as_str())],
        ),
    }
}
