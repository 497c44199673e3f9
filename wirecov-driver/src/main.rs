// SPDX-License-Identifier: Apache-2.0

//! Command line driver for wirecov metrics.
//!
//! Commands are given like:
//!
//! ```text
//! wirecov-driver [--config wirecov.toml] <command> <command-args-and-options>
//! ```
//!
//! Commands are:
//!
//! - calc-metric: Prints the satisfaction rate or wire coverage of a sample
//!   file over an SMT-LIB formula.
//! - coverage-report: Prints per-node wire coverage as JSON.
//! - version: Prints the driver version.
//!
//! Sample usage:
//!
//! ```shell
//! $ cargo run -- calc-metric --formula f.smt2 --samples f.smt2.samples \
//!     --metric wire_coverage --threads 8
//! $ RUST_LOG=info cargo run -- calc-metric --formula f.smt2 \
//!     --samples f.smt2.samples --metric satisfies --progress-every 10000
//! ```

mod calc_metric;
mod common;
mod coverage_report;
mod driver_config;
mod report_cli_error;
mod solver_choice;

use std::path::PathBuf;

use clap::{Arg, ArgAction};
use wirecov::UnknownVariablePolicy;

use crate::calc_metric::MetricKind;
use crate::driver_config::{load_config, DriverConfig, DEFAULT_CONFIG_FILE_NAME};
use crate::report_cli_error::report_cli_error_and_exit;
use crate::solver_choice::SolverChoice;

trait AppExt {
    fn add_input_args(self) -> Self;
    fn add_run_args(self) -> Self;
}

impl AppExt for clap::Command {
    fn add_input_args(self) -> Self {
        (self as clap::Command)
            .arg(
                Arg::new("formula")
                    .long("formula")
                    .value_name("SMT2_FILE")
                    .help("SMT-LIB v2 file holding the formula")
                    .required(true)
                    .action(ArgAction::Set),
            )
            .arg(
                Arg::new("samples")
                    .long("samples")
                    .value_name("SAMPLES_FILE")
                    .help("Sample file, one `<prefix> name:value;...` line per sample")
                    .required(true)
                    .action(ArgAction::Set),
            )
    }

    fn add_run_args(self) -> Self {
        (self as clap::Command)
            .arg(
                Arg::new("threads")
                    .long("threads")
                    .value_name("N")
                    .help("Worker threads for wire coverage (default: CPU count)")
                    .value_parser(clap::value_parser!(usize))
                    .action(ArgAction::Set),
            )
            .arg(
                Arg::new("max_samples")
                    .long("max-samples")
                    .value_name("N")
                    .help("Stop after this many samples")
                    .value_parser(clap::value_parser!(u64))
                    .action(ArgAction::Set),
            )
            .arg(
                Arg::new("progress_every")
                    .long("progress-every")
                    .value_name("N")
                    .help("Log satisfied/total every N samples; 0 disables (default 1000)")
                    .value_parser(clap::value_parser!(u64))
                    .action(ArgAction::Set),
            )
            .arg(
                Arg::new("on_unknown_variable")
                    .long("on-unknown-variable")
                    .value_name("POLICY")
                    .help("fail: abort on a sample missing a variable; skip: count it as unsatisfied")
                    .value_parser(|s: &str| s.parse::<UnknownVariablePolicy>())
                    .action(ArgAction::Set),
            )
    }
}

fn config_from_matches(matches: &clap::ArgMatches) -> Option<DriverConfig> {
    // --config may be given before or after the subcommand.
    let mut path: Option<PathBuf> = matches
        .get_one::<String>("config")
        .or_else(|| {
            matches
                .subcommand()
                .and_then(|(_, sub_matches)| sub_matches.get_one::<String>("config"))
        })
        .map(PathBuf::from);

    // Fall back to a config file in the working directory.
    if path.is_none() {
        let cwd_config = PathBuf::from(DEFAULT_CONFIG_FILE_NAME);
        if cwd_config.exists() {
            log::info!(
                "Using {} in current directory",
                DEFAULT_CONFIG_FILE_NAME
            );
            path = Some(cwd_config);
        }
    }

    path.map(|path| match load_config(&path) {
        Ok(config) => config,
        Err(e) => report_cli_error_and_exit(
            &format!("{:#}", e),
            None,
            vec![("config", &path.display().to_string())],
        ),
    })
}

fn main() {
    let _ = env_logger::try_init();

    log::info!(
        "wirecov-driver starting; version: {}",
        env!("CARGO_PKG_VERSION")
    );

    let matches = clap::Command::new("wirecov-driver")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Satisfaction rate and wire coverage of sample files over SMT-LIB formulas")
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("CONFIG_TOML")
                .help(format!(
                    "Path to a settings file (default: ./{} if present)",
                    DEFAULT_CONFIG_FILE_NAME
                ))
                .global(true)
                .action(ArgAction::Set),
        )
        .subcommand(clap::Command::new("version").about("Prints the version of the driver"))
        .subcommand(
            clap::Command::new("calc-metric")
                .about("Prints the satisfaction rate or wire coverage of the samples")
                .add_input_args()
                .arg(
                    Arg::new("metric")
                        .short('m')
                        .long("metric")
                        .value_name("METRIC")
                        .help("satisfies or wire_coverage")
                        .value_parser(|s: &str| s.parse::<MetricKind>())
                        .required(true)
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("solver")
                        .long("solver")
                        .value_name("SOLVER")
                        .help(format!(
                            "Oracle for the satisfies metric: {} (default eval)",
                            SolverChoice::names().join(", ")
                        ))
                        .value_parser(|s: &str| s.parse::<SolverChoice>())
                        .action(ArgAction::Set),
                )
                .add_run_args(),
        )
        .subcommand(
            clap::Command::new("coverage-report")
                .about("Prints per-node wire coverage of the samples as JSON")
                .add_input_args()
                .add_run_args(),
        )
        .get_matches();

    let config = config_from_matches(&matches);

    if let Some(matches) = matches.subcommand_matches("calc-metric") {
        calc_metric::handle_calc_metric(matches, &config);
    } else if let Some(matches) = matches.subcommand_matches("coverage-report") {
        coverage_report::handle_coverage_report(matches, &config);
    } else if let Some(_matches) = matches.subcommand_matches("version") {
        println!("{}", env!("CARGO_PKG_VERSION"));
    } else {
        report_cli_error_and_exit("No valid subcommand provided.", None, vec![]);
    }
}
