// SPDX-License-Identifier: Apache-2.0

//! Optional `wirecov.toml` settings. Every field can also be given as a
//! command line flag; the flag wins when both are present.
//!
//! ```toml
//! [metrics]
//! progress_every = 5000
//! on_unknown_variable = "skip"
//! max_samples = 100000
//! threads = 8
//! solver = "eval"
//! ```

use std::path::Path;

use anyhow::Context;
use clap::ArgMatches;
use serde::Deserialize;
use wirecov::{MetricOptions, UnknownVariablePolicy};

use crate::solver_choice::SolverChoice;

pub const DEFAULT_CONFIG_FILE_NAME: &str = "wirecov.toml";

#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DriverConfig {
    /// Log a `satisfied/total` line every this many samples (0 disables).
    pub progress_every: Option<u64>,
    pub on_unknown_variable: Option<UnknownVariablePolicy>,
    /// Stop after this many samples.
    pub max_samples: Option<u64>,
    /// Worker threads for wire coverage; defaults to the CPU count.
    pub threads: Option<usize>,
    pub solver: Option<SolverChoice>,
}

#[derive(Deserialize)]
struct WirecovToml {
    metrics: DriverConfig,
}

pub fn parse_config(text: &str) -> anyhow::Result<DriverConfig> {
    let parsed: WirecovToml = toml::from_str(text)?;
    Ok(parsed.metrics)
}

pub fn load_config(path: &Path) -> anyhow::Result<DriverConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    parse_config(&text).with_context(|| format!("parsing config file {}", path.display()))
}

/// Settings for one metric run after merging flags over the config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSettings {
    pub options: MetricOptions,
    pub max_samples: Option<u64>,
    pub threads: Option<usize>,
    pub solver: SolverChoice,
}

fn flag_or<T: Clone + Send + Sync + 'static>(
    matches: &ArgMatches,
    id: &str,
    from_config: Option<T>,
) -> Option<T> {
    // Not every subcommand defines every flag.
    let from_flag = matches.try_get_one::<T>(id).ok().flatten();
    from_flag.cloned().or(from_config)
}

pub fn resolve_run_settings(matches: &ArgMatches, config: &Option<DriverConfig>) -> RunSettings {
    let config = config.clone().unwrap_or_default();
    let defaults = MetricOptions::default();
    RunSettings {
        options: MetricOptions {
            progress_every: flag_or(matches, "progress_every", config.progress_every)
                .unwrap_or(defaults.progress_every),
            on_unknown_variable: flag_or(
                matches,
                "on_unknown_variable",
                config.on_unknown_variable,
            )
            .unwrap_or(defaults.on_unknown_variable),
        },
        max_samples: flag_or(matches, "max_samples", config.max_samples),
        threads: flag_or(matches, "threads", config.threads),
        solver: flag_or(matches, "solver", config.solver).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_full_config() {
        let config = parse_config(
            r#"
[metrics]
progress_every = 10
on_unknown_variable = "skip"
max_samples = 7
threads = 3
solver = "eval"
"#,
        )
        .unwrap();
        assert_eq!(
            config,
            DriverConfig {
                progress_every: Some(10),
                on_unknown_variable: Some(UnknownVariablePolicy::Skip),
                max_samples: Some(7),
                threads: Some(3),
                solver: Some(SolverChoice::Eval),
            }
        );
    }

    #[test]
    fn test_empty_metrics_table() {
        assert_eq!(parse_config("[metrics]\n").unwrap(), DriverConfig::default());
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        assert!(parse_config("[metrics]\nthread = 3\n").is_err());
        assert!(parse_config("[metrics]\non_unknown_variable = \"ignore\"\n").is_err());
    }
}
