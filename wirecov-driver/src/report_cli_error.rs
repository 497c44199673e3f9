// SPDX-License-Identifier: Apache-2.0

use colored::Colorize;

pub fn report_cli_error_and_exit(
    message: &str,
    subcommand: Option<&str>,
    details: Vec<(&str, &str)>,
) -> ! {
    let prefix = match subcommand {
        Some(subcommand) => format!("{}: ", subcommand),
        None => String::new(),
    };
    eprintln!("wirecov-driver: {}{}", prefix, message.red().bold());
    for (key, value) in details {
        eprintln!("  {}: {}", key, value);
    }
    std::process::exit(1);
}

/// Reports `error` with each of its causes as a `caused by` detail line.
pub fn report_error_chain_and_exit(
    error: &anyhow::Error,
    subcommand: &str,
    details: Vec<(&str, &str)>,
) -> ! {
    let causes: Vec<String> = error.chain().skip(1).map(|cause| cause.to_string()).collect();
    let mut lines: Vec<(&str, &str)> = details;
    for cause in &causes {
        lines.push(("caused by", cause.as_str()));
    }
    report_cli_error_and_exit(&error.to_string(), Some(subcommand), lines)
}
