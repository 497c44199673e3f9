// SPDX-License-Identifier: Apache-2.0

//! Oracle backend for the `satisfies` metric, selectable on the command line
//! and in the config file.

use serde::Deserialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SolverChoice {
    /// Decide each sample by evaluating the formula directly.
    #[default]
    Eval,
    #[cfg(any(feature = "with-z3-system", feature = "with-z3-built"))]
    Z3,
}

impl SolverChoice {
    pub fn names() -> Vec<&'static str> {
        let mut names = vec!["eval"];
        if cfg!(any(feature = "with-z3-system", feature = "with-z3-built")) {
            names.push("z3");
        }
        names
    }
}

impl fmt::Display for SolverChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SolverChoice::Eval => "eval",
            #[cfg(any(feature = "with-z3-system", feature = "with-z3-built"))]
            SolverChoice::Z3 => "z3",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for SolverChoice {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "eval" => Ok(Self::Eval),
            #[cfg(any(feature = "with-z3-system", feature = "with-z3-built"))]
            "z3" => Ok(Self::Z3),
            _ => Err(format!(
                "invalid solver: {}; available: {}",
                s,
                Self::names().join(", ")
            )),
        }
    }
}
