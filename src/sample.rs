// SPDX-License-Identifier: Apache-2.0

//! Samples (variable assignments) and the reader for sampler output files.
//!
//! One sample per line:
//!
//! ```text
//! <prefix> x:5;y:(- 3);z:0;
//! ```
//!
//! The first space-separated token is ignored. Values may use the SMT-LIB
//! spelling of negative numbers.

use std::collections::HashMap;
use std::io::BufRead;

use num_bigint::BigInt;

/// One assignment of integer values to variables. When a name appears more
/// than once the last binding wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sample {
    bindings: Vec<(String, BigInt)>,
}

impl Sample {
    pub fn new(bindings: Vec<(String, BigInt)>) -> Self {
        Self { bindings }
    }

    pub fn bindings(&self) -> &[(String, BigInt)] {
        &self.bindings
    }

    pub fn get(&self, name: &str) -> Option<&BigInt> {
        self.bindings
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn to_map(&self) -> HashMap<&str, &BigInt> {
        self.bindings
            .iter()
            .map(|(name, value)| (name.as_str(), value))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl<S: Into<String>, V: Into<BigInt>> FromIterator<(S, V)> for Sample {
    fn from_iter<I: IntoIterator<Item = (S, V)>>(iter: I) -> Self {
        Self {
            bindings: iter
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        }
    }
}

#[derive(Debug)]
pub enum SampleParseError {
    Io { line: usize, error: std::io::Error },
    Malformed { line: usize, msg: String },
}

impl SampleParseError {
    pub fn line(&self) -> usize {
        match self {
            SampleParseError::Io { line, .. } | SampleParseError::Malformed { line, .. } => *line,
        }
    }
}

impl std::fmt::Display for SampleParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SampleParseError::Io { line, error } => {
                write!(f, "failed reading sample line {}: {}", line, error)
            }
            SampleParseError::Malformed { line, msg } => {
                write!(f, "malformed sample on line {}: {}", line, msg)
            }
        }
    }
}

impl std::error::Error for SampleParseError {}

fn parse_value(text: &str) -> Option<BigInt> {
    let cleaned: String = text
        .chars()
        .filter(|c| *c != '(' && *c != ')' && !c.is_whitespace())
        .collect();
    cleaned.parse::<BigInt>().ok()
}

/// Parses one line of sampler output; `line_number` is only used for error
/// reporting.
pub fn parse_sample_line(line: &str, line_number: usize) -> Result<Sample, SampleParseError> {
    let malformed = |msg: String| SampleParseError::Malformed {
        line: line_number,
        msg,
    };
    let (_, rest) = line
        .split_once(' ')
        .ok_or_else(|| malformed(format!("expected a prefix before the assignments: {:?}", line)))?;
    let body = rest.trim_matches(|c: char| c == ';' || c == ' ' || c == '\n' || c == '\r');
    if body.is_empty() {
        return Err(malformed("no assignments".to_string()));
    }
    let mut bindings = Vec::new();
    for entry in body.split(';') {
        let (name, value) = entry
            .split_once(':')
            .ok_or_else(|| malformed(format!("expected name:value, got {:?}", entry)))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(malformed(format!("empty variable name in {:?}", entry)));
        }
        let value = parse_value(value)
            .ok_or_else(|| malformed(format!("bad integer value for {}: {:?}", name, value)))?;
        bindings.push((name.to_string(), value));
    }
    Ok(Sample { bindings })
}

/// Lazily reads samples from a buffered reader, one per non-blank line.
pub struct SampleReader<R: BufRead> {
    lines: std::io::Lines<R>,
    line_number: usize,
}

impl<R: BufRead> SampleReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_number: 0,
        }
    }
}

impl<R: BufRead> Iterator for SampleReader<R> {
    type Item = Result<Sample, SampleParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = self.lines.next()?;
            self.line_number += 1;
            let line = match line {
                Ok(line) => line,
                Err(error) => {
                    return Some(Err(SampleParseError::Io {
                        line: self.line_number,
                        error,
                    }))
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            return Some(parse_sample_line(&line, self.line_number));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_line_with_negative_values() {
        let sample = parse_sample_line("12: x:5;y:(- 3);z:0;", 1).unwrap();
        let want: Sample = vec![("x", 5), ("y", -3), ("z", 0)].into_iter().collect();
        assert_eq!(sample, want);
    }

    #[test]
    fn test_last_binding_wins() {
        let sample = parse_sample_line("0: x:1;x:2", 1).unwrap();
        assert_eq!(sample.get("x"), Some(&BigInt::from(2)));
        assert_eq!(sample.to_map()["x"], &BigInt::from(2));
        assert_eq!(sample.get("y"), None);
    }

    #[test]
    fn test_large_values_are_exact() {
        let sample = parse_sample_line("0: big:(- 123456789012345678901234567890);", 1).unwrap();
        assert_eq!(
            sample.get("big").unwrap().to_string(),
            "-123456789012345678901234567890"
        );
    }

    #[test]
    fn test_malformed_lines() {
        assert!(matches!(
            parse_sample_line("nospace", 3),
            Err(SampleParseError::Malformed { line: 3, .. })
        ));
        assert!(matches!(
            parse_sample_line("0: x=1;", 4),
            Err(SampleParseError::Malformed { line: 4, .. })
        ));
        assert!(matches!(
            parse_sample_line("0: x:abc;", 5),
            Err(SampleParseError::Malformed { line: 5, .. })
        ));
        assert!(matches!(
            parse_sample_line("0: ;", 6),
            Err(SampleParseError::Malformed { line: 6, .. })
        ));
    }

    #[test]
    fn test_reader_skips_blank_lines_and_counts_lines() {
        let text = "0: x:1;\n\n1: x:2;\n2: x:oops;\n";
        let results: Vec<_> = SampleReader::new(text.as_bytes()).collect();
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[1].is_ok());
        assert_eq!(results[2].as_ref().unwrap_err().line(), 4);
    }
}
