// SPDX-License-Identifier: Apache-2.0

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::Context;
use wirecov::smt2::parse_path_to_formula;
use wirecov::{build_expression_model, ExprModel, SampleReader};

pub fn load_model(formula_path: &Path) -> anyhow::Result<ExprModel> {
    let formula = parse_path_to_formula(formula_path)
        .with_context(|| format!("reading formula {}", formula_path.display()))?;
    let model = build_expression_model(&formula.store, formula.root)
        .with_context(|| format!("building expression model for {}", formula_path.display()))?;
    log::info!(
        "loaded formula {}; assertions: {} nodes: {}",
        formula_path.display(),
        formula.assertions.len(),
        model.len()
    );
    Ok(model)
}

pub fn open_samples(samples_path: &Path) -> anyhow::Result<SampleReader<BufReader<File>>> {
    let file = File::open(samples_path)
        .with_context(|| format!("opening samples {}", samples_path.display()))?;
    Ok(SampleReader::new(BufReader::new(file)))
}
