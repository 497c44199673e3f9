// SPDX-License-Identifier: Apache-2.0

//! Hash-consed term store: the parsed-formula boundary that the expression
//! model is built from.
//!
//! Interning a term that is structurally identical to one already in the
//! store returns the existing `TermRef`, so shared sub-expressions are the
//! same object and later map to a single expression node.

use std::collections::HashMap;
use std::fmt;

use num_bigint::BigInt;

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct TermRef {
    pub index: usize,
}

#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub enum TermSort {
    Bool,
    Int,
    Other(String),
}

impl fmt::Display for TermSort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TermSort::Bool => write!(f, "Bool"),
            TermSort::Int => write!(f, "Int"),
            TermSort::Other(name) => write!(f, "{}", name),
        }
    }
}

#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub enum Term {
    Numeral(BigInt),
    Const { name: String, sort: TermSort },
    App { op: String, args: Vec<TermRef> },
}

impl Term {
    /// Short name of this term's kind, used when reporting terms that cannot
    /// be represented.
    pub fn kind_name(&self) -> String {
        match self {
            Term::Numeral(_) => "numeral".to_string(),
            Term::Const { sort, .. } => format!("const:{}", sort),
            Term::App { op, .. } => op.clone(),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct TermStore {
    terms: Vec<Term>,
    interned: HashMap<Term, TermRef>,
}

impl TermStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, term: Term) -> TermRef {
        if let Some(existing) = self.interned.get(&term) {
            return *existing;
        }
        let term_ref = TermRef {
            index: self.terms.len(),
        };
        self.terms.push(term.clone());
        self.interned.insert(term, term_ref);
        term_ref
    }

    pub fn numeral(&mut self, value: BigInt) -> TermRef {
        self.intern(Term::Numeral(value))
    }

    pub fn constant(&mut self, name: &str, sort: TermSort) -> TermRef {
        self.intern(Term::Const {
            name: name.to_string(),
            sort,
        })
    }

    pub fn app(&mut self, op: &str, args: Vec<TermRef>) -> TermRef {
        self.intern(Term::App {
            op: op.to_string(),
            args,
        })
    }

    pub fn get(&self, term_ref: TermRef) -> &Term {
        &self.terms[term_ref.index]
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structurally_identical_terms_share_ref() {
        let mut store = TermStore::new();
        let x = store.constant("x", TermSort::Int);
        let one = store.numeral(BigInt::from(1));
        let a = store.app("+", vec![x, one]);
        let b = store.app("+", vec![x, one]);
        assert_eq!(a, b);
        assert_eq!(store.len(), 3);

        let c = store.app("+", vec![one, x]);
        assert_ne!(a, c);
    }

    #[test]
    fn test_kind_names() {
        let mut store = TermStore::new();
        let p = store.constant("p", TermSort::Bool);
        let n = store.numeral(BigInt::from(-3));
        let ite = store.app("ite", vec![p, n, n]);
        assert_eq!(store.get(p).kind_name(), "const:Bool");
        assert_eq!(store.get(n).kind_name(), "numeral");
        assert_eq!(store.get(ite).kind_name(), "ite");
    }
}
