// SPDX-License-Identifier: Apache-2.0

//! Reader for the SMT-LIB v2 subset used by integer/boolean sample formulas.
//!
//! Produces a hash-consed `TermStore` plus the list of asserted terms; the
//! formula root is the conjunction of all assertions.

use std::collections::HashMap;

use num_bigint::BigInt;

use crate::term::{TermRef, TermSort, TermStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Smt2ParseError {
    msg: String,
    line: usize,
}

impl Smt2ParseError {
    fn new(msg: String, line: usize) -> Self {
        Self { msg, line }
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn message(&self) -> &str {
        &self.msg
    }
}

impl std::fmt::Display for Smt2ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Smt2ParseError: line {}: {}", self.line, self.msg)
    }
}

impl std::error::Error for Smt2ParseError {}

/// A parsed formula: the terms, the asserted terms in order and the root
/// conjunction over them.
#[derive(Debug, Clone)]
pub struct Formula {
    pub store: TermStore,
    pub assertions: Vec<TermRef>,
    pub root: TermRef,
}

pub fn parse_formula(text: &str) -> Result<Formula, Smt2ParseError> {
    let mut parser = Parser::new(text);
    parser.parse_script()
}

pub fn parse_path_to_formula(path: &std::path::Path) -> Result<Formula, Smt2ParseError> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        Smt2ParseError::new(format!("failed to read {}: {}", path.display(), e), 0)
    })?;
    parse_formula(&text)
}

struct Parser {
    chars: Vec<char>,
    offset: usize,
    store: TermStore,
    declared: HashMap<String, TermRef>,
}

impl Parser {
    fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            offset: 0,
            store: TermStore::new(),
            declared: HashMap::new(),
        }
    }

    fn line(&self) -> usize {
        let end = self.offset.min(self.chars.len());
        1 + self.chars[..end].iter().filter(|c| **c == '\n').count()
    }

    fn error<T>(&self, msg: String) -> Result<T, Smt2ParseError> {
        Err(Smt2ParseError::new(msg, self.line()))
    }

    fn peekc(&self) -> Option<char> {
        self.chars.get(self.offset).copied()
    }

    fn popc(&mut self) -> Option<char> {
        let c = self.peekc();
        if c.is_some() {
            self.offset += 1;
        }
        c
    }

    fn drop_whitespace_and_comments(&mut self) {
        while let Some(c) = self.peekc() {
            if c.is_ascii_whitespace() {
                self.offset += 1;
            } else if c == ';' {
                while let Some(c) = self.popc() {
                    if c == '\n' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    fn at_eof(&mut self) -> bool {
        self.drop_whitespace_and_comments();
        self.offset >= self.chars.len()
    }

    fn peek_is(&mut self, c: char) -> bool {
        self.drop_whitespace_and_comments();
        self.peekc() == Some(c)
    }

    fn drop_or_error(&mut self, want: char, ctx: &str) -> Result<(), Smt2ParseError> {
        self.drop_whitespace_and_comments();
        match self.peekc() {
            Some(c) if c == want => {
                self.offset += 1;
                Ok(())
            }
            Some(c) => self.error(format!("in {} expected {:?}, got {:?}", ctx, want, c)),
            None => self.error(format!("in {} expected {:?}, got EOF", ctx, want)),
        }
    }

    fn is_symbol_char(c: char) -> bool {
        c.is_ascii_alphanumeric() || "~!@$%^&*_-+=<>.?/".contains(c)
    }

    /// Pops a simple or `|quoted|` symbol, or a numeral; the caller decides
    /// which one it wanted.
    fn pop_atom_or_error(&mut self, ctx: &str) -> Result<String, Smt2ParseError> {
        self.drop_whitespace_and_comments();
        if self.peekc() == Some('|') {
            self.offset += 1;
            let mut atom = String::new();
            loop {
                match self.popc() {
                    Some('|') => return Ok(atom),
                    Some(c) => atom.push(c),
                    None => return self.error(format!("in {} unterminated quoted symbol", ctx)),
                }
            }
        }
        let mut atom = String::new();
        while let Some(c) = self.peekc() {
            if !Self::is_symbol_char(c) {
                break;
            }
            atom.push(c);
            self.offset += 1;
        }
        if atom.is_empty() {
            return match self.peekc() {
                Some(c) => self.error(format!("in {} expected symbol, got {:?}", ctx, c)),
                None => self.error(format!("in {} expected symbol, got EOF", ctx)),
            };
        }
        Ok(atom)
    }

    /// Skips the remainder of an s-expression whose opening paren has already
    /// been consumed, including its closing paren.
    fn skip_to_close(&mut self) -> Result<(), Smt2ParseError> {
        let mut depth = 1usize;
        while depth > 0 {
            match self.popc() {
                Some('(') => depth += 1,
                Some(')') => depth -= 1,
                Some('|') => {
                    while let Some(c) = self.popc() {
                        if c == '|' {
                            break;
                        }
                    }
                }
                Some('"') => {
                    while let Some(c) = self.popc() {
                        if c == '"' {
                            break;
                        }
                    }
                }
                Some(';') => {
                    while let Some(c) = self.popc() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                Some(_) => {}
                None => return self.error("unbalanced parentheses at EOF".to_string()),
            }
        }
        Ok(())
    }

    fn parse_sort(&mut self) -> Result<TermSort, Smt2ParseError> {
        if self.peek_is('(') {
            return self.error("parametric sorts are not supported".to_string());
        }
        let name = self.pop_atom_or_error("sort")?;
        Ok(match name.as_str() {
            "Bool" => TermSort::Bool,
            "Int" => TermSort::Int,
            _ => TermSort::Other(name),
        })
    }

    fn declare(&mut self, name: String, sort: TermSort) -> Result<(), Smt2ParseError> {
        if self.declared.contains_key(&name) {
            return self.error(format!("symbol {:?} declared twice", name));
        }
        let term = self.store.constant(&name, sort);
        self.declared.insert(name, term);
        Ok(())
    }

    fn parse_script(&mut self) -> Result<Formula, Smt2ParseError> {
        let mut assertions = Vec::new();
        while !self.at_eof() {
            self.drop_or_error('(', "command")?;
            let command = self.pop_atom_or_error("command")?;
            match command.as_str() {
                "set-logic" | "set-info" | "set-option" => self.skip_to_close()?,
                "declare-fun" => {
                    let name = self.pop_atom_or_error("declare-fun")?;
                    self.drop_or_error('(', "declare-fun")?;
                    if !self.peek_is(')') {
                        return self.error(format!(
                            "declare-fun {:?} has arguments; only constants are supported",
                            name
                        ));
                    }
                    self.drop_or_error(')', "declare-fun")?;
                    let sort = self.parse_sort()?;
                    self.drop_or_error(')', "declare-fun")?;
                    self.declare(name, sort)?;
                }
                "declare-const" => {
                    let name = self.pop_atom_or_error("declare-const")?;
                    let sort = self.parse_sort()?;
                    self.drop_or_error(')', "declare-const")?;
                    self.declare(name, sort)?;
                }
                "assert" => {
                    let term = self.parse_term()?;
                    self.drop_or_error(')', "assert")?;
                    assertions.push(term);
                }
                "check-sat" | "get-model" | "exit" => self.drop_or_error(')', &command)?,
                _ => return self.error(format!("unsupported command {:?}", command)),
            }
        }
        let root = self.store.app("and", assertions.clone());
        Ok(Formula {
            store: std::mem::take(&mut self.store),
            assertions,
            root,
        })
    }

    /// Parses one term. Nesting is tracked on an explicit frame stack, so
    /// deeply nested applications and let-chains do not grow the call stack.
    fn parse_term(&mut self) -> Result<TermRef, Smt2ParseError> {
        let mut frames: Vec<Frame> = Vec::new();
        let mut scopes: Vec<HashMap<String, TermRef>> = Vec::new();
        loop {
            let mut done = self.open_term(&mut frames, &mut scopes)?;
            while let Some(term) = done {
                done = match frames.pop() {
                    None => return Ok(term),
                    Some(Frame::App { op, mut args }) => {
                        args.push(term);
                        self.close_or_continue_app(op, args, &mut frames)?
                    }
                    Some(Frame::LetBinding { mut bindings, name }) => {
                        self.drop_or_error(')', "let binding")?;
                        bindings.insert(name, term);
                        self.next_let_binding(bindings, &mut frames, &mut scopes)?;
                        None
                    }
                    Some(Frame::LetBody) => {
                        scopes.pop();
                        self.drop_or_error(')', "let")?;
                        Some(term)
                    }
                };
            }
        }
    }

    /// Starts the next term. Returns it when it is an atom or an empty
    /// application; otherwise pushes the frame that will collect it.
    fn open_term(
        &mut self,
        frames: &mut Vec<Frame>,
        scopes: &mut Vec<HashMap<String, TermRef>>,
    ) -> Result<Option<TermRef>, Smt2ParseError> {
        if !self.peek_is('(') {
            return self.parse_atom_term(scopes).map(Some);
        }
        self.offset += 1;
        if self.peek_is('(') {
            return self.error("indexed or qualified identifiers are not supported".to_string());
        }
        let op = self.pop_atom_or_error("term")?;
        if op == "let" {
            self.drop_or_error('(', "let bindings")?;
            self.next_let_binding(HashMap::new(), frames, scopes)?;
            return Ok(None);
        }
        self.close_or_continue_app(op, Vec::new(), frames)
    }

    fn close_or_continue_app(
        &mut self,
        op: String,
        args: Vec<TermRef>,
        frames: &mut Vec<Frame>,
    ) -> Result<Option<TermRef>, Smt2ParseError> {
        if self.peek_is(')') {
            self.offset += 1;
            return Ok(Some(self.store.app(&op, args)));
        }
        if self.at_eof() {
            return self.error(format!("unterminated application of {:?}", op));
        }
        frames.push(Frame::App { op, args });
        Ok(None)
    }

    /// Either opens the next `(name term)` binding or, at the end of the
    /// binding list, enters the let body. Bindings are resolved in the
    /// enclosing scope, as SMT-LIB's parallel let requires.
    fn next_let_binding(
        &mut self,
        bindings: HashMap<String, TermRef>,
        frames: &mut Vec<Frame>,
        scopes: &mut Vec<HashMap<String, TermRef>>,
    ) -> Result<(), Smt2ParseError> {
        if self.peek_is(')') {
            self.offset += 1;
            scopes.push(bindings);
            frames.push(Frame::LetBody);
            return Ok(());
        }
        self.drop_or_error('(', "let binding")?;
        let name = self.pop_atom_or_error("let binding")?;
        frames.push(Frame::LetBinding { bindings, name });
        Ok(())
    }

    fn parse_atom_term(
        &mut self,
        scopes: &[HashMap<String, TermRef>],
    ) -> Result<TermRef, Smt2ParseError> {
        let atom = self.pop_atom_or_error("term")?;
        if atom.chars().all(|c| c.is_ascii_digit()) {
            return match atom.parse::<BigInt>() {
                Ok(value) => Ok(self.store.numeral(value)),
                Err(e) => self.error(format!("bad numeral {:?}: {}", atom, e)),
            };
        }
        if atom.starts_with(|c: char| c.is_ascii_digit()) {
            return self.error(format!("unsupported literal {:?}", atom));
        }
        for scope in scopes.iter().rev() {
            if let Some(bound) = scope.get(&atom) {
                return Ok(*bound);
            }
        }
        if let Some(declared) = self.declared.get(&atom) {
            return Ok(*declared);
        }
        if atom == "true" || atom == "false" {
            return Ok(self.store.app(&atom, vec![]));
        }
        self.error(format!("undeclared symbol {:?}", atom))
    }
}

/// A term under construction in `Parser::parse_term`.
enum Frame {
    /// `(op args...`, waiting for the next argument or `)`.
    App { op: String, args: Vec<TermRef> },
    /// Inside `(name `, waiting for the bound term.
    LetBinding {
        bindings: HashMap<String, TermRef>,
        name: String,
    },
    /// The bindings are in scope; waiting for the body.
    LetBody,
}
