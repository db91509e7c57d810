//! Solver-independent constraint language.
//!
//! A [`Problem`] is a list of symbols and a list of constraints over them.
//! Constraints come in two forms:
//!
//! - [`Constraint::Define`] fixes a symbol to the value of one operator
//!   application over terms (constants or earlier symbols). Every
//!   intermediate arithmetic result gets its own symbol, so definitions are
//!   flat and appear before their first use.
//! - [`Constraint::Assert`] requires a formula to hold.
//!
//! Symbols that no definition fixes are *free*: they are what a solver
//! chooses. A definition whose operator fails (division by zero, negative
//! exponent, `i64` overflow) rules the assignment out, exactly as the same
//! failure aborts a concrete run.

use std::collections::BTreeSet;
use std::fmt;

use crate::expr::{AOp, AUnOp, CmpOp, LogicOp, Value};

/// Index of a symbol inside its [`Problem`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SymId(u32);

impl SymId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SymId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Sort {
    Int,
    Bool,
}

/// Where a symbol comes from.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum Origin {
    /// Value of a variable read before any write on the path.
    Initial(String),
    /// The `index`-th value read by an `input` statement on the path.
    Input { var: String, index: usize },
    /// A write to a variable by an assignment.
    Version { var: String, version: usize },
    /// An intermediate arithmetic result.
    Aux,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Symbol {
    pub name: String,
    pub sort: Sort,
    pub origin: Origin,
}

/// An integer operand: a constant or an integer symbol.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Term {
    Const(i64),
    Sym(SymId),
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Const(c) => write!(f, "{}", c),
            Term::Sym(s) => write!(f, "{}", s),
        }
    }
}

/// A boolean formula.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Formula {
    Const(bool),
    Sym(SymId),
    Not(Box<Formula>),
    And(Vec<Formula>),
    Or(Vec<Formula>),
    Xor(Box<Formula>, Box<Formula>),
    Cmp(CmpOp, Term, Term),
}

impl Formula {
    /// Negation, pushed into comparisons and constants.
    pub fn not(f: Formula) -> Formula {
        match f {
            Formula::Const(b) => Formula::Const(!b),
            Formula::Cmp(op, a, b) => Formula::Cmp(op.negate(), a, b),
            Formula::Not(inner) => *inner,
            other => Formula::Not(Box::new(other)),
        }
    }

    /// Conjunction, flattening nested conjunctions.
    pub fn and(parts: impl IntoIterator<Item = Formula>) -> Formula {
        let mut flat = Vec::new();
        for part in parts {
            match part {
                Formula::And(inner) => flat.extend(inner),
                Formula::Const(true) => {}
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Formula::Const(true),
            1 => flat.remove(0),
            _ => Formula::And(flat),
        }
    }

    pub fn or(parts: impl IntoIterator<Item = Formula>) -> Formula {
        let mut flat = Vec::new();
        for part in parts {
            match part {
                Formula::Or(inner) => flat.extend(inner),
                Formula::Const(false) => {}
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Formula::Const(false),
            1 => flat.remove(0),
            _ => Formula::Or(flat),
        }
    }

    pub fn logic(op: LogicOp, a: Formula, b: Formula) -> Formula {
        match op {
            LogicOp::And => Formula::and([a, b]),
            LogicOp::Or => Formula::or([a, b]),
            LogicOp::Xor => Formula::Xor(Box::new(a), Box::new(b)),
        }
    }

    /// Top-level conjuncts of this formula.
    pub fn conjuncts(&self) -> &[Formula] {
        match self {
            Formula::And(parts) => parts,
            other => std::slice::from_ref(other),
        }
    }

    fn eval(&self, model: &Model) -> Option<bool> {
        Some(match self {
            Formula::Const(b) => *b,
            Formula::Sym(s) => model.bool(*s)?,
            Formula::Not(f) => !f.eval(model)?,
            Formula::And(parts) => {
                for part in parts {
                    if !part.eval(model)? {
                        return Some(false);
                    }
                }
                true
            }
            Formula::Or(parts) => {
                for part in parts {
                    if part.eval(model)? {
                        return Some(true);
                    }
                }
                false
            }
            Formula::Xor(a, b) => a.eval(model)? ^ b.eval(model)?,
            Formula::Cmp(op, a, b) => op.apply(model.term(*a)?, model.term(*b)?),
        })
    }

    fn collect_constants(&self, out: &mut BTreeSet<i64>) {
        match self {
            Formula::Const(_) | Formula::Sym(_) => {}
            Formula::Not(f) => f.collect_constants(out),
            Formula::And(parts) | Formula::Or(parts) => parts.iter().for_each(|p| p.collect_constants(out)),
            Formula::Xor(a, b) => {
                a.collect_constants(out);
                b.collect_constants(out);
            }
            Formula::Cmp(_, a, b) => {
                for t in [a, b] {
                    if let Term::Const(c) = t {
                        out.insert(*c);
                    }
                }
            }
        }
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(f: &mut fmt::Formatter<'_>, op: &str, parts: &[Formula]) -> fmt::Result {
            write!(f, "({}", op)?;
            for part in parts {
                write!(f, " {}", part)?;
            }
            write!(f, ")")
        }
        match self {
            Formula::Const(b) => write!(f, "{}", b),
            Formula::Sym(s) => write!(f, "{}", s),
            Formula::Not(inner) => write!(f, "(not {})", inner),
            Formula::And(parts) => join(f, "and", parts),
            Formula::Or(parts) => join(f, "or", parts),
            Formula::Xor(a, b) => write!(f, "(xor {} {})", a, b),
            Formula::Cmp(op, a, b) => write!(f, "({} {} {})", op.symbol(), a, b),
        }
    }
}

/// Right-hand side of a definition.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Definition {
    Copy(Term),
    Unary(AUnOp, Term),
    Binary(AOp, Term, Term),
}

impl Definition {
    fn eval(&self, model: &Model) -> Option<i64> {
        match self {
            Definition::Copy(t) => model.term(*t),
            Definition::Unary(op, t) => op.apply(model.term(*t)?).ok(),
            Definition::Binary(op, a, b) => op.apply(model.term(*a)?, model.term(*b)?).ok(),
        }
    }

    pub fn operands(&self) -> Vec<Term> {
        match self {
            Definition::Copy(t) | Definition::Unary(_, t) => vec![*t],
            Definition::Binary(_, a, b) => vec![*a, *b],
        }
    }
}

impl fmt::Display for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Definition::Copy(t) => write!(f, "{}", t),
            Definition::Unary(op, t) => write!(f, "({} {})", op.symbol(), t),
            Definition::Binary(op, a, b) => write!(f, "({} {} {})", op.symbol(), a, b),
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Constraint {
    Define { target: SymId, def: Definition },
    Assert(Formula),
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Define { target, def } => write!(f, "(define {} {})", target, def),
            Constraint::Assert(formula) => write!(f, "(assert {})", formula),
        }
    }
}

/// Values of (some of) the symbols of a problem.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Model {
    values: Vec<Option<Value>>,
}

impl Model {
    pub fn new(num_symbols: usize) -> Self {
        Self {
            values: vec![None; num_symbols],
        }
    }

    pub fn get(&self, s: SymId) -> Option<Value> {
        self.values.get(s.index()).copied().flatten()
    }

    pub fn set(&mut self, s: SymId, value: impl Into<Value>) {
        if self.values.len() <= s.index() {
            self.values.resize(s.index() + 1, None);
        }
        self.values[s.index()] = Some(value.into());
    }

    pub fn int(&self, s: SymId) -> Option<i64> {
        match self.get(s)? {
            Value::Int(n) => Some(n),
            Value::Bool(_) => None,
        }
    }

    pub fn bool(&self, s: SymId) -> Option<bool> {
        match self.get(s)? {
            Value::Bool(b) => Some(b),
            Value::Int(_) => None,
        }
    }

    fn term(&self, t: Term) -> Option<i64> {
        match t {
            Term::Const(c) => Some(c),
            Term::Sym(s) => self.int(s),
        }
    }
}

/// A satisfiability problem: symbols plus constraints.
#[derive(Debug, Clone, Default)]
pub struct Problem {
    symbols: Vec<Symbol>,
    constraints: Vec<Constraint>,
}

impl Problem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh symbol.
    pub fn fresh(&mut self, name: impl Into<String>, sort: Sort, origin: Origin) -> SymId {
        let id = SymId(self.symbols.len() as u32);
        self.symbols.push(Symbol {
            name: name.into(),
            sort,
            origin,
        });
        id
    }

    pub fn define(&mut self, target: SymId, def: Definition) {
        self.constraints.push(Constraint::Define { target, def });
    }

    pub fn assert(&mut self, formula: Formula) {
        self.constraints.push(Constraint::Assert(formula));
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn symbol(&self, s: SymId) -> &Symbol {
        &self.symbols[s.index()]
    }

    pub fn symbol_ids(&self) -> impl Iterator<Item = SymId> {
        (0..self.symbols.len() as u32).map(SymId)
    }

    pub fn num_symbols(&self) -> usize {
        self.symbols.len()
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Symbols that no definition fixes.
    pub fn free_symbols(&self) -> Vec<SymId> {
        let mut defined = vec![false; self.symbols.len()];
        for c in &self.constraints {
            if let Constraint::Define { target, .. } = c {
                defined[target.index()] = true;
            }
        }
        self.symbol_ids().filter(|s| !defined[s.index()]).collect()
    }

    /// Integer constants mentioned anywhere in the problem.
    pub fn constants(&self) -> BTreeSet<i64> {
        let mut out = BTreeSet::new();
        for c in &self.constraints {
            match c {
                Constraint::Define { def, .. } => {
                    for t in def.operands() {
                        if let Term::Const(v) = t {
                            out.insert(v);
                        }
                    }
                }
                Constraint::Assert(f) => f.collect_constants(&mut out),
            }
        }
        out
    }

    /// Completes `free` (values of the free symbols) by evaluating every
    /// definition, and checks every assertion.
    ///
    /// Returns the full model if all definitions succeed and all assertions
    /// hold. Free symbols missing from `free` default to `0` / `false`.
    pub fn complete(&self, free: &Model) -> Option<Model> {
        let mut model = free.clone();
        for s in self.symbol_ids() {
            if model.get(s).is_none() {
                match self.symbol(s).sort {
                    Sort::Int => model.set(s, 0i64),
                    Sort::Bool => model.set(s, false),
                }
            }
        }
        for c in &self.constraints {
            match c {
                Constraint::Define { target, def } => {
                    let value = def.eval(&model)?;
                    model.set(*target, value);
                }
                Constraint::Assert(formula) => {
                    if !formula.eval(&model)? {
                        return None;
                    }
                }
            }
        }
        Some(model)
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, symbol) in self.symbols.iter().enumerate() {
            writeln!(f, "(declare s{} {:?}) ; {}", i, symbol.sort, symbol.name)?;
        }
        for c in &self.constraints {
            writeln!(f, "{}", c)?;
        }
        Ok(())
    }
}
