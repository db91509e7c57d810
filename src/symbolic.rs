//! Path-to-constraint translation and test generation.
//!
//! ## Overview
//!
//! A path is translated edge by edge into a [`Problem`]. Every variable has a
//! stack of symbolic versions; a read uses the top of the stack, a write
//! pushes a fresh version (SSA style):
//!
//! - a `skip` edge asserts its guard over the current versions;
//! - `x := e` translates `e` against the versions *before* the assignment,
//!   then pushes a new version of `x` defined as the result;
//! - `input x` pushes a fresh unconstrained symbol, a free input;
//! - `print e` constrains nothing beyond `e` being computable.
//!
//! Every arithmetic operator application gets its own auxiliary symbol and a
//! defining constraint. A variable read before any write on the path gets an
//! *initial* symbol: it is a free value the test case must supply.
//!
//! ## Outcomes
//!
//! Satisfiable problems yield a [`TestCase`]; running the program from its
//! initial environment with its input stream follows the path exactly.
//! Unsatisfiable problems mean the path is infeasible (`Ok(None)`, not an
//! error). Inconclusive solver answers are kept apart from both.
//!
//! ## Example
//!
//! ```
//! use whilecov::cfg::Cfg;
//! use whilecov::expr::{AExp, BExp};
//! use whilecov::stmt::Stmt;
//! use whilecov::symbolic::TestGenerator;
//!
//! // 1: input x; 2: if (x * 3 == 21) { 3: print x; }
//! let prog = Stmt::seq([
//!     Stmt::input(1, "x"),
//!     Stmt::if_then(2, BExp::eq(AExp::mul(AExp::var("x"), AExp::cst(3)), AExp::cst(21)),
//!         Stmt::print(3, AExp::var("x"))),
//! ]);
//! let cfg = Cfg::build(&prog).unwrap();
//! let generator = TestGenerator::new(&cfg);
//!
//! let path = cfg.k_paths(10).find(|p| p.len() == 5).unwrap();
//! let test = generator.generate_test(&path).unwrap().unwrap();
//! assert_eq!(test.inputs, vec![7]);
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use log::{debug, info, warn};
use rayon::prelude::*;

use crate::cfg::{Cfg, Edge};
use crate::constraint::{Definition, Formula, Origin, Problem, Sort, SymId, Term};
use crate::error::GenerateError;
use crate::expr::{AExp, AOp, BExp, CmpOp, Env, Value};
use crate::solver::{default_solver, DefaultSolver, SolveResult, Solver, SolverConfig};
use crate::stmt::Action;
use crate::types::{path_to_string, Node, Path};

/// Concrete test data driving execution along one path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestCase {
    /// The path this test case was generated for (empty if built by hand).
    pub path: Path,
    /// Values of the variables read before being written.
    pub initial: Env,
    /// Values consumed by `input` statements, in order.
    pub inputs: Vec<i64>,
    /// Variable read by each `input` statement, parallel to `inputs`.
    pub input_vars: Vec<String>,
}

impl TestCase {
    /// A hand-written test case with no inputs.
    pub fn from_env(initial: Env) -> Self {
        Self {
            path: Vec::new(),
            initial,
            inputs: Vec::new(),
            input_vars: Vec::new(),
        }
    }

    /// Whether the test needs any externally supplied value.
    pub fn has_free_inputs(&self) -> bool {
        !self.initial.is_empty() || !self.inputs.is_empty()
    }

    /// Variable -> value of its first free symbol (initial value, or else
    /// first input read).
    pub fn assignment(&self) -> BTreeMap<String, Value> {
        let mut assignment: BTreeMap<String, Value> =
            self.initial.iter().map(|(name, value)| (name.to_string(), value)).collect();
        for (var, &value) in self.input_vars.iter().zip(&self.inputs) {
            assignment.entry(var.clone()).or_insert(Value::Int(value));
        }
        assignment
    }
}

impl fmt::Display for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let vars: Vec<String> = self.initial.iter().map(|(n, v)| format!("{} = {}", n, v)).collect();
        write!(f, "{{{}}}", vars.join(", "))?;
        if !self.inputs.is_empty() {
            write!(f, " inputs {:?}", self.inputs)?;
        }
        Ok(())
    }
}

/// Outcome of solving one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathOutcome {
    Feasible(TestCase),
    Infeasible,
    Unknown(String),
}

/// A path translated into constraints.
#[derive(Debug, Clone)]
pub struct PathEncoding {
    pub problem: Problem,
    /// Initial symbol of each variable read before written, in first-read order.
    pub initial: Vec<(String, SymId)>,
    /// Symbol of each `input` read, in path order.
    pub inputs: Vec<(String, SymId)>,
}

struct Encoder {
    problem: Problem,
    versions: HashMap<String, Vec<SymId>>,
    sorts: HashMap<String, Sort>,
    initial: Vec<(String, SymId)>,
    inputs: Vec<(String, SymId)>,
}

impl Encoder {
    fn new() -> Self {
        Self {
            problem: Problem::new(),
            versions: HashMap::new(),
            sorts: HashMap::new(),
            initial: Vec::new(),
            inputs: Vec::new(),
        }
    }

    fn check_sort(&mut self, var: &str, sort: Sort) -> Result<(), GenerateError> {
        match self.sorts.get(var) {
            Some(&known) if known != sort => Err(GenerateError::SortMismatch { var: var.to_string() }),
            Some(_) => Ok(()),
            None => {
                self.sorts.insert(var.to_string(), sort);
                Ok(())
            }
        }
    }

    /// Current version of `var`, creating its initial symbol on first read.
    fn read(&mut self, var: &str, sort: Sort) -> Result<SymId, GenerateError> {
        self.check_sort(var, sort)?;
        if let Some(&s) = self.versions.get(var).and_then(|stack| stack.last()) {
            return Ok(s);
        }
        let s = self.problem.fresh(var, sort, Origin::Initial(var.to_string()));
        self.versions.insert(var.to_string(), vec![s]);
        self.initial.push((var.to_string(), s));
        Ok(s)
    }

    fn push_version(&mut self, var: &str, s: SymId) {
        self.versions.entry(var.to_string()).or_default().push(s);
    }

    fn aux(&mut self) -> SymId {
        let name = format!("_t{}", self.problem.num_symbols());
        self.problem.fresh(name, Sort::Int, Origin::Aux)
    }

    fn arith(&mut self, e: &AExp) -> Result<Term, GenerateError> {
        Ok(match e {
            AExp::Const(c) => Term::Const(*c),
            AExp::Var(name) => Term::Sym(self.read(name, Sort::Int)?),
            AExp::Unary(op, a) => {
                let a = self.arith(a)?;
                let t = self.aux();
                self.problem.define(t, Definition::Unary(*op, a));
                Term::Sym(t)
            }
            AExp::Binary(op, a, b) => {
                let a = self.arith(a)?;
                let b = self.arith(b)?;
                match op {
                    AOp::Div | AOp::Mod => self.problem.assert(Formula::Cmp(CmpOp::Ne, b, Term::Const(0))),
                    AOp::Pow => self.problem.assert(Formula::Cmp(CmpOp::Ge, b, Term::Const(0))),
                    AOp::Add | AOp::Sub | AOp::Mul => {}
                }
                let t = self.aux();
                self.problem.define(t, Definition::Binary(*op, a, b));
                Term::Sym(t)
            }
        })
    }

    fn boolean(&mut self, e: &BExp) -> Result<Formula, GenerateError> {
        Ok(match e {
            BExp::Const(b) => Formula::Const(*b),
            BExp::Var(name) => Formula::Sym(self.read(name, Sort::Bool)?),
            BExp::Not(inner) => Formula::not(self.boolean(inner)?),
            BExp::Logic(op, a, b) => {
                let a = self.boolean(a)?;
                let b = self.boolean(b)?;
                Formula::logic(*op, a, b)
            }
            BExp::Cmp(op, a, b) => {
                let a = self.arith(a)?;
                let b = self.arith(b)?;
                Formula::Cmp(*op, a, b)
            }
        })
    }

    fn action(&mut self, action: &Action) -> Result<(), GenerateError> {
        match action {
            Action::Skip => {}
            Action::Assign { var, expr } => {
                let value = self.arith(expr)?;
                self.check_sort(var, Sort::Int)?;
                let version = self.versions.get(var.as_str()).map_or(0, Vec::len) + 1;
                let s = self.problem.fresh(
                    format!("{}#{}", var, version),
                    Sort::Int,
                    Origin::Version {
                        var: var.clone(),
                        version,
                    },
                );
                self.problem.define(s, Definition::Copy(value));
                self.push_version(var, s);
            }
            Action::Input { var } => {
                self.check_sort(var, Sort::Int)?;
                let index = self.inputs.len();
                let s = self.problem.fresh(
                    format!("{}?{}", var, index),
                    Sort::Int,
                    Origin::Input {
                        var: var.clone(),
                        index,
                    },
                );
                self.push_version(var, s);
                self.inputs.push((var.clone(), s));
            }
            Action::Print { expr } => {
                self.arith(expr)?;
            }
        }
        Ok(())
    }

    fn edge(&mut self, edge: &Edge) -> Result<(), GenerateError> {
        if !edge.guard.is_true_literal() {
            let guard = self.boolean(&edge.guard)?;
            self.problem.assert(guard);
        }
        self.action(&edge.action)
    }

    /// Parallel edges (both branches of an empty `if`): one of the guards holds.
    fn parallel(&mut self, edges: &[&Edge]) -> Result<(), GenerateError> {
        let mut guards = Vec::with_capacity(edges.len());
        for edge in edges {
            guards.push(self.boolean(&edge.guard)?);
        }
        self.problem.assert(Formula::or(guards));
        Ok(())
    }
}

/// Translates `path` into a constraint problem.
pub fn encode_path(cfg: &Cfg, path: &[Node]) -> Result<PathEncoding, GenerateError> {
    if path.first() != Some(&Node::Start) {
        return Err(GenerateError::InvalidPath("path does not start at START".to_string()));
    }
    if path.last() != Some(&Node::End) {
        return Err(GenerateError::InvalidPath("path does not end at END".to_string()));
    }

    let mut encoder = Encoder::new();
    for w in path.windows(2) {
        let edges = cfg.edges_between(w[0], w[1]);
        match edges.as_slice() {
            [] => {
                return Err(GenerateError::InvalidPath(format!("no edge from {} to {}", w[0], w[1])));
            }
            [edge] => encoder.edge(edge)?,
            many if many.iter().all(|e| e.action.is_skip()) => encoder.parallel(many)?,
            many => encoder.edge(many[0])?,
        }
    }

    debug!(
        "encoded path {} into {} symbols and {} constraints",
        path_to_string(path),
        encoder.problem.num_symbols(),
        encoder.problem.constraints().len()
    );
    Ok(PathEncoding {
        problem: encoder.problem,
        initial: encoder.initial,
        inputs: encoder.inputs,
    })
}

/// Generates concrete tests for CFG paths with a constraint solver.
///
/// The generator is read-only and can be shared across threads; every path is
/// solved in its own solver session.
pub struct TestGenerator<'a, S = DefaultSolver> {
    cfg: &'a Cfg,
    solver: S,
}

impl<'a> TestGenerator<'a, DefaultSolver> {
    /// A generator using the [`DefaultSolver`] with default limits.
    pub fn new(cfg: &'a Cfg) -> Self {
        Self::with_solver(cfg, default_solver(SolverConfig::default()))
    }
}

impl<'a, S: Solver> TestGenerator<'a, S> {
    pub fn with_solver(cfg: &'a Cfg, solver: S) -> Self {
        Self { cfg, solver }
    }

    pub fn cfg(&self) -> &'a Cfg {
        self.cfg
    }

    pub fn solver(&self) -> &S {
        &self.solver
    }

    /// Solves `path`, keeping infeasible and inconclusive outcomes apart.
    pub fn solve_path(&self, path: &[Node]) -> Result<PathOutcome, GenerateError> {
        let encoding = encode_path(self.cfg, path)?;
        let outcome = match self.solver.solve(&encoding.problem) {
            SolveResult::Sat(model) => {
                let initial = encoding
                    .initial
                    .iter()
                    .filter_map(|(var, s)| model.get(*s).map(|v| (var.clone(), v)))
                    .collect();
                let inputs = encoding.inputs.iter().filter_map(|(_, s)| model.int(*s)).collect();
                let input_vars = encoding.inputs.iter().map(|(var, _)| var.clone()).collect();
                let case = TestCase {
                    path: path.to_vec(),
                    initial,
                    inputs,
                    input_vars,
                };
                debug!("path {} is feasible: {}", path_to_string(path), case);
                PathOutcome::Feasible(case)
            }
            SolveResult::Unsat => {
                info!("path {} is infeasible", path_to_string(path));
                PathOutcome::Infeasible
            }
            SolveResult::Unknown(reason) => {
                warn!("path {} is inconclusive ({}): {}", path_to_string(path), self.solver.name(), reason);
                PathOutcome::Unknown(reason)
            }
        };
        Ok(outcome)
    }

    /// Test case for `path`, or `None` if the path is infeasible.
    pub fn generate_test(&self, path: &[Node]) -> Result<Option<TestCase>, GenerateError> {
        match self.solve_path(path)? {
            PathOutcome::Feasible(case) => Ok(Some(case)),
            PathOutcome::Infeasible => Ok(None),
            PathOutcome::Unknown(reason) => Err(GenerateError::Inconclusive(reason)),
        }
    }

    /// Solves every path in parallel, returning outcomes in input order.
    pub fn solve_paths(&self, paths: &[Path]) -> Vec<Result<PathOutcome, GenerateError>> {
        paths.par_iter().map(|path| self.solve_path(path)).collect()
    }

    /// Test cases for the feasible paths among `paths`.
    pub fn generate_tests(&self, paths: &[Path]) -> Vec<TestCase> {
        self.solve_paths(paths)
            .into_iter()
            .filter_map(|outcome| match outcome {
                Ok(PathOutcome::Feasible(case)) => Some(case),
                _ => None,
            })
            .collect()
    }
}

/// Test case for `path` using the default solver.
pub fn generate_test(cfg: &Cfg, path: &[Node]) -> Result<Option<TestCase>, GenerateError> {
    TestGenerator::new(cfg).generate_test(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    use crate::constraint::Constraint;
    use crate::runner::{run_test, RunConfig};
    use crate::stmt::Stmt;

    fn p(nodes: &[u32]) -> Path {
        let mut path = vec![Node::Start];
        path.extend(nodes.iter().map(|&id| Node::point(id)));
        path.push(Node::End);
        path
    }

    fn check_sound(cfg: &Cfg, path: &[Node]) -> TestCase {
        let case = generate_test(cfg, path).unwrap().expect("path should be feasible");
        println!("{} => {}", path_to_string(path), case);
        let execution = run_test(cfg, &case, &RunConfig::default()).unwrap();
        assert_eq!(execution.path, path);
        case
    }

    #[test]
    fn test_countdown_needs_no_inputs() {
        // 1: x := 5; 2: while (x > 0) { 3: x := x - 1; }
        let cfg = Cfg::build(&Stmt::seq([
            Stmt::assign(1, "x", AExp::cst(5)),
            Stmt::while_do(
                2,
                BExp::gt(AExp::var("x"), AExp::cst(0)),
                Stmt::assign(3, "x", AExp::sub(AExp::var("x"), AExp::cst(1))),
            ),
        ]))
        .unwrap();
        // Zero iterations: x = 5 makes the loop condition true.
        assert_eq!(generate_test(&cfg, &p(&[1, 2])).unwrap(), None);
        let mut path = vec![1, 2];
        for _ in 0..5 {
            path.extend([3, 2]);
        }
        let case = check_sound(&cfg, &p(&path));
        assert!(!case.has_free_inputs());
    }

    #[test]
    fn test_assignment_reads_old_version() {
        // 1: x := x + 1; 2: if (x == 10) { 3: print x; }
        let cfg = Cfg::build(&Stmt::seq([
            Stmt::assign(1, "x", AExp::add(AExp::var("x"), AExp::cst(1))),
            Stmt::if_then(2, BExp::eq(AExp::var("x"), AExp::cst(10)), Stmt::print(3, AExp::var("x"))),
        ]))
        .unwrap();
        let case = check_sound(&cfg, &p(&[1, 2, 3]));
        assert_eq!(case.initial.get_int("x"), Ok(9));
        assert_eq!(case.assignment()["x"], Value::Int(9));
    }

    #[test]
    fn test_branches() {
        // 1: if (x == 1) { 2: y := 0; } else { 3: x := 1; }
        let cfg = Cfg::build(&Stmt::if_else(
            1,
            BExp::eq(AExp::var("x"), AExp::cst(1)),
            Stmt::assign(2, "y", AExp::cst(0)),
            Stmt::assign(3, "x", AExp::cst(1)),
        ))
        .unwrap();
        let then_case = check_sound(&cfg, &p(&[1, 2]));
        assert_eq!(then_case.initial.get_int("x"), Ok(1));
        let else_case = check_sound(&cfg, &p(&[1, 3]));
        assert_ne!(else_case.initial.get_int("x"), Ok(1));
    }

    #[test]
    fn test_inputs_in_loop() {
        // 1: input n; 2: while (n > 0) { 3: n := n - 1; } 4: print n;
        let cfg = Cfg::build(&Stmt::seq([
            Stmt::input(1, "n"),
            Stmt::while_do(
                2,
                BExp::gt(AExp::var("n"), AExp::cst(0)),
                Stmt::assign(3, "n", AExp::sub(AExp::var("n"), AExp::cst(1))),
            ),
            Stmt::print(4, AExp::var("n")),
        ]))
        .unwrap();
        let case = check_sound(&cfg, &p(&[1, 2, 3, 2, 3, 2, 4]));
        assert_eq!(case.inputs, vec![2]);
        assert!(case.initial.is_empty());
        assert_eq!(case.assignment()["n"], Value::Int(2));
    }

    #[test]
    fn test_division_by_zero_is_infeasible() {
        // 1: y := 0; 2: if (x / y > 0) { 3: print x; }
        let cfg = Cfg::build(&Stmt::seq([
            Stmt::assign(1, "y", AExp::cst(0)),
            Stmt::if_then(
                2,
                BExp::gt(AExp::div(AExp::var("x"), AExp::var("y")), AExp::cst(0)),
                Stmt::print(3, AExp::var("x")),
            ),
        ]))
        .unwrap();
        assert_eq!(generate_test(&cfg, &p(&[1, 2, 3])).unwrap(), None);
        assert_eq!(generate_test(&cfg, &p(&[1, 2])).unwrap(), None);
    }

    #[test]
    fn test_boolean_variable() {
        // 1: if (b && x < 0) { 2: x := 0; }
        let cfg = Cfg::build(&Stmt::if_then(
            1,
            BExp::and(BExp::var("b"), BExp::lt(AExp::var("x"), AExp::cst(0))),
            Stmt::assign(2, "x", AExp::cst(0)),
        ))
        .unwrap();
        let case = check_sound(&cfg, &p(&[1, 2]));
        assert_eq!(case.initial.get_bool("b"), Ok(true));
        assert!(case.initial.get_int("x").unwrap() < 0);
    }

    #[test]
    fn test_sort_mismatch() {
        // 1: if (b) { 2: b := 1; }
        let cfg = Cfg::build(&Stmt::if_then(1, BExp::var("b"), Stmt::assign(2, "b", AExp::cst(1)))).unwrap();
        assert_eq!(
            generate_test(&cfg, &p(&[1, 2])).unwrap_err(),
            GenerateError::SortMismatch { var: "b".to_string() }
        );
    }

    #[test]
    fn test_invalid_path() {
        let cfg = Cfg::build(&Stmt::assign(1, "x", AExp::cst(0))).unwrap();
        assert!(matches!(
            generate_test(&cfg, &[Node::Start, Node::End]),
            Err(GenerateError::InvalidPath(_))
        ));
        assert!(matches!(
            generate_test(&cfg, &[Node::point(1), Node::End]),
            Err(GenerateError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_parallel_edges() {
        // 1: if (x > 0) {} else {} 2: print x;
        let cfg = Cfg::build(&Stmt::seq([
            Stmt::if_else(1, BExp::gt(AExp::var("x"), AExp::cst(0)), Stmt::Skip, Stmt::Skip),
            Stmt::print(2, AExp::var("x")),
        ]))
        .unwrap();
        check_sound(&cfg, &p(&[1, 2]));
    }

    #[test]
    fn test_encoding_versions() {
        // 1: x := 1; 2: x := x * 2;
        let cfg = Cfg::build(&Stmt::seq([
            Stmt::assign(1, "x", AExp::cst(1)),
            Stmt::assign(2, "x", AExp::mul(AExp::var("x"), AExp::cst(2))),
        ]))
        .unwrap();
        let encoding = encode_path(&cfg, &p(&[1, 2])).unwrap();
        println!("{}", encoding.problem);
        assert!(encoding.initial.is_empty());
        assert!(encoding.problem.free_symbols().is_empty());
        let defines = encoding
            .problem
            .constraints()
            .iter()
            .filter(|c| matches!(c, Constraint::Define { .. }))
            .count();
        // x#1, the product, x#2
        assert_eq!(defines, 3);
    }

    #[test]
    fn test_generate_tests_keeps_feasible() {
        let cfg = Cfg::build(&Stmt::if_else(
            1,
            BExp::ge(AExp::var("x"), AExp::cst(0)),
            Stmt::assign(2, "y", AExp::cst(1)),
            Stmt::assign(3, "y", AExp::cst(-1)),
        ))
        .unwrap();
        let paths: Vec<Path> = cfg.k_paths(5).collect();
        let generator = TestGenerator::new(&cfg);
        let cases = generator.generate_tests(&paths);
        assert_eq!(cases.len(), 2);
        for case in &cases {
            assert_eq!(run_test(&cfg, case, &RunConfig::default()).unwrap().path, case.path);
        }
    }
}
