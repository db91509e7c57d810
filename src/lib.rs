//! # whilecov: structural test generation for a small imperative language
//!
//! **`whilecov`** builds the control-flow graph (CFG) of a program in a small
//! `while` language, enumerates the paths that classical white-box coverage
//! criteria ask for, and turns every path into a concrete test: either input
//! values that drive execution along it, or a proof that no such values exist.
//!
//! ## The language
//!
//! Programs are statement trees ([`Stmt`][crate::stmt::Stmt]) whose statements
//! carry unique integer labels: assignments, `if`/`while` with a boolean
//! condition, `input x` (reads an integer) and `print e`. Integers are `i64`
//! with checked arithmetic; division and modulo round towards negative
//! infinity.
//!
//! ## Pipeline
//!
//! 1. **CFG** ([`cfg`]): one node per label, plus START and END. Edges carry a
//!    guard and an action; branch roles (then/else, body/exit) are explicit.
//! 2. **Analyses** ([`analysis`]): assignment and decision sets, distances
//!    from START, loop headers and their nesting, definitions, uses and
//!    definition-use (DU) paths.
//! 3. **Paths** ([`paths`]): lazy enumerators of the START→END paths with at
//!    most `k` edges, or entering every loop at most `i` times.
//! 4. **Test generation** ([`symbolic`]): a path is translated into
//!    constraints over versioned symbols and handed to a [`Solver`][crate::solver::Solver].
//! 5. **Coverage** ([`coverage`]): executed paths (from [`runner`]) are checked
//!    against each criterion; [`suite`] gives every obligation a verdict.
//!
//! ## Basic Usage
//!
//! ```rust
//! use whilecov::cfg::Cfg;
//! use whilecov::coverage::CoverageChecker;
//! use whilecov::expr::{AExp, BExp};
//! use whilecov::runner::{executed_paths, RunConfig};
//! use whilecov::stmt::Stmt;
//! use whilecov::symbolic::TestGenerator;
//!
//! // 1: input x;
//! // 2: if (x < 0) { 3: x := 0 - x; }
//! // 4: print x;
//! let prog = Stmt::seq([
//!     Stmt::input(1, "x"),
//!     Stmt::if_then(2, BExp::lt(AExp::var("x"), AExp::cst(0)),
//!         Stmt::assign(3, "x", AExp::sub(AExp::cst(0), AExp::var("x")))),
//!     Stmt::print(4, AExp::var("x")),
//! ]);
//! let cfg = Cfg::build(&prog).unwrap();
//!
//! // One test per path of at most 10 edges.
//! let paths: Vec<_> = cfg.k_paths(10).collect();
//! let tests = TestGenerator::new(&cfg).generate_tests(&paths);
//! assert_eq!(tests.len(), 2);
//!
//! // Running them covers every decision.
//! let executed = executed_paths(&cfg, &tests, &RunConfig::default());
//! let checker = CoverageChecker::new(&cfg);
//! assert!(checker.uncovered_decisions(&executed).is_complete());
//! ```
//!
//! ## Outcomes
//!
//! An infeasible path is an expected result (`Ok(None)`), not an error. A
//! solver that gives up (timeout, cancellation, search budget) is reported
//! separately as inconclusive. Suite generation keeps four verdicts apart:
//! test found, proven infeasible, inconclusive, unreachable.
//!
//! ## Solvers
//!
//! With the default `z3` cargo feature, paths are solved by Z3 (`Z3Solver`).
//! The pure-Rust [`SearchSolver`][crate::solver::SearchSolver] can be chosen
//! explicitly with [`TestGenerator::with_solver`][crate::symbolic::TestGenerator::with_solver],
//! and becomes the default when the crate is built without `z3`.
//!
//! ## Logging
//!
//! The crate logs through the [`log`] facade and installs no logger itself.

pub mod analysis;
pub mod cfg;
pub mod constraint;
pub mod coverage;
pub mod error;
pub mod expr;
pub mod paths;
pub mod runner;
pub mod solver;
pub mod stmt;
pub mod suite;
pub mod symbolic;
pub mod types;
