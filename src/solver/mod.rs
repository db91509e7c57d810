//! Satisfiability backends for path constraints.
//!
//! A [`Solver`] decides a [`Problem`] and answers with a [`SolveResult`]:
//!
//! - `Sat(model)`: the model has been checked against every constraint by
//!   evaluation ([`Problem::complete`]), whatever backend produced it.
//! - `Unsat`: no assignment of the free symbols satisfies the problem.
//! - `Unknown(reason)`: the backend gave up (timeout, cancellation, search
//!   budget). This is never reported as `Unsat`.
//!
//! Two backends are provided:
//!
//! - `Z3Solver` (cargo feature `z3`, on by default): a full SMT encoding of
//!   the evaluation semantics, including floor division and `i64` range
//!   limits. This is the [`DefaultSolver`].
//! - [`SearchSolver`] (always available): interval propagation to refute or
//!   narrow the problem, exhaustive enumeration of small finite domains, then a
//!   bounded heuristic search over boundary values and constants. It is the
//!   default only when the crate is built without `z3`.
//!
//! A solver instance holds only configuration. Every call to
//! [`Solver::solve`] builds its own session, so one instance can be shared by
//! concurrent workers.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::constraint::{Model, Problem};

pub mod interval;
mod search;
#[cfg(feature = "z3")]
mod smt;

pub use search::SearchSolver;
#[cfg(feature = "z3")]
pub use smt::Z3Solver;

/// Outcome of a satisfiability check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolveResult {
    Sat(Model),
    Unsat,
    Unknown(String),
}

impl SolveResult {
    pub fn is_sat(&self) -> bool {
        matches!(self, SolveResult::Sat(_))
    }

    pub fn is_unsat(&self) -> bool {
        matches!(self, SolveResult::Unsat)
    }
}

impl fmt::Display for SolveResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolveResult::Sat(_) => write!(f, "sat"),
            SolveResult::Unsat => write!(f, "unsat"),
            SolveResult::Unknown(reason) => write!(f, "unknown ({})", reason),
        }
    }
}

/// A satisfiability backend.
pub trait Solver: Send + Sync {
    fn name(&self) -> &'static str;

    fn solve(&self, problem: &Problem) -> SolveResult;
}

/// Limits shared by the solver backends.
#[derive(Debug, Clone)]
pub struct SolverConfig {
    /// Wall-clock limit per call to [`Solver::solve`].
    pub timeout: Option<Duration>,
    /// Cooperative cancellation: once set, running solves return `Unknown`.
    pub cancel: Option<Arc<AtomicBool>>,
    /// Largest product of free-symbol domain sizes that is enumerated
    /// exhaustively (which proves `Unsat` when nothing is found).
    pub exhaustive_limit: u64,
    /// Number of candidate assignments tried by the heuristic search.
    pub max_candidates: u64,
    /// The heuristic search tries every value in `-radius..=radius`.
    pub search_radius: i64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(10)),
            cancel: None,
            exhaustive_limit: 1 << 16,
            max_candidates: 200_000,
            search_radius: 16,
        }
    }
}

impl SolverConfig {
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn with_exhaustive_limit(mut self, limit: u64) -> Self {
        self.exhaustive_limit = limit;
        self
    }

    pub fn with_max_candidates(mut self, max_candidates: u64) -> Self {
        self.max_candidates = max_candidates;
        self
    }

    pub fn with_search_radius(mut self, radius: i64) -> Self {
        self.search_radius = radius;
        self
    }

    pub(crate) fn budget(&self) -> Budget<'_> {
        Budget {
            deadline: self.timeout.map(|t| Instant::now() + t),
            cancel: self.cancel.as_deref(),
        }
    }
}

/// Deadline and cancellation flag of one solve.
pub(crate) struct Budget<'a> {
    deadline: Option<Instant>,
    cancel: Option<&'a AtomicBool>,
}

impl Budget<'_> {
    /// Why the solve must stop now, if it must.
    pub(crate) fn exhausted(&self) -> Option<&'static str> {
        if self.cancel.map_or(false, |flag| flag.load(Ordering::Relaxed)) {
            return Some("cancelled");
        }
        if self.deadline.map_or(false, |deadline| Instant::now() >= deadline) {
            return Some("timeout");
        }
        None
    }

    #[cfg(feature = "z3")]
    pub(crate) fn remaining(&self) -> Option<Duration> {
        self.deadline.map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }
}

/// The backend used by [`TestGenerator::new`][crate::symbolic::TestGenerator::new].
#[cfg(feature = "z3")]
pub type DefaultSolver = Z3Solver;
#[cfg(not(feature = "z3"))]
pub type DefaultSolver = SearchSolver;

/// The default backend with the given limits.
pub fn default_solver(config: SolverConfig) -> DefaultSolver {
    DefaultSolver::new(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    #[test]
    fn test_cancelled_budget() {
        let flag = Arc::new(AtomicBool::new(false));
        let config = SolverConfig::default().with_cancel(flag.clone());
        let budget = config.budget();
        assert_eq!(budget.exhausted(), None);
        flag.store(true, Ordering::Relaxed);
        assert_eq!(budget.exhausted(), Some("cancelled"));
    }

    #[test]
    fn test_zero_timeout() {
        let config = SolverConfig::default().with_timeout(Some(Duration::ZERO));
        assert_eq!(config.budget().exhausted(), Some("timeout"));
        #[cfg(feature = "z3")]
        assert_eq!(config.budget().remaining(), Some(Duration::ZERO));
    }
}
