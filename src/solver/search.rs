use std::collections::BTreeSet;

use log::debug;

use super::interval::{propagate, Interval, Propagation};
use super::{Budget, SolveResult, Solver, SolverConfig};
use crate::constraint::{Model, Problem, Sort, SymId};
use crate::expr::Value;

/// How often (in candidates) the budget is polled.
const POLL_INTERVAL: u64 = 256;

/// Pure-Rust solver: propagation, exhaustive enumeration, heuristic search.
///
/// 1. With no free symbols the problem is decided by evaluation.
/// 2. Interval propagation either refutes the problem (`Unsat`) or narrows
///    the free symbols' domains.
/// 3. If the narrowed search space has at most
///    [`SolverConfig::exhaustive_limit`] points, all of them are tried; this
///    decides the problem.
/// 4. Otherwise up to [`SolverConfig::max_candidates`] assignments built from
///    small values, domain bounds, and the problem's constants (±1) are
///    tried. Finding none yields `Unknown`, not `Unsat`.
#[derive(Debug, Clone, Default)]
pub struct SearchSolver {
    config: SolverConfig,
}

enum Search {
    Found(Model),
    Exhausted,
    Stopped(String),
}

impl SearchSolver {
    pub fn new(config: SolverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Candidate values for a symbol with domain `dom`, most promising first.
    fn candidates(&self, dom: Interval, constants: &BTreeSet<i64>) -> Vec<i64> {
        let radius = self.config.search_radius.max(0);
        let mut values = BTreeSet::new();
        let mut add = |v: Option<i64>| {
            if let Some(v) = v {
                if dom.contains(v) {
                    values.insert(v);
                }
            }
        };
        for r in -radius..=radius {
            add(Some(r));
        }
        add(Some(dom.lo));
        add(Some(dom.hi));
        add(dom.lo.checked_add(1));
        add(dom.hi.checked_sub(1));
        for &c in constants {
            add(Some(c));
            add(c.checked_sub(1));
            add(c.checked_add(1));
            add(c.checked_neg());
        }
        let mut values: Vec<i64> = values.into_iter().collect();
        values.sort_by_key(|v| (v.unsigned_abs(), *v < 0));
        values
    }

    /// Tries the cartesian product of `choices` (odometer order).
    fn search(
        &self,
        problem: &Problem,
        free: &[SymId],
        choices: &[Vec<i64>],
        limit: u64,
        budget: &Budget<'_>,
    ) -> Search {
        if choices.iter().any(|c| c.is_empty()) {
            return Search::Exhausted;
        }
        let mut digits = vec![0usize; free.len()];
        let mut tried = 0u64;
        loop {
            if tried >= limit {
                return Search::Stopped(format!("no solution among {} candidates", tried));
            }
            if tried % POLL_INTERVAL == 0 {
                if let Some(reason) = budget.exhausted() {
                    return Search::Stopped(reason.to_string());
                }
            }
            tried += 1;

            let mut model = Model::new(problem.num_symbols());
            for ((s, choice), &d) in free.iter().zip(choices).zip(&digits) {
                let v = choice[d];
                match problem.symbol(*s).sort {
                    Sort::Int => model.set(*s, Value::Int(v)),
                    Sort::Bool => model.set(*s, Value::Bool(v != 0)),
                }
            }
            if let Some(model) = problem.complete(&model) {
                debug!("search found a model after {} candidates", tried);
                return Search::Found(model);
            }

            // Advance the odometer.
            let mut pos = 0;
            loop {
                if pos == digits.len() {
                    return Search::Exhausted;
                }
                digits[pos] += 1;
                if digits[pos] < choices[pos].len() {
                    break;
                }
                digits[pos] = 0;
                pos += 1;
            }
        }
    }
}

impl Solver for SearchSolver {
    fn name(&self) -> &'static str {
        "search"
    }

    fn solve(&self, problem: &Problem) -> SolveResult {
        let budget = self.config.budget();
        if let Some(reason) = budget.exhausted() {
            return SolveResult::Unknown(reason.to_string());
        }
        let free = problem.free_symbols();

        if free.is_empty() {
            return match problem.complete(&Model::new(problem.num_symbols())) {
                Some(model) => SolveResult::Sat(model),
                None => SolveResult::Unsat,
            };
        }

        let doms = match propagate(problem) {
            Propagation::Refuted => return SolveResult::Unsat,
            Propagation::Domains(doms) => doms,
        };
        let free_doms: Vec<Interval> = free.iter().map(|s| doms[s.index()]).collect();

        let space = free_doms
            .iter()
            .fold(1u128, |acc, d| acc.saturating_mul(d.size()));
        debug!("{} free symbols, search space {}", free.len(), space);

        if space <= self.config.exhaustive_limit as u128 {
            let choices: Vec<Vec<i64>> = free_doms.iter().map(|d| (d.lo..=d.hi).collect()).collect();
            return match self.search(problem, &free, &choices, u64::MAX, &budget) {
                Search::Found(model) => SolveResult::Sat(model),
                Search::Exhausted => SolveResult::Unsat,
                Search::Stopped(reason) => SolveResult::Unknown(reason),
            };
        }

        let constants = problem.constants();
        let choices: Vec<Vec<i64>> = free_doms.iter().map(|d| self.candidates(*d, &constants)).collect();
        match self.search(problem, &free, &choices, self.config.max_candidates, &budget) {
            Search::Found(model) => SolveResult::Sat(model),
            Search::Exhausted => SolveResult::Unknown("heuristic candidates exhausted".to_string()),
            Search::Stopped(reason) => SolveResult::Unknown(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    use crate::constraint::{Definition, Formula, Origin, Term};
    use crate::expr::{AOp, CmpOp};

    fn int(p: &mut Problem, name: &str) -> SymId {
        p.fresh(name, Sort::Int, Origin::Initial(name.to_string()))
    }

    fn cmp(op: CmpOp, a: Term, b: Term) -> Formula {
        Formula::Cmp(op, a, b)
    }

    #[test]
    fn test_no_free_symbols() {
        let mut p = Problem::new();
        let x = p.fresh("x#1", Sort::Int, Origin::Aux);
        p.define(x, Definition::Copy(Term::Const(5)));
        p.assert(cmp(CmpOp::Gt, Term::Sym(x), Term::Const(0)));
        assert!(SearchSolver::default().solve(&p).is_sat());

        p.assert(cmp(CmpOp::Lt, Term::Sym(x), Term::Const(0)));
        assert!(SearchSolver::default().solve(&p).is_unsat());
    }

    #[test]
    fn test_square_root() {
        // x * x == 49, x < 0
        let mut p = Problem::new();
        let x = int(&mut p, "x");
        let sq = p.fresh("t", Sort::Int, Origin::Aux);
        p.define(sq, Definition::Binary(AOp::Mul, Term::Sym(x), Term::Sym(x)));
        p.assert(cmp(CmpOp::Eq, Term::Sym(sq), Term::Const(49)));
        p.assert(cmp(CmpOp::Lt, Term::Sym(x), Term::Const(0)));
        match SearchSolver::default().solve(&p) {
            SolveResult::Sat(model) => assert_eq!(model.int(x), Some(-7)),
            other => panic!("expected sat, got {}", other),
        }
    }

    #[test]
    fn test_exhaustive_unsat() {
        // 0 <= x <= 100, x % 2 == 1, x * 2 == 12
        let mut p = Problem::new();
        let x = int(&mut p, "x");
        let m = p.fresh("m", Sort::Int, Origin::Aux);
        let d = p.fresh("d", Sort::Int, Origin::Aux);
        p.assert(cmp(CmpOp::Ge, Term::Sym(x), Term::Const(0)));
        p.assert(cmp(CmpOp::Le, Term::Sym(x), Term::Const(100)));
        p.define(m, Definition::Binary(AOp::Mod, Term::Sym(x), Term::Const(2)));
        p.assert(cmp(CmpOp::Eq, Term::Sym(m), Term::Const(1)));
        p.define(d, Definition::Binary(AOp::Mul, Term::Sym(x), Term::Const(2)));
        p.assert(cmp(CmpOp::Eq, Term::Sym(d), Term::Const(12)));
        assert_eq!(SearchSolver::default().solve(&p), SolveResult::Unsat);
    }

    #[test]
    fn test_unknown_is_not_unsat() {
        // x * x == 2 has no integer solution, but the domain is unbounded.
        let mut p = Problem::new();
        let x = int(&mut p, "x");
        let sq = p.fresh("t", Sort::Int, Origin::Aux);
        p.define(sq, Definition::Binary(AOp::Mul, Term::Sym(x), Term::Sym(x)));
        p.assert(cmp(CmpOp::Eq, Term::Sym(sq), Term::Const(2)));
        let result = SearchSolver::default().solve(&p);
        assert!(matches!(result, SolveResult::Unknown(_)), "got {}", result);
    }

    #[test]
    fn test_bool_symbol() {
        let mut p = Problem::new();
        let b = p.fresh("b", Sort::Bool, Origin::Initial("b".to_string()));
        p.assert(Formula::not(Formula::Sym(b)));
        match SearchSolver::default().solve(&p) {
            SolveResult::Sat(model) => assert_eq!(model.bool(b), Some(false)),
            other => panic!("expected sat, got {}", other),
        }
    }

    #[test]
    fn test_candidates_order() {
        let solver = SearchSolver::new(SolverConfig::default().with_search_radius(1));
        let values = solver.candidates(Interval::new(-10, 10), &BTreeSet::from([5]));
        assert_eq!(values, vec![0, 1, -1, 4, 5, -5, 6, 9, -9, 10, -10]);
    }

    #[test]
    fn test_cancelled_before_evaluation() {
        // 1 == 1, decided by evaluation alone
        let mut p = Problem::new();
        p.assert(cmp(CmpOp::Eq, Term::Const(1), Term::Const(1)));
        assert!(SearchSolver::default().solve(&p).is_sat());
        let cancel = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(true));
        let solver = SearchSolver::new(SolverConfig::default().with_cancel(cancel));
        assert_eq!(solver.solve(&p), SolveResult::Unknown("cancelled".to_string()));
    }
}
