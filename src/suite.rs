//! Obligation-driven test suite generation.
//!
//! For a [`Criterion`], every coverage obligation gets exactly one [`Verdict`]:
//!
//! - [`Verdict::TestFound`]: a feasible candidate path meets the obligation;
//!   the verdict carries its test case.
//! - [`Verdict::Infeasible`]: every candidate path meeting the obligation was
//!   proven infeasible.
//! - [`Verdict::Inconclusive`]: no test was found, and at least one candidate
//!   was left undecided (solver unknown, or the candidate limit was reached).
//! - [`Verdict::Unreachable`]: no enumerated path meets the obligation at all.
//!
//! Candidate paths are the union of the `k`-bounded and `i`-loop-bounded
//! paths of the CFG, shortest first. "Infeasible" and "unreachable" are
//! therefore relative to those bounds. Every distinct candidate path is solved
//! once, in parallel unless disabled, and its outcome shared by all the
//! obligations it meets.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use log::{debug, info};
use rayon::prelude::*;

use crate::analysis::{CfgFacts, DuPath};
use crate::cfg::Cfg;
use crate::coverage::{exercised_uses, Criterion};
use crate::error::GenerateError;
use crate::solver::{DefaultSolver, Solver};
use crate::symbolic::{PathOutcome, TestCase, TestGenerator};
use crate::types::{path_to_string, EdgeKey, Node, Path};

/// Suite generation bounds.
#[derive(Debug, Clone)]
pub struct SuiteConfig {
    /// Candidate paths have at most `k` edges.
    pub k: usize,
    /// Candidate paths enter each loop body at most this many times.
    pub loop_bound: usize,
    /// Candidates tried per obligation before giving up as inconclusive.
    pub max_candidates_per_obligation: usize,
    /// Solve candidate paths on the rayon pool.
    pub parallel: bool,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            k: 20,
            loop_bound: 2,
            max_candidates_per_obligation: 64,
            parallel: true,
        }
    }
}

impl SuiteConfig {
    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    pub fn with_loop_bound(mut self, loop_bound: usize) -> Self {
        self.loop_bound = loop_bound;
        self
    }

    pub fn with_max_candidates_per_obligation(mut self, max: usize) -> Self {
        self.max_candidates_per_obligation = max;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

/// One thing a test suite must exercise.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Obligation {
    /// Visit the node.
    Node(Node),
    /// Traverse the edge.
    Edge(EdgeKey),
    /// Execute exactly this path.
    Path(Path),
    /// Execute this DU path as a contiguous sub-path.
    DuPath(DuPath),
    /// Reach some use of `var` def-clear from `def`.
    Definition { var: String, def: Node },
    /// Reach the use `to` of `var` def-clear from `def`.
    Use { var: String, def: Node, to: Node },
}

impl Obligation {
    /// Whether executing `path` meets the obligation.
    fn is_met_by(&self, facts: &CfgFacts, path: &[Node]) -> bool {
        match self {
            Obligation::Node(node) => path.contains(node),
            Obligation::Edge((src, dst)) => path.windows(2).any(|w| w[0] == *src && w[1] == *dst),
            Obligation::Path(expected) => path == expected.as_slice(),
            Obligation::DuPath(du) => path.windows(du.path.len()).any(|w| w == du.path.as_slice()),
            Obligation::Definition { var, def } => exercised_uses(facts, path)
                .iter()
                .any(|(v, d, _)| v == var && d == def),
            Obligation::Use { var, def, to } => {
                exercised_uses(facts, path).contains(&(var.clone(), *def, *to))
            }
        }
    }
}

impl fmt::Display for Obligation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Obligation::Node(node) => write!(f, "node {}", node),
            Obligation::Edge((src, dst)) => write!(f, "edge {} -> {}", src, dst),
            Obligation::Path(path) => write!(f, "path {}", path_to_string(path)),
            Obligation::DuPath(du) => write!(f, "du-path {}", du),
            Obligation::Definition { var, def } => write!(f, "def of {} at {}", var, def),
            Obligation::Use { var, def, to } => write!(f, "use of {} at {} from {}", var, to, def),
        }
    }
}

/// What happened to one obligation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    TestFound(TestCase),
    Infeasible,
    Inconclusive(String),
    Unreachable,
}

impl Verdict {
    pub fn test(&self) -> Option<&TestCase> {
        match self {
            Verdict::TestFound(case) => Some(case),
            _ => None,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::TestFound(case) => write!(f, "test found: {}", case),
            Verdict::Infeasible => write!(f, "proven infeasible"),
            Verdict::Inconclusive(reason) => write!(f, "inconclusive ({})", reason),
            Verdict::Unreachable => write!(f, "unreachable"),
        }
    }
}

/// Verdicts of every obligation of one criterion.
#[derive(Debug, Clone)]
pub struct SuiteReport {
    pub criterion: Criterion,
    pub verdicts: Vec<(Obligation, Verdict)>,
}

impl SuiteReport {
    fn count(&self, pred: impl Fn(&Verdict) -> bool) -> usize {
        self.verdicts.iter().filter(|(_, v)| pred(v)).count()
    }

    pub fn found(&self) -> usize {
        self.count(|v| matches!(v, Verdict::TestFound(_)))
    }

    pub fn infeasible(&self) -> usize {
        self.count(|v| matches!(v, Verdict::Infeasible))
    }

    pub fn inconclusive(&self) -> usize {
        self.count(|v| matches!(v, Verdict::Inconclusive(_)))
    }

    pub fn unreachable(&self) -> usize {
        self.count(|v| matches!(v, Verdict::Unreachable))
    }

    pub fn verdict(&self, obligation: &Obligation) -> Option<&Verdict> {
        self.verdicts.iter().find(|(o, _)| o == obligation).map(|(_, v)| v)
    }

    /// The distinct test cases of the suite, one per path.
    pub fn tests(&self) -> Vec<TestCase> {
        let mut seen = BTreeSet::new();
        self.verdicts
            .iter()
            .filter_map(|(_, v)| v.test())
            .filter(|case| seen.insert(case.path.clone()))
            .cloned()
            .collect()
    }
}

impl fmt::Display for SuiteReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{}: {} found, {} infeasible, {} inconclusive, {} unreachable",
            self.criterion,
            self.found(),
            self.infeasible(),
            self.inconclusive(),
            self.unreachable()
        )?;
        for (obligation, verdict) in &self.verdicts {
            writeln!(f, "  {}: {}", obligation, verdict)?;
        }
        Ok(())
    }
}

/// Generates a test suite for a coverage criterion.
pub struct SuiteGenerator<'a, S = DefaultSolver> {
    generator: TestGenerator<'a, S>,
    facts: CfgFacts,
    config: SuiteConfig,
}

impl<'a> SuiteGenerator<'a, DefaultSolver> {
    pub fn new(cfg: &'a Cfg, config: SuiteConfig) -> Self {
        Self::with_generator(TestGenerator::new(cfg), config)
    }
}

impl<'a, S: Solver> SuiteGenerator<'a, S> {
    pub fn with_generator(generator: TestGenerator<'a, S>, config: SuiteConfig) -> Self {
        let facts = CfgFacts::new(generator.cfg());
        Self {
            generator,
            facts,
            config,
        }
    }

    pub fn config(&self) -> &SuiteConfig {
        &self.config
    }

    /// The obligations of `criterion`, in a stable order.
    pub fn obligations(&self, criterion: Criterion) -> Vec<Obligation> {
        let cfg = self.generator.cfg();
        let facts = &self.facts;
        match criterion {
            Criterion::Assignments => facts.assignment_nodes.iter().map(|&n| Obligation::Node(n)).collect(),
            Criterion::Decisions => facts.decision_edges.iter().map(|&e| Obligation::Edge(e)).collect(),
            Criterion::KPaths(k) => {
                let paths: BTreeSet<Path> = cfg.k_paths(k).collect();
                paths.into_iter().map(Obligation::Path).collect()
            }
            Criterion::LoopPaths(i) => {
                let paths: BTreeSet<Path> = cfg.loop_paths(i).collect();
                paths.into_iter().map(Obligation::Path).collect()
            }
            Criterion::DuPaths => facts.du_paths.iter().cloned().map(Obligation::DuPath).collect(),
            Criterion::Definitions => facts
                .du_pairs
                .keys()
                .map(|(var, def)| Obligation::Definition {
                    var: var.clone(),
                    def: *def,
                })
                .collect(),
            Criterion::Uses => facts
                .du_pairs
                .iter()
                .flat_map(|((var, def), uses)| {
                    uses.iter().map(move |&to| Obligation::Use {
                        var: var.clone(),
                        def: *def,
                        to,
                    })
                })
                .collect(),
            Criterion::Distance(k) => facts
                .distances
                .iter()
                .filter(|&(_, &d)| d <= k)
                .map(|(&n, _)| Obligation::Node(n))
                .collect(),
        }
    }

    /// Candidate paths, shortest first, without duplicates.
    fn candidate_paths(&self, criterion: Criterion) -> Vec<Path> {
        let cfg = self.generator.cfg();
        let mut seen = BTreeSet::new();
        let mut paths: Vec<Path> = cfg
            .k_paths(self.config.k)
            .chain(cfg.loop_paths(self.config.loop_bound))
            .filter(|p| seen.insert(p.clone()))
            .collect();
        // Explicitly requested paths are always candidates.
        let extra: Box<dyn Iterator<Item = Path> + '_> = match criterion {
            Criterion::KPaths(k) => Box::new(cfg.k_paths(k)),
            Criterion::LoopPaths(i) => Box::new(cfg.loop_paths(i)),
            _ => Box::new(std::iter::empty()),
        };
        for path in extra {
            if seen.insert(path.clone()) {
                paths.push(path);
            }
        }
        paths.sort_by_key(Vec::len);
        paths
    }

    fn solve_all(&self, paths: Vec<&Path>) -> Result<HashMap<Path, PathOutcome>, GenerateError> {
        let solve = |path: &Path| self.generator.solve_path(path).map(|outcome| (path.clone(), outcome));
        if self.config.parallel {
            paths.into_par_iter().map(solve).collect()
        } else {
            paths.into_iter().map(solve).collect()
        }
    }

    /// One verdict per obligation of `criterion`.
    pub fn generate(&self, criterion: Criterion) -> Result<SuiteReport, GenerateError> {
        let obligations = self.obligations(criterion);
        let candidates = self.candidate_paths(criterion);
        debug!(
            "{}: {} obligations, {} candidate paths",
            criterion,
            obligations.len(),
            candidates.len()
        );

        let limit = self.config.max_candidates_per_obligation;
        let mut needed: Vec<(Vec<&Path>, bool)> = Vec::with_capacity(obligations.len());
        for obligation in &obligations {
            let matching: Vec<&Path> = candidates
                .iter()
                .filter(|p| obligation.is_met_by(&self.facts, p))
                .collect();
            let truncated = matching.len() > limit;
            needed.push((matching.into_iter().take(limit).collect(), truncated));
        }

        let mut distinct: BTreeSet<&Path> = BTreeSet::new();
        for (paths, _) in &needed {
            distinct.extend(paths.iter().copied());
        }
        let outcomes = self.solve_all(distinct.into_iter().collect())?;

        let verdicts: Vec<(Obligation, Verdict)> = obligations
            .into_iter()
            .zip(needed)
            .map(|(obligation, (paths, truncated))| {
                let verdict = decide(&paths, truncated, &outcomes);
                debug!("{}: {}", obligation, verdict);
                (obligation, verdict)
            })
            .collect();

        let report = SuiteReport { criterion, verdicts };
        info!(
            "{}: {} found, {} infeasible, {} inconclusive, {} unreachable",
            criterion,
            report.found(),
            report.infeasible(),
            report.inconclusive(),
            report.unreachable()
        );
        Ok(report)
    }
}

fn decide(paths: &[&Path], truncated: bool, outcomes: &HashMap<Path, PathOutcome>) -> Verdict {
    if paths.is_empty() {
        return Verdict::Unreachable;
    }
    let mut unknown = None;
    for path in paths {
        match outcomes.get(*path) {
            Some(PathOutcome::Feasible(case)) => return Verdict::TestFound(case.clone()),
            Some(PathOutcome::Unknown(reason)) => {
                unknown.get_or_insert_with(|| reason.clone());
            }
            Some(PathOutcome::Infeasible) => {}
            None => {
                unknown.get_or_insert_with(|| "path not solved".to_string());
            }
        }
    }
    match unknown {
        Some(reason) => Verdict::Inconclusive(reason),
        None if truncated => Verdict::Inconclusive("candidate limit reached".to_string()),
        None => Verdict::Infeasible,
    }
}
