//! Coverage of executed paths against structural criteria.
//!
//! A [`CoverageChecker`] takes the node sequences produced by concrete runs
//! (see [`crate::runner`]) and reports, for each criterion, the obligations no
//! executed path meets:
//!
//! | criterion      | obligation                                   | met when                                  |
//! |----------------|----------------------------------------------|-------------------------------------------|
//! | all-assign     | assignment node                              | the node appears in a path                |
//! | all-decisions  | decision edge                                | the edge is traversed                     |
//! | all-k-paths    | START..END path of at most `k` edges         | it is exactly one of the executed paths   |
//! | all-i-loops    | path taking each loop at most `i` times      | it is exactly one of the executed paths   |
//! | all-du-paths   | DU path                                      | it occurs as a contiguous sub-path        |
//! | all-defs       | `(variable, definition)` with a reachable use | a def-clear run reaches some use         |
//! | all-uses       | `(variable, definition, use)`                | a def-clear run reaches that use          |
//! | distance       | node within `k` hops of START                | the node appears in a path                |
//!
//! Every report carries its ratio `1 - uncovered / total`; an empty obligation
//! set counts as fully covered.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Instant;

use log::{debug, info};

use crate::analysis::{CfgFacts, DuPath};
use crate::cfg::Cfg;
use crate::types::{EdgeKey, Node, Path};

/// `(variable, definition, use)` triples exercised by one path.
///
/// Each occurrence of a definition is followed until the first node using
/// the variable (exercised) or redefining it (dropped).
pub(crate) fn exercised_uses(facts: &CfgFacts, path: &[Node]) -> BTreeSet<(String, Node, Node)> {
    let mut result = BTreeSet::new();
    for (i, &def_node) in path.iter().enumerate() {
        for var in facts.definitions.keys() {
            if !facts.defines(def_node, var) {
                continue;
            }
            for &node in &path[i + 1..] {
                if facts.uses(node, var) {
                    result.insert((var.clone(), def_node, node));
                    break;
                }
                if facts.defines(node, var) {
                    break;
                }
            }
        }
    }
    result
}

/// A structural coverage criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Criterion {
    Assignments,
    Decisions,
    KPaths(usize),
    LoopPaths(usize),
    DuPaths,
    Definitions,
    Uses,
    Distance(usize),
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Criterion::Assignments => write!(f, "all-assign"),
            Criterion::Decisions => write!(f, "all-decisions"),
            Criterion::KPaths(k) => write!(f, "all-{}-paths", k),
            Criterion::LoopPaths(i) => write!(f, "all-{}-loops", i),
            Criterion::DuPaths => write!(f, "all-du-paths"),
            Criterion::Definitions => write!(f, "all-defs"),
            Criterion::Uses => write!(f, "all-uses"),
            Criterion::Distance(k) => write!(f, "distance-{}", k),
        }
    }
}

/// Uncovered obligations of one criterion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageReport<T> {
    pub criterion: Criterion,
    pub total: usize,
    pub uncovered: BTreeSet<T>,
}

impl<T> CoverageReport<T> {
    fn new(criterion: Criterion, total: usize, uncovered: BTreeSet<T>) -> Self {
        let report = Self {
            criterion,
            total,
            uncovered,
        };
        info!("{}", report);
        report
    }

    pub fn covered(&self) -> usize {
        self.total - self.uncovered.len()
    }

    /// Fraction of obligations met, in `[0, 1]`.
    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            1.0 - self.uncovered.len() as f64 / self.total as f64
        }
    }

    pub fn is_complete(&self) -> bool {
        self.uncovered.is_empty()
    }
}

impl CoverageReport<DuPath> {
    /// `(variable, definition node)` pairs with an unresolved DU path.
    pub fn remaining_pairs(&self) -> BTreeSet<(String, Node)> {
        self.uncovered.iter().map(|du| (du.var.clone(), du.def_node())).collect()
    }
}

impl<T> fmt::Display for CoverageReport<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}/{} covered ({:.1}%)",
            self.criterion,
            self.covered(),
            self.total,
            self.ratio() * 100.0
        )
    }
}

/// Checks executed paths against the obligations of one CFG.
pub struct CoverageChecker<'a> {
    cfg: &'a Cfg,
    facts: CfgFacts,
}

impl<'a> CoverageChecker<'a> {
    pub fn new(cfg: &'a Cfg) -> Self {
        Self::with_facts(cfg, CfgFacts::new(cfg))
    }

    /// Reuses analysis results computed elsewhere.
    pub fn with_facts(cfg: &'a Cfg, facts: CfgFacts) -> Self {
        Self { cfg, facts }
    }

    pub fn facts(&self) -> &CfgFacts {
        &self.facts
    }

    fn visited(executed: &[Path]) -> BTreeSet<Node> {
        executed.iter().flatten().copied().collect()
    }

    /// Assignment nodes no executed path visits.
    pub fn uncovered_assignments(&self, executed: &[Path]) -> CoverageReport<Node> {
        let visited = Self::visited(executed);
        let uncovered = self.facts.assignment_nodes.difference(&visited).copied().collect();
        CoverageReport::new(Criterion::Assignments, self.facts.assignment_nodes.len(), uncovered)
    }

    /// Decision edges no executed path traverses.
    pub fn uncovered_decisions(&self, executed: &[Path]) -> CoverageReport<EdgeKey> {
        let traversed: BTreeSet<EdgeKey> = executed
            .iter()
            .flat_map(|path| path.windows(2).map(|w| (w[0], w[1])))
            .collect();
        let uncovered = self.facts.decision_edges.difference(&traversed).copied().collect();
        CoverageReport::new(Criterion::Decisions, self.facts.decision_edges.len(), uncovered)
    }

    fn uncovered_paths(
        criterion: Criterion,
        expected: impl Iterator<Item = Path>,
        executed: &[Path],
    ) -> CoverageReport<Path> {
        let start = Instant::now();
        let executed: BTreeSet<&Path> = executed.iter().collect();
        let expected: BTreeSet<Path> = expected.collect();
        let uncovered = expected.iter().filter(|path| !executed.contains(path)).cloned().collect();
        debug!("{}: enumerated {} paths in {:?}", criterion, expected.len(), start.elapsed());
        CoverageReport::new(criterion, expected.len(), uncovered)
    }

    /// Paths of at most `k` edges that were not executed exactly.
    pub fn uncovered_k_paths(&self, executed: &[Path], k: usize) -> CoverageReport<Path> {
        Self::uncovered_paths(Criterion::KPaths(k), self.cfg.k_paths(k), executed)
    }

    /// Paths taking each loop at most `i` times that were not executed exactly.
    pub fn uncovered_loop_paths(&self, executed: &[Path], i: usize) -> CoverageReport<Path> {
        Self::uncovered_paths(Criterion::LoopPaths(i), self.cfg.loop_paths(i), executed)
    }

    /// DU paths not contained in any executed path.
    pub fn unresolved_du_paths(&self, executed: &[Path]) -> CoverageReport<DuPath> {
        let uncovered = self
            .facts
            .du_paths
            .iter()
            .filter(|du| {
                !executed
                    .iter()
                    .any(|path| path.windows(du.path.len()).any(|w| w == du.path.as_slice()))
            })
            .cloned()
            .collect();
        CoverageReport::new(Criterion::DuPaths, self.facts.du_paths.len(), uncovered)
    }

    fn exercised_uses(&self, executed: &[Path]) -> BTreeSet<(String, Node, Node)> {
        executed.iter().flat_map(|path| exercised_uses(&self.facts, path)).collect()
    }

    /// Definitions (with at least one reachable use) that never reach a use.
    pub fn uncovered_definitions(&self, executed: &[Path]) -> CoverageReport<(String, Node)> {
        let reached: BTreeSet<(String, Node)> = self
            .exercised_uses(executed)
            .into_iter()
            .map(|(var, def_node, _)| (var, def_node))
            .collect();
        let uncovered = self
            .facts
            .du_pairs
            .keys()
            .filter(|pair| !reached.contains(*pair))
            .cloned()
            .collect();
        CoverageReport::new(Criterion::Definitions, self.facts.du_pairs.len(), uncovered)
    }

    /// Definition-use pairs never exercised def-clear.
    pub fn uncovered_uses(&self, executed: &[Path]) -> CoverageReport<(String, Node, Node)> {
        let exercised = self.exercised_uses(executed);
        let expected: BTreeSet<(String, Node, Node)> = self
            .facts
            .du_pairs
            .iter()
            .flat_map(|((var, def_node), uses)| uses.iter().map(move |&u| (var.clone(), *def_node, u)))
            .collect();
        let total = expected.len();
        let uncovered = expected.difference(&exercised).cloned().collect();
        CoverageReport::new(Criterion::Uses, total, uncovered)
    }

    /// Nodes within `k` hops of START that no executed path visits.
    pub fn uncovered_within_distance(&self, executed: &[Path], k: usize) -> CoverageReport<Node> {
        let visited = Self::visited(executed);
        let near: BTreeSet<Node> = self
            .facts
            .distances
            .iter()
            .filter(|&(_, &d)| d <= k)
            .map(|(&node, _)| node)
            .collect();
        let uncovered = near.difference(&visited).copied().collect();
        CoverageReport::new(Criterion::Distance(k), near.len(), uncovered)
    }

    /// Every criterion at once.
    pub fn summary(&self, executed: &[Path], k: usize, i: usize) -> CoverageSummary {
        let start = Instant::now();
        let summary = CoverageSummary {
            assignments: self.uncovered_assignments(executed),
            decisions: self.uncovered_decisions(executed),
            k_paths: self.uncovered_k_paths(executed, k),
            loop_paths: self.uncovered_loop_paths(executed, i),
            du_paths: self.unresolved_du_paths(executed),
            definitions: self.uncovered_definitions(executed),
            uses: self.uncovered_uses(executed),
            distance: self.uncovered_within_distance(executed, k),
        };
        debug!("coverage of {} paths computed in {:?}", executed.len(), start.elapsed());
        summary
    }
}

/// Reports of all criteria for one set of executed paths.
#[derive(Debug, Clone)]
pub struct CoverageSummary {
    pub assignments: CoverageReport<Node>,
    pub decisions: CoverageReport<EdgeKey>,
    pub k_paths: CoverageReport<Path>,
    pub loop_paths: CoverageReport<Path>,
    pub du_paths: CoverageReport<DuPath>,
    pub definitions: CoverageReport<(String, Node)>,
    pub uses: CoverageReport<(String, Node, Node)>,
    pub distance: CoverageReport<Node>,
}

impl CoverageSummary {
    /// `(criterion, ratio)` for every report, in a fixed order.
    pub fn ratios(&self) -> Vec<(Criterion, f64)> {
        vec![
            (self.assignments.criterion, self.assignments.ratio()),
            (self.decisions.criterion, self.decisions.ratio()),
            (self.k_paths.criterion, self.k_paths.ratio()),
            (self.loop_paths.criterion, self.loop_paths.ratio()),
            (self.du_paths.criterion, self.du_paths.ratio()),
            (self.definitions.criterion, self.definitions.ratio()),
            (self.uses.criterion, self.uses.ratio()),
            (self.distance.criterion, self.distance.ratio()),
        ]
    }
}

impl fmt::Display for CoverageSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.assignments)?;
        writeln!(f, "{}", self.decisions)?;
        writeln!(f, "{}", self.k_paths)?;
        writeln!(f, "{}", self.loop_paths)?;
        writeln!(f, "{}", self.du_paths)?;
        writeln!(f, "{}", self.definitions)?;
        writeln!(f, "{}", self.uses)?;
        write!(f, "{}", self.distance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    use crate::expr::{AExp, BExp};
    use crate::stmt::Stmt;

    fn p(nodes: &[u32]) -> Path {
        let mut path = vec![Node::Start];
        path.extend(nodes.iter().map(|&id| Node::point(id)));
        path.push(Node::End);
        path
    }

    /// 1: if (x > 0) { 2: y := x; } else { 3: y := 0 - x; } 4: print y;
    fn abs_program() -> Cfg {
        Cfg::build(&Stmt::seq([
            Stmt::if_else(
                1,
                BExp::gt(AExp::var("x"), AExp::cst(0)),
                Stmt::assign(2, "y", AExp::var("x")),
                Stmt::assign(3, "y", AExp::sub(AExp::cst(0), AExp::var("x"))),
            ),
            Stmt::print(4, AExp::var("y")),
        ]))
        .unwrap()
    }

    #[test]
    fn test_no_executions() {
        let cfg = abs_program();
        let checker = CoverageChecker::new(&cfg);
        let summary = checker.summary(&[], 10, 1);
        println!("{}", summary);
        assert_eq!(summary.assignments.uncovered, BTreeSet::from([Node::point(2), Node::point(3)]));
        assert_eq!(summary.decisions.total, 2);
        assert_eq!(summary.decisions.ratio(), 0.0);
        assert_eq!(summary.k_paths.total, 2);
        assert!(!summary.du_paths.is_complete());
    }

    #[test]
    fn test_one_branch() {
        let cfg = abs_program();
        let checker = CoverageChecker::new(&cfg);
        let executed = vec![p(&[1, 2, 4])];

        let assignments = checker.uncovered_assignments(&executed);
        assert_eq!(assignments.uncovered, BTreeSet::from([Node::point(3)]));
        assert_eq!(assignments.ratio(), 0.5);

        let decisions = checker.uncovered_decisions(&executed);
        assert_eq!(decisions.uncovered, BTreeSet::from([(Node::point(1), Node::point(3))]));

        let k_paths = checker.uncovered_k_paths(&executed, 10);
        assert_eq!(k_paths.uncovered, BTreeSet::from([p(&[1, 3, 4])]));

        let du = checker.unresolved_du_paths(&executed);
        println!("unresolved: {:?}", du.uncovered);
        let pairs = du.remaining_pairs();
        assert!(pairs.contains(&("y".to_string(), Node::point(3))));
        assert!(!pairs.contains(&("y".to_string(), Node::point(2))));

        let defs = checker.uncovered_definitions(&executed);
        assert_eq!(defs.uncovered, BTreeSet::from([("y".to_string(), Node::point(3))]));
    }

    #[test]
    fn test_full_coverage() {
        let cfg = abs_program();
        let checker = CoverageChecker::new(&cfg);
        let executed = vec![p(&[1, 2, 4]), p(&[1, 3, 4])];
        let summary = checker.summary(&executed, 10, 1);
        for (criterion, ratio) in summary.ratios() {
            println!("{}: {}", criterion, ratio);
            assert_eq!(ratio, 1.0, "{} not fully covered", criterion);
        }
    }

    #[test]
    fn test_empty_obligations() {
        // 1: print 1;
        let cfg = Cfg::build(&Stmt::print(1, AExp::cst(1))).unwrap();
        let checker = CoverageChecker::new(&cfg);
        let assignments = checker.uncovered_assignments(&[]);
        assert_eq!(assignments.total, 0);
        assert_eq!(assignments.ratio(), 1.0);
        assert!(assignments.is_complete());
        let uses = checker.uncovered_uses(&[]);
        assert_eq!(uses.ratio(), 1.0);
    }

    #[test]
    fn test_loop_uses() {
        // 1: x := 3; 2: while (x > 0) { 3: x := x - 1; }
        let cfg = Cfg::build(&Stmt::seq([
            Stmt::assign(1, "x", AExp::cst(3)),
            Stmt::while_do(
                2,
                BExp::gt(AExp::var("x"), AExp::cst(0)),
                Stmt::assign(3, "x", AExp::sub(AExp::var("x"), AExp::cst(1))),
            ),
        ]))
        .unwrap();
        let checker = CoverageChecker::new(&cfg);
        let executed = vec![p(&[1, 2, 3, 2, 3, 2, 3, 2])];

        let uses = checker.uncovered_uses(&executed);
        println!("{}: {:?}", uses, uses.uncovered);
        // Both definitions are first used by the loop guard.
        assert_eq!(uses.total, 2);
        assert!(uses.is_complete());

        let loops = checker.uncovered_loop_paths(&executed, 1);
        assert_eq!(loops.uncovered, BTreeSet::from([p(&[1, 2]), p(&[1, 2, 3, 2])]));
    }

    #[test]
    fn test_distance() {
        let cfg = abs_program();
        let checker = CoverageChecker::new(&cfg);
        let report = checker.uncovered_within_distance(&[p(&[1, 2, 4])], 2);
        // START, 1, 2, 3 are within two hops.
        assert_eq!(report.total, 4);
        assert_eq!(report.uncovered, BTreeSet::from([Node::point(3)]));
    }
}
