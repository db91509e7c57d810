//! Structural analyses over a finished [`Cfg`].
//!
//! Every function here is a pure function of the CFG. [`CfgFacts`] computes
//! all of them once and keeps the results, for callers (the coverage checker,
//! the suite generator) that query them repeatedly.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;

use log::debug;

use crate::cfg::Cfg;
use crate::types::{path_to_string, EdgeKey, Node, Path};

/// Nodes whose outgoing edge performs an assignment.
pub fn assignment_nodes(cfg: &Cfg) -> BTreeSet<Node> {
    cfg.edges()
        .iter()
        .filter(|edge| edge.action.is_assign())
        .map(|edge| edge.src)
        .collect()
}

/// Edges whose guard is not the literal `true`.
pub fn decision_edges(cfg: &Cfg) -> BTreeSet<EdgeKey> {
    cfg.edges()
        .iter()
        .filter(|edge| !edge.guard.is_true_literal())
        .map(|edge| edge.key())
        .collect()
}

/// Destinations of the decision edges.
pub fn decision_nodes(cfg: &Cfg) -> BTreeSet<Node> {
    decision_edges(cfg).into_iter().map(|(_, dst)| dst).collect()
}

/// Shortest hop count from START to every reachable node.
pub fn distances(cfg: &Cfg) -> BTreeMap<Node, usize> {
    let mut dist = BTreeMap::new();
    dist.insert(Node::Start, 0);
    let mut queue = VecDeque::from([Node::Start]);
    while let Some(node) = queue.pop_front() {
        let d = dist[&node];
        for succ in cfg.successors(node) {
            if !dist.contains_key(&succ) {
                dist.insert(succ, d + 1);
                queue.push_back(succ);
            }
        }
    }
    dist
}

/// Headers of `while` loops.
pub fn loop_headers(cfg: &Cfg) -> BTreeSet<Node> {
    cfg.nodes().iter().copied().filter(|&node| cfg.is_loop_header(node)).collect()
}

/// Variables written by the outgoing edges of `node`.
pub fn defs(cfg: &Cfg, node: Node) -> BTreeSet<String> {
    cfg.outgoing(node)
        .filter_map(|edge| edge.action.defined_var())
        .map(str::to_string)
        .collect()
}

/// Variables read by the guards and actions of the outgoing edges of `node`.
pub fn refs(cfg: &Cfg, node: Node) -> BTreeSet<String> {
    let mut vars = BTreeSet::new();
    for edge in cfg.outgoing(node) {
        edge.guard.collect_variables(&mut vars);
        vars.extend(edge.action.used_vars());
    }
    vars
}

/// For every loop header, the loop headers lying (transitively) inside its body.
///
/// Computed by a depth-first walk from START that carries the stack of
/// enclosing headers: the body successor of a header is entered with the
/// header pushed, the exit successor without.
pub fn nested_loops(cfg: &Cfg) -> BTreeMap<Node, BTreeSet<Node>> {
    let mut nested: BTreeMap<Node, BTreeSet<Node>> =
        loop_headers(cfg).into_iter().map(|h| (h, BTreeSet::new())).collect();

    let mut visited = HashSet::new();
    let mut stack: Vec<(Node, Vec<Node>)> = vec![(Node::Start, Vec::new())];
    while let Some((node, enclosing)) = stack.pop() {
        if !visited.insert(node) {
            continue;
        }
        if cfg.is_loop_header(node) {
            for outer in &enclosing {
                if let Some(inner) = nested.get_mut(outer) {
                    inner.insert(node);
                }
            }
            let body = cfg
                .loop_body(node)
                .unwrap_or_else(|| panic!("loop header {} has no body successor", node));
            let exit = cfg
                .loop_exit(node)
                .unwrap_or_else(|| panic!("loop header {} has no exit successor", node));
            let mut inside = enclosing.clone();
            inside.push(node);
            stack.push((exit, enclosing));
            stack.push((body, inside));
        } else {
            for succ in cfg.successors(node).into_iter().rev() {
                stack.push((succ, enclosing.clone()));
            }
        }
    }

    debug!("nested_loops = {:?}", nested);
    nested
}

/// Variable -> nodes defining it.
pub fn all_definitions(cfg: &Cfg) -> BTreeMap<String, BTreeSet<Node>> {
    let mut result: BTreeMap<String, BTreeSet<Node>> = BTreeMap::new();
    for &node in cfg.nodes() {
        for var in defs(cfg, node) {
            result.entry(var).or_default().insert(node);
        }
    }
    result
}

/// Variable -> nodes using it.
pub fn all_references(cfg: &Cfg) -> BTreeMap<String, BTreeSet<Node>> {
    let mut result: BTreeMap<String, BTreeSet<Node>> = BTreeMap::new();
    for &node in cfg.nodes() {
        for var in refs(cfg, node) {
            result.entry(var).or_default().insert(node);
        }
    }
    result
}

/// A definition-use path: starts at a node defining `var`, ends at the first
/// node using it, with no redefinition in between.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DuPath {
    pub var: String,
    pub path: Path,
}

impl DuPath {
    pub fn def_node(&self) -> Node {
        self.path[0]
    }

    pub fn use_node(&self) -> Node {
        self.path[self.path.len() - 1]
    }
}

impl fmt::Display for DuPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.var, path_to_string(&self.path))
    }
}

/// Per-node def/ref sets, computed once for the DU search.
struct DefUse {
    defs: HashMap<Node, BTreeSet<String>>,
    refs: HashMap<Node, BTreeSet<String>>,
}

impl DefUse {
    fn new(cfg: &Cfg) -> Self {
        let defs = cfg.nodes().iter().map(|&n| (n, defs(cfg, n))).collect();
        let refs = cfg.nodes().iter().map(|&n| (n, refs(cfg, n))).collect();
        Self { defs, refs }
    }

    fn defines(&self, node: Node, var: &str) -> bool {
        self.defs.get(&node).map_or(false, |vars| vars.contains(var))
    }

    fn uses(&self, node: Node, var: &str) -> bool {
        self.refs.get(&node).map_or(false, |vars| vars.contains(var))
    }
}

/// Depth-first search for the def-clear paths leaving `def_node`.
///
/// A branch stops at the first node using `var` (recorded), at a
/// redefinition, at END, or when it would revisit a node (dropped). A node
/// that both reads and writes `var` counts as a use, since the read happens
/// first. Returning to `def_node` itself is allowed so that a definition used
/// on the next loop iteration is found.
fn du_paths_from(cfg: &Cfg, facts: &DefUse, var: &str, def_node: Node, out: &mut BTreeSet<DuPath>) {
    let mut path = vec![def_node];
    let mut stack: Vec<(Node, usize)> = cfg.successors(def_node).into_iter().rev().map(|n| (n, 1)).collect();

    while let Some((node, depth)) = stack.pop() {
        path.truncate(depth);
        if facts.uses(node, var) {
            let mut du = path.clone();
            du.push(node);
            out.insert(DuPath {
                var: var.to_string(),
                path: du,
            });
            continue;
        }
        if node.is_end() || facts.defines(node, var) || path.contains(&node) {
            continue;
        }
        path.push(node);
        for succ in cfg.successors(node).into_iter().rev() {
            stack.push((succ, depth + 1));
        }
    }
}

/// All distinct DU paths of the CFG, ordered by variable, then by path.
pub fn all_du_paths(cfg: &Cfg) -> Vec<DuPath> {
    let facts = DefUse::new(cfg);
    let mut result = BTreeSet::new();
    for (var, def_nodes) in all_definitions(cfg) {
        for def_node in def_nodes {
            du_paths_from(cfg, &facts, &var, def_node, &mut result);
        }
    }
    debug!("found {} DU paths", result.len());
    result.into_iter().collect()
}

/// `(variable, definition node)` -> use nodes reachable from it def-clear.
pub fn du_pairs(cfg: &Cfg) -> BTreeMap<(String, Node), BTreeSet<Node>> {
    let mut result: BTreeMap<(String, Node), BTreeSet<Node>> = BTreeMap::new();
    for du in all_du_paths(cfg) {
        let use_node = du.use_node();
        result.entry((du.var.clone(), du.def_node())).or_default().insert(use_node);
    }
    result
}

/// All analysis results of one CFG, computed once.
#[derive(Debug, Clone)]
pub struct CfgFacts {
    pub assignment_nodes: BTreeSet<Node>,
    pub decision_edges: BTreeSet<EdgeKey>,
    pub decision_nodes: BTreeSet<Node>,
    pub distances: BTreeMap<Node, usize>,
    pub loop_headers: BTreeSet<Node>,
    pub nested_loops: BTreeMap<Node, BTreeSet<Node>>,
    pub definitions: BTreeMap<String, BTreeSet<Node>>,
    pub references: BTreeMap<String, BTreeSet<Node>>,
    pub du_paths: Vec<DuPath>,
    pub du_pairs: BTreeMap<(String, Node), BTreeSet<Node>>,
    defs: HashMap<Node, BTreeSet<String>>,
    refs: HashMap<Node, BTreeSet<String>>,
}

impl CfgFacts {
    pub fn new(cfg: &Cfg) -> Self {
        let def_use = DefUse::new(cfg);
        let du_paths = all_du_paths(cfg);
        let mut du_pairs: BTreeMap<(String, Node), BTreeSet<Node>> = BTreeMap::new();
        for du in &du_paths {
            du_pairs.entry((du.var.clone(), du.def_node())).or_default().insert(du.use_node());
        }
        let decision_edges = decision_edges(cfg);
        let decision_nodes = decision_edges.iter().map(|&(_, dst)| dst).collect();
        Self {
            assignment_nodes: assignment_nodes(cfg),
            decision_edges,
            decision_nodes,
            distances: distances(cfg),
            loop_headers: loop_headers(cfg),
            nested_loops: nested_loops(cfg),
            definitions: all_definitions(cfg),
            references: all_references(cfg),
            du_paths,
            du_pairs,
            defs: def_use.defs,
            refs: def_use.refs,
        }
    }

    pub fn defines(&self, node: Node, var: &str) -> bool {
        self.defs.get(&node).map_or(false, |vars| vars.contains(var))
    }

    pub fn uses(&self, node: Node, var: &str) -> bool {
        self.refs.get(&node).map_or(false, |vars| vars.contains(var))
    }

    /// Headers nested inside `header` (empty for non-headers).
    pub fn nested_in(&self, header: Node) -> impl Iterator<Item = Node> + '_ {
        self.nested_loops.get(&header).into_iter().flatten().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    use crate::expr::{AExp, BExp};
    use crate::stmt::Stmt;

    fn countdown() -> Cfg {
        // 1: x := 5; 2: while (x > 0) { 3: x := x - 1; }
        Cfg::build(&Stmt::seq([
            Stmt::assign(1, "x", AExp::cst(5)),
            Stmt::while_do(
                2,
                BExp::gt(AExp::var("x"), AExp::cst(0)),
                Stmt::assign(3, "x", AExp::sub(AExp::var("x"), AExp::cst(1))),
            ),
        ]))
        .unwrap()
    }

    fn branch() -> Cfg {
        // 1: if (x == 1) { 2: y := 0; } else { 3: x := 1; }
        Cfg::build(&Stmt::if_else(
            1,
            BExp::eq(AExp::var("x"), AExp::cst(1)),
            Stmt::assign(2, "y", AExp::cst(0)),
            Stmt::assign(3, "x", AExp::cst(1)),
        ))
        .unwrap()
    }

    fn nested() -> Cfg {
        // 1: while (i < 3) { 2: j := 0; 3: while (j < 2) { 4: j := j + 1; } 5: i := i + 1; }
        Cfg::build(&Stmt::while_do(
            1,
            BExp::lt(AExp::var("i"), AExp::cst(3)),
            Stmt::seq([
                Stmt::assign(2, "j", AExp::cst(0)),
                Stmt::while_do(
                    3,
                    BExp::lt(AExp::var("j"), AExp::cst(2)),
                    Stmt::assign(4, "j", AExp::add(AExp::var("j"), AExp::cst(1))),
                ),
                Stmt::assign(5, "i", AExp::add(AExp::var("i"), AExp::cst(1))),
            ]),
        ))
        .unwrap()
    }

    #[test]
    fn test_assignment_and_decision_nodes() {
        let cfg = branch();
        assert_eq!(assignment_nodes(&cfg), BTreeSet::from([Node::point(2), Node::point(3)]));
        assert_eq!(decision_nodes(&cfg), BTreeSet::from([Node::point(2), Node::point(3)]));
        assert_eq!(
            decision_edges(&cfg),
            BTreeSet::from([(Node::point(1), Node::point(2)), (Node::point(1), Node::point(3))])
        );
    }

    #[test]
    fn test_distances() {
        let cfg = countdown();
        let dist = distances(&cfg);
        println!("distances = {:?}", dist);
        assert_eq!(dist[&Node::Start], 0);
        assert_eq!(dist[&Node::point(1)], 1);
        assert_eq!(dist[&Node::point(2)], 2);
        assert_eq!(dist[&Node::point(3)], 3);
        assert_eq!(dist[&Node::End], 3);
    }

    #[test]
    fn test_defs_and_refs() {
        let cfg = countdown();
        assert_eq!(defs(&cfg, Node::point(1)), BTreeSet::from(["x".to_string()]));
        assert!(refs(&cfg, Node::point(1)).is_empty());
        assert_eq!(refs(&cfg, Node::point(2)), BTreeSet::from(["x".to_string()]));
        assert!(defs(&cfg, Node::point(2)).is_empty());
        assert_eq!(defs(&cfg, Node::point(3)), refs(&cfg, Node::point(3)));
        assert!(defs(&cfg, Node::End).is_empty());
    }

    #[test]
    fn test_loop_headers_and_nesting() {
        let cfg = nested();
        assert_eq!(loop_headers(&cfg), BTreeSet::from([Node::point(1), Node::point(3)]));
        let nesting = nested_loops(&cfg);
        assert_eq!(nesting[&Node::point(1)], BTreeSet::from([Node::point(3)]));
        assert!(nesting[&Node::point(3)].is_empty());
        for (header, inner) in &nesting {
            assert!(!inner.contains(header));
        }
    }

    #[test]
    fn test_sequential_loops_are_not_nested() {
        let cfg = Cfg::build(&Stmt::seq([
            Stmt::while_do(1, BExp::var("a"), Stmt::assign(2, "x", AExp::cst(1))),
            Stmt::while_do(3, BExp::var("b"), Stmt::assign(4, "y", AExp::cst(1))),
        ]))
        .unwrap();
        let nesting = nested_loops(&cfg);
        assert!(nesting[&Node::point(1)].is_empty());
        assert!(nesting[&Node::point(3)].is_empty());
    }

    #[test]
    fn test_all_definitions() {
        let cfg = branch();
        let defs = all_definitions(&cfg);
        assert_eq!(defs["x"], BTreeSet::from([Node::point(3)]));
        assert_eq!(defs["y"], BTreeSet::from([Node::point(2)]));
    }

    #[test]
    fn test_du_paths_countdown() {
        let cfg = countdown();
        let paths = all_du_paths(&cfg);
        for du in &paths {
            println!("du path {}", du);
        }
        let expected = vec![
            DuPath {
                var: "x".to_string(),
                path: vec![Node::point(1), Node::point(2)],
            },
            DuPath {
                var: "x".to_string(),
                path: vec![Node::point(3), Node::point(2)],
            },
        ];
        assert_eq!(paths, expected);
    }

    #[test]
    fn test_du_path_into_loop_body() {
        // 1: y := 0; 2: while (x > 0) { 3: x := x - y; }
        let cfg = Cfg::build(&Stmt::seq([
            Stmt::assign(1, "y", AExp::cst(0)),
            Stmt::while_do(
                2,
                BExp::gt(AExp::var("x"), AExp::cst(0)),
                Stmt::assign(3, "x", AExp::sub(AExp::var("x"), AExp::var("y"))),
            ),
        ]))
        .unwrap();
        let pairs = du_pairs(&cfg);
        assert_eq!(pairs[&("y".to_string(), Node::point(1))], BTreeSet::from([Node::point(3)]));
    }

    #[test]
    fn test_du_path_stops_at_redefinition() {
        // 1: x := 1; 2: x := 2; 3: print x;
        let cfg = Cfg::build(&Stmt::seq([
            Stmt::assign(1, "x", AExp::cst(1)),
            Stmt::assign(2, "x", AExp::cst(2)),
            Stmt::print(3, AExp::var("x")),
        ]))
        .unwrap();
        let paths = all_du_paths(&cfg);
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].path, vec![Node::point(2), Node::point(3)]);
        assert!(!du_pairs(&cfg).contains_key(&("x".to_string(), Node::point(1))));
    }

    #[test]
    fn test_analyses_are_idempotent() {
        let cfg = nested();
        assert_eq!(all_du_paths(&cfg), all_du_paths(&cfg));
        assert_eq!(nested_loops(&cfg), nested_loops(&cfg));
        assert_eq!(distances(&cfg), distances(&cfg));
        let facts = CfgFacts::new(&cfg);
        assert_eq!(facts.du_paths, all_du_paths(&cfg));
        assert_eq!(facts.du_pairs, du_pairs(&cfg));
        assert_eq!(facts.nested_in(Node::point(1)).collect::<Vec<_>>(), vec![Node::point(3)]);
    }
}
