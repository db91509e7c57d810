//! Control-flow graph and its construction from a statement AST.
//!
//! ## Overview
//!
//! Nodes are program points (labels of `Assign`/`If`/`While`/`Input`/`Print`
//! statements) plus the two sentinels START and END. Each edge carries a
//! *guard* (a boolean expression that must hold to take it) and an *action*
//! (the straight-line statement executed when taking it). The action of an
//! assignment is carried by the edge *leaving* the assignment's node.
//!
//! ## Construction
//!
//! Lowering is structural. The builder threads a set of *half-edges* (source,
//! guard, action, but no destination yet) through the AST. Every labelled
//! statement materializes its node and connects all pending half-edges to it;
//! what it returns is the set of half-edges leaving it. After the whole
//! program is lowered, the remaining half-edges are connected to END.
//!
//! ## Branch ordering
//!
//! Every edge records its structural [`Branch`] role. [`Cfg::successors`] of an
//! `if` header lists the then-branch before the else-branch, and of a `while`
//! header lists the loop body before the loop exit. This holds no matter in
//! which order the edges were connected, and the loop analyses rely on it.
//!
//! ## Example
//!
//! ```
//! use whilecov::cfg::Cfg;
//! use whilecov::expr::{AExp, BExp};
//! use whilecov::stmt::Stmt;
//! use whilecov::types::Node;
//!
//! // x := 5; while (x > 0) { x := x - 1; }
//! let prog = Stmt::seq([
//!     Stmt::assign(1, "x", AExp::cst(5)),
//!     Stmt::while_do(2, BExp::gt(AExp::var("x"), AExp::cst(0)),
//!         Stmt::assign(3, "x", AExp::sub(AExp::var("x"), AExp::cst(1)))),
//! ]);
//! let cfg = Cfg::build(&prog).unwrap();
//!
//! assert_eq!(cfg.successors(Node::Start), vec![Node::point(1)]);
//! assert_eq!(cfg.successors(Node::point(2)), vec![Node::point(3), Node::End]);
//! ```

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use log::debug;

use crate::error::BuildError;
use crate::expr::BExp;
use crate::stmt::{Action, Stmt};
use crate::types::{EdgeKey, Label, Node, NodeKind};

/// Structural role of an edge with respect to its source node.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Branch {
    /// Fall-through from START or from a straight-line statement.
    Next,
    /// Condition holds at an `if` header.
    Then,
    /// Condition fails at an `if` header.
    Else,
    /// Condition holds at a `while` header: enter the body.
    Body,
    /// Condition fails at a `while` header: leave the loop.
    Exit,
}

impl Branch {
    fn rank(self) -> u8 {
        match self {
            Branch::Next | Branch::Then | Branch::Body => 0,
            Branch::Else | Branch::Exit => 1,
        }
    }
}

/// A CFG edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub src: Node,
    pub dst: Node,
    pub guard: BExp,
    pub action: Action,
    pub branch: Branch,
}

impl Edge {
    pub fn key(&self) -> EdgeKey {
        (self.src, self.dst)
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {} [{} / {}]", self.src, self.dst, self.guard, self.action)
    }
}

/// A control-flow graph.
///
/// Built once per program by [`Cfg::build`] and read-only afterwards.
#[derive(Debug, Clone)]
pub struct Cfg {
    /// Nodes in creation order: START first, END last.
    nodes: Vec<Node>,
    kinds: HashMap<Label, NodeKind>,
    edges: Vec<Edge>,
    /// Outgoing edge indices per node, in branch order.
    outgoing: HashMap<Node, Vec<usize>>,
}

/// An edge whose destination is not known yet.
#[derive(Debug, Clone)]
struct HalfEdge {
    src: Node,
    guard: BExp,
    action: Action,
    branch: Branch,
}

impl HalfEdge {
    fn new(src: Node, guard: BExp, action: Action, branch: Branch) -> Self {
        Self {
            src,
            guard,
            action,
            branch,
        }
    }
}

struct CfgBuilder {
    nodes: Vec<Node>,
    kinds: HashMap<Label, NodeKind>,
    edges: Vec<Edge>,
}

impl CfgBuilder {
    fn new() -> Self {
        Self {
            nodes: vec![Node::Start],
            kinds: HashMap::new(),
            edges: Vec::new(),
        }
    }

    /// Adds the node for `label` and connects every pending half-edge to it.
    fn materialize(&mut self, label: Label, kind: Option<NodeKind>, pending: Vec<HalfEdge>) -> Node {
        let node = Node::Point(label);
        debug!("materialize(node = {}, kind = {:?}, incoming = {})", node, kind, pending.len());
        self.nodes.push(node);
        if let Some(kind) = kind {
            self.kinds.insert(label, kind);
        }
        self.connect(pending, node);
        node
    }

    fn connect(&mut self, pending: Vec<HalfEdge>, dst: Node) {
        for half in pending {
            let edge = Edge {
                src: half.src,
                dst,
                guard: half.guard,
                action: half.action,
                branch: half.branch,
            };
            debug!("edge {}", edge);
            self.edges.push(edge);
        }
    }

    fn lower(&mut self, stmt: &Stmt, pending: Vec<HalfEdge>) -> Vec<HalfEdge> {
        match stmt {
            Stmt::Skip => pending,
            Stmt::Seq(stmts) => stmts.iter().fold(pending, |pending, stmt| self.lower(stmt, pending)),
            Stmt::Assign { var, expr, label } => {
                let node = self.materialize(*label, None, pending);
                let action = Action::Assign {
                    var: var.clone(),
                    expr: expr.clone(),
                };
                vec![HalfEdge::new(node, BExp::tt(), action, Branch::Next)]
            }
            Stmt::Input { var, label } => {
                let node = self.materialize(*label, None, pending);
                let action = Action::Input { var: var.clone() };
                vec![HalfEdge::new(node, BExp::tt(), action, Branch::Next)]
            }
            Stmt::Print { expr, label } => {
                let node = self.materialize(*label, None, pending);
                let action = Action::Print { expr: expr.clone() };
                vec![HalfEdge::new(node, BExp::tt(), action, Branch::Next)]
            }
            Stmt::If { cond, then, els, label } => {
                let node = self.materialize(*label, Some(NodeKind::If), pending);
                let then_start = vec![HalfEdge::new(node, cond.clone(), Action::Skip, Branch::Then)];
                let mut out = self.lower(then, then_start);
                let else_start = HalfEdge::new(node, BExp::not(cond.clone()), Action::Skip, Branch::Else);
                if els.is_skip() {
                    out.push(else_start);
                } else {
                    out.extend(self.lower(els, vec![else_start]));
                }
                out
            }
            Stmt::While { cond, body, label } => {
                let node = self.materialize(*label, Some(NodeKind::While), pending);
                let body_start = vec![HalfEdge::new(node, cond.clone(), Action::Skip, Branch::Body)];
                let body_out = self.lower(body, body_start);
                self.connect(body_out, node);
                vec![HalfEdge::new(node, BExp::not(cond.clone()), Action::Skip, Branch::Exit)]
            }
        }
    }

    fn finish(mut self, pending: Vec<HalfEdge>) -> Cfg {
        self.nodes.push(Node::End);
        self.connect(pending, Node::End);

        let mut outgoing: HashMap<Node, Vec<usize>> = HashMap::new();
        for (i, edge) in self.edges.iter().enumerate() {
            outgoing.entry(edge.src).or_default().push(i);
        }
        // Stable: edges of equal rank keep their connection order.
        for indices in outgoing.values_mut() {
            indices.sort_by_key(|&i| self.edges[i].branch.rank());
        }

        Cfg {
            nodes: self.nodes,
            kinds: self.kinds,
            edges: self.edges,
            outgoing,
        }
    }
}

impl Cfg {
    /// Lowers a statement AST into a CFG.
    ///
    /// Fails if two statements share a label; no partial CFG is returned.
    pub fn build(ast: &Stmt) -> Result<Cfg, BuildError> {
        let mut seen = HashSet::new();
        for label in ast.labels() {
            if !seen.insert(label) {
                return Err(BuildError::DuplicateLabel(label));
            }
        }

        let mut builder = CfgBuilder::new();
        let start = vec![HalfEdge::new(Node::Start, BExp::tt(), Action::Skip, Branch::Next)];
        let pending = builder.lower(ast, start);
        let cfg = builder.finish(pending);
        debug!("built CFG with {} nodes and {} edges", cfg.num_nodes(), cfg.num_edges());
        Ok(cfg)
    }

    /// All nodes, in creation order (START first, END last).
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// All edges, in creation order.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn contains(&self, node: Node) -> bool {
        match node {
            Node::Start | Node::End => true,
            Node::Point(_) => self.nodes.contains(&node),
        }
    }

    /// Structural kind of a node (`If`, `While`, or `None` for the rest).
    pub fn kind(&self, node: Node) -> Option<NodeKind> {
        node.label().and_then(|label| self.kinds.get(&label).copied())
    }

    pub fn is_loop_header(&self, node: Node) -> bool {
        self.kind(node) == Some(NodeKind::While)
    }

    /// Outgoing edges of `node`, in branch order.
    pub fn outgoing(&self, node: Node) -> impl Iterator<Item = &Edge> + '_ {
        self.outgoing
            .get(&node)
            .into_iter()
            .flat_map(move |indices| indices.iter().map(move |&i| &self.edges[i]))
    }

    /// Distinct successors of `node`, in branch order.
    pub fn successors(&self, node: Node) -> Vec<Node> {
        let mut result = Vec::new();
        for edge in self.outgoing(node) {
            if !result.contains(&edge.dst) {
                result.push(edge.dst);
            }
        }
        result
    }

    /// Distinct predecessors of `node` (computed by scanning all edges).
    pub fn predecessors(&self, node: Node) -> Vec<Node> {
        let mut result = Vec::new();
        for edge in &self.edges {
            if edge.dst == node && !result.contains(&edge.src) {
                result.push(edge.src);
            }
        }
        result
    }

    /// All edges from `src` to `dst` (more than one only for an `if` whose
    /// branches are both empty).
    pub fn edges_between(&self, src: Node, dst: Node) -> Vec<&Edge> {
        self.outgoing(src).filter(|edge| edge.dst == dst).collect()
    }

    /// Successor that starts the body of loop `header`.
    pub fn loop_body(&self, header: Node) -> Option<Node> {
        self.outgoing(header).find(|edge| edge.branch == Branch::Body).map(|edge| edge.dst)
    }

    /// Successor reached when loop `header` exits.
    pub fn loop_exit(&self, header: Node) -> Option<Node> {
        self.outgoing(header).find(|edge| edge.branch == Branch::Exit).map(|edge| edge.dst)
    }

    /// The set of `(src, dst)` pairs connected by at least one edge.
    pub fn edge_keys(&self) -> BTreeSet<EdgeKey> {
        self.edges.iter().map(Edge::key).collect()
    }

    /// Whether `path` follows edges of this CFG.
    pub fn is_path(&self, path: &[Node]) -> bool {
        path.windows(2).all(|w| self.outgoing(w[0]).any(|edge| edge.dst == w[1]))
    }
}

impl fmt::Display for Cfg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for node in &self.nodes {
            for edge in self.outgoing(*node) {
                writeln!(f, "{}", edge)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    use crate::expr::AExp;

    fn x_gt_0() -> BExp {
        BExp::gt(AExp::var("x"), AExp::cst(0))
    }

    fn check_invariants(cfg: &Cfg) {
        for node in cfg.nodes() {
            if *node != Node::End {
                assert!(cfg.outgoing(*node).count() >= 1, "node {} has no outgoing edge", node);
            }
        }
        let start: Vec<_> = cfg.outgoing(Node::Start).collect();
        assert_eq!(start.len(), 1);
        assert!(start[0].guard.is_true_literal());
        assert!(start[0].action.is_skip());
        assert_eq!(cfg.outgoing(Node::End).count(), 0);
    }

    #[test]
    fn test_single_assignment() {
        let cfg = Cfg::build(&Stmt::assign(1, "x", AExp::cst(1))).unwrap();
        println!("cfg:\n{}", cfg);
        check_invariants(&cfg);
        assert_eq!(cfg.nodes(), &[Node::Start, Node::point(1), Node::End]);
        assert_eq!(cfg.num_edges(), 2);
        let edge = cfg.outgoing(Node::point(1)).next().unwrap();
        assert_eq!(edge.dst, Node::End);
        assert!(edge.action.is_assign());
    }

    #[test]
    fn test_empty_program() {
        let cfg = Cfg::build(&Stmt::Skip).unwrap();
        check_invariants(&cfg);
        assert_eq!(cfg.nodes(), &[Node::Start, Node::End]);
        assert_eq!(cfg.successors(Node::Start), vec![Node::End]);
    }

    #[test]
    fn test_if_else() {
        let prog = Stmt::if_else(
            1,
            BExp::eq(AExp::var("x"), AExp::cst(1)),
            Stmt::assign(2, "y", AExp::cst(0)),
            Stmt::assign(3, "x", AExp::cst(1)),
        );
        let cfg = Cfg::build(&prog).unwrap();
        println!("cfg:\n{}", cfg);
        check_invariants(&cfg);
        assert_eq!(cfg.kind(Node::point(1)), Some(NodeKind::If));
        assert_eq!(cfg.successors(Node::point(1)), vec![Node::point(2), Node::point(3)]);
        assert_eq!(cfg.successors(Node::point(2)), vec![Node::End]);
        assert_eq!(cfg.successors(Node::point(3)), vec![Node::End]);
    }

    #[test]
    fn test_if_without_else_keeps_then_first() {
        // if (x > 0) {} else { y := 1; }  --  the then-edge is connected last.
        let prog = Stmt::seq([
            Stmt::if_else(1, x_gt_0(), Stmt::Skip, Stmt::assign(2, "y", AExp::cst(1))),
            Stmt::print(3, AExp::var("x")),
        ]);
        let cfg = Cfg::build(&prog).unwrap();
        check_invariants(&cfg);
        let branches: Vec<_> = cfg.outgoing(Node::point(1)).map(|e| (e.branch, e.dst)).collect();
        assert_eq!(branches, vec![(Branch::Then, Node::point(3)), (Branch::Else, Node::point(2))]);
        assert_eq!(cfg.successors(Node::point(1)), vec![Node::point(3), Node::point(2)]);
    }

    #[test]
    fn test_empty_branches_make_parallel_edges() {
        let prog = Stmt::if_else(1, x_gt_0(), Stmt::Skip, Stmt::Skip);
        let cfg = Cfg::build(&prog).unwrap();
        check_invariants(&cfg);
        // No spurious nodes.
        assert_eq!(cfg.num_nodes(), 3);
        assert_eq!(cfg.edges_between(Node::point(1), Node::End).len(), 2);
        assert_eq!(cfg.successors(Node::point(1)), vec![Node::End]);
    }

    #[test]
    fn test_while_loop() {
        let prog = Stmt::seq([
            Stmt::assign(1, "x", AExp::cst(5)),
            Stmt::while_do(2, x_gt_0(), Stmt::assign(3, "x", AExp::sub(AExp::var("x"), AExp::cst(1)))),
        ]);
        let cfg = Cfg::build(&prog).unwrap();
        println!("cfg:\n{}", cfg);
        check_invariants(&cfg);
        assert!(cfg.is_loop_header(Node::point(2)));
        assert_eq!(cfg.loop_body(Node::point(2)), Some(Node::point(3)));
        assert_eq!(cfg.loop_exit(Node::point(2)), Some(Node::End));
        assert_eq!(cfg.successors(Node::point(3)), vec![Node::point(2)]);
        assert_eq!(cfg.predecessors(Node::point(2)), vec![Node::point(1), Node::point(3)]);
    }

    #[test]
    fn test_empty_while_body_is_self_loop() {
        let cfg = Cfg::build(&Stmt::while_do(1, x_gt_0(), Stmt::Skip)).unwrap();
        check_invariants(&cfg);
        assert_eq!(cfg.num_nodes(), 3);
        assert_eq!(cfg.loop_body(Node::point(1)), Some(Node::point(1)));
        assert_eq!(cfg.successors(Node::point(1)), vec![Node::point(1), Node::End]);
    }

    #[test]
    fn test_nested_loop_body_first() {
        // while (x > 0) { while (y > 0) { y := y - 1; } x := x - 1; }
        let prog = Stmt::while_do(
            1,
            x_gt_0(),
            Stmt::seq([
                Stmt::while_do(
                    2,
                    BExp::gt(AExp::var("y"), AExp::cst(0)),
                    Stmt::assign(3, "y", AExp::sub(AExp::var("y"), AExp::cst(1))),
                ),
                Stmt::assign(4, "x", AExp::sub(AExp::var("x"), AExp::cst(1))),
            ]),
        );
        let cfg = Cfg::build(&prog).unwrap();
        check_invariants(&cfg);
        assert_eq!(cfg.successors(Node::point(1)), vec![Node::point(2), Node::End]);
        assert_eq!(cfg.successors(Node::point(2)), vec![Node::point(3), Node::point(4)]);
        assert_eq!(cfg.successors(Node::point(4)), vec![Node::point(1)]);
    }

    #[test]
    fn test_duplicate_label_rejected() {
        let prog = Stmt::seq([Stmt::assign(1, "x", AExp::cst(1)), Stmt::assign(1, "y", AExp::cst(2))]);
        assert_eq!(Cfg::build(&prog).unwrap_err(), BuildError::DuplicateLabel(Label::new(1)));
    }

    #[test]
    fn test_is_path() {
        let prog = Stmt::seq([Stmt::assign(1, "x", AExp::cst(1)), Stmt::assign(2, "y", AExp::cst(2))]);
        let cfg = Cfg::build(&prog).unwrap();
        assert!(cfg.is_path(&[Node::Start, Node::point(1), Node::point(2), Node::End]));
        assert!(!cfg.is_path(&[Node::Start, Node::point(2), Node::End]));
    }
}
