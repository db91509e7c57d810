//! Bounded path enumerators.
//!
//! This module provides lazy iterators over START→END paths of a [`Cfg`]:
//!
//! - [`KPaths`]: every path of at most `k` edges.
//! - [`LoopPaths`]: every path in which each loop body is entered at most `i`
//!   times per iteration of its enclosing loops.
//!
//! # Example
//!
//! ```
//! use whilecov::cfg::Cfg;
//! use whilecov::expr::{AExp, BExp};
//! use whilecov::stmt::Stmt;
//!
//! // 1: if (x == 1) { 2: y := 0; } else { 3: x := 1; }
//! let prog = Stmt::if_else(
//!     1,
//!     BExp::eq(AExp::var("x"), AExp::cst(1)),
//!     Stmt::assign(2, "y", AExp::cst(0)),
//!     Stmt::assign(3, "x", AExp::cst(1)),
//! );
//! let cfg = Cfg::build(&prog).unwrap();
//!
//! let paths: Vec<_> = cfg.k_paths(3).collect();
//! assert_eq!(paths.len(), 2);
//! ```
//!
//! # Traversal order
//!
//! Both iterators are depth-first with an explicit stack, so they never
//! recurse and can be dropped at any point. At an `if` header the else-branch
//! is explored before the then-branch. Everywhere else successors are explored
//! in structural order ([`Cfg::successors`]), which at a `while` header means
//! the loop body before the loop exit. Two iterators over the same CFG share
//! no state.
//!
//! Note: the number of paths grows exponentially with `k` and `i`;
//! [`count_k_paths`] counts them without enumerating.

use std::collections::HashMap;

use log::debug;
use num_bigint::BigUint;

use crate::analysis::nested_loops;
use crate::cfg::Cfg;
use crate::types::{path_to_string, Node, NodeKind, Path};

impl Cfg {
    /// Returns an iterator over all START→END paths with at most `k` edges.
    ///
    /// ```
    /// use whilecov::cfg::Cfg;
    /// use whilecov::expr::AExp;
    /// use whilecov::stmt::Stmt;
    ///
    /// let cfg = Cfg::build(&Stmt::assign(1, "x", AExp::cst(0))).unwrap();
    /// assert_eq!(cfg.k_paths(1).count(), 0);
    /// assert_eq!(cfg.k_paths(2).count(), 1);
    /// ```
    pub fn k_paths(&self, k: usize) -> KPaths<'_> {
        KPaths::new(self, k)
    }

    /// Returns an iterator over all START→END paths entering every loop body
    /// at most `i` times per enclosing iteration.
    pub fn loop_paths(&self, i: usize) -> LoopPaths<'_> {
        LoopPaths::new(self, i)
    }
}

/// Successors of `node` in exploration order.
fn visit_order(cfg: &Cfg, node: Node) -> Vec<Node> {
    let mut succs = cfg.successors(node);
    if cfg.kind(node) == Some(NodeKind::If) {
        succs.reverse();
    }
    succs
}

/// Frame on the exploration stack of [`KPaths`].
#[derive(Debug)]
struct KFrame {
    node: Node,
    /// Position of `node` in the current path.
    depth: usize,
}

/// An iterator over START→END paths of bounded length.
///
/// Created by [`Cfg::k_paths()`]. See the [module documentation](self).
///
/// # Implementation Notes
///
/// The current path lives in a single vector. Each frame remembers the
/// position its node takes in the path, so backtracking is a truncation.
pub struct KPaths<'a> {
    cfg: &'a Cfg,
    k: usize,
    stack: Vec<KFrame>,
    current_path: Path,
}

impl<'a> KPaths<'a> {
    pub fn new(cfg: &'a Cfg, k: usize) -> Self {
        KPaths {
            cfg,
            k,
            stack: vec![KFrame {
                node: Node::Start,
                depth: 0,
            }],
            current_path: Vec::new(),
        }
    }
}

impl Iterator for KPaths<'_> {
    type Item = Path;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(KFrame { node, depth }) = self.stack.pop() {
            self.current_path.truncate(depth);
            self.current_path.push(node);

            if node.is_end() {
                debug!("k-path: {}", path_to_string(&self.current_path));
                return Some(self.current_path.clone());
            }

            // Number of edges taken so far is `depth`.
            if depth >= self.k {
                continue;
            }

            for succ in visit_order(self.cfg, node).into_iter().rev() {
                self.stack.push(KFrame {
                    node: succ,
                    depth: depth + 1,
                });
            }
        }
        None
    }
}

/// Frame on the exploration stack of [`LoopPaths`].
#[derive(Debug)]
struct LoopFrame {
    node: Node,
    depth: usize,
    /// Body entries per loop header, indexed like `LoopPaths::headers`.
    counters: Vec<usize>,
}

/// An iterator over START→END paths with bounded loop iterations.
///
/// Created by [`Cfg::loop_paths()`]. See the [module documentation](self).
///
/// Each branch of the search carries its own snapshot of the loop counters.
/// Visiting a loop header resets the counters of every loop nested inside it,
/// so inner bounds apply per outer iteration.
pub struct LoopPaths<'a> {
    cfg: &'a Cfg,
    i: usize,
    /// Loop header -> counter index.
    headers: HashMap<Node, usize>,
    /// Counter indices of the loops nested in each header.
    nested: HashMap<Node, Vec<usize>>,
    stack: Vec<LoopFrame>,
    current_path: Path,
}

impl<'a> LoopPaths<'a> {
    pub fn new(cfg: &'a Cfg, i: usize) -> Self {
        let nesting = nested_loops(cfg);
        let headers: HashMap<Node, usize> = nesting.keys().enumerate().map(|(idx, &h)| (h, idx)).collect();
        let nested = nesting
            .iter()
            .map(|(h, inner)| (*h, inner.iter().map(|n| headers[n]).collect()))
            .collect();
        LoopPaths {
            cfg,
            i,
            stack: vec![LoopFrame {
                node: Node::Start,
                depth: 0,
                counters: vec![0; headers.len()],
            }],
            headers,
            nested,
            current_path: Vec::new(),
        }
    }
}

impl Iterator for LoopPaths<'_> {
    type Item = Path;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(LoopFrame {
            node,
            depth,
            mut counters,
        }) = self.stack.pop()
        {
            self.current_path.truncate(depth);
            self.current_path.push(node);

            if node.is_end() {
                debug!("loop path: {}", path_to_string(&self.current_path));
                return Some(self.current_path.clone());
            }

            if let Some(&idx) = self.headers.get(&node) {
                for &inner in &self.nested[&node] {
                    counters[inner] = 0;
                }
                let body = self
                    .cfg
                    .loop_body(node)
                    .unwrap_or_else(|| panic!("loop header {} has no body successor", node));
                let exit = self
                    .cfg
                    .loop_exit(node)
                    .unwrap_or_else(|| panic!("loop header {} has no exit successor", node));

                let enter = counters[idx] < self.i;
                if enter {
                    counters[idx] += 1;
                }
                self.stack.push(LoopFrame {
                    node: exit,
                    depth: depth + 1,
                    counters: counters.clone(),
                });
                if enter {
                    self.stack.push(LoopFrame {
                        node: body,
                        depth: depth + 1,
                        counters,
                    });
                }
            } else {
                for succ in visit_order(self.cfg, node).into_iter().rev() {
                    self.stack.push(LoopFrame {
                        node: succ,
                        depth: depth + 1,
                        counters: counters.clone(),
                    });
                }
            }
        }
        None
    }
}

/// All START→END paths with at most `k` edges.
pub fn k_paths(cfg: &Cfg, k: usize) -> KPaths<'_> {
    cfg.k_paths(k)
}

/// All START→END paths entering each loop body at most `i` times.
pub fn i_bounded_loop_paths(cfg: &Cfg, i: usize) -> LoopPaths<'_> {
    cfg.loop_paths(i)
}

/// Counts the paths [`KPaths`] would yield, without enumerating them.
///
/// # Examples
///
/// ```
/// use whilecov::cfg::Cfg;
/// use whilecov::expr::{AExp, BExp};
/// use whilecov::paths::count_k_paths;
/// use whilecov::stmt::Stmt;
///
/// let cfg = Cfg::build(&Stmt::while_do(1, BExp::var("b"), Stmt::Skip)).unwrap();
/// // START -> 1 -> (1 ->)* END
/// assert_eq!(count_k_paths(&cfg, 10), 9u32.into());
/// ```
pub fn count_k_paths(cfg: &Cfg, k: usize) -> BigUint {
    let mut total = BigUint::default();
    let mut frontier: HashMap<Node, BigUint> = HashMap::from([(Node::Start, BigUint::from(1u32))]);
    for _ in 0..k {
        let mut next: HashMap<Node, BigUint> = HashMap::new();
        for (node, count) in &frontier {
            for succ in cfg.successors(*node) {
                *next.entry(succ).or_default() += count;
            }
        }
        if let Some(done) = next.remove(&Node::End) {
            total += done;
        }
        if next.is_empty() {
            break;
        }
        frontier = next;
    }
    total
}
