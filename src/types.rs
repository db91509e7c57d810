//! Type-safe wrappers for program points.
//!
//! This module provides newtype wrappers that keep statement labels apart from
//! other integers, and the [`Node`] type that adds the two CFG sentinels.
use std::fmt;

/// A program point label.
///
/// Labels are assigned to `Assign`, `If`, `While`, `Input` and `Print`
/// statements by the (external) parser, once, and are never reused.
///
/// # Invariants
///
/// - Labels are unique within one program.
/// - Labels are independent of CFG construction order.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Label(u32);

impl Label {
    /// Creates a new label with the given ID.
    pub fn new(id: u32) -> Self {
        Label(id)
    }

    /// Returns the raw label ID as a `u32`.
    pub fn id(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for Label {
    fn from(id: u32) -> Self {
        Label(id)
    }
}

impl From<Label> for u32 {
    fn from(label: Label) -> Self {
        label.0
    }
}

/// A CFG node: one of the two sentinels, or a labelled program point.
///
/// The derived ordering puts `Start` first and `End` last, so that sets of
/// nodes print in a natural order.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Node {
    Start,
    Point(Label),
    End,
}

impl Node {
    /// Shorthand for `Node::Point(Label::new(id))`.
    pub fn point(id: u32) -> Self {
        Node::Point(Label::new(id))
    }

    /// Returns the label of a program point, or `None` for a sentinel.
    pub fn label(self) -> Option<Label> {
        match self {
            Node::Point(label) => Some(label),
            Node::Start | Node::End => None,
        }
    }

    pub fn is_start(self) -> bool {
        self == Node::Start
    }

    pub fn is_end(self) -> bool {
        self == Node::End
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Start => write!(f, "START"),
            Node::End => write!(f, "END"),
            Node::Point(label) => write!(f, "{}", label),
        }
    }
}

impl From<Label> for Node {
    fn from(label: Label) -> Self {
        Node::Point(label)
    }
}

/// Structural kind of a CFG node, used by the enumerators to order branches.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum NodeKind {
    /// Header of an `if` statement.
    If,
    /// Header of a `while` loop.
    While,
}

/// A path through the CFG, as a sequence of nodes.
pub type Path = Vec<Node>;

/// An edge of the CFG, identified by its endpoints.
pub type EdgeKey = (Node, Node);

/// Formats a path as `START -> 1 -> 2 -> END`.
pub fn path_to_string(path: &[Node]) -> String {
    path.iter().map(|node| node.to_string()).collect::<Vec<_>>().join(" -> ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_roundtrip() {
        let l = Label::new(7);
        assert_eq!(l.id(), 7);
        assert_eq!(u32::from(l), 7);
        assert_eq!(Label::from(7), l);
    }

    #[test]
    fn test_node_ordering() {
        let mut nodes = vec![Node::End, Node::point(3), Node::Start, Node::point(1)];
        nodes.sort();
        assert_eq!(nodes, vec![Node::Start, Node::point(1), Node::point(3), Node::End]);
    }

    #[test]
    fn test_node_display() {
        assert_eq!(Node::Start.to_string(), "START");
        assert_eq!(Node::End.to_string(), "END");
        assert_eq!(Node::point(42).to_string(), "42");
        assert_eq!(path_to_string(&[Node::Start, Node::point(1), Node::End]), "START -> 1 -> END");
    }

    #[test]
    fn test_node_label() {
        assert_eq!(Node::point(5).label(), Some(Label::new(5)));
        assert_eq!(Node::Start.label(), None);
        assert!(Node::End.is_end());
        assert!(Node::Start.is_start());
    }
}
