//! Statements and their concrete execution.
//!
//! Every statement except `Skip` and `Seq` carries a [`Label`]. The CFG edges
//! carry an [`Action`], which is the straight-line part of a statement
//! (`Assign`, `Input`, `Print`) or a `Skip` placeholder.

use std::collections::{BTreeSet, VecDeque};
use std::fmt;

use crate::error::EvalError;
use crate::expr::{AExp, BExp, Env};
use crate::types::Label;

/// Source of `input` values and sink of `print` values.
pub trait Console {
    /// Produces the value for `input var`.
    fn read(&mut self, var: &str) -> Result<i64, EvalError>;

    /// Emits the value of `print expr`.
    fn write(&mut self, value: i64);
}

/// A console fed from a fixed queue of inputs, recording every printed value.
///
/// This is the console used in automated contexts (test runs).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptedConsole {
    inputs: VecDeque<i64>,
    outputs: Vec<i64>,
}

impl ScriptedConsole {
    pub fn new(inputs: impl IntoIterator<Item = i64>) -> Self {
        Self {
            inputs: inputs.into_iter().collect(),
            outputs: Vec::new(),
        }
    }

    /// Values printed so far, in order.
    pub fn outputs(&self) -> &[i64] {
        &self.outputs
    }

    /// Number of inputs not consumed yet.
    pub fn remaining(&self) -> usize {
        self.inputs.len()
    }
}

impl Console for ScriptedConsole {
    fn read(&mut self, var: &str) -> Result<i64, EvalError> {
        self.inputs.pop_front().ok_or_else(|| EvalError::InputExhausted(var.to_string()))
    }

    fn write(&mut self, value: i64) {
        self.outputs.push(value);
    }
}

/// Statement of the language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    Skip,
    Assign { var: String, expr: AExp, label: Label },
    Seq(Vec<Stmt>),
    If { cond: BExp, then: Box<Stmt>, els: Box<Stmt>, label: Label },
    While { cond: BExp, body: Box<Stmt>, label: Label },
    Input { var: String, label: Label },
    Print { expr: AExp, label: Label },
}

impl Stmt {
    pub fn assign(label: u32, var: impl Into<String>, expr: AExp) -> Self {
        Stmt::Assign {
            var: var.into(),
            expr,
            label: Label::new(label),
        }
    }

    pub fn seq(stmts: impl IntoIterator<Item = Stmt>) -> Self {
        Stmt::Seq(stmts.into_iter().collect())
    }

    pub fn if_else(label: u32, cond: BExp, then: Stmt, els: Stmt) -> Self {
        Stmt::If {
            cond,
            then: Box::new(then),
            els: Box::new(els),
            label: Label::new(label),
        }
    }

    /// An `if` without an `else` branch. Each call gets its own `Skip`.
    pub fn if_then(label: u32, cond: BExp, then: Stmt) -> Self {
        Self::if_else(label, cond, then, Stmt::Skip)
    }

    pub fn while_do(label: u32, cond: BExp, body: Stmt) -> Self {
        Stmt::While {
            cond,
            body: Box::new(body),
            label: Label::new(label),
        }
    }

    pub fn input(label: u32, var: impl Into<String>) -> Self {
        Stmt::Input {
            var: var.into(),
            label: Label::new(label),
        }
    }

    pub fn print(label: u32, expr: AExp) -> Self {
        Stmt::Print {
            expr,
            label: Label::new(label),
        }
    }

    /// The label of this statement, if it has one.
    pub fn label(&self) -> Option<Label> {
        match self {
            Stmt::Skip | Stmt::Seq(_) => None,
            Stmt::Assign { label, .. }
            | Stmt::If { label, .. }
            | Stmt::While { label, .. }
            | Stmt::Input { label, .. }
            | Stmt::Print { label, .. } => Some(*label),
        }
    }

    /// Whether this statement does nothing (a `Skip`, or a sequence of them).
    pub fn is_skip(&self) -> bool {
        match self {
            Stmt::Skip => true,
            Stmt::Seq(stmts) => stmts.iter().all(Stmt::is_skip),
            _ => false,
        }
    }

    /// All labels in this statement, in pre-order (duplicates included).
    pub fn labels(&self) -> Vec<Label> {
        let mut labels = Vec::new();
        let mut stack = vec![self];
        while let Some(stmt) = stack.pop() {
            if let Some(label) = stmt.label() {
                labels.push(label);
            }
            match stmt {
                Stmt::Seq(stmts) => stack.extend(stmts.iter().rev()),
                Stmt::If { then, els, .. } => {
                    stack.push(els);
                    stack.push(then);
                }
                Stmt::While { body, .. } => stack.push(body),
                _ => {}
            }
        }
        labels
    }

    /// Executes the statement, mutating `env` in place and returning it.
    ///
    /// `while` loops run iteratively, so a long-running loop does not grow the stack.
    pub fn execute<'e>(&self, env: &'e mut Env, console: &mut dyn Console) -> Result<&'e mut Env, EvalError> {
        match self {
            Stmt::Skip => {}
            Stmt::Assign { var, expr, .. } => {
                let value = expr.eval(env)?;
                env.set(var.clone(), value);
            }
            Stmt::Seq(stmts) => {
                for stmt in stmts {
                    stmt.execute(env, console)?;
                }
            }
            Stmt::If { cond, then, els, .. } => {
                if cond.eval(env)? {
                    then.execute(env, console)?;
                } else {
                    els.execute(env, console)?;
                }
            }
            Stmt::While { cond, body, .. } => {
                while cond.eval(env)? {
                    body.execute(env, console)?;
                }
            }
            Stmt::Input { var, .. } => {
                let value = console.read(var)?;
                env.set(var.clone(), value);
            }
            Stmt::Print { expr, .. } => {
                let value = expr.eval(env)?;
                console.write(value);
            }
        }
        Ok(env)
    }
}

/// The action carried by a CFG edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Skip,
    Assign { var: String, expr: AExp },
    Input { var: String },
    Print { expr: AExp },
}

impl Action {
    pub fn is_skip(&self) -> bool {
        matches!(self, Action::Skip)
    }

    pub fn is_assign(&self) -> bool {
        matches!(self, Action::Assign { .. })
    }

    /// The variable written by this action.
    pub fn defined_var(&self) -> Option<&str> {
        match self {
            Action::Assign { var, .. } | Action::Input { var } => Some(var.as_str()),
            Action::Skip | Action::Print { .. } => None,
        }
    }

    /// The variables read by this action.
    pub fn used_vars(&self) -> BTreeSet<String> {
        match self {
            Action::Assign { expr, .. } | Action::Print { expr } => expr.free_variables(),
            Action::Skip | Action::Input { .. } => BTreeSet::new(),
        }
    }

    pub fn execute(&self, env: &mut Env, console: &mut dyn Console) -> Result<(), EvalError> {
        match self {
            Action::Skip => {}
            Action::Assign { var, expr } => {
                let value = expr.eval(env)?;
                env.set(var.clone(), value);
            }
            Action::Input { var } => {
                let value = console.read(var)?;
                env.set(var.clone(), value);
            }
            Action::Print { expr } => {
                let value = expr.eval(env)?;
                console.write(value);
            }
        }
        Ok(())
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Skip => write!(f, "skip"),
            Action::Assign { var, expr } => write!(f, "{} := {}", var, expr),
            Action::Input { var } => write!(f, "input {}", var),
            Action::Print { expr } => write!(f, "print {}", expr),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    fn countdown() -> Stmt {
        // x := 5; while (x > 0) { x := x - 1; }
        Stmt::seq([
            Stmt::assign(1, "x", AExp::cst(5)),
            Stmt::while_do(
                2,
                BExp::gt(AExp::var("x"), AExp::cst(0)),
                Stmt::assign(3, "x", AExp::sub(AExp::var("x"), AExp::cst(1))),
            ),
        ])
    }

    #[test]
    fn test_execute_countdown() {
        let mut env = Env::new();
        let mut console = ScriptedConsole::default();
        countdown().execute(&mut env, &mut console).unwrap();
        assert_eq!(env.get_int("x"), Ok(0));
    }

    #[test]
    fn test_long_loop_does_not_overflow_stack() {
        let prog = Stmt::seq([
            Stmt::assign(1, "i", AExp::cst(0)),
            Stmt::while_do(
                2,
                BExp::lt(AExp::var("i"), AExp::cst(1_000_000)),
                Stmt::assign(3, "i", AExp::add(AExp::var("i"), AExp::cst(1))),
            ),
        ]);
        let mut env = Env::new();
        prog.execute(&mut env, &mut ScriptedConsole::default()).unwrap();
        assert_eq!(env.get_int("i"), Ok(1_000_000));
    }

    #[test]
    fn test_execute_if() {
        let prog = Stmt::if_else(
            1,
            BExp::eq(AExp::var("x"), AExp::cst(1)),
            Stmt::assign(2, "y", AExp::cst(0)),
            Stmt::assign(3, "x", AExp::cst(1)),
        );
        let mut env = Env::new().with("x", 1);
        prog.execute(&mut env, &mut ScriptedConsole::default()).unwrap();
        assert_eq!(env.get_int("y"), Ok(0));

        let mut env = Env::new().with("x", 7);
        prog.execute(&mut env, &mut ScriptedConsole::default()).unwrap();
        assert_eq!(env.get_int("x"), Ok(1));
        assert!(!env.contains("y"));
    }

    #[test]
    fn test_input_and_print() {
        let prog = Stmt::seq([
            Stmt::input(1, "n"),
            Stmt::print(2, AExp::mul(AExp::var("n"), AExp::cst(2))),
        ]);
        let mut env = Env::new();
        let mut console = ScriptedConsole::new([21]);
        prog.execute(&mut env, &mut console).unwrap();
        assert_eq!(console.outputs(), &[42]);
        assert_eq!(console.remaining(), 0);

        let mut env = Env::new();
        let err = prog.execute(&mut env, &mut ScriptedConsole::default()).unwrap_err();
        assert_eq!(err, EvalError::InputExhausted("n".to_string()));
    }

    #[test]
    fn test_unbound_variable_propagates() {
        let prog = Stmt::assign(1, "y", AExp::var("x"));
        let mut env = Env::new();
        let err = prog.execute(&mut env, &mut ScriptedConsole::default()).unwrap_err();
        assert_eq!(err, EvalError::UnboundVariable("x".to_string()));
    }

    #[test]
    fn test_labels_and_skip() {
        assert_eq!(countdown().labels(), vec![Label::new(1), Label::new(2), Label::new(3)]);
        assert!(Stmt::Skip.is_skip());
        assert!(Stmt::seq([Stmt::Skip, Stmt::seq([])]).is_skip());
        assert!(!countdown().is_skip());
    }

    #[test]
    fn test_if_then_defaults_are_independent() {
        let a = Stmt::if_then(1, BExp::tt(), Stmt::assign(2, "x", AExp::cst(1)));
        let b = Stmt::if_then(3, BExp::ff(), Stmt::assign(4, "y", AExp::cst(2)));
        match (a, b) {
            (Stmt::If { els: ea, .. }, Stmt::If { els: eb, .. }) => {
                assert!(ea.is_skip());
                assert!(eb.is_skip());
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_action_def_use() {
        let a = Action::Assign {
            var: "x".to_string(),
            expr: AExp::sub(AExp::var("x"), AExp::var("y")),
        };
        assert_eq!(a.defined_var(), Some("x"));
        assert_eq!(a.used_vars().into_iter().collect::<Vec<_>>(), vec!["x", "y"]);

        let i = Action::Input { var: "n".to_string() };
        assert_eq!(i.defined_var(), Some("n"));
        assert!(i.used_vars().is_empty());

        let p = Action::Print { expr: AExp::var("z") };
        assert_eq!(p.defined_var(), None);
        assert_eq!(p.used_vars().len(), 1);
    }
}
