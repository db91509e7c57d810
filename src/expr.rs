//! Arithmetic and boolean expressions.
//!
//! Expressions are immutable trees. Operators are closed enumerations, so the
//! kind of every operand is fixed by the constructor: a comparison always takes
//! arithmetic operands and a connective always takes boolean ones. The only
//! place where an ill-kinded combination can appear is when building from
//! operator *symbols* (as a parser does), and that is rejected with an
//! [`ExprError`] at construction time.
//!
//! # Integer semantics
//!
//! Values are `i64`. Division and modulo use **floor** semantics: the quotient
//! is rounded toward negative infinity and the remainder takes the sign of the
//! divisor (`-7 / 2 == -4`, `-7 % 2 == 1`, `7 % -2 == -1`). Division by zero,
//! a negative exponent, and overflow are evaluation errors.
//!
//! # Example
//!
//! ```
//! use whilecov::expr::{AExp, BExp, Env, Value};
//!
//! let e = BExp::gt(AExp::add(AExp::var("x"), AExp::cst(1)), AExp::cst(0));
//! let env = Env::new().with("x", Value::Int(-1));
//! assert_eq!(e.eval(&env), Ok(false));
//! assert_eq!(e.free_variables().into_iter().collect::<Vec<_>>(), vec!["x".to_string()]);
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::error::{EvalError, ExprError};

/// A runtime value.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Value {
    Int(i64),
    Bool(bool),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            Value::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// Variable environment.
///
/// Reading a name that is not bound fails with [`EvalError::UnboundVariable`];
/// reading a bound name at the wrong type fails with [`EvalError::TypeMismatch`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Env {
    vars: BTreeMap<String, Value>,
}

impl Env {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder pattern: bind a variable.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.vars.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.vars.get(name).copied()
    }

    pub fn get_int(&self, name: &str) -> Result<i64, EvalError> {
        match self.vars.get(name) {
            Some(Value::Int(n)) => Ok(*n),
            Some(Value::Bool(_)) => Err(EvalError::TypeMismatch {
                name: name.to_string(),
                expected: "an integer",
            }),
            None => Err(EvalError::UnboundVariable(name.to_string())),
        }
    }

    pub fn get_bool(&self, name: &str) -> Result<bool, EvalError> {
        match self.vars.get(name) {
            Some(Value::Bool(b)) => Ok(*b),
            Some(Value::Int(_)) => Err(EvalError::TypeMismatch {
                name: name.to_string(),
                expected: "a boolean",
            }),
            None => Err(EvalError::UnboundVariable(name.to_string())),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Value)> + '_ {
        self.vars.iter().map(|(name, value)| (name.as_str(), *value))
    }
}

impl FromIterator<(String, Value)> for Env {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Env {
            vars: iter.into_iter().collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Operators
// ---------------------------------------------------------------------------

/// Unary arithmetic operators.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum AUnOp {
    /// `+a` (identity)
    Plus,
    /// `-a`
    Neg,
    /// `.a` (absolute value)
    Abs,
}

impl AUnOp {
    pub fn from_symbol(symbol: &str) -> Result<Self, ExprError> {
        match symbol {
            "+" => Ok(AUnOp::Plus),
            "-" => Ok(AUnOp::Neg),
            "." => Ok(AUnOp::Abs),
            _ => Err(ExprError::UnknownArithOp(symbol.to_string())),
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            AUnOp::Plus => "+",
            AUnOp::Neg => "-",
            AUnOp::Abs => ".",
        }
    }

    pub fn apply(self, a: i64) -> Result<i64, EvalError> {
        match self {
            AUnOp::Plus => Ok(a),
            AUnOp::Neg => a.checked_neg().ok_or(EvalError::Overflow),
            AUnOp::Abs => a.checked_abs().ok_or(EvalError::Overflow),
        }
    }
}

/// Binary arithmetic operators.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum AOp {
    Add,
    Sub,
    Mul,
    /// Floor division.
    Div,
    /// Floor modulo.
    Mod,
    Pow,
}

impl AOp {
    pub fn from_symbol(symbol: &str) -> Result<Self, ExprError> {
        match symbol {
            "+" => Ok(AOp::Add),
            "-" => Ok(AOp::Sub),
            "*" => Ok(AOp::Mul),
            "/" => Ok(AOp::Div),
            "%" => Ok(AOp::Mod),
            "**" => Ok(AOp::Pow),
            _ => Err(ExprError::UnknownArithOp(symbol.to_string())),
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            AOp::Add => "+",
            AOp::Sub => "-",
            AOp::Mul => "*",
            AOp::Div => "/",
            AOp::Mod => "%",
            AOp::Pow => "**",
        }
    }

    pub fn apply(self, a: i64, b: i64) -> Result<i64, EvalError> {
        match self {
            AOp::Add => a.checked_add(b).ok_or(EvalError::Overflow),
            AOp::Sub => a.checked_sub(b).ok_or(EvalError::Overflow),
            AOp::Mul => a.checked_mul(b).ok_or(EvalError::Overflow),
            AOp::Div => floor_div(a, b),
            AOp::Mod => floor_mod(a, b),
            AOp::Pow => checked_power(a, b),
        }
    }
}

/// Floor division: the quotient is rounded toward negative infinity.
pub fn floor_div(a: i64, b: i64) -> Result<i64, EvalError> {
    if b == 0 {
        return Err(EvalError::DivisionByZero);
    }
    let q = a.checked_div(b).ok_or(EvalError::Overflow)?;
    let r = a.checked_rem(b).ok_or(EvalError::Overflow)?;
    if r != 0 && ((r < 0) != (b < 0)) {
        Ok(q - 1)
    } else {
        Ok(q)
    }
}

/// Floor modulo: the remainder has the sign of the divisor.
pub fn floor_mod(a: i64, b: i64) -> Result<i64, EvalError> {
    if b == 0 {
        return Err(EvalError::DivisionByZero);
    }
    // `i64::MIN % -1` overflows in Rust, but the mathematical result is 0.
    let r = a.checked_rem(b).unwrap_or(0);
    if r != 0 && ((r < 0) != (b < 0)) {
        Ok(r + b)
    } else {
        Ok(r)
    }
}

/// Integer power with a non-negative exponent.
pub fn checked_power(base: i64, exp: i64) -> Result<i64, EvalError> {
    if exp < 0 {
        return Err(EvalError::NegativeExponent);
    }
    match base {
        0 => Ok(if exp == 0 { 1 } else { 0 }),
        1 => Ok(1),
        -1 => Ok(if exp % 2 == 0 { 1 } else { -1 }),
        _ => u32::try_from(exp)
            .ok()
            .and_then(|e| base.checked_pow(e))
            .ok_or(EvalError::Overflow),
    }
}

/// Comparison operators (arithmetic operands, boolean result).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "==" => Some(CmpOp::Eq),
            "!=" => Some(CmpOp::Ne),
            "<" => Some(CmpOp::Lt),
            "<=" => Some(CmpOp::Le),
            ">" => Some(CmpOp::Gt),
            ">=" => Some(CmpOp::Ge),
            _ => None,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }

    pub fn apply(self, a: i64, b: i64) -> bool {
        match self {
            CmpOp::Eq => a == b,
            CmpOp::Ne => a != b,
            CmpOp::Lt => a < b,
            CmpOp::Le => a <= b,
            CmpOp::Gt => a > b,
            CmpOp::Ge => a >= b,
        }
    }

    /// The operator `op'` such that `!(a op b) == (a op' b)`.
    pub fn negate(self) -> Self {
        match self {
            CmpOp::Eq => CmpOp::Ne,
            CmpOp::Ne => CmpOp::Eq,
            CmpOp::Lt => CmpOp::Ge,
            CmpOp::Le => CmpOp::Gt,
            CmpOp::Gt => CmpOp::Le,
            CmpOp::Ge => CmpOp::Lt,
        }
    }

    /// The operator `op'` such that `(a op b) == (b op' a)`.
    pub fn flip(self) -> Self {
        match self {
            CmpOp::Eq => CmpOp::Eq,
            CmpOp::Ne => CmpOp::Ne,
            CmpOp::Lt => CmpOp::Gt,
            CmpOp::Le => CmpOp::Ge,
            CmpOp::Gt => CmpOp::Lt,
            CmpOp::Ge => CmpOp::Le,
        }
    }
}

/// Boolean connectives (boolean operands, boolean result).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum LogicOp {
    And,
    Or,
    Xor,
}

impl LogicOp {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "&&" => Some(LogicOp::And),
            "||" => Some(LogicOp::Or),
            "^" => Some(LogicOp::Xor),
            _ => None,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            LogicOp::And => "&&",
            LogicOp::Or => "||",
            LogicOp::Xor => "^",
        }
    }

    pub fn apply(self, a: bool, b: bool) -> bool {
        match self {
            LogicOp::And => a && b,
            LogicOp::Or => a || b,
            LogicOp::Xor => a ^ b,
        }
    }
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

/// Arithmetic expression.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum AExp {
    Const(i64),
    Var(String),
    Unary(AUnOp, Box<AExp>),
    Binary(AOp, Box<AExp>, Box<AExp>),
}

impl AExp {
    pub fn cst(value: i64) -> Self {
        AExp::Const(value)
    }

    pub fn var(name: impl Into<String>) -> Self {
        AExp::Var(name.into())
    }

    pub fn unary(op: AUnOp, operand: AExp) -> Self {
        AExp::Unary(op, Box::new(operand))
    }

    pub fn binary(op: AOp, lhs: AExp, rhs: AExp) -> Self {
        AExp::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    pub fn neg(operand: AExp) -> Self {
        Self::unary(AUnOp::Neg, operand)
    }

    pub fn abs(operand: AExp) -> Self {
        Self::unary(AUnOp::Abs, operand)
    }

    pub fn add(lhs: AExp, rhs: AExp) -> Self {
        Self::binary(AOp::Add, lhs, rhs)
    }

    pub fn sub(lhs: AExp, rhs: AExp) -> Self {
        Self::binary(AOp::Sub, lhs, rhs)
    }

    pub fn mul(lhs: AExp, rhs: AExp) -> Self {
        Self::binary(AOp::Mul, lhs, rhs)
    }

    pub fn div(lhs: AExp, rhs: AExp) -> Self {
        Self::binary(AOp::Div, lhs, rhs)
    }

    pub fn modulo(lhs: AExp, rhs: AExp) -> Self {
        Self::binary(AOp::Mod, lhs, rhs)
    }

    pub fn pow(lhs: AExp, rhs: AExp) -> Self {
        Self::binary(AOp::Pow, lhs, rhs)
    }

    pub fn eval(&self, env: &Env) -> Result<i64, EvalError> {
        match self {
            AExp::Const(n) => Ok(*n),
            AExp::Var(name) => env.get_int(name),
            AExp::Unary(op, a) => op.apply(a.eval(env)?),
            AExp::Binary(op, a, b) => {
                let a = a.eval(env)?;
                let b = b.eval(env)?;
                op.apply(a, b)
            }
        }
    }

    pub fn free_variables(&self) -> BTreeSet<String> {
        let mut vars = BTreeSet::new();
        self.collect_variables(&mut vars);
        vars
    }

    pub(crate) fn collect_variables(&self, vars: &mut BTreeSet<String>) {
        match self {
            AExp::Const(_) => {}
            AExp::Var(name) => {
                vars.insert(name.clone());
            }
            AExp::Unary(_, a) => a.collect_variables(vars),
            AExp::Binary(_, a, b) => {
                a.collect_variables(vars);
                b.collect_variables(vars);
            }
        }
    }
}

impl fmt::Display for AExp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AExp::Const(n) => write!(f, "{}", n),
            AExp::Var(name) => write!(f, "{}", name),
            AExp::Unary(op, a) => write!(f, "{}{}", op.symbol(), a),
            AExp::Binary(op, a, b) => write!(f, "({} {} {})", a, op.symbol(), b),
        }
    }
}

/// Boolean expression.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum BExp {
    Const(bool),
    Var(String),
    Not(Box<BExp>),
    Logic(LogicOp, Box<BExp>, Box<BExp>),
    Cmp(CmpOp, AExp, AExp),
}

/// An operand of a binary operator given by symbol, before kind checking.
#[derive(Debug, Clone)]
pub enum Operand {
    Arith(AExp),
    Bool(BExp),
}

impl BExp {
    pub fn tt() -> Self {
        BExp::Const(true)
    }

    pub fn ff() -> Self {
        BExp::Const(false)
    }

    pub fn var(name: impl Into<String>) -> Self {
        BExp::Var(name.into())
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(value: BExp) -> Self {
        match value {
            BExp::Not(inner) => *inner,
            _ => BExp::Not(Box::new(value)),
        }
    }

    pub fn logic(op: LogicOp, lhs: BExp, rhs: BExp) -> Self {
        BExp::Logic(op, Box::new(lhs), Box::new(rhs))
    }

    pub fn and(lhs: BExp, rhs: BExp) -> Self {
        Self::logic(LogicOp::And, lhs, rhs)
    }

    pub fn or(lhs: BExp, rhs: BExp) -> Self {
        Self::logic(LogicOp::Or, lhs, rhs)
    }

    pub fn xor(lhs: BExp, rhs: BExp) -> Self {
        Self::logic(LogicOp::Xor, lhs, rhs)
    }

    pub fn cmp(op: CmpOp, lhs: AExp, rhs: AExp) -> Self {
        BExp::Cmp(op, lhs, rhs)
    }

    pub fn eq(lhs: AExp, rhs: AExp) -> Self {
        Self::cmp(CmpOp::Eq, lhs, rhs)
    }

    pub fn ne(lhs: AExp, rhs: AExp) -> Self {
        Self::cmp(CmpOp::Ne, lhs, rhs)
    }

    pub fn lt(lhs: AExp, rhs: AExp) -> Self {
        Self::cmp(CmpOp::Lt, lhs, rhs)
    }

    pub fn le(lhs: AExp, rhs: AExp) -> Self {
        Self::cmp(CmpOp::Le, lhs, rhs)
    }

    pub fn gt(lhs: AExp, rhs: AExp) -> Self {
        Self::cmp(CmpOp::Gt, lhs, rhs)
    }

    pub fn ge(lhs: AExp, rhs: AExp) -> Self {
        Self::cmp(CmpOp::Ge, lhs, rhs)
    }

    /// Builds a binary boolean expression from an operator symbol, checking
    /// that the operands have the kind the operator requires.
    pub fn binary_from_symbol(symbol: &str, lhs: Operand, rhs: Operand) -> Result<Self, ExprError> {
        if let Some(op) = CmpOp::from_symbol(symbol) {
            return match (lhs, rhs) {
                (Operand::Arith(a), Operand::Arith(b)) => Ok(BExp::Cmp(op, a, b)),
                _ => Err(ExprError::OperandKind {
                    op: symbol.to_string(),
                    expected: "arithmetic",
                }),
            };
        }
        if let Some(op) = LogicOp::from_symbol(symbol) {
            return match (lhs, rhs) {
                (Operand::Bool(a), Operand::Bool(b)) => Ok(BExp::logic(op, a, b)),
                _ => Err(ExprError::OperandKind {
                    op: symbol.to_string(),
                    expected: "boolean",
                }),
            };
        }
        Err(ExprError::UnknownBoolOp(symbol.to_string()))
    }

    /// Builds a unary boolean expression from an operator symbol.
    pub fn unary_from_symbol(symbol: &str, operand: BExp) -> Result<Self, ExprError> {
        match symbol {
            "!" => Ok(BExp::not(operand)),
            _ => Err(ExprError::UnknownBoolOp(symbol.to_string())),
        }
    }

    /// Whether this is the literal `true` constant (the guard of unconditional edges).
    pub fn is_true_literal(&self) -> bool {
        matches!(self, BExp::Const(true))
    }

    pub fn eval(&self, env: &Env) -> Result<bool, EvalError> {
        match self {
            BExp::Const(b) => Ok(*b),
            BExp::Var(name) => env.get_bool(name),
            BExp::Not(a) => Ok(!a.eval(env)?),
            BExp::Logic(op, a, b) => {
                // Both sides are evaluated, so errors on the right are never masked.
                let a = a.eval(env)?;
                let b = b.eval(env)?;
                Ok(op.apply(a, b))
            }
            BExp::Cmp(op, a, b) => {
                let a = a.eval(env)?;
                let b = b.eval(env)?;
                Ok(op.apply(a, b))
            }
        }
    }

    pub fn free_variables(&self) -> BTreeSet<String> {
        let mut vars = BTreeSet::new();
        self.collect_variables(&mut vars);
        vars
    }

    pub(crate) fn collect_variables(&self, vars: &mut BTreeSet<String>) {
        match self {
            BExp::Const(_) => {}
            BExp::Var(name) => {
                vars.insert(name.clone());
            }
            BExp::Not(a) => a.collect_variables(vars),
            BExp::Logic(_, a, b) => {
                a.collect_variables(vars);
                b.collect_variables(vars);
            }
            BExp::Cmp(_, a, b) => {
                a.collect_variables(vars);
                b.collect_variables(vars);
            }
        }
    }
}

impl fmt::Display for BExp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BExp::Const(b) => write!(f, "{}", b),
            BExp::Var(name) => write!(f, "{}", name),
            BExp::Not(a) => write!(f, "!{}", a),
            BExp::Logic(op, a, b) => write!(f, "({} {} {})", a, op.symbol(), b),
            BExp::Cmp(op, a, b) => write!(f, "({} {} {})", a, op.symbol(), b),
        }
    }
}
