//! Z3 backend.
//!
//! Only available when compiled with `--features z3` (needs libz3).
//!
//! The encoding follows the evaluation semantics exactly:
//!
//! - every integer symbol is bounded to the `i64` range, so an overflowing
//!   definition has no model;
//! - floor division and modulo are encoded through `a = b*q + r` with the
//!   remainder taking the divisor's sign, and a non-zero divisor;
//! - `a ** e` requires `e >= 0`; it is a case split over `e <= 63`, plus the
//!   bases `-1`, `0`, `1` for larger exponents (any other base overflows).
//!
//! Models are re-checked with [`Problem::complete`] before being returned.

use log::debug;
use z3::ast::{Ast, Bool, Int};
use z3::{Config, Context, SatResult};

use super::{SolveResult, Solver, SolverConfig};
use crate::constraint::{Constraint, Definition, Formula, Model, Problem, Sort, Term};
use crate::expr::{AOp, AUnOp, CmpOp};

const MAX_EXPONENT: i64 = 63;

/// Solver backed by Z3. One fresh context per solve.
#[derive(Debug, Clone, Default)]
pub struct Z3Solver {
    config: SolverConfig,
}

impl Z3Solver {
    pub fn new(config: SolverConfig) -> Self {
        Self { config }
    }
}

enum Z3Sym<'ctx> {
    Int(Int<'ctx>),
    Bool(Bool<'ctx>),
}

struct Encoder<'ctx> {
    ctx: &'ctx Context,
    solver: z3::Solver<'ctx>,
    syms: Vec<Z3Sym<'ctx>>,
    fresh: usize,
}

impl<'ctx> Encoder<'ctx> {
    fn new(ctx: &'ctx Context, problem: &Problem) -> Self {
        let solver = z3::Solver::new(ctx);
        let min = Int::from_i64(ctx, i64::MIN);
        let max = Int::from_i64(ctx, i64::MAX);
        let syms = problem
            .symbol_ids()
            .map(|s| match problem.symbol(s).sort {
                Sort::Int => {
                    let v = Int::new_const(ctx, s.to_string());
                    solver.assert(&v.ge(&min));
                    solver.assert(&v.le(&max));
                    Z3Sym::Int(v)
                }
                Sort::Bool => Z3Sym::Bool(Bool::new_const(ctx, s.to_string())),
            })
            .collect();
        Self {
            ctx,
            solver,
            syms,
            fresh: 0,
        }
    }

    fn int(&self, v: i64) -> Int<'ctx> {
        Int::from_i64(self.ctx, v)
    }

    /// An auxiliary integer constant, bounded like the symbols.
    fn aux(&mut self) -> Int<'ctx> {
        self.fresh += 1;
        Int::new_const(self.ctx, format!("aux{}", self.fresh))
    }

    fn term(&self, t: Term) -> Int<'ctx> {
        match t {
            Term::Const(c) => self.int(c),
            Term::Sym(s) => match &self.syms[s.index()] {
                Z3Sym::Int(v) => v.clone(),
                Z3Sym::Bool(_) => panic!("boolean symbol {} used as an integer", s),
            },
        }
    }

    fn formula(&self, f: &Formula) -> Bool<'ctx> {
        match f {
            Formula::Const(b) => Bool::from_bool(self.ctx, *b),
            Formula::Sym(s) => match &self.syms[s.index()] {
                Z3Sym::Bool(v) => v.clone(),
                Z3Sym::Int(_) => panic!("integer symbol {} used as a boolean", s),
            },
            Formula::Not(inner) => self.formula(inner).not(),
            Formula::And(parts) => {
                let parts: Vec<Bool<'ctx>> = parts.iter().map(|p| self.formula(p)).collect();
                Bool::and(self.ctx, &parts.iter().collect::<Vec<_>>())
            }
            Formula::Or(parts) => {
                let parts: Vec<Bool<'ctx>> = parts.iter().map(|p| self.formula(p)).collect();
                Bool::or(self.ctx, &parts.iter().collect::<Vec<_>>())
            }
            Formula::Xor(a, b) => self.formula(a).xor(&self.formula(b)),
            Formula::Cmp(op, a, b) => {
                let (a, b) = (self.term(*a), self.term(*b));
                match op {
                    CmpOp::Eq => a._eq(&b),
                    CmpOp::Ne => a._eq(&b).not(),
                    CmpOp::Lt => a.lt(&b),
                    CmpOp::Le => a.le(&b),
                    CmpOp::Gt => a.gt(&b),
                    CmpOp::Ge => a.ge(&b),
                }
            }
        }
    }

    /// Asserts `q = floor(a / b)` and `r = a mod b` (floor semantics).
    fn floor_div_mod(&self, a: &Int<'ctx>, b: &Int<'ctx>, q: &Int<'ctx>, r: &Int<'ctx>) {
        let zero = self.int(0);
        self.solver.assert(&b._eq(&zero).not());
        let bq = Int::mul(self.ctx, &[b, q]);
        self.solver.assert(&a._eq(&Int::add(self.ctx, &[&bq, r])));
        let positive = Bool::and(self.ctx, &[&r.ge(&zero), &r.lt(b)]);
        let negative = Bool::and(self.ctx, &[&r.le(&zero), &r.gt(b)]);
        self.solver.assert(&b.gt(&zero).implies(&positive));
        self.solver.assert(&b.lt(&zero).implies(&negative));
    }

    fn power(&self, base: &Int<'ctx>, exp: &Int<'ctx>) -> Int<'ctx> {
        let zero = self.int(0);
        let one = self.int(1);
        let minus_one = self.int(-1);
        self.solver.assert(&exp.ge(&zero));
        let small_exp = exp.le(&self.int(MAX_EXPONENT));
        let unit_base = Bool::and(self.ctx, &[&base.ge(&minus_one), &base.le(&one)]);
        self.solver.assert(&Bool::or(self.ctx, &[&small_exp, &unit_base]));

        // Large exponents: 0, 1 or +-1 by parity.
        let even = exp.modulo(&self.int(2))._eq(&zero);
        let mut result = base._eq(&zero).ite(&zero, &base._eq(&one).ite(&one, &even.ite(&one, &minus_one)));

        let mut powers = vec![one.clone()];
        for k in 1..=MAX_EXPONENT as usize {
            let next = Int::mul(self.ctx, &[&powers[k - 1], base]);
            powers.push(next);
        }
        for k in (0..=MAX_EXPONENT).rev() {
            result = exp._eq(&self.int(k)).ite(&powers[k as usize], &result);
        }
        result
    }

    fn define(&mut self, target: &Int<'ctx>, def: &Definition) {
        let value = match def {
            Definition::Copy(t) | Definition::Unary(AUnOp::Plus, t) => self.term(*t),
            Definition::Unary(AUnOp::Neg, t) => self.term(*t).unary_minus(),
            Definition::Unary(AUnOp::Abs, t) => {
                let t = self.term(*t);
                t.ge(&self.int(0)).ite(&t, &t.unary_minus())
            }
            Definition::Binary(op, a, b) => {
                let (a, b) = (self.term(*a), self.term(*b));
                match op {
                    AOp::Add => Int::add(self.ctx, &[&a, &b]),
                    AOp::Sub => Int::sub(self.ctx, &[&a, &b]),
                    AOp::Mul => Int::mul(self.ctx, &[&a, &b]),
                    AOp::Div => {
                        let r = self.aux();
                        self.floor_div_mod(&a, &b, target, &r);
                        target.clone()
                    }
                    AOp::Mod => {
                        let q = self.aux();
                        self.floor_div_mod(&a, &b, &q, target);
                        target.clone()
                    }
                    AOp::Pow => self.power(&a, &b),
                }
            }
        };
        self.solver.assert(&target._eq(&value));
    }

    fn encode(&mut self, problem: &Problem) {
        for c in problem.constraints() {
            match c {
                Constraint::Define { target, def } => {
                    let target = self.term(Term::Sym(*target));
                    self.define(&target, def);
                }
                Constraint::Assert(f) => {
                    let f = self.formula(f);
                    self.solver.assert(&f);
                }
            }
        }
    }
}

impl Solver for Z3Solver {
    fn name(&self) -> &'static str {
        "z3"
    }

    fn solve(&self, problem: &Problem) -> SolveResult {
        let budget = self.config.budget();
        if let Some(reason) = budget.exhausted() {
            return SolveResult::Unknown(reason.to_string());
        }

        let mut cfg = Config::new();
        if let Some(remaining) = budget.remaining() {
            cfg.set_timeout_msec(remaining.as_millis().max(1) as u64);
        }
        let ctx = Context::new(&cfg);
        let mut encoder = Encoder::new(&ctx, problem);
        encoder.encode(problem);
        debug!("z3: {} constraints encoded", problem.constraints().len());

        match encoder.solver.check() {
            SatResult::Unsat => SolveResult::Unsat,
            SatResult::Unknown => SolveResult::Unknown("z3 returned unknown".to_string()),
            SatResult::Sat => {
                let Some(z3_model) = encoder.solver.get_model() else {
                    return SolveResult::Unknown("z3 returned no model".to_string());
                };
                let mut free = Model::new(problem.num_symbols());
                for s in problem.free_symbols() {
                    match &encoder.syms[s.index()] {
                        Z3Sym::Int(v) => {
                            if let Some(n) = z3_model.eval(v, true).and_then(|n| n.as_i64()) {
                                free.set(s, n);
                            }
                        }
                        Z3Sym::Bool(v) => {
                            if let Some(b) = z3_model.eval(v, true).and_then(|b| b.as_bool()) {
                                free.set(s, b);
                            }
                        }
                    }
                }
                match problem.complete(&free) {
                    Some(model) => SolveResult::Sat(model),
                    None => SolveResult::Unknown("z3 model rejected by evaluation".to_string()),
                }
            }
        }
    }
}
