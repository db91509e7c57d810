//! Interval domains and constraint propagation.
//!
//! Every symbol gets an inclusive `i64` interval (booleans use `[0, 1]`).
//! Propagation alternates forward evaluation of definitions over intervals
//! with backward refinement from assertions and definitions, until nothing
//! changes or the round limit is hit. Each step only removes values that no
//! satisfying assignment can take, so an empty domain proves the problem
//! unsatisfiable, and the surviving domains bound the search.

use log::debug;

use crate::constraint::{Constraint, Definition, Formula, Problem, Sort, Term};
use crate::expr::{AOp, AUnOp, CmpOp};

const MAX_ROUNDS: usize = 64;

/// An inclusive interval of `i64`. Empty when `lo > hi`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Interval {
    pub lo: i64,
    pub hi: i64,
}

impl Interval {
    pub const FULL: Interval = Interval {
        lo: i64::MIN,
        hi: i64::MAX,
    };
    pub const BOOL: Interval = Interval { lo: 0, hi: 1 };
    pub const EMPTY: Interval = Interval { lo: 1, hi: 0 };

    pub fn new(lo: i64, hi: i64) -> Self {
        Interval { lo, hi }
    }

    pub fn point(v: i64) -> Self {
        Interval { lo: v, hi: v }
    }

    /// Clamps an `i128` range into `i64`.
    fn from_i128(lo: i128, hi: i128) -> Self {
        let lo = lo.max(i64::MIN as i128);
        let hi = hi.min(i64::MAX as i128);
        if lo > hi {
            Interval::EMPTY
        } else {
            Interval::new(lo as i64, hi as i64)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lo > self.hi
    }

    pub fn contains(&self, v: i64) -> bool {
        self.lo <= v && v <= self.hi
    }

    pub fn as_point(&self) -> Option<i64> {
        (self.lo == self.hi).then_some(self.lo)
    }

    /// Number of values, 0 when empty.
    pub fn size(&self) -> u128 {
        if self.is_empty() {
            0
        } else {
            (self.hi as i128 - self.lo as i128) as u128 + 1
        }
    }

    pub fn intersect(&self, other: &Interval) -> Interval {
        let r = Interval::new(self.lo.max(other.lo), self.hi.min(other.hi));
        if r.is_empty() {
            Interval::EMPTY
        } else {
            r
        }
    }

    /// Smallest interval containing both.
    pub fn hull(&self, other: &Interval) -> Interval {
        if self.is_empty() {
            *other
        } else if other.is_empty() {
            *self
        } else {
            Interval::new(self.lo.min(other.lo), self.hi.max(other.hi))
        }
    }

    fn corners(&self, other: &Interval, f: impl Fn(i128, i128) -> i128) -> Interval {
        if self.is_empty() || other.is_empty() {
            return Interval::EMPTY;
        }
        let values = [
            f(self.lo as i128, other.lo as i128),
            f(self.lo as i128, other.hi as i128),
            f(self.hi as i128, other.lo as i128),
            f(self.hi as i128, other.hi as i128),
        ];
        let lo = values.iter().copied().min().unwrap_or(i128::MAX);
        let hi = values.iter().copied().max().unwrap_or(i128::MIN);
        Interval::from_i128(lo, hi)
    }

    pub fn neg(&self) -> Interval {
        if self.is_empty() {
            return Interval::EMPTY;
        }
        Interval::from_i128(-(self.hi as i128), -(self.lo as i128))
    }

    pub fn abs(&self) -> Interval {
        if self.is_empty() {
            Interval::EMPTY
        } else if self.lo >= 0 {
            *self
        } else if self.hi <= 0 {
            self.neg()
        } else {
            Interval::from_i128(0, (-(self.lo as i128)).max(self.hi as i128))
        }
    }

    pub fn add(&self, other: &Interval) -> Interval {
        self.corners(other, |a, b| a + b)
    }

    pub fn sub(&self, other: &Interval) -> Interval {
        self.corners(other, |a, b| a - b)
    }

    pub fn mul(&self, other: &Interval) -> Interval {
        self.corners(other, |a, b| a * b)
    }

    /// The negative and positive parts of a divisor range.
    fn divisor_parts(&self) -> [Interval; 2] {
        [
            self.intersect(&Interval::new(i64::MIN, -1)),
            self.intersect(&Interval::new(1, i64::MAX)),
        ]
    }

    /// Floor division. With the divisor's sign fixed the quotient is monotone
    /// in both operands, so the corners bound it.
    pub fn div(&self, other: &Interval) -> Interval {
        other.divisor_parts().iter().fold(Interval::EMPTY, |acc, part| {
            acc.hull(&self.corners(part, floor_div_wide))
        })
    }

    /// Floor modulo: the remainder lies strictly between zero and the divisor.
    pub fn modulo(&self, other: &Interval) -> Interval {
        if self.is_empty() {
            return Interval::EMPTY;
        }
        let [neg, pos] = other.divisor_parts();
        let mut result = Interval::EMPTY;
        if !neg.is_empty() {
            result = result.hull(&Interval::from_i128(neg.lo as i128 + 1, 0));
        }
        if !pos.is_empty() {
            result = result.hull(&Interval::from_i128(0, pos.hi as i128 - 1));
        }
        result
    }

    pub fn pow(&self, exp: &Interval) -> Interval {
        let exp = exp.intersect(&Interval::new(0, i64::MAX));
        if self.is_empty() || exp.is_empty() {
            return Interval::EMPTY;
        }
        match (self.as_point(), exp.as_point()) {
            (_, Some(0)) => Interval::point(1),
            (Some(base), Some(e)) => match AOp::Pow.apply(base, e) {
                Ok(v) => Interval::point(v),
                Err(_) => Interval::EMPTY,
            },
            _ => Interval::FULL,
        }
    }
}

fn floor_div_wide(a: i128, b: i128) -> i128 {
    let q = a.div_euclid(b);
    if b < 0 && a.rem_euclid(b) != 0 {
        q - 1
    } else {
        q
    }
}

/// Result of propagation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Propagation {
    /// Some domain became empty: the problem has no solution.
    Refuted,
    /// Narrowed domains, indexed by symbol.
    Domains(Vec<Interval>),
}

struct Propagator<'a> {
    problem: &'a Problem,
    doms: Vec<Interval>,
    changed: bool,
}

impl<'a> Propagator<'a> {
    fn new(problem: &'a Problem) -> Self {
        let doms = problem
            .symbols()
            .iter()
            .map(|s| match s.sort {
                Sort::Int => Interval::FULL,
                Sort::Bool => Interval::BOOL,
            })
            .collect();
        Self {
            problem,
            doms,
            changed: false,
        }
    }

    fn dom(&self, t: Term) -> Interval {
        match t {
            Term::Const(c) => Interval::point(c),
            Term::Sym(s) => self.doms[s.index()],
        }
    }

    /// Narrows the domain of `t` to `to`. Returns `false` on contradiction.
    fn restrict(&mut self, t: Term, to: Interval) -> bool {
        match t {
            Term::Const(c) => to.contains(c),
            Term::Sym(s) => {
                let old = self.doms[s.index()];
                let new = old.intersect(&to);
                if new != old {
                    self.doms[s.index()] = new;
                    self.changed = true;
                }
                !new.is_empty()
            }
        }
    }

    fn define(&mut self, target: Term, def: &Definition) -> bool {
        // Forward.
        let value = match def {
            Definition::Copy(t) => self.dom(*t),
            Definition::Unary(op, t) => {
                let d = self.dom(*t);
                match op {
                    AUnOp::Plus => d,
                    AUnOp::Neg => d.neg(),
                    AUnOp::Abs => d.abs(),
                }
            }
            Definition::Binary(op, a, b) => {
                let (da, db) = (self.dom(*a), self.dom(*b));
                match op {
                    AOp::Add => da.add(&db),
                    AOp::Sub => da.sub(&db),
                    AOp::Mul => da.mul(&db),
                    AOp::Div => da.div(&db),
                    AOp::Mod => da.modulo(&db),
                    AOp::Pow => da.pow(&db),
                }
            }
        };
        if !self.restrict(target, value) {
            return false;
        }

        // Backward.
        let dt = self.dom(target);
        match def {
            Definition::Copy(t) | Definition::Unary(AUnOp::Plus, t) => self.restrict(*t, dt),
            Definition::Unary(AUnOp::Neg, t) => self.restrict(*t, dt.neg()),
            Definition::Unary(AUnOp::Abs, t) => {
                let bound = dt.intersect(&Interval::new(0, i64::MAX));
                !bound.is_empty() && self.restrict(*t, Interval::new(-bound.hi, bound.hi))
            }
            Definition::Binary(AOp::Add, a, b) => {
                self.restrict(*a, dt.sub(&self.dom(*b))) && self.restrict(*b, dt.sub(&self.dom(*a)))
            }
            Definition::Binary(AOp::Sub, a, b) => {
                self.restrict(*a, dt.add(&self.dom(*b))) && self.restrict(*b, self.dom(*a).sub(&dt))
            }
            Definition::Binary(AOp::Pow, _, e) => self.restrict(*e, Interval::new(0, i64::MAX)),
            Definition::Binary(AOp::Mul | AOp::Div | AOp::Mod, _, _) => true,
        }
    }

    fn compare(&mut self, op: CmpOp, a: Term, b: Term) -> bool {
        let (da, db) = (self.dom(a), self.dom(b));
        match op {
            CmpOp::Eq => {
                let both = da.intersect(&db);
                self.restrict(a, both) && self.restrict(b, both)
            }
            CmpOp::Ne => {
                let a_ok = match db.as_point() {
                    Some(p) => self.exclude(a, p),
                    None => true,
                };
                let b_ok = match self.dom(a).as_point() {
                    Some(p) => self.exclude(b, p),
                    None => true,
                };
                a_ok && b_ok
            }
            CmpOp::Le => {
                self.restrict(a, Interval::new(i64::MIN, db.hi)) && self.restrict(b, Interval::new(da.lo, i64::MAX))
            }
            CmpOp::Lt => {
                // a <= b - 1 and b >= a + 1
                let a_hi = Interval::from_i128(i64::MIN as i128, db.hi as i128 - 1);
                let b_lo = Interval::from_i128(da.lo as i128 + 1, i64::MAX as i128);
                self.restrict(a, a_hi) && self.restrict(b, b_lo)
            }
            CmpOp::Ge => self.compare(CmpOp::Le, b, a),
            CmpOp::Gt => self.compare(CmpOp::Lt, b, a),
        }
    }

    /// Removes `p` from the domain of `t` when it is an endpoint.
    fn exclude(&mut self, t: Term, p: i64) -> bool {
        let d = self.dom(t);
        if d.as_point() == Some(p) {
            return false;
        }
        if d.lo == p {
            self.restrict(t, Interval::new(p + 1, d.hi))
        } else if d.hi == p {
            self.restrict(t, Interval::new(d.lo, p - 1))
        } else {
            true
        }
    }

    fn assert(&mut self, formula: &Formula) -> bool {
        for conjunct in formula.conjuncts() {
            let ok = match conjunct {
                Formula::Const(b) => *b,
                Formula::Sym(s) => self.restrict(Term::Sym(*s), Interval::point(1)),
                Formula::Not(inner) => match inner.as_ref() {
                    Formula::Sym(s) => self.restrict(Term::Sym(*s), Interval::point(0)),
                    _ => true,
                },
                Formula::Cmp(op, a, b) => self.compare(*op, *a, *b),
                Formula::And(_) | Formula::Or(_) | Formula::Xor(_, _) => true,
            };
            if !ok {
                return false;
            }
        }
        true
    }

    fn round(&mut self) -> bool {
        for c in self.problem.constraints() {
            let ok = match c {
                Constraint::Define { target, def } => self.define(Term::Sym(*target), def),
                Constraint::Assert(f) => self.assert(f),
            };
            if !ok {
                return false;
            }
        }
        true
    }
}

/// Narrows symbol domains as far as interval reasoning allows.
pub fn propagate(problem: &Problem) -> Propagation {
    let mut p = Propagator::new(problem);
    for round in 0..MAX_ROUNDS {
        p.changed = false;
        if !p.round() {
            debug!("propagation refuted the problem in round {}", round);
            return Propagation::Refuted;
        }
        if !p.changed {
            debug!("propagation reached a fixpoint after {} rounds", round + 1);
            break;
        }
    }
    Propagation::Domains(p.doms)
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    use crate::constraint::{Origin, SymId};

    fn int(p: &mut Problem, name: &str) -> SymId {
        p.fresh(name, Sort::Int, Origin::Initial(name.to_string()))
    }

    #[test]
    fn test_interval_arithmetic() {
        let a = Interval::new(-3, 5);
        let b = Interval::new(2, 4);
        assert_eq!(a.add(&b), Interval::new(-1, 9));
        assert_eq!(a.sub(&b), Interval::new(-7, 3));
        assert_eq!(a.mul(&b), Interval::new(-12, 20));
        assert_eq!(a.neg(), Interval::new(-5, 3));
        assert_eq!(a.abs(), Interval::new(0, 5));
        assert_eq!(Interval::new(-7, 7).div(&Interval::point(2)), Interval::new(-4, 3));
        assert_eq!(Interval::new(7, 7).div(&Interval::point(-2)), Interval::point(-4));
        assert_eq!(a.modulo(&b), Interval::new(0, 3));
        assert!(a.div(&Interval::point(0)).is_empty());
        assert_eq!(Interval::FULL.neg(), Interval::new(-i64::MAX, i64::MAX));
        assert_eq!(Interval::point(2).pow(&Interval::point(10)), Interval::point(1024));
        assert_eq!(Interval::FULL.size(), 1u128 << 64);
    }

    #[test]
    fn test_propagate_pins_chain() {
        // y = x + 3; assert y == 10
        let mut p = Problem::new();
        let x = int(&mut p, "x");
        let y = p.fresh("y", Sort::Int, Origin::Aux);
        p.define(y, Definition::Binary(AOp::Add, Term::Sym(x), Term::Const(3)));
        p.assert(Formula::Cmp(CmpOp::Eq, Term::Sym(y), Term::Const(10)));
        match propagate(&p) {
            Propagation::Domains(doms) => {
                assert_eq!(doms[x.index()], Interval::point(7));
                assert_eq!(doms[y.index()], Interval::point(10));
            }
            Propagation::Refuted => panic!("unexpected refutation"),
        }
    }

    #[test]
    fn test_propagate_refutes() {
        // assert x > 5; assert x < 3
        let mut p = Problem::new();
        let x = int(&mut p, "x");
        p.assert(Formula::Cmp(CmpOp::Gt, Term::Sym(x), Term::Const(5)));
        p.assert(Formula::Cmp(CmpOp::Lt, Term::Sym(x), Term::Const(3)));
        assert_eq!(propagate(&p), Propagation::Refuted);
    }

    #[test]
    fn test_propagate_refutes_constant_guard() {
        let mut p = Problem::new();
        let x = int(&mut p, "x");
        p.define(x, Definition::Copy(Term::Const(5)));
        p.assert(Formula::Cmp(CmpOp::Le, Term::Sym(x), Term::Const(0)));
        assert_eq!(propagate(&p), Propagation::Refuted);
    }

    #[test]
    fn test_propagate_countdown() {
        // n0 > 0; n1 = n0 - 1; n1 > 0; n2 = n1 - 1; !(n2 > 0)
        let mut p = Problem::new();
        let n0 = int(&mut p, "n");
        let n1 = p.fresh("n#1", Sort::Int, Origin::Aux);
        let n2 = p.fresh("n#2", Sort::Int, Origin::Aux);
        p.assert(Formula::Cmp(CmpOp::Gt, Term::Sym(n0), Term::Const(0)));
        p.define(n1, Definition::Binary(AOp::Sub, Term::Sym(n0), Term::Const(1)));
        p.assert(Formula::Cmp(CmpOp::Gt, Term::Sym(n1), Term::Const(0)));
        p.define(n2, Definition::Binary(AOp::Sub, Term::Sym(n1), Term::Const(1)));
        p.assert(Formula::not(Formula::Cmp(CmpOp::Gt, Term::Sym(n2), Term::Const(0))));
        match propagate(&p) {
            Propagation::Domains(doms) => assert_eq!(doms[n0.index()], Interval::point(2)),
            Propagation::Refuted => panic!("unexpected refutation"),
        }
    }
}
