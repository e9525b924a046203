//! Minimal symbolic expressions for per-component Lagrangians.
//!
//! This is deliberately not a general computer-algebra system: the only
//! operations needed are building a component type's Lagrangian, taking
//! first and second partial derivatives with respect to declared symbols,
//! folding the result down, and evaluating it against numeric argument
//! slices. Everything happens once per component *type* at compile time;
//! instances never touch expressions.

use std::ops::{Add, Div, Mul, Neg, Sub};

/// Classification of a symbol inside an equation set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymClass {
    /// Fixed per-instance numeric parameter (e.g. line conductance)
    Constant,
    /// Solved-for physical quantity
    Primal,
    /// Lagrange multiplier
    Dual,
}

/// A named placeholder used inside an equation set before instance binding.
///
/// Identity is (class, slot); the name exists for binding and diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct Sym {
    pub name: &'static str,
    pub class: SymClass,
    /// Position within the ordered list of this symbol's class.
    pub slot: usize,
}

impl PartialEq for Sym {
    fn eq(&self, other: &Self) -> bool {
        self.class == other.class && self.slot == other.slot
    }
}

impl Eq for Sym {}

/// Scalar expression over symbols.
#[derive(Debug, Clone)]
pub enum Expr {
    Num(f64),
    Var(Sym),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
    Neg(Box<Expr>),
}

impl From<Sym> for Expr {
    fn from(sym: Sym) -> Self {
        Expr::Var(sym)
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Expr::Num(value)
    }
}

impl Expr {
    pub fn num(value: f64) -> Self {
        Expr::Num(value)
    }

    /// True if this is literally the constant zero.
    pub fn is_zero(&self) -> bool {
        matches!(self, Expr::Num(v) if *v == 0.0)
    }

    /// Evaluate against the ordered (constants, primals, duals) slices.
    pub fn eval(&self, constants: &[f64], primals: &[f64], duals: &[f64]) -> f64 {
        match self {
            Expr::Num(v) => *v,
            Expr::Var(sym) => match sym.class {
                SymClass::Constant => constants[sym.slot],
                SymClass::Primal => primals[sym.slot],
                SymClass::Dual => duals[sym.slot],
            },
            Expr::Add(a, b) => a.eval(constants, primals, duals) + b.eval(constants, primals, duals),
            Expr::Sub(a, b) => a.eval(constants, primals, duals) - b.eval(constants, primals, duals),
            Expr::Mul(a, b) => a.eval(constants, primals, duals) * b.eval(constants, primals, duals),
            Expr::Div(a, b) => a.eval(constants, primals, duals) / b.eval(constants, primals, duals),
            Expr::Neg(a) => -a.eval(constants, primals, duals),
        }
    }

    /// Partial derivative with respect to `wrt`. Constants differentiate to
    /// zero like any other non-matching symbol.
    pub fn diff(&self, wrt: Sym) -> Expr {
        match self {
            Expr::Num(_) => Expr::Num(0.0),
            Expr::Var(sym) => {
                if *sym == wrt {
                    Expr::Num(1.0)
                } else {
                    Expr::Num(0.0)
                }
            }
            Expr::Add(a, b) => Expr::Add(Box::new(a.diff(wrt)), Box::new(b.diff(wrt))),
            Expr::Sub(a, b) => Expr::Sub(Box::new(a.diff(wrt)), Box::new(b.diff(wrt))),
            Expr::Mul(a, b) => Expr::Add(
                Box::new(Expr::Mul(Box::new(a.diff(wrt)), b.clone())),
                Box::new(Expr::Mul(a.clone(), Box::new(b.diff(wrt)))),
            ),
            // (a/b)' = (a'·b − a·b') / b²
            Expr::Div(a, b) => Expr::Div(
                Box::new(Expr::Sub(
                    Box::new(Expr::Mul(Box::new(a.diff(wrt)), b.clone())),
                    Box::new(Expr::Mul(a.clone(), Box::new(b.diff(wrt)))),
                )),
                Box::new(Expr::Mul(b.clone(), b.clone())),
            ),
            Expr::Neg(a) => Expr::Neg(Box::new(a.diff(wrt))),
        }
    }

    /// Fold constants and strip arithmetic identities. Differentiation
    /// produces many `x·0` and `x+0` terms; folding them keeps compiled
    /// evaluators small and makes structural zeros recognizable.
    pub fn simplify(&self) -> Expr {
        match self {
            Expr::Num(v) => Expr::Num(*v),
            Expr::Var(sym) => Expr::Var(*sym),
            Expr::Add(a, b) => {
                let (a, b) = (a.simplify(), b.simplify());
                match (&a, &b) {
                    (Expr::Num(x), Expr::Num(y)) => Expr::Num(x + y),
                    (Expr::Num(x), _) if *x == 0.0 => b,
                    (_, Expr::Num(y)) if *y == 0.0 => a,
                    _ => Expr::Add(Box::new(a), Box::new(b)),
                }
            }
            Expr::Sub(a, b) => {
                let (a, b) = (a.simplify(), b.simplify());
                match (&a, &b) {
                    (Expr::Num(x), Expr::Num(y)) => Expr::Num(x - y),
                    (_, Expr::Num(y)) if *y == 0.0 => a,
                    (Expr::Num(x), _) if *x == 0.0 => Expr::Neg(Box::new(b)),
                    _ => Expr::Sub(Box::new(a), Box::new(b)),
                }
            }
            Expr::Mul(a, b) => {
                let (a, b) = (a.simplify(), b.simplify());
                match (&a, &b) {
                    (Expr::Num(x), Expr::Num(y)) => Expr::Num(x * y),
                    (Expr::Num(x), _) | (_, Expr::Num(x)) if *x == 0.0 => Expr::Num(0.0),
                    (Expr::Num(x), _) if *x == 1.0 => b,
                    (_, Expr::Num(y)) if *y == 1.0 => a,
                    _ => Expr::Mul(Box::new(a), Box::new(b)),
                }
            }
            Expr::Div(a, b) => {
                let (a, b) = (a.simplify(), b.simplify());
                match (&a, &b) {
                    (Expr::Num(x), _) if *x == 0.0 => Expr::Num(0.0),
                    (_, Expr::Num(y)) if *y == 1.0 => a,
                    (Expr::Num(x), Expr::Num(y)) if *y != 0.0 => Expr::Num(x / y),
                    _ => Expr::Div(Box::new(a), Box::new(b)),
                }
            }
            Expr::Neg(a) => {
                let a = a.simplify();
                match &a {
                    Expr::Num(x) => Expr::Num(-x),
                    Expr::Neg(inner) => (**inner).clone(),
                    _ => Expr::Neg(Box::new(a)),
                }
            }
        }
    }

    /// Walk the tree, calling `f` on every symbol reference.
    pub fn visit_symbols(&self, f: &mut impl FnMut(Sym)) {
        match self {
            Expr::Num(_) => {}
            Expr::Var(sym) => f(*sym),
            Expr::Add(a, b) | Expr::Sub(a, b) | Expr::Mul(a, b) | Expr::Div(a, b) => {
                a.visit_symbols(f);
                b.visit_symbols(f);
            }
            Expr::Neg(a) => a.visit_symbols(f),
        }
    }
}

impl Add for Expr {
    type Output = Expr;
    fn add(self, rhs: Expr) -> Expr {
        Expr::Add(Box::new(self), Box::new(rhs))
    }
}

impl Sub for Expr {
    type Output = Expr;
    fn sub(self, rhs: Expr) -> Expr {
        Expr::Sub(Box::new(self), Box::new(rhs))
    }
}

impl Mul for Expr {
    type Output = Expr;
    fn mul(self, rhs: Expr) -> Expr {
        Expr::Mul(Box::new(self), Box::new(rhs))
    }
}

impl Div for Expr {
    type Output = Expr;
    fn div(self, rhs: Expr) -> Expr {
        Expr::Div(Box::new(self), Box::new(rhs))
    }
}

impl Neg for Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        Expr::Neg(Box::new(self))
    }
}
