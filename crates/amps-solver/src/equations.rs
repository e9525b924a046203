//! Per-component-type equation sets and their compiled derivative forms.
//!
//! A component type declares its symbols (constants, primals, duals) and a
//! single scalar Lagrangian. Compilation differentiates the Lagrangian once
//! per row symbol for residuals and twice for Jacobian entries, simplifies,
//! drops structural zeros, and returns a [`CompiledModel`] shared by every
//! instance of that type.

use crate::error::{SolverError, SolverResult};
use crate::expr::{Expr, Sym, SymClass};

/// Builder for a component type's symbolic equations.
#[derive(Debug, Clone)]
pub struct ModelEquationSet {
    name: &'static str,
    constants: Vec<&'static str>,
    primals: Vec<&'static str>,
    duals: Vec<&'static str>,
    /// For each dual slot, the primal slot it is paired with.
    dual_pairs: Vec<usize>,
    lagrangian: Option<Expr>,
}

impl ModelEquationSet {
    pub fn new(name: &'static str) -> Self {
        ModelEquationSet {
            name,
            constants: Vec::new(),
            primals: Vec::new(),
            duals: Vec::new(),
            dual_pairs: Vec::new(),
            lagrangian: None,
        }
    }

    /// Declare a fixed per-instance parameter.
    pub fn constant(&mut self, name: &'static str) -> Sym {
        let slot = self.constants.len();
        self.constants.push(name);
        Sym {
            name,
            class: SymClass::Constant,
            slot,
        }
    }

    /// Declare a solved-for physical quantity.
    pub fn primal(&mut self, name: &'static str) -> Sym {
        let slot = self.primals.len();
        self.primals.push(name);
        Sym {
            name,
            class: SymClass::Primal,
            slot,
        }
    }

    /// Declare a Lagrange multiplier paired with `primal`. The pairing
    /// decides where this symbol's row lands when duals are disabled.
    pub fn dual_for(&mut self, name: &'static str, primal: Sym) -> Sym {
        debug_assert_eq!(primal.class, SymClass::Primal);
        let slot = self.duals.len();
        self.duals.push(name);
        self.dual_pairs.push(primal.slot);
        Sym {
            name,
            class: SymClass::Dual,
            slot,
        }
    }

    pub fn set_lagrangian(&mut self, lagrangian: Expr) {
        self.lagrangian = Some(lagrangian);
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Differentiate the Lagrangian into residual and Jacobian evaluators.
    pub fn compile(&self) -> SolverResult<CompiledModel> {
        let lagrangian = self.lagrangian.as_ref().ok_or_else(|| {
            SolverError::Config(format!("model '{}' has no Lagrangian", self.name))
        })?;

        self.check_bound(lagrangian)?;

        for (dual_slot, &primal_slot) in self.dual_pairs.iter().enumerate() {
            if primal_slot >= self.primals.len() {
                return Err(SolverError::UnboundSymbol(format!(
                    "model '{}': dual '{}' paired with undeclared primal slot {}",
                    self.name, self.duals[dual_slot], primal_slot
                )));
            }
        }

        let row_syms = self.row_symbols();
        let col_syms = row_syms.clone();

        // Zero second derivatives are compiled like any other so every row
        // carries the full column list; emission filters them out instead.
        let mut rows = Vec::with_capacity(row_syms.len());
        for row_sym in &row_syms {
            let residual = lagrangian.diff(*row_sym).simplify();
            let entries = col_syms
                .iter()
                .map(|col_sym| (*col_sym, Evaluator::new(residual.diff(*col_sym).simplify())))
                .collect();
            rows.push(CompiledRow {
                sym: *row_sym,
                residual: Evaluator::new(residual),
                entries,
            });
        }

        Ok(CompiledModel {
            name: self.name,
            n_constants: self.constants.len(),
            n_primals: self.primals.len(),
            n_duals: self.duals.len(),
            dual_pairs: self.dual_pairs.clone(),
            rows,
        })
    }

    fn row_symbols(&self) -> Vec<Sym> {
        let mut syms = Vec::with_capacity(self.primals.len() + self.duals.len());
        for (slot, name) in self.primals.iter().enumerate() {
            syms.push(Sym {
                name,
                class: SymClass::Primal,
                slot,
            });
        }
        for (slot, name) in self.duals.iter().enumerate() {
            syms.push(Sym {
                name,
                class: SymClass::Dual,
                slot,
            });
        }
        syms
    }

    /// Reject Lagrangians that reference symbols this set never declared.
    fn check_bound(&self, expr: &Expr) -> SolverResult<()> {
        let mut bad: Option<Sym> = None;
        expr.visit_symbols(&mut |sym| {
            let declared = match sym.class {
                SymClass::Constant => sym.slot < self.constants.len(),
                SymClass::Primal => sym.slot < self.primals.len(),
                SymClass::Dual => sym.slot < self.duals.len(),
            };
            if !declared && bad.is_none() {
                bad = Some(sym);
            }
        });
        match bad {
            Some(sym) => Err(SolverError::UnboundSymbol(format!(
                "model '{}': symbol '{}' was not declared",
                self.name, sym.name
            ))),
            None => Ok(()),
        }
    }
}

/// A simplified expression ready for repeated numeric evaluation.
#[derive(Debug, Clone)]
pub struct Evaluator {
    expr: Expr,
}

impl Evaluator {
    fn new(expr: Expr) -> Self {
        Evaluator { expr }
    }

    #[inline]
    pub fn eval(&self, constants: &[f64], primals: &[f64], duals: &[f64]) -> f64 {
        self.expr.eval(constants, primals, duals)
    }

    pub fn is_constant(&self) -> bool {
        matches!(self.expr, Expr::Num(_))
    }

    /// True for the compiled constant-zero evaluator.
    pub fn is_zero(&self) -> bool {
        self.expr.is_zero()
    }
}

/// One equation row: the residual ∂L/∂s and its non-zero Jacobian columns.
#[derive(Debug, Clone)]
pub struct CompiledRow {
    pub sym: Sym,
    pub residual: Evaluator,
    pub entries: Vec<(Sym, Evaluator)>,
}

/// The fully differentiated form of one component type, shared across
/// instances.
#[derive(Debug, Clone)]
pub struct CompiledModel {
    pub name: &'static str,
    pub n_constants: usize,
    pub n_primals: usize,
    pub n_duals: usize,
    /// dual slot -> paired primal slot
    pub dual_pairs: Vec<usize>,
    pub rows: Vec<CompiledRow>,
}

impl CompiledModel {
    /// Rows in declaration order: primals first, then duals.
    pub fn rows(&self) -> &[CompiledRow] {
        &self.rows
    }

    pub fn paired_primal(&self, dual_slot: usize) -> usize {
        self.dual_pairs[dual_slot]
    }
}
