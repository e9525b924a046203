//! Instance-level stamping: binding a compiled model's symbols to global
//! variable indices and emitting Jacobian/residual contributions.
//!
//! The one subtle rule lives here. When a component's duals are disabled,
//! its dual-symbol rows carry the physical equations and are re-routed to
//! the paired primal's global row, its primal-symbol rows are suppressed,
//! and dual columns are skipped entirely (the dual value reads as zero).
//! When duals are enabled, every row lands at its own index.

use crate::equations::CompiledModel;
use crate::error::{SolverError, SolverResult};
use crate::expr::{Sym, SymClass};
use crate::index::VarIndex;

/// Where a symbol's value and row live in the global system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    Index(VarIndex),
    /// No allocated variable. Reads as 0.0, emits nothing.
    Skip,
}

impl Binding {
    pub fn index(self) -> Option<VarIndex> {
        match self {
            Binding::Index(ix) => Some(ix),
            Binding::Skip => None,
        }
    }
}

/// Per-instance binding of a [`CompiledModel`] to the global system.
#[derive(Debug, Clone)]
pub struct StampDetails {
    constants: Vec<f64>,
    primal_ix: Vec<VarIndex>,
    dual_bind: Vec<Binding>,
    duals_enabled: bool,
}

impl StampDetails {
    pub fn new(
        model: &CompiledModel,
        constants: Vec<f64>,
        primal_ix: Vec<VarIndex>,
        dual_bind: Vec<Binding>,
    ) -> Self {
        debug_assert_eq!(constants.len(), model.n_constants);
        debug_assert_eq!(primal_ix.len(), model.n_primals);
        debug_assert_eq!(dual_bind.len(), model.n_duals);
        let duals_enabled = dual_bind.iter().all(|b| matches!(b, Binding::Index(_)))
            && !dual_bind.is_empty();
        StampDetails {
            constants,
            primal_ix,
            dual_bind,
            duals_enabled,
        }
    }

    /// Binding with no dual variables allocated at all.
    pub fn primal_only(model: &CompiledModel, constants: Vec<f64>, primal_ix: Vec<VarIndex>) -> Self {
        let skips = vec![Binding::Skip; model.n_duals];
        Self::new(model, constants, primal_ix, skips)
    }

    pub fn duals_enabled(&self) -> bool {
        self.duals_enabled
    }

    pub fn constants(&self) -> &[f64] {
        &self.constants
    }

    pub fn set_constant(&mut self, slot: usize, value: f64) {
        self.constants[slot] = value;
    }

    pub fn primal_index(&self, slot: usize) -> VarIndex {
        self.primal_ix[slot]
    }

    /// Where `sym`'s row/column lives. Constants have no index; out-of-range
    /// slots mean the symbol belongs to a different equation set.
    pub fn binding(&self, sym: Sym) -> SolverResult<Binding> {
        match sym.class {
            SymClass::Primal => self
                .primal_ix
                .get(sym.slot)
                .map(|&ix| Binding::Index(ix))
                .ok_or_else(|| SolverError::UnboundSymbol(sym.name.to_string())),
            SymClass::Dual => self
                .dual_bind
                .get(sym.slot)
                .copied()
                .ok_or_else(|| SolverError::UnboundSymbol(sym.name.to_string())),
            SymClass::Constant => Err(SolverError::UnboundSymbol(sym.name.to_string())),
        }
    }

    /// Current value of `sym` under the iterate `v`. Skipped duals read as
    /// zero; constants read from the instance parameters.
    pub fn value(&self, v: &[f64], sym: Sym) -> SolverResult<f64> {
        match sym.class {
            SymClass::Constant => self
                .constants
                .get(sym.slot)
                .copied()
                .ok_or_else(|| SolverError::UnboundSymbol(sym.name.to_string())),
            SymClass::Primal | SymClass::Dual => Ok(match self.binding(sym)? {
                Binding::Index(ix) => v[ix],
                Binding::Skip => 0.0,
            }),
        }
    }

    fn gather_primals(&self, v: &[f64]) -> Vec<f64> {
        self.primal_ix.iter().map(|&ix| v[ix]).collect()
    }

    fn gather_duals(&self, v: &[f64]) -> Vec<f64> {
        self.dual_bind
            .iter()
            .map(|b| match b {
                Binding::Index(ix) => v[*ix],
                Binding::Skip => 0.0,
            })
            .collect()
    }
}

/// A single contribution to the linearized system.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StampEntry {
    Jacobian {
        row: VarIndex,
        col: VarIndex,
        value: f64,
    },
    Residual {
        row: VarIndex,
        value: f64,
    },
}

/// Evaluate one instance's rows at the current iterate and append the
/// resulting entries to `out`. Residual values are the raw ∂L/∂s; the
/// matrix layer owns the sign of the right-hand side.
pub fn emit_stamps(
    model: &CompiledModel,
    details: &StampDetails,
    v: &[f64],
    out: &mut Vec<StampEntry>,
) {
    let primals = details.gather_primals(v);
    let duals = details.gather_duals(v);

    for row in model.rows() {
        let row_ix = match row.sym.class {
            SymClass::Primal => {
                if !details.duals_enabled {
                    continue;
                }
                details.primal_ix[row.sym.slot]
            }
            SymClass::Dual => {
                if details.duals_enabled {
                    match details.dual_bind[row.sym.slot] {
                        Binding::Index(ix) => ix,
                        Binding::Skip => continue,
                    }
                } else {
                    details.primal_ix[model.paired_primal(row.sym.slot)]
                }
            }
            SymClass::Constant => unreachable!("constants are never row symbols"),
        };

        out.push(StampEntry::Residual {
            row: row_ix,
            value: row.residual.eval(&details.constants, &primals, &duals),
        });

        for (col_sym, derivative) in &row.entries {
            if derivative.is_zero() {
                continue;
            }
            let col_ix = match col_sym.class {
                SymClass::Primal => details.primal_ix[col_sym.slot],
                SymClass::Dual => match details.dual_bind[col_sym.slot] {
                    Binding::Index(ix) => ix,
                    Binding::Skip => continue,
                },
                SymClass::Constant => unreachable!("constants are never column symbols"),
            };
            out.push(StampEntry::Jacobian {
                row: row_ix,
                col: col_ix,
                value: derivative.eval(&details.constants, &primals, &duals),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equations::ModelEquationSet;
    use crate::expr::Expr;

    /// L = lr·(g·Vr − c): physics g·Vr − c on the dual row.
    fn toy_model() -> CompiledModel {
        let mut set = ModelEquationSet::new("toy");
        let g = set.constant("g");
        let c = set.constant("c");
        let vr = set.primal("Vr");
        let lr = set.dual_for("lr", vr);
        set.set_lagrangian(Expr::from(lr) * (Expr::from(g) * Expr::from(vr) - Expr::from(c)));
        set.compile().unwrap()
    }

    #[test]
    fn test_duals_disabled_routes_physics_to_primal_row() {
        let model = toy_model();
        let details = StampDetails::primal_only(&model, vec![2.0, 6.0], vec![4]);
        assert!(!details.duals_enabled());

        let mut v = vec![0.0; 8];
        v[4] = 3.0; // Vr
        let mut out = Vec::new();
        emit_stamps(&model, &details, &v, &mut out);

        // Only the dual-symbol row survives, landed on row 4 with the
        // primal column. No dual columns, no primal-symbol row.
        assert_eq!(
            out,
            vec![
                StampEntry::Residual { row: 4, value: 0.0 }, // 2·3 − 6
                StampEntry::Jacobian {
                    row: 4,
                    col: 4,
                    value: 2.0
                },
            ]
        );
    }

    #[test]
    fn test_duals_enabled_emits_all_rows() {
        let model = toy_model();
        let details = StampDetails::new(
            &model,
            vec![2.0, 6.0],
            vec![4],
            vec![Binding::Index(5)],
        );
        assert!(details.duals_enabled());

        let mut v = vec![0.0; 8];
        v[4] = 3.0; // Vr
        v[5] = 0.5; // lr
        let mut out = Vec::new();
        emit_stamps(&model, &details, &v, &mut out);

        // Primal row at 4: ∂L/∂Vr = lr·g = 1.0, column lr.
        // Dual row at 5: g·Vr − c = 0, column Vr.
        assert_eq!(
            out,
            vec![
                StampEntry::Residual { row: 4, value: 1.0 },
                StampEntry::Jacobian {
                    row: 4,
                    col: 5,
                    value: 2.0
                },
                StampEntry::Residual { row: 5, value: 0.0 },
                StampEntry::Jacobian {
                    row: 5,
                    col: 4,
                    value: 2.0
                },
            ]
        );
    }

    #[test]
    fn test_symbol_lookup() {
        let model = toy_model();
        let details = StampDetails::primal_only(&model, vec![2.0, 6.0], vec![4]);
        let vr = Sym {
            name: "Vr",
            class: SymClass::Primal,
            slot: 0,
        };
        let lr = Sym {
            name: "lr",
            class: SymClass::Dual,
            slot: 0,
        };
        let mut v = vec![0.0; 8];
        v[4] = 3.0;

        assert_eq!(details.binding(vr).unwrap(), Binding::Index(4));
        assert_eq!(details.binding(lr).unwrap(), Binding::Skip);
        assert_eq!(details.value(&v, vr).unwrap(), 3.0);
        // Skipped duals read as a defined zero.
        assert_eq!(details.value(&v, lr).unwrap(), 0.0);

        let stray = Sym {
            name: "stray",
            class: SymClass::Primal,
            slot: 9,
        };
        assert!(matches!(
            details.binding(stray),
            Err(SolverError::UnboundSymbol(_))
        ));
    }

    #[test]
    fn test_tx_rescale_through_constants() {
        let model = toy_model();
        let mut details = StampDetails::primal_only(&model, vec![2.0, 6.0], vec![0]);
        details.set_constant(0, 4.0);
        let v = vec![3.0];
        let mut out = Vec::new();
        emit_stamps(&model, &details, &v, &mut out);
        assert_eq!(
            out[0],
            StampEntry::Residual { row: 0, value: 6.0 } // 4·3 − 6
        );
    }
}
