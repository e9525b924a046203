//! Built-in component equation sets.
//!
//! Every model follows the same convention: bus KCL rows accumulate
//! currents *leaving* the bus, so shunt consumers (loads) contribute +I
//! and sources (generators, slacks) contribute −I. Each physical equation
//! is written once as a term λ·f in the Lagrangian; the dual pairing then
//! routes f to the right KCL row when multipliers are disabled, and the
//! full stationarity rows appear when they are enabled.

use std::sync::OnceLock;

use crate::equations::{CompiledModel, ModelEquationSet};
use crate::error::SolverResult;
use crate::expr::{Expr, Sym};

fn v(sym: Sym) -> Expr {
    Expr::from(sym)
}

/// π-section branch. Constants: [g, b, bsh_half, txf].
///
/// Series admittance g+jb with half the charging susceptance hung on each
/// terminal. `txf` is the homotopy scale applied to the whole branch.
fn pi_line() -> SolverResult<CompiledModel> {
    let mut set = ModelEquationSet::new("pi_line");
    let g = set.constant("g");
    let b = set.constant("b");
    let bsh = set.constant("bsh_half");
    let txf = set.constant("txf");
    let vrf = set.primal("Vrf");
    let vif = set.primal("Vif");
    let vrt = set.primal("Vrt");
    let vit = set.primal("Vit");
    let lrf = set.dual_for("lrf", vrf);
    let lif = set.dual_for("lif", vif);
    let lrt = set.dual_for("lrt", vrt);
    let lit = set.dual_for("lit", vit);

    let ifr = v(txf)
        * (v(g) * (v(vrf) - v(vrt)) - v(b) * (v(vif) - v(vit)) - v(bsh) * v(vif));
    let ifi = v(txf)
        * (v(g) * (v(vif) - v(vit)) + v(b) * (v(vrf) - v(vrt)) + v(bsh) * v(vrf));
    let itr = v(txf)
        * (v(g) * (v(vrt) - v(vrf)) - v(b) * (v(vit) - v(vif)) - v(bsh) * v(vit));
    let iti = v(txf)
        * (v(g) * (v(vit) - v(vif)) + v(b) * (v(vrt) - v(vrf)) + v(bsh) * v(vrt));

    set.set_lagrangian(v(lrf) * ifr + v(lif) * ifi + v(lrt) * itr + v(lit) * iti);
    set.compile()
}

/// General two-port branch with an explicit 2x2 complex admittance.
/// Constants: [gff, bff, gft, bft, gtf, btf, gtt, btt, txf].
///
/// Covers transformers (off-nominal tap and phase shift fold into the
/// four admittance blocks), regulators, and closed switches/fuses.
fn two_port() -> SolverResult<CompiledModel> {
    let mut set = ModelEquationSet::new("two_port");
    let gff = set.constant("gff");
    let bff = set.constant("bff");
    let gft = set.constant("gft");
    let bft = set.constant("bft");
    let gtf = set.constant("gtf");
    let btf = set.constant("btf");
    let gtt = set.constant("gtt");
    let btt = set.constant("btt");
    let txf = set.constant("txf");
    let vrf = set.primal("Vrf");
    let vif = set.primal("Vif");
    let vrt = set.primal("Vrt");
    let vit = set.primal("Vit");
    let lrf = set.dual_for("lrf", vrf);
    let lif = set.dual_for("lif", vif);
    let lrt = set.dual_for("lrt", vrt);
    let lit = set.dual_for("lit", vit);

    let ifr = v(txf)
        * (v(gff) * v(vrf) - v(bff) * v(vif) + v(gft) * v(vrt) - v(bft) * v(vit));
    let ifi = v(txf)
        * (v(gff) * v(vif) + v(bff) * v(vrf) + v(gft) * v(vit) + v(bft) * v(vrt));
    let itr = v(txf)
        * (v(gtf) * v(vrf) - v(btf) * v(vif) + v(gtt) * v(vrt) - v(btt) * v(vit));
    let iti = v(txf)
        * (v(gtf) * v(vif) + v(btf) * v(vrf) + v(gtt) * v(vit) + v(btt) * v(vrt));

    set.set_lagrangian(v(lrf) * ifr + v(lif) * ifi + v(lrt) * itr + v(lit) * iti);
    set.compile()
}

/// Constant-power load. Constants: [P, Q].
///
/// I = conj((P+jQ)/V), contributed with + sign (current leaves the bus).
fn pq_load() -> SolverResult<CompiledModel> {
    let mut set = ModelEquationSet::new("pq_load");
    let p = set.constant("P");
    let q = set.constant("Q");
    let vr = set.primal("Vr");
    let vi = set.primal("Vi");
    let lr = set.dual_for("lr", vr);
    let li = set.dual_for("li", vi);

    let vmag2 = v(vr) * v(vr) + v(vi) * v(vi);
    let ilr = (v(p) * v(vr) + v(q) * v(vi)) / vmag2.clone();
    let ili = (v(p) * v(vi) - v(q) * v(vr)) / vmag2;

    set.set_lagrangian(v(lr) * ilr + v(li) * ili);
    set.compile()
}

/// PV generator. Constants: [P, Vset2].
///
/// Injects P plus a solved reactive power Q, and pins the squared voltage
/// magnitude to the setpoint through the row paired with Q.
fn generator_pv() -> SolverResult<CompiledModel> {
    let mut set = ModelEquationSet::new("generator_pv");
    let p = set.constant("P");
    let vset2 = set.constant("Vset2");
    let vr = set.primal("Vr");
    let vi = set.primal("Vi");
    let q = set.primal("Q");
    let lr = set.dual_for("lr", vr);
    let li = set.dual_for("li", vi);
    let lq = set.dual_for("lq", q);

    let vmag2 = v(vr) * v(vr) + v(vi) * v(vi);
    let igr = (v(p) * v(vr) + v(q) * v(vi)) / vmag2.clone();
    let igi = (v(p) * v(vi) - v(q) * v(vr)) / vmag2.clone();

    set.set_lagrangian(
        v(lr) * (-igr) + v(li) * (-igi) + v(lq) * (vmag2 - v(vset2)),
    );
    set.compile()
}

/// Generator with both powers fixed, used after a Q-limit trip.
/// Constants: [P, Qfix]. The Q variable stays allocated; its row becomes
/// Q − Qfix = 0 so the system shape never changes across switches.
fn generator_qfixed() -> SolverResult<CompiledModel> {
    let mut set = ModelEquationSet::new("generator_qfixed");
    let p = set.constant("P");
    let qfix = set.constant("Qfix");
    let vr = set.primal("Vr");
    let vi = set.primal("Vi");
    let q = set.primal("Q");
    let lr = set.dual_for("lr", vr);
    let li = set.dual_for("li", vi);
    let lq = set.dual_for("lq", q);

    let vmag2 = v(vr) * v(vr) + v(vi) * v(vi);
    let igr = (v(p) * v(vr) + v(q) * v(vi)) / vmag2.clone();
    let igi = (v(p) * v(vi) - v(q) * v(vr)) / vmag2;

    set.set_lagrangian(
        v(lr) * (-igr) + v(li) * (-igi) + v(lq) * (v(q) - v(qfix)),
    );
    set.compile()
}

/// Slack source. Constants: [Vset_r, Vset_i].
///
/// Holds the bus voltage at the setpoint and solves the injected current
/// Isr+jIsi, which enters the KCL rows with − sign.
fn slack() -> SolverResult<CompiledModel> {
    let mut set = ModelEquationSet::new("slack");
    let vset_r = set.constant("Vset_r");
    let vset_i = set.constant("Vset_i");
    let vr = set.primal("Vr");
    let vi = set.primal("Vi");
    let isr = set.primal("Isr");
    let isi = set.primal("Isi");
    let lr = set.dual_for("lr", vr);
    let li = set.dual_for("li", vi);
    let lsr = set.dual_for("lsr", isr);
    let lsi = set.dual_for("lsi", isi);

    set.set_lagrangian(
        v(lr) * (-v(isr))
            + v(li) * (-v(isi))
            + v(lsr) * (v(vr) - v(vset_r))
            + v(lsi) * (v(vi) - v(vset_i)),
    );
    set.compile()
}

/// Fixed shunt susceptance. Constants: [b]. I = jb·V leaving the bus.
fn shunt() -> SolverResult<CompiledModel> {
    let mut set = ModelEquationSet::new("shunt");
    let b = set.constant("b");
    let vr = set.primal("Vr");
    let vi = set.primal("Vi");
    let lr = set.dual_for("lr", vr);
    let li = set.dual_for("li", vi);

    set.set_lagrangian(v(lr) * (-(v(b) * v(vi))) + v(li) * (v(b) * v(vr)));
    set.compile()
}

/// Per-bus infeasibility current with an L2 objective. No constants.
///
/// L = Iir² + Iii² + Iir·λr + Iii·λi. The λ terms add the slack current
/// to the bus KCL equations; the Iir/Iii stationarity rows 2I + λ = 0
/// drive the current to zero wherever the network is feasible. Only
/// meaningful with multipliers enabled.
fn infeasibility() -> SolverResult<CompiledModel> {
    let mut set = ModelEquationSet::new("infeasibility");
    let vr = set.primal("Vr");
    let vi = set.primal("Vi");
    let iir = set.primal("Iir");
    let iii = set.primal("Iii");
    let lr = set.dual_for("lr", vr);
    let li = set.dual_for("li", vi);

    set.set_lagrangian(
        v(iir) * v(iir) + v(iii) * v(iii) + v(iir) * v(lr) + v(iii) * v(li),
    );
    set.compile()
}

/// All built-in compiled models. Compiled once per process.
#[derive(Debug, Clone)]
pub struct ModelLibrary {
    pub pi_line: CompiledModel,
    pub two_port: CompiledModel,
    pub pq_load: CompiledModel,
    pub generator_pv: CompiledModel,
    pub generator_qfixed: CompiledModel,
    pub slack: CompiledModel,
    pub shunt: CompiledModel,
    pub infeasibility: CompiledModel,
}

impl ModelLibrary {
    fn build() -> SolverResult<ModelLibrary> {
        Ok(ModelLibrary {
            pi_line: pi_line()?,
            two_port: two_port()?,
            pq_load: pq_load()?,
            generator_pv: generator_pv()?,
            generator_qfixed: generator_qfixed()?,
            slack: slack()?,
            shunt: shunt()?,
            infeasibility: infeasibility()?,
        })
    }

    pub fn get() -> SolverResult<&'static ModelLibrary> {
        static LIBRARY: OnceLock<SolverResult<ModelLibrary>> = OnceLock::new();
        match LIBRARY.get_or_init(ModelLibrary::build) {
            Ok(lib) => Ok(lib),
            Err(e) => Err(e.clone()),
        }
    }
}
