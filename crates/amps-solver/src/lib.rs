//! # amps-solver: Equivalent-Circuit Power Flow
//!
//! This crate solves AC power flow by treating the network as one large
//! nonlinear circuit in rectangular voltage coordinates. Every device is a
//! circuit component with a scalar Lagrangian; residual rows are first
//! partials of that Lagrangian and Jacobian entries are second partials,
//! derived symbolically once per component type and evaluated numerically
//! per instance each Newton pass.
//!
//! ## Pipeline
//!
//! 1. [`ModelLibrary`](models::ModelLibrary) compiles each component type's
//!    Lagrangian into residual and Jacobian evaluators ([`equations`]).
//! 2. [`PowerFlow`] walks an [`amps_core::Network`], allocates global
//!    unknowns ([`index`]), and binds one [`StampDetails`](stamp::StampDetails)
//!    per instance ([`component`]).
//! 3. [`NrSolver`](nr::NrSolver) restamps the system each iteration into a
//!    [`MatrixBuilder`](matrix::MatrixBuilder) and solves J·Δv = −F with
//!    faer's LU.
//! 4. Hard cases go through the admittance-scaling continuation
//!    ([`homotopy`]) and the Newton step limiter ([`limiter`]).
//!
//! ## Modes
//!
//! In plain power-flow mode Lagrange multipliers are never allocated and
//! each component's physical equations are routed directly to the bus KCL
//! rows. Enabling optimization allocates the multipliers and solves the
//! full KKT system with the same stamps, which is what the per-bus
//! infeasibility-current analysis builds on.
//!
//! ## Example
//!
//! ```ignore
//! use amps_core::Network;
//! use amps_solver::{PowerFlow, SolverOptions};
//!
//! let network: Network = build_network();
//! let options = SolverOptions::default().with_tx_stepping(5);
//! let report = PowerFlow::new(options).solve(&network)?;
//! assert!(report.converged);
//! ```

pub mod component;
pub mod driver;
pub mod equations;
pub mod error;
pub mod expr;
pub mod homotopy;
pub mod index;
pub mod limiter;
pub mod matrix;
pub mod models;
pub mod nr;
pub mod options;
pub mod stamp;

pub use component::{
    Branch, ConstantPowerLoad, InfeasibilitySource, NodeRegistry, PvGenerator, QLimitState,
    ShuntCapacitor, SlackSource, Stampable, G_CLOSED,
};
pub use driver::{PowerFlow, PowerFlowReport};
pub use error::{SolverError, SolverResult};
pub use homotopy::{HomotopyController, HomotopyOutcome};
pub use index::{VarIndex, VarKind, VariableIndexAllocator};
pub use limiter::VoltageLimiter;
pub use matrix::MatrixBuilder;
pub use models::ModelLibrary;
pub use nr::{NrSolver, SolveReport};
pub use options::{ConvergenceCriterion, MatrixRepr, SolverOptions};
pub use stamp::{emit_stamps, Binding, StampDetails, StampEntry};
