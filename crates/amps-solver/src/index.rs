//! Global unknown-variable index allocation.
//!
//! Every scalar unknown in the state vector gets exactly one index, issued
//! monotonically during the assign-nodes pass. Indices are never reused or
//! reassigned. There is no ambient counter: the allocator is passed by
//! mutable reference into every `assign_nodes` call.

use amps_core::BusId;
use serde::Serialize;

/// Index of one scalar unknown in the global state vector.
pub type VarIndex = usize;

/// What kind of unknown an index represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VarKind {
    /// Bus voltage, real part
    VoltageReal,
    /// Bus voltage, imaginary part
    VoltageImag,
    /// Generator reactive power
    ReactivePower,
    /// Per-device current (e.g. slack injection)
    DeviceCurrent,
    /// Bus infeasibility current (real or imaginary part)
    InfeasCurrent,
    /// Lagrange multiplier
    Dual,
}

/// Monotonic allocator for global variable indices.
///
/// Records the kind and (where applicable) the owning bus of every index so
/// the voltage-limiter mask and per-bus result extraction can be derived
/// without re-walking the component set.
#[derive(Debug, Default)]
pub struct VariableIndexAllocator {
    kinds: Vec<VarKind>,
    owners: Vec<Option<BusId>>,
}

impl VariableIndexAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue the next index for an unknown of the given kind.
    pub fn allocate(&mut self, kind: VarKind, owner: Option<BusId>) -> VarIndex {
        let ix = self.kinds.len();
        self.kinds.push(kind);
        self.owners.push(owner);
        ix
    }

    /// Total number of allocated unknowns (= state vector length).
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// Kind of a previously allocated index.
    pub fn kind(&self, ix: VarIndex) -> VarKind {
        self.kinds[ix]
    }

    /// Owning bus of a previously allocated index, when one exists.
    pub fn owner(&self, ix: VarIndex) -> Option<BusId> {
        self.owners[ix]
    }

    /// Boolean mask over the state vector marking bus-voltage coordinates.
    pub fn voltage_mask(&self) -> Vec<bool> {
        self.kinds
            .iter()
            .map(|k| matches!(k, VarKind::VoltageReal | VarKind::VoltageImag))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_allocation() {
        let mut alloc = VariableIndexAllocator::new();
        let a = alloc.allocate(VarKind::VoltageReal, Some(BusId::new(1)));
        let b = alloc.allocate(VarKind::VoltageImag, Some(BusId::new(1)));
        let c = alloc.allocate(VarKind::ReactivePower, None);
        assert_eq!((a, b, c), (0, 1, 2));
        assert_eq!(alloc.len(), 3);
        assert_eq!(alloc.kind(2), VarKind::ReactivePower);
        assert_eq!(alloc.owner(0), Some(BusId::new(1)));
        assert_eq!(alloc.owner(2), None);
    }

    #[test]
    fn test_var_kind_serializes() {
        let json = serde_json::to_string(&VarKind::VoltageReal).unwrap();
        assert_eq!(json, "\"VoltageReal\"");
    }

    #[test]
    fn test_voltage_mask() {
        let mut alloc = VariableIndexAllocator::new();
        alloc.allocate(VarKind::VoltageReal, Some(BusId::new(1)));
        alloc.allocate(VarKind::VoltageImag, Some(BusId::new(1)));
        alloc.allocate(VarKind::DeviceCurrent, None);
        alloc.allocate(VarKind::Dual, Some(BusId::new(1)));
        assert_eq!(alloc.voltage_mask(), vec![true, true, false, false]);
    }
}
