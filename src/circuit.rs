//! Circuit synthesis.
//!
//! An organism's circuit is five ordered layers:
//!
//! - `init`: one Hadamard per qubit (superposition)
//! - `entangle`: CNOT chain 0-1-2-...-n (spanning path, connected by
//!   construction)
//! - `phase_twist`: the ΛΦ phase rotation on qubit 0
//! - `integrate`: a closing CNOT (0 ↔ n-1) plus ΛΦ-weighted controlled-RY
//!   gates between interior qubits
//! - `measure`: readout of every qubit in ascending order
//!
//! Gates are tagged variants, so downstream analysis reads operand indices
//! structurally instead of parsing a textual gate encoding.

use serde::{Deserialize, Serialize};

use crate::constants::LAMBDA_PHI_PHASE_SCALE;

/// A single gate in one of the circuit layers
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Gate {
    /// Single-qubit superposition gate
    Hadamard { qubit: usize },
    /// Two-qubit entangling gate
    Cnot { control: usize, target: usize },
    /// Two-qubit entangling rotation with a ΛΦ-derived angle
    ControlledRy {
        control: usize,
        target: usize,
        angle: f64,
    },
}

impl Gate {
    /// Operand pair of a two-qubit gate, `None` for single-qubit gates
    pub fn two_qubit_edge(&self) -> Option<(usize, usize)> {
        match *self {
            Gate::Hadamard { .. } => None,
            Gate::Cnot { control, target } => Some((control, target)),
            Gate::ControlledRy {
                control, target, ..
            } => Some((control, target)),
        }
    }
}

/// The ΛΦ phase rotation entry in the twist layer
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PhaseRotation {
    pub qubit: usize,
    pub angle: f64,
}

/// Five-layer circuit structure of an organism
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Circuit {
    pub init: Vec<Gate>,
    pub entangle: Vec<Gate>,
    pub phase_twist: Vec<PhaseRotation>,
    pub integrate: Vec<Gate>,
    pub measure: Vec<usize>,
}

impl Circuit {
    /// All two-qubit edges across the entangle and integrate layers
    pub fn entangling_edges(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.entangle
            .iter()
            .chain(self.integrate.iter())
            .filter_map(Gate::two_qubit_edge)
    }

    /// Number of single-qubit gates (fidelity budget input)
    pub fn single_qubit_gate_count(&self) -> usize {
        self.init.len()
    }

    /// Number of two-qubit gates (fidelity budget input)
    pub fn two_qubit_gate_count(&self) -> usize {
        self.entangling_edges().count()
    }
}

/// Synthesize the circuit for the given structural parameters.
///
/// Deterministic: identical `(qubits, depth, lambda_phi)` always produce
/// structurally identical circuits. Depth does not shape the layers (it only
/// enters the fidelity budget), but it is part of the contract so that an
/// organism's circuit is fully derivable from its parameters. Range checking
/// happens at organism construction, not here.
pub fn synthesize(qubits: usize, _depth: usize, lambda_phi: f64) -> Circuit {
    let twist_angle = lambda_phi * LAMBDA_PHI_PHASE_SCALE;

    let init = (0..qubits).map(|q| Gate::Hadamard { qubit: q }).collect();

    // Linear CNOT chain: a spanning path over all qubits
    let entangle = (0..qubits - 1)
        .map(|i| Gate::Cnot {
            control: i,
            target: i + 1,
        })
        .collect();

    let phase_twist = vec![PhaseRotation {
        qubit: 0,
        angle: twist_angle,
    }];

    // Close the chain into a cycle, then weighted rotations between
    // interior qubits
    let mut integrate = vec![Gate::Cnot {
        control: 0,
        target: qubits - 1,
    }];
    for i in 1..qubits - 1 {
        integrate.push(Gate::ControlledRy {
            control: i,
            target: i + 1,
            angle: twist_angle * 0.1,
        });
    }

    Circuit {
        init,
        entangle,
        phase_twist,
        integrate,
        measure: (0..qubits).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::LAMBDA_PHI;

    #[test]
    fn test_five_qubit_layer_shapes() {
        let circuit = synthesize(5, 8, LAMBDA_PHI);

        assert_eq!(circuit.init.len(), 5);
        assert_eq!(circuit.entangle.len(), 4);
        assert_eq!(circuit.phase_twist.len(), 1);
        // Closing CNOT plus 3 interior rotations
        assert_eq!(circuit.integrate.len(), 4);
        assert_eq!(circuit.measure, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_entangle_layer_is_a_path() {
        let circuit = synthesize(5, 8, LAMBDA_PHI);
        let edges: Vec<(usize, usize)> = circuit
            .entangle
            .iter()
            .filter_map(Gate::two_qubit_edge)
            .collect();
        assert_eq!(edges, vec![(0, 1), (1, 2), (2, 3), (3, 4)]);
    }

    #[test]
    fn test_twist_angle_from_lambda_phi() {
        let circuit = synthesize(5, 8, LAMBDA_PHI);
        let twist = circuit.phase_twist[0];
        assert_eq!(twist.qubit, 0);
        assert!((twist.angle - 2.176435).abs() < 1e-9);
    }

    #[test]
    fn test_integrate_closes_the_loop_with_weighted_rotations() {
        let circuit = synthesize(5, 8, LAMBDA_PHI);
        assert_eq!(
            circuit.integrate[0],
            Gate::Cnot {
                control: 0,
                target: 4
            }
        );
        let expected_weight = LAMBDA_PHI * LAMBDA_PHI_PHASE_SCALE * 0.1;
        for (i, gate) in circuit.integrate[1..].iter().enumerate() {
            match *gate {
                Gate::ControlledRy {
                    control,
                    target,
                    angle,
                } => {
                    assert_eq!(control, i + 1);
                    assert_eq!(target, i + 2);
                    assert!((angle - expected_weight).abs() < 1e-12);
                }
                ref other => panic!("Expected ControlledRy, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_synthesis_is_deterministic() {
        let a = synthesize(7, 12, LAMBDA_PHI);
        let b = synthesize(7, 12, LAMBDA_PHI);
        assert_eq!(a, b);
    }

    #[test]
    fn test_minimum_size_circuit() {
        let circuit = synthesize(3, 4, LAMBDA_PHI);
        assert_eq!(circuit.init.len(), 3);
        assert_eq!(circuit.entangle.len(), 2);
        // One closing CNOT, one interior rotation
        assert_eq!(circuit.integrate.len(), 2);
    }
}
