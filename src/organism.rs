//! Circuit organisms: candidate designs under evolutionary search.
//!
//! An organism is fully described by its structural parameters
//! (qubits, depth, ΛΦ); the circuit is synthesized deterministically from
//! them, so mutating a parameter and re-synthesizing always yields a
//! consistent organism.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::circuit::{self, Circuit};
use crate::constants::{LAMBDA_PHI, MIN_DEPTH, MIN_QUBITS, PHI_THRESHOLD};
use crate::error::EngineError;

/// A candidate circuit design
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Organism {
    pub id: String,
    pub name: String,
    pub version: u32,
    pub qubits: usize,
    pub depth: usize,
    pub circuit: Circuit,
    pub phi_target: f64,
    /// ΛΦ coupling constant; nominal value unless mutated
    pub lambda_phi: f64,
    pub generation: u32,
    pub parent_id: Option<String>,
    /// Composite score in [0, 100]; `None` until first evaluation
    pub fitness: Option<f64>,
}

/// Construction parameters for a new organism
#[derive(Clone, Debug)]
pub struct OrganismParams {
    pub name: String,
    pub qubits: usize,
    pub depth: usize,
    pub phi_target: f64,
    pub lambda_phi: f64,
    pub generation: u32,
    pub parent_id: Option<String>,
}

impl OrganismParams {
    pub fn new(name: impl Into<String>, qubits: usize, depth: usize) -> Self {
        Self {
            name: name.into(),
            qubits,
            depth,
            phi_target: PHI_THRESHOLD,
            lambda_phi: LAMBDA_PHI,
            generation: 0,
            parent_id: None,
        }
    }
}

impl Organism {
    /// Create an organism, synthesizing its circuit.
    ///
    /// Fails fast on out-of-range structural parameters; values are never
    /// clamped here (mutation clamps before calling).
    pub fn new<R: Rng>(params: OrganismParams, rng: &mut R) -> Result<Self, EngineError> {
        if params.qubits < MIN_QUBITS {
            return Err(EngineError::Contract(format!(
                "qubits must be >= {}, got {}",
                MIN_QUBITS, params.qubits
            )));
        }
        if params.depth < MIN_DEPTH {
            return Err(EngineError::Contract(format!(
                "depth must be >= {}, got {}",
                MIN_DEPTH, params.depth
            )));
        }
        if params.phi_target <= 0.0 {
            return Err(EngineError::Contract(format!(
                "phi_target must be > 0, got {}",
                params.phi_target
            )));
        }

        let circuit = circuit::synthesize(params.qubits, params.depth, params.lambda_phi);

        Ok(Self {
            id: generate_id(rng),
            name: params.name,
            version: 1,
            qubits: params.qubits,
            depth: params.depth,
            circuit,
            phi_target: params.phi_target,
            lambda_phi: params.lambda_phi,
            generation: params.generation,
            parent_id: params.parent_id,
            fitness: None,
        })
    }

    /// One-line display summary
    pub fn format_line(&self) -> String {
        format!(
            "{} gen={} q={} d={} λΦ={:.4e} fit={}",
            self.name,
            self.generation,
            self.qubits,
            self.depth,
            self.lambda_phi,
            self.fitness
                .map(|f| format!("{:.2}", f))
                .unwrap_or_else(|| "N/A".to_string()),
        )
    }
}

/// Generate an opaque organism id: millisecond timestamp plus a random
/// base-36 suffix
fn generate_id<R: Rng>(rng: &mut R) -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let suffix: String = (0..7)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    format!("org_{}_{}", millis, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_new_organism_has_synthesized_circuit() {
        let mut rng = StdRng::seed_from_u64(42);
        let org = Organism::new(OrganismParams::new("CHRONOS_TEST", 5, 8), &mut rng).unwrap();

        assert_eq!(org.qubits, 5);
        assert_eq!(org.depth, 8);
        assert_eq!(org.circuit.init.len(), 5);
        assert_eq!(org.generation, 0);
        assert!(org.parent_id.is_none());
        assert!(org.fitness.is_none());
        assert!(org.id.starts_with("org_"));
    }

    #[test]
    fn test_rejects_out_of_range_parameters() {
        let mut rng = StdRng::seed_from_u64(42);

        assert!(Organism::new(OrganismParams::new("bad", 2, 8), &mut rng).is_err());
        assert!(Organism::new(OrganismParams::new("bad", 5, 3), &mut rng).is_err());

        let mut params = OrganismParams::new("bad", 5, 8);
        params.phi_target = 0.0;
        assert!(Organism::new(params, &mut rng).is_err());
    }

    #[test]
    fn test_identical_parameters_give_identical_circuits() {
        let mut rng = StdRng::seed_from_u64(7);
        let a = Organism::new(OrganismParams::new("a", 6, 10), &mut rng).unwrap();
        let b = Organism::new(OrganismParams::new("b", 6, 10), &mut rng).unwrap();

        assert_ne!(a.id, b.id);
        assert_eq!(a.circuit, b.circuit);
    }

    #[test]
    fn test_serde_round_trip() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut org = Organism::new(OrganismParams::new("CHRONOS_RT", 5, 8), &mut rng).unwrap();
        org.fitness = Some(73.25);

        let json = serde_json::to_string(&org).unwrap();
        let back: Organism = serde_json::from_str(&json).unwrap();

        assert_eq!(back.id, org.id);
        assert_eq!(back.circuit, org.circuit);
        assert_eq!(back.fitness, org.fitness);
        assert_eq!(back.lambda_phi, org.lambda_phi);
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let mut rng = StdRng::seed_from_u64(1);
        let a = generate_id(&mut rng);
        let b = generate_id(&mut rng);
        assert_ne!(a, b);
    }
}
