//! Physical constants and engine thresholds.
//!
//! ΛΦ (lambda-phi) is the memory coupling constant seeding the phase-twist
//! rotation in every synthesized circuit. The consistency thresholds mirror
//! typical superconducting-hardware error rates.

/// ΛΦ memory coupling constant (nominal value before mutation)
pub const LAMBDA_PHI: f64 = 2.176435e-8;

/// Fixed scale factor turning ΛΦ into a phase rotation angle (radians)
pub const LAMBDA_PHI_PHASE_SCALE: f64 = 1e8;

/// Physical bounds on the coupling constant
pub const LAMBDA_PHI_MIN: f64 = 1e-10;
pub const LAMBDA_PHI_MAX: f64 = 1e-5;

/// Default Φ target for a new organism
pub const PHI_THRESHOLD: f64 = 5.0;

/// Default shots per synthetic execution
pub const DEFAULT_SHOTS: u64 = 4096;

/// Structural bounds on organisms (values outside are contract violations,
/// mutation clamps to them)
pub const MIN_QUBITS: usize = 3;
pub const MAX_QUBITS: usize = 10;
pub const MIN_DEPTH: usize = 4;
pub const MAX_DEPTH: usize = 20;

// === Consistency check thresholds ===

/// Minimum entanglement connectivity ratio
pub const MIN_ENTANGLEMENT_SCORE: f64 = 0.75;

/// Maximum relative deviation of the twist angle from ΛΦ × scale
pub const MAX_PHASE_DEVIATION: f64 = 0.05;

/// Minimum estimated circuit fidelity
pub const MIN_FIDELITY_THRESHOLD: f64 = 0.85;

/// Per-gate and per-depth error rates for the fidelity estimate
/// (typical IBM hardware values)
pub const SINGLE_QUBIT_ERROR_RATE: f64 = 0.0005;
pub const TWO_QUBIT_ERROR_RATE: f64 = 0.01;
pub const DECOHERENCE_PER_DEPTH: f64 = 0.005;

/// Edge density rewarded by the topology score, in edges per qubit.
/// Denser than a spanning tree, well short of a full mesh.
pub const IDEAL_EDGES_PER_QUBIT: f64 = 1.5;

/// Hamiltonian-path probe caps (the search is exponential in the worst
/// case; these keep it a bounded best-effort diagnostic)
pub const MAX_CRITICAL_PATHS: usize = 5;
pub const MAX_PATH_START_QUBITS: usize = 3;

// === Evolution defaults ===

/// Organisms evaluated concurrently per batch (stands in for backend
/// capacity limits)
pub const EVAL_BATCH_SIZE: usize = 3;

/// Trailing window length for the convergence check
pub const CONVERGENCE_WINDOW: usize = 5;

// === Mutation strategy probabilities and magnitudes ===

pub const DEPTH_MUTATION_RATE: f64 = 0.3;
pub const DEPTH_MUTATION_MAGNITUDE: i64 = 2;

pub const QUBIT_MUTATION_RATE: f64 = 0.2;
pub const QUBIT_MUTATION_MAGNITUDE: i64 = 1;

pub const LAMBDA_PHI_MUTATION_RATE: f64 = 0.1;
pub const LAMBDA_PHI_MUTATION_MAGNITUDE: f64 = 0.05;

/// Topology rewiring strategy. Currently a structural no-op: the synthesizer
/// always emits the chain + closing-loop shape regardless of this roll.
pub const TOPOLOGY_MUTATION_RATE: f64 = 0.4;
