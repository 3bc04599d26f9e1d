//! ΛΦ consistency checking.
//!
//! Validates an organism's circuit structure independently of its fitness:
//! entanglement coverage, phase encoding accuracy, an estimated fidelity
//! budget, coupling-constant bounds, and graph-level topology integrity.
//! The report is a normal return value, not an error: callers branch on
//! `passed` explicitly.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};

use crate::circuit::Circuit;
use crate::constants::{
    DECOHERENCE_PER_DEPTH, IDEAL_EDGES_PER_QUBIT, LAMBDA_PHI_MAX, LAMBDA_PHI_MIN,
    LAMBDA_PHI_PHASE_SCALE, MAX_CRITICAL_PATHS, MAX_PATH_START_QUBITS, MAX_PHASE_DEVIATION,
    MIN_ENTANGLEMENT_SCORE, MIN_FIDELITY_THRESHOLD, SINGLE_QUBIT_ERROR_RATE,
    TWO_QUBIT_ERROR_RATE,
};
use crate::organism::Organism;

/// Boolean verdicts of the five checks
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct ConsistencyChecks {
    pub entanglement_preserved: bool,
    pub phase_preserved: bool,
    pub fidelity_threshold_met: bool,
    pub lambda_phi_coupling_valid: bool,
    pub topology_integrity: bool,
}

impl ConsistencyChecks {
    fn all(&self) -> bool {
        self.entanglement_preserved
            && self.phase_preserved
            && self.fidelity_threshold_met
            && self.lambda_phi_coupling_valid
            && self.topology_integrity
    }

    fn failed_count(&self) -> usize {
        [
            self.entanglement_preserved,
            self.phase_preserved,
            self.fidelity_threshold_met,
            self.lambda_phi_coupling_valid,
            self.topology_integrity,
        ]
        .iter()
        .filter(|&&ok| !ok)
        .count()
    }
}

/// Numeric metrics backing each check
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct ConsistencyMetrics {
    pub entanglement_score: f64,
    pub phase_deviation: f64,
    pub estimated_fidelity: f64,
    pub lambda_phi_coupling: f64,
    pub topology_score: f64,
}

/// Structural validation verdict over one organism's circuit
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConsistencyReport {
    pub passed: bool,
    pub checks: ConsistencyChecks,
    pub metrics: ConsistencyMetrics,
    /// Advisory, non-fatal, in check order
    pub warnings: Vec<String>,
    /// One entry per failed check, in check order
    pub errors: Vec<String>,
}

impl ConsistencyReport {
    /// Render the report for terminal display
    pub fn format(&self) -> String {
        let status = if self.passed { "✓ PASSED" } else { "✗ FAILED" };
        let mark = |ok: bool| if ok { "✓" } else { "✗" };

        let mut out = format!("Lambda-Phi Consistency Check: {}\n", status);
        out.push_str(&"=".repeat(50));
        out.push_str("\n\nChecks:\n");
        out.push_str(&format!(
            "  Entanglement Preserved:    {} (score: {:.3})\n",
            mark(self.checks.entanglement_preserved),
            self.metrics.entanglement_score
        ));
        out.push_str(&format!(
            "  Phase Preserved:           {} (deviation: {:.5})\n",
            mark(self.checks.phase_preserved),
            self.metrics.phase_deviation
        ));
        out.push_str(&format!(
            "  Fidelity Threshold Met:    {} (fidelity: {:.3})\n",
            mark(self.checks.fidelity_threshold_met),
            self.metrics.estimated_fidelity
        ));
        out.push_str(&format!(
            "  Lambda-Phi Coupling Valid: {} (coupling: {:.4})\n",
            mark(self.checks.lambda_phi_coupling_valid),
            self.metrics.lambda_phi_coupling
        ));
        out.push_str(&format!(
            "  Topology Integrity:        {} (score: {:.3})\n",
            mark(self.checks.topology_integrity),
            self.metrics.topology_score
        ));

        if !self.warnings.is_empty() {
            out.push_str("\nWarnings:\n");
            for warning in &self.warnings {
                out.push_str(&format!("  ⚠ {}\n", warning));
            }
        }
        if !self.errors.is_empty() {
            out.push_str("\nErrors:\n");
            for error in &self.errors {
                out.push_str(&format!("  ✗ {}\n", error));
            }
        }
        out
    }
}

/// Undirected entanglement graph over qubit indices, built from the
/// two-qubit gates of the entangle and integrate layers
struct EntanglementGraph {
    adjacency: Vec<BTreeSet<usize>>,
    /// Two-qubit operation count, with multiplicity (duplicate edges count)
    operation_count: usize,
}

impl EntanglementGraph {
    fn from_circuit(circuit: &Circuit, qubits: usize) -> Self {
        let mut adjacency = vec![BTreeSet::new(); qubits];
        let mut operation_count = 0;

        for (a, b) in circuit.entangling_edges() {
            if a < qubits && b < qubits {
                adjacency[a].insert(b);
                adjacency[b].insert(a);
                operation_count += 1;
            }
        }

        Self {
            adjacency,
            operation_count,
        }
    }

    /// Unique undirected edges
    fn edge_count(&self) -> usize {
        self.adjacency.iter().map(BTreeSet::len).sum::<usize>() / 2
    }

    fn degree(&self, qubit: usize) -> usize {
        self.adjacency[qubit].len()
    }

    /// Breadth-first reachability from qubit 0
    fn is_connected(&self) -> bool {
        let qubits = self.adjacency.len();
        if qubits == 0 {
            return true;
        }

        let mut visited = vec![false; qubits];
        let mut queue = VecDeque::from([0]);
        visited[0] = true;

        while let Some(node) = queue.pop_front() {
            for &neighbor in &self.adjacency[node] {
                if !visited[neighbor] {
                    visited[neighbor] = true;
                    queue.push_back(neighbor);
                }
            }
        }

        visited.iter().all(|&v| v)
    }

    /// Bounded depth-first search for Hamiltonian-like paths.
    ///
    /// Exponential in the worst case, so the search is hard-capped: at most
    /// `MAX_CRITICAL_PATHS` results, starting from at most
    /// `MAX_PATH_START_QUBITS` qubits. Best-effort diagnostic only.
    fn critical_paths(&self) -> Vec<Vec<usize>> {
        let qubits = self.adjacency.len();
        let mut paths = Vec::new();

        for start in 0..qubits.min(MAX_PATH_START_QUBITS) {
            if paths.len() >= MAX_CRITICAL_PATHS {
                break;
            }
            let mut visited = vec![false; qubits];
            visited[start] = true;
            let mut path = vec![start];
            self.path_dfs(&mut path, &mut visited, &mut paths);
        }

        paths
    }

    fn path_dfs(&self, path: &mut Vec<usize>, visited: &mut [bool], paths: &mut Vec<Vec<usize>>) {
        if paths.len() >= MAX_CRITICAL_PATHS {
            return;
        }
        if path.len() == self.adjacency.len() {
            paths.push(path.clone());
            return;
        }

        let Some(&current) = path.last() else {
            return;
        };
        for &neighbor in &self.adjacency[current] {
            if !visited[neighbor] {
                visited[neighbor] = true;
                path.push(neighbor);
                self.path_dfs(path, visited, paths);
                path.pop();
                visited[neighbor] = false;
            }
        }
    }
}

/// Check organism circuit consistency.
///
/// Pure and deterministic given the organism. `passed` is the conjunction of
/// all five checks; warnings and errors aggregate in check order.
pub fn check(organism: &Organism) -> ConsistencyReport {
    let graph = EntanglementGraph::from_circuit(&organism.circuit, organism.qubits);

    let mut checks = ConsistencyChecks::default();
    let mut metrics = ConsistencyMetrics::default();
    let mut warnings = Vec::new();
    let mut errors = Vec::new();

    // 1. Entanglement preservation
    let entanglement = check_entanglement(&organism.circuit, &graph, organism.qubits);
    checks.entanglement_preserved = entanglement.preserved;
    metrics.entanglement_score = entanglement.score;
    if !entanglement.preserved {
        errors.push(format!(
            "Entanglement score {:.3} below threshold {}",
            entanglement.score, MIN_ENTANGLEMENT_SCORE
        ));
    }
    warnings.extend(entanglement.warnings);

    // 2. Global phase preservation
    let phase = check_phase(&organism.circuit, organism.lambda_phi);
    checks.phase_preserved = phase.preserved;
    metrics.phase_deviation = phase.deviation;
    if !phase.preserved {
        errors.push(format!(
            "Phase deviation {:.5} exceeds threshold {}",
            phase.deviation, MAX_PHASE_DEVIATION
        ));
    }
    warnings.extend(phase.warnings);

    // 3. Fidelity threshold
    let fidelity = check_fidelity(&organism.circuit, organism.qubits, organism.depth);
    checks.fidelity_threshold_met = fidelity.meets_threshold;
    metrics.estimated_fidelity = fidelity.estimated_fidelity;
    if !fidelity.meets_threshold {
        errors.push(format!(
            "Estimated fidelity {:.3} below threshold {}",
            fidelity.estimated_fidelity, MIN_FIDELITY_THRESHOLD
        ));
    }
    warnings.extend(fidelity.warnings);

    // 4. Lambda-Phi coupling validity
    let coupling = check_coupling(&organism.circuit, organism.lambda_phi);
    checks.lambda_phi_coupling_valid = coupling.valid;
    metrics.lambda_phi_coupling = coupling.strength;
    if let Some(reason) = coupling.reason {
        errors.push(format!("Lambda-Phi coupling invalid: {}", reason));
    }
    warnings.extend(coupling.warnings);

    // 5. Topology integrity
    let topology = check_topology(&graph);
    checks.topology_integrity = topology.valid;
    metrics.topology_score = topology.score;
    if let Some(reason) = topology.reason {
        errors.push(format!("Topology integrity compromised: {}", reason));
    }
    warnings.extend(topology.warnings);

    ConsistencyReport {
        passed: checks.all(),
        checks,
        metrics,
        warnings,
        errors,
    }
}

struct EntanglementCheck {
    preserved: bool,
    score: f64,
    warnings: Vec<String>,
}

/// Score = two-qubit operation count (with multiplicity) over the maximum
/// possible edge count. Duplicate couplings reinforce entanglement, so they
/// count toward coverage; the deduplicated graph is what topology uses.
fn check_entanglement(
    circuit: &Circuit,
    graph: &EntanglementGraph,
    qubits: usize,
) -> EntanglementCheck {
    let mut warnings = Vec::new();

    let max_edges = (qubits * (qubits - 1)) / 2;
    let score = graph.operation_count as f64 / max_edges as f64;

    for qubit in 0..qubits {
        if graph.degree(qubit) == 0 {
            warnings.push(format!("Qubit {} is isolated (not entangled)", qubit));
        }
    }

    if circuit.entangle.len() < qubits - 1 {
        warnings.push(format!(
            "Insufficient entangle gates: {} < {} (minimum spanning tree)",
            circuit.entangle.len(),
            qubits - 1
        ));
    }

    EntanglementCheck {
        preserved: score >= MIN_ENTANGLEMENT_SCORE,
        score,
        warnings,
    }
}

struct PhaseCheck {
    preserved: bool,
    deviation: f64,
    warnings: Vec<String>,
}

fn check_phase(circuit: &Circuit, lambda_phi: f64) -> PhaseCheck {
    let mut warnings = Vec::new();

    let Some(first) = circuit.phase_twist.first() else {
        warnings.push("No phase twist layer found (Lambda-Phi rotation missing)".to_string());
        return PhaseCheck {
            preserved: false,
            deviation: 1.0,
            warnings,
        };
    };

    let expected = lambda_phi * LAMBDA_PHI_PHASE_SCALE;
    let deviation = (first.angle - expected).abs() / expected.abs();

    if deviation > MAX_PHASE_DEVIATION {
        warnings.push(format!(
            "Lambda-Phi angle mismatch: expected {:.3e}, got {:.3e}",
            expected, first.angle
        ));
    }

    if circuit.phase_twist.len() > 1 {
        warnings.push(format!(
            "Multiple phase twist entries: {} (may cause phase interference)",
            circuit.phase_twist.len()
        ));
    }

    PhaseCheck {
        preserved: deviation <= MAX_PHASE_DEVIATION,
        deviation,
        warnings,
    }
}

struct FidelityCheck {
    meets_threshold: bool,
    estimated_fidelity: f64,
    warnings: Vec<String>,
}

/// Fidelity degrades with gate count (error accumulation) and depth
/// (decoherence time); two-qubit gates dominate
fn check_fidelity(circuit: &Circuit, qubits: usize, depth: usize) -> FidelityCheck {
    let mut warnings = Vec::new();

    let single_qubit_gates = circuit.single_qubit_gate_count();
    let two_qubit_gates = circuit.two_qubit_gate_count();

    let total_error = single_qubit_gates as f64 * SINGLE_QUBIT_ERROR_RATE
        + two_qubit_gates as f64 * TWO_QUBIT_ERROR_RATE
        + depth as f64 * DECOHERENCE_PER_DEPTH;
    let estimated_fidelity = (1.0 - total_error).max(0.0);

    if two_qubit_gates > qubits * 3 {
        warnings.push(format!(
            "High two-qubit gate count: {} (may reduce fidelity)",
            two_qubit_gates
        ));
    }
    if depth > 15 {
        warnings.push(format!("High circuit depth: {} (increased decoherence)", depth));
    }
    if estimated_fidelity < MIN_FIDELITY_THRESHOLD + 0.05 {
        warnings.push(format!(
            "Estimated fidelity {:.3} near threshold (marginal)",
            estimated_fidelity
        ));
    }

    FidelityCheck {
        meets_threshold: estimated_fidelity >= MIN_FIDELITY_THRESHOLD,
        estimated_fidelity,
        warnings,
    }
}

struct CouplingCheck {
    valid: bool,
    strength: f64,
    reason: Option<String>,
    warnings: Vec<String>,
}

fn check_coupling(circuit: &Circuit, lambda_phi: f64) -> CouplingCheck {
    let mut warnings = Vec::new();

    if !(LAMBDA_PHI_MIN..=LAMBDA_PHI_MAX).contains(&lambda_phi) {
        return CouplingCheck {
            valid: false,
            strength: 0.0,
            reason: Some(format!(
                "Lambda-Phi out of physical range: {:.3e} not in [{:.3e}, {:.3e}]",
                lambda_phi, LAMBDA_PHI_MIN, LAMBDA_PHI_MAX
            )),
            warnings,
        };
    }

    let Some(first) = circuit.phase_twist.first() else {
        return CouplingCheck {
            valid: false,
            strength: 0.0,
            reason: Some("phase twist layer empty (Lambda-Phi not encoded)".to_string()),
            warnings,
        };
    };

    let strength = first.angle.abs() / (2.0 * std::f64::consts::PI);

    if strength < 0.01 {
        warnings.push(format!(
            "Weak Lambda-Phi coupling: {:.3e} (may not affect coherence)",
            strength
        ));
    }
    if strength > 0.5 {
        warnings.push(format!(
            "Strong Lambda-Phi coupling: {:.3} (may cause phase instability)",
            strength
        ));
    }

    CouplingCheck {
        valid: true,
        strength,
        reason: None,
        warnings,
    }
}

struct TopologyCheck {
    valid: bool,
    score: f64,
    reason: Option<String>,
    warnings: Vec<String>,
}

fn check_topology(graph: &EntanglementGraph) -> TopologyCheck {
    let mut warnings = Vec::new();
    let qubits = graph.adjacency.len();

    if !graph.is_connected() {
        return TopologyCheck {
            valid: false,
            score: 0.0,
            reason: Some("circuit topology is disconnected".to_string()),
            warnings,
        };
    }

    if graph.critical_paths().is_empty() {
        warnings.push("No critical path found (no single path through all qubits)".to_string());
    }

    // Reward density near 1.5 edges per qubit: denser than a spanning tree,
    // short of a full mesh
    let edges = graph.edge_count() as f64;
    let max_edges = (qubits * (qubits - 1)) as f64 / 2.0;
    let ideal_edges = qubits as f64 * IDEAL_EDGES_PER_QUBIT;
    let score = (1.0 - (edges - ideal_edges).abs() / max_edges).clamp(0.0, 1.0);

    TopologyCheck {
        valid: true,
        score,
        reason: None,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::LAMBDA_PHI;
    use crate::organism::{Organism, OrganismParams};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn organism(qubits: usize, depth: usize) -> Organism {
        let mut rng = StdRng::seed_from_u64(42);
        Organism::new(OrganismParams::new("CHRONOS_CHK", qubits, depth), &mut rng).unwrap()
    }

    #[test]
    fn test_default_five_qubit_organism_passes() {
        let report = check(&organism(5, 8));

        assert!(report.passed, "report: {}", report.format());
        assert!(report.checks.entanglement_preserved);
        assert!(report.checks.phase_preserved);
        assert!(report.checks.fidelity_threshold_met);
        assert!(report.checks.lambda_phi_coupling_valid);
        assert!(report.checks.topology_integrity);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn test_entanglement_score_counts_operations() {
        // 4 chain + 4 integrate ops over max 10 edges
        let report = check(&organism(5, 8));
        assert!((report.metrics.entanglement_score - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_unmutated_circuits_are_always_connected() {
        for qubits in 3..=10 {
            let report = check(&organism(qubits, 8));
            assert!(
                report.checks.topology_integrity,
                "disconnected at {} qubits",
                qubits
            );
        }
    }

    #[test]
    fn test_phase_deviation_zero_at_nominal_coupling() {
        let report = check(&organism(6, 8));
        assert_eq!(report.metrics.phase_deviation, 0.0);
    }

    #[test]
    fn test_out_of_range_coupling_with_empty_twist() {
        let mut org = organism(5, 8);
        org.lambda_phi = 1e-3;
        org.circuit.phase_twist.clear();

        let report = check(&org);

        assert!(!report.passed);
        assert!(!report.checks.phase_preserved);
        assert!(!report.checks.lambda_phi_coupling_valid);
        assert_eq!(report.errors.len(), 2);
        assert!(report.errors[0].contains("Phase deviation"));
        assert!(report.errors[1].contains("Lambda-Phi coupling invalid"));
    }

    #[test]
    fn test_passed_matches_check_conjunction() {
        let mut org = organism(5, 8);
        org.circuit.phase_twist.clear();

        let report = check(&org);

        assert!(!report.passed);
        assert_eq!(report.passed, report.checks.all());
        assert_eq!(report.errors.len(), report.checks.failed_count());
    }

    #[test]
    fn test_disconnected_topology_fails() {
        let mut org = organism(5, 8);
        org.circuit.entangle.clear();
        org.circuit.integrate.clear();

        let report = check(&org);

        assert!(!report.checks.topology_integrity);
        assert!(!report.checks.entanglement_preserved);
        assert!(report
            .errors
            .iter()
            .any(|e| e.contains("disconnected")));
        // Every qubit is isolated
        assert!(report
            .warnings
            .iter()
            .any(|w| w.contains("isolated")));
    }

    #[test]
    fn test_deep_wide_circuit_fails_fidelity() {
        let report = check(&organism(10, 20));

        assert!(!report.checks.fidelity_threshold_met);
        assert!(report
            .errors
            .iter()
            .any(|e| e.contains("Estimated fidelity")));
        assert!(report
            .warnings
            .iter()
            .any(|w| w.contains("High circuit depth")));
    }

    #[test]
    fn test_thin_entangle_layer_warns() {
        let mut org = organism(5, 8);
        org.circuit.entangle.pop();

        let report = check(&org);
        assert!(report
            .warnings
            .iter()
            .any(|w| w.contains("minimum spanning tree")));
    }

    #[test]
    fn test_chain_circuit_has_a_critical_path() {
        let org = organism(5, 8);
        let graph = EntanglementGraph::from_circuit(&org.circuit, org.qubits);

        let paths = graph.critical_paths();
        assert!(!paths.is_empty());
        assert!(paths.len() <= MAX_CRITICAL_PATHS);
        for path in &paths {
            assert_eq!(path.len(), 5);
        }
    }

    #[test]
    fn test_mismatched_twist_angle_fails_phase_check() {
        let mut org = organism(5, 8);
        org.circuit.phase_twist[0].angle *= 1.2;

        let report = check(&org);

        assert!(!report.checks.phase_preserved);
        assert!((report.metrics.phase_deviation - 0.2).abs() < 1e-9);
        assert!(report
            .warnings
            .iter()
            .any(|w| w.contains("angle mismatch")));
    }

    #[test]
    fn test_coupling_strength_at_nominal_lambda_phi() {
        let report = check(&organism(5, 8));
        let expected = LAMBDA_PHI * LAMBDA_PHI_PHASE_SCALE / (2.0 * std::f64::consts::PI);
        assert!((report.metrics.lambda_phi_coupling - expected).abs() < 1e-9);
    }

    #[test]
    fn test_format_report_mentions_status() {
        let report = check(&organism(5, 8));
        let rendered = report.format();
        assert!(rendered.contains("PASSED"));
        assert!(rendered.contains("Entanglement Preserved"));
    }
}
