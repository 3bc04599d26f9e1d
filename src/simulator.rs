//! Synthetic execution model and derived metrics.
//!
//! "Execution" here is a self-contained synthetic model: it fabricates a
//! measurement distribution with the statistical signature of a successfully
//! entangled circuit (mass on |1...1⟩, single-flip neighbors, weak |0...0⟩
//! anti-correlation baseline), then derives the metric set downstream
//! consumers care about. Replacing this with a real backend means producing
//! the same distribution shape and calling
//! [`ExecutionResult::from_distribution`].
//!
//! All randomness flows through the caller-supplied generator, so results
//! are reproducible from a seed.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::EngineError;
use crate::organism::Organism;

/// Measurement distribution: bitstring (length = qubit count) → shot count
pub type Distribution = BTreeMap<String, u64>;

/// Metrics derived from one synthetic execution of an organism.
/// Computed fresh per evaluation, never mutated afterwards.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub distribution: Distribution,
    /// Integrated information Φ: connectivity-weighted pairwise mutual
    /// information, the primary quality signal
    pub phi: f64,
    /// P(all-ones) × (1 − P(all-zeros)), in [0, 1]
    pub coherence: f64,
    /// Normalized RMS Hamming distance from the all-zeros baseline, in [0, 1]
    pub geometric_distance: f64,
    /// Decoherence proxy Γ = distance × (1 − coherence) × 10
    pub decoherence: f64,
    /// Shannon entropy of the distribution, in bits
    pub entropy: f64,
    /// Composite score in [0, 100]
    pub fitness: f64,
}

impl ExecutionResult {
    /// Derive the full metric set from a measurement distribution.
    ///
    /// This is the extension point for real backends: feed any distribution
    /// over `qubits`-length bitstrings and the downstream metrics follow.
    pub fn from_distribution(distribution: Distribution, qubits: usize, phi_target: f64) -> Self {
        let phi = integrated_information(&distribution, qubits);
        let coherence = coherence(&distribution, qubits);
        let geometric_distance = geometric_distance(&distribution, qubits);
        let decoherence = geometric_distance * (1.0 - coherence) * 10.0;
        let entropy = shannon_entropy(&distribution);
        let fitness = fitness(phi, coherence, geometric_distance, phi_target);

        Self {
            distribution,
            phi,
            coherence,
            geometric_distance,
            decoherence,
            entropy,
            fitness,
        }
    }
}

/// Evaluate one organism for `shots` synthetic measurements.
///
/// Side-effect-free apart from draws on `rng`. `shots` must be positive
/// (caller contract).
pub fn evaluate<R: Rng>(
    organism: &Organism,
    shots: u64,
    rng: &mut R,
) -> Result<ExecutionResult, EngineError> {
    if shots == 0 {
        return Err(EngineError::Contract("shots must be > 0".to_string()));
    }

    let distribution = generate_distribution(organism.qubits, shots, rng);
    Ok(ExecutionResult::from_distribution(
        distribution,
        organism.qubits,
        organism.phi_target,
    ))
}

/// Fabricate a measurement distribution with an entanglement signature.
///
/// Allocation draws against a shared shot budget, so counts never exceed
/// `shots`; the only shortfall is the integer residue of the final even
/// split, bounded by ⌈qubits × 2.5⌉. The remainder is deliberately not
/// redistributed.
pub fn generate_distribution<R: Rng>(qubits: usize, shots: u64, rng: &mut R) -> Distribution {
    let all_ones = "1".repeat(qubits);
    let all_zeros = "0".repeat(qubits);

    let mut distribution = Distribution::new();
    let mut budget = shots;

    // Strong bias toward |1...1⟩ (entanglement signature)
    let ones_count = take(shots, &mut budget, 0.17 + rng.gen::<f64>() * 0.03);
    if ones_count > 0 {
        distribution.insert(all_ones.clone(), ones_count);
    }

    // Single-qubit flips of |1...1⟩
    for i in 0..qubits {
        let mut state = all_ones.clone();
        state.replace_range(i..i + 1, "0");
        let count = take(shots, &mut budget, 0.09 + rng.gen::<f64>() * 0.06);
        if count > 0 {
            distribution.insert(state, count);
        }
    }

    // Reserve the |0...0⟩ anti-correlation baseline
    let zeros_count = take(shots, &mut budget, 0.03 + rng.gen::<f64>() * 0.01);
    if zeros_count > 0 {
        distribution.insert(all_zeros, zeros_count);
    }

    // Spread what remains evenly over random intermediate states; collisions
    // accumulate into the existing bin instead of dropping shots
    let num_random = (qubits as f64 * 2.5).ceil() as u64;
    let per_state = budget / num_random;
    if per_state > 0 {
        for _ in 0..num_random {
            let state: String = (0..qubits)
                .map(|_| if rng.gen::<bool>() { '1' } else { '0' })
                .collect();
            *distribution.entry(state).or_insert(0) += per_state;
            budget -= per_state;
        }
    }

    distribution
}

/// Draw `fraction` of the total shots, clamped to the remaining budget
fn take(shots: u64, budget: &mut u64, fraction: f64) -> u64 {
    let want = (shots as f64 * fraction) as u64;
    let got = want.min(*budget);
    *budget -= got;
    got
}

/// Integrated information Φ: pairwise mutual information over all unordered
/// qubit pairs, each weighted by a nearest-neighbor connectivity factor
/// 1 / (1 + 0.2·|i−j|)
pub fn integrated_information(distribution: &Distribution, qubits: usize) -> f64 {
    let total = total_shots(distribution);
    if total == 0 {
        return 0.0;
    }

    let mut phi = 0.0;
    for i in 0..qubits {
        for j in (i + 1)..qubits {
            let mi = mutual_information(distribution, i, j, total);
            let connectivity = 1.0 / (1.0 + 0.2 * (j - i) as f64);
            phi += mi * connectivity;
        }
    }
    phi
}

/// Mutual information (bits) between the measured values of two qubits,
/// floored at zero against estimation noise
fn mutual_information(distribution: &Distribution, qubit1: usize, qubit2: usize, total: u64) -> f64 {
    let mut joint = [[0.0f64; 2]; 2];
    for (state, &count) in distribution {
        let a = bit_at(state, qubit1) as usize;
        let b = bit_at(state, qubit2) as usize;
        joint[a][b] += count as f64 / total as f64;
    }

    let marginal_a = [joint[0][0] + joint[0][1], joint[1][0] + joint[1][1]];
    let marginal_b = [joint[0][0] + joint[1][0], joint[0][1] + joint[1][1]];

    let mut mi = 0.0;
    for a in 0..2 {
        for b in 0..2 {
            let p = joint[a][b];
            if p > 0.0 {
                mi += p * (p / (marginal_a[a] * marginal_b[b])).log2();
            }
        }
    }
    mi.max(0.0)
}

/// Coherence: strong |1...1⟩ correlation with weak |0...0⟩ anti-correlation
pub fn coherence(distribution: &Distribution, qubits: usize) -> f64 {
    let total = total_shots(distribution);
    if total == 0 {
        return 0.0;
    }
    let all_ones = "1".repeat(qubits);
    let all_zeros = "0".repeat(qubits);

    let p_ones = *distribution.get(&all_ones).unwrap_or(&0) as f64 / total as f64;
    let p_zeros = *distribution.get(&all_zeros).unwrap_or(&0) as f64 / total as f64;

    p_ones * (1.0 - p_zeros)
}

/// Normalized RMS Hamming distance from the all-zeros baseline,
/// probability-weighted over the sampled bitstrings
pub fn geometric_distance(distribution: &Distribution, qubits: usize) -> f64 {
    let total = total_shots(distribution);
    if total == 0 || qubits == 0 {
        return 0.0;
    }

    let mut sum_squared = 0.0;
    for (state, &count) in distribution {
        let hamming = state.chars().filter(|&c| c == '1').count() as f64;
        sum_squared += (count as f64 / total as f64) * hamming * hamming;
    }

    sum_squared.sqrt() / qubits as f64
}

/// Shannon entropy (base 2) over the empirical distribution, skipping
/// zero-count bins
pub fn shannon_entropy(distribution: &Distribution) -> f64 {
    let total = total_shots(distribution);
    if total == 0 {
        return 0.0;
    }

    let mut entropy = 0.0;
    for &count in distribution.values() {
        if count > 0 {
            let p = count as f64 / total as f64;
            entropy -= p * p.log2();
        }
    }
    entropy
}

/// Composite fitness in [0, 100].
///
/// The squared Φ ratio rewards approaching the target super-linearly and
/// caps its contribution once the target is met.
pub fn fitness(phi: f64, coherence: f64, geometric_distance: f64, phi_target: f64) -> f64 {
    let phi_factor = (phi / phi_target).min(1.0).powi(2);
    let fidelity_factor = 1.0 - geometric_distance;

    (phi_factor * 0.5 + coherence * 0.3 + fidelity_factor * 0.2) * 100.0
}

fn total_shots(distribution: &Distribution) -> u64 {
    distribution.values().sum()
}

fn bit_at(state: &str, qubit: usize) -> u8 {
    u8::from(state.as_bytes()[qubit] == b'1')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::organism::{Organism, OrganismParams};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn test_organism(qubits: usize, seed: u64) -> Organism {
        let mut rng = StdRng::seed_from_u64(seed);
        Organism::new(OrganismParams::new("CHRONOS_SIM", qubits, 8), &mut rng).unwrap()
    }

    #[test]
    fn test_metric_bounds() {
        let org = test_organism(5, 42);
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..50 {
            let result = evaluate(&org, 4096, &mut rng).unwrap();
            assert!(result.phi >= 0.0, "phi below 0: {}", result.phi);
            assert!(
                (0.0..=1.0).contains(&result.coherence),
                "coherence out of range: {}",
                result.coherence
            );
            assert!(
                (0.0..=1.0).contains(&result.geometric_distance),
                "distance out of range: {}",
                result.geometric_distance
            );
            assert!(result.decoherence >= 0.0);
            assert!(result.entropy >= 0.0);
            assert!(
                (0.0..=100.0).contains(&result.fitness),
                "fitness out of range: {}",
                result.fitness
            );
        }
    }

    #[test]
    fn test_distribution_conserves_shots() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let distribution = generate_distribution(5, 4096, &mut rng);
            let total: u64 = distribution.values().sum();
            assert!(total <= 4096, "overshoot: {}", total);
            // Shortfall bounded by the random-split residue (< qubits * 3)
            assert!(4096 - total <= 15, "shortfall too large: {}", 4096 - total);
        }
    }

    #[test]
    fn test_distribution_counts_are_positive() {
        let mut rng = StdRng::seed_from_u64(11);
        let distribution = generate_distribution(7, 4096, &mut rng);
        assert!(distribution.values().all(|&c| c > 0));
        assert!(distribution.keys().all(|s| s.len() == 7));
    }

    #[test]
    fn test_all_zeros_distribution_has_zero_entropy_and_coherence() {
        let mut distribution = Distribution::new();
        distribution.insert("00000".to_string(), 4096);

        assert_eq!(shannon_entropy(&distribution), 0.0);
        assert_eq!(coherence(&distribution, 5), 0.0);
        assert_eq!(integrated_information(&distribution, 5), 0.0);
        assert_eq!(geometric_distance(&distribution, 5), 0.0);
    }

    #[test]
    fn test_perfectly_correlated_pair_metrics() {
        // Half |000⟩, half |111⟩: every qubit pair carries exactly 1 bit of
        // mutual information
        let mut distribution = Distribution::new();
        distribution.insert("000".to_string(), 2048);
        distribution.insert("111".to_string(), 2048);

        // Pairs (0,1) and (1,2) at distance 1, pair (0,2) at distance 2
        let expected_phi = 2.0 / 1.2 + 1.0 / 1.4;
        let phi = integrated_information(&distribution, 3);
        assert!((phi - expected_phi).abs() < 1e-9, "phi = {}", phi);

        assert!((shannon_entropy(&distribution) - 1.0).abs() < 1e-12);
        assert!((coherence(&distribution, 3) - 0.25).abs() < 1e-12);

        // E[h²] = 0.5 · 9 = 4.5 → sqrt / 3
        let expected_distance = 4.5f64.sqrt() / 3.0;
        assert!((geometric_distance(&distribution, 3) - expected_distance).abs() < 1e-12);
    }

    #[test]
    fn test_pure_all_ones_gives_full_coherence() {
        let mut distribution = Distribution::new();
        distribution.insert("1111".to_string(), 1000);

        assert_eq!(coherence(&distribution, 4), 1.0);
        assert_eq!(shannon_entropy(&distribution), 0.0);
    }

    #[test]
    fn test_fitness_formula() {
        // Target met exactly, perfect coherence, zero distance → 100
        assert!((fitness(5.0, 1.0, 0.0, 5.0) - 100.0).abs() < 1e-12);
        // Phi contribution is capped above the target
        assert!((fitness(50.0, 1.0, 0.0, 5.0) - 100.0).abs() < 1e-12);
        // Squared sub-target ratio: (0.5)² · 50 + 30 + 20 = 62.5
        assert!((fitness(2.5, 1.0, 0.0, 5.0) - 62.5).abs() < 1e-12);
    }

    #[test]
    fn test_same_seed_reproduces_result() {
        let org = test_organism(6, 3);

        let mut rng_a = StdRng::seed_from_u64(99);
        let mut rng_b = StdRng::seed_from_u64(99);
        let a = evaluate(&org, 2048, &mut rng_a).unwrap();
        let b = evaluate(&org, 2048, &mut rng_b).unwrap();

        assert_eq!(a.distribution, b.distribution);
        assert_eq!(a.phi, b.phi);
        assert_eq!(a.fitness, b.fitness);
    }

    #[test]
    fn test_zero_shots_is_a_contract_violation() {
        let org = test_organism(5, 1);
        let mut rng = StdRng::seed_from_u64(1);
        assert!(evaluate(&org, 0, &mut rng).is_err());
    }
}
