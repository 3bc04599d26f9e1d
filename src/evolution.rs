//! AURA recursive evolution engine.
//!
//! Generational genetic search over circuit organisms: batched synthetic
//! evaluation, Φ-guided selection with elitism, parameter mutation, and
//! convergence tracking. The engine owns all run state; a single caller
//! drives one evolution at a time per instance.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::consistency;
use crate::constants::{
    CONVERGENCE_WINDOW, DEFAULT_SHOTS, DEPTH_MUTATION_MAGNITUDE, DEPTH_MUTATION_RATE,
    EVAL_BATCH_SIZE, LAMBDA_PHI_MUTATION_MAGNITUDE, LAMBDA_PHI_MUTATION_RATE, MAX_DEPTH,
    MAX_QUBITS, MIN_DEPTH, MIN_QUBITS, QUBIT_MUTATION_MAGNITUDE, QUBIT_MUTATION_RATE,
    TOPOLOGY_MUTATION_RATE,
};
use crate::error::EngineError;
use crate::organism::{Organism, OrganismParams};
use crate::simulator::{self, ExecutionResult};

/// Durable store for organisms, keyed by organism id. Upserts must be
/// idempotent: calling twice with the same id and an updated fitness is safe.
pub trait OrganismRepository: Send {
    fn upsert(&self, organism: &Organism) -> Result<(), Box<dyn Error>>;
}

/// Optional fire-and-forget instrumentation. Failures are logged by the
/// engine and never abort evolution.
pub trait MetricSink: Send {
    fn record(&self, name: &str, value: f64, tags: &serde_json::Value)
        -> Result<(), Box<dyn Error>>;
}

/// Immutable evolution parameters, supplied at engine construction
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolutionConfig {
    /// Φ the search converges toward
    pub phi_target: f64,
    pub max_generations: usize,
    pub population_size: usize,
    /// Declared overall mutation pressure; the individual strategies carry
    /// their own per-strategy probabilities
    pub mutation_rate: f64,
    /// Fraction of the population retained as parents
    pub selection_pressure: f64,
    /// Minimum trailing-window Φ improvement required to keep evolving
    pub convergence_threshold: f64,
    /// Shots per synthetic execution
    pub shots: u64,
    /// Master RNG seed; `None` draws from entropy
    pub seed: Option<u64>,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            phi_target: 6.5,
            max_generations: 20,
            population_size: 8,
            mutation_rate: 0.3,
            selection_pressure: 0.5,
            convergence_threshold: 0.01,
            shots: DEFAULT_SHOTS,
            seed: None,
        }
    }
}

impl EvolutionConfig {
    /// Fail fast on out-of-range configuration; values are never clamped
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.phi_target <= 0.0 {
            return Err(EngineError::Contract(format!(
                "phi_target must be > 0, got {}",
                self.phi_target
            )));
        }
        if self.max_generations == 0 {
            return Err(EngineError::Contract(
                "max_generations must be > 0".to_string(),
            ));
        }
        if self.population_size == 0 {
            return Err(EngineError::Contract(
                "population_size must be > 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.mutation_rate) {
            return Err(EngineError::Contract(format!(
                "mutation_rate must be in [0, 1], got {}",
                self.mutation_rate
            )));
        }
        if self.selection_pressure <= 0.0 || self.selection_pressure > 1.0 {
            return Err(EngineError::Contract(format!(
                "selection_pressure must be in (0, 1], got {}",
                self.selection_pressure
            )));
        }
        if self.shots == 0 {
            return Err(EngineError::Contract("shots must be > 0".to_string()));
        }
        Ok(())
    }
}

/// Engine lifecycle phase
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvolutionPhase {
    Uninitialized,
    Initialized,
    Evolving,
    /// Trailing-window Φ improvement fell below the threshold
    Converged,
    /// Best Φ reached the configured target
    TargetReached,
    /// Generation budget spent (or the run was interrupted)
    Exhausted,
}

impl EvolutionPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            EvolutionPhase::Converged | EvolutionPhase::TargetReached | EvolutionPhase::Exhausted
        )
    }
}

/// Run state, owned exclusively by the engine
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EvolutionState {
    pub generation: u32,
    /// Running maximum of per-generation best Φ
    pub best_phi: f64,
    pub best_organism: Option<Organism>,
    pub population: Vec<Organism>,
    /// One best-Φ entry per completed generation; non-decreasing
    pub convergence_history: Vec<f64>,
}

/// AURA evolution engine
pub struct AuraEngine {
    config: EvolutionConfig,
    phase: EvolutionPhase,
    state: Option<EvolutionState>,
    repository: Box<dyn OrganismRepository>,
    metrics: Option<Box<dyn MetricSink>>,
    interrupt: Option<Arc<AtomicBool>>,
    rng: StdRng,
}

impl AuraEngine {
    pub fn new(
        config: EvolutionConfig,
        repository: Box<dyn OrganismRepository>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            config,
            phase: EvolutionPhase::Uninitialized,
            state: None,
            repository,
            metrics: None,
            interrupt: None,
            rng,
        })
    }

    pub fn with_metrics(mut self, metrics: Box<dyn MetricSink>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Cooperative cancellation: the flag is inspected between generations,
    /// never inside a batch. An interrupted run terminates as `Exhausted`.
    pub fn with_interrupt_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(flag);
        self
    }

    pub fn config(&self) -> &EvolutionConfig {
        &self.config
    }

    pub fn phase(&self) -> EvolutionPhase {
        self.phase
    }

    pub fn state(&self) -> Option<&EvolutionState> {
        self.state.as_ref()
    }

    /// Populate generation 0: the seed organism first if given, the rest
    /// synthesized with randomized structural parameters
    pub fn initialize(&mut self, seed_organism: Option<Organism>) -> Result<(), EngineError> {
        let mut population = Vec::with_capacity(self.config.population_size);
        if let Some(seed) = seed_organism {
            population.push(seed);
        }

        for i in population.len()..self.config.population_size {
            let mut params = OrganismParams::new(
                format!("CHRONOS_G0_{}", i),
                self.rng.gen_range(5..=7),
                self.rng.gen_range(8..=12),
            );
            params.phi_target = self.config.phi_target;
            population.push(Organism::new(params, &mut self.rng)?);
        }

        log::info!("AURA engine initialized with {} organisms", population.len());

        self.state = Some(EvolutionState {
            generation: 0,
            best_phi: 0.0,
            best_organism: None,
            population,
            convergence_history: Vec::new(),
        });
        self.phase = EvolutionPhase::Initialized;
        Ok(())
    }

    /// Run the evolution loop to one of its three terminal states.
    ///
    /// An evaluation failure aborts the whole call (partial-generation state
    /// is not a defined recovery point). The terminal repository write is
    /// best-effort: its failure is logged and does not change the terminal
    /// state already reached.
    pub fn evolve(&mut self) -> Result<&EvolutionState, EngineError> {
        match self.phase {
            EvolutionPhase::Uninitialized => return Err(EngineError::NotInitialized),
            phase if phase.is_terminal() => return Err(EngineError::Finished(phase)),
            _ => {}
        }
        self.phase = EvolutionPhase::Evolving;

        log::info!(
            "Starting AURA evolution: {} generations, population {}, Φ target {}",
            self.config.max_generations,
            self.config.population_size,
            self.config.phi_target
        );

        for round in 0..self.config.max_generations {
            if self.interrupted() {
                log::warn!("Interrupt flag set, stopping evolution after generation {}", round);
                self.phase = EvolutionPhase::Exhausted;
                break;
            }

            let results = self.evaluate_population()?;
            self.update_best(&results);

            let state = self.state.as_ref().ok_or(EngineError::NotInitialized)?;
            log::info!(
                "Generation {}: best Φ = {:.4}",
                state.generation,
                state.best_phi
            );
            self.record_metric("best_phi", state.best_phi);

            if self.converged() {
                log::info!("Convergence achieved at generation round {}", round + 1);
                self.phase = EvolutionPhase::Converged;
                break;
            }

            let best_phi = self
                .state
                .as_ref()
                .map(|s| s.best_phi)
                .unwrap_or(0.0);
            if best_phi >= self.config.phi_target {
                log::info!(
                    "Target Φ={} achieved with Φ={:.4}",
                    self.config.phi_target,
                    best_phi
                );
                self.phase = EvolutionPhase::TargetReached;
                break;
            }

            self.next_generation()?;
        }

        if self.phase == EvolutionPhase::Evolving {
            self.phase = EvolutionPhase::Exhausted;
        }

        self.persist_best();
        self.state.as_ref().ok_or(EngineError::NotInitialized)
    }

    /// Evolution summary for display
    pub fn format_summary(&self) -> String {
        let Some(state) = &self.state else {
            return "Evolution not started".to_string();
        };

        let tail: Vec<String> = state
            .convergence_history
            .iter()
            .rev()
            .take(CONVERGENCE_WINDOW)
            .rev()
            .map(|phi| format!("{:.3}", phi))
            .collect();

        format!(
            "AURA Evolution Summary\n\
             ======================\n\
             Phase: {:?}\n\
             Generations: {}\n\
             Best Φ: {:.4}\n\
             Target Φ: {}\n\
             Best Organism: {}\n\
             Fitness: {}\n\
             Convergence: {}",
            self.phase,
            state.generation,
            state.best_phi,
            self.config.phi_target,
            state
                .best_organism
                .as_ref()
                .map(|o| o.name.as_str())
                .unwrap_or("N/A"),
            state
                .best_organism
                .as_ref()
                .and_then(|o| o.fitness)
                .map(|f| format!("{:.2}", f))
                .unwrap_or_else(|| "N/A".to_string()),
            tail.join(" → "),
        )
    }

    fn interrupted(&self) -> bool {
        self.interrupt
            .as_ref()
            .map(|flag| flag.load(Ordering::Relaxed))
            .unwrap_or(false)
    }

    /// Evaluate the current population in fixed-size batches.
    ///
    /// Per-organism RNG seeds are drawn from the master generator before the
    /// batch is dispatched, so parallel completion order never affects
    /// results; results merge back by organism id, not batch position.
    fn evaluate_population(&mut self) -> Result<HashMap<String, ExecutionResult>, EngineError> {
        let shots = self.config.shots;
        let state = self.state.as_ref().ok_or(EngineError::NotInitialized)?;
        let mut results = HashMap::new();

        for batch in state.population.chunks(EVAL_BATCH_SIZE) {
            let seeds: Vec<u64> = batch.iter().map(|_| self.rng.gen()).collect();

            let batch_results: Result<Vec<(String, ExecutionResult)>, EngineError> = batch
                .par_iter()
                .zip(seeds.par_iter())
                .map(|(organism, &seed)| {
                    // Validation gate: a failed report is advisory, not fatal
                    let report = consistency::check(organism);
                    if !report.passed {
                        log::warn!(
                            "Organism {} failed consistency check ({} errors)",
                            organism.name,
                            report.errors.len()
                        );
                    }

                    let mut rng = StdRng::seed_from_u64(seed);
                    simulator::evaluate(organism, shots, &mut rng)
                        .map(|result| (organism.id.clone(), result))
                })
                .collect();

            for (id, result) in batch_results? {
                results.insert(id, result);
            }
        }

        let state = self.state.as_mut().ok_or(EngineError::NotInitialized)?;
        for organism in &mut state.population {
            if let Some(result) = results.get(&organism.id) {
                organism.fitness = Some(result.fitness);
            }
        }

        Ok(results)
    }

    /// Running-max best update: elitism carries the champion forward, so the
    /// convergence history never regresses even though re-evaluation of the
    /// elite is stochastic
    fn update_best(&mut self, results: &HashMap<String, ExecutionResult>) {
        let Some(state) = self.state.as_mut() else {
            return;
        };

        for organism in &state.population {
            if let Some(result) = results.get(&organism.id) {
                if result.phi > state.best_phi || state.best_organism.is_none() {
                    state.best_phi = result.phi;
                    state.best_organism = Some(organism.clone());
                }
            }
        }

        state.convergence_history.push(state.best_phi);
    }

    fn converged(&self) -> bool {
        let Some(state) = &self.state else {
            return false;
        };
        let history = &state.convergence_history;
        if history.len() < CONVERGENCE_WINDOW {
            return false;
        }

        let window = &history[history.len() - CONVERGENCE_WINDOW..];
        window[window.len() - 1] - window[0] < self.config.convergence_threshold
    }

    /// Elitism plus mutated offspring of the top-ranked parents
    fn next_generation(&mut self) -> Result<(), EngineError> {
        let population_size = self.config.population_size;
        let parent_count =
            ((population_size as f64 * self.config.selection_pressure).ceil() as usize).max(1);

        let state = self.state.as_ref().ok_or(EngineError::NotInitialized)?;
        let next_gen_index = state.generation + 1;

        let mut next = Vec::with_capacity(population_size);
        if let Some(best) = &state.best_organism {
            next.push(best.clone());
        }

        // Stable sort: fitness ties resolve by population order
        let mut ranked: Vec<&Organism> = state.population.iter().collect();
        ranked.sort_by(|a, b| {
            b.fitness
                .unwrap_or(0.0)
                .partial_cmp(&a.fitness.unwrap_or(0.0))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let parents = &ranked[..parent_count.min(ranked.len())];

        let mut offspring = Vec::new();
        while next.len() + offspring.len() < population_size {
            let parent = parents[self.rng.gen_range(0..parents.len())];
            let child = mutate(parent, next_gen_index, &mut self.rng)?;
            offspring.push(child);
        }

        next.append(&mut offspring);

        let state = self.state.as_mut().ok_or(EngineError::NotInitialized)?;
        state.generation = next_gen_index;
        state.population = next;
        Ok(())
    }

    /// Best-effort terminal persistence and instrumentation
    fn persist_best(&self) {
        let Some(best) = self.state.as_ref().and_then(|s| s.best_organism.as_ref()) else {
            return;
        };

        if let Err(e) = self.repository.upsert(best) {
            log::warn!("Failed to persist best organism {}: {}", best.id, e);
        } else {
            log::info!("Persisted best organism {}", best.name);
        }

        if let Some(fitness) = best.fitness {
            self.record_metric("fitness", fitness);
        }
    }

    fn record_metric(&self, name: &str, value: f64) {
        let Some(sink) = &self.metrics else {
            return;
        };
        let (generation, organism_id) = self
            .state
            .as_ref()
            .map(|s| {
                (
                    s.generation,
                    s.best_organism.as_ref().map(|o| o.id.clone()),
                )
            })
            .unwrap_or((0, None));

        let tags = serde_json::json!({
            "generation": generation,
            "organism_id": organism_id,
        });
        if let Err(e) = sink.record(name, value, &tags) {
            log::warn!("Metric sink failed for {}: {}", name, e);
        }
    }
}

/// Mutate a parent into an offspring.
///
/// Four independent strategies, each with its own probability: depth shift
/// (±2, p=0.3), qubit shift (±1, p=0.2), ΛΦ perturbation (±2.5%, p=0.1),
/// and topology rewiring (p=0.4, currently without structural effect). The
/// offspring's circuit is synthesized fresh from the mutated parameters.
fn mutate<R: Rng>(parent: &Organism, generation: u32, rng: &mut R) -> Result<Organism, EngineError> {
    let mut qubits = parent.qubits as i64;
    let mut depth = parent.depth as i64;
    let mut lambda_phi = parent.lambda_phi;

    if rng.gen::<f64>() < DEPTH_MUTATION_RATE {
        depth += rng.gen_range(-DEPTH_MUTATION_MAGNITUDE..=DEPTH_MUTATION_MAGNITUDE);
        depth = depth.clamp(MIN_DEPTH as i64, MAX_DEPTH as i64);
    }

    if rng.gen::<f64>() < QUBIT_MUTATION_RATE {
        qubits += rng.gen_range(-QUBIT_MUTATION_MAGNITUDE..=QUBIT_MUTATION_MAGNITUDE);
        qubits = qubits.clamp(MIN_QUBITS as i64, MAX_QUBITS as i64);
    }

    if rng.gen::<f64>() < LAMBDA_PHI_MUTATION_RATE {
        lambda_phi *= 1.0 + (rng.gen::<f64>() - 0.5) * LAMBDA_PHI_MUTATION_MAGNITUDE;
    }

    // Topology rewiring is reserved: the roll is consumed for parity with
    // the strategy table, but the synthesizer still emits the fixed
    // chain-plus-loop shape
    let _ = rng.gen::<f64>() < TOPOLOGY_MUTATION_RATE;

    let mut params = OrganismParams::new(
        format!("CHRONOS_G{}_{}", generation, &parent.id[parent.id.len() - 4..]),
        qubits as usize,
        depth as usize,
    );
    params.phi_target = parent.phi_target;
    params.lambda_phi = lambda_phi;
    params.generation = generation;
    params.parent_id = Some(parent.id.clone());

    Organism::new(params, rng)
}
