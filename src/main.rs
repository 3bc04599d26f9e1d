//! CHRONOS - Evolutionary Quantum Circuit Search
//!
//! This binary runs one evolution:
//! 1. Loads configuration (TOML file plus CLI overrides)
//! 2. Opens the organism database
//! 3. Initializes a generation-0 population
//! 4. Evolves until convergence, target Φ, or generation exhaustion
//! 5. Prints the summary and the best organism's consistency report

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use clap::Parser;
use serde::Deserialize;

use chronos::consistency;
use chronos::db::{self, SqliteStore};
use chronos::evolution::{AuraEngine, EvolutionConfig};

#[derive(Parser, Debug)]
#[command(name = "chronos")]
#[command(about = "Evolutionary search for high-Φ quantum circuit organisms")]
struct Args {
    /// Path to config file
    #[arg(short = 'c', long, default_value = "config.toml")]
    config: String,

    /// Path to organism database (overrides config)
    #[arg(short = 'd', long)]
    database: Option<String>,

    /// Maximum generations (overrides config)
    #[arg(short = 'g', long)]
    generations: Option<usize>,

    /// Population size (overrides config)
    #[arg(short = 'p', long)]
    population: Option<usize>,

    /// Target Φ (overrides config)
    #[arg(short = 't', long)]
    target: Option<f64>,

    /// Master RNG seed for a reproducible run
    #[arg(short = 's', long)]
    seed: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct Config {
    #[serde(default)]
    paths: PathsConfig,
    #[serde(default)]
    evolution: EvolutionConfig,
}

#[derive(Debug, Deserialize)]
struct PathsConfig {
    #[serde(default = "default_database")]
    database: String,
}

fn default_database() -> String {
    db::DEFAULT_DB_PATH.to_string()
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
        }
    }
}

impl Config {
    fn load(path: &str) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                eprintln!("Warning: Failed to parse {}: {}", path, e);
                Config::default()
            }),
            Err(_) => {
                eprintln!("Warning: No config file at {}, using defaults", path);
                Config::default()
            }
        }
    }
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let config = Config::load(&args.config);
    let database_path = args.database.unwrap_or(config.paths.database.clone());

    let mut evolution = config.evolution;
    if let Some(generations) = args.generations {
        evolution.max_generations = generations;
    }
    if let Some(population) = args.population {
        evolution.population_size = population;
    }
    if let Some(target) = args.target {
        evolution.phi_target = target;
    }
    if let Some(seed) = args.seed {
        evolution.seed = Some(seed);
    }

    print_banner();
    print_run_parameters(&evolution);

    println!("Initializing database at {}...", database_path);
    let conn = db::init_database(&database_path).expect("Failed to initialize database");
    println!("  Database ready");
    println!();

    let interrupt_flag = Arc::new(AtomicBool::new(false));
    setup_interrupt_handler(interrupt_flag.clone());

    let store = SqliteStore::new(conn.clone());
    let sink = SqliteStore::new(conn);

    let mut engine = AuraEngine::new(evolution, Box::new(store))
        .expect("Invalid evolution configuration")
        .with_metrics(Box::new(sink))
        .with_interrupt_flag(interrupt_flag);

    engine
        .initialize(None)
        .expect("Failed to initialize population");

    match engine.evolve() {
        Ok(_) => {
            println!();
            println!("{}", engine.format_summary());
        }
        Err(e) => {
            eprintln!("Evolution failed: {}", e);
            std::process::exit(1);
        }
    }

    if let Some(best) = engine.state().and_then(|s| s.best_organism.as_ref()) {
        println!();
        println!("{}", best.format_line());
        println!();
        println!("{}", consistency::check(best).format());
    }

    println!();
    println!("CHRONOS exiting.");
}

fn print_banner() {
    println!("═══════════════════════════════════════════════════════════════");
    println!("  CHRONOS - Evolutionary Quantum Circuit Search");
    println!("  PID: {}", std::process::id());
    println!("═══════════════════════════════════════════════════════════════");
    println!();
}

fn print_run_parameters(config: &EvolutionConfig) {
    println!("Run parameters:");
    println!("  Φ target        = {}", config.phi_target);
    println!("  max generations = {}", config.max_generations);
    println!("  population      = {}", config.population_size);
    println!("  shots/execution = {}", config.shots);
    match config.seed {
        Some(seed) => println!("  seed            = {}", seed),
        None => println!("  seed            = (entropy)"),
    }
    println!();
}

fn setup_interrupt_handler(interrupt_flag: Arc<AtomicBool>) {
    let interrupt_count = Arc::new(AtomicUsize::new(0));

    ctrlc::set_handler(move || {
        let count = interrupt_count.fetch_add(1, Ordering::SeqCst);
        interrupt_flag.store(true, Ordering::SeqCst);
        if count == 0 {
            eprintln!("\nInterrupt received, will stop after current generation...");
        } else {
            eprintln!("\nForce quit.");
            std::process::exit(1);
        }
    })
    .expect("Error setting Ctrl-C handler");
}
