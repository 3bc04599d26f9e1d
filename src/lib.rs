//! CHRONOS - Evolutionary Quantum Circuit Search
//!
//! This crate provides genetic algorithm-based search over circuit
//! "organisms": candidate quantum circuit designs evaluated through a
//! synthetic execution model and scored by integrated information (Φ).

pub mod circuit;
pub mod consistency;
pub mod constants;
pub mod db;
pub mod error;
pub mod evolution;
pub mod organism;
pub mod simulator;
