//! Engine error taxonomy.
//!
//! A failed consistency report is NOT an error: it is a normal return value
//! callers branch on. Persistence failures are logged and swallowed by the
//! controller. Everything here is a hard failure surfaced to the caller.

use thiserror::Error;

use crate::evolution::EvolutionPhase;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Caller passed an out-of-range parameter. Never silently clamped.
    #[error("contract violation: {0}")]
    Contract(String),

    /// `evolve()` called before `initialize()`
    #[error("evolution engine not initialized")]
    NotInitialized,

    /// `evolve()` called on an engine already in a terminal state
    #[error("evolution already finished in state {0:?}")]
    Finished(EvolutionPhase),
}
