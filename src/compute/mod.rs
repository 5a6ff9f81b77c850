//! Compute module - Genetic operators, fitness evaluation and the search loop.
//!
//! # Overview
//!
//! - **Genome Operations** (`genome`): seeded generation, two-point crossover,
//!   uniform-integer mutation and the variation step
//! - **Fitness Oracle** (`fitness`): batched scoring through an external service
//! - **Search Loop** (`search`): checkpointed generations with tournament
//!   selection and resume
//!
//! # Example
//!
//! ```rust,no_run
//! use action_evolver::compute::{EvolutionEngine, HttpOracle, StartMode};
//! use action_evolver::schema::EvolverConfig;
//!
//! let config = EvolverConfig::default();
//! let oracle = HttpOracle::new(&config.oracle).unwrap();
//!
//! let mut engine = EvolutionEngine::new(config, "walker", oracle).unwrap();
//! let result = engine
//!     .run_with_callback(StartMode::Fresh, |report| {
//!         println!("Generation {}: best fitness = {:.3}",
//!             report.generation, report.max_fitness.value());
//!     })
//!     .unwrap();
//!
//! println!("Stopped after {} generations", result.generations_run);
//! ```

mod fitness;
mod genome;
mod search;

pub use fitness::{FitnessOracle, HttpOracle, OracleError, scores_to_fitness};
pub use genome::{GenomeRng, RngStream, two_point_crossover};
pub use search::{
    EvolutionEngine, EvolutionResult, EvolveError, GenerationReport, StartMode, StopReason,
    score_checkpoint, select_tournament,
};
