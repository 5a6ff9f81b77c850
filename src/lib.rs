//! Action Evolver - Checkpointed evolutionary search over action genomes.
//!
//! Genomes are fixed-length integer sequences that drive a simulated agent.
//! Their quality comes from a remote scoring service; the population improves
//! through two-point crossover, uniform-integer mutation and tournament
//! selection. Every generation's offspring are written to disk before they are
//! scored, so a run can be interrupted and resumed.
//!
//! # Architecture
//!
//! - `schema`: Genome, fitness and configuration types
//! - `compute`: Genetic operators, the fitness oracle client and the search loop
//! - `storage`: Generation checkpoints
//!
//! # Example
//!
//! ```rust,no_run
//! use action_evolver::{
//!     compute::{EvolutionEngine, HttpOracle, StartMode},
//!     schema::EvolverConfig,
//! };
//!
//! let config = EvolverConfig {
//!     random_seed: Some(7),
//!     ..Default::default()
//! };
//! let oracle = HttpOracle::new(&config.oracle).unwrap();
//!
//! let mut engine = EvolutionEngine::new(config, "walker", oracle).unwrap();
//! let result = engine.run(StartMode::Resume).unwrap();
//!
//! if let Some(best) = result.best {
//!     println!("Best fitness: {:.3}", best.fitness.unwrap().value());
//! }
//! ```

pub mod compute;
pub mod schema;
pub mod storage;

// Re-export commonly used types
pub use compute::{EvolutionEngine, FitnessOracle, HttpOracle, StartMode};
pub use schema::{EvolverConfig, Fitness, Genome, Individual};
pub use storage::CheckpointStore;
