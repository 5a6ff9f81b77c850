//! Schema module - Genome, fitness and configuration types for evolution experiments.

mod config;
mod genome;

pub use config::*;
pub use genome::*;
