//! Persistent storage for evolution experiments.
//!
//! Each experiment owns a directory of generation checkpoints written before
//! the generation is scored, so an interrupted run can pick up where it
//! stopped.

mod checkpoint;

pub use checkpoint::{CheckpointError, CheckpointStore, ExperimentMeta, GenerationCheckpoint};
