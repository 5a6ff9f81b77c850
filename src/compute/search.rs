//! Generational search loop with checkpointed, resumable generations.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rand::Rng;

use crate::schema::{
    ConfigError, EvolverConfig, Fitness, Genome, Individual, Population, best_of, genomes_of,
};
use crate::storage::{CheckpointError, CheckpointStore, ExperimentMeta};

use super::fitness::{FitnessOracle, OracleError};
use super::genome::{GenomeRng, RngStream};

/// How a run obtains its first population.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartMode {
    /// Wipe the experiment and start from a random population.
    Fresh,
    /// Continue from the latest checkpoint of the experiment.
    Resume,
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The generation budget is exhausted.
    Completed,
    /// The cancel handle was set.
    Cancelled,
}

/// Per-generation progress, reported after selection.
#[derive(Debug, Clone)]
pub struct GenerationReport {
    /// Zero-based generation index.
    pub generation: usize,
    /// Generation budget of the run.
    pub total_generations: usize,
    /// Best fitness among this generation's offspring.
    pub max_fitness: Fitness,
    /// Mean over scored offspring, `None` if none was scored.
    pub mean_fitness: Option<f64>,
    /// Offspring the oracle could not score.
    pub unscored: usize,
    /// Whether the offspring came from a checkpoint instead of variation.
    pub resumed: bool,
}

/// Outcome of a run.
#[derive(Debug, Clone)]
pub struct EvolutionResult {
    /// Population after the last selection.
    pub population: Population,
    /// Best evaluated individual seen during this run.
    pub best: Option<Individual>,
    /// Generations completed by this run.
    pub generations_run: usize,
    /// Index of the next generation that would run.
    pub next_generation: usize,
    /// Seed driving the random streams.
    pub seed: u64,
    pub stop_reason: StopReason,
}

/// Errors that abort a run.
#[derive(Debug, thiserror::Error)]
pub enum EvolveError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    #[error("Fitness evaluation failed: {0}")]
    Oracle(#[from] OracleError),
    #[error("Checkpoint does not match configuration: {0}")]
    IncompatibleCheckpoint(String),
}

/// Where the loop picks up after initialization.
struct RunStart {
    seed: u64,
    generation: usize,
    population: Population,
    /// Offspring already checkpointed for `generation`, awaiting evaluation.
    pending: Option<Population>,
}

/// Evolution engine that runs the search.
pub struct EvolutionEngine<O> {
    config: EvolverConfig,
    experiment: String,
    store: CheckpointStore,
    oracle: O,
    cancelled: Arc<AtomicBool>,
}

impl<O: FitnessOracle> EvolutionEngine<O> {
    /// Create a new evolution engine. Checkpoints go under
    /// `config.checkpoint_dir`.
    pub fn new(
        config: EvolverConfig,
        experiment: impl Into<String>,
        oracle: O,
    ) -> Result<Self, EvolveError> {
        config.validate()?;
        let store = CheckpointStore::new(&config.checkpoint_dir);

        Ok(Self {
            config,
            experiment: experiment.into(),
            store,
            oracle,
            cancelled: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Use a different checkpoint store.
    pub fn with_store(mut self, store: CheckpointStore) -> Self {
        self.store = store;
        self
    }

    /// Get cancellation handle. The loop checks it between generations.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    pub fn config(&self) -> &EvolverConfig {
        &self.config
    }

    /// Build or reload the starting population.
    fn initialize(&self, mode: StartMode) -> Result<RunStart, EvolveError> {
        match mode {
            StartMode::Fresh => self.initialize_fresh(),
            StartMode::Resume => self.initialize_resume(),
        }
    }

    fn initialize_fresh(&self) -> Result<RunStart, EvolveError> {
        let seed = self.config.random_seed.unwrap_or_else(rand::random);

        self.store.reset(&self.experiment)?;
        self.store.write_meta(
            &self.experiment,
            &ExperimentMeta {
                seed,
                genome_size: self.config.population.genome_size,
                population_size: self.config.population.size,
            },
        )?;

        let population = GenomeRng::for_stream(seed, 0, RngStream::Init).fresh_population(
            self.config.population.size,
            self.config.population.genome_size,
            &self.config.genes,
        );
        log::info!(
            "Starting experiment {:?} with {} individuals of {} genes (seed {})",
            self.experiment,
            population.len(),
            self.config.population.genome_size,
            seed
        );

        Ok(RunStart {
            seed,
            generation: 0,
            population,
            pending: None,
        })
    }

    fn initialize_resume(&self) -> Result<RunStart, EvolveError> {
        let (genomes, generation) = self.store.load_latest(&self.experiment)?;
        self.check_shape(&genomes)?;

        let seed = match (self.store.read_meta(&self.experiment)?, self.config.random_seed) {
            (Some(meta), Some(seed)) if meta.seed != seed => {
                log::warn!(
                    "Seed {} overrides recorded seed {}; the resumed run will diverge",
                    seed,
                    meta.seed
                );
                seed
            }
            (Some(meta), _) => meta.seed,
            (None, seed) => {
                let seed = seed.unwrap_or_else(rand::random);
                log::warn!(
                    "Experiment {:?} has no recorded seed, using {}",
                    self.experiment,
                    seed
                );
                self.store.write_meta(
                    &self.experiment,
                    &ExperimentMeta {
                        seed,
                        genome_size: self.config.population.genome_size,
                        population_size: self.config.population.size,
                    },
                )?;
                seed
            }
        };

        log::info!(
            "Resuming experiment {:?} at generation {} (seed {})",
            self.experiment,
            generation + 1,
            seed
        );

        let offspring: Population = genomes.into_iter().map(Individual::new).collect();
        Ok(RunStart {
            seed,
            generation,
            population: offspring.clone(),
            pending: Some(offspring),
        })
    }

    /// Reject checkpoints written under a different configuration.
    fn check_shape(&self, genomes: &[Genome]) -> Result<(), EvolveError> {
        let expected = &self.config.population;
        if genomes.len() != expected.size {
            return Err(EvolveError::IncompatibleCheckpoint(format!(
                "{} genomes stored, population size is {}",
                genomes.len(),
                expected.size
            )));
        }
        if let Some(bad) = genomes.iter().find(|g| g.len() != expected.genome_size) {
            return Err(EvolveError::IncompatibleCheckpoint(format!(
                "genome of length {} stored, genome size is {}",
                bad.len(),
                expected.genome_size
            )));
        }
        if let Some(bad) = genomes.iter().find(|g| !g.within(&self.config.genes)) {
            return Err(EvolveError::IncompatibleCheckpoint(format!(
                "genome {:?} has genes outside [{}, {}]",
                bad.genes(),
                self.config.genes.min,
                self.config.genes.max
            )));
        }
        Ok(())
    }

    /// Score offspring and attach fitness in order.
    fn evaluate(&self, offspring: Population) -> Result<Population, EvolveError> {
        let genomes = genomes_of(&offspring);
        let fitness = self.oracle.evaluate_batch(&genomes)?;
        if fitness.len() != genomes.len() {
            return Err(OracleError::LengthMismatch {
                expected: genomes.len(),
                got: fitness.len(),
            }
            .into());
        }

        Ok(genomes
            .into_iter()
            .zip(fitness)
            .map(|(genome, fitness)| Individual::evaluated(genome, fitness))
            .collect())
    }

    /// Run evolution with progress callback.
    pub fn run_with_callback<F>(
        &mut self,
        mode: StartMode,
        mut callback: F,
    ) -> Result<EvolutionResult, EvolveError>
    where
        F: FnMut(&GenerationReport),
    {
        let RunStart {
            seed,
            mut generation,
            mut population,
            mut pending,
        } = self.initialize(mode)?;

        let total = self.config.population.generations;
        let mut best: Option<Individual> = None;
        let mut generations_run = 0;

        let stop_reason = loop {
            if generation >= total {
                break StopReason::Completed;
            }
            if self.cancelled.load(Ordering::Relaxed) {
                log::info!("Cancelled before generation {}", generation + 1);
                break StopReason::Cancelled;
            }

            log::info!("Generation {}/{}...", generation + 1, total);

            let resumed = pending.is_some();
            let offspring = match pending.take() {
                Some(offspring) => offspring,
                None => {
                    let offspring = GenomeRng::for_stream(seed, generation, RngStream::Variation)
                        .vary(&population, &self.config.operators, &self.config.genes);
                    self.store
                        .save(&self.experiment, generation, &genomes_of(&offspring))?;
                    offspring
                }
            };

            let evaluated = self.evaluate(offspring)?;
            let report = summarize(&evaluated, generation, total, resumed);

            if let Some(candidate) = best_of(&evaluated)
                && best.as_ref().is_none_or(|b| candidate.fitness > b.fitness)
            {
                best = Some(candidate.clone());
            }

            let mut rng = GenomeRng::for_stream(seed, generation, RngStream::Selection);
            population = select_tournament(
                &evaluated,
                self.config.population.size,
                self.config.operators.tournsize,
                rng.rng_mut(),
            );

            log::info!(
                "Generation {}/{}: max fitness {:.4}, {} unscored",
                generation + 1,
                total,
                report.max_fitness.value(),
                report.unscored
            );
            callback(&report);

            generation += 1;
            generations_run += 1;
        };

        Ok(EvolutionResult {
            population,
            best,
            generations_run,
            next_generation: generation,
            seed,
            stop_reason,
        })
    }

    /// Run evolution (blocking).
    pub fn run(&mut self, mode: StartMode) -> Result<EvolutionResult, EvolveError> {
        self.run_with_callback(mode, |_| {})
    }
}

fn summarize(
    evaluated: &[Individual],
    generation: usize,
    total_generations: usize,
    resumed: bool,
) -> GenerationReport {
    let scores: Vec<Fitness> = evaluated.iter().filter_map(|i| i.fitness).collect();
    let scored: Vec<f64> = scores
        .iter()
        .filter(|f| f.is_scored())
        .map(|f| f.value())
        .collect();

    GenerationReport {
        generation,
        total_generations,
        max_fitness: scores.iter().copied().max().unwrap_or(Fitness::UNSCORED),
        mean_fitness: (!scored.is_empty()).then(|| scored.iter().sum::<f64>() / scored.len() as f64),
        unscored: scores.len() - scored.len(),
        resumed,
    }
}

/// Tournament selection.
///
/// Runs `k` independent tournaments of `tournsize` entries sampled uniformly
/// with replacement from `pool`, keeping the fittest entry of each (the first
/// one drawn on ties).
///
/// # Panics
///
/// Panics if `pool` is empty, `tournsize` is zero, or any entry has not been
/// evaluated.
pub fn select_tournament<R: Rng>(
    pool: &[Individual],
    k: usize,
    tournsize: usize,
    rng: &mut R,
) -> Population {
    assert!(!pool.is_empty(), "cannot select from an empty pool");
    assert!(tournsize > 0, "tournament size must be non-zero");
    assert!(
        pool.iter().all(Individual::is_evaluated),
        "tournament selection requires evaluated individuals"
    );

    (0..k)
        .map(|_| {
            let mut winner = &pool[rng.gen_range(0..pool.len())];
            for _ in 1..tournsize {
                let contender = &pool[rng.gen_range(0..pool.len())];
                if contender.fitness > winner.fitness {
                    winner = contender;
                }
            }
            winner.clone()
        })
        .collect()
}

/// Re-score the genomes of a stored generation, latest when `generation` is
/// `None`. Returns the generation index and the evaluated individuals in
/// checkpoint order.
pub fn score_checkpoint<O: FitnessOracle>(
    store: &CheckpointStore,
    experiment: &str,
    generation: Option<usize>,
    oracle: &O,
) -> Result<(usize, Population), EvolveError> {
    let (genomes, generation) = match generation {
        Some(generation) => (store.load(experiment, generation)?, generation),
        None => store.load_latest(experiment)?,
    };

    let fitness = oracle.evaluate_batch(&genomes)?;
    if fitness.len() != genomes.len() {
        return Err(OracleError::LengthMismatch {
            expected: genomes.len(),
            got: fitness.len(),
        }
        .into());
    }

    let evaluated = genomes
        .into_iter()
        .zip(fitness)
        .map(|(genome, fitness)| Individual::evaluated(genome, fitness))
        .collect();
    Ok((generation, evaluated))
}
