//! Action Evolver CLI - Train and inspect evolution experiments.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::{Parser, Subcommand};

use action_evolver::{
    compute::{
        EvolutionEngine, EvolveError, HttpOracle, StartMode, StopReason, score_checkpoint,
    },
    schema::{EvolverConfig, Individual},
    storage::{CheckpointError, CheckpointStore},
};

/// Evolve action sequences scored by a remote fitness service.
#[derive(Parser, Debug)]
#[command(name = "evolver", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run (or resume) an experiment.
    Train {
        /// Experiment name (directory under the checkpoint dir).
        experiment: String,

        /// Wipe existing checkpoints and start from a random population.
        #[arg(short, long)]
        fresh: bool,

        /// Random seed. Defaults to the recorded seed when resuming.
        #[arg(short, long)]
        seed: Option<u64>,

        /// Total number of generations, including ones already run.
        #[arg(short, long)]
        generations: Option<usize>,

        /// Population size.
        #[arg(short, long)]
        population: Option<usize>,

        /// JSON configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Re-score a checkpoint and print its best genomes.
    #[command(name = "get_best", alias = "get-best")]
    GetBest {
        /// Experiment name.
        experiment: String,

        /// Generation to read (latest if omitted).
        #[arg(short, long)]
        generation: Option<usize>,

        /// Number of genomes to print.
        #[arg(short, long, default_value_t = 1)]
        top: usize,

        /// JSON configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print the default configuration.
    Config,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let code = match cli.command {
        Command::Train {
            experiment,
            fresh,
            seed,
            generations,
            population,
            config,
        } => {
            let mut config = load_config(config);
            if seed.is_some() {
                config.random_seed = seed;
            }
            if let Some(generations) = generations {
                config.population.generations = generations;
            }
            if let Some(size) = population {
                config.population.size = size;
            }
            train(config, &experiment, fresh)
        }
        Command::GetBest {
            experiment,
            generation,
            top,
            config,
        } => get_best(load_config(config), &experiment, generation, top),
        Command::Config => {
            print_default_config();
            0
        }
    };

    process::exit(code);
}

fn load_config(path: Option<PathBuf>) -> EvolverConfig {
    match path {
        Some(path) => EvolverConfig::from_file(&path).unwrap_or_else(|e| {
            log::error!("{e}");
            process::exit(1);
        }),
        None => EvolverConfig::default(),
    }
}

fn train(config: EvolverConfig, experiment: &str, fresh: bool) -> i32 {
    let oracle = match HttpOracle::new(&config.oracle) {
        Ok(oracle) => oracle,
        Err(e) => {
            log::error!("{e}");
            return 1;
        }
    };

    let mut engine = match EvolutionEngine::new(config, experiment, oracle) {
        Ok(engine) => engine,
        Err(e) => {
            log::error!("Invalid configuration: {e}");
            return 1;
        }
    };

    if let Err(e) = install_interrupt_handler(engine.cancel_handle()) {
        log::warn!("Could not install Ctrl-C handler: {e}");
    }

    let mode = if fresh {
        StartMode::Fresh
    } else {
        StartMode::Resume
    };

    let result = engine.run_with_callback(mode, |report| {
        if let Some(mean) = report.mean_fitness {
            log::debug!("Generation {} mean fitness {:.4}", report.generation + 1, mean);
        }
    });

    match result {
        Ok(result) => {
            match result.stop_reason {
                StopReason::Completed => log::info!(
                    "Finished {} generations ({} this run)",
                    result.next_generation,
                    result.generations_run
                ),
                StopReason::Cancelled => log::info!(
                    "Stopped before generation {}",
                    result.next_generation + 1
                ),
            }
            if let Some(best) = &result.best {
                print_individuals(std::slice::from_ref(best));
            }
            0
        }
        Err(EvolveError::Checkpoint(CheckpointError::NotFound { experiment })) => {
            log::error!(
                "Experiment {experiment:?} has no checkpoints; pass --fresh to start it"
            );
            1
        }
        Err(e) => {
            log::error!("Run failed: {e}");
            1
        }
    }
}

/// First Ctrl-C stops the run between generations, a second one exits.
fn install_interrupt_handler(cancel: Arc<AtomicBool>) -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
        if request_stop(&cancel) {
            log::warn!("Second interrupt, exiting");
            process::exit(130);
        }
        log::info!("Interrupt received, stopping after the current generation...");
    })
}

/// Set the cancel flag. Returns whether it was already set.
fn request_stop(cancel: &AtomicBool) -> bool {
    cancel.swap(true, Ordering::SeqCst)
}

fn get_best(config: EvolverConfig, experiment: &str, generation: Option<usize>, top: usize) -> i32 {
    let oracle = match HttpOracle::new(&config.oracle) {
        Ok(oracle) => oracle,
        Err(e) => {
            log::error!("{e}");
            return 1;
        }
    };
    let store = CheckpointStore::new(&config.checkpoint_dir);

    match score_checkpoint(&store, experiment, generation, &oracle) {
        Ok((generation, mut scored)) => {
            // Stable sort keeps checkpoint order among equal scores.
            scored.sort_by(|a, b| b.fitness.cmp(&a.fitness));
            log::info!(
                "Generation {} of {:?}: {} genomes scored",
                generation + 1,
                experiment,
                scored.len()
            );
            print_individuals(&scored[..top.min(scored.len())]);
            0
        }
        Err(e) => {
            log::error!("{e}");
            1
        }
    }
}

fn print_individuals(individuals: &[Individual]) {
    for individual in individuals {
        match serde_json::to_string(individual) {
            Ok(json) => println!("{json}"),
            Err(e) => log::error!("Failed to serialize genome: {e}"),
        }
    }
}

fn print_default_config() {
    match serde_json::to_string_pretty(&EvolverConfig::default()) {
        Ok(json) => println!("{json}"),
        Err(e) => log::error!("Failed to serialize config: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_interrupt_only_requests_stop() {
        let cancel = AtomicBool::new(false);
        assert!(!request_stop(&cancel));
        assert!(cancel.load(Ordering::SeqCst));
        assert!(request_stop(&cancel));
    }

    #[test]
    fn test_cli_parses_train_flags() {
        let cli = Cli::try_parse_from(["evolver", "train", "walk", "-f", "-s", "7", "-g", "3"])
            .unwrap();
        match cli.command {
            Command::Train {
                experiment,
                fresh,
                seed,
                generations,
                ..
            } => {
                assert_eq!(experiment, "walk");
                assert!(fresh);
                assert_eq!(seed, Some(7));
                assert_eq!(generations, Some(3));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
