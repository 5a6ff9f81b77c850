//! Experiment configuration types.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::GeneBounds;

/// Top-level configuration for an evolution experiment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolverConfig {
    /// Population and generation settings.
    #[serde(default)]
    pub population: PopulationConfig,
    /// Variation and selection parameters.
    #[serde(default)]
    pub operators: OperatorConfig,
    /// Gene value range.
    #[serde(default)]
    pub genes: GeneBounds,
    /// Remote fitness service.
    #[serde(default)]
    pub oracle: OracleConfig,
    /// Directory holding one sub-directory per experiment.
    #[serde(default = "default_checkpoint_dir")]
    pub checkpoint_dir: PathBuf,
    /// Random seed for reproducibility.
    #[serde(default)]
    pub random_seed: Option<u64>,
}

impl Default for EvolverConfig {
    fn default() -> Self {
        Self {
            population: PopulationConfig::default(),
            operators: OperatorConfig::default(),
            genes: GeneBounds::default(),
            oracle: OracleConfig::default(),
            checkpoint_dir: default_checkpoint_dir(),
            random_seed: None,
        }
    }
}

fn default_checkpoint_dir() -> PathBuf {
    PathBuf::from("experiments")
}

/// Population and generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopulationConfig {
    /// Number of individuals in population.
    #[serde(default = "default_population_size")]
    pub size: usize,
    /// Number of genes per genome.
    #[serde(default = "default_genome_size")]
    pub genome_size: usize,
    /// Total number of generations (absolute, resumed runs count the
    /// generations already done).
    #[serde(default = "default_generations")]
    pub generations: usize,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            size: default_population_size(),
            genome_size: default_genome_size(),
            generations: default_generations(),
        }
    }
}

fn default_population_size() -> usize {
    50
}
fn default_genome_size() -> usize {
    135
}
fn default_generations() -> usize {
    100
}

/// Variation and selection parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorConfig {
    /// Probability that a pair of offspring is crossed over.
    #[serde(default = "default_cxpb")]
    pub cxpb: f64,
    /// Probability that an offspring is mutated at all.
    #[serde(default = "default_mutpb")]
    pub mutpb: f64,
    /// Per-gene redraw probability inside a mutated offspring.
    #[serde(default = "default_indpb")]
    pub indpb: f64,
    /// Individuals sampled per tournament.
    #[serde(default = "default_tournsize")]
    pub tournsize: usize,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            cxpb: default_cxpb(),
            mutpb: default_mutpb(),
            indpb: default_indpb(),
            tournsize: default_tournsize(),
        }
    }
}

fn default_cxpb() -> f64 {
    0.5
}
fn default_mutpb() -> f64 {
    0.1
}
fn default_indpb() -> f64 {
    0.05
}
fn default_tournsize() -> usize {
    3
}

/// Remote fitness service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Service root, `/batch_fitness` is appended.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Request timeout in seconds. Scoring a large batch is slow.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

// 127.0.0.1 rather than localhost: name resolution tries IPv6 first and
// stalls every request.
fn default_base_url() -> String {
    "http://127.0.0.1:8001".to_string()
}
fn default_timeout_secs() -> u64 {
    120
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Population size must be at least 2")]
    PopulationTooSmall,
    #[error("Genome size must be non-zero")]
    EmptyGenome,
    #[error("Tournament size must be non-zero")]
    InvalidTournamentSize,
    #[error("Probability {name} = {value} is outside [0, 1]")]
    InvalidProbability { name: &'static str, value: f64 },
    #[error("Gene bounds min ({min}) > max ({max})")]
    InvalidGeneBounds { min: u8, max: u8 },
    #[error("Oracle base URL is empty")]
    MissingOracleUrl,
    #[error("Failed to read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl EvolverConfig {
    /// Load a JSON configuration file. Missing fields take their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.population.size < 2 {
            return Err(ConfigError::PopulationTooSmall);
        }
        if self.population.genome_size == 0 {
            return Err(ConfigError::EmptyGenome);
        }
        if self.operators.tournsize == 0 {
            return Err(ConfigError::InvalidTournamentSize);
        }

        let check_probability = |value: f64, name: &'static str| {
            if (0.0..=1.0).contains(&value) {
                Ok(())
            } else {
                Err(ConfigError::InvalidProbability { name, value })
            }
        };
        check_probability(self.operators.cxpb, "cxpb")?;
        check_probability(self.operators.mutpb, "mutpb")?;
        check_probability(self.operators.indpb, "indpb")?;

        if self.genes.min > self.genes.max {
            return Err(ConfigError::InvalidGeneBounds {
                min: self.genes.min,
                max: self.genes.max,
            });
        }
        if self.oracle.base_url.trim().is_empty() {
            return Err(ConfigError::MissingOracleUrl);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = EvolverConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.operators.cxpb, 0.5);
        assert_eq!(config.operators.mutpb, 0.1);
        assert_eq!(config.operators.indpb, 0.05);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{ "population": { "size": 8 }, "genes": { "max": 2 } }"#;
        let config: EvolverConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.population.size, 8);
        assert_eq!(config.population.genome_size, 135);
        assert_eq!(config.genes, GeneBounds::new(0, 2));
        assert_eq!(config.operators.tournsize, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_probability() {
        let mut config = EvolverConfig::default();
        config.operators.indpb = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidProbability { name: "indpb", .. })
        ));
    }

    #[test]
    fn test_invalid_bounds() {
        let mut config = EvolverConfig::default();
        config.genes = GeneBounds::new(3, 1);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidGeneBounds { min: 3, max: 1 })
        ));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "random_seed": 7, "oracle": { "timeout_secs": 5 } }"#).unwrap();

        let config = EvolverConfig::from_file(&path).unwrap();
        assert_eq!(config.random_seed, Some(7));
        assert_eq!(config.oracle.timeout_secs, 5);
        assert_eq!(config.oracle.base_url, "http://127.0.0.1:8001");

        let missing = EvolverConfig::from_file(dir.path().join("nope.json"));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }
}
