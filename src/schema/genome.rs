//! Genome, fitness and population types.
//!
//! A genome is a fixed-length sequence of small integers, each one an action
//! index for the simulated agent. The optimizer never looks inside the genes;
//! it only needs their bounds.

use std::cmp::Ordering;
use std::ops::Deref;

use serde::{Deserialize, Deserializer, Serialize};

/// A single gene value.
pub type Gene = u8;

/// Closed range of valid gene values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneBounds {
    /// Smallest gene value (inclusive).
    #[serde(default = "default_min_gene")]
    pub min: Gene,
    /// Largest gene value (inclusive).
    #[serde(default = "default_max_gene")]
    pub max: Gene,
}

impl GeneBounds {
    pub fn new(min: Gene, max: Gene) -> Self {
        Self { min, max }
    }

    /// Check whether a value lies inside the bounds.
    pub fn contains(&self, gene: Gene) -> bool {
        (self.min..=self.max).contains(&gene)
    }
}

impl Default for GeneBounds {
    fn default() -> Self {
        Self {
            min: default_min_gene(),
            max: default_max_gene(),
        }
    }
}

fn default_min_gene() -> Gene {
    0
}
fn default_max_gene() -> Gene {
    1
}

/// Ordered, fixed-length action sequence.
///
/// Serialized as a plain integer array so checkpoints and oracle requests
/// stay readable by other tooling.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Genome(Vec<Gene>);

impl Genome {
    pub fn new(genes: Vec<Gene>) -> Self {
        Self(genes)
    }

    /// Borrow the genes.
    pub fn genes(&self) -> &[Gene] {
        &self.0
    }

    /// Consume into the raw gene vector.
    pub fn into_genes(self) -> Vec<Gene> {
        self.0
    }

    /// True if every gene lies within `bounds`.
    pub fn within(&self, bounds: &GeneBounds) -> bool {
        self.0.iter().all(|&g| bounds.contains(g))
    }
}

impl Deref for Genome {
    type Target = [Gene];

    fn deref(&self) -> &[Gene] {
        &self.0
    }
}

impl From<Vec<Gene>> for Genome {
    fn from(genes: Vec<Gene>) -> Self {
        Self(genes)
    }
}

/// Fitness score, maximized.
///
/// An individual the oracle could not score carries [`Fitness::UNSCORED`]
/// (negative infinity), so it loses every comparison against a scored one.
/// NaN scores are treated as unscored. Serializes as a number, or `null`
/// when unscored.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(from = "Option<f64>", into = "Option<f64>")]
pub struct Fitness(f64);

impl Fitness {
    pub const UNSCORED: Fitness = Fitness(f64::NEG_INFINITY);

    pub fn new(value: f64) -> Self {
        if value.is_nan() {
            Self::UNSCORED
        } else {
            Self(value)
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }

    pub fn is_scored(self) -> bool {
        self.0 != f64::NEG_INFINITY
    }
}

impl From<Option<f64>> for Fitness {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Self::UNSCORED, Self::new)
    }
}

impl From<Fitness> for Option<f64> {
    fn from(fitness: Fitness) -> Self {
        fitness.is_scored().then_some(fitness.0)
    }
}

impl PartialEq for Fitness {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Fitness {}

impl PartialOrd for Fitness {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Fitness {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// A genome with its fitness, unset until evaluated.
///
/// An unevaluated individual omits `fitness` in JSON; an evaluated but
/// unscored one carries `"fitness": null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Individual {
    pub genome: Genome,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present_fitness"
    )]
    pub fitness: Option<Fitness>,
}

/// A present `fitness` field means evaluated, even when it is `null`.
fn present_fitness<'de, D>(deserializer: D) -> Result<Option<Fitness>, D::Error>
where
    D: Deserializer<'de>,
{
    Fitness::deserialize(deserializer).map(Some)
}

impl Individual {
    /// Wrap an unevaluated genome.
    pub fn new(genome: Genome) -> Self {
        Self {
            genome,
            fitness: None,
        }
    }

    pub fn evaluated(genome: Genome, fitness: Fitness) -> Self {
        Self {
            genome,
            fitness: Some(fitness),
        }
    }

    pub fn is_evaluated(&self) -> bool {
        self.fitness.is_some()
    }
}

/// Individuals of one generation. Order only matters for reproducible
/// sampling.
pub type Population = Vec<Individual>;

/// Strip fitness and keep the genomes, in order.
pub fn genomes_of(population: &[Individual]) -> Vec<Genome> {
    population.iter().map(|i| i.genome.clone()).collect()
}

/// Highest-fitness evaluated individual, first one on ties.
pub fn best_of(population: &[Individual]) -> Option<&Individual> {
    population
        .iter()
        .filter(|i| i.is_evaluated())
        .fold(None, |best: Option<&Individual>, candidate| match best {
            Some(b) if b.fitness >= candidate.fitness => Some(b),
            _ => Some(candidate),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unscored_loses_to_everything() {
        assert!(Fitness::UNSCORED < Fitness::new(-1e300));
        assert!(Fitness::new(0.0) > Fitness::UNSCORED);
        assert!(!Fitness::UNSCORED.is_scored());
    }

    #[test]
    fn test_fitness_serializes_null_when_unscored() {
        let values = vec![Fitness::new(0.5), Fitness::UNSCORED];
        let json = serde_json::to_string(&values).unwrap();
        assert_eq!(json, "[0.5,null]");

        let parsed: Vec<Fitness> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, values);
    }

    #[test]
    fn test_nan_counts_as_unscored() {
        assert_eq!(Fitness::new(f64::NAN), Fitness::UNSCORED);
        assert_eq!(Fitness::from(Some(f64::NAN)), Fitness::UNSCORED);
        assert!(Fitness::new(f64::NAN) < Fitness::new(0.0));
    }

    #[test]
    fn test_individual_json_keeps_evaluation_state() {
        let unevaluated = Individual::new(Genome::new(vec![1, 0]));
        let unscored = Individual::evaluated(Genome::new(vec![1, 0]), Fitness::UNSCORED);
        let scored = Individual::evaluated(Genome::new(vec![1, 0]), Fitness::new(2.5));

        let json = |i: &Individual| serde_json::to_string(i).unwrap();
        assert_eq!(json(&unevaluated), r#"{"genome":[1,0]}"#);
        assert_eq!(json(&unscored), r#"{"genome":[1,0],"fitness":null}"#);
        assert_eq!(json(&scored), r#"{"genome":[1,0],"fitness":2.5}"#);

        for individual in [unevaluated, unscored, scored] {
            let parsed: Individual = serde_json::from_str(&json(&individual)).unwrap();
            assert_eq!(parsed, individual);
        }
    }

    #[test]
    fn test_genome_is_plain_array() {
        let genome = Genome::new(vec![0, 1, 1]);
        assert_eq!(serde_json::to_string(&genome).unwrap(), "[0,1,1]");
        assert!(genome.within(&GeneBounds::default()));
        assert!(!Genome::new(vec![2]).within(&GeneBounds::default()));
    }

    #[test]
    fn test_best_of_prefers_first_on_tie() {
        let population = vec![
            Individual::new(Genome::new(vec![9])),
            Individual::evaluated(Genome::new(vec![0]), Fitness::new(1.0)),
            Individual::evaluated(Genome::new(vec![1]), Fitness::new(1.0)),
            Individual::evaluated(Genome::new(vec![2]), Fitness::UNSCORED),
        ];

        let best = best_of(&population).unwrap();
        assert_eq!(best.genome.genes(), &[0]);
        assert!(best_of(&[]).is_none());
    }
}
