//! Genome manipulation utilities for evolutionary search.
//!
//! Provides random generation, two-point crossover, uniform-integer mutation
//! and the combined variation step.

use rand::prelude::*;

use crate::schema::{GeneBounds, Genome, Individual, OperatorConfig, Population};

/// Independent random streams drawn from one experiment seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RngStream {
    /// Initial population.
    Init,
    /// Crossover and mutation of one generation.
    Variation,
    /// Tournament sampling of one generation.
    Selection,
}

impl RngStream {
    fn tag(self) -> u64 {
        match self {
            RngStream::Init => 0x1,
            RngStream::Variation => 0x2,
            RngStream::Selection => 0x3,
        }
    }
}

/// Random number generator wrapper for genome operations.
pub struct GenomeRng {
    rng: StdRng,
}

impl GenomeRng {
    /// Create from seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Derive the generator for one `(generation, stream)` pair.
    ///
    /// Each generation's draws depend only on the experiment seed and the
    /// generation index, so a resumed run replays exactly what an
    /// uninterrupted one would have drawn.
    pub fn for_stream(seed: u64, generation: usize, stream: RngStream) -> Self {
        let mut h = splitmix64(seed);
        h = splitmix64(h ^ generation as u64);
        h = splitmix64(h ^ stream.tag());
        Self::new(h)
    }

    /// Mutable access to the underlying generator.
    pub fn rng_mut(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// Generate a genome with every gene drawn uniformly from `bounds`.
    pub fn fresh_genome(&mut self, size: usize, bounds: &GeneBounds) -> Genome {
        (0..size)
            .map(|_| self.rng.gen_range(bounds.min..=bounds.max))
            .collect::<Vec<_>>()
            .into()
    }

    /// Generate `count` unevaluated individuals.
    pub fn fresh_population(
        &mut self,
        count: usize,
        size: usize,
        bounds: &GeneBounds,
    ) -> Population {
        (0..count)
            .map(|_| Individual::new(self.fresh_genome(size, bounds)))
            .collect()
    }

    /// Two-point crossover with randomly chosen cut points.
    ///
    /// Cut points satisfy `1 <= i < j <= len`. Genomes shorter than two genes
    /// come back unchanged.
    pub fn crossover(&mut self, parent1: &Genome, parent2: &Genome) -> (Genome, Genome) {
        let size = parent1.len().min(parent2.len());
        if size < 2 {
            return (parent1.clone(), parent2.clone());
        }

        let mut i = self.rng.gen_range(1..=size);
        let mut j = self.rng.gen_range(1..size);
        if j >= i {
            j += 1;
        } else {
            std::mem::swap(&mut i, &mut j);
        }

        two_point_crossover(parent1, parent2, i, j)
    }

    /// Uniform-integer mutation.
    ///
    /// Each gene is redrawn from `bounds` with probability `indpb`; the new
    /// value may equal the old one.
    pub fn mutate(&mut self, genome: &Genome, indpb: f64, bounds: &GeneBounds) -> Genome {
        genome
            .iter()
            .map(|&gene| {
                if self.rng.r#gen::<f64>() < indpb {
                    self.rng.gen_range(bounds.min..=bounds.max)
                } else {
                    gene
                }
            })
            .collect::<Vec<_>>()
            .into()
    }

    /// Produce offspring from a population.
    ///
    /// Successive pairs are crossed over with probability `cxpb`, then every
    /// offspring is mutated with probability `mutpb`. Offspring come back
    /// unevaluated, in parent order.
    pub fn vary(
        &mut self,
        population: &[Individual],
        ops: &OperatorConfig,
        bounds: &GeneBounds,
    ) -> Population {
        let mut offspring: Vec<Genome> = population.iter().map(|i| i.genome.clone()).collect();

        for i in (1..offspring.len()).step_by(2) {
            if self.rng.r#gen::<f64>() < ops.cxpb {
                let (c1, c2) = self.crossover(&offspring[i - 1], &offspring[i]);
                offspring[i - 1] = c1;
                offspring[i] = c2;
            }
        }

        for genome in offspring.iter_mut() {
            if self.rng.r#gen::<f64>() < ops.mutpb {
                *genome = self.mutate(genome, ops.indpb, bounds);
            }
        }

        offspring.into_iter().map(Individual::new).collect()
    }
}

/// Swap the `[i, j)` segment between two equal-length genomes.
///
/// # Panics
///
/// Panics if the parents differ in length or the cut points are not
/// `i < j <= len`.
pub fn two_point_crossover(a: &Genome, b: &Genome, i: usize, j: usize) -> (Genome, Genome) {
    assert_eq!(a.len(), b.len(), "crossover parents must have equal length");
    assert!(i < j && j <= a.len(), "invalid cut points ({i}, {j})");

    let mut child1 = a.genes().to_vec();
    let mut child2 = b.genes().to_vec();
    child1[i..j].copy_from_slice(&b[i..j]);
    child2[i..j].copy_from_slice(&a[i..j]);

    (child1.into(), child2.into())
}

fn splitmix64(x: u64) -> u64 {
    let mut z = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
