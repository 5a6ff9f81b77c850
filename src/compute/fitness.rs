//! Fitness oracle clients.
//!
//! Fitness is computed by an external scoring service. A batch of genomes
//! goes out in one request and a same-length, same-order list of scores comes
//! back; entries the service could not score are `null` and map to
//! [`Fitness::UNSCORED`].

use std::time::Duration;

use serde::Serialize;

use crate::schema::{Fitness, Genome, OracleConfig};

/// Scores a batch of genomes, one fitness per genome, in input order.
pub trait FitnessOracle {
    fn evaluate_batch(&self, genomes: &[Genome]) -> Result<Vec<Fitness>, OracleError>;
}

impl<F> FitnessOracle for F
where
    F: Fn(&[Genome]) -> Result<Vec<Fitness>, OracleError>,
{
    fn evaluate_batch(&self, genomes: &[Genome]) -> Result<Vec<Fitness>, OracleError> {
        self(genomes)
    }
}

/// Oracle failures. All of them are fatal to the generation being scored.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("Fitness service unavailable: {0}")]
    Unavailable(#[from] reqwest::Error),
    #[error("Fitness service returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Malformed fitness response: {0}")]
    Malformed(String),
    #[error("Fitness service returned {got} scores for {expected} genomes")]
    LengthMismatch { expected: usize, got: usize },
}

/// Map raw service scores onto fitness values, checking the batch length.
pub fn scores_to_fitness(
    scores: Vec<Option<f64>>,
    expected: usize,
) -> Result<Vec<Fitness>, OracleError> {
    if scores.len() != expected {
        return Err(OracleError::LengthMismatch {
            expected,
            got: scores.len(),
        });
    }
    Ok(scores.into_iter().map(Fitness::from).collect())
}

#[derive(Serialize)]
struct GenomeData<'a> {
    genome: &'a Genome,
}

/// Client for the HTTP scoring service (`POST {base_url}/batch_fitness`).
pub struct HttpOracle {
    client: reqwest::blocking::Client,
    endpoint: String,
}

impl HttpOracle {
    /// Create a client from configuration.
    pub fn new(config: &OracleConfig) -> Result<Self, OracleError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/batch_fitness", config.base_url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl FitnessOracle for HttpOracle {
    fn evaluate_batch(&self, genomes: &[Genome]) -> Result<Vec<Fitness>, OracleError> {
        let body: Vec<GenomeData<'_>> = genomes.iter().map(|genome| GenomeData { genome }).collect();

        log::debug!("Scoring batch of {} genomes at {}", genomes.len(), self.endpoint);
        let resp = self.client.post(&self.endpoint).json(&body).send()?;

        let status = resp.status();
        let text = resp.text()?;
        if !status.is_success() {
            return Err(OracleError::Status {
                status: status.as_u16(),
                body: text.chars().take(500).collect(),
            });
        }

        let scores: Vec<Option<f64>> =
            serde_json::from_str(&text).map_err(|e| OracleError::Malformed(e.to_string()))?;
        let fitness = scores_to_fitness(scores, genomes.len())?;

        let unscored = fitness.iter().filter(|f| !f.is_scored()).count();
        if unscored > 0 {
            log::debug!("{unscored}/{} genomes came back unscored", genomes.len());
        }

        Ok(fitness)
    }
}
