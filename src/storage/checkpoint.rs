//! Generation checkpoints on disk.
//!
//! Layout under the store root:
//!
//! ```text
//! <root>/<experiment>/manifest.json     recorded generation indices
//! <root>/<experiment>/experiment.json   seed and sizes of the run
//! <root>/<experiment>/gen_00000.json    offspring genomes of generation 0
//! ```
//!
//! "Latest" is the maximum index in the manifest, never the last file a
//! directory listing happens to return.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;

use crate::schema::Genome;

const MANIFEST_FILE: &str = "manifest.json";
const META_FILE: &str = "experiment.json";

/// Checkpoint store errors.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("Experiment {experiment:?} has no checkpoints")]
    NotFound { experiment: String },
    #[error("Experiment {experiment:?} has no checkpoint for generation {generation}")]
    MissingGeneration {
        experiment: String,
        generation: usize,
    },
    #[error("Generation {generation} of experiment {experiment:?} is already checkpointed")]
    AlreadyExists {
        experiment: String,
        generation: usize,
    },
    #[error("Invalid experiment name {0:?}")]
    InvalidExperimentName(String),
    #[error("Checkpoint I/O error at {path:?}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("Corrupt checkpoint file {path:?}: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Snapshot of one generation's genomes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationCheckpoint {
    pub generation: usize,
    pub genomes: Vec<Genome>,
}

/// Run parameters recorded when an experiment starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentMeta {
    pub seed: u64,
    pub genome_size: usize,
    pub population_size: usize,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Manifest {
    generations: BTreeSet<usize>,
}

/// Directory-backed store of generation checkpoints.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    root: PathBuf,
}

impl CheckpointStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding one experiment.
    pub fn experiment_dir(&self, experiment: &str) -> Result<PathBuf, CheckpointError> {
        let valid = !experiment.is_empty()
            && experiment != "."
            && experiment != ".."
            && !experiment.contains(['/', '\\']);
        if !valid {
            return Err(CheckpointError::InvalidExperimentName(
                experiment.to_string(),
            ));
        }
        Ok(self.root.join(experiment))
    }

    /// Delete every snapshot of an experiment, creating its directory if
    /// absent.
    pub fn reset(&self, experiment: &str) -> Result<(), CheckpointError> {
        let dir = self.experiment_dir(experiment)?;
        if dir.exists() {
            fs::remove_dir_all(&dir).map_err(|source| io_err(&dir, source))?;
        }
        fs::create_dir_all(&dir).map_err(|source| io_err(&dir, source))?;
        log::debug!("Reset experiment directory {:?}", dir);
        Ok(())
    }

    /// Persist the genomes of one generation.
    ///
    /// The snapshot is durable on return. Each generation is recorded once;
    /// a second save of an index in the manifest fails. A generation file
    /// the manifest does not list is left over from an interrupted save and
    /// gets overwritten.
    pub fn save(
        &self,
        experiment: &str,
        generation: usize,
        genomes: &[Genome],
    ) -> Result<PathBuf, CheckpointError> {
        let dir = self.experiment_dir(experiment)?;
        fs::create_dir_all(&dir).map_err(|source| io_err(&dir, source))?;

        let mut manifest = self.read_manifest(&dir)?;
        let path = dir.join(checkpoint_file_name(generation));
        if manifest.generations.contains(&generation) {
            return Err(CheckpointError::AlreadyExists {
                experiment: experiment.to_string(),
                generation,
            });
        }
        if path.exists() {
            log::warn!("Overwriting unrecorded checkpoint {:?}", path);
        }

        let checkpoint = GenerationCheckpoint {
            generation,
            genomes: genomes.to_vec(),
        };
        write_json_atomic(&path, &checkpoint)?;

        manifest.generations.insert(generation);
        write_json_atomic(&dir.join(MANIFEST_FILE), &manifest)?;

        log::debug!(
            "Checkpointed generation {} ({} genomes) to {:?}",
            generation,
            genomes.len(),
            path
        );
        Ok(path)
    }

    /// Load the snapshot of a specific generation.
    pub fn load(&self, experiment: &str, generation: usize) -> Result<Vec<Genome>, CheckpointError> {
        let dir = self.experiment_dir(experiment)?;
        let manifest = self.read_manifest(&dir)?;
        if !manifest.generations.contains(&generation) {
            return Err(CheckpointError::MissingGeneration {
                experiment: experiment.to_string(),
                generation,
            });
        }

        let checkpoint: GenerationCheckpoint =
            read_json(&dir.join(checkpoint_file_name(generation)))?;
        Ok(checkpoint.genomes)
    }

    /// Load the highest-numbered snapshot of an experiment.
    pub fn load_latest(&self, experiment: &str) -> Result<(Vec<Genome>, usize), CheckpointError> {
        let generation = self
            .generations(experiment)?
            .last()
            .copied()
            .ok_or_else(|| CheckpointError::NotFound {
                experiment: experiment.to_string(),
            })?;

        Ok((self.load(experiment, generation)?, generation))
    }

    /// All checkpointed generation indices, ascending.
    pub fn generations(&self, experiment: &str) -> Result<Vec<usize>, CheckpointError> {
        let dir = self.experiment_dir(experiment)?;
        Ok(self.read_manifest(&dir)?.generations.into_iter().collect())
    }

    /// Record the run parameters of an experiment.
    pub fn write_meta(&self, experiment: &str, meta: &ExperimentMeta) -> Result<(), CheckpointError> {
        let dir = self.experiment_dir(experiment)?;
        fs::create_dir_all(&dir).map_err(|source| io_err(&dir, source))?;
        write_json_atomic(&dir.join(META_FILE), meta)
    }

    /// Read the run parameters, if the experiment recorded any.
    pub fn read_meta(&self, experiment: &str) -> Result<Option<ExperimentMeta>, CheckpointError> {
        let path = self.experiment_dir(experiment)?.join(META_FILE);
        if !path.exists() {
            return Ok(None);
        }
        read_json(&path).map(Some)
    }

    fn read_manifest(&self, dir: &Path) -> Result<Manifest, CheckpointError> {
        let path = dir.join(MANIFEST_FILE);
        if !path.exists() {
            return Ok(Manifest::default());
        }
        read_json(&path)
    }
}

fn checkpoint_file_name(generation: usize) -> String {
    format!("gen_{generation:05}.json")
}

fn io_err(path: &Path, source: io::Error) -> CheckpointError {
    CheckpointError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, CheckpointError> {
    let content = fs::read_to_string(path).map_err(|source| io_err(path, source))?;
    serde_json::from_str(&content).map_err(|source| CheckpointError::Corrupt {
        path: path.to_path_buf(),
        source,
    })
}

/// Write to a temporary sibling, sync, then rename over the target.
fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), CheckpointError> {
    let json = serde_json::to_vec_pretty(value).map_err(|source| CheckpointError::Corrupt {
        path: path.to_path_buf(),
        source,
    })?;

    let tmp = path.with_extension("json.tmp");
    let mut file = File::create(&tmp).map_err(|source| io_err(&tmp, source))?;
    file.write_all(&json).map_err(|source| io_err(&tmp, source))?;
    file.sync_all().map_err(|source| io_err(&tmp, source))?;
    drop(file);

    fs::rename(&tmp, path).map_err(|source| io_err(path, source))?;

    match path.parent() {
        Some(parent) => sync_dir(parent).map_err(|source| io_err(parent, source)),
        None => Ok(()),
    }
}

/// Make a rename inside `dir` durable.
#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn genomes(rows: &[&[u8]]) -> Vec<Genome> {
        rows.iter().map(|r| Genome::new(r.to_vec())).collect()
    }

    #[test]
    fn test_round_trip() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let saved = genomes(&[&[0, 1, 2], &[2, 1, 0], &[1, 1, 1]]);

        store.reset("walk").unwrap();
        store.save("walk", 0, &saved).unwrap();

        let (loaded, generation) = store.load_latest("walk").unwrap();
        assert_eq!(generation, 0);
        assert_eq!(loaded, saved);
    }

    #[test]
    fn test_latest_is_numeric_max() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());

        // Written out of order; 10 sorts before 9 lexically without padding.
        for generation in [2, 10, 9, 0] {
            let g = genomes(&[&[generation as u8]]);
            store.save("walk", generation, &g).unwrap();
        }

        let (loaded, generation) = store.load_latest("walk").unwrap();
        assert_eq!(generation, 10);
        assert_eq!(loaded, genomes(&[&[10]]));
        assert_eq!(store.generations("walk").unwrap(), vec![0, 2, 9, 10]);
    }

    #[test]
    fn test_generation_written_once() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        store.save("walk", 3, &genomes(&[&[0]])).unwrap();

        let second = store.save("walk", 3, &genomes(&[&[1]]));
        assert!(matches!(
            second,
            Err(CheckpointError::AlreadyExists { generation: 3, .. })
        ));
        assert_eq!(store.load("walk", 3).unwrap(), genomes(&[&[0]]));
    }

    #[test]
    fn test_unrecorded_generation_file_is_overwritten() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        store.save("walk", 0, &genomes(&[&[0]])).unwrap();

        // Generation file renamed into place, manifest never updated.
        let orphan = store.experiment_dir("walk").unwrap().join("gen_00001.json");
        fs::copy(
            store.experiment_dir("walk").unwrap().join("gen_00000.json"),
            &orphan,
        )
        .unwrap();
        assert_eq!(store.generations("walk").unwrap(), vec![0]);
        assert_eq!(store.load_latest("walk").unwrap().1, 0);

        store.save("walk", 1, &genomes(&[&[7]])).unwrap();
        assert_eq!(store.generations("walk").unwrap(), vec![0, 1]);
        assert_eq!(store.load("walk", 1).unwrap(), genomes(&[&[7]]));
    }

    #[test]
    fn test_missing_experiment() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());

        assert!(matches!(
            store.load_latest("ghost"),
            Err(CheckpointError::NotFound { .. })
        ));
        assert!(matches!(
            store.load("ghost", 0),
            Err(CheckpointError::MissingGeneration { generation: 0, .. })
        ));
    }

    #[test]
    fn test_reset_clears_snapshots() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        store.save("walk", 0, &genomes(&[&[0]])).unwrap();
        store.save("walk", 1, &genomes(&[&[1]])).unwrap();

        store.reset("walk").unwrap();
        assert!(store.generations("walk").unwrap().is_empty());
        assert!(dir.path().join("walk").is_dir());

        // Index 0 can be written again after a reset.
        store.save("walk", 0, &genomes(&[&[5]])).unwrap();
    }

    #[test]
    fn test_meta_round_trip() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        assert!(store.read_meta("walk").unwrap().is_none());

        let meta = ExperimentMeta {
            seed: 99,
            genome_size: 135,
            population_size: 50,
        };
        store.write_meta("walk", &meta).unwrap();
        assert_eq!(store.read_meta("walk").unwrap(), Some(meta));
    }

    #[test]
    fn test_rejects_path_like_names() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());

        for name in ["", ".", "..", "a/b", "a\\b"] {
            assert!(matches!(
                store.reset(name),
                Err(CheckpointError::InvalidExperimentName(_))
            ));
        }
    }

    #[test]
    fn test_checkpoint_file_is_plain_json() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let path = store.save("walk", 7, &genomes(&[&[0, 1], &[1, 0]])).unwrap();

        assert_eq!(path.file_name().unwrap(), "gen_00007.json");
        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(value["genomes"], serde_json::json!([[0, 1], [1, 0]]));
    }
}
