use crate::attributes::Category;
use crate::persistence::SnapshotFormat;
use rand::SeedableRng;
use rand_pcg::Pcg64;
use std::path::PathBuf;

pub const DEFAULT_SAMPLE_SIZE: usize = 100;
pub const DEFAULT_DATA_PATH: &str = "data";

/// Runtime knobs shared by the CLI and library callers.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Directory for graphs, weight tables and snapshot archives
    pub data_path: PathBuf,
    /// Number of pre-seeded anchors in a repeated-seed run
    pub sample_size: usize,
    /// Fixed generator seed; `None` draws from system entropy
    pub rng_seed: Option<u64>,
    /// Diversity dimension; `None` selects purely on weight
    pub diversity: Option<Category>,
    pub format: SnapshotFormat,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from(DEFAULT_DATA_PATH),
            sample_size: DEFAULT_SAMPLE_SIZE,
            rng_seed: None,
            diversity: None,
            format: SnapshotFormat::Bincode,
        }
    }
}

impl EngineConfig {
    /// Reads `LANDMARK_*` variables; absent or unparsable values keep their default.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let data_path = std::env::var("LANDMARK_DATA_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_path);

        let sample_size = std::env::var("LANDMARK_SAMPLE_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.sample_size);

        let rng_seed = std::env::var("LANDMARK_RNG_SEED")
            .ok()
            .and_then(|s| s.parse().ok());

        let diversity = std::env::var("LANDMARK_DIVERSITY")
            .ok()
            .and_then(|s| s.parse().ok());

        let format = std::env::var("LANDMARK_FORMAT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.format);

        Self {
            data_path,
            sample_size,
            rng_seed,
            diversity,
            format,
        }
    }

    /// The generator every seed policy draws from.
    pub fn rng(&self) -> Pcg64 {
        match self.rng_seed {
            Some(seed) => Pcg64::seed_from_u64(seed),
            None => Pcg64::from_rng(&mut rand::rng()),
        }
    }
}
