use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RankError>;

#[derive(Debug, Error)]
pub enum RankError {
    /// The max-edge seed policy needs at least one edge.
    #[error("graph has no edges")]
    EmptyGraph,
    #[error("no eligible seed anchor for query {query} (claimed country {country})")]
    NoEligibleSeed { query: String, country: String },
    /// Cluster bookkeeping disagrees with the category universe.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<bincode::Error> for RankError {
    fn from(e: bincode::Error) -> Self {
        RankError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for RankError {
    fn from(e: serde_json::Error) -> Self {
        RankError::Serialization(e.to_string())
    }
}
