use std::path::PathBuf;
use thiserror::Error;

/// Failures surfaced by the recommender library.
#[derive(Debug, Error)]
pub enum RecommenderError {
    /// The embedding store has never been sized; train the model first.
    #[error("model is not initialized, call fit before exporting")]
    NotInitialized,

    #[error("model file not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// The serialized document could not be parsed or is internally inconsistent.
    #[error("corrupt model document: {0}")]
    Corrupt(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid interaction at position {position}: {reason}")]
    InvalidInteraction { position: usize, reason: String },

    #[error("embedding shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RecommenderError>;
