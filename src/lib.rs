pub mod algorithms;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::algorithms::CollaborativeFiltering;
pub use crate::config::{Config, ModelConfig, TrainingConfig};
pub use crate::error::{RecommenderError, Result};
pub use crate::models::*;
pub use crate::services::identity::{IdentityIndex, InMemoryIdentityIndex};
pub use crate::services::recommendation::RecommendationService;

/// Installs the global `tracing` subscriber, filtered by `RUST_LOG`.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
