use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::algorithms::initializer::InitializationMethod;
use crate::error::{RecommenderError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub model: ModelConfig,
    pub training: TrainingConfig,
    pub storage: StorageConfig,
}

/// Hyperparameters persisted alongside the embeddings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    pub epoch: usize,
    // Aliases cover config sources that lowercase keys.
    #[serde(alias = "embeddingsize", alias = "embedding_size")]
    pub embedding_size: usize,
    #[serde(alias = "learningrate", alias = "learning_rate")]
    pub learning_rate: f64,
    #[serde(alias = "batchsize", alias = "batch_size")]
    pub batch_size: usize,
}

/// Runtime knobs of the training loop. Not part of the serialized model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub registration_chunk_size: usize,
    /// Number of processed chunks between cooperative yields.
    pub yield_every_chunks: usize,
    pub seed: Option<u64>,
    pub initialization: InitializationMethod,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub model_path: PathBuf,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            epoch: 10,
            embedding_size: 32,
            learning_rate: 0.001,
            batch_size: 64,
        }
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            registration_chunk_size: 1000,
            yield_every_chunks: 10,
            seed: None,
            initialization: InitializationMethod::Normal {
                mean: 0.0,
                std_dev: 1.0,
            },
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/model.json"),
        }
    }
}

impl ModelConfig {
    pub fn new(epoch: usize, embedding_size: usize, learning_rate: f64, batch_size: usize) -> Self {
        Self {
            epoch,
            embedding_size,
            learning_rate,
            batch_size,
        }
    }

    /// Zero epochs is allowed and means register and size without training.
    pub fn validate(&self) -> Result<()> {
        if self.embedding_size == 0 {
            return Err(RecommenderError::InvalidConfig(
                "embeddingSize must be greater than 0".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(RecommenderError::InvalidConfig(
                "batchSize must be greater than 0".to_string(),
            ));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(RecommenderError::InvalidConfig(format!(
                "learningRate must be a positive finite number, got {}",
                self.learning_rate
            )));
        }
        Ok(())
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.registration_chunk_size == 0 {
            return Err(RecommenderError::InvalidConfig(
                "registration_chunk_size must be greater than 0".to_string(),
            ));
        }
        if self.yield_every_chunks == 0 {
            return Err(RecommenderError::InvalidConfig(
                "yield_every_chunks must be greater than 0".to_string(),
            ));
        }
        self.initialization.validate()
    }
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("EMBEDREC").separator("__"))
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.model.validate()?;
        self.training.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_degenerate_model_config() {
        assert!(ModelConfig::new(1, 0, 0.01, 8).validate().is_err());
        assert!(ModelConfig::new(1, 4, 0.01, 0).validate().is_err());
        assert!(ModelConfig::new(1, 4, 0.0, 8).validate().is_err());
        assert!(ModelConfig::new(1, 4, f64::NAN, 8).validate().is_err());
        assert!(ModelConfig::new(0, 4, 0.01, 8).validate().is_ok());
    }

    #[test]
    fn test_from_file_layers_over_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[model]\nepoch = 3\nembeddingSize = 8\nlearningRate = 0.05\nbatchSize = 16\n\n[training]\nseed = 7"
        )
        .unwrap();

        let config = Config::from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.model, ModelConfig::new(3, 8, 0.05, 16));
        assert_eq!(config.training.seed, Some(7));
        assert_eq!(config.training.registration_chunk_size, 1000);
        assert_eq!(config.storage.model_path, PathBuf::from("models/model.json"));
    }
}
