use std::path::Path;
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::info;

use crate::algorithms::CollaborativeFiltering;
use crate::config::Config;
use crate::error::{RecommenderError, Result};
use crate::models::{FitReport, Id, Interaction, SerializedModel};
use crate::services::persistence;

/// Cloneable handle sharing one model between tasks.
///
/// Training holds the write lock for the whole `fit`, so readers see either
/// the state before a call or the state after it.
pub struct RecommendationService {
    model: Arc<RwLock<CollaborativeFiltering>>,
    config: Arc<Config>,
}

impl RecommendationService {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let model = CollaborativeFiltering::with_training(config.model.clone(), config.training.clone())?;
        Ok(Self::from_model(model, config))
    }

    pub fn from_model(model: CollaborativeFiltering, config: Config) -> Self {
        Self {
            model: Arc::new(RwLock::new(model)),
            config: Arc::new(config),
        }
    }

    /// Resumes from the configured model path when a saved model exists,
    /// otherwise starts untrained.
    pub async fn open(config: Config) -> Result<Self> {
        let path = config.storage.model_path.clone();
        match persistence::load_model(&path).await {
            Ok(document) => {
                let model =
                    CollaborativeFiltering::import_with_training(document, None, config.training.clone()).await?;
                info!(path = %path.display(), "resumed saved model");
                Ok(Self::from_model(model, config))
            }
            Err(RecommenderError::NotFound { .. }) => {
                info!(path = %path.display(), "no saved model, starting fresh");
                Self::new(config)
            }
            Err(e) => Err(e),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn fit(&self, interactions: &[Interaction]) -> Result<FitReport> {
        let mut model = self.model.write().await;
        model.fit(interactions).await
    }

    pub async fn recommend(&self, user: &Id, k: usize) -> Vec<(Id, f32)> {
        self.model.read().await.get_entities_scored(user, k).await
    }

    pub async fn audience(&self, entity: &Id, k: usize) -> Vec<(Id, f32)> {
        self.model.read().await.get_users_scored(entity, k).await
    }

    pub async fn export(&self) -> Result<SerializedModel> {
        self.model.read().await.export().await
    }

    pub async fn save(&self) -> Result<()> {
        self.save_to(&self.config.storage.model_path).await
    }

    pub async fn save_to(&self, path: &Path) -> Result<()> {
        self.model.read().await.save(path).await?;
        info!(path = %path.display(), "model saved");
        Ok(())
    }

    /// Read access to the shared model; blocks training while held.
    pub async fn read(&self) -> RwLockReadGuard<'_, CollaborativeFiltering> {
        self.model.read().await
    }
}

impl Clone for RecommendationService {
    fn clone(&self) -> Self {
        Self {
            model: self.model.clone(),
            config: self.config.clone(),
        }
    }
}
