pub mod embedding;
pub mod engine;
pub mod initializer;
pub mod optimizer;
pub mod retriever;
pub mod trainer;

use ndarray::Array1;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::config::{ModelConfig, TrainingConfig};
use crate::error::{RecommenderError, Result};
use crate::models::{FitReport, Id, Interaction, SerializedModel, Side, MODEL_FORMAT_VERSION};
use crate::services::identity::{IdentityIndex, InMemoryIdentityIndex};
use crate::services::persistence;
use crate::utils::{mean_squared_error, validation};
use self::embedding::{EmbeddingMatrix, EmbeddingStore};
use self::engine::{NdarrayEngine, NumericEngine};

/// Latent-factor model trained incrementally over user/entity interactions.
///
/// Repeated [`fit`](Self::fit) calls extend what the model knows: new ids get
/// fresh rows, existing rows and optimizer state carry over.
pub struct CollaborativeFiltering {
    config: ModelConfig,
    training: TrainingConfig,
    index: Box<dyn IdentityIndex>,
    engine: Box<dyn NumericEngine>,
    store: EmbeddingStore,
}

impl std::fmt::Debug for CollaborativeFiltering {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollaborativeFiltering")
            .field("config", &self.config)
            .field("initialized", &self.store.is_initialized())
            .field("users", &self.store.rows(Side::User))
            .field("entities", &self.store.rows(Side::Entity))
            .finish()
    }
}

impl CollaborativeFiltering {
    pub fn new(config: ModelConfig) -> Result<Self> {
        Self::with_training(config, TrainingConfig::default())
    }

    pub fn with_training(config: ModelConfig, training: TrainingConfig) -> Result<Self> {
        Self::with_index(config, training, Box::new(InMemoryIdentityIndex::new()))
    }

    pub fn with_index(
        config: ModelConfig,
        training: TrainingConfig,
        index: Box<dyn IdentityIndex>,
    ) -> Result<Self> {
        config.validate()?;
        training.validate()?;
        let engine = Box::new(NdarrayEngine::from_config(&config, &training));
        Ok(Self::from_parts(config, training, index, engine))
    }

    /// Assembles a model from already validated parts.
    pub fn from_parts(
        config: ModelConfig,
        training: TrainingConfig,
        index: Box<dyn IdentityIndex>,
        engine: Box<dyn NumericEngine>,
    ) -> Self {
        let store = EmbeddingStore::new(config.embedding_size);
        Self {
            config,
            training,
            index,
            engine,
            store,
        }
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn index(&self) -> &dyn IdentityIndex {
        self.index.as_ref()
    }

    pub fn is_initialized(&self) -> bool {
        self.store.is_initialized()
    }

    pub fn user_count(&self) -> usize {
        self.store.rows(Side::User)
    }

    pub fn entity_count(&self) -> usize {
        self.store.rows(Side::Entity)
    }

    /// Registers new ids, sizes the embeddings, then trains for the configured
    /// number of epochs. An empty slice is a no-op.
    pub async fn fit(&mut self, interactions: &[Interaction]) -> Result<FitReport> {
        if interactions.is_empty() {
            debug!("fit called with no interactions");
            return Ok(FitReport::default());
        }
        validation::validate_interactions(interactions)?;

        let yield_every = self.training.yield_every_chunks;
        let registration = trainer::register(
            self.index.as_mut(),
            interactions,
            self.training.registration_chunk_size,
            yield_every,
        )
        .await;

        trainer::size_store(
            &mut self.store,
            self.engine.as_mut(),
            self.index.as_ref(),
            self.config.batch_size,
            yield_every,
        )
        .await?;

        let mut report = FitReport {
            interactions: interactions.len(),
            new_users: registration.new_users,
            new_entities: registration.new_entities,
            epochs: self.config.epoch,
            ..FitReport::default()
        };

        for epoch in 0..self.config.epoch {
            let outcome = trainer::run_epoch(
                &mut self.store,
                self.engine.as_mut(),
                self.index.as_ref(),
                interactions,
                self.config.batch_size,
                yield_every,
            )
            .await;
            debug!(epoch = epoch + 1, loss = ?outcome.loss, skipped = outcome.skipped, "epoch finished");

            report.skipped += outcome.skipped;
            if let Some(loss) = outcome.loss {
                report.epoch_losses.push(loss);
            }
        }

        info!(
            interactions = report.interactions,
            new_users = report.new_users,
            new_entities = report.new_entities,
            users = self.user_count(),
            entities = self.entity_count(),
            loss = ?report.final_loss(),
            "fit completed"
        );
        Ok(report)
    }

    async fn query_row(&self, side: Side, id: &Id) -> Option<Array1<f32>> {
        let slot = self.index.get_index(side, id).await?;
        self.store.read_row(side, slot)
    }

    async fn rank_opposite(&self, side: Side, id: &Id, k: usize) -> Vec<(Id, f32)> {
        let Some(query) = self.query_row(side, id).await else {
            return Vec::new();
        };
        let opposite = side.opposite();
        let candidate_ids = self.index.all_ids(opposite).await;
        retriever::score_and_rank(
            self.engine.as_ref(),
            query.view(),
            self.store.matrix(opposite).view(),
            &candidate_ids,
            k,
        )
    }

    /// Top-`k` entities for `user`; empty when the user is unknown.
    pub async fn get_entities(&self, user: &Id, k: usize) -> Vec<Id> {
        self.get_entities_scored(user, k)
            .await
            .into_iter()
            .map(|(id, _)| id)
            .collect()
    }

    pub async fn get_entities_scored(&self, user: &Id, k: usize) -> Vec<(Id, f32)> {
        self.rank_opposite(Side::User, user, k).await
    }

    /// Top-`k` users likely to engage with `entity`; empty when it is unknown.
    pub async fn get_users(&self, entity: &Id, k: usize) -> Vec<Id> {
        self.get_users_scored(entity, k)
            .await
            .into_iter()
            .map(|(id, _)| id)
            .collect()
    }

    pub async fn get_users_scored(&self, entity: &Id, k: usize) -> Vec<(Id, f32)> {
        self.rank_opposite(Side::Entity, entity, k).await
    }

    pub async fn user_embedding(&self, user: &Id) -> Option<Vec<f32>> {
        self.query_row(Side::User, user).await.map(|row| row.to_vec())
    }

    pub async fn entity_embedding(&self, entity: &Id) -> Option<Vec<f32>> {
        self.query_row(Side::Entity, entity).await.map(|row| row.to_vec())
    }

    pub async fn predict(&self, user: &Id, entity: &Id) -> Option<f32> {
        let user_row = self.query_row(Side::User, user).await?;
        let entity_row = self.query_row(Side::Entity, entity).await?;
        Some(self.engine.dot(user_row.view(), entity_row.view()))
    }

    /// Mean squared error over interactions whose ids are both known.
    pub async fn evaluate(&self, interactions: &[Interaction]) -> Option<f64> {
        let mut errors = Vec::with_capacity(interactions.len());
        for interaction in interactions {
            if let Some(prediction) = self.predict(&interaction.user, &interaction.entity).await {
                errors.push(prediction - interaction.target());
            }
        }
        mean_squared_error(errors)
    }

    pub async fn export(&self) -> Result<SerializedModel> {
        if !self.store.is_initialized() {
            return Err(RecommenderError::NotInitialized);
        }
        let snapshot = self.index.export_snapshot().await;
        Ok(SerializedModel {
            version: MODEL_FORMAT_VERSION.to_string(),
            config: self.config.clone(),
            user_embeddings: self.store.matrix(Side::User).to_nested(),
            entity_embeddings: self.store.matrix(Side::Entity).to_nested(),
            user_map: snapshot.user_map,
            entity_map: snapshot.entity_map,
            reverse_user_map: snapshot.reverse_user_map,
            reverse_entity_map: snapshot.reverse_entity_map,
            initialized: true,
        })
    }

    /// Rebuilds a model from a document without training.
    ///
    /// The index snapshot is loaded into `index`, or into a fresh in-memory
    /// index when none is given. Documents from another format version are
    /// accepted with a warning; shape inconsistencies are rejected as corrupt.
    pub async fn import(document: SerializedModel, index: Option<Box<dyn IdentityIndex>>) -> Result<Self> {
        Self::import_with_training(document, index, TrainingConfig::default()).await
    }

    pub async fn import_with_training(
        document: SerializedModel,
        index: Option<Box<dyn IdentityIndex>>,
        training: TrainingConfig,
    ) -> Result<Self> {
        if document.version != MODEL_FORMAT_VERSION {
            warn!(
                found = %document.version,
                supported = MODEL_FORMAT_VERSION,
                "model format version mismatch, loading as-is"
            );
        }
        validation::validate_serialized_model(&document)?;

        let mut index =
            index.unwrap_or_else(|| Box::new(InMemoryIdentityIndex::new()) as Box<dyn IdentityIndex>);
        index.import_snapshot(document.index_snapshot()).await?;

        let width = document.config.embedding_size;
        let users = EmbeddingMatrix::from_rows(&document.user_embeddings, width)?;
        let entities = EmbeddingMatrix::from_rows(&document.entity_embeddings, width)?;

        let mut model = Self::with_index(document.config, training, index)?;
        model.store = EmbeddingStore::from_matrices(users, entities, document.initialized);
        info!(
            users = model.user_count(),
            entities = model.entity_count(),
            "imported model"
        );
        Ok(model)
    }

    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let document = self.export().await?;
        persistence::save_model(&document, path.as_ref()).await
    }

    pub async fn from_path(path: impl AsRef<Path>, index: Option<Box<dyn IdentityIndex>>) -> Result<Self> {
        let document = persistence::load_model(path.as_ref()).await?;
        Self::import(document, index).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config(epoch: usize) -> ModelConfig {
        ModelConfig::new(epoch, 8, 0.01, 4)
    }

    fn seeded(seed: u64) -> TrainingConfig {
        TrainingConfig {
            seed: Some(seed),
            registration_chunk_size: 2,
            yield_every_chunks: 1,
            ..TrainingConfig::default()
        }
    }

    fn sample() -> Vec<Interaction> {
        vec![
            Interaction::rated("u1", "e1", 5.0),
            Interaction::rated("u1", "e2", 1.0),
            Interaction::rated("u2", "e2", 4.0),
            Interaction::new("u3", Id::Int(7)),
        ]
    }

    #[tokio::test]
    async fn test_single_interaction_recommends_its_entity() {
        let mut model = CollaborativeFiltering::with_training(small_config(5), seeded(1)).unwrap();
        model.fit(&[Interaction::rated("u1", "e1", 5.0)]).await.unwrap();
        assert_eq!(model.get_entities(&Id::from("u1"), 1).await, vec![Id::from("e1")]);
        assert_eq!(model.get_users(&Id::from("e1"), 3).await, vec![Id::from("u1")]);
    }

    #[tokio::test]
    async fn test_empty_fit_is_noop() {
        let mut model = CollaborativeFiltering::new(small_config(1)).unwrap();
        let report = model.fit(&[]).await.unwrap();
        assert_eq!(report, FitReport::default());
        assert!(!model.is_initialized());
        assert!(matches!(model.export().await, Err(RecommenderError::NotInitialized)));
    }

    #[tokio::test]
    async fn test_rows_match_index_population() {
        let mut model = CollaborativeFiltering::with_training(small_config(2), seeded(2)).unwrap();
        let report = model.fit(&sample()).await.unwrap();
        assert_eq!(report.new_users, 3);
        assert_eq!(report.new_entities, 3);
        assert_eq!(report.epoch_losses.len(), 2);
        assert_eq!(model.user_count(), model.index().len(Side::User).await);
        assert_eq!(model.entity_count(), model.index().len(Side::Entity).await);
    }

    #[tokio::test]
    async fn test_incremental_fit_grows_and_preserves_rows() {
        // Zero epochs isolates registration and sizing from gradient updates.
        let mut model = CollaborativeFiltering::with_training(small_config(0), seeded(3)).unwrap();
        model.fit(&sample()).await.unwrap();
        let before = model.user_embedding(&Id::from("u1")).await.unwrap();
        let entities_before = model.entity_count();

        let report = model
            .fit(&[Interaction::new("u1", "e9"), Interaction::new("u4", "e1")])
            .await
            .unwrap();
        assert_eq!(report.new_entities, 1);
        assert_eq!(report.new_users, 1);
        assert_eq!(model.entity_count(), entities_before + 1);
        assert_eq!(model.user_embedding(&Id::from("u1")).await.unwrap(), before);
        assert!(model.index().all_entities().await.contains(&Id::from("e9")));
    }

    #[tokio::test]
    async fn test_unknown_ids_rank_empty() {
        let mut model = CollaborativeFiltering::with_training(small_config(1), seeded(4)).unwrap();
        assert!(model.get_entities(&Id::from("nobody"), 5).await.is_empty());
        model.fit(&sample()).await.unwrap();
        assert!(model.get_entities(&Id::from("nobody"), 5).await.is_empty());
        assert!(model.get_users(&Id::Int(99), 5).await.is_empty());
        assert_eq!(model.predict(&Id::from("nobody"), &Id::from("e1")).await, None);
    }

    #[tokio::test]
    async fn test_untrained_entity_still_ranks_users() {
        let mut model = CollaborativeFiltering::with_training(small_config(0), seeded(5)).unwrap();
        model
            .fit(&[
                Interaction::new("u1", "e1"),
                Interaction::new("u2", "e1"),
                Interaction::new("u2", "lonely"),
            ])
            .await
            .unwrap();
        let users = model.get_users(&Id::from("lonely"), 5).await;
        assert_eq!(users.len(), 2);
        assert!(users.contains(&Id::from("u1")) && users.contains(&Id::from("u2")));
    }

    #[tokio::test]
    async fn test_rejects_non_finite_rating_without_mutation() {
        let mut model = CollaborativeFiltering::new(small_config(1)).unwrap();
        let err = model
            .fit(&[Interaction::new("u1", "e1"), Interaction::rated("u2", "e2", f32::NAN)])
            .await
            .unwrap_err();
        assert!(matches!(err, RecommenderError::InvalidInteraction { position: 1, .. }));
        assert_eq!(model.index().len(Side::User).await, 0);
        assert!(!model.is_initialized());
    }

    #[tokio::test]
    async fn test_export_import_is_inference_identical() {
        let mut model = CollaborativeFiltering::with_training(small_config(3), seeded(6)).unwrap();
        model.fit(&sample()).await.unwrap();

        let document = model.export().await.unwrap();
        assert_eq!(document.version, MODEL_FORMAT_VERSION);
        assert!(document.initialized);
        let json = document.to_json().unwrap();
        let restored = CollaborativeFiltering::import(SerializedModel::from_json(&json).unwrap(), None)
            .await
            .unwrap();

        for user in ["u1", "u2", "u3"] {
            let id = Id::from(user);
            assert_eq!(
                model.get_entities_scored(&id, 10).await,
                restored.get_entities_scored(&id, 10).await
            );
        }
        assert_eq!(restored.export().await.unwrap(), document);
    }

    #[tokio::test]
    async fn test_import_accepts_other_version() {
        let mut model = CollaborativeFiltering::with_training(small_config(1), seeded(7)).unwrap();
        model.fit(&sample()).await.unwrap();
        let mut document = model.export().await.unwrap();
        document.version = "0.9.0".to_string();

        let restored = CollaborativeFiltering::import(document, None).await.unwrap();
        assert!(restored.is_initialized());
        assert_eq!(restored.user_count(), 3);
    }

    #[tokio::test]
    async fn test_imported_model_keeps_training() {
        let mut model = CollaborativeFiltering::with_training(small_config(1), seeded(8)).unwrap();
        model.fit(&sample()).await.unwrap();
        let document = model.export().await.unwrap();

        let mut restored = CollaborativeFiltering::import(document, None).await.unwrap();
        let report = restored.fit(&[Interaction::new("u9", "e1")]).await.unwrap();
        assert_eq!(report.new_users, 1);
        assert_eq!(restored.user_count(), 4);
        assert_eq!(restored.entity_count(), 3);
    }

    #[tokio::test]
    async fn test_import_rejects_rows_marked_uninitialized() {
        let mut model = CollaborativeFiltering::with_training(small_config(1), seeded(10)).unwrap();
        model.fit(&sample()).await.unwrap();
        let mut document = model.export().await.unwrap();
        document.initialized = false;

        let result = CollaborativeFiltering::import(document, None).await;
        assert!(matches!(result, Err(RecommenderError::Corrupt(_))));
    }

    #[tokio::test]
    async fn test_fit_after_import_keeps_imported_rows() {
        let mut model = CollaborativeFiltering::with_training(small_config(1), seeded(11)).unwrap();
        model.fit(&sample()).await.unwrap();
        let mut document = model.export().await.unwrap();
        document.config.epoch = 0;

        let mut restored = CollaborativeFiltering::import(document, None).await.unwrap();
        let before = restored.user_embedding(&Id::from("u1")).await.unwrap();
        restored.fit(&[Interaction::new("u7", "e1")]).await.unwrap();

        assert_eq!(restored.user_embedding(&Id::from("u1")).await.unwrap(), before);
        assert_eq!(restored.index().get_index(Side::User, &Id::from("u1")).await, Some(0));
        assert_eq!(restored.user_count(), 4);
    }

    #[tokio::test]
    async fn test_evaluate_skips_unknown_pairs() {
        let mut model = CollaborativeFiltering::with_training(small_config(1), seeded(9)).unwrap();
        assert_eq!(model.evaluate(&sample()).await, None);
        model.fit(&sample()).await.unwrap();
        let known = model.evaluate(&sample()).await.unwrap();
        let mixed = model
            .evaluate(&[sample(), vec![Interaction::new("ghost", "e1")]].concat())
            .await
            .unwrap();
        assert_eq!(known, mixed);
    }
}
