//! Phases of one `fit` call: register ids, size the store, then run the
//! sequential per-interaction gradient steps.

use ndarray::Array1;
use tracing::{debug, trace};

use super::embedding::EmbeddingStore;
use super::engine::NumericEngine;
use super::optimizer::ParamKey;
use crate::error::Result;
use crate::models::{Interaction, Side};
use crate::services::identity::IdentityIndex;
use crate::utils::{mean_squared_error, YieldBudget};

/// Slots created by one registration pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Registration {
    pub new_users: usize,
    pub new_entities: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EpochOutcome {
    pub loss: Option<f64>,
    pub trained: usize,
    pub skipped: usize,
}

pub async fn register(
    index: &mut dyn IdentityIndex,
    interactions: &[Interaction],
    chunk_size: usize,
    yield_every: usize,
) -> Registration {
    let users_before = index.len(Side::User).await;
    let entities_before = index.len(Side::Entity).await;
    let mut budget = YieldBudget::new(yield_every);

    for chunk in interactions.chunks(chunk_size.max(1)) {
        for interaction in chunk {
            index.get_or_create_index(Side::User, &interaction.user).await;
            index.get_or_create_index(Side::Entity, &interaction.entity).await;
        }
        budget.tick().await;
    }

    let registration = Registration {
        new_users: index.len(Side::User).await - users_before,
        new_entities: index.len(Side::Entity).await - entities_before,
    };
    debug!(
        new_users = registration.new_users,
        new_entities = registration.new_entities,
        "registered interaction ids"
    );
    registration
}

/// Initializes the store on first use, otherwise appends one row per slot the
/// index holds beyond the current row count.
pub async fn size_store(
    store: &mut EmbeddingStore,
    engine: &mut dyn NumericEngine,
    index: &dyn IdentityIndex,
    chunk_rows: usize,
    yield_every: usize,
) -> Result<()> {
    let users = index.len(Side::User).await;
    let entities = index.len(Side::Entity).await;

    if !store.is_initialized() {
        store.initialize(engine, users, entities, chunk_rows, yield_every).await
    } else {
        let new_users = users.saturating_sub(store.rows(Side::User));
        let new_entities = entities.saturating_sub(store.rows(Side::Entity));
        store.grow(engine, new_users, new_entities, chunk_rows, yield_every).await
    }
}

/// One squared-error gradient step on a single (user, entity) pair.
///
/// Both gradients come from the rows as they were before this step. Returns
/// the prediction error observed before the update.
pub fn train_step(
    store: &mut EmbeddingStore,
    engine: &mut dyn NumericEngine,
    user_slot: usize,
    entity_slot: usize,
    target: f32,
) -> Option<f32> {
    let mut user_row = store.read_row(Side::User, user_slot)?;
    let mut entity_row = store.read_row(Side::Entity, entity_slot)?;

    let prediction = engine.dot(user_row.view(), entity_row.view());
    let error = prediction - target;

    let user_gradient: Array1<f32> = &entity_row * (2.0 * error);
    let entity_gradient: Array1<f32> = &user_row * (2.0 * error);

    engine.apply_gradient(ParamKey::user(user_slot), &mut user_row, user_gradient.view());
    engine.apply_gradient(ParamKey::entity(entity_slot), &mut entity_row, entity_gradient.view());

    store.write_row(Side::User, user_slot, user_row.view());
    store.write_row(Side::Entity, entity_slot, entity_row.view());
    Some(error)
}

/// Runs one pass over `interactions` in chunks of `batch_size`, strictly in order.
pub async fn run_epoch(
    store: &mut EmbeddingStore,
    engine: &mut dyn NumericEngine,
    index: &dyn IdentityIndex,
    interactions: &[Interaction],
    batch_size: usize,
    yield_every: usize,
) -> EpochOutcome {
    let mut budget = YieldBudget::new(yield_every);
    let mut errors = Vec::with_capacity(interactions.len());
    let mut skipped = 0;

    for chunk in interactions.chunks(batch_size.max(1)) {
        for interaction in chunk {
            let user_slot = index.get_index(Side::User, &interaction.user).await;
            let entity_slot = index.get_index(Side::Entity, &interaction.entity).await;

            let error = match (user_slot, entity_slot) {
                (Some(user_slot), Some(entity_slot)) => {
                    train_step(store, engine, user_slot, entity_slot, interaction.target())
                }
                _ => None,
            };

            match error {
                Some(error) => errors.push(error),
                None => {
                    skipped += 1;
                    trace!(user = %interaction.user, entity = %interaction.entity, "skipped unresolved interaction");
                }
            }
        }
        budget.tick().await;
    }

    EpochOutcome {
        trained: errors.len(),
        loss: mean_squared_error(errors),
        skipped,
    }
}
