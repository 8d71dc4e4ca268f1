use ndarray::{concatenate, Array1, Array2, ArrayView1, ArrayView2, Axis};
use tracing::debug;

use super::engine::NumericEngine;
use crate::error::{RecommenderError, Result};
use crate::models::Side;
use crate::utils::YieldBudget;

/// One growable arena of fixed-width rows, addressed by slot.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingMatrix {
    data: Array2<f32>,
}

impl EmbeddingMatrix {
    pub fn empty(width: usize) -> Self {
        Self {
            data: Array2::zeros((0, width)),
        }
    }

    /// Copies nested rows verbatim. Every row must be exactly `width` long.
    pub fn from_rows(rows: &[Vec<f32>], width: usize) -> Result<Self> {
        let mut values = Vec::with_capacity(rows.len() * width);
        for (slot, row) in rows.iter().enumerate() {
            if row.len() != width {
                return Err(RecommenderError::Corrupt(format!(
                    "row {} has {} values, expected {}",
                    slot,
                    row.len(),
                    width
                )));
            }
            values.extend_from_slice(row);
        }
        Ok(Self {
            data: Array2::from_shape_vec((rows.len(), width), values)?,
        })
    }

    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    pub fn view(&self) -> ArrayView2<'_, f32> {
        self.data.view()
    }

    pub fn row(&self, slot: usize) -> Option<ArrayView1<'_, f32>> {
        (slot < self.rows()).then(|| self.data.row(slot))
    }

    /// Overwrites an existing row.
    ///
    /// # Panics
    /// When `slot` is outside the matrix or `values` has the wrong width. Either
    /// means registration and sizing fell out of step.
    pub fn write_row(&mut self, slot: usize, values: ArrayView1<'_, f32>) {
        assert!(
            slot < self.rows(),
            "write to embedding row {} but matrix has {} rows",
            slot,
            self.rows()
        );
        assert_eq!(values.len(), self.width(), "embedding row width mismatch");
        self.data.row_mut(slot).assign(&values);
    }

    pub fn to_nested(&self) -> Vec<Vec<f32>> {
        self.data.rows().into_iter().map(|row| row.to_vec()).collect()
    }

    /// Appends `additional` random rows. The replacement array is fully built
    /// before it takes the place of the old one.
    async fn append_random(
        &mut self,
        engine: &mut dyn NumericEngine,
        additional: usize,
        chunk_rows: usize,
        budget: &mut YieldBudget,
    ) -> Result<()> {
        if additional == 0 {
            return Ok(());
        }
        let width = self.width();
        let chunk_rows = chunk_rows.max(1);

        let mut chunks: Vec<Array2<f32>> = Vec::with_capacity(additional / chunk_rows + 1);
        let mut remaining = additional;
        while remaining > 0 {
            let take = remaining.min(chunk_rows);
            chunks.push(engine.random_rows(take, width));
            remaining -= take;
            budget.tick().await;
        }

        let mut views: Vec<ArrayView2<'_, f32>> = Vec::with_capacity(chunks.len() + 1);
        views.push(self.data.view());
        views.extend(chunks.iter().map(|chunk| chunk.view()));
        let grown = concatenate(Axis(0), &views)?;
        drop(views);

        self.data = grown;
        Ok(())
    }
}

/// User and entity factor matrices plus the initialization flag.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingStore {
    users: EmbeddingMatrix,
    entities: EmbeddingMatrix,
    width: usize,
    initialized: bool,
}

impl EmbeddingStore {
    pub fn new(width: usize) -> Self {
        Self {
            users: EmbeddingMatrix::empty(width),
            entities: EmbeddingMatrix::empty(width),
            width,
            initialized: false,
        }
    }

    pub fn from_matrices(users: EmbeddingMatrix, entities: EmbeddingMatrix, initialized: bool) -> Self {
        let width = users.width();
        Self {
            users,
            entities,
            width,
            initialized,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn matrix(&self, side: Side) -> &EmbeddingMatrix {
        match side {
            Side::User => &self.users,
            Side::Entity => &self.entities,
        }
    }

    fn matrix_mut(&mut self, side: Side) -> &mut EmbeddingMatrix {
        match side {
            Side::User => &mut self.users,
            Side::Entity => &mut self.entities,
        }
    }

    pub fn rows(&self, side: Side) -> usize {
        self.matrix(side).rows()
    }

    pub fn read_row(&self, side: Side, slot: usize) -> Option<Array1<f32>> {
        self.matrix(side).row(slot).map(|row| row.to_owned())
    }

    pub fn write_row(&mut self, side: Side, slot: usize, values: ArrayView1<'_, f32>) {
        self.matrix_mut(side).write_row(slot, values);
    }

    /// Sizes both matrices from scratch, in chunks of `chunk_rows`.
    ///
    /// # Panics
    /// If the store is already initialized.
    pub async fn initialize(
        &mut self,
        engine: &mut dyn NumericEngine,
        users: usize,
        entities: usize,
        chunk_rows: usize,
        yield_every: usize,
    ) -> Result<()> {
        assert!(!self.initialized, "embedding store is already initialized");
        let mut budget = YieldBudget::new(yield_every);

        let mut fresh_users = EmbeddingMatrix::empty(self.width);
        fresh_users.append_random(engine, users, chunk_rows, &mut budget).await?;
        let mut fresh_entities = EmbeddingMatrix::empty(self.width);
        fresh_entities.append_random(engine, entities, chunk_rows, &mut budget).await?;

        self.users = fresh_users;
        self.entities = fresh_entities;
        self.initialized = true;
        debug!(users, entities, width = self.width, "initialized embedding store");
        Ok(())
    }

    /// Appends fresh rows without touching existing ones.
    ///
    /// # Panics
    /// If the store has not been initialized.
    pub async fn grow(
        &mut self,
        engine: &mut dyn NumericEngine,
        new_users: usize,
        new_entities: usize,
        chunk_rows: usize,
        yield_every: usize,
    ) -> Result<()> {
        assert!(self.initialized, "cannot grow an uninitialized embedding store");
        let mut budget = YieldBudget::new(yield_every);

        self.users.append_random(engine, new_users, chunk_rows, &mut budget).await?;
        self.entities.append_random(engine, new_entities, chunk_rows, &mut budget).await?;
        if new_users > 0 || new_entities > 0 {
            debug!(new_users, new_entities, "grew embedding store");
        }
        Ok(())
    }
}
