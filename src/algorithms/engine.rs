//! Numeric primitives the model core is written against.
//!
//! The core never touches a random generator or an optimizer directly; it asks
//! a [`NumericEngine`] for fresh rows, scores, and gradient steps. The default
//! [`NdarrayEngine`] does the linear algebra with `ndarray`, runs the
//! optimizer over `nalgebra` vectors, and draws from a seedable `StdRng`.

use nalgebra::DVector;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::SeedableRng;

use super::initializer::InitializationMethod;
use super::optimizer::{Adam, Optimizer, ParamKey};
use crate::config::{ModelConfig, TrainingConfig};

pub trait NumericEngine: Send + Sync {
    /// Fresh `rows x cols` block drawn from a zero-mean distribution.
    fn random_rows(&mut self, rows: usize, cols: usize) -> Array2<f32>;

    fn dot(&self, a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>) -> f32 {
        a.dot(&b)
    }

    fn mat_vec(&self, matrix: ArrayView2<'_, f32>, vector: ArrayView1<'_, f32>) -> Array1<f32> {
        matrix.dot(&vector)
    }

    /// Applies one optimizer step to `params` for the parameter named by `key`.
    fn apply_gradient(&mut self, key: ParamKey, params: &mut Array1<f32>, gradient: ArrayView1<'_, f32>);
}

pub struct NdarrayEngine<O: Optimizer = Adam> {
    initialization: InitializationMethod,
    rng: StdRng,
    optimizer: O,
}

impl NdarrayEngine<Adam> {
    /// Adam at the model's learning rate; seeded when the training config asks for it.
    pub fn from_config(model: &ModelConfig, training: &TrainingConfig) -> Self {
        Self::with_optimizer(
            training.initialization.clone(),
            training.seed,
            Adam::with_learning_rate(model.learning_rate),
        )
    }
}

impl<O: Optimizer> NdarrayEngine<O> {
    pub fn with_optimizer(initialization: InitializationMethod, seed: Option<u64>, optimizer: O) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            initialization,
            rng,
            optimizer,
        }
    }

    pub fn optimizer(&self) -> &O {
        &self.optimizer
    }
}

impl<O: Optimizer> NumericEngine for NdarrayEngine<O> {
    fn random_rows(&mut self, rows: usize, cols: usize) -> Array2<f32> {
        self.initialization.initialize_matrix(&mut self.rng, rows, cols)
    }

    fn apply_gradient(&mut self, key: ParamKey, params: &mut Array1<f32>, gradient: ArrayView1<'_, f32>) {
        let mut current = DVector::from_iterator(params.len(), params.iter().copied());
        let gradient = DVector::from_iterator(gradient.len(), gradient.iter().copied());
        self.optimizer.update(key, &mut current, &gradient);
        for (slot, value) in params.iter_mut().zip(current.iter()) {
            *slot = *value;
        }
    }
}
