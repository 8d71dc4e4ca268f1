use nalgebra::DVector;
use std::collections::HashMap;

use crate::models::Side;

/// Identifies one embedding row as an optimizer parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParamKey {
    pub side: Side,
    pub slot: usize,
}

impl ParamKey {
    pub fn user(slot: usize) -> Self {
        Self { side: Side::User, slot }
    }

    pub fn entity(slot: usize) -> Self {
        Self { side: Side::Entity, slot }
    }
}

pub trait Optimizer: Send + Sync {
    /// Applies one descent step to `params` in place.
    fn update(&mut self, key: ParamKey, params: &mut DVector<f32>, gradients: &DVector<f32>);
}

#[derive(Debug, Clone)]
pub struct Sgd {
    learning_rate: f64,
}

impl Sgd {
    pub fn new(learning_rate: f64) -> Self {
        Self { learning_rate }
    }
}

impl Optimizer for Sgd {
    fn update(&mut self, _key: ParamKey, params: &mut DVector<f32>, gradients: &DVector<f32>) {
        *params -= gradients * self.learning_rate as f32;
    }
}

#[derive(Debug, Clone)]
struct Moments {
    m: DVector<f32>,
    v: DVector<f32>,
    t: i32,
}

/// Adam with per-row moment accumulators.
///
/// Each row keeps its own step count, so bias correction reflects how often
/// that row has actually been updated.
#[derive(Debug, Clone)]
pub struct Adam {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    moments: HashMap<ParamKey, Moments>,
}

impl Adam {
    pub fn new(learning_rate: f64, beta1: f64, beta2: f64, epsilon: f64) -> Self {
        Self {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            moments: HashMap::new(),
        }
    }

    pub fn with_learning_rate(learning_rate: f64) -> Self {
        Self::new(learning_rate, 0.9, 0.999, 1e-8)
    }
}

impl Default for Adam {
    fn default() -> Self {
        Self::with_learning_rate(0.001)
    }
}

impl Optimizer for Adam {
    fn update(&mut self, key: ParamKey, params: &mut DVector<f32>, gradients: &DVector<f32>) {
        let beta1 = self.beta1 as f32;
        let beta2 = self.beta2 as f32;

        let state = self.moments.entry(key).or_insert_with(|| Moments {
            m: DVector::zeros(params.len()),
            v: DVector::zeros(params.len()),
            t: 0,
        });
        state.t = state.t.saturating_add(1);

        state.m = state.m.scale(beta1) + gradients.scale(1.0 - beta1);
        state.v = state.v.scale(beta2) + gradients.component_mul(gradients).scale(1.0 - beta2);

        let m_hat = state.m.scale(1.0 / (1.0 - beta1.powi(state.t)));
        let v_hat = state.v.scale(1.0 / (1.0 - beta2.powi(state.t)));

        let denominator = v_hat.map(|x| x.sqrt() + self.epsilon as f32);
        let update = m_hat.component_div(&denominator).scale(self.learning_rate as f32);

        *params -= update;
    }
}
