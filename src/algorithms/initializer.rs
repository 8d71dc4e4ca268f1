use ndarray::Array2;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

use crate::error::{RecommenderError, Result};

/// Box-Muller draw from N(0, 1).
fn standard_normal<R: Rng>(rng: &mut R) -> f32 {
    // Keep u1 away from zero so ln() stays finite.
    let u1: f32 = rng.gen_range(f32::MIN_POSITIVE..1.0);
    let u2: f32 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

pub fn normal<R: Rng>(rng: &mut R, size: usize, mean: f32, std_dev: f32) -> Vec<f32> {
    (0..size)
        .map(|_| standard_normal(rng) * std_dev + mean)
        .collect()
}

pub fn uniform<R: Rng>(rng: &mut R, size: usize, low: f32, high: f32) -> Vec<f32> {
    (0..size).map(|_| rng.gen_range(low..high)).collect()
}

pub fn xavier_uniform<R: Rng>(rng: &mut R, size: usize) -> Vec<f32> {
    let limit = (6.0 / size as f32).sqrt();
    uniform(rng, size, -limit, limit)
}

pub fn xavier_normal<R: Rng>(rng: &mut R, size: usize) -> Vec<f32> {
    let std_dev = (2.0 / size as f32).sqrt();
    normal(rng, size, 0.0, std_dev)
}

/// Distribution used for fresh embedding rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum InitializationMethod {
    Normal { mean: f32, std_dev: f32 },
    Uniform { low: f32, high: f32 },
    XavierNormal,
    XavierUniform,
}

impl Default for InitializationMethod {
    fn default() -> Self {
        InitializationMethod::Normal {
            mean: 0.0,
            std_dev: 1.0,
        }
    }
}

impl InitializationMethod {
    pub fn validate(&self) -> Result<()> {
        match self {
            InitializationMethod::Normal { mean, std_dev } => {
                if !mean.is_finite() || !std_dev.is_finite() || *std_dev <= 0.0 {
                    return Err(RecommenderError::InvalidConfig(format!(
                        "normal initialization needs finite mean and positive std_dev, got {} / {}",
                        mean, std_dev
                    )));
                }
            }
            InitializationMethod::Uniform { low, high } => {
                if !low.is_finite() || !high.is_finite() || low >= high {
                    return Err(RecommenderError::InvalidConfig(format!(
                        "uniform initialization needs low < high, got {} / {}",
                        low, high
                    )));
                }
            }
            InitializationMethod::XavierNormal | InitializationMethod::XavierUniform => {}
        }
        Ok(())
    }

    pub fn initialize<R: Rng>(&self, rng: &mut R, size: usize) -> Vec<f32> {
        match self {
            InitializationMethod::Normal { mean, std_dev } => normal(rng, size, *mean, *std_dev),
            InitializationMethod::Uniform { low, high } => uniform(rng, size, *low, *high),
            InitializationMethod::XavierNormal => xavier_normal(rng, size),
            InitializationMethod::XavierUniform => xavier_uniform(rng, size),
        }
    }

    /// Draws a `rows x cols` matrix, one independent row at a time.
    pub fn initialize_matrix<R: Rng>(&self, rng: &mut R, rows: usize, cols: usize) -> Array2<f32> {
        let mut matrix = Array2::zeros((rows, cols));
        for mut row in matrix.rows_mut() {
            for (slot, value) in row.iter_mut().zip(self.initialize(rng, cols)) {
                *slot = value;
            }
        }
        matrix
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_xavier_uniform_bounds() {
        let mut rng = StdRng::seed_from_u64(1);
        let weights = xavier_uniform(&mut rng, 100);
        assert_eq!(weights.len(), 100);

        let limit = (6.0 / 100.0_f32).sqrt();
        for &weight in &weights {
            assert!(weight >= -limit && weight <= limit);
        }
    }

    #[test]
    fn test_normal_is_roughly_zero_mean() {
        let mut rng = StdRng::seed_from_u64(3);
        let draws = normal(&mut rng, 20_000, 0.0, 1.0);
        let mean: f32 = draws.iter().sum::<f32>() / draws.len() as f32;
        assert!(mean.abs() < 0.05, "mean drifted to {}", mean);
        assert!(draws.iter().all(|x| x.is_finite()));
    }

    #[test]
    fn test_seeded_matrix_is_reproducible() {
        let method = InitializationMethod::default();
        let a = method.initialize_matrix(&mut StdRng::seed_from_u64(11), 4, 3);
        let b = method.initialize_matrix(&mut StdRng::seed_from_u64(11), 4, 3);
        assert_eq!(a.dim(), (4, 3));
        assert_eq!(a, b);
        assert!(a.iter().all(|x| *x != 0.0));
    }

    #[test]
    fn test_empty_matrix() {
        let method = InitializationMethod::XavierUniform;
        let m = method.initialize_matrix(&mut StdRng::seed_from_u64(0), 0, 8);
        assert_eq!(m.dim(), (0, 8));
    }

    #[test]
    fn test_validate_rejects_bad_parameters() {
        assert!(InitializationMethod::Normal { mean: 0.0, std_dev: 0.0 }.validate().is_err());
        assert!(InitializationMethod::Uniform { low: 1.0, high: -1.0 }.validate().is_err());
        assert!(InitializationMethod::XavierNormal.validate().is_ok());
    }
}
