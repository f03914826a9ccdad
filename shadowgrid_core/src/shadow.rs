//! The "SHADOW" Engine - weighted point clouds of probable future positions.
//!
//! A shadow discretises the prediction horizon into evenly spaced instants.
//! At each instant the agent is projected along the straight line to its
//! current goal, and a batch of samples is drawn from a 3D normal whose
//! covariance comes from the [`UncertaintyModel`]. Each sample is weighted
//! by its density relative to the densest sample of the same instant.
//!
//! Later instants receive more samples (`5 + 2k`), so the widening region
//! far ahead is covered more densely than the near future.

use crate::config::GridConfig;
use crate::uncertainty::{LinearGrowth, UncertaintyModel};
use nalgebra::{Matrix3, Vector3};
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Samples drawn at prediction step `k`.
pub fn samples_at_step(k: usize) -> usize {
    5 + 2 * k
}

/// Unit vector from `from` towards `to`, or zero when the points coincide.
pub fn unit_direction(from: &Vector3<f64>, to: &Vector3<f64>) -> Vector3<f64> {
    let offset = to - from;
    let distance = offset.norm();
    if distance > 0.0 {
        offset / distance
    } else {
        Vector3::zeros()
    }
}

// ============================================================================
// SHADOW
// ============================================================================

/// One weighted sample of a shadow.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShadowPoint {
    /// Sampled position
    pub position: Vector3<f64>,

    /// Relative density in [0, 1]
    pub weight: f64,

    /// Prediction step the sample belongs to
    pub step: usize,
}

/// Axis-aligned box enclosing every point of a shadow.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vector3<f64>,
    pub max: Vector3<f64>,
}

impl Aabb {
    fn around(point: &Vector3<f64>) -> Self {
        Self {
            min: *point,
            max: *point,
        }
    }

    fn include(&mut self, point: &Vector3<f64>) {
        self.min = self.min.inf(point);
        self.max = self.max.sup(point);
    }

    /// Euclidean gap between two boxes (0 when they overlap).
    pub fn gap(&self, other: &Aabb) -> f64 {
        let below = other.min - self.max;
        let above = self.min - other.max;
        below.sup(&above).sup(&Vector3::zeros()).norm()
    }
}

/// A weighted point cloud over the prediction horizon, in step order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Shadow {
    points: Vec<ShadowPoint>,
    bounds: Option<Aabb>,
}

impl Shadow {
    /// Builds a shadow from points already in step order.
    pub fn from_points(points: Vec<ShadowPoint>) -> Self {
        let mut bounds: Option<Aabb> = None;
        for p in &points {
            match bounds.as_mut() {
                Some(b) => b.include(&p.position),
                None => bounds = Some(Aabb::around(&p.position)),
            }
        }
        Self { points, bounds }
    }

    pub fn points(&self) -> &[ShadowPoint] {
        &self.points
    }

    pub fn iter(&self) -> impl Iterator<Item = &ShadowPoint> {
        self.points.iter()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Bounding box of all samples, `None` for an empty shadow.
    pub fn bounds(&self) -> Option<&Aabb> {
        self.bounds.as_ref()
    }

    /// Samples belonging to prediction step `step`.
    pub fn step_points(&self, step: usize) -> impl Iterator<Item = &ShadowPoint> {
        self.points.iter().filter(move |p| p.step == step)
    }
}

// ============================================================================
// GAUSSIAN SAMPLER
// ============================================================================

/// Terms needed to evaluate the density of a non-degenerate normal.
#[derive(Debug, Clone, Copy)]
struct DensityTerms {
    precision: Matrix3<f64>,
    norm: f64,
}

/// 3D normal distribution with a sampling factor `L` such that `L Lᵀ = Σ`.
#[derive(Debug, Clone, Copy)]
struct Gaussian3 {
    mean: Vector3<f64>,
    factor: Matrix3<f64>,
    density: Option<DensityTerms>,
}

impl Gaussian3 {
    fn new(mean: Vector3<f64>, covariance: &Matrix3<f64>) -> Self {
        let sym = (covariance + covariance.transpose()) * 0.5;

        match sym.cholesky() {
            Some(chol) => {
                let l = chol.l();
                let det = l.diagonal().product().powi(2);
                let norm = 1.0 / ((2.0 * PI).powf(1.5) * det.sqrt());
                let density = (norm.is_finite() && norm > 0.0).then(|| DensityTerms {
                    precision: chol.inverse(),
                    norm,
                });
                Self {
                    mean,
                    factor: l,
                    density,
                }
            }
            None => {
                // Singular PSD covariance: sample along the surviving axes, no density
                let eig = sym.symmetric_eigen();
                let roots = eig.eigenvalues.map(|l| l.max(0.0).sqrt());
                Self {
                    mean,
                    factor: eig.eigenvectors * Matrix3::from_diagonal(&roots),
                    density: None,
                }
            }
        }
    }

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Vector3<f64> {
        let z: Vector3<f64> = Vector3::from_fn(|_, _| rng.sample(StandardNormal));
        self.mean + self.factor * z
    }

    fn density(&self, x: &Vector3<f64>) -> f64 {
        match &self.density {
            Some(terms) => {
                let r = x - self.mean;
                terms.norm * (-0.5 * r.dot(&(terms.precision * r))).exp()
            }
            None => 0.0,
        }
    }
}

// ============================================================================
// GENERATOR
// ============================================================================

/// Produces shadows for a fixed horizon and step count.
#[derive(Debug, Clone)]
pub struct ShadowGenerator<M = LinearGrowth> {
    /// Number of prediction instants
    pub prediction_steps: usize,

    /// Length of the prediction horizon in seconds
    pub time_horizon: f64,

    /// How covariance widens with look-ahead
    pub model: M,
}

impl ShadowGenerator<LinearGrowth> {
    pub fn new(prediction_steps: usize, time_horizon: f64, growth_rate: f64) -> Self {
        Self::with_model(prediction_steps, time_horizon, LinearGrowth::new(growth_rate))
    }

    pub fn from_config(config: &GridConfig) -> Self {
        Self::new(
            config.prediction_steps,
            config.time_horizon,
            config.uncertainty_growth_rate,
        )
    }
}

impl<M: UncertaintyModel> ShadowGenerator<M> {
    pub fn with_model(prediction_steps: usize, time_horizon: f64, model: M) -> Self {
        Self {
            prediction_steps,
            time_horizon,
            model,
        }
    }

    /// Prediction instants, evenly spaced over `[0, time_horizon]`.
    pub fn instants(&self) -> Vec<f64> {
        match self.prediction_steps {
            0 => Vec::new(),
            1 => vec![0.0],
            n => (0..n)
                .map(|k| self.time_horizon * k as f64 / (n - 1) as f64)
                .collect(),
        }
    }

    /// Total number of samples in every shadow this generator produces.
    pub fn shadow_len(&self) -> usize {
        (0..self.prediction_steps).map(samples_at_step).sum()
    }

    /// Generates the shadow of an agent heading for `goal`.
    ///
    /// The predicted mean at instant `t` is `position + dir × ‖velocity‖ × t`
    /// where `dir` points at the goal; it collapses to `position` when the
    /// agent sits on its goal or is stationary.
    pub fn generate<R: Rng + ?Sized>(
        &self,
        position: &Vector3<f64>,
        velocity: &Vector3<f64>,
        goal: &Vector3<f64>,
        base_covariance: &Matrix3<f64>,
        rng: &mut R,
    ) -> Shadow {
        let heading = unit_direction(position, goal) * velocity.norm();
        let mut points = Vec::with_capacity(self.shadow_len());

        for (step, t) in self.instants().into_iter().enumerate() {
            let mean = position + heading * t;
            let covariance = self.model.covariance_at(base_covariance, t);
            let gaussian = Gaussian3::new(mean, &covariance);

            let samples: Vec<Vector3<f64>> = (0..samples_at_step(step))
                .map(|_| gaussian.sample(rng))
                .collect();
            let densities: Vec<f64> = samples.iter().map(|s| gaussian.density(s)).collect();
            let peak = densities.iter().copied().fold(0.0_f64, f64::max);

            points.extend(samples.into_iter().zip(densities).map(|(position, density)| {
                let weight = if peak > 0.0 { density / peak } else { 0.0 };
                ShadowPoint {
                    position,
                    weight,
                    step,
                }
            }));
        }

        Shadow::from_points(points)
    }
}
