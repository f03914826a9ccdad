//! Process-wide tunables for a [`ShadowGrid`](crate::ShadowGrid).

use crate::error::{GridError, Result};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_PI_2;

// ============================================================================
// GRID CONFIGURATION
// ============================================================================

/// Configuration shared by every agent in a grid.
///
/// Missing fields fall back to [`GridConfig::default`] when deserialized,
/// so a JSON file only needs to name the values it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Extent of the flight volume; positions live in `[0, space_size]`
    pub space_size: Vector3<f64>,

    /// Number of prediction instants per shadow (default: 20)
    pub prediction_steps: usize,

    /// Prediction horizon in simulated seconds (default: 6.0)
    pub time_horizon: f64,

    /// Linear covariance growth per second of look-ahead (default: 0.08)
    pub uncertainty_growth_rate: f64,

    /// Per-axis base variance of the prediction noise (default: 0.1)
    pub initial_uncertainty: f64,

    /// Risk above which an agent tries to reroute (default: 0.25)
    pub collision_threshold: f64,

    /// Sample separation below which shadows contribute risk (default: 4.0)
    pub safe_distance: f64,

    /// Fraction of the threshold risk must fall under to end a reroute (default: 0.5)
    pub hysteresis_factor: f64,

    /// Ticks a reroute may last before the original goal is resumed (default: 50)
    pub reroute_timeout: u32,

    /// Distances at which alternate goals are probed (default: 5, 10, 15)
    pub search_radii: Vec<f64>,

    /// Number of probe headings spread over [-π/2, π/2] (default: 8)
    pub search_angles: usize,

    /// Cruise speed in units per second (default: 1.5)
    pub nominal_speed: f64,

    /// Standard deviation of the per-tick speed perturbation (default: 0.05)
    pub speed_jitter: f64,

    /// Distance to the original goal that counts as arrived (default: 0.1)
    pub arrival_epsilon: f64,

    /// Master seed for every random stream in the grid
    pub seed: u64,

    /// Keep at most this many metrics records (None = unbounded)
    pub metrics_capacity: Option<usize>,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            space_size: Vector3::new(50.0, 50.0, 30.0),
            prediction_steps: 20,
            time_horizon: 6.0,
            uncertainty_growth_rate: 0.08,
            initial_uncertainty: 0.1,
            collision_threshold: 0.25,
            safe_distance: 4.0,
            hysteresis_factor: 0.5,
            reroute_timeout: 50,
            search_radii: vec![5.0, 10.0, 15.0],
            search_angles: 8,
            nominal_speed: 1.5,
            speed_jitter: 0.05,
            arrival_epsilon: 0.1,
            seed: 42,
            metrics_capacity: None,
        }
    }
}

impl GridConfig {
    /// Parses a config from JSON, filling unspecified fields with defaults.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Sets the volume extent.
    pub fn with_space_size(mut self, x: f64, y: f64, z: f64) -> Self {
        self.space_size = Vector3::new(x, y, z);
        self
    }

    /// Sets the number of prediction instants.
    pub fn with_prediction_steps(mut self, steps: usize) -> Self {
        self.prediction_steps = steps;
        self
    }

    /// Sets the uncertainty growth rate.
    pub fn with_growth_rate(mut self, rate: f64) -> Self {
        self.uncertainty_growth_rate = rate;
        self
    }

    /// Sets the reroute trigger threshold.
    pub fn with_collision_threshold(mut self, threshold: f64) -> Self {
        self.collision_threshold = threshold;
        self
    }

    /// Sets the safe separation distance.
    pub fn with_safe_distance(mut self, distance: f64) -> Self {
        self.safe_distance = distance;
        self
    }

    /// Sets the master seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Caps the retained metrics history.
    pub fn with_metrics_capacity(mut self, capacity: usize) -> Self {
        self.metrics_capacity = Some(capacity);
        self
    }

    /// Probe headings, evenly spaced over a half-turn centred on the goal direction.
    pub fn search_headings(&self) -> Vec<f64> {
        match self.search_angles {
            0 => Vec::new(),
            1 => vec![0.0],
            n => (0..n)
                .map(|i| -FRAC_PI_2 + std::f64::consts::PI * i as f64 / (n - 1) as f64)
                .collect(),
        }
    }

    /// Checks that every value is usable by the engine.
    pub fn validate(&self) -> Result<()> {
        if self.space_size.iter().any(|v| !v.is_finite() || *v <= 0.0) {
            return Err(GridError::invalid(format!(
                "space_size must be positive on every axis, got {:?}",
                self.space_size.as_slice()
            )));
        }

        let non_negative = [
            ("time_horizon", self.time_horizon),
            ("uncertainty_growth_rate", self.uncertainty_growth_rate),
            ("initial_uncertainty", self.initial_uncertainty),
            ("collision_threshold", self.collision_threshold),
            ("hysteresis_factor", self.hysteresis_factor),
            ("nominal_speed", self.nominal_speed),
            ("speed_jitter", self.speed_jitter),
            ("arrival_epsilon", self.arrival_epsilon),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(GridError::invalid(format!(
                    "{name} must be finite and non-negative, got {value}"
                )));
            }
        }

        if !self.safe_distance.is_finite() || self.safe_distance <= 0.0 {
            return Err(GridError::invalid(format!(
                "safe_distance must be positive, got {}",
                self.safe_distance
            )));
        }

        if self.hysteresis_factor > 1.0 {
            return Err(GridError::invalid(format!(
                "hysteresis_factor must not exceed 1, got {}",
                self.hysteresis_factor
            )));
        }

        if self.search_radii.is_empty() || self.search_angles == 0 {
            return Err(GridError::invalid("candidate search needs at least one radius and one angle"));
        }
        if let Some(r) = self.search_radii.iter().find(|r| !r.is_finite() || **r <= 0.0) {
            return Err(GridError::invalid(format!("search radius must be positive, got {r}")));
        }

        if self.metrics_capacity == Some(0) {
            return Err(GridError::invalid("metrics_capacity must keep at least one record"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_config_is_valid() {
        assert!(GridConfig::default().validate().is_ok());
    }

    #[test]
    fn test_search_headings_span_half_turn() {
        let headings = GridConfig::default().search_headings();
        assert_eq!(headings.len(), 8);
        assert_relative_eq!(headings[0], -FRAC_PI_2);
        assert_relative_eq!(headings[7], FRAC_PI_2);
    }

    #[test]
    fn test_rejects_bad_values() {
        let config = GridConfig::default().with_space_size(50.0, 0.0, 30.0);
        assert!(matches!(config.validate(), Err(GridError::InvalidConfig(_))));

        let config = GridConfig::default().with_safe_distance(0.0);
        assert!(config.validate().is_err());

        let config = GridConfig {
            search_radii: vec![],
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = GridConfig {
            initial_uncertainty: -1.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = GridConfig::from_json_str(r#"{ "collision_threshold": 0.4, "seed": 7 }"#).unwrap();
        assert_relative_eq!(config.collision_threshold, 0.4);
        assert_eq!(config.seed, 7);
        assert_eq!(config.prediction_steps, 20);
        assert_relative_eq!(config.space_size.z, 30.0);
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        let err = GridConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, GridError::ConfigParse(_)));
    }
}
