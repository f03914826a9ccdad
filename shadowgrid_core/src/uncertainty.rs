//! Uncertainty model: how prediction noise widens with look-ahead time.

use nalgebra::Matrix3;

/// Maps a base covariance and a look-ahead time to the covariance of a
/// predicted position.
///
/// Implementations must return a symmetric positive semi-definite matrix
/// for any symmetric PSD input and must be non-decreasing in `t`.
pub trait UncertaintyModel: Send + Sync {
    /// Covariance of a prediction `t` seconds ahead.
    fn covariance_at(&self, base: &Matrix3<f64>, t: f64) -> Matrix3<f64>;
}

/// Isotropic linear growth: `base × (1 + growth_rate × t)`.
///
/// The whole matrix is scaled uniformly, so lateral and longitudinal
/// spread grow together.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearGrowth {
    /// Fractional growth per second of look-ahead
    pub growth_rate: f64,
}

impl LinearGrowth {
    pub fn new(growth_rate: f64) -> Self {
        Self {
            growth_rate: growth_rate.max(0.0),
        }
    }

    /// Scale factor applied at look-ahead `t` (never below 1).
    pub fn factor(&self, t: f64) -> f64 {
        1.0 + self.growth_rate * t.max(0.0)
    }
}

impl UncertaintyModel for LinearGrowth {
    fn covariance_at(&self, base: &Matrix3<f64>, t: f64) -> Matrix3<f64> {
        base * self.factor(t)
    }
}

/// Isotropic base covariance `variance × I`.
pub fn isotropic(variance: f64) -> Matrix3<f64> {
    Matrix3::identity() * variance.max(0.0)
}
