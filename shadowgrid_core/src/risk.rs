//! Collision risk between shadows.
//!
//! Risk is the single strongest weighted near-miss between two clouds, not
//! an accumulation: many weak co-occurrences never add up to one strong one.

use crate::shadow::Shadow;

/// Pairwise collision risk in [0, 1].
///
/// For every sample pair closer than `safe_distance` the contribution is
/// `w_a × w_b × (1 − d / safe_distance)`; the result is the maximum
/// contribution, or 0 when no pair is close enough.
pub fn collision_risk(a: &Shadow, b: &Shadow, safe_distance: f64) -> f64 {
    if safe_distance <= 0.0 {
        return 0.0;
    }

    match (a.bounds(), b.bounds()) {
        (Some(ba), Some(bb)) if ba.gap(bb) < safe_distance => {}
        _ => return 0.0,
    }

    let safe_sq = safe_distance * safe_distance;
    let mut max_risk = 0.0_f64;

    for pa in a.iter() {
        if pa.weight <= 0.0 {
            continue;
        }
        for pb in b.iter() {
            let dist_sq = (pa.position - pb.position).norm_squared();
            if dist_sq >= safe_sq {
                continue;
            }
            let proximity = 1.0 - dist_sq.sqrt() / safe_distance;
            let risk = pa.weight * pb.weight * proximity;
            if risk > max_risk {
                max_risk = risk;
            }
        }
    }

    max_risk.clamp(0.0, 1.0)
}

/// Worst pairwise risk of `shadow` against every peer shadow.
///
/// With no peers the risk is 0.
pub fn field_risk<'a, I>(shadow: &Shadow, peers: I, safe_distance: f64) -> f64
where
    I: IntoIterator<Item = &'a Shadow>,
{
    peers
        .into_iter()
        .map(|peer| collision_risk(shadow, peer, safe_distance))
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shadow::{ShadowGenerator, ShadowPoint};
    use crate::uncertainty::isotropic;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn point(x: f64, y: f64, z: f64, weight: f64) -> ShadowPoint {
        ShadowPoint {
            position: Vector3::new(x, y, z),
            weight,
            step: 0,
        }
    }

    #[test]
    fn test_linear_proximity_decay() {
        let a = Shadow::from_points(vec![point(0.0, 0.0, 0.0, 1.0)]);
        let b = Shadow::from_points(vec![point(1.0, 0.0, 0.0, 0.5)]);

        // 1 × 0.5 × (1 − 1/4)
        assert_relative_eq!(collision_risk(&a, &b, 4.0), 0.375);
    }

    #[test]
    fn test_maximum_not_sum() {
        let a = Shadow::from_points(vec![point(0.0, 0.0, 0.0, 1.0)]);
        let b = Shadow::from_points(vec![
            point(2.0, 0.0, 0.0, 1.0),
            point(0.0, 2.0, 0.0, 1.0),
            point(0.0, 0.0, 2.0, 1.0),
        ]);
        assert_relative_eq!(collision_risk(&a, &b, 4.0), 0.5);
    }

    #[test]
    fn test_zero_at_or_beyond_safe_distance() {
        let a = Shadow::from_points(vec![point(0.0, 0.0, 0.0, 1.0)]);
        let exactly = Shadow::from_points(vec![point(4.0, 0.0, 0.0, 1.0)]);
        let beyond = Shadow::from_points(vec![point(10.0, 0.0, 0.0, 1.0)]);

        assert_eq!(collision_risk(&a, &exactly, 4.0), 0.0);
        assert_eq!(collision_risk(&a, &beyond, 4.0), 0.0);
        assert_eq!(collision_risk(&a, &Shadow::default(), 4.0), 0.0);
        assert_eq!(collision_risk(&a, &a, 0.0), 0.0);
    }

    #[test]
    fn test_coincident_full_weight_is_one() {
        let a = Shadow::from_points(vec![point(3.0, 3.0, 3.0, 1.0)]);
        assert_relative_eq!(collision_risk(&a, &a.clone(), 4.0), 1.0);
    }

    #[test]
    fn test_field_risk_takes_worst_peer() {
        let me = Shadow::from_points(vec![point(0.0, 0.0, 0.0, 1.0)]);
        let near = Shadow::from_points(vec![point(1.0, 0.0, 0.0, 1.0)]);
        let far = Shadow::from_points(vec![point(3.0, 0.0, 0.0, 1.0)]);

        assert_relative_eq!(field_risk(&me, [&far, &near], 4.0), 0.75);
        assert_eq!(field_risk(&me, std::iter::empty::<&Shadow>(), 4.0), 0.0);
    }

    fn random_shadow(seed: u64, origin: Vector3<f64>, goal: Vector3<f64>) -> Shadow {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        ShadowGenerator::new(6, 6.0, 0.08).generate(
            &origin,
            &Vector3::new(1.5, 0.0, 0.0),
            &goal,
            &isotropic(0.3),
            &mut rng,
        )
    }

    proptest! {
        #[test]
        fn prop_risk_is_symmetric(
            seed in any::<u64>(),
            ax in 0.0f64..20.0, ay in 0.0f64..20.0,
            bx in 0.0f64..20.0, by in 0.0f64..20.0,
            d in 0.5f64..8.0,
        ) {
            let a = random_shadow(seed, Vector3::new(ax, ay, 5.0), Vector3::new(20.0, 20.0, 5.0));
            let b = random_shadow(seed ^ 0xdead_beef, Vector3::new(bx, by, 5.0), Vector3::new(0.0, 0.0, 5.0));
            let ab = collision_risk(&a, &b, d);
            let ba = collision_risk(&b, &a, d);
            prop_assert_eq!(ab, ba);
            prop_assert!((0.0..=1.0).contains(&ab));
        }

        #[test]
        fn prop_separated_shadows_have_zero_risk(seed in any::<u64>(), d in 0.5f64..4.0) {
            let a = random_shadow(seed, Vector3::new(0.0, 0.0, 0.0), Vector3::new(0.0, 0.0, 0.0));
            let b = random_shadow(seed.wrapping_add(1), Vector3::new(500.0, 0.0, 0.0), Vector3::new(500.0, 0.0, 0.0));
            prop_assert_eq!(collision_risk(&a, &b, d), 0.0);
        }
    }
}
