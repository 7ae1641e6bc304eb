//! Injectable random source.
//!
//! Every random decision a behavior makes (coin flips, wander points, timer
//! draws, arbitration picks) goes through [`RandomSource`] so tests can script
//! the outcome.

use glam::Vec3;
use std::collections::VecDeque;

/// Maximum rejection-sampling attempts for [`RandomSource::inside_unit_sphere`].
const SPHERE_ATTEMPTS: usize = 32;

/// Source of uniform random values.
pub trait RandomSource {
    /// Returns an integer in `[min, max)`. Returns `min` for empty ranges.
    fn range_i32(&mut self, min: i32, max: i32) -> i32;

    /// Returns a float in `[min, max)`. Returns `min` for empty ranges.
    fn range_f32(&mut self, min: f32, max: f32) -> f32;

    /// Returns a point inside the unit sphere.
    fn inside_unit_sphere(&mut self) -> Vec3 {
        for _ in 0..SPHERE_ATTEMPTS {
            let p = Vec3::new(
                self.range_f32(-1.0, 1.0),
                self.range_f32(-1.0, 1.0),
                self.range_f32(-1.0, 1.0),
            );
            if p.length_squared() <= 1.0 {
                return p;
            }
        }
        Vec3::ZERO
    }

    /// Even-odds decision: a draw in `[0, 100)` below 50.
    fn coin_flip(&mut self) -> bool {
        self.range_i32(0, 100) < 50
    }

    /// Picks an index in `[0, len)`, or `None` for an empty collection.
    fn pick_index(&mut self, len: usize) -> Option<usize> {
        if len == 0 {
            return None;
        }
        let len = i32::try_from(len).unwrap_or(i32::MAX);
        Some(self.range_i32(0, len) as usize)
    }
}

/// Production random source backed by `fastrand`.
#[derive(Debug, Clone)]
pub struct FastRandom {
    rng: fastrand::Rng,
}

impl Default for FastRandom {
    fn default() -> Self {
        Self::new()
    }
}

impl FastRandom {
    /// Creates a randomly seeded source.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rng: fastrand::Rng::new(),
        }
    }

    /// Creates a deterministic source.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: fastrand::Rng::with_seed(seed),
        }
    }
}

impl RandomSource for FastRandom {
    fn range_i32(&mut self, min: i32, max: i32) -> i32 {
        if max <= min {
            return min;
        }
        self.rng.i32(min..max)
    }

    fn range_f32(&mut self, min: f32, max: f32) -> f32 {
        if max <= min {
            return min;
        }
        min + self.rng.f32() * (max - min)
    }
}

/// Scripted random source for tests.
///
/// Integers are returned as queued (clamped into the requested range). Floats
/// are queued as unit fractions and mapped onto the requested range. An
/// exhausted queue yields the range minimum.
#[derive(Debug, Clone, Default)]
pub struct ScriptedRandom {
    ints: VecDeque<i32>,
    floats: VecDeque<f32>,
    points: VecDeque<Vec3>,
}

impl ScriptedRandom {
    /// Creates an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues integer draws.
    #[must_use]
    pub fn with_ints(mut self, values: impl IntoIterator<Item = i32>) -> Self {
        self.ints.extend(values);
        self
    }

    /// Queues float draws as fractions of the requested range.
    #[must_use]
    pub fn with_floats(mut self, fractions: impl IntoIterator<Item = f32>) -> Self {
        self.floats.extend(fractions);
        self
    }

    /// Queues unit-sphere samples.
    #[must_use]
    pub fn with_points(mut self, points: impl IntoIterator<Item = Vec3>) -> Self {
        self.points.extend(points);
        self
    }

    /// Queues more integer draws.
    pub fn push_int(&mut self, value: i32) {
        self.ints.push_back(value);
    }

    /// Number of queued integer draws left.
    #[must_use]
    pub fn remaining_ints(&self) -> usize {
        self.ints.len()
    }
}

impl RandomSource for ScriptedRandom {
    fn range_i32(&mut self, min: i32, max: i32) -> i32 {
        if max <= min {
            return min;
        }
        self.ints.pop_front().map_or(min, |v| v.clamp(min, max - 1))
    }

    fn range_f32(&mut self, min: f32, max: f32) -> f32 {
        if max <= min {
            return min;
        }
        let t = self.floats.pop_front().unwrap_or(0.0).clamp(0.0, 1.0);
        min + t * (max - min)
    }

    fn inside_unit_sphere(&mut self) -> Vec3 {
        self.points.pop_front().unwrap_or(Vec3::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fast_random_respects_ranges() {
        let mut rng = FastRandom::with_seed(7);
        for _ in 0..500 {
            let i = rng.range_i32(2, 5);
            assert!((2..5).contains(&i));
            let f = rng.range_f32(4.0, 6.0);
            assert!((4.0..6.0).contains(&f));
            assert!(rng.inside_unit_sphere().length() <= 1.0);
        }
    }

    #[test]
    fn test_empty_ranges_return_min() {
        let mut rng = FastRandom::with_seed(1);
        assert_eq!(rng.range_i32(3, 3), 3);
        assert!((rng.range_f32(2.0, 1.0) - 2.0).abs() < f32::EPSILON);
        assert_eq!(rng.pick_index(0), None);
    }

    #[test]
    fn test_scripted_coin_flip() {
        let mut rng = ScriptedRandom::new().with_ints([30, 70, 49, 50]);
        assert!(rng.coin_flip());
        assert!(!rng.coin_flip());
        assert!(rng.coin_flip());
        assert!(!rng.coin_flip());
        assert_eq!(rng.remaining_ints(), 0);
    }

    #[test]
    fn test_scripted_floats_map_fractions() {
        let mut rng = ScriptedRandom::new().with_floats([0.5, 1.0]);
        assert!((rng.range_f32(4.0, 6.0) - 5.0).abs() < 1e-6);
        assert!((rng.range_f32(0.0, 2.0) - 2.0).abs() < 1e-6);
        // Exhausted queue yields the minimum
        assert!((rng.range_f32(3.0, 9.0) - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_scripted_ints_clamp_into_range() {
        let mut rng = ScriptedRandom::new().with_ints([10, -4]);
        assert_eq!(rng.range_i32(0, 3), 2);
        assert_eq!(rng.range_i32(0, 3), 0);
    }
}
