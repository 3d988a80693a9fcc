//! Vector math delegated to the geometry boundary.
//!
//! The constraint layer classifies parallel / perpendicular pairs via
//! [`Vec3::angle_between`] with the fixed [`ANGULAR_TOLERANCE`]. All
//! functions here are pure; satisfaction is recomputed on demand, never
//! cached.

use serde::{Deserialize, Serialize};

/// Fixed angular tolerance (radians) for parallel/perpendicular
/// classification.
pub const ANGULAR_TOLERANCE: f64 = 1e-6;

/// A 3-component double-precision vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub const ZERO: Vec3 = Vec3::new(0.0, 0.0, 0.0);

    pub fn dot(&self, other: &Vec3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(&self, other: &Vec3) -> Vec3 {
        Vec3::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    pub fn norm(&self) -> f64 {
        self.dot(self).sqrt()
    }

    /// `true` when the vector is too short to define a direction.
    pub fn is_degenerate(&self) -> bool {
        self.norm() < ANGULAR_TOLERANCE
    }

    pub fn sub(&self, other: &Vec3) -> Vec3 {
        Vec3::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }

    pub fn distance(&self, other: &Vec3) -> f64 {
        self.sub(other).norm()
    }

    /// Angle between two directions in `[0, π]`.
    ///
    /// Returns `None` when either vector is degenerate.
    pub fn angle_between(&self, other: &Vec3) -> Option<f64> {
        let denom = self.norm() * other.norm();
        if denom < ANGULAR_TOLERANCE * ANGULAR_TOLERANCE {
            return None;
        }
        // Clamp against rounding before acos.
        let cos = (self.dot(other) / denom).clamp(-1.0, 1.0);
        Some(cos.acos())
    }

    /// Parallel test: angle within tolerance of 0 or π.
    pub fn is_parallel_to(&self, other: &Vec3) -> bool {
        match self.angle_between(other) {
            Some(angle) => {
                angle < ANGULAR_TOLERANCE || (std::f64::consts::PI - angle) < ANGULAR_TOLERANCE
            }
            None => false,
        }
    }

    /// Perpendicular test: angle within tolerance of π/2.
    pub fn is_perpendicular_to(&self, other: &Vec3) -> bool {
        match self.angle_between(other) {
            Some(angle) => (angle - std::f64::consts::FRAC_PI_2).abs() < ANGULAR_TOLERANCE,
            None => false,
        }
    }
}
