use num::traits::{Float, Num, NumCast};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::ops::{Add, Mul, Sub};

/// A 3D vector generic over any numeric type.
///
/// Used both for positions in the arena frame (meters, z up) and for displacement vectors
/// between two positions.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize, Deserialize)]
pub struct Vec3D<T> {
    x: T,
    y: T,
    z: T,
}

impl<T: Copy> Vec3D<T> {
    /// Creates a new vector with the given components.
    pub const fn new(x: T, y: T, z: T) -> Self { Self { x, y, z } }

    pub const fn x(&self) -> T { self.x }

    pub const fn y(&self) -> T { self.y }

    pub const fn z(&self) -> T { self.z }

    /// Returns a copy of this vector with the z-component replaced.
    pub const fn with_z(&self, z: T) -> Self { Self { x: self.x, y: self.y, z } }
}

impl<T: Num + Copy> Vec3D<T> {
    /// Creates a zero vector.
    pub fn zero() -> Self { Self::new(T::zero(), T::zero(), T::zero()) }

    /// Computes the dot product
    ///
    /// ```text
    /// dot_product = (x1 * x2) + (y1 * y2) + (z1 * z2)
    /// ```
    pub fn dot(self, other: Vec3D<T>) -> T { self.x * other.x + self.y * other.y + self.z * other.z }

    /// Squared magnitude, avoids the square root where only comparisons are needed.
    pub fn abs_sq(self) -> T { self.dot(self) }

    /// Creates a vector pointing from `self` to `other`.
    pub fn to(&self, other: &Vec3D<T>) -> Vec3D<T> {
        Vec3D::new(other.x - self.x, other.y - self.y, other.z - self.z)
    }
}

impl<T: Float> Vec3D<T> {
    /// Computes the magnitude of the vector.
    pub fn abs(&self) -> T { self.abs_sq().sqrt() }

    /// Computes the Euclidean distance between `self` and `other`.
    pub fn euclid_distance(&self, other: &Self) -> T { self.to(other).abs() }

    /// Euclidean distance projected onto the horizontal plane.
    pub fn planar_distance(&self, other: &Self) -> T {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    /// Point at parameter `t` on the straight line from `self` to `other`.
    ///
    /// # Arguments
    /// * `other` - The end of the line, reached at `t = 1`.
    /// * `t` - Line parameter, not clamped to `[0, 1]`.
    ///
    /// # Returns
    /// A new vector on the line through both points.
    pub fn lerp(&self, other: &Self, t: T) -> Self { *self + self.to(other) * t }

    /// Whether no component is `NaN` or infinite.
    pub fn is_finite(&self) -> bool { self.x.is_finite() && self.y.is_finite() && self.z.is_finite() }

    /// Converts every component to another numeric type.
    ///
    /// # Returns
    /// `None` if any component does not fit into `D`.
    pub fn cast<D: NumCast>(self) -> Option<Vec3D<D>> {
        Some(Vec3D { x: D::from(self.x)?, y: D::from(self.y)?, z: D::from(self.z)? })
    }
}

impl<T: Num> Add for Vec3D<T> {
    type Output = Vec3D<T>;

    fn add(self, rhs: Self) -> Self::Output {
        Self::Output { x: self.x + rhs.x, y: self.y + rhs.y, z: self.z + rhs.z }
    }
}

impl<T: Num> Sub for Vec3D<T> {
    type Output = Vec3D<T>;

    fn sub(self, rhs: Self) -> Self::Output {
        Self::Output { x: self.x - rhs.x, y: self.y - rhs.y, z: self.z - rhs.z }
    }
}

impl<T: Num + Copy> Mul<T> for Vec3D<T> {
    type Output = Vec3D<T>;

    /// Scales the vector by a scalar.
    fn mul(self, rhs: T) -> Self::Output {
        Self::Output { x: self.x * rhs, y: self.y * rhs, z: self.z * rhs }
    }
}

impl<T> From<(T, T, T)> for Vec3D<T> {
    fn from(tuple: (T, T, T)) -> Self { Vec3D { x: tuple.0, y: tuple.1, z: tuple.2 } }
}

impl<T: Display> Display for Vec3D<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if let Some(precision) = f.precision() {
            write!(f, "[{:.*}, {:.*}, {:.*}]", precision, self.x, precision, self.y, precision, self.z)
        } else {
            write!(f, "[{:.3}, {:.3}, {:.3}]", self.x, self.y, self.z)
        }
    }
}
