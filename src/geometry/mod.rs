mod segment;
mod vec3d;
#[cfg(test)]
mod tests;

pub use segment::{closest_points, segment_distance};
pub use vec3d::Vec3D;

/// A position in the arena frame, in meters.
pub type Position = Vec3D<f64>;
