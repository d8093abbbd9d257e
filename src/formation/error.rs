use crate::fleet_control::VehicleKey;
use std::fmt::{Display, Formatter};
use strum_macros::Display;

/// Direction along which a layout ran out of room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Axis {
    X,
    Y,
    Z,
    /// Along the perimeter of a circular layout.
    Arc,
}

/// Failures of the pure formation computations.
///
/// Validation errors mean the caller passed inconsistent input; capacity errors mean the
/// vehicles do not fit the boundaries at the configured minimum spacing. Neither is ever
/// degraded into a tighter layout.
#[derive(Debug, Clone, PartialEq)]
pub enum FormationError {
    MismatchedVehicleSets { start: usize, end: usize },
    UnknownVehicle(VehicleKey),
    InvalidParameter(&'static str),
    InsufficientSpacing { axis: Axis, spacing: f64, min_spacing: f64 },
    RadiusTooSmall { radius: f64 },
}

impl FormationError {
    pub fn is_capacity(&self) -> bool {
        matches!(self, Self::InsufficientSpacing { .. } | Self::RadiusTooSmall { .. })
    }

    pub fn is_validation(&self) -> bool { !self.is_capacity() }
}

impl Display for FormationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MismatchedVehicleSets { start, end } => {
                write!(f, "start set has {start} vehicles but end set has {end}")
            }
            Self::UnknownVehicle(key) => write!(f, "vehicle {key} is missing from one of the sets"),
            Self::InvalidParameter(what) => write!(f, "invalid formation parameter: {what}"),
            Self::InsufficientSpacing { axis, spacing, min_spacing } => write!(
                f,
                "spacing along {axis} would be {spacing:.3} m, below the minimum of {min_spacing:.3} m"
            ),
            Self::RadiusTooSmall { radius } => {
                write!(f, "usable circle radius {radius:.3} m leaves no room for a formation")
            }
        }
    }
}

impl std::error::Error for FormationError {}
