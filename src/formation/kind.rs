use crate::config::SwarmConfig;
use strum_macros::Display;

/// Every formation the tower can fly, together with its shape parameters.
#[derive(Debug, Clone, Copy, PartialEq, Display)]
pub enum FormationKind {
    FlatSquare,
    TiltedPlane { angle_x_deg: f64, angle_y_deg: f64 },
    Circle,
    /// Rigid rotation of the circle formation, one revolution per `period` seconds.
    MovingCircle { period: f64, points: usize },
    /// Vertical oscillation in place, phase-shifted along x.
    SinWave { amplitude: f64, period: f64, points: usize },
}

impl FormationKind {
    pub fn tilted_plane(config: &SwarmConfig) -> Self {
        Self::TiltedPlane {
            angle_x_deg: config.tilt_angle_x_deg,
            angle_y_deg: config.tilt_angle_y_deg,
        }
    }

    pub fn moving_circle(config: &SwarmConfig) -> Self {
        Self::MovingCircle {
            period: config.circle_rotation_period,
            points: config.dynamic_formation_points,
        }
    }

    pub fn sin_wave(config: &SwarmConfig) -> Self {
        Self::SinWave {
            amplitude: config.sin_wave_amplitude,
            period: config.sin_wave_period,
            points: config.dynamic_formation_points,
        }
    }

    /// Whether vehicles follow a looping trajectory instead of holding a point.
    pub fn is_dynamic(&self) -> bool {
        match self {
            Self::FlatSquare | Self::TiltedPlane { .. } | Self::Circle => false,
            Self::MovingCircle { .. } | Self::SinWave { .. } => true,
        }
    }
}
