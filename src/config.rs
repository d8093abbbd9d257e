//! Deployment parameters of the tower.
//!
//! All values are supplied by the process entry point. [`SwarmConfig::default`] carries the
//! parameters of the reference flight arena: four vehicles in a 2 m x 2 m x 2 m volume.

use crate::fleet_control::VehicleKey;
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Closed interval `[min, max]` along a single axis, in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisRange {
    pub min: f64,
    pub max: f64,
}

impl AxisRange {
    pub const fn new(min: f64, max: f64) -> Self { Self { min, max } }

    pub fn span(&self) -> f64 { self.max - self.min }

    pub fn center(&self) -> f64 { (self.min + self.max) / 2.0 }

    /// Clamps `value` into the range shrunk by `margin` on both ends.
    pub fn clamp_with_margin(&self, value: f64, margin: f64) -> f64 {
        value.max(self.min + margin).min(self.max - margin)
    }
}

/// Absolute flight volume of the arena.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Boundaries {
    pub x: AxisRange,
    pub y: AxisRange,
    pub z: AxisRange,
}

impl Default for Boundaries {
    fn default() -> Self {
        Self {
            x: AxisRange::new(-1.0, 1.0),
            y: AxisRange::new(-1.0, 1.0),
            z: AxisRange::new(0.0, 2.0),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SwarmConfig {
    /// Radio addresses of every vehicle the tower manages. Fixed for the whole run.
    pub vehicles: Vec<VehicleKey>,
    pub boundaries: Boundaries,
    /// Minimum distance between two formation slots.
    pub drone_spacing: f64,
    pub boundary_margin: f64,
    /// Two straight-line moves closer than this are treated as a collision risk.
    pub collision_threshold: f64,
    pub tilt_angle_x_deg: f64,
    pub tilt_angle_y_deg: f64,

    pub takeoff_height: f64,
    pub takeoff_duration: f64,
    pub landing_duration: f64,
    pub position_convergence_time: f64,
    pub position_convergence_distance: f64,

    pub formation_transition_duration: f64,
    pub circle_rotation_period: f64,
    pub sin_wave_period: f64,
    pub sin_wave_amplitude: f64,
    pub dynamic_formation_points: usize,

    pub high_frequency_update_interval: f64,
    pub low_frequency_update_interval: f64,
    pub factor_connection_lost: f64,
    pub reconnect_attempt_interval: f64,

    pub default_battery_voltage: f32,
    pub low_battery_in_flight: f32,
    pub low_battery_on_ground: f32,

    pub closing_threads_timeout: f64,
    /// Time granted to a fleet-wide landing before motors are killed on shutdown.
    pub forced_landing_grace: f64,
    pub swarm_loop_interval: f64,
    /// Upper bound on waiting for streaming tasks to exit after a stop request.
    pub dynamic_stop_timeout: f64,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        let boundaries = Boundaries::default();
        let boundary_margin = 0.2;
        Self {
            vehicles: (1..=4)
                .map(|i| VehicleKey::from(format!("radio://0/100/2M/247E00000{i}")))
                .collect(),
            boundaries,
            drone_spacing: 0.2,
            boundary_margin,
            collision_threshold: 0.15,
            tilt_angle_x_deg: 45.0,
            tilt_angle_y_deg: 45.0,
            takeoff_height: 0.8,
            takeoff_duration: 1.5,
            landing_duration: 2.5,
            position_convergence_time: 4.0,
            position_convergence_distance: 0.2,
            formation_transition_duration: 3.0,
            circle_rotation_period: 12.0,
            sin_wave_period: 12.0,
            sin_wave_amplitude: (boundaries.z.span() - 2.0 * boundary_margin) / 3.0,
            dynamic_formation_points: 30,
            high_frequency_update_interval: 0.25,
            low_frequency_update_interval: 1.0,
            factor_connection_lost: 3.0,
            reconnect_attempt_interval: 5.0,
            default_battery_voltage: 3.0,
            low_battery_in_flight: 3.1,
            low_battery_on_ground: 3.6,
            closing_threads_timeout: 4.0,
            forced_landing_grace: 3.0,
            swarm_loop_interval: 0.1,
            dynamic_stop_timeout: 2.0,
        }
    }
}

impl SwarmConfig {
    /// Number of high frequency position samples covering one convergence window.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn position_cache_size(&self) -> usize {
        (self.position_convergence_time / self.high_frequency_update_interval) as usize
    }

    /// Silence after which a link is considered lost.
    pub fn liveness_timeout(&self) -> TimeDelta {
        Self::secs_to_delta(self.factor_connection_lost * self.low_frequency_update_interval)
    }

    /// Minimum time between two reconnect attempts of the same vehicle.
    pub fn reconnect_interval(&self) -> TimeDelta { Self::secs_to_delta(self.reconnect_attempt_interval) }

    /// Tick period of the supervision loop.
    pub fn loop_interval(&self) -> Duration { Self::secs_to_std(self.swarm_loop_interval) }

    /// Flight time given to every go-to and step of a formation plan.
    pub fn transition_duration(&self) -> Duration { Self::secs_to_std(self.formation_transition_duration) }

    /// How long shutdown waits for each kind of background task.
    pub fn closing_timeout(&self) -> Duration { Self::secs_to_std(self.closing_threads_timeout) }

    /// Wait between the fleet-wide land and the emergency stop of vehicles still flying.
    pub fn forced_landing_grace(&self) -> Duration { Self::secs_to_std(self.forced_landing_grace) }

    /// Budget for setpoint streams to stop and hand control back.
    pub fn dynamic_stop_timeout(&self) -> Duration { Self::secs_to_std(self.dynamic_stop_timeout) }

    /// Converts seconds into a `TimeDelta`, saturating negative values at zero.
    ///
    /// # Arguments
    /// * `secs` - Seconds as read from the configuration.
    ///
    /// # Returns
    /// The duration truncated to whole microseconds, so tiny positive values become zero.
    #[allow(clippy::cast_possible_truncation)]
    pub fn secs_to_delta(secs: f64) -> TimeDelta { TimeDelta::microseconds((secs.max(0.0) * 1e6) as i64) }

    /// Converts seconds into a `std::time::Duration`, saturating negative values at zero.
    pub fn secs_to_std(secs: f64) -> Duration {
        Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(Duration::MAX)
    }
}
