use super::{
    error::{Axis, FormationError},
    kind::FormationKind,
    plan::{DynamicFormation, DynamicTrajectory, FormationPlan, Layout, PositionSet, Waypoint},
};
use crate::config::{Boundaries, SwarmConfig};
use crate::fleet_control::VehicleKey;
use crate::geometry::{Position, Vec3D, segment_distance};
use itertools::Itertools;
use std::collections::BTreeMap;
use std::f64::consts::{PI, TAU};

/// Pure, deterministic layout engine for the formation set.
///
/// Every method receives the vehicles currently in formation, in a stable order, and returns
/// target positions. Slots are assigned in the order the vehicles are given.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FormationCalculator {
    boundaries: Boundaries,
    min_spacing: f64,
    margin: f64,
}

impl FormationCalculator {
    pub fn new(boundaries: Boundaries, min_spacing: f64, margin: f64) -> Self {
        Self { boundaries, min_spacing, margin }
    }

    pub fn from_config(config: &SwarmConfig) -> Self {
        Self::new(config.boundaries, config.drone_spacing, config.boundary_margin)
    }

    pub fn boundaries(&self) -> &Boundaries { &self.boundaries }

    pub fn min_spacing(&self) -> f64 { self.min_spacing }

    /// Lays out any formation kind.
    pub fn layout(
        &self,
        kind: FormationKind,
        available: &[VehicleKey],
    ) -> Result<Layout, FormationError> {
        match kind {
            FormationKind::FlatSquare => self.flat_square(available).map(Layout::Static),
            FormationKind::TiltedPlane { angle_x_deg, angle_y_deg } => {
                self.tilted_plane(available, angle_x_deg, angle_y_deg).map(Layout::Static)
            }
            FormationKind::Circle => self.circle(available).map(Layout::Static),
            FormationKind::MovingCircle { period, points } => {
                self.moving_circle(available, period, points).map(Layout::Dynamic)
            }
            FormationKind::SinWave { amplitude, period, points } => {
                self.sin_wave(available, amplitude, period, points).map(Layout::Dynamic)
            }
        }
    }

    fn mid_height(&self) -> f64 { self.boundaries.z.center() }

    fn check_spacing(&self, axis: Axis, spacing: f64) -> Result<(), FormationError> {
        if spacing < self.min_spacing {
            Err(FormationError::InsufficientSpacing {
                axis,
                spacing,
                min_spacing: self.min_spacing,
            })
        } else {
            Ok(())
        }
    }

    /// Smallest square grid holding all vehicles, centered at mid-height.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn flat_square(&self, available: &[VehicleKey]) -> Result<PositionSet, FormationError> {
        let n = available.len();
        if n == 0 {
            return Ok(PositionSet::new());
        }
        let n_side = (n as f64).sqrt().ceil() as usize;
        let x_spacing = self.boundaries.x.span() / (n_side + 1) as f64;
        let y_spacing = self.boundaries.y.span() / (n_side + 1) as f64;
        self.check_spacing(Axis::X, x_spacing)?;
        self.check_spacing(Axis::Y, y_spacing)?;

        let z = self.mid_height();
        Ok(available
            .iter()
            .enumerate()
            .map(|(i, key)| {
                let (row, col) = (i / n_side, i % n_side);
                let x = self.boundaries.x.min + (col + 1) as f64 * x_spacing;
                let y = self.boundaries.y.min + (row + 1) as f64 * y_spacing;
                (key.clone(), Vec3D::new(x, y, z))
            })
            .collect())
    }

    /// The flat grid tilted by the given angles, clamped inside the vertical margins.
    pub fn tilted_plane(
        &self,
        available: &[VehicleKey],
        angle_x_deg: f64,
        angle_y_deg: f64,
    ) -> Result<PositionSet, FormationError> {
        if !(angle_x_deg.abs() < 90.0 && angle_y_deg.abs() < 90.0) {
            return Err(FormationError::InvalidParameter("tilt angle must stay below 90 degrees"));
        }
        let (tan_x, tan_y) = (angle_x_deg.to_radians().tan(), angle_y_deg.to_radians().tan());
        let flat = self.flat_square(available)?;
        Ok(flat
            .into_iter()
            .map(|(key, pos)| {
                let z = pos.z() + pos.x() * tan_x + pos.y() * tan_y;
                let z_clamped = self.boundaries.z.clamp_with_margin(z, self.margin);
                (key, pos.with_z(z_clamped))
            })
            .collect())
    }

    fn circle_radius(&self) -> Result<f64, FormationError> {
        let radius = self.boundaries.x.span().min(self.boundaries.y.span()) / 2.0 - 2.0 * self.min_spacing;
        if radius <= 0.0 {
            Err(FormationError::RadiusTooSmall { radius })
        } else {
            Ok(radius)
        }
    }

    /// Angle of slot `i` out of `n`, evenly spaced starting at the +x axis.
    #[allow(clippy::cast_precision_loss)]
    fn slot_angle(i: usize, n: usize) -> f64 { TAU * i as f64 / n as f64 }

    fn point_on_circle(&self, radius: f64, angle: f64) -> Position {
        Vec3D::new(
            self.boundaries.x.center() + radius * angle.cos(),
            self.boundaries.y.center() + radius * angle.sin(),
            self.mid_height(),
        )
    }

    /// Vehicles evenly spread by angle on a centered circle at mid-height.
    #[allow(clippy::cast_precision_loss)]
    pub fn circle(&self, available: &[VehicleKey]) -> Result<PositionSet, FormationError> {
        let n = available.len();
        if n == 0 {
            return Ok(PositionSet::new());
        }
        let radius = self.circle_radius()?;
        if n > 1 {
            let chord = 2.0 * radius * (PI / n as f64).sin();
            self.check_spacing(Axis::Arc, chord)?;
        }
        Ok(available
            .iter()
            .enumerate()
            .map(|(i, key)| (key.clone(), self.point_on_circle(radius, Self::slot_angle(i, n))))
            .collect())
    }

    #[allow(clippy::cast_precision_loss)]
    fn waypoint_dt(period: f64, points: usize) -> Result<chrono::TimeDelta, FormationError> {
        if points == 0 {
            return Err(FormationError::InvalidParameter("dynamic formation needs waypoints"));
        }
        if !(period.is_finite() && period > 0.0) {
            return Err(FormationError::InvalidParameter("dynamic formation period must be positive"));
        }
        let dt = SwarmConfig::secs_to_delta(period / points as f64);
        if dt <= chrono::TimeDelta::zero() {
            return Err(FormationError::InvalidParameter("dynamic formation waypoint interval rounds to zero"));
        }
        Ok(dt)
    }

    /// The circle formation rotating as a rigid body.
    ///
    /// Each vehicle's loop starts at its own slot angle, so relative spacing is preserved while
    /// the whole ring turns. Yaw always points at the circle center.
    #[allow(clippy::cast_precision_loss)]
    pub fn moving_circle(
        &self,
        available: &[VehicleKey],
        period: f64,
        points: usize,
    ) -> Result<DynamicFormation, FormationError> {
        let waypoint_dt = Self::waypoint_dt(period, points)?;
        let start = self.circle(available)?;
        let n = available.len();
        let trajectories = if n == 0 {
            BTreeMap::new()
        } else {
            let radius = self.circle_radius()?;
            available
                .iter()
                .enumerate()
                .map(|(i, key)| {
                    let base = Self::slot_angle(i, n);
                    let waypoints = (0..points)
                        .map(|k| {
                            let angle = base + Self::slot_angle(k, points);
                            Waypoint::new(self.point_on_circle(radius, angle), Self::yaw_to_center(angle))
                        })
                        .collect();
                    (key.clone(), DynamicTrajectory::new(waypoints, waypoint_dt))
                })
                .collect()
        };
        Ok(DynamicFormation { start, trajectories, waypoint_dt })
    }

    /// Heading in degrees, in `(-180, 180]`, that faces the center from polar angle `angle`.
    fn yaw_to_center(angle: f64) -> f64 {
        let deg = (angle + PI).to_degrees().rem_euclid(360.0);
        if deg > 180.0 { deg - 360.0 } else { deg }
    }

    /// Vehicles spread along x, each bobbing vertically with a phase given by its x position.
    #[allow(clippy::cast_precision_loss)]
    pub fn sin_wave(
        &self,
        available: &[VehicleKey],
        amplitude: f64,
        period: f64,
        points: usize,
    ) -> Result<DynamicFormation, FormationError> {
        let waypoint_dt = Self::waypoint_dt(period, points)?;
        let n = available.len();
        if n == 0 {
            return Ok(DynamicFormation {
                start: PositionSet::new(),
                trajectories: BTreeMap::new(),
                waypoint_dt,
            });
        }
        let x_range = self.boundaries.x;
        let x_spacing = x_range.span() / (n + 1) as f64;
        self.check_spacing(Axis::X, x_spacing)?;

        let (y, z_base) = (self.boundaries.y.center(), self.mid_height());
        let trajectories: BTreeMap<VehicleKey, DynamicTrajectory> = available
            .iter()
            .enumerate()
            .map(|(i, key)| {
                let x = x_range.min + (i + 1) as f64 * x_spacing;
                let phase_x = TAU * (x - x_range.min) / x_range.span();
                let waypoints = (0..points)
                    .map(|k| {
                        let z = z_base + amplitude * (phase_x + Self::slot_angle(k, points)).sin();
                        let z_clamped = self.boundaries.z.clamp_with_margin(z, self.margin);
                        Waypoint::new(Vec3D::new(x, y, z_clamped), 0.0)
                    })
                    .collect();
                (key.clone(), DynamicTrajectory::new(waypoints, waypoint_dt))
            })
            .collect();
        let start = trajectories
            .iter()
            .filter_map(|(key, traj)| traj.first().map(|w| (key.clone(), w.position)))
            .collect();
        Ok(DynamicFormation { start, trajectories, waypoint_dt })
    }

    /// Fails unless both sets hold exactly the same vehicles.
    fn check_same_vehicles(start: &PositionSet, end: &PositionSet) -> Result<(), FormationError> {
        if start.len() != end.len() {
            return Err(FormationError::MismatchedVehicleSets { start: start.len(), end: end.len() });
        }
        match start.keys().find(|key| !end.contains_key(*key)) {
            Some(key) => Err(FormationError::UnknownVehicle(key.clone())),
            None => Ok(()),
        }
    }

    /// Whether any two straight start-to-end moves pass closer than `threshold`.
    pub fn positions_intersect(
        start: &PositionSet,
        end: &PositionSet,
        threshold: f64,
    ) -> Result<bool, FormationError> {
        Self::check_same_vehicles(start, end)?;
        Ok(start.keys().tuple_combinations().any(|(a, b)| {
            segment_distance(start[a], end[a], start[b], end[b]) < threshold
        }))
    }

    /// Smallest pairwise distance between straight start-to-end moves, `None` below two vehicles.
    pub fn min_pairwise_distance(
        start: &PositionSet,
        end: &PositionSet,
    ) -> Result<Option<f64>, FormationError> {
        Self::check_same_vehicles(start, end)?;
        Ok(start
            .keys()
            .tuple_combinations()
            .map(|(a, b)| segment_distance(start[a], end[a], start[b], end[b]))
            .min_by(f64::total_cmp))
    }

    /// Lift-permute-drop transition from `start` to `end`.
    ///
    /// 1. every vehicle climbs or sinks vertically to its own altitude band, bands ordered like
    ///    the current altitudes,
    /// 2. every vehicle moves horizontally to its own target x/y inside its band,
    /// 3. every vehicle descends vertically onto its exact target.
    ///
    /// Each phase only moves one axis group and horizontal moves happen in separated bands.
    /// The phases must be flown strictly one after another.
    #[allow(clippy::cast_precision_loss)]
    pub fn transition_plan(
        &self,
        start: &PositionSet,
        end: &PositionSet,
    ) -> Result<FormationPlan, FormationError> {
        Self::check_same_vehicles(start, end)?;
        let n = start.len();
        if n == 0 {
            return Ok(FormationPlan::direct(end.clone()));
        }
        let z_spacing = self.boundaries.z.span() / (n + 1) as f64;
        self.check_spacing(Axis::Z, z_spacing)?;

        let by_height = start
            .iter()
            .sorted_by(|(ka, a), (kb, b)| a.z().total_cmp(&b.z()).then_with(|| ka.cmp(kb)))
            .map(|(key, _)| key);
        let lifted: PositionSet = by_height
            .enumerate()
            .map(|(i, key)| {
                let z = self.boundaries.z.min + (i + 1) as f64 * z_spacing;
                (key.clone(), start[key].with_z(z))
            })
            .collect();
        let shifted: PositionSet = lifted
            .iter()
            .map(|(key, band)| {
                let target = end[key];
                (key.clone(), Vec3D::new(target.x(), target.y(), band.z()))
            })
            .collect();
        Ok(FormationPlan::from_steps(vec![lifted, shifted, end.clone()]))
    }
}
