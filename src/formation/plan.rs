use crate::fleet_control::VehicleKey;
use crate::geometry::Position;
use chrono::TimeDelta;
use std::collections::BTreeMap;

/// Target position per vehicle.
pub type PositionSet = BTreeMap<VehicleKey, Position>;

/// Ordered formation steps, each flown to completion before the next one is sent.
#[derive(Debug, Clone, PartialEq)]
pub struct FormationPlan {
    steps: Vec<PositionSet>,
}

impl FormationPlan {
    /// A single-step plan flying straight to `target`.
    pub fn direct(target: PositionSet) -> Self { Self { steps: vec![target] } }

    pub(crate) fn from_steps(steps: Vec<PositionSet>) -> Self { Self { steps } }

    pub fn steps(&self) -> &[PositionSet] { &self.steps }

    pub fn len(&self) -> usize { self.steps.len() }

    pub fn is_empty(&self) -> bool { self.steps.is_empty() }

    /// Whether the plan routes through intermediate formations.
    pub fn is_transition(&self) -> bool { self.steps.len() > 1 }

    pub fn final_step(&self) -> Option<&PositionSet> { self.steps.last() }

    /// Adds targets for vehicles the plan does not route to the last step.
    pub(crate) fn merge_into_final(&mut self, extra: PositionSet) {
        match self.steps.last_mut() {
            Some(last) => last.extend(extra),
            None => self.steps.push(extra),
        }
    }
}

impl IntoIterator for FormationPlan {
    type Item = PositionSet;
    type IntoIter = std::vec::IntoIter<PositionSet>;

    fn into_iter(self) -> Self::IntoIter { self.steps.into_iter() }
}

/// A single setpoint of a dynamic trajectory. Yaw is in degrees, as the vehicles expect it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Waypoint {
    pub position: Position,
    pub yaw_deg: f64,
}

impl Waypoint {
    pub const fn new(position: Position, yaw_deg: f64) -> Self { Self { position, yaw_deg } }
}

/// Looping waypoint sequence of one vehicle.
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicTrajectory {
    waypoints: Vec<Waypoint>,
    waypoint_dt: TimeDelta,
}

impl DynamicTrajectory {
    pub fn new(waypoints: Vec<Waypoint>, waypoint_dt: TimeDelta) -> Self {
        Self { waypoints, waypoint_dt }
    }

    pub fn waypoints(&self) -> &[Waypoint] { &self.waypoints }

    pub fn waypoint_dt(&self) -> TimeDelta { self.waypoint_dt }

    pub fn len(&self) -> usize { self.waypoints.len() }

    pub fn is_empty(&self) -> bool { self.waypoints.is_empty() }

    pub fn first(&self) -> Option<&Waypoint> { self.waypoints.first() }

    /// Waypoint for an unwrapped tick count, wrapping around the loop.
    pub fn at(&self, tick: usize) -> Option<&Waypoint> {
        if self.waypoints.is_empty() {
            None
        } else {
            self.waypoints.get(tick % self.waypoints.len())
        }
    }
}

/// Start positions plus per-vehicle trajectories of a dynamic formation.
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicFormation {
    pub start: PositionSet,
    pub trajectories: BTreeMap<VehicleKey, DynamicTrajectory>,
    pub waypoint_dt: TimeDelta,
}

/// Result of laying out any [`super::FormationKind`].
#[derive(Debug, Clone, PartialEq)]
pub enum Layout {
    Static(PositionSet),
    Dynamic(DynamicFormation),
}

impl Layout {
    /// Positions the vehicles have to reach before the formation begins.
    pub fn start_positions(&self) -> &PositionSet {
        match self {
            Self::Static(set) => set,
            Self::Dynamic(dynamic) => &dynamic.start,
        }
    }
}
