mod calculator;
mod error;
mod kind;
mod membership;
mod plan;
#[cfg(test)]
mod tests;

pub use calculator::FormationCalculator;
pub use error::{Axis, FormationError};
pub use kind::FormationKind;
pub use membership::FormationMembership;
pub use plan::{DynamicFormation, DynamicTrajectory, FormationPlan, Layout, PositionSet, Waypoint};
