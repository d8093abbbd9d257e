#![allow(clippy::similar_names, clippy::module_name_repetitions)]
//! Control tower for a small swarm of quadcopters.
//!
//! The crate computes target positions for a fixed set of geometric formations, checks whether
//! a direct formation change would make two flight paths pass too close to each other, plans a
//! lift-permute-drop transition when it would, and supervises the fleet from live telemetry.
//! Radio links and telemetry delivery are provided by the caller through the
//! [`fleet_control::Link`] and [`fleet_control::Telemetry`] traits.

pub mod config;
pub mod fleet_control;
pub mod formation;
pub mod geometry;
mod logger;

pub use config::SwarmConfig;
pub use fleet_control::{FleetSupervisor, VehicleKey};
pub use formation::{FormationCalculator, FormationError, FormationKind};
