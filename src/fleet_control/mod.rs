//! Fleet supervision: per-vehicle state from telemetry, safety rules, and formation commands.

mod connection_state;
mod fleet_state;
mod link;
mod streamer;
mod supervisor;
mod telemetry;
mod vehicle_key;
mod vehicle_state;

pub use connection_state::{ConnectionState, SupervisorBit, SupervisorFlags};
pub use fleet_state::FleetState;
pub use link::{Link, LinkError, LinkHandle};
pub use streamer::{DynamicRun, SharedEpoch, StreamState};
pub use supervisor::{FleetSnapshot, FleetSupervisor, ReconcileReport, VehicleSnapshot};
pub use telemetry::{HighFreqSample, LowFreqSample, Telemetry, TelemetrySenders, TelemetryStreams};
pub use vehicle_key::VehicleKey;
pub use vehicle_state::{PositionHistory, VehicleState};
