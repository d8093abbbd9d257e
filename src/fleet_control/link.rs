use super::VehicleKey;
use crate::geometry::Position;
use async_trait::async_trait;
use strum_macros::Display;

/// Opaque handle to an open radio link.
///
/// `session` lets a link implementation tell a fresh connection apart from a stale one that
/// was dropped after a liveness timeout.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LinkHandle {
    key: VehicleKey,
    session: u64,
}

impl LinkHandle {
    pub fn new(key: VehicleKey, session: u64) -> Self { Self { key, session } }

    pub fn key(&self) -> &VehicleKey { &self.key }

    pub fn session(&self) -> u64 { self.session }
}

/// Failures reported by a [`Link`] or [`super::Telemetry`] implementation.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    Unreachable,
    NotConnected,
    SendFailed,
    SubscriptionFailed,
}

impl std::error::Error for LinkError {}

/// Command channel to the vehicles.
///
/// Implementations wrap the radio SDK. Every call is a single, non-blocking-on-flight send:
/// `send_takeoff` returns as soon as the command left the radio, not when the vehicle
/// reached its height.
#[async_trait]
pub trait Link: Send + Sync {
    async fn open(&self, key: &VehicleKey) -> Result<LinkHandle, LinkError>;

    async fn close(&self, handle: &LinkHandle) -> Result<(), LinkError>;

    async fn send_takeoff(&self, handle: &LinkHandle, height: f64, duration: f64) -> Result<(), LinkError>;

    async fn send_land(&self, handle: &LinkHandle, height: f64, duration: f64) -> Result<(), LinkError>;

    /// Smooth move to an absolute target, yaw in degrees.
    async fn send_go_to(
        &self,
        handle: &LinkHandle,
        target: Position,
        yaw_deg: f64,
        duration: f64,
    ) -> Result<(), LinkError>;

    /// Low-level position setpoint, overrides the high-level commander until
    /// [`Link::send_notify_setpoint_stop`] is sent.
    async fn send_position_setpoint(&self, handle: &LinkHandle, position: Position, yaw_deg: f64)
    -> Result<(), LinkError>;

    /// Immediate motor stop.
    async fn send_stop(&self, handle: &LinkHandle) -> Result<(), LinkError>;

    /// Hands control back from low-level setpoints to the high-level commander.
    async fn send_notify_setpoint_stop(&self, handle: &LinkHandle) -> Result<(), LinkError>;
}
