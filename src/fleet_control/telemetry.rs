use super::{LinkError, LinkHandle};
use crate::geometry::Position;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

/// Battery and supervisor word, delivered at the low telemetry rate.
///
/// Either field may be missing when the vehicle did not report it in this sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LowFreqSample {
    pub timestamp: DateTime<Utc>,
    pub battery_voltage: Option<f32>,
    pub supervisor_info: Option<u16>,
}

/// Estimated position, delivered at the high telemetry rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HighFreqSample {
    pub timestamp: DateTime<Utc>,
    pub position: Position,
}

/// Receiving side of one vehicle's telemetry subscription.
#[derive(Debug)]
pub struct TelemetryStreams {
    pub low_freq: mpsc::Receiver<LowFreqSample>,
    pub high_freq: mpsc::Receiver<HighFreqSample>,
}

/// Sending side handed to whatever pumps samples out of the radio.
#[derive(Debug, Clone)]
pub struct TelemetrySenders {
    pub low_freq: mpsc::Sender<LowFreqSample>,
    pub high_freq: mpsc::Sender<HighFreqSample>,
}

impl TelemetryStreams {
    /// Creates a bounded channel pair. Producers should drop samples on a full channel rather
    /// than wait, the supervisor only cares about the most recent ones.
    pub fn channel(capacity: usize) -> (TelemetrySenders, TelemetryStreams) {
        let (low_tx, low_rx) = mpsc::channel(capacity);
        let (high_tx, high_rx) = mpsc::channel(capacity);
        (
            TelemetrySenders { low_freq: low_tx, high_freq: high_tx },
            TelemetryStreams { low_freq: low_rx, high_freq: high_rx },
        )
    }
}

/// Source of periodic telemetry for open links.
#[async_trait]
pub trait Telemetry: Send + Sync {
    async fn subscribe(&self, handle: &LinkHandle) -> Result<TelemetryStreams, LinkError>;

    /// Stops delivery for `handle`. Unknown or already closed handles are ignored.
    async fn unsubscribe(&self, handle: &LinkHandle);
}
