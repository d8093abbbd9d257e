use super::{ConnectionState, HighFreqSample, LinkHandle, LowFreqSample, SupervisorFlags, TelemetryStreams};
use crate::event;
use crate::geometry::Position;
use chrono::{DateTime, TimeDelta, Utc};
use itertools::Itertools;
use std::collections::VecDeque;

/// The most recent position samples of one vehicle, oldest first.
#[derive(Debug, Clone)]
pub struct PositionHistory {
    samples: VecDeque<Position>,
    capacity: usize,
}

impl PositionHistory {
    pub fn new(capacity: usize) -> Self {
        Self { samples: VecDeque::with_capacity(capacity), capacity }
    }

    pub fn push(&mut self, position: Position) {
        if self.capacity == 0 {
            return;
        }
        while self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(position);
    }

    pub fn latest(&self) -> Option<Position> { self.samples.back().copied() }

    pub fn len(&self) -> usize { self.samples.len() }

    pub fn is_empty(&self) -> bool { self.samples.is_empty() }

    pub fn is_full(&self) -> bool { self.capacity > 0 && self.samples.len() == self.capacity }

    pub fn clear(&mut self) { self.samples.clear(); }

    /// Whether the position estimate has settled.
    ///
    /// Needs a full history in which no two samples are more than `max_distance` apart.
    pub fn converged(&self, max_distance: f64) -> bool {
        self.is_full()
            && self.samples.iter().tuple_combinations().all(|(a, b)| a.euclid_distance(b) <= max_distance)
    }
}

/// Everything the tower knows about a single vehicle.
#[derive(Debug)]
pub struct VehicleState {
    connection: ConnectionState,
    battery_voltage: f32,
    last_telemetry: DateTime<Utc>,
    last_reconnect_attempt: Option<DateTime<Utc>>,
    supervisor: Option<SupervisorFlags>,
    history: PositionHistory,
    link: Option<LinkHandle>,
    telemetry: Option<TelemetryStreams>,
    /// Bumped whenever the vehicle is sent down or dropped, lets a running plan notice it.
    groundings: u64,
}

impl VehicleState {
    pub fn new(default_voltage: f32, history_len: usize, now: DateTime<Utc>) -> Self {
        Self {
            connection: ConnectionState::Disconnected,
            battery_voltage: default_voltage,
            last_telemetry: now,
            last_reconnect_attempt: None,
            supervisor: None,
            history: PositionHistory::new(history_len),
            link: None,
            telemetry: None,
            groundings: 0,
        }
    }

    pub fn connection(&self) -> ConnectionState { self.connection }

    pub fn battery_voltage(&self) -> f32 { self.battery_voltage }

    pub fn last_telemetry(&self) -> DateTime<Utc> { self.last_telemetry }

    pub fn supervisor(&self) -> Option<SupervisorFlags> { self.supervisor }

    pub fn history(&self) -> &PositionHistory { &self.history }

    pub fn latest_position(&self) -> Option<Position> { self.history.latest() }

    pub fn link(&self) -> Option<&LinkHandle> { self.link.as_ref() }

    /// Number of times the vehicle was landed, stopped or dropped so far.
    ///
    /// A formation plan records this when it starts and skips the vehicle in later steps once it
    /// changed.
    pub fn groundings(&self) -> u64 { self.groundings }

    pub(super) fn mark_grounded(&mut self) { self.groundings += 1; }

    /// Claims the vehicle for a connection attempt. Fails if it is not disconnected.
    pub(super) fn begin_connecting(&mut self, now: DateTime<Utc>) -> bool {
        if self.connection != ConnectionState::Disconnected {
            return false;
        }
        self.connection = ConnectionState::Connecting;
        self.last_reconnect_attempt = Some(now);
        true
    }

    /// Gives a failed connection attempt back to the reconnect logic.
    pub(super) fn abort_connecting(&mut self) {
        if self.connection == ConnectionState::Connecting {
            self.connection = ConnectionState::Disconnected;
        }
    }

    pub(super) fn attach(&mut self, link: LinkHandle, telemetry: TelemetryStreams, now: DateTime<Utc>) {
        self.link = Some(link);
        self.telemetry = Some(telemetry);
        self.connection = ConnectionState::Connected;
        self.last_telemetry = now;
    }

    /// Whether enough time passed since the last connection attempt.
    pub(super) fn reconnect_due(&self, now: DateTime<Utc>, interval: TimeDelta) -> bool {
        self.last_reconnect_attempt.is_none_or(|last| now - last >= interval)
    }

    pub(super) fn is_stale(&self, now: DateTime<Utc>, timeout: TimeDelta) -> bool {
        now - self.last_telemetry > timeout
    }

    /// Drops the link and all live data. Returns the released handle, if any, so the caller
    /// can close it outside of the fleet lock.
    pub(super) fn reset(&mut self, default_voltage: f32, now: DateTime<Utc>) -> Option<LinkHandle> {
        self.connection = ConnectionState::Disconnected;
        self.battery_voltage = default_voltage;
        self.supervisor = None;
        self.history.clear();
        self.telemetry = None;
        self.last_reconnect_attempt = Some(now);
        self.groundings += 1;
        self.link.take()
    }

    /// Closes the telemetry receivers without touching the link.
    pub(super) fn drop_telemetry(&mut self) -> bool { self.telemetry.take().is_some() }

    pub(super) fn apply_low_freq(&mut self, sample: LowFreqSample, default_voltage: f32) {
        self.battery_voltage = sample.battery_voltage.unwrap_or(default_voltage);
        if let Some(raw) = sample.supervisor_info {
            let flags = SupervisorFlags::new(raw);
            self.connection = flags.connection_state();
            self.supervisor = Some(flags);
            self.last_telemetry = self.last_telemetry.max(sample.timestamp);
        }
    }

    pub(super) fn apply_high_freq(&mut self, sample: HighFreqSample) {
        if sample.position.is_finite() {
            self.history.push(sample.position);
        }
    }

    /// Moves every queued sample into the cached state. Returns the number of samples taken.
    pub(super) fn drain_telemetry(&mut self, default_voltage: f32) -> usize {
        let Some(streams) = self.telemetry.as_mut() else { return 0 };
        let mut low = Vec::new();
        let mut high = Vec::new();
        while let Ok(sample) = streams.low_freq.try_recv() {
            low.push(sample);
        }
        while let Ok(sample) = streams.high_freq.try_recv() {
            high.push(sample);
        }
        let taken = low.len() + high.len();
        for sample in low {
            self.apply_low_freq(sample, default_voltage);
        }
        for sample in high {
            self.apply_high_freq(sample);
        }
        if taken > 0 {
            event!(
                "Telemetry drained: {taken} samples, state {}, battery {:.2} V",
                self.connection,
                self.battery_voltage
            );
        }
        taken
    }
}
