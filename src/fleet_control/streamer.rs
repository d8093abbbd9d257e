use super::{Link, LinkHandle, VehicleKey};
use crate::formation::DynamicTrajectory;
use crate::{error, event, info, warn};
use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;
use std::time::Duration;
use strum_macros::Display;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const DT_0_STD: Duration = Duration::from_secs(0);

/// Common time origin of all streams of one dynamic formation.
///
/// Every vehicle derives its waypoint index from the same `start` and `dt`, so streams stay
/// phase-locked even if one of them is delayed by a slow send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SharedEpoch {
    start: DateTime<Utc>,
    dt: TimeDelta,
}

impl SharedEpoch {
    pub fn new(start: DateTime<Utc>, dt: TimeDelta) -> Self { Self { start, dt } }

    pub fn start(&self) -> DateTime<Utc> { self.start }

    pub fn dt(&self) -> TimeDelta { self.dt }

    /// Number of whole waypoint intervals elapsed at `t`. Zero before the epoch.
    pub fn tick_at(&self, t: DateTime<Utc>) -> usize {
        let dt_us = self.dt.num_microseconds().unwrap_or(i64::MAX);
        if dt_us <= 0 || t <= self.start {
            return 0;
        }
        let elapsed_us = (t - self.start).num_microseconds().unwrap_or(i64::MAX);
        usize::try_from(elapsed_us / dt_us).unwrap_or(usize::MAX)
    }

    /// Waypoint index at `t` for a loop of `len` waypoints.
    pub fn index_at(&self, t: DateTime<Utc>, len: usize) -> usize {
        if len == 0 { 0 } else { self.tick_at(t) % len }
    }

    /// Wall-clock time at which `tick` begins.
    pub fn tick_time(&self, tick: usize) -> DateTime<Utc> {
        let ticks = i32::try_from(tick).unwrap_or(i32::MAX);
        self.dt.checked_mul(ticks).and_then(|offset| self.start.checked_add_signed(offset)).unwrap_or(self.start)
    }
}

/// Lifecycle of one vehicle's setpoint stream.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Streaming,
    Stopping,
    Idle,
}

struct StreamTask {
    key: VehicleKey,
    c_tok: CancellationToken,
    state: watch::Receiver<StreamState>,
    handle: JoinHandle<()>,
}

/// A running dynamic formation: one setpoint stream per vehicle.
pub struct DynamicRun {
    c_tok: CancellationToken,
    epoch: SharedEpoch,
    tasks: Vec<StreamTask>,
}

impl DynamicRun {
    /// Spawns one stream per `(vehicle, link, trajectory)` triple, all sharing `epoch`.
    pub fn start(
        link: Arc<dyn Link>,
        targets: Vec<(VehicleKey, LinkHandle, DynamicTrajectory)>,
        epoch: SharedEpoch,
    ) -> Self {
        let c_tok = CancellationToken::new();
        let tasks = targets
            .into_iter()
            .map(|(key, handle, trajectory)| {
                let (state_tx, state_rx) = watch::channel(StreamState::Streaming);
                let task_tok = c_tok.child_token();
                let task = tokio::spawn(stream_trajectory(
                    Arc::clone(&link),
                    handle,
                    trajectory,
                    epoch,
                    task_tok.clone(),
                    state_tx,
                ));
                StreamTask { key, c_tok: task_tok, state: state_rx, handle: task }
            })
            .collect::<Vec<_>>();
        info!("Dynamic formation streaming to {} vehicles, dt {} ms.", tasks.len(), epoch.dt.num_milliseconds());
        Self { c_tok, epoch, tasks }
    }

    pub fn epoch(&self) -> SharedEpoch { self.epoch }

    pub fn states(&self) -> Vec<(VehicleKey, StreamState)> {
        self.tasks.iter().map(|t| (t.key.clone(), *t.state.borrow())).collect()
    }

    pub fn is_streaming(&self, key: &VehicleKey) -> bool {
        self.tasks.iter().any(|t| &t.key == key && *t.state.borrow() == StreamState::Streaming)
    }

    /// Requests every stream to stop without waiting for it.
    pub fn cancel(&self) { self.c_tok.cancel(); }

    /// Requests the stream of `key` to stop without waiting for it.
    pub fn cancel_vehicle(&self, key: &VehicleKey) {
        self.tasks.iter().filter(|t| &t.key == key).for_each(|t| t.c_tok.cancel());
    }

    /// Stops the stream of a single vehicle and waits up to `timeout` for it to hand control
    /// back. Other streams keep running.
    pub async fn stop_vehicle(&mut self, key: &VehicleKey, timeout: Duration) {
        let Some(pos) = self.tasks.iter().position(|t| &t.key == key) else { return };
        let task = self.tasks.swap_remove(pos);
        task.c_tok.cancel();
        Self::join_task(task, tokio::time::Instant::now() + timeout).await;
    }

    /// Cancels all streams and waits for them, giving up on stragglers after `timeout`.
    pub async fn stop(self, timeout: Duration) {
        self.c_tok.cancel();
        let deadline = tokio::time::Instant::now() + timeout;
        for task in self.tasks {
            Self::join_task(task, deadline).await;
        }
    }

    async fn join_task(task: StreamTask, deadline: tokio::time::Instant) {
        match tokio::time::timeout_at(deadline, task.handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Setpoint stream for {} failed: {e}", task.key),
            Err(_) => warn!("Setpoint stream for {} did not stop in time.", task.key),
        }
    }
}

/// Sends the trajectory's waypoints in a loop, one per epoch tick, until cancelled.
///
/// On cancellation the vehicle is stopped and control is handed back to the high-level
/// commander, in that order.
async fn stream_trajectory(
    link: Arc<dyn Link>,
    handle: LinkHandle,
    trajectory: DynamicTrajectory,
    epoch: SharedEpoch,
    c_tok: CancellationToken,
    state: watch::Sender<StreamState>,
) {
    let key = handle.key().clone();
    loop {
        if c_tok.is_cancelled() {
            break;
        }
        let tick = epoch.tick_at(Utc::now());
        if let Some(waypoint) = trajectory.at(tick) {
            if let Err(e) = link.send_position_setpoint(&handle, waypoint.position, waypoint.yaw_deg).await {
                error!("Setpoint to {key} failed: {e}");
            } else {
                event!("Setpoint {} to {key}: {}", tick % trajectory.len(), waypoint.position);
            }
        }
        let wait = (epoch.tick_time(tick + 1) - Utc::now()).to_std().unwrap_or(DT_0_STD);
        tokio::select! {
            () = c_tok.cancelled() => break,
            () = tokio::time::sleep(wait) => {}
        }
    }
    state.send_replace(StreamState::Stopping);
    if let Err(e) = link.send_stop(&handle).await {
        error!("Stop after streaming failed for {key}: {e}");
    }
    if let Err(e) = link.send_notify_setpoint_stop(&handle).await {
        error!("Setpoint release failed for {key}: {e}");
    }
    state.send_replace(StreamState::Idle);
}
