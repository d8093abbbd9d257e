use super::{
    ConnectionState, DynamicRun, FleetState, Link, LinkHandle, SharedEpoch, Telemetry, VehicleKey,
};
use crate::config::SwarmConfig;
use crate::formation::{
    DynamicFormation, FormationCalculator, FormationError, FormationKind, FormationPlan, Layout, PositionSet,
};
use crate::geometry::Position;
use crate::{error, event, formation, info, log, warn};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

const MIN_LOOP_INTERVAL: Duration = Duration::from_millis(1);

/// Point-in-time view of one vehicle.
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleSnapshot {
    pub key: VehicleKey,
    pub connection: ConnectionState,
    pub battery_voltage: f32,
    pub position: Option<Position>,
    pub in_formation: bool,
}

/// Point-in-time view of the whole fleet, in configuration order.
#[derive(Debug, Clone, PartialEq)]
pub struct FleetSnapshot {
    pub vehicles: Vec<VehicleSnapshot>,
    pub current_formation: Option<FormationKind>,
}

/// What a single reconciliation tick changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub telemetry_samples: usize,
    pub reconnecting: Vec<VehicleKey>,
    pub timed_out: Vec<VehicleKey>,
    pub low_battery_landings: Vec<VehicleKey>,
}

/// Owns the fleet state and turns telemetry and operator commands into link commands.
///
/// Methods that may trigger a formation reflow in the background take `self: &Arc<Self>`.
pub struct FleetSupervisor {
    config: SwarmConfig,
    calculator: FormationCalculator,
    link: Arc<dyn Link>,
    telemetry: Arc<dyn Telemetry>,
    fleet: Mutex<FleetState>,
    current_formation: Mutex<Option<FormationKind>>,
    /// Serializes formation commands so steps of two plans never interleave.
    command_lock: Mutex<()>,
    /// Orders go-to dispatch against land and stop commands, so no go-to of a running plan
    /// reaches a vehicle after its land or stop.
    send_gate: Mutex<()>,
    dynamic_run: Mutex<Option<DynamicRun>>,
    conn_tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
    reflow_tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
    loop_task: std::sync::Mutex<Option<JoinHandle<()>>>,
    c_tok: CancellationToken,
}

impl FleetSupervisor {
    /// Creates a supervisor for the vehicles listed in `config`.
    ///
    /// Nothing is dialed yet, every vehicle starts disconnected until [`Self::connect_all`]
    /// or the supervision loop connects it.
    ///
    /// # Arguments
    /// * `config` - Fleet, arena and timing parameters.
    /// * `link` - Command transport to the vehicles.
    /// * `telemetry` - Source of the per-vehicle telemetry streams.
    pub fn new(config: SwarmConfig, link: Arc<dyn Link>, telemetry: Arc<dyn Telemetry>) -> Self {
        let fleet = FleetState::new(
            &config.vehicles,
            config.default_battery_voltage,
            config.position_cache_size(),
            Utc::now(),
        );
        Self {
            calculator: FormationCalculator::from_config(&config),
            config,
            link,
            telemetry,
            fleet: Mutex::new(fleet),
            current_formation: Mutex::new(None),
            command_lock: Mutex::new(()),
            send_gate: Mutex::new(()),
            dynamic_run: Mutex::new(None),
            conn_tasks: std::sync::Mutex::new(Vec::new()),
            reflow_tasks: std::sync::Mutex::new(Vec::new()),
            loop_task: std::sync::Mutex::new(None),
            c_tok: CancellationToken::new(),
        }
    }

    /// The configuration this supervisor was built with.
    pub fn config(&self) -> &SwarmConfig { &self.config }

    /// Layout calculator for the configured arena.
    pub fn calculator(&self) -> &FormationCalculator { &self.calculator }

    /// The last formation kind commanded, kept across membership changes.
    pub async fn current_formation(&self) -> Option<FormationKind> { *self.current_formation.lock().await }

    /// Opens the link and telemetry subscription of one vehicle.
    ///
    /// Does nothing unless the vehicle is currently disconnected, so concurrent attempts for the
    /// same vehicle never dial twice.
    pub async fn connect_one(&self, key: &VehicleKey) -> bool { self.connect_one_at(key, Utc::now()).await }

    /// Connection attempt accounted to time `at` for the reconnect interval.
    async fn connect_one_at(&self, key: &VehicleKey, at: DateTime<Utc>) -> bool {
        {
            let mut fleet = self.fleet.lock().await;
            let Some(vehicle) = fleet.vehicle_mut(key) else {
                warn!("Vehicle {key} is not configured, not connecting.");
                return false;
            };
            if !vehicle.begin_connecting(at) {
                return false;
            }
        }
        log!("Connecting to {key}.");
        let handle = match self.link.open(key).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Could not open link to {key}: {e}");
                self.abort_connecting(key).await;
                return false;
            }
        };
        let streams = match self.telemetry.subscribe(&handle).await {
            Ok(streams) => streams,
            Err(e) => {
                error!("Telemetry subscription for {key} failed: {e}");
                if let Err(e) = self.link.close(&handle).await {
                    warn!("Closing link to {key} failed: {e}");
                }
                self.abort_connecting(key).await;
                return false;
            }
        };
        let mut fleet = self.fleet.lock().await;
        if let Some(vehicle) = fleet.vehicle_mut(key) {
            vehicle.attach(handle, streams, Utc::now());
        }
        info!("Connected to {key}.");
        true
    }

    async fn abort_connecting(&self, key: &VehicleKey) {
        if let Some(vehicle) = self.fleet.lock().await.vehicle_mut(key) {
            vehicle.abort_connecting();
        }
    }

    /// Connects every configured vehicle concurrently. Returns how many links were opened.
    pub async fn connect_all(&self) -> usize {
        let keys = self.fleet.lock().await.keys();
        let results = join_all(keys.iter().map(|key| self.connect_one(key))).await;
        let opened = results.into_iter().filter(|ok| *ok).count();
        info!("Connected to {opened}/{} vehicles.", keys.len());
        opened
    }

    /// Releases every link handle. Vehicles end up disconnected.
    pub async fn close_links(&self) {
        let now = Utc::now();
        let released: Vec<LinkHandle> = {
            let mut fleet = self.fleet.lock().await;
            fleet
                .vehicles_mut()
                .filter_map(|(_, vehicle)| vehicle.reset(self.config.default_battery_voltage, now))
                .collect()
        };
        for handle in released {
            if let Err(e) = self.link.close(&handle).await {
                warn!("Closing link to {} failed: {e}", handle.key());
            }
        }
        info!("All links closed.");
    }

    fn track_conn_task(&self, task: JoinHandle<()>) {
        let mut tasks = self.conn_tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.retain(|t| !t.is_finished());
        tasks.push(task);
    }

    /// Spawns the periodic reconciliation loop. It runs until [`FleetSupervisor::shutdown`].
    pub fn start(self: &Arc<Self>) {
        let supervisor = Arc::clone(self);
        let task = tokio::spawn(async move { supervisor.run().await });
        let mut slot = self.loop_task.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = slot.replace(task) {
            previous.abort();
        }
    }

    /// Runs the reconciliation loop on the current task until cancelled.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.loop_interval().max(MIN_LOOP_INTERVAL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Fleet supervision started for {} vehicles.", self.config.vehicles.len());
        loop {
            tokio::select! {
                () = self.c_tok.cancelled() => break,
                _ = ticker.tick() => {
                    self.reconcile(Utc::now()).await;
                }
            }
        }
        info!("Fleet supervision stopped.");
    }

    /// One pass over all vehicles at time `now`.
    ///
    /// Applies queued telemetry, retries disconnected vehicles once per reconnect interval,
    /// drops vehicles whose telemetry went quiet, and lands formation members whose battery
    /// fell below the in-flight threshold.
    pub async fn reconcile(self: &Arc<Self>, now: DateTime<Utc>) -> ReconcileReport {
        let default_voltage = self.config.default_battery_voltage;
        let liveness_timeout = self.config.liveness_timeout();
        let reconnect_interval = self.config.reconnect_interval();
        let mut report = ReconcileReport::default();
        let mut released = Vec::new();
        let mut membership_changed = false;
        {
            let mut fleet = self.fleet.lock().await;
            report.telemetry_samples = fleet.drain_telemetry(default_voltage);
            for key in fleet.keys() {
                let is_member = fleet.membership().is_member(&key);
                let Some(vehicle) = fleet.vehicle_mut(&key) else { continue };
                match vehicle.connection() {
                    ConnectionState::Disconnected => {
                        if vehicle.reconnect_due(now, reconnect_interval) {
                            report.reconnecting.push(key);
                        }
                    }
                    ConnectionState::Connecting => {}
                    state => {
                        if vehicle.is_stale(now, liveness_timeout) {
                            warn!("Lost telemetry from {key} (was {state}), marking it disconnected.");
                            let (handle, left) = fleet.disconnect(&key, default_voltage, now);
                            released.extend(handle);
                            membership_changed |= left;
                            report.timed_out.push(key);
                        } else if state == ConnectionState::Flying
                            && is_member
                            && vehicle.battery_voltage() < self.config.low_battery_in_flight
                        {
                            warn!("Battery of {key} at {:.2} V, forcing it to land.", vehicle.battery_voltage());
                            report.low_battery_landings.push(key);
                        }
                    }
                }
            }
        }

        for key in &report.reconnecting {
            let supervisor = Arc::clone(self);
            let key = key.clone();
            self.track_conn_task(tokio::spawn(async move {
                supervisor.connect_one_at(&key, now).await;
            }));
        }
        if !released.is_empty() {
            let link = Arc::clone(&self.link);
            let telemetry = Arc::clone(&self.telemetry);
            self.track_conn_task(tokio::spawn(async move {
                for handle in released {
                    telemetry.unsubscribe(&handle).await;
                    if let Err(e) = link.close(&handle).await {
                        event!("Closing stale link to {} failed: {e}", handle.key());
                    }
                }
            }));
        }
        for key in &report.low_battery_landings {
            self.land_one(key).await;
        }
        if membership_changed {
            self.spawn_reflow();
        }
        report
    }

    /// Whether the last `K` position samples of `key` all lie within the convergence distance.
    pub async fn position_converged(&self, key: &VehicleKey) -> bool {
        let fleet = self.fleet.lock().await;
        fleet
            .vehicle(key)
            .is_some_and(|v| v.history().converged(self.config.position_convergence_distance))
    }

    /// Takes off a single vehicle and adds it to the formation.
    ///
    /// Refused for unknown or unlinked vehicles, vehicles already flying, a battery below the
    /// on-ground threshold, or a position estimate that has not converged yet.
    pub async fn takeoff_one(self: &Arc<Self>, key: &VehicleKey) -> bool {
        let handle = {
            let fleet = self.fleet.lock().await;
            let Some(vehicle) = fleet.vehicle(key) else {
                warn!("Vehicle {key} is not configured, not taking off.");
                return false;
            };
            let Some(handle) = vehicle.link() else {
                warn!("Vehicle {key} is not connected, not taking off.");
                return false;
            };
            if vehicle.connection() == ConnectionState::Flying {
                log!("Vehicle {key} is already flying.");
                return false;
            }
            if vehicle.battery_voltage() < self.config.low_battery_on_ground {
                warn!("Battery of {key} at {:.2} V, too low for takeoff.", vehicle.battery_voltage());
                return false;
            }
            if !vehicle.history().converged(self.config.position_convergence_distance) {
                warn!("Position estimate of {key} has not converged, not taking off.");
                return false;
            }
            handle.clone()
        };
        let sent = self
            .link
            .send_takeoff(&handle, self.config.takeoff_height, self.config.takeoff_duration)
            .await;
        match sent {
            Ok(()) => {
                info!("Vehicle {key} taking off to {:.2} m.", self.config.takeoff_height);
                self.join_formation(key).await;
                true
            }
            Err(e) => {
                error!("Takeoff command to {key} failed: {e}");
                false
            }
        }
    }

    /// Lands a single vehicle if it is flying and removes it from the formation either way.
    pub async fn land_one(self: &Arc<Self>, key: &VehicleKey) -> bool {
        if let Some(run) = self.dynamic_run.lock().await.as_mut() {
            if run.is_streaming(key) {
                run.stop_vehicle(key, self.config.dynamic_stop_timeout()).await;
            }
        }
        let mut landed = false;
        {
            let _gate = self.send_gate.lock().await;
            let handle = {
                let mut fleet = self.fleet.lock().await;
                fleet.vehicle_mut(key).and_then(|v| {
                    v.mark_grounded();
                    v.link().filter(|_| v.connection() == ConnectionState::Flying).cloned()
                })
            };
            if let Some(handle) = handle {
                match self.link.send_land(&handle, 0.0, self.config.landing_duration).await {
                    Ok(()) => {
                        info!("Vehicle {key} landing.");
                        landed = true;
                    }
                    Err(e) => error!("Land command to {key} failed: {e}"),
                }
            }
        }
        self.leave_formation(key).await;
        landed
    }

    /// Stops the motors of one vehicle immediately, regardless of its state.
    ///
    /// The vehicle leaves the formation like a landed one, so the remaining members reflow
    /// into a complete pattern. Only waits for a go-to batch that is already on the radio.
    ///
    /// # Arguments
    /// * `key` - The vehicle to stop.
    ///
    /// # Returns
    /// `true` if the stop command went out.
    pub async fn emergency_stop(self: &Arc<Self>, key: &VehicleKey) -> bool {
        if let Some(run) = self.dynamic_run.lock().await.as_ref() {
            run.cancel_vehicle(key);
        }
        let stopped = {
            let _gate = self.send_gate.lock().await;
            let handle = {
                let mut fleet = self.fleet.lock().await;
                fleet.vehicle_mut(key).and_then(|v| {
                    v.mark_grounded();
                    v.link().cloned()
                })
            };
            match handle {
                Some(handle) => match self.link.send_stop(&handle).await {
                    Ok(()) => {
                        warn!("Emergency stop sent to {key}.");
                        true
                    }
                    Err(e) => {
                        error!("Emergency stop to {key} failed: {e}");
                        false
                    }
                },
                None => {
                    warn!("Vehicle {key} has no link, cannot stop it.");
                    false
                }
            }
        };
        self.leave_formation(key).await;
        stopped
    }

    async fn join_formation(self: &Arc<Self>, key: &VehicleKey) {
        let joined = self.fleet.lock().await.membership_mut().join(key);
        if joined {
            self.spawn_reflow();
        }
    }

    async fn leave_formation(self: &Arc<Self>, key: &VehicleKey) {
        let left = {
            let mut fleet = self.fleet.lock().await;
            fleet.membership().is_member(key) && fleet.membership_mut().leave(key)
        };
        if left {
            self.spawn_reflow();
        }
    }

    /// Re-issues the current formation in the background. Not after shutdown started.
    fn spawn_reflow(self: &Arc<Self>) {
        if self.c_tok.is_cancelled() {
            return;
        }
        let supervisor = Arc::clone(self);
        let task = tokio::spawn(async move { supervisor.recalculate_current_formation().await });
        let mut tasks = self.reflow_tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.retain(|t| !t.is_finished());
        tasks.push(task);
    }

    /// Removes every vehicle from the formation without triggering reflows.
    async fn dissolve_formation(&self) {
        let mut fleet = self.fleet.lock().await;
        for key in fleet.membership().available_set() {
            fleet.membership_mut().leave(&key);
        }
    }

    /// Takes off every linked vehicle concurrently. Returns how many took off.
    pub async fn takeoff(self: &Arc<Self>) -> usize {
        self.stop_dynamic_formation().await;
        let linked = self.fleet.lock().await.linked();
        let results = join_all(linked.iter().map(|(key, _)| self.takeoff_one(key))).await;
        results.into_iter().filter(|ok| *ok).count()
    }

    /// Lands every linked vehicle concurrently. Returns how many were sent a land command.
    ///
    /// The formation is dissolved up front so landing vehicles do not trigger reflows.
    pub async fn land(self: &Arc<Self>) -> usize {
        self.stop_dynamic_formation().await;
        self.dissolve_formation().await;
        let linked = self.fleet.lock().await.linked();
        let results = join_all(linked.iter().map(|(key, _)| self.land_one(key))).await;
        results.into_iter().filter(|ok| *ok).count()
    }

    /// Emergency-stops every linked vehicle concurrently.
    ///
    /// Setpoint streams are cancelled before the stops go out and joined afterwards, so no
    /// stream waits in front of a stop. The formation is dissolved up front, as in
    /// [`FleetSupervisor::land`].
    pub async fn emergency_land(self: &Arc<Self>) -> usize {
        let run = self.dynamic_run.lock().await.take();
        if let Some(run) = &run {
            run.cancel();
        }
        self.dissolve_formation().await;
        let linked = self.fleet.lock().await.linked();
        let results = join_all(linked.iter().map(|(key, _)| self.emergency_stop(key))).await;
        if let Some(run) = run {
            run.stop(self.config.dynamic_stop_timeout()).await;
        }
        results.into_iter().filter(|ok| *ok).count()
    }

    /// Lands everything, waits a grace period and emergency-stops if anything still flies.
    pub async fn forced_stop_flying(self: &Arc<Self>) {
        self.land().await;
        tokio::time::sleep(self.config.forced_landing_grace()).await;
        let still_flying = {
            let mut fleet = self.fleet.lock().await;
            fleet.drain_telemetry(self.config.default_battery_voltage);
            fleet.any_in(ConnectionState::Flying)
        };
        if still_flying {
            warn!("Vehicles still flying after landing grace period, stopping motors.");
            self.emergency_land().await;
        }
    }

    /// Stops the loop and all streams, lands the fleet and releases every link.
    ///
    /// Telemetry is unsubscribed only after the forced landing, which needs it to see which
    /// vehicles are still in the air.
    pub async fn shutdown(self: &Arc<Self>) {
        info!("Shutting down fleet supervision.");
        self.c_tok.cancel();
        let closing_timeout = self.config.closing_timeout();
        let loop_task = self.loop_task.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(task) = loop_task {
            if tokio::time::timeout(closing_timeout, task).await.is_err() {
                warn!("Supervision loop did not stop in time.");
            }
        }
        let reflows = std::mem::take(&mut *self.reflow_tasks.lock().unwrap_or_else(PoisonError::into_inner));
        for task in reflows {
            task.abort();
        }
        self.stop_dynamic_formation().await;

        let conn_tasks = std::mem::take(&mut *self.conn_tasks.lock().unwrap_or_else(PoisonError::into_inner));
        let deadline = tokio::time::Instant::now() + closing_timeout;
        for task in conn_tasks {
            if tokio::time::timeout_at(deadline, task).await.is_err() {
                warn!("Connection task did not finish in time.");
            }
        }

        self.forced_stop_flying().await;

        let linked = {
            let mut fleet = self.fleet.lock().await;
            for (_, vehicle) in fleet.vehicles_mut() {
                vehicle.drop_telemetry();
            }
            fleet.linked()
        };
        for (_, handle) in &linked {
            self.telemetry.unsubscribe(handle).await;
        }
        self.close_links().await;
    }

    /// Flies to `target`, routing through a lift-permute-drop transition if direct paths of
    /// flying vehicles would come closer than the collision threshold.
    ///
    /// Stops any running dynamic formation first. Every step is sent to all vehicles at once
    /// and given `step_duration` before the next one starts.
    pub async fn send_formation(
        &self,
        target: PositionSet,
        step_duration: Duration,
    ) -> Result<FormationPlan, FormationError> {
        let _guard = self.command_lock.lock().await;
        self.send_formation_locked(target, step_duration).await
    }

    async fn send_formation_locked(
        &self,
        target: PositionSet,
        step_duration: Duration,
    ) -> Result<FormationPlan, FormationError> {
        self.stop_dynamic_formation().await;
        let groundings = self.groundings(&target).await;
        let plan = self.plan_formation(target).await?;
        let steps = plan.len();
        for (i, step) in plan.steps().iter().enumerate() {
            if plan.is_transition() {
                formation!("Transition step {}/{steps} for {} vehicles.", i + 1, step.len());
            }
            self.dispatch_go_to(step, step_duration, &groundings).await;
            tokio::time::sleep(step_duration).await;
        }
        Ok(plan)
    }

    /// Builds the step plan for `target` from the latest positions of flying vehicles.
    pub async fn plan_formation(&self, target: PositionSet) -> Result<FormationPlan, FormationError> {
        let current: PositionSet = {
            let fleet = self.fleet.lock().await;
            target
                .keys()
                .filter_map(|key| {
                    let vehicle = fleet.vehicle(key)?;
                    if vehicle.connection() != ConnectionState::Flying {
                        return None;
                    }
                    vehicle.latest_position().map(|p| (key.clone(), p))
                })
                .collect()
        };
        let (routed, rest): (PositionSet, PositionSet) =
            target.into_iter().partition(|(key, _)| current.contains_key(key));
        let threshold = self.config.collision_threshold;
        if routed.len() > 1 && FormationCalculator::positions_intersect(&current, &routed, threshold)? {
            formation!("Direct paths come closer than {threshold:.2} m, planning a transition.");
            let mut plan = self.calculator.transition_plan(&current, &routed)?;
            plan.merge_into_final(rest);
            Ok(plan)
        } else {
            let mut all = routed;
            all.extend(rest);
            Ok(FormationPlan::direct(all))
        }
    }

    /// Grounding counters of the vehicles in `target`, taken when a plan starts.
    async fn groundings(&self, target: &PositionSet) -> BTreeMap<VehicleKey, u64> {
        let fleet = self.fleet.lock().await;
        target
            .keys()
            .filter_map(|key| fleet.vehicle(key).map(|v| (key.clone(), v.groundings())))
            .collect()
    }

    /// Sends one plan step as simultaneous go-to commands.
    ///
    /// Vehicles landed, stopped or dropped since the plan started are skipped, a running plan
    /// never lifts a grounded vehicle back up.
    ///
    /// # Arguments
    /// * `step` - Target position per vehicle.
    /// * `duration` - Flight time handed to every go-to.
    /// * `groundings` - Grounding counters recorded when the plan started.
    ///
    /// # Returns
    /// The number of go-to commands that went out.
    async fn dispatch_go_to(
        &self,
        step: &PositionSet,
        duration: Duration,
        groundings: &BTreeMap<VehicleKey, u64>,
    ) -> usize {
        let _gate = self.send_gate.lock().await;
        let targets: Vec<(LinkHandle, Position)> = {
            let fleet = self.fleet.lock().await;
            step.iter()
                .filter_map(|(key, position)| {
                    let vehicle = fleet.vehicle(key)?;
                    if groundings.get(key) != Some(&vehicle.groundings()) {
                        log!("Vehicle {key} was grounded during the formation, skipping its go-to.");
                        return None;
                    }
                    let handle = vehicle.link().cloned();
                    if handle.is_none() {
                        warn!("Vehicle {key} has no link, skipping its go-to.");
                    }
                    handle.map(|h| (h, *position))
                })
                .collect()
        };
        let secs = duration.as_secs_f64();
        let results = join_all(targets.iter().map(|(handle, position)| async move {
            let sent = self.link.send_go_to(handle, *position, 0.0, secs).await;
            if let Err(e) = &sent {
                error!("Go-to {position} for {} failed: {e}", handle.key());
            }
            sent.is_ok()
        }))
        .await;
        results.into_iter().filter(|ok| *ok).count()
    }

    /// Lays out `kind` for the current members and flies it.
    ///
    /// The kind is remembered as the current formation even if it cannot be laid out, so a
    /// later membership change retries it.
    pub async fn command_formation(&self, kind: FormationKind) -> Result<(), FormationError> {
        formation!("{kind} formation requested.");
        *self.current_formation.lock().await = Some(kind);
        let _guard = self.command_lock.lock().await;
        let available = self.fleet.lock().await.membership().available_set();
        if available.is_empty() {
            warn!("No vehicles in formation, {kind} not sent.");
            return Ok(());
        }
        let layout = self.calculator.layout(kind, &available).inspect_err(|e| {
            error!("{kind} formation for {} vehicles failed: {e}", available.len());
        })?;
        let step_duration = self.config.transition_duration();
        match layout {
            Layout::Static(target) => {
                self.send_formation_locked(target, step_duration).await?;
            }
            Layout::Dynamic(dynamic) => {
                self.send_formation_locked(dynamic.start.clone(), step_duration).await?;
                self.start_dynamic_formation(dynamic).await;
            }
        }
        Ok(())
    }

    /// Commands a horizontal square grid.
    ///
    /// # Returns
    /// An error if the members do not fit into the arena.
    pub async fn flat_square(&self) -> Result<(), FormationError> {
        self.command_formation(FormationKind::FlatSquare).await
    }

    /// Commands a grid on the plane tilted by the configured angles.
    pub async fn tilted_plane(&self) -> Result<(), FormationError> {
        self.command_formation(FormationKind::tilted_plane(&self.config)).await
    }

    /// Commands an evenly spaced horizontal circle.
    pub async fn circle(&self) -> Result<(), FormationError> { self.command_formation(FormationKind::Circle).await }

    /// Flies the members onto a circle, then streams its rotation as setpoints until another
    /// formation or a stop replaces it.
    ///
    /// # Returns
    /// An error if the circle does not fit or its waypoint interval is not positive.
    pub async fn moving_circle(&self) -> Result<(), FormationError> {
        self.command_formation(FormationKind::moving_circle(&self.config)).await
    }

    /// Like [`Self::moving_circle`] with the members spread along x and bobbing on a sine wave.
    pub async fn sin_wave(&self) -> Result<(), FormationError> {
        self.command_formation(FormationKind::sin_wave(&self.config)).await
    }

    /// Re-issues the current formation for the current members, if there are any.
    pub async fn recalculate_current_formation(&self) {
        let Some(kind) = *self.current_formation.lock().await else { return };
        let members = self.fleet.lock().await.membership().count();
        if members == 0 {
            return;
        }
        formation!("Reflowing {kind} formation for {members} vehicles.");
        if let Err(e) = self.command_formation(kind).await {
            error!("Reflow of {kind} formation failed: {e}");
        }
    }

    async fn start_dynamic_formation(&self, dynamic: DynamicFormation) {
        let targets = {
            let fleet = self.fleet.lock().await;
            dynamic
                .trajectories
                .into_iter()
                .filter(|(key, _)| fleet.membership().is_member(key))
                .filter_map(|(key, trajectory)| {
                    let handle = fleet.vehicle(&key).and_then(|v| v.link().cloned())?;
                    Some((key, handle, trajectory))
                })
                .collect::<Vec<_>>()
        };
        if targets.is_empty() {
            return;
        }
        let epoch = SharedEpoch::new(Utc::now(), dynamic.waypoint_dt);
        let run = DynamicRun::start(Arc::clone(&self.link), targets, epoch);
        let previous = self.dynamic_run.lock().await.replace(run);
        if let Some(previous) = previous {
            previous.stop(self.config.dynamic_stop_timeout()).await;
        }
    }

    /// Stops all setpoint streams and waits for them to hand control back.
    pub async fn stop_dynamic_formation(&self) {
        let run = self.dynamic_run.lock().await.take();
        if let Some(run) = run {
            formation!("Stopping dynamic formation.");
            run.stop(self.config.dynamic_stop_timeout()).await;
        }
    }

    /// Cached state of `key`, `Disconnected` for unknown vehicles.
    pub async fn get_state(&self, key: &VehicleKey) -> ConnectionState {
        self.fleet.lock().await.vehicle(key).map_or(ConnectionState::Disconnected, |v| v.connection())
    }

    /// Cached battery voltage of `key`, the default voltage for unknown vehicles.
    pub async fn get_battery(&self, key: &VehicleKey) -> f32 {
        self.fleet
            .lock()
            .await
            .vehicle(key)
            .map_or(self.config.default_battery_voltage, |v| v.battery_voltage())
    }

    /// Whether `key` currently takes part in formations.
    pub async fn is_in_formation(&self, key: &VehicleKey) -> bool {
        self.fleet.lock().await.membership().is_member(key)
    }

    /// Copies the cached state of every configured vehicle, in configuration order.
    ///
    /// # Returns
    /// The per-vehicle states together with the current formation kind.
    pub async fn snapshot(&self) -> FleetSnapshot {
        let current_formation = *self.current_formation.lock().await;
        let fleet = self.fleet.lock().await;
        let vehicles = self
            .config
            .vehicles
            .iter()
            .filter_map(|key| {
                let vehicle = fleet.vehicle(key)?;
                Some(VehicleSnapshot {
                    key: key.clone(),
                    connection: vehicle.connection(),
                    battery_voltage: vehicle.battery_voltage(),
                    position: vehicle.latest_position(),
                    in_formation: fleet.membership().is_member(key),
                })
            })
            .collect();
        FleetSnapshot { vehicles, current_formation }
    }
}
