use super::{ConnectionState, LinkHandle, VehicleKey, VehicleState};
use crate::formation::FormationMembership;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Per-vehicle state and formation membership, guarded together by the supervisor.
#[derive(Debug)]
pub struct FleetState {
    vehicles: BTreeMap<VehicleKey, VehicleState>,
    membership: FormationMembership,
}

impl FleetState {
    pub fn new(keys: &[VehicleKey], default_voltage: f32, history_len: usize, now: DateTime<Utc>) -> Self {
        let vehicles =
            keys.iter().map(|key| (key.clone(), VehicleState::new(default_voltage, history_len, now))).collect();
        Self { vehicles, membership: FormationMembership::new(keys) }
    }

    pub fn keys(&self) -> Vec<VehicleKey> { self.vehicles.keys().cloned().collect() }

    pub fn vehicle(&self, key: &VehicleKey) -> Option<&VehicleState> { self.vehicles.get(key) }

    pub(super) fn vehicle_mut(&mut self, key: &VehicleKey) -> Option<&mut VehicleState> {
        self.vehicles.get_mut(key)
    }

    pub fn vehicles(&self) -> impl Iterator<Item = (&VehicleKey, &VehicleState)> { self.vehicles.iter() }

    pub(super) fn vehicles_mut(&mut self) -> impl Iterator<Item = (&VehicleKey, &mut VehicleState)> {
        self.vehicles.iter_mut()
    }

    pub fn membership(&self) -> &FormationMembership { &self.membership }

    pub(super) fn membership_mut(&mut self) -> &mut FormationMembership { &mut self.membership }

    /// Handles of every vehicle with an open link.
    pub fn linked(&self) -> Vec<(VehicleKey, LinkHandle)> {
        self.vehicles
            .iter()
            .filter_map(|(key, v)| v.link().map(|handle| (key.clone(), handle.clone())))
            .collect()
    }

    pub fn any_in(&self, state: ConnectionState) -> bool {
        self.vehicles.values().any(|v| v.connection() == state)
    }

    pub(super) fn drain_telemetry(&mut self, default_voltage: f32) -> usize {
        self.vehicles.values_mut().map(|v| v.drain_telemetry(default_voltage)).sum()
    }

    /// Marks a vehicle as lost: releases its link and removes it from the formation.
    ///
    /// Returns the released handle and whether the membership changed.
    pub(super) fn disconnect(
        &mut self,
        key: &VehicleKey,
        default_voltage: f32,
        now: DateTime<Utc>,
    ) -> (Option<LinkHandle>, bool) {
        let Some(vehicle) = self.vehicles.get_mut(key) else { return (None, false) };
        let handle = vehicle.reset(default_voltage, now);
        let left = self.membership.is_member(key) && self.membership.leave(key);
        (handle, left)
    }
}
