use crate::fleet_control::VehicleKey;
use crate::{info, warn};
use std::collections::HashMap;

/// Which vehicles currently take part in the active formation.
///
/// Membership is independent from connectivity: a connected vehicle sitting on the ground is
/// not a member, and a member whose link just went quiet stays one until the supervisor's
/// liveness timeout removes it.
#[derive(Debug, Clone)]
pub struct FormationMembership {
    /// Configured vehicles in their stable slot order.
    order: Vec<VehicleKey>,
    members: HashMap<VehicleKey, bool>,
    count: usize,
}

impl FormationMembership {
    pub fn new(vehicles: &[VehicleKey]) -> Self {
        Self {
            order: vehicles.to_vec(),
            members: vehicles.iter().map(|key| (key.clone(), false)).collect(),
            count: 0,
        }
    }

    /// Adds `key` to the formation. Returns `false` and warns if nothing changed.
    pub fn join(&mut self, key: &VehicleKey) -> bool {
        match self.members.get_mut(key) {
            Some(member) if !*member => {
                *member = true;
                self.count += 1;
                info!("Vehicle {key} joined the formation ({} in formation).", self.count);
                true
            }
            Some(_) => {
                warn!("Vehicle {key} is already in the formation.");
                false
            }
            None => {
                warn!("Vehicle {key} is not recognized, cannot join the formation.");
                false
            }
        }
    }

    /// Removes `key` from the formation. Returns `false` and warns if nothing changed.
    pub fn leave(&mut self, key: &VehicleKey) -> bool {
        match self.members.get_mut(key) {
            Some(member) if *member => {
                *member = false;
                self.count -= 1;
                info!("Vehicle {key} left the formation ({} in formation).", self.count);
                true
            }
            Some(_) => {
                warn!("Vehicle {key} is not in the formation.");
                false
            }
            None => {
                warn!("Vehicle {key} is not recognized, cannot leave the formation.");
                false
            }
        }
    }

    pub fn is_member(&self, key: &VehicleKey) -> bool { self.members.get(key).copied().unwrap_or(false) }

    pub fn count(&self) -> usize { self.count }

    /// Members in slot order, as consumed by the formation calculator.
    pub fn available_set(&self) -> Vec<VehicleKey> {
        self.order.iter().filter(|key| self.is_member(key)).cloned().collect()
    }
}
