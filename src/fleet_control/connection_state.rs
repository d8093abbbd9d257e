use bitvec::prelude::*;
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter};

/// Link and flight condition of a vehicle as seen by the tower.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Default, Display)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Flying,
    Idle,
    Crashed,
}

impl ConnectionState {
    /// Whether a link to the vehicle is established.
    pub fn is_linked(self) -> bool { !matches!(self, Self::Disconnected | Self::Connecting) }
}

/// Bit positions of the vehicle's 16 bit supervisor info word.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Display, EnumIter)]
pub enum SupervisorBit {
    CanBeArmed = 0,
    IsArmed = 1,
    AutoArm = 2,
    CanFly = 3,
    IsFlying = 4,
    IsTumbled = 5,
    IsLocked = 6,
    IsCrashed = 7,
    HlcActive = 8,
    HlcTrajectoryFinished = 9,
    HlcDisabled = 10,
}

/// Decoded supervisor info word.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct SupervisorFlags {
    raw: u16,
}

impl SupervisorFlags {
    pub const fn new(raw: u16) -> Self { Self { raw } }

    pub const fn raw(&self) -> u16 { self.raw }

    pub fn is_set(&self, bit: SupervisorBit) -> bool { self.raw.view_bits::<Lsb0>()[bit as usize] }

    /// All bits that are currently set, in bit order.
    pub fn active(&self) -> impl Iterator<Item = SupervisorBit> + '_ {
        SupervisorBit::iter().filter(|bit| self.is_set(*bit))
    }

    /// Collapses the flags into a single state.
    ///
    /// Precedence is `Flying > Idle > Crashed > Connected`: a flying vehicle is flying even if
    /// it also reports `can_fly`, and a tumbled or crashed vehicle on the ground is only
    /// `Crashed` if it cannot fly.
    pub fn connection_state(&self) -> ConnectionState {
        let is_flying = self.is_set(SupervisorBit::IsFlying);
        let can_fly = self.is_set(SupervisorBit::CanFly);
        let is_down = self.is_set(SupervisorBit::IsCrashed) || self.is_set(SupervisorBit::IsTumbled);
        match (is_flying, can_fly, is_down) {
            (true, _, _) => ConnectionState::Flying,
            (false, true, _) => ConnectionState::Idle,
            (false, false, true) => ConnectionState::Crashed,
            (false, false, false) => ConnectionState::Connected,
        }
    }
}

impl From<u16> for SupervisorFlags {
    fn from(raw: u16) -> Self { Self::new(raw) }
}
