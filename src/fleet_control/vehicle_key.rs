use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Stable identity of a vehicle: its radio address, e.g. `radio://0/100/2M/247E000001`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VehicleKey(String);

impl VehicleKey {
    pub fn as_str(&self) -> &str { self.0.as_str() }
}

impl Display for VehicleKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result { f.write_str(&self.0) }
}

impl From<&str> for VehicleKey {
    fn from(value: &str) -> Self { Self(value.to_string()) }
}

impl From<String> for VehicleKey {
    fn from(value: String) -> Self { Self(value) }
}
