use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MockState {
    Disabled,
    Enabling,
    Enabled,
    Disabling,
}

impl fmt::Display for MockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MockState::Disabled => "disabled",
            MockState::Enabling => "enabling",
            MockState::Enabled => "enabled",
            MockState::Disabling => "disabling",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    GenericAdb,
    EmulatorSpecific,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::GenericAdb => f.write_str("generic_adb"),
            BackendKind::EmulatorSpecific => f.write_str("emulator_specific"),
        }
    }
}

/// Last position accepted by the device.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CurrentLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub timestamp: DateTime<Utc>,
}

/// In-memory mirror of the device's mock-location state. Never re-read from the device.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceLocationState {
    pub mock_state: MockState,
    pub backend: BackendKind,
    pub current_location: Option<CurrentLocation>,
    /// Clock reading when the first location of the session was accepted.
    #[serde(skip)]
    pub first_fix_at: Option<Duration>,
}

impl DeviceLocationState {
    pub fn new(backend: BackendKind) -> Self {
        Self {
            mock_state: MockState::Disabled,
            backend,
            current_location: None,
            first_fix_at: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.mock_state == MockState::Enabled
    }
}
