use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceSummary {
    pub serial: String,
    pub state: String,
    pub model: Option<String>,
    pub product: Option<String>,
    pub device: Option<String>,
    pub transport_id: Option<String>,
}

impl DeviceSummary {
    pub fn is_online(&self) -> bool {
        self.state == "device"
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ActivityType {
    Running,
    Cycling,
    Walking,
}

impl ActivityType {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(ActivityType::Running),
            1 => Some(ActivityType::Cycling),
            2 => Some(ActivityType::Walking),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            ActivityType::Running => 0,
            ActivityType::Cycling => 1,
            ActivityType::Walking => 2,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            ActivityType::Running => "running",
            ActivityType::Cycling => "cycling",
            ActivityType::Walking => "walking",
        }
    }

    /// Heart-rate headroom reached after five minutes of activity.
    pub fn max_heart_rate_increase(self) -> i32 {
        match self {
            ActivityType::Running => 90,
            ActivityType::Cycling => 70,
            ActivityType::Walking => 50,
        }
    }
}
