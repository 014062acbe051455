use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::app::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DeviceSettings {
    pub adb_path: String,
    pub device_id: String,
    pub command_timeout_secs: u64,
    /// Accuracy radius in meters used to derive positional jitter. Zero keeps the
    /// default ~0.5 m jitter.
    pub location_accuracy: f64,
    pub mock_action: String,
    pub default_altitude: f64,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            adb_path: String::new(),
            device_id: String::new(),
            command_timeout_secs: 30,
            location_accuracy: 0.0,
            mock_action: "android.intent.action.MOCK_LOCATION".to_string(),
            default_altitude: 10.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppSettings {
    pub package_name: String,
    pub main_activity: String,
    pub login_activity: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            package_name: "com.hust.sport".to_string(),
            main_activity: ".MainActivity".to_string(),
            login_activity: "LoginActivity".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UserSettings {
    pub username: String,
    pub password: String,
    /// Set when both fields hold `credentials::encode_credential` output.
    pub encoded: bool,
}

/// How playback spaces out the route points.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackPace {
    /// Evenly spread over `duration_minutes`.
    #[default]
    Timed,
    /// Walked point to point at `avg_speed` varied by `speed_variation`.
    Speed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunSettings {
    pub activity_type: u8,
    pub target_distance: f64,
    pub duration_minutes: u64,
    pub avg_speed: f64,
    pub speed_variation: f64,
    pub default_route: String,
    pub is_loop: bool,
    pub max_step_wait_secs: f64,
    pub pace: PlaybackPace,
    pub start_latitude: f64,
    pub start_longitude: f64,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            activity_type: 0,
            target_distance: 2000.0,
            duration_minutes: 15,
            avg_speed: 2.5,
            speed_variation: 0.1,
            default_route: "default".to_string(),
            is_loop: true,
            max_step_wait_secs: 3.0,
            pace: PlaybackPace::Timed,
            start_latitude: 30.52,
            start_longitude: 114.36,
        }
    }
}

/// Screen coordinates for the blind-tap flows. They depend on the device resolution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AutomationSettings {
    pub start_button: (i32, i32),
    pub running_button: (i32, i32),
    pub cycling_button: (i32, i32),
    pub walking_button: (i32, i32),
    pub confirm_button: (i32, i32),
    pub end_button: (i32, i32),
    pub end_confirm_button: (i32, i32),
    pub close_result_button: (i32, i32),
    pub username_field: (i32, i32),
    pub username_select_all: (i32, i32),
    pub password_field: (i32, i32),
    pub password_select_all: (i32, i32),
    pub login_button: (i32, i32),
    pub login_prompt_button: (i32, i32),
    pub logout_sequence: Vec<(i32, i32)>,
    pub input_delay_ms: u64,
    pub settle_delay_ms: u64,
    pub app_launch_delay_ms: u64,
}

impl Default for AutomationSettings {
    fn default() -> Self {
        Self {
            start_button: (521, 950),
            running_button: (550, 1860),
            cycling_button: (540, 800),
            walking_button: (780, 800),
            confirm_button: (500, 371),
            end_button: (824, 1607),
            end_confirm_button: (548, 1455),
            close_result_button: (540, 1800),
            username_field: (540, 800),
            username_select_all: (700, 900),
            password_field: (540, 1000),
            password_select_all: (700, 1100),
            login_button: (540, 1300),
            login_prompt_button: (540, 1200),
            logout_sequence: vec![(900, 2000), (900, 300), (540, 1800), (700, 1100)],
            input_delay_ms: 500,
            settle_delay_ms: 2000,
            app_launch_delay_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingSettings {
    pub log_level: String,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            log_level: "INFO".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageSettings {
    pub routes_dir: String,
    pub history_db: String,
    pub save_history: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub device: DeviceSettings,
    #[serde(default)]
    pub app: AppSettings,
    #[serde(default)]
    pub user: UserSettings,
    #[serde(default)]
    pub run: RunSettings,
    #[serde(default)]
    pub automation: AutomationSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub storage: StorageSettings,
}

impl AppConfig {
    pub fn routes_dir(&self) -> PathBuf {
        if self.storage.routes_dir.trim().is_empty() {
            data_dir().join("routes")
        } else {
            PathBuf::from(self.storage.routes_dir.trim())
        }
    }

    pub fn history_db_path(&self) -> PathBuf {
        if self.storage.history_db.trim().is_empty() {
            data_dir().join("history.db")
        } else {
            PathBuf::from(self.storage.history_db.trim())
        }
    }

    pub fn device_serial(&self) -> Option<String> {
        Some(self.device.device_id.trim().to_string()).filter(|value| !value.is_empty())
    }
}

pub fn data_dir() -> PathBuf {
    dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("hust_run")
}

pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("HUST_RUN_CONFIG_PATH") {
        return PathBuf::from(path);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".hust_run_config.json")
}

pub fn backup_path_for(path: &Path) -> PathBuf {
    path.with_extension("backup.json")
}

pub fn load_config() -> Result<AppConfig, AppError> {
    load_config_from_path(&config_path())
}

pub fn save_config(config: &AppConfig) -> Result<(), AppError> {
    let path = config_path();
    save_config_to_path(config, &path, &backup_path_for(&path))
}

pub fn load_config_from_path(path: &Path) -> Result<AppConfig, AppError> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let raw = fs::read_to_string(path)
        .map_err(|err| AppError::system(format!("Failed to read config: {err}"), ""))?;
    let value: serde_json::Value = serde_json::from_str(&raw)
        .map_err(|err| AppError::validation(format!("Failed to parse config: {err}"), ""))?;
    let mut config: AppConfig = serde_json::from_value(value.clone()).unwrap_or_default();
    config = apply_legacy_overrides(config, &value);
    Ok(validate_config(config))
}

pub fn save_config_to_path(
    config: &AppConfig,
    path: &Path,
    backup_path: &Path,
) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    if path.exists() {
        let _ = fs::copy(path, backup_path);
    }
    let payload = serde_json::to_string_pretty(config)
        .map_err(|err| AppError::system(format!("Failed to serialize config: {err}"), ""))?;
    fs::write(path, payload)
        .map_err(|err| AppError::system(format!("Failed to write config: {err}"), ""))?;
    Ok(())
}

/// Older configs kept everything in flat top-level keys.
fn apply_legacy_overrides(mut config: AppConfig, value: &serde_json::Value) -> AppConfig {
    if let Some(adb_path) = value.get("adb_path").and_then(|v| v.as_str()) {
        config.device.adb_path = adb_path.to_string();
    }
    if let Some(device_id) = value.get("device_id").and_then(|v| v.as_str()) {
        config.device.device_id = device_id.to_string();
    }
    if let Some(accuracy) = value.get("location_accuracy").and_then(|v| v.as_f64()) {
        config.device.location_accuracy = accuracy;
    }
    if let Some(package_name) = value.get("package_name").and_then(|v| v.as_str()) {
        config.app.package_name = package_name.to_string();
    }
    if let Some(distance) = value.get("target_distance").and_then(|v| v.as_f64()) {
        config.run.target_distance = distance;
    }
    if let Some(duration) = value.get("duration").and_then(|v| v.as_u64()) {
        config.run.duration_minutes = duration;
    }
    if let Some(route) = value.get("default_route").and_then(|v| v.as_str()) {
        config.run.default_route = route.to_string();
    }
    if let Some(save_history) = value.get("save_history").and_then(|v| v.as_bool()) {
        config.storage.save_history = save_history;
    }
    config
}

fn validate_config(mut config: AppConfig) -> AppConfig {
    let defaults = RunSettings::default();
    if config.device.command_timeout_secs == 0 {
        config.device.command_timeout_secs = 30;
    }
    if !config.device.location_accuracy.is_finite() || config.device.location_accuracy < 0.0 {
        config.device.location_accuracy = 0.0;
    }
    if config.device.mock_action.trim().is_empty() {
        config.device.mock_action = DeviceSettings::default().mock_action;
    }
    if config.run.activity_type > 2 {
        config.run.activity_type = defaults.activity_type;
    }
    if !config.run.target_distance.is_finite() || config.run.target_distance <= 0.0 {
        config.run.target_distance = defaults.target_distance;
    }
    if config.run.duration_minutes == 0 {
        config.run.duration_minutes = defaults.duration_minutes;
    }
    if !config.run.avg_speed.is_finite() || config.run.avg_speed <= 0.0 {
        config.run.avg_speed = defaults.avg_speed;
    }
    if !(0.0..=1.0).contains(&config.run.speed_variation) {
        config.run.speed_variation = defaults.speed_variation;
    }
    if !config.run.max_step_wait_secs.is_finite() || config.run.max_step_wait_secs <= 0.0 {
        config.run.max_step_wait_secs = defaults.max_step_wait_secs;
    }
    if !(-90.0..=90.0).contains(&config.run.start_latitude)
        || !(-180.0..=180.0).contains(&config.run.start_longitude)
    {
        config.run.start_latitude = defaults.start_latitude;
        config.run.start_longitude = defaults.start_longitude;
    }
    config
}
