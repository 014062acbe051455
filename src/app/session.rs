use std::rc::Rc;
use std::time::Duration;

use chrono::Local;
use rand::Rng;
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::app::adb::device::AdbDevice;
use crate::app::adb::locator::{resolve_adb_program, validate_adb_program};
use crate::app::adb::transport::{
    AdbTransport, DeviceShell, HostCommandRunner, ShellTransport, SystemHostRunner,
};
use crate::app::automation::{ExerciseAutomation, LoginFlow};
use crate::app::clock::{Clock, SystemClock};
use crate::app::config::{AppConfig, PlaybackPace};
use crate::app::credentials::resolve_credentials;
use crate::app::error::{AppError, ErrorKind};
use crate::app::geo::{GeoPoint, Jitter};
use crate::app::history::{format_timestamp, HistoryDatabase, NewRecord, RecordedPoint};
use crate::app::location::{
    select_backend, BackendContext, LocationInjector, SpeedProfile, DEFAULT_MOVE_STEPS,
};
use crate::app::models::ActivityType;
use crate::app::playback::{LocationSink, PlaybackDriver, PlaybackReport};
use crate::app::route::{
    path_distance, GeneratorSettings, LocationPoint, Route, RouteGenerator, RouteSpec, RouteStore,
};

pub fn new_trace_id() -> String {
    Uuid::new_v4().to_string()
}

/// Collaborators a session talks to the outside world through.
pub struct SessionParts {
    pub transport: Rc<dyn ShellTransport>,
    pub host_runner: Rc<dyn HostCommandRunner>,
    pub clock: Rc<dyn Clock>,
    pub adb_program: String,
}

impl SessionParts {
    pub fn system(config: &AppConfig, trace_id: &str) -> Self {
        let adb_program = resolve_adb_program(&config.device.adb_path);
        Self {
            transport: Rc::new(AdbTransport::new(adb_program.clone(), trace_id)),
            host_runner: Rc::new(SystemHostRunner::new(trace_id)),
            clock: Rc::new(SystemClock::new()),
            adb_program,
        }
    }
}

/// Result of one mock-location playback.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationOutcome {
    pub route_name: String,
    pub report: PlaybackReport,
    /// Walked distance over the points the device accepted.
    pub distance_m: f64,
    pub avg_heart_rate: Option<f64>,
    #[serde(skip)]
    pub recorded: Vec<RecordedPoint>,
}

/// Samples a heart rate for every accepted location so the session can be written to history.
struct HeartRateSampler<'a, R: Rng> {
    injector: &'a mut LocationInjector<R>,
    activity: ActivityType,
    speed: f64,
    recorded: Vec<RecordedPoint>,
}

impl<R: Rng> HeartRateSampler<'_, R> {
    fn sample(&mut self, latitude: f64, longitude: f64, altitude: f64) {
        let heart_rate = self.injector.simulate_heart_rate(self.activity);
        self.recorded.push(RecordedPoint {
            latitude,
            longitude,
            altitude: Some(altitude),
            heart_rate: Some(heart_rate as i64),
            speed: Some(self.speed),
            timestamp: format_timestamp(Local::now().naive_local()),
        });
    }
}

impl<R: Rng> LocationSink for HeartRateSampler<'_, R> {
    fn set_location(&mut self, latitude: f64, longitude: f64, altitude: f64) -> bool {
        if !self.injector.set_location(latitude, longitude, altitude) {
            return false;
        }
        self.sample(latitude, longitude, altitude);
        true
    }

    fn move_to(
        &mut self,
        latitude: f64,
        longitude: f64,
        altitude: f64,
        speed_mps: Option<f64>,
    ) -> bool {
        let target = GeoPoint::new(latitude, longitude);
        if !self
            .injector
            .move_to(target, altitude, speed_mps, DEFAULT_MOVE_STEPS)
        {
            return false;
        }
        self.sample(latitude, longitude, altitude);
        true
    }
}

/// One run of the tool: owns the configuration and builds every component explicitly.
pub struct ExerciseSession {
    config: AppConfig,
    parts: SessionParts,
    device: AdbDevice,
    injector: Option<LocationInjector>,
    trace_id: String,
}

impl ExerciseSession {
    pub fn new(config: AppConfig) -> Self {
        let trace_id = new_trace_id();
        let parts = SessionParts::system(&config, &trace_id);
        Self::with_parts(config, parts, trace_id)
    }

    pub fn with_parts(config: AppConfig, parts: SessionParts, trace_id: impl Into<String>) -> Self {
        let trace_id = trace_id.into();
        let shell = DeviceShell::new(
            parts.transport.clone(),
            config.device_serial(),
            Duration::from_secs(config.device.command_timeout_secs),
        );
        let device = AdbDevice::new(shell, trace_id.clone());
        Self {
            config,
            parts,
            device,
            injector: None,
            trace_id,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn device(&self) -> &AdbDevice {
        &self.device
    }

    pub fn adb_program(&self) -> &str {
        &self.parts.adb_program
    }

    pub fn activity(&self) -> ActivityType {
        ActivityType::from_code(self.config.run.activity_type).unwrap_or(ActivityType::Running)
    }

    pub fn jitter(&self) -> Jitter {
        Jitter::from_accuracy(self.config.device.location_accuracy)
    }

    pub fn route_store(&self) -> RouteStore {
        RouteStore::new(self.config.routes_dir(), self.trace_id.clone())
    }

    pub fn route_generator(&self) -> RouteGenerator {
        RouteGenerator::new(
            GeneratorSettings {
                jitter: self.jitter(),
                default_altitude: self.config.device.default_altitude,
                ..GeneratorSettings::default()
            },
            self.trace_id.clone(),
        )
    }

    pub fn open_history(&self) -> Result<HistoryDatabase, AppError> {
        HistoryDatabase::open(&self.config.history_db_path(), self.trace_id.clone())
    }

    pub fn connect(&mut self) -> bool {
        if let Err(reason) = validate_adb_program(&self.parts.adb_program) {
            warn!(trace_id = %self.trace_id, program = %self.parts.adb_program, reason = %reason, "adb program looks unusable");
        }
        let connected = self.device.connect();
        if connected {
            info!(trace_id = %self.trace_id, serial = ?self.device.serial(), "device connected");
        } else {
            error!(trace_id = %self.trace_id, "device connection failed");
        }
        connected
    }

    pub fn disconnect(&mut self) -> bool {
        self.device.disconnect()
    }

    pub fn start_app(&self) -> bool {
        let component = format!(
            "{}/{}",
            self.config.app.package_name, self.config.app.main_activity
        );
        let started = self.device.start_app(&component);
        self.parts
            .clock
            .sleep(Duration::from_millis(self.config.automation.app_launch_delay_ms));
        started
    }

    pub fn login(&self) -> bool {
        LoginFlow::new(
            &self.device,
            self.parts.clock.as_ref(),
            &self.config.app,
            &self.config.automation,
            resolve_credentials(&self.config.user),
            &self.trace_id,
        )
        .auto_login()
    }

    fn automation(&self) -> ExerciseAutomation<'_> {
        ExerciseAutomation::new(
            &self.device,
            self.parts.clock.as_ref(),
            &self.config.automation,
            &self.trace_id,
        )
    }

    pub fn start_exercise(&self) -> bool {
        self.automation().start_exercise(self.activity())
    }

    pub fn end_exercise(&self) -> bool {
        self.automation().end_exercise()
    }

    /// Route generated from the run settings, used when no stored route exists.
    pub fn default_route(&self, name: &str) -> Result<Route, AppError> {
        self.route_generator().build_route(&RouteSpec {
            name: name.to_string(),
            description: "Generated from run settings".to_string(),
            route_type: self.activity().display_name().to_string(),
            start: GeoPoint::new(self.config.run.start_latitude, self.config.run.start_longitude),
            distance_m: self.config.run.target_distance,
            is_loop: self.config.run.is_loop,
        })
    }

    /// Loads the named route (the configured default when `None`) and expands it. A missing
    /// route falls back to one generated from the run settings; the generated default route
    /// is also saved for later runs.
    pub fn route_points(&self, name: Option<&str>) -> Result<(String, Vec<LocationPoint>), AppError> {
        let name = name.unwrap_or(&self.config.run.default_route).to_string();
        let store = self.route_store();
        let route = match store.load(&name) {
            Ok(route) => route,
            Err(err) if err.kind == ErrorKind::NotFound => {
                warn!(trace_id = %self.trace_id, route = %name, "route not found, generating one");
                let route = self.default_route(&name)?;
                if name == self.config.run.default_route {
                    if let Err(err) = store.save(&name, &route) {
                        warn!(trace_id = %self.trace_id, error = %err, "could not save generated route");
                    }
                }
                route
            }
            Err(err) => return Err(err),
        };
        let points = self.route_generator().expand_route(&route)?;
        Ok((name, points))
    }

    fn injector(&mut self) -> &mut LocationInjector {
        let injector = match self.injector.take() {
            Some(injector) => injector,
            None => {
                let shell = self.device.shell().clone();
                let backend = select_backend(BackendContext {
                    shell: shell.clone(),
                    host_runner: self.parts.host_runner.clone(),
                    adb_program: self.parts.adb_program.clone(),
                    mock_action: self.config.device.mock_action.clone(),
                    timeout: Duration::from_secs(self.config.device.command_timeout_secs),
                    trace_id: self.trace_id.clone(),
                });
                LocationInjector::new(
                    shell,
                    backend,
                    self.parts.clock.clone(),
                    self.config.app.package_name.clone(),
                    self.jitter(),
                    self.trace_id.clone(),
                )
                .with_speed_profile(SpeedProfile {
                    avg_mps: self.config.run.avg_speed,
                    variation: self.config.run.speed_variation,
                })
            }
        };
        self.injector.insert(injector)
    }

    /// Plays a route through the device and turns mock locations off afterwards.
    pub fn simulate(&mut self, route_name: Option<&str>) -> Result<SimulationOutcome, AppError> {
        let (route_name, points) = self.route_points(route_name)?;
        let target = Duration::from_secs(self.config.run.duration_minutes * 60);
        let driver = PlaybackDriver::new(
            self.parts.clock.clone(),
            Duration::from_secs_f64(self.config.run.max_step_wait_secs),
            self.trace_id.clone(),
        );
        let activity = self.activity();
        let speed = self.config.run.avg_speed;
        let pace = self.config.run.pace;
        info!(
            trace_id = %self.trace_id,
            route = %route_name,
            points = points.len(),
            target_secs = target.as_secs(),
            pace = ?pace,
            "simulating exercise"
        );

        let injector = self.injector();
        let mut sampler = HeartRateSampler {
            injector,
            activity,
            speed,
            recorded: Vec::new(),
        };
        let report = match pace {
            PlaybackPace::Timed => driver.play(&mut sampler, &points, target, None),
            PlaybackPace::Speed => driver.walk(&mut sampler, &points, None, target, None),
        };
        let recorded = sampler.recorded;
        if !self.injector().disable() {
            warn!(trace_id = %self.trace_id, "mock location could not be disabled cleanly");
        }

        let heart_rates: Vec<f64> = recorded
            .iter()
            .filter_map(|point| point.heart_rate)
            .map(|rate| rate as f64)
            .collect();
        let avg_heart_rate = (!heart_rates.is_empty())
            .then(|| heart_rates.iter().sum::<f64>() / heart_rates.len() as f64);
        Ok(SimulationOutcome {
            route_name,
            distance_m: path_distance(&report.sent),
            avg_heart_rate,
            report,
            recorded,
        })
    }

    /// Start, simulate, end: the in-app part of a run without connecting or logging in.
    pub fn run_exercise(&mut self, route_name: Option<&str>) -> Result<SimulationOutcome, AppError> {
        if !self.start_exercise() {
            warn!(trace_id = %self.trace_id, "start taps reported failures");
        }
        let outcome = self.simulate(route_name);
        if !self.end_exercise() {
            warn!(trace_id = %self.trace_id, "end taps reported failures");
        }
        outcome
    }

    pub fn save_history(&self, outcome: &SimulationOutcome) -> Result<i64, AppError> {
        let mut history = self.open_history()?;
        let duration_s = outcome.report.elapsed.as_secs_f64();
        let record = NewRecord {
            activity: self.activity(),
            distance_m: outcome.distance_m,
            duration_s: duration_s.round() as i64,
            avg_speed: (duration_s > 0.0).then(|| outcome.distance_m / duration_s),
            avg_heart_rate: outcome.avg_heart_rate.map(|rate| rate.round() as i64),
            calories: None,
            timestamp: Local::now().naive_local(),
            notes: None,
            route_name: Some(outcome.route_name.clone()),
        };
        let id = history.add_record(&record)?;
        history.add_location_points(id, &outcome.recorded)?;
        Ok(id)
    }

    /// connect, launch, login, start, simulate, end, and optionally record the session.
    pub fn auto_run(&mut self) -> bool {
        if !self.connect() {
            return false;
        }
        if !self.start_app() {
            warn!(trace_id = %self.trace_id, "app launch reported an error");
        }
        if !self.login() {
            error!(trace_id = %self.trace_id, "login failed");
            return false;
        }
        if !self.start_exercise() {
            error!(trace_id = %self.trace_id, "failed to start exercise");
            return false;
        }
        let outcome = match self.simulate(None) {
            Ok(outcome) => Some(outcome),
            Err(err) => {
                error!(trace_id = %self.trace_id, error = %err, "simulation failed");
                None
            }
        };
        self.end_exercise();

        if let (true, Some(outcome)) = (self.config.storage.save_history, outcome.as_ref()) {
            match self.save_history(outcome) {
                Ok(id) => info!(trace_id = %self.trace_id, record_id = id, "saved exercise history"),
                Err(err) => warn!(trace_id = %self.trace_id, error = %err, "failed to save history"),
            }
        }
        info!(trace_id = %self.trace_id, "automation finished");
        outcome.is_some()
    }
}
