use std::rc::Rc;
use std::time::Duration;

use chrono::Utc;
use rand::rngs::ThreadRng;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::app::adb::parse::parse_settings_bool;
use crate::app::adb::transport::DeviceShell;
use crate::app::clock::Clock;
use crate::app::geo::{self, GeoPoint, Jitter};
use crate::app::location::backend::LocationBackend;
use crate::app::location::state::{CurrentLocation, DeviceLocationState, MockState};
use crate::app::models::ActivityType;

const TELEPORT_DISTANCE_M: f64 = 1.0;
const TELEPORT_TIME_S: f64 = 0.1;
const HEART_RATE_RAMP_S: f64 = 300.0;
const HEART_RATE_MIN: f64 = 60.0;
const HEART_RATE_MAX: f64 = 180.0;
pub const DEFAULT_MOVE_STEPS: u32 = 10;

/// Walking speed used by [`LocationInjector::move_to`] when the caller gives none.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedProfile {
    pub avg_mps: f64,
    /// Fraction in [0, 1]; each move draws a speed in `avg·(1 ± variation)`.
    pub variation: f64,
}

impl Default for SpeedProfile {
    fn default() -> Self {
        Self {
            avg_mps: 2.5,
            variation: 0.1,
        }
    }
}

/// `appops` and `settings put` print nothing on success and a message on failure.
fn setting_reply_ok(reply: &str) -> bool {
    reply.trim().is_empty()
}

/// Owns the mock-location lifecycle for one device and pushes coordinates through the
/// backend chosen when the device was opened.
pub struct LocationInjector<R: Rng = ThreadRng> {
    shell: DeviceShell,
    backend: Box<dyn LocationBackend>,
    clock: Rc<dyn Clock>,
    package_name: String,
    jitter: Jitter,
    speed: SpeedProfile,
    state: DeviceLocationState,
    rng: R,
    trace_id: String,
}

impl LocationInjector<ThreadRng> {
    pub fn new(
        shell: DeviceShell,
        backend: Box<dyn LocationBackend>,
        clock: Rc<dyn Clock>,
        package_name: impl Into<String>,
        jitter: Jitter,
        trace_id: impl Into<String>,
    ) -> Self {
        Self::with_rng(
            shell,
            backend,
            clock,
            package_name,
            jitter,
            rand::thread_rng(),
            trace_id,
        )
    }
}

impl<R: Rng> LocationInjector<R> {
    pub fn with_rng(
        shell: DeviceShell,
        backend: Box<dyn LocationBackend>,
        clock: Rc<dyn Clock>,
        package_name: impl Into<String>,
        jitter: Jitter,
        rng: R,
        trace_id: impl Into<String>,
    ) -> Self {
        let state = DeviceLocationState::new(backend.kind());
        Self {
            shell,
            backend,
            clock,
            package_name: package_name.into(),
            jitter,
            speed: SpeedProfile::default(),
            state,
            rng,
            trace_id: trace_id.into(),
        }
    }

    pub fn with_speed_profile(mut self, speed: SpeedProfile) -> Self {
        self.speed = speed;
        self
    }

    /// One draw of the default walking speed.
    pub fn varied_speed(&mut self) -> f64 {
        let variation = self.speed.variation.clamp(0.0, 1.0);
        if variation == 0.0 {
            return self.speed.avg_mps;
        }
        self.speed.avg_mps * (1.0 + self.rng.gen_range(-variation..=variation))
    }

    pub fn state(&self) -> DeviceLocationState {
        self.state.clone()
    }

    pub fn enable(&mut self) -> bool {
        if self.state.is_enabled() {
            return true;
        }
        self.state.mock_state = MockState::Enabling;
        self.precheck();

        let allow = format!(
            "appops set {} android:mock_location allow",
            self.package_name
        );
        let appops = self.shell.shell(&allow);
        let setting = self.shell.shell("settings put secure mock_location 1");
        if !setting_reply_ok(&appops) || !setting_reply_ok(&setting) {
            warn!(
                trace_id = %self.trace_id,
                package = %self.package_name,
                appops = %appops,
                setting = %setting,
                "device refused part of the mock location grant, continuing"
            );
        }

        self.state.mock_state = MockState::Enabled;
        info!(trace_id = %self.trace_id, backend = %self.state.backend, "mock location enabled");
        true
    }

    fn precheck(&self) {
        let developer = self
            .shell
            .shell("settings get global development_settings_enabled");
        if parse_settings_bool(&developer) != Some(true) {
            warn!(trace_id = %self.trace_id, reply = %developer, "developer options may be disabled");
        }
        let mock = self.shell.shell("settings get secure mock_location");
        debug!(trace_id = %self.trace_id, reply = %mock, "current mock_location setting");
    }

    /// Succeeds without touching the device when mocking is already off.
    pub fn disable(&mut self) -> bool {
        if self.state.mock_state == MockState::Disabled {
            return true;
        }
        self.state.mock_state = MockState::Disabling;
        let reset = format!(
            "appops set {} android:mock_location default",
            self.package_name
        );
        let reset_ok = setting_reply_ok(&self.shell.shell(&reset));
        let setting_ok = setting_reply_ok(&self.shell.shell("settings put secure mock_location 0"));
        self.state.mock_state = MockState::Disabled;
        if !(reset_ok && setting_ok) {
            warn!(trace_id = %self.trace_id, "mock location disable reported errors");
        } else {
            info!(trace_id = %self.trace_id, "mock location disabled");
        }
        reset_ok && setting_ok
    }

    pub fn set_location(&mut self, latitude: f64, longitude: f64, altitude: f64) -> bool {
        if geo::validate_point(GeoPoint::new(latitude, longitude)).is_err() || !altitude.is_finite() {
            warn!(trace_id = %self.trace_id, latitude, longitude, altitude, "refusing invalid location");
            return false;
        }
        if !self.state.is_enabled() && !self.enable() {
            return false;
        }

        let point = self
            .jitter
            .apply(&mut self.rng, GeoPoint::new(latitude, longitude));
        if !self
            .backend
            .send(point.latitude, point.longitude, altitude)
        {
            warn!(trace_id = %self.trace_id, latitude = point.latitude, longitude = point.longitude, "set location failed");
            return false;
        }

        if self.state.first_fix_at.is_none() {
            self.state.first_fix_at = Some(self.clock.now());
        }
        self.state.current_location = Some(CurrentLocation {
            latitude: point.latitude,
            longitude: point.longitude,
            altitude,
            timestamp: Utc::now(),
        });
        debug!(trace_id = %self.trace_id, latitude = point.latitude, longitude = point.longitude, altitude, "location set");
        true
    }

    /// Walks to `target` in `steps` linear sub-moves, at `speed_mps` or a fresh
    /// [`varied_speed`](Self::varied_speed) draw. Teleports when there is no known location
    /// or the move is negligible.
    pub fn move_to(
        &mut self,
        target: GeoPoint,
        altitude: f64,
        speed_mps: Option<f64>,
        steps: u32,
    ) -> bool {
        let Some(current) = self.state.current_location.clone() else {
            return self.set_location(target.latitude, target.longitude, altitude);
        };
        let origin = GeoPoint::new(current.latitude, current.longitude);
        let meters = match geo::distance(origin, target) {
            Ok(meters) => meters,
            Err(err) => {
                warn!(trace_id = %self.trace_id, error = %err, "invalid move target");
                return false;
            }
        };
        let speed_mps = speed_mps.unwrap_or_else(|| self.varied_speed());
        let total_s = if speed_mps.is_finite() && speed_mps > 0.0 {
            meters / speed_mps
        } else {
            0.0
        };
        if meters < TELEPORT_DISTANCE_M || total_s < TELEPORT_TIME_S {
            return self.set_location(target.latitude, target.longitude, altitude);
        }

        let steps = steps.max(1);
        let pause = Duration::from_secs_f64(total_s / steps as f64);
        for step in 1..=steps {
            let fraction = step as f64 / steps as f64;
            let point = geo::interpolate(origin, target, fraction);
            let step_altitude = current.altitude + (altitude - current.altitude) * fraction;
            if !self.set_location(point.latitude, point.longitude, step_altitude) {
                return false;
            }
            if step < steps {
                self.clock.sleep(pause);
            }
        }
        true
    }

    /// Plausible heart rate that ramps up over the first five minutes of the session.
    pub fn simulate_heart_rate(&mut self, activity: ActivityType) -> u32 {
        let mut rate = self.rng.gen_range(70..=90) as f64;
        if let Some(first_fix) = self.state.first_fix_at {
            let elapsed = self.clock.now().saturating_sub(first_fix).as_secs_f64();
            let ramp = (elapsed / HEART_RATE_RAMP_S).min(1.0);
            rate += activity.max_heart_rate_increase() as f64 * ramp;
        }
        rate += self.rng.gen_range(-5..=5) as f64;
        rate.clamp(HEART_RATE_MIN, HEART_RATE_MAX).round() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::adb::transport::testing::{RecordingHostRunner, ScriptedTransport};
    use crate::app::clock::testing::ManualClock;
    use crate::app::location::backend::{
        create_backend, select_backend, BackendContext, GenericInjector,
    };
    use crate::app::location::state::BackendKind;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const PACKAGE: &str = "com.hust.sport";

    struct Rig {
        transport: Rc<ScriptedTransport>,
        clock: Rc<ManualClock>,
        injector: LocationInjector<StdRng>,
    }

    fn rig() -> Rig {
        let transport = Rc::new(ScriptedTransport::new());
        transport.reply("development_settings_enabled", "1");
        transport.reply("am broadcast", "Broadcast completed: result=0");
        let clock = Rc::new(ManualClock::new());
        let shell = DeviceShell::new(transport.clone(), None, Duration::from_secs(5));
        let backend = Box::new(GenericInjector::new(shell.clone(), "MOCK", "test"));
        let injector = LocationInjector::with_rng(
            shell,
            backend,
            clock.clone(),
            PACKAGE,
            Jitter::none(),
            StdRng::seed_from_u64(7),
            "test",
        );
        Rig {
            transport,
            clock,
            injector,
        }
    }

    fn position(calls: &[String], needle: &str) -> usize {
        calls
            .iter()
            .position(|call| call.contains(needle))
            .unwrap_or_else(|| panic!("no call containing {needle}: {calls:?}"))
    }

    #[test]
    fn disable_when_disabled_issues_no_commands() {
        let mut rig = rig();
        assert!(rig.injector.disable());
        assert!(rig.injector.disable());
        assert!(rig.transport.calls().is_empty());
        assert_eq!(rig.injector.state().mock_state, MockState::Disabled);
    }

    #[test]
    fn set_location_enables_before_broadcasting() {
        let mut rig = rig();
        assert!(rig.injector.set_location(30.52, 114.36, 20.0));

        let calls = rig.transport.calls();
        let precheck = position(&calls, "development_settings_enabled");
        let allow = position(&calls, "android:mock_location allow");
        let setting = position(&calls, "settings put secure mock_location 1");
        let broadcast = position(&calls, "am broadcast");
        assert!(precheck < allow && allow < setting && setting < broadcast);

        let state = rig.injector.state();
        assert_eq!(state.mock_state, MockState::Enabled);
        let current = state.current_location.unwrap();
        assert_eq!((current.latitude, current.longitude), (30.52, 114.36));
    }

    #[test]
    fn enable_runs_once_per_session() {
        let mut rig = rig();
        assert!(rig.injector.set_location(30.52, 114.36, 20.0));
        assert!(rig.injector.set_location(30.53, 114.36, 20.0));
        assert_eq!(rig.transport.count_matching("mock_location allow"), 1);
        assert_eq!(rig.transport.count_matching("am broadcast"), 2);
    }

    #[test]
    fn disable_after_enable_resets_permissions() {
        let mut rig = rig();
        assert!(rig.injector.enable());
        assert!(rig.injector.disable());
        assert_eq!(rig.transport.count_matching("android:mock_location default"), 1);
        assert_eq!(rig.transport.count_matching("settings put secure mock_location 0"), 1);
        assert_eq!(rig.injector.state().mock_state, MockState::Disabled);
    }

    #[test]
    fn refused_grant_still_enables_and_injects() {
        let mut rig = rig();
        rig.transport
            .reply("mock_location allow", "Error: Unknown package: com.hust.sport");
        for step in 0..10 {
            assert!(rig.injector.set_location(30.52 + step as f64 * 0.0001, 114.36, 20.0));
        }
        assert_eq!(rig.injector.state().mock_state, MockState::Enabled);
        assert_eq!(rig.transport.count_matching("mock_location allow"), 1);
        assert_eq!(rig.transport.count_matching("am broadcast"), 10);
    }

    #[test]
    fn disable_reports_refused_reset_but_still_turns_off() {
        let mut rig = rig();
        rig.transport
            .reply("mock_location default", "Security exception: not allowed");
        assert!(rig.injector.enable());
        assert!(!rig.injector.disable());
        assert_eq!(rig.injector.state().mock_state, MockState::Disabled);
    }

    #[test]
    fn rejected_broadcast_keeps_previous_location() {
        let transport = Rc::new(ScriptedTransport::new());
        transport.reply("am broadcast", "Error: bad intent");
        let shell = DeviceShell::new(transport.clone(), None, Duration::from_secs(5));
        let backend = Box::new(GenericInjector::new(shell.clone(), "MOCK", "test"));
        let mut injector = LocationInjector::with_rng(
            shell,
            backend,
            Rc::new(ManualClock::new()),
            PACKAGE,
            Jitter::none(),
            StdRng::seed_from_u64(1),
            "test",
        );
        assert!(!injector.set_location(30.52, 114.36, 20.0));
        assert!(injector.state().current_location.is_none());
    }

    #[test]
    fn emulator_routing_persists_across_calls() {
        let transport = Rc::new(ScriptedTransport::new());
        transport.reply("getprop ro.hardware", "ranchu");
        let runner = Rc::new(RecordingHostRunner::default());
        let shell = DeviceShell::new(
            transport.clone(),
            Some("emulator-5554".to_string()),
            Duration::from_secs(5),
        );
        let backend = select_backend(BackendContext {
            shell: shell.clone(),
            host_runner: runner.clone(),
            adb_program: "adb".to_string(),
            mock_action: "MOCK".to_string(),
            timeout: Duration::from_secs(5),
            trace_id: "test".to_string(),
        });
        let mut injector = LocationInjector::with_rng(
            shell,
            backend,
            Rc::new(ManualClock::new()),
            PACKAGE,
            Jitter::none(),
            StdRng::seed_from_u64(3),
            "test",
        );

        for step in 0..3 {
            assert!(injector.set_location(30.52 + step as f64 * 0.001, 114.36, 20.0));
        }
        assert_eq!(injector.state().backend, BackendKind::EmulatorSpecific);
        assert_eq!(runner.calls.borrow().len(), 3);
        assert!(runner
            .calls
            .borrow()
            .iter()
            .all(|(_, args)| args[2..5] == ["emu", "geo", "fix"]));
        assert_eq!(transport.count_matching("am broadcast"), 0);
        assert_eq!(transport.count_matching("getprop ro.hardware"), 1);
    }

    #[test]
    fn move_to_without_known_location_teleports() {
        let mut rig = rig();
        assert!(rig
            .injector
            .move_to(GeoPoint::new(30.52, 114.36), 20.0, Some(3.0), 10));
        assert_eq!(rig.transport.count_matching("am broadcast"), 1);
        assert!(rig.clock.sleeps().is_empty());
    }

    #[test]
    fn move_to_tiny_distance_teleports() {
        let mut rig = rig();
        assert!(rig.injector.set_location(30.52, 114.36, 20.0));
        assert!(rig
            .injector
            .move_to(GeoPoint::new(30.520_001, 114.36), 20.0, Some(3.0), 10));
        assert_eq!(rig.transport.count_matching("am broadcast"), 2);
        assert!(rig.clock.sleeps().is_empty());
    }

    #[test]
    fn move_to_splits_walk_into_steps() {
        let mut rig = rig();
        let start = GeoPoint::new(30.52, 114.36);
        let target = geo::destination(start, 0.0, 100.0).unwrap();
        assert!(rig.injector.set_location(start.latitude, start.longitude, 20.0));
        assert!(rig.injector.move_to(target, 20.0, Some(2.0), 5));

        assert_eq!(rig.transport.count_matching("am broadcast"), 6);
        let sleeps = rig.clock.sleeps();
        assert_eq!(sleeps.len(), 4);
        for pause in sleeps {
            assert!((pause.as_secs_f64() - 10.0).abs() < 1e-6);
        }
        let current = rig.injector.state().current_location.unwrap();
        assert!((current.latitude - target.latitude).abs() < 1e-9);
    }

    #[test]
    fn move_to_without_speed_draws_from_profile() {
        let rig = rig();
        let mut injector = rig.injector.with_speed_profile(SpeedProfile {
            avg_mps: 2.0,
            variation: 0.1,
        });
        let start = GeoPoint::new(30.52, 114.36);
        assert!(injector.set_location(start.latitude, start.longitude, 20.0));

        let mut last = start;
        for leg in 1..=5 {
            let target = geo::destination(start, 0.0, 100.0 * leg as f64).unwrap();
            let before = rig.clock.sleeps().len();
            assert!(injector.move_to(target, 20.0, None, DEFAULT_MOVE_STEPS));
            let sleeps = rig.clock.sleeps();
            let pauses = &sleeps[before..];
            assert_eq!(pauses.len(), DEFAULT_MOVE_STEPS as usize - 1);
            let leg_s = pauses[0].as_secs_f64() * DEFAULT_MOVE_STEPS as f64;
            let meters = geo::distance(last, target).unwrap();
            assert!(
                leg_s >= meters / 2.2 - 1e-6 && leg_s <= meters / 1.8 + 1e-6,
                "leg {leg}: {leg_s}s for {meters}m"
            );
            last = target;
        }
    }

    #[test]
    fn varied_speed_without_variation_is_constant() {
        let rig = rig();
        let mut injector = rig.injector.with_speed_profile(SpeedProfile {
            avg_mps: 3.2,
            variation: 0.0,
        });
        assert_eq!(injector.varied_speed(), 3.2);
        assert_eq!(injector.varied_speed(), 3.2);
    }

    #[test]
    fn heart_rate_stays_in_physiological_range() {
        let mut rig = rig();
        for _ in 0..200 {
            let rate = rig.injector.simulate_heart_rate(ActivityType::Running);
            assert!((65..=95).contains(&rate), "{rate}");
        }

        assert!(rig.injector.set_location(30.52, 114.36, 20.0));
        rig.clock.advance(Duration::from_secs(600));
        for activity in [ActivityType::Running, ActivityType::Cycling, ActivityType::Walking] {
            for _ in 0..200 {
                let rate = rig.injector.simulate_heart_rate(activity);
                let floor = 65 + activity.max_heart_rate_increase() as u32;
                assert!(rate >= floor && rate <= 180, "{activity:?}: {rate}");
            }
        }
    }

    #[test]
    fn heart_rate_ramps_linearly_until_five_minutes() {
        let mut rig = rig();
        assert!(rig.injector.set_location(30.52, 114.36, 20.0));
        rig.clock.advance(Duration::from_secs(150));
        for _ in 0..200 {
            let rate = rig.injector.simulate_heart_rate(ActivityType::Walking);
            assert!((90..=120).contains(&rate), "{rate}");
        }
    }

    #[test]
    fn invalid_coordinates_are_refused_without_commands() {
        let mut rig = rig();
        assert!(!rig.injector.set_location(f64::NAN, 114.36, 20.0));
        assert!(!rig.injector.set_location(91.0, 114.36, 20.0));
        assert!(rig.transport.calls().is_empty());
    }

    #[test]
    fn generic_backend_is_used_without_serial() {
        let transport = Rc::new(ScriptedTransport::new());
        let shell = DeviceShell::new(transport, None, Duration::from_secs(5));
        let backend = create_backend(
            BackendKind::EmulatorSpecific,
            BackendContext {
                shell,
                host_runner: Rc::new(RecordingHostRunner::default()),
                adb_program: "adb".to_string(),
                mock_action: "MOCK".to_string(),
                timeout: Duration::from_secs(5),
                trace_id: "test".to_string(),
            },
        );
        assert_eq!(backend.kind(), BackendKind::GenericAdb);
    }
}
