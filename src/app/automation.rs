use std::time::Duration;

use tracing::{error, info, warn};

use crate::app::adb::device::AdbDevice;
use crate::app::clock::Clock;
use crate::app::config::{AppSettings, AutomationSettings};
use crate::app::models::ActivityType;

const KEYCODE_DEL: u32 = 67;
const LONG_PRESS_MS: u64 = 1000;

fn millis(value: u64) -> Duration {
    Duration::from_millis(value)
}

/// Blind tap sequences that start and finish an exercise in the app. Coordinates come from
/// the automation settings and depend on the device resolution.
pub struct ExerciseAutomation<'a> {
    device: &'a AdbDevice,
    clock: &'a dyn Clock,
    taps: &'a AutomationSettings,
    trace_id: &'a str,
}

impl<'a> ExerciseAutomation<'a> {
    pub fn new(
        device: &'a AdbDevice,
        clock: &'a dyn Clock,
        taps: &'a AutomationSettings,
        trace_id: &'a str,
    ) -> Self {
        Self {
            device,
            clock,
            taps,
            trace_id,
        }
    }

    fn tap_and_wait(&self, (x, y): (i32, i32), wait: Duration) -> bool {
        let ok = self.device.tap(x, y);
        self.clock.sleep(wait);
        ok
    }

    fn activity_button(&self, activity: ActivityType) -> (i32, i32) {
        match activity {
            ActivityType::Running => self.taps.running_button,
            ActivityType::Cycling => self.taps.cycling_button,
            ActivityType::Walking => self.taps.walking_button,
        }
    }

    pub fn start_exercise(&self, activity: ActivityType) -> bool {
        let settle = millis(self.taps.settle_delay_ms);
        info!(trace_id = %self.trace_id, activity = activity.display_name(), "starting exercise");
        let steps = [
            self.taps.start_button,
            self.activity_button(activity),
            self.taps.confirm_button,
            self.taps.confirm_button,
        ];
        let ok = steps
            .into_iter()
            .fold(true, |ok, tap| self.tap_and_wait(tap, settle) && ok);
        if !ok {
            warn!(trace_id = %self.trace_id, "some start taps failed");
        }
        ok
    }

    pub fn end_exercise(&self) -> bool {
        info!(trace_id = %self.trace_id, "ending exercise");
        let end = self.tap_and_wait(self.taps.end_button, millis(self.taps.settle_delay_ms));
        let confirm = self.tap_and_wait(
            self.taps.end_confirm_button,
            millis(self.taps.app_launch_delay_ms),
        );
        let (x, y) = self.taps.close_result_button;
        let close = self.device.tap(x, y);
        end && confirm && close
    }
}

/// Drives the app's login screen with taps and typed text.
pub struct LoginFlow<'a> {
    device: &'a AdbDevice,
    clock: &'a dyn Clock,
    app: &'a AppSettings,
    taps: &'a AutomationSettings,
    username: String,
    password: String,
    trace_id: &'a str,
}

impl<'a> LoginFlow<'a> {
    pub fn new(
        device: &'a AdbDevice,
        clock: &'a dyn Clock,
        app: &'a AppSettings,
        taps: &'a AutomationSettings,
        credentials: (String, String),
        trace_id: &'a str,
    ) -> Self {
        let (username, password) = credentials;
        Self {
            device,
            clock,
            app,
            taps,
            username,
            password,
            trace_id,
        }
    }

    fn has_credentials(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }

    pub fn is_on_login_page(&self) -> bool {
        self.device
            .current_activity()
            .contains(&self.app.login_activity)
    }

    /// The app is in the foreground on a screen other than login.
    pub fn is_logged_in(&self) -> bool {
        let focused = self.device.current_activity();
        focused.contains(&self.app.package_name) && !focused.contains(&self.app.login_activity)
    }

    pub fn go_to_login_page(&self) -> bool {
        if !self.device.is_app_running(&self.app.package_name) {
            info!(trace_id = %self.trace_id, package = %self.app.package_name, "launching app");
            self.device.start_app(&format!(
                "{}/{}",
                self.app.package_name, self.app.main_activity
            ));
            self.clock.sleep(millis(self.taps.app_launch_delay_ms));
            return self.is_on_login_page();
        }
        if self.is_on_login_page() {
            return true;
        }
        if self.is_logged_in() {
            info!(trace_id = %self.trace_id, "already logged in, logging out");
            let settle = millis(self.taps.settle_delay_ms);
            for &(x, y) in &self.taps.logout_sequence {
                self.device.tap(x, y);
                self.clock.sleep(settle);
            }
        }
        self.is_on_login_page()
    }

    fn replace_field(&self, field: (i32, i32), select_all: (i32, i32), value: &str) -> bool {
        let pause = millis(self.taps.input_delay_ms);
        let mut ok = self.device.tap(field.0, field.1);
        self.clock.sleep(pause);
        ok &= self.device.long_press(field.0, field.1, LONG_PRESS_MS);
        self.clock.sleep(pause);
        ok &= self.device.tap(select_all.0, select_all.1);
        self.clock.sleep(pause);
        ok &= self.device.key_event(KEYCODE_DEL);
        self.clock.sleep(pause);
        ok &= self.device.input_text(value);
        self.clock.sleep(pause * 2);
        ok
    }

    pub fn input_credentials(&self) -> bool {
        if !self.has_credentials() {
            error!(trace_id = %self.trace_id, "username or password is empty");
            return false;
        }
        self.replace_field(
            self.taps.username_field,
            self.taps.username_select_all,
            &self.username,
        ) && self.replace_field(
            self.taps.password_field,
            self.taps.password_select_all,
            &self.password,
        )
    }

    pub fn click_login(&self) -> bool {
        let (x, y) = self.taps.login_button;
        self.device.tap(x, y);
        self.clock.sleep(millis(self.taps.app_launch_delay_ms));
        self.is_logged_in()
    }

    /// Dismisses a prompt that may cover the screen after a failed login.
    fn dismiss_prompt(&self) {
        let (x, y) = self.taps.login_prompt_button;
        self.device.tap(x, y);
        self.clock.sleep(millis(self.taps.settle_delay_ms));
    }

    pub fn auto_login(&self) -> bool {
        if self.is_logged_in() {
            info!(trace_id = %self.trace_id, "already logged in");
            return true;
        }
        if !self.go_to_login_page() {
            error!(trace_id = %self.trace_id, "could not reach the login page");
            return false;
        }
        if !self.has_credentials() {
            error!(trace_id = %self.trace_id, "no credentials configured");
            return false;
        }
        if !self.input_credentials() {
            error!(trace_id = %self.trace_id, "failed to type credentials");
            return false;
        }
        if !self.click_login() {
            self.dismiss_prompt();
            if !self.is_logged_in() {
                error!(trace_id = %self.trace_id, "login failed");
                return false;
            }
        }
        info!(trace_id = %self.trace_id, "login succeeded");
        true
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::app::adb::transport::testing::ScriptedTransport;
    use crate::app::adb::transport::DeviceShell;
    use crate::app::clock::testing::ManualClock;

    const LOGIN_FOCUS: &str = "mCurrentFocus=Window{1 u0 com.hust.sport/com.hust.sport.LoginActivity}";
    const MAIN_FOCUS: &str = "mCurrentFocus=Window{2 u0 com.hust.sport/com.hust.sport.MainActivity}";
    const LAUNCHER_FOCUS: &str = "mCurrentFocus=Window{3 u0 com.android.launcher/.Launcher}";

    fn device(transport: &Rc<ScriptedTransport>) -> AdbDevice {
        AdbDevice::new(
            DeviceShell::new(transport.clone(), Some("R58M".to_string()), Duration::from_secs(5)),
            "test",
        )
    }

    fn credentials() -> (String, String) {
        ("U202412345".to_string(), "pass word".to_string())
    }

    #[test]
    fn start_exercise_taps_in_order_with_settle_delays() {
        let transport = Rc::new(ScriptedTransport::new());
        let device = device(&transport);
        let clock = ManualClock::new();
        let taps = AutomationSettings::default();

        let automation = ExerciseAutomation::new(&device, &clock, &taps, "test");
        assert!(automation.start_exercise(ActivityType::Walking));

        assert_eq!(
            transport.calls(),
            vec![
                "-s R58M shell input tap 521 950",
                "-s R58M shell input tap 780 800",
                "-s R58M shell input tap 500 371",
                "-s R58M shell input tap 500 371",
            ]
        );
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(2); 4]);
    }

    #[test]
    fn end_exercise_closes_result_page() {
        let transport = Rc::new(ScriptedTransport::new());
        let device = device(&transport);
        let clock = ManualClock::new();
        let taps = AutomationSettings::default();

        assert!(ExerciseAutomation::new(&device, &clock, &taps, "test").end_exercise());
        assert_eq!(transport.count_matching("input tap"), 3);
        assert!(transport.calls()[2].ends_with("input tap 540 1800"));
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_secs(2), Duration::from_secs(5)]
        );
    }

    #[test]
    fn auto_login_short_circuits_when_logged_in() {
        let transport = Rc::new(ScriptedTransport::new());
        transport.reply("dumpsys window", MAIN_FOCUS);
        let device = device(&transport);
        let clock = ManualClock::new();
        let app = AppSettings::default();
        let taps = AutomationSettings::default();

        let flow = LoginFlow::new(&device, &clock, &app, &taps, credentials(), "test");
        assert!(flow.auto_login());
        assert_eq!(transport.count_matching("input"), 0);
    }

    #[test]
    fn auto_login_launches_app_and_types_credentials() {
        let transport = Rc::new(ScriptedTransport::new());
        transport.reply_once("dumpsys window", LAUNCHER_FOCUS);
        transport.reply_once("dumpsys window", LOGIN_FOCUS);
        transport.reply_once("dumpsys window", MAIN_FOCUS);
        let device = device(&transport);
        let clock = ManualClock::new();
        let app = AppSettings::default();
        let taps = AutomationSettings::default();

        let flow = LoginFlow::new(&device, &clock, &app, &taps, credentials(), "test");
        assert!(flow.auto_login());

        let calls = transport.calls();
        assert!(calls
            .iter()
            .any(|call| call.ends_with("am start -n com.hust.sport/.MainActivity")));
        assert!(calls
            .iter()
            .any(|call| call.ends_with("input text 'U202412345'")));
        assert!(calls
            .iter()
            .any(|call| call.ends_with("input text 'pass%sword'")));
        assert_eq!(transport.count_matching("input keyevent 67"), 2);
        assert!(calls.last().unwrap().contains("dumpsys window"));
        assert!(transport.count_matching("input tap 540 1300") == 1);
    }

    #[test]
    fn auto_login_requires_credentials() {
        let transport = Rc::new(ScriptedTransport::new());
        transport.reply("pidof", "4242");
        transport.reply("dumpsys window", LOGIN_FOCUS);
        let device = device(&transport);
        let clock = ManualClock::new();
        let app = AppSettings::default();
        let taps = AutomationSettings::default();

        let flow = LoginFlow::new(
            &device,
            &clock,
            &app,
            &taps,
            (String::new(), String::new()),
            "test",
        );
        assert!(!flow.auto_login());
        assert_eq!(transport.count_matching("input text"), 0);
    }

    #[test]
    fn failed_login_dismisses_prompt_and_rechecks() {
        let transport = Rc::new(ScriptedTransport::new());
        transport.reply("pidof", "4242");
        transport.reply("dumpsys window", LOGIN_FOCUS);
        let device = device(&transport);
        let clock = ManualClock::new();
        let app = AppSettings::default();
        let taps = AutomationSettings::default();

        let flow = LoginFlow::new(&device, &clock, &app, &taps, credentials(), "test");
        assert!(!flow.auto_login());
        assert_eq!(transport.count_matching("input tap 540 1200"), 1);
    }

    #[test]
    fn logged_in_user_is_logged_out_before_login_page() {
        let transport = Rc::new(ScriptedTransport::new());
        transport.reply("pidof", "4242");
        transport.reply_once("dumpsys window", MAIN_FOCUS);
        transport.reply_once("dumpsys window", MAIN_FOCUS);
        transport.reply("dumpsys window", LOGIN_FOCUS);
        let device = device(&transport);
        let clock = ManualClock::new();
        let app = AppSettings::default();
        let taps = AutomationSettings::default();

        let flow = LoginFlow::new(&device, &clock, &app, &taps, credentials(), "test");
        assert!(flow.go_to_login_page());
        assert_eq!(
            transport.count_matching("input tap"),
            taps.logout_sequence.len()
        );
    }
}
