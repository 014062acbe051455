use tracing::{error, info, warn};

use crate::app::adb::parse::{parse_adb_devices, parse_focused_component};
use crate::app::adb::transport::DeviceShell;

const CONNECTION_PROBE: &str = "connection_test";

fn reply_ok(reply: &str) -> bool {
    let lowered = reply.to_lowercase();
    !(lowered.contains("error") || lowered.contains("exception"))
}

/// Escapes text for `input text`: spaces become `%s`, `&` is shell-escaped.
pub fn escape_input_text(text: &str) -> String {
    text.replace(' ', "%s").replace('&', "\\&")
}

/// Input and app-lifecycle controls for one device.
pub struct AdbDevice {
    shell: DeviceShell,
    connected: bool,
    trace_id: String,
}

impl AdbDevice {
    pub fn new(shell: DeviceShell, trace_id: impl Into<String>) -> Self {
        Self {
            shell,
            connected: false,
            trace_id: trace_id.into(),
        }
    }

    pub fn shell(&self) -> &DeviceShell {
        &self.shell
    }

    pub fn serial(&self) -> Option<&str> {
        self.shell.serial()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Picks the first online device unless a serial was configured, then checks that the
    /// device answers a shell echo.
    pub fn connect(&mut self) -> bool {
        self.shell.run_unbound(&["start-server"]);
        let online: Vec<String> = parse_adb_devices(&self.shell.run_unbound(&["devices", "-l"]))
            .into_iter()
            .filter(|device| device.is_online())
            .map(|device| device.serial)
            .collect();
        if online.is_empty() {
            error!(trace_id = %self.trace_id, "no connected device detected");
            return false;
        }

        match self.shell.serial().map(str::to_string) {
            None => {
                info!(trace_id = %self.trace_id, serial = %online[0], "auto-selected device");
                self.shell.set_serial(Some(online[0].clone()));
            }
            Some(serial) if !online.contains(&serial) => {
                error!(trace_id = %self.trace_id, serial = %serial, "configured device is not connected");
                return false;
            }
            Some(_) => {}
        }

        let echo = self.shell.run(&["shell", "echo", CONNECTION_PROBE]);
        if !echo.contains(CONNECTION_PROBE) {
            error!(trace_id = %self.trace_id, reply = %echo, "device connection test failed");
            return false;
        }
        self.connected = true;
        info!(trace_id = %self.trace_id, serial = ?self.shell.serial(), "connected to device");
        true
    }

    /// Only network devices (`host:port`) are disconnected from the adb server.
    pub fn disconnect(&mut self) -> bool {
        if !self.connected {
            return true;
        }
        if let Some(serial) = self.shell.serial().filter(|serial| serial.contains(':')) {
            let serial = serial.to_string();
            self.shell.run_unbound(&["disconnect", &serial]);
        }
        self.connected = false;
        true
    }

    fn input(&self, command: String) -> bool {
        let reply = self.shell.shell(&command);
        let ok = reply_ok(&reply);
        if !ok {
            warn!(trace_id = %self.trace_id, command = %command, reply = %reply, "device command failed");
        }
        ok
    }

    pub fn tap(&self, x: i32, y: i32) -> bool {
        self.input(format!("input tap {x} {y}"))
    }

    pub fn long_press(&self, x: i32, y: i32, duration_ms: u64) -> bool {
        self.input(format!("input swipe {x} {y} {x} {y} {duration_ms}"))
    }

    pub fn swipe(&self, from: (i32, i32), to: (i32, i32), duration_ms: u64) -> bool {
        self.input(format!(
            "input swipe {} {} {} {} {duration_ms}",
            from.0, from.1, to.0, to.1
        ))
    }

    pub fn input_text(&self, text: &str) -> bool {
        self.input(format!("input text '{}'", escape_input_text(text)))
    }

    pub fn key_event(&self, keycode: u32) -> bool {
        self.input(format!("input keyevent {keycode}"))
    }

    pub fn start_app(&self, component: &str) -> bool {
        self.input(format!("am start -n {component}"))
    }

    pub fn stop_app(&self, package: &str) -> bool {
        self.input(format!("am force-stop {package}"))
    }

    pub fn install_app(&self, apk_path: &str) -> bool {
        self.shell.run(&["install", "-r", apk_path]).contains("Success")
    }

    pub fn uninstall_app(&self, package: &str) -> bool {
        self.shell.run(&["uninstall", package]).contains("Success")
    }

    pub fn is_app_running(&self, package: &str) -> bool {
        !self.shell.shell(&format!("pidof {package}")).trim().is_empty()
    }

    /// `package/activity` of the focused window, empty when unknown.
    pub fn current_activity(&self) -> String {
        let output = self
            .shell
            .shell("dumpsys window windows | grep -E 'mCurrentFocus|mFocusedApp'");
        parse_focused_component(&output).unwrap_or_else(|| {
            warn!(trace_id = %self.trace_id, "could not determine focused activity");
            String::new()
        })
    }
}
