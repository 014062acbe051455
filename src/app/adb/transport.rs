use std::rc::Rc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::app::adb::runner::{run_command_with_timeout, CommandOutput};
use crate::app::error::AppError;

/// Executes adb commands against one device. Failures never escape: a timeout or spawn
/// error yields empty output, a non-zero exit is logged and its stdout still returned.
pub trait ShellTransport {
    fn execute(&self, serial: Option<&str>, args: &[String], timeout: Duration) -> String;
}

/// Runs host-side programs when the caller needs the exit code.
pub trait HostCommandRunner {
    fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput, AppError>;
}

pub struct AdbTransport {
    program: String,
    trace_id: String,
}

impl AdbTransport {
    pub fn new(program: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            trace_id: trace_id.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

pub fn build_adb_args(serial: Option<&str>, args: &[String]) -> Vec<String> {
    let mut full = Vec::with_capacity(args.len() + 2);
    if let Some(serial) = serial.filter(|value| !value.trim().is_empty()) {
        full.push("-s".to_string());
        full.push(serial.to_string());
    }
    full.extend(args.iter().cloned());
    full
}

impl ShellTransport for AdbTransport {
    fn execute(&self, serial: Option<&str>, args: &[String], timeout: Duration) -> String {
        let full = build_adb_args(serial, args);
        debug!(trace_id = %self.trace_id, command = %full.join(" "), "running adb");
        match run_command_with_timeout(&self.program, &full, timeout, &self.trace_id) {
            Ok(output) => {
                if !output.success() {
                    warn!(
                        trace_id = %self.trace_id,
                        exit_code = ?output.exit_code,
                        stderr = %output.stderr.trim(),
                        "adb returned non-zero status"
                    );
                }
                output.stdout.trim().to_string()
            }
            Err(err) => {
                warn!(trace_id = %self.trace_id, error = %err, command = %full.join(" "), "adb command failed");
                String::new()
            }
        }
    }
}

pub struct SystemHostRunner {
    trace_id: String,
}

impl SystemHostRunner {
    pub fn new(trace_id: impl Into<String>) -> Self {
        Self {
            trace_id: trace_id.into(),
        }
    }
}

impl HostCommandRunner for SystemHostRunner {
    fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput, AppError> {
        run_command_with_timeout(program, args, timeout, &self.trace_id)
    }
}

/// A transport bound to one target device and timeout.
#[derive(Clone)]
pub struct DeviceShell {
    transport: Rc<dyn ShellTransport>,
    serial: Option<String>,
    timeout: Duration,
}

impl DeviceShell {
    pub fn new(transport: Rc<dyn ShellTransport>, serial: Option<String>, timeout: Duration) -> Self {
        Self {
            transport,
            serial,
            timeout,
        }
    }

    pub fn serial(&self) -> Option<&str> {
        self.serial.as_deref()
    }

    pub fn set_serial(&mut self, serial: Option<String>) {
        self.serial = serial;
    }

    pub fn run(&self, args: &[&str]) -> String {
        let args: Vec<String> = args.iter().map(|arg| arg.to_string()).collect();
        self.transport
            .execute(self.serial.as_deref(), &args, self.timeout)
    }

    /// Server-level commands such as `devices` that must not carry `-s`.
    pub fn run_unbound(&self, args: &[&str]) -> String {
        let args: Vec<String> = args.iter().map(|arg| arg.to_string()).collect();
        self.transport.execute(None, &args, self.timeout)
    }

    pub fn shell(&self, command: &str) -> String {
        self.run(&["shell", command])
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedTransport;
    use super::*;

    #[test]
    fn build_adb_args_prefixes_serial() {
        let args = vec!["shell".to_string(), "id".to_string()];
        assert_eq!(
            build_adb_args(Some("ABC"), &args),
            vec!["-s", "ABC", "shell", "id"]
        );
        assert_eq!(build_adb_args(None, &args), vec!["shell", "id"]);
        assert_eq!(build_adb_args(Some("  "), &args), vec!["shell", "id"]);
    }

    #[test]
    fn device_shell_routes_through_transport() {
        let transport = Rc::new(ScriptedTransport::new());
        transport.reply("echo hi", "hi");
        let shell = DeviceShell::new(
            transport.clone(),
            Some("emulator-5554".to_string()),
            Duration::from_secs(1),
        );
        assert_eq!(shell.shell("echo hi"), "hi");
        assert_eq!(transport.calls(), vec!["-s emulator-5554 shell echo hi"]);
    }

    #[test]
    fn one_shot_replies_take_precedence_then_expire() {
        let transport = ScriptedTransport::new();
        transport.reply("devices", "standing");
        transport.reply_once("devices", "first");
        transport.reply_once("devices", "second");
        let args = vec!["devices".to_string()];
        let timeout = Duration::from_secs(1);

        assert_eq!(transport.execute(None, &args, timeout), "first");
        assert_eq!(transport.execute(None, &args, timeout), "second");
        assert_eq!(transport.execute(None, &args, timeout), "standing");
        assert_eq!(transport.execute(None, &args, timeout), "standing");
        assert_eq!(transport.count_matching("devices"), 4);
    }

    #[test]
    fn adb_transport_swallows_spawn_failures() {
        let transport = AdbTransport::new("/definitely/not/a/real/adb", "t-1");
        let output = transport.execute(None, &["devices".to_string()], Duration::from_secs(1));
        assert!(output.is_empty());
    }
}
