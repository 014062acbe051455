use std::rc::Rc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::app::adb::parse::parse_getprop_value;
use crate::app::adb::transport::{DeviceShell, HostCommandRunner};
use crate::app::location::state::BackendKind;

const EMULATOR_HARDWARE: [&str; 2] = ["ranchu", "goldfish"];

/// Strategy that pushes one coordinate to the device.
pub trait LocationBackend {
    fn kind(&self) -> BackendKind;
    fn send(&self, latitude: f64, longitude: f64, altitude: f64) -> bool;
}

/// True unless the device reply mentions "error" or "unknown" (case-insensitive).
pub fn interpret_backend_response(text: &str) -> bool {
    let lowered = text.to_lowercase();
    !(lowered.contains("error") || lowered.contains("unknown"))
}

/// Broadcasts the coordinate to an on-device mock-location receiver.
pub struct GenericInjector {
    shell: DeviceShell,
    action: String,
    trace_id: String,
}

impl GenericInjector {
    pub fn new(shell: DeviceShell, action: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self {
            shell,
            action: action.into(),
            trace_id: trace_id.into(),
        }
    }

    pub fn broadcast_command(&self, latitude: f64, longitude: f64, altitude: f64) -> String {
        format!(
            "am broadcast -a {} --ef latitude {latitude} --ef longitude {longitude} --ef altitude {altitude}",
            self.action
        )
    }
}

impl LocationBackend for GenericInjector {
    fn kind(&self) -> BackendKind {
        BackendKind::GenericAdb
    }

    fn send(&self, latitude: f64, longitude: f64, altitude: f64) -> bool {
        let reply = self
            .shell
            .shell(&self.broadcast_command(latitude, longitude, altitude));
        let accepted = interpret_backend_response(&reply);
        if !accepted {
            warn!(trace_id = %self.trace_id, reply = %reply, "mock location broadcast rejected");
        }
        accepted
    }
}

/// Drives the emulator console through `adb emu geo fix`, which takes longitude first.
pub struct EmulatorInjector {
    runner: Rc<dyn HostCommandRunner>,
    adb_program: String,
    serial: String,
    timeout: Duration,
    trace_id: String,
}

impl EmulatorInjector {
    pub fn new(
        runner: Rc<dyn HostCommandRunner>,
        adb_program: impl Into<String>,
        serial: impl Into<String>,
        timeout: Duration,
        trace_id: impl Into<String>,
    ) -> Self {
        Self {
            runner,
            adb_program: adb_program.into(),
            serial: serial.into(),
            timeout,
            trace_id: trace_id.into(),
        }
    }

    pub fn geo_fix_args(&self, latitude: f64, longitude: f64, altitude: f64) -> Vec<String> {
        vec![
            "-s".to_string(),
            self.serial.clone(),
            "emu".to_string(),
            "geo".to_string(),
            "fix".to_string(),
            longitude.to_string(),
            latitude.to_string(),
            altitude.to_string(),
        ]
    }
}

impl LocationBackend for EmulatorInjector {
    fn kind(&self) -> BackendKind {
        BackendKind::EmulatorSpecific
    }

    fn send(&self, latitude: f64, longitude: f64, altitude: f64) -> bool {
        let args = self.geo_fix_args(latitude, longitude, altitude);
        match self.runner.run(&self.adb_program, &args, self.timeout) {
            Ok(output) if output.success() => true,
            Ok(output) => {
                warn!(
                    trace_id = %self.trace_id,
                    exit_code = ?output.exit_code,
                    stderr = %output.stderr.trim(),
                    "emulator geo fix failed"
                );
                false
            }
            Err(err) => {
                warn!(trace_id = %self.trace_id, error = %err, "emulator geo fix failed");
                false
            }
        }
    }
}

/// Reads `ro.hardware` once. Anything other than a known emulator signature, including an
/// empty reply or a shell without a serial, is treated as a physical device.
pub fn detect_backend(shell: &DeviceShell, trace_id: &str) -> BackendKind {
    if shell.serial().is_none() {
        debug!(trace_id = %trace_id, "no device serial, using generic backend");
        return BackendKind::GenericAdb;
    }
    let hardware = parse_getprop_value(&shell.shell("getprop ro.hardware")).unwrap_or_default();
    let lowered = hardware.to_lowercase();
    let kind = if EMULATOR_HARDWARE
        .iter()
        .any(|signature| lowered.contains(signature))
    {
        BackendKind::EmulatorSpecific
    } else {
        BackendKind::GenericAdb
    };
    info!(trace_id = %trace_id, hardware = %hardware, backend = %kind, "selected location backend");
    kind
}

/// Everything needed to build either backend.
pub struct BackendContext {
    pub shell: DeviceShell,
    pub host_runner: Rc<dyn HostCommandRunner>,
    pub adb_program: String,
    pub mock_action: String,
    pub timeout: Duration,
    pub trace_id: String,
}

pub fn create_backend(kind: BackendKind, context: BackendContext) -> Box<dyn LocationBackend> {
    match (kind, context.shell.serial().map(str::to_string)) {
        (BackendKind::EmulatorSpecific, Some(serial)) => Box::new(EmulatorInjector::new(
            context.host_runner,
            context.adb_program,
            serial,
            context.timeout,
            context.trace_id,
        )),
        _ => Box::new(GenericInjector::new(
            context.shell,
            context.mock_action,
            context.trace_id,
        )),
    }
}

/// Detects the device kind and builds the matching backend.
pub fn select_backend(context: BackendContext) -> Box<dyn LocationBackend> {
    let kind = detect_backend(&context.shell, &context.trace_id);
    create_backend(kind, context)
}
