use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::app::adb::runner::run_command_with_timeout;

pub fn normalize_command_path(value: &str) -> String {
    let trimmed = value.trim();
    if let Some(inner) = trimmed
        .strip_prefix('"')
        .and_then(|candidate| candidate.strip_suffix('"'))
    {
        return inner.trim().to_string();
    }
    if let Some(inner) = trimmed
        .strip_prefix('\'')
        .and_then(|candidate| candidate.strip_suffix('\''))
    {
        return inner.trim().to_string();
    }
    trimmed.to_string()
}

/// Locations checked when no adb path is configured, in order.
pub fn candidate_adb_paths(home: Option<&Path>) -> Vec<PathBuf> {
    let mut candidates = vec![
        PathBuf::from("adb"),
        PathBuf::from("/usr/bin/adb"),
        PathBuf::from("/usr/local/bin/adb"),
    ];
    if cfg!(windows) {
        candidates.push(PathBuf::from(
            r"C:\Program Files\Android\platform-tools\adb.exe",
        ));
        candidates.push(PathBuf::from(
            r"C:\Program Files (x86)\Android\platform-tools\adb.exe",
        ));
    }
    if let Some(home) = home {
        candidates.push(home.join("Library/Android/sdk/platform-tools/adb"));
        candidates.push(home.join("Android/Sdk/platform-tools/adb"));
    }
    candidates
}

/// Resolves the adb program. A configured path wins; otherwise the first candidate for
/// which `probe` succeeds, falling back to plain `adb`.
pub fn resolve_adb_program_with(
    config_command_path: &str,
    home: Option<&Path>,
    probe: impl Fn(&str) -> bool,
) -> String {
    let normalized = normalize_command_path(config_command_path);
    if !normalized.is_empty() {
        return normalized;
    }
    candidate_adb_paths(home)
        .into_iter()
        .map(|path| path.to_string_lossy().to_string())
        .find(|candidate| probe(candidate))
        .unwrap_or_else(|| "adb".to_string())
}

pub fn resolve_adb_program(config_command_path: &str) -> String {
    let home = dirs::home_dir();
    resolve_adb_program_with(config_command_path, home.as_deref(), probe_adb)
}

fn probe_adb(program: &str) -> bool {
    run_command_with_timeout(
        program,
        &["version".to_string()],
        Duration::from_secs(2),
        "adb-probe",
    )
    .map(|output| output.success())
    .unwrap_or(false)
}

pub fn validate_adb_program(program: &str) -> Result<(), String> {
    if program.trim().is_empty() {
        return Err("ADB command is empty".to_string());
    }
    if program == "adb" {
        return Ok(());
    }
    let path = Path::new(program);
    if path.is_dir() {
        return Err("ADB path must point to an executable file".to_string());
    }
    if !path.exists() {
        return Err("ADB executable not found at the configured path".to_string());
    }
    Ok(())
}
