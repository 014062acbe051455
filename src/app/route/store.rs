use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::app::error::AppError;
use crate::app::route::models::Route;

const ROUTE_EXTENSION: &str = "json";

/// File name for a route: trimmed, lowercased, spaces replaced by `_`.
pub fn route_key(name: &str) -> String {
    format!(
        "{}.{ROUTE_EXTENSION}",
        name.trim().to_lowercase().replace(' ', "_")
    )
}

/// Directory of pretty-printed route documents, one file per route.
pub struct RouteStore {
    dir: PathBuf,
    trace_id: String,
}

impl RouteStore {
    pub fn new(dir: impl Into<PathBuf>, trace_id: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            trace_id: trace_id.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, AppError> {
        if name.trim().is_empty() {
            return Err(AppError::validation(
                "Route name is required",
                self.trace_id.as_str(),
            ));
        }
        let key = route_key(name);
        if key.contains(['/', '\\']) || key.starts_with('.') {
            return Err(AppError::validation(
                format!("Invalid route name: {name}"),
                self.trace_id.as_str(),
            ));
        }
        Ok(self.dir.join(key))
    }

    pub fn save(&self, name: &str, route: &Route) -> Result<PathBuf, AppError> {
        if route.waypoints.len() < 2 {
            return Err(AppError::insufficient_waypoints(
                route.waypoints.len(),
                self.trace_id.as_str(),
            ));
        }
        if route.repeat == 0 {
            return Err(AppError::validation(
                "Route repeat must be at least 1",
                self.trace_id.as_str(),
            ));
        }
        let path = self.path_for(name)?;
        fs::create_dir_all(&self.dir).map_err(|err| {
            AppError::system(
                format!("Failed to create routes dir: {err}"),
                self.trace_id.as_str(),
            )
        })?;

        let payload = serde_json::to_string_pretty(route).map_err(|err| {
            AppError::system(
                format!("Failed to serialize route: {err}"),
                self.trace_id.as_str(),
            )
        })?;
        let mut staged = NamedTempFile::new_in(&self.dir).map_err(|err| {
            AppError::system(
                format!("Failed to stage route file: {err}"),
                self.trace_id.as_str(),
            )
        })?;
        staged
            .write_all(payload.as_bytes())
            .and_then(|_| staged.as_file().sync_all())
            .map_err(|err| {
                AppError::system(
                    format!("Failed to write route: {err}"),
                    self.trace_id.as_str(),
                )
            })?;
        staged.persist(&path).map_err(|err| {
            AppError::system(
                format!("Failed to persist route: {}", err.error),
                self.trace_id.as_str(),
            )
        })?;

        info!(trace_id = %self.trace_id, route = %name, path = %path.display(), "saved route");
        Ok(path)
    }

    pub fn load(&self, name: &str) -> Result<Route, AppError> {
        let path = self.path_for(name)?;
        if !path.exists() {
            return Err(AppError::not_found(
                format!("Route not found: {name}"),
                self.trace_id.as_str(),
            ));
        }
        let raw = fs::read_to_string(&path).map_err(|err| {
            AppError::system(
                format!("Failed to read route: {err}"),
                self.trace_id.as_str(),
            )
        })?;
        serde_json::from_str(&raw).map_err(|err| {
            warn!(trace_id = %self.trace_id, path = %path.display(), error = %err, "malformed route document");
            AppError::validation(
                format!("Malformed route document {}: {err}", path.display()),
                self.trace_id.as_str(),
            )
        })
    }

    /// Returns false when no such route exists.
    pub fn delete(&self, name: &str) -> Result<bool, AppError> {
        let path = self.path_for(name)?;
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path).map_err(|err| {
            AppError::system(
                format!("Failed to delete route: {err}"),
                self.trace_id.as_str(),
            )
        })?;
        info!(trace_id = %self.trace_id, route = %name, "deleted route");
        Ok(true)
    }

    /// Route keys (file stems) present in the directory. A missing directory is empty.
    pub fn list(&self) -> Result<BTreeSet<String>, AppError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeSet::new()),
            Err(err) => {
                return Err(AppError::system(
                    format!("Failed to list routes: {err}"),
                    self.trace_id.as_str(),
                ))
            }
        };

        Ok(entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file()
                    && path.extension().and_then(|ext| ext.to_str()) == Some(ROUTE_EXTENSION)
            })
            .filter_map(|path| {
                path.file_stem()
                    .and_then(|stem| stem.to_str())
                    .map(str::to_string)
            })
            .collect())
    }
}
