use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    InsufficientWaypoints,
    Dependency,
    System,
}

impl ErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::Validation => "ERR_VALIDATION",
            ErrorKind::NotFound => "ERR_NOT_FOUND",
            ErrorKind::InsufficientWaypoints => "ERR_INSUFFICIENT_WAYPOINTS",
            ErrorKind::Dependency => "ERR_DEPENDENCY",
            ErrorKind::System => "ERR_SYSTEM",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AppError {
    pub error: String,
    pub kind: ErrorKind,
    pub trace_id: String,
}

impl AppError {
    pub fn new(kind: ErrorKind, message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            kind,
            trace_id: trace_id.into(),
        }
    }

    pub fn validation(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message, trace_id)
    }

    pub fn not_found(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message, trace_id)
    }

    pub fn insufficient_waypoints(count: usize, trace_id: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::InsufficientWaypoints,
            format!("Route needs at least 2 waypoints, got {count}"),
            trace_id,
        )
    }

    pub fn dependency(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ErrorKind::Dependency, message, trace_id)
    }

    pub fn system(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ErrorKind::System, message, trace_id)
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.error, self.code())
    }
}

impl std::error::Error for AppError {}
