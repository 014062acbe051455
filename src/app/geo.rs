//! Great-circle helpers on a spherical Earth.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::app::error::AppError;

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;
/// Equirectangular conversion factor used for short offsets.
pub const METERS_PER_DEGREE: f64 = 111_000.0;
pub const DEFAULT_JITTER_DEG: f64 = 0.000_005;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GeoError {
    InvalidCoordinate { latitude: f64, longitude: f64 },
    InvalidDistance(f64),
    InvalidBearing(f64),
}

impl fmt::Display for GeoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeoError::InvalidCoordinate {
                latitude,
                longitude,
            } => write!(f, "Invalid coordinate ({latitude}, {longitude})"),
            GeoError::InvalidDistance(value) => write!(f, "Invalid distance {value}"),
            GeoError::InvalidBearing(value) => write!(f, "Invalid bearing {value}"),
        }
    }
}

impl std::error::Error for GeoError {}

impl From<GeoError> for AppError {
    fn from(err: GeoError) -> Self {
        AppError::validation(err.to_string(), "")
    }
}

pub fn validate_point(point: GeoPoint) -> Result<(), GeoError> {
    let GeoPoint {
        latitude,
        longitude,
    } = point;
    if !latitude.is_finite()
        || !longitude.is_finite()
        || !(-90.0..=90.0).contains(&latitude)
        || !(-180.0..=180.0).contains(&longitude)
    {
        return Err(GeoError::InvalidCoordinate {
            latitude,
            longitude,
        });
    }
    Ok(())
}

/// Haversine distance in meters.
pub fn distance(a: GeoPoint, b: GeoPoint) -> Result<f64, GeoError> {
    validate_point(a)?;
    validate_point(b)?;

    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.latitude.to_radians().cos() * b.latitude.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().min(1.0).asin();

    Ok(EARTH_RADIUS_M * c)
}

/// The point reached from `origin` after `distance_m` along the initial `bearing_deg`.
pub fn destination(
    origin: GeoPoint,
    bearing_deg: f64,
    distance_m: f64,
) -> Result<GeoPoint, GeoError> {
    validate_point(origin)?;
    if !distance_m.is_finite() || distance_m < 0.0 {
        return Err(GeoError::InvalidDistance(distance_m));
    }
    if !bearing_deg.is_finite() {
        return Err(GeoError::InvalidBearing(bearing_deg));
    }

    let angular = distance_m / EARTH_RADIUS_M;
    let bearing = bearing_deg.to_radians();
    let lat1 = origin.latitude.to_radians();
    let lon1 = origin.longitude.to_radians();

    let lat2 = (lat1.sin() * angular.cos() + lat1.cos() * angular.sin() * bearing.cos()).asin();
    let lon2 = lon1
        + (bearing.sin() * angular.sin() * lat1.cos())
            .atan2(angular.cos() - lat1.sin() * lat2.sin());

    Ok(GeoPoint::new(
        lat2.to_degrees(),
        normalize_longitude(lon2.to_degrees()),
    ))
}

fn normalize_longitude(longitude: f64) -> f64 {
    (longitude + 540.0).rem_euclid(360.0) - 180.0
}

/// Linear interpolation in degree space. Good enough for the sub-kilometer segments
/// routes are made of.
pub fn interpolate(a: GeoPoint, b: GeoPoint, fraction: f64) -> GeoPoint {
    GeoPoint::new(
        a.latitude + (b.latitude - a.latitude) * fraction,
        a.longitude + (b.longitude - a.longitude) * fraction,
    )
}

/// Degree offsets for a metric offset near `at_latitude`, using the equirectangular
/// approximation. Distorts at high latitudes and large radii.
pub fn metric_offset_to_degrees(north_m: f64, east_m: f64, at_latitude: f64) -> (f64, f64) {
    let d_lat = north_m / METERS_PER_DEGREE;
    let d_lon = east_m / (METERS_PER_DEGREE * at_latitude.to_radians().cos());
    (d_lat, d_lon)
}

/// Small independent positional noise on latitude and longitude.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Jitter {
    pub amplitude_deg: f64,
}

impl Default for Jitter {
    fn default() -> Self {
        Self {
            amplitude_deg: DEFAULT_JITTER_DEG,
        }
    }
}

impl Jitter {
    pub fn none() -> Self {
        Self { amplitude_deg: 0.0 }
    }

    /// Spreads points over an accuracy radius; zero or invalid radii keep the default.
    pub fn from_accuracy(accuracy_m: f64) -> Self {
        if !accuracy_m.is_finite() || accuracy_m <= 0.0 {
            return Self::default();
        }
        Self {
            amplitude_deg: accuracy_m / METERS_PER_DEGREE / 2.0,
        }
    }

    pub fn apply<R: Rng>(&self, rng: &mut R, point: GeoPoint) -> GeoPoint {
        if self.amplitude_deg == 0.0 {
            return point;
        }
        GeoPoint::new(
            point.latitude + self.amplitude_deg * rng.gen_range(-1.0..=1.0),
            point.longitude + self.amplitude_deg * rng.gen_range(-1.0..=1.0),
        )
    }
}
