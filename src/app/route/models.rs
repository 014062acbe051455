use serde::{Deserialize, Serialize};

use crate::app::geo::GeoPoint;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Waypoint {
    pub latitude: f64,
    pub longitude: f64,
    pub name: String,
}

impl Waypoint {
    pub fn new(point: GeoPoint, name: impl Into<String>) -> Self {
        Self {
            latitude: point.latitude,
            longitude: point.longitude,
            name: name.into(),
        }
    }

    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ElevationProfile {
    pub enabled: bool,
    pub min_elevation: f64,
    pub max_elevation: f64,
    /// Fraction of the amplitude added as random noise, in [0, 1].
    pub variation: f64,
}

impl Default for ElevationProfile {
    fn default() -> Self {
        Self {
            enabled: true,
            min_elevation: 20.0,
            max_elevation: 25.0,
            variation: 0.1,
        }
    }
}

impl ElevationProfile {
    pub fn base(&self) -> f64 {
        (self.min_elevation + self.max_elevation) / 2.0
    }

    pub fn amplitude(&self) -> f64 {
        (self.max_elevation - self.min_elevation) / 2.0
    }
}

fn default_repeat() -> u32 {
    1
}

/// A named route document as persisted by the route store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Route {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type", default)]
    pub route_type: String,
    /// Nominal distance in meters.
    pub distance: f64,
    pub start_point: Waypoint,
    pub end_point: Waypoint,
    pub waypoints: Vec<Waypoint>,
    #[serde(default = "default_repeat")]
    pub repeat: u32,
    #[serde(default)]
    pub elevation_profile: ElevationProfile,
}

impl Route {
    /// Routes whose start and end coincide are closed back onto their first waypoint.
    pub fn is_closed(&self) -> bool {
        self.start_point.latitude == self.end_point.latitude
            && self.start_point.longitude == self.end_point.longitude
    }
}

/// One interpolated sample produced while expanding a route.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct LocationPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub segment_index: usize,
    pub progress: f64,
}

impl LocationPoint {
    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}
