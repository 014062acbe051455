use std::f64::consts::PI;

use rand::rngs::ThreadRng;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::app::error::AppError;
use crate::app::geo::{self, GeoPoint, Jitter};
use crate::app::route::models::{ElevationProfile, LocationPoint, Route, Waypoint};

pub const DEFAULT_ANCHOR_POINTS: usize = 8;
/// One interpolated point per this many meters of segment.
pub const POINT_SPACING_M: f64 = 10.0;

#[derive(Debug, Clone)]
pub struct GeneratorSettings {
    pub num_anchor_points: usize,
    pub jitter: Jitter,
    /// Altitude used when elevation modeling is off.
    pub default_altitude: f64,
    pub elevation: ElevationProfile,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            num_anchor_points: DEFAULT_ANCHOR_POINTS,
            jitter: Jitter::default(),
            default_altitude: 10.0,
            elevation: ElevationProfile::default(),
        }
    }
}

/// Input for a new route document.
#[derive(Debug, Clone)]
pub struct RouteSpec {
    pub name: String,
    pub description: String,
    pub route_type: String,
    pub start: GeoPoint,
    pub distance_m: f64,
    pub is_loop: bool,
}

pub struct RouteGenerator<R: Rng = ThreadRng> {
    settings: GeneratorSettings,
    rng: R,
    trace_id: String,
}

impl RouteGenerator<ThreadRng> {
    pub fn new(settings: GeneratorSettings, trace_id: impl Into<String>) -> Self {
        Self::with_rng(settings, rand::thread_rng(), trace_id)
    }
}

impl<R: Rng> RouteGenerator<R> {
    pub fn with_rng(settings: GeneratorSettings, rng: R, trace_id: impl Into<String>) -> Self {
        Self {
            settings,
            rng,
            trace_id: trace_id.into(),
        }
    }

    pub fn settings(&self) -> &GeneratorSettings {
        &self.settings
    }

    /// Generates a loop or out-and-back route around `start` and expands it into playback
    /// points. Failures are logged and produce an empty sequence.
    pub fn generate_route(
        &mut self,
        start: GeoPoint,
        distance_m: f64,
        is_loop: bool,
    ) -> Vec<LocationPoint> {
        let spec = RouteSpec {
            name: "generated".to_string(),
            description: String::new(),
            route_type: String::new(),
            start,
            distance_m,
            is_loop,
        };
        let result = self.build_route(&spec).and_then(|mut route| {
            route.elevation_profile = self.settings.elevation.clone();
            self.expand_route(&route)
        });
        match result {
            Ok(points) => points,
            Err(err) => {
                warn!(
                    trace_id = %self.trace_id,
                    error = %err,
                    distance_m,
                    is_loop,
                    "route generation failed"
                );
                Vec::new()
            }
        }
    }

    /// Builds the persisted route document for `spec`.
    pub fn build_route(&mut self, spec: &RouteSpec) -> Result<Route, AppError> {
        geo::validate_point(spec.start)?;
        if !spec.distance_m.is_finite() || spec.distance_m <= 0.0 {
            return Err(AppError::validation(
                format!("Route distance must be positive, got {}", spec.distance_m),
                self.trace_id.as_str(),
            ));
        }

        let start = Waypoint::new(spec.start, "start");
        let (waypoints, end_point) = if spec.is_loop {
            (
                self.loop_anchors(spec.start, spec.distance_m)?,
                Waypoint::new(spec.start, "finish"),
            )
        } else {
            let (anchors, turnaround) = self.out_and_back_anchors(spec.start, spec.distance_m)?;
            (anchors, Waypoint::new(turnaround, "turnaround"))
        };

        Ok(Route {
            name: spec.name.clone(),
            description: spec.description.clone(),
            route_type: spec.route_type.clone(),
            distance: spec.distance_m,
            start_point: start,
            end_point,
            waypoints,
            repeat: 1,
            elevation_profile: ElevationProfile::default(),
        })
    }

    /// Expands a route document into playback points, repeating laps and closing rings.
    pub fn expand_route(&mut self, route: &Route) -> Result<Vec<LocationPoint>, AppError> {
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

        let mut anchors: Vec<GeoPoint> = Vec::with_capacity(route.waypoints.len() * route.repeat as usize + 1);
        for _ in 0..route.repeat {
            anchors.extend(route.waypoints.iter().map(Waypoint::point));
        }
        if route.is_closed() {
            anchors.push(anchors[0]);
        }

        let profile = Some(&route.elevation_profile).filter(|profile| profile.enabled);
        let points = self.expand_anchors(&anchors, profile)?;
        info!(
            trace_id = %self.trace_id,
            route = %route.name,
            points = points.len(),
            "expanded route"
        );
        Ok(points)
    }

    pub fn expand_anchors(
        &mut self,
        anchors: &[GeoPoint],
        profile: Option<&ElevationProfile>,
    ) -> Result<Vec<LocationPoint>, AppError> {
        if anchors.len() < 2 {
            return Err(AppError::insufficient_waypoints(
                anchors.len(),
                self.trace_id.as_str(),
            ));
        }

        let total_segments = anchors.len() - 1;
        let mut points = Vec::new();
        for (segment_index, pair) in anchors.windows(2).enumerate() {
            let (from, to) = (pair[0], pair[1]);
            let segment_m = geo::distance(from, to)?;
            let steps = ((segment_m / POINT_SPACING_M).round() as usize).max(1);

            for step in 0..=steps {
                let progress = step as f64 / steps as f64;
                let position = self
                    .settings
                    .jitter
                    .apply(&mut self.rng, geo::interpolate(from, to, progress));
                let altitude = match profile {
                    Some(profile) => {
                        self.sample_altitude(profile, progress, segment_index, total_segments)
                    }
                    None => self.settings.default_altitude,
                };
                points.push(LocationPoint {
                    latitude: position.latitude,
                    longitude: position.longitude,
                    altitude,
                    segment_index,
                    progress,
                });
            }
        }
        Ok(points)
    }

    fn sample_altitude(
        &mut self,
        profile: &ElevationProfile,
        progress: f64,
        segment_index: usize,
        total_segments: usize,
    ) -> f64 {
        let amplitude = profile.amplitude();
        let phase = 2.0 * PI * (progress + segment_index as f64 / total_segments as f64);
        let noise = amplitude * profile.variation * self.rng.gen_range(-1.0..=1.0);
        profile.base() + amplitude * phase.sin() + noise
    }

    /// Anchors evenly spaced on a circle centered at `start` whose circumference is
    /// `distance_m`. The ring is left open; route expansion closes it.
    fn loop_anchors(&self, start: GeoPoint, distance_m: f64) -> Result<Vec<Waypoint>, AppError> {
        let count = self.settings.num_anchor_points;
        if count < 2 {
            return Err(AppError::insufficient_waypoints(count, self.trace_id.as_str()));
        }
        let radius = distance_m / (2.0 * PI);
        let anchors = (0..count)
            .map(|index| {
                let angle = 2.0 * PI * index as f64 / count as f64;
                let (d_lat, d_lon) = geo::metric_offset_to_degrees(
                    radius * angle.sin(),
                    radius * angle.cos(),
                    start.latitude,
                );
                let point = GeoPoint::new(start.latitude + d_lat, start.longitude + d_lon);
                geo::validate_point(point)?;
                Ok(Waypoint::new(point, format!("waypoint {index}")))
            })
            .collect::<Result<Vec<_>, AppError>>()?;
        debug!(trace_id = %self.trace_id, radius, anchors = anchors.len(), "loop anchors");
        Ok(anchors)
    }

    /// start, midpoint, turnaround, midpoint, start along a random bearing.
    fn out_and_back_anchors(
        &mut self,
        start: GeoPoint,
        distance_m: f64,
    ) -> Result<(Vec<Waypoint>, GeoPoint), AppError> {
        let bearing = self.rng.gen_range(0.0..360.0);
        let turnaround = geo::destination(start, bearing, distance_m / 2.0)?;
        let midpoint = geo::interpolate(start, turnaround, 0.5);
        debug!(trace_id = %self.trace_id, bearing, "out-and-back bearing");
        let anchors = vec![
            Waypoint::new(start, "start"),
            Waypoint::new(midpoint, "midpoint"),
            Waypoint::new(turnaround, "turnaround"),
            Waypoint::new(midpoint, "midpoint"),
            Waypoint::new(start, "finish"),
        ];
        Ok((anchors, turnaround))
    }
}

/// Sum of consecutive-point distances in meters.
pub fn path_distance(points: &[LocationPoint]) -> f64 {
    points
        .windows(2)
        .filter_map(|pair| geo::distance(pair[0].point(), pair[1].point()).ok())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::error::ErrorKind;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const WUHAN: GeoPoint = GeoPoint {
        latitude: 30.52,
        longitude: 114.36,
    };

    fn seeded(settings: GeneratorSettings) -> RouteGenerator<StdRng> {
        RouteGenerator::with_rng(settings, StdRng::seed_from_u64(42), "test")
    }

    fn without_jitter() -> GeneratorSettings {
        GeneratorSettings {
            jitter: Jitter::none(),
            ..GeneratorSettings::default()
        }
    }

    #[test]
    fn loop_route_is_closed_within_jitter() {
        let mut generator = seeded(GeneratorSettings::default());
        let points = generator.generate_route(WUHAN, 3000.0, true);
        assert!(!points.is_empty());
        let first = points.first().unwrap().point();
        let last = points.last().unwrap().point();
        assert!(geo::distance(first, last).unwrap() < 1.5);
    }

    #[test]
    fn loop_route_length_is_close_to_target() {
        for distance in [400.0, 3000.0, 8000.0] {
            let mut generator = seeded(GeneratorSettings::default());
            let points = generator.generate_route(WUHAN, distance, true);
            let walked = path_distance(&points);
            assert!(
                ((walked - distance) / distance).abs() < 0.05,
                "target {distance}, walked {walked}"
            );
        }
    }

    #[test]
    fn out_and_back_length_matches_target() {
        let mut generator = seeded(without_jitter());
        let points = generator.generate_route(WUHAN, 3000.0, false);
        let walked = path_distance(&points);
        assert!((walked - 3000.0).abs() < 3.0, "walked {walked}");

        let first = points.first().unwrap().point();
        let last = points.last().unwrap().point();
        assert!(geo::distance(first, last).unwrap() < 1e-6);
    }

    #[test]
    fn out_and_back_document_has_five_anchors() {
        let mut generator = seeded(without_jitter());
        let route = generator
            .build_route(&RouteSpec {
                name: "river".to_string(),
                description: "there and back".to_string(),
                route_type: "running".to_string(),
                start: WUHAN,
                distance_m: 2000.0,
                is_loop: false,
            })
            .unwrap();
        let names: Vec<&str> = route.waypoints.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, ["start", "midpoint", "turnaround", "midpoint", "finish"]);
        assert!(!route.is_closed());
        let half = geo::distance(route.start_point.point(), route.end_point.point()).unwrap();
        assert!((half - 1000.0).abs() < 1e-6);
    }

    #[test]
    fn loop_document_uses_configured_anchor_count() {
        let mut generator = seeded(GeneratorSettings {
            num_anchor_points: 12,
            ..without_jitter()
        });
        let route = generator
            .build_route(&RouteSpec {
                name: "track".to_string(),
                description: String::new(),
                route_type: "running".to_string(),
                start: WUHAN,
                distance_m: 400.0,
                is_loop: true,
            })
            .unwrap();
        assert_eq!(route.waypoints.len(), 12);
        assert!(route.is_closed());
    }

    #[test]
    fn loop_anchors_ring_the_start_beginning_due_east() {
        let mut generator = seeded(without_jitter());
        let route = generator
            .build_route(&RouteSpec {
                name: "ring".to_string(),
                description: String::new(),
                route_type: "running".to_string(),
                start: WUHAN,
                distance_m: 3000.0,
                is_loop: true,
            })
            .unwrap();
        let radius = 3000.0 / (2.0 * PI);

        let first = route.waypoints[0].point();
        assert_eq!(first.latitude, WUHAN.latitude);
        assert!(first.longitude > WUHAN.longitude);
        for waypoint in &route.waypoints {
            let offset = geo::distance(WUHAN, waypoint.point()).unwrap();
            assert!((offset - radius).abs() / radius < 0.005, "{}: {offset}", waypoint.name);
        }
        let quarter = route.waypoints[2].point();
        assert!(quarter.latitude > WUHAN.latitude);
        assert!((quarter.longitude - WUHAN.longitude).abs() < 1e-9);
    }

    #[test]
    fn segments_get_one_point_per_ten_meters() {
        let mut generator = seeded(without_jitter());
        let a = WUHAN;
        let b = geo::destination(a, 90.0, 104.0).unwrap();
        let points = generator.expand_anchors(&[a, b], None).unwrap();
        // round(10.4) = 10 steps, 11 samples including both ends
        assert_eq!(points.len(), 11);
        assert_eq!(points[0].progress, 0.0);
        assert_eq!(points[10].progress, 1.0);
        assert!(points.iter().all(|p| p.altitude == 10.0 && p.segment_index == 0));
    }

    #[test]
    fn short_segment_still_yields_two_points() {
        let mut generator = seeded(without_jitter());
        let points = generator.expand_anchors(&[WUHAN, WUHAN], None).unwrap();
        assert_eq!(points.len(), 2);
    }

    #[test]
    fn elevation_stays_inside_profile_band() {
        let mut generator = seeded(GeneratorSettings::default());
        let points = generator.generate_route(WUHAN, 1000.0, true);
        let profile = ElevationProfile::default();
        let slack = profile.amplitude() * profile.variation;
        assert!(points.iter().all(|p| {
            p.altitude >= profile.min_elevation - slack - 1e-9
                && p.altitude <= profile.max_elevation + slack + 1e-9
        }));
        assert!(points.iter().any(|p| p.altitude > profile.base()));
        assert!(points.iter().any(|p| p.altitude < profile.base()));
    }

    #[test]
    fn repeat_replicates_laps() {
        let mut generator = seeded(without_jitter());
        let mut route = generator
            .build_route(&RouteSpec {
                name: "laps".to_string(),
                description: String::new(),
                route_type: "running".to_string(),
                start: WUHAN,
                distance_m: 1000.0,
                is_loop: true,
            })
            .unwrap();
        let one_lap = path_distance(&generator.expand_route(&route).unwrap());
        route.repeat = 3;
        let three_laps = path_distance(&generator.expand_route(&route).unwrap());
        assert!((three_laps - 3.0 * one_lap).abs() < 1.0);
    }

    #[test]
    fn fewer_than_two_waypoints_is_rejected() {
        let mut generator = seeded(GeneratorSettings::default());
        let mut route = generator
            .build_route(&RouteSpec {
                name: "broken".to_string(),
                description: String::new(),
                route_type: String::new(),
                start: WUHAN,
                distance_m: 500.0,
                is_loop: true,
            })
            .unwrap();
        route.waypoints.truncate(1);
        let err = generator.expand_route(&route).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InsufficientWaypoints);

        let err = generator.expand_anchors(&[WUHAN], None).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InsufficientWaypoints);
    }

    #[test]
    fn invalid_input_yields_empty_sequence() {
        let mut generator = seeded(GeneratorSettings::default());
        assert!(generator.generate_route(WUHAN, 0.0, true).is_empty());
        assert!(generator.generate_route(WUHAN, f64::NAN, false).is_empty());
        assert!(generator
            .generate_route(GeoPoint::new(f64::NAN, 114.36), 1000.0, true)
            .is_empty());

        let mut degenerate = seeded(GeneratorSettings {
            num_anchor_points: 1,
            ..GeneratorSettings::default()
        });
        assert!(degenerate.generate_route(WUHAN, 1000.0, true).is_empty());
    }
}
