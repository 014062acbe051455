use std::rc::Rc;
use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use tracing::info;

use crate::app::clock::Clock;
use crate::app::geo::GeoPoint;
use crate::app::location::{LocationInjector, DEFAULT_MOVE_STEPS};
use crate::app::route::LocationPoint;

pub const DEFAULT_MAX_STEP_WAIT: Duration = Duration::from_secs(3);

/// Anything that accepts one coordinate at a time.
pub trait LocationSink {
    fn set_location(&mut self, latitude: f64, longitude: f64, altitude: f64) -> bool;

    /// Travels to the coordinate at `speed_mps`, or the sink's own default speed. Sinks
    /// that cannot interpolate jump straight there.
    fn move_to(
        &mut self,
        latitude: f64,
        longitude: f64,
        altitude: f64,
        _speed_mps: Option<f64>,
    ) -> bool {
        self.set_location(latitude, longitude, altitude)
    }
}

impl<R: Rng> LocationSink for LocationInjector<R> {
    fn set_location(&mut self, latitude: f64, longitude: f64, altitude: f64) -> bool {
        LocationInjector::set_location(self, latitude, longitude, altitude)
    }

    fn move_to(
        &mut self,
        latitude: f64,
        longitude: f64,
        altitude: f64,
        speed_mps: Option<f64>,
    ) -> bool {
        LocationInjector::move_to(
            self,
            GeoPoint::new(latitude, longitude),
            altitude,
            speed_mps,
            DEFAULT_MOVE_STEPS,
        )
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PlaybackProgress {
    pub index: usize,
    pub total: usize,
    pub percent: f64,
    pub point: LocationPoint,
    pub accepted: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PlaybackReport {
    pub total_points: usize,
    pub issued: usize,
    pub failed: usize,
    pub stopped_early: bool,
    #[serde(with = "duration_secs")]
    pub elapsed: Duration,
    pub last_progress: f64,
    /// Points the sink accepted, in order.
    #[serde(skip)]
    pub sent: Vec<LocationPoint>,
}

mod duration_secs {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }
}

pub struct PlaybackDriver {
    clock: Rc<dyn Clock>,
    max_step_wait: Duration,
    trace_id: String,
}

impl PlaybackDriver {
    pub fn new(clock: Rc<dyn Clock>, max_step_wait: Duration, trace_id: impl Into<String>) -> Self {
        Self {
            clock,
            max_step_wait,
            trace_id: trace_id.into(),
        }
    }

    /// Feeds `points` to `sink` in order, pacing so the whole route fits `target_duration`.
    /// Wall-clock time wins over point count: once the budget is spent the rest of the
    /// route is dropped.
    pub fn play(
        &self,
        sink: &mut dyn LocationSink,
        points: &[LocationPoint],
        target_duration: Duration,
        mut observer: Option<&mut dyn FnMut(&PlaybackProgress)>,
    ) -> PlaybackReport {
        let total = points.len();
        let mut report = PlaybackReport {
            total_points: total,
            ..PlaybackReport::default()
        };
        if total == 0 {
            return report;
        }

        let step_wait = self
            .max_step_wait
            .min(target_duration.div_f64(total as f64));
        let start = self.clock.now();
        info!(
            trace_id = %self.trace_id,
            points = total,
            target_secs = target_duration.as_secs_f64(),
            step_wait_secs = step_wait.as_secs_f64(),
            "starting playback"
        );

        for (index, point) in points.iter().enumerate() {
            let elapsed = self.clock.now().saturating_sub(start);
            if elapsed >= target_duration {
                info!(trace_id = %self.trace_id, index, "playback time budget reached");
                report.stopped_early = true;
                break;
            }

            let accepted = sink.set_location(point.latitude, point.longitude, point.altitude);
            self.record(&mut report, index, point, accepted, &mut observer);

            if index + 1 < total {
                self.clock.sleep(step_wait);
            }
        }

        self.finish(report, start)
    }

    /// Moves through `points` at walking speed instead of a fixed cadence: the first point
    /// is set directly, every later one is reached through [`LocationSink::move_to`]. The
    /// `target_duration` budget still cuts the route short.
    pub fn walk(
        &self,
        sink: &mut dyn LocationSink,
        points: &[LocationPoint],
        speed_mps: Option<f64>,
        target_duration: Duration,
        mut observer: Option<&mut dyn FnMut(&PlaybackProgress)>,
    ) -> PlaybackReport {
        let total = points.len();
        let mut report = PlaybackReport {
            total_points: total,
            ..PlaybackReport::default()
        };
        if total == 0 {
            return report;
        }

        let start = self.clock.now();
        info!(
            trace_id = %self.trace_id,
            points = total,
            target_secs = target_duration.as_secs_f64(),
            speed_mps = ?speed_mps,
            "starting speed-paced playback"
        );

        for (index, point) in points.iter().enumerate() {
            let elapsed = self.clock.now().saturating_sub(start);
            if elapsed >= target_duration {
                info!(trace_id = %self.trace_id, index, "playback time budget reached");
                report.stopped_early = true;
                break;
            }

            let accepted = if index == 0 {
                sink.set_location(point.latitude, point.longitude, point.altitude)
            } else {
                sink.move_to(point.latitude, point.longitude, point.altitude, speed_mps)
            };
            self.record(&mut report, index, point, accepted, &mut observer);
        }

        self.finish(report, start)
    }

    fn record(
        &self,
        report: &mut PlaybackReport,
        index: usize,
        point: &LocationPoint,
        accepted: bool,
        observer: &mut Option<&mut dyn FnMut(&PlaybackProgress)>,
    ) {
        report.issued += 1;
        if accepted {
            report.sent.push(*point);
        } else {
            report.failed += 1;
        }

        let total = report.total_points;
        let percent = ((index + 1) as f64 / total as f64 * 100.0).min(100.0);
        report.last_progress = percent;
        info!(trace_id = %self.trace_id, progress = percent, "playback progress");
        if let Some(observer) = observer.as_mut() {
            observer(&PlaybackProgress {
                index,
                total,
                percent,
                point: *point,
                accepted,
            });
        }
    }

    fn finish(&self, mut report: PlaybackReport, start: Duration) -> PlaybackReport {
        report.elapsed = self.clock.now().saturating_sub(start);
        info!(
            trace_id = %self.trace_id,
            issued = report.issued,
            failed = report.failed,
            stopped_early = report.stopped_early,
            elapsed_secs = report.elapsed.as_secs_f64(),
            "playback finished"
        );
        report
    }
}
