use std::path::Path;

use chrono::{Local, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use tracing::{debug, info};

use crate::app::error::AppError;
use crate::app::models::ActivityType;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const SCHEMA: &str = "PRAGMA foreign_keys = ON;
     CREATE TABLE IF NOT EXISTS exercise_records (
       id INTEGER PRIMARY KEY AUTOINCREMENT,
       activity_type INTEGER NOT NULL,
       activity_name TEXT NOT NULL,
       distance REAL NOT NULL,
       duration INTEGER NOT NULL,
       avg_speed REAL,
       avg_heart_rate INTEGER,
       calories INTEGER,
       timestamp TEXT NOT NULL,
       notes TEXT,
       route_name TEXT,
       created_at TEXT NOT NULL
     );
     CREATE TABLE IF NOT EXISTS location_points (
       id INTEGER PRIMARY KEY AUTOINCREMENT,
       record_id INTEGER NOT NULL,
       latitude REAL NOT NULL,
       longitude REAL NOT NULL,
       altitude REAL,
       heart_rate INTEGER,
       speed REAL,
       timestamp TEXT NOT NULL,
       FOREIGN KEY (record_id) REFERENCES exercise_records (id) ON DELETE CASCADE
     );
     CREATE INDEX IF NOT EXISTS idx_points_record ON location_points(record_id);
     CREATE INDEX IF NOT EXISTS idx_records_timestamp ON exercise_records(timestamp);
    ";

const RECORD_COLUMNS: &str = "id, activity_type, activity_name, distance, duration, avg_speed, \
     avg_heart_rate, calories, timestamp, notes, route_name, created_at";

pub fn format_timestamp(value: NaiveDateTime) -> String {
    value.format(TIMESTAMP_FORMAT).to_string()
}

#[derive(Debug, Clone)]
pub struct NewRecord {
    pub activity: ActivityType,
    pub distance_m: f64,
    pub duration_s: i64,
    pub avg_speed: Option<f64>,
    pub avg_heart_rate: Option<i64>,
    pub calories: Option<i64>,
    pub timestamp: NaiveDateTime,
    pub notes: Option<String>,
    pub route_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExerciseRecord {
    pub id: i64,
    pub activity_type: i64,
    pub activity_name: String,
    pub distance: f64,
    pub duration: i64,
    pub avg_speed: Option<f64>,
    pub avg_heart_rate: Option<i64>,
    pub calories: Option<i64>,
    pub timestamp: String,
    pub notes: Option<String>,
    pub route_name: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RecordedPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    pub heart_rate: Option<i64>,
    pub speed: Option<f64>,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ActivityTotals {
    pub activity_type: i64,
    pub activity_name: String,
    pub count: i64,
    pub distance: f64,
    pub duration: i64,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct HistoryStats {
    pub total_records: i64,
    pub total_distance: f64,
    pub total_duration: i64,
    pub avg_speed: Option<f64>,
    pub avg_heart_rate: Option<f64>,
    pub total_calories: i64,
    pub by_activity: Vec<ActivityTotals>,
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<ExerciseRecord> {
    Ok(ExerciseRecord {
        id: row.get(0)?,
        activity_type: row.get(1)?,
        activity_name: row.get(2)?,
        distance: row.get(3)?,
        duration: row.get(4)?,
        avg_speed: row.get(5)?,
        avg_heart_rate: row.get(6)?,
        calories: row.get(7)?,
        timestamp: row.get(8)?,
        notes: row.get(9)?,
        route_name: row.get(10)?,
        created_at: row.get(11)?,
    })
}

/// Completed exercise sessions and the points walked during them.
pub struct HistoryDatabase {
    connection: Connection,
    trace_id: String,
}

impl HistoryDatabase {
    pub fn open(path: &Path, trace_id: impl Into<String>) -> Result<Self, AppError> {
        let trace_id = trace_id.into();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|err| {
                AppError::system(format!("Failed to create history dir: {err}"), trace_id.as_str())
            })?;
        }
        let connection = Connection::open(path).map_err(|err| {
            AppError::system(format!("Failed to open history db: {err}"), trace_id.as_str())
        })?;
        Self::init(connection, trace_id)
    }

    pub fn open_in_memory(trace_id: impl Into<String>) -> Result<Self, AppError> {
        let trace_id = trace_id.into();
        let connection = Connection::open_in_memory().map_err(|err| {
            AppError::system(format!("Failed to open history db: {err}"), trace_id.as_str())
        })?;
        Self::init(connection, trace_id)
    }

    fn init(connection: Connection, trace_id: String) -> Result<Self, AppError> {
        connection.execute_batch(SCHEMA).map_err(|err| {
            AppError::system(
                format!("Failed to initialize history db: {err}"),
                trace_id.as_str(),
            )
        })?;
        Ok(Self {
            connection,
            trace_id,
        })
    }

    fn db_error(&self, action: &str, err: rusqlite::Error) -> AppError {
        AppError::system(format!("Failed to {action}: {err}"), self.trace_id.as_str())
    }

    pub fn add_record(&self, record: &NewRecord) -> Result<i64, AppError> {
        let created_at = format_timestamp(Local::now().naive_local());
        self.connection
            .execute(
                "INSERT INTO exercise_records (
                   activity_type, activity_name, distance, duration, avg_speed,
                   avg_heart_rate, calories, timestamp, notes, route_name, created_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    record.activity.code() as i64,
                    record.activity.display_name(),
                    record.distance_m,
                    record.duration_s,
                    record.avg_speed,
                    record.avg_heart_rate,
                    record.calories,
                    format_timestamp(record.timestamp),
                    record.notes,
                    record.route_name,
                    created_at,
                ],
            )
            .map_err(|err| self.db_error("insert exercise record", err))?;
        let id = self.connection.last_insert_rowid();
        info!(trace_id = %self.trace_id, record_id = id, activity = record.activity.display_name(), "saved exercise record");
        Ok(id)
    }

    /// Inserts all points in one transaction. Returns the number written.
    pub fn add_location_points(
        &mut self,
        record_id: i64,
        points: &[RecordedPoint],
    ) -> Result<usize, AppError> {
        let trace_id = self.trace_id.clone();
        let tx = self
            .connection
            .transaction()
            .map_err(|err| AppError::system(format!("Failed to start history transaction: {err}"), trace_id.as_str()))?;
        {
            let mut insert = tx
                .prepare(
                    "INSERT INTO location_points (
                       record_id, latitude, longitude, altitude, heart_rate, speed, timestamp
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                )
                .map_err(|err| AppError::system(format!("Failed to prepare point insert: {err}"), trace_id.as_str()))?;
            for point in points {
                insert
                    .execute(params![
                        record_id,
                        point.latitude,
                        point.longitude,
                        point.altitude,
                        point.heart_rate,
                        point.speed,
                        point.timestamp,
                    ])
                    .map_err(|err| AppError::system(format!("Failed to insert location point: {err}"), trace_id.as_str()))?;
            }
        }
        tx.commit()
            .map_err(|err| AppError::system(format!("Failed to commit location points: {err}"), trace_id.as_str()))?;
        debug!(trace_id = %trace_id, record_id, points = points.len(), "saved location points");
        Ok(points.len())
    }

    /// Newest first.
    pub fn get_records(
        &self,
        limit: usize,
        offset: usize,
        activity: Option<ActivityType>,
    ) -> Result<Vec<ExerciseRecord>, AppError> {
        let activity_code = activity.map(|activity| activity.code() as i64);
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM exercise_records
             WHERE (?1 IS NULL OR activity_type = ?1)
             ORDER BY timestamp DESC, id DESC
             LIMIT ?2 OFFSET ?3"
        );
        let mut stmt = self
            .connection
            .prepare(&sql)
            .map_err(|err| self.db_error("prepare record query", err))?;
        let rows = stmt
            .query_map(
                params![activity_code, limit as i64, offset as i64],
                record_from_row,
            )
            .map_err(|err| self.db_error("query records", err))?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row.map_err(|err| self.db_error("read record row", err))?);
        }
        Ok(records)
    }

    pub fn get_record(&self, id: i64) -> Result<Option<ExerciseRecord>, AppError> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM exercise_records WHERE id = ?1");
        self.connection
            .query_row(&sql, params![id], record_from_row)
            .optional()
            .map_err(|err| self.db_error("query record", err))
    }

    pub fn get_location_points(&self, record_id: i64) -> Result<Vec<RecordedPoint>, AppError> {
        let mut stmt = self
            .connection
            .prepare(
                "SELECT latitude, longitude, altitude, heart_rate, speed, timestamp
                 FROM location_points WHERE record_id = ?1 ORDER BY id",
            )
            .map_err(|err| self.db_error("prepare point query", err))?;
        let rows = stmt
            .query_map(params![record_id], |row| {
                Ok(RecordedPoint {
                    latitude: row.get(0)?,
                    longitude: row.get(1)?,
                    altitude: row.get(2)?,
                    heart_rate: row.get(3)?,
                    speed: row.get(4)?,
                    timestamp: row.get(5)?,
                })
            })
            .map_err(|err| self.db_error("query points", err))?;
        let mut points = Vec::new();
        for row in rows {
            points.push(row.map_err(|err| self.db_error("read point row", err))?);
        }
        Ok(points)
    }

    /// Removes a record and, through the foreign key, its points.
    pub fn delete_record(&self, id: i64) -> Result<bool, AppError> {
        let deleted = self
            .connection
            .execute("DELETE FROM exercise_records WHERE id = ?1", params![id])
            .map_err(|err| self.db_error("delete record", err))?;
        Ok(deleted > 0)
    }

    pub fn statistics(&self, activity: Option<ActivityType>) -> Result<HistoryStats, AppError> {
        let activity_code = activity.map(|activity| activity.code() as i64);
        let mut stats = self
            .connection
            .query_row(
                "SELECT COUNT(*), COALESCE(SUM(distance), 0.0), COALESCE(SUM(duration), 0),
                        AVG(avg_speed), AVG(avg_heart_rate), COALESCE(SUM(calories), 0)
                 FROM exercise_records WHERE (?1 IS NULL OR activity_type = ?1)",
                params![activity_code],
                |row| {
                    Ok(HistoryStats {
                        total_records: row.get(0)?,
                        total_distance: row.get(1)?,
                        total_duration: row.get(2)?,
                        avg_speed: row.get(3)?,
                        avg_heart_rate: row.get(4)?,
                        total_calories: row.get(5)?,
                        by_activity: Vec::new(),
                    })
                },
            )
            .map_err(|err| self.db_error("compute statistics", err))?;

        let mut stmt = self
            .connection
            .prepare(
                "SELECT activity_type, MAX(activity_name), COUNT(*), SUM(distance), SUM(duration)
                 FROM exercise_records WHERE (?1 IS NULL OR activity_type = ?1)
                 GROUP BY activity_type ORDER BY COUNT(*) DESC, activity_type",
            )
            .map_err(|err| self.db_error("prepare activity totals", err))?;
        let rows = stmt
            .query_map(params![activity_code], |row| {
                Ok(ActivityTotals {
                    activity_type: row.get(0)?,
                    activity_name: row.get(1)?,
                    count: row.get(2)?,
                    distance: row.get(3)?,
                    duration: row.get(4)?,
                })
            })
            .map_err(|err| self.db_error("query activity totals", err))?;
        for row in rows {
            stats
                .by_activity
                .push(row.map_err(|err| self.db_error("read activity totals", err))?);
        }
        Ok(stats)
    }
}
