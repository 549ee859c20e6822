use std::collections::BTreeSet;
use std::path::Path;

use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::model::TrackRecord;

pub const TRACK_TABLE: &str = "gpx_data";

const POINT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f%:z";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open track store {path}")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("track store {operation} failed")]
    Sqlite {
        operation: &'static str,
        #[source]
        source: rusqlite::Error,
    },
}

impl StoreError {
    fn sqlite(operation: &'static str) -> impl FnOnce(rusqlite::Error) -> Self {
        move |source| Self::Sqlite { operation, source }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivitySummary {
    pub activity_type: String,
    pub tracks: i64,
    pub rows: i64,
}

/// Append-only point storage keyed by track name.
///
/// Every operation reports failures as [`StoreError`]; callers that prefer the
/// "no data" view of a failed read wrap the call in [`or_empty`].
pub trait PointStore {
    /// Creates the track table when it is missing. Returns whether it was created.
    fn ensure_schema(&mut self) -> Result<bool, StoreError>;

    fn known_track_names(&self) -> Result<BTreeSet<String>, StoreError>;

    /// Writes all rows of one track in a single transaction and returns the row count.
    /// A track without points is stored as one placeholder row.
    fn insert_track(&mut self, record: &TrackRecord) -> Result<usize, StoreError>;

    /// Distinct track names with a stored date inside `[start, end]` and an exactly
    /// matching activity, earliest first.
    fn activity_tracks_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        activity_type: &str,
    ) -> Result<Vec<String>, StoreError>;

    /// `(latitude, longitude)` pairs in ascending stored time.
    fn points_for_track(&self, track_name: &str) -> Result<Vec<(f64, f64)>, StoreError>;

    fn earliest_time_for_track(&self, track_name: &str) -> Result<Option<String>, StoreError>;

    fn row_count(&self) -> Result<i64, StoreError>;

    fn activity_summary(&self) -> Result<Vec<ActivitySummary>, StoreError>;
}

/// Logs a failed read and hands back an empty result instead.
pub fn or_empty<T: Default>(operation: &str, result: Result<T, StoreError>) -> T {
    match result {
        Ok(value) => value,
        Err(err) => {
            let cause = std::error::Error::source(&err).map(|source| source.to_string());
            warn!(
                operation = %operation,
                error = %err,
                cause = %cause.unwrap_or_default(),
                "store query failed, returning no rows"
            );
            T::default()
        }
    }
}

pub struct SqliteStore {
    connection: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let connection = Connection::open(path).map_err(|source| StoreError::Open {
            path: path.display().to_string(),
            source,
        })?;
        configure_connection(&connection)?;
        debug!(path = %path.display(), "opened track store");
        Ok(Self { connection })
    }

    #[cfg(test)]
    pub(crate) fn open_in_memory() -> Result<Self, StoreError> {
        let connection = Connection::open_in_memory().map_err(|source| StoreError::Open {
            path: ":memory:".to_string(),
            source,
        })?;
        Ok(Self { connection })
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.connection
    }

    fn table_exists(&self) -> Result<bool, StoreError> {
        let found = self
            .connection
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [TRACK_TABLE],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(StoreError::sqlite("schema lookup"))?;
        Ok(found.is_some())
    }
}

fn configure_connection(connection: &Connection) -> Result<(), StoreError> {
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .map_err(StoreError::sqlite("set journal_mode=WAL"))?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .map_err(StoreError::sqlite("set synchronous=NORMAL"))?;
    Ok(())
}

impl PointStore for SqliteStore {
    fn ensure_schema(&mut self) -> Result<bool, StoreError> {
        if self.table_exists()? {
            debug!(table = TRACK_TABLE, "track table already present");
            return Ok(false);
        }

        self.connection
            .execute_batch(
                "
                CREATE TABLE gpx_data (
                  id INTEGER PRIMARY KEY AUTOINCREMENT,
                  track_name TEXT,
                  latitude REAL,
                  longitude REAL,
                  elevation REAL,
                  time TEXT,
                  activity_type TEXT
                );

                CREATE INDEX idx_gpx_data_track_name ON gpx_data(track_name);
                ",
            )
            .map_err(StoreError::sqlite("create track table"))?;

        info!(table = TRACK_TABLE, "created track table");
        Ok(true)
    }

    fn known_track_names(&self) -> Result<BTreeSet<String>, StoreError> {
        let mut statement = self
            .connection
            .prepare("SELECT DISTINCT track_name FROM gpx_data WHERE track_name IS NOT NULL")
            .map_err(StoreError::sqlite("list track names"))?;

        let names = statement
            .query_map([], |row| row.get::<_, String>(0))
            .and_then(|rows| rows.collect::<rusqlite::Result<BTreeSet<_>>>())
            .map_err(StoreError::sqlite("list track names"))?;

        Ok(names)
    }

    fn insert_track(&mut self, record: &TrackRecord) -> Result<usize, StoreError> {
        let tx = self
            .connection
            .transaction()
            .map_err(StoreError::sqlite("begin track insert"))?;

        let mut inserted = 0;
        {
            let mut statement = tx
                .prepare(
                    "
                    INSERT INTO gpx_data(track_name, latitude, longitude, elevation, time, activity_type)
                    VALUES(?1, ?2, ?3, ?4, ?5, ?6)
                    ",
                )
                .map_err(StoreError::sqlite("prepare track insert"))?;

            if record.points.is_empty() {
                statement
                    .execute(params![
                        record.track_name,
                        "",
                        "",
                        "",
                        record.fallback_date(),
                        record.activity_type,
                    ])
                    .map_err(StoreError::sqlite("insert placeholder row"))?;
                inserted = 1;
            }

            for point in &record.points {
                let time = point
                    .time
                    .map(|time| time.format(POINT_TIME_FORMAT).to_string());
                statement
                    .execute(params![
                        record.track_name,
                        point.latitude,
                        point.longitude,
                        point.elevation,
                        time,
                        record.activity_type,
                    ])
                    .map_err(StoreError::sqlite("insert track point"))?;
                inserted += 1;
            }
        }

        tx.commit().map_err(StoreError::sqlite("commit track insert"))?;
        Ok(inserted)
    }

    fn activity_tracks_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        activity_type: &str,
    ) -> Result<Vec<String>, StoreError> {
        if start > end {
            return Ok(Vec::new());
        }

        let mut statement = self
            .connection
            .prepare(
                "
                SELECT track_name, MIN(time) AS first_time
                FROM gpx_data
                WHERE activity_type = ?3
                  AND substr(time, 1, 10) BETWEEN ?1 AND ?2
                GROUP BY track_name
                ORDER BY first_time ASC, track_name ASC
                ",
            )
            .map_err(StoreError::sqlite("select activity tracks"))?;

        let names = statement
            .query_map(
                params![
                    start.format("%Y-%m-%d").to_string(),
                    end.format("%Y-%m-%d").to_string(),
                    activity_type
                ],
                |row| row.get::<_, String>(0),
            )
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
            .map_err(StoreError::sqlite("select activity tracks"))?;

        Ok(names)
    }

    fn points_for_track(&self, track_name: &str) -> Result<Vec<(f64, f64)>, StoreError> {
        let mut statement = self
            .connection
            .prepare(
                "
                SELECT latitude, longitude
                FROM gpx_data
                WHERE track_name = ?1
                  AND typeof(latitude) = 'real'
                  AND typeof(longitude) = 'real'
                ORDER BY time ASC, id ASC
                ",
            )
            .map_err(StoreError::sqlite("select track points"))?;

        let points = statement
            .query_map([track_name], |row| {
                Ok((row.get::<_, f64>(0)?, row.get::<_, f64>(1)?))
            })
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
            .map_err(StoreError::sqlite("select track points"))?;

        Ok(points)
    }

    fn earliest_time_for_track(&self, track_name: &str) -> Result<Option<String>, StoreError> {
        self.connection
            .query_row(
                "SELECT MIN(time) FROM gpx_data WHERE track_name = ?1",
                [track_name],
                |row| row.get::<_, Option<String>>(0),
            )
            .map_err(StoreError::sqlite("select earliest time"))
    }

    fn row_count(&self) -> Result<i64, StoreError> {
        self.connection
            .query_row("SELECT COUNT(*) FROM gpx_data", [], |row| row.get(0))
            .map_err(StoreError::sqlite("count rows"))
    }

    fn activity_summary(&self) -> Result<Vec<ActivitySummary>, StoreError> {
        let mut statement = self
            .connection
            .prepare(
                "
                SELECT COALESCE(activity_type, ''), COUNT(DISTINCT track_name), COUNT(*)
                FROM gpx_data
                GROUP BY activity_type
                ORDER BY activity_type ASC
                ",
            )
            .map_err(StoreError::sqlite("summarize activities"))?;

        let summary = statement
            .query_map([], |row| {
                Ok(ActivitySummary {
                    activity_type: row.get(0)?,
                    tracks: row.get(1)?,
                    rows: row.get(2)?,
                })
            })
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
            .map_err(StoreError::sqlite("summarize activities"))?;

        Ok(summary)
    }
}
