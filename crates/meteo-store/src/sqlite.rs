//! SQLite-based observation storage.
//!
//! This module provides `SqliteWeatherStore`, the rusqlite implementation of
//! the `WeatherBackend` trait. Timestamps are stored as fixed-width RFC 3339
//! UTC text with microsecond precision so that lexical order is time order.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::functions::FunctionFlags;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

use crate::backend::{
    validate_new, validate_update, ObservationError, ObservationResult, WeatherBackend,
};
use crate::bucket::BucketPlan;
use crate::observation::{
    DailyBucket, HourlyBucket, NewObservation, ObservationUpdate, WeatherObservation,
};

const SELECT_COLUMNS: &str =
    "SELECT id, city, temperature, humidity, description, timestamp FROM weather_data";

/// SQLite-based weather observation storage.
pub struct SqliteWeatherStore {
    conn: Connection,
}

impl SqliteWeatherStore {
    /// Open a store at the given path.
    ///
    /// Creates the database file and schema if they don't exist.
    pub fn new<P: AsRef<Path>>(path: P) -> rusqlite::Result<Self> {
        let conn = Connection::open(path)?;
        Self::register_functions(&conn)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> rusqlite::Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::register_functions(&conn)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Register `unicode_lower`, a full Unicode lowercase. SQLite's own
    /// `lower()` and `LIKE` only fold ASCII.
    fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
        conn.create_scalar_function(
            "unicode_lower",
            1,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            |ctx| {
                let text: Option<String> = ctx.get(0)?;
                Ok(text.map(|t| t.to_lowercase()))
            },
        )
    }

    /// Initialize the database schema.
    fn init_schema(&self) -> rusqlite::Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS weather_data (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                city TEXT NOT NULL,
                temperature REAL NOT NULL,
                humidity INTEGER,
                description TEXT,
                timestamp TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_timestamp_city ON weather_data(timestamp, city);
            CREATE INDEX IF NOT EXISTS idx_temperature_humidity
                ON weather_data(temperature, humidity);
            CREATE INDEX IF NOT EXISTS idx_city_temp_time
                ON weather_data(city, temperature, timestamp);
            "#,
        )?;
        Ok(())
    }

    /// Canonical stored form of a timestamp.
    fn format_timestamp(ts: &DateTime<Utc>) -> String {
        ts.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    idx,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })
    }

    /// Convert a database row to an observation.
    fn row_to_observation(row: &rusqlite::Row) -> rusqlite::Result<WeatherObservation> {
        let timestamp_str: String = row.get(5)?;

        Ok(WeatherObservation {
            id: row.get(0)?,
            city: row.get(1)?,
            temperature: row.get(2)?,
            humidity: row.get(3)?,
            description: row.get(4)?,
            timestamp: Self::parse_timestamp(5, &timestamp_str)?,
        })
    }

    fn bucket_start(row: &rusqlite::Row) -> rusqlite::Result<DateTime<Utc>> {
        let raw: Option<String> = row.get(0)?;
        match raw {
            Some(raw) => Self::parse_timestamp(0, &raw),
            None => Err(rusqlite::Error::InvalidColumnType(
                0,
                "bucket".to_string(),
                rusqlite::types::Type::Null,
            )),
        }
    }

    fn select_by_id(conn: &Connection, id: i64) -> rusqlite::Result<Option<WeatherObservation>> {
        conn.query_row(
            &format!("{SELECT_COLUMNS} WHERE id = ?1"),
            params![id],
            Self::row_to_observation,
        )
        .optional()
    }

    /// Escape LIKE wildcards so a prefix matches literally.
    fn escape_like(prefix: &str) -> String {
        let mut escaped = String::with_capacity(prefix.len() + 1);
        for c in prefix.chars() {
            if matches!(c, '%' | '_' | '\\') {
                escaped.push('\\');
            }
            escaped.push(c);
        }
        escaped.push('%');
        escaped
    }

    /// Check if an observation exists by ID.
    pub fn exists(&self, id: i64) -> ObservationResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM weather_data WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Get the observation count.
    pub fn count(&self) -> ObservationResult<usize> {
        let count: i64 =
            self.conn.query_row("SELECT COUNT(*) FROM weather_data", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

impl WeatherBackend for SqliteWeatherStore {
    fn insert(&self, observation: &NewObservation) -> ObservationResult<WeatherObservation> {
        validate_new(observation)?;

        let timestamp = observation.timestamp.unwrap_or_else(Utc::now).trunc_subsecs(6);

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            r#"
            INSERT INTO weather_data (city, temperature, humidity, description, timestamp)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                observation.city,
                observation.temperature,
                observation.humidity,
                observation.description,
                Self::format_timestamp(&timestamp),
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        tracing::debug!("Inserted observation {} for {}", id, observation.city);

        Ok(WeatherObservation {
            id,
            city: observation.city.clone(),
            temperature: observation.temperature,
            humidity: observation.humidity,
            description: observation.description.clone(),
            timestamp,
        })
    }

    fn get(&self, id: i64) -> ObservationResult<Option<WeatherObservation>> {
        Ok(Self::select_by_id(&self.conn, id)?)
    }

    fn latest(&self, city: &str) -> ObservationResult<Option<WeatherObservation>> {
        let latest = self
            .conn
            .query_row(
                &format!(
                    "{SELECT_COLUMNS} WHERE city = ?1 ORDER BY timestamp DESC, id DESC LIMIT 1"
                ),
                params![city],
                Self::row_to_observation,
            )
            .optional()?;
        Ok(latest)
    }

    fn history(&self, city: &str, limit: usize) -> ObservationResult<Vec<WeatherObservation>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut stmt = self.conn.prepare(&format!(
            "{SELECT_COLUMNS} WHERE city = ?1 ORDER BY timestamp DESC, id DESC LIMIT ?2"
        ))?;

        let rows = stmt.query_map(params![city, limit], Self::row_to_observation)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn temperatures(&self, city: &str) -> ObservationResult<Vec<f64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT temperature FROM weather_data WHERE city = ?1")?;

        let rows = stmt.query_map(params![city], |row| row.get::<_, f64>(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn hourly_buckets(
        &self,
        city: &str,
        plan: &BucketPlan,
    ) -> ObservationResult<Vec<HourlyBucket>> {
        let cutoff = Self::format_timestamp(&plan.cutoff(Utc::now()));
        let mut stmt = self.conn.prepare(&plan.sql())?;

        let rows = stmt.query_map(params![city, cutoff], |row| {
            Ok(HourlyBucket {
                hour: Self::bucket_start(row)?,
                avg_temp: row.get(1)?,
                min_temp: row.get(2)?,
                max_temp: row.get(3)?,
                avg_humidity: row.get(4)?,
                data_points: row.get(5)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn daily_buckets(&self, city: &str, plan: &BucketPlan) -> ObservationResult<Vec<DailyBucket>> {
        let cutoff = Self::format_timestamp(&plan.cutoff(Utc::now()));
        let mut stmt = self.conn.prepare(&plan.sql())?;

        let rows = stmt.query_map(params![city, cutoff], |row| {
            Ok(DailyBucket {
                day: Self::bucket_start(row)?,
                avg_temp: row.get(1)?,
                min_temp: row.get(2)?,
                max_temp: row.get(3)?,
                avg_humidity: row.get(4)?,
                measurements: row.get(5)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn cities_with_prefix(&self, prefix: &str, limit: usize) -> ObservationResult<Vec<String>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut stmt = self.conn.prepare(
            r#"
            SELECT DISTINCT city FROM weather_data
            WHERE unicode_lower(city) LIKE ?1 ESCAPE '\'
            ORDER BY city
            LIMIT ?2
            "#,
        )?;

        let pattern = Self::escape_like(&prefix.to_lowercase());
        let rows = stmt.query_map(params![pattern, limit], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn update(&self, id: i64, update: &ObservationUpdate) -> ObservationResult<WeatherObservation> {
        validate_update(update)?;

        let tx = self.conn.unchecked_transaction()?;
        let mut observation =
            Self::select_by_id(&tx, id)?.ok_or_else(|| ObservationError::not_found(id))?;

        update.apply_to(&mut observation);

        tx.execute(
            r#"
            UPDATE weather_data
            SET temperature = ?1, humidity = ?2, description = ?3
            WHERE id = ?4
            "#,
            params![
                observation.temperature,
                observation.humidity,
                observation.description,
                id,
            ],
        )?;
        tx.commit()?;

        tracing::debug!("Updated observation: {}", id);
        Ok(observation)
    }

    fn delete(&self, id: i64) -> ObservationResult<WeatherObservation> {
        let tx = self.conn.unchecked_transaction()?;
        let observation =
            Self::select_by_id(&tx, id)?.ok_or_else(|| ObservationError::not_found(id))?;

        tx.execute("DELETE FROM weather_data WHERE id = ?1", params![id])?;
        tx.commit()?;

        tracing::debug!("Deleted observation: {}", id);
        Ok(observation)
    }

    fn ping(&self) -> ObservationResult<()> {
        self.conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }
}
