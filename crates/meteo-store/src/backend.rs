//! Observation storage backend trait and error types.
//!
//! This module defines the `WeatherBackend` trait that abstracts over the
//! relational store holding weather observations.

use thiserror::Error;

use crate::bucket::BucketPlan;
use crate::observation::{
    DailyBucket, HourlyBucket, NewObservation, ObservationUpdate, WeatherObservation,
};

/// Errors that can occur during observation storage operations.
#[derive(Debug, Error)]
pub enum ObservationError {
    /// Observation was not found.
    #[error("Observation not found: {0}")]
    NotFound(i64),

    /// Validation error (e.g., empty city, non-numeric temperature).
    #[error("Validation error: {0}")]
    Validation(String),

    /// Storage error (connection, query, or transaction failure).
    #[error("Storage error: {0}")]
    Storage(String),

    /// Generic error wrapper.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ObservationError {
    /// Create a not found error.
    pub fn not_found(id: i64) -> Self {
        Self::NotFound(id)
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }
}

impl From<rusqlite::Error> for ObservationError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

/// Result type for observation storage operations.
pub type ObservationResult<T> = Result<T, ObservationError>;

/// Trait for observation storage backends.
///
/// Implementations don't need to be Sync; the service wraps the backend in a
/// Mutex.
pub trait WeatherBackend: Send {
    /// Insert a new observation.
    ///
    /// Uses the current time when `observation.timestamp` is `None`.
    ///
    /// # Errors
    /// Returns `ObservationError::Validation` if the input is invalid and
    /// `ObservationError::Storage` if the write fails (nothing is persisted).
    fn insert(&self, observation: &NewObservation) -> ObservationResult<WeatherObservation>;

    /// Get an observation by ID.
    ///
    /// Returns `None` if the observation doesn't exist.
    fn get(&self, id: i64) -> ObservationResult<Option<WeatherObservation>>;

    /// Most recent observation for a city.
    fn latest(&self, city: &str) -> ObservationResult<Option<WeatherObservation>>;

    /// Up to `limit` observations for a city, newest first.
    fn history(&self, city: &str, limit: usize) -> ObservationResult<Vec<WeatherObservation>>;

    /// Every temperature recorded for a city.
    fn temperatures(&self, city: &str) -> ObservationResult<Vec<f64>>;

    /// Hourly aggregates for a city according to `plan`.
    fn hourly_buckets(&self, city: &str, plan: &BucketPlan)
        -> ObservationResult<Vec<HourlyBucket>>;

    /// Daily aggregates for a city according to `plan`.
    fn daily_buckets(&self, city: &str, plan: &BucketPlan) -> ObservationResult<Vec<DailyBucket>>;

    /// Distinct city names starting with `prefix`, case-insensitive, sorted.
    fn cities_with_prefix(&self, prefix: &str, limit: usize) -> ObservationResult<Vec<String>>;

    /// Update an existing observation.
    ///
    /// # Errors
    /// Returns `ObservationError::NotFound` if the observation doesn't exist.
    fn update(&self, id: i64, update: &ObservationUpdate) -> ObservationResult<WeatherObservation>;

    /// Delete an observation and return the removed row.
    ///
    /// # Errors
    /// Returns `ObservationError::NotFound` if the observation doesn't exist.
    fn delete(&self, id: i64) -> ObservationResult<WeatherObservation>;

    /// Check that the store answers queries.
    fn ping(&self) -> ObservationResult<()>;
}

/// Maximum city name length in characters.
pub const MAX_CITY_LENGTH: usize = 100;

/// Maximum description length.
pub const MAX_DESCRIPTION_LENGTH: usize = 200;

/// Validate a city name.
///
/// # Errors
/// Returns `ObservationError::Validation` if the city is empty, whitespace-only
/// or longer than `MAX_CITY_LENGTH` characters.
pub fn validate_city(city: &str) -> ObservationResult<()> {
    if city.trim().is_empty() {
        return Err(ObservationError::validation("City cannot be empty"));
    }

    if city.chars().count() > MAX_CITY_LENGTH {
        return Err(ObservationError::validation(format!(
            "City exceeds maximum length of {} characters",
            MAX_CITY_LENGTH
        )));
    }

    Ok(())
}

/// Validate a temperature reading.
///
/// # Errors
/// Returns `ObservationError::Validation` for NaN or infinite values.
pub fn validate_temperature(temperature: f64) -> ObservationResult<()> {
    if !temperature.is_finite() {
        return Err(ObservationError::validation("Temperature must be a finite number"));
    }
    Ok(())
}

/// Validate an optional description.
///
/// # Errors
/// Returns `ObservationError::Validation` if longer than `MAX_DESCRIPTION_LENGTH`.
pub fn validate_description(description: Option<&str>) -> ObservationResult<()> {
    match description {
        Some(d) if d.chars().count() > MAX_DESCRIPTION_LENGTH => {
            Err(ObservationError::validation(format!(
                "Description exceeds maximum length of {} characters",
                MAX_DESCRIPTION_LENGTH
            )))
        }
        _ => Ok(()),
    }
}

/// Validate a new observation before it reaches storage.
///
/// # Errors
/// Returns the first validation failure among city, temperature and description.
pub fn validate_new(observation: &NewObservation) -> ObservationResult<()> {
    validate_city(&observation.city)?;
    validate_temperature(observation.temperature)?;
    validate_description(observation.description.as_deref())
}

/// Validate a partial update.
///
/// # Errors
/// Returns `ObservationError::Validation` if a supplied field is invalid.
pub fn validate_update(update: &ObservationUpdate) -> ObservationResult<()> {
    if let Some(temperature) = update.temperature {
        validate_temperature(temperature)?;
    }
    validate_description(update.description.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_city_empty() {
        assert!(matches!(validate_city(""), Err(ObservationError::Validation(_))));
        assert!(matches!(validate_city("   "), Err(ObservationError::Validation(_))));
    }

    #[test]
    fn test_validate_city_too_long() {
        let long_city = "a".repeat(MAX_CITY_LENGTH + 1);
        assert!(matches!(validate_city(&long_city), Err(ObservationError::Validation(_))));
        assert!(validate_city(&"a".repeat(MAX_CITY_LENGTH)).is_ok());
    }

    #[test]
    fn test_validate_temperature() {
        assert!(validate_temperature(-40.0).is_ok());
        assert!(validate_temperature(f64::NAN).is_err());
        assert!(validate_temperature(f64::INFINITY).is_err());
    }

    #[test]
    fn test_validate_new_checks_description() {
        let obs = NewObservation::new("Paris", 20.0).with_description("d".repeat(201));
        assert!(matches!(validate_new(&obs), Err(ObservationError::Validation(_))));

        let obs = NewObservation::new("Paris", 20.0).with_description("Cloudy");
        assert!(validate_new(&obs).is_ok());
    }

    #[test]
    fn test_validate_update() {
        let update = ObservationUpdate {
            temperature: Some(f64::NAN),
            ..Default::default()
        };
        assert!(validate_update(&update).is_err());
        assert!(validate_update(&ObservationUpdate::default()).is_ok());
    }
}
