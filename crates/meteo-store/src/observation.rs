//! Observation types shared by the SQLite store and the query service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backend::{ObservationError, ObservationResult};

/// A single weather observation for a city.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherObservation {
    pub id: i64,
    pub city: String,
    pub temperature: f64,
    pub humidity: Option<i64>,
    pub description: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Request to record a new observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewObservation {
    pub city: String,
    pub temperature: f64,
    #[serde(default)]
    pub humidity: Option<i64>,
    #[serde(default)]
    pub description: Option<String>,
    /// Observation time. The store uses the insertion time when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl NewObservation {
    pub fn new(city: impl Into<String>, temperature: f64) -> Self {
        Self {
            city: city.into(),
            temperature,
            humidity: None,
            description: None,
            timestamp: None,
        }
    }

    pub fn with_humidity(mut self, humidity: i64) -> Self {
        self.humidity = Some(humidity);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Backdate the observation. Only the storage layer honours this.
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Parse a loosely typed request body.
    ///
    /// `city` and `temperature` are required. The temperature may be a JSON
    /// number or a numeric string; humidity and description are optional and
    /// ignored when null.
    ///
    /// # Errors
    /// Returns `ObservationError::Validation` if a required field is missing
    /// or a field has the wrong type.
    pub fn from_json(body: &serde_json::Value) -> ObservationResult<Self> {
        let city = body
            .get("city")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| ObservationError::validation("Missing required field: city"))?;

        let temperature = match body.get("temperature") {
            Some(serde_json::Value::Number(n)) => n.as_f64(),
            Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
            Some(serde_json::Value::Null) | None => {
                return Err(ObservationError::validation(
                    "Missing required field: temperature",
                ))
            }
            _ => None,
        }
        .ok_or_else(|| ObservationError::validation("Temperature must be numeric"))?;

        let humidity = match body.get("humidity") {
            Some(serde_json::Value::Null) | None => None,
            Some(value) => Some(
                value
                    .as_i64()
                    .ok_or_else(|| ObservationError::validation("Humidity must be an integer"))?,
            ),
        };

        let description = match body.get("description") {
            Some(serde_json::Value::Null) | None => None,
            Some(value) => Some(
                value
                    .as_str()
                    .ok_or_else(|| ObservationError::validation("Description must be a string"))?
                    .to_string(),
            ),
        };

        Ok(Self {
            city: city.to_string(),
            temperature,
            humidity,
            description,
            timestamp: None,
        })
    }
}

/// Partial update of an observation; only `Some` fields are applied.
///
/// There is no way to clear `humidity` or `description` back to null.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservationUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humidity: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ObservationUpdate {
    pub fn is_empty(&self) -> bool {
        self.temperature.is_none() && self.humidity.is_none() && self.description.is_none()
    }

    /// Apply the supplied fields to `observation`.
    pub fn apply_to(&self, observation: &mut WeatherObservation) {
        if let Some(temperature) = self.temperature {
            observation.temperature = temperature;
        }
        if let Some(humidity) = self.humidity {
            observation.humidity = Some(humidity);
        }
        if let Some(ref description) = self.description {
            observation.description = Some(description.clone());
        }
    }
}

/// Per-hour aggregate over the trailing day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyBucket {
    pub hour: DateTime<Utc>,
    pub avg_temp: Option<f64>,
    pub min_temp: Option<f64>,
    pub max_temp: Option<f64>,
    pub data_points: i64,
    pub avg_humidity: Option<f64>,
}

/// Per-day aggregate over a trailing window of days.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyBucket {
    pub day: DateTime<Utc>,
    pub avg_temp: Option<f64>,
    pub min_temp: Option<f64>,
    pub max_temp: Option<f64>,
    pub avg_humidity: Option<f64>,
    pub measurements: i64,
}
