//! Storage layer for weather observations.
//!
//! Owns the `weather_data` table, input validation and the grouped
//! time-bucketed aggregation queries used for analytics and trends.

pub mod backend;
pub mod bucket;
pub mod observation;
pub mod sqlite;

pub use backend::{ObservationError, ObservationResult, WeatherBackend};
pub use bucket::{BucketOrder, BucketPlan, BucketWidth};
pub use observation::{
    DailyBucket, HourlyBucket, NewObservation, ObservationUpdate, WeatherObservation,
};
pub use sqlite::SqliteWeatherStore;
