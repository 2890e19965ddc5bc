//! Weather query service for Meteo
//!
//! Combines observation storage with a time-bounded query cache and exposes
//! current weather, history, statistics, analytics, trends, suggestions and
//! the observation mutations.

pub mod cache;
pub mod client;
pub mod service;
pub mod statistics;

pub use cache::{CacheKey, CachedValue, QueryCache, TtlCache, DEFAULT_CACHE_TTL};
pub use client::WeatherClient;
pub use service::{ServiceSettings, WeatherService};
pub use statistics::CityStatistics;

pub use meteo_store::{
    DailyBucket, HourlyBucket, NewObservation, ObservationError, ObservationResult,
    ObservationUpdate, WeatherObservation,
};
