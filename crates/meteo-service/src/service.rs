//! Weather query service.
//!
//! `WeatherService` is the single façade over observation storage. Current
//! weather, history and statistics are memoized in a `QueryCache`; analytics,
//! trends and suggestions always hit storage.
//!
//! Mutations do not touch the cache unless `invalidate_on_write` is set, so a
//! read within the TTL of a cached result may return a value that predates a
//! later update or delete.
//!
//! Every successful write bumps a counter while the store lock is held. A
//! cached read records the counter alongside its storage read and only stores
//! its result if no write happened in between, so a read racing an
//! invalidating write cannot re-populate the cache with the old value.

use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use meteo_core::{AppError, Config, RusqliteErrorExt};
use meteo_store::backend::validate_new;
use meteo_store::{
    BucketPlan, DailyBucket, HourlyBucket, NewObservation, ObservationError, ObservationResult,
    ObservationUpdate, SqliteWeatherStore, WeatherBackend, WeatherObservation,
};

use crate::cache::{CacheKey, CachedValue, QueryCache, DEFAULT_CACHE_TTL};
use crate::statistics::CityStatistics;

/// Tunables for `WeatherService`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSettings {
    pub cache_ttl: Duration,
    pub invalidate_on_write: bool,
    pub history_limit: usize,
    pub trend_days: u32,
    pub suggestion_limit: usize,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            cache_ttl: DEFAULT_CACHE_TTL,
            invalidate_on_write: false,
            history_limit: 10,
            trend_days: 7,
            suggestion_limit: 5,
        }
    }
}

impl From<&Config> for ServiceSettings {
    fn from(config: &Config) -> Self {
        Self {
            cache_ttl: Duration::from_secs(config.cache.ttl_seconds),
            invalidate_on_write: config.cache.invalidate_on_write,
            history_limit: config.queries.history_limit,
            trend_days: config.queries.trend_days,
            suggestion_limit: config.queries.suggestion_limit,
        }
    }
}

/// Weather observation service with a time-bounded query cache.
pub struct WeatherService {
    store: Mutex<Box<dyn WeatherBackend>>,
    cache: QueryCache,
    writes: AtomicU64,
    settings: ServiceSettings,
}

impl WeatherService {
    /// Create a service over any storage backend.
    pub fn new(backend: impl WeatherBackend + 'static, settings: ServiceSettings) -> Self {
        let backend: Box<dyn WeatherBackend> = Box::new(backend);
        Self {
            store: Mutex::new(backend),
            cache: QueryCache::new(settings.cache_ttl),
            writes: AtomicU64::new(0),
            settings,
        }
    }

    /// Open the SQLite database at `path`, creating parent directories as needed.
    ///
    /// # Errors
    /// `AppError::Io` if the directory can't be created, `AppError::Database`
    /// if SQLite can't open the file or create the schema.
    pub fn open(path: &Path, settings: ServiceSettings) -> Result<Self, AppError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    tracing::error!("Failed to create {}: {}", parent.display(), e);
                    AppError::Io(e)
                })?;
            }
        }

        let store = SqliteWeatherStore::new(path).map_err(|e| {
            tracing::error!("Failed to open database at {}: {}", path.display(), e);
            AppError::Database(e.into_database_error())
        })?;
        tracing::info!("Opened weather database at {}", path.display());

        Ok(Self::new(store, settings))
    }

    /// Open the service described by `config`.
    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        Self::open(&config.database.path, ServiceSettings::from(config))
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    /// Record a new observation timestamped now.
    ///
    /// # Errors
    /// `ObservationError::Validation` for a missing/invalid city or temperature,
    /// `ObservationError::Storage` if the write fails (nothing is persisted).
    pub fn add_observation(
        &self,
        observation: NewObservation,
    ) -> ObservationResult<WeatherObservation> {
        let observation = NewObservation {
            timestamp: None,
            ..observation
        };
        validate_new(&observation)?;

        let created = self.write(|store| store.insert(&observation))?;
        tracing::info!("Added observation {} for {}", created.id, created.city);

        self.after_write(&created.city);
        Ok(created)
    }

    /// Parse a request body and record it.
    ///
    /// # Errors
    /// Same as `add_observation`, plus `Validation` for missing or non-numeric fields.
    pub fn add_observation_json(
        &self,
        body: &serde_json::Value,
    ) -> ObservationResult<WeatherObservation> {
        self.add_observation(NewObservation::from_json(body)?)
    }

    /// Look up a single observation by ID. Not cached.
    pub fn observation(&self, id: i64) -> ObservationResult<Option<WeatherObservation>> {
        self.store.lock().get(id)
    }

    /// Most recent observation for `city`, or `None` if the city has no data.
    pub fn current_weather(&self, city: &str) -> ObservationResult<Option<WeatherObservation>> {
        let key = CacheKey::current(city);
        if let Some(CachedValue::Current(observation)) = self.cached(&key) {
            return Ok(Some(observation));
        }

        let (latest, generation) = self.read(|store| store.latest(city))?;
        if let Some(ref observation) = latest {
            self.cache_unless_written(key, CachedValue::Current(observation.clone()), generation);
        }
        Ok(latest)
    }

    /// Up to `limit` observations for `city`, newest first.
    ///
    /// `None` uses the configured default (10).
    pub fn weather_history(
        &self,
        city: &str,
        limit: Option<usize>,
    ) -> ObservationResult<Vec<WeatherObservation>> {
        let limit = limit.unwrap_or(self.settings.history_limit);
        let key = CacheKey::history(city, limit);
        if let Some(CachedValue::History(history)) = self.cached(&key) {
            return Ok(history);
        }

        let (history, generation) = self.read(|store| store.history(city, limit))?;
        if !history.is_empty() {
            self.cache_unless_written(key, CachedValue::History(history.clone()), generation);
        }
        Ok(history)
    }

    /// Average, extremes and count over every observation for `city`.
    pub fn city_statistics(&self, city: &str) -> ObservationResult<Option<CityStatistics>> {
        let key = CacheKey::statistics(city);
        if let Some(CachedValue::Statistics(stats)) = self.cached(&key) {
            return Ok(Some(stats));
        }

        let (temperatures, generation) = self.read(|store| store.temperatures(city))?;
        let stats = CityStatistics::from_temperatures(&temperatures);
        if let Some(ref stats) = stats {
            self.cache_unless_written(key, CachedValue::Statistics(stats.clone()), generation);
        }
        Ok(stats)
    }

    /// Hourly buckets for the trailing 24 hours, most recent first.
    pub fn try_weather_analytics(&self, city: &str) -> ObservationResult<Vec<HourlyBucket>> {
        self.store
            .lock()
            .hourly_buckets(city, &BucketPlan::hourly_last_day())
    }

    /// Like `try_weather_analytics`, but a failure yields an empty list.
    pub fn weather_analytics(&self, city: &str) -> Vec<HourlyBucket> {
        degrade("analytics", city, self.try_weather_analytics(city))
    }

    /// Daily buckets for the trailing `days` days, oldest first.
    ///
    /// `None` uses the configured default (7).
    pub fn try_city_trends(
        &self,
        city: &str,
        days: Option<u32>,
    ) -> ObservationResult<Vec<DailyBucket>> {
        let days = days.unwrap_or(self.settings.trend_days);
        if days == 0 {
            return Err(ObservationError::validation("Trend window must be at least 1 day"));
        }

        self.store
            .lock()
            .daily_buckets(city, &BucketPlan::daily_trailing(days))
    }

    /// Like `try_city_trends`, but a failure yields an empty list.
    pub fn city_trends(&self, city: &str, days: Option<u32>) -> Vec<DailyBucket> {
        degrade("trends", city, self.try_city_trends(city, days))
    }

    /// Distinct cities starting with `prefix` (case-insensitive), alphabetical.
    pub fn try_city_suggestions(&self, prefix: &str) -> ObservationResult<Vec<String>> {
        self.store
            .lock()
            .cities_with_prefix(prefix, self.settings.suggestion_limit)
    }

    /// Like `try_city_suggestions`, but a failure yields an empty list.
    pub fn city_suggestions(&self, prefix: &str) -> Vec<String> {
        degrade("city suggestions", prefix, self.try_city_suggestions(prefix))
    }

    /// Apply a partial update to an observation.
    ///
    /// # Errors
    /// `ObservationError::NotFound` if `id` doesn't exist; storage is unchanged.
    pub fn update_observation(
        &self,
        id: i64,
        update: &ObservationUpdate,
    ) -> ObservationResult<WeatherObservation> {
        let updated = self.write(|store| store.update(id, update))?;
        tracing::info!("Updated observation {}", id);

        self.after_write(&updated.city);
        Ok(updated)
    }

    /// Delete an observation.
    ///
    /// # Errors
    /// `ObservationError::NotFound` if `id` doesn't exist.
    pub fn delete_observation(&self, id: i64) -> ObservationResult<()> {
        let removed = self.write(|store| store.delete(id))?;
        tracing::info!("Deleted observation {}", id);

        self.after_write(&removed.city);
        Ok(())
    }

    /// Check that storage answers queries.
    pub fn health(&self) -> ObservationResult<()> {
        self.store.lock().ping()
    }

    /// Number of cached entries, expired ones included.
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Drop expired cache entries.
    pub fn purge_expired_cache(&self) -> usize {
        let purged = self.cache.purge_expired();
        if purged > 0 {
            tracing::debug!("Purged {} expired cache entries", purged);
        }
        purged
    }

    fn cached(&self, key: &CacheKey) -> Option<CachedValue> {
        let hit = self.cache.get(key);
        tracing::debug!(
            "Cache {} for {}:{}",
            if hit.is_some() { "hit" } else { "miss" },
            key.tag(),
            key.city()
        );
        hit
    }

    /// Run a storage read and note the write counter it observed.
    fn read<T>(
        &self,
        f: impl FnOnce(&dyn WeatherBackend) -> ObservationResult<T>,
    ) -> ObservationResult<(T, u64)> {
        let store = self.store.lock();
        let value = f(&**store)?;
        Ok((value, self.writes.load(Ordering::Acquire)))
    }

    /// Run a storage mutation, bumping the write counter on success.
    fn write<T>(
        &self,
        f: impl FnOnce(&dyn WeatherBackend) -> ObservationResult<T>,
    ) -> ObservationResult<T> {
        let store = self.store.lock();
        let value = f(&**store)?;
        self.writes.fetch_add(1, Ordering::AcqRel);
        Ok(value)
    }

    fn cache_unless_written(&self, key: CacheKey, value: CachedValue, generation: u64) {
        let stored = self.cache.put_if(key, value, || {
            self.writes.load(Ordering::Acquire) == generation
        });
        if !stored {
            tracing::debug!("Skipped caching a result read before a write");
        }
    }

    fn after_write(&self, city: &str) {
        if self.settings.invalidate_on_write {
            let dropped = self.cache.invalidate_city(city);
            tracing::debug!("Invalidated {} cache entries for {}", dropped, city);
        }
    }
}

fn degrade<T>(operation: &str, subject: &str, result: ObservationResult<Vec<T>>) -> Vec<T> {
    result.unwrap_or_else(|e| {
        tracing::warn!("Error in {} for {}: {}", operation, subject, e);
        Vec::new()
    })
}
