//! Async handle over `WeatherService`.
//!
//! Storage calls block on SQLite, so every operation runs on the blocking
//! thread pool.

use std::sync::Arc;

use meteo_store::{
    DailyBucket, HourlyBucket, NewObservation, ObservationError, ObservationResult,
    ObservationUpdate, WeatherObservation,
};

use crate::service::WeatherService;
use crate::statistics::CityStatistics;

/// Cloneable async client for the weather service.
#[derive(Clone)]
pub struct WeatherClient {
    service: Arc<WeatherService>,
}

impl WeatherClient {
    pub fn new(service: WeatherService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }

    /// Borrow the underlying synchronous service.
    pub fn service(&self) -> &WeatherService {
        &self.service
    }

    async fn run<T, F>(&self, f: F) -> ObservationResult<T>
    where
        F: FnOnce(&WeatherService) -> ObservationResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let service = self.service.clone();
        tokio::task::spawn_blocking(move || f(service.as_ref()))
            .await
            .map_err(|e| ObservationError::Other(anyhow::anyhow!("Storage task failed: {}", e)))?
    }

    pub async fn add_observation(
        &self,
        observation: NewObservation,
    ) -> ObservationResult<WeatherObservation> {
        self.run(move |s| s.add_observation(observation)).await
    }

    pub async fn add_observation_json(
        &self,
        body: serde_json::Value,
    ) -> ObservationResult<WeatherObservation> {
        self.run(move |s| s.add_observation_json(&body)).await
    }

    pub async fn observation(&self, id: i64) -> ObservationResult<Option<WeatherObservation>> {
        self.run(move |s| s.observation(id)).await
    }

    pub async fn current_weather(
        &self,
        city: &str,
    ) -> ObservationResult<Option<WeatherObservation>> {
        let city = city.to_string();
        self.run(move |s| s.current_weather(&city)).await
    }

    pub async fn weather_history(
        &self,
        city: &str,
        limit: Option<usize>,
    ) -> ObservationResult<Vec<WeatherObservation>> {
        let city = city.to_string();
        self.run(move |s| s.weather_history(&city, limit)).await
    }

    pub async fn city_statistics(&self, city: &str) -> ObservationResult<Option<CityStatistics>> {
        let city = city.to_string();
        self.run(move |s| s.city_statistics(&city)).await
    }

    pub async fn weather_analytics(&self, city: &str) -> Vec<HourlyBucket> {
        let city = city.to_string();
        self.run(move |s| Ok(s.weather_analytics(&city)))
            .await
            .unwrap_or_default()
    }

    pub async fn try_weather_analytics(&self, city: &str) -> ObservationResult<Vec<HourlyBucket>> {
        let city = city.to_string();
        self.run(move |s| s.try_weather_analytics(&city)).await
    }

    pub async fn city_trends(&self, city: &str, days: Option<u32>) -> Vec<DailyBucket> {
        let city = city.to_string();
        self.run(move |s| Ok(s.city_trends(&city, days)))
            .await
            .unwrap_or_default()
    }

    pub async fn try_city_trends(
        &self,
        city: &str,
        days: Option<u32>,
    ) -> ObservationResult<Vec<DailyBucket>> {
        let city = city.to_string();
        self.run(move |s| s.try_city_trends(&city, days)).await
    }

    pub async fn city_suggestions(&self, prefix: &str) -> Vec<String> {
        let prefix = prefix.to_string();
        self.run(move |s| Ok(s.city_suggestions(&prefix)))
            .await
            .unwrap_or_default()
    }

    pub async fn update_observation(
        &self,
        id: i64,
        update: ObservationUpdate,
    ) -> ObservationResult<WeatherObservation> {
        self.run(move |s| s.update_observation(id, &update)).await
    }

    pub async fn delete_observation(&self, id: i64) -> ObservationResult<()> {
        self.run(move |s| s.delete_observation(id)).await
    }

    pub async fn health(&self) -> ObservationResult<()> {
        self.run(|s| s.health()).await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;
    use crate::service::ServiceSettings;
    use meteo_store::SqliteWeatherStore;

    fn create_test_client() -> WeatherClient {
        let store = SqliteWeatherStore::in_memory().expect("Failed to create in-memory store");
        WeatherClient::new(WeatherService::new(store, ServiceSettings::default()))
    }

    #[tokio::test]
    async fn test_crud_through_client() {
        let client = create_test_client();

        let obs = client
            .add_observation(NewObservation::new("Berlin", 12.0).with_humidity(65))
            .await
            .unwrap();

        let current = client.current_weather("Berlin").await.unwrap().unwrap();
        assert_eq!(current.id, obs.id);

        let update = ObservationUpdate {
            description: Some("Windy".to_string()),
            ..Default::default()
        };
        let updated = client.update_observation(obs.id, update).await.unwrap();
        assert_eq!(updated.description.as_deref(), Some("Windy"));

        client.delete_observation(obs.id).await.unwrap();
        assert!(client.observation(obs.id).await.unwrap().is_none());

        let result = client.delete_observation(obs.id).await;
        assert!(matches!(result, Err(ObservationError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_clones_share_cache() {
        let client = create_test_client();
        let other = client.clone();

        client
            .add_observation(NewObservation::new("Vienna", 3.0))
            .await
            .unwrap();
        client.city_statistics("Vienna").await.unwrap();

        assert_eq!(other.service().cache_len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_reads() {
        let client = create_test_client();
        client
            .add_observation(NewObservation::new("Prague", 8.0))
            .await
            .unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let client = client.clone();
                tokio::spawn(async move { client.current_weather("Prague").await })
            })
            .collect();

        for handle in handles {
            let current = handle.await.unwrap().unwrap().unwrap();
            assert_eq!(current.temperature, 8.0);
        }
    }

    #[tokio::test]
    async fn test_suggestions_and_reports() {
        let client = create_test_client();
        client
            .add_observation_json(serde_json::json!({ "city": "Porto", "temperature": 19.5 }))
            .await
            .unwrap();

        assert_eq!(client.city_suggestions("po").await, vec!["Porto".to_string()]);
        assert_eq!(client.weather_analytics("Porto").await.len(), 1);
        assert_eq!(client.city_trends("Porto", Some(1)).await.len(), 1);
        client.health().await.unwrap();
    }
}
