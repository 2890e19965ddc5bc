//! Integration tests for WeatherService against an on-disk SQLite database.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::time::Duration;

use meteo_core::{AppError, Config};
use meteo_service::{
    NewObservation, ObservationError, ObservationUpdate, ServiceSettings, WeatherService,
};

/// Helper to open a service in a fresh temporary directory
fn open_service(dir: &tempfile::TempDir, settings: ServiceSettings) -> WeatherService {
    let path = dir.path().join("data").join("weather.db");
    WeatherService::open(&path, settings).unwrap()
}

#[test]
fn test_observations_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();

    let id = {
        let service = open_service(&dir, ServiceSettings::default());
        service
            .add_observation(NewObservation::new("Geneva", 11.0).with_description("Fog"))
            .unwrap()
            .id
    };

    let service = open_service(&dir, ServiceSettings::default());
    let obs = service.observation(id).unwrap().unwrap();
    assert_eq!(obs.city, "Geneva");
    assert_eq!(obs.description.as_deref(), Some("Fog"));
    assert!(obs.humidity.is_none());
}

#[test]
fn test_serialized_observation_shape() {
    let dir = tempfile::tempdir().unwrap();
    let service = open_service(&dir, ServiceSettings::default());

    let obs = service
        .add_observation(NewObservation::new("Geneva", 11.0).with_humidity(90))
        .unwrap();
    let json = serde_json::to_value(&obs).unwrap();

    assert!(json["id"].is_i64());
    assert_eq!(json["city"], "Geneva");
    assert_eq!(json["temperature"], 11.0);
    assert_eq!(json["humidity"], 90);
    assert!(json["description"].is_null());
    let timestamp = json["timestamp"].as_str().unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
}

#[test]
fn test_cache_expires_after_ttl() {
    let dir = tempfile::tempdir().unwrap();
    let service = open_service(
        &dir,
        ServiceSettings {
            cache_ttl: Duration::from_secs(1),
            ..Default::default()
        },
    );

    let obs = service.add_observation(NewObservation::new("Zurich", 5.0)).unwrap();
    assert_eq!(service.current_weather("Zurich").unwrap().unwrap().temperature, 5.0);

    let update = ObservationUpdate {
        temperature: Some(6.0),
        ..Default::default()
    };
    service.update_observation(obs.id, &update).unwrap();

    // Within the TTL the cached value is still served.
    assert_eq!(service.current_weather("Zurich").unwrap().unwrap().temperature, 5.0);

    std::thread::sleep(Duration::from_millis(1500));
    assert_eq!(service.current_weather("Zurich").unwrap().unwrap().temperature, 6.0);
}

#[test]
fn test_stale_statistics_until_expiry() {
    let dir = tempfile::tempdir().unwrap();
    let service = open_service(&dir, ServiceSettings::default());

    service.add_observation(NewObservation::new("Basel", 10.0)).unwrap();
    let stats = service.city_statistics("Basel").unwrap().unwrap();
    assert_eq!(stats.number_of_records, 1);

    service.add_observation(NewObservation::new("Basel", 30.0)).unwrap();
    let stats = service.city_statistics("Basel").unwrap().unwrap();
    assert_eq!(stats.number_of_records, 1);

    assert_eq!(service.purge_expired_cache(), 0);
}

#[test]
fn test_not_found_mutations_leave_storage_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let service = open_service(&dir, ServiceSettings::default());

    let obs = service.add_observation(NewObservation::new("Lugano", 17.0)).unwrap();

    let update = ObservationUpdate {
        temperature: Some(99.0),
        humidity: Some(1),
        description: Some("Bogus".to_string()),
    };
    let result = service.update_observation(obs.id + 1000, &update);
    assert!(matches!(result, Err(ObservationError::NotFound(_))));

    let result = service.delete_observation(obs.id + 1000);
    assert!(matches!(result, Err(ObservationError::NotFound(_))));

    assert_eq!(service.observation(obs.id).unwrap().unwrap(), obs);
    assert_eq!(service.cache_len(), 0);
}

#[test]
fn test_open_non_database_file_is_database_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("weather.db");
    let junk = "this is plain text and not an SQLite database header ".repeat(4);
    std::fs::write(&path, junk).unwrap();

    let result = WeatherService::open(&path, ServiceSettings::default());
    let err = result.err().unwrap();
    assert!(matches!(err, AppError::Database(_)));
    assert!(!err.is_client_error());
}

#[test]
fn test_open_under_a_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, "").unwrap();

    let result = WeatherService::open(&blocker.join("weather.db"), ServiceSettings::default());
    assert!(matches!(result, Err(AppError::Io(_))));
}

#[test]
fn test_from_config() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.database.path = dir.path().join("cfg.db");
    config.queries.suggestion_limit = 2;

    let service = WeatherService::from_config(&config).unwrap();
    for city in ["Aarau", "Altdorf", "Appenzell"] {
        service.add_observation(NewObservation::new(city, 1.0)).unwrap();
    }

    assert_eq!(service.city_suggestions("A"), vec!["Aarau", "Altdorf"]);
    service.health().unwrap();
}
