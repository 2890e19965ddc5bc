use anyhow::Result;
use meteo_core::{AppError, Config};
use meteo_service::WeatherService;

fn main() -> Result<()> {
    meteo_core::init()?;

    if let Err(err) = run() {
        if err.is_client_error() {
            tracing::warn!("Startup rejected: {}", err);
        } else {
            tracing::error!("Startup failed: {}", err);
        }
        anyhow::bail!(err.user_message());
    }

    Ok(())
}

fn run() -> Result<(), AppError> {
    let (config, _) = Config::load_validated().map_err(AppError::from_anyhow)?;
    let service = WeatherService::from_config(&config)?;
    service.health()?;

    tracing::info!("Meteo weather service ready");

    println!("Meteo - weather observation store");
    println!("\nConfiguration:");
    println!("  Database: {}", config.database.path.display());
    println!("  Cache TTL: {}s", config.cache.ttl_seconds);
    println!(
        "  Invalidate cache on write: {}",
        config.cache.invalidate_on_write
    );

    Ok(())
}
